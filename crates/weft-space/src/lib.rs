//! WEFT Space - per-space controller
//!
//! A space controller owns one space's feed set, timeframe and credential
//! processor, and is the only component allowed to mutate them. All
//! mutation funnels through a single per-space lock; replication sessions
//! are transient callers of the controller's public methods and never
//! hold that lock across network I/O.

pub mod consumer;
pub mod controller;
pub mod invitation;

pub use consumer::*;
pub use controller::*;
pub use invitation::*;
