//! WEFT Sync - pairwise replication sessions
//!
//! A session runs over any ordered reliable byte stream. After an
//! authenticated handshake the two sides exchange timeframes and stream
//! each other the message ranges the peer is missing, windowed per feed.
//! Timeframe exchanges double as acknowledgements; there is no separate
//! ack frame.

pub mod session;
pub mod transport;

pub use session::*;
pub use transport::*;
