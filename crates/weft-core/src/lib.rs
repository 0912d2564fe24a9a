//! WEFT Core - Fundamental types and primitives
//!
//! This crate defines the core types used throughout WEFT:
//! - Key identifiers (FeedKey, SpaceKey, IdentityKey, DeviceKey)
//! - Timeframe (vector clock over feed keys)
//! - Messages, payloads and credentials
//! - Error taxonomy and observable space events

pub mod error;
pub mod event;
pub mod key;
pub mod message;
pub mod timeframe;

pub use error::*;
pub use event::*;
pub use key::*;
pub use message::*;
pub use timeframe::*;
