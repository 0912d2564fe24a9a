//! WEFT Wire - versioned binary frame format
//!
//! Frame = fixed header (magic, version, kind, space key, payload length)
//! followed by a kind-specific payload. Frames are self-delimiting so the
//! format can be versioned independently of the host transport; the only
//! transport requirement is an ordered, reliable byte stream.

pub mod frame;
pub mod header;

pub use frame::*;
pub use header::*;
