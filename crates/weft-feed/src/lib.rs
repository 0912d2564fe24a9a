//! WEFT Feed - single-writer append-only signed logs
//!
//! A feed is a strictly sequenced log of signed messages. Local writes go
//! through [`Feed::append`] (requires the feed's keypair); replicated
//! writes go through [`Feed::verify_and_append`], which enforces
//! seq-exactness and signature validity in that order so callers can tell
//! "buffer and retry" from "drop, malicious peer".

pub mod feed;
pub mod storage;

pub use feed::*;
pub use storage::*;
