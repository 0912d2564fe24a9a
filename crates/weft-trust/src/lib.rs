//! WEFT Trust - credential processing and the trust graph
//!
//! The credential processor is a state machine: it left-folds credential
//! messages into a trust graph of admitted identities, devices and feeds.
//! Credentials whose issuer is not yet admitted are parked in a bounded
//! queue and retried when admissions land, so legitimate reordering
//! during concurrent replication is tolerated without admitting anything
//! out of order. Revocation is terminal and forward-only.

pub mod graph;
pub mod processor;

pub use graph::*;
pub use processor::*;
