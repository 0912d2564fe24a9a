//! WEFT Test Harness - end-to-end protocol validation
//!
//! This crate provides:
//! - Peer fixtures wiring controllers, consumers and event channels
//! - In-process session pairs over duplex pipes
//! - End-to-end scenario tests for replication and trust semantics
//! - Benchmarks for the hot codec and clock paths

pub mod harness;

pub use harness::*;
