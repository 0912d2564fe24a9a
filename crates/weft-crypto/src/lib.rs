//! WEFT Crypto - Keyring with Ed25519 keypairs
//!
//! The keyring is an explicitly passed context object (no process-wide
//! singleton): it generates keypairs, holds the private halves, signs on
//! behalf of keys it owns, and verifies signatures for any public key.
//! Verification never panics; malformed input verifies as `false`.

pub mod keyring;

pub use keyring::*;
