//! Error taxonomy for the WEFT core

use thiserror::Error;

use crate::{FeedKey, PrincipalKey, SpaceKey};

/// Core WEFT errors
#[derive(Error, Debug)]
pub enum WeftError {
    // Wire errors
    #[error("Invalid wire format: {0}")]
    InvalidWireFormat(String),

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Unknown frame kind: {0}")]
    UnknownFrameKind(u8),

    #[error("Unknown payload tag: {0}")]
    UnknownPayloadTag(u8),

    #[error("Unknown assertion tag: {0}")]
    UnknownAssertionTag(u8),

    #[error("Unsupported wire version: {0}")]
    UnsupportedVersion(u8),

    // Feed errors
    #[error("Bad signature on feed {feed:?} seq {seq}")]
    BadSignature { feed: FeedKey, seq: u64 },

    #[error("Sequence gap on feed {feed:?}: expected {expected}, got {got}")]
    SequenceGap {
        feed: FeedKey,
        expected: u64,
        got: u64,
    },

    #[error("Feed {0:?} is not writable from this party")]
    NotWritable(FeedKey),

    #[error("Feed {0:?} is closed")]
    FeedClosed(FeedKey),

    #[error("Storage error: {0}")]
    Storage(String),

    // Trust errors
    #[error("Unauthorized credential from {issuer}")]
    UnauthorizedCredential { issuer: PrincipalKey },

    // Space errors
    #[error("Space is closed")]
    SpaceClosed,

    #[error("Space key mismatch: expected {expected:?}, got {got:?}")]
    SpaceMismatch { expected: SpaceKey, got: SpaceKey },

    // Invitation errors
    #[error("Invitation expired")]
    InvitationExpired,

    #[error("Invitation already redeemed")]
    InvitationReplayed,

    #[error("Invalid invitation code")]
    InvalidInvitation,

    // Session errors
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("Handshake timed out")]
    HandshakeTimeout,

    #[error("Stream timed out")]
    StreamTimeout,

    #[error("Session closed: {0}")]
    SessionClosed(String),

    // Transport errors
    #[error("Transport error: {0}")]
    Transport(String),
}

impl WeftError {
    /// True for failures a caller may retry after reconnecting, as
    /// opposed to protocol or programmer errors.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WeftError::HandshakeTimeout
                | WeftError::StreamTimeout
                | WeftError::Transport(_)
                | WeftError::SessionClosed(_)
        )
    }
}

/// Result type for WEFT operations
pub type WeftResult<T> = Result<T, WeftError>;
