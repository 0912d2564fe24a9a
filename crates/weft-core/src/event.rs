//! Observable space events
//!
//! Contained protocol violations never propagate as errors out of a
//! session; they surface here so a host can watch a space making (or
//! failing to make) progress.

use crate::{FeedKey, IdentityKey, PrincipalKey};

/// Events surfaced by a space controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpaceEvent {
    /// An identity became an admitted member.
    MemberAdmitted { member: IdentityKey },
    /// A member was revoked; its feeds are inadmissible from now on.
    MemberRevoked { member: IdentityKey },
    /// A device was admitted under an identity.
    DeviceAdmitted { identity: IdentityKey },
    /// A feed was authorized to write space data.
    FeedAdmitted { feed: FeedKey },
    /// A parked credential was evicted before its issuer resolved.
    ParkedCredentialDropped { issuer: PrincipalKey },
    /// A credential was ignored as malformed or redundant.
    CredentialIgnored { reason: IgnoreReason },
    /// A replication session ended.
    SessionClosed { reason: String },
}

/// Why a credential was ignored rather than applied or parked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Issuer attempted to revoke itself.
    SelfRevocation,
    /// Subject was already revoked.
    AlreadyRevoked,
    /// Subject was already admitted with the same assertion.
    Duplicate,
    /// Assertion does not apply to the subject's role.
    Malformed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_equality() {
        let feed = FeedKey::new([1; 32]);
        assert_eq!(
            SpaceEvent::FeedAdmitted { feed },
            SpaceEvent::FeedAdmitted { feed }
        );
        assert_ne!(
            SpaceEvent::CredentialIgnored {
                reason: IgnoreReason::Duplicate
            },
            SpaceEvent::CredentialIgnored {
                reason: IgnoreReason::Malformed
            }
        );
    }
}
