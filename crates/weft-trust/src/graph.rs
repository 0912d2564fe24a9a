//! The materialized trust graph
//!
//! An arena-style table keyed by principal key. Records reference each
//! other by key, never by pointer, so the issuer-admits-subject cycles of
//! a real space stay plain lookups.

use std::collections::HashMap;

use weft_core::{DeviceKey, FeedKey, IdentityKey, PrincipalKey};

/// Admission state of a principal. Absence from the graph is `Unknown`;
/// `Revoked` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmissionState {
    Unknown,
    Admitted,
    Revoked,
}

/// A space member (admitted identity).
#[derive(Clone, Debug)]
pub struct MemberRecord {
    pub state: AdmissionState,
    pub admitted_by: PrincipalKey,
    /// Feeds this member may write. Empty = unrestricted.
    pub feed_scope: Vec<FeedKey>,
}

/// A device admitted under an identity.
#[derive(Clone, Debug)]
pub struct DeviceRecord {
    pub identity: IdentityKey,
    pub admitted_by: PrincipalKey,
}

/// A feed authorized to write space data.
#[derive(Clone, Debug)]
pub struct FeedRecord {
    pub member: IdentityKey,
    pub admitted_by: PrincipalKey,
}

/// Materialized result of credential processing.
#[derive(Clone, Debug, Default)]
pub struct TrustGraph {
    /// Identity roots seen via `IdentityGenesis`.
    identities: HashMap<IdentityKey, ()>,
    /// Space members and their admission state.
    members: HashMap<IdentityKey, MemberRecord>,
    /// Devices, keyed by device key.
    devices: HashMap<DeviceKey, DeviceRecord>,
    /// Feeds authorized for space data.
    feeds: HashMap<FeedKey, FeedRecord>,
}

impl TrustGraph {
    pub fn new() -> Self {
        TrustGraph::default()
    }

    // --- mutation (crate-internal; the processor is the only writer) ---

    pub(crate) fn declare_identity(&mut self, identity: IdentityKey) -> bool {
        self.identities.insert(identity, ()).is_none()
    }

    pub(crate) fn admit_member(
        &mut self,
        member: IdentityKey,
        admitted_by: PrincipalKey,
        feed_scope: Vec<FeedKey>,
    ) {
        self.members.insert(
            member,
            MemberRecord {
                state: AdmissionState::Admitted,
                admitted_by,
                feed_scope,
            },
        );
    }

    pub(crate) fn revoke_member(&mut self, member: IdentityKey) {
        if let Some(record) = self.members.get_mut(&member) {
            record.state = AdmissionState::Revoked;
        }
    }

    pub(crate) fn admit_device(
        &mut self,
        device: DeviceKey,
        identity: IdentityKey,
        admitted_by: PrincipalKey,
    ) {
        self.devices.insert(
            device,
            DeviceRecord {
                identity,
                admitted_by,
            },
        );
    }

    pub(crate) fn admit_feed(
        &mut self,
        feed: FeedKey,
        member: IdentityKey,
        admitted_by: PrincipalKey,
    ) {
        self.feeds.insert(
            feed,
            FeedRecord {
                member,
                admitted_by,
            },
        );
    }

    // --- queries ---

    /// True once an `IdentityGenesis` has been seen for this identity.
    pub fn identity_known(&self, identity: &IdentityKey) -> bool {
        self.identities.contains_key(identity)
    }

    /// Admission state of an identity with respect to this space.
    pub fn member_state(&self, identity: &IdentityKey) -> AdmissionState {
        self.members
            .get(identity)
            .map(|r| r.state)
            .unwrap_or(AdmissionState::Unknown)
    }

    pub fn is_member(&self, identity: &IdentityKey) -> bool {
        self.member_state(identity) == AdmissionState::Admitted
    }

    /// The identity behind a device, if the device is admitted.
    pub fn device_identity(&self, device: &DeviceKey) -> Option<IdentityKey> {
        self.devices.get(device).map(|r| r.identity)
    }

    /// The member a feed writes for, regardless of revocation.
    pub fn feed_owner(&self, feed: &FeedKey) -> Option<IdentityKey> {
        self.feeds.get(feed).map(|r| r.member)
    }

    /// A feed may contribute iff it was admitted and its member is still
    /// admitted. Revocation flips this forward-only; nothing already
    /// accepted is rewritten.
    pub fn is_feed_admissible(&self, feed: &FeedKey) -> bool {
        match self.feeds.get(feed) {
            Some(record) => self.is_member(&record.member),
            None => false,
        }
    }

    /// The feed scope a member was admitted with (empty = unrestricted).
    pub fn member_feed_scope(&self, member: &IdentityKey) -> Option<&[FeedKey]> {
        self.members.get(member).map(|r| r.feed_scope.as_slice())
    }

    /// Currently admissible feeds.
    pub fn admitted_feeds(&self) -> impl Iterator<Item = &FeedKey> {
        self.feeds
            .iter()
            .filter(|(_, record)| self.is_member(&record.member))
            .map(|(feed, _)| feed)
    }

    /// Currently admitted members.
    pub fn admitted_members(&self) -> impl Iterator<Item = &IdentityKey> {
        self.members
            .iter()
            .filter(|(_, record)| record.state == AdmissionState::Admitted)
            .map(|(member, _)| member)
    }

    pub fn member_count(&self) -> usize {
        self.members
            .values()
            .filter(|r| r.state == AdmissionState::Admitted)
            .count()
    }

    /// True while no member has ever been admitted; the genesis
    /// bootstrap is only legal in this state.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(n: u8) -> IdentityKey {
        IdentityKey::new([n; 32])
    }

    fn feed(n: u8) -> FeedKey {
        FeedKey::new([n; 32])
    }

    #[test]
    fn test_unknown_by_default() {
        let graph = TrustGraph::new();
        assert_eq!(graph.member_state(&identity(1)), AdmissionState::Unknown);
        assert!(!graph.is_feed_admissible(&feed(1)));
    }

    #[test]
    fn test_revocation_disables_feeds() {
        let mut graph = TrustGraph::new();
        let member = identity(1);
        graph.admit_member(member, member.into(), vec![]);
        graph.admit_feed(feed(2), member, member.into());
        assert!(graph.is_feed_admissible(&feed(2)));

        graph.revoke_member(member);
        assert_eq!(graph.member_state(&member), AdmissionState::Revoked);
        assert!(!graph.is_feed_admissible(&feed(2)));
        // Ownership is still recorded for history.
        assert_eq!(graph.feed_owner(&feed(2)), Some(member));
    }
}
