//! The credential processor state machine

use std::collections::VecDeque;

use weft_core::{
    Assertion, Credential, IdentityKey, IgnoreReason, PrincipalKey, SpaceEvent,
};

use crate::{AdmissionState, TrustGraph};

/// Processor tuning knobs.
#[derive(Clone, Debug)]
pub struct TrustConfig {
    /// Bound on parked credentials per space; FIFO eviction past this.
    pub parked_capacity: usize,
}

impl Default for TrustConfig {
    fn default() -> Self {
        TrustConfig {
            parked_capacity: 128,
        }
    }
}

/// What `process` did with a credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Trust graph mutated.
    Applied,
    /// Issuer not yet admitted; queued for retry.
    Parked,
    /// Issuer revoked or lacking authority; dropped.
    Rejected,
    /// Malformed or redundant; dropped without effect.
    Ignored(IgnoreReason),
}

enum ApplyResult {
    Applied,
    Missing(PrincipalKey),
    Rejected,
    Ignored(IgnoreReason),
}

enum IssuerResolution {
    Member(IdentityKey),
    Missing(PrincipalKey),
    Revoked,
    Invalid,
}

struct Parked {
    credential: Credential,
    missing: PrincipalKey,
}

/// Consumes credentials in feed order and materializes the trust graph.
///
/// Processing is a strict left-fold: callers must deliver credentials
/// from one feed in ascending seq; across feeds any interleaving is
/// tolerated via parking.
pub struct CredentialProcessor {
    graph: TrustGraph,
    parked: VecDeque<Parked>,
    events: Vec<SpaceEvent>,
    config: TrustConfig,
}

impl CredentialProcessor {
    pub fn new(config: TrustConfig) -> Self {
        CredentialProcessor {
            graph: TrustGraph::new(),
            parked: VecDeque::new(),
            events: Vec::new(),
            config,
        }
    }

    pub fn graph(&self) -> &TrustGraph {
        &self.graph
    }

    /// Events accumulated since the last call. Never blocks; processing
    /// is synchronous under the space's mutation lock.
    pub fn take_events(&mut self) -> Vec<SpaceEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn parked_len(&self) -> usize {
        self.parked.len()
    }

    /// Process one credential. Never panics and never returns an error
    /// for peer-controlled input; the outcome classifies what happened.
    ///
    /// Issuer proof signatures are checked at the ingest boundary before
    /// a credential reaches this method; the processor decides authority
    /// only.
    pub fn process(&mut self, credential: &Credential) -> ProcessOutcome {
        match self.apply(credential) {
            ApplyResult::Applied => {
                self.drain_parked();
                ProcessOutcome::Applied
            }
            ApplyResult::Missing(missing) => {
                self.park(credential.clone(), missing);
                ProcessOutcome::Parked
            }
            ApplyResult::Rejected => {
                tracing::warn!(issuer = %credential.issuer, "credential rejected");
                ProcessOutcome::Rejected
            }
            ApplyResult::Ignored(reason) => {
                tracing::warn!(issuer = %credential.issuer, ?reason, "credential ignored");
                self.events.push(SpaceEvent::CredentialIgnored { reason });
                ProcessOutcome::Ignored(reason)
            }
        }
    }

    fn park(&mut self, credential: Credential, missing: PrincipalKey) {
        if self.parked.len() >= self.config.parked_capacity {
            if let Some(dropped) = self.parked.pop_front() {
                tracing::warn!(missing = %dropped.missing, "parked credential dropped");
                self.events.push(SpaceEvent::ParkedCredentialDropped {
                    issuer: dropped.missing,
                });
            }
        }
        tracing::debug!(missing = %missing, "credential parked");
        self.parked.push_back(Parked {
            credential,
            missing,
        });
    }

    /// Retry parked credentials. Each entry is retried once per pass and
    /// passes repeat only while retries keep landing, so a resolved chain
    /// drains fully while anything still missing just re-parks.
    fn drain_parked(&mut self) {
        let mut progress = true;
        while progress && !self.parked.is_empty() {
            progress = false;
            let pending: Vec<Parked> = self.parked.drain(..).collect();
            for entry in pending {
                match self.apply(&entry.credential) {
                    ApplyResult::Applied => progress = true,
                    ApplyResult::Missing(missing) => self.parked.push_back(Parked {
                        credential: entry.credential,
                        missing,
                    }),
                    ApplyResult::Rejected => {
                        tracing::warn!(issuer = %entry.credential.issuer, "parked credential rejected on retry");
                    }
                    ApplyResult::Ignored(reason) => {
                        self.events.push(SpaceEvent::CredentialIgnored { reason });
                    }
                }
            }
        }
    }

    /// Resolve an issuer down to the admitted member acting through it.
    fn resolve_issuer(&self, issuer: &PrincipalKey) -> IssuerResolution {
        match issuer {
            PrincipalKey::Identity(identity) => match self.graph.member_state(identity) {
                AdmissionState::Admitted => IssuerResolution::Member(*identity),
                AdmissionState::Revoked => IssuerResolution::Revoked,
                AdmissionState::Unknown => IssuerResolution::Missing(*issuer),
            },
            PrincipalKey::Device(device) => match self.graph.device_identity(device) {
                Some(identity) => match self.graph.member_state(&identity) {
                    AdmissionState::Admitted => IssuerResolution::Member(identity),
                    AdmissionState::Revoked => IssuerResolution::Revoked,
                    AdmissionState::Unknown => {
                        IssuerResolution::Missing(PrincipalKey::Identity(identity))
                    }
                },
                None => IssuerResolution::Missing(*issuer),
            },
            PrincipalKey::Feed(_) => IssuerResolution::Invalid,
        }
    }

    fn apply(&mut self, credential: &Credential) -> ApplyResult {
        match &credential.subject.assertion {
            Assertion::IdentityGenesis => self.apply_genesis(credential),
            Assertion::DeviceAdmit { identity } => self.apply_device_admit(credential, *identity),
            Assertion::SpaceMember { feed_scope } => {
                self.apply_space_member(credential, feed_scope.clone())
            }
            Assertion::FeedAdmit { member } => self.apply_feed_admit(credential, *member),
            Assertion::SpaceMemberRevoke => self.apply_revoke(credential),
        }
    }

    fn apply_genesis(&mut self, credential: &Credential) -> ApplyResult {
        // Self-signed root: issuer and subject must be the same identity.
        let PrincipalKey::Identity(identity) = credential.subject.id else {
            return ApplyResult::Ignored(IgnoreReason::Malformed);
        };
        if credential.issuer != credential.subject.id {
            return ApplyResult::Ignored(IgnoreReason::Malformed);
        }
        if !self.graph.declare_identity(identity) {
            return ApplyResult::Ignored(IgnoreReason::Duplicate);
        }
        tracing::debug!(identity = %identity, "identity genesis");
        ApplyResult::Applied
    }

    fn apply_device_admit(
        &mut self,
        credential: &Credential,
        identity: IdentityKey,
    ) -> ApplyResult {
        let PrincipalKey::Device(device) = credential.subject.id else {
            return ApplyResult::Ignored(IgnoreReason::Malformed);
        };
        // Issuer must resolve to the same identity, and that identity
        // must already hold space membership. A device admit that
        // arrives before its owner's admission parks until it lands.
        match self.resolve_issuer(&credential.issuer) {
            IssuerResolution::Member(owner) => {
                if owner != identity {
                    return ApplyResult::Ignored(IgnoreReason::Malformed);
                }
            }
            IssuerResolution::Missing(missing) => return ApplyResult::Missing(missing),
            IssuerResolution::Revoked => return ApplyResult::Rejected,
            IssuerResolution::Invalid => return ApplyResult::Ignored(IgnoreReason::Malformed),
        }
        if self.graph.device_identity(&device).is_some() {
            return ApplyResult::Ignored(IgnoreReason::Duplicate);
        }
        self.graph.admit_device(device, identity, credential.issuer);
        self.events.push(SpaceEvent::DeviceAdmitted { identity });
        ApplyResult::Applied
    }

    fn apply_space_member(
        &mut self,
        credential: &Credential,
        feed_scope: Vec<weft_core::FeedKey>,
    ) -> ApplyResult {
        let PrincipalKey::Identity(subject) = credential.subject.id else {
            return ApplyResult::Ignored(IgnoreReason::Malformed);
        };
        match self.graph.member_state(&subject) {
            AdmissionState::Admitted => return ApplyResult::Ignored(IgnoreReason::Duplicate),
            AdmissionState::Revoked => return ApplyResult::Ignored(IgnoreReason::AlreadyRevoked),
            AdmissionState::Unknown => {}
        }

        // Genesis bootstrap: the first member self-admits on the
        // strength of its own identity genesis.
        if self.graph.is_empty() {
            if credential.issuer != credential.subject.id {
                return ApplyResult::Missing(credential.issuer);
            }
            if !self.graph.identity_known(&subject) {
                return ApplyResult::Missing(credential.issuer);
            }
            self.graph.admit_member(subject, credential.issuer, feed_scope);
            self.events.push(SpaceEvent::MemberAdmitted { member: subject });
            return ApplyResult::Applied;
        }

        match self.resolve_issuer(&credential.issuer) {
            IssuerResolution::Member(_) => {
                self.graph.admit_member(subject, credential.issuer, feed_scope);
                self.events.push(SpaceEvent::MemberAdmitted { member: subject });
                ApplyResult::Applied
            }
            IssuerResolution::Missing(missing) => ApplyResult::Missing(missing),
            IssuerResolution::Revoked => ApplyResult::Rejected,
            IssuerResolution::Invalid => ApplyResult::Ignored(IgnoreReason::Malformed),
        }
    }

    fn apply_feed_admit(&mut self, credential: &Credential, member: IdentityKey) -> ApplyResult {
        let PrincipalKey::Feed(feed) = credential.subject.id else {
            return ApplyResult::Ignored(IgnoreReason::Malformed);
        };
        match self.resolve_issuer(&credential.issuer) {
            IssuerResolution::Member(_) => {}
            IssuerResolution::Missing(missing) => return ApplyResult::Missing(missing),
            IssuerResolution::Revoked => return ApplyResult::Rejected,
            IssuerResolution::Invalid => return ApplyResult::Ignored(IgnoreReason::Malformed),
        }
        match self.graph.member_state(&member) {
            AdmissionState::Admitted => {}
            AdmissionState::Revoked => return ApplyResult::Rejected,
            AdmissionState::Unknown => {
                return ApplyResult::Missing(PrincipalKey::Identity(member))
            }
        }
        // A scoped member may only gain feeds inside its admitted scope.
        if let Some(scope) = self.graph.member_feed_scope(&member) {
            if !scope.is_empty() && !scope.contains(&feed) {
                tracing::warn!(feed = %feed, member = %member, "feed outside member scope");
                return ApplyResult::Rejected;
            }
        }
        if self.graph.feed_owner(&feed).is_some() {
            return ApplyResult::Ignored(IgnoreReason::Duplicate);
        }
        self.graph.admit_feed(feed, member, credential.issuer);
        self.events.push(SpaceEvent::FeedAdmitted { feed });
        ApplyResult::Applied
    }

    fn apply_revoke(&mut self, credential: &Credential) -> ApplyResult {
        let PrincipalKey::Identity(target) = credential.subject.id else {
            return ApplyResult::Ignored(IgnoreReason::Malformed);
        };
        let issuer_member = match self.resolve_issuer(&credential.issuer) {
            IssuerResolution::Member(m) => m,
            IssuerResolution::Missing(missing) => return ApplyResult::Missing(missing),
            IssuerResolution::Revoked => return ApplyResult::Rejected,
            IssuerResolution::Invalid => return ApplyResult::Ignored(IgnoreReason::Malformed),
        };
        if issuer_member == target {
            return ApplyResult::Ignored(IgnoreReason::SelfRevocation);
        }
        match self.graph.member_state(&target) {
            AdmissionState::Revoked => ApplyResult::Ignored(IgnoreReason::AlreadyRevoked),
            AdmissionState::Unknown => ApplyResult::Missing(PrincipalKey::Identity(target)),
            AdmissionState::Admitted => {
                self.graph.revoke_member(target);
                self.events.push(SpaceEvent::MemberRevoked { member: target });
                ApplyResult::Applied
            }
        }
    }
}
