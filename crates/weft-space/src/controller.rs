//! The space controller

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};

use weft_core::{
    Assertion, Credential, DeviceKey, FeedKey, IdentityKey, IgnoreReason, Message, Payload,
    SpaceEvent, SpaceKey, Timeframe, WeftError, WeftResult,
};
use weft_crypto::{generate_secret, issue_credential, verify_credential, Keyring};
use weft_feed::{Feed, FeedStorage, MemoryFeedStorage};
use weft_trust::{CredentialProcessor, ProcessOutcome, TrustConfig};
use weft_wire::InvitationAuth;

use crate::{DataConsumer, Invitation, InvitationRegistry};

/// Space lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpaceState {
    Uninitialized,
    Genesis,
    Joining,
    Syncing,
    Ready,
    Closing,
    Closed,
}

/// What `apply_remote` did with a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Appended and routed.
    Applied,
    /// Already covered by the local timeframe; idempotent no-op.
    AlreadyKnown,
}

/// Construction-time wiring for a space.
pub struct SpaceConfig {
    pub storage: Arc<dyn FeedStorage>,
    pub consumer: Option<Arc<dyn DataConsumer>>,
    pub events: Option<mpsc::UnboundedSender<SpaceEvent>>,
    pub trust: TrustConfig,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        SpaceConfig {
            storage: MemoryFeedStorage::shared(),
            consumer: None,
            events: None,
            trust: TrustConfig::default(),
        }
    }
}

struct FeedEntry {
    feed: Feed,
    /// Messages handed to the data consumer so far. Stalls while the
    /// feed is inadmissible, which is what makes delivery exactly-once.
    delivered: u64,
}

/// Everything behind the per-space mutation lock.
struct SpaceCore {
    keyring: Keyring,
    identity: IdentityKey,
    device: DeviceKey,
    /// Feed this party writes credentials to.
    write_feed: FeedKey,
    /// Feed this party writes data to (creator: separate from control).
    data_feed: FeedKey,
    feeds: HashMap<FeedKey, FeedEntry>,
    timeframe: Timeframe,
    processor: CredentialProcessor,
    invitations: InvitationRegistry,
}

struct SpaceInner {
    space: SpaceKey,
    state: RwLock<SpaceState>,
    core: RwLock<SpaceCore>,
    storage: Arc<dyn FeedStorage>,
    consumer: Option<Arc<dyn DataConsumer>>,
    events: Option<mpsc::UnboundedSender<SpaceEvent>>,
    shutdown: watch::Sender<bool>,
    /// Bumped on every local append so sessions can announce promptly
    /// instead of waiting for their refresh tick.
    changed: watch::Sender<u64>,
}

/// Owns one space: its feeds, timeframe, trust graph and lifecycle.
///
/// Cheap to clone; all clones share the same space.
#[derive(Clone)]
pub struct SpaceController {
    inner: Arc<SpaceInner>,
}

impl SpaceController {
    /// Create a brand-new space: generates the space, identity, device,
    /// control and data feed keys, writes the genesis credential chain
    /// to the control feed, and transitions straight to `Ready`.
    pub fn genesis(mut keyring: Keyring, config: SpaceConfig) -> WeftResult<Self> {
        let space = keyring.generate().as_space_key();
        let identity_kp = keyring.generate();
        let device_kp = keyring.generate();
        let control_kp = keyring.generate();
        let data_kp = keyring.generate();

        let identity = identity_kp.as_identity_key();
        let device = device_kp.as_device_key();
        let control_feed = control_kp.as_feed_key();
        let data_feed = data_kp.as_feed_key();

        let mut feeds = HashMap::new();
        feeds.insert(
            control_feed,
            FeedEntry {
                feed: Feed::open(control_feed, Some(control_kp), Arc::clone(&config.storage))?,
                delivered: 0,
            },
        );
        feeds.insert(
            data_feed,
            FeedEntry {
                feed: Feed::open(data_feed, Some(data_kp), Arc::clone(&config.storage))?,
                delivered: 0,
            },
        );

        let controller = Self::build(
            space,
            SpaceState::Genesis,
            SpaceCore {
                keyring,
                identity,
                device,
                write_feed: control_feed,
                data_feed,
                feeds,
                timeframe: Timeframe::new(),
                processor: CredentialProcessor::new(config.trust.clone()),
                invitations: InvitationRegistry::new(),
            },
            config,
        );

        // Genesis chain: identity root, self space membership, this
        // device, and both local feeds.
        for credential in [
            issue_credential(&identity_kp, identity, identity, Assertion::IdentityGenesis),
            issue_credential(
                &identity_kp,
                identity,
                identity,
                Assertion::SpaceMember { feed_scope: vec![] },
            ),
            issue_credential(
                &identity_kp,
                identity,
                device,
                Assertion::DeviceAdmit { identity },
            ),
            issue_credential(
                &identity_kp,
                identity,
                control_feed,
                Assertion::FeedAdmit { member: identity },
            ),
            issue_credential(
                &identity_kp,
                identity,
                data_feed,
                Assertion::FeedAdmit { member: identity },
            ),
        ] {
            controller.append_credential(credential)?;
        }

        controller.set_state(SpaceState::Ready);
        tracing::info!(space = %space, identity = %identity, "space created");
        Ok(controller)
    }

    /// Join an existing space as an invited guest. The guest writes its
    /// own identity genesis and device admission to its feed; space
    /// membership arrives via replication once the inviter admits it.
    pub fn join(space: SpaceKey, mut keyring: Keyring, config: SpaceConfig) -> WeftResult<Self> {
        let identity_kp = keyring.generate();
        let device_kp = keyring.generate();
        let feed_kp = keyring.generate();

        let identity = identity_kp.as_identity_key();
        let device = device_kp.as_device_key();
        let own_feed = feed_kp.as_feed_key();

        let mut feeds = HashMap::new();
        feeds.insert(
            own_feed,
            FeedEntry {
                feed: Feed::open(own_feed, Some(feed_kp), Arc::clone(&config.storage))?,
                delivered: 0,
            },
        );

        let controller = Self::build(
            space,
            SpaceState::Joining,
            SpaceCore {
                keyring,
                identity,
                device,
                write_feed: own_feed,
                data_feed: own_feed,
                feeds,
                timeframe: Timeframe::new(),
                processor: CredentialProcessor::new(config.trust.clone()),
                invitations: InvitationRegistry::new(),
            },
            config,
        );

        for credential in [
            issue_credential(&identity_kp, identity, identity, Assertion::IdentityGenesis),
            issue_credential(
                &identity_kp,
                identity,
                device,
                Assertion::DeviceAdmit { identity },
            ),
        ] {
            controller.append_credential(credential)?;
        }

        tracing::info!(space = %space, identity = %identity, "joining space");
        Ok(controller)
    }

    fn build(space: SpaceKey, state: SpaceState, core: SpaceCore, config: SpaceConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        let (changed, _) = watch::channel(0u64);
        SpaceController {
            inner: Arc::new(SpaceInner {
                space,
                state: RwLock::new(state),
                core: RwLock::new(core),
                storage: config.storage,
                consumer: config.consumer,
                events: config.events,
                shutdown,
                changed,
            }),
        }
    }

    // --- accessors ---

    pub fn space_key(&self) -> SpaceKey {
        self.inner.space
    }

    pub fn state(&self) -> SpaceState {
        *self.inner.state.read()
    }

    pub fn local_identity(&self) -> IdentityKey {
        self.inner.core.read().identity
    }

    pub fn local_device(&self) -> DeviceKey {
        self.inner.core.read().device
    }

    /// The feed this party writes data to.
    pub fn local_feed(&self) -> FeedKey {
        self.inner.core.read().data_feed
    }

    pub fn timeframe(&self) -> Timeframe {
        self.inner.core.read().timeframe.clone()
    }

    pub fn is_member(&self, identity: &IdentityKey) -> bool {
        self.inner.core.read().processor.graph().is_member(identity)
    }

    pub fn is_feed_admissible(&self, feed: &FeedKey) -> bool {
        self.inner
            .core
            .read()
            .processor
            .graph()
            .is_feed_admissible(feed)
    }

    pub fn member_count(&self) -> usize {
        self.inner.core.read().processor.graph().member_count()
    }

    /// Observe lifecycle shutdown; flips to `true` when the space closes.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }

    /// Ticks whenever the local timeframe advances.
    pub fn timeframe_changed(&self) -> watch::Receiver<u64> {
        self.inner.changed.subscribe()
    }

    fn note_advance(&self) {
        self.inner.changed.send_modify(|v| *v += 1);
    }

    // --- lifecycle ---

    /// Idempotent; a space is opened by construction.
    pub fn open(&self) -> SpaceState {
        self.state()
    }

    /// Close the space: stop sessions, flush feeds, release handles.
    /// Idempotent; in-flight applies finish under the lock first.
    pub fn close(&self) {
        {
            let mut state = self.inner.state.write();
            if matches!(*state, SpaceState::Closing | SpaceState::Closed) {
                return;
            }
            *state = SpaceState::Closing;
        }
        // send_replace records the flag even with no session subscribed.
        self.inner.shutdown.send_replace(true);
        {
            // Taking the write lock waits out any in-flight apply.
            let mut core = self.inner.core.write();
            for entry in core.feeds.values_mut() {
                entry.feed.close();
            }
        }
        *self.inner.state.write() = SpaceState::Closed;
        tracing::info!(space = %self.inner.space, "space closed");
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state(), SpaceState::Closing | SpaceState::Closed)
    }

    /// Sessions call this when streaming starts for a joining space.
    pub fn mark_syncing(&self) {
        let mut state = self.inner.state.write();
        if *state == SpaceState::Joining {
            *state = SpaceState::Syncing;
        }
    }

    fn set_state(&self, next: SpaceState) {
        *self.inner.state.write() = next;
    }

    /// `Joining`/`Syncing` end once our own identity is admitted.
    fn maybe_ready(&self, core: &SpaceCore) {
        let mut state = self.inner.state.write();
        if matches!(*state, SpaceState::Joining | SpaceState::Syncing)
            && core.processor.graph().is_member(&core.identity)
        {
            *state = SpaceState::Ready;
            tracing::info!(space = %self.inner.space, "space ready");
        }
    }

    // --- local writes ---

    /// Append a data mutation to the local data feed.
    pub fn append_data(&self, payload: Bytes) -> WeftResult<Message> {
        if self.is_closed() {
            return Err(WeftError::SpaceClosed);
        }
        let mut core = self.inner.core.write();
        let data_feed = core.data_feed;
        let entry = core
            .feeds
            .get_mut(&data_feed)
            .ok_or(WeftError::NotWritable(data_feed))?;
        let message = entry.feed.append(Payload::Data(payload))?;
        core.timeframe.advance(data_feed, message.seq);
        self.deliver_pending(&mut core);
        drop(core);
        self.note_advance();
        Ok(message)
    }

    /// Append a credential to the local write feed and process it.
    pub fn append_credential(&self, credential: Credential) -> WeftResult<Message> {
        if self.state() == SpaceState::Closed {
            return Err(WeftError::SpaceClosed);
        }
        let mut core = self.inner.core.write();
        // Process before writing: a credential the local graph rejects
        // carries no authority and never reaches the log.
        if self.ingest_credential(&mut core, &credential) == ProcessOutcome::Rejected {
            return Err(WeftError::UnauthorizedCredential {
                issuer: credential.issuer,
            });
        }
        let write_feed = core.write_feed;
        let entry = core
            .feeds
            .get_mut(&write_feed)
            .ok_or(WeftError::NotWritable(write_feed))?;
        let message = entry.feed.append(Payload::Credential(credential.clone()))?;
        core.timeframe.advance(write_feed, message.seq);
        self.maybe_ready(&core);
        drop(core);
        self.note_advance();
        Ok(message)
    }

    // --- remote ingest ---

    /// Apply a message received from a peer: verify, append, route.
    ///
    /// `SequenceGap` means "buffer and retry later"; `BadSignature`
    /// means "drop, possibly malicious peer". Replays of covered ranges
    /// are acknowledged without effect.
    pub fn apply_remote(&self, message: &Message) -> WeftResult<ApplyOutcome> {
        if self.is_closed() {
            return Err(WeftError::SpaceClosed);
        }
        let mut core = self.inner.core.write();
        if core.timeframe.covers(&message.feed, message.seq) {
            return Ok(ApplyOutcome::AlreadyKnown);
        }

        let storage = Arc::clone(&self.inner.storage);
        let entry = match core.feeds.entry(message.feed) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(v) => {
                tracing::debug!(feed = %message.feed, "discovered feed");
                v.insert(FeedEntry {
                    feed: Feed::open(message.feed, None, storage)?,
                    delivered: 0,
                })
            }
        };

        entry.feed.verify_and_append(message)?;
        core.timeframe.advance(message.feed, message.seq);

        match &message.payload {
            Payload::Credential(credential) => {
                self.ingest_credential(&mut core, credential);
            }
            Payload::Data(_) => {
                self.deliver_pending(&mut core);
            }
        }
        self.maybe_ready(&core);
        drop(core);
        self.note_advance();
        Ok(ApplyOutcome::Applied)
    }

    fn ingest_credential(&self, core: &mut SpaceCore, credential: &Credential) -> ProcessOutcome {
        if !verify_credential(credential) {
            tracing::warn!(issuer = %credential.issuer, "credential proof invalid");
            self.emit(SpaceEvent::CredentialIgnored {
                reason: IgnoreReason::Malformed,
            });
            return ProcessOutcome::Ignored(IgnoreReason::Malformed);
        }
        let outcome = core.processor.process(credential);
        tracing::debug!(issuer = %credential.issuer, ?outcome, "credential processed");
        for event in core.processor.take_events() {
            self.emit(event);
        }
        if outcome == ProcessOutcome::Applied {
            self.deliver_pending(core);
        }
        outcome
    }

    /// Hand admitted data messages to the consumer, per feed, in seq
    /// order, exactly once. Credentials advance the watermark silently
    /// (they were processed on arrival).
    fn deliver_pending(&self, core: &mut SpaceCore) {
        let space = self.inner.space;
        let graph_feeds: Vec<FeedKey> = core
            .feeds
            .keys()
            .filter(|feed| core.processor.graph().is_feed_admissible(feed))
            .copied()
            .collect();
        for feed_key in graph_feeds {
            let Some(entry) = core.feeds.get_mut(&feed_key) else {
                continue;
            };
            while entry.delivered < entry.feed.length() {
                let seq = entry.delivered;
                let message = match entry.feed.read_from(seq).next() {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => {
                        tracing::warn!(feed = %feed_key, seq, error = %e, "read failed during delivery");
                        break;
                    }
                    None => break,
                };
                if let Payload::Data(data) = &message.payload {
                    if let Some(consumer) = &self.inner.consumer {
                        consumer.on_data_mutation(space, feed_key, seq, data);
                    }
                }
                entry.delivered += 1;
            }
        }
    }

    fn emit(&self, event: SpaceEvent) {
        tracing::debug!(?event, "space event");
        if let Some(tx) = &self.inner.events {
            let _ = tx.send(event);
        }
    }

    /// Emit a session-scoped event (used by replication sessions).
    pub fn emit_session_closed(&self, reason: impl Into<String>) {
        self.emit(SpaceEvent::SessionClosed {
            reason: reason.into(),
        });
    }

    // --- replication support ---

    /// Stored messages of one feed, ascending from `from`, bounded.
    pub fn messages_from(&self, feed: &FeedKey, from: u64, max: usize) -> Vec<Message> {
        let core = self.inner.core.read();
        let Some(entry) = core.feeds.get(feed) else {
            return Vec::new();
        };
        entry
            .feed
            .read_from(from)
            .take(max)
            .filter_map(|result| match result {
                Ok(message) => Some(message),
                Err(e) => {
                    tracing::warn!(feed = %feed, error = %e, "read failed");
                    None
                }
            })
            .collect()
    }

    // --- invitations ---

    /// Issue a single-use invitation for this space.
    pub fn issue_invitation(&self) -> WeftResult<Invitation> {
        if self.state() != SpaceState::Ready {
            return Err(WeftError::SpaceClosed);
        }
        let secret = generate_secret();
        self.inner.core.write().invitations.register(&secret);
        Ok(Invitation {
            swarm_key: self.inner.space,
            secret,
        })
    }

    /// Inviter side of invitation acceptance: consume the secret and
    /// admit the guest's identity and feed over our write feed. The
    /// guest's device admission is its own, carried on its feed.
    pub fn redeem_invitation(&self, auth: &InvitationAuth) -> WeftResult<()> {
        if self.is_closed() {
            return Err(WeftError::SpaceClosed);
        }
        {
            let mut core = self.inner.core.write();
            core.invitations.redeem(&auth.secret)?;
        }
        let (identity, identity_kp) = {
            let core = self.inner.core.read();
            let kp = core
                .keyring
                .keypair(core.identity.as_bytes())
                .ok_or(WeftError::NotWritable(core.write_feed))?
                .clone();
            (core.identity, kp)
        };
        self.append_credential(issue_credential(
            &identity_kp,
            identity,
            auth.identity,
            Assertion::SpaceMember { feed_scope: vec![] },
        ))?;
        self.append_credential(issue_credential(
            &identity_kp,
            identity,
            auth.feed,
            Assertion::FeedAdmit {
                member: auth.identity,
            },
        ))?;
        tracing::info!(guest = %auth.identity, "invitation redeemed");
        Ok(())
    }

    /// Revoke a member. Forward-only: nothing already delivered is
    /// withdrawn, but the member's feeds stop being admissible.
    pub fn revoke_member(&self, member: &IdentityKey) -> WeftResult<Message> {
        let (identity, identity_kp) = {
            let core = self.inner.core.read();
            let kp = core
                .keyring
                .keypair(core.identity.as_bytes())
                .ok_or(WeftError::NotWritable(core.write_feed))?
                .clone();
            (core.identity, kp)
        };
        self.append_credential(issue_credential(
            &identity_kp,
            identity,
            *member,
            Assertion::SpaceMemberRevoke,
        ))
    }

    /// Responder-side handshake gate.
    pub fn authorize_handshake(
        &self,
        space: SpaceKey,
        auth: Option<&InvitationAuth>,
    ) -> WeftResult<()> {
        if space != self.inner.space {
            return Err(WeftError::SpaceMismatch {
                expected: self.inner.space,
                got: space,
            });
        }
        if self.is_closed() {
            return Err(WeftError::SpaceClosed);
        }
        if let Some(auth) = auth {
            self.redeem_invitation(auth)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for SpaceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpaceController")
            .field("space", &self.inner.space)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CollectingConsumer;

    fn genesis_with_consumer() -> (SpaceController, Arc<CollectingConsumer>) {
        let consumer = Arc::new(CollectingConsumer::new());
        let controller = SpaceController::genesis(
            Keyring::new(),
            SpaceConfig {
                consumer: Some(consumer.clone() as Arc<dyn DataConsumer>),
                ..SpaceConfig::default()
            },
        )
        .unwrap();
        (controller, consumer)
    }

    /// Push every message A has that B lacks, in feed order.
    fn replicate(from: &SpaceController, to: &SpaceController) {
        let want = from.timeframe();
        let have = to.timeframe();
        for range in Timeframe::diff(&have, &want) {
            for message in from.messages_from(&range.feed, range.from, usize::MAX) {
                to.apply_remote(&message).unwrap();
            }
        }
    }

    #[test]
    fn test_genesis_is_ready_and_self_admitted() {
        let (a, _) = genesis_with_consumer();
        assert_eq!(a.state(), SpaceState::Ready);
        assert!(a.is_member(&a.local_identity()));
        assert!(a.is_feed_admissible(&a.local_feed()));
        assert_eq!(a.member_count(), 1);
    }

    #[test]
    fn test_local_data_delivered_in_order() {
        let (a, consumer) = genesis_with_consumer();
        for payload in [b"one" as &[u8], b"two", b"three"] {
            a.append_data(Bytes::copy_from_slice(payload)).unwrap();
        }
        let payloads = consumer.payloads_for(&a.local_feed());
        assert_eq!(payloads, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two"), Bytes::from_static(b"three")]);
    }

    #[test]
    fn test_invitation_flow_admits_guest() {
        let (a, _) = genesis_with_consumer();
        let invitation = a.issue_invitation().unwrap();

        let b_consumer = Arc::new(CollectingConsumer::new());
        let b = SpaceController::join(
            invitation.swarm_key,
            Keyring::new(),
            SpaceConfig {
                consumer: Some(b_consumer.clone() as Arc<dyn DataConsumer>),
                ..SpaceConfig::default()
            },
        )
        .unwrap();
        assert_eq!(b.state(), SpaceState::Joining);

        // A appends data before B joins.
        for payload in [b"m0" as &[u8], b"m1", b"m2"] {
            a.append_data(Bytes::copy_from_slice(payload)).unwrap();
        }

        // Handshake: A redeems B's invitation auth.
        a.redeem_invitation(&InvitationAuth {
            secret: invitation.secret,
            identity: b.local_identity(),
            device: b.local_device(),
            feed: b.local_feed(),
        })
        .unwrap();
        assert!(a.is_member(&b.local_identity()));

        // Replicate both ways.
        replicate(&a, &b);
        replicate(&b, &a);

        assert_eq!(b.state(), SpaceState::Ready);
        assert!(b.is_member(&a.local_identity()));
        assert!(b.is_member(&b.local_identity()));
        // B received A's three payloads, in order.
        let a_data_feed = a.local_feed();
        assert_eq!(b.timeframe().get(&a_data_feed), 3);
        assert_eq!(
            b_consumer.payloads_for(&a_data_feed),
            vec![
                Bytes::from_static(b"m0"),
                Bytes::from_static(b"m1"),
                Bytes::from_static(b"m2")
            ]
        );
    }

    #[test]
    fn test_idempotent_replay() {
        let (a, _) = genesis_with_consumer();
        a.append_data(Bytes::from_static(b"x")).unwrap();

        let b_consumer = Arc::new(CollectingConsumer::new());
        let b = SpaceController::join(
            a.space_key(),
            Keyring::new(),
            SpaceConfig {
                consumer: Some(b_consumer.clone() as Arc<dyn DataConsumer>),
                ..SpaceConfig::default()
            },
        )
        .unwrap();
        let invitation = a.issue_invitation().unwrap();
        a.redeem_invitation(&InvitationAuth {
            secret: invitation.secret,
            identity: b.local_identity(),
            device: b.local_device(),
            feed: b.local_feed(),
        })
        .unwrap();

        replicate(&a, &b);
        let delivered = b_consumer.len();
        let timeframe = b.timeframe();

        // Replaying the full history changes nothing.
        let full = a.timeframe();
        for feed in full.feeds() {
            for message in a.messages_from(feed, 0, usize::MAX) {
                assert_eq!(b.apply_remote(&message).unwrap(), ApplyOutcome::AlreadyKnown);
            }
        }
        assert_eq!(b_consumer.len(), delivered);
        assert_eq!(b.timeframe(), timeframe);
    }

    #[test]
    fn test_revoked_member_data_not_delivered() {
        let (a, a_consumer) = genesis_with_consumer();
        let invitation = a.issue_invitation().unwrap();
        let b = SpaceController::join(a.space_key(), Keyring::new(), SpaceConfig::default())
            .unwrap();
        a.redeem_invitation(&InvitationAuth {
            secret: invitation.secret,
            identity: b.local_identity(),
            device: b.local_device(),
            feed: b.local_feed(),
        })
        .unwrap();
        replicate(&a, &b);
        replicate(&b, &a);

        // B writes one message before revocation; it lands on A.
        b.append_data(Bytes::from_static(b"before")).unwrap();
        replicate(&b, &a);
        assert_eq!(a_consumer.payloads_for(&b.local_feed()).len(), 1);

        // A revokes B.
        a.revoke_member(&b.local_identity()).unwrap();
        assert!(!a.is_member(&b.local_identity()));

        // B appends after revocation; A stores but never delivers it.
        b.append_data(Bytes::from_static(b"after")).unwrap();
        replicate(&b, &a);
        assert_eq!(a_consumer.payloads_for(&b.local_feed()).len(), 1);
        assert!(!a.is_feed_admissible(&b.local_feed()));
    }

    #[test]
    fn test_revoked_member_credentials_unauthorized() {
        let (a, _) = genesis_with_consumer();
        let invitation = a.issue_invitation().unwrap();
        let b = SpaceController::join(a.space_key(), Keyring::new(), SpaceConfig::default())
            .unwrap();
        a.redeem_invitation(&InvitationAuth {
            secret: invitation.secret,
            identity: b.local_identity(),
            device: b.local_device(),
            feed: b.local_feed(),
        })
        .unwrap();
        replicate(&a, &b);
        replicate(&b, &a);

        a.revoke_member(&b.local_identity()).unwrap();
        replicate(&a, &b);

        // B knows it is revoked; anything it issues carries no
        // authority and never reaches its log.
        let before = b.timeframe().get(&b.local_feed());
        assert!(matches!(
            b.revoke_member(&a.local_identity()),
            Err(WeftError::UnauthorizedCredential { .. })
        ));
        assert_eq!(b.timeframe().get(&b.local_feed()), before);
    }

    #[test]
    fn test_invitation_replay_rejected() {
        let (a, _) = genesis_with_consumer();
        let invitation = a.issue_invitation().unwrap();
        let auth = InvitationAuth {
            secret: invitation.secret,
            identity: IdentityKey::new([1; 32]),
            device: DeviceKey::new([2; 32]),
            feed: FeedKey::new([3; 32]),
        };
        // First redemption consumes the proof-less guest keys fine at
        // the registry level (credential issue is A's own).
        a.redeem_invitation(&auth).unwrap();
        assert!(matches!(
            a.redeem_invitation(&auth),
            Err(WeftError::InvitationReplayed)
        ));
    }

    #[test]
    fn test_close_idempotent_and_rejects_writes() {
        let (a, _) = genesis_with_consumer();
        a.close();
        a.close();
        assert_eq!(a.state(), SpaceState::Closed);
        assert!(matches!(
            a.append_data(Bytes::from_static(b"x")),
            Err(WeftError::SpaceClosed)
        ));
        assert!(*a.shutdown_signal().borrow());
    }

    #[test]
    fn test_handshake_space_mismatch() {
        let (a, _) = genesis_with_consumer();
        let err = a
            .authorize_handshake(SpaceKey::new([9; 32]), None)
            .unwrap_err();
        assert!(matches!(err, WeftError::SpaceMismatch { .. }));
    }
}
