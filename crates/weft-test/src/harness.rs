//! Peer fixtures and in-process session wiring

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use weft_core::{SpaceEvent, SpaceKey, WeftResult};
use weft_crypto::Keyring;
use weft_space::{CollectingConsumer, DataConsumer, Invitation, SpaceConfig, SpaceController};
use weft_sync::{ReplicationSession, SessionConfig};
use weft_wire::InvitationAuth;

/// One peer under test: a controller plus captured consumer output and
/// space events.
pub struct TestPeer {
    pub controller: SpaceController,
    pub consumer: Arc<CollectingConsumer>,
    pub events: mpsc::UnboundedReceiver<SpaceEvent>,
}

impl TestPeer {
    /// A peer that creates its own space.
    pub fn creator() -> Self {
        let (consumer, events, config) = Self::wiring();
        let controller = match SpaceController::genesis(Keyring::new(), config) {
            Ok(controller) => controller,
            Err(e) => panic!("genesis failed: {e}"),
        };
        TestPeer {
            controller,
            consumer,
            events,
        }
    }

    /// A peer joining an existing space as an invited guest.
    pub fn guest(space: SpaceKey) -> Self {
        let (consumer, events, config) = Self::wiring();
        let controller = match SpaceController::join(space, Keyring::new(), config) {
            Ok(controller) => controller,
            Err(e) => panic!("join failed: {e}"),
        };
        TestPeer {
            controller,
            consumer,
            events,
        }
    }

    fn wiring() -> (
        Arc<CollectingConsumer>,
        mpsc::UnboundedReceiver<SpaceEvent>,
        SpaceConfig,
    ) {
        let consumer = Arc::new(CollectingConsumer::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let config = SpaceConfig {
            consumer: Some(consumer.clone() as Arc<dyn DataConsumer>),
            events: Some(tx),
            ..SpaceConfig::default()
        };
        (consumer, rx, config)
    }

    /// Handshake auth presenting `invitation` with this peer's keys.
    pub fn auth(&self, invitation: &Invitation) -> InvitationAuth {
        InvitationAuth {
            secret: invitation.secret,
            identity: self.controller.local_identity(),
            device: self.controller.local_device(),
            feed: self.controller.local_feed(),
        }
    }

    /// Every event observed so far, in emission order.
    pub fn drain_events(&mut self) -> Vec<SpaceEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// The two session tasks of one live connection.
pub struct SessionPair {
    pub responder: JoinHandle<WeftResult<()>>,
    pub initiator: JoinHandle<WeftResult<()>>,
}

impl SessionPair {
    /// Wait for both sides to finish; session-level errors are the
    /// test's business, teardown races are not.
    pub async fn join(self) {
        let _ = self.responder.await;
        let _ = self.initiator.await;
    }

    pub fn abort(&self) {
        self.responder.abort();
        self.initiator.abort();
    }
}

/// Connect two peers over an in-process duplex pipe. `responder`
/// accepts; `initiator` presents `auth` when joining via invitation.
pub fn connect(
    responder: &TestPeer,
    initiator: &TestPeer,
    auth: Option<InvitationAuth>,
) -> SessionPair {
    let (r_io, i_io) = tokio::io::duplex(64 * 1024);
    let r_controller = responder.controller.clone();
    let i_controller = initiator.controller.clone();
    SessionPair {
        responder: tokio::spawn(async move {
            let mut session =
                ReplicationSession::respond(r_io, r_controller, SessionConfig::default()).await?;
            session.run().await
        }),
        initiator: tokio::spawn(async move {
            let mut session =
                ReplicationSession::initiate(i_io, i_controller, auth, SessionConfig::default())
                    .await?;
            session.run().await
        }),
    }
}

/// Poll `done` until it holds, advancing (virtual) time. Panics if the
/// condition never settles.
pub async fn settle(done: impl Fn() -> bool) {
    for _ in 0..500 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition did not settle");
}
