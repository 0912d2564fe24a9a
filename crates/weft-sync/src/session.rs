//! Pairwise replication sessions

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use weft_core::{FeedKey, Message, SpaceKey, Timeframe, WeftError, WeftResult};
use weft_space::SpaceController;
use weft_wire::{Frame, FrameBody, InvitationAuth};

use crate::FrameStream;

/// Tuning knobs for a replication session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Messages per `MessageBatch` frame.
    pub max_batch_messages: usize,
    /// Sent-but-unacknowledged cap per feed; acks are implicit in the
    /// peer's timeframe exchanges.
    pub max_inflight_per_feed: usize,
    /// Out-of-order messages buffered per feed before dropping.
    pub reorder_capacity: usize,
    /// Bad signatures tolerated before the peer is disconnected.
    pub max_bad_signatures: u32,
    pub handshake_timeout: Duration,
    /// Cadence of unsolicited timeframe announcements.
    pub timeframe_refresh: Duration,
    /// Idle-read bound; a silent peer past this is presumed gone.
    pub stream_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_batch_messages: 32,
            max_inflight_per_feed: 64,
            reorder_capacity: 256,
            max_bad_signatures: 3,
            handshake_timeout: Duration::from_secs(10),
            timeframe_refresh: Duration::from_secs(2),
            stream_timeout: Duration::from_secs(30),
        }
    }
}

enum Tick {
    Shutdown,
    Refresh,
    Frame(WeftResult<Frame>),
}

/// One established session with one peer.
///
/// Symmetric after the handshake: both sides announce timeframes and
/// stream the ranges the peer is missing. The session never holds the
/// controller's lock across I/O; every controller call is synchronous.
pub struct ReplicationSession<T> {
    stream: FrameStream<T>,
    controller: SpaceController,
    config: SessionConfig,
    space: SpaceKey,
    /// Peer coverage: its last announced timeframe, advanced further by
    /// every message it sends us (a peer has what it sends).
    remote: Timeframe,
    /// High-water mark of what we have pushed, per feed.
    sent: Timeframe,
    /// No pushing until the peer has announced once; its timeframe is
    /// what scopes the send window.
    remote_seen: bool,
    reorder: HashMap<FeedKey, BTreeMap<u64, Message>>,
    bad_signatures: u32,
}

impl<T: AsyncRead + AsyncWrite + Unpin> ReplicationSession<T> {
    /// Open a session as the connecting side. `auth` carries invitation
    /// credentials when we are not yet in the peer's trust graph.
    pub async fn initiate(
        io: T,
        controller: SpaceController,
        auth: Option<InvitationAuth>,
        config: SessionConfig,
    ) -> WeftResult<Self> {
        let space = controller.space_key();
        let mut stream = FrameStream::new(io);
        stream
            .write_frame(&Frame::new(space, FrameBody::Handshake { auth }))
            .await?;
        let frame = tokio::time::timeout(config.handshake_timeout, stream.read_frame())
            .await
            .map_err(|_| WeftError::HandshakeTimeout)??;
        if frame.space != space {
            return Err(WeftError::SpaceMismatch {
                expected: space,
                got: frame.space,
            });
        }
        match frame.body {
            FrameBody::HandshakeAck { accepted: true, .. } => {
                tracing::debug!(space = %space, "handshake accepted");
                Ok(Self::established(stream, controller, config))
            }
            FrameBody::HandshakeAck {
                accepted: false,
                reason,
            } => Err(WeftError::HandshakeRejected(reason)),
            _ => Err(WeftError::HandshakeRejected(
                "expected handshake ack".into(),
            )),
        }
    }

    /// Open a session as the accepting side: authenticate the peer's
    /// handshake against the controller, redeeming its invitation when
    /// one is presented.
    pub async fn respond(
        io: T,
        controller: SpaceController,
        config: SessionConfig,
    ) -> WeftResult<Self> {
        let space = controller.space_key();
        let mut stream = FrameStream::new(io);
        let frame = tokio::time::timeout(config.handshake_timeout, stream.read_frame())
            .await
            .map_err(|_| WeftError::HandshakeTimeout)??;
        let FrameBody::Handshake { auth } = frame.body else {
            let reject = Frame::new(
                space,
                FrameBody::HandshakeAck {
                    accepted: false,
                    reason: "expected handshake".into(),
                },
            );
            let _ = stream.write_frame(&reject).await;
            return Err(WeftError::HandshakeRejected("expected handshake".into()));
        };
        match controller.authorize_handshake(frame.space, auth.as_ref()) {
            Ok(()) => {
                stream
                    .write_frame(&Frame::new(
                        space,
                        FrameBody::HandshakeAck {
                            accepted: true,
                            reason: String::new(),
                        },
                    ))
                    .await?;
                tracing::debug!(space = %space, invited = auth.is_some(), "handshake accepted");
                Ok(Self::established(stream, controller, config))
            }
            Err(e) => {
                let reject = Frame::new(
                    space,
                    FrameBody::HandshakeAck {
                        accepted: false,
                        reason: e.to_string(),
                    },
                );
                let _ = stream.write_frame(&reject).await;
                Err(e)
            }
        }
    }

    fn established(stream: FrameStream<T>, controller: SpaceController, config: SessionConfig) -> Self {
        let space = controller.space_key();
        ReplicationSession {
            stream,
            controller,
            config,
            space,
            remote: Timeframe::new(),
            sent: Timeframe::new(),
            remote_seen: false,
            reorder: HashMap::new(),
            bad_signatures: 0,
        }
    }

    /// Drive the session until the peer closes, the space closes, or a
    /// protocol error ends it. Always sends a `Close` frame and emits a
    /// `SessionClosed` event on the way out.
    pub async fn run(&mut self) -> WeftResult<()> {
        self.controller.mark_syncing();
        let result = self.stream_loop().await;
        let reason = match &result {
            Ok(reason) => reason.clone(),
            Err(e) => e.to_string(),
        };
        let close = Frame::new(
            self.space,
            FrameBody::Close {
                reason: reason.clone(),
            },
        );
        let _ = self.stream.write_frame(&close).await;
        self.controller.emit_session_closed(reason.as_str());
        tracing::info!(space = %self.space, reason, "session ended");
        result.map(|_| ())
    }

    async fn stream_loop(&mut self) -> WeftResult<String> {
        let mut shutdown = self.controller.shutdown_signal();
        let mut advanced = self.controller.timeframe_changed();
        let mut refresh = tokio::time::interval(self.config.timeframe_refresh);
        let mut last_frame = tokio::time::Instant::now();
        loop {
            let tick = tokio::select! {
                _ = shutdown.changed() => Tick::Shutdown,
                _ = advanced.changed() => Tick::Refresh,
                _ = refresh.tick() => Tick::Refresh,
                result = tokio::time::timeout(
                    self.config.stream_timeout,
                    self.stream.read_frame(),
                ) => Tick::Frame(
                    result.map_err(|_| WeftError::StreamTimeout).and_then(|r| r),
                ),
            };
            match tick {
                Tick::Shutdown => return Ok("space closed".into()),
                Tick::Refresh => {
                    // A peer that announces nothing for a whole idle
                    // window is presumed gone even if its socket lives.
                    if last_frame.elapsed() >= self.config.stream_timeout {
                        return Err(WeftError::StreamTimeout);
                    }
                    self.announce().await?;
                    self.push_batches().await?;
                }
                Tick::Frame(result) => {
                    last_frame = tokio::time::Instant::now();
                    if !self.handle_frame(result?).await? {
                        return Ok("peer closed".into());
                    }
                }
            }
        }
    }

    async fn announce(&mut self) -> WeftResult<()> {
        let frame = Frame::new(
            self.space,
            FrameBody::TimeframeExchange {
                timeframe: self.controller.timeframe(),
            },
        );
        self.stream.write_frame(&frame).await
    }

    /// Returns `false` when the peer closed the session.
    async fn handle_frame(&mut self, frame: Frame) -> WeftResult<bool> {
        if frame.space != self.space {
            return Err(WeftError::SpaceMismatch {
                expected: self.space,
                got: frame.space,
            });
        }
        match frame.body {
            FrameBody::TimeframeExchange { timeframe } => {
                self.remote_seen = true;
                self.remote = self.remote.merge(&timeframe);
                self.sent = self.sent.merge(&timeframe);
                self.push_batches().await?;
                Ok(true)
            }
            FrameBody::MessageBatch { messages, .. } => {
                for message in messages {
                    self.apply(message)?;
                }
                Ok(true)
            }
            FrameBody::Close { reason } => {
                tracing::info!(space = %self.space, reason, "peer closed session");
                Ok(false)
            }
            FrameBody::Handshake { .. } | FrameBody::HandshakeAck { .. } => Err(
                WeftError::HandshakeRejected("handshake after establishment".into()),
            ),
        }
    }

    fn apply(&mut self, message: Message) -> WeftResult<()> {
        let feed = message.feed;
        let seq = message.seq;
        match self.controller.apply_remote(&message) {
            Ok(_) => {
                self.remote.advance(feed, seq);
                self.drain_reorder(feed)
            }
            Err(WeftError::SequenceGap { expected, got, .. }) => {
                tracing::debug!(feed = %feed, expected, got, "buffering out-of-order message");
                self.buffer_out_of_order(message);
                Ok(())
            }
            Err(WeftError::BadSignature { .. }) => self.note_bad_signature(feed, seq),
            Err(e) => Err(e),
        }
    }

    fn buffer_out_of_order(&mut self, message: Message) {
        let buffer = self.reorder.entry(message.feed).or_default();
        if buffer.len() >= self.config.reorder_capacity {
            tracing::warn!(feed = %message.feed, seq = message.seq, "reorder buffer full, dropping");
            return;
        }
        buffer.insert(message.seq, message);
    }

    /// Re-attempt buffered messages for `feed` after a contiguous apply.
    fn drain_reorder(&mut self, feed: FeedKey) -> WeftResult<()> {
        loop {
            let next = match self.reorder.get(&feed) {
                Some(buffer) => match buffer.iter().next() {
                    Some((&seq, message)) => (seq, message.clone()),
                    None => {
                        self.reorder.remove(&feed);
                        return Ok(());
                    }
                },
                None => return Ok(()),
            };
            let (seq, message) = next;
            match self.controller.apply_remote(&message) {
                Ok(_) => {
                    self.remote.advance(feed, seq);
                    if let Some(buffer) = self.reorder.get_mut(&feed) {
                        buffer.remove(&seq);
                    }
                }
                Err(WeftError::SequenceGap { .. }) => return Ok(()),
                Err(WeftError::BadSignature { .. }) => {
                    if let Some(buffer) = self.reorder.get_mut(&feed) {
                        buffer.remove(&seq);
                    }
                    self.note_bad_signature(feed, seq)?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn note_bad_signature(&mut self, feed: FeedKey, seq: u64) -> WeftResult<()> {
        self.bad_signatures += 1;
        tracing::warn!(
            feed = %feed,
            seq,
            count = self.bad_signatures,
            "bad signature from peer"
        );
        if self.bad_signatures >= self.config.max_bad_signatures {
            Err(WeftError::SessionClosed("too many bad signatures".into()))
        } else {
            Ok(())
        }
    }

    /// Stream the peer everything it is missing, bounded by the per-feed
    /// inflight window and the batch size.
    async fn push_batches(&mut self) -> WeftResult<()> {
        if !self.remote_seen {
            return Ok(());
        }
        let local = self.controller.timeframe();
        for (&feed, &have) in local.iter() {
            let declared = self.remote.get(&feed);
            let mut next = self.sent.get(&feed).max(declared);
            while next < have {
                let inflight = next - declared;
                if inflight >= self.config.max_inflight_per_feed as u64 {
                    break;
                }
                let budget = (self.config.max_inflight_per_feed as u64 - inflight)
                    .min(self.config.max_batch_messages as u64)
                    .min(have - next);
                let messages = self.controller.messages_from(&feed, next, budget as usize);
                if messages.is_empty() {
                    break;
                }
                let count = messages.len() as u64;
                tracing::trace!(feed = %feed, from = next, count, "pushing batch");
                self.stream
                    .write_frame(&Frame::new(
                        self.space,
                        FrameBody::MessageBatch { feed, messages },
                    ))
                    .await?;
                next += count;
            }
            if next > self.sent.get(&feed) {
                self.sent.set(feed, next);
            }
        }
        Ok(())
    }
}
