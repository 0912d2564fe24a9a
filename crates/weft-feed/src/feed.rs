//! The feed state machine

use std::sync::Arc;

use weft_core::{FeedKey, Message, Payload, WeftError, WeftResult};
use weft_crypto::{verify, Keypair};

use crate::FeedStorage;

/// A single-writer append-only signed log.
///
/// Holding the feed's [`Keypair`] makes it writable; without it the feed
/// only accepts replicated messages through [`Feed::verify_and_append`].
pub struct Feed {
    key: FeedKey,
    keypair: Option<Keypair>,
    storage: Arc<dyn FeedStorage>,
    length: u64,
    open: bool,
}

impl Feed {
    /// Open a feed, recovering its length from storage.
    pub fn open(
        key: FeedKey,
        keypair: Option<Keypair>,
        storage: Arc<dyn FeedStorage>,
    ) -> WeftResult<Self> {
        let length = storage.feed_length(&key)?;
        Ok(Feed {
            key,
            keypair,
            storage,
            length,
            open: true,
        })
    }

    #[inline]
    pub fn key(&self) -> FeedKey {
        self.key
    }

    /// Number of messages in the feed; also the next sequence number.
    #[inline]
    pub fn length(&self) -> u64 {
        self.length
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        self.keypair.is_some()
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Close the feed. Further appends fail with `FeedClosed`; reads of
    /// already stored messages keep working.
    pub fn close(&mut self) {
        self.open = false;
    }

    /// Append a locally authored payload.
    ///
    /// Atomic: the message is durably recorded and the length advances,
    /// or neither happens.
    pub fn append(&mut self, payload: Payload) -> WeftResult<Message> {
        if !self.open {
            return Err(WeftError::FeedClosed(self.key));
        }
        let keypair = self
            .keypair
            .as_ref()
            .ok_or(WeftError::NotWritable(self.key))?;

        let seq = self.length;
        let signature = keypair.sign(&Message::signable_bytes(&self.key, seq, &payload));
        let message = Message {
            feed: self.key,
            seq,
            payload,
            signature,
        };

        self.storage.append_block(&self.key, seq, &message.encode())?;
        self.length += 1;
        Ok(message)
    }

    /// Append a message received from a remote peer.
    ///
    /// Checks, in order: sequence exactness (`SequenceGap` - the caller
    /// buffers and retries), then signature validity (`BadSignature` -
    /// the caller drops and may penalize the peer), then persists.
    pub fn verify_and_append(&mut self, message: &Message) -> WeftResult<()> {
        if !self.open {
            return Err(WeftError::FeedClosed(self.key));
        }
        if message.feed != self.key {
            return Err(WeftError::BadSignature {
                feed: message.feed,
                seq: message.seq,
            });
        }
        if message.seq != self.length {
            return Err(WeftError::SequenceGap {
                feed: self.key,
                expected: self.length,
                got: message.seq,
            });
        }

        let signable = Message::signable_bytes(&self.key, message.seq, &message.payload);
        if !verify(self.key.as_bytes(), &signable, &message.signature) {
            tracing::warn!(feed = %self.key, seq = message.seq, "bad signature");
            return Err(WeftError::BadSignature {
                feed: self.key,
                seq: message.seq,
            });
        }

        self.storage
            .append_block(&self.key, message.seq, &message.encode())?;
        self.length += 1;
        Ok(())
    }

    /// Lazily read stored messages starting at `seq`. Never skips or
    /// reorders; re-reading a range yields the same messages.
    pub fn read_from(&self, seq: u64) -> FeedIter {
        FeedIter {
            key: self.key,
            storage: Arc::clone(&self.storage),
            next: seq,
        }
    }
}

impl std::fmt::Debug for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed")
            .field("key", &self.key)
            .field("length", &self.length)
            .field("writable", &self.is_writable())
            .field("open", &self.open)
            .finish()
    }
}

/// Iterator over stored feed messages.
pub struct FeedIter {
    key: FeedKey,
    storage: Arc<dyn FeedStorage>,
    next: u64,
}

impl Iterator for FeedIter {
    type Item = WeftResult<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        let block = match self.storage.read_block(&self.key, self.next) {
            Ok(Some(block)) => block,
            Ok(None) => return None,
            Err(e) => return Some(Err(e)),
        };
        self.next += 1;
        match Message::decode(&block) {
            Ok((message, _)) => Some(Ok(message)),
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryFeedStorage;
    use bytes::Bytes;

    fn writable_feed() -> (Feed, Keypair) {
        let keypair = Keypair::generate();
        let feed = Feed::open(
            keypair.as_feed_key(),
            Some(keypair.clone()),
            MemoryFeedStorage::shared(),
        )
        .unwrap();
        (feed, keypair)
    }

    fn data(bytes: &'static [u8]) -> Payload {
        Payload::Data(Bytes::from_static(bytes))
    }

    #[test]
    fn test_append_assigns_sequential_seqs() {
        let (mut feed, _) = writable_feed();
        let m0 = feed.append(data(b"a")).unwrap();
        let m1 = feed.append(data(b"b")).unwrap();
        assert_eq!(m0.seq, 0);
        assert_eq!(m1.seq, 1);
        assert_eq!(feed.length(), 2);
    }

    #[test]
    fn test_append_without_key_not_writable() {
        let keypair = Keypair::generate();
        let mut feed = Feed::open(keypair.as_feed_key(), None, MemoryFeedStorage::shared()).unwrap();
        assert!(matches!(
            feed.append(data(b"a")),
            Err(WeftError::NotWritable(_))
        ));
    }

    #[test]
    fn test_verify_and_append_accepts_valid() {
        let (mut source, keypair) = writable_feed();
        let m0 = source.append(data(b"a")).unwrap();
        let m1 = source.append(data(b"b")).unwrap();

        let mut replica =
            Feed::open(keypair.as_feed_key(), None, MemoryFeedStorage::shared()).unwrap();
        replica.verify_and_append(&m0).unwrap();
        replica.verify_and_append(&m1).unwrap();
        assert_eq!(replica.length(), 2);
    }

    #[test]
    fn test_verify_and_append_rejects_gap_before_signature() {
        let (mut source, keypair) = writable_feed();
        source.append(data(b"a")).unwrap();
        let m1 = source.append(data(b"b")).unwrap();

        let mut replica =
            Feed::open(keypair.as_feed_key(), None, MemoryFeedStorage::shared()).unwrap();
        // m1 has a valid signature but seq 1 != expected 0.
        assert!(matches!(
            replica.verify_and_append(&m1),
            Err(WeftError::SequenceGap {
                expected: 0,
                got: 1,
                ..
            })
        ));
        assert_eq!(replica.length(), 0);
    }

    #[test]
    fn test_verify_and_append_rejects_bad_signature() {
        let (mut source, keypair) = writable_feed();
        let mut m0 = source.append(data(b"a")).unwrap();
        m0.signature[0] ^= 0xFF;

        let mut replica =
            Feed::open(keypair.as_feed_key(), None, MemoryFeedStorage::shared()).unwrap();
        assert!(matches!(
            replica.verify_and_append(&m0),
            Err(WeftError::BadSignature { .. })
        ));
        assert_eq!(replica.length(), 0);
    }

    #[test]
    fn test_verify_and_append_rejects_forged_payload() {
        let (mut source, keypair) = writable_feed();
        let mut m0 = source.append(data(b"a")).unwrap();
        m0.payload = data(b"tampered");

        let mut replica =
            Feed::open(keypair.as_feed_key(), None, MemoryFeedStorage::shared()).unwrap();
        assert!(matches!(
            replica.verify_and_append(&m0),
            Err(WeftError::BadSignature { .. })
        ));
    }

    #[test]
    fn test_read_from_is_deterministic() {
        let (mut feed, _) = writable_feed();
        for payload in [b"a" as &[u8], b"b", b"c"] {
            feed.append(Payload::Data(Bytes::copy_from_slice(payload)))
                .unwrap();
        }

        let first: Vec<Message> = feed.read_from(1).map(|r| r.unwrap()).collect();
        let second: Vec<Message> = feed.read_from(1).map(|r| r.unwrap()).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].seq, 1);
    }

    #[test]
    fn test_closed_feed_rejects_appends() {
        let (mut feed, _) = writable_feed();
        feed.append(data(b"a")).unwrap();
        feed.close();
        assert!(matches!(
            feed.append(data(b"b")),
            Err(WeftError::FeedClosed(_))
        ));
        // Reads still work.
        assert_eq!(feed.read_from(0).count(), 1);
    }

    #[test]
    fn test_reopen_recovers_length() {
        let keypair = Keypair::generate();
        let storage = MemoryFeedStorage::shared();
        {
            let mut feed = Feed::open(
                keypair.as_feed_key(),
                Some(keypair.clone()),
                Arc::clone(&storage) as Arc<dyn FeedStorage>,
            )
            .unwrap();
            feed.append(data(b"a")).unwrap();
            feed.append(data(b"b")).unwrap();
        }
        let feed = Feed::open(keypair.as_feed_key(), None, storage).unwrap();
        assert_eq!(feed.length(), 2);
    }
}
