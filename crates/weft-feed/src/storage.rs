//! Feed block storage
//!
//! The storage seam to the (excluded) persistence layer. Implementations
//! must be durable before `append_block` returns; a feed's in-memory
//! length only advances after that acknowledgement.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use weft_core::{FeedKey, WeftError, WeftResult};

/// Block store for feed messages, keyed by `(feed, seq)`.
pub trait FeedStorage: Send + Sync {
    /// Persist `bytes` as the block at `seq`. Must reject non-contiguous
    /// sequence numbers and must not return before the block is durable.
    fn append_block(&self, feed: &FeedKey, seq: u64, bytes: &[u8]) -> WeftResult<()>;

    /// Read the block at `seq`, or `None` past the end of the feed.
    fn read_block(&self, feed: &FeedKey, seq: u64) -> WeftResult<Option<Vec<u8>>>;

    /// Number of blocks stored for a feed.
    fn feed_length(&self, feed: &FeedKey) -> WeftResult<u64>;
}

/// In-memory storage, used by tests and as the default backend.
#[derive(Default)]
pub struct MemoryFeedStorage {
    blocks: RwLock<HashMap<FeedKey, Vec<Vec<u8>>>>,
}

impl MemoryFeedStorage {
    pub fn new() -> Self {
        MemoryFeedStorage::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(MemoryFeedStorage::new())
    }
}

impl FeedStorage for MemoryFeedStorage {
    fn append_block(&self, feed: &FeedKey, seq: u64, bytes: &[u8]) -> WeftResult<()> {
        let mut blocks = self.blocks.write();
        let log = blocks.entry(*feed).or_default();
        if seq != log.len() as u64 {
            return Err(WeftError::Storage(format!(
                "non-contiguous append: feed {feed:?} len {} seq {seq}",
                log.len()
            )));
        }
        log.push(bytes.to_vec());
        Ok(())
    }

    fn read_block(&self, feed: &FeedKey, seq: u64) -> WeftResult<Option<Vec<u8>>> {
        let blocks = self.blocks.read();
        Ok(blocks
            .get(feed)
            .and_then(|log| log.get(seq as usize))
            .cloned())
    }

    fn feed_length(&self, feed: &FeedKey) -> WeftResult<u64> {
        let blocks = self.blocks.read();
        Ok(blocks.get(feed).map(|log| log.len() as u64).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_contiguous() {
        let storage = MemoryFeedStorage::new();
        let feed = FeedKey::new([1; 32]);

        storage.append_block(&feed, 0, b"a").unwrap();
        storage.append_block(&feed, 1, b"b").unwrap();
        assert!(storage.append_block(&feed, 3, b"d").is_err());
        assert!(storage.append_block(&feed, 1, b"b2").is_err());

        assert_eq!(storage.feed_length(&feed).unwrap(), 2);
        assert_eq!(storage.read_block(&feed, 0).unwrap(), Some(b"a".to_vec()));
        assert_eq!(storage.read_block(&feed, 2).unwrap(), None);
    }

    #[test]
    fn test_unknown_feed_is_empty() {
        let storage = MemoryFeedStorage::new();
        let feed = FeedKey::new([9; 32]);
        assert_eq!(storage.feed_length(&feed).unwrap(), 0);
        assert_eq!(storage.read_block(&feed, 0).unwrap(), None);
    }
}
