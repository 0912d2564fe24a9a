//! The data-consumer seam to the external merge layer

use bytes::Bytes;

use weft_core::{FeedKey, SpaceKey};

/// Receives admitted data mutations, exactly once each, in per-feed seq
/// order. Merge semantics belong entirely to the implementor.
pub trait DataConsumer: Send + Sync {
    fn on_data_mutation(&self, space: SpaceKey, feed: FeedKey, seq: u64, payload: &Bytes);
}

/// Consumer that discards everything; the default when a host only cares
/// about credentials.
pub struct NullConsumer;

impl DataConsumer for NullConsumer {
    fn on_data_mutation(&self, _space: SpaceKey, _feed: FeedKey, _seq: u64, _payload: &Bytes) {}
}

/// Collects mutations in arrival order; test helper.
#[derive(Default)]
pub struct CollectingConsumer {
    mutations: parking_lot::Mutex<Vec<(FeedKey, u64, Bytes)>>,
}

impl CollectingConsumer {
    pub fn new() -> Self {
        CollectingConsumer::default()
    }

    pub fn mutations(&self) -> Vec<(FeedKey, u64, Bytes)> {
        self.mutations.lock().clone()
    }

    pub fn payloads_for(&self, feed: &FeedKey) -> Vec<Bytes> {
        self.mutations
            .lock()
            .iter()
            .filter(|(f, _, _)| f == feed)
            .map(|(_, _, p)| p.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.mutations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.lock().is_empty()
    }
}

impl DataConsumer for CollectingConsumer {
    fn on_data_mutation(&self, _space: SpaceKey, feed: FeedKey, seq: u64, payload: &Bytes) {
        self.mutations.lock().push((feed, seq, payload.clone()));
    }
}
