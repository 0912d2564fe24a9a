//! Timeframe - replication progress as a vector clock over feed keys
//!
//! A timeframe maps each feed key to the number of contiguous messages
//! seen from seq 0, i.e. the next expected sequence number. Timeframes
//! form a join-semilattice under pointwise max; `diff` computes the
//! ranges one side is missing.

use std::collections::BTreeMap;
use std::fmt;

use crate::FeedKey;

/// Vector clock over feed keys.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Timeframe {
    entries: BTreeMap<FeedKey, u64>,
}

/// A half-open range `[from, to)` of sequence numbers missing for a feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeedRange {
    pub feed: FeedKey,
    pub from: u64,
    pub to: u64,
}

impl Timeframe {
    pub fn new() -> Self {
        Timeframe {
            entries: BTreeMap::new(),
        }
    }

    /// Number of contiguous messages seen for a feed (0 if unknown).
    #[inline]
    pub fn get(&self, feed: &FeedKey) -> u64 {
        self.entries.get(feed).copied().unwrap_or(0)
    }

    /// Set the contiguous count for a feed directly.
    pub fn set(&mut self, feed: FeedKey, count: u64) {
        if count == 0 {
            self.entries.remove(&feed);
        } else {
            self.entries.insert(feed, count);
        }
    }

    /// Record that `seq` has been seen for `feed`.
    ///
    /// Only a contiguous extension advances the clock; anything else is
    /// the caller's reordering problem, not the timeframe's.
    pub fn advance(&mut self, feed: FeedKey, seq: u64) -> bool {
        let current = self.get(&feed);
        if seq == current {
            self.entries.insert(feed, current + 1);
            true
        } else {
            false
        }
    }

    /// True if `seq` of `feed` is already covered.
    #[inline]
    pub fn covers(&self, feed: &FeedKey, seq: u64) -> bool {
        self.get(feed) > seq
    }

    /// Pointwise maximum. Pure; neither input is mutated.
    pub fn merge(&self, other: &Timeframe) -> Timeframe {
        let mut merged = self.entries.clone();
        for (feed, &count) in &other.entries {
            merged
                .entry(*feed)
                .and_modify(|c| *c = (*c).max(count))
                .or_insert(count);
        }
        Timeframe { entries: merged }
    }

    /// Partial order: every entry of `self` is covered by `other`.
    pub fn le(&self, other: &Timeframe) -> bool {
        self.entries
            .iter()
            .all(|(feed, &count)| other.get(feed) >= count)
    }

    /// Ranges present in `want` that `have` is missing.
    pub fn diff(have: &Timeframe, want: &Timeframe) -> Vec<FeedRange> {
        let mut missing = Vec::new();
        for (feed, &to) in &want.entries {
            let from = have.get(feed);
            if from < to {
                missing.push(FeedRange {
                    feed: *feed,
                    from,
                    to,
                });
            }
        }
        missing
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FeedKey, &u64)> {
        self.entries.iter()
    }

    /// Feed keys known to this timeframe.
    pub fn feeds(&self) -> impl Iterator<Item = &FeedKey> {
        self.entries.keys()
    }

    /// Compact representation for the wire.
    pub fn to_entries(&self) -> Vec<(FeedKey, u64)> {
        self.entries.iter().map(|(&f, &c)| (f, c)).collect()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (FeedKey, u64)>) -> Self {
        Timeframe {
            entries: entries.into_iter().filter(|&(_, c)| c > 0).collect(),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (feed, count)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}={}", feed, count)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn feed(n: u8) -> FeedKey {
        FeedKey::new([n; 32])
    }

    #[test]
    fn test_advance_contiguous_only() {
        let mut tf = Timeframe::new();
        assert!(tf.advance(feed(1), 0));
        assert!(tf.advance(feed(1), 1));
        assert!(!tf.advance(feed(1), 3)); // gap
        assert!(!tf.advance(feed(1), 1)); // duplicate
        assert_eq!(tf.get(&feed(1)), 2);
    }

    #[test]
    fn test_diff_ranges() {
        let mut have = Timeframe::new();
        have.set(feed(1), 2);
        let mut want = Timeframe::new();
        want.set(feed(1), 5);
        want.set(feed(2), 3);

        let missing = Timeframe::diff(&have, &want);
        assert_eq!(
            missing,
            vec![
                FeedRange {
                    feed: feed(1),
                    from: 2,
                    to: 5
                },
                FeedRange {
                    feed: feed(2),
                    from: 0,
                    to: 3
                },
            ]
        );
    }

    #[test]
    fn test_diff_self_is_empty() {
        let mut tf = Timeframe::new();
        tf.set(feed(1), 4);
        tf.set(feed(9), 1);
        assert!(Timeframe::diff(&tf, &tf).is_empty());
    }

    #[test]
    fn test_covers() {
        let mut tf = Timeframe::new();
        tf.set(feed(1), 3);
        assert!(tf.covers(&feed(1), 2));
        assert!(!tf.covers(&feed(1), 3));
        assert!(!tf.covers(&feed(2), 0));
    }

    fn arb_timeframe() -> impl Strategy<Value = Timeframe> {
        proptest::collection::btree_map(0u8..8, 0u64..32, 0..8).prop_map(|m| {
            Timeframe::from_entries(m.into_iter().map(|(k, v)| (feed(k), v)))
        })
    }

    proptest! {
        #[test]
        fn prop_merge_upper_bound(t1 in arb_timeframe(), t2 in arb_timeframe()) {
            let merged = t1.merge(&t2);
            prop_assert!(t1.le(&merged));
            prop_assert!(t2.le(&merged));
        }

        #[test]
        fn prop_merge_commutative(t1 in arb_timeframe(), t2 in arb_timeframe()) {
            prop_assert_eq!(t1.merge(&t2), t2.merge(&t1));
        }

        #[test]
        fn prop_diff_then_merge_covers(t1 in arb_timeframe(), t2 in arb_timeframe()) {
            // Applying every missing range closes the gap.
            let mut have = t1.clone();
            for range in Timeframe::diff(&t1, &t2) {
                for seq in range.from..range.to {
                    have.advance(range.feed, seq);
                }
            }
            prop_assert!(t2.le(&have.merge(&t2)));
            prop_assert!(Timeframe::diff(&have, &t2).is_empty());
        }

        #[test]
        fn prop_entries_roundtrip(t in arb_timeframe()) {
            prop_assert_eq!(Timeframe::from_entries(t.to_entries()), t);
        }
    }
}
