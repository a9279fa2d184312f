use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use crate::alignment::ScoredSegmentPair;

/// Gathers the segments that pass the score threshold from concurrently running extensions into
/// a dense list.
///
/// Every passing segment claims the next free slot through an atomic counter, so concurrent
/// writers never share a slot and no locking is needed. Segments are tagged with the index of
/// their seed, and [`ResultCollector::finish`] restores seed order.
pub(crate) struct ResultCollector {
    score_threshold: i32,
    slots: Vec<OnceLock<(usize, ScoredSegmentPair)>>,
    count: AtomicUsize,
}

impl ResultCollector {
    /// Collector for at most `capacity` segments, one per seed.
    pub fn new(capacity: usize, score_threshold: i32) -> Self {
        Self {
            score_threshold,
            slots: (0..capacity).map(|_| OnceLock::new()).collect(),
            count: AtomicUsize::new(0),
        }
    }

    /// Offer the segment extended from seed `seed_ix`. Returns whether it was kept.
    pub fn offer(&self, seed_ix: usize, segment: ScoredSegmentPair) -> bool {
        if segment.score < self.score_threshold {
            return false;
        }

        let slot = self.count.fetch_add(1, Ordering::Relaxed);
        self.slots.get(slot)
            .map(|cell| cell.set((seed_ix, segment)).is_ok())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed).min(self.slots.len())
    }

    /// The collected segments, ordered by seed index.
    pub fn finish(self) -> Vec<ScoredSegmentPair> {
        let mut collected: Vec<_> = self.slots.into_iter()
            .filter_map(OnceLock::into_inner)
            .collect();

        collected.sort_unstable_by_key(|(seed_ix, _)| *seed_ix);
        collected.into_iter()
            .map(|(_, segment)| segment)
            .collect()
    }
}
