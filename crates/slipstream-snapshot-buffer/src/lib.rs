//! Slipstream Snapshot Buffer - bounded, time-ordered history per remote entity
//!
//! This crate provides the storage behind the remote state resolver:
//!
//! - **Bounded memory**: Fixed capacity, oldest samples evicted first
//! - **Strict ordering**: Timestamps always strictly increasing
//! - **Stale rejection**: Late samples are dropped by timestamp, not arrival order
//! - **Fast lookup**: Binary search for the bracketing pair
//!
//! # Example
//!
//! ```rust
//! use slipstream_core::{EntityId, EntityState, Ingest, Snapshot, SnapshotHistory};
//! use slipstream_snapshot_buffer::SnapshotBuffer;
//!
//! // Roughly one second of samples at 60Hz
//! let mut buffer = SnapshotBuffer::new(60);
//! let id = EntityId(7);
//!
//! buffer.ingest(Snapshot::new(id, 100, EntityState::default()));
//! buffer.ingest(Snapshot::new(id, 116, EntityState::default()));
//!
//! // A sample that arrives late is discarded
//! assert_eq!(buffer.ingest(Snapshot::new(id, 108, EntityState::default())), Ingest::Stale);
//!
//! let before = buffer.nearest_before(110).unwrap();
//! assert_eq!(before.timestamp, 100);
//! ```

use slipstream_core::{Ingest, Millis, Snapshot, SnapshotHistory};
use std::collections::VecDeque;

/// A ring buffer of snapshots for one remote entity
///
/// Samples are kept oldest-first with strictly increasing timestamps.
#[derive(Debug, Clone)]
pub struct SnapshotBuffer {
    /// Stored samples, oldest first
    samples: VecDeque<Snapshot>,
    /// Capacity (max samples)
    capacity: usize,
    /// Samples dropped as stale since creation
    stale_dropped: u64,
}

impl SnapshotBuffer {
    /// Create a new snapshot buffer with the given capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of samples to retain (at least 2)
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 2, "Capacity must hold at least two samples");
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            stale_dropped: 0,
        }
    }

    /// Get all stored samples as an iterator (oldest to newest)
    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.samples.iter()
    }

    /// Number of samples discarded as stale
    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped
    }

    /// Get statistics about the buffer
    pub fn stats(&self) -> BufferStats {
        let (oldest, newest) = self.time_range().unwrap_or((0, 0));
        BufferStats {
            capacity: self.capacity,
            count: self.samples.len(),
            oldest_timestamp: oldest,
            newest_timestamp: newest,
            stale_dropped: self.stale_dropped,
        }
    }

    /// Index of the first sample with `timestamp > t`
    fn upper_bound(&self, t: Millis) -> usize {
        self.samples.partition_point(|s| s.timestamp <= t)
    }
}

impl SnapshotHistory for SnapshotBuffer {
    fn ingest(&mut self, snapshot: Snapshot) -> Ingest {
        if let Some(newest) = self.samples.back() {
            if snapshot.timestamp <= newest.timestamp {
                self.stale_dropped += 1;
                log::trace!(
                    "dropping stale sample for {} at {}ms (newest {}ms)",
                    snapshot.entity_id,
                    snapshot.timestamp,
                    newest.timestamp
                );
                return Ingest::Stale;
            }
        }

        self.samples.push_back(snapshot);
        if self.samples.len() > self.capacity {
            self.samples.pop_front();
            Ingest::StoredEvicting
        } else {
            Ingest::Stored
        }
    }

    fn nearest_before(&self, timestamp: Millis) -> Option<&Snapshot> {
        match self.upper_bound(timestamp) {
            0 => None,
            i => self.samples.get(i - 1),
        }
    }

    fn nearest_after(&self, timestamp: Millis) -> Option<&Snapshot> {
        let i = self.samples.partition_point(|s| s.timestamp < timestamp);
        self.samples.get(i)
    }

    fn oldest(&self) -> Option<&Snapshot> {
        self.samples.front()
    }

    fn newest(&self) -> Option<&Snapshot> {
        self.samples.back()
    }

    fn clear(&mut self) {
        self.samples.clear();
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

impl Default for SnapshotBuffer {
    fn default() -> Self {
        Self::new(60) // ~1 second at 60Hz
    }
}

/// Statistics about a snapshot buffer
#[derive(Debug, Clone, Copy)]
pub struct BufferStats {
    /// Maximum capacity
    pub capacity: usize,
    /// Current number of stored samples
    pub count: usize,
    /// Oldest timestamp in the buffer
    pub oldest_timestamp: Millis,
    /// Newest timestamp in the buffer
    pub newest_timestamp: Millis,
    /// Samples discarded as stale
    pub stale_dropped: u64,
}

impl BufferStats {
    /// Get the covered time span (newest - oldest)
    pub fn span_ms(&self) -> Millis {
        if self.count == 0 {
            0
        } else {
            self.newest_timestamp - self.oldest_timestamp
        }
    }

    /// Get the fill percentage (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f32 {
        self.count as f32 / self.capacity as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slipstream_core::{EntityId, EntityState, Vec3};

    fn sample(t: Millis) -> Snapshot {
        Snapshot::new(EntityId(1), t, EntityState::at(Vec3::new(t as f32, 0.0, 0.0)))
    }

    fn timestamps(buffer: &SnapshotBuffer) -> Vec<Millis> {
        buffer.iter().map(|s| s.timestamp).collect()
    }

    #[test]
    fn test_new() {
        let buffer = SnapshotBuffer::new(8);
        assert_eq!(buffer.capacity(), 8);
        assert_eq!(buffer.len(), 0);
        assert!(buffer.is_empty());
    }

    #[test]
    #[should_panic]
    fn test_capacity_must_fit_a_pair() {
        SnapshotBuffer::new(1);
    }

    #[test]
    fn test_ingest_in_order() {
        let mut buffer = SnapshotBuffer::new(8);
        assert_eq!(buffer.ingest(sample(10)), Ingest::Stored);
        assert_eq!(buffer.ingest(sample(20)), Ingest::Stored);
        assert_eq!(buffer.ingest(sample(30)), Ingest::Stored);
        assert_eq!(timestamps(&buffer), vec![10, 20, 30]);
    }

    #[test]
    fn test_stale_and_duplicate_dropped() {
        let mut buffer = SnapshotBuffer::new(8);
        buffer.ingest(sample(10));
        buffer.ingest(sample(30));

        assert_eq!(buffer.ingest(sample(20)), Ingest::Stale);
        assert_eq!(buffer.ingest(sample(30)), Ingest::Stale);
        assert_eq!(timestamps(&buffer), vec![10, 30]);
        assert_eq!(buffer.stale_dropped(), 2);
    }

    #[test]
    fn test_eviction() {
        let mut buffer = SnapshotBuffer::new(3);
        buffer.ingest(sample(1));
        buffer.ingest(sample(2));
        buffer.ingest(sample(3));
        assert_eq!(buffer.ingest(sample(4)), Ingest::StoredEvicting);
        assert_eq!(timestamps(&buffer), vec![2, 3, 4]);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_nearest_before() {
        let mut buffer = SnapshotBuffer::new(8);
        buffer.ingest(sample(10));
        buffer.ingest(sample(20));
        buffer.ingest(sample(30));

        assert_eq!(buffer.nearest_before(25).unwrap().timestamp, 20);
        assert_eq!(buffer.nearest_before(30).unwrap().timestamp, 30);
        assert_eq!(buffer.nearest_before(35).unwrap().timestamp, 30);
        assert!(buffer.nearest_before(5).is_none());
    }

    #[test]
    fn test_nearest_after() {
        let mut buffer = SnapshotBuffer::new(8);
        buffer.ingest(sample(10));
        buffer.ingest(sample(20));
        buffer.ingest(sample(30));

        assert_eq!(buffer.nearest_after(15).unwrap().timestamp, 20);
        assert_eq!(buffer.nearest_after(10).unwrap().timestamp, 10);
        assert!(buffer.nearest_after(35).is_none());
    }

    #[test]
    fn test_clear() {
        let mut buffer = SnapshotBuffer::new(8);
        buffer.ingest(sample(10));
        buffer.clear();
        assert!(buffer.is_empty());
        // Ordering restarts after a clear
        assert_eq!(buffer.ingest(sample(5)), Ingest::Stored);
    }

    #[test]
    fn test_stats() {
        let mut buffer = SnapshotBuffer::new(4);
        buffer.ingest(sample(10));
        buffer.ingest(sample(20));
        buffer.ingest(sample(30));
        buffer.ingest(sample(25));

        let stats = buffer.stats();
        assert_eq!(stats.capacity, 4);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.oldest_timestamp, 10);
        assert_eq!(stats.newest_timestamp, 30);
        assert_eq!(stats.span_ms(), 20);
        assert_eq!(stats.stale_dropped, 1);
        assert_eq!(stats.fill_ratio(), 0.75);
    }
}
