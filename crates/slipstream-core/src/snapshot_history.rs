//! Snapshot history trait for storing and querying remote entity samples
//!
//! This trait is used by:
//! - `slipstream-snapshot-buffer` for the bounded per-entity ring
//! - `slipstream-netcode` for the remote state resolver, which is generic
//!   over the storage backend

use crate::{Millis, Snapshot};

/// Outcome of offering a snapshot to a history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// The snapshot was stored
    Stored,
    /// The snapshot was stored and the oldest sample was evicted
    StoredEvicting,
    /// The snapshot was not newer than the newest stored sample and was dropped
    Stale,
}

impl Ingest {
    /// Check if the snapshot was kept
    pub fn is_stored(&self) -> bool {
        !matches!(self, Ingest::Stale)
    }
}

/// Trait for storing and querying timestamped snapshots of one entity.
///
/// Implementations must keep stored timestamps strictly increasing,
/// discarding samples by timestamp comparison rather than arrival order.
pub trait SnapshotHistory {
    /// Offer a snapshot; stale samples are dropped
    fn ingest(&mut self, snapshot: Snapshot) -> Ingest;

    /// The newest stored sample at or before `timestamp`
    fn nearest_before(&self, timestamp: Millis) -> Option<&Snapshot>;

    /// The oldest stored sample at or after `timestamp`
    fn nearest_after(&self, timestamp: Millis) -> Option<&Snapshot>;

    /// The oldest stored sample
    fn oldest(&self) -> Option<&Snapshot>;

    /// The newest stored sample
    fn newest(&self) -> Option<&Snapshot>;

    /// Clear all stored samples
    fn clear(&mut self);

    /// Maximum number of samples retained
    fn capacity(&self) -> usize;

    /// Number of samples currently stored
    fn len(&self) -> usize;

    /// Check if the history is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Timestamps of the oldest and newest samples
    fn time_range(&self) -> Option<(Millis, Millis)> {
        Some((self.oldest()?.timestamp, self.newest()?.timestamp))
    }
}

/// Where a render time falls relative to a history
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bracket<'a> {
    /// No samples stored
    Empty,
    /// Exactly one sample stored
    Single(&'a Snapshot),
    /// Render time precedes the oldest sample
    BeforeWindow(&'a Snapshot),
    /// Render time equals a stored sample's timestamp
    Exact(&'a Snapshot),
    /// Render time lies strictly between two samples
    Between {
        before: &'a Snapshot,
        after: &'a Snapshot,
        alpha: f32,
    },
    /// Render time is newer than the newest sample
    AfterWindow(&'a Snapshot),
}

/// Extension trait locating the bracketing pair for a render time
pub trait SnapshotInterpolation: SnapshotHistory {
    /// Classify `render_time` against the stored window
    fn bracket(&self, render_time: Millis) -> Bracket<'_> {
        let (Some(oldest), Some(newest)) = (self.oldest(), self.newest()) else {
            return Bracket::Empty;
        };
        if self.len() == 1 {
            return Bracket::Single(newest);
        }
        if render_time < oldest.timestamp {
            return Bracket::BeforeWindow(oldest);
        }
        if render_time > newest.timestamp {
            return Bracket::AfterWindow(newest);
        }

        match (self.nearest_before(render_time), self.nearest_after(render_time)) {
            (Some(before), _) if before.timestamp == render_time => Bracket::Exact(before),
            (Some(before), Some(after)) => Bracket::Between {
                before,
                after,
                alpha: Self::interpolation_factor(before.timestamp, after.timestamp, render_time),
            },
            // Unreachable for a well-formed history; degrade to the newest sample
            _ => Bracket::AfterWindow(newest),
        }
    }

    /// Fraction of the way from `before` to `after` that `target` lies
    ///
    /// Returns a value in `[0.0, 1.0]`.
    fn interpolation_factor(before: Millis, after: Millis, target: Millis) -> f32 {
        if after <= before {
            return 0.0;
        }
        let range = (after - before) as f64;
        let offset = target.saturating_sub(before) as f64;
        (offset / range).clamp(0.0, 1.0) as f32
    }
}

// Blanket implementation: any SnapshotHistory can bracket
impl<T: SnapshotHistory> SnapshotInterpolation for T {}
