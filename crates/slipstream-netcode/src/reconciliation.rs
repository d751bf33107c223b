//! Server state reconciliation
//!
//! Applies authoritative corrections to the local predictor: drop the
//! acknowledged inputs, adopt the authoritative state, replay whatever the
//! authority has not seen yet. Corrections older than (or equal to) one
//! already applied are ignored, never applied in reverse.

use crate::prediction::LocalPredictor;
use slipstream_core::{EntityState, StepFunction};

/// Authoritative state for the local entity
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    /// Newest local input sequence the authority has applied
    pub last_processed: u64,
    /// Authoritative state after that input
    pub state: EntityState,
}

impl Correction {
    /// Create a new correction
    pub fn new(last_processed: u64, state: EntityState) -> Self {
        Self {
            last_processed,
            state,
        }
    }
}

/// Result of offering a correction to the reconciler
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconcileOutcome {
    /// The correction was applied
    Applied {
        /// Input records discarded as acknowledged
        acknowledged: usize,
        /// Input records replayed on top of the authoritative state
        replayed: usize,
        /// Position error between our prediction and authority at the
        /// acknowledged sequence, when that prediction was still logged
        divergence: Option<f32>,
    },
    /// Out-of-order or duplicate correction; dropped
    Stale,
}

/// Counters kept by the reconciler
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReconcileStats {
    /// Corrections applied
    pub applied: u64,
    /// Corrections dropped as stale or duplicate
    pub stale_dropped: u64,
    /// Corrections whose divergence exceeded the tolerance
    pub divergences: u64,
    /// Largest divergence observed
    pub max_divergence: f32,
}

/// Reconciler for applying authoritative corrections
#[derive(Debug, Clone)]
pub struct Reconciler {
    /// Sequence of the newest correction applied
    last_applied: Option<u64>,
    /// Position error above which a correction counts as divergence
    tolerance: f32,
    stats: ReconcileStats,
}

impl Reconciler {
    /// Create a new reconciler
    pub fn new(divergence_tolerance: f32) -> Self {
        Self {
            last_applied: None,
            tolerance: divergence_tolerance,
            stats: ReconcileStats::default(),
        }
    }

    /// Apply a correction to the predictor
    ///
    /// 1. Drop every input with `sequence <= correction.last_processed`
    /// 2. Set the predicted state to the authoritative state
    /// 3. Replay the remaining inputs in sequence order
    pub fn reconcile<I, S: StepFunction<I>>(
        &mut self,
        predictor: &mut LocalPredictor<I, S>,
        correction: Correction,
    ) -> ReconcileOutcome {
        if self.last_applied.is_some_and(|last| correction.last_processed <= last) {
            self.stats.stale_dropped += 1;
            log::debug!(
                "dropping stale correction #{} (already applied #{:?})",
                correction.last_processed,
                self.last_applied
            );
            return ReconcileOutcome::Stale;
        }

        let divergence = predictor
            .record(correction.last_processed)
            .map(|record| compare::position_error(&record.predicted, &correction.state));
        if let Some(error) = divergence {
            self.stats.max_divergence = self.stats.max_divergence.max(error);
            if error > self.tolerance {
                self.stats.divergences += 1;
                log::warn!(
                    "{} diverged from authority by {:.4} at input #{}",
                    predictor.entity_id(),
                    error,
                    correction.last_processed
                );
            }
        }

        let acknowledged = predictor.log_mut().acknowledge(correction.last_processed);
        let replayed = predictor.rewind_and_replay(correction.state);

        self.last_applied = Some(correction.last_processed);
        self.stats.applied += 1;

        ReconcileOutcome::Applied {
            acknowledged,
            replayed,
            divergence,
        }
    }

    /// Sequence of the newest correction applied
    pub fn last_applied(&self) -> Option<u64> {
        self.last_applied
    }

    /// Get the counters
    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    /// Forget all correction history
    pub fn reset(&mut self) {
        self.last_applied = None;
        self.stats = ReconcileStats::default();
    }
}

/// State comparison utilities
pub mod compare {
    use slipstream_core::math::max_abs;
    use slipstream_core::EntityState;

    /// Euclidean distance between two states' positions
    pub fn position_error(a: &EntityState, b: &EntityState) -> f32 {
        a.position.distance(b.position)
    }

    /// Check if two states agree within `tolerance` on every kinematic field
    pub fn states_within(a: &EntityState, b: &EntityState, tolerance: f32) -> bool {
        max_abs(a.position - b.position) <= tolerance
            && max_abs(a.rotation - b.rotation) <= tolerance
            && max_abs(a.linear_velocity - b.linear_velocity) <= tolerance
            && max_abs(a.angular_velocity - b.angular_velocity) <= tolerance
    }
}
