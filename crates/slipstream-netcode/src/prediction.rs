//! Client-side prediction for the locally controlled entity
//!
//! Every network tick applies the local input immediately through the
//! shared step function and logs it for replay. Rendering never waits on a
//! round-trip.

use crate::input_buffer::{InputLog, InputRecord};
use slipstream_core::{EntityId, EntityState, Millis, StepFunction};
use std::marker::PhantomData;

/// Local prediction engine
///
/// Generic over the input type `I` and the step function `S`.
pub struct LocalPredictor<I, S> {
    /// The locally controlled entity
    entity_id: EntityId,
    /// Current predicted state
    state: EntityState,
    /// Pending inputs not yet acknowledged by the authority
    log: InputLog<I>,
    /// Deterministic step function shared with every participant
    step: S,
    _input: PhantomData<fn(I)>,
}

impl<I, S: StepFunction<I>> LocalPredictor<I, S> {
    /// Create a predictor starting from `initial`
    pub fn new(entity_id: EntityId, initial: EntityState, step: S, log_capacity: usize) -> Self {
        Self {
            entity_id,
            state: initial,
            log: InputLog::new(log_capacity),
            step,
            _input: PhantomData,
        }
    }

    /// Predict one tick
    ///
    /// Applies `input` for `dt` seconds, records it under a fresh sequence
    /// number and returns the new state.
    pub fn tick(&mut self, input: I, dt: f32, now: Millis) -> &EntityState {
        self.state = self.step.step(&self.state, &input, dt);
        let sequence = self.log.push(input, dt, now, self.state.clone());
        log::trace!("{} predicted input #{}", self.entity_id, sequence);
        &self.state
    }

    /// Replace the current state and replay every logged input on top of it
    ///
    /// Records are not re-appended; their stored predictions are refreshed.
    /// Returns the number of inputs replayed.
    pub fn rewind_and_replay(&mut self, base: EntityState) -> usize {
        let mut state = base;
        let mut replayed = 0;
        for record in self.log.iter_mut() {
            state = self.step.step(&state, &record.input, record.dt);
            record.predicted = state.clone();
            replayed += 1;
        }
        self.state = state;
        replayed
    }
}

impl<I, S> LocalPredictor<I, S> {
    /// The locally controlled entity
    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    /// Current predicted state
    pub fn state(&self) -> &EntityState {
        &self.state
    }

    /// Sequence number of the newest applied input
    pub fn newest_sequence(&self) -> Option<u64> {
        self.log.newest_sequence()
    }

    /// The record for a sequence number, if still pending
    pub fn record(&self, sequence: u64) -> Option<&InputRecord<I>> {
        self.log.get(sequence)
    }

    /// Get the input log
    pub fn log(&self) -> &InputLog<I> {
        &self.log
    }

    /// Get mutable access to the input log
    pub fn log_mut(&mut self) -> &mut InputLog<I> {
        &mut self.log
    }

    /// Get the number of pending inputs
    pub fn pending_inputs(&self) -> usize {
        self.log.len()
    }

    /// Discard all pending inputs
    pub fn discard_pending(&mut self) {
        self.log.clear();
    }
}

impl<I, S> std::fmt::Debug for LocalPredictor<I, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalPredictor")
            .field("entity_id", &self.entity_id)
            .field("state", &self.state)
            .field("pending_inputs", &self.log.len())
            .finish()
    }
}
