//! Input log for prediction and reconciliation
//!
//! Holds every local input that the authority has not yet acknowledged,
//! together with the `dt` it was stepped with and the state prediction
//! produced. Sequence numbers start at 1 and increase by one per tick.

use slipstream_core::{EntityState, Millis};
use std::collections::VecDeque;

/// One applied local input
#[derive(Debug, Clone, PartialEq)]
pub struct InputRecord<I> {
    /// Sequence number, unique and increasing within a session
    pub sequence: u64,
    /// The input payload
    pub input: I,
    /// Step length the input was applied with, in seconds
    pub dt: f32,
    /// Local send time
    pub sent_at: Millis,
    /// State predicted after applying this input
    pub predicted: EntityState,
}

/// Bounded log of unacknowledged inputs (oldest first)
#[derive(Debug, Clone)]
pub struct InputLog<I> {
    records: VecDeque<InputRecord<I>>,
    capacity: usize,
    next_sequence: u64,
    last_acknowledged: Option<u64>,
    overflowed: u64,
}

impl<I> InputLog<I> {
    /// Create a new input log with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            next_sequence: 1,
            last_acknowledged: None,
            overflowed: 0,
        }
    }

    /// Append an input and return its sequence number
    ///
    /// When the log is full the oldest record is evicted; replay after that
    /// point can no longer reproduce the authority exactly.
    pub fn push(&mut self, input: I, dt: f32, sent_at: Millis, predicted: EntityState) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        if self.records.len() >= self.capacity {
            if let Some(evicted) = self.records.pop_front() {
                self.overflowed += 1;
                log::warn!(
                    "input log full ({}), evicting unacknowledged input #{}",
                    self.capacity,
                    evicted.sequence
                );
            }
        }

        self.records.push_back(InputRecord {
            sequence,
            input,
            dt,
            sent_at,
            predicted,
        });
        sequence
    }

    /// Remove every record with `sequence <= acked`
    ///
    /// Returns the number of records removed.
    pub fn acknowledge(&mut self, acked: u64) -> usize {
        self.last_acknowledged = Some(self.last_acknowledged.map_or(acked, |a| a.max(acked)));
        let before = self.records.len();
        while self.records.front().is_some_and(|r| r.sequence <= acked) {
            self.records.pop_front();
        }
        before - self.records.len()
    }

    /// Get the record with the given sequence number
    pub fn get(&self, sequence: u64) -> Option<&InputRecord<I>> {
        let front = self.records.front()?.sequence;
        let index = sequence.checked_sub(front)? as usize;
        self.records.get(index)
    }

    /// Iterate remaining records in sequence order
    pub fn iter(&self) -> impl Iterator<Item = &InputRecord<I>> {
        self.records.iter()
    }

    /// Iterate remaining records mutably in sequence order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut InputRecord<I>> {
        self.records.iter_mut()
    }

    /// Sequence number of the newest record ever pushed
    pub fn newest_sequence(&self) -> Option<u64> {
        (self.next_sequence > 1).then(|| self.next_sequence - 1)
    }

    /// Sequence number of the oldest unacknowledged record
    pub fn oldest_unacknowledged(&self) -> Option<u64> {
        self.records.front().map(|r| r.sequence)
    }

    /// Highest sequence number acknowledged so far
    pub fn last_acknowledged(&self) -> Option<u64> {
        self.last_acknowledged
    }

    /// Records evicted because the log was full
    pub fn overflowed(&self) -> u64 {
        self.overflowed
    }

    /// Get the number of pending records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Get the capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discard all pending records
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with(n: u64) -> InputLog<u64> {
        let mut log = InputLog::new(16);
        for i in 0..n {
            log.push(i, 0.016, i * 16, EntityState::default());
        }
        log
    }

    #[test]
    fn test_push_assigns_sequences() {
        let mut log = InputLog::new(10);
        assert_eq!(log.newest_sequence(), None);
        assert_eq!(log.push('a', 0.016, 0, EntityState::default()), 1);
        assert_eq!(log.push('b', 0.016, 16, EntityState::default()), 2);
        assert_eq!(log.push('c', 0.016, 32, EntityState::default()), 3);

        assert_eq!(log.len(), 3);
        assert_eq!(log.oldest_unacknowledged(), Some(1));
        assert_eq!(log.newest_sequence(), Some(3));
    }

    #[test]
    fn test_acknowledge() {
        let mut log = log_with(4);
        assert_eq!(log.acknowledge(2), 2);

        assert_eq!(log.len(), 2);
        assert_eq!(log.oldest_unacknowledged(), Some(3));
        assert_eq!(log.last_acknowledged(), Some(2));

        // Acknowledging an older sequence removes nothing
        assert_eq!(log.acknowledge(1), 0);
        assert_eq!(log.last_acknowledged(), Some(2));
    }

    #[test]
    fn test_acknowledge_everything() {
        let mut log = log_with(3);
        assert_eq!(log.acknowledge(10), 3);
        assert!(log.is_empty());
        // Sequences keep increasing
        assert_eq!(log.push(9, 0.016, 0, EntityState::default()), 4);
    }

    #[test]
    fn test_get() {
        let mut log = log_with(5);
        log.acknowledge(2);
        assert_eq!(log.get(4).map(|r| r.input), Some(3));
        assert!(log.get(2).is_none());
        assert!(log.get(6).is_none());
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut log = InputLog::new(3);
        for i in 0..5u8 {
            log.push(i, 0.016, 0, EntityState::default());
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.oldest_unacknowledged(), Some(3));
        assert_eq!(log.overflowed(), 2);
    }

    #[test]
    fn test_clear() {
        let mut log = log_with(3);
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.capacity(), 16);
    }
}
