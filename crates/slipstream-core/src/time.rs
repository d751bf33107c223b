//! Time system for the two sync cadences
//!
//! - `Millis` - Monotonic milliseconds since session start
//! - `MonotonicClock` - Wall source for `Millis`
//! - `Cadence` - Fixed-rate tick scheduler (network tick)

use std::time::Instant;

/// Monotonic timestamp in milliseconds
pub type Millis = u64;

/// Monotonic clock anchored at construction
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    /// Create a clock whose zero is now
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Milliseconds elapsed since the clock was created
    pub fn now(&self) -> Millis {
        self.start.elapsed().as_millis() as Millis
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-rate tick scheduler
///
/// Converts elapsed monotonic time into the number of whole ticks that are
/// due. Fractional remainders carry over so the long-run rate is exact.
/// At most `max_catch_up` ticks are reported per poll; any further backlog
/// is discarded so a stalled host cannot spiral.
#[derive(Debug, Clone)]
pub struct Cadence {
    interval_ms: f64,
    accumulator: f64,
    last: Option<Millis>,
    max_catch_up: u32,
    stopped: bool,
}

impl Cadence {
    /// Default cap on ticks reported by a single poll
    pub const DEFAULT_MAX_CATCH_UP: u32 = 8;

    /// Create a cadence running at `hz` ticks per second
    ///
    /// `hz` must be non-zero; `SyncConfig::validate` guarantees this for the
    /// network tick.
    pub fn from_hz(hz: u32) -> Self {
        Self {
            interval_ms: 1000.0 / hz.max(1) as f64,
            accumulator: 0.0,
            last: None,
            max_catch_up: Self::DEFAULT_MAX_CATCH_UP,
            stopped: false,
        }
    }

    /// Override the catch-up cap
    pub fn with_max_catch_up(mut self, max: u32) -> Self {
        self.max_catch_up = max.max(1);
        self
    }

    /// Tick interval in milliseconds
    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    /// Number of ticks due at `now`
    ///
    /// The first poll only anchors the cadence and reports one tick.
    pub fn ticks_due(&mut self, now: Millis) -> u32 {
        if self.stopped {
            return 0;
        }
        let Some(last) = self.last.replace(now) else {
            return 1;
        };

        self.accumulator += now.saturating_sub(last) as f64;
        let due = (self.accumulator / self.interval_ms).floor();
        self.accumulator -= due * self.interval_ms;

        if due > self.max_catch_up as f64 {
            log::debug!("cadence dropped {} ticks of backlog", due as u64 - self.max_catch_up as u64);
            self.accumulator = 0.0;
            self.max_catch_up
        } else {
            due as u32
        }
    }

    /// Stop the cadence; every later poll reports zero ticks
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// Check if the cadence has been stopped
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}
