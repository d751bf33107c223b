//! Connection quality measurement
//!
//! Latency comes from timestamped pings echoed by the peer; loss is
//! estimated by comparing received state samples against what the
//! configured tick rate says should have arrived. The loss estimate assumes
//! every source sends at a steady `tick_rate_hz`.

use indexmap::IndexMap;
use slipstream_core::{EntityId, Millis, SyncConfig};
use std::collections::VecDeque;

/// Smoothing weight for new latency samples
const LATENCY_SMOOTHING: f64 = 0.125;

/// Unanswered pings kept for saturation
const MAX_OUTSTANDING_PINGS: usize = 32;

/// Snapshot of connection quality
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionStats {
    /// Smoothed one-way latency, saturated by unanswered pings
    pub latency_ms: Option<f64>,
    /// Most recent one-way latency sample
    pub last_latency_ms: Option<f64>,
    /// Estimated loss ratio in `[0.0, 1.0]`
    pub packet_loss: f64,
    /// Pings sent and not yet answered
    pub outstanding_pings: usize,
    /// Remote sources counted by the loss estimate
    pub sources: usize,
}

#[derive(Debug, Clone)]
struct SourceWindow {
    first_seen: Millis,
    arrivals: VecDeque<Millis>,
}

/// Latency and loss tracker
#[derive(Debug, Clone)]
pub struct ConnectionMonitor {
    tick_rate_hz: u32,
    ping_interval_ms: Millis,
    loss_window_ms: Millis,
    last_ping: Option<Millis>,
    outstanding: VecDeque<Millis>,
    last_latency: Option<f64>,
    smoothed_latency: Option<f64>,
    sources: IndexMap<EntityId, SourceWindow>,
}

impl ConnectionMonitor {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            tick_rate_hz: config.tick_rate_hz,
            ping_interval_ms: config.ping_interval_ms,
            loss_window_ms: config.loss_window_ms.max(1),
            last_ping: None,
            outstanding: VecDeque::new(),
            last_latency: None,
            smoothed_latency: None,
            sources: IndexMap::new(),
        }
    }

    /// Check whether a ping should go out at `now`
    ///
    /// Returns the ping timestamp to send and records it as outstanding.
    pub fn ping_due(&mut self, now: Millis) -> Option<Millis> {
        if let Some(last) = self.last_ping {
            if now.saturating_sub(last) < self.ping_interval_ms {
                return None;
            }
        }
        self.last_ping = Some(now);
        if self.outstanding.len() >= MAX_OUTSTANDING_PINGS {
            // Keep the oldest; it drives saturation
            self.outstanding.remove(1);
        }
        self.outstanding.push_back(now);
        Some(now)
    }

    /// Record a ping reply
    ///
    /// Unknown or already answered pings are ignored. Answering a ping
    /// also retires every older one.
    pub fn on_pong(&mut self, sent: Millis, now: Millis) -> Option<f64> {
        if !self.outstanding.contains(&sent) {
            log::trace!("ignoring pong for unknown ping {}", sent);
            return None;
        }
        self.outstanding.retain(|t| *t > sent);

        let latency = now.saturating_sub(sent) as f64 / 2.0;
        self.last_latency = Some(latency);
        self.smoothed_latency = Some(match self.smoothed_latency {
            Some(prev) => prev + (latency - prev) * LATENCY_SMOOTHING,
            None => latency,
        });
        log::trace!("latency sample {:.1}ms", latency);
        Some(latency)
    }

    /// Record one state sample received from `source` at `now`
    pub fn record_sample(&mut self, source: EntityId, now: Millis) {
        let cutoff = now.saturating_sub(self.loss_window_ms);
        let window = self.sources.entry(source).or_insert_with(|| SourceWindow {
            first_seen: now,
            arrivals: VecDeque::new(),
        });
        window.arrivals.push_back(now);
        while window.arrivals.front().is_some_and(|t| *t < cutoff) {
            window.arrivals.pop_front();
        }
    }

    /// Stop counting `source` toward the loss estimate
    pub fn forget(&mut self, source: EntityId) {
        self.sources.shift_remove(&source);
    }

    /// Latency at `now`
    ///
    /// Never less than half the age of the oldest unanswered ping, so a
    /// dead link drives this up without bound.
    pub fn latency_ms(&self, now: Millis) -> Option<f64> {
        let pending = self
            .outstanding
            .front()
            .map(|sent| now.saturating_sub(*sent) as f64 / 2.0);
        match (self.smoothed_latency, pending) {
            (Some(measured), Some(pending)) => Some(measured.max(pending)),
            (measured, pending) => measured.or(pending),
        }
    }

    /// Estimated loss ratio over the trailing window at `now`
    ///
    /// `1 - received / expected`, summed over every known source.
    pub fn packet_loss(&self, now: Millis) -> f64 {
        let cutoff = now.saturating_sub(self.loss_window_ms);
        let mut expected = 0.0;
        let mut received = 0usize;

        for window in self.sources.values() {
            let span = now.saturating_sub(window.first_seen).min(self.loss_window_ms);
            expected += self.tick_rate_hz as f64 * span as f64 / 1000.0;
            received += window.arrivals.iter().filter(|t| **t >= cutoff).count();
        }

        if expected < 1.0 {
            return 0.0;
        }
        (1.0 - received as f64 / expected).clamp(0.0, 1.0)
    }

    /// Extrapolation horizon adapted to current loss
    ///
    /// Scales `configured_ms` down by the loss ratio but never below one
    /// network tick interval.
    pub fn extrapolation_horizon(&self, configured_ms: Millis, now: Millis) -> Millis {
        let floor = (1000 / self.tick_rate_hz.max(1) as Millis).min(configured_ms);
        let scaled = (configured_ms as f64 * (1.0 - self.packet_loss(now))).round() as Millis;
        scaled.max(floor)
    }

    pub fn stats(&self, now: Millis) -> ConnectionStats {
        ConnectionStats {
            latency_ms: self.latency_ms(now),
            last_latency_ms: self.last_latency,
            packet_loss: self.packet_loss(now),
            outstanding_pings: self.outstanding.len(),
            sources: self.sources.len(),
        }
    }
}
