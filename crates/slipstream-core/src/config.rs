//! Sync configuration - cadences, windows, capacities and quantization
//!
//! A `SyncConfig` is built once per session, validated, and then treated as
//! immutable. Invalid configurations are rejected at startup so the tick
//! paths never see a missing threshold.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Shape of an auxiliary channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelKind {
    /// One value
    Scalar,
    /// A fixed number of values
    Array(usize),
}

impl ChannelKind {
    /// Number of scalar components in this channel
    pub fn len(&self) -> usize {
        match self {
            ChannelKind::Scalar => 1,
            ChannelKind::Array(n) => *n,
        }
    }

    /// Check if this channel has no components
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Declaration of one auxiliary channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDecl {
    /// Channel name (unique within the config)
    pub name: String,
    /// Channel shape
    pub kind: ChannelKind,
    /// Quantization step; required
    #[serde(default)]
    pub threshold: Option<f32>,
}

impl ChannelDecl {
    /// Declare a scalar channel
    pub fn scalar(name: impl Into<String>, threshold: f32) -> Self {
        Self {
            name: name.into(),
            kind: ChannelKind::Scalar,
            threshold: Some(threshold),
        }
    }

    /// Declare an array channel of `len` values
    pub fn array(name: impl Into<String>, len: usize, threshold: f32) -> Self {
        Self {
            name: name.into(),
            kind: ChannelKind::Array(len),
            threshold: Some(threshold),
        }
    }
}

/// Quantization steps for the fixed kinematic fields
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Position step in world units
    pub position: f32,
    /// Rotation step in radians
    pub rotation: f32,
    /// Linear velocity step in units per second
    pub velocity: f32,
    /// Angular velocity step in radians per second
    pub angular_velocity: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            position: 0.01,
            rotation: 0.01,
            velocity: 0.1,
            angular_velocity: 0.01,
        }
    }
}

/// Configuration for a sync session
///
/// # Example
///
/// ```
/// use slipstream_core::{ChannelDecl, SyncConfig};
///
/// let config = SyncConfig::default()
///     .with_tick_rate(30)
///     .with_channel(ChannelDecl::array("wheel_spin", 4, 0.1));
/// assert!(config.validate().is_ok());
/// assert_eq!(config.tick_interval_ms(), 1000.0 / 30.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Network tick rate in Hz
    pub tick_rate_hz: u32,
    /// Fixed rendering lag applied to remote entities
    pub interpolation_delay_ms: u64,
    /// Maximum time past the newest sample that extrapolation is trusted
    pub extrapolation_horizon_ms: u64,
    /// Snapshots retained per remote entity
    pub snapshot_capacity: usize,
    /// Unacknowledged input records retained by the local predictor
    pub input_log_capacity: usize,
    /// Outbound batch queue capacity; also the inbound dedup-set capacity
    pub max_queue_size: usize,
    /// Interval between latency pings
    pub ping_interval_ms: u64,
    /// Window over which packet loss is estimated
    pub loss_window_ms: u64,
    /// Position error (units) above which a correction counts as divergence
    pub divergence_tolerance: f32,
    /// Quantization steps for the kinematic fields
    pub thresholds: Thresholds,
    /// Auxiliary channels, in wire order
    pub channels: Vec<ChannelDecl>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60,
            interpolation_delay_ms: 100,
            extrapolation_horizon_ms: 250,
            snapshot_capacity: 60,
            input_log_capacity: 256,
            max_queue_size: 64,
            ping_interval_ms: 1000,
            loss_window_ms: 1000,
            divergence_tolerance: 0.05,
            thresholds: Thresholds::default(),
            channels: Vec::new(),
        }
    }
}

impl SyncConfig {
    /// Set the network tick rate
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz;
        self
    }

    /// Set the interpolation delay
    pub fn with_interpolation_delay(mut self, ms: u64) -> Self {
        self.interpolation_delay_ms = ms;
        self
    }

    /// Set the extrapolation horizon
    pub fn with_extrapolation_horizon(mut self, ms: u64) -> Self {
        self.extrapolation_horizon_ms = ms;
        self
    }

    /// Set the per-entity snapshot capacity
    pub fn with_snapshot_capacity(mut self, capacity: usize) -> Self {
        self.snapshot_capacity = capacity;
        self
    }

    /// Set the input log capacity
    pub fn with_input_log_capacity(mut self, capacity: usize) -> Self {
        self.input_log_capacity = capacity;
        self
    }

    /// Set the outbound queue (and dedup set) capacity
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Set the kinematic quantization thresholds
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Append an auxiliary channel declaration
    pub fn with_channel(mut self, channel: ChannelDecl) -> Self {
        self.channels.push(channel);
        self
    }

    /// Network tick interval in milliseconds
    pub fn tick_interval_ms(&self) -> f64 {
        1000.0 / self.tick_rate_hz.max(1) as f64
    }

    /// Look up a channel's index by name
    pub fn channel_index(&self, name: &str) -> Result<usize> {
        self.channels
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| Error::UnknownChannel(name.to_string()))
    }

    /// Check the configuration for errors
    pub fn validate(&self) -> Result<()> {
        if self.tick_rate_hz == 0 {
            return Err(invalid("tick_rate_hz", "must be greater than 0"));
        }
        if self.snapshot_capacity < 2 {
            return Err(invalid(
                "snapshot_capacity",
                "must hold at least two samples to interpolate",
            ));
        }
        if self.input_log_capacity == 0 {
            return Err(invalid("input_log_capacity", "must be greater than 0"));
        }
        if self.max_queue_size == 0 {
            return Err(invalid("max_queue_size", "must be greater than 0"));
        }
        if self.ping_interval_ms == 0 {
            return Err(invalid("ping_interval_ms", "must be greater than 0"));
        }
        if self.loss_window_ms == 0 {
            return Err(invalid("loss_window_ms", "must be greater than 0"));
        }
        if !(self.divergence_tolerance.is_finite() && self.divergence_tolerance >= 0.0) {
            return Err(invalid("divergence_tolerance", "must be a finite, non-negative number"));
        }

        check_threshold("position", self.thresholds.position)?;
        check_threshold("rotation", self.thresholds.rotation)?;
        check_threshold("velocity", self.thresholds.velocity)?;
        check_threshold("angular_velocity", self.thresholds.angular_velocity)?;

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if !seen.insert(channel.name.as_str()) {
                return Err(Error::DuplicateChannel(channel.name.clone()));
            }
            let threshold = channel
                .threshold
                .ok_or_else(|| Error::MissingThreshold(channel.name.clone()))?;
            check_threshold(&channel.name, threshold)?;
        }

        Ok(())
    }

    /// Parse and validate a configuration from RON text
    pub fn from_ron_str(content: &str) -> Result<Self> {
        let config: SyncConfig = ron::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration from a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_ron_str(&content)
    }
}

fn invalid(field: &'static str, reason: &str) -> Error {
    Error::InvalidSetting {
        field,
        reason: reason.to_string(),
    }
}

fn check_threshold(channel: &str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidThreshold {
            channel: channel.to_string(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_rate_hz, 60);
        assert_eq!(config.interpolation_delay_ms, 100);
        assert_eq!(config.extrapolation_horizon_ms, 250);
        assert_eq!(config.snapshot_capacity, 60);
        assert_eq!(config.thresholds.position, 0.01);
        assert_eq!(config.thresholds.velocity, 0.1);
    }

    #[test]
    fn test_missing_channel_threshold() {
        let config = SyncConfig::default().with_channel(ChannelDecl {
            name: "suspension".into(),
            kind: ChannelKind::Array(4),
            threshold: None,
        });
        assert!(matches!(
            config.validate(),
            Err(Error::MissingThreshold(name)) if name == "suspension"
        ));
    }

    #[test]
    fn test_invalid_thresholds() {
        let config = SyncConfig::default().with_thresholds(Thresholds {
            position: 0.0,
            ..Thresholds::default()
        });
        assert!(matches!(config.validate(), Err(Error::InvalidThreshold { .. })));

        let config = SyncConfig::default().with_channel(ChannelDecl::scalar("boost", f32::NAN));
        assert!(matches!(config.validate(), Err(Error::InvalidThreshold { .. })));
    }

    #[test]
    fn test_duplicate_channel() {
        let config = SyncConfig::default()
            .with_channel(ChannelDecl::scalar("boost", 0.1))
            .with_channel(ChannelDecl::scalar("boost", 0.1));
        assert!(matches!(config.validate(), Err(Error::DuplicateChannel(_))));
    }

    #[test]
    fn test_invalid_settings() {
        assert!(SyncConfig::default().with_tick_rate(0).validate().is_err());
        assert!(SyncConfig::default().with_snapshot_capacity(1).validate().is_err());
        assert!(SyncConfig::default().with_max_queue_size(0).validate().is_err());
        assert!(SyncConfig::default().with_input_log_capacity(0).validate().is_err());
    }

    #[test]
    fn test_channel_index() {
        let config = SyncConfig::default()
            .with_channel(ChannelDecl::scalar("boost", 0.1))
            .with_channel(ChannelDecl::array("wheel_spin", 4, 0.1));
        assert_eq!(config.channel_index("wheel_spin").unwrap(), 1);
        assert!(matches!(
            config.channel_index("horn"),
            Err(Error::UnknownChannel(_))
        ));
    }

    #[test]
    fn test_from_ron() {
        let text = r#"(
            tick_rate_hz: 30,
            interpolation_delay_ms: 80,
            thresholds: (position: 0.02),
            channels: [
                (name: "suspension", kind: Array(4), threshold: Some(0.005)),
                (name: "boost", kind: Scalar, threshold: Some(0.1)),
            ],
        )"#;
        let config = SyncConfig::from_ron_str(text).unwrap();
        assert_eq!(config.tick_rate_hz, 30);
        assert_eq!(config.interpolation_delay_ms, 80);
        assert_eq!(config.extrapolation_horizon_ms, 250);
        assert_eq!(config.thresholds.position, 0.02);
        assert_eq!(config.thresholds.rotation, 0.01);
        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.channels[0].kind, ChannelKind::Array(4));
    }

    #[test]
    fn test_from_ron_rejects_missing_threshold() {
        let text = r#"(channels: [(name: "suspension", kind: Scalar)])"#;
        assert!(matches!(
            SyncConfig::from_ron_str(text),
            Err(Error::MissingThreshold(_))
        ));
    }

    #[test]
    fn test_from_ron_parse_error() {
        assert!(matches!(
            SyncConfig::from_ron_str("(tick_rate_hz: \"fast\")"),
            Err(Error::Ron(_))
        ));
    }
}
