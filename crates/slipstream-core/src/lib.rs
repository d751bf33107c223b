//! Slipstream Core - value types and boundaries for networked entity sync
//!
//! This crate provides the types shared by every part of the sync stack:
//! - Entity identity and monotonic time (`EntityId`, `Millis`, `Cadence`)
//! - Entity state (`EntityState`, `ChannelValue`, `Snapshot`) and 3D math
//! - Session configuration with startup validation (`SyncConfig`)
//! - The simulation boundary (`StepFunction`)
//! - The snapshot storage trait used by the remote state resolver
//!   (`SnapshotHistory`)
//!
//! ## Configuration
//!
//! ```
//! use slipstream_core::SyncConfig;
//!
//! let config = SyncConfig::from_ron_str("(tick_rate_hz: 30)").unwrap();
//! assert_eq!(config.tick_rate_hz, 30);
//! assert_eq!(config.interpolation_delay_ms, 100);
//! ```

mod config;
mod error;
mod identity;
pub mod math;
mod snapshot_history;
mod state;
mod step;
pub mod time;

pub use config::{ChannelDecl, ChannelKind, SyncConfig, Thresholds};
pub use error::{Error, Result};
pub use identity::EntityId;
pub use glam::{EulerRot, Quat, Vec3};
pub use snapshot_history::{Bracket, Ingest, SnapshotHistory, SnapshotInterpolation};
pub use state::{ChannelValue, EntityState, Snapshot};
pub use step::{DriveInput, KinematicStep, StepFunction};
pub use time::{Cadence, Millis, MonotonicClock};
