//! Slipstream Netcode - keeping moving entities in sync over lossy links
//!
//! This crate provides the synchronization patterns for one participant:
//!
//! - **Codec**: quantize entity state to fixed-point integers for the wire
//! - **Prediction**: apply local inputs immediately and log them for replay
//! - **Reconciliation**: rewind to authoritative corrections and replay
//! - **Resolution**: interpolate remote entities, extrapolate within a horizon
//! - **Routing**: reliable/unreliable lanes, priority batching, event dedup
//! - **Monitoring**: latency pings and windowed loss estimation
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         SyncSession                              │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────────┐  │
//! │  │  Input Log   │◀──│  Prediction  │──▶│        Codec         │  │
//! │  └──────────────┘   └──────────────┘   └──────────────────────┘  │
//! │         │                  ▲                      │              │
//! │         ▼                  │                      ▼              │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────────┐  │
//! │  │Reconciliation│◀──│    Inbox     │◀──│    Channel Router    │  │
//! │  └──────────────┘   └──────────────┘   └──────────────────────┘  │
//! │                            │                      ▲              │
//! │                            ▼                      │              │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────────┐  │
//! │  │   Resolver   │◀──│   Snapshot   │   │ Connection Monitor   │  │
//! │  │   (render)   │   │   Buffers    │   │  (latency / loss)    │  │
//! │  └──────────────┘   └──────────────┘   └──────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use slipstream_core::{DriveInput, EntityId, EntityState, KinematicStep, SyncConfig};
//! use slipstream_netcode::{inbox, SyncSession};
//!
//! let (inbound_tx, inbound_rx) = inbox();
//! let transport = MyTransport::connect(addr, inbound_tx)?;
//! let mut session = SyncSession::open(
//!     SyncConfig::load("sync.ron")?,
//!     EntityId(1),
//!     EntityState::default(),
//!     KinematicStep::default(),
//!     transport,
//!     inbound_rx,
//! )?;
//!
//! // Game loop
//! loop {
//!     let now = clock.now();
//!     for _ in 0..session.ticks_due(now) {
//!         session.network_tick(read_input(), 1.0 / 60.0, now)?;
//!     }
//!     for event in session.drain_events() {
//!         handle(event);
//!     }
//!     draw(&session.render(now));
//! }
//! ```

mod codec;
mod error;
mod event;
mod input_buffer;
mod monitor;
mod prediction;
mod reconciliation;
mod resolver;
mod router;
mod session;
mod transport;
mod wire;

pub use codec::{ChannelStep, Codec, CompactState, QuantizationTable};
pub use error::{Error, Result};
pub use event::{Event, EventKind, EventPayload, Lane, Priority};
pub use input_buffer::{InputLog, InputRecord};
pub use monitor::{ConnectionMonitor, ConnectionStats};
pub use prediction::LocalPredictor;
pub use reconciliation::{compare, Correction, ReconcileOutcome, ReconcileStats, Reconciler};
pub use resolver::{interpolate, Pose, PoseSource, RemoteStateResolver};
pub use router::{ChannelRouter, LinkEvent, RouterStats, SendOutcome};
pub use session::{SessionStats, SyncSession};
pub use transport::{inbox, Inbox, InboxSender, LoopbackError, LoopbackTransport, Transport};
pub use wire::{Message, MessageKind};

// Re-export core types for convenience
pub use slipstream_core::{EntityId, EntityState, Millis, SnapshotHistory, StepFunction, SyncConfig};
pub use slipstream_snapshot_buffer::SnapshotBuffer;
