//! Wire messages
//!
//! Every datagram carries exactly one `Message`, encoded with bincode.
//! Numeric state travels as a `CompactState` scaled by the session's
//! quantization table.

use crate::codec::{CompactState, QuantizationTable};
use crate::{Event, Lane, Result};
use serde::{Deserialize, Serialize};
use slipstream_core::{EntityId, Millis};

/// Discriminant of a wire message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Thresholds,
    State,
    Event,
    Ping,
    Pong,
    Correction,
}

/// A message exchanged between participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Quantization table, sent once on the reliable lane at session start
    Thresholds(QuantizationTable),
    /// Entity state sample
    State {
        entity_id: EntityId,
        /// Sender timestamp
        timestamp: Millis,
        /// Newest input sequence applied to this state
        sequence: u64,
        state: CompactState,
    },
    /// Gameplay event
    Event(Event),
    /// Latency ping
    Ping {
        /// Sender's timestamp
        timestamp: Millis,
    },
    /// Ping reply
    Pong {
        /// Echo of the ping's timestamp
        timestamp: Millis,
    },
    /// Authoritative state for the receiver's local entity
    Correction {
        entity_id: EntityId,
        /// Newest input sequence the authority has applied
        last_processed: u64,
        state: CompactState,
    },
}

impl Message {
    /// The kind of this message
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Thresholds(_) => MessageKind::Thresholds,
            Message::State { .. } => MessageKind::State,
            Message::Event(_) => MessageKind::Event,
            Message::Ping { .. } => MessageKind::Ping,
            Message::Pong { .. } => MessageKind::Pong,
            Message::Correction { .. } => MessageKind::Correction,
        }
    }

    /// Lane this message is sent on
    pub fn lane(&self) -> Lane {
        match self {
            Message::Thresholds(_) | Message::Correction { .. } => Lane::ReliableOrdered,
            Message::Event(event) => event.lane,
            Message::State { .. } | Message::Ping { .. } | Message::Pong { .. } => {
                Lane::UnreliableUnordered
            }
        }
    }

    /// Encode to bytes
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from bytes
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
