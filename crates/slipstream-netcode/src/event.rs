//! Gameplay events carried by the channel router
//!
//! Event kinds form a closed set, each with a fixed payload shape. The kind
//! decides the delivery lane; priority has a per-kind default that callers
//! may override.

use serde::{Deserialize, Serialize};
use slipstream_core::{EntityId, Millis, Vec3};
use std::fmt;

/// Delivery guarantee class over the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lane {
    /// Guaranteed delivery, in order
    ReliableOrdered,
    /// Best effort, may be lost or reordered
    UnreliableUnordered,
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lane::ReliableOrdered => write!(f, "reliable"),
            Lane::UnreliableUnordered => write!(f, "unreliable"),
        }
    }
}

/// Send priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Discriminant of an event payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Impact,
    Pickup,
    LapCompleted,
    Chat,
    Effect,
}

impl EventKind {
    /// Lane this kind of event travels on
    pub fn lane(&self) -> Lane {
        match self {
            EventKind::Effect => Lane::UnreliableUnordered,
            _ => Lane::ReliableOrdered,
        }
    }

    /// Default priority for this kind of event
    pub fn default_priority(&self) -> Priority {
        match self {
            EventKind::Impact => Priority::High,
            EventKind::Pickup | EventKind::LapCompleted => Priority::Medium,
            EventKind::Chat | EventKind::Effect => Priority::Low,
        }
    }
}

/// Event payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    /// Collision between two entities; changes state on both sides
    Impact { other: EntityId, impulse: Vec3 },
    /// An item was collected
    Pickup { item_id: u32 },
    /// A lap was finished
    LapCompleted { lap: u16, lap_time_ms: u64 },
    /// Chat line
    Chat { text: String },
    /// Cosmetic effect (sparks, skid marks); fine to lose
    Effect { effect_id: u16, at: Vec3 },
}

impl EventPayload {
    /// The kind of this payload
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Impact { .. } => EventKind::Impact,
            EventPayload::Pickup { .. } => EventKind::Pickup,
            EventPayload::LapCompleted { .. } => EventKind::LapCompleted,
            EventPayload::Chat { .. } => EventKind::Chat,
            EventPayload::Effect { .. } => EventKind::Effect,
        }
    }
}

/// A gameplay event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Entity that raised the event
    pub source: EntityId,
    /// Creation time in monotonic milliseconds
    pub timestamp: Millis,
    /// Send priority
    pub priority: Priority,
    /// Delivery lane (fixed by kind)
    pub lane: Lane,
    /// Event data
    pub payload: EventPayload,
}

impl Event {
    /// Create an event with its kind's default priority and lane
    pub fn new(source: EntityId, timestamp: Millis, payload: EventPayload) -> Self {
        let kind = payload.kind();
        Self {
            source,
            timestamp,
            priority: kind.default_priority(),
            lane: kind.lane(),
            payload,
        }
    }

    /// Override the priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// The kind of this event
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_defaults() {
        let impact = Event::new(
            EntityId(1),
            10,
            EventPayload::Impact {
                other: EntityId(2),
                impulse: Vec3::new(1.0, 0.0, 0.0),
            },
        );
        assert_eq!(impact.kind(), EventKind::Impact);
        assert_eq!(impact.priority, Priority::High);
        assert_eq!(impact.lane, Lane::ReliableOrdered);

        let effect = Event::new(
            EntityId(1),
            10,
            EventPayload::Effect {
                effect_id: 3,
                at: Vec3::ZERO,
            },
        );
        assert_eq!(effect.priority, Priority::Low);
        assert_eq!(effect.lane, Lane::UnreliableUnordered);
    }

    #[test]
    fn test_priority_override_keeps_lane() {
        let chat = Event::new(EntityId(1), 5, EventPayload::Chat { text: "gg".into() })
            .with_priority(Priority::High);
        assert_eq!(chat.priority, Priority::High);
        assert_eq!(chat.lane, Lane::ReliableOrdered);
    }

    #[test]
    fn test_priority_order() {
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }
}
