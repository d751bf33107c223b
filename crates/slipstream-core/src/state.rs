//! Entity state and snapshot value types

use crate::{EntityId, Millis, Vec3};
use serde::{Deserialize, Serialize};

/// Value of one auxiliary channel (suspension compression, wheel spin, ...)
///
/// Channel order and shape are declared by `SyncConfig::channels`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChannelValue {
    /// A single scalar
    Scalar(f32),
    /// A fixed-length array (e.g. one value per wheel)
    Array(Vec<f32>),
}

impl ChannelValue {
    /// Number of scalar components
    pub fn len(&self) -> usize {
        match self {
            ChannelValue::Scalar(_) => 1,
            ChannelValue::Array(values) => values.len(),
        }
    }

    /// Check if this channel carries no components
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the scalar value, if this is a scalar channel
    pub fn as_scalar(&self) -> Option<f32> {
        match self {
            ChannelValue::Scalar(v) => Some(*v),
            ChannelValue::Array(_) => None,
        }
    }

    /// Get the array values, if this is an array channel
    pub fn as_array(&self) -> Option<&[f32]> {
        match self {
            ChannelValue::Scalar(_) => None,
            ChannelValue::Array(values) => Some(values),
        }
    }

    /// Blend two channel values
    ///
    /// Mismatched shapes cannot be blended; the target value wins.
    pub fn lerp(&self, other: &ChannelValue, alpha: f32) -> ChannelValue {
        match (self, other) {
            (ChannelValue::Scalar(a), ChannelValue::Scalar(b)) => {
                ChannelValue::Scalar(a + (b - a) * alpha)
            }
            (ChannelValue::Array(a), ChannelValue::Array(b)) if a.len() == b.len() => {
                ChannelValue::Array(
                    a.iter()
                        .zip(b.iter())
                        .map(|(a, b)| a + (b - a) * alpha)
                        .collect(),
                )
            }
            _ => other.clone(),
        }
    }
}

/// Full kinematic state of one entity
///
/// `rotation` holds Euler angles in radians (x = roll, y = pitch, z = yaw)
/// and `angular_velocity` holds their rates in radians per second.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityState {
    pub position: Vec3,
    pub rotation: Vec3,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub channels: Vec<ChannelValue>,
}

impl EntityState {
    /// Create a state at rest at the given position
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Set the rotation
    pub fn with_rotation(mut self, rotation: Vec3) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set the linear velocity
    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.linear_velocity = velocity;
        self
    }

    /// Set the angular velocity
    pub fn with_angular_velocity(mut self, angular_velocity: Vec3) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    /// Set the auxiliary channels
    pub fn with_channels(mut self, channels: Vec<ChannelValue>) -> Self {
        self.channels = channels;
        self
    }

    /// Project this state forward by `seconds` using its velocities
    ///
    /// Channels are carried unchanged.
    pub fn extrapolate(&self, seconds: f32) -> EntityState {
        EntityState {
            position: self.position + self.linear_velocity * seconds,
            rotation: self.rotation + self.angular_velocity * seconds,
            linear_velocity: self.linear_velocity,
            angular_velocity: self.angular_velocity,
            channels: self.channels.clone(),
        }
    }
}

/// One timestamped, immutable capture of an entity's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The entity this snapshot belongs to
    pub entity_id: EntityId,
    /// Sender (or authority) timestamp in monotonic milliseconds
    pub timestamp: Millis,
    /// The captured state
    pub state: EntityState,
}

impl Snapshot {
    /// Create a new snapshot
    pub fn new(entity_id: EntityId, timestamp: Millis, state: EntityState) -> Self {
        Self {
            entity_id,
            timestamp,
            state,
        }
    }
}
