//! Lossy fixed-point state compression
//!
//! Every channel is rounded to the nearest multiple of its quantization
//! threshold and transmitted as that multiple. Decoding multiplies back, so
//! a round-trip lands within half a threshold step of the original value.
//! Both ends must use the same `QuantizationTable`; it is exchanged once at
//! session start.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use slipstream_core::{ChannelKind, ChannelValue, EntityState, SyncConfig, Thresholds, Vec3};

/// Per-channel quantization steps, in wire order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizationTable {
    /// Steps for the kinematic fields
    pub kinematics: Thresholds,
    /// Steps and shapes for the auxiliary channels
    pub channels: Vec<ChannelStep>,
}

/// Quantization entry for one auxiliary channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStep {
    pub name: String,
    pub kind: ChannelKind,
    pub step: f32,
}

impl QuantizationTable {
    /// Build the table from a configuration
    ///
    /// Fails if the configuration is invalid, which includes any declared
    /// channel without a threshold.
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        config.validate()?;
        let channels = config
            .channels
            .iter()
            .map(|decl| -> Result<ChannelStep> {
                let step = decl
                    .threshold
                    .ok_or_else(|| slipstream_core::Error::MissingThreshold(decl.name.clone()))?;
                Ok(ChannelStep {
                    name: decl.name.clone(),
                    kind: decl.kind,
                    step,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            kinematics: config.thresholds,
            channels,
        })
    }
}

/// Quantized entity state as sent on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactState {
    pub position: [i32; 3],
    pub rotation: [i32; 3],
    pub linear_velocity: [i32; 3],
    pub angular_velocity: [i32; 3],
    pub channels: Vec<Vec<i32>>,
}

/// Stateless quantizer bound to one table
#[derive(Debug, Clone, PartialEq)]
pub struct Codec {
    table: QuantizationTable,
}

impl Codec {
    /// Create a codec for a configuration
    pub fn new(config: &SyncConfig) -> Result<Self> {
        Ok(Self {
            table: QuantizationTable::from_config(config)?,
        })
    }

    /// Create a codec from a table received from a peer
    pub fn from_table(table: QuantizationTable) -> Self {
        Self { table }
    }

    /// The table this codec encodes with
    pub fn table(&self) -> &QuantizationTable {
        &self.table
    }

    /// Check that `state` carries exactly the declared channel layout
    pub fn check_layout(&self, state: &EntityState) -> Result<()> {
        if state.channels.len() != self.table.channels.len() {
            return Err(Error::ChannelLayout {
                expected: self.table.channels.len(),
                got: state.channels.len(),
            });
        }
        for (value, decl) in state.channels.iter().zip(self.table.channels.iter()) {
            if value.len() != decl.kind.len() {
                return Err(Error::ChannelShape {
                    channel: decl.name.clone(),
                    expected: decl.kind.len(),
                    got: value.len(),
                });
            }
        }
        Ok(())
    }

    /// Quantize a state
    ///
    /// Channels are matched to the table by position and always encoded in
    /// the declared layout: undeclared channels are dropped, missing
    /// channels and short arrays are zero-filled, long arrays are truncated.
    /// Use `check_layout` to detect such a mismatch.
    pub fn quantize(&self, state: &EntityState) -> CompactState {
        let k = &self.table.kinematics;

        CompactState {
            position: quantize_vec(state.position, k.position),
            rotation: quantize_vec(state.rotation, k.rotation),
            linear_velocity: quantize_vec(state.linear_velocity, k.velocity),
            angular_velocity: quantize_vec(state.angular_velocity, k.angular_velocity),
            channels: self
                .table
                .channels
                .iter()
                .enumerate()
                .map(|(i, decl)| {
                    let values: &[f32] = match state.channels.get(i) {
                        Some(ChannelValue::Scalar(v)) => std::slice::from_ref(v),
                        Some(ChannelValue::Array(values)) => values,
                        None => &[],
                    };
                    let mut raw: Vec<i32> = values
                        .iter()
                        .take(decl.kind.len())
                        .map(|v| quantize(*v, decl.step))
                        .collect();
                    raw.resize(decl.kind.len(), 0);
                    raw
                })
                .collect(),
        }
    }

    /// Decode a compact state back to floats
    ///
    /// Fails when the compact state does not match the table's channel
    /// layout, which only happens for data from a misconfigured peer.
    pub fn dequantize(&self, compact: &CompactState) -> Result<EntityState> {
        let k = &self.table.kinematics;
        if compact.channels.len() != self.table.channels.len() {
            return Err(Error::ChannelLayout {
                expected: self.table.channels.len(),
                got: compact.channels.len(),
            });
        }

        let channels = compact
            .channels
            .iter()
            .zip(self.table.channels.iter())
            .map(|(raw, decl)| {
                if raw.len() != decl.kind.len() {
                    return Err(Error::ChannelShape {
                        channel: decl.name.clone(),
                        expected: decl.kind.len(),
                        got: raw.len(),
                    });
                }
                Ok(match decl.kind {
                    ChannelKind::Scalar => ChannelValue::Scalar(dequantize(raw[0], decl.step)),
                    ChannelKind::Array(_) => ChannelValue::Array(
                        raw.iter().map(|q| dequantize(*q, decl.step)).collect(),
                    ),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(EntityState {
            position: dequantize_vec(compact.position, k.position),
            rotation: dequantize_vec(compact.rotation, k.rotation),
            linear_velocity: dequantize_vec(compact.linear_velocity, k.velocity),
            angular_velocity: dequantize_vec(compact.angular_velocity, k.angular_velocity),
            channels,
        })
    }
}

/// Round `value` to the nearest multiple of `step`
///
/// Out-of-range values saturate at the `i32` bounds.
pub fn quantize(value: f32, step: f32) -> i32 {
    (value as f64 / step as f64).round() as i32
}

/// Expand a quantized multiple back to a float
pub fn dequantize(raw: i32, step: f32) -> f32 {
    (raw as f64 * step as f64) as f32
}

fn quantize_vec(v: Vec3, step: f32) -> [i32; 3] {
    [quantize(v.x, step), quantize(v.y, step), quantize(v.z, step)]
}

fn dequantize_vec(raw: [i32; 3], step: f32) -> Vec3 {
    Vec3::new(
        dequantize(raw[0], step),
        dequantize(raw[1], step),
        dequantize(raw[2], step),
    )
}
