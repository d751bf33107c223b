//! Simulation boundary: the deterministic step function
//!
//! Prediction and reconciliation both advance the local entity through the
//! same `StepFunction`. It must be pure and bit-for-bit identical on every
//! participant, otherwise every correction re-diverges.

use crate::{EntityState, Vec3};
use serde::{Deserialize, Serialize};

/// A pure `step(state, input, dt) -> state` function
pub trait StepFunction<I> {
    /// Advance `state` by `dt` seconds under `input`
    fn step(&self, state: &EntityState, input: &I, dt: f32) -> EntityState;
}

impl<I, F> StepFunction<I> for F
where
    F: Fn(&EntityState, &I, f32) -> EntityState,
{
    fn step(&self, state: &EntityState, input: &I, dt: f32) -> EntityState {
        self(state, input, dt)
    }
}

/// Control input for `KinematicStep`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DriveInput {
    /// Forward acceleration command in `[-1, 1]`
    pub throttle: f32,
    /// Yaw-rate command in `[-1, 1]`
    pub steer: f32,
}

impl DriveInput {
    /// Create a new drive input
    pub fn new(throttle: f32, steer: f32) -> Self {
        Self { throttle, steer }
    }
}

/// Reference planar vehicle integrator
///
/// Semi-implicit Euler on the XY plane: steer sets the yaw rate, throttle
/// accelerates along the heading, drag bleeds speed. Auxiliary channels are
/// passed through untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinematicStep {
    /// Acceleration at full throttle (units/s^2)
    pub acceleration: f32,
    /// Yaw rate at full steer (rad/s)
    pub turn_rate: f32,
    /// Linear drag coefficient (1/s)
    pub drag: f32,
}

impl Default for KinematicStep {
    fn default() -> Self {
        Self {
            acceleration: 20.0,
            turn_rate: 2.5,
            drag: 0.8,
        }
    }
}

impl StepFunction<DriveInput> for KinematicStep {
    fn step(&self, state: &EntityState, input: &DriveInput, dt: f32) -> EntityState {
        let throttle = input.throttle.clamp(-1.0, 1.0);
        let steer = input.steer.clamp(-1.0, 1.0);

        let yaw_rate = steer * self.turn_rate;
        let yaw = crate::math::wrap_angle(state.rotation.z + yaw_rate * dt);
        let heading = Vec3::new(yaw.cos(), yaw.sin(), 0.0);

        let accel = heading * (throttle * self.acceleration) - state.linear_velocity * self.drag;
        let velocity = state.linear_velocity + accel * dt;

        EntityState {
            position: state.position + velocity * dt,
            rotation: Vec3::new(state.rotation.x, state.rotation.y, yaw),
            linear_velocity: velocity,
            angular_velocity: Vec3::new(0.0, 0.0, yaw_rate),
            channels: state.channels.clone(),
        }
    }
}
