//! Orientation helpers on top of glam
//!
//! Orientation travels as Euler angles (`Vec3` of roll, pitch, yaw in
//! radians) end-to-end. Quaternions are only used to blend orientations on
//! the shortest arc, applied yaw-pitch-roll.

use glam::{EulerRot, Quat, Vec3};

/// Euler angles (x = roll, y = pitch, z = yaw) to a rotation
pub fn euler_to_quat(euler: Vec3) -> Quat {
    Quat::from_euler(EulerRot::ZYX, euler.z, euler.y, euler.x)
}

/// A rotation back to Euler angles (x = roll, y = pitch, z = yaw)
pub fn quat_to_euler(rotation: Quat) -> Vec3 {
    let (yaw, pitch, roll) = rotation.to_euler(EulerRot::ZYX);
    Vec3::new(roll, pitch, yaw)
}

/// Blend two Euler orientations along the shortest arc
pub fn slerp_euler(from: Vec3, to: Vec3, alpha: f32) -> Vec3 {
    quat_to_euler(euler_to_quat(from).slerp(euler_to_quat(to), alpha))
}

/// Largest absolute component
pub fn max_abs(v: Vec3) -> f32 {
    v.abs().max_element()
}

/// Wrap an angle into `(-PI, PI]`
pub fn wrap_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};

    let mut a = angle % TAU;
    if a > PI {
        a -= TAU;
    } else if a <= -PI {
        a += TAU;
    }
    a
}
