//! Rotation and interpolation helpers.
//!
//! Angles are degrees. The world is +Y up with yaw 0 facing -Z, so a yaw of
//! `y` faces `(-sin y, 0, -cos y)`, the same convention the movement code
//! uses for player facing.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

const NEARLY_ZERO: f32 = 1.0e-4;
const SMALL_NUMBER: f32 = 1.0e-8;

/// Wrap an angle into (-180, 180].
pub fn normalize_axis(angle: f32) -> f32 {
    let mut a = angle % 360.0;
    if a < 0.0 {
        a += 360.0;
    }
    if a > 180.0 {
        a -= 360.0;
    }
    a
}

/// Euler orientation in degrees. Positive pitch looks up, positive roll
/// banks to the right.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
pub struct Rotator {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Rotator {
    pub const ZERO: Rotator = Rotator {
        pitch: 0.0,
        yaw: 0.0,
        roll: 0.0,
    };

    pub const fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }

    pub const fn from_yaw(yaw: f32) -> Self {
        Self::new(0.0, yaw, 0.0)
    }

    /// Orientation that faces along `dir` (roll is always zero).
    pub fn from_direction(dir: Vec3) -> Self {
        if dir.length_squared() < SMALL_NUMBER {
            return Self::ZERO;
        }
        let horizontal = Vec2::new(dir.x, dir.z).length();
        Self::new(
            dir.y.atan2(horizontal).to_degrees(),
            (-dir.x).atan2(-dir.z).to_degrees(),
            0.0,
        )
    }

    pub fn normalized(self) -> Self {
        Self::new(
            normalize_axis(self.pitch),
            normalize_axis(self.yaw),
            normalize_axis(self.roll),
        )
    }

    pub fn is_nearly_zero(self, tolerance: f32) -> bool {
        self.pitch.abs() <= tolerance && self.yaw.abs() <= tolerance && self.roll.abs() <= tolerance
    }

    pub fn to_quat(self) -> Quat {
        Quat::from_euler(
            EulerRot::YXZ,
            self.yaw.to_radians(),
            self.pitch.to_radians(),
            -self.roll.to_radians(),
        )
    }

    pub fn forward(self) -> Vec3 {
        self.to_quat() * Vec3::NEG_Z
    }

    pub fn right(self) -> Vec3 {
        self.to_quat() * Vec3::X
    }

    pub fn up(self) -> Vec3 {
        self.to_quat() * Vec3::Y
    }

    /// Express a world vector in this rotation's frame as
    /// `(forward, right, up)` components.
    pub fn unrotate(self, v: Vec3) -> Vec3 {
        let local = self.to_quat().inverse() * v;
        Vec3::new(-local.z, local.x, local.y)
    }
}

impl std::ops::Add for Rotator {
    type Output = Rotator;

    fn add(self, rhs: Rotator) -> Rotator {
        Rotator::new(self.pitch + rhs.pitch, self.yaw + rhs.yaw, self.roll + rhs.roll)
    }
}

impl std::ops::Sub for Rotator {
    type Output = Rotator;

    fn sub(self, rhs: Rotator) -> Rotator {
        Rotator::new(self.pitch - rhs.pitch, self.yaw - rhs.yaw, self.roll - rhs.roll)
    }
}

impl std::ops::Mul<f32> for Rotator {
    type Output = Rotator;

    fn mul(self, rhs: f32) -> Rotator {
        Rotator::new(self.pitch * rhs, self.yaw * rhs, self.roll * rhs)
    }
}

// =============================================================================
// INTERPOLATION
// =============================================================================

/// Exponential approach of a scalar. A non-positive speed snaps to target.
pub fn f_interp_to(current: f32, target: f32, dt: f32, speed: f32) -> f32 {
    if speed <= 0.0 {
        return target;
    }
    let dist = target - current;
    if dist * dist < SMALL_NUMBER {
        return target;
    }
    current + dist * (dt * speed).clamp(0.0, 1.0)
}

/// Exponential approach of a rotation along the shortest path per axis.
pub fn r_interp_to(current: Rotator, target: Rotator, dt: f32, speed: f32) -> Rotator {
    if dt == 0.0 || current == target {
        return current;
    }
    if speed <= 0.0 {
        return target;
    }
    let delta = (target - current).normalized();
    if delta.is_nearly_zero(NEARLY_ZERO) {
        return target;
    }
    (current + delta * (speed * dt).clamp(0.0, 1.0)).normalized()
}

/// Constant-rate approach of a rotation, each axis moving at most
/// `speed * dt` degrees. A non-positive speed snaps to target.
pub fn r_interp_constant_to(current: Rotator, target: Rotator, dt: f32, speed: f32) -> Rotator {
    if dt == 0.0 || current == target {
        return current;
    }
    if speed <= 0.0 {
        return target;
    }
    let step = speed * dt;
    let delta = (target - current).normalized();
    if delta.is_nearly_zero(NEARLY_ZERO) {
        return target;
    }
    Rotator::new(
        current.pitch + delta.pitch.clamp(-step, step),
        current.yaw + delta.yaw.clamp(-step, step),
        current.roll + delta.roll.clamp(-step, step),
    )
    .normalized()
}

// =============================================================================
// RANGE MAPPING
// =============================================================================

fn range_pct(in_a: f32, in_b: f32, value: f32) -> f32 {
    let divisor = in_b - in_a;
    if divisor.abs() < SMALL_NUMBER {
        if value >= in_b {
            1.0
        } else {
            0.0
        }
    } else {
        (value - in_a) / divisor
    }
}

/// Map `value` from `[in_a, in_b]` to `[out_a, out_b]`, clamped to the output range.
pub fn map_range_clamped(in_a: f32, in_b: f32, out_a: f32, out_b: f32, value: f32) -> f32 {
    let pct = range_pct(in_a, in_b, value).clamp(0.0, 1.0);
    out_a + (out_b - out_a) * pct
}

pub fn map_range_unclamped(in_a: f32, in_b: f32, out_a: f32, out_b: f32, value: f32) -> f32 {
    out_a + (out_b - out_a) * range_pct(in_a, in_b, value)
}

/// Horizontal (XZ plane) length.
pub fn size_2d(v: Vec3) -> f32 {
    Vec2::new(v.x, v.z).length()
}
