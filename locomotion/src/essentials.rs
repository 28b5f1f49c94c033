//! Per-tick derived kinematics.
//!
//! Sampled once at the top of every tick before any movement-state branch
//! reads them. Remote copies trust replicated values and decay the rest.

use bevy::prelude::*;

use crate::math::{normalize_axis, r_interp_to, size_2d, Rotator};
use crate::states::NetRole;

/// Interp speed used to smooth aim toward the control rotation.
pub const AIM_INTERP_SPEED: f32 = 30.0;

/// Raw inputs for one essentials update.
#[derive(Clone, Copy, Debug, Default)]
pub struct KinematicSample {
    pub velocity: Vec3,
    pub input_acceleration: Vec3,
    pub control_rotation: Rotator,
    pub max_acceleration: f32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EssentialValues {
    pub acceleration: Vec3,
    pub speed: f32,
    pub is_moving: bool,
    pub has_movement_input: bool,
    pub movement_input_amount: f32,
    pub aim_yaw_rate: f32,
    pub aiming_rotation: Rotator,
    pub last_velocity_rotation: Rotator,
    pub last_movement_input_rotation: Rotator,

    /// Replicated to observers (skip owner).
    pub replicated_current_acceleration: Vec3,
    pub replicated_control_rotation: Rotator,
    pub eased_max_acceleration: f32,

    pub previous_velocity: Vec3,
    pub previous_aim_yaw: f32,
}

impl EssentialValues {
    pub fn update(&mut self, sample: &KinematicSample, role: NetRole, locally_controlled: bool, dt: f32) {
        if role != NetRole::SimulatedProxy {
            self.replicated_current_acceleration = sample.input_acceleration;
            self.replicated_control_rotation = sample.control_rotation;
            self.eased_max_acceleration = sample.max_acceleration;
        } else if sample.max_acceleration != 0.0 {
            self.eased_max_acceleration = sample.max_acceleration;
        } else {
            self.eased_max_acceleration /= 2.0;
        }

        self.aiming_rotation = r_interp_to(self.aiming_rotation, self.replicated_control_rotation, dt, AIM_INTERP_SPEED);

        if dt > 0.0 {
            let new_acceleration = (sample.velocity - self.previous_velocity) / dt;
            if new_acceleration.abs().max_element() <= 1.0e-4 || locally_controlled {
                self.acceleration = new_acceleration;
            } else {
                self.acceleration /= 2.0;
            }
        }

        self.speed = size_2d(sample.velocity);
        self.is_moving = self.speed > 1.0;
        if self.is_moving {
            self.last_velocity_rotation = Rotator::from_direction(sample.velocity);
        }

        self.movement_input_amount = if self.eased_max_acceleration > 0.0 {
            (self.replicated_current_acceleration.length() / self.eased_max_acceleration).clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.has_movement_input = self.movement_input_amount > 0.0;
        if self.has_movement_input {
            self.last_movement_input_rotation = Rotator::from_direction(self.replicated_current_acceleration);
        }

        if dt > 0.0 {
            self.aim_yaw_rate = (normalize_axis(self.aiming_rotation.yaw - self.previous_aim_yaw) / dt).abs();
        }
    }

    /// End-of-tick cache for next tick's deltas.
    pub fn cache(&mut self, velocity: Vec3) {
        self.previous_velocity = velocity;
        self.previous_aim_yaw = self.aiming_rotation.yaw;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn test_authority_samples_directly() {
        let mut values = EssentialValues::default();
        let sample = KinematicSample {
            velocity: Vec3::new(0.0, 0.0, -300.0),
            input_acceleration: Vec3::new(0.0, 0.0, -1000.0),
            control_rotation: Rotator::from_yaw(45.0),
            max_acceleration: 2000.0,
        };
        values.update(&sample, NetRole::Authority, true, DT);

        assert!((values.speed - 300.0).abs() < 1e-3);
        assert!(values.is_moving);
        assert!((values.movement_input_amount - 0.5).abs() < 1e-4);
        assert!(values.has_movement_input);
        assert!(values.last_velocity_rotation.yaw.abs() < 1e-3);
        assert!((values.acceleration.z + 300.0 / DT).abs() < 1.0);
        assert!(values.aim_yaw_rate > 0.0);
    }

    #[test]
    fn test_simulated_proxy_decays_without_fresh_values() {
        let mut values = EssentialValues {
            eased_max_acceleration: 2000.0,
            acceleration: Vec3::new(100.0, 0.0, 0.0),
            replicated_current_acceleration: Vec3::new(500.0, 0.0, 0.0),
            ..default()
        };
        let sample = KinematicSample {
            velocity: Vec3::new(50.0, 0.0, 0.0),
            ..default()
        };
        values.update(&sample, NetRole::SimulatedProxy, false, DT);

        assert_eq!(values.eased_max_acceleration, 1000.0);
        assert_eq!(values.acceleration, Vec3::new(50.0, 0.0, 0.0));
        assert!((values.movement_input_amount - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_zero_eased_acceleration_means_no_input() {
        let mut values = EssentialValues::default();
        let sample = KinematicSample {
            input_acceleration: Vec3::new(10.0, 0.0, 0.0),
            ..default()
        };
        values.update(&sample, NetRole::Authority, true, DT);
        assert_eq!(values.movement_input_amount, 0.0);
        assert!(!values.has_movement_input);
    }

    #[test]
    fn test_non_positive_dt_keeps_rates() {
        let mut values = EssentialValues {
            aim_yaw_rate: 12.0,
            ..default()
        };
        values.update(&KinematicSample::default(), NetRole::Authority, true, 0.0);
        assert_eq!(values.aim_yaw_rate, 12.0);
    }
}
