//! Bridge between the resolved movement settings and the physics driver.
//!
//! Holds the active settings and the allowed gait, maps the current speed into
//! the 0..3 gait range and derives the caps the driver should use this tick.

use bevy::prelude::*;

use crate::driver::MovementLimits;
use crate::math::{map_range_clamped, size_2d};
use crate::settings::MovementSettings;
use crate::states::{Gait, NetRole, PhysicsMode};

/// Result of asking the adapter to change allowed gait.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AllowedGaitChange {
    Unchanged,
    /// Applied locally; `notify_authority` is set on the autonomous proxy.
    Predicted { notify_authority: bool },
    /// Remote non-authority copy: only the speed cap is refreshed.
    RemoteMaxSpeed(f32),
}

#[derive(Clone, Debug, Default)]
pub struct MovementAdapter {
    settings: MovementSettings,
    allowed_gait: Gait,
    request_settings_change: bool,
}

impl MovementAdapter {
    pub fn settings(&self) -> &MovementSettings {
        &self.settings
    }

    pub fn allowed_gait(&self) -> Gait {
        self.allowed_gait
    }

    pub fn settings_change_pending(&self) -> bool {
        self.request_settings_change
    }

    pub fn set_movement_settings(&mut self, settings: MovementSettings) {
        self.settings = settings;
        self.request_settings_change = true;
    }

    /// Speed mapped to 0 (stopped), 1 (walk), 2 (run), 3 (sprint).
    /// Flying uses full 3D speed, everything else the horizontal speed.
    pub fn mapped_speed(&self, velocity: Vec3, mode: PhysicsMode) -> f32 {
        let speed = if mode == PhysicsMode::Flying {
            velocity.length()
        } else {
            size_2d(velocity)
        };
        let walk = self.settings.walk_speed;
        let run = self.settings.run_speed;
        let sprint = self.settings.sprint_speed;

        if speed > run {
            map_range_clamped(run, sprint, 2.0, 3.0, speed)
        } else if speed > walk {
            map_range_clamped(walk, run, 1.0, 2.0, speed)
        } else {
            map_range_clamped(0.0, walk, 0.0, 1.0, speed)
        }
    }

    /// Acceleration, braking and friction from the movement curve. Falling
    /// or a missing curve leaves the driver defaults in place.
    pub fn curve_limits(&self, velocity: Vec3, mode: PhysicsMode) -> MovementLimits {
        let mut limits = MovementLimits::default();
        let Some(curve) = self.settings.movement_curve.as_ref() else {
            return limits;
        };
        let sample = curve.sample(self.mapped_speed(velocity, mode));
        if matches!(mode, PhysicsMode::Walking | PhysicsMode::NavWalking) {
            limits.ground_friction = Some(sample.ground_friction);
        }
        if !mode.is_falling() {
            limits.max_acceleration = Some(sample.acceleration);
            limits.braking_deceleration = Some(sample.deceleration);
        }
        limits
    }

    pub fn set_allowed_gait(&mut self, gait: Gait, locally_controlled: bool, role: NetRole) -> AllowedGaitChange {
        if self.allowed_gait == gait {
            return AllowedGaitChange::Unchanged;
        }
        if locally_controlled {
            self.allowed_gait = gait;
            self.request_settings_change = true;
            return AllowedGaitChange::Predicted {
                notify_authority: role == NetRole::AutonomousProxy,
            };
        }
        if !role.is_authority() {
            return AllowedGaitChange::RemoteMaxSpeed(self.settings.speed_for_gait(self.allowed_gait));
        }
        AllowedGaitChange::Unchanged
    }

    /// Authority side of the allowed-gait request.
    pub fn server_set_allowed_gait(&mut self, gait: Gait) {
        self.allowed_gait = gait;
        self.request_settings_change = true;
    }

    /// Post-move step: returns the new max speed when a settings change was
    /// requested since the last call.
    pub fn on_movement_updated(&mut self) -> Option<f32> {
        if !self.request_settings_change {
            return None;
        }
        self.request_settings_change = false;
        Some(self.settings.speed_for_gait(self.allowed_gait))
    }
}
