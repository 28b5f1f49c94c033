//! Per-state rotation policies.
//!
//! Every policy funnels into `RotationState::smooth`: a constant-rate step of
//! the target rotation followed by an exponential step of the actor toward it.

use bevy::prelude::*;

use crate::essentials::EssentialValues;
use crate::math::{f_interp_to, map_range_clamped, map_range_unclamped, normalize_axis, r_interp_constant_to, r_interp_to, Rotator};
use crate::states::{Gait, MovementAction, NetRole, RotationMode, ViewMode};

/// Speed above which a grounded character keeps rotating even without input.
const ROTATE_WITHOUT_INPUT_SPEED: f32 = 150.0;
/// Frame time the rotation-amount curve is authored against.
const ROTATION_AMOUNT_FRAME: f32 = 1.0 / 30.0;
/// Stationary aim limit (degrees either side of aim yaw).
const AIM_YAW_LIMIT: f32 = 100.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RotationState {
    pub actor: Rotator,
    pub target: Rotator,
    pub in_air: Rotator,
}

/// Everything a rotation policy reads in one tick.
#[derive(Clone, Copy, Debug)]
pub struct RotationContext<'a> {
    pub essentials: &'a EssentialValues,
    pub rotation_mode: RotationMode,
    pub view_mode: ViewMode,
    pub gait: Gait,
    pub movement_action: MovementAction,
    pub role: NetRole,
    pub network_optimizations: bool,
    pub has_root_motion: bool,
    pub mapped_speed: f32,
    /// Rotation-rate curve sampled at `mapped_speed`.
    pub rotation_rate_curve: f32,
    pub yaw_offset_curve: f32,
    pub rotation_amount_curve: f32,
    pub relative_altitude: f32,
    pub movement_input: Vec3,
    pub max_flight_lean: Vec3,
}

impl RotationContext<'_> {
    fn can_update_moving_rotation(&self) -> bool {
        let e = self.essentials;
        ((e.is_moving && e.has_movement_input) || e.speed > ROTATE_WITHOUT_INPUT_SPEED) && !self.has_root_motion
    }

    /// Curve rate boosted by how fast the camera is turning.
    pub fn rotation_rate(&self) -> f32 {
        self.rotation_rate_curve * map_range_clamped(0.0, 300.0, 1.0, 3.0, self.essentials.aim_yaw_rate)
    }
}

impl RotationState {
    pub fn smooth(&mut self, target: Rotator, target_speed: f32, actor_speed: f32, dt: f32) {
        self.target = r_interp_constant_to(self.target, target, dt, target_speed);
        self.actor = r_interp_to(self.actor, self.target, dt, actor_speed);
    }

    /// Keep actor yaw within `[min, max]` of the aim yaw.
    pub fn limit_rotation(&mut self, aiming: Rotator, min: f32, max: f32, speed: f32, dt: f32) {
        let delta = (aiming - self.actor).normalized().yaw;
        if delta < min || delta > max {
            let yaw = aiming.yaw + if delta > 0.0 { min } else { max };
            self.smooth(Rotator::from_yaw(yaw), 0.0, speed, dt);
        }
    }

    pub fn update_grounded(&mut self, ctx: &RotationContext, dt: f32) {
        let e = ctx.essentials;
        match ctx.movement_action {
            MovementAction::None => {
                if ctx.can_update_moving_rotation() {
                    let rate = ctx.rotation_rate();
                    match ctx.rotation_mode {
                        RotationMode::VelocityDirection => {
                            self.smooth(Rotator::from_yaw(e.last_velocity_rotation.yaw), 800.0, rate, dt);
                        }
                        RotationMode::LookingDirection => {
                            let yaw = if ctx.gait == Gait::Sprinting {
                                e.last_velocity_rotation.yaw
                            } else {
                                e.aiming_rotation.yaw + ctx.yaw_offset_curve
                            };
                            self.smooth(Rotator::from_yaw(yaw), 500.0, rate, dt);
                        }
                        RotationMode::Aiming => {
                            self.smooth(Rotator::from_yaw(e.aiming_rotation.yaw), 1000.0, 20.0, dt);
                        }
                    }
                    return;
                }

                let aiming_third_person = ctx.view_mode == ViewMode::ThirdPerson && ctx.rotation_mode == RotationMode::Aiming;
                if aiming_third_person || ctx.view_mode == ViewMode::FirstPerson {
                    self.limit_rotation(e.aiming_rotation, -AIM_YAW_LIMIT, AIM_YAW_LIMIT, 20.0, dt);
                }

                // turn-in-place
                let amount = ctx.rotation_amount_curve;
                if amount.abs() > 0.001 {
                    let step = amount * (dt / ROTATION_AMOUNT_FRAME);
                    if ctx.role == NetRole::AutonomousProxy {
                        self.target.yaw = normalize_axis(self.target.yaw + step);
                        self.actor = self.target;
                    } else {
                        self.actor.yaw = normalize_axis(self.actor.yaw + step);
                    }
                    self.target = self.actor;
                }
            }
            MovementAction::Rolling => {
                if !ctx.network_optimizations && e.has_movement_input {
                    self.smooth(Rotator::from_yaw(e.last_movement_input_rotation.yaw), 0.0, 2.0, dt);
                }
            }
            _ => {}
        }
    }

    pub fn update_falling(&mut self, ctx: &RotationContext, dt: f32) {
        match ctx.rotation_mode {
            RotationMode::VelocityDirection | RotationMode::LookingDirection => {
                self.smooth(Rotator::from_yaw(self.in_air.yaw), 0.0, 5.0, dt);
            }
            RotationMode::Aiming => {
                self.smooth(Rotator::from_yaw(ctx.essentials.aiming_rotation.yaw), 0.0, 15.0, dt);
                self.in_air = self.actor;
            }
        }
    }

    pub fn update_flight(&mut self, ctx: &RotationContext, dt: f32) {
        let e = ctx.essentials;
        let mapped = ctx.mapped_speed;
        let rate = ctx.rotation_rate();

        let altitude_alpha = map_range_clamped(0.0, mapped * 100.0, 0.0, 1.0, ctx.relative_altitude);
        let rotation_alpha = altitude_alpha * (mapped / 3.0);

        // lean into the input direction: x forward, y right
        let input_dir = ctx.movement_input.normalize_or_zero();
        let lean = self.actor.unrotate(input_dir) * ctx.max_flight_lean * rotation_alpha;
        let pitch = f_interp_to(self.actor.pitch, -lean.x, dt, rate);
        let roll = f_interp_to(self.actor.roll, lean.y, dt, rate);

        if ctx.can_update_moving_rotation() {
            match ctx.rotation_mode {
                RotationMode::VelocityDirection => {
                    let interp = map_range_clamped(0.0, 3.0, 0.1, rate, mapped);
                    self.smooth(Rotator::new(pitch, e.last_velocity_rotation.yaw, roll), 100.0, interp, dt);
                }
                RotationMode::LookingDirection => {
                    let yaw = if ctx.gait == Gait::Sprinting {
                        e.last_velocity_rotation.yaw
                    } else {
                        e.aiming_rotation.yaw + ctx.yaw_offset_curve
                    };
                    self.smooth(Rotator::new(pitch, yaw, roll), 100.0, rate, dt);
                }
                RotationMode::Aiming => {
                    let roll = roll + e.aiming_rotation.roll / 2.0;
                    self.smooth(Rotator::new(pitch, e.aiming_rotation.yaw, roll), 500.0, rate, dt);
                }
            }
        } else {
            self.smooth(Rotator::from_yaw(self.actor.yaw), 500.0, rate, dt);
        }

        self.in_air = self.actor;
    }

    /// Pitch lean from forward acceleration, yaw follows aim.
    pub fn update_swimming(&mut self, ctx: &RotationContext, dt: f32) {
        let lean = map_range_unclamped(0.0, 3.0, 0.0, 90.0, ctx.mapped_speed);
        let forward_accel = self.actor.unrotate(ctx.essentials.acceleration).x;
        self.smooth(Rotator::new(lean * -forward_accel, ctx.essentials.aiming_rotation.yaw, 0.0), 0.0, 2.5, dt);
    }
}
