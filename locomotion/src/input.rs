//! Player input actions and how they drive the character.
//!
//! Movement is camera relative: forward/right/up are taken from the aim yaw,
//! never the actor facing.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::character::LocomotionCharacter;
use crate::events::LocomotionEvent;
use crate::math::{normalize_axis, Rotator};
use crate::states::{Gait, MovementAction, MovementState, RotationMode, Stance, ViewMode};

pub const ROLL_PLAY_RATE: f32 = 1.15;
/// Camera pitch is kept just short of straight up/down.
pub const MAX_CONTROL_PITCH: f32 = 89.9;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub enum InputAction {
    MoveForward(f32),
    MoveRight(f32),
    MoveUp(f32),
    CameraUp(f32),
    CameraRight(f32),
    Jump(bool),
    Sprint(bool),
    Aim(bool),
    CameraTap,
    CameraHeld,
    Stance,
    Walk,
    Ragdoll,
    VelocityDirection,
    LookingDirection,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InputState {
    /// Seconds since the character started ticking.
    pub world_time: f32,
    pub last_stance_input_time: f32,
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            world_time: 0.0,
            // a first press can never complete a double tap
            last_stance_input_time: f32::NEG_INFINITY,
        }
    }
}

impl LocomotionCharacter {
    pub fn apply_input(&mut self, action: InputAction) {
        match action {
            InputAction::MoveForward(value) => self.move_along(Rotator::forward, value),
            InputAction::MoveRight(value) => self.move_along(Rotator::right, value),
            InputAction::MoveUp(value) => self.move_along(Rotator::up, value),
            InputAction::CameraUp(value) => self.add_controller_pitch_input(self.config.look_up_down_rate * value),
            InputAction::CameraRight(value) => self.add_controller_yaw_input(self.config.look_left_right_rate * value),
            InputAction::Jump(pressed) => self.jump_action(pressed),
            InputAction::Sprint(pressed) => {
                self.set_desired_gait(if pressed { Gait::Sprinting } else { Gait::Running });
            }
            InputAction::Aim(pressed) => self.aim_action(pressed),
            InputAction::CameraTap => {
                if self.view_mode != ViewMode::FirstPerson {
                    self.set_right_shoulder(!self.is_right_shoulder());
                }
            }
            InputAction::CameraHeld => {
                let next = match self.view_mode {
                    ViewMode::FirstPerson => ViewMode::ThirdPerson,
                    ViewMode::ThirdPerson => ViewMode::FirstPerson,
                };
                self.set_view_mode(next, false);
            }
            InputAction::Stance => self.stance_action(),
            InputAction::Walk => match self.desired_gait {
                Gait::Walking => self.set_desired_gait(Gait::Running),
                Gait::Running => self.set_desired_gait(Gait::Walking),
                Gait::Sprinting => {}
            },
            InputAction::Ragdoll => {
                if self.movement_state == MovementState::Ragdoll {
                    self.replicated_ragdoll_end();
                } else {
                    self.replicated_ragdoll_start();
                }
            }
            InputAction::VelocityDirection => {
                self.set_desired_rotation_mode(RotationMode::VelocityDirection);
                self.set_rotation_mode(RotationMode::VelocityDirection, false);
            }
            InputAction::LookingDirection => {
                self.set_desired_rotation_mode(RotationMode::LookingDirection);
                self.set_rotation_mode(RotationMode::LookingDirection, false);
            }
        }
    }

    fn move_along(&mut self, axis: fn(Rotator) -> Vec3, value: f32) {
        if matches!(self.movement_state, MovementState::None | MovementState::Ragdoll) {
            return;
        }
        let direction = axis(Rotator::from_yaw(self.essentials.aiming_rotation.yaw));
        self.add_movement_input(direction, value);
    }

    pub fn add_controller_pitch_input(&mut self, delta: f32) {
        self.control_rotation.pitch = (self.control_rotation.pitch + delta).clamp(-MAX_CONTROL_PITCH, MAX_CONTROL_PITCH);
    }

    pub fn add_controller_yaw_input(&mut self, delta: f32) {
        self.control_rotation.yaw = normalize_axis(self.control_rotation.yaw + delta);
    }

    fn jump_action(&mut self, pressed: bool) {
        if !pressed {
            return;
        }
        self.events.emit(LocomotionEvent::JumpPressed);

        if self.movement_action != MovementAction::None {
            return;
        }
        match self.movement_state {
            MovementState::Grounded => match self.stance {
                Stance::Standing => self.driver.jump(),
                Stance::Crouching => self.uncrouch(),
                Stance::Riding => {}
            },
            MovementState::Ragdoll => self.replicated_ragdoll_end(),
            _ => {}
        }
    }

    fn aim_action(&mut self, pressed: bool) {
        if pressed {
            self.set_rotation_mode(RotationMode::Aiming, false);
            return;
        }
        match self.view_mode {
            ViewMode::ThirdPerson => self.set_rotation_mode(self.desired_rotation_mode, false),
            ViewMode::FirstPerson => self.set_rotation_mode(RotationMode::LookingDirection, false),
        }
    }

    /// Toggle crouch; a second press inside the double-tap window rolls.
    fn stance_action(&mut self) {
        if self.movement_action != MovementAction::None {
            return;
        }

        let previous = self.input.last_stance_input_time;
        self.input.last_stance_input_time = self.input.world_time;

        if self.input.last_stance_input_time - previous <= self.config.roll_double_tap_timeout {
            if let Some(roll) = self.hooks.roll_animation() {
                self.replicated_play_montage(roll, ROLL_PLAY_RATE);
            }
            match self.stance {
                Stance::Standing => self.set_desired_stance(Stance::Crouching),
                Stance::Crouching => self.set_desired_stance(Stance::Standing),
                Stance::Riding => {}
            }
            return;
        }

        if self.movement_state == MovementState::Grounded {
            match self.stance {
                Stance::Standing => {
                    self.set_desired_stance(Stance::Crouching);
                    self.crouch();
                }
                Stance::Crouching => {
                    self.set_desired_stance(Stance::Standing);
                    self.uncrouch();
                }
                Stance::Riding => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MontageRef;
    use crate::states::NetRole;
    use crate::testing::character;

    const DT: f32 = 1.0 / 60.0;

    fn ticks(c: &mut LocomotionCharacter, n: usize) {
        for _ in 0..n {
            c.tick(DT);
        }
    }

    #[test]
    fn test_movement_is_camera_relative() {
        let (mut c, h) = character(NetRole::Authority, true);
        c.essentials_mut().aiming_rotation = Rotator::ZERO;

        c.apply_input(InputAction::MoveForward(1.0));
        assert!(h.driver().movement_input.abs_diff_eq(Vec3::NEG_Z, 1e-5));

        h.driver().movement_input = Vec3::ZERO;
        c.apply_input(InputAction::MoveRight(0.5));
        assert!(h.driver().movement_input.abs_diff_eq(Vec3::new(0.5, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn test_movement_ignored_while_ragdolling() {
        let (mut c, h) = character(NetRole::Authority, true);
        c.apply_input(InputAction::Ragdoll);
        assert!(c.is_ragdolling());

        c.apply_input(InputAction::MoveForward(1.0));
        assert_eq!(h.driver().movement_input, Vec3::ZERO);
    }

    #[test]
    fn test_camera_pitch_clamped() {
        let (mut c, _h) = character(NetRole::Authority, true);
        c.apply_input(InputAction::CameraUp(100.0));
        assert_eq!(c.control_rotation().pitch, MAX_CONTROL_PITCH);
        c.apply_input(InputAction::CameraUp(-200.0));
        assert_eq!(c.control_rotation().pitch, -MAX_CONTROL_PITCH);
    }

    #[test]
    fn test_camera_yaw_wraps() {
        let (mut c, _h) = character(NetRole::Authority, true);
        c.set_control_rotation(Rotator::from_yaw(170.0));
        c.apply_input(InputAction::CameraRight(16.0));
        assert!((c.control_rotation().yaw - -170.0).abs() < 1e-3);
    }

    #[test]
    fn test_jump_when_standing() {
        let (mut c, h) = character(NetRole::Authority, true);
        c.apply_input(InputAction::Jump(false));
        assert_eq!(h.driver().jumps, 0);
        assert!(h.take_events().is_empty());

        c.apply_input(InputAction::Jump(true));
        assert_eq!(h.driver().jumps, 1);
        assert_eq!(h.take_events(), vec![LocomotionEvent::JumpPressed]);
    }

    #[test]
    fn test_jump_when_crouched_stands_up() {
        let (mut c, h) = character(NetRole::Authority, true);
        c.apply_input(InputAction::Stance);
        assert_eq!(c.stance(), Stance::Crouching);

        c.apply_input(InputAction::Jump(true));
        assert_eq!(c.stance(), Stance::Standing);
        assert_eq!(h.driver().jumps, 0);
    }

    #[test]
    fn test_jump_gets_up_from_ragdoll() {
        let (mut c, _h) = character(NetRole::Authority, true);
        c.apply_input(InputAction::Ragdoll);
        c.tick(DT);
        c.apply_input(InputAction::Jump(true));
        assert!(!c.is_ragdolling());
        assert_eq!(c.movement_state(), MovementState::Grounded);
    }

    #[test]
    fn test_stance_toggles_crouch() {
        let (mut c, _h) = character(NetRole::Authority, true);
        c.apply_input(InputAction::Stance);
        assert_eq!(c.stance(), Stance::Crouching);
        assert_eq!(c.desired_stance(), Stance::Crouching);

        ticks(&mut c, 30);
        c.apply_input(InputAction::Stance);
        assert_eq!(c.stance(), Stance::Standing);
        assert_eq!(c.desired_stance(), Stance::Standing);
    }

    #[test]
    fn test_stance_double_tap_rolls() {
        let (mut c, h) = character(NetRole::Authority, true);
        c.apply_input(InputAction::Stance);
        ticks(&mut c, 6);
        c.apply_input(InputAction::Stance);

        assert_eq!(
            h.animation().played.last(),
            Some(&(MontageRef::new("Roll"), ROLL_PLAY_RATE))
        );
        // the roll flips the desired stance but leaves the capsule crouched
        assert_eq!(c.desired_stance(), Stance::Standing);
        assert_eq!(c.stance(), Stance::Crouching);
    }

    #[test]
    fn test_first_stance_press_never_rolls() {
        let (mut c, h) = character(NetRole::Authority, true);
        c.apply_input(InputAction::Stance);
        assert!(h.animation().played.is_empty());
    }

    #[test]
    fn test_aim_release_restores_rotation_mode() {
        let (mut c, _h) = character(NetRole::Authority, true);
        c.apply_input(InputAction::VelocityDirection);
        assert_eq!(c.rotation_mode(), RotationMode::VelocityDirection);

        c.apply_input(InputAction::Aim(true));
        assert_eq!(c.rotation_mode(), RotationMode::Aiming);
        c.apply_input(InputAction::Aim(false));
        assert_eq!(c.rotation_mode(), RotationMode::VelocityDirection);
    }

    #[test]
    fn test_aim_release_in_first_person_looks() {
        let (mut c, _h) = character(NetRole::Authority, true);
        c.set_view_mode(ViewMode::FirstPerson, false);
        c.apply_input(InputAction::Aim(true));
        c.apply_input(InputAction::Aim(false));
        assert_eq!(c.rotation_mode(), RotationMode::LookingDirection);
    }

    #[test]
    fn test_camera_tap_swaps_shoulder_in_third_person() {
        let (mut c, _h) = character(NetRole::Authority, true);
        let before = c.is_right_shoulder();
        c.apply_input(InputAction::CameraTap);
        assert_eq!(c.is_right_shoulder(), !before);

        c.set_view_mode(ViewMode::FirstPerson, false);
        c.apply_input(InputAction::CameraTap);
        assert_eq!(c.is_right_shoulder(), !before);
    }

    #[test]
    fn test_camera_held_toggles_view() {
        let (mut c, _h) = character(NetRole::Authority, true);
        c.apply_input(InputAction::CameraHeld);
        assert_eq!(c.view_mode(), ViewMode::FirstPerson);
        c.apply_input(InputAction::CameraHeld);
        assert_eq!(c.view_mode(), ViewMode::ThirdPerson);
    }

    #[test]
    fn test_walk_and_sprint_set_desired_gait() {
        let (mut c, _h) = character(NetRole::Authority, true);
        c.apply_input(InputAction::Walk);
        assert_eq!(c.desired_gait(), Gait::Walking);
        c.apply_input(InputAction::Walk);
        assert_eq!(c.desired_gait(), Gait::Running);

        c.apply_input(InputAction::Sprint(true));
        assert_eq!(c.desired_gait(), Gait::Sprinting);
        c.apply_input(InputAction::Walk);
        assert_eq!(c.desired_gait(), Gait::Sprinting);
        c.apply_input(InputAction::Sprint(false));
        assert_eq!(c.desired_gait(), Gait::Running);
    }

    #[test]
    fn test_ragdoll_input_toggles() {
        let (mut c, _h) = character(NetRole::Authority, true);
        c.apply_input(InputAction::Ragdoll);
        assert!(c.is_ragdolling());
        c.tick(DT);
        c.apply_input(InputAction::Ragdoll);
        assert!(!c.is_ragdolling());
    }

    #[test]
    fn test_input_action_ron() {
        let text = ron::to_string(&InputAction::MoveForward(0.5)).unwrap();
        assert_eq!(ron::from_str::<InputAction>(&text).unwrap(), InputAction::MoveForward(0.5));
    }
}
