//! The locomotion character: discrete state machine, gait selection and the
//! per-tick driver.
//!
//! Setters follow one pattern: skip unless the value changes (or `force`),
//! record the previous value, assign, then run the matching `on_*_changed`
//! hook before returning. On the autonomous proxy the setter also queues a
//! reliable request so the authority can apply the same change.

use std::time::Duration;

use bevy::prelude::*;

use crate::adapter::{AllowedGaitChange, MovementAdapter};
use crate::config::LocomotionConfig;
use crate::driver::{
    curves, AnimationConsumer, Collaborators, DriverEvent, LocomotionHooks, MeshRef, MontageRef, MovementDriver,
    MovementLimits, SkeletalBody, WorldQuery,
};
use crate::essentials::{EssentialValues, KinematicSample};
use crate::events::{EventBus, LocomotionEvent};
use crate::flight::FlightValues;
use crate::input::InputState;
use crate::math::{Rotator, normalize_axis};
use crate::ragdoll::RagdollState;
use crate::replication::{LocomotionBroadcast, LocomotionRequest, OutgoingMessage};
use crate::rotation::{RotationContext, RotationState};
use crate::settings::{ModifierList, MovementModifier, MovementSettings, MovementSettingsPreset};
use crate::states::{
    movement_state_for, FlightState, Gait, GroundedEntryState, MovementAction, MovementState, NetRole, OverlayState,
    PhysicsMode, RotationMode, Stance, ViewMode,
};

// =============================================================================
// GAIT THRESHOLDS
// =============================================================================

pub mod gait {
    /// Input amount needed before sprinting is allowed.
    pub const SPRINT_INPUT_AMOUNT: f32 = 0.9;
    /// Max angle between input and aim for sprinting in looking mode.
    pub const SPRINT_MAX_AIM_DELTA: f32 = 50.0;
    /// Speed margin above the walk/run caps before the actual gait steps up.
    pub const GAIT_SPEED_MARGIN: f32 = 10.0;
}

/// Jump speed above which the in-air rotation follows velocity.
const JUMP_VELOCITY_ROTATION_SPEED: f32 = 100.0;
const BREAKFALL_PLAY_RATE: f32 = 1.35;

pub struct LocomotionCharacter {
    pub(crate) role: NetRole,
    pub(crate) locally_controlled: bool,
    pub(crate) network_optimizations: bool,
    server_driven: bool,
    pub(crate) config: LocomotionConfig,
    preset: MovementSettingsPreset,

    pub(crate) driver: Box<dyn MovementDriver>,
    pub(crate) body: Box<dyn SkeletalBody>,
    pub(crate) world: Box<dyn WorldQuery>,
    pub(crate) animation: Option<Box<dyn AnimationConsumer>>,
    pub(crate) hooks: Box<dyn LocomotionHooks>,

    pub(crate) movement_state: MovementState,
    pub(crate) prev_movement_state: MovementState,
    pub(crate) movement_action: MovementAction,
    pub(crate) stance: Stance,
    pub(crate) desired_stance: Stance,
    pub(crate) gait: Gait,
    pub(crate) desired_gait: Gait,
    pub(crate) rotation_mode: RotationMode,
    pub(crate) desired_rotation_mode: RotationMode,
    pub(crate) view_mode: ViewMode,
    pub(crate) flight_state: FlightState,
    pub(crate) overlay_state: OverlayState,
    overlay_override_state: i32,
    pub(crate) visible_mesh: Option<MeshRef>,
    grounded_entry_state: GroundedEntryState,
    right_shoulder: bool,
    breakfall_next_landing: bool,

    pub(crate) essentials: EssentialValues,
    pub(crate) rotation: RotationState,
    pub(crate) control_rotation: Rotator,
    pub(crate) adapter: MovementAdapter,
    modifiers: ModifierList,
    pub(crate) ragdoll: RagdollState,
    pub(crate) flight: FlightValues,
    pub(crate) input: InputState,

    last_physics_mode: PhysicsMode,
    landed_friction_timer: Option<Timer>,
    pub(crate) events: EventBus,
    outbox: Vec<OutgoingMessage>,
}

impl LocomotionCharacter {
    pub fn new(collaborators: Collaborators, role: NetRole, locally_controlled: bool) -> Self {
        let Collaborators {
            driver,
            body,
            world,
            animation,
            hooks,
        } = collaborators;
        Self {
            role,
            locally_controlled,
            network_optimizations: false,
            server_driven: false,
            config: LocomotionConfig::default(),
            preset: MovementSettingsPreset::default(),
            driver,
            body,
            world,
            animation,
            hooks,
            movement_state: MovementState::None,
            prev_movement_state: MovementState::None,
            movement_action: MovementAction::None,
            stance: Stance::Standing,
            desired_stance: Stance::Standing,
            gait: Gait::Walking,
            desired_gait: Gait::Running,
            rotation_mode: RotationMode::LookingDirection,
            desired_rotation_mode: RotationMode::LookingDirection,
            view_mode: ViewMode::ThirdPerson,
            flight_state: FlightState::None,
            overlay_state: OverlayState::Default,
            overlay_override_state: 0,
            visible_mesh: None,
            grounded_entry_state: GroundedEntryState::None,
            right_shoulder: false,
            breakfall_next_landing: false,
            essentials: EssentialValues::default(),
            rotation: RotationState::default(),
            control_rotation: Rotator::ZERO,
            adapter: MovementAdapter::default(),
            modifiers: ModifierList::default(),
            ragdoll: RagdollState::default(),
            flight: FlightValues::default(),
            input: InputState::default(),
            last_physics_mode: PhysicsMode::None,
            landed_friction_timer: None,
            events: EventBus::default(),
            outbox: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: LocomotionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_preset(mut self, preset: MovementSettingsPreset) -> Self {
        self.preset = preset;
        self
    }

    /// Networked instances disable the client-only rolling rotation.
    pub fn networked(mut self, networked: bool) -> Self {
        self.network_optimizations = networked;
        self
    }

    /// Authority copy driven by the host itself, with no owning client
    /// predicting for it. Such a copy resolves its own allowed gait.
    pub fn server_driven(mut self, server_driven: bool) -> Self {
        self.server_driven = server_driven;
        self
    }

    /// Spawn-complete initialization: mirror desired values into the actual
    /// states and seed rotations from the current facing.
    pub fn begin_play(&mut self, facing: Rotator) {
        self.rotation.actor = facing;
        self.driver.set_rotation(facing);
        self.sync_physics_mode();

        self.force_update_character_state();

        match self.stance {
            Stance::Standing => self.uncrouch(),
            Stance::Crouching => self.crouch(),
            Stance::Riding => {}
        }

        self.rotation.target = self.rotation.actor;
        self.essentials.last_velocity_rotation = self.rotation.actor;
        self.essentials.last_movement_input_rotation = self.rotation.actor;

        self.refresh_movement_settings();
        info!(
            "Locomotion character ready ({:?}, locally controlled: {}, state {:?})",
            self.role, self.locally_controlled, self.movement_state
        );
    }

    pub fn force_update_character_state(&mut self) {
        self.set_gait(self.desired_gait, true);
        self.set_stance(self.desired_stance, true);
        self.set_rotation_mode(self.desired_rotation_mode, true);
        self.set_view_mode(self.view_mode, true);
        self.set_overlay_state(self.overlay_state, true);
        self.set_movement_state(self.movement_state, true);
        self.set_movement_action(self.movement_action, true);
    }

    // =========================================================================
    // TICK
    // =========================================================================

    /// Step the collaborators, then run the locomotion tick.
    pub fn update(&mut self, dt: f32) {
        self.driver.simulate(dt);
        let location = self.driver.location();
        let velocity = self.driver.velocity();
        self.body.simulate(dt, location, velocity);
        self.tick(dt);
    }

    pub fn tick(&mut self, dt: f32) {
        self.input.world_time += dt;

        if self.driver.physics_mode() != self.last_physics_mode {
            self.sync_physics_mode();
        }
        for event in self.driver.drain_events() {
            self.handle_driver_event(event);
        }

        self.update_essential_values(dt);

        match self.movement_state {
            MovementState::None | MovementState::Mantling => {}
            MovementState::Grounded => {
                if self.stance != Stance::Riding {
                    self.update_character_movement();
                    self.update_rotation(dt, RotationState::update_grounded);
                }
            }
            MovementState::Freefall => self.update_rotation(dt, RotationState::update_falling),
            MovementState::Flight => {
                self.update_relative_altitude();
                self.update_character_movement();
                self.update_rotation(dt, RotationState::update_flight);
                if self.runs_flight_movement() {
                    self.update_flight_movement();
                }
            }
            MovementState::Swimming => {
                self.update_character_movement();
                self.update_rotation(dt, RotationState::update_swimming);
            }
            MovementState::Ragdoll => self.ragdoll_update(dt),
        }

        self.tick_timers(dt);

        let velocity = self.driver.velocity();
        self.essentials.cache(velocity);
        self.apply_movement_limits();
    }

    fn update_essential_values(&mut self, dt: f32) {
        let mode = self.driver.physics_mode();
        let velocity = self.driver.velocity();
        let max_acceleration = self
            .adapter
            .curve_limits(velocity, mode)
            .max_acceleration
            .unwrap_or_else(|| self.driver.max_acceleration());
        let sample = KinematicSample {
            velocity,
            input_acceleration: self.driver.input_acceleration(),
            control_rotation: self.control_rotation,
            max_acceleration,
        };
        self.essentials.update(&sample, self.role, self.locally_controlled, dt);
    }

    fn update_rotation(&mut self, dt: f32, policy: fn(&mut RotationState, &RotationContext, f32)) {
        let mut rotation = self.rotation;
        policy(&mut rotation, &self.rotation_context(), dt);
        self.rotation = rotation;
        self.driver.set_rotation(rotation.actor);
    }

    fn rotation_context(&self) -> RotationContext<'_> {
        let mapped_speed = self.mapped_speed();
        RotationContext {
            essentials: &self.essentials,
            rotation_mode: self.rotation_mode,
            view_mode: self.view_mode,
            gait: self.gait,
            movement_action: self.movement_action,
            role: self.role,
            network_optimizations: self.network_optimizations,
            has_root_motion: self.driver.has_root_motion(),
            mapped_speed,
            rotation_rate_curve: self.adapter.settings().rotation_rate_curve.sample(mapped_speed),
            yaw_offset_curve: self.anim_curve_value(curves::YAW_OFFSET),
            rotation_amount_curve: self.anim_curve_value(curves::ROTATION_AMOUNT),
            relative_altitude: self.flight.relative_altitude,
            movement_input: self.essentials.replicated_current_acceleration,
            max_flight_lean: self.config.max_flight_lean,
        }
    }

    fn tick_timers(&mut self, dt: f32) {
        if let Some(timer) = self.landed_friction_timer.as_mut() {
            timer.tick(Duration::from_secs_f32(dt.max(0.0)));
            if timer.just_finished() {
                self.driver.set_braking_friction_factor(0.0);
                self.landed_friction_timer = None;
            }
        }
        if self.modifiers.tick(dt) {
            self.refresh_movement_settings();
        }
    }

    /// Post-move step: push speed caps and curve-driven limits to the driver.
    fn apply_movement_limits(&mut self) {
        let velocity = self.driver.velocity();
        let mode = self.driver.physics_mode();
        let mut limits = self.adapter.curve_limits(velocity, mode);
        limits.max_speed = self.adapter.on_movement_updated();
        self.driver.apply_limits(limits);
    }

    fn handle_driver_event(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::Landed { velocity } => self.landed(velocity),
            DriverEvent::Jumped => self.jumped(),
            DriverEvent::Hit { velocity } => self.notify_hit(velocity),
            DriverEvent::StartCrouch => self.set_stance(Stance::Crouching, false),
            DriverEvent::EndCrouch => self.set_stance(Stance::Standing, false),
        }
    }

    // =========================================================================
    // PHYSICS MODE
    // =========================================================================

    pub(crate) fn set_physics_mode(&mut self, mode: PhysicsMode) {
        self.driver.set_physics_mode(mode);
        self.sync_physics_mode();
    }

    fn sync_physics_mode(&mut self) {
        let mode = self.driver.physics_mode();
        self.last_physics_mode = mode;
        self.set_movement_state(movement_state_for(mode), false);
    }

    pub fn crouch(&mut self) {
        if self.driver.crouch() {
            self.set_stance(Stance::Crouching, false);
        }
    }

    pub fn uncrouch(&mut self) {
        if self.driver.uncrouch() {
            self.set_stance(Stance::Standing, false);
        }
    }

    // =========================================================================
    // STATE SETTERS
    // =========================================================================

    pub fn set_movement_state(&mut self, state: MovementState, force: bool) {
        if force || self.movement_state != state {
            self.prev_movement_state = self.movement_state;
            self.movement_state = state;
            self.on_movement_state_changed(self.prev_movement_state);
        }
    }

    fn on_movement_state_changed(&mut self, previous: MovementState) {
        if self.movement_state != MovementState::Flight {
            self.set_flight_state(FlightState::None, false);
        }

        if self.movement_state == MovementState::Freefall {
            if self.movement_action == MovementAction::None {
                self.rotation.in_air = self.rotation.actor;
                if self.stance == Stance::Crouching {
                    self.uncrouch();
                }
            } else if self.movement_action == MovementAction::Rolling && self.config.ragdoll_on_rollfall {
                self.replicated_ragdoll_start();
            }
        }

        self.refresh_movement_settings();
        self.events.emit(LocomotionEvent::MovementStateChanged {
            previous,
            current: self.movement_state,
        });
    }

    pub fn set_movement_action(&mut self, action: MovementAction, force: bool) {
        if force || self.movement_action != action {
            let previous = self.movement_action;
            self.movement_action = action;
            self.on_movement_action_changed(previous);
        }
    }

    fn on_movement_action_changed(&mut self, previous: MovementAction) {
        if self.movement_action == MovementAction::Rolling {
            self.crouch();
        }
        if previous == MovementAction::Rolling {
            match self.desired_stance {
                Stance::Standing => self.uncrouch(),
                Stance::Crouching => self.crouch(),
                Stance::Riding => {}
            }
        }
        self.events.emit(LocomotionEvent::MovementActionChanged {
            previous,
            current: self.movement_action,
        });
    }

    pub fn set_stance(&mut self, stance: Stance, force: bool) {
        if force || self.stance != stance {
            self.stance = stance;
            self.refresh_movement_settings();
            self.events.emit(LocomotionEvent::StanceChanged(stance));
        }
    }

    pub fn set_gait(&mut self, gait: Gait, force: bool) {
        if force || self.gait != gait {
            let previous = self.gait;
            self.gait = gait;
            debug!("Gait {:?} -> {:?}", previous, gait);
        }
    }

    pub fn set_desired_stance(&mut self, stance: Stance) {
        self.desired_stance = stance;
        if self.role == NetRole::AutonomousProxy {
            self.send_to_authority(LocomotionRequest::SetDesiredStance(stance));
        }
    }

    pub fn set_desired_gait(&mut self, gait: Gait) {
        self.desired_gait = gait;
        if self.role == NetRole::AutonomousProxy {
            self.send_to_authority(LocomotionRequest::SetDesiredGait(gait));
        }
    }

    pub fn set_desired_rotation_mode(&mut self, mode: RotationMode) {
        self.desired_rotation_mode = mode;
        if self.role == NetRole::AutonomousProxy {
            self.send_to_authority(LocomotionRequest::SetDesiredRotationMode(mode));
        }
    }

    pub fn set_rotation_mode(&mut self, mode: RotationMode, force: bool) {
        if force || self.rotation_mode != mode {
            let previous = self.rotation_mode;
            self.rotation_mode = mode;
            self.on_rotation_mode_changed(previous);
            if self.role == NetRole::AutonomousProxy {
                self.send_to_authority(LocomotionRequest::SetRotationMode { mode, force });
            }
        }
    }

    pub(crate) fn on_rotation_mode_changed(&mut self, _previous: RotationMode) {
        if self.rotation_mode == RotationMode::VelocityDirection && self.view_mode == ViewMode::FirstPerson {
            // the requested rotation mode wins over the desired one here
            self.change_view_mode(ViewMode::ThirdPerson, false, false);
        }
        self.refresh_movement_settings();
        self.events.emit(LocomotionEvent::RotationModeChanged(self.rotation_mode));
    }

    pub fn set_view_mode(&mut self, mode: ViewMode, force: bool) {
        self.change_view_mode(mode, force, true);
    }

    fn change_view_mode(&mut self, mode: ViewMode, force: bool, restore_rotation_mode: bool) {
        if force || self.view_mode != mode {
            let previous = self.view_mode;
            self.view_mode = mode;
            self.on_view_mode_changed(previous, restore_rotation_mode);
            if self.role == NetRole::AutonomousProxy {
                self.send_to_authority(LocomotionRequest::SetViewMode { mode, force });
            }
        }
    }

    /// Third person returns to the desired rotation mode unless the switch
    /// was forced by a rotation-mode request.
    pub(crate) fn on_view_mode_changed(&mut self, _previous: ViewMode, restore_rotation_mode: bool) {
        match self.view_mode {
            ViewMode::ThirdPerson => {
                if restore_rotation_mode
                    && matches!(self.rotation_mode, RotationMode::VelocityDirection | RotationMode::LookingDirection)
                {
                    self.set_rotation_mode(self.desired_rotation_mode, false);
                }
            }
            ViewMode::FirstPerson => {
                if self.rotation_mode == RotationMode::VelocityDirection {
                    self.set_rotation_mode(RotationMode::LookingDirection, false);
                }
            }
        }
        self.events.emit(LocomotionEvent::ViewModeChanged(self.view_mode));
    }

    /// Entering any flight state requires `can_fly()`; a denied request
    /// leaves everything untouched.
    pub fn set_flight_state(&mut self, state: FlightState, force: bool) {
        if !(force || self.flight_state != state) {
            return;
        }
        if state != FlightState::None && !self.can_fly() {
            return;
        }

        let previous = self.flight_state;
        self.flight_state = state;
        self.on_flight_state_changed(previous);

        if state == FlightState::None {
            self.set_physics_mode(PhysicsMode::Falling);
        } else if previous == FlightState::None {
            self.set_physics_mode(PhysicsMode::Flying);
        }

        if self.role == NetRole::AutonomousProxy {
            self.send_to_authority(LocomotionRequest::SetFlightState { state, force });
        }
    }

    pub(crate) fn on_flight_state_changed(&mut self, previous: FlightState) {
        debug!("Flight state {:?} -> {:?}", previous, self.flight_state);
        self.refresh_movement_settings();
    }

    pub fn set_overlay_state(&mut self, state: OverlayState, force: bool) {
        if force || self.overlay_state != state {
            self.overlay_state = state;
            self.on_overlay_state_changed();
            if self.role == NetRole::AutonomousProxy {
                self.send_to_authority(LocomotionRequest::SetOverlayState { state, force });
            }
        }
    }

    pub(crate) fn on_overlay_state_changed(&mut self) {
        self.events.emit(LocomotionEvent::OverlayStateChanged(self.overlay_state));
    }

    /// Any non-authority instance forwards mesh swaps to the authority.
    pub fn set_visible_mesh(&mut self, mesh: MeshRef) {
        if self.visible_mesh.as_ref() == Some(&mesh) {
            return;
        }
        self.visible_mesh = Some(mesh.clone());
        self.on_visible_mesh_changed();
        if !self.role.is_authority() {
            self.send_to_authority(LocomotionRequest::SetVisibleMesh(mesh));
        }
    }

    pub(crate) fn on_visible_mesh_changed(&mut self) {
        if let Some(mesh) = self.visible_mesh.as_ref() {
            self.body.set_visible_mesh(mesh);
        }
        self.force_update_character_state();
    }

    pub fn set_overlay_override_state(&mut self, state: i32) {
        self.overlay_override_state = state;
    }

    pub fn set_grounded_entry_state(&mut self, state: GroundedEntryState) {
        self.grounded_entry_state = state;
    }

    pub fn set_right_shoulder(&mut self, right: bool) {
        self.right_shoulder = right;
    }

    /// Force a breakfall roll on the next landing regardless of speed.
    pub fn set_breakfall_next_landing(&mut self, enabled: bool) {
        self.breakfall_next_landing = enabled;
    }

    // =========================================================================
    // MOVEMENT SETTINGS
    // =========================================================================

    pub fn target_movement_settings(&self) -> MovementSettings {
        let mut settings = self
            .preset
            .resolve(self.rotation_mode, self.stance, self.movement_state)
            .clone();
        self.modifiers.apply_all(&mut settings, self.movement_state);
        settings
    }

    pub(crate) fn refresh_movement_settings(&mut self) {
        let settings = self.target_movement_settings();
        self.adapter.set_movement_settings(settings);
    }

    pub fn add_movement_modifier(&mut self, modifier: MovementModifier) {
        if !modifier.is_valid() {
            warn!("Ignoring invalid movement modifier {:?}", modifier.id);
            return;
        }
        self.modifiers.add(modifier);
        self.refresh_movement_settings();
    }

    pub fn remove_movement_modifier(&mut self, id: &str) {
        self.modifiers.remove(id);
        self.refresh_movement_settings();
    }

    pub fn set_movement_modifier_time(&mut self, id: &str, time: f32) {
        if self.modifiers.set_time(id, time) {
            self.refresh_movement_settings();
        }
    }

    pub fn mapped_speed(&self) -> f32 {
        self.adapter.mapped_speed(self.driver.velocity(), self.driver.physics_mode())
    }

    // =========================================================================
    // GAIT
    // =========================================================================

    pub fn can_sprint(&self) -> bool {
        let e = &self.essentials;
        if !e.has_movement_input || self.rotation_mode == RotationMode::Aiming {
            return false;
        }
        let enough_input = e.movement_input_amount > gait::SPRINT_INPUT_AMOUNT;
        match self.rotation_mode {
            RotationMode::VelocityDirection => enough_input,
            RotationMode::LookingDirection => {
                let input_rotation = Rotator::from_direction(e.replicated_current_acceleration);
                let delta = normalize_axis(input_rotation.yaw - e.aiming_rotation.yaw);
                enough_input && delta.abs() < gait::SPRINT_MAX_AIM_DELTA
            }
            RotationMode::Aiming => false,
        }
    }

    /// Highest gait the character may use right now.
    pub fn allowed_gait(&self) -> Gait {
        if self.stance == Stance::Standing && self.rotation_mode != RotationMode::Aiming {
            if self.desired_gait == Gait::Sprinting {
                return if self.can_sprint() { Gait::Sprinting } else { Gait::Running };
            }
            return self.desired_gait;
        }
        if self.desired_gait == Gait::Sprinting {
            Gait::Running
        } else {
            self.desired_gait
        }
    }

    /// Gait observed from speed, so the gait only drops once the character
    /// has actually slowed down.
    pub fn actual_gait(&self, allowed: Gait) -> Gait {
        let settings = self.adapter.settings();
        let speed = self.essentials.speed;
        if speed > settings.run_speed + gait::GAIT_SPEED_MARGIN {
            if allowed == Gait::Sprinting {
                Gait::Sprinting
            } else {
                Gait::Running
            }
        } else if speed >= settings.walk_speed + gait::GAIT_SPEED_MARGIN {
            Gait::Running
        } else {
            Gait::Walking
        }
    }

    fn update_character_movement(&mut self) {
        let allowed = self.allowed_gait();
        let actual = self.actual_gait(allowed);
        if actual != self.gait {
            self.set_gait(actual, false);
        }

        let resolves_gait = self.locally_controlled || (self.server_driven && self.role.is_authority());
        match self.adapter.set_allowed_gait(allowed, resolves_gait, self.role) {
            AllowedGaitChange::Predicted { notify_authority: true } => {
                self.send_to_authority(LocomotionRequest::SetAllowedGait(allowed));
            }
            AllowedGaitChange::RemoteMaxSpeed(max_speed) => {
                self.driver.apply_limits(MovementLimits {
                    max_speed: Some(max_speed),
                    ..default()
                });
            }
            _ => {}
        }
    }

    // =========================================================================
    // LANDING / JUMPING / MONTAGES
    // =========================================================================

    pub fn landed(&mut self, velocity: Vec3) {
        if self.locally_controlled {
            self.event_on_landed(velocity);
        }
        if self.role.is_authority() {
            self.multicast(LocomotionBroadcast::Landed);
        }
    }

    pub(crate) fn event_on_landed(&mut self, velocity: Vec3) {
        let vertical = velocity.y.abs();
        let has_input = self.essentials.has_movement_input;

        if self.config.ragdoll_on_land && vertical > self.config.ragdoll_on_land_velocity {
            self.replicated_ragdoll_start();
        } else if self.config.breakfall_on_land
            && ((has_input && vertical >= self.config.breakfall_on_land_velocity) || self.breakfall_next_landing)
        {
            self.on_breakfall();
            self.breakfall_next_landing = false;
        } else {
            self.driver.set_braking_friction_factor(if has_input { 0.5 } else { 3.0 });
            // re-arming replaces any pending reset
            self.landed_friction_timer = Some(Timer::from_seconds(
                self.config.landed_friction_reset_secs,
                TimerMode::Once,
            ));
        }
        self.events.emit(LocomotionEvent::Landed);
    }

    fn on_breakfall(&mut self) {
        if let Some(montage) = self.hooks.roll_animation() {
            self.replicated_play_montage(montage, BREAKFALL_PLAY_RATE);
        }
        self.events.emit(LocomotionEvent::Breakfall);
    }

    pub fn jumped(&mut self) {
        if self.locally_controlled {
            self.event_on_jumped();
        }
        if self.role.is_authority() {
            self.multicast(LocomotionBroadcast::Jumped);
        }
    }

    pub(crate) fn event_on_jumped(&mut self) {
        self.rotation.in_air = if self.essentials.speed > JUMP_VELOCITY_ROTATION_SPEED {
            self.essentials.last_velocity_rotation
        } else {
            self.rotation.actor
        };
        self.events.emit(LocomotionEvent::Jumped);
    }

    /// Play locally and have the authority relay it to everyone else.
    pub fn replicated_play_montage(&mut self, montage: MontageRef, rate: f32) {
        if self.role.is_authority() {
            self.server_play_montage(montage, rate);
            return;
        }
        self.play_montage(&montage, rate);
        self.send_to_authority(LocomotionRequest::PlayMontage { montage, rate });
    }

    fn server_play_montage(&mut self, montage: MontageRef, rate: f32) {
        self.play_montage(&montage, rate);
        self.outbox.push(OutgoingMessage::ToAll(LocomotionBroadcast::PlayMontage { montage, rate }));
    }

    pub(crate) fn play_montage(&mut self, montage: &MontageRef, rate: f32) {
        if let Some(animation) = self.animation.as_mut() {
            animation.play_montage(montage, rate);
        }
    }

    pub(crate) fn anim_curve_value(&self, name: &str) -> f32 {
        self.animation.as_ref().map_or(0.0, |a| a.curve_value(name))
    }

    fn landed_friction_pending(&self) -> bool {
        self.landed_friction_timer.is_some()
    }

    // =========================================================================
    // NETWORK ROUTING
    // =========================================================================

    pub(crate) fn send_to_authority(&mut self, request: LocomotionRequest) {
        self.outbox.push(OutgoingMessage::ToAuthority(request));
    }

    /// Authority broadcast: queued for every observer and also run here.
    pub(crate) fn multicast(&mut self, broadcast: LocomotionBroadcast) {
        self.outbox.push(OutgoingMessage::ToAll(broadcast.clone()));
        self.handle_broadcast(broadcast);
    }

    /// Messages queued since the last call, in order.
    pub fn drain_outgoing(&mut self) -> Vec<OutgoingMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Apply a proxy request. Only the authority acts on these.
    pub fn handle_request(&mut self, request: LocomotionRequest) {
        if !self.role.is_authority() {
            warn!("Dropping {:?}: not the authority", request);
            return;
        }
        match request {
            LocomotionRequest::SetDesiredStance(stance) => self.set_desired_stance(stance),
            LocomotionRequest::SetDesiredGait(gait) => self.set_desired_gait(gait),
            LocomotionRequest::SetDesiredRotationMode(mode) => self.set_desired_rotation_mode(mode),
            LocomotionRequest::SetRotationMode { mode, force } => self.set_rotation_mode(mode, force),
            LocomotionRequest::SetViewMode { mode, force } => self.set_view_mode(mode, force),
            LocomotionRequest::SetOverlayState { state, force } => self.set_overlay_state(state, force),
            // the authority re-checks flight conditions itself
            LocomotionRequest::SetFlightState { state, .. } => self.set_flight_state(state, false),
            LocomotionRequest::SetVisibleMesh(mesh) => self.set_visible_mesh(mesh),
            LocomotionRequest::SetAllowedGait(gait) => self.adapter.server_set_allowed_gait(gait),
            LocomotionRequest::RagdollStart => self.multicast(LocomotionBroadcast::RagdollStart),
            LocomotionRequest::RagdollEnd { location } => self.multicast(LocomotionBroadcast::RagdollEnd { location }),
            LocomotionRequest::PlayMontage { montage, rate } => self.server_play_montage(montage, rate),
            LocomotionRequest::SetMeshLocationDuringRagdoll { location } => self.ragdoll.target_location = location,
        }
    }

    /// Apply an authority broadcast.
    pub fn handle_broadcast(&mut self, broadcast: LocomotionBroadcast) {
        match broadcast {
            LocomotionBroadcast::RagdollStart => self.ragdoll_start(),
            LocomotionBroadcast::RagdollEnd { .. } => self.ragdoll_end(),
            LocomotionBroadcast::Landed => {
                if !self.locally_controlled {
                    let velocity = self.driver.velocity();
                    self.event_on_landed(velocity);
                }
            }
            LocomotionBroadcast::Jumped => {
                if !self.locally_controlled {
                    self.event_on_jumped();
                }
            }
            LocomotionBroadcast::PlayMontage { montage, rate } => {
                if !self.locally_controlled {
                    self.play_montage(&montage, rate);
                }
            }
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn role(&self) -> NetRole {
        self.role
    }

    pub fn is_locally_controlled(&self) -> bool {
        self.locally_controlled
    }

    pub fn config(&self) -> &LocomotionConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut LocomotionConfig {
        &mut self.config
    }

    pub fn movement_state(&self) -> MovementState {
        self.movement_state
    }

    pub fn prev_movement_state(&self) -> MovementState {
        self.prev_movement_state
    }

    pub fn movement_action(&self) -> MovementAction {
        self.movement_action
    }

    pub fn stance(&self) -> Stance {
        self.stance
    }

    pub fn desired_stance(&self) -> Stance {
        self.desired_stance
    }

    pub fn gait(&self) -> Gait {
        self.gait
    }

    pub fn desired_gait(&self) -> Gait {
        self.desired_gait
    }

    pub fn rotation_mode(&self) -> RotationMode {
        self.rotation_mode
    }

    pub fn desired_rotation_mode(&self) -> RotationMode {
        self.desired_rotation_mode
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn flight_state(&self) -> FlightState {
        self.flight_state
    }

    pub fn overlay_state(&self) -> OverlayState {
        self.overlay_state
    }

    pub fn overlay_override_state(&self) -> i32 {
        self.overlay_override_state
    }

    pub fn visible_mesh(&self) -> Option<&MeshRef> {
        self.visible_mesh.as_ref()
    }

    pub fn grounded_entry_state(&self) -> GroundedEntryState {
        self.grounded_entry_state
    }

    pub fn is_right_shoulder(&self) -> bool {
        self.right_shoulder
    }

    /// Third person FOV, first person FOV and shoulder side for the camera.
    pub fn camera_parameters(&self) -> (f32, f32, bool) {
        (self.config.third_person_fov, self.config.first_person_fov, self.right_shoulder)
    }

    pub fn essentials(&self) -> &EssentialValues {
        &self.essentials
    }

    pub fn essentials_mut(&mut self) -> &mut EssentialValues {
        &mut self.essentials
    }

    pub fn actor_rotation(&self) -> Rotator {
        self.rotation.actor
    }

    pub fn target_rotation(&self) -> Rotator {
        self.rotation.target
    }

    pub fn in_air_rotation(&self) -> Rotator {
        self.rotation.in_air
    }

    pub fn control_rotation(&self) -> Rotator {
        self.control_rotation
    }

    pub fn set_control_rotation(&mut self, rotation: Rotator) {
        self.control_rotation = rotation;
    }

    pub fn adapter(&self) -> &MovementAdapter {
        &self.adapter
    }

    pub fn modifiers(&self) -> &ModifierList {
        &self.modifiers
    }

    pub fn ragdoll(&self) -> &RagdollState {
        &self.ragdoll
    }

    pub fn flight(&self) -> &FlightValues {
        &self.flight
    }

    pub fn driver(&self) -> &dyn MovementDriver {
        self.driver.as_ref()
    }

    pub fn driver_mut(&mut self) -> &mut dyn MovementDriver {
        self.driver.as_mut()
    }

    pub fn body(&self) -> &dyn SkeletalBody {
        self.body.as_ref()
    }

    pub fn body_mut(&mut self) -> &mut dyn SkeletalBody {
        self.body.as_mut()
    }

    pub fn world(&self) -> &dyn WorldQuery {
        self.world.as_ref()
    }

    pub fn is_landed_friction_reset_pending(&self) -> bool {
        self.landed_friction_pending()
    }
}

impl std::fmt::Debug for LocomotionCharacter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocomotionCharacter")
            .field("role", &self.role)
            .field("movement_state", &self.movement_state)
            .field("movement_action", &self.movement_action)
            .field("stance", &self.stance)
            .field("gait", &self.gait)
            .field("rotation_mode", &self.rotation_mode)
            .field("view_mode", &self.view_mode)
            .field("flight_state", &self.flight_state)
            .finish_non_exhaustive()
    }
}
