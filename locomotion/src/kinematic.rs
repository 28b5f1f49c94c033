//! Lightweight character-controller physics for hosts without a full engine.
//!
//! - Capsule on an infinite flat ground plane
//! - Acceleration toward the input direction, braking without input
//! - Gravity, jumping, landing and ground snapping
//! - A single point mass standing in for the ragdoll skeleton
//!
//! Good enough to drive the locomotion core on a headless server and in
//! tests. Real rigid-body ragdolls belong to a proper physics engine.

use bevy::prelude::*;

use crate::driver::{
    DriverEvent, MeshCollision, MeshRef, MovementDriver, MovementLimits, SkeletalBody, Socket, TraceHit, WorldQuery,
};
use crate::math::{size_2d, Rotator};
use crate::states::PhysicsMode;

/// Gravity in cm/s^2 (negative Y).
pub const GRAVITY: f32 = -980.0;

/// Jump velocity in cm/s (upward).
pub const JUMP_VELOCITY: f32 = 450.0;

/// Share of ground acceleration available while falling.
pub const AIR_CONTROL: f32 = 0.15;

/// How close to the ground we "snap" when walking (prevents tiny hovering).
pub const GROUND_SNAP_DISTANCE: f32 = 5.0;

pub const STANDING_HALF_HEIGHT: f32 = 90.0;
pub const CROUCHED_HALF_HEIGHT: f32 = 60.0;

// =============================================================================
// CAPSULE
// =============================================================================

#[derive(Clone, Debug)]
pub struct KinematicBody {
    pub location: Vec3,
    pub velocity: Vec3,
    pub rotation: Rotator,
    pub mode: PhysicsMode,
    /// Height of the flat ground plane.
    pub ground_height: f32,
    pub max_speed: f32,
    pub max_acceleration: f32,
    pub braking_deceleration: f32,
    pub ground_friction: f32,
    pub braking_friction_factor: f32,
    pub can_fly: bool,
    half_height: f32,
    crouched: bool,
    pending_input: Vec3,
    input_acceleration: Vec3,
    jump_requested: bool,
    capsule_collision: bool,
    replicate_movement: bool,
    events: Vec<DriverEvent>,
}

impl Default for KinematicBody {
    fn default() -> Self {
        Self {
            location: Vec3::new(0.0, STANDING_HALF_HEIGHT, 0.0),
            velocity: Vec3::ZERO,
            rotation: Rotator::ZERO,
            mode: PhysicsMode::Walking,
            ground_height: 0.0,
            max_speed: 165.0,
            max_acceleration: 1500.0,
            braking_deceleration: 1500.0,
            ground_friction: 8.0,
            braking_friction_factor: 0.0,
            can_fly: true,
            half_height: STANDING_HALF_HEIGHT,
            crouched: false,
            pending_input: Vec3::ZERO,
            input_acceleration: Vec3::ZERO,
            jump_requested: false,
            capsule_collision: true,
            replicate_movement: true,
            events: Vec::new(),
        }
    }
}

impl KinematicBody {
    /// Standing on the ground at `position` (x/z; y is snapped to the floor).
    pub fn standing_at(position: Vec3, ground_height: f32) -> Self {
        Self {
            location: Vec3::new(position.x, ground_height + STANDING_HALF_HEIGHT, position.z),
            ground_height,
            ..default()
        }
    }

    pub fn is_crouched(&self) -> bool {
        self.crouched
    }

    pub fn replicates_movement(&self) -> bool {
        self.replicate_movement
    }

    fn floor_center(&self) -> f32 {
        self.ground_height + self.half_height
    }

    /// Accelerate `current` toward `desired`, changing by at most `accel * dt`.
    fn approach(current: Vec3, desired: Vec3, accel: f32, dt: f32) -> Vec3 {
        let delta = desired - current;
        let max_change = accel * dt;
        let delta_len = delta.length();
        if delta_len <= max_change {
            desired
        } else {
            current + delta * (max_change / delta_len)
        }
    }

    fn brake(&self) -> f32 {
        self.braking_deceleration + self.ground_friction * self.braking_friction_factor * size_2d(self.velocity)
    }

    fn step_walking(&mut self, input: Vec3, dt: f32) {
        let move_dir = Vec3::new(input.x, 0.0, input.z).normalize_or_zero();
        let desired = move_dir * self.max_speed * input.length().min(1.0);
        let horiz = Vec3::new(self.velocity.x, 0.0, self.velocity.z);
        let accel = if move_dir != Vec3::ZERO { self.max_acceleration } else { self.brake() };
        let horiz = Self::approach(horiz, desired, accel, dt);
        self.velocity.x = horiz.x;
        self.velocity.z = horiz.z;

        if self.jump_requested && !self.crouched {
            self.velocity.y = JUMP_VELOCITY;
            self.mode = PhysicsMode::Falling;
            self.events.push(DriverEvent::Jumped);
        }
    }

    fn step_falling(&mut self, input: Vec3, dt: f32) {
        let move_dir = Vec3::new(input.x, 0.0, input.z).normalize_or_zero();
        if move_dir != Vec3::ZERO {
            let horiz = Vec3::new(self.velocity.x, 0.0, self.velocity.z);
            let horiz = Self::approach(horiz, move_dir * self.max_speed, self.max_acceleration * AIR_CONTROL, dt);
            self.velocity.x = horiz.x;
            self.velocity.z = horiz.z;
        }
        self.velocity.y += GRAVITY * dt;
    }

    fn step_fluid(&mut self, input: Vec3, dt: f32) {
        let move_dir = input.normalize_or_zero();
        let desired = move_dir * self.max_speed * input.length().min(1.0);
        let accel = if move_dir != Vec3::ZERO { self.max_acceleration } else { self.brake() };
        self.velocity = Self::approach(self.velocity, desired, accel, dt);
    }

    fn collide_with_ground(&mut self) {
        let target_y = self.floor_center();
        match self.mode {
            PhysicsMode::Falling => {
                if self.location.y <= target_y && self.velocity.y <= 0.0 {
                    self.events.push(DriverEvent::Landed { velocity: self.velocity });
                    self.location.y = target_y;
                    self.velocity.y = 0.0;
                    self.mode = PhysicsMode::Walking;
                }
            }
            PhysicsMode::Walking | PhysicsMode::NavWalking => {
                if self.location.y - target_y > GROUND_SNAP_DISTANCE {
                    self.mode = PhysicsMode::Falling;
                } else {
                    self.location.y = target_y;
                    self.velocity.y = 0.0;
                }
            }
            PhysicsMode::Flying | PhysicsMode::Swimming => {
                if self.location.y < target_y {
                    self.events.push(DriverEvent::Hit { velocity: self.velocity });
                    self.location.y = target_y;
                    self.velocity.y = self.velocity.y.max(0.0);
                }
            }
            PhysicsMode::None | PhysicsMode::Custom => {}
        }
    }
}

impl MovementDriver for KinematicBody {
    fn simulate(&mut self, dt: f32) {
        let input = self.pending_input.clamp_length_max(1.0);
        self.pending_input = Vec3::ZERO;
        self.input_acceleration = input * self.max_acceleration;

        match self.mode {
            PhysicsMode::Walking | PhysicsMode::NavWalking => self.step_walking(input, dt),
            PhysicsMode::Falling => self.step_falling(input, dt),
            PhysicsMode::Flying | PhysicsMode::Swimming => self.step_fluid(input, dt),
            PhysicsMode::None | PhysicsMode::Custom => {
                self.jump_requested = false;
                return;
            }
        }
        self.jump_requested = false;

        self.location += self.velocity * dt;
        if self.capsule_collision {
            self.collide_with_ground();
        }
    }

    fn location(&self) -> Vec3 {
        self.location
    }

    fn set_location(&mut self, location: Vec3) {
        self.location = location;
    }

    fn velocity(&self) -> Vec3 {
        self.velocity
    }

    fn set_velocity(&mut self, velocity: Vec3) {
        self.velocity = velocity;
    }

    fn set_rotation(&mut self, rotation: Rotator) {
        self.rotation = rotation;
    }

    fn physics_mode(&self) -> PhysicsMode {
        self.mode
    }

    fn set_physics_mode(&mut self, mode: PhysicsMode) {
        if mode == PhysicsMode::None {
            self.velocity = Vec3::ZERO;
        }
        self.mode = mode;
    }

    fn input_acceleration(&self) -> Vec3 {
        self.input_acceleration
    }

    fn movement_input(&self) -> Vec3 {
        self.pending_input
    }

    fn add_movement_input(&mut self, direction: Vec3, scale: f32) {
        self.pending_input += direction * scale;
    }

    fn max_acceleration(&self) -> f32 {
        self.max_acceleration
    }

    fn capsule_half_height(&self) -> f32 {
        self.half_height
    }

    fn apply_limits(&mut self, limits: MovementLimits) {
        if let Some(max_speed) = limits.max_speed {
            self.max_speed = max_speed;
        }
        if let Some(max_acceleration) = limits.max_acceleration {
            self.max_acceleration = max_acceleration;
        }
        if let Some(braking) = limits.braking_deceleration {
            self.braking_deceleration = braking;
        }
        if let Some(friction) = limits.ground_friction {
            self.ground_friction = friction;
        }
    }

    fn set_braking_friction_factor(&mut self, factor: f32) {
        self.braking_friction_factor = factor;
    }

    fn crouch(&mut self) -> bool {
        if self.crouched || !matches!(self.mode, PhysicsMode::Walking | PhysicsMode::NavWalking) {
            return false;
        }
        self.crouched = true;
        self.location.y -= STANDING_HALF_HEIGHT - CROUCHED_HALF_HEIGHT;
        self.half_height = CROUCHED_HALF_HEIGHT;
        true
    }

    fn uncrouch(&mut self) -> bool {
        if !self.crouched {
            return false;
        }
        self.crouched = false;
        self.location.y += STANDING_HALF_HEIGHT - CROUCHED_HALF_HEIGHT;
        self.half_height = STANDING_HALF_HEIGHT;
        true
    }

    fn jump(&mut self) {
        self.jump_requested = true;
    }

    fn set_capsule_collision(&mut self, enabled: bool) {
        self.capsule_collision = enabled;
    }

    fn set_replicate_movement(&mut self, replicate: bool) {
        self.replicate_movement = replicate;
    }

    fn drain_events(&mut self) -> Vec<DriverEvent> {
        std::mem::take(&mut self.events)
    }

    fn can_ever_fly(&self) -> bool {
        self.can_fly
    }
}

// =============================================================================
// POINT-MASS SKELETON
// =============================================================================

/// Pelvis height above the feet when the body lies on the ground.
pub const PELVIS_REST_HEIGHT: f32 = 15.0;
pub const SPINE_OFFSET: f32 = 30.0;
/// Horizontal damping per second while sliding on the ground.
pub const GROUND_DAMPING: f32 = 4.0;

#[derive(Clone, Debug, Default)]
pub struct PointMassSkeleton {
    pub pelvis: Vec3,
    pub velocity: Vec3,
    pub pelvis_rotation: Rotator,
    pub ground_height: f32,
    pub simulating: bool,
    pub gravity_enabled: bool,
    pub joint_spring: f32,
    pub collision: MeshCollision,
    pub tick_optimizations: bool,
    pub visible_mesh: Option<MeshRef>,
    pending_acceleration: Vec3,
}

impl PointMassSkeleton {
    pub fn new(ground_height: f32) -> Self {
        Self {
            ground_height,
            gravity_enabled: true,
            tick_optimizations: true,
            ..default()
        }
    }

    fn rest_height(&self) -> f32 {
        self.ground_height + PELVIS_REST_HEIGHT
    }
}

impl SkeletalBody for PointMassSkeleton {
    fn simulate(&mut self, dt: f32, capsule_location: Vec3, capsule_velocity: Vec3) {
        if !self.simulating {
            self.pelvis = capsule_location;
            self.velocity = capsule_velocity;
            self.pending_acceleration = Vec3::ZERO;
            return;
        }

        let mut acceleration = std::mem::take(&mut self.pending_acceleration);
        if self.gravity_enabled {
            acceleration.y += GRAVITY;
        }
        self.velocity += acceleration * dt;
        self.pelvis += self.velocity * dt;

        if self.pelvis.y <= self.rest_height() {
            self.pelvis.y = self.rest_height();
            self.velocity.y = self.velocity.y.max(0.0);
            let damping = (1.0 - GROUND_DAMPING * dt).max(0.0);
            self.velocity.x *= damping;
            self.velocity.z *= damping;
            if size_2d(self.velocity) < 1.0 {
                self.velocity.x = 0.0;
                self.velocity.z = 0.0;
            }
        }

        if size_2d(self.velocity) > 1.0 {
            self.pelvis_rotation.yaw = Rotator::from_direction(self.velocity).yaw;
        }
    }

    fn socket_location(&self, socket: Socket) -> Vec3 {
        match socket {
            Socket::Root => Vec3::new(self.pelvis.x, self.ground_height.min(self.pelvis.y), self.pelvis.z),
            Socket::Pelvis => self.pelvis,
            Socket::Spine03 => self.pelvis + Vec3::Y * SPINE_OFFSET,
        }
    }

    fn socket_rotation(&self, _socket: Socket) -> Rotator {
        self.pelvis_rotation
    }

    fn root_linear_velocity(&self) -> Vec3 {
        if self.simulating { self.velocity } else { Vec3::ZERO }
    }

    fn set_collision(&mut self, collision: MeshCollision) {
        self.collision = collision;
    }

    fn set_simulate_physics_below(&mut self, _socket: Socket, simulate: bool) {
        self.simulating = simulate;
    }

    fn set_all_bodies_simulate(&mut self, simulate: bool) {
        self.simulating = simulate;
    }

    fn set_joint_spring(&mut self, strength: f32) {
        self.joint_spring = strength;
    }

    fn set_gravity_enabled(&mut self, enabled: bool) {
        self.gravity_enabled = enabled;
    }

    fn add_force(&mut self, force: Vec3, _socket: Socket) {
        self.pending_acceleration += force;
    }

    fn tick_optimizations(&self) -> bool {
        self.tick_optimizations
    }

    fn set_tick_optimizations(&mut self, enabled: bool) {
        self.tick_optimizations = enabled;
    }

    fn set_visible_mesh(&mut self, mesh: &MeshRef) {
        self.visible_mesh = Some(mesh.clone());
    }
}

// =============================================================================
// WORLD
// =============================================================================

/// Infinite horizontal floor at `height`.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlatGround {
    pub height: f32,
}

impl WorldQuery for FlatGround {
    fn line_trace(&self, start: Vec3, end: Vec3) -> Option<TraceHit> {
        if start.y < self.height || end.y > self.height || start.y == end.y {
            return None;
        }
        let t = (start.y - self.height) / (start.y - end.y);
        let impact = start.lerp(end, t);
        Some(TraceHit {
            location: impact,
            impact_point: impact,
            distance: start.distance(impact),
        })
    }
}
