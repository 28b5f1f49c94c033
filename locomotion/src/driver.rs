//! Collaborator interfaces the locomotion core drives.
//!
//! The physics body, skeletal mesh, world queries and animation layer are all
//! external. A character is built from one implementation of each; only the
//! animation consumer is optional.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::math::Rotator;
use crate::states::PhysicsMode;

/// Named skeletal attachment points the core reads or pushes forces into.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Socket {
    Root,
    Pelvis,
    Spine03,
}

/// Collision profile for the skeletal mesh.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MeshCollision {
    /// Normal animated pawn: query only, no simulation.
    #[default]
    QueryOnly,
    /// Ragdoll: physics body with query and physics.
    QueryAndPhysics,
}

/// Reference to an animation montage asset.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MontageRef(pub String);

impl MontageRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// Reference to a skeletal mesh asset.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MeshRef(pub String);

/// Blocking hit from a line trace.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TraceHit {
    pub location: Vec3,
    pub impact_point: Vec3,
    pub distance: f32,
}

/// Speed/acceleration caps pushed into the driver. `None` keeps the driver's
/// own default for that value.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct MovementLimits {
    pub max_speed: Option<f32>,
    pub max_acceleration: Option<f32>,
    pub braking_deceleration: Option<f32>,
    pub ground_friction: Option<f32>,
}

/// Things the driver reports back, drained once per tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DriverEvent {
    Landed { velocity: Vec3 },
    Jumped,
    Hit { velocity: Vec3 },
    StartCrouch,
    EndCrouch,
}

/// Capsule movement component: velocity, mode and caps.
pub trait MovementDriver: Send + Sync {
    /// Advance the capsule one step. Engines that move the capsule on their
    /// own schedule leave this empty.
    fn simulate(&mut self, _dt: f32) {}

    fn location(&self) -> Vec3;
    fn set_location(&mut self, location: Vec3);
    fn velocity(&self) -> Vec3;
    fn set_velocity(&mut self, velocity: Vec3);
    fn set_rotation(&mut self, rotation: Rotator);

    fn physics_mode(&self) -> PhysicsMode;
    fn set_physics_mode(&mut self, mode: PhysicsMode);

    /// Current input acceleration (intent, not measured).
    fn input_acceleration(&self) -> Vec3;
    /// Pending movement input vector for this tick.
    fn movement_input(&self) -> Vec3;
    fn add_movement_input(&mut self, direction: Vec3, scale: f32);
    /// Driver's own max acceleration (the value the essentials tracker eases toward).
    fn max_acceleration(&self) -> f32;
    fn capsule_half_height(&self) -> f32;

    fn apply_limits(&mut self, limits: MovementLimits);
    fn set_braking_friction_factor(&mut self, factor: f32);

    /// Request a crouch. Returns true when the capsule changed immediately.
    fn crouch(&mut self) -> bool;
    fn uncrouch(&mut self) -> bool;
    fn jump(&mut self);

    fn set_capsule_collision(&mut self, enabled: bool);
    fn set_replicate_movement(&mut self, replicate: bool);

    fn drain_events(&mut self) -> Vec<DriverEvent>;

    fn can_ever_fly(&self) -> bool {
        true
    }

    fn has_root_motion(&self) -> bool {
        false
    }

    fn set_ignore_client_movement_errors(&mut self, _ignore: bool) {}
}

/// Skeletal mesh with a physics asset.
pub trait SkeletalBody: Send + Sync {
    /// Advance the body one step. While not simulating it follows the capsule.
    fn simulate(&mut self, _dt: f32, _capsule_location: Vec3, _capsule_velocity: Vec3) {}

    fn socket_location(&self, socket: Socket) -> Vec3;
    fn socket_rotation(&self, socket: Socket) -> Rotator;
    fn root_linear_velocity(&self) -> Vec3;

    fn set_collision(&mut self, collision: MeshCollision);
    fn set_simulate_physics_below(&mut self, socket: Socket, simulate: bool);
    fn set_all_bodies_simulate(&mut self, simulate: bool);
    fn set_joint_spring(&mut self, strength: f32);
    fn set_gravity_enabled(&mut self, enabled: bool);
    /// Add an acceleration-change force at a socket.
    fn add_force(&mut self, force: Vec3, socket: Socket);

    /// Tick-rate optimization flag (update rate / visibility based ticking).
    fn tick_optimizations(&self) -> bool {
        false
    }

    fn set_tick_optimizations(&mut self, _enabled: bool) {}

    fn set_visible_mesh(&mut self, _mesh: &MeshRef) {}
}

pub trait WorldQuery: Send + Sync {
    fn line_trace(&self, start: Vec3, end: Vec3) -> Option<TraceHit>;
}

/// Names of the animation curves the core samples.
pub mod curves {
    pub const YAW_OFFSET: &str = "YawOffset";
    pub const ROTATION_AMOUNT: &str = "RotationAmount";
}

pub trait AnimationConsumer: Send + Sync {
    fn curve_value(&self, name: &str) -> f32;
    fn play_montage(&mut self, montage: &MontageRef, rate: f32);
    fn stop_montages(&mut self, blend_out: f32);
    fn save_pose_snapshot(&mut self, name: &str);
}

/// Override points with default behavior.
pub trait LocomotionHooks: Send + Sync {
    /// Extra flight condition on top of the driver's `can_ever_fly`.
    fn flight_check(&self) -> bool {
        true
    }

    /// Whether a hit at `velocity` should knock the character out of flight.
    fn flight_interrupt_check(&self, velocity: Vec3, threshold: f32) -> bool {
        velocity.abs().length() >= threshold
    }

    fn get_up_animation(&self, ragdoll_face_up: bool) -> Option<MontageRef> {
        Some(MontageRef::new(if ragdoll_face_up { "GetUp_Back" } else { "GetUp_Front" }))
    }

    fn roll_animation(&self) -> Option<MontageRef> {
        Some(MontageRef::new("Roll"))
    }
}

/// Hooks with every default left in place.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultHooks;

impl LocomotionHooks for DefaultHooks {}

/// Everything a character needs from the outside world.
pub struct Collaborators {
    pub driver: Box<dyn MovementDriver>,
    pub body: Box<dyn SkeletalBody>,
    pub world: Box<dyn WorldQuery>,
    pub animation: Option<Box<dyn AnimationConsumer>>,
    pub hooks: Box<dyn LocomotionHooks>,
}
