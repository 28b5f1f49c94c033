//! Discrete locomotion states and network roles.
//!
//! Every enum here is replicated or exposed to animation, so they all derive
//! serde and stay `Copy`.

use serde::{Deserialize, Serialize};

/// High-level movement state, derived from the physics mode or set
/// explicitly for mantling and ragdoll.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum MovementState {
    #[default]
    None,
    Grounded,
    Freefall,
    Flight,
    Swimming,
    Mantling,
    Ragdoll,
}

/// One-shot actions layered on top of the movement state.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum MovementAction {
    #[default]
    None,
    LowMantle,
    HighMantle,
    Rolling,
    GettingUp,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Stance {
    #[default]
    Standing,
    Crouching,
    Riding,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Gait {
    #[default]
    Walking,
    Running,
    Sprinting,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum RotationMode {
    VelocityDirection,
    #[default]
    LookingDirection,
    Aiming,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ViewMode {
    #[default]
    ThirdPerson,
    FirstPerson,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum FlightState {
    #[default]
    None,
    Hovering,
    Aerial,
}

/// Animation overlay set (what the upper body is carrying or posing as).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum OverlayState {
    #[default]
    Default,
    Masculine,
    Feminine,
    Injured,
    HandsTied,
    Rifle,
    PistolOneHanded,
    PistolTwoHanded,
    Bow,
    Torch,
    Binoculars,
    Box,
    Barrel,
}

/// How the animation layer should enter the grounded state after landing.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum GroundedEntryState {
    #[default]
    None,
    Roll,
}

/// Movement mode reported by the physics driver.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PhysicsMode {
    #[default]
    None,
    Walking,
    NavWalking,
    Falling,
    Swimming,
    Flying,
    Custom,
}

impl PhysicsMode {
    pub fn is_falling(self) -> bool {
        self == PhysicsMode::Falling
    }
}

/// Which instance of a character this is.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum NetRole {
    /// Server or standalone instance; source of truth.
    #[default]
    Authority,
    /// The owning client's predicted instance.
    AutonomousProxy,
    /// A remote observer's copy.
    SimulatedProxy,
}

impl NetRole {
    pub fn is_authority(self) -> bool {
        self == NetRole::Authority
    }
}

/// Map the driver's physics mode onto the locomotion movement state.
pub fn movement_state_for(mode: PhysicsMode) -> MovementState {
    match mode {
        PhysicsMode::Walking | PhysicsMode::NavWalking => MovementState::Grounded,
        PhysicsMode::Falling => MovementState::Freefall,
        PhysicsMode::Swimming => MovementState::Swimming,
        PhysicsMode::Flying => MovementState::Flight,
        PhysicsMode::None | PhysicsMode::Custom => MovementState::None,
    }
}
