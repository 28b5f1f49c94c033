//! Character locomotion: movement state machine, gait and rotation
//! control, ragdoll and flight, with authority/proxy replication.

pub mod adapter;
pub mod character;
pub mod config;
pub mod driver;
pub mod essentials;
pub mod events;
pub mod flight;
pub mod input;
pub mod kinematic;
pub mod math;
pub mod plugin;
pub mod protocol;
pub mod ragdoll;
pub mod replication;
pub mod rotation;
pub mod settings;
pub mod states;
pub mod sync;

#[cfg(test)]
mod testing;

pub use character::LocomotionCharacter;
pub use config::LocomotionConfig;
pub use driver::{
    AnimationConsumer, Collaborators, DefaultHooks, LocomotionHooks, MeshRef, MontageRef, MovementDriver,
    SkeletalBody, WorldQuery,
};
pub use events::LocomotionEvent;
pub use input::InputAction;
pub use math::Rotator;
pub use plugin::{Locomotion, LocomotionPlugin, LocomotionSet};
pub use protocol::*;
pub use replication::{LocomotionBroadcast, LocomotionRequest, OutgoingMessage, ReplicatedLocomotion};
pub use settings::{MovementModifier, MovementSettings, MovementSettingsPreset};
pub use states::*;
