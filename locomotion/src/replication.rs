//! Replicated character state and the one-shot messages around it.
//!
//! `REPLICATED_FIELDS` is the single source of truth for what travels from the
//! authority to observers and whether the owning client gets its own echo.
//! Snapshots are plain data; any transport that can carry serde types can
//! move them (lightyear in the server, the loopback link in tests).

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::character::LocomotionCharacter;
use crate::driver::{MeshRef, MontageRef};
use crate::math::Rotator;
use crate::states::{FlightState, Gait, MovementState, NetRole, OverlayState, PhysicsMode, RotationMode, Stance, ViewMode};

// =============================================================================
// FIELD TABLE
// =============================================================================

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplicationCondition {
    Always,
    /// Observers only; the owner already predicted the value.
    SkipOwner,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReplicatedField {
    TargetRagdollLocation,
    CurrentAcceleration,
    ControlRotation,
    DesiredGait,
    DesiredStance,
    DesiredRotationMode,
    RotationMode,
    OverlayState,
    FlightState,
    ViewMode,
    VisibleMesh,
    /// Capsule location, velocity, facing, physics mode and crouch. Applied on
    /// simulated proxies only, and absent while ragdolling.
    Movement,
}

pub const REPLICATED_FIELDS: &[(ReplicatedField, ReplicationCondition)] = &[
    (ReplicatedField::TargetRagdollLocation, ReplicationCondition::Always),
    (ReplicatedField::CurrentAcceleration, ReplicationCondition::SkipOwner),
    (ReplicatedField::ControlRotation, ReplicationCondition::SkipOwner),
    (ReplicatedField::DesiredGait, ReplicationCondition::Always),
    (ReplicatedField::DesiredStance, ReplicationCondition::SkipOwner),
    (ReplicatedField::DesiredRotationMode, ReplicationCondition::SkipOwner),
    (ReplicatedField::RotationMode, ReplicationCondition::SkipOwner),
    (ReplicatedField::OverlayState, ReplicationCondition::SkipOwner),
    (ReplicatedField::FlightState, ReplicationCondition::SkipOwner),
    (ReplicatedField::ViewMode, ReplicationCondition::SkipOwner),
    (ReplicatedField::VisibleMesh, ReplicationCondition::SkipOwner),
    (ReplicatedField::Movement, ReplicationCondition::SkipOwner),
];

pub fn condition_for(field: ReplicatedField) -> ReplicationCondition {
    REPLICATED_FIELDS
        .iter()
        .find(|(f, _)| *f == field)
        .map_or(ReplicationCondition::Always, |(_, condition)| *condition)
}

/// Whether a receiver should take `field` from a snapshot.
pub fn should_apply(field: ReplicatedField, is_owner: bool) -> bool {
    !(is_owner && condition_for(field) == ReplicationCondition::SkipOwner)
}

// =============================================================================
// SNAPSHOT
// =============================================================================

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct ReplicatedMovement {
    pub location: Vec3,
    pub velocity: Vec3,
    pub rotation: Rotator,
    pub physics_mode: PhysicsMode,
    pub crouched: bool,
}

/// Authority-side state published to observers every tick.
#[derive(Component, Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct ReplicatedLocomotion {
    pub target_ragdoll_location: Vec3,
    pub current_acceleration: Vec3,
    pub control_rotation: Rotator,
    pub desired_gait: Gait,
    pub desired_stance: Stance,
    pub desired_rotation_mode: RotationMode,
    pub rotation_mode: RotationMode,
    pub overlay_state: OverlayState,
    pub flight_state: FlightState,
    pub view_mode: ViewMode,
    pub visible_mesh: Option<MeshRef>,
    pub movement: Option<ReplicatedMovement>,
}

// =============================================================================
// MESSAGES
// =============================================================================

/// Proxy -> authority, reliable.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum LocomotionRequest {
    SetDesiredStance(Stance),
    SetDesiredGait(Gait),
    SetDesiredRotationMode(RotationMode),
    SetRotationMode { mode: RotationMode, force: bool },
    SetViewMode { mode: ViewMode, force: bool },
    SetOverlayState { state: OverlayState, force: bool },
    SetFlightState { state: FlightState, force: bool },
    SetVisibleMesh(MeshRef),
    SetAllowedGait(Gait),
    RagdollStart,
    RagdollEnd { location: Vec3 },
    PlayMontage { montage: MontageRef, rate: f32 },
    SetMeshLocationDuringRagdoll { location: Vec3 },
}

/// Authority -> every observer, reliable.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum LocomotionBroadcast {
    RagdollStart,
    /// The location travels with the message but the receiver keeps its own.
    RagdollEnd { location: Vec3 },
    Landed,
    Jumped,
    PlayMontage { montage: MontageRef, rate: f32 },
}

#[derive(Clone, Debug, PartialEq)]
pub enum OutgoingMessage {
    ToAuthority(LocomotionRequest),
    ToAll(LocomotionBroadcast),
}

impl LocomotionCharacter {
    pub fn capture_snapshot(&self) -> ReplicatedLocomotion {
        let movement = (self.movement_state != MovementState::Ragdoll).then(|| ReplicatedMovement {
            location: self.driver.location(),
            velocity: self.driver.velocity(),
            rotation: self.rotation.actor,
            physics_mode: self.driver.physics_mode(),
            crouched: self.stance == Stance::Crouching,
        });
        ReplicatedLocomotion {
            target_ragdoll_location: self.ragdoll.target_location,
            current_acceleration: self.essentials.replicated_current_acceleration,
            control_rotation: self.essentials.replicated_control_rotation,
            desired_gait: self.desired_gait,
            desired_stance: self.desired_stance,
            desired_rotation_mode: self.desired_rotation_mode,
            rotation_mode: self.rotation_mode,
            overlay_state: self.overlay_state,
            flight_state: self.flight_state,
            view_mode: self.view_mode,
            visible_mesh: self.visible_mesh.clone(),
            movement,
        }
    }

    /// Take the fields this instance is entitled to, running the change
    /// hook for each value that actually changed.
    pub fn apply_replicated(&mut self, snapshot: &ReplicatedLocomotion, is_owner: bool) {
        if self.role.is_authority() {
            return;
        }
        let apply = |field| should_apply(field, is_owner);

        if apply(ReplicatedField::TargetRagdollLocation) {
            self.ragdoll.target_location = snapshot.target_ragdoll_location;
        }
        if apply(ReplicatedField::CurrentAcceleration) {
            self.essentials.replicated_current_acceleration = snapshot.current_acceleration;
        }
        if apply(ReplicatedField::ControlRotation) {
            self.essentials.replicated_control_rotation = snapshot.control_rotation;
        }
        if apply(ReplicatedField::DesiredGait) {
            self.desired_gait = snapshot.desired_gait;
        }
        if apply(ReplicatedField::DesiredStance) {
            self.desired_stance = snapshot.desired_stance;
        }
        if apply(ReplicatedField::DesiredRotationMode) {
            self.desired_rotation_mode = snapshot.desired_rotation_mode;
        }
        if apply(ReplicatedField::RotationMode) && self.rotation_mode != snapshot.rotation_mode {
            let previous = self.rotation_mode;
            self.rotation_mode = snapshot.rotation_mode;
            self.on_rotation_mode_changed(previous);
        }
        if apply(ReplicatedField::OverlayState) && self.overlay_state != snapshot.overlay_state {
            self.overlay_state = snapshot.overlay_state;
            self.on_overlay_state_changed();
        }
        if apply(ReplicatedField::FlightState) && self.flight_state != snapshot.flight_state {
            let previous = self.flight_state;
            self.flight_state = snapshot.flight_state;
            self.on_flight_state_changed(previous);
        }
        if apply(ReplicatedField::ViewMode) && self.view_mode != snapshot.view_mode {
            let previous = self.view_mode;
            self.view_mode = snapshot.view_mode;
            self.on_view_mode_changed(previous, true);
        }
        if apply(ReplicatedField::VisibleMesh) && self.visible_mesh != snapshot.visible_mesh {
            self.visible_mesh = snapshot.visible_mesh.clone();
            self.on_visible_mesh_changed();
        }

        if apply(ReplicatedField::Movement) && self.role == NetRole::SimulatedProxy {
            if let Some(movement) = snapshot.movement {
                self.driver.set_location(movement.location);
                self.driver.set_velocity(movement.velocity);
                if self.driver.physics_mode() != movement.physics_mode {
                    self.set_physics_mode(movement.physics_mode);
                }
                self.rotation.actor = movement.rotation;
                self.rotation.target = movement.rotation;
                self.driver.set_rotation(movement.rotation);
                if movement.crouched != (self.stance == Stance::Crouching) {
                    if movement.crouched {
                        self.crouch();
                    } else {
                        self.uncrouch();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::character;

    #[test]
    fn test_every_field_listed_once() {
        let mut seen = std::collections::HashSet::new();
        for (field, _) in REPLICATED_FIELDS {
            assert!(seen.insert(*field), "{:?} listed twice", field);
        }
        assert_eq!(seen.len(), 12);
    }

    #[test]
    fn test_skip_owner_filtering() {
        assert!(should_apply(ReplicatedField::DesiredGait, true));
        assert!(should_apply(ReplicatedField::TargetRagdollLocation, true));
        assert!(!should_apply(ReplicatedField::RotationMode, true));
        assert!(!should_apply(ReplicatedField::ControlRotation, true));
        assert!(should_apply(ReplicatedField::RotationMode, false));
    }

    #[test]
    fn test_simulated_proxy_follows_crouch() {
        let (mut authority, _ha) = character(NetRole::Authority, true);
        let (mut proxy, hp) = character(NetRole::SimulatedProxy, false);
        authority.crouch();
        assert_eq!(authority.stance(), Stance::Crouching);

        proxy.apply_replicated(&authority.capture_snapshot(), false);
        assert_eq!(proxy.stance(), Stance::Crouching);
        assert!(hp.driver().crouched);
        assert_eq!(proxy.adapter().settings().run_speed, 200.0);

        authority.uncrouch();
        proxy.apply_replicated(&authority.capture_snapshot(), false);
        assert_eq!(proxy.stance(), Stance::Standing);
        assert!(!hp.driver().crouched);
    }

    #[test]
    fn test_owner_keeps_predicted_crouch() {
        let (authority, _ha) = character(NetRole::Authority, false);
        let (mut owner, _ho) = character(NetRole::AutonomousProxy, true);
        owner.crouch();
        assert_eq!(authority.stance(), Stance::Standing);
        owner.apply_replicated(&authority.capture_snapshot(), true);
        assert_eq!(owner.stance(), Stance::Crouching);
    }

    #[test]
    fn test_snapshot_survives_ron() {
        let snapshot = ReplicatedLocomotion {
            desired_gait: Gait::Sprinting,
            flight_state: FlightState::Aerial,
            visible_mesh: Some(MeshRef("Knight".into())),
            ..default()
        };
        let text = ron::to_string(&snapshot).unwrap();
        let back: ReplicatedLocomotion = ron::from_str(&text).unwrap();
        assert_eq!(back, snapshot);
    }
}
