//! Ragdoll: hand the capsule over to the skeletal simulation and back.
//!
//! While ragdolling the capsule follows the pelvis. The locally controlled
//! copy reports the pelvis location to the authority, and every other copy
//! pulls its own simulated body toward that reported target.

use bevy::prelude::*;

use crate::character::LocomotionCharacter;
use crate::driver::{MeshCollision, Socket};
use crate::events::LocomotionEvent;
use crate::math::{f_interp_to, map_range_clamped, size_2d, Rotator};
use crate::replication::{LocomotionBroadcast, LocomotionRequest};
use crate::states::{MovementState, PhysicsMode};

pub mod tuning {
    /// Ragdoll speed mapped onto the joint spring range.
    pub const SPRING_SPEED_RANGE: f32 = 1000.0;
    pub const MAX_JOINT_SPRING: f32 = 25_000.0;
    /// Below this vertical speed gravity is switched off.
    pub const GRAVITY_CUTOFF_SPEED: f32 = -4000.0;
    /// Final strength of the pull toward the reported location.
    pub const MAX_PULL: f32 = 750.0;
    pub const PULL_INTERP_SPEED: f32 = 0.6;
    /// Horizontal speed above which the pull grabs the spine instead of the pelvis.
    pub const SPINE_PULL_SPEED: f32 = 300.0;
    /// Extra lift above the floor when snapping the capsule.
    pub const FLOOR_CLEARANCE: f32 = 2.0;
    pub const MONTAGE_BLEND_OUT: f32 = 0.2;
}

pub const RAGDOLL_POSE_SNAPSHOT: &str = "RagdollPose";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RagdollState {
    /// Where the capsule should sit; the pelvis on the controlling copy.
    pub target_location: Vec3,
    pub last_velocity: Vec3,
    pub on_ground: bool,
    pub face_up: bool,
    pub server_pull: f32,
    pre_ragdoll_tick_optimizations: bool,
}

impl LocomotionCharacter {
    /// Start or request a ragdoll. Proxies ask the authority, which
    /// broadcasts the start to everyone including itself.
    pub fn replicated_ragdoll_start(&mut self) {
        if self.role.is_authority() {
            self.multicast(LocomotionBroadcast::RagdollStart);
        } else {
            self.send_to_authority(LocomotionRequest::RagdollStart);
        }
    }

    pub fn replicated_ragdoll_end(&mut self) {
        let location = self.driver.location();
        if self.role.is_authority() {
            self.multicast(LocomotionBroadcast::RagdollEnd { location });
        } else {
            self.send_to_authority(LocomotionRequest::RagdollEnd { location });
        }
    }

    pub(crate) fn ragdoll_start(&mut self) {
        self.events.emit(LocomotionEvent::RagdollStateChanged(true));
        self.driver.set_ignore_client_movement_errors(true);

        self.ragdoll.target_location = self.body.socket_location(Socket::Pelvis);
        self.ragdoll.server_pull = 0.0;

        self.ragdoll.pre_ragdoll_tick_optimizations = self.body.tick_optimizations();
        self.body.set_tick_optimizations(false);

        self.set_physics_mode(PhysicsMode::None);
        self.set_movement_state(MovementState::Ragdoll, false);

        self.driver.set_capsule_collision(false);
        self.body.set_collision(MeshCollision::QueryAndPhysics);
        self.body.set_simulate_physics_below(Socket::Pelvis, true);

        if let Some(animation) = self.animation.as_mut() {
            animation.stop_montages(tuning::MONTAGE_BLEND_OUT);
        }

        self.driver.set_replicate_movement(false);
        info!("Ragdoll started at {:?}", self.ragdoll.target_location);
    }

    pub(crate) fn ragdoll_end(&mut self) {
        self.body.set_tick_optimizations(self.ragdoll.pre_ragdoll_tick_optimizations);
        self.driver.set_ignore_client_movement_errors(false);
        self.driver.set_replicate_movement(true);

        if let Some(animation) = self.animation.as_mut() {
            animation.save_pose_snapshot(RAGDOLL_POSE_SNAPSHOT);
        }

        if self.ragdoll.on_ground {
            self.set_physics_mode(PhysicsMode::Walking);
            if let Some(get_up) = self.hooks.get_up_animation(self.ragdoll.face_up) {
                self.play_montage(&get_up, 1.0);
            }
        } else {
            self.set_physics_mode(PhysicsMode::Falling);
            self.driver.set_velocity(self.ragdoll.last_velocity);
        }

        self.driver.set_capsule_collision(true);
        self.body.set_collision(MeshCollision::QueryOnly);
        self.body.set_all_bodies_simulate(false);

        self.events.emit(LocomotionEvent::RagdollStateChanged(false));
        info!("Ragdoll ended (on ground: {})", self.ragdoll.on_ground);
    }

    pub(crate) fn ragdoll_update(&mut self, dt: f32) {
        let velocity = self.body.root_linear_velocity();
        self.ragdoll.last_velocity = if velocity != Vec3::ZERO || self.locally_controlled {
            velocity
        } else {
            self.ragdoll.last_velocity / 2.0
        };

        let spring = map_range_clamped(
            0.0,
            tuning::SPRING_SPEED_RANGE,
            0.0,
            tuning::MAX_JOINT_SPRING,
            self.ragdoll.last_velocity.length(),
        );
        self.body.set_joint_spring(spring);
        // keeps a long fall from tunneling through the floor
        self.body
            .set_gravity_enabled(self.ragdoll.last_velocity.y > tuning::GRAVITY_CUTOFF_SPEED);

        self.set_location_during_ragdoll(dt);
    }

    fn set_location_during_ragdoll(&mut self, dt: f32) {
        if self.locally_controlled {
            self.ragdoll.target_location = self.body.socket_location(Socket::Pelvis);
            if !self.role.is_authority() {
                self.send_to_authority(LocomotionRequest::SetMeshLocationDuringRagdoll {
                    location: self.ragdoll.target_location,
                });
            }
        }

        let pelvis = self.body.socket_rotation(Socket::Pelvis);
        self.ragdoll.face_up = if self.config.reversed_pelvis {
            pelvis.roll > 0.0
        } else {
            pelvis.roll < 0.0
        };
        let target_rotation = Rotator::from_yaw(if self.ragdoll.face_up {
            pelvis.yaw - 180.0
        } else {
            pelvis.yaw
        })
        .normalized();

        let half_height = self.driver.capsule_half_height();
        let start = self.ragdoll.target_location;
        let end = start - Vec3::Y * half_height;
        let hit = self.world.line_trace(start, end);
        self.ragdoll.on_ground = hit.is_some();

        let mut location = start;
        if let Some(hit) = hit {
            let impact_distance = (hit.impact_point.y - start.y).abs();
            location.y += half_height - impact_distance + tuning::FLOOR_CLEARANCE;
        }

        if !self.locally_controlled {
            self.ragdoll.server_pull = f_interp_to(self.ragdoll.server_pull, tuning::MAX_PULL, dt, tuning::PULL_INTERP_SPEED);
            let socket = if size_2d(self.ragdoll.last_velocity) > tuning::SPINE_PULL_SPEED {
                Socket::Spine03
            } else {
                Socket::Pelvis
            };
            let pull = (self.ragdoll.target_location - self.body.socket_location(socket)) * self.ragdoll.server_pull;
            self.body.add_force(pull, socket);
        }

        self.set_location_and_target_rotation(location, target_rotation);
    }

    pub(crate) fn set_location_and_target_rotation(&mut self, location: Vec3, rotation: Rotator) {
        self.driver.set_location(location);
        self.rotation.target = rotation;
        self.rotation.actor = rotation;
        self.driver.set_rotation(rotation);
    }

    pub fn is_ragdolling(&self) -> bool {
        self.movement_state == MovementState::Ragdoll
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MontageRef;
    use crate::replication::OutgoingMessage;
    use crate::states::NetRole;
    use crate::testing::character;

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn test_ragdoll_start_hands_over_to_body() {
        let (mut c, h) = character(NetRole::Authority, true);
        c.replicated_ragdoll_start();

        assert!(c.is_ragdolling());
        assert_eq!(h.driver().mode, PhysicsMode::None);
        assert!(!h.driver().capsule_collision);
        assert!(!h.driver().replicate_movement);
        assert!(h.driver().ignore_client_errors);
        assert_eq!(h.body().collision, MeshCollision::QueryAndPhysics);
        assert!(h.body().simulate_below_pelvis);
        assert!(!h.body().tick_optimizations);
        assert_eq!(h.animation().stopped, vec![tuning::MONTAGE_BLEND_OUT]);
        assert_eq!(c.ragdoll().target_location, Vec3::new(0.0, 20.0, 0.0));
        assert_eq!(h.take_events().first(), Some(&LocomotionEvent::RagdollStateChanged(true)));
        assert!(matches!(
            c.drain_outgoing().as_slice(),
            [OutgoingMessage::ToAll(LocomotionBroadcast::RagdollStart)]
        ));
    }

    #[test]
    fn test_ragdoll_round_trip_on_ground() {
        let (mut c, h) = character(NetRole::Authority, true);
        c.replicated_ragdoll_start();
        c.tick(DT);

        // pelvis 20 above the floor, capsule half height 90
        assert!(c.ragdoll().on_ground);
        assert!((h.driver().location.y - 92.0).abs() < 1e-3);

        c.replicated_ragdoll_end();
        assert_eq!(h.driver().mode, PhysicsMode::Walking);
        assert_eq!(c.movement_state(), MovementState::Grounded);
        assert!(h.driver().capsule_collision);
        assert!(h.driver().replicate_movement);
        assert_eq!(h.body().collision, MeshCollision::QueryOnly);
        assert_eq!(h.body().all_bodies_simulate, Some(false));
        assert!(h.body().tick_optimizations);
        assert_eq!(h.animation().snapshots, vec![RAGDOLL_POSE_SNAPSHOT.to_string()]);
        assert_eq!(h.animation().played.last(), Some(&(MontageRef::new("GetUp_Front"), 1.0)));
        assert!(h
            .take_events()
            .contains(&LocomotionEvent::RagdollStateChanged(false)));
    }

    #[test]
    fn test_ragdoll_end_in_the_air_keeps_momentum() {
        let (mut c, h) = character(NetRole::Authority, true);
        h.set_floor(None);
        c.replicated_ragdoll_start();
        h.body().root_velocity = Vec3::new(100.0, -300.0, 0.0);
        c.tick(DT);
        assert!(!c.ragdoll().on_ground);

        c.replicated_ragdoll_end();
        assert_eq!(h.driver().mode, PhysicsMode::Falling);
        assert_eq!(c.movement_state(), MovementState::Freefall);
        assert_eq!(h.driver().velocity, Vec3::new(100.0, -300.0, 0.0));
        assert!(h.animation().played.is_empty());
    }

    #[test]
    fn test_face_up_turns_target_around() {
        let (mut c, h) = character(NetRole::Authority, true);
        c.replicated_ragdoll_start();
        h.body().pelvis_rotation = Rotator::new(0.0, 30.0, -10.0);
        c.tick(DT);

        assert!(c.ragdoll().face_up);
        assert!((c.target_rotation().yaw - -150.0).abs() < 1e-3);
        assert_eq!(c.actor_rotation(), c.target_rotation());

        c.replicated_ragdoll_end();
        assert_eq!(h.animation().played.last(), Some(&(MontageRef::new("GetUp_Back"), 1.0)));
    }

    #[test]
    fn test_reversed_pelvis_flips_face_up() {
        let (mut c, h) = character(NetRole::Authority, true);
        c.config_mut().reversed_pelvis = true;
        c.replicated_ragdoll_start();
        h.body().pelvis_rotation = Rotator::new(0.0, 0.0, -10.0);
        c.tick(DT);
        assert!(!c.ragdoll().face_up);
    }

    #[test]
    fn test_fast_fall_disables_gravity() {
        let (mut c, h) = character(NetRole::Authority, true);
        c.replicated_ragdoll_start();
        h.body().root_velocity = Vec3::new(0.0, -5000.0, 0.0);
        c.tick(DT);

        assert!(!h.body().gravity_enabled);
        assert_eq!(h.body().joint_spring, tuning::MAX_JOINT_SPRING);

        h.body().root_velocity = Vec3::new(0.0, -500.0, 0.0);
        c.tick(DT);
        assert!(h.body().gravity_enabled);
        assert!((h.body().joint_spring - 12_500.0).abs() < 1.0);
    }

    #[test]
    fn test_observer_pulls_toward_reported_location() {
        let (mut c, h) = character(NetRole::SimulatedProxy, false);
        c.handle_broadcast(LocomotionBroadcast::RagdollStart);
        c.ragdoll.target_location = Vec3::new(50.0, 20.0, 0.0);
        c.tick(DT);

        assert!(c.ragdoll().server_pull > 0.0);
        let forces = h.body().forces.clone();
        let (force, socket) = forces.last().copied().unwrap();
        assert_eq!(socket, Socket::Pelvis);
        assert!(force.x > 0.0);
        assert_eq!(force.y, 0.0);
    }

    #[test]
    fn test_observer_pulls_spine_when_sliding_fast() {
        let (mut c, h) = character(NetRole::SimulatedProxy, false);
        c.handle_broadcast(LocomotionBroadcast::RagdollStart);
        h.body().root_velocity = Vec3::new(400.0, 0.0, 0.0);
        c.tick(DT);
        assert_eq!(h.body().forces.last().map(|(_, s)| *s), Some(Socket::Spine03));
    }

    #[test]
    fn test_observer_velocity_decays_without_body_motion() {
        let (mut c, h) = character(NetRole::SimulatedProxy, false);
        c.handle_broadcast(LocomotionBroadcast::RagdollStart);
        h.body().root_velocity = Vec3::new(400.0, 0.0, 0.0);
        c.tick(DT);
        h.body().root_velocity = Vec3::ZERO;
        c.tick(DT);
        assert_eq!(c.ragdoll().last_velocity, Vec3::new(200.0, 0.0, 0.0));
    }

    #[test]
    fn test_owning_proxy_reports_pelvis_location() {
        let (mut c, h) = character(NetRole::AutonomousProxy, true);
        c.handle_broadcast(LocomotionBroadcast::RagdollStart);
        h.body().pelvis = Vec3::new(10.0, 20.0, 30.0);
        c.tick(DT);

        let outgoing = c.drain_outgoing();
        assert!(outgoing.contains(&OutgoingMessage::ToAuthority(
            LocomotionRequest::SetMeshLocationDuringRagdoll {
                location: Vec3::new(10.0, 20.0, 30.0)
            }
        )));
        assert!(h.body().forces.is_empty());
    }

    #[test]
    fn test_proxy_start_waits_for_authority() {
        let (mut c, _h) = character(NetRole::AutonomousProxy, true);
        c.drain_outgoing();
        c.replicated_ragdoll_start();
        assert!(!c.is_ragdolling());
        assert_eq!(
            c.drain_outgoing(),
            vec![OutgoingMessage::ToAuthority(LocomotionRequest::RagdollStart)]
        );
    }
}
