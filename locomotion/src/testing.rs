//! Stub collaborators for unit tests. Each stub writes through a shared
//! probe so a test can inspect and steer it after handing it to a character.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bevy::prelude::*;

use crate::character::LocomotionCharacter;
use crate::driver::{
    AnimationConsumer, Collaborators, DriverEvent, LocomotionHooks, MeshCollision, MeshRef, MontageRef,
    MovementDriver, MovementLimits, SkeletalBody, Socket, TraceHit, WorldQuery,
};
use crate::events::LocomotionEvent;
use crate::math::Rotator;
use crate::states::{NetRole, PhysicsMode};

#[derive(Debug)]
pub struct DriverProbe {
    pub location: Vec3,
    pub velocity: Vec3,
    pub rotation: Rotator,
    pub mode: PhysicsMode,
    pub mode_changes: u32,
    pub input_acceleration: Vec3,
    pub movement_input: Vec3,
    pub max_acceleration: f32,
    pub half_height: f32,
    pub limits: Vec<MovementLimits>,
    pub braking_friction_factor: f32,
    pub crouched: bool,
    pub jumps: u32,
    pub capsule_collision: bool,
    pub replicate_movement: bool,
    pub ignore_client_errors: bool,
    pub can_ever_fly: bool,
    pub events: Vec<DriverEvent>,
}

impl Default for DriverProbe {
    fn default() -> Self {
        Self {
            location: Vec3::new(0.0, 90.0, 0.0),
            velocity: Vec3::ZERO,
            rotation: Rotator::ZERO,
            mode: PhysicsMode::Walking,
            mode_changes: 0,
            input_acceleration: Vec3::ZERO,
            movement_input: Vec3::ZERO,
            max_acceleration: 2000.0,
            half_height: 90.0,
            limits: Vec::new(),
            braking_friction_factor: 0.0,
            crouched: false,
            jumps: 0,
            capsule_collision: true,
            replicate_movement: true,
            ignore_client_errors: false,
            can_ever_fly: true,
            events: Vec::new(),
        }
    }
}

pub struct StubDriver(pub Arc<Mutex<DriverProbe>>);

impl StubDriver {
    fn probe(&self) -> std::sync::MutexGuard<'_, DriverProbe> {
        self.0.lock().unwrap()
    }
}

impl MovementDriver for StubDriver {
    fn location(&self) -> Vec3 {
        self.probe().location
    }
    fn set_location(&mut self, location: Vec3) {
        self.probe().location = location;
    }
    fn velocity(&self) -> Vec3 {
        self.probe().velocity
    }
    fn set_velocity(&mut self, velocity: Vec3) {
        self.probe().velocity = velocity;
    }
    fn set_rotation(&mut self, rotation: Rotator) {
        self.probe().rotation = rotation;
    }
    fn physics_mode(&self) -> PhysicsMode {
        self.probe().mode
    }
    fn set_physics_mode(&mut self, mode: PhysicsMode) {
        let mut probe = self.probe();
        probe.mode = mode;
        probe.mode_changes += 1;
    }
    fn input_acceleration(&self) -> Vec3 {
        self.probe().input_acceleration
    }
    fn movement_input(&self) -> Vec3 {
        self.probe().movement_input
    }
    fn add_movement_input(&mut self, direction: Vec3, scale: f32) {
        self.probe().movement_input += direction * scale;
    }
    fn max_acceleration(&self) -> f32 {
        self.probe().max_acceleration
    }
    fn capsule_half_height(&self) -> f32 {
        self.probe().half_height
    }
    fn apply_limits(&mut self, limits: MovementLimits) {
        self.probe().limits.push(limits);
    }
    fn set_braking_friction_factor(&mut self, factor: f32) {
        self.probe().braking_friction_factor = factor;
    }
    fn crouch(&mut self) -> bool {
        let mut probe = self.probe();
        let changed = !probe.crouched;
        probe.crouched = true;
        changed
    }
    fn uncrouch(&mut self) -> bool {
        let mut probe = self.probe();
        let changed = probe.crouched;
        probe.crouched = false;
        changed
    }
    fn jump(&mut self) {
        self.probe().jumps += 1;
    }
    fn set_capsule_collision(&mut self, enabled: bool) {
        self.probe().capsule_collision = enabled;
    }
    fn set_replicate_movement(&mut self, replicate: bool) {
        self.probe().replicate_movement = replicate;
    }
    fn drain_events(&mut self) -> Vec<DriverEvent> {
        std::mem::take(&mut self.probe().events)
    }
    fn can_ever_fly(&self) -> bool {
        self.probe().can_ever_fly
    }
    fn set_ignore_client_movement_errors(&mut self, ignore: bool) {
        self.probe().ignore_client_errors = ignore;
    }
}

#[derive(Debug)]
pub struct BodyProbe {
    pub pelvis: Vec3,
    pub spine: Vec3,
    pub pelvis_rotation: Rotator,
    pub root_velocity: Vec3,
    pub collision: MeshCollision,
    pub simulate_below_pelvis: bool,
    pub all_bodies_simulate: Option<bool>,
    pub joint_spring: f32,
    pub gravity_enabled: bool,
    pub forces: Vec<(Vec3, Socket)>,
    pub tick_optimizations: bool,
    pub visible_mesh: Option<MeshRef>,
}

impl Default for BodyProbe {
    fn default() -> Self {
        Self {
            pelvis: Vec3::new(0.0, 20.0, 0.0),
            spine: Vec3::new(0.0, 50.0, 0.0),
            pelvis_rotation: Rotator::ZERO,
            root_velocity: Vec3::ZERO,
            collision: MeshCollision::QueryOnly,
            simulate_below_pelvis: false,
            all_bodies_simulate: None,
            joint_spring: 0.0,
            gravity_enabled: true,
            forces: Vec::new(),
            tick_optimizations: true,
            visible_mesh: None,
        }
    }
}

pub struct StubBody(pub Arc<Mutex<BodyProbe>>);

impl SkeletalBody for StubBody {
    fn socket_location(&self, socket: Socket) -> Vec3 {
        let probe = self.0.lock().unwrap();
        match socket {
            Socket::Spine03 => probe.spine,
            Socket::Pelvis | Socket::Root => probe.pelvis,
        }
    }
    fn socket_rotation(&self, _socket: Socket) -> Rotator {
        self.0.lock().unwrap().pelvis_rotation
    }
    fn root_linear_velocity(&self) -> Vec3 {
        self.0.lock().unwrap().root_velocity
    }
    fn set_collision(&mut self, collision: MeshCollision) {
        self.0.lock().unwrap().collision = collision;
    }
    fn set_simulate_physics_below(&mut self, _socket: Socket, simulate: bool) {
        self.0.lock().unwrap().simulate_below_pelvis = simulate;
    }
    fn set_all_bodies_simulate(&mut self, simulate: bool) {
        let mut probe = self.0.lock().unwrap();
        probe.all_bodies_simulate = Some(simulate);
        probe.simulate_below_pelvis = simulate;
    }
    fn set_joint_spring(&mut self, strength: f32) {
        self.0.lock().unwrap().joint_spring = strength;
    }
    fn set_gravity_enabled(&mut self, enabled: bool) {
        self.0.lock().unwrap().gravity_enabled = enabled;
    }
    fn add_force(&mut self, force: Vec3, socket: Socket) {
        self.0.lock().unwrap().forces.push((force, socket));
    }
    fn tick_optimizations(&self) -> bool {
        self.0.lock().unwrap().tick_optimizations
    }
    fn set_tick_optimizations(&mut self, enabled: bool) {
        self.0.lock().unwrap().tick_optimizations = enabled;
    }
    fn set_visible_mesh(&mut self, mesh: &MeshRef) {
        self.0.lock().unwrap().visible_mesh = Some(mesh.clone());
    }
}

/// Floor at a settable height; `None` means nothing to hit.
pub struct StubWorld(pub Arc<Mutex<Option<f32>>>);

impl WorldQuery for StubWorld {
    fn line_trace(&self, start: Vec3, end: Vec3) -> Option<TraceHit> {
        let floor = (*self.0.lock().unwrap())?;
        if start.y < floor || end.y > floor {
            return None;
        }
        let impact = Vec3::new(start.x, floor, start.z);
        Some(TraceHit {
            location: impact,
            impact_point: impact,
            distance: start.y - floor,
        })
    }
}

#[derive(Debug, Default)]
pub struct AnimProbe {
    pub curves: HashMap<String, f32>,
    pub played: Vec<(MontageRef, f32)>,
    pub stopped: Vec<f32>,
    pub snapshots: Vec<String>,
}

pub struct StubAnimation(pub Arc<Mutex<AnimProbe>>);

impl AnimationConsumer for StubAnimation {
    fn curve_value(&self, name: &str) -> f32 {
        self.0.lock().unwrap().curves.get(name).copied().unwrap_or(0.0)
    }
    fn play_montage(&mut self, montage: &MontageRef, rate: f32) {
        self.0.lock().unwrap().played.push((montage.clone(), rate));
    }
    fn stop_montages(&mut self, blend_out: f32) {
        self.0.lock().unwrap().stopped.push(blend_out);
    }
    fn save_pose_snapshot(&mut self, name: &str) {
        self.0.lock().unwrap().snapshots.push(name.to_string());
    }
}

pub struct StubHooks(pub Arc<AtomicBool>);

impl LocomotionHooks for StubHooks {
    fn flight_check(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handles onto every stub a test character was built with.
pub struct Harness {
    pub driver: Arc<Mutex<DriverProbe>>,
    pub body: Arc<Mutex<BodyProbe>>,
    pub floor: Arc<Mutex<Option<f32>>>,
    pub animation: Arc<Mutex<AnimProbe>>,
    pub can_fly: Arc<AtomicBool>,
    pub events: Arc<Mutex<Vec<LocomotionEvent>>>,
}

impl Harness {
    pub fn driver(&self) -> std::sync::MutexGuard<'_, DriverProbe> {
        self.driver.lock().unwrap()
    }

    pub fn body(&self) -> std::sync::MutexGuard<'_, BodyProbe> {
        self.body.lock().unwrap()
    }

    pub fn animation(&self) -> std::sync::MutexGuard<'_, AnimProbe> {
        self.animation.lock().unwrap()
    }

    pub fn set_floor(&self, floor: Option<f32>) {
        *self.floor.lock().unwrap() = floor;
    }

    pub fn take_events(&self) -> Vec<LocomotionEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

/// A character on stub collaborators, already through `begin_play`.
pub fn character(role: NetRole, locally_controlled: bool) -> (LocomotionCharacter, Harness) {
    let harness = Harness {
        driver: Arc::new(Mutex::new(DriverProbe::default())),
        body: Arc::new(Mutex::new(BodyProbe::default())),
        floor: Arc::new(Mutex::new(Some(0.0))),
        animation: Arc::new(Mutex::new(AnimProbe::default())),
        can_fly: Arc::new(AtomicBool::new(true)),
        events: Arc::new(Mutex::new(Vec::new())),
    };
    let collaborators = Collaborators {
        driver: Box::new(StubDriver(harness.driver.clone())),
        body: Box::new(StubBody(harness.body.clone())),
        world: Box::new(StubWorld(harness.floor.clone())),
        animation: Some(Box::new(StubAnimation(harness.animation.clone()))),
        hooks: Box::new(StubHooks(harness.can_fly.clone())),
    };
    let mut character = LocomotionCharacter::new(collaborators, role, locally_controlled);
    let events = harness.events.clone();
    character.events_mut().subscribe(move |event| events.lock().unwrap().push(event.clone()));
    character.begin_play(Rotator::ZERO);
    harness.take_events();
    (character, harness)
}
