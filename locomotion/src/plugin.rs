//! Bevy integration: one `Locomotion` component per character, ticked in
//! `FixedUpdate`.
//!
//! Order inside the fixed step:
//! 1. `Apply`   - observers take the latest replicated snapshot
//! 2. `Tick`    - every character steps its collaborators and the core
//! 3. `Publish` - authorities refresh their `ReplicatedLocomotion`

use bevy::prelude::*;

use crate::character::LocomotionCharacter;
use crate::replication::ReplicatedLocomotion;

#[derive(Component, Debug)]
pub struct Locomotion(pub LocomotionCharacter);

#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocomotionSet {
    Apply,
    Tick,
    Publish,
}

pub struct LocomotionPlugin;

impl Plugin for LocomotionPlugin {
    fn build(&self, app: &mut App) {
        app.configure_sets(
            FixedUpdate,
            (LocomotionSet::Apply, LocomotionSet::Tick, LocomotionSet::Publish).chain(),
        );
        app.add_systems(
            FixedUpdate,
            (
                apply_replicated_snapshots.in_set(LocomotionSet::Apply),
                tick_characters.in_set(LocomotionSet::Tick),
                publish_snapshots.in_set(LocomotionSet::Publish),
            ),
        );
    }
}

fn apply_replicated_snapshots(
    mut query: Query<(&mut Locomotion, &ReplicatedLocomotion), Changed<ReplicatedLocomotion>>,
) {
    for (mut locomotion, snapshot) in query.iter_mut() {
        let character = &mut locomotion.0;
        if character.role().is_authority() {
            continue;
        }
        let is_owner = character.is_locally_controlled();
        character.apply_replicated(snapshot, is_owner);
    }
}

fn tick_characters(time: Res<Time>, mut query: Query<&mut Locomotion>) {
    let dt = time.delta_secs();
    for mut locomotion in query.iter_mut() {
        locomotion.0.update(dt);
    }
}

fn publish_snapshots(mut query: Query<(&Locomotion, &mut ReplicatedLocomotion)>) {
    for (locomotion, mut replicated) in query.iter_mut() {
        if !locomotion.0.role().is_authority() {
            continue;
        }
        let snapshot = locomotion.0.capture_snapshot();
        // only touch the component when something changed so replication stays quiet
        if *replicated != snapshot {
            *replicated = snapshot;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Collaborators, DefaultHooks};
    use crate::kinematic::{FlatGround, KinematicBody, PointMassSkeleton};
    use crate::math::Rotator;
    use crate::states::{MovementState, NetRole};

    fn spawn_character() -> LocomotionCharacter {
        let collaborators = Collaborators {
            driver: Box::new(KinematicBody::default()),
            body: Box::new(PointMassSkeleton::new(0.0)),
            world: Box::new(FlatGround::default()),
            animation: None,
            hooks: Box::new(DefaultHooks),
        };
        let mut character = LocomotionCharacter::new(collaborators, NetRole::Authority, true);
        character.begin_play(Rotator::ZERO);
        character
    }

    #[test]
    fn test_fixed_update_ticks_and_publishes() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins).add_plugins(LocomotionPlugin);
        let entity = app
            .world_mut()
            .spawn((Locomotion(spawn_character()), ReplicatedLocomotion::default()))
            .id();

        app.world_mut().run_schedule(FixedUpdate);

        let locomotion = app.world().get::<Locomotion>(entity).unwrap();
        assert_eq!(locomotion.0.movement_state(), MovementState::Grounded);
        let replicated = app.world().get::<ReplicatedLocomotion>(entity).unwrap();
        assert_eq!(*replicated, locomotion.0.capture_snapshot());
    }
}
