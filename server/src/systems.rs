//! Server-side locomotion systems
//!
//! Lightyear 0.25: every connected client gets one authoritative locomotion
//! character. Inputs and state requests arrive as messages on the client link
//! entity; multicasts leave as `CharacterBroadcast` to every client.

use bevy::prelude::*;
use lightyear::prelude::*;
use lightyear::prelude::server::*;
use std::collections::HashMap;

use locomotion::driver::DefaultHooks;
use locomotion::kinematic::{FlatGround, KinematicBody, PointMassSkeleton};
use locomotion::{
    CharacterBroadcast, CharacterOwner, Collaborators, InputAction, Locomotion, LocomotionCharacter,
    LocomotionConfig, LocomotionInput, LocomotionRequest, MovementSettingsPreset, NetRole, OutgoingMessage,
    ReliableChannel, ReplicatedLocomotion, Rotator,
};

/// Height of the flat arena floor.
pub const GROUND_HEIGHT: f32 = 0.0;
/// Spawn point for new characters (x/z; y is snapped to the floor)
pub const SPAWN_POSITION: Vec3 = Vec3::ZERO;
/// Characters spawn somewhere inside this radius around the spawn point
const SPAWN_JITTER: f32 = 300.0;

/// Tunables handed to every character the server spawns.
#[derive(Resource, Default)]
pub struct CharacterSettings {
    pub config: LocomotionConfig,
    pub preset: MovementSettingsPreset,
}

impl CharacterSettings {
    /// Read RON overrides named by `LOCOMOTION_CONFIG` / `LOCOMOTION_PRESET`.
    /// A missing variable keeps the defaults; a bad file is logged and skipped.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(path) = std::env::var("LOCOMOTION_CONFIG") {
            match LocomotionConfig::load(std::path::Path::new(&path)) {
                Ok(config) => {
                    info!("Loaded locomotion config from {}", path);
                    settings.config = config;
                }
                Err(e) => error!("Failed to load locomotion config: {}", e),
            }
        }

        if let Ok(path) = std::env::var("LOCOMOTION_PRESET") {
            let preset = std::fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read {}: {}", path, e))
                .and_then(|text| MovementSettingsPreset::from_ron_str(&text));
            match preset {
                Ok(preset) => {
                    info!("Loaded movement preset from {}", path);
                    settings.preset = preset;
                }
                Err(e) => error!("Failed to load movement preset: {}", e),
            }
        }

        settings
    }
}

/// Stores the latest analog input for each connected client.
#[derive(Resource, Default)]
pub struct ClientInputs {
    pub latest: HashMap<PeerId, LocomotionInput>,
}

/// Build the authority copy of a remote player's character. Clients only send
/// input, so the server resolves gait for it.
pub fn spawn_authority_character(settings: &CharacterSettings, position: Vec3, facing: Rotator) -> LocomotionCharacter {
    let collaborators = Collaborators {
        driver: Box::new(KinematicBody::standing_at(position, GROUND_HEIGHT)),
        body: Box::new(PointMassSkeleton::new(GROUND_HEIGHT)),
        world: Box::new(FlatGround { height: GROUND_HEIGHT }),
        animation: None,
        hooks: Box::new(DefaultHooks),
    };
    let mut character = LocomotionCharacter::new(collaborators, NetRole::Authority, false)
        .with_config(settings.config.clone())
        .with_preset(settings.preset.clone())
        .networked(true)
        .server_driven(true);
    character.begin_play(facing);
    character
}

fn random_spawn_point() -> (Vec3, Rotator) {
    let angle = rand::random::<f32>() * std::f32::consts::TAU;
    let radius = rand::random::<f32>().sqrt() * SPAWN_JITTER;
    let position = SPAWN_POSITION + Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius);
    let facing = Rotator::from_yaw(rand::random::<f32>() * 360.0 - 180.0);
    (position, facing)
}

/// Handle new client connections: open the message channels and spawn the
/// client's character.
pub fn handle_connections(
    mut commands: Commands,
    settings: Res<CharacterSettings>,
    // Query for client links that just got Connected
    new_clients: Query<(Entity, &RemoteId), Added<Connected>>,
    // Filter to only get client links (not the server itself)
    client_filter: Query<(), With<ClientOf>>,
) {
    for (client_entity, remote_id) in new_clients.iter() {
        if client_filter.get(client_entity).is_err() {
            continue;
        }

        let peer_id = remote_id.0;

        // Lightyear 0.25 needs these on the connection entity or nothing is
        // replicated or received.
        commands.entity(client_entity).insert((
            ReplicationSender::new(locomotion::tick_duration(), SendUpdatesMode::SinceLastAck, false),
            MessageReceiver::<LocomotionInput>::default(),
            MessageReceiver::<InputAction>::default(),
            MessageReceiver::<LocomotionRequest>::default(),
            MessageSender::<CharacterBroadcast>::default(),
        ));

        let (position, facing) = random_spawn_point();
        let character = spawn_authority_character(&settings, position, facing);
        let snapshot = character.capture_snapshot();

        commands.spawn((
            CharacterOwner { client_id: peer_id },
            Locomotion(character),
            snapshot,
            Replicate::new(ReplicationMode::SingleServer(NetworkTarget::All)),
            ControlledBy {
                owner: client_entity,
                lifetime: Lifetime::default(),
            },
        ));

        info!("Client connected: {:?} - character spawned at {:?}", peer_id, position);
    }
}

/// Log departures and drop cached input. The character itself goes with the
/// session through `ControlledBy`.
pub fn handle_disconnections(
    trigger: On<Add, Disconnected>,
    client_entities: Query<&RemoteId>,
    characters: Query<&CharacterOwner, With<Locomotion>>,
    mut inputs: ResMut<ClientInputs>,
) {
    let client_entity = trigger.entity;

    let Ok(remote_id) = client_entities.get(client_entity) else {
        warn!("Disconnect trigger for entity {:?} but no RemoteId found", client_entity);
        return;
    };
    let peer_id = remote_id.0;

    if !characters.iter().any(|owner| owner.client_id == peer_id) {
        warn!("No character found for disconnected peer {:?}", peer_id);
    }

    inputs.latest.remove(&peer_id);
    info!("Client {:?} disconnected: {:?}", client_entity, peer_id);
}

/// Cache analog input from clients. The latest value keeps driving the
/// character until a newer one arrives.
pub fn receive_client_input(
    mut inputs: ResMut<ClientInputs>,
    mut client_links: Query<(&RemoteId, &mut MessageReceiver<LocomotionInput>), With<ClientOf>>,
    time: Res<Time>,
    mut last_debug_time: Local<f32>,
) {
    let now = time.elapsed_secs();
    for (remote_id, mut receiver) in client_links.iter_mut() {
        let mut any = false;
        for input in receiver.receive() {
            any = true;
            inputs.latest.insert(remote_id.0, input);
        }
        if any && (now - *last_debug_time) > 0.5 {
            debug!("Received LocomotionInput from {:?}", remote_id.0);
            *last_debug_time = now;
        }
    }
}

/// Discrete actions and state requests, applied to the sender's character.
pub fn receive_client_actions(
    mut client_links: Query<
        (
            &RemoteId,
            &mut MessageReceiver<InputAction>,
            &mut MessageReceiver<LocomotionRequest>,
        ),
        With<ClientOf>,
    >,
    mut characters: Query<(&CharacterOwner, &mut Locomotion)>,
) {
    for (remote_id, mut actions, mut requests) in client_links.iter_mut() {
        let peer_id = remote_id.0;
        let actions: Vec<InputAction> = actions.receive().collect();
        let requests: Vec<LocomotionRequest> = requests.receive().collect();
        if actions.is_empty() && requests.is_empty() {
            continue;
        }

        let Some((_, mut locomotion)) = characters.iter_mut().find(|(owner, _)| owner.client_id == peer_id) else {
            warn!("Dropping input from {:?}: no character", peer_id);
            continue;
        };

        for action in actions {
            locomotion.0.apply_input(action);
        }
        for request in requests {
            locomotion.0.handle_request(request);
        }
    }
}

/// Feed the cached analog input into each character before it ticks.
pub fn apply_movement_input(
    inputs: Res<ClientInputs>,
    mut characters: Query<(&CharacterOwner, &mut Locomotion)>,
) {
    for (owner, mut locomotion) in characters.iter_mut() {
        let Some(input) = inputs.latest.get(&owner.client_id) else {
            continue;
        };
        let character = &mut locomotion.0;
        character.set_control_rotation(input.control_rotation);
        character.apply_input(InputAction::MoveForward(input.movement.x));
        character.apply_input(InputAction::MoveRight(input.movement.y));
        character.apply_input(InputAction::MoveUp(input.movement.z));
    }
}

/// Send every queued multicast to all connected clients.
pub fn relay_broadcasts(
    mut characters: Query<(&CharacterOwner, &mut Locomotion)>,
    mut client_links: Query<&mut MessageSender<CharacterBroadcast>, (With<ClientOf>, With<Connected>)>,
) {
    for (owner, mut locomotion) in characters.iter_mut() {
        for message in locomotion.0.drain_outgoing() {
            match message {
                OutgoingMessage::ToAll(broadcast) => {
                    let message = CharacterBroadcast {
                        character: peer_id_to_u64(owner.client_id),
                        broadcast,
                    };
                    for mut sender in client_links.iter_mut() {
                        sender.send::<ReliableChannel>(message.clone());
                    }
                }
                OutgoingMessage::ToAuthority(request) => {
                    warn!("Authority character queued a request {:?}; dropping", request);
                }
            }
        }
    }
}

/// Convert PeerId to u64 for use in broadcasts
pub fn peer_id_to_u64(peer_id: PeerId) -> u64 {
    match peer_id {
        PeerId::Netcode(id) => id,
        PeerId::Steam(id) => id,
        PeerId::Local(id) => id,
        PeerId::Entity(id) => id,
        PeerId::Raw(addr) => {
            // Hash the socket address to a u64
            use std::hash::{Hash, Hasher};
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            addr.hash(&mut hasher);
            hasher.finish()
        },
        PeerId::Server => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locomotion::{Gait, MovementState};

    #[test]
    fn test_peer_id_to_u64() {
        assert_eq!(peer_id_to_u64(PeerId::Netcode(42)), 42);
        assert_eq!(peer_id_to_u64(PeerId::Server), 0);
    }

    #[test]
    fn test_spawn_point_within_jitter() {
        for _ in 0..32 {
            let (position, facing) = random_spawn_point();
            assert!(position.distance(SPAWN_POSITION) <= SPAWN_JITTER + 1e-3);
            assert!((-180.0..=180.0).contains(&facing.yaw));
        }
    }

    #[test]
    fn test_authority_character_starts_grounded() {
        let character = spawn_authority_character(&CharacterSettings::default(), Vec3::new(100.0, 0.0, 50.0), Rotator::ZERO);
        assert_eq!(character.role(), NetRole::Authority);
        assert!(!character.is_locally_controlled());
        assert_eq!(character.movement_state(), MovementState::Grounded);
        assert!(character.capture_snapshot().movement.is_some());
    }

    #[test]
    fn test_running_character_reaches_run_speed() {
        let settings = CharacterSettings::default();
        let mut character = spawn_authority_character(&settings, Vec3::ZERO, Rotator::ZERO);
        character.set_desired_gait(Gait::Running);

        for _ in 0..240 {
            character.apply_input(InputAction::MoveForward(1.0));
            character.update(1.0 / 60.0);
        }

        let run_speed = character.adapter().settings().run_speed;
        let speed = character.driver().velocity().length();
        assert_eq!(character.gait(), Gait::Running);
        assert!(speed > 300.0, "speed {} stuck below run speed {}", speed, run_speed);
        assert!(speed <= run_speed + 1.0);
    }
}
