//! Lightyear network protocol definition
//!
//! Lightyear 0.25 - merged entity model. The server owns the authoritative
//! locomotion character for every client and replicates a
//! `ReplicatedLocomotion` snapshot; one-shot calls ride the reliable channel.

use bevy::prelude::*;
use lightyear::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::input::InputAction;
use crate::math::Rotator;
use crate::replication::{LocomotionBroadcast, LocomotionRequest, ReplicatedLocomotion};

// --- Components ---

/// Marks a character entity and the client that controls it.
#[derive(Component, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CharacterOwner {
    pub client_id: PeerId,
}

// --- Input ---

/// Analog input sent from client to server each tick.
/// `movement` is (forward, right, up) in -1..1, relative to the camera yaw.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
pub struct LocomotionInput {
    pub movement: Vec3,
    pub control_rotation: Rotator,
}

// --- Messages ---

/// Server -> Client: a multicast for one character.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct CharacterBroadcast {
    /// Peer id of the character's owner (see `peer_id_to_u64` on the server).
    pub character: u64,
    pub broadcast: LocomotionBroadcast,
}

// --- Channels ---
// In Lightyear 0.25, Channel trait is auto-implemented for all Send + Sync + 'static types

/// Reliable channel for state requests, discrete actions and broadcasts
pub struct ReliableChannel;

/// Unreliable channel for frequent input (lowest latency)
pub struct InputChannel;

// --- Protocol Plugin ---

pub struct ProtocolPlugin;

impl Plugin for ProtocolPlugin {
    fn build(&self, app: &mut App) {
        // === CHARACTER COMPONENTS ===
        app.register_component::<CharacterOwner>()
            .add_prediction();

        app.register_component::<ReplicatedLocomotion>()
            .add_prediction();

        // === MESSAGES ===

        // Client -> Server
        app.register_message::<LocomotionInput>()
            .add_direction(NetworkDirection::ClientToServer);
        app.register_message::<InputAction>()
            .add_direction(NetworkDirection::ClientToServer);
        app.register_message::<LocomotionRequest>()
            .add_direction(NetworkDirection::ClientToServer);

        // Server -> Client
        app.register_message::<CharacterBroadcast>()
            .add_direction(NetworkDirection::ServerToClient);

        // === CHANNELS ===

        app.add_channel::<ReliableChannel>(ChannelSettings {
            mode: ChannelMode::OrderedReliable(ReliableSettings::default()),
            ..default()
        })
        .add_direction(NetworkDirection::Bidirectional);

        app.add_channel::<InputChannel>(ChannelSettings {
            mode: ChannelMode::UnorderedUnreliable,
            ..default()
        })
        // High-frequency input: client -> server only
        .add_direction(NetworkDirection::ClientToServer);
    }
}

// --- Network Configuration ---

pub const SERVER_PORT: u16 = 5000;
pub const SERVER_ADDR: &str = "127.0.0.1";
pub const PROTOCOL_ID: u64 = 0x1234567890ABCDEF;

/// Address the server binds to; 0.0.0.0 accepts local and remote clients.
pub fn get_server_bind_addr() -> &'static str {
    "0.0.0.0"
}

/// Shared private key for local development
pub const PRIVATE_KEY: [u8; 32] = [
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
    0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f, 0x10,
    0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18,
    0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e, 0x1f, 0x20,
];

/// Fixed timestep for locomotion (60 Hz)
pub const FIXED_TIMESTEP_HZ: f64 = 60.0;

/// Tick duration for lightyear plugins
pub fn tick_duration() -> Duration {
    Duration::from_secs_f64(1.0 / FIXED_TIMESTEP_HZ)
}
