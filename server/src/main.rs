//! Locomotion server - headless Bevy app that owns every character
//!
//! Lightyear 0.25 / Bevy 0.17

mod systems;

use bevy::prelude::*;
use bevy::app::ScheduleRunnerPlugin;
use lightyear::prelude::*;
use lightyear::prelude::server::*;
use locomotion::{
    tick_duration, LocomotionPlugin, LocomotionSet, ProtocolPlugin,
    PRIVATE_KEY, PROTOCOL_ID, SERVER_PORT, get_server_bind_addr,
};
use std::net::SocketAddr;

use systems::{CharacterSettings, ClientInputs};

/// Marker for our server entity
#[derive(Component)]
struct GameServer;

/// Spawn the server entity with all required networking components
fn spawn_server(mut commands: Commands) {
    let bind_addr = get_server_bind_addr();
    let server_addr: SocketAddr = match format!("{}:{}", bind_addr, SERVER_PORT).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid server bind address {}:{}: {}", bind_addr, SERVER_PORT, e);
            return;
        }
    };

    info!("Spawning server entity, binding to {:?}", server_addr);

    // Spawn server entity with UDP + Netcode
    commands.spawn((
        GameServer,
        Server::default(),
        ServerUdpIo::default(),
        LocalAddr(server_addr),
        NetcodeServer::new(NetcodeConfig {
            protocol_id: PROTOCOL_ID,
            private_key: PRIVATE_KEY,
            ..default()
        }),
    ));
}

/// Start the server after it's spawned
fn start_server(
    mut commands: Commands,
    server_query: Query<Entity, (With<GameServer>, Without<Started>, Without<Starting>)>,
) {
    for server_entity in server_query.iter() {
        info!("Starting server...");
        commands.trigger(Start { entity: server_entity });
    }
}

/// Check if server is started (run condition)
fn server_is_started(server_query: Query<(), (With<GameServer>, With<Started>)>) -> bool {
    !server_query.is_empty()
}

fn main() {
    let mut app = App::new();

    // Headless plugins (no rendering). The main loop runs at the fixed tick
    // rate so message buffers are not cleared before `FixedUpdate` reads them.
    app.add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(tick_duration())));
    app.add_plugins(bevy::log::LogPlugin::default());

    app.insert_resource(CharacterSettings::from_env());
    app.init_resource::<ClientInputs>();

    // Lightyear server plugins (tick_duration = 60Hz)
    app.add_plugins(ServerPlugins {
        tick_duration: tick_duration(),
    });
    app.add_plugins(ProtocolPlugin);

    // Character apply -> tick -> publish, in FixedUpdate
    app.add_plugins(LocomotionPlugin);

    app.add_systems(Startup, spawn_server);
    app.add_systems(Update, start_server);

    app.add_observer(systems::handle_disconnections);

    // Fixed tick: connections and client messages before the characters
    // tick, broadcasts after.
    app.add_systems(
        FixedUpdate,
        (
            systems::handle_connections,
            systems::receive_client_input,
            systems::receive_client_actions,
            systems::apply_movement_input,
        )
            .chain()
            .before(LocomotionSet::Apply)
            .run_if(server_is_started),
    );
    app.add_systems(
        FixedUpdate,
        systems::relay_broadcasts
            .after(LocomotionSet::Tick)
            .run_if(server_is_started),
    );

    info!("Starting server on port {}", SERVER_PORT);
    app.run();
}
