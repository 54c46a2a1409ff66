//! Listeners of the debug server.

use craftwire_protocol::packets::{login, status};
use craftwire_protocol::{Direction, Packet, Version};
use craftwire_server::{
    Checker, Config, Connection, Dispatcher, Listener, ServerConfig, ServerError, StatusConfig,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Registers the debug listeners on `dispatcher`.
///
/// Logging and status come from `config`; the compression threshold sent at
/// login is the one `server` runs with.
pub fn install(
    dispatcher: &Dispatcher,
    config: &Config,
    server: &ServerConfig,
) -> Result<(), ServerError> {
    let inbound = Listener::new(
        "log-inbound",
        |conn: Arc<Connection>, packet: Arc<Packet>| async move {
            tracing::info!("[{}] <- {:?}", conn.label(), packet);
            Ok(())
        },
    );
    dispatcher.register(&inbound, [Checker::any()], Direction::Serverbound)?;

    if config.dispatch.log_outbound {
        let outbound = Listener::new(
            "log-outbound",
            |conn: Arc<Connection>, packet: Arc<Packet>| async move {
                tracing::info!("[{}] -> {:?}", conn.label(), packet);
                Ok(())
            },
        );
        dispatcher.register(&outbound, [Checker::any()], Direction::Clientbound)?;
    }

    dispatcher.register(
        &status_responder(config.status.clone()),
        [Checker::packet(&status::serverbound::STATUS_REQUEST)],
        Direction::Serverbound,
    )?;
    dispatcher.register(
        &ping_responder(),
        [Checker::packet(&status::serverbound::PING)],
        Direction::Serverbound,
    )?;
    dispatcher.register(
        &offline_login(server.compression_threshold),
        [Checker::packet(&login::serverbound::LOGIN_START)],
        Direction::Serverbound,
    )?;
    Ok(())
}

/// The JSON body of a status response.
pub fn status_json(settings: &StatusConfig, version: &Version) -> serde_json::Value {
    json!({
        "version": {
            "name": version.to_string(),
            "protocol": version.protocol(),
        },
        "players": {
            "max": settings.max_players,
            "online": 0,
            "sample": [],
        },
        "description": {
            "text": settings.motd,
        },
    })
}

fn status_responder(settings: StatusConfig) -> Listener {
    let settings = Arc::new(settings);
    Listener::new("status", move |conn: Arc<Connection>, _packet: Arc<Packet>| {
        let settings = settings.clone();
        async move {
            let version = conn.version();
            let reply = Packet::new(&status::clientbound::STATUS_RESPONSE, &version)?
                .with("response", status_json(&settings, &version))?;
            conn.write_packet(reply).await?;
            Ok(())
        }
    })
}

fn ping_responder() -> Listener {
    Listener::new("ping", |conn: Arc<Connection>, packet: Arc<Packet>| async move {
        let payload = packet.require("payload")?.clone();
        let reply =
            Packet::new(&status::clientbound::PONG, &conn.version())?.with("payload", payload)?;
        conn.write_packet(reply).await?;
        Ok(())
    })
}

/// Accepts any username without authentication.
fn offline_login(threshold: Option<usize>) -> Listener {
    Listener::new(
        "offline-login",
        move |conn: Arc<Connection>, packet: Arc<Packet>| async move {
            let version = conn.version();
            let username = packet
                .require("username")?
                .as_str()
                .unwrap_or_default()
                .to_string();

            if let Some(threshold) = threshold {
                let set = Packet::new(&login::clientbound::SET_COMPRESSION, &version)?
                    .with("threshold", i32::try_from(threshold)?)?;
                conn.write_packet(set).await?;
            }

            let uuid = Uuid::new_v4();
            let success = Packet::new(&login::clientbound::LOGIN_SUCCESS, &version)?
                .with("uuid", uuid)?
                .with("username", username.as_str())?;
            conn.write_packet(success).await?;
            tracing::info!("[{}] {} logged in as {}", conn.label(), username, uuid);
            Ok(())
        },
    )
}
