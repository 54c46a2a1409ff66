//! One protocol connection: framing, state machine and listener dispatch over
//! an async byte stream.
//!
//! A connection reads with [`Connection::run`] (dispatching every packet to
//! the shared [`Dispatcher`]) or, without a dispatcher loop, with
//! [`Connection::read_packet`]. Writes go through [`Connection::write_packet`]
//! from anywhere, including listeners.
//!
//! Packets that change the connection apply their effect as soon as they are
//! read or written, before any listener sees them:
//!
//! | Packet | Effect |
//! |--------|--------|
//! | `Handshake` | adopt `next_state` and the handshake's protocol version |
//! | `SetCompression` | set the compression threshold for both directions |
//! | `LoginSuccess` | move from login to play |
//! | `DisconnectLogin` / `DisconnectPlay` | close a client-side connection |

use crate::dispatcher::Dispatcher;
use crate::error::ServerError;
use craftwire_protocol::cipher::cipher_pair;
use craftwire_protocol::packets::{handshaking, login, play};
use craftwire_protocol::{
    CodecError, Direction, FrameDecoder, FrameEncoder, IdTable, Packet, PacketDef, PacketRegistry,
    Phase, Version, MAX_FRAME_LEN,
};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinSet;
use uuid::Uuid;

/// Which end of the connection this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Server,
    Client,
}

impl Side {
    /// Direction of packets this side reads.
    pub fn inbound(self) -> Direction {
        match self {
            Side::Server => Direction::Serverbound,
            Side::Client => Direction::Clientbound,
        }
    }

    /// Direction of packets this side writes.
    pub fn outbound(self) -> Direction {
        self.inbound().opposite()
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Handshaking,
    Status,
    Login,
    Play,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    /// The packet phase read and written in this state.
    pub fn phase(self) -> Option<Phase> {
        match self {
            ConnectionState::Handshaking => Some(Phase::Handshaking),
            ConnectionState::Status => Some(Phase::Status),
            ConnectionState::Login => Some(Phase::Login),
            ConnectionState::Play => Some(Phase::Play),
            ConnectionState::Closed => None,
        }
    }

    pub fn can_transition_to(self, to: ConnectionState) -> bool {
        match (self, to) {
            (ConnectionState::Closed, _) => false,
            (_, ConnectionState::Closed) => true,
            (from, to) if from == to => true,
            (ConnectionState::Handshaking, ConnectionState::Status | ConnectionState::Login) => {
                true
            }
            (ConnectionState::Login, ConnectionState::Play) => true,
            _ => false,
        }
    }
}

impl From<Phase> for ConnectionState {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Handshaking => ConnectionState::Handshaking,
            Phase::Status => ConnectionState::Status,
            Phase::Login => ConnectionState::Login,
            Phase::Play => ConnectionState::Play,
        }
    }
}

/// Per-connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Version used until a handshake selects another.
    pub version: Version,
    /// How long pending listener tasks may run after close.
    pub grace_period: Duration,
    /// Close after this long without inbound bytes.
    pub idle_timeout: Option<Duration>,
    /// Size of a single socket read.
    pub read_buffer_size: usize,
    /// Largest accepted frame payload.
    pub max_frame_len: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            version: Version::latest(),
            grace_period: Duration::from_secs(5),
            idle_timeout: None,
            read_buffer_size: 8192,
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

impl ConnectionConfig {
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    pub fn with_max_frame_len(mut self, max: usize) -> Self {
        self.max_frame_len = max;
        self
    }
}

/// State and version, swapped together with the table they select.
struct Negotiated {
    state: ConnectionState,
    version: Version,
    inbound: Option<Arc<IdTable>>,
}

struct Reader {
    source: Box<dyn AsyncRead + Send + Unpin>,
    scratch: Vec<u8>,
}

struct Writer {
    sink: Box<dyn AsyncWrite + Send + Unpin>,
    encoder: FrameEncoder,
}

/// Builds a [`Connection`].
pub struct ConnectionBuilder {
    side: Side,
    registry: Option<Arc<PacketRegistry>>,
    dispatcher: Option<Arc<Dispatcher>>,
    config: ConnectionConfig,
    peer_addr: Option<SocketAddr>,
}

impl ConnectionBuilder {
    /// Packet set to decode with. Defaults to the standard registry.
    pub fn registry(mut self, registry: Arc<PacketRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Listeners to run. Defaults to an empty dispatcher.
    pub fn dispatcher(mut self, dispatcher: Arc<Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn peer_addr(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }

    /// Wraps `stream` in a connection in the handshaking state.
    pub fn open<S>(self, stream: S) -> Result<Arc<Connection>, ServerError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(PacketRegistry::standard()));
        let dispatcher = self.dispatcher.unwrap_or_default();
        let config = self.config;

        let state = ConnectionState::Handshaking;
        let inbound = registry.id_table(Phase::Handshaking, self.side.inbound(), &config.version)?;

        let id = Uuid::new_v4();
        let label = match self.peer_addr {
            Some(addr) => addr.to_string(),
            None => {
                let short = id.simple().to_string();
                format!("{:?}:{}", self.side, &short[..8])
            }
        };

        let (source, sink) = tokio::io::split(stream);
        let (closed, _) = watch::channel(false);
        let now = Instant::now();

        Ok(Arc::new(Connection {
            id,
            label,
            side: self.side,
            peer_addr: self.peer_addr,
            registry,
            dispatcher,
            negotiated: RwLock::new(Negotiated {
                state,
                version: config.version,
                inbound: Some(inbound),
            }),
            decoder: Mutex::new(FrameDecoder::new().with_max_frame_len(config.max_frame_len)),
            reader: AsyncMutex::new(Reader {
                source: Box::new(source),
                scratch: vec![0; config.read_buffer_size],
            }),
            writer: AsyncMutex::new(Writer {
                sink: Box::new(sink),
                encoder: FrameEncoder::new(),
            }),
            tasks: Mutex::new(JoinSet::new()),
            closed,
            created_at: now,
            last_activity: Mutex::new(now),
            config,
        }))
    }
}

/// A protocol connection.
pub struct Connection {
    id: Uuid,
    label: String,
    side: Side,
    peer_addr: Option<SocketAddr>,
    registry: Arc<PacketRegistry>,
    dispatcher: Arc<Dispatcher>,
    config: ConnectionConfig,
    negotiated: RwLock<Negotiated>,
    decoder: Mutex<FrameDecoder>,
    reader: AsyncMutex<Reader>,
    writer: AsyncMutex<Writer>,
    /// Listener tasks spawned by concurrent dispatch.
    tasks: Mutex<JoinSet<()>>,
    closed: watch::Sender<bool>,
    created_at: Instant,
    last_activity: Mutex<Instant>,
}

impl Connection {
    pub fn builder(side: Side) -> ConnectionBuilder {
        ConnectionBuilder {
            side,
            registry: None,
            dispatcher: None,
            config: ConnectionConfig::default(),
            peer_addr: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Peer address, or a short generated name; used as the log prefix.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn state(&self) -> ConnectionState {
        self.negotiated.read().state
    }

    pub fn version(&self) -> Version {
        self.negotiated.read().version
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PacketRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Current compression threshold, `None` when disabled.
    pub fn compression(&self) -> Option<usize> {
        self.decoder.lock().compression()
    }

    pub fn is_encrypted(&self) -> bool {
        self.decoder.lock().is_encrypted()
    }

    /// Time since bytes last arrived.
    pub fn idle_duration(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Reads and dispatches packets until the connection closes.
    ///
    /// Fatal errors disconnect the peer; undecodable packets are skipped.
    /// Pending listener tasks are wound down before returning.
    pub async fn run(self: Arc<Self>) -> Result<(), ServerError> {
        tracing::debug!(
            "[{}] Connection opened ({:?} side, {})",
            self.label,
            self.side,
            self.version()
        );
        let inbound = self.side.inbound();

        let result = loop {
            match self.next_packet().await {
                Ok(Some(packet)) => {
                    self.dispatcher
                        .dispatch(&self, Arc::new(packet), inbound)
                        .await
                }
                Ok(None) => break Ok(()),
                Err(e) if !e.is_fatal() => {
                    tracing::debug!("[{}] Skipping undecodable packet: {}", self.label, e);
                }
                Err(e) => break Err(e),
            }
        };

        match &result {
            Ok(()) => self.close().await,
            Err(e) => {
                let reason = match e {
                    ServerError::Protocol(p) if p.is_violation() => {
                        tracing::warn!("[{}] Protocol violation: {}", self.label, p);
                        "Protocol error"
                    }
                    ServerError::IdleTimeout(_) => {
                        tracing::debug!("[{}] Idle timeout", self.label);
                        "Timed out"
                    }
                    other => {
                        tracing::debug!("[{}] Connection error: {}", self.label, other);
                        "Connection error"
                    }
                };
                self.disconnect(reason).await;
            }
        }
        self.wind_down().await;
        result
    }

    /// Awaits the next inbound packet. For connections no dispatcher loop owns.
    pub async fn read_packet(&self) -> Result<Packet, ServerError> {
        self.next_packet().await?.ok_or(ServerError::ConnectionClosed)
    }

    /// Reads until a packet of `def` arrives, dropping the others.
    pub async fn wait_for(&self, def: &PacketDef) -> Result<Packet, ServerError> {
        loop {
            let packet = self.read_packet().await?;
            if packet.is(def) {
                return Ok(packet);
            }
            tracing::trace!(
                "[{}] Dropping {} while waiting for {}",
                self.label,
                packet.name(),
                def.name()
            );
        }
    }

    /// Returns `Ok(None)` once the stream ends or the connection is closed.
    async fn next_packet(&self) -> Result<Option<Packet>, ServerError> {
        let mut closed = self.closed.subscribe();
        loop {
            if *closed.borrow_and_update() {
                return Ok(None);
            }

            let body = self.decoder.lock().decode_payload()?;
            if let Some(body) = body {
                let Some(table) = self.negotiated.read().inbound.clone() else {
                    return Ok(None);
                };
                let size = body.len();
                let packet = table.decode(body)?;
                tracing::trace!("[{}] <- {} ({} bytes)", self.label, packet.name(), size);
                self.apply_inbound(&packet).await?;
                return Ok(Some(packet));
            }

            if !self.fill(&mut closed).await? {
                return Ok(None);
            }
        }
    }

    /// Reads once from the socket into the decoder. Returns `false` at end
    /// of stream or on close.
    async fn fill(&self, closed: &mut watch::Receiver<bool>) -> Result<bool, ServerError> {
        let idle = self.config.idle_timeout;
        let mut reader = self.reader.lock().await;
        let Reader { source, scratch } = &mut *reader;

        let n = tokio::select! {
            result = source.read(&mut scratch[..]) => result?,
            _ = closed.changed() => return Ok(false),
            _ = tokio::time::sleep(idle.unwrap_or_default()), if idle.is_some() => {
                return Err(ServerError::IdleTimeout(idle.unwrap_or_default()));
            }
        };

        if n == 0 {
            let pending = self.decoder.lock().buffered();
            if pending > 0 {
                tracing::debug!(
                    "[{}] Connection closed by peer with {} bytes pending",
                    self.label,
                    pending
                );
            } else {
                tracing::debug!("[{}] Connection closed by peer", self.label);
            }
            return Ok(false);
        }

        tracing::trace!("[{}] Received {} bytes", self.label, n);
        self.decoder.lock().extend(&scratch[..n]);
        *self.last_activity.lock() = Instant::now();
        Ok(true)
    }

    /// Encodes and sends a packet, applies its side effects, then dispatches
    /// outbound listeners.
    pub async fn write_packet(self: &Arc<Self>, packet: Packet) -> Result<(), ServerError> {
        if self.is_closed() {
            return Err(ServerError::ConnectionClosed);
        }
        let body = packet.encode_body(&self.version())?;

        {
            let mut writer = self.writer.lock().await;
            let bytes = writer.encoder.encode(&body)?;
            writer.sink.write_all(&bytes).await?;
            writer.sink.flush().await?;
            tracing::trace!("[{}] -> {} ({} bytes)", self.label, packet.name(), bytes.len());

            // Frames after this one use the new threshold; holding the writer
            // keeps other writers from slipping in between.
            if packet.is(&login::clientbound::SET_COMPRESSION) {
                let threshold = threshold_field(&packet)?;
                writer.encoder.set_compression(threshold);
                self.decoder.lock().set_compression(threshold);
            }
        }

        self.apply_outbound(&packet)?;
        self.dispatcher
            .dispatch(self, Arc::new(packet), self.side.outbound())
            .await;
        Ok(())
    }

    async fn apply_inbound(&self, packet: &Packet) -> Result<(), ServerError> {
        if packet.is(&handshaking::serverbound::HANDSHAKE) {
            self.apply_handshake(packet)
        } else if packet.is(&login::clientbound::LOGIN_SUCCESS) {
            self.transition(ConnectionState::Play, self.version())
        } else if packet.is(&login::clientbound::SET_COMPRESSION) {
            self.set_compression(threshold_field(packet)?).await;
            Ok(())
        } else if packet.is(&login::clientbound::DISCONNECT)
            || packet.is(&play::clientbound::DISCONNECT)
        {
            if self.side == Side::Client {
                tracing::debug!(
                    "[{}] Disconnected by peer: {:?}",
                    self.label,
                    packet.get("reason")
                );
                self.close().await;
            }
            Ok(())
        } else {
            Ok(())
        }
    }

    fn apply_outbound(&self, packet: &Packet) -> Result<(), ServerError> {
        if packet.is(&handshaking::serverbound::HANDSHAKE) {
            self.apply_handshake(packet)
        } else if packet.is(&login::clientbound::LOGIN_SUCCESS) {
            self.transition(ConnectionState::Play, self.version())
        } else {
            Ok(())
        }
    }

    fn apply_handshake(&self, packet: &Packet) -> Result<(), ServerError> {
        let protocol = int_field(packet, "protocol")?;
        let protocol = i32::try_from(protocol).map_err(|_| CodecError::OutOfRange {
            ty: "VarInt",
            value: protocol.to_string(),
        })?;
        let value = packet.require("next_state")?;
        let next = value.as_enum::<Phase>().ok_or(CodecError::Mismatch {
            expected: "enum",
            found: value.type_name(),
        })?;

        let to = ConnectionState::from(next);
        if !matches!(to, ConnectionState::Status | ConnectionState::Login) {
            return Err(ServerError::IllegalTransition {
                from: self.state(),
                to,
            });
        }
        self.transition(to, Version::from_protocol(protocol))
    }

    /// Swaps in a new state and version along with their ID table.
    fn transition(&self, to: ConnectionState, version: Version) -> Result<(), ServerError> {
        let from = self.state();
        if !from.can_transition_to(to) {
            return Err(ServerError::IllegalTransition { from, to });
        }
        let inbound = match to.phase() {
            Some(phase) => Some(self.registry.id_table(phase, self.side.inbound(), &version)?),
            None => None,
        };

        {
            let mut negotiated = self.negotiated.write();
            negotiated.state = to;
            negotiated.version = version;
            negotiated.inbound = inbound;
        }
        tracing::debug!("[{}] {:?} -> {:?} ({})", self.label, from, to, version);
        Ok(())
    }

    /// Changes the protocol version, keeping the current state.
    pub fn set_version(&self, version: Version) -> Result<(), ServerError> {
        self.transition(self.state(), version)
    }

    /// Sets the compression threshold for both directions; `None` disables.
    pub async fn set_compression(&self, threshold: Option<usize>) {
        self.decoder.lock().set_compression(threshold);
        self.writer.lock().await.encoder.set_compression(threshold);
        tracing::debug!("[{}] Compression threshold {:?}", self.label, threshold);
    }

    /// Turns on AES/CFB8 in both directions with `shared_secret` as key and IV.
    ///
    /// Bytes already received but not yet decoded are deciphered here.
    pub async fn enable_encryption(&self, shared_secret: &[u8]) -> Result<(), ServerError> {
        let (encryptor, decryptor) = cipher_pair(shared_secret)?;
        self.decoder.lock().enable_encryption(decryptor);
        self.writer.lock().await.encoder.enable_encryption(encryptor);
        tracing::debug!("[{}] Encryption enabled", self.label);
        Ok(())
    }

    /// Sends a disconnect packet if the state allows one, then closes.
    ///
    /// Failure to send is logged and otherwise ignored.
    pub async fn disconnect(self: &Arc<Self>, reason: &str) {
        if self.is_closed() {
            return;
        }
        if self.side == Side::Server {
            let def = match self.state() {
                ConnectionState::Login => Some(&*login::clientbound::DISCONNECT),
                ConnectionState::Play => Some(&*play::clientbound::DISCONNECT),
                _ => None,
            };
            if let Some(def) = def {
                let text = serde_json::json!({ "text": reason });
                let packet = Packet::new(def, &self.version()).and_then(|p| p.with("reason", text));
                let sent = match packet {
                    Ok(packet) => self.write_packet(packet).await,
                    Err(e) => Err(e.into()),
                };
                if let Err(e) = sent {
                    tracing::debug!("[{}] Could not send disconnect: {}", self.label, e);
                }
            }
        }
        tracing::debug!("[{}] Disconnecting: {}", self.label, reason);
        self.close().await;
    }

    /// Marks the connection closed, stops its reader and shuts down the socket.
    pub async fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        {
            let mut negotiated = self.negotiated.write();
            negotiated.state = ConnectionState::Closed;
            negotiated.inbound = None;
        }
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.sink.shutdown().await {
            tracing::trace!("[{}] Shutdown error: {}", self.label, e);
        }
        tracing::debug!("[{}] Connection closed", self.label);
    }

    /// Waits up to the grace period for pending listener tasks, then cancels
    /// the rest.
    pub async fn wind_down(&self) {
        let mut tasks = std::mem::replace(&mut *self.tasks.lock(), JoinSet::new());
        if tasks.is_empty() {
            return;
        }

        let grace = self.config.grace_period;
        let drained = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                "[{}] Cancelling {} listener task(s) still running after {:?}",
                self.label,
                tasks.len(),
                grace
            );
            tasks.shutdown().await;
        }
    }

    /// Adds a listener task to the connection's task set.
    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        // Reap finished tasks so long-lived connections do not accumulate them.
        while let Some(Some(_)) = tasks.join_next().now_or_never() {}
        tasks.spawn(task);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let negotiated = self.negotiated.read();
        f.debug_struct("Connection")
            .field("label", &self.label)
            .field("side", &self.side)
            .field("state", &negotiated.state)
            .field("version", &negotiated.version)
            .finish()
    }
}

fn int_field(packet: &Packet, name: &str) -> Result<i64, CodecError> {
    let value = packet.require(name)?;
    value.as_i64().ok_or(CodecError::Mismatch {
        expected: "int",
        found: value.type_name(),
    })
}

/// Reads `SetCompression.threshold`; negative disables compression.
fn threshold_field(packet: &Packet) -> Result<Option<usize>, CodecError> {
    Ok(usize::try_from(int_field(packet, "threshold")?).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{Checker, Listener};
    use craftwire_protocol::packets::status;
    use craftwire_protocol::types::Value;

    fn open(side: Side, stream: tokio::io::DuplexStream, version: Version) -> Arc<Connection> {
        Connection::builder(side)
            .config(ConnectionConfig::default().with_version(version))
            .open(stream)
            .unwrap()
    }

    fn pair(
        server_version: Version,
        client_version: Version,
    ) -> (Arc<Connection>, Arc<Connection>) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        (
            open(Side::Server, a, server_version),
            open(Side::Client, b, client_version),
        )
    }

    fn handshake(version: Version, next: Phase) -> Packet {
        Packet::new(&handshaking::serverbound::HANDSHAKE, &version)
            .unwrap()
            .with("protocol", version.protocol())
            .unwrap()
            .with("server_address", "localhost")
            .unwrap()
            .with("server_port", 25565u16)
            .unwrap()
            .with("next_state", Value::from_enum(next))
            .unwrap()
    }

    fn packet(def: &Arc<PacketDef>, version: Version) -> Packet {
        Packet::new(def, &version).unwrap()
    }

    #[tokio::test]
    async fn test_handshake_moves_both_sides() {
        let (server, client) = pair(Version::latest(), Version::V1_15_2);
        assert_eq!(server.state(), ConnectionState::Handshaking);

        client
            .write_packet(handshake(Version::V1_15_2, Phase::Status))
            .await
            .unwrap();
        assert_eq!(client.state(), ConnectionState::Status);

        let received = server.read_packet().await.unwrap();
        assert!(received.is(&handshaking::serverbound::HANDSHAKE));
        assert_eq!(server.state(), ConnectionState::Status);
        assert_eq!(server.version(), Version::V1_15_2);

        client
            .write_packet(packet(&status::serverbound::STATUS_REQUEST, Version::V1_15_2))
            .await
            .unwrap();
        assert!(server
            .read_packet()
            .await
            .unwrap()
            .is(&status::serverbound::STATUS_REQUEST));

        let body = serde_json::json!({ "description": { "text": "hi" } });
        server
            .write_packet(
                packet(&status::clientbound::STATUS_RESPONSE, Version::V1_15_2)
                    .with("response", body.clone())
                    .unwrap(),
            )
            .await
            .unwrap();
        let response = client.read_packet().await.unwrap();
        assert_eq!(response.get("response").and_then(|v| v.as_json()), Some(&body));
    }

    #[tokio::test]
    async fn test_login_with_encryption_and_compression() {
        let version = Version::V1_16_5;
        let (server, client) = pair(version, version);
        let secret = *b"0123456789abcdef";

        client.write_packet(handshake(version, Phase::Login)).await.unwrap();
        client
            .write_packet(
                packet(&login::serverbound::LOGIN_START, version)
                    .with("username", "Steve")
                    .unwrap(),
            )
            .await
            .unwrap();
        client
            .write_packet(
                packet(&login::serverbound::ENCRYPTION_RESPONSE, version)
                    .with("shared_secret", &secret[..])
                    .unwrap()
                    .with("verify_token", &b"tok"[..])
                    .unwrap(),
            )
            .await
            .unwrap();
        client.enable_encryption(&secret).await.unwrap();

        server.read_packet().await.unwrap();
        assert_eq!(server.state(), ConnectionState::Login);
        let start = server.wait_for(&login::serverbound::ENCRYPTION_RESPONSE).await.unwrap();
        let shared = start
            .get("shared_secret")
            .and_then(|v| v.as_bytes())
            .unwrap()
            .clone();
        server.enable_encryption(&shared).await.unwrap();
        assert!(server.is_encrypted());

        server
            .write_packet(
                packet(&login::clientbound::SET_COMPRESSION, version)
                    .with("threshold", 8)
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(server.compression(), Some(8));

        let uuid = Uuid::new_v4();
        server
            .write_packet(
                packet(&login::clientbound::LOGIN_SUCCESS, version)
                    .with("uuid", uuid)
                    .unwrap()
                    .with("username", "Steve")
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(server.state(), ConnectionState::Play);

        client.read_packet().await.unwrap();
        assert_eq!(client.compression(), Some(8));
        let success = client.read_packet().await.unwrap();
        assert_eq!(success.get("uuid").and_then(|v| v.as_uuid()), Some(uuid));
        assert_eq!(client.state(), ConnectionState::Play);

        let message = "a chat message long enough to be compressed";
        client
            .write_packet(
                packet(&play::serverbound::CHAT_MESSAGE, version)
                    .with("message", message)
                    .unwrap(),
            )
            .await
            .unwrap();
        let chat = server.read_packet().await.unwrap();
        assert_eq!(chat.get("message").and_then(|v| v.as_str()), Some(message));

        server
            .write_packet(
                packet(&play::clientbound::KEEP_ALIVE, version)
                    .with("keep_alive_id", 42i64)
                    .unwrap(),
            )
            .await
            .unwrap();
        let keep_alive = client.read_packet().await.unwrap();
        assert_eq!(keep_alive.get("keep_alive_id").and_then(|v| v.as_i64()), Some(42));
    }

    #[tokio::test]
    async fn test_scripted_chunked_reads() {
        let version = Version::V1_12_2;
        let mut encoder = FrameEncoder::new();
        let hello = encoder
            .encode(&handshake(version, Phase::Login).encode_body(&version).unwrap())
            .unwrap();
        let start = encoder
            .encode(
                &packet(&login::serverbound::LOGIN_START, version)
                    .with("username", "Alex")
                    .unwrap()
                    .encode_body(&version)
                    .unwrap(),
            )
            .unwrap();

        let mut joined = hello[5..].to_vec();
        joined.extend_from_slice(&start[..2]);
        let mock = tokio_test::io::Builder::new()
            .read(&hello[..1])
            .read(&hello[1..5])
            .read(&joined)
            .read(&start[2..])
            .build();

        let conn = Connection::builder(Side::Server).open(mock).unwrap();
        let first = conn.read_packet().await.unwrap();
        assert!(first.is(&handshaking::serverbound::HANDSHAKE));
        assert_eq!(conn.state(), ConnectionState::Login);
        assert_eq!(conn.version(), version);

        let second = conn.read_packet().await.unwrap();
        assert_eq!(second.get("username").and_then(|v| v.as_str()), Some("Alex"));
        assert!(matches!(
            conn.read_packet().await,
            Err(ServerError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_run_loop_answers_and_stops_on_eof() {
        let (a, b) = tokio::io::duplex(4096);
        let dispatcher = Arc::new(Dispatcher::new());
        let pong = Listener::new("pong", |conn: Arc<Connection>, packet: Arc<Packet>| async move {
            let payload = packet.require("payload")?.clone();
            let reply =
                Packet::new(&status::clientbound::PONG, &conn.version())?.with("payload", payload)?;
            conn.write_packet(reply).await?;
            Ok(())
        });
        dispatcher
            .register(
                &pong,
                [Checker::packet(&status::serverbound::PING)],
                Direction::Serverbound,
            )
            .unwrap();

        let server = Connection::builder(Side::Server)
            .dispatcher(dispatcher)
            .open(a)
            .unwrap();
        let client = open(Side::Client, b, Version::latest());
        let handle = tokio::spawn(server.clone().run());

        client
            .write_packet(handshake(Version::latest(), Phase::Status))
            .await
            .unwrap();
        client
            .write_packet(
                packet(&status::serverbound::PING, Version::latest())
                    .with("payload", 7i64)
                    .unwrap(),
            )
            .await
            .unwrap();
        let reply = client.wait_for(&status::clientbound::PONG).await.unwrap();
        assert_eq!(reply.get("payload").and_then(|v| v.as_i64()), Some(7));

        client.close().await;
        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(server.is_closed());
        assert_eq!(server.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_disconnect_during_login() {
        let (server, client) = pair(Version::latest(), Version::latest());
        client
            .write_packet(handshake(Version::latest(), Phase::Login))
            .await
            .unwrap();
        server.read_packet().await.unwrap();

        server.disconnect("bye").await;
        assert!(server.is_closed());
        assert!(matches!(
            server
                .write_packet(packet(&login::clientbound::SET_COMPRESSION, Version::latest()))
                .await,
            Err(ServerError::ConnectionClosed)
        ));

        let notice = client.read_packet().await.unwrap();
        assert!(notice.is(&login::clientbound::DISCONNECT));
        assert_eq!(
            notice.get("reason").and_then(|v| v.as_json()),
            Some(&serde_json::json!({ "text": "bye" }))
        );
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn test_idle_timeout() {
        let (a, _b) = tokio::io::duplex(1024);
        let conn = Connection::builder(Side::Server)
            .config(ConnectionConfig::default().with_idle_timeout(Duration::from_millis(30)))
            .open(a)
            .unwrap();
        assert!(matches!(
            conn.read_packet().await,
            Err(ServerError::IdleTimeout(_))
        ));
    }

    #[tokio::test]
    async fn test_handshake_into_play_is_rejected() {
        let (server, client) = pair(Version::latest(), Version::latest());
        let bad = handshake(Version::latest(), Phase::Play);
        // Written raw: the client would reject the transition itself.
        let body = bad.encode_body(&Version::latest()).unwrap();
        let wire = FrameEncoder::new().encode(&body).unwrap();
        client.writer.lock().await.sink.write_all(&wire).await.unwrap();

        assert!(matches!(
            server.read_packet().await,
            Err(ServerError::IllegalTransition {
                from: ConnectionState::Handshaking,
                to: ConnectionState::Play,
            })
        ));
        assert_eq!(server.state(), ConnectionState::Handshaking);
    }

    #[tokio::test]
    async fn test_malformed_length_prefix_closes_connection() {
        for prefix in [&b"\xff\xff\xff\xff\x0f"[..], &b"\xff\xff\xff\xff\xff"[..]] {
            let (a, mut b) = tokio::io::duplex(1024);
            let server = Connection::builder(Side::Server).open(a).unwrap();
            b.write_all(prefix).await.unwrap();

            let result = tokio::time::timeout(Duration::from_secs(2), server.clone().run())
                .await
                .unwrap();
            match result {
                Err(ServerError::Protocol(e)) => {
                    assert!(e.is_violation());
                    assert!(matches!(
                        e,
                        craftwire_protocol::ProtocolError::InvalidFrameLength(_)
                    ));
                }
                other => panic!("unexpected result: {:?}", other),
            }
            assert!(server.is_closed());
            assert_eq!(server.state(), ConnectionState::Closed);
        }
    }

    #[tokio::test]
    async fn test_unknown_handshake_versions_share_bounded_cache() {
        let registry = Arc::new(PacketRegistry::standard());
        let mut cached = None;

        for protocol in 20_000..20_050 {
            let (a, b) = tokio::io::duplex(1024);
            let server = Connection::builder(Side::Server)
                .registry(registry.clone())
                .open(a)
                .unwrap();
            let client = open(Side::Client, b, Version::latest());

            let version = Version::from_protocol(protocol);
            client.write_packet(handshake(version, Phase::Login)).await.unwrap();
            server.read_packet().await.unwrap();
            assert_eq!(server.state(), ConnectionState::Login);
            assert_eq!(server.version().protocol(), protocol);

            let count = *cached.get_or_insert(registry.cached_tables());
            assert_eq!(registry.cached_tables(), count);
        }
    }

    #[test]
    fn test_state_transitions() {
        use ConnectionState::*;
        assert!(Handshaking.can_transition_to(Status));
        assert!(Handshaking.can_transition_to(Login));
        assert!(Login.can_transition_to(Play));
        assert!(Play.can_transition_to(Closed));
        assert!(!Status.can_transition_to(Play));
        assert!(!Closed.can_transition_to(Handshaking));
        assert_eq!(Side::Server.outbound(), Direction::Clientbound);
    }
}
