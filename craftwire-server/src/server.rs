//! TCP server implementation.

use crate::config::Config;
use crate::connection::{Connection, ConnectionConfig, Side};
use crate::dispatcher::{DispatchStats, Dispatcher};
use crate::error::ServerError;
use craftwire_protocol::{PacketRegistry, Version, DEFAULT_PORT, MAX_FRAME_LEN};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Idle connection timeout.
    pub idle_timeout: Duration,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Version assumed before a client's handshake.
    pub version: Version,
    /// Threshold announced to clients after login; `None` leaves compression off.
    pub compression_threshold: Option<usize>,
    /// Grace period for listener tasks of a closing connection.
    pub grace_period: Duration,
    /// Largest accepted frame payload.
    pub max_frame_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            idle_timeout: Duration::from_secs(30),
            max_connections: 1000,
            version: Version::latest(),
            compression_threshold: None,
            grace_period: Duration::from_secs(5),
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Derives the runtime configuration from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Result<Self, ServerError> {
        Ok(Self {
            bind_addr: config.network.bind_addr,
            idle_timeout: config.network.idle_timeout(),
            max_connections: config.network.max_connections,
            version: config.protocol.version()?,
            compression_threshold: config.protocol.compression(),
            grace_period: config.dispatch.shutdown_grace(),
            max_frame_len: config.protocol.max_frame_len,
        })
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_compression_threshold(mut self, threshold: Option<usize>) -> Self {
        self.compression_threshold = threshold;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Settings for each accepted connection.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::default()
            .with_version(self.version)
            .with_idle_timeout(self.idle_timeout)
            .with_grace_period(self.grace_period)
            .with_max_frame_len(self.max_frame_len)
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub errors_total: AtomicU64,
}

/// TCP server: one [`Connection`] per accepted socket, all sharing a
/// [`Dispatcher`].
pub struct Server {
    config: ServerConfig,
    registry: Arc<PacketRegistry>,
    dispatcher: Arc<Dispatcher>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a server for the standard packet set.
    pub fn new(config: ServerConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self::with_registry(config, Arc::new(PacketRegistry::standard()), dispatcher)
    }

    pub fn with_registry(
        config: ServerConfig,
        registry: Arc<PacketRegistry>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            registry,
            dispatcher,
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serves connections accepted from `listener` until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        // Catch ID collisions before the first client does.
        self.registry.validate(&[self.config.version])?;
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(
            "Server listening on {} ({})",
            listener.local_addr()?,
            self.config.version
        );

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.max_connections as u64
                            {
                                tracing::warn!("Connection limit reached, rejecting {}", addr);
                                self.stats.connections_rejected.fetch_add(1, Ordering::Relaxed);
                                continue;
                            }
                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::debug!("[{}] Could not set TCP_NODELAY: {}", addr, e);
                            }

                            let conn = match Connection::builder(Side::Server)
                                .registry(self.registry.clone())
                                .dispatcher(self.dispatcher.clone())
                                .config(self.config.connection_config())
                                .peer_addr(addr)
                                .open(stream)
                            {
                                Ok(conn) => conn,
                                Err(e) => {
                                    tracing::error!("[{}] Could not open connection: {}", addr, e);
                                    self.stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                    continue;
                                }
                            };

                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
                            tracing::info!("Client connected: {}", addr);

                            let stats = self.stats.clone();
                            let conn_shutdown = self.shutdown.subscribe();
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(conn, conn_shutdown).await {
                                    tracing::debug!("Connection {} error: {}", addr, e);
                                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                }
                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                tracing::info!("Client disconnected: {}", addr);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Runs one connection; on shutdown, disconnects it and lets its loop
    /// finish.
    async fn handle_connection(
        conn: Arc<Connection>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let run = conn.clone().run();
        tokio::pin!(run);

        tokio::select! {
            result = &mut run => result,
            _ = shutdown.recv() => {
                tracing::debug!("[{}] Shutdown signal received", conn.label());
                conn.disconnect("Server closed").await;
                run.await?;
                Err(ServerError::ShuttingDown)
            }
        }
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Returns packet and listener counters.
    pub fn dispatch_stats(&self) -> &DispatchStats {
        self.dispatcher.stats()
    }
}
