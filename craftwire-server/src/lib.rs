//! # craftwire-server
//!
//! Connections and TCP server for craftwire.
//!
//! This crate provides:
//! - Async connections driving the protocol crate's codec over any byte stream
//! - The handshaking/status/login/play state machine and its side effects
//! - A listener dispatcher with sequential and concurrent modes
//! - A TCP server with connection limits and graceful shutdown
//! - YAML and environment configuration

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod server;

pub use config::{Config, ConfigError, DispatchConfig, NetworkConfig, ProtocolConfig, StatusConfig};
pub use connection::{Connection, ConnectionBuilder, ConnectionConfig, ConnectionState, Side};
pub use dispatcher::{DispatchMode, DispatchStats, Dispatcher};
pub use error::ServerError;
pub use listener::{Checker, Listener, ListenerError, ListenerResult};
pub use server::{Server, ServerConfig, ServerStats};
