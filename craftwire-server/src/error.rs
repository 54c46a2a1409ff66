//! Server error types.

use crate::config::ConfigError;
use crate::connection::ConnectionState;
use craftwire_protocol::{CodecError, ErrorKind, ProtocolError};
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("listener '{0}' is already registered")]
    DuplicateListener(String),

    #[error("listener '{0}' needs at least one checker")]
    NoCheckers(String),

    #[error("unknown protocol version: {0}")]
    UnknownVersion(String),

    #[error("illegal state transition {from:?} -> {to:?}")]
    IllegalTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    #[error("no data received for {0:?}")]
    IdleTimeout(std::time::Duration),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("server shutting down")]
    ShuttingDown,
}

impl From<CodecError> for ServerError {
    fn from(e: CodecError) -> Self {
        ServerError::Protocol(e.into())
    }
}

impl ServerError {
    /// Returns whether the connection that hit this error must be torn down.
    pub fn is_fatal(&self) -> bool {
        match self {
            ServerError::Io(_)
            | ServerError::IllegalTransition { .. }
            | ServerError::IdleTimeout(_)
            | ServerError::ConnectionClosed
            | ServerError::ShuttingDown => true,
            ServerError::Protocol(e) => !matches!(e.kind(), ErrorKind::Codec),
            ServerError::Config(_)
            | ServerError::DuplicateListener(_)
            | ServerError::NoCheckers(_)
            | ServerError::UnknownVersion(_) => false,
        }
    }
}
