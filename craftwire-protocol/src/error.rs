//! Protocol error types.
//!
//! Errors are split by layer: [`CodecError`] for a single value that cannot be
//! marshaled, [`VersionResolutionError`] for a switcher with nothing to offer the
//! active version, and [`ProtocolError`] for anything that happens while framing,
//! compressing, encrypting or resolving packet IDs.

use crate::packet::{Direction, Phase};
use crate::version::Version;
use thiserror::Error;

/// Errors raised while decoding or encoding a single value.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unexpected end of buffer: need {needed} bytes, have {remaining}")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("variable-length number exceeds {max_bytes} bytes")]
    VarNumTooLong { max_bytes: usize },

    #[error("string byte length {len} exceeds maximum {max}")]
    StringTooLong { len: usize, max: usize },

    #[error("string has {chars} characters (max {max})")]
    TooManyChars { chars: usize, max: usize },

    #[error("negative length prefix: {0}")]
    NegativeLength(i64),

    #[error("invalid UTF-8 in string")]
    InvalidUtf8,

    #[error("{ty} cannot hold {value}")]
    OutOfRange { ty: &'static str, value: String },

    #[error("expected {expected} value, found {found}")]
    Mismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("unknown {name} value: {value}")]
    UnknownEnumValue { name: &'static str, value: i64 },

    #[error("unknown bit field '{0}'")]
    UnknownBitField(String),

    #[error("value {value} too wide for bits {start}..{end}")]
    BitFieldTooWide { value: u64, start: u32, end: u32 },

    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error(transparent)]
    Version(#[from] VersionResolutionError),
}

/// Raised when a [`VersionSwitcher`](crate::version::VersionSwitcher) has no
/// selector matching a version and no default.
#[derive(Debug, Clone, Error)]
#[error("no variant available for version {version}")]
pub struct VersionResolutionError {
    pub version: Version,
}

/// Stable classification of [`ProtocolError`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A value could not be marshaled.
    Codec,
    /// The peer or the local configuration broke a protocol rule.
    Violation,
    /// A version-switched item had nothing for the active version.
    VersionResolution,
    /// Underlying transport failure.
    Io,
}

/// Protocol-level errors raised by the packet and frame layers.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Version(#[from] VersionResolutionError),

    #[error("invalid frame length prefix: {0}")]
    InvalidFrameLength(CodecError),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("compressed data length {data_len} below threshold {threshold}")]
    CompressedBelowThreshold { data_len: usize, threshold: usize },

    #[error("uncompressed data length {0} exceeds protocol maximum")]
    UncompressedTooLarge(usize),

    #[error("decompressed to {actual} bytes, expected {expected}")]
    DecompressedLengthMismatch { expected: usize, actual: usize },

    #[error("zlib error: {0}")]
    Compression(std::io::Error),

    #[error(
        "duplicate packet ID {id:#04x}: {first} and {second} ({phase:?} {direction:?}, {version})"
    )]
    DuplicatePacketId {
        id: i32,
        first: &'static str,
        second: &'static str,
        phase: Phase,
        direction: Direction,
        version: Version,
    },

    #[error("packet {name} registered twice for {phase:?} {direction:?}")]
    DuplicatePacketName {
        name: &'static str,
        phase: Phase,
        direction: Direction,
    },

    #[error("packet {name} has no ID in version {version}")]
    PacketUnavailable { name: &'static str, version: Version },

    #[error("invalid cipher key length: {0} bytes")]
    InvalidKeyLength(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns the stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::Codec(CodecError::Version(_)) | ProtocolError::Version(_) => {
                ErrorKind::VersionResolution
            }
            ProtocolError::Codec(_) | ProtocolError::PacketUnavailable { .. } => ErrorKind::Codec,
            ProtocolError::Io(_) => ErrorKind::Io,
            ProtocolError::InvalidFrameLength(_)
            | ProtocolError::FrameTooLarge { .. }
            | ProtocolError::CompressedBelowThreshold { .. }
            | ProtocolError::UncompressedTooLarge(_)
            | ProtocolError::DecompressedLengthMismatch { .. }
            | ProtocolError::Compression(_)
            | ProtocolError::DuplicatePacketId { .. }
            | ProtocolError::DuplicatePacketName { .. }
            | ProtocolError::InvalidKeyLength(_) => ErrorKind::Violation,
        }
    }

    /// Returns whether this error must close the connection it occurred on.
    pub fn is_violation(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Violation | ErrorKind::VersionResolution
        )
    }
}
