//! # craftwire-protocol
//!
//! Wire protocol implementation for craftwire, a versioned Minecraft-style
//! client/server protocol.
//!
//! This crate provides:
//! - A version registry and version-dependent value selection
//! - A library of wire types (VarInt, strings, arrays, compounds, enums, bitmasks)
//!   whose encoding may switch by protocol version
//! - Packet schemas, the built-in packet set, and per-version ID tables
//! - Length-delimited framing with zlib compression and AES/CFB8 encryption
//!
//! It performs no I/O; the server crate drives it from sockets.

pub mod cipher;
pub mod codec;
pub mod compression;
pub mod error;
pub mod frame;
pub mod packet;
pub mod packets;
pub mod registry;
pub mod types;
pub mod version;

pub use codec::{FrameDecoder, FrameEncoder};
pub use error::{CodecError, ErrorKind, ProtocolError, VersionResolutionError};
pub use frame::Frame;
pub use packet::{Direction, Packet, PacketDef, PacketKind, Phase};
pub use registry::{IdTable, PacketRegistry};
pub use types::{Record, Value};
pub use version::{Version, VersionRange, VersionSwitcher, SUPPORTED_VERSIONS};

/// Maximum frame payload length: the largest value a 3-byte VarInt holds.
pub const MAX_FRAME_LEN: usize = 2_097_151;

/// Default port for servers.
pub const DEFAULT_PORT: u16 = 25565;

/// Default compression threshold in bytes.
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 256;
