//! Packets of the handshaking phase.

pub mod serverbound {
    use crate::packet::{Direction, PacketDef, Phase};
    use crate::types::{EnumType, Str, UnsignedShort, VarInt};
    use once_cell::sync::Lazy;
    use std::sync::Arc;

    /// Opens a connection. The server moves to `next_state` and adopts `protocol`.
    pub static HANDSHAKE: Lazy<Arc<PacketDef>> = Lazy::new(|| {
        PacketDef::builder("Handshake", Phase::Handshaking, Direction::Serverbound)
            .id(0x00)
            .field("protocol", VarInt)
            .field("server_address", Str::new(255))
            .field("server_port", UnsignedShort)
            .field("next_state", EnumType::<Phase>::new(VarInt))
            .build()
    });
}
