//! Packets of the status phase (server list ping).

pub mod serverbound {
    use crate::packet::{Direction, PacketDef, Phase};
    use crate::types::Long;
    use once_cell::sync::Lazy;
    use std::sync::Arc;

    pub static STATUS_REQUEST: Lazy<Arc<PacketDef>> = Lazy::new(|| {
        PacketDef::builder("StatusRequest", Phase::Status, Direction::Serverbound)
            .id(0x00)
            .build()
    });

    pub static PING: Lazy<Arc<PacketDef>> = Lazy::new(|| {
        PacketDef::builder("Ping", Phase::Status, Direction::Serverbound)
            .id(0x01)
            .field("payload", Long)
            .build()
    });
}

pub mod clientbound {
    use crate::packet::{Direction, PacketDef, Phase};
    use crate::types::{Json, Long};
    use once_cell::sync::Lazy;
    use std::sync::Arc;

    /// Server list information as JSON.
    pub static STATUS_RESPONSE: Lazy<Arc<PacketDef>> = Lazy::new(|| {
        PacketDef::builder("StatusResponse", Phase::Status, Direction::Clientbound)
            .id(0x00)
            .field("response", Json::default())
            .build()
    });

    /// Echoes the ping payload.
    pub static PONG: Lazy<Arc<PacketDef>> = Lazy::new(|| {
        PacketDef::builder("Pong", Phase::Status, Direction::Clientbound)
            .id(0x01)
            .field("payload", Long)
            .build()
    });
}
