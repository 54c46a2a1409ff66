//! Packets of the play phase used by the connection core.
//!
//! Play IDs move between releases, so every definition here carries a
//! version-switched ID.

use crate::wire_enum;

wire_enum! {
    /// Action requested by a `ClientStatus` packet.
    pub enum ClientAction {
        Respawn = 0,
        RequestStats = 1,
    }
}

pub mod serverbound {
    use super::ClientAction;
    use crate::packet::{Direction, PacketDef, Phase};
    use crate::types::{EnumType, Long, Str, VarInt};
    use crate::version::{Version, VersionSwitcher};
    use once_cell::sync::Lazy;
    use std::sync::Arc;

    pub static CHAT_MESSAGE: Lazy<Arc<PacketDef>> = Lazy::new(|| {
        PacketDef::builder("ChatMessage", Phase::Play, Direction::Serverbound)
            .switched_id(
                VersionSwitcher::new()
                    .range(..Version::V1_14, 0x02)
                    .or_else(0x03),
            )
            .field("message", Str::new(256))
            .build()
    });

    pub static CLIENT_STATUS: Lazy<Arc<PacketDef>> = Lazy::new(|| {
        PacketDef::builder("ClientStatus", Phase::Play, Direction::Serverbound)
            .switched_id(
                VersionSwitcher::new()
                    .range(..Version::V1_14, 0x03)
                    .or_else(0x04),
            )
            .field("action", EnumType::<ClientAction>::new(VarInt))
            .build()
    });

    pub static KEEP_ALIVE: Lazy<Arc<PacketDef>> = Lazy::new(|| {
        PacketDef::builder("KeepAlive", Phase::Play, Direction::Serverbound)
            .switched_id(
                VersionSwitcher::new()
                    .range(..Version::V1_13, 0x0b)
                    .range(Version::V1_13..Version::V1_14, 0x0e)
                    .range(Version::V1_14..Version::V1_16, 0x0f)
                    .or_else(0x10),
            )
            .field("keep_alive_id", Long)
            .build()
    });
}

pub mod clientbound {
    use crate::packet::{Direction, PacketDef, Phase};
    use crate::types::{Chat, Long};
    use crate::version::{Version, VersionSwitcher};
    use once_cell::sync::Lazy;
    use std::sync::Arc;

    pub static DISCONNECT: Lazy<Arc<PacketDef>> = Lazy::new(|| {
        PacketDef::builder("DisconnectPlay", Phase::Play, Direction::Clientbound)
            .switched_id(
                VersionSwitcher::new()
                    .range(..Version::V1_13, 0x1a)
                    .range(Version::V1_13..Version::V1_14, 0x1b)
                    .range(Version::V1_14..Version::V1_15, 0x1a)
                    .range(Version::V1_15..Version::V1_16, 0x1b)
                    .range(Version::V1_16..Version::V1_16_2, 0x1a)
                    .or_else(0x19),
            )
            .field("reason", Chat::default())
            .build()
    });

    pub static KEEP_ALIVE: Lazy<Arc<PacketDef>> = Lazy::new(|| {
        PacketDef::builder("KeepAlive", Phase::Play, Direction::Clientbound)
            .switched_id(
                VersionSwitcher::new()
                    .range(..Version::V1_13, 0x1f)
                    .range(Version::V1_13..Version::V1_14, 0x21)
                    .range(Version::V1_14..Version::V1_15, 0x20)
                    .range(Version::V1_15..Version::V1_16, 0x21)
                    .range(Version::V1_16..Version::V1_16_2, 0x20)
                    .or_else(0x1f),
            )
            .field("keep_alive_id", Long)
            .build()
    });
}
