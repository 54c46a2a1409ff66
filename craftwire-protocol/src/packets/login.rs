//! Packets of the login phase.

pub mod serverbound {
    use crate::packet::{Direction, PacketDef, Phase};
    use crate::types::{RawBytes, Str};
    use once_cell::sync::Lazy;
    use std::sync::Arc;

    pub static LOGIN_START: Lazy<Arc<PacketDef>> = Lazy::new(|| {
        PacketDef::builder("LoginStart", Phase::Login, Direction::Serverbound)
            .id(0x00)
            .field("username", Str::new(16))
            .build()
    });

    /// The client's RSA-encrypted shared secret and verify token.
    pub static ENCRYPTION_RESPONSE: Lazy<Arc<PacketDef>> = Lazy::new(|| {
        PacketDef::builder("EncryptionResponse", Phase::Login, Direction::Serverbound)
            .id(0x01)
            .field("shared_secret", RawBytes::prefixed())
            .field("verify_token", RawBytes::prefixed())
            .build()
    });
}

pub mod clientbound {
    use crate::packet::{Direction, PacketDef, Phase};
    use crate::types::{Chat, RawBytes, Str, UuidString, UuidType, VarInt, VersionSwitched};
    use crate::version::Version;
    use once_cell::sync::Lazy;
    use std::sync::Arc;

    pub static DISCONNECT: Lazy<Arc<PacketDef>> = Lazy::new(|| {
        PacketDef::builder("DisconnectLogin", Phase::Login, Direction::Clientbound)
            .id(0x00)
            .field("reason", Chat::default())
            .build()
    });

    pub static ENCRYPTION_REQUEST: Lazy<Arc<PacketDef>> = Lazy::new(|| {
        PacketDef::builder("EncryptionRequest", Phase::Login, Direction::Clientbound)
            .id(0x01)
            .field("server_id", Str::new(20))
            .field("public_key", RawBytes::prefixed())
            .field("verify_token", RawBytes::prefixed())
            .build()
    });

    /// Ends the login phase; both sides move to play.
    pub static LOGIN_SUCCESS: Lazy<Arc<PacketDef>> = Lazy::new(|| {
        PacketDef::builder("LoginSuccess", Phase::Login, Direction::Clientbound)
            .id(0x02)
            .field(
                "uuid",
                VersionSwitched::new()
                    .range(..Version::V1_16, UuidString)
                    .or_else(UuidType),
            )
            .field("username", Str::new(16))
            .build()
    });

    /// Turns compression on for every later packet in both directions.
    pub static SET_COMPRESSION: Lazy<Arc<PacketDef>> = Lazy::new(|| {
        PacketDef::builder("SetCompression", Phase::Login, Direction::Clientbound)
            .id(0x03)
            .field("threshold", VarInt)
            .build()
    });
}

#[cfg(test)]
mod tests {
    use super::clientbound::LOGIN_SUCCESS;
    use crate::packet::Packet;
    use crate::version::Version;
    use uuid::Uuid;

    #[test]
    fn test_login_success_uuid_by_version() {
        let uuid = Uuid::from_u128(0x069a79f4_44e9_4726_a5be_fca90e38aaf5);
        let packet = |version: &Version| {
            Packet::new(&LOGIN_SUCCESS, version)
                .unwrap()
                .with("uuid", uuid)
                .unwrap()
                .with("username", "Notch")
                .unwrap()
        };

        let old = packet(&Version::V1_15_2).encode_body(&Version::V1_15_2).unwrap();
        let new = packet(&Version::V1_16).encode_body(&Version::V1_16).unwrap();
        assert_eq!(old.len(), 1 + 37 + 6);
        assert_eq!(new.len(), 1 + 16 + 6);
        assert_eq!(&old[2..10], b"069a79f4");
    }
}
