//! The built-in packet set.
//!
//! Definitions are process-wide statics built on first use. Modules follow the
//! connection phases, with a `serverbound` and a `clientbound` module inside
//! each.

pub mod handshaking;
pub mod login;
pub mod play;
pub mod status;

use crate::packet::PacketDef;
use std::sync::Arc;

/// Every built-in definition, in registration order.
pub fn all() -> Vec<Arc<PacketDef>> {
    [
        &*handshaking::serverbound::HANDSHAKE,
        &*status::serverbound::STATUS_REQUEST,
        &*status::serverbound::PING,
        &*status::clientbound::STATUS_RESPONSE,
        &*status::clientbound::PONG,
        &*login::serverbound::LOGIN_START,
        &*login::serverbound::ENCRYPTION_RESPONSE,
        &*login::clientbound::DISCONNECT,
        &*login::clientbound::ENCRYPTION_REQUEST,
        &*login::clientbound::LOGIN_SUCCESS,
        &*login::clientbound::SET_COMPRESSION,
        &*play::serverbound::CHAT_MESSAGE,
        &*play::serverbound::CLIENT_STATUS,
        &*play::serverbound::KEEP_ALIVE,
        &*play::clientbound::DISCONNECT,
        &*play::clientbound::KEEP_ALIVE,
    ]
    .into_iter()
    .cloned()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_is_stable() {
        let first = all();
        let second = all();
        assert_eq!(first.len(), 16);
        assert!(first.iter().zip(&second).all(|(a, b)| Arc::ptr_eq(a, b)));
    }
}
