//! AES-128 in CFB-8 mode, the stream cipher used after the login key exchange.
//!
//! The shared secret is both key and IV. Each direction keeps its own cipher
//! state, which advances by exactly one step per byte; a byte must never be
//! processed twice.

use crate::error::ProtocolError;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes128;
use std::fmt;

type Cfb8Encryptor = cfb8::Encryptor<Aes128>;
type Cfb8Decryptor = cfb8::Decryptor<Aes128>;

/// Length of the shared secret in bytes.
pub const SECRET_LEN: usize = 16;

/// Enciphers outgoing bytes in place.
pub struct Encryptor {
    inner: Cfb8Encryptor,
}

impl Encryptor {
    pub fn new(secret: &[u8]) -> Result<Self, ProtocolError> {
        let inner = Cfb8Encryptor::new_from_slices(secret, secret)
            .map_err(|_| ProtocolError::InvalidKeyLength(secret.len()))?;
        Ok(Self { inner })
    }

    pub fn encrypt(&mut self, data: &mut [u8]) {
        for byte in data.chunks_mut(1) {
            self.inner.encrypt_block_mut(GenericArray::from_mut_slice(byte));
        }
    }
}

impl fmt::Debug for Encryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Encryptor(AES-128-CFB8)")
    }
}

/// Deciphers incoming bytes in place.
pub struct Decryptor {
    inner: Cfb8Decryptor,
}

impl Decryptor {
    pub fn new(secret: &[u8]) -> Result<Self, ProtocolError> {
        let inner = Cfb8Decryptor::new_from_slices(secret, secret)
            .map_err(|_| ProtocolError::InvalidKeyLength(secret.len()))?;
        Ok(Self { inner })
    }

    pub fn decrypt(&mut self, data: &mut [u8]) {
        for byte in data.chunks_mut(1) {
            self.inner.decrypt_block_mut(GenericArray::from_mut_slice(byte));
        }
    }
}

impl fmt::Debug for Decryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Decryptor(AES-128-CFB8)")
    }
}

/// Creates the cipher pair for one side of a connection.
pub fn cipher_pair(secret: &[u8]) -> Result<(Encryptor, Decryptor), ProtocolError> {
    Ok((Encryptor::new(secret)?, Decryptor::new(secret)?))
}
