//! Stateful encoder and decoder for one direction of a connection.
//!
//! The decoder owns the plaintext buffer. Incoming bytes are deciphered once,
//! as they arrive, and only then searched for frame boundaries, so the length
//! prefix can be read even when it was encrypted on the wire.

use crate::cipher::{Decryptor, Encryptor};
use crate::compression::{compress, decompress};
use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::MAX_FRAME_LEN;
use bytes::{Bytes, BytesMut};

/// Turns raw connection bytes into packet bodies.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    decryptor: Option<Decryptor>,
    threshold: Option<usize>,
    max_frame_len: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            decryptor: None,
            threshold: None,
            max_frame_len: MAX_FRAME_LEN,
        }
    }

    /// Sets the largest frame payload accepted.
    pub fn with_max_frame_len(mut self, max: usize) -> Self {
        self.max_frame_len = max;
        self
    }

    /// Appends newly received bytes, deciphering them if encryption is on.
    pub fn extend(&mut self, data: &[u8]) {
        let start = self.buffer.len();
        self.buffer.extend_from_slice(data);
        if let Some(decryptor) = &mut self.decryptor {
            decryptor.decrypt(&mut self.buffer[start..]);
        }
    }

    /// Turns on decryption for every byte not yet consumed.
    ///
    /// Bytes already buffered arrived after the peer switched ciphers, so they
    /// are deciphered here, once.
    pub fn enable_encryption(&mut self, mut decryptor: Decryptor) {
        decryptor.decrypt(&mut self.buffer);
        self.decryptor = Some(decryptor);
    }

    pub fn is_encrypted(&self) -> bool {
        self.decryptor.is_some()
    }

    /// Sets the compression threshold; `None` disables compression.
    pub fn set_compression(&mut self, threshold: Option<usize>) {
        self.threshold = threshold;
    }

    pub fn compression(&self) -> Option<usize> {
        self.threshold
    }

    /// Attempts to decode the next frame from the buffer.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        Frame::decode_with_limit(&mut self.buffer, self.max_frame_len)
    }

    /// Attempts to decode the next packet body (ID and fields).
    ///
    /// Returns `Ok(None)` until a whole frame has arrived.
    pub fn decode_payload(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        let Some(frame) = self.decode_frame()? else {
            return Ok(None);
        };
        match self.threshold {
            Some(threshold) => decompress(frame.payload, threshold).map(Some),
            None => Ok(Some(frame.payload)),
        }
    }

    /// Returns the number of plaintext bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns packet bodies into bytes ready for the socket.
#[derive(Debug, Default)]
pub struct FrameEncoder {
    encryptor: Option<Encryptor>,
    threshold: Option<usize>,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable_encryption(&mut self, encryptor: Encryptor) {
        self.encryptor = Some(encryptor);
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryptor.is_some()
    }

    /// Sets the compression threshold; `None` disables compression.
    pub fn set_compression(&mut self, threshold: Option<usize>) {
        self.threshold = threshold;
    }

    pub fn compression(&self) -> Option<usize> {
        self.threshold
    }

    /// Compresses, frames and enciphers one packet body.
    pub fn encode(&mut self, body: &[u8]) -> Result<BytesMut, ProtocolError> {
        let payload = match self.threshold {
            Some(threshold) => compress(body, threshold)?.freeze(),
            None => Bytes::copy_from_slice(body),
        };
        let mut out = Frame::new(payload).encode()?;
        if let Some(encryptor) = &mut self.encryptor {
            encryptor.encrypt(&mut out);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::cipher_pair;
    use crate::types::{decode_var_int, encode_var_int};

    const SECRET: &[u8] = b"fedcba9876543210";

    #[test]
    fn test_empty_packet_split_across_reads() {
        let mut encoder = FrameEncoder::new();
        let wire = encoder.encode(b"\x00").unwrap();
        assert_eq!(&wire[..], b"\x01\x00");

        let mut decoder = FrameDecoder::new();
        decoder.extend(&wire[..1]);
        assert!(decoder.decode_payload().unwrap().is_none());
        decoder.extend(&wire[1..]);

        let mut body = decoder.decode_payload().unwrap().unwrap();
        assert_eq!(decode_var_int(&mut body).unwrap(), 0);
        assert!(body.is_empty());
        assert!(decoder.decode_payload().unwrap().is_none());
    }

    #[test]
    fn test_threshold_framing() {
        let mut encoder = FrameEncoder::new();
        encoder.set_compression(Some(5));

        let small = encoder.encode(b"abc").unwrap();
        assert_eq!(&small[..], b"\x04\x00abc");

        let large = encoder.encode(b"0123456789").unwrap();
        assert_eq!(large[0] as usize, large.len() - 1);
        assert_eq!(large[1], 10);

        let mut decoder = FrameDecoder::new();
        decoder.set_compression(Some(5));
        decoder.extend(&small);
        decoder.extend(&large);
        assert_eq!(&decoder.decode_payload().unwrap().unwrap()[..], b"abc");
        assert_eq!(
            &decoder.decode_payload().unwrap().unwrap()[..],
            b"0123456789"
        );
    }

    #[test]
    fn test_compressed_below_threshold_is_violation() {
        let mut encoder = FrameEncoder::new();
        encoder.set_compression(Some(1));
        let wire = encoder.encode(b"0123456789").unwrap();

        let mut decoder = FrameDecoder::new();
        decoder.set_compression(Some(64));
        decoder.extend(&wire);
        let err = decoder.decode_payload().unwrap_err();
        assert!(err.is_violation());
    }

    #[test]
    fn test_encrypted_stream_in_small_chunks() {
        let (enc, _) = cipher_pair(SECRET).unwrap();
        let (_, dec) = cipher_pair(SECRET).unwrap();
        let mut encoder = FrameEncoder::new();
        encoder.enable_encryption(enc);

        let mut wire = BytesMut::new();
        let mut plain = FrameEncoder::new();
        let mut plaintext = BytesMut::new();
        for body in [&b"\x01first"[..], &b"\x02second"[..], &b"\x03third"[..]] {
            wire.extend_from_slice(&encoder.encode(body).unwrap());
            plaintext.extend_from_slice(&plain.encode(body).unwrap());
        }
        assert_eq!(wire.len(), plaintext.len());
        assert_ne!(wire, plaintext);

        let mut decoder = FrameDecoder::new();
        decoder.enable_encryption(dec);
        let mut bodies = Vec::new();
        for chunk in wire.chunks(3) {
            decoder.extend(chunk);
            while let Some(body) = decoder.decode_payload().unwrap() {
                bodies.push(body);
            }
        }
        assert_eq!(bodies.len(), 3);
        assert_eq!(&bodies[1][..], b"\x02second");
    }

    #[test]
    fn test_encryption_enabled_with_bytes_pending() {
        let (enc, _) = cipher_pair(SECRET).unwrap();
        let (_, dec) = cipher_pair(SECRET).unwrap();

        // A plaintext frame followed by an encrypted one in the same read.
        let mut plain = FrameEncoder::new();
        let mut secure = FrameEncoder::new();
        secure.enable_encryption(enc);
        let mut wire = plain.encode(b"\x01key").unwrap();
        wire.extend_from_slice(&secure.encode(b"\x02after").unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.extend(&wire);
        assert_eq!(&decoder.decode_payload().unwrap().unwrap()[..], b"\x01key");
        decoder.enable_encryption(dec);
        assert_eq!(&decoder.decode_payload().unwrap().unwrap()[..], b"\x02after");
    }

    #[test]
    fn test_max_frame_len() {
        let mut decoder = FrameDecoder::new().with_max_frame_len(16);
        let mut wire = BytesMut::new();
        encode_var_int(17, &mut wire);
        decoder.extend(&wire);
        assert!(matches!(
            decoder.decode_payload(),
            Err(ProtocolError::FrameTooLarge { size: 17, max: 16 })
        ));
    }

    #[test]
    fn test_decoder_buffered() {
        let mut decoder = FrameDecoder::default();
        assert_eq!(decoder.buffered(), 0);

        decoder.extend(b"\x05ab");
        assert_eq!(decoder.buffered(), 3);

        decoder.clear();
        assert_eq!(decoder.buffered(), 0);
    }
}
