//! Length-delimited frames.
//!
//! Frame layout:
//!
//! ```text
//! +-----------------+---------------------+
//! | length (VarInt) | payload             |
//! | 1-3 bytes       | length bytes        |
//! +-----------------+---------------------+
//! ```
//!
//! When compression is on, the payload begins with a second VarInt; see
//! [`compression`](crate::compression). When encryption is on, the whole frame,
//! length included, is enciphered.

use crate::error::ProtocolError;
use crate::types::{encode_var_int, peek_var_int, var_int_len};
use crate::MAX_FRAME_LEN;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// A delimited frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: Bytes,
}

impl Frame {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Encoded size including the length prefix.
    pub fn encoded_len(&self) -> usize {
        var_int_len(self.payload.len() as i32) + self.payload.len()
    }

    /// Appends the framed payload to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let len = self.payload.len();
        if len > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_LEN,
            });
        }
        dst.reserve(self.encoded_len());
        encode_var_int(len as i32, dst);
        dst.put_slice(&self.payload);
        Ok(())
    }

    /// Encodes the frame into a fresh buffer.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Decodes a frame from plaintext bytes.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol errors.
    /// Nothing is consumed unless a whole frame is available.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        Self::decode_with_limit(buf, MAX_FRAME_LEN)
    }

    /// Like [`Frame::decode`] with a custom maximum payload length.
    ///
    /// A malformed length prefix cannot be skipped, so it is reported as
    /// [`ProtocolError::InvalidFrameLength`].
    pub fn decode_with_limit(
        buf: &mut BytesMut,
        max: usize,
    ) -> Result<Option<Self>, ProtocolError> {
        let Some((len, prefix)) = peek_var_int(buf).map_err(ProtocolError::InvalidFrameLength)?
        else {
            return Ok(None);
        };
        let len = usize::try_from(len).map_err(|_| {
            ProtocolError::InvalidFrameLength(crate::CodecError::NegativeLength(len.into()))
        })?;
        if len > max {
            return Err(ProtocolError::FrameTooLarge { size: len, max });
        }
        if buf.len() < prefix + len {
            return Ok(None);
        }

        buf.advance(prefix);
        let payload = buf.split_to(len).freeze();
        tracing::trace!("decoded frame of {} bytes", len);
        Ok(Some(Self { payload }))
    }
}
