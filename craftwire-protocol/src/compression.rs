//! Zlib compression of frame payloads.
//!
//! With compression on, a frame payload is:
//!
//! ```text
//! +--------------------+-----------------------------------------+
//! | data_len (VarInt)  | body, or zlib(body) if data_len != 0    |
//! +--------------------+-----------------------------------------+
//! ```
//!
//! Bodies longer than the threshold are compressed and `data_len` holds their
//! uncompressed size. Shorter bodies are sent as-is behind a zero `data_len`.

use crate::error::ProtocolError;
use crate::types::{decode_var_int, encode_var_int};
use bytes::{BufMut, Bytes, BytesMut};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Largest uncompressed size a compressed payload may claim (8 MiB).
pub const MAX_UNCOMPRESSED_LEN: usize = 8_388_608;

/// Wraps a packet body into a compressed-format payload.
pub fn compress(body: &[u8], threshold: usize) -> Result<BytesMut, ProtocolError> {
    let mut out = BytesMut::with_capacity(body.len() + 5);
    if body.len() <= threshold {
        encode_var_int(0, &mut out);
        out.put_slice(body);
        return Ok(out);
    }

    encode_var_int(body.len() as i32, &mut out);
    let mut encoder = ZlibEncoder::new(out.writer(), Compression::default());
    encoder.write_all(body).map_err(ProtocolError::Compression)?;
    let out = encoder.finish().map_err(ProtocolError::Compression)?;
    Ok(out.into_inner())
}

/// Unwraps a compressed-format payload into the packet body.
///
/// A nonzero `data_len` below `threshold` is a protocol violation.
pub fn decompress(mut payload: Bytes, threshold: usize) -> Result<Bytes, ProtocolError> {
    let data_len = decode_var_int(&mut payload)?;
    let data_len = usize::try_from(data_len)
        .map_err(|_| crate::CodecError::NegativeLength(data_len.into()))?;
    if data_len == 0 {
        return Ok(payload);
    }
    if data_len < threshold {
        return Err(ProtocolError::CompressedBelowThreshold {
            data_len,
            threshold,
        });
    }
    if data_len > MAX_UNCOMPRESSED_LEN {
        return Err(ProtocolError::UncompressedTooLarge(data_len));
    }

    // Read one byte past the claim so an oversized stream is detected without inflating it all.
    let mut body = Vec::with_capacity(data_len);
    ZlibDecoder::new(&payload[..])
        .take(data_len as u64 + 1)
        .read_to_end(&mut body)
        .map_err(ProtocolError::Compression)?;
    if body.len() != data_len {
        return Err(ProtocolError::DecompressedLengthMismatch {
            expected: data_len,
            actual: body.len(),
        });
    }
    Ok(Bytes::from(body))
}
