//! Variable-length integers.
//!
//! Little-endian groups of seven bits; the high bit of each byte says another
//! byte follows. Values are accumulated unsigned and then reinterpreted as
//! two's complement, so negative numbers always take the maximum length.

use super::{Context, Type, Value};
use crate::error::CodecError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Maximum encoded length of a VarInt.
pub const MAX_VAR_INT_LEN: usize = 5;

/// Maximum encoded length of a VarLong.
pub const MAX_VAR_LONG_LEN: usize = 10;

const fn max_len(bits: u32) -> usize {
    bits.div_ceil(7) as usize
}

fn read_var(buf: &mut impl Buf, bits: u32) -> Result<u64, CodecError> {
    let max_bytes = max_len(bits);
    let mut value = 0u64;
    for i in 0..max_bytes {
        if !buf.has_remaining() {
            return Err(CodecError::UnexpectedEof {
                needed: 1,
                remaining: 0,
            });
        }
        let byte = buf.get_u8();
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(CodecError::VarNumTooLong { max_bytes })
}

fn write_var(dst: &mut impl BufMut, mut value: u64) {
    loop {
        if value & !0x7f == 0 {
            dst.put_u8(value as u8);
            return;
        }
        dst.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
}

/// Decodes a VarInt from the front of `buf`.
pub fn decode_var_int(buf: &mut impl Buf) -> Result<i32, CodecError> {
    Ok(read_var(buf, 32)? as u32 as i32)
}

/// Appends the VarInt encoding of `value`.
pub fn encode_var_int(value: i32, dst: &mut impl BufMut) {
    write_var(dst, u64::from(value as u32));
}

/// Returns the encoded length of `value` as a VarInt.
pub fn var_int_len(value: i32) -> usize {
    let bits = 32 - (value as u32).leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Parses a VarInt at the start of `data` without consuming it.
///
/// Returns `Ok(None)` when the data ends before the terminating byte, and the
/// value with its encoded length otherwise.
pub fn peek_var_int(data: &[u8]) -> Result<Option<(i32, usize)>, CodecError> {
    let mut value = 0u32;
    for (i, byte) in data.iter().take(MAX_VAR_INT_LEN).enumerate() {
        value |= u32::from(byte & 0x7f).wrapping_shl(7 * i as u32);
        if byte & 0x80 == 0 {
            return Ok(Some((value as i32, i + 1)));
        }
    }
    if data.len() >= MAX_VAR_INT_LEN {
        return Err(CodecError::VarNumTooLong {
            max_bytes: MAX_VAR_INT_LEN,
        });
    }
    Ok(None)
}

fn expect_i64(value: &Value, ty: &'static str, min: i64, max: i64) -> Result<i64, CodecError> {
    let n = value.integer().ok_or_else(|| value.mismatch("int"))?;
    if n < i128::from(min) || n > i128::from(max) {
        return Err(CodecError::OutOfRange {
            ty,
            value: n.to_string(),
        });
    }
    Ok(n as i64)
}

/// 32-bit variable-length signed integer.
#[derive(Debug, Clone, Copy, Default)]
pub struct VarInt;

impl Type for VarInt {
    fn default_value(&self, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        Ok(Value::Int(0))
    }

    fn decode(&self, buf: &mut Bytes, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        decode_var_int(buf).map(|n| Value::Int(n.into()))
    }

    fn encode(
        &self,
        value: &Value,
        dst: &mut BytesMut,
        _ctx: &Context<'_>,
    ) -> Result<(), CodecError> {
        let n = expect_i64(value, "VarInt", i32::MIN.into(), i32::MAX.into())?;
        encode_var_int(n as i32, dst);
        Ok(())
    }
}

/// 64-bit variable-length signed integer.
#[derive(Debug, Clone, Copy, Default)]
pub struct VarLong;

impl Type for VarLong {
    fn default_value(&self, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        Ok(Value::Int(0))
    }

    fn decode(&self, buf: &mut Bytes, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        Ok(Value::Int(read_var(buf, 64)? as i64))
    }

    fn encode(
        &self,
        value: &Value,
        dst: &mut BytesMut,
        _ctx: &Context<'_>,
    ) -> Result<(), CodecError> {
        let n = expect_i64(value, "VarLong", i64::MIN, i64::MAX)?;
        write_var(dst, n as u64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;
    use proptest::prelude::*;

    fn encode(ty: &dyn Type, n: i64) -> Vec<u8> {
        let version = Version::V1_12_2;
        ty.pack(&Value::Int(n), &Context::new(&version))
            .unwrap()
            .to_vec()
    }

    fn decode(ty: &dyn Type, data: &[u8]) -> Result<Value, CodecError> {
        let version = Version::V1_12_2;
        ty.unpack(data, &Context::new(&version))
    }

    #[test]
    fn test_var_int_known_encodings() {
        assert_eq!(encode(&VarInt, 0), b"\x00");
        assert_eq!(encode(&VarInt, 127), b"\x7f");
        assert_eq!(encode(&VarInt, 128), b"\x80\x01");
        assert_eq!(encode(&VarInt, 300), b"\xac\x02");
        assert_eq!(encode(&VarInt, 2147483647), b"\xff\xff\xff\xff\x07");
        assert_eq!(encode(&VarInt, -1), b"\xff\xff\xff\xff\x0f");
        assert_eq!(encode(&VarInt, -2147483648), b"\x80\x80\x80\x80\x08");
    }

    #[test]
    fn test_var_int_decode() {
        assert_eq!(decode(&VarInt, b"\xac\x02").unwrap(), Value::Int(300));
        assert_eq!(
            decode(&VarInt, b"\xff\xff\xff\xff\x0f").unwrap(),
            Value::Int(-1)
        );
    }

    #[test]
    fn test_var_int_too_long() {
        let result = decode(&VarInt, b"\xff\xff\xff\xff\xff\x01");
        assert!(matches!(
            result,
            Err(CodecError::VarNumTooLong { max_bytes: 5 })
        ));
    }

    #[test]
    fn test_var_int_underrun() {
        let result = decode(&VarInt, b"\xff\xff");
        assert!(matches!(result, Err(CodecError::UnexpectedEof { .. })));
    }

    #[test]
    fn test_var_int_out_of_range() {
        let version = Version::V1_12_2;
        let result = VarInt.pack(&Value::Int(1 << 40), &Context::new(&version));
        assert!(matches!(result, Err(CodecError::OutOfRange { .. })));
    }

    #[test]
    fn test_var_long() {
        assert_eq!(encode(&VarLong, -1).len(), MAX_VAR_LONG_LEN);
        assert_eq!(
            decode(&VarLong, &encode(&VarLong, i64::MIN)).unwrap(),
            Value::Int(i64::MIN)
        );
        assert!(matches!(
            decode(&VarLong, &[0xff; 11]),
            Err(CodecError::VarNumTooLong { max_bytes: 10 })
        ));
    }

    #[test]
    fn test_peek_var_int() {
        assert_eq!(peek_var_int(b"").unwrap(), None);
        assert_eq!(peek_var_int(b"\x80").unwrap(), None);
        assert_eq!(peek_var_int(b"\xac\x02\x00").unwrap(), Some((300, 2)));
        assert!(peek_var_int(b"\xff\xff\xff\xff\xff").is_err());
    }

    #[test]
    fn test_var_int_len() {
        assert_eq!(var_int_len(0), 1);
        assert_eq!(var_int_len(127), 1);
        assert_eq!(var_int_len(128), 2);
        assert_eq!(var_int_len(-1), 5);
    }

    proptest! {
        #[test]
        fn prop_var_int_roundtrip(n in any::<i32>()) {
            let encoded = encode(&VarInt, n.into());
            prop_assert_eq!(encoded.len(), var_int_len(n));
            prop_assert_eq!(decode(&VarInt, &encoded).unwrap(), Value::Int(n.into()));
        }

        #[test]
        fn prop_var_long_roundtrip(n in any::<i64>()) {
            let encoded = encode(&VarLong, n);
            prop_assert!(encoded.len() <= MAX_VAR_LONG_LEN);
            prop_assert_eq!(decode(&VarLong, &encoded).unwrap(), Value::Int(n));
        }
    }
}
