//! Fixed-width big-endian numbers.

use super::{ensure, Context, Type, Value};
use crate::error::CodecError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

macro_rules! integer_type {
    ($(#[$meta:meta])* $name:ident, $ty:ty, $get:ident, $put:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl Type for $name {
            fn default_value(&self, _ctx: &Context<'_>) -> Result<Value, CodecError> {
                Ok(Value::from(<$ty>::default()))
            }

            fn decode(&self, buf: &mut Bytes, _ctx: &Context<'_>) -> Result<Value, CodecError> {
                ensure(buf, std::mem::size_of::<$ty>())?;
                Ok(Value::from(buf.$get()))
            }

            fn encode(
                &self,
                value: &Value,
                dst: &mut BytesMut,
                _ctx: &Context<'_>,
            ) -> Result<(), CodecError> {
                let n = value.integer().ok_or_else(|| value.mismatch("int"))?;
                let n = <$ty>::try_from(n).map_err(|_| CodecError::OutOfRange {
                    ty: stringify!($name),
                    value: n.to_string(),
                })?;
                dst.$put(n);
                Ok(())
            }

            fn static_size(&self, _ctx: &Context<'_>) -> Option<usize> {
                Some(std::mem::size_of::<$ty>())
            }
        }
    };
}

integer_type!(Byte, i8, get_i8, put_i8);
integer_type!(UnsignedByte, u8, get_u8, put_u8);
integer_type!(Short, i16, get_i16, put_i16);
integer_type!(UnsignedShort, u16, get_u16, put_u16);
integer_type!(Int, i32, get_i32, put_i32);
integer_type!(UnsignedInt, u32, get_u32, put_u32);
integer_type!(Long, i64, get_i64, put_i64);
integer_type!(UnsignedLong, u64, get_u64, put_u64);

macro_rules! float_type {
    ($name:ident, $ty:ty, $get:ident, $put:ident) => {
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl Type for $name {
            fn default_value(&self, _ctx: &Context<'_>) -> Result<Value, CodecError> {
                Ok(Value::Float(0.0))
            }

            fn decode(&self, buf: &mut Bytes, _ctx: &Context<'_>) -> Result<Value, CodecError> {
                ensure(buf, std::mem::size_of::<$ty>())?;
                Ok(Value::Float(buf.$get().into()))
            }

            fn encode(
                &self,
                value: &Value,
                dst: &mut BytesMut,
                _ctx: &Context<'_>,
            ) -> Result<(), CodecError> {
                let f = value.as_f64().ok_or_else(|| value.mismatch("float"))?;
                dst.$put(f as $ty);
                Ok(())
            }

            fn static_size(&self, _ctx: &Context<'_>) -> Option<usize> {
                Some(std::mem::size_of::<$ty>())
            }
        }
    };
}

float_type!(Float, f32, get_f32, put_f32);
float_type!(Double, f64, get_f64, put_f64);

/// A single byte; any nonzero value decodes as `true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Boolean;

impl Type for Boolean {
    fn default_value(&self, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        Ok(Value::Bool(false))
    }

    fn decode(&self, buf: &mut Bytes, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        ensure(buf, 1)?;
        Ok(Value::Bool(buf.get_u8() != 0))
    }

    fn encode(
        &self,
        value: &Value,
        dst: &mut BytesMut,
        _ctx: &Context<'_>,
    ) -> Result<(), CodecError> {
        let b = value.as_bool().ok_or_else(|| value.mismatch("bool"))?;
        dst.put_u8(u8::from(b));
        Ok(())
    }

    fn static_size(&self, _ctx: &Context<'_>) -> Option<usize> {
        Some(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;

    #[test]
    fn test_big_endian() {
        let version = Version::V1_12_2;
        let ctx = Context::new(&version);

        assert_eq!(&Int.pack(&Value::Int(1), &ctx).unwrap()[..], b"\x00\x00\x00\x01");
        assert_eq!(
            &UnsignedShort.pack(&Value::UInt(25565), &ctx).unwrap()[..],
            b"\x63\xdd"
        );
        assert_eq!(Short.unpack(b"\xff\xfe", &ctx).unwrap(), Value::Int(-2));
        assert_eq!(
            UnsignedLong.unpack(&[0xff; 8], &ctx).unwrap(),
            Value::UInt(u64::MAX)
        );
    }

    #[test]
    fn test_integer_range_checked() {
        let version = Version::V1_12_2;
        let ctx = Context::new(&version);

        assert!(matches!(
            Byte.pack(&Value::Int(128), &ctx),
            Err(CodecError::OutOfRange { ty: "Byte", .. })
        ));
        assert!(matches!(
            UnsignedByte.pack(&Value::Int(-1), &ctx),
            Err(CodecError::OutOfRange { .. })
        ));
        // Signed and unsigned carriers are interchangeable when in range.
        assert_eq!(&UnsignedByte.pack(&Value::Int(255), &ctx).unwrap()[..], b"\xff");
        assert!(matches!(
            Int.pack(&Value::from("1"), &ctx),
            Err(CodecError::Mismatch { .. })
        ));
    }

    #[test]
    fn test_underrun() {
        let version = Version::V1_12_2;
        let ctx = Context::new(&version);
        assert!(matches!(
            Long.unpack(b"\x00\x00\x00", &ctx),
            Err(CodecError::UnexpectedEof {
                needed: 8,
                remaining: 3
            })
        ));
    }

    #[test]
    fn test_floats() {
        let version = Version::V1_12_2;
        let ctx = Context::new(&version);

        let encoded = Float.pack(&Value::Float(1.5), &ctx).unwrap();
        assert_eq!(&encoded[..], b"\x3f\xc0\x00\x00");
        assert_eq!(Float.unpack(&encoded, &ctx).unwrap(), Value::Float(1.5));
        assert_eq!(Double.static_size(&ctx), Some(8));
    }

    #[test]
    fn test_boolean() {
        let version = Version::V1_12_2;
        let ctx = Context::new(&version);

        assert_eq!(Boolean.unpack(b"\x02", &ctx).unwrap(), Value::Bool(true));
        assert_eq!(&Boolean.pack(&Value::Bool(true), &ctx).unwrap()[..], b"\x01");
    }
}
