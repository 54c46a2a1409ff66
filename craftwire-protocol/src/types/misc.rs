//! UUIDs, angles, positions and the small adapter types.

use super::string::Str;
use super::{ensure, Context, IntoType, Position, Type, TypeRef, Value};
use crate::error::CodecError;
use crate::version::{Version, VersionSwitcher};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use once_cell::sync::Lazy;
use std::f64::consts::TAU;
use uuid::Uuid;

/// A UUID as 16 raw bytes (most significant first).
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidType;

impl Type for UuidType {
    fn default_value(&self, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        Ok(Value::Uuid(Uuid::nil()))
    }

    fn decode(&self, buf: &mut Bytes, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        ensure(buf, 16)?;
        Ok(Value::Uuid(Uuid::from_u128(buf.get_u128())))
    }

    fn encode(
        &self,
        value: &Value,
        dst: &mut BytesMut,
        _ctx: &Context<'_>,
    ) -> Result<(), CodecError> {
        let uuid = value.as_uuid().ok_or_else(|| value.mismatch("uuid"))?;
        dst.put_u128(uuid.as_u128());
        Ok(())
    }

    fn static_size(&self, _ctx: &Context<'_>) -> Option<usize> {
        Some(16)
    }
}

/// A UUID as 36 characters of hyphenated text.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidString;

const UUID_STRING: Str = Str::new(36);

impl Type for UuidString {
    fn default_value(&self, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        Ok(Value::Uuid(Uuid::nil()))
    }

    fn decode(&self, buf: &mut Bytes, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        let text = UUID_STRING.decode_str(buf)?;
        Ok(Value::Uuid(Uuid::parse_str(&text)?))
    }

    fn encode(
        &self,
        value: &Value,
        dst: &mut BytesMut,
        _ctx: &Context<'_>,
    ) -> Result<(), CodecError> {
        let uuid = value.as_uuid().ok_or_else(|| value.mismatch("uuid"))?;
        UUID_STRING.encode_str(&uuid.hyphenated().to_string(), dst)
    }
}

/// A rotation in 1/256ths of a full turn, exposed in radians.
#[derive(Debug, Clone, Copy, Default)]
pub struct Angle;

impl Type for Angle {
    fn default_value(&self, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        Ok(Value::Float(0.0))
    }

    fn decode(&self, buf: &mut Bytes, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        ensure(buf, 1)?;
        Ok(Value::Float(f64::from(buf.get_u8()) * TAU / 256.0))
    }

    fn encode(
        &self,
        value: &Value,
        dst: &mut BytesMut,
        _ctx: &Context<'_>,
    ) -> Result<(), CodecError> {
        let radians = value.as_f64().ok_or_else(|| value.mismatch("float"))?;
        let steps = (radians * 256.0 / TAU).round() as i64;
        dst.put_u8(steps.rem_euclid(256) as u8);
        Ok(())
    }

    fn static_size(&self, _ctx: &Context<'_>) -> Option<usize> {
        Some(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PositionLayout {
    /// x:26 | y:12 | z:26
    Xyz,
    /// x:26 | z:26 | y:12
    Xzy,
}

static POSITION_LAYOUT: Lazy<VersionSwitcher<PositionLayout>> = Lazy::new(|| {
    VersionSwitcher::new()
        .range(..Version::V1_14, PositionLayout::Xyz)
        .or_else(PositionLayout::Xzy)
});

fn sign_extend(value: u64, bits: u32) -> i32 {
    let shift = 64 - bits;
    ((value << shift) as i64 >> shift) as i32
}

fn check_axis(axis: i32, bits: u32) -> Result<u64, CodecError> {
    let limit = 1i32 << (bits - 1);
    if axis < -limit || axis >= limit {
        return Err(CodecError::OutOfRange {
            ty: "Position",
            value: axis.to_string(),
        });
    }
    Ok(axis as u64 & ((1u64 << bits) - 1))
}

/// A block position packed into one unsigned long. The field order changed in 1.14.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionType;

impl Type for PositionType {
    fn default_value(&self, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        Ok(Value::Position(Position::default()))
    }

    fn decode(&self, buf: &mut Bytes, ctx: &Context<'_>) -> Result<Value, CodecError> {
        ensure(buf, 8)?;
        let packed = buf.get_u64();
        let x = sign_extend(packed >> 38, 26);
        let position = match POSITION_LAYOUT.get(ctx.version())? {
            PositionLayout::Xyz => Position::new(
                x,
                sign_extend((packed >> 26) & 0xfff, 12),
                sign_extend(packed & 0x3ff_ffff, 26),
            ),
            PositionLayout::Xzy => Position::new(
                x,
                sign_extend(packed & 0xfff, 12),
                sign_extend((packed >> 12) & 0x3ff_ffff, 26),
            ),
        };
        Ok(Value::Position(position))
    }

    fn encode(
        &self,
        value: &Value,
        dst: &mut BytesMut,
        ctx: &Context<'_>,
    ) -> Result<(), CodecError> {
        let Value::Position(pos) = value else {
            return Err(value.mismatch("position"));
        };
        let (x, y, z) = (
            check_axis(pos.x, 26)?,
            check_axis(pos.y, 12)?,
            check_axis(pos.z, 26)?,
        );
        let packed = match POSITION_LAYOUT.get(ctx.version())? {
            PositionLayout::Xyz => x << 38 | y << 26 | z,
            PositionLayout::Xzy => x << 38 | z << 12 | y,
        };
        dst.put_u64(packed);
        Ok(())
    }

    fn static_size(&self, _ctx: &Context<'_>) -> Option<usize> {
        Some(8)
    }
}

/// A zero-width type, used where a field does not exist.
#[derive(Debug, Clone, Copy, Default)]
pub struct Empty;

impl Type for Empty {
    fn default_value(&self, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        Ok(Value::Absent)
    }

    fn decode(&self, _buf: &mut Bytes, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        Ok(Value::Absent)
    }

    fn encode(
        &self,
        _value: &Value,
        _dst: &mut BytesMut,
        _ctx: &Context<'_>,
    ) -> Result<(), CodecError> {
        Ok(())
    }

    fn static_size(&self, _ctx: &Context<'_>) -> Option<usize> {
        Some(0)
    }
}

/// Wraps a type with a different default value.
#[derive(Debug, Clone)]
pub struct Defaulted {
    inner: TypeRef,
    default: Value,
}

impl Defaulted {
    pub fn new(inner: impl IntoType, default: impl Into<Value>) -> Self {
        Self {
            inner: inner.into_type(),
            default: default.into(),
        }
    }
}

impl Type for Defaulted {
    fn default_value(&self, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        Ok(self.default.clone())
    }

    fn decode(&self, buf: &mut Bytes, ctx: &Context<'_>) -> Result<Value, CodecError> {
        self.inner.decode(buf, ctx)
    }

    fn encode(
        &self,
        value: &Value,
        dst: &mut BytesMut,
        ctx: &Context<'_>,
    ) -> Result<(), CodecError> {
        self.inner.encode(value, dst, ctx)
    }

    fn static_size(&self, ctx: &Context<'_>) -> Option<usize> {
        self.inner.static_size(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VarInt;

    #[test]
    fn test_uuid_forms() {
        let version = Version::V1_16_5;
        let ctx = Context::new(&version);
        let uuid = Uuid::parse_str("069a79f4-44e9-4726-a5be-fca90e38aaf5").unwrap();

        let raw = UuidType.pack(&Value::Uuid(uuid), &ctx).unwrap();
        assert_eq!(raw.len(), 16);
        assert_eq!(raw[0], 0x06);
        assert_eq!(UuidType.unpack(&raw, &ctx).unwrap(), Value::Uuid(uuid));

        let text = UuidString.pack(&Value::Uuid(uuid), &ctx).unwrap();
        assert_eq!(&text[1..], b"069a79f4-44e9-4726-a5be-fca90e38aaf5");
        assert_eq!(UuidString.unpack(&text, &ctx).unwrap(), Value::Uuid(uuid));
    }

    #[test]
    fn test_angle() {
        let version = Version::V1_12_2;
        let ctx = Context::new(&version);

        let half_turn = Angle.unpack(b"\x80", &ctx).unwrap();
        assert_eq!(half_turn, Value::Float(std::f64::consts::PI));
        assert_eq!(&Angle.pack(&half_turn, &ctx).unwrap()[..], b"\x80");
        assert_eq!(&Angle.pack(&Value::Float(-TAU / 4.0), &ctx).unwrap()[..], b"\xc0");
    }

    #[test]
    fn test_position_layout_by_version() {
        let pos = Value::Position(Position::new(-1, 64, 300));

        let old = Version::V1_12_2;
        let new = Version::V1_14;
        let old_bytes = PositionType.pack(&pos, &Context::new(&old)).unwrap();
        let new_bytes = PositionType.pack(&pos, &Context::new(&new)).unwrap();

        assert_ne!(old_bytes, new_bytes);
        assert_eq!(PositionType.unpack(&old_bytes, &Context::new(&old)).unwrap(), pos);
        assert_eq!(PositionType.unpack(&new_bytes, &Context::new(&new)).unwrap(), pos);

        let packed = u64::from_be_bytes(new_bytes[..].try_into().unwrap());
        assert_eq!(packed & 0xfff, 64);
    }

    #[test]
    fn test_position_out_of_range() {
        let version = Version::V1_12_2;
        let pos = Value::Position(Position::new(0, 4096, 0));
        assert!(matches!(
            PositionType.pack(&pos, &Context::new(&version)),
            Err(CodecError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_empty_and_defaulted() {
        let version = Version::V1_12_2;
        let ctx = Context::new(&version);

        assert!(Empty.pack(&Value::Absent, &ctx).unwrap().is_empty());
        assert_eq!(Empty.unpack(b"\x01", &ctx).unwrap(), Value::Absent);

        let ty = Defaulted::new(VarInt, 25565i32);
        assert_eq!(ty.default_value(&ctx).unwrap(), Value::Int(25565));
        assert_eq!(ty.unpack(b"\x01", &ctx).unwrap(), Value::Int(1));
    }
}
