//! Closed enumerations carried by an underlying integer type.

use super::{Context, IntoType, Type, TypeRef, Value};
use crate::error::CodecError;
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::marker::PhantomData;

/// A Rust enum with fixed wire discriminants.
///
/// Implement it with [`wire_enum!`](crate::wire_enum) rather than by hand.
pub trait WireEnum: Copy + fmt::Debug + Send + Sync + 'static {
    /// Name used in error messages.
    const NAME: &'static str;

    /// Every member, in declaration order. The first is the default.
    const VARIANTS: &'static [Self];

    fn discriminant(self) -> i64;

    fn variant_name(self) -> &'static str;

    fn from_discriminant(value: i64) -> Option<Self> {
        Self::VARIANTS
            .iter()
            .copied()
            .find(|member| member.discriminant() == value)
    }
}

/// Declares an enum and its [`WireEnum`] implementation.
///
/// ```
/// craftwire_protocol::wire_enum! {
///     pub enum Hand {
///         Main = 0,
///         Off = 1,
///     }
/// }
///
/// use craftwire_protocol::types::WireEnum;
/// assert_eq!(Hand::from_discriminant(1), Some(Hand::Off));
/// ```
#[macro_export]
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $crate::types::WireEnum for $name {
            const NAME: &'static str = stringify!($name);
            const VARIANTS: &'static [Self] = &[$($name::$variant),+];

            fn discriminant(self) -> i64 {
                match self {
                    $($name::$variant => $value),+
                }
            }

            fn variant_name(self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }
        }
    };
}

/// A decoded enumeration member, detached from its Rust type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumValue {
    enum_name: &'static str,
    name: &'static str,
    discriminant: i64,
}

impl EnumValue {
    pub fn of<E: WireEnum>(member: E) -> Self {
        Self {
            enum_name: E::NAME,
            name: member.variant_name(),
            discriminant: member.discriminant(),
        }
    }

    pub fn enum_name(&self) -> &'static str {
        self.enum_name
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn discriminant(&self) -> i64 {
        self.discriminant
    }
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.enum_name, self.name)
    }
}

/// Encodes members of `E` through an underlying integer type.
///
/// Unknown discriminants fail to decode. Encoding accepts an [`EnumValue`] or
/// a bare integer, which must also name a member.
pub struct EnumType<E> {
    underlying: TypeRef,
    _marker: PhantomData<fn() -> E>,
}

impl<E: WireEnum> EnumType<E> {
    pub fn new(underlying: impl IntoType) -> Self {
        Self {
            underlying: underlying.into_type(),
            _marker: PhantomData,
        }
    }

    fn member(value: i64) -> Result<E, CodecError> {
        E::from_discriminant(value).ok_or(CodecError::UnknownEnumValue {
            name: E::NAME,
            value,
        })
    }
}

impl<E> Clone for EnumType<E> {
    fn clone(&self) -> Self {
        Self {
            underlying: self.underlying.clone(),
            _marker: PhantomData,
        }
    }
}

impl<E: WireEnum> fmt::Debug for EnumType<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumType")
            .field("enum", &E::NAME)
            .field("underlying", &self.underlying)
            .finish()
    }
}

impl<E: WireEnum> Type for EnumType<E> {
    fn default_value(&self, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        E::VARIANTS
            .first()
            .map(|&member| Value::from_enum(member))
            .ok_or(CodecError::UnknownEnumValue {
                name: E::NAME,
                value: 0,
            })
    }

    fn decode(&self, buf: &mut Bytes, ctx: &Context<'_>) -> Result<Value, CodecError> {
        let raw = self.underlying.decode(buf, ctx)?;
        let n = raw.as_i64().ok_or_else(|| raw.mismatch("int"))?;
        Ok(Value::from_enum(Self::member(n)?))
    }

    fn encode(
        &self,
        value: &Value,
        dst: &mut BytesMut,
        ctx: &Context<'_>,
    ) -> Result<(), CodecError> {
        let n = match value {
            Value::Enum(member) => member.discriminant(),
            Value::Int(_) | Value::UInt(_) => {
                value.as_i64().ok_or_else(|| CodecError::OutOfRange {
                    ty: E::NAME,
                    value: format!("{:?}", value),
                })?
            }
            other => return Err(other.mismatch("enum")),
        };
        let member = Self::member(n)?;
        self.underlying
            .encode(&Value::Int(member.discriminant()), dst, ctx)
    }

    fn static_size(&self, ctx: &Context<'_>) -> Option<usize> {
        self.underlying.static_size(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{UnsignedByte, VarInt};
    use crate::version::Version;

    crate::wire_enum! {
        enum Difficulty {
            Peaceful = 0,
            Easy = 1,
            Normal = 2,
            Hard = 3,
        }
    }

    #[test]
    fn test_wire_enum_macro() {
        assert_eq!(Difficulty::NAME, "Difficulty");
        assert_eq!(Difficulty::VARIANTS.len(), 4);
        assert_eq!(Difficulty::Hard.discriminant(), 3);
        assert_eq!(Difficulty::from_discriminant(2), Some(Difficulty::Normal));
        assert_eq!(Difficulty::from_discriminant(9), None);
        assert_eq!(EnumValue::of(Difficulty::Easy).to_string(), "Difficulty::Easy");
    }

    #[test]
    fn test_enum_type() {
        let version = Version::V1_12_2;
        let ctx = Context::new(&version);
        let ty = EnumType::<Difficulty>::new(UnsignedByte);

        let value = ty.unpack(b"\x02", &ctx).unwrap();
        assert_eq!(value.as_enum::<Difficulty>(), Some(Difficulty::Normal));
        assert_eq!(&ty.pack(&value, &ctx).unwrap()[..], b"\x02");
        assert_eq!(&ty.pack(&Value::Int(3), &ctx).unwrap()[..], b"\x03");
        assert_eq!(
            ty.default_value(&ctx).unwrap(),
            Value::from_enum(Difficulty::Peaceful)
        );
    }

    #[test]
    fn test_unknown_member_rejected() {
        let version = Version::V1_12_2;
        let ctx = Context::new(&version);
        let ty = EnumType::<Difficulty>::new(VarInt);

        assert!(matches!(
            ty.unpack(b"\x07", &ctx),
            Err(CodecError::UnknownEnumValue {
                name: "Difficulty",
                value: 7
            })
        ));
        assert!(matches!(
            ty.pack(&Value::Int(-1), &ctx),
            Err(CodecError::UnknownEnumValue { .. })
        ));
        assert!(matches!(
            ty.pack(&Value::from("Hard"), &ctx),
            Err(CodecError::Mismatch { .. })
        ));
    }
}
