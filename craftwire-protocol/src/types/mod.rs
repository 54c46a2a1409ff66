//! The marshaling contract and the library of wire types.
//!
//! A [`Type`] is a strategy object: it knows how to produce a default value,
//! decode a [`Value`] from a byte cursor, encode one back, and (when it can)
//! report a fixed encoded size. Composite types hold other types behind
//! [`TypeRef`]s, so schemas are plain data assembled at startup.
//!
//! Every call receives a [`Context`] carrying the active [`Version`] and the
//! enclosing record being decoded or encoded, which array sizes and optional
//! presence may depend on.

mod array;
mod bitmask;
pub(crate) mod compound;
mod enumeration;
mod misc;
mod numeric;
mod optional;
mod string;
mod switched;
mod value;
mod varnum;

pub use array::{Array, ArraySize, RawBytes};
pub use bitmask::{BitField, BitLayout, BitMask, BitValue};
pub use compound::{Compound, Field};
pub use enumeration::{EnumType, EnumValue, WireEnum};
pub use misc::{Angle, Defaulted, Empty, PositionType, UuidString, UuidType};
pub use numeric::{
    Boolean, Byte, Double, Float, Int, Long, Short, UnsignedByte, UnsignedInt, UnsignedLong,
    UnsignedShort,
};
pub use optional::{Optional, Presence};
pub use string::{Chat, IdentifierType, Json, Str, DEFAULT_MAX_CHARS};
pub use switched::VersionSwitched;
pub use value::{Identifier, Position, Record, Value};
pub use varnum::{
    decode_var_int, encode_var_int, peek_var_int, var_int_len, VarInt, VarLong,
    MAX_VAR_INT_LEN, MAX_VAR_LONG_LEN,
};

use crate::error::CodecError;
use crate::version::Version;
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::sync::Arc;

/// The version and enclosing record threaded through every marshal call.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    version: &'a Version,
    instance: Option<&'a Record>,
}

impl<'a> Context<'a> {
    pub fn new(version: &'a Version) -> Self {
        Self {
            version,
            instance: None,
        }
    }

    /// Returns a context whose enclosing record is `instance`.
    pub fn with_instance<'b>(&self, instance: &'b Record) -> Context<'b>
    where
        'a: 'b,
    {
        Context {
            version: self.version,
            instance: Some(instance),
        }
    }

    pub fn version(&self) -> &'a Version {
        self.version
    }

    pub fn instance(&self) -> Option<&'a Record> {
        self.instance
    }

    /// Looks up an already-decoded sibling field.
    pub(crate) fn sibling(&self, name: &str) -> Result<&'a Value, CodecError> {
        self.instance
            .and_then(|record| record.get(name))
            .ok_or_else(|| CodecError::MissingField(name.to_string()))
    }
}

/// A marshaling strategy for one kind of wire value.
pub trait Type: fmt::Debug + Send + Sync {
    /// Produces the value a freshly created field holds.
    fn default_value(&self, ctx: &Context<'_>) -> Result<Value, CodecError>;

    /// Decodes a value, advancing `buf` past exactly the bytes consumed.
    fn decode(&self, buf: &mut Bytes, ctx: &Context<'_>) -> Result<Value, CodecError>;

    /// Appends the encoding of `value` to `dst`.
    fn encode(&self, value: &Value, dst: &mut BytesMut, ctx: &Context<'_>)
        -> Result<(), CodecError>;

    /// Returns the encoded size if it never depends on the value.
    fn static_size(&self, _ctx: &Context<'_>) -> Option<usize> {
        None
    }

    /// Encodes `value` into a fresh buffer.
    fn pack(&self, value: &Value, ctx: &Context<'_>) -> Result<BytesMut, CodecError> {
        let mut dst = BytesMut::new();
        self.encode(value, &mut dst, ctx)?;
        Ok(dst)
    }

    /// Decodes a value from the start of `data`.
    fn unpack(&self, data: &[u8], ctx: &Context<'_>) -> Result<Value, CodecError> {
        let mut buf = Bytes::copy_from_slice(data);
        self.decode(&mut buf, ctx)
    }
}

/// Shared handle to a type, as stored inside composite types and schemas.
pub type TypeRef = Arc<dyn Type>;

/// Conversion into a [`TypeRef`], so schema builders accept both concrete
/// types and existing handles.
pub trait IntoType {
    fn into_type(self) -> TypeRef;
}

impl<T: Type + 'static> IntoType for T {
    fn into_type(self) -> TypeRef {
        Arc::new(self)
    }
}

impl IntoType for TypeRef {
    fn into_type(self) -> TypeRef {
        self
    }
}

/// Fails with [`CodecError::UnexpectedEof`] unless `buf` holds `needed` bytes.
pub(crate) fn ensure(buf: &Bytes, needed: usize) -> Result<(), CodecError> {
    if buf.len() < needed {
        return Err(CodecError::UnexpectedEof {
            needed,
            remaining: buf.len(),
        });
    }
    Ok(())
}

/// Three consecutive `elem` values, as used for velocities and offsets.
pub fn vector(elem: impl IntoType) -> Array {
    Array::new(elem, ArraySize::Fixed(3))
}
