//! Dynamic values produced and consumed by [`Type`](super::Type)s.

use super::bitmask::BitValue;
use super::enumeration::{EnumValue, WireEnum};
use crate::error::CodecError;
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A decoded wire value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Zero-width value of a field that does not exist in the active version.
    Absent,
    Bool(bool),
    /// Any signed integer, including VarInt and VarLong.
    Int(i64),
    /// Any unsigned integer.
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Bytes),
    Uuid(Uuid),
    Identifier(Identifier),
    Json(serde_json::Value),
    Position(Position),
    Array(Vec<Value>),
    Optional(Option<Box<Value>>),
    Compound(Record),
    Enum(EnumValue),
    Bits(BitValue),
}

impl Value {
    /// Short name of the variant, used in mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Absent => "absent",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Uuid(_) => "uuid",
            Value::Identifier(_) => "identifier",
            Value::Json(_) => "json",
            Value::Position(_) => "position",
            Value::Array(_) => "array",
            Value::Optional(_) => "optional",
            Value::Compound(_) => "compound",
            Value::Enum(_) => "enum",
            Value::Bits(_) => "bits",
        }
    }

    pub(crate) fn mismatch(&self, expected: &'static str) -> CodecError {
        CodecError::Mismatch {
            expected,
            found: self.type_name(),
        }
    }

    /// Wraps a closed enumeration member.
    pub fn from_enum<E: WireEnum>(member: E) -> Self {
        Value::Enum(EnumValue::of(member))
    }

    /// Builds a present optional value.
    pub fn some(value: impl Into<Value>) -> Self {
        Value::Optional(Some(Box::new(value.into())))
    }

    pub fn none() -> Self {
        Value::Optional(None)
    }

    /// Returns the integer this value carries, widened to `i128`.
    pub(crate) fn integer(&self) -> Option<i128> {
        match self {
            Value::Int(n) => Some(i128::from(*n)),
            Value::UInt(n) => Some(i128::from(*n)),
            Value::Enum(e) => Some(i128::from(e.discriminant())),
            Value::Bits(b) => Some(i128::from(b.raw())),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.integer().and_then(|n| i64::try_from(n).ok())
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.integer().and_then(|n| u64::try_from(n).ok())
    }

    pub fn as_usize(&self) -> Option<usize> {
        self.integer().and_then(|n| usize::try_from(n).ok())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            Value::UInt(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Value::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(j) => Some(j),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Compound(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_bits(&self) -> Option<&BitValue> {
        match self {
            Value::Bits(bits) => Some(bits),
            _ => None,
        }
    }

    /// Converts an enum value (or a bare discriminant) to `E`.
    pub fn as_enum<E: WireEnum>(&self) -> Option<E> {
        self.as_i64().and_then(E::from_discriminant)
    }

    /// Unwraps an optional value. `Absent` reads as `None`.
    pub fn as_optional(&self) -> Option<Option<&Value>> {
        match self {
            Value::Optional(inner) => Some(inner.as_deref()),
            Value::Absent => Some(None),
            _ => None,
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u8 => UInt,
    u16 => UInt,
    u32 => UInt,
    u64 => UInt,
    f32 => Float,
    f64 => Float,
    String => String,
    &str => String,
    Bytes => Bytes,
    Vec<u8> => Bytes,
    Uuid => Uuid,
    Identifier => Identifier,
    serde_json::Value => Json,
    Position => Position,
    Vec<Value> => Array,
    Record => Compound,
    EnumValue => Enum,
    BitValue => Bits,
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        Value::Optional(v.map(|inner| Box::new(inner.into())))
    }
}

/// An ordered set of named values: a decoded compound or packet body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(&'static str, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields
            .iter_mut()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    /// Returns the field or a [`CodecError::MissingField`].
    pub fn require(&self, name: &str) -> Result<&Value, CodecError> {
        self.get(name)
            .ok_or_else(|| CodecError::MissingField(name.to_string()))
    }

    /// Inserts a field, replacing an existing one in place.
    pub fn insert(&mut self, name: &'static str, value: impl Into<Value>) {
        let value = value.into();
        match self.get_mut(name) {
            Some(slot) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Builder-style [`Record::insert`].
    pub fn with(mut self, name: &'static str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.fields.iter().map(|(n, v)| (*n, v))
    }

    pub(crate) fn push(&mut self, name: &'static str, value: Value) {
        self.fields.push((name, value));
    }
}

/// A namespaced identifier such as `minecraft:stone`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    namespace: String,
    name: String,
}

impl Identifier {
    pub const DEFAULT_NAMESPACE: &'static str = "minecraft";

    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for Identifier {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) => Ok(Self::new(Self::DEFAULT_NAMESPACE, name)),
            (Some(namespace), Some(name), None) => Ok(Self::new(namespace, name)),
            _ => Err(CodecError::InvalidIdentifier(s.to_string())),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// A block position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}
