//! Named bit fields packed into an integer.

use super::{Context, IntoType, Type, TypeRef, Value};
use crate::error::CodecError;
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::sync::Arc;

/// One named slice of a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitField {
    /// A single bit.
    Flag(u32),
    /// Bits `start..end`, end exclusive.
    Range(u32, u32),
}

impl BitField {
    fn bounds(self) -> (u32, u32) {
        match self {
            BitField::Flag(bit) => (bit, bit.saturating_add(1)),
            BitField::Range(start, end) => (start, end),
        }
    }

    /// Bits at or past 64 fall outside the integer and are never set.
    fn mask(self) -> u64 {
        let (start, end) = self.bounds();
        let end = end.min(u64::BITS);
        if start >= end {
            return 0;
        }
        let width = end - start;
        let bits = if width == u64::BITS {
            u64::MAX
        } else {
            (1u64 << width) - 1
        };
        bits << start
    }

    /// Reads this field out of `raw`, shifted down to bit 0.
    fn extract(self, raw: u64) -> u64 {
        (raw & self.mask())
            .checked_shr(self.bounds().0)
            .unwrap_or(0)
    }
}

/// The named fields of a bitmask type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitLayout {
    name: &'static str,
    fields: Vec<(&'static str, BitField)>,
}

impl BitLayout {
    pub fn new(name: &'static str, fields: Vec<(&'static str, BitField)>) -> Self {
        Self { name, fields }
    }

    /// A layout of single-bit flags, numbered from bit 0 in order.
    pub fn flags(name: &'static str, flags: &[&'static str]) -> Self {
        let fields = flags
            .iter()
            .zip(0..)
            .map(|(&flag, bit)| (flag, BitField::Flag(bit)))
            .collect();
        Self::new(name, fields)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn field(&self, name: &str) -> Result<BitField, CodecError> {
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, field)| *field)
            .ok_or_else(|| CodecError::UnknownBitField(name.to_string()))
    }
}

/// A decoded bitmask: the raw integer viewed through its layout.
#[derive(Clone, PartialEq, Eq)]
pub struct BitValue {
    layout: Arc<BitLayout>,
    raw: u64,
}

impl BitValue {
    pub fn new(layout: Arc<BitLayout>, raw: u64) -> Self {
        Self { layout, raw }
    }

    pub fn raw(&self) -> u64 {
        self.raw
    }

    pub fn layout(&self) -> &BitLayout {
        &self.layout
    }

    /// Reads a field, shifted down to bit 0.
    pub fn get(&self, name: &str) -> Result<u64, CodecError> {
        Ok(self.layout.field(name)?.extract(self.raw))
    }

    pub fn flag(&self, name: &str) -> Result<bool, CodecError> {
        self.get(name).map(|bits| bits != 0)
    }

    /// Writes a field. Fails if `value` does not fit in the field's width.
    pub fn set(&mut self, name: &str, value: u64) -> Result<(), CodecError> {
        let field = self.layout.field(name)?;
        let (start, end) = field.bounds();
        let shifted = value.checked_shl(start).unwrap_or(0);
        let round_trips = value == 0 || shifted.checked_shr(start) == Some(value);
        if shifted & !field.mask() != 0 || !round_trips {
            return Err(CodecError::BitFieldTooWide { value, start, end });
        }
        self.raw = (self.raw & !field.mask()) | shifted;
        Ok(())
    }

    pub fn set_flag(&mut self, name: &str, on: bool) -> Result<(), CodecError> {
        self.set(name, u64::from(on))
    }

    /// Builder-style [`BitValue::set`].
    pub fn with(mut self, name: &str, value: u64) -> Result<Self, CodecError> {
        self.set(name, value)?;
        Ok(self)
    }
}

impl fmt::Debug for BitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct(self.layout.name);
        for (name, field) in &self.layout.fields {
            out.field(name, &field.extract(self.raw));
        }
        out.finish()
    }
}

/// An integer type whose value is read through a [`BitLayout`].
#[derive(Debug, Clone)]
pub struct BitMask {
    underlying: TypeRef,
    layout: Arc<BitLayout>,
}

impl BitMask {
    pub fn new(underlying: impl IntoType, layout: BitLayout) -> Self {
        Self {
            underlying: underlying.into_type(),
            layout: Arc::new(layout),
        }
    }

    /// A bitmask of single-bit flags.
    pub fn flags(underlying: impl IntoType, name: &'static str, flags: &[&'static str]) -> Self {
        Self::new(underlying, BitLayout::flags(name, flags))
    }

    /// A zeroed value with this mask's layout.
    pub fn empty(&self) -> BitValue {
        BitValue::new(self.layout.clone(), 0)
    }

    fn width_mask(&self, ctx: &Context<'_>) -> u64 {
        match self.underlying.static_size(ctx) {
            Some(size) if size < 8 => (1u64 << (size * 8)) - 1,
            _ => u64::MAX,
        }
    }
}

impl Type for BitMask {
    fn default_value(&self, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        Ok(Value::Bits(self.empty()))
    }

    fn decode(&self, buf: &mut Bytes, ctx: &Context<'_>) -> Result<Value, CodecError> {
        let raw = self.underlying.decode(buf, ctx)?;
        // Signed carriers decode negative; keep only the carrier's bits.
        let raw = match raw {
            Value::Int(n) => n as u64,
            Value::UInt(n) => n,
            other => return Err(other.mismatch("int")),
        };
        Ok(Value::Bits(BitValue::new(
            self.layout.clone(),
            raw & self.width_mask(ctx),
        )))
    }

    fn encode(
        &self,
        value: &Value,
        dst: &mut BytesMut,
        ctx: &Context<'_>,
    ) -> Result<(), CodecError> {
        let raw = match value {
            Value::Bits(bits) => bits.raw(),
            other => other.as_u64().ok_or_else(|| other.mismatch("bits"))?,
        };
        let mut attempt = BytesMut::new();
        match self.underlying.encode(&Value::UInt(raw), &mut attempt, ctx) {
            Ok(()) => {}
            // A signed carrier with the top bit set: retry as its two's complement.
            Err(CodecError::OutOfRange { .. }) => {
                let width = self.width_mask(ctx);
                let sign = (width >> 1) + 1;
                let signed = if raw & sign != 0 {
                    (raw | !width) as i64
                } else {
                    raw as i64
                };
                attempt.clear();
                self.underlying.encode(&Value::Int(signed), &mut attempt, ctx)?;
            }
            Err(e) => return Err(e),
        }
        dst.extend_from_slice(&attempt);
        Ok(())
    }

    fn static_size(&self, ctx: &Context<'_>) -> Option<usize> {
        self.underlying.static_size(ctx)
    }
}
