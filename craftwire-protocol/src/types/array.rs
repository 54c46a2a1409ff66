//! Sequences of values and raw byte runs.

use super::{ensure, Context, IntoType, Type, TypeRef, Value, VarInt};
use crate::error::CodecError;
use bytes::{BufMut, Bytes, BytesMut};

/// How many elements an array holds.
#[derive(Debug, Clone)]
pub enum ArraySize {
    /// Everything left in the buffer. Only valid as the last field of a packet.
    Unbounded,
    /// Exactly this many; encoding truncates or pads with defaults.
    Fixed(usize),
    /// A count decoded with the given type precedes the elements.
    Prefixed(TypeRef),
    /// The count is an earlier field of the enclosing record.
    Field(&'static str),
}

impl ArraySize {
    /// A VarInt count prefix, the most common layout.
    pub fn var_int() -> Self {
        ArraySize::Prefixed(VarInt.into_type())
    }

    fn sibling_count(name: &str, ctx: &Context<'_>) -> Result<usize, CodecError> {
        let value = ctx.sibling(name)?;
        value.as_usize().ok_or_else(|| match value.as_i64() {
            Some(n) => CodecError::NegativeLength(n),
            None => value.mismatch("int"),
        })
    }

    fn decode_count(
        &self,
        buf: &mut Bytes,
        ctx: &Context<'_>,
    ) -> Result<Option<usize>, CodecError> {
        match self {
            ArraySize::Unbounded => Ok(None),
            ArraySize::Fixed(n) => Ok(Some(*n)),
            ArraySize::Prefixed(ty) => {
                let value = ty.decode(buf, ctx)?;
                let n = value.as_i64().ok_or_else(|| value.mismatch("int"))?;
                usize::try_from(n)
                    .map(Some)
                    .map_err(|_| CodecError::NegativeLength(n))
            }
            ArraySize::Field(name) => Self::sibling_count(name, ctx).map(Some),
        }
    }

    fn encode_count(
        &self,
        len: usize,
        dst: &mut BytesMut,
        ctx: &Context<'_>,
    ) -> Result<(), CodecError> {
        if let ArraySize::Prefixed(ty) = self {
            let len = u64::try_from(len).map_err(|_| CodecError::OutOfRange {
                ty: "array length",
                value: len.to_string(),
            })?;
            ty.encode(&Value::UInt(len), dst, ctx)?;
        }
        Ok(())
    }
}

/// A homogeneous sequence of `elem` values.
#[derive(Debug, Clone)]
pub struct Array {
    elem: TypeRef,
    size: ArraySize,
}

impl Array {
    pub fn new(elem: impl IntoType, size: ArraySize) -> Self {
        Self {
            elem: elem.into_type(),
            size,
        }
    }

    /// A VarInt-prefixed array.
    pub fn prefixed(elem: impl IntoType) -> Self {
        Self::new(elem, ArraySize::var_int())
    }

    fn decode_unbounded(&self, buf: &mut Bytes, ctx: &Context<'_>) -> Vec<Value> {
        let mut items = Vec::new();
        while !buf.is_empty() {
            // Decode on a copy so a failed element leaves the cursor where it was.
            let mut probe = buf.clone();
            match self.elem.decode(&mut probe, ctx) {
                // A zero-width element would repeat forever.
                Ok(_) if probe.len() == buf.len() => {
                    tracing::trace!(
                        "unbounded array stopped after {} items: element consumed no bytes",
                        items.len()
                    );
                    break;
                }
                Ok(value) => {
                    *buf = probe;
                    items.push(value);
                }
                Err(e) => {
                    tracing::trace!(
                        "unbounded array stopped after {} items: {}",
                        items.len(),
                        e
                    );
                    break;
                }
            }
        }
        items
    }
}

impl Type for Array {
    fn default_value(&self, ctx: &Context<'_>) -> Result<Value, CodecError> {
        let count = match &self.size {
            ArraySize::Fixed(n) => *n,
            ArraySize::Field(name) if ctx.instance().is_some() => {
                ArraySize::sibling_count(name, ctx)?
            }
            _ => 0,
        };
        let items = (0..count)
            .map(|_| self.elem.default_value(ctx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Array(items))
    }

    fn decode(&self, buf: &mut Bytes, ctx: &Context<'_>) -> Result<Value, CodecError> {
        let Some(count) = self.size.decode_count(buf, ctx)? else {
            return Ok(Value::Array(self.decode_unbounded(buf, ctx)));
        };
        if let Some(size) = self.elem.static_size(ctx) {
            ensure(buf, count.saturating_mul(size))?;
        }
        // A hostile count must not drive the allocation.
        let mut items = Vec::with_capacity(count.min(buf.len()));
        for _ in 0..count {
            items.push(self.elem.decode(buf, ctx)?);
        }
        Ok(Value::Array(items))
    }

    fn encode(
        &self,
        value: &Value,
        dst: &mut BytesMut,
        ctx: &Context<'_>,
    ) -> Result<(), CodecError> {
        let items = value.as_array().ok_or_else(|| value.mismatch("array"))?;
        if let ArraySize::Fixed(n) = self.size {
            for item in items.iter().take(n) {
                self.elem.encode(item, dst, ctx)?;
            }
            for _ in items.len()..n {
                self.elem.encode(&self.elem.default_value(ctx)?, dst, ctx)?;
            }
            return Ok(());
        }
        self.size.encode_count(items.len(), dst, ctx)?;
        for item in items {
            self.elem.encode(item, dst, ctx)?;
        }
        Ok(())
    }

    fn static_size(&self, ctx: &Context<'_>) -> Option<usize> {
        match self.size {
            ArraySize::Fixed(n) => self.elem.static_size(ctx).map(|size| size * n),
            _ => None,
        }
    }
}

/// A run of raw bytes with the same size policies as [`Array`].
#[derive(Debug, Clone)]
pub struct RawBytes {
    size: ArraySize,
}

impl RawBytes {
    pub fn new(size: ArraySize) -> Self {
        Self { size }
    }

    /// VarInt-prefixed bytes, as used for keys and tokens.
    pub fn prefixed() -> Self {
        Self::new(ArraySize::var_int())
    }

    /// The rest of the buffer.
    pub fn remaining() -> Self {
        Self::new(ArraySize::Unbounded)
    }
}

impl Type for RawBytes {
    fn default_value(&self, ctx: &Context<'_>) -> Result<Value, CodecError> {
        let len = match &self.size {
            ArraySize::Fixed(n) => *n,
            ArraySize::Field(name) if ctx.instance().is_some() => {
                ArraySize::sibling_count(name, ctx)?
            }
            _ => 0,
        };
        Ok(Value::Bytes(Bytes::from(vec![0; len])))
    }

    fn decode(&self, buf: &mut Bytes, ctx: &Context<'_>) -> Result<Value, CodecError> {
        let len = self.size.decode_count(buf, ctx)?.unwrap_or(buf.len());
        ensure(buf, len)?;
        Ok(Value::Bytes(buf.split_to(len)))
    }

    fn encode(
        &self,
        value: &Value,
        dst: &mut BytesMut,
        ctx: &Context<'_>,
    ) -> Result<(), CodecError> {
        let data = value.as_bytes().ok_or_else(|| value.mismatch("bytes"))?;
        if let ArraySize::Fixed(n) = self.size {
            let take = data.len().min(n);
            dst.put_slice(&data[..take]);
            dst.put_bytes(0, n - take);
            return Ok(());
        }
        self.size.encode_count(data.len(), dst, ctx)?;
        dst.put_slice(data);
        Ok(())
    }

    fn static_size(&self, _ctx: &Context<'_>) -> Option<usize> {
        match self.size {
            ArraySize::Fixed(n) => Some(n),
            _ => None,
        }
    }
}
