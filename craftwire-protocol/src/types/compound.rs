//! Ordered named fields, the body of compounds and packets.

use super::{Context, IntoType, Record, Type, TypeRef, Value};
use crate::error::CodecError;
use bytes::{Bytes, BytesMut};

/// A named field of a compound or packet.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub ty: TypeRef,
}

impl Field {
    pub fn new(name: &'static str, ty: impl IntoType) -> Self {
        Self {
            name,
            ty: ty.into_type(),
        }
    }
}

/// Builds a record of defaults. Later fields see the earlier defaults as siblings.
pub(crate) fn default_fields(fields: &[Field], ctx: &Context<'_>) -> Result<Record, CodecError> {
    let mut record = Record::with_capacity(fields.len());
    for field in fields {
        let value = field.ty.default_value(&ctx.with_instance(&record))?;
        record.push(field.name, value);
    }
    Ok(record)
}

/// Decodes fields in order. Each field sees the fields decoded before it.
pub(crate) fn decode_fields(
    fields: &[Field],
    buf: &mut Bytes,
    ctx: &Context<'_>,
) -> Result<Record, CodecError> {
    let mut record = Record::with_capacity(fields.len());
    for field in fields {
        let value = field.ty.decode(buf, &ctx.with_instance(&record))?;
        record.push(field.name, value);
    }
    Ok(record)
}

/// Encodes `record` in field order. Every field must be present.
pub(crate) fn encode_fields(
    fields: &[Field],
    record: &Record,
    dst: &mut BytesMut,
    ctx: &Context<'_>,
) -> Result<(), CodecError> {
    let ctx = ctx.with_instance(record);
    for field in fields {
        let value = record.require(field.name)?;
        field.ty.encode(value, dst, &ctx)?;
    }
    Ok(())
}

/// A nested group of fields, decoded to [`Value::Compound`].
#[derive(Debug, Clone, Default)]
pub struct Compound {
    fields: Vec<Field>,
}

impl Compound {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Appends a field.
    pub fn field(mut self, name: &'static str, ty: impl IntoType) -> Self {
        self.fields.push(Field::new(name, ty));
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
}

impl Type for Compound {
    fn default_value(&self, ctx: &Context<'_>) -> Result<Value, CodecError> {
        default_fields(&self.fields, ctx).map(Value::Compound)
    }

    fn decode(&self, buf: &mut Bytes, ctx: &Context<'_>) -> Result<Value, CodecError> {
        decode_fields(&self.fields, buf, ctx).map(Value::Compound)
    }

    fn encode(
        &self,
        value: &Value,
        dst: &mut BytesMut,
        ctx: &Context<'_>,
    ) -> Result<(), CodecError> {
        let record = value.as_record().ok_or_else(|| value.mismatch("compound"))?;
        encode_fields(&self.fields, record, dst, ctx)
    }

    fn static_size(&self, ctx: &Context<'_>) -> Option<usize> {
        self.fields
            .iter()
            .map(|field| field.ty.static_size(ctx))
            .sum()
    }
}
