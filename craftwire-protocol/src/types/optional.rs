//! Values that may be missing from the wire.

use super::{Boolean, Context, IntoType, Record, Type, TypeRef, Value};
use crate::error::CodecError;
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::sync::Arc;

/// How an [`Optional`] learns whether its value is present.
#[derive(Clone)]
pub enum Presence {
    /// A boolean-like prefix decoded with the given type.
    Prefixed(TypeRef),
    /// A predicate over the enclosing record.
    When(Arc<dyn Fn(&Record) -> bool + Send + Sync>),
    /// Present if the remaining bytes decode; must be the last field.
    Trailing,
}

impl Presence {
    /// A one-byte boolean prefix.
    pub fn boolean() -> Self {
        Presence::Prefixed(Boolean.into_type())
    }

    /// Present when the predicate holds for the enclosing record.
    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        Presence::When(Arc::new(predicate))
    }

    fn from_record(&self, ctx: &Context<'_>) -> bool {
        match self {
            Presence::When(predicate) => ctx.instance().map_or(false, |record| predicate(record)),
            _ => false,
        }
    }
}

impl fmt::Debug for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Presence::Prefixed(ty) => f.debug_tuple("Prefixed").field(ty).finish(),
            Presence::When(_) => f.write_str("When(..)"),
            Presence::Trailing => f.write_str("Trailing"),
        }
    }
}

/// A value that is either present or not, encoded as [`Value::Optional`].
#[derive(Debug, Clone)]
pub struct Optional {
    inner: TypeRef,
    presence: Presence,
}

impl Optional {
    pub fn new(inner: impl IntoType, presence: Presence) -> Self {
        Self {
            inner: inner.into_type(),
            presence,
        }
    }

    /// Boolean-prefixed, the usual layout.
    pub fn prefixed(inner: impl IntoType) -> Self {
        Self::new(inner, Presence::boolean())
    }

    pub fn trailing(inner: impl IntoType) -> Self {
        Self::new(inner, Presence::Trailing)
    }

    pub fn when<F>(inner: impl IntoType, predicate: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        Self::new(inner, Presence::when(predicate))
    }
}

impl Type for Optional {
    fn default_value(&self, ctx: &Context<'_>) -> Result<Value, CodecError> {
        if self.presence.from_record(ctx) {
            return Ok(Value::some(self.inner.default_value(ctx)?));
        }
        Ok(Value::none())
    }

    fn decode(&self, buf: &mut Bytes, ctx: &Context<'_>) -> Result<Value, CodecError> {
        let present = match &self.presence {
            Presence::Prefixed(ty) => {
                let flag = ty.decode(buf, ctx)?;
                match flag {
                    Value::Bool(b) => b,
                    other => other.integer().ok_or_else(|| other.mismatch("bool"))? != 0,
                }
            }
            Presence::When(_) => self.presence.from_record(ctx),
            Presence::Trailing => {
                if buf.is_empty() {
                    return Ok(Value::none());
                }
                let mut probe = buf.clone();
                return match self.inner.decode(&mut probe, ctx) {
                    Ok(value) => {
                        *buf = probe;
                        Ok(Value::some(value))
                    }
                    Err(_) => Ok(Value::none()),
                };
            }
        };
        if present {
            Ok(Value::some(self.inner.decode(buf, ctx)?))
        } else {
            Ok(Value::none())
        }
    }

    fn encode(
        &self,
        value: &Value,
        dst: &mut BytesMut,
        ctx: &Context<'_>,
    ) -> Result<(), CodecError> {
        let inner = value
            .as_optional()
            .ok_or_else(|| value.mismatch("optional"))?;
        match &self.presence {
            Presence::Prefixed(ty) => {
                ty.encode(&Value::Bool(inner.is_some()), dst, ctx)?;
                if let Some(inner) = inner {
                    self.inner.encode(inner, dst, ctx)?;
                }
                Ok(())
            }
            Presence::When(_) => match (self.presence.from_record(ctx), inner) {
                (true, Some(inner)) => self.inner.encode(inner, dst, ctx),
                (true, None) => {
                    let fallback = self.inner.default_value(ctx)?;
                    self.inner.encode(&fallback, dst, ctx)
                }
                (false, _) => Ok(()),
            },
            Presence::Trailing => match inner {
                Some(inner) => self.inner.encode(inner, dst, ctx),
                None => Ok(()),
            },
        }
    }
}
