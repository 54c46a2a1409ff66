//! Types whose encoding depends on the protocol version.

use super::{Context, IntoType, Type, TypeRef, Value};
use crate::error::CodecError;
use crate::version::{Version, VersionRange, VersionSwitcher};
use bytes::{Bytes, BytesMut};

/// Delegates to a type chosen per version.
///
/// An arm without a type marks a field that does not exist in those versions:
/// it decodes to [`Value::Absent`] and encodes nothing.
#[derive(Debug, Clone, Default)]
pub struct VersionSwitched {
    switcher: VersionSwitcher<Option<TypeRef>>,
}

impl VersionSwitched {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_switcher(switcher: VersionSwitcher<Option<TypeRef>>) -> Self {
        Self { switcher }
    }

    /// Uses `ty` for the versions in `range`.
    pub fn range(self, range: impl Into<VersionRange>, ty: impl IntoType) -> Self {
        Self {
            switcher: self.switcher.range(range, Some(ty.into_type())),
        }
    }

    /// Uses `ty` for the named version.
    pub fn exact(self, name: &'static str, ty: impl IntoType) -> Self {
        Self {
            switcher: self.switcher.exact(name, Some(ty.into_type())),
        }
    }

    /// The field is absent in `range`.
    pub fn absent(self, range: impl Into<VersionRange>) -> Self {
        Self {
            switcher: self.switcher.range(range, None),
        }
    }

    /// Uses `ty` for every version not matched by an earlier arm.
    pub fn or_else(self, ty: impl IntoType) -> Self {
        Self {
            switcher: self.switcher.or_else(Some(ty.into_type())),
        }
    }

    /// Absent in every version not matched by an earlier arm.
    pub fn or_absent(self) -> Self {
        Self {
            switcher: self.switcher.or_else(None),
        }
    }

    fn resolve(&self, version: &Version) -> Result<Option<&TypeRef>, CodecError> {
        Ok(self.switcher.get(version)?.as_ref())
    }
}

impl Type for VersionSwitched {
    fn default_value(&self, ctx: &Context<'_>) -> Result<Value, CodecError> {
        match self.resolve(ctx.version())? {
            Some(ty) => ty.default_value(ctx),
            None => Ok(Value::Absent),
        }
    }

    fn decode(&self, buf: &mut Bytes, ctx: &Context<'_>) -> Result<Value, CodecError> {
        match self.resolve(ctx.version())? {
            Some(ty) => ty.decode(buf, ctx),
            None => Ok(Value::Absent),
        }
    }

    fn encode(
        &self,
        value: &Value,
        dst: &mut BytesMut,
        ctx: &Context<'_>,
    ) -> Result<(), CodecError> {
        match self.resolve(ctx.version())? {
            Some(ty) => ty.encode(value, dst, ctx),
            None => Ok(()),
        }
    }

    fn static_size(&self, ctx: &Context<'_>) -> Option<usize> {
        match self.resolve(ctx.version()).ok()? {
            Some(ty) => ty.static_size(ctx),
            None => Some(0),
        }
    }
}
