//! Packet schemas and packet values.
//!
//! A [`PacketDef`] is the static description of one packet: its name, the
//! phase and direction it belongs to, its (possibly version-dependent) ID, and
//! its ordered fields. A [`Packet`] is one instance of a definition, or a
//! generic passthrough for an ID no definition claims.

use crate::error::{CodecError, ProtocolError, VersionResolutionError};
use crate::types::compound::{decode_fields, default_fields, encode_fields};
use crate::types::{encode_var_int, Context, Field, IntoType, Record, Value};
use crate::version::{Version, VersionSwitcher};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::sync::Arc;

crate::wire_enum! {
    /// Protocol phase of a connection. Discriminants are the `next_state`
    /// values carried by the handshake.
    pub enum Phase {
        Handshaking = 0,
        Status = 1,
        Login = 2,
        Play = 3,
    }
}

/// Which way a packet travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client to server.
    Serverbound,
    /// Server to client.
    Clientbound,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Serverbound, Direction::Clientbound];

    pub fn opposite(self) -> Self {
        match self {
            Direction::Serverbound => Direction::Clientbound,
            Direction::Clientbound => Direction::Serverbound,
        }
    }
}

/// A packet's numeric ID.
#[derive(Debug, Clone)]
pub enum PacketId {
    Fixed(i32),
    /// Resolved per version; `None` means the packet does not exist there.
    Switched(VersionSwitcher<Option<i32>>),
}

impl PacketId {
    pub fn resolve(&self, version: &Version) -> Result<Option<i32>, VersionResolutionError> {
        match self {
            PacketId::Fixed(id) => Ok(Some(*id)),
            PacketId::Switched(switcher) => switcher.get(version).copied(),
        }
    }
}

/// The schema of one packet type.
#[derive(Debug)]
pub struct PacketDef {
    name: &'static str,
    phase: Phase,
    direction: Direction,
    id: PacketId,
    fields: Vec<Field>,
}

impl PacketDef {
    pub fn builder(name: &'static str, phase: Phase, direction: Direction) -> PacketDefBuilder {
        PacketDefBuilder {
            name,
            phase,
            direction,
            id: PacketId::Fixed(0),
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Resolves the ID for `version`; `Ok(None)` if the packet does not exist there.
    pub fn id(&self, version: &Version) -> Result<Option<i32>, VersionResolutionError> {
        self.id.resolve(version)
    }

    /// Builds a record holding every field's default value.
    pub fn default_record(&self, version: &Version) -> Result<Record, CodecError> {
        default_fields(&self.fields, &Context::new(version))
    }

    /// Decodes the fields of a body whose ID has already been read.
    ///
    /// Bytes left after the last field are ignored.
    pub fn decode_fields(&self, buf: &mut Bytes, version: &Version) -> Result<Record, CodecError> {
        decode_fields(&self.fields, buf, &Context::new(version))
    }

    pub fn encode_fields(
        &self,
        record: &Record,
        dst: &mut BytesMut,
        version: &Version,
    ) -> Result<(), CodecError> {
        encode_fields(&self.fields, record, dst, &Context::new(version))
    }

    fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|field| field.name == name)
    }
}

/// Builder for [`PacketDef`].
pub struct PacketDefBuilder {
    name: &'static str,
    phase: Phase,
    direction: Direction,
    id: PacketId,
    fields: Vec<Field>,
}

impl PacketDefBuilder {
    /// Uses the same ID in every version.
    pub fn id(mut self, id: i32) -> Self {
        self.id = PacketId::Fixed(id);
        self
    }

    /// Uses an ID that depends on the version.
    pub fn switched_id(mut self, ids: VersionSwitcher<i32>) -> Self {
        self.id = PacketId::Switched(ids.map(Some));
        self
    }

    /// Like [`switched_id`](Self::switched_id), where `None` arms mark
    /// versions that lack the packet.
    pub fn optional_id(mut self, ids: VersionSwitcher<Option<i32>>) -> Self {
        self.id = PacketId::Switched(ids);
        self
    }

    /// Appends a field.
    pub fn field(mut self, name: &'static str, ty: impl IntoType) -> Self {
        self.fields.push(Field::new(name, ty));
        self
    }

    pub fn build(self) -> Arc<PacketDef> {
        Arc::new(PacketDef {
            name: self.name,
            phase: self.phase,
            direction: self.direction,
            id: self.id,
            fields: self.fields,
        })
    }
}

/// What a [`Packet`] is an instance of.
#[derive(Debug, Clone)]
pub enum PacketKind {
    Known(Arc<PacketDef>),
    /// An ID with no registered definition; the body is kept verbatim.
    Generic {
        id: i32,
        phase: Phase,
        direction: Direction,
    },
}

/// Field name holding the raw body of a generic packet.
pub const GENERIC_DATA: &str = "data";

/// A packet value: its kind plus its field values.
#[derive(Clone)]
pub struct Packet {
    kind: PacketKind,
    fields: Record,
}

impl Packet {
    /// Creates a packet with every field set to its default.
    pub fn new(def: &Arc<PacketDef>, version: &Version) -> Result<Self, CodecError> {
        Ok(Self {
            kind: PacketKind::Known(def.clone()),
            fields: def.default_record(version)?,
        })
    }

    /// Creates a packet from already decoded fields.
    pub fn from_record(def: &Arc<PacketDef>, fields: Record) -> Self {
        Self {
            kind: PacketKind::Known(def.clone()),
            fields,
        }
    }

    /// Creates a passthrough packet for an unrecognized ID.
    pub fn generic(id: i32, phase: Phase, direction: Direction, data: Bytes) -> Self {
        Self {
            kind: PacketKind::Generic {
                id,
                phase,
                direction,
            },
            fields: Record::new().with(GENERIC_DATA, data),
        }
    }

    /// Decodes the fields following an already-read ID.
    pub fn decode(
        def: &Arc<PacketDef>,
        mut body: Bytes,
        version: &Version,
    ) -> Result<Self, CodecError> {
        let fields = def.decode_fields(&mut body, version)?;
        if !body.is_empty() {
            tracing::trace!("{}: ignoring {} trailing bytes", def.name(), body.len());
        }
        Ok(Self::from_record(def, fields))
    }

    pub fn kind(&self) -> &PacketKind {
        &self.kind
    }

    pub fn def(&self) -> Option<&Arc<PacketDef>> {
        match &self.kind {
            PacketKind::Known(def) => Some(def),
            PacketKind::Generic { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match &self.kind {
            PacketKind::Known(def) => def.name(),
            PacketKind::Generic { .. } => "Generic",
        }
    }

    pub fn phase(&self) -> Phase {
        match &self.kind {
            PacketKind::Known(def) => def.phase(),
            PacketKind::Generic { phase, .. } => *phase,
        }
    }

    pub fn direction(&self) -> Direction {
        match &self.kind {
            PacketKind::Known(def) => def.direction(),
            PacketKind::Generic { direction, .. } => *direction,
        }
    }

    pub fn is_generic(&self) -> bool {
        matches!(self.kind, PacketKind::Generic { .. })
    }

    /// Returns whether this packet is an instance of `def`.
    pub fn is(&self, def: &PacketDef) -> bool {
        self.def()
            .map_or(false, |own| std::ptr::eq(Arc::as_ptr(own), def))
    }

    /// Resolves this packet's ID for `version`.
    pub fn id(&self, version: &Version) -> Result<Option<i32>, VersionResolutionError> {
        match &self.kind {
            PacketKind::Known(def) => def.id(version),
            PacketKind::Generic { id, .. } => Ok(Some(*id)),
        }
    }

    pub fn fields(&self) -> &Record {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns a field or a [`CodecError::MissingField`].
    pub fn require(&self, name: &str) -> Result<&Value, CodecError> {
        self.fields.require(name)
    }

    /// Sets a field declared by the packet's schema.
    pub fn set(&mut self, name: &'static str, value: impl Into<Value>) -> Result<(), CodecError> {
        let known = match &self.kind {
            PacketKind::Known(def) => def.has_field(name),
            PacketKind::Generic { .. } => name == GENERIC_DATA,
        };
        if !known {
            return Err(CodecError::UnknownField(format!("{}.{}", self.name(), name)));
        }
        self.fields.insert(name, value);
        Ok(())
    }

    /// Builder-style [`Packet::set`].
    pub fn with(mut self, name: &'static str, value: impl Into<Value>) -> Result<Self, CodecError> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Encodes the ID and fields for `version`.
    pub fn encode_body(&self, version: &Version) -> Result<BytesMut, ProtocolError> {
        let id = self.id(version)?.ok_or(ProtocolError::PacketUnavailable {
            name: self.name(),
            version: *version,
        })?;
        let mut body = BytesMut::new();
        encode_var_int(id, &mut body);
        match &self.kind {
            PacketKind::Known(def) => def.encode_fields(&self.fields, &mut body, version)?,
            PacketKind::Generic { .. } => {
                let data = self.fields.require(GENERIC_DATA)?;
                let data = data.as_bytes().ok_or_else(|| data.mismatch("bytes"))?;
                body.put_slice(data);
            }
        }
        Ok(body)
    }
}

impl PartialEq for Packet {
    fn eq(&self, other: &Self) -> bool {
        let same_kind = match (&self.kind, &other.kind) {
            (PacketKind::Known(a), PacketKind::Known(b)) => Arc::ptr_eq(a, b),
            (
                PacketKind::Generic {
                    id: a,
                    phase: pa,
                    direction: da,
                },
                PacketKind::Generic {
                    id: b,
                    phase: pb,
                    direction: db,
                },
            ) => a == b && pa == pb && da == db,
            _ => false,
        };
        same_kind && self.fields == other.fields
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = match &self.kind {
            PacketKind::Known(def) => f.debug_struct(def.name()),
            PacketKind::Generic { id, .. } => {
                let mut out = f.debug_struct("Generic");
                out.field("id", &format_args!("{:#04x}", id));
                out
            }
        };
        for (name, value) in self.fields.iter() {
            out.field(name, value);
        }
        out.finish()
    }
}
