//! Packet registration and ID resolution tables.
//!
//! Packet definitions are registered once at startup. For every (phase,
//! direction, version) triple the registry can build an [`IdTable`] mapping
//! resolved IDs to definitions. Tables are built on first use, cached, and
//! shared; they are never modified after construction.

use crate::error::ProtocolError;
use crate::packet::{Direction, Packet, PacketDef, Phase};
use crate::types::{decode_var_int, WireEnum};
use crate::version::Version;
use bytes::Bytes;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// ID-to-definition map for one (phase, direction, version).
#[derive(Debug)]
pub struct IdTable {
    phase: Phase,
    direction: Direction,
    version: Version,
    by_id: HashMap<i32, Arc<PacketDef>>,
}

impl IdTable {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn get(&self, id: i32) -> Option<&Arc<PacketDef>> {
        self.by_id.get(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Decodes a packet body: the VarInt ID, then the fields.
    ///
    /// An ID with no definition yields a generic packet holding the rest of
    /// the body.
    pub fn decode(&self, mut body: Bytes) -> Result<Packet, ProtocolError> {
        let id = decode_var_int(&mut body)?;
        match self.by_id.get(&id) {
            Some(def) => Ok(Packet::decode(def, body, &self.version)?),
            None => {
                tracing::trace!(
                    "unknown {:?} {:?} packet {:#04x} ({} bytes)",
                    self.phase,
                    self.direction,
                    id,
                    body.len()
                );
                Ok(Packet::generic(id, self.phase, self.direction, body))
            }
        }
    }
}

type TableKey = (Phase, Direction, Version);

/// Every packet definition known to an endpoint.
#[derive(Debug, Default)]
pub struct PacketRegistry {
    packets: Vec<Arc<PacketDef>>,
    tables: DashMap<TableKey, Arc<IdTable>>,
}

impl PacketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in packet set.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.packets = crate::packets::all();
        registry
    }

    /// Adds a definition. Names must be unique within a phase and direction.
    pub fn register(&mut self, def: &Arc<PacketDef>) -> Result<(), ProtocolError> {
        if self.lookup(def.name(), def.phase(), def.direction()).is_some() {
            return Err(ProtocolError::DuplicatePacketName {
                name: def.name(),
                phase: def.phase(),
                direction: def.direction(),
            });
        }
        self.packets.push(def.clone());
        self.tables.clear();
        Ok(())
    }

    /// Builder-style [`PacketRegistry::register`].
    pub fn with(mut self, def: &Arc<PacketDef>) -> Result<Self, ProtocolError> {
        self.register(def)?;
        Ok(self)
    }

    pub fn lookup(
        &self,
        name: &str,
        phase: Phase,
        direction: Direction,
    ) -> Option<&Arc<PacketDef>> {
        self.packets.iter().find(|def| {
            def.name() == name && def.phase() == phase && def.direction() == direction
        })
    }

    pub fn packets(&self) -> impl Iterator<Item = &Arc<PacketDef>> {
        self.packets.iter()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Returns the ID table for a phase, direction and version.
    ///
    /// Fails if two definitions resolve to the same ID, or if a definition has
    /// no ID arm for `version`.
    ///
    /// Tables are cached for registered versions and [`Version::unknown`]
    /// only. Any other protocol number comes from a peer, so its table is
    /// built fresh and dropped with the connection.
    pub fn id_table(
        &self,
        phase: Phase,
        direction: Direction,
        version: &Version,
    ) -> Result<Arc<IdTable>, ProtocolError> {
        let key = (phase, direction, *version);
        if let Some(table) = self.tables.get(&key) {
            return Ok(table.clone());
        }

        let table = Arc::new(self.build_table(phase, direction, version)?);
        tracing::debug!(
            "built {:?} {:?} ID table for {} ({} packets)",
            phase,
            direction,
            version,
            table.len()
        );
        if !Self::is_cacheable(version) {
            return Ok(table);
        }
        Ok(self.tables.entry(key).or_insert(table).clone())
    }

    fn is_cacheable(version: &Version) -> bool {
        version.is_supported() || *version == Version::unknown()
    }

    /// Number of ID tables currently cached.
    pub fn cached_tables(&self) -> usize {
        self.tables.len()
    }

    fn build_table(
        &self,
        phase: Phase,
        direction: Direction,
        version: &Version,
    ) -> Result<IdTable, ProtocolError> {
        let mut by_id: HashMap<i32, Arc<PacketDef>> = HashMap::new();
        let candidates = self
            .packets
            .iter()
            .filter(|def| def.phase() == phase && def.direction() == direction);
        for def in candidates {
            let Some(id) = def.id(version)? else {
                continue;
            };
            if let Some(first) = by_id.get(&id) {
                return Err(ProtocolError::DuplicatePacketId {
                    id,
                    first: first.name(),
                    second: def.name(),
                    phase,
                    direction,
                    version: *version,
                });
            }
            by_id.insert(id, def.clone());
        }
        Ok(IdTable {
            phase,
            direction,
            version: *version,
            by_id,
        })
    }

    /// Builds every table for `versions`, surfacing configuration errors early.
    pub fn validate(&self, versions: &[Version]) -> Result<(), ProtocolError> {
        for version in versions {
            for &phase in Phase::VARIANTS {
                for direction in Direction::ALL {
                    self.id_table(phase, direction, version)?;
                }
            }
        }
        Ok(())
    }
}
