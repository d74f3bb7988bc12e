//! In-memory model of one complete save.
//!
//! [`SaveData`] accumulates across a play session: levels keep their
//! stored state while unloaded, destroyed-object names survive repeated
//! saves, and class metadata persists so slot assignments stay stable.
//! Everything here is plain data; capture fills it and the archive codec
//! moves it to and from bytes.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use stasis_core::Guid;

use crate::meta::{ClassId, ClassMetadata};

/// Descriptive header of a save, readable without decoding object state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SaveInfo {
    pub title: String,
    /// Seconds since the Unix epoch at the time of the save.
    pub timestamp: i64,
}

/// Packed property values of one object.
///
/// `offsets` is indexed by class def slot and points into `blob`; values
/// themselves sit in capture order. Slots with no value in this record
/// hold [`Self::NO_OFFSET`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropertyData {
    pub blob: Vec<u8>,
    pub offsets: Vec<u32>,
}

impl PropertyData {
    pub const NO_OFFSET: u32 = u32::MAX;

    /// Byte range start for `slot`, if this record stored a value for it.
    pub fn offset_of(&self, slot: u32) -> Option<usize> {
        match self.offsets.get(slot as usize) {
            Some(&offset) if offset != Self::NO_OFFSET => Some(offset as usize),
            _ => None,
        }
    }
}

/// Stored state of a level-resident object, keyed by its stable name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedObjectData {
    pub class_id: ClassId,
    pub core: Vec<u8>,
    pub properties: PropertyData,
    pub custom: Vec<u8>,
}

/// Stored state of a runtime-spawned object, keyed by its [`Guid`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpawnedObjectData {
    pub guid: Guid,
    pub class_id: ClassId,
    pub core: Vec<u8>,
    pub properties: PropertyData,
    pub custom: Vec<u8>,
}

/// Stored state of one level.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LevelData {
    pub name: String,
    pub metadata: ClassMetadata,
    pub objects: BTreeMap<String, NamedObjectData>,
    pub spawned: BTreeMap<Guid, SpawnedObjectData>,
    /// Names of level-resident objects destroyed during play. Applied
    /// after restore so they stay gone across loads.
    pub destroyed: BTreeSet<String>,
}

impl LevelData {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Drop object records before a fresh capture of this level.
    ///
    /// Metadata stays so class defs keep their slot assignments, and the
    /// destroyed set stays because destruction outlives any one save.
    pub fn pre_snapshot_reset(&mut self) {
        self.objects.clear();
        self.spawned.clear();
    }
}

/// Stored state of the global (level-independent) objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GlobalData {
    pub metadata: ClassMetadata,
    pub objects: BTreeMap<String, NamedObjectData>,
}

/// Everything one save holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SaveData {
    pub info: SaveInfo,
    pub global: GlobalData,
    pub levels: BTreeMap<String, LevelData>,
}

impl SaveData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn level(&self, name: &str) -> Option<&LevelData> {
        self.levels.get(name)
    }

    pub fn level_mut(&mut self, name: &str) -> &mut LevelData {
        self.levels
            .entry(name.to_string())
            .or_insert_with(|| LevelData::new(name))
    }
}
