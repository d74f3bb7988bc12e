//! Whole-world capture and restore over an in-memory [`SaveData`].
//!
//! [`SaveState`] is the working copy of one save: the subsystem snapshots
//! live levels into it, serializes it to an archive, and replays it onto
//! freshly loaded levels. Per level the restore runs in three passes:
//! respawn stored runtime objects, restore every live object in place,
//! then remove objects recorded as destroyed. Respawning first is what
//! lets cross-references from level-resident objects resolve.

use std::collections::HashMap;
use std::io::{Read, Write};

use stasis_core::Guid;

use crate::archive;
use crate::data::{LevelData, SaveData, SaveInfo};
use crate::error::ArchiveError;
use crate::object::{LevelHost, ObjectCategory, ObjectRef, RespawnPolicy, SaveObject, WorldHost};
use crate::restore::{restore_object, RestoreContext, StoredRecord};
use crate::snapshot::{capture_named, capture_spawned};

// ---------------------------------------------------------------------------
// Spawned-object routing
// ---------------------------------------------------------------------------

/// Whether `object` is tracked by identity and respawned on restore,
/// as opposed to matched against a level-resident record by name.
///
/// The decision must come out the same at snapshot and restore time:
/// an object with an identity slot whose respawn policy approves is
/// spawned, everything else is level-resident.
pub fn is_spawned_object(object: &dyn SaveObject) -> bool {
    object.persistent_id().is_some() && should_respawn(object)
}

fn should_respawn(object: &dyn SaveObject) -> bool {
    match object.respawn_policy() {
        RespawnPolicy::Always => true,
        RespawnPolicy::Never => false,
        // Players, controllers and rule objects are recreated by the
        // host's own startup, not by the restore pass.
        RespawnPolicy::Default => !matches!(
            object.category(),
            ObjectCategory::PlayerControlled
                | ObjectCategory::Controller
                | ObjectCategory::GameRules
        ),
    }
}

// ---------------------------------------------------------------------------
// Save state
// ---------------------------------------------------------------------------

/// The in-memory state of one save: capture into it, archive it, replay
/// it onto a world.
#[derive(Debug, Default)]
pub struct SaveState {
    data: SaveData,
}

impl SaveState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all captured data, as at the start of a new game.
    pub fn reset(&mut self) {
        self.data.reset();
    }

    pub fn data(&self) -> &SaveData {
        &self.data
    }

    pub fn info(&self) -> &SaveInfo {
        &self.data.info
    }

    pub fn set_info(&mut self, title: &str, timestamp: i64) {
        self.data.info.title = title.to_string();
        self.data.info.timestamp = timestamp;
    }

    /// Capture every level the world currently exposes, then its global
    /// objects.
    pub fn update_from_world(&mut self, world: &mut dyn WorldHost) {
        for name in world.level_names() {
            self.update_from_level(world, &name);
        }
        for (id, object) in world.global_objects() {
            self.update_from_global_object(&id, object);
        }
    }

    /// Capture one level into its stored record, replacing whatever the
    /// previous capture of that level held.
    pub fn update_from_level(&mut self, world: &mut dyn WorldHost, name: &str) {
        let Some(level) = world.level(name) else {
            log::warn!("world has no level named {name}, nothing to capture");
            return;
        };
        capture_level(level, self.data.level_mut(name));
    }

    /// Capture a global (level-independent) object under a caller-chosen
    /// stable id.
    pub fn update_from_global_object(&mut self, id: &str, object: &mut dyn SaveObject) {
        if id.is_empty() {
            log::error!(
                "global object {} needs a non-empty id, skipping",
                object.class_path()
            );
            return;
        }
        // Globals do not cross-reference level objects, so no ref table.
        let ref_guids = HashMap::new();
        let record = capture_named(object, &mut self.data.global.metadata, &ref_guids);
        self.data.global.objects.insert(id.to_string(), record);
    }

    /// Record that a level-resident object was destroyed at runtime, so
    /// a later restore removes it again. Repeat calls are no-ops.
    pub fn mark_destroyed(&mut self, level_name: &str, name: &str) {
        let level = self.data.level_mut(level_name);
        if level.destroyed.insert(name.to_string()) {
            log::debug!("{name} recorded as destroyed in level {level_name}");
        }
    }

    /// Replay the stored state onto every level the world exposes, then
    /// onto its global objects.
    pub fn restore_world(&self, world: &mut dyn WorldHost) {
        for name in world.level_names() {
            self.restore_level(world, &name);
        }
        for (id, object) in world.global_objects() {
            self.restore_global_object(&id, object);
        }
    }

    /// Replay one level's stored record onto the live level.
    ///
    /// The level is expected to be freshly loaded: the respawn pass
    /// recreates every stored runtime object unconditionally, so calling
    /// this on a level that already restored once duplicates them.
    pub fn restore_level(&self, world: &mut dyn WorldHost, name: &str) {
        let Some(data) = self.data.level(name) else {
            log::warn!("no stored data for level {name}, leaving it untouched");
            return;
        };
        let Some(level) = world.level(name) else {
            log::warn!("world has no level named {name}, nothing to restore");
            return;
        };
        restore_into_level(level, data);
    }

    pub fn restore_global_object(&self, id: &str, object: &mut dyn SaveObject) {
        let Some(record) = self.data.global.objects.get(id) else {
            log::debug!("no stored global object under id {id}");
            return;
        };
        let identity = HashMap::new();
        let mut ctx = RestoreContext::new();
        restore_object(
            object,
            &self.data.global.metadata,
            StoredRecord::from(record),
            &identity,
            &mut ctx,
        );
    }

    pub fn write_to(&self, output: &mut impl Write) -> Result<(), ArchiveError> {
        archive::write_save(output, &self.data)
    }

    pub fn read_from(&mut self, input: &mut impl Read) -> Result<(), ArchiveError> {
        self.data = archive::read_save(input)?;
        Ok(())
    }

    /// Read only the descriptive header of an archive, without decoding
    /// object data. For building save lists.
    pub fn peek_info(input: &mut impl Read) -> Result<SaveInfo, ArchiveError> {
        archive::read_save_info(input)
    }
}

// ---------------------------------------------------------------------------
// Level capture
// ---------------------------------------------------------------------------

fn capture_level(level: &mut dyn LevelHost, data: &mut LevelData) {
    data.pre_snapshot_reset();

    // First pass collects the identity of every referenceable object so
    // cross-references can serialize as guids.
    let mut ref_guids: HashMap<ObjectRef, Guid> = HashMap::new();
    for (handle, object) in level.objects() {
        if let Some(guid) = object.persistent_id() {
            if guid.is_valid() {
                ref_guids.insert(handle, guid);
            }
        }
    }

    for (_handle, object) in level.objects() {
        capture_object(object, data, &ref_guids);
    }
}

fn capture_object(
    object: &mut dyn SaveObject,
    data: &mut LevelData,
    ref_guids: &HashMap<ObjectRef, Guid>,
) {
    if is_spawned_object(&*object) {
        let mut guid = object.persistent_id().unwrap_or(Guid::NIL);
        if !guid.is_valid() {
            guid = Guid::random();
            if !object.set_persistent_id(guid) {
                log::error!(
                    "{} wants respawn tracking but cannot hold an identity, storing by name instead",
                    object.class_path()
                );
                capture_named_object(object, data, ref_guids);
                return;
            }
        }
        let record = capture_spawned(object, &mut data.metadata, ref_guids, guid);
        data.spawned.insert(guid, record);
    } else {
        capture_named_object(object, data, ref_guids);
    }
}

fn capture_named_object(
    object: &mut dyn SaveObject,
    data: &mut LevelData,
    ref_guids: &HashMap<ObjectRef, Guid>,
) {
    let name = object.object_name().to_string();
    if name.is_empty() {
        log::error!("{} has no stable name, skipping", object.class_path());
        return;
    }
    let record = capture_named(object, &mut data.metadata, ref_guids);
    data.objects.insert(name, record);
}

// ---------------------------------------------------------------------------
// Level restore
// ---------------------------------------------------------------------------

fn restore_into_level(level: &mut dyn LevelHost, data: &LevelData) {
    let mut identity: HashMap<Guid, ObjectRef> = HashMap::new();

    // Pass 1: respawn stored runtime objects. They have to exist before
    // any property restore runs so references to them resolve.
    for (guid, record) in &data.spawned {
        let Some(class_path) = data.metadata.class_name(record.class_id) else {
            log::warn!(
                "spawned record {guid} references an unknown class id, it will not be respawned"
            );
            continue;
        };
        let Some(handle) = level.spawn(class_path) else {
            log::warn!("class {class_path} could not be instantiated, {guid} will not be respawned");
            continue;
        };
        if let Some(object) = level.object_mut(handle) {
            if !object.set_persistent_id(*guid) {
                log::warn!("respawned {class_path} does not accept an identity token");
            }
        }
        identity.insert(*guid, handle);
    }

    // Pass 2: restore every live object in place. Objects that carry an
    // identity register it as they go, so later objects can reference
    // earlier level-resident ones too.
    let mut ctx = RestoreContext::new();
    for (handle, object) in level.objects() {
        restore_into_object(object, data, &identity, &mut ctx);
        if let Some(guid) = object.persistent_id() {
            if guid.is_valid() {
                identity.insert(guid, handle);
            }
        }
    }

    // Pass 3: remove objects recorded as destroyed.
    for name in &data.destroyed {
        if !level.destroy(name) {
            log::debug!("destroyed object {name} not present live, nothing to remove");
        }
    }
}

fn restore_into_object(
    object: &mut dyn SaveObject,
    data: &LevelData,
    identity: &HashMap<Guid, ObjectRef>,
    ctx: &mut RestoreContext,
) {
    if is_spawned_object(&*object) {
        let guid = object.persistent_id().unwrap_or(Guid::NIL);
        if !guid.is_valid() {
            log::debug!(
                "{} has no identity token yet, nothing stored for it",
                object.class_path()
            );
            return;
        }
        let Some(record) = data.spawned.get(&guid) else {
            log::debug!("no stored record for spawned object {guid}");
            return;
        };
        restore_object(
            object,
            &data.metadata,
            StoredRecord::from(record),
            identity,
            ctx,
        );
    } else {
        let name = object.object_name().to_string();
        if name.is_empty() {
            log::debug!(
                "{} has no stable name, nothing stored for it",
                object.class_path()
            );
            return;
        }
        let Some(record) = data.objects.get(&name) else {
            log::debug!("no stored record for level object {name}");
            return;
        };
        restore_object(
            object,
            &data.metadata,
            StoredRecord::from(record),
            identity,
            ctx,
        );
    }
}
