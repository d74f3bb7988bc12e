//! Stored records back onto live objects.
//!
//! Restore picks one of two paths per class. When the stored class def
//! matches the live property tree slot for slot, values are read in
//! lockstep with a single walk and no lookups. Any drift between the
//! stored layout and the live one drops the class to a name-based path
//! that resolves each live property against the stored def and reads its
//! value through the offset table. The choice is made once per class and
//! cached for the rest of the load.

use std::collections::HashMap;

use stasis_core::{ByteReader, Guid};

use crate::codec::{read_core_data, read_value};
use crate::data::{NamedObjectData, PropertyData, SpawnedObjectData};
use crate::meta::{ClassDef, ClassId, ClassMetadata, PrefixId, PropertyId};
use crate::object::{ObjectRef, PropertyDef, PropertyKind, SaveObject};
use crate::visit::{visit_save_properties, PropertyVisitor};

// ---------------------------------------------------------------------------
// Layout matching
// ---------------------------------------------------------------------------

/// Whether the stored def lists exactly the slots the live property tree
/// would produce, in the same order and with the same kinds.
pub fn class_matches_live(
    meta: &ClassMetadata,
    class_def: &ClassDef,
    defs: &'static [PropertyDef],
) -> bool {
    let mut next = 0usize;
    if !sequence_matches(meta, class_def, defs, PrefixId::ROOT, &mut next) {
        return false;
    }
    next == class_def.properties.len()
}

fn sequence_matches(
    meta: &ClassMetadata,
    class_def: &ClassDef,
    defs: &'static [PropertyDef],
    prefix: PrefixId,
    next: &mut usize,
) -> bool {
    for def in defs {
        if def.kind == PropertyKind::Unsupported {
            continue;
        }
        let Some(property) = meta.property_id(def.name) else {
            return false;
        };
        if !slot_matches(class_def, *next, prefix, property, def.kind.code()) {
            return false;
        }
        *next += 1;
        if def.kind == PropertyKind::Struct {
            let Some(nested) = meta.prefix_id(prefix, property) else {
                return false;
            };
            if !sequence_matches(meta, class_def, (def.fields)(), nested, next) {
                return false;
            }
        }
    }
    true
}

fn slot_matches(
    class_def: &ClassDef,
    index: usize,
    prefix: PrefixId,
    property: PropertyId,
    kind: u16,
) -> bool {
    match class_def.properties.get(index) {
        Some(stored) => {
            stored.prefix == prefix && stored.property == property && stored.kind == kind
        }
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Restore visitors
// ---------------------------------------------------------------------------

/// Lockstep restore: values sit in the blob in exactly the order the
/// live tree walks them.
struct FastRestoreVisitor<'a> {
    meta: &'a ClassMetadata,
    reader: ByteReader<'a>,
    identity: &'a HashMap<Guid, ObjectRef>,
}

impl PropertyVisitor for FastRestoreVisitor<'_> {
    fn visit_property(
        &mut self,
        object: &mut dyn SaveObject,
        def: &PropertyDef,
        _prefix: PrefixId,
        path: &[u16],
    ) -> bool {
        if def.kind == PropertyKind::Struct {
            return true;
        }
        match read_value(def.kind, &mut self.reader, self.identity) {
            Some(value) => {
                if !object.write_property(path, &value) {
                    log::warn!(
                        "could not write property `{}` of {}",
                        def.name,
                        object.class_path()
                    );
                }
                true
            }
            None => {
                log::warn!(
                    "stored data for {} ended early at `{}`, aborting lockstep restore",
                    object.class_path(),
                    def.name
                );
                false
            }
        }
    }

    fn nested_prefix(&mut self, parent: PrefixId, def: &PropertyDef) -> Option<PrefixId> {
        self.meta
            .property_id(def.name)
            .and_then(|property| self.meta.prefix_id(parent, property))
    }
}

/// Name-based restore: each live property is resolved against the stored
/// def and read through the offset table. Stored slots with no live
/// counterpart are ignored, live properties with no stored slot keep
/// their current value.
struct SlowRestoreVisitor<'a> {
    meta: &'a ClassMetadata,
    class_def: &'a ClassDef,
    properties: &'a PropertyData,
    identity: &'a HashMap<Guid, ObjectRef>,
}

impl PropertyVisitor for SlowRestoreVisitor<'_> {
    fn visit_property(
        &mut self,
        object: &mut dyn SaveObject,
        def: &PropertyDef,
        prefix: PrefixId,
        path: &[u16],
    ) -> bool {
        if def.kind == PropertyKind::Struct {
            return true;
        }
        let slot = self
            .meta
            .property_id(def.name)
            .and_then(|property| self.class_def.index_of(prefix, property));
        let Some(slot) = slot else {
            log::debug!(
                "property `{}` of {} has no stored value",
                def.name,
                object.class_path()
            );
            return true;
        };
        let Some(stored) = self.class_def.properties.get(slot as usize) else {
            return true;
        };
        if stored.kind != def.kind.code() {
            log::warn!(
                "property `{}` of {} changed type since the save (stored kind {}, live {:?}), skipping",
                def.name,
                object.class_path(),
                stored.kind,
                def.kind
            );
            return true;
        }
        let Some(offset) = self.properties.offset_of(slot) else {
            log::debug!(
                "property `{}` of {} has no value in this record",
                def.name,
                object.class_path()
            );
            return true;
        };
        let Some(tail) = self.properties.blob.get(offset..) else {
            log::warn!(
                "stored offset out of range for `{}` of {}",
                def.name,
                object.class_path()
            );
            return true;
        };
        let mut reader = ByteReader::new(tail);
        match read_value(def.kind, &mut reader, self.identity) {
            Some(value) => {
                if !object.write_property(path, &value) {
                    log::warn!(
                        "could not write property `{}` of {}",
                        def.name,
                        object.class_path()
                    );
                }
            }
            None => {
                log::warn!(
                    "stored value truncated for `{}` of {}",
                    def.name,
                    object.class_path()
                );
            }
        }
        true
    }

    fn nested_prefix(&mut self, parent: PrefixId, def: &PropertyDef) -> Option<PrefixId> {
        let prefix = self
            .meta
            .property_id(def.name)
            .and_then(|property| self.meta.prefix_id(parent, property));
        if prefix.is_none() {
            log::debug!("struct `{}` has no stored children, keeping live values", def.name);
        }
        prefix
    }
}

// ---------------------------------------------------------------------------
// Restore entry points
// ---------------------------------------------------------------------------

/// Per-load cache of the restore path chosen for each class.
#[derive(Debug, Default)]
pub struct RestoreContext {
    strategies: HashMap<ClassId, bool>,
}

impl RestoreContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether records of `class_id` can be restored in lockstep with
    /// the live layout of `object`. Computed once per class per load.
    pub fn use_fast_path(
        &mut self,
        meta: &ClassMetadata,
        class_id: ClassId,
        object: &dyn SaveObject,
    ) -> bool {
        if let Some(&fast) = self.strategies.get(&class_id) {
            return fast;
        }
        let fast = match meta.class_def(class_id) {
            Some(def) => class_matches_live(meta, def, object.save_properties()),
            None => false,
        };
        if !fast {
            if let Some(name) = meta.class_name(class_id) {
                log::debug!("schema drift detected for {name}, using name-based restore");
            }
        }
        self.strategies.insert(class_id, fast);
        fast
    }
}

/// Borrowed view of one stored object record, named or spawned.
#[derive(Clone, Copy)]
pub struct StoredRecord<'a> {
    pub class_id: ClassId,
    pub core: &'a [u8],
    pub properties: &'a PropertyData,
    pub custom: &'a [u8],
}

impl<'a> From<&'a NamedObjectData> for StoredRecord<'a> {
    fn from(record: &'a NamedObjectData) -> Self {
        Self {
            class_id: record.class_id,
            core: &record.core,
            properties: &record.properties,
            custom: &record.custom,
        }
    }
}

impl<'a> From<&'a SpawnedObjectData> for StoredRecord<'a> {
    fn from(record: &'a SpawnedObjectData) -> Self {
        Self {
            class_id: record.class_id,
            core: &record.core,
            properties: &record.properties,
            custom: &record.custom,
        }
    }
}

/// Apply one stored record onto a live object: lifecycle hooks, core
/// data, properties, custom blob.
///
/// A record whose class def is missing from the metadata still applies
/// its core and custom blobs; only the property tree is skipped.
pub fn restore_object(
    object: &mut dyn SaveObject,
    meta: &ClassMetadata,
    record: StoredRecord<'_>,
    identity: &HashMap<Guid, ObjectRef>,
    ctx: &mut RestoreContext,
) {
    let class_path = object.class_path();
    if let Some(callbacks) = object.as_callbacks() {
        callbacks.pre_load();
    }
    if !record.core.is_empty() {
        match object.as_spatial_mut() {
            Some(spatial) => read_core_data(class_path, record.core, spatial),
            None => log::debug!("stored core data for non-spatial {class_path}, ignoring"),
        }
    }
    match meta.class_def(record.class_id) {
        Some(class_def) => {
            if ctx.use_fast_path(meta, record.class_id, &*object) {
                let mut visitor = FastRestoreVisitor {
                    meta,
                    reader: ByteReader::new(&record.properties.blob),
                    identity,
                };
                visit_save_properties(object, &mut visitor);
            } else {
                let mut visitor = SlowRestoreVisitor {
                    meta,
                    class_def,
                    properties: record.properties,
                    identity,
                };
                visit_save_properties(object, &mut visitor);
            }
        }
        None => {
            log::warn!("stored record for {class_path} has no class def, skipping properties");
        }
    }
    if let Some(callbacks) = object.as_callbacks() {
        let mut reader = ByteReader::new(record.custom);
        callbacks.finalize_load(&mut reader);
        callbacks.post_load();
    }
}
