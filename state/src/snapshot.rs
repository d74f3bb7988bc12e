//! Object capture into stored records.
//!
//! One walk over the property tree interns names and class def slots as
//! a side effect, so the first captured object of a class defines its
//! stored layout and later captures reuse the same slots. Values land in
//! a packed blob with a per-slot offset table; slots the object cannot
//! produce get a default value so the record stays aligned with the def.

use std::collections::HashMap;

use stasis_core::{ByteWriter, Guid};

use crate::codec::{write_core_data, write_default, write_value};
use crate::data::{NamedObjectData, PropertyData, SpawnedObjectData};
use crate::meta::{ClassId, ClassMetadata, PrefixId};
use crate::object::{ObjectRef, PropertyDef, PropertyKind, SaveObject};
use crate::visit::{visit_save_properties, PropertyVisitor};

struct SnapshotVisitor<'a> {
    meta: &'a mut ClassMetadata,
    class_id: ClassId,
    ref_guids: &'a HashMap<ObjectRef, Guid>,
    writer: ByteWriter,
    offsets: Vec<u32>,
}

impl SnapshotVisitor<'_> {
    fn record_offset(&mut self, slot: u32) {
        let slot = slot as usize;
        if self.offsets.len() <= slot {
            self.offsets.resize(slot + 1, PropertyData::NO_OFFSET);
        }
        self.offsets[slot] = self.writer.len() as u32;
    }
}

impl PropertyVisitor for SnapshotVisitor<'_> {
    fn visit_property(
        &mut self,
        object: &mut dyn SaveObject,
        def: &PropertyDef,
        prefix: PrefixId,
        path: &[u16],
    ) -> bool {
        let property = self.meta.intern_property(def.name);
        let Some(class_def) = self.meta.class_def_mut(self.class_id) else {
            log::error!("class def missing for {}", object.class_path());
            return false;
        };
        let slot = class_def.find_or_add(prefix, property, def.kind.code());
        self.record_offset(slot);
        if def.kind == PropertyKind::Struct {
            return true;
        }
        match object.read_property(path) {
            Some(value) if value.kind() == def.kind => {
                write_value(&mut self.writer, &value, self.ref_guids);
            }
            Some(value) => {
                log::warn!(
                    "property `{}` of {} produced a {:?} value, expected {:?}, storing default",
                    def.name,
                    object.class_path(),
                    value.kind(),
                    def.kind
                );
                write_default(def.kind, &mut self.writer);
            }
            None => {
                log::warn!(
                    "could not read property `{}` of {}, storing default",
                    def.name,
                    object.class_path()
                );
                write_default(def.kind, &mut self.writer);
            }
        }
        true
    }

    fn nested_prefix(&mut self, parent: PrefixId, def: &PropertyDef) -> Option<PrefixId> {
        let property = self.meta.intern_property(def.name);
        Some(self.meta.intern_prefix(parent, property))
    }
}

/// Capture the property tree of `object` into a packed record, interning
/// names and def slots into `meta` as a side effect.
pub fn capture_properties(
    object: &mut dyn SaveObject,
    meta: &mut ClassMetadata,
    class_id: ClassId,
    ref_guids: &HashMap<ObjectRef, Guid>,
) -> PropertyData {
    let mut visitor = SnapshotVisitor {
        meta,
        class_id,
        ref_guids,
        writer: ByteWriter::new(),
        offsets: Vec::new(),
    };
    visit_save_properties(object, &mut visitor);
    PropertyData {
        blob: visitor.writer.into_bytes(),
        offsets: visitor.offsets,
    }
}

/// Capture a complete object record: core data, properties and the
/// custom blob, with lifecycle hooks in save order.
pub fn capture_named(
    object: &mut dyn SaveObject,
    meta: &mut ClassMetadata,
    ref_guids: &HashMap<ObjectRef, Guid>,
) -> NamedObjectData {
    let class_id = meta.find_or_add_class_def(object.class_path());
    if let Some(callbacks) = object.as_callbacks() {
        callbacks.pre_save();
    }
    let core = match object.as_spatial() {
        Some(spatial) => write_core_data(spatial),
        None => Vec::new(),
    };
    let properties = capture_properties(object, meta, class_id, ref_guids);
    let mut custom = ByteWriter::new();
    if let Some(callbacks) = object.as_callbacks() {
        callbacks.finalize_save(&mut custom);
    }
    let record = NamedObjectData {
        class_id,
        core,
        properties,
        custom: custom.into_bytes(),
    };
    if let Some(callbacks) = object.as_callbacks() {
        callbacks.post_save();
    }
    record
}

/// Capture a runtime-spawned object under its persistent identity.
pub fn capture_spawned(
    object: &mut dyn SaveObject,
    meta: &mut ClassMetadata,
    ref_guids: &HashMap<ObjectRef, Guid>,
    guid: Guid,
) -> SpawnedObjectData {
    let record = capture_named(object, meta, ref_guids);
    SpawnedObjectData {
        guid,
        class_id: record.class_id,
        core: record.core,
        properties: record.properties,
        custom: record.custom,
    }
}
