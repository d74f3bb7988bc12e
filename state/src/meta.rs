//! Per-save class metadata.
//!
//! Property names, class paths and nested prefixes are interned once per
//! save into index tables; object records refer to them by [`ClassId`],
//! [`PropertyId`] and [`PrefixId`]. A [`ClassDef`] lists the stored slots
//! of one class in capture order, which is what restore compares against
//! the live class layout to pick the lockstep or name-based path.

use std::collections::HashMap;

use serde::Serialize;

/// Index of a class path in the metadata's class table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, bytemuck::Pod, bytemuck::Zeroable,
)]
#[repr(C)]
pub struct ClassId(pub u32);

/// Index of a property name in the metadata's name table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, bytemuck::Pod, bytemuck::Zeroable,
)]
#[repr(C)]
pub struct PropertyId(pub u32);

/// Index of a nested prefix in the metadata's prefix table.
///
/// A prefix names the chain of struct properties above a leaf, so the
/// same property name can appear once per nesting level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, bytemuck::Pod, bytemuck::Zeroable,
)]
#[repr(C)]
pub struct PrefixId(pub u32);

impl PrefixId {
    /// The top level of an object's property tree. Index 0 of the prefix
    /// table is a placeholder so stored indices stay aligned.
    pub const ROOT: Self = Self(0);
}

/// One entry of the nested prefix table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrefixEntry {
    pub parent: PrefixId,
    pub property: PropertyId,
}

const ROOT_PLACEHOLDER: PrefixEntry = PrefixEntry {
    parent: PrefixId::ROOT,
    property: PropertyId(0),
};

// ---------------------------------------------------------------------------
// Class definitions
// ---------------------------------------------------------------------------

/// One stored property slot of a class.
///
/// The kind is kept as its raw wire code so defs written by a newer build
/// survive a round trip through an older one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoredProperty {
    pub prefix: PrefixId,
    pub property: PropertyId,
    pub kind: u16,
}

/// Stored layout of one class, in the order its slots were first
/// captured.
///
/// A slot is identified by `(prefix, property)`; its kind is fixed by the
/// first capture and never updated, so records written earlier in the
/// same save stay readable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassDef {
    pub class_id: ClassId,
    pub properties: Vec<StoredProperty>,
    #[serde(skip)]
    lookup: HashMap<(PrefixId, PropertyId), u32>,
}

impl ClassDef {
    pub fn new(class_id: ClassId) -> Self {
        Self {
            class_id,
            properties: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    /// Slot index of `(prefix, property)`, adding a new slot with the
    /// given kind code if the pair is not present yet.
    pub fn find_or_add(&mut self, prefix: PrefixId, property: PropertyId, kind: u16) -> u32 {
        if let Some(&slot) = self.lookup.get(&(prefix, property)) {
            return slot;
        }
        let slot = self.properties.len() as u32;
        self.properties.push(StoredProperty {
            prefix,
            property,
            kind,
        });
        self.lookup.insert((prefix, property), slot);
        slot
    }

    pub fn index_of(&self, prefix: PrefixId, property: PropertyId) -> Option<u32> {
        self.lookup.get(&(prefix, property)).copied()
    }

    pub fn rebuild_lookup(&mut self) {
        self.lookup = self
            .properties
            .iter()
            .enumerate()
            .map(|(slot, stored)| ((stored.prefix, stored.property), slot as u32))
            .collect();
    }
}

// ---------------------------------------------------------------------------
// Metadata tables
// ---------------------------------------------------------------------------

/// Interned class, property and prefix tables for one save scope.
///
/// Each level carries its own metadata, as does the global object set.
/// Lookup maps are rebuilt after decoding; only the index tables are
/// stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetadata {
    class_names: Vec<String>,
    class_defs: Vec<ClassDef>,
    property_names: Vec<String>,
    prefixes: Vec<PrefixEntry>,
    #[serde(skip)]
    class_lookup: HashMap<String, ClassId>,
    #[serde(skip)]
    property_lookup: HashMap<String, PropertyId>,
    #[serde(skip)]
    prefix_lookup: HashMap<(PrefixId, PropertyId), PrefixId>,
}

impl ClassMetadata {
    pub fn new() -> Self {
        Self {
            class_names: Vec::new(),
            class_defs: Vec::new(),
            property_names: Vec::new(),
            prefixes: vec![ROOT_PLACEHOLDER],
            class_lookup: HashMap::new(),
            property_lookup: HashMap::new(),
            prefix_lookup: HashMap::new(),
        }
    }

    /// Rebuild a metadata set from decoded tables.
    pub fn from_parts(
        class_names: Vec<String>,
        class_defs: Vec<ClassDef>,
        property_names: Vec<String>,
        prefixes: Vec<PrefixEntry>,
    ) -> Self {
        let mut meta = Self {
            class_names,
            class_defs,
            property_names,
            prefixes,
            class_lookup: HashMap::new(),
            property_lookup: HashMap::new(),
            prefix_lookup: HashMap::new(),
        };
        if meta.prefixes.is_empty() {
            meta.prefixes.push(ROOT_PLACEHOLDER);
        }
        meta.rebuild_lookups();
        meta
    }

    pub fn rebuild_lookups(&mut self) {
        self.class_lookup = self
            .class_names
            .iter()
            .enumerate()
            .map(|(index, name)| (name.clone(), ClassId(index as u32)))
            .collect();
        self.property_lookup = self
            .property_names
            .iter()
            .enumerate()
            .map(|(index, name)| (name.clone(), PropertyId(index as u32)))
            .collect();
        self.prefix_lookup = self
            .prefixes
            .iter()
            .enumerate()
            .skip(1)
            .map(|(index, entry)| ((entry.parent, entry.property), PrefixId(index as u32)))
            .collect();
        for def in &mut self.class_defs {
            def.rebuild_lookup();
        }
    }

    /// Class ID for `class_path`, adding an empty [`ClassDef`] if the
    /// class has not been seen in this save yet.
    pub fn find_or_add_class_def(&mut self, class_path: &str) -> ClassId {
        if let Some(&id) = self.class_lookup.get(class_path) {
            return id;
        }
        let id = ClassId(self.class_names.len() as u32);
        self.class_names.push(class_path.to_string());
        self.class_defs.push(ClassDef::new(id));
        self.class_lookup.insert(class_path.to_string(), id);
        id
    }

    pub fn class_id(&self, class_path: &str) -> Option<ClassId> {
        self.class_lookup.get(class_path).copied()
    }

    pub fn class_name(&self, id: ClassId) -> Option<&str> {
        self.class_names.get(id.0 as usize).map(|s| s.as_str())
    }

    pub fn class_def(&self, id: ClassId) -> Option<&ClassDef> {
        self.class_defs.get(id.0 as usize)
    }

    pub fn class_def_mut(&mut self, id: ClassId) -> Option<&mut ClassDef> {
        self.class_defs.get_mut(id.0 as usize)
    }

    /// Intern a property name, returning its ID.
    pub fn intern_property(&mut self, name: &str) -> PropertyId {
        if let Some(&id) = self.property_lookup.get(name) {
            return id;
        }
        let id = PropertyId(self.property_names.len() as u32);
        self.property_names.push(name.to_string());
        self.property_lookup.insert(name.to_string(), id);
        id
    }

    pub fn property_id(&self, name: &str) -> Option<PropertyId> {
        self.property_lookup.get(name).copied()
    }

    pub fn property_name(&self, id: PropertyId) -> Option<&str> {
        self.property_names.get(id.0 as usize).map(|s| s.as_str())
    }

    /// Prefix ID for a struct property under `parent`, adding a table
    /// entry on first use.
    pub fn intern_prefix(&mut self, parent: PrefixId, property: PropertyId) -> PrefixId {
        if let Some(&id) = self.prefix_lookup.get(&(parent, property)) {
            return id;
        }
        let id = PrefixId(self.prefixes.len() as u32);
        self.prefixes.push(PrefixEntry { parent, property });
        self.prefix_lookup.insert((parent, property), id);
        id
    }

    pub fn prefix_id(&self, parent: PrefixId, property: PropertyId) -> Option<PrefixId> {
        self.prefix_lookup.get(&(parent, property)).copied()
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn class_defs(&self) -> &[ClassDef] {
        &self.class_defs
    }

    pub fn property_names(&self) -> &[String] {
        &self.property_names
    }

    pub fn prefixes(&self) -> &[PrefixEntry] {
        &self.prefixes
    }
}

impl Default for ClassMetadata {
    fn default() -> Self {
        Self::new()
    }
}
