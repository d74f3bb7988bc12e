//! Object-side contract of the persistence engine.
//!
//! A simulation object takes part in save and restore by implementing
//! [`SaveObject`], usually through `#[derive(SaveObject)]`. The trait
//! exposes the object's saved state as a tree of typed properties
//! addressed by index paths, plus optional capability hooks:
//!
//! - [`Spatial`] for packed core data (transform, visibility, velocity),
//! - [`SaveCallbacks`] for lifecycle notifications and a custom blob,
//! - a persistent identity slot for runtime-spawned objects.
//!
//! The engine reaches the live world through [`WorldHost`] and
//! [`LevelHost`], which the host application implements over whatever
//! object storage it uses.

use std::collections::HashMap;

use stasis_core::{ByteReader, ByteWriter, Guid, Quat, Transform, Vec3};

// ---------------------------------------------------------------------------
// Property model
// ---------------------------------------------------------------------------

/// Type of a single saved property.
///
/// The numeric code is part of the stored format; codes are compared
/// against live class layouts to detect schema drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// A property whose type the engine cannot store. Kept in the class
    /// layout so the shape of the type is visible, skipped during capture.
    Unsupported,
    Bool,
    U8,
    I32,
    I64,
    U32,
    U64,
    F32,
    F64,
    String,
    Guid,
    Vec3,
    Quat,
    Transform,
    /// Reference to another save object, persisted as the target's Guid.
    Ref,
    /// Nested struct; child properties live under a nested prefix.
    Struct,
}

impl PropertyKind {
    /// Stable wire code for this kind.
    pub fn code(self) -> u16 {
        match self {
            PropertyKind::Unsupported => 0,
            PropertyKind::Bool => 1,
            PropertyKind::U8 => 2,
            PropertyKind::I32 => 3,
            PropertyKind::I64 => 4,
            PropertyKind::U32 => 5,
            PropertyKind::U64 => 6,
            PropertyKind::F32 => 7,
            PropertyKind::F64 => 8,
            PropertyKind::String => 9,
            PropertyKind::Guid => 10,
            PropertyKind::Vec3 => 11,
            PropertyKind::Quat => 12,
            PropertyKind::Transform => 13,
            PropertyKind::Ref => 14,
            PropertyKind::Struct => 15,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0 => PropertyKind::Unsupported,
            1 => PropertyKind::Bool,
            2 => PropertyKind::U8,
            3 => PropertyKind::I32,
            4 => PropertyKind::I64,
            5 => PropertyKind::U32,
            6 => PropertyKind::U64,
            7 => PropertyKind::F32,
            8 => PropertyKind::F64,
            9 => PropertyKind::String,
            10 => PropertyKind::Guid,
            11 => PropertyKind::Vec3,
            12 => PropertyKind::Quat,
            13 => PropertyKind::Transform,
            14 => PropertyKind::Ref,
            15 => PropertyKind::Struct,
            _ => return None,
        })
    }
}

/// Static description of one saved property.
///
/// For [`PropertyKind::Struct`] properties, `fields` yields the child
/// definitions; for everything else it yields [`no_fields`].
#[derive(Debug, Clone, Copy)]
pub struct PropertyDef {
    pub name: &'static str,
    pub kind: PropertyKind,
    pub fields: fn() -> &'static [PropertyDef],
}

/// Child-definition source for leaf properties.
pub fn no_fields() -> &'static [PropertyDef] {
    &[]
}

/// A single property value in transit between an object and its stored
/// form.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    U8(u8),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Guid(Guid),
    Vec3(Vec3),
    Quat(Quat),
    Transform(Transform),
    Ref(ObjectRef),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Bool(_) => PropertyKind::Bool,
            PropertyValue::U8(_) => PropertyKind::U8,
            PropertyValue::I32(_) => PropertyKind::I32,
            PropertyValue::I64(_) => PropertyKind::I64,
            PropertyValue::U32(_) => PropertyKind::U32,
            PropertyValue::U64(_) => PropertyKind::U64,
            PropertyValue::F32(_) => PropertyKind::F32,
            PropertyValue::F64(_) => PropertyKind::F64,
            PropertyValue::String(_) => PropertyKind::String,
            PropertyValue::Guid(_) => PropertyKind::Guid,
            PropertyValue::Vec3(_) => PropertyKind::Vec3,
            PropertyValue::Quat(_) => PropertyKind::Quat,
            PropertyValue::Transform(_) => PropertyKind::Transform,
            PropertyValue::Ref(_) => PropertyKind::Ref,
        }
    }
}

/// Opaque handle to a live object inside its host level.
///
/// Handles are only meaningful during a single save or load; references
/// between objects are persisted as the target's [`Guid`] and resolved
/// back to handles while restoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectRef(pub u64);

impl ObjectRef {
    /// The null reference. Dangling references restore to this.
    pub const NONE: Self = Self(u64::MAX);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::NONE
    }
}

// ---------------------------------------------------------------------------
// Object traits
// ---------------------------------------------------------------------------

/// Coarse role of a save object, used by the default respawn policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectCategory {
    #[default]
    General,
    PlayerControlled,
    Controller,
    GameRules,
}

/// Whether a runtime-spawned object is respawned by the engine on load.
///
/// `Default` respawns everything except player-controlled objects,
/// controllers and game rules, which the host framework is expected to
/// recreate itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RespawnPolicy {
    #[default]
    Default,
    Always,
    Never,
}

/// A simulation object that takes part in save and restore.
///
/// Properties form a tree addressed by index paths: `path[0]` indexes
/// into [`save_properties`](Self::save_properties), and each further
/// element indexes into the `fields` of the struct property above it.
pub trait SaveObject {
    /// Stable, fully qualified type name. Save data is matched back to
    /// live classes by this string, so renaming a type orphans its data.
    fn class_path(&self) -> &'static str;

    /// Stable name for level-resident objects. Empty for objects that
    /// only exist at runtime.
    fn object_name(&self) -> &str {
        ""
    }

    /// Root property definitions of this class.
    fn save_properties(&self) -> &'static [PropertyDef];

    /// Current value of the property at `path`, or `None` if the path
    /// does not lead to a supported leaf.
    fn read_property(&self, path: &[u16]) -> Option<PropertyValue>;

    /// Store `value` into the property at `path`. `false` if the path is
    /// invalid or the value kind does not match.
    fn write_property(&mut self, path: &[u16], value: &PropertyValue) -> bool;

    /// Persistent identity of a runtime-spawned object.
    ///
    /// `None` means the object has no identity slot and is treated as
    /// level-resident. `Some(Guid::NIL)` means the slot exists but has
    /// not been assigned yet; the engine mints a value during save.
    fn persistent_id(&self) -> Option<Guid> {
        None
    }

    /// Assign the persistent identity. `false` if the object has no
    /// identity slot.
    fn set_persistent_id(&mut self, _id: Guid) -> bool {
        false
    }

    fn category(&self) -> ObjectCategory {
        ObjectCategory::General
    }

    fn respawn_policy(&self) -> RespawnPolicy {
        RespawnPolicy::Default
    }

    /// Access to packed core data, for objects with a spatial presence.
    fn as_spatial(&self) -> Option<&dyn Spatial> {
        None
    }

    fn as_spatial_mut(&mut self) -> Option<&mut dyn Spatial> {
        None
    }

    /// Access to lifecycle hooks and the custom blob.
    fn as_callbacks(&mut self) -> Option<&mut dyn SaveCallbacks> {
        None
    }
}

/// A plain struct stored as a nested property group inside a
/// [`SaveObject`].
pub trait SaveStruct {
    /// Property definitions of this struct's saved fields.
    fn save_fields() -> &'static [PropertyDef];

    /// Read the leaf at `path`, relative to this struct.
    fn read_field(&self, path: &[u16]) -> Option<PropertyValue>;

    /// Write the leaf at `path`, relative to this struct.
    fn write_field(&mut self, path: &[u16], value: &PropertyValue) -> bool;
}

/// Spatial state captured into packed core data.
///
/// Velocity accessors only matter for objects that report themselves as
/// physics bodies; for everything else the defaults are used and the
/// stored velocities are ignored on load.
pub trait Spatial {
    fn transform(&self) -> Transform;
    fn set_transform(&mut self, transform: Transform);

    fn hidden(&self) -> bool {
        false
    }

    fn set_hidden(&mut self, _hidden: bool) {}

    fn is_physics_body(&self) -> bool {
        false
    }

    fn velocity(&self) -> Vec3 {
        Vec3::ZERO
    }

    fn set_velocity(&mut self, _velocity: Vec3) {}

    fn angular_velocity(&self) -> Vec3 {
        Vec3::ZERO
    }

    fn set_angular_velocity(&mut self, _velocity: Vec3) {}
}

/// Lifecycle notifications around an object's save and restore.
///
/// `finalize_save` may append an opaque blob that is handed back to
/// `finalize_load` on restore, after all properties have been applied.
pub trait SaveCallbacks {
    fn pre_save(&mut self) {}

    fn finalize_save(&mut self, _custom: &mut ByteWriter) {}

    fn post_save(&mut self) {}

    fn pre_load(&mut self) {}

    fn finalize_load(&mut self, _custom: &mut ByteReader<'_>) {}

    fn post_load(&mut self) {}
}

// ---------------------------------------------------------------------------
// Host traits
// ---------------------------------------------------------------------------

/// One loaded level of the host world.
pub trait LevelHost {
    /// All save objects currently alive in the level, with their handles.
    fn objects(&mut self) -> Vec<(ObjectRef, &mut dyn SaveObject)>;

    fn object_mut(&mut self, handle: ObjectRef) -> Option<&mut dyn SaveObject>;

    /// Spawn a new instance of `class_path`. `None` if the class is not
    /// registered with the host.
    fn spawn(&mut self, class_path: &str) -> Option<ObjectRef>;

    /// Destroy the level-resident object with the given stable name.
    /// `false` if no such object exists.
    fn destroy(&mut self, name: &str) -> bool;
}

/// The host world: loaded levels plus global (level-independent) objects.
pub trait WorldHost {
    fn level_names(&self) -> Vec<String>;

    fn level(&mut self, name: &str) -> Option<&mut dyn LevelHost>;

    /// Global objects keyed by a stable identifier, saved outside any
    /// level.
    fn global_objects(&mut self) -> Vec<(String, &mut dyn SaveObject)>;
}

// ---------------------------------------------------------------------------
// Class factory
// ---------------------------------------------------------------------------

/// Registry of spawnable classes keyed by class path.
///
/// Hosts typically consult one of these inside [`LevelHost::spawn`] to
/// turn a stored class path back into a live object.
#[derive(Default)]
pub struct ClassFactory {
    makers: HashMap<String, fn() -> Box<dyn SaveObject>>,
}

impl ClassFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under its own class path.
    pub fn register<T>(&mut self)
    where
        T: SaveObject + Default + 'static,
    {
        let class_path = T::default().class_path();
        self.makers.insert(class_path.to_string(), make_boxed::<T>);
    }

    /// Register an explicit constructor, for classes without a usable
    /// `Default`.
    pub fn register_fn(&mut self, class_path: &str, maker: fn() -> Box<dyn SaveObject>) {
        self.makers.insert(class_path.to_string(), maker);
    }

    pub fn contains(&self, class_path: &str) -> bool {
        self.makers.contains_key(class_path)
    }

    pub fn instantiate(&self, class_path: &str) -> Option<Box<dyn SaveObject>> {
        self.makers.get(class_path).map(|maker| maker())
    }
}

fn make_boxed<T: SaveObject + Default + 'static>() -> Box<dyn SaveObject> {
    Box::new(T::default())
}
