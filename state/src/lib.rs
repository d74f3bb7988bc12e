//! # Stasis State
//!
//! Snapshot and restore engine for simulation object graphs: capture the
//! persistable state of live levels into an in-memory save, serialize it
//! to a chunked archive, and replay it onto freshly loaded levels, with
//! tolerance for class layouts that changed between save and load.
//!
//! ## Object Model
//!
//! - [`SaveObject`] — Reflective persistence contract, usually derived
//! - [`SaveStruct`] — Nested plain-struct fields inside a [`SaveObject`]
//! - [`Spatial`] — Transform, hidden flag and physics velocities
//! - [`SaveCallbacks`] — Lifecycle hooks and the opaque custom blob
//! - [`ObjectRef`] — Host object handle; cross-references persist as guids
//! - [`ClassFactory`] — Turns stored class paths back into live objects
//!
//! ## Hosts
//!
//! - [`LevelHost`] / [`WorldHost`] — The simulation side of the contract:
//!   enumerate, spawn and destroy live objects
//!
//! ## Save State
//!
//! - [`SaveState`] — One save in memory: capture, archive I/O, restore
//! - [`SaveData`] / [`LevelData`] — The stored tree, one entry per level
//! - [`ClassMetadata`] — Interned names and per-class property layouts
//! - [`SaveSubsystem`] — Slot files, session state machine, streaming levels

pub mod archive;
mod codec;
mod data;
#[cfg(feature = "serialize-ron")]
pub mod dump;
mod error;
mod meta;
mod object;
mod restore;
mod snapshot;
mod state;
pub mod subsystem;
mod visit;

pub use data::{
    GlobalData, LevelData, NamedObjectData, PropertyData, SaveData, SaveInfo, SpawnedObjectData,
};
pub use error::{ArchiveError, SaveError};
pub use meta::{
    ClassDef, ClassId, ClassMetadata, PrefixEntry, PrefixId, PropertyId, StoredProperty,
};
pub use object::{
    no_fields, ClassFactory, LevelHost, ObjectCategory, ObjectRef, PropertyDef, PropertyKind,
    PropertyValue, RespawnPolicy, SaveCallbacks, SaveObject, SaveStruct, Spatial, WorldHost,
};
pub use restore::{class_matches_live, restore_object, RestoreContext, StoredRecord};
pub use snapshot::{capture_named, capture_properties, capture_spawned};
pub use state::{is_spawned_object, SaveState};
pub use state_macro::{SaveObject, SaveStruct};
pub use subsystem::{SaveSlot, SaveSubsystem, SystemState};
pub use visit::{visit_save_properties, PropertyVisitor};

pub use stasis_core::{ByteReader, ByteWriter, Guid, Quat, Transform, Vec3};
