//! Wire encoding of property values and packed core data.
//!
//! Values are written without tags; the class def slot they belong to
//! carries the kind. References cross the wire as the target's [`Guid`]
//! and resolve back through the identity map built while restoring a
//! level. Core data carries its own version so the packed layout can
//! evolve independently of the archive format.

use std::collections::HashMap;

use stasis_core::{ByteReader, ByteWriter, Guid, Quat, Transform, Vec3};

use crate::object::{ObjectRef, PropertyKind, PropertyValue, Spatial};

// ---------------------------------------------------------------------------
// Property values
// ---------------------------------------------------------------------------

/// Encode one value. References not present in `ref_guids` are stored as
/// null.
pub fn write_value(
    writer: &mut ByteWriter,
    value: &PropertyValue,
    ref_guids: &HashMap<ObjectRef, Guid>,
) {
    match value {
        PropertyValue::Bool(v) => writer.write_bool(*v),
        PropertyValue::U8(v) => writer.write_u8(*v),
        PropertyValue::I32(v) => writer.write_i32(*v),
        PropertyValue::I64(v) => writer.write_i64(*v),
        PropertyValue::U32(v) => writer.write_u32(*v),
        PropertyValue::U64(v) => writer.write_u64(*v),
        PropertyValue::F32(v) => writer.write_f32(*v),
        PropertyValue::F64(v) => writer.write_f64(*v),
        PropertyValue::String(v) => writer.write_str(v),
        PropertyValue::Guid(v) => writer.write_guid(*v),
        PropertyValue::Vec3(v) => writer.write_vec3(*v),
        PropertyValue::Quat(v) => writer.write_quat(*v),
        PropertyValue::Transform(v) => writer.write_transform(v),
        PropertyValue::Ref(target) => {
            if target.is_none() {
                writer.write_guid(Guid::NIL);
            } else {
                match ref_guids.get(target) {
                    Some(guid) => writer.write_guid(*guid),
                    None => {
                        log::warn!(
                            "reference to an object without a persistent identity, storing null"
                        );
                        writer.write_guid(Guid::NIL);
                    }
                }
            }
        }
    }
}

/// Encode the zero value of `kind`, keeping the record's offsets aligned
/// when the object could not produce a value. Struct and unsupported
/// kinds have no value and write nothing.
pub fn write_default(kind: PropertyKind, writer: &mut ByteWriter) {
    match kind {
        PropertyKind::Bool => writer.write_bool(false),
        PropertyKind::U8 => writer.write_u8(0),
        PropertyKind::I32 => writer.write_i32(0),
        PropertyKind::I64 => writer.write_i64(0),
        PropertyKind::U32 => writer.write_u32(0),
        PropertyKind::U64 => writer.write_u64(0),
        PropertyKind::F32 => writer.write_f32(0.0),
        PropertyKind::F64 => writer.write_f64(0.0),
        PropertyKind::String => writer.write_str(""),
        PropertyKind::Guid => writer.write_guid(Guid::NIL),
        PropertyKind::Vec3 => writer.write_vec3(Vec3::ZERO),
        PropertyKind::Quat => writer.write_quat(Quat::IDENTITY),
        PropertyKind::Transform => writer.write_transform(&Transform::IDENTITY),
        PropertyKind::Ref => writer.write_guid(Guid::NIL),
        PropertyKind::Struct | PropertyKind::Unsupported => {}
    }
}

/// Decode one value of `kind`. References resolve through `identity`;
/// a stored null stays null, a guid with no live object becomes null
/// with a debug note. `None` means the stream is truncated or the kind
/// has no value form.
pub fn read_value(
    kind: PropertyKind,
    reader: &mut ByteReader<'_>,
    identity: &HashMap<Guid, ObjectRef>,
) -> Option<PropertyValue> {
    Some(match kind {
        PropertyKind::Bool => PropertyValue::Bool(reader.read_bool()?),
        PropertyKind::U8 => PropertyValue::U8(reader.read_u8()?),
        PropertyKind::I32 => PropertyValue::I32(reader.read_i32()?),
        PropertyKind::I64 => PropertyValue::I64(reader.read_i64()?),
        PropertyKind::U32 => PropertyValue::U32(reader.read_u32()?),
        PropertyKind::U64 => PropertyValue::U64(reader.read_u64()?),
        PropertyKind::F32 => PropertyValue::F32(reader.read_f32()?),
        PropertyKind::F64 => PropertyValue::F64(reader.read_f64()?),
        PropertyKind::String => PropertyValue::String(reader.read_str()?),
        PropertyKind::Guid => PropertyValue::Guid(reader.read_guid()?),
        PropertyKind::Vec3 => PropertyValue::Vec3(reader.read_vec3()?),
        PropertyKind::Quat => PropertyValue::Quat(reader.read_quat()?),
        PropertyKind::Transform => PropertyValue::Transform(reader.read_transform()?),
        PropertyKind::Ref => {
            let guid = reader.read_guid()?;
            if !guid.is_valid() {
                PropertyValue::Ref(ObjectRef::NONE)
            } else {
                match identity.get(&guid) {
                    Some(&handle) => PropertyValue::Ref(handle),
                    None => {
                        log::debug!("unresolved object reference {guid}, restoring null");
                        PropertyValue::Ref(ObjectRef::NONE)
                    }
                }
            }
        }
        PropertyKind::Struct | PropertyKind::Unsupported => return None,
    })
}

// ---------------------------------------------------------------------------
// Packed core data
// ---------------------------------------------------------------------------

pub const CORE_DATA_VERSION: u16 = 1;

/// Capture the spatial state of an object into its packed core blob.
///
/// Velocities of non-physics objects are stored as zero so the layout is
/// the same for every spatial object.
pub fn write_core_data(spatial: &dyn Spatial) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    writer.write_u16(CORE_DATA_VERSION);
    writer.write_bool(spatial.hidden());
    writer.write_transform(&spatial.transform());
    if spatial.is_physics_body() {
        writer.write_vec3(spatial.velocity());
        writer.write_vec3(spatial.angular_velocity());
    } else {
        writer.write_vec3(Vec3::ZERO);
        writer.write_vec3(Vec3::ZERO);
    }
    writer.into_bytes()
}

/// Apply a packed core blob onto an object.
///
/// Unknown versions and truncated blobs are logged and leave the object
/// untouched. Stored velocities are only applied to physics bodies.
pub fn read_core_data(class_path: &str, bytes: &[u8], spatial: &mut dyn Spatial) {
    let mut reader = ByteReader::new(bytes);
    let Some(version) = reader.read_u16() else {
        log::warn!("truncated core data for {class_path}");
        return;
    };
    if version != CORE_DATA_VERSION {
        log::warn!("unknown core data version {version} for {class_path}, skipping");
        return;
    }
    let Some((hidden, transform, velocity, angular)) = read_core_body(&mut reader) else {
        log::warn!("truncated core data for {class_path}");
        return;
    };
    spatial.set_hidden(hidden);
    spatial.set_transform(transform);
    if spatial.is_physics_body() {
        spatial.set_velocity(velocity);
        spatial.set_angular_velocity(angular);
    }
}

fn read_core_body(reader: &mut ByteReader<'_>) -> Option<(bool, Transform, Vec3, Vec3)> {
    let hidden = reader.read_bool()?;
    let transform = reader.read_transform()?;
    let velocity = reader.read_vec3()?;
    let angular = reader.read_vec3()?;
    Some((hidden, transform, velocity, angular))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Body {
        transform: Transform,
        hidden: bool,
        physics: bool,
        velocity: Vec3,
        angular: Vec3,
    }

    impl Spatial for Body {
        fn transform(&self) -> Transform {
            self.transform
        }

        fn set_transform(&mut self, transform: Transform) {
            self.transform = transform;
        }

        fn hidden(&self) -> bool {
            self.hidden
        }

        fn set_hidden(&mut self, hidden: bool) {
            self.hidden = hidden;
        }

        fn is_physics_body(&self) -> bool {
            self.physics
        }

        fn velocity(&self) -> Vec3 {
            self.velocity
        }

        fn set_velocity(&mut self, velocity: Vec3) {
            self.velocity = velocity;
        }

        fn angular_velocity(&self) -> Vec3 {
            self.angular
        }

        fn set_angular_velocity(&mut self, velocity: Vec3) {
            self.angular = velocity;
        }
    }

    fn round_trip(value: PropertyValue) -> PropertyValue {
        let mut writer = ByteWriter::new();
        write_value(&mut writer, &value, &HashMap::new());
        let bytes = writer.into_bytes();
        let mut reader = ByteReader::new(&bytes);
        read_value(value.kind(), &mut reader, &HashMap::new()).unwrap()
    }

    #[test]
    fn value_round_trips() {
        assert_eq!(round_trip(PropertyValue::Bool(true)), PropertyValue::Bool(true));
        assert_eq!(round_trip(PropertyValue::I64(-9)), PropertyValue::I64(-9));
        assert_eq!(
            round_trip(PropertyValue::String("keycard".to_string())),
            PropertyValue::String("keycard".to_string())
        );
        let guid = Guid::random();
        assert_eq!(round_trip(PropertyValue::Guid(guid)), PropertyValue::Guid(guid));
        assert_eq!(
            round_trip(PropertyValue::Vec3(Vec3::new(1.0, 2.0, 3.0))),
            PropertyValue::Vec3(Vec3::new(1.0, 2.0, 3.0))
        );
    }

    #[test]
    fn reference_round_trips_through_identity() {
        let guid = Guid::random();
        let mut ref_guids = HashMap::new();
        ref_guids.insert(ObjectRef(4), guid);
        let mut writer = ByteWriter::new();
        write_value(&mut writer, &PropertyValue::Ref(ObjectRef(4)), &ref_guids);
        let bytes = writer.into_bytes();

        let mut identity = HashMap::new();
        identity.insert(guid, ObjectRef(17));
        let mut reader = ByteReader::new(&bytes);
        let restored = read_value(PropertyKind::Ref, &mut reader, &identity).unwrap();
        assert_eq!(restored, PropertyValue::Ref(ObjectRef(17)));
    }

    #[test]
    fn unknown_reference_stores_and_restores_null() {
        let mut writer = ByteWriter::new();
        write_value(&mut writer, &PropertyValue::Ref(ObjectRef(8)), &HashMap::new());
        let bytes = writer.into_bytes();
        let mut reader = ByteReader::new(&bytes);
        let restored = read_value(PropertyKind::Ref, &mut reader, &HashMap::new()).unwrap();
        assert_eq!(restored, PropertyValue::Ref(ObjectRef::NONE));
    }

    #[test]
    fn defaults_decode_as_zero_values() {
        let kinds = [
            PropertyKind::Bool,
            PropertyKind::U8,
            PropertyKind::I32,
            PropertyKind::String,
            PropertyKind::Transform,
            PropertyKind::Ref,
        ];
        for kind in kinds {
            let mut writer = ByteWriter::new();
            write_default(kind, &mut writer);
            let bytes = writer.into_bytes();
            let mut reader = ByteReader::new(&bytes);
            let value = read_value(kind, &mut reader, &HashMap::new()).unwrap();
            assert_eq!(value.kind(), kind);
            assert!(reader.is_empty());
        }
    }

    #[test]
    fn core_data_round_trips() {
        let mut body = Body {
            transform: Transform::from_translation(Vec3::new(4.0, 0.0, -2.0)),
            hidden: true,
            physics: true,
            velocity: Vec3::new(0.5, 0.0, 0.0),
            angular: Vec3::new(0.0, 3.0, 0.0),
        };
        let bytes = write_core_data(&body);

        body = Body {
            physics: true,
            ..Body::default()
        };
        read_core_data("tests::Body", &bytes, &mut body);
        assert!(body.hidden);
        assert_eq!(body.transform.translation, Vec3::new(4.0, 0.0, -2.0));
        assert_eq!(body.velocity, Vec3::new(0.5, 0.0, 0.0));
        assert_eq!(body.angular, Vec3::new(0.0, 3.0, 0.0));
    }

    #[test]
    fn velocities_skip_non_physics_bodies() {
        let source = Body {
            physics: true,
            velocity: Vec3::new(9.0, 9.0, 9.0),
            ..Body::default()
        };
        let bytes = write_core_data(&source);

        let mut target = Body::default();
        read_core_data("tests::Body", &bytes, &mut target);
        assert_eq!(target.velocity, Vec3::ZERO);
        assert_eq!(target.angular, Vec3::ZERO);
    }

    #[test]
    fn unknown_core_version_leaves_object_untouched() {
        let mut writer = ByteWriter::new();
        writer.write_u16(CORE_DATA_VERSION + 1);
        writer.write_bool(true);
        let bytes = writer.into_bytes();

        let mut body = Body::default();
        read_core_data("tests::Body", &bytes, &mut body);
        assert!(!body.hidden);
        assert_eq!(body.transform, Transform::IDENTITY);
    }

    #[test]
    fn truncated_core_data_leaves_object_untouched() {
        let full = write_core_data(&Body {
            hidden: true,
            ..Body::default()
        });
        let mut body = Body::default();
        read_core_data("tests::Body", &full[..full.len() / 2], &mut body);
        assert!(!body.hidden);
    }
}
