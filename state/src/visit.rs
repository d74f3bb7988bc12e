//! Depth-first walk over an object's property tree.
//!
//! Capture and both restore paths share one traversal: leaves are handed
//! to the visitor with their index path, struct properties are visited
//! and then descended into under a nested prefix, unsupported properties
//! are reported and skipped. The visitor decides what a visit means
//! (reading, writing, or matching layouts).

use crate::meta::PrefixId;
use crate::object::{PropertyDef, PropertyKind, SaveObject};

/// Receiver for one walk over a property tree.
pub trait PropertyVisitor {
    /// Called for every supported property, struct properties included.
    /// `path` addresses the property from the object root. Returning
    /// `false` aborts the walk.
    fn visit_property(
        &mut self,
        object: &mut dyn SaveObject,
        def: &PropertyDef,
        prefix: PrefixId,
        path: &[u16],
    ) -> bool;

    /// Called for properties the engine cannot store.
    fn unsupported_property(&mut self, object: &dyn SaveObject, def: &PropertyDef, _prefix: PrefixId) {
        log::debug!(
            "skipping unsupported property `{}` of {}",
            def.name,
            object.class_path()
        );
    }

    /// Resolve the prefix for the children of a struct property under
    /// `parent`. `None` skips the subtree and continues the walk.
    fn nested_prefix(&mut self, parent: PrefixId, def: &PropertyDef) -> Option<PrefixId>;
}

/// Walk the whole property tree of `object`. `false` if the visitor
/// aborted.
pub fn visit_save_properties(object: &mut dyn SaveObject, visitor: &mut dyn PropertyVisitor) -> bool {
    let defs = object.save_properties();
    let mut path = Vec::new();
    visit_defs(object, visitor, defs, PrefixId::ROOT, &mut path)
}

fn visit_defs(
    object: &mut dyn SaveObject,
    visitor: &mut dyn PropertyVisitor,
    defs: &'static [PropertyDef],
    prefix: PrefixId,
    path: &mut Vec<u16>,
) -> bool {
    for (index, def) in defs.iter().enumerate() {
        path.push(index as u16);
        let keep_going = match def.kind {
            PropertyKind::Unsupported => {
                visitor.unsupported_property(object, def, prefix);
                true
            }
            PropertyKind::Struct => {
                if !visitor.visit_property(object, def, prefix, path) {
                    path.pop();
                    return false;
                }
                match visitor.nested_prefix(prefix, def) {
                    Some(nested) => visit_defs(object, visitor, (def.fields)(), nested, path),
                    None => true,
                }
            }
            _ => visitor.visit_property(object, def, prefix, path),
        };
        path.pop();
        if !keep_going {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::ClassMetadata;
    use crate::object::{no_fields, PropertyValue, SaveStruct};

    #[derive(Default)]
    struct AmmoBin {
        rounds: i32,
    }

    impl SaveStruct for AmmoBin {
        fn save_fields() -> &'static [PropertyDef] {
            static FIELDS: &[PropertyDef] = &[PropertyDef {
                name: "rounds",
                kind: PropertyKind::I32,
                fields: no_fields,
            }];
            FIELDS
        }

        fn read_field(&self, path: &[u16]) -> Option<PropertyValue> {
            match path {
                [0] => Some(PropertyValue::I32(self.rounds)),
                _ => None,
            }
        }

        fn write_field(&mut self, path: &[u16], value: &PropertyValue) -> bool {
            match (path, value) {
                ([0], PropertyValue::I32(rounds)) => {
                    self.rounds = *rounds;
                    true
                }
                _ => false,
            }
        }
    }

    #[derive(Default)]
    struct Turret {
        yaw: f32,
        ammo: AmmoBin,
    }

    impl SaveObject for Turret {
        fn class_path(&self) -> &'static str {
            "tests::Turret"
        }

        fn save_properties(&self) -> &'static [PropertyDef] {
            static DEFS: &[PropertyDef] = &[
                PropertyDef {
                    name: "yaw",
                    kind: PropertyKind::F32,
                    fields: no_fields,
                },
                PropertyDef {
                    name: "ammo",
                    kind: PropertyKind::Struct,
                    fields: AmmoBin::save_fields,
                },
                PropertyDef {
                    name: "watchers",
                    kind: PropertyKind::Unsupported,
                    fields: no_fields,
                },
            ];
            DEFS
        }

        fn read_property(&self, path: &[u16]) -> Option<PropertyValue> {
            let (first, rest) = path.split_first()?;
            match *first {
                0 if rest.is_empty() => Some(PropertyValue::F32(self.yaw)),
                1 => self.ammo.read_field(rest),
                _ => None,
            }
        }

        fn write_property(&mut self, path: &[u16], value: &PropertyValue) -> bool {
            let Some((first, rest)) = path.split_first() else {
                return false;
            };
            match *first {
                0 if rest.is_empty() => {
                    if let PropertyValue::F32(yaw) = value {
                        self.yaw = *yaw;
                        true
                    } else {
                        false
                    }
                }
                1 => self.ammo.write_field(rest, value),
                _ => false,
            }
        }
    }

    struct Recorder {
        meta: ClassMetadata,
        visited: Vec<(String, Vec<u16>, PrefixId)>,
        unsupported: Vec<String>,
        abort_at: Option<&'static str>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                meta: ClassMetadata::new(),
                visited: Vec::new(),
                unsupported: Vec::new(),
                abort_at: None,
            }
        }
    }

    impl PropertyVisitor for Recorder {
        fn visit_property(
            &mut self,
            _object: &mut dyn SaveObject,
            def: &PropertyDef,
            prefix: PrefixId,
            path: &[u16],
        ) -> bool {
            self.visited
                .push((def.name.to_string(), path.to_vec(), prefix));
            self.abort_at != Some(def.name)
        }

        fn unsupported_property(
            &mut self,
            _object: &dyn SaveObject,
            def: &PropertyDef,
            _prefix: PrefixId,
        ) {
            self.unsupported.push(def.name.to_string());
        }

        fn nested_prefix(&mut self, parent: PrefixId, def: &PropertyDef) -> Option<PrefixId> {
            let property = self.meta.intern_property(def.name);
            Some(self.meta.intern_prefix(parent, property))
        }
    }

    #[test]
    fn walks_depth_first_with_paths() {
        let mut turret = Turret::default();
        let mut recorder = Recorder::new();
        assert!(visit_save_properties(&mut turret, &mut recorder));

        let names: Vec<&str> = recorder.visited.iter().map(|(n, _, _)| n.as_str()).collect();
        assert_eq!(names, ["yaw", "ammo", "rounds"]);
        assert_eq!(recorder.visited[0].1, vec![0]);
        assert_eq!(recorder.visited[1].1, vec![1]);
        assert_eq!(recorder.visited[2].1, vec![1, 0]);
        assert_eq!(recorder.visited[0].2, PrefixId::ROOT);
        assert_ne!(recorder.visited[2].2, PrefixId::ROOT);
        assert_eq!(recorder.unsupported, ["watchers"]);
    }

    #[test]
    fn abort_stops_the_walk() {
        let mut turret = Turret::default();
        let mut recorder = Recorder::new();
        recorder.abort_at = Some("ammo");
        assert!(!visit_save_properties(&mut turret, &mut recorder));
        let names: Vec<&str> = recorder.visited.iter().map(|(n, _, _)| n.as_str()).collect();
        assert_eq!(names, ["yaw", "ammo"]);
    }

    #[test]
    fn skipped_subtree_continues_walk() {
        struct SkipStructs {
            visited: Vec<String>,
        }
        impl PropertyVisitor for SkipStructs {
            fn visit_property(
                &mut self,
                _object: &mut dyn SaveObject,
                def: &PropertyDef,
                _prefix: PrefixId,
                _path: &[u16],
            ) -> bool {
                self.visited.push(def.name.to_string());
                true
            }

            fn nested_prefix(&mut self, _parent: PrefixId, _def: &PropertyDef) -> Option<PrefixId> {
                None
            }
        }

        let mut turret = Turret::default();
        let mut visitor = SkipStructs { visited: Vec::new() };
        assert!(visit_save_properties(&mut turret, &mut visitor));
        assert_eq!(visitor.visited, ["yaw", "ammo"]);
    }
}
