#![allow(dead_code)]

use std::collections::HashMap;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use stasis_state::{
    archive, capture_named, no_fields, restore_object, ClassMetadata, LevelData, PropertyDef,
    PropertyKind, PropertyValue, RestoreContext, SaveData, SaveObject, StoredRecord, Vec3,
};

// ---------------------------------------------------------------------------
// Helper object types
// ---------------------------------------------------------------------------

#[derive(Default, SaveObject)]
struct Soldier {
    #[save(name)]
    name: String,
    #[save]
    health: i32,
    #[save]
    stamina: f32,
    #[save]
    position: Vec3,
    #[save]
    rank: u32,
    #[save]
    call_sign: String,
}

fn soldier(i: u32) -> Soldier {
    Soldier {
        name: format!("Soldier_{i}"),
        health: 100 - (i % 50) as i32,
        stamina: 0.5 + (i % 10) as f32 * 0.05,
        position: Vec3::new(i as f32, 0.0, -(i as f32)),
        rank: i % 6,
        call_sign: format!("unit-{i}"),
    }
}

/// The soldier class as a later build sees it: fields reordered, one
/// dropped, one added. Shares the stored class path, so restoring into
/// it exercises the name-based path.
#[derive(Default)]
struct DriftedSoldier {
    rank: u32,
    health: i32,
    position: Vec3,
    morale: f32,
}

impl SaveObject for DriftedSoldier {
    fn class_path(&self) -> &'static str {
        "state_benchmarks::Soldier"
    }

    fn save_properties(&self) -> &'static [PropertyDef] {
        static DEFS: &[PropertyDef] = &[
            PropertyDef {
                name: "rank",
                kind: PropertyKind::U32,
                fields: no_fields,
            },
            PropertyDef {
                name: "health",
                kind: PropertyKind::I32,
                fields: no_fields,
            },
            PropertyDef {
                name: "position",
                kind: PropertyKind::Vec3,
                fields: no_fields,
            },
            PropertyDef {
                name: "morale",
                kind: PropertyKind::F32,
                fields: no_fields,
            },
        ];
        DEFS
    }

    fn read_property(&self, path: &[u16]) -> Option<PropertyValue> {
        match path {
            [0] => Some(PropertyValue::U32(self.rank)),
            [1] => Some(PropertyValue::I32(self.health)),
            [2] => Some(PropertyValue::Vec3(self.position)),
            [3] => Some(PropertyValue::F32(self.morale)),
            _ => None,
        }
    }

    fn write_property(&mut self, path: &[u16], value: &PropertyValue) -> bool {
        match (path, value) {
            ([0], PropertyValue::U32(rank)) => {
                self.rank = *rank;
                true
            }
            ([1], PropertyValue::I32(health)) => {
                self.health = *health;
                true
            }
            ([2], PropertyValue::Vec3(position)) => {
                self.position = *position;
                true
            }
            ([3], PropertyValue::F32(morale)) => {
                self.morale = *morale;
                true
            }
            _ => false,
        }
    }
}

fn captured_level(count: u32) -> LevelData {
    let mut data = LevelData::new("barracks");
    let refs = HashMap::new();
    for i in 0..count {
        let mut object = soldier(i);
        let record = capture_named(&mut object, &mut data.metadata, &refs);
        data.objects.insert(object.name.clone(), record);
    }
    data
}

fn captured_save(count: u32) -> SaveData {
    let mut save = SaveData::new();
    *save.level_mut("barracks") = captured_level(count);
    save
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

fn bench_capture_1k(c: &mut Criterion) {
    c.bench_function("capture_1k_objects", |b| {
        b.iter_batched(
            || {
                let objects: Vec<_> = (0..1_000).map(soldier).collect();
                (objects, ClassMetadata::new())
            },
            |(mut objects, mut meta)| {
                let refs = HashMap::new();
                for object in &mut objects {
                    black_box(capture_named(object, &mut meta, &refs));
                }
            },
            BatchSize::SmallInput,
        );
    });
}

// ---------------------------------------------------------------------------
// Restore
// ---------------------------------------------------------------------------

fn bench_restore_1k_lockstep(c: &mut Criterion) {
    let mut meta = ClassMetadata::new();
    let refs = HashMap::new();
    let mut source = soldier(7);
    let record = capture_named(&mut source, &mut meta, &refs);

    c.bench_function("restore_1k_objects_lockstep", |b| {
        b.iter_batched(
            || (0..1_000).map(soldier).collect::<Vec<_>>(),
            |mut fresh| {
                let mut ctx = RestoreContext::new();
                let identity = HashMap::new();
                for target in &mut fresh {
                    restore_object(
                        target,
                        &meta,
                        StoredRecord::from(&record),
                        &identity,
                        &mut ctx,
                    );
                }
                black_box(fresh);
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_restore_1k_name_based(c: &mut Criterion) {
    let mut meta = ClassMetadata::new();
    let refs = HashMap::new();
    let mut source = soldier(7);
    let record = capture_named(&mut source, &mut meta, &refs);

    c.bench_function("restore_1k_objects_name_based", |b| {
        b.iter_batched(
            || (0..1_000).map(|_| DriftedSoldier::default()).collect::<Vec<_>>(),
            |mut fresh| {
                let mut ctx = RestoreContext::new();
                let identity = HashMap::new();
                for target in &mut fresh {
                    restore_object(
                        target,
                        &meta,
                        StoredRecord::from(&record),
                        &identity,
                        &mut ctx,
                    );
                }
                black_box(fresh);
            },
            BatchSize::SmallInput,
        );
    });
}

// ---------------------------------------------------------------------------
// Archive
// ---------------------------------------------------------------------------

fn bench_archive_write_1k(c: &mut Criterion) {
    let save = captured_save(1_000);
    c.bench_function("archive_write_1k_records", |b| {
        b.iter(|| {
            let mut bytes = Vec::new();
            archive::write_save(&mut bytes, &save).unwrap();
            black_box(bytes);
        });
    });
}

fn bench_archive_read_1k(c: &mut Criterion) {
    let save = captured_save(1_000);
    let mut bytes = Vec::new();
    archive::write_save(&mut bytes, &save).unwrap();

    c.bench_function("archive_read_1k_records", |b| {
        b.iter(|| {
            let decoded = archive::read_save(&mut bytes.as_slice()).unwrap();
            black_box(decoded);
        });
    });
}

fn bench_header_peek(c: &mut Criterion) {
    let save = captured_save(1_000);
    let mut bytes = Vec::new();
    archive::write_save(&mut bytes, &save).unwrap();

    c.bench_function("archive_peek_info_1k_records", |b| {
        b.iter(|| {
            let info = archive::read_save_info(&mut bytes.as_slice()).unwrap();
            black_box(info);
        });
    });
}

criterion_group!(
    benches,
    bench_capture_1k,
    bench_restore_1k_lockstep,
    bench_restore_1k_name_based,
    bench_archive_write_1k,
    bench_archive_read_1k,
    bench_header_peek,
);
criterion_main!(benches);
