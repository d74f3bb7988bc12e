//! Chunked save archive encoding.
//!
//! A save file is a little-endian stream:
//!
//! ```text
//! "STSV" | format version (u32) | chunk...
//! chunk := id (4 bytes) | payload length (u32) | payload
//! ```
//!
//! Top-level chunks are `INFO` (title and timestamp), `GLOB` (global
//! objects) and one `LEVL` per stored level. `GLOB` and `LEVL` payloads
//! are themselves chunk streams carrying `META` (interned name tables and
//! class defs), `OBJS`, `SPWN` and `DSTR`. Unknown chunk ids are skipped
//! at every nesting level, so files written by a newer build with extra
//! chunks still load. [`read_save_info`] reads only as far as the `INFO`
//! chunk, which is what the save browser uses to list slots without
//! decoding object state.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::{self, Read, Write};

use stasis_core::{ByteReader, ByteWriter, Guid};

use crate::data::{
    GlobalData, LevelData, NamedObjectData, PropertyData, SaveData, SaveInfo, SpawnedObjectData,
};
use crate::error::ArchiveError;
use crate::meta::{ClassDef, ClassId, ClassMetadata, PrefixEntry, PrefixId, PropertyId, StoredProperty};

pub const MAGIC: [u8; 4] = *b"STSV";
pub const FORMAT_VERSION: u32 = 1;

/// Four-byte chunk identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkId(pub [u8; 4]);

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => f.write_str(s),
            Err(_) => write!(f, "{:02x?}", self.0),
        }
    }
}

pub const INFO: ChunkId = ChunkId(*b"INFO");
pub const GLOB: ChunkId = ChunkId(*b"GLOB");
pub const LEVL: ChunkId = ChunkId(*b"LEVL");
pub const META: ChunkId = ChunkId(*b"META");
pub const CNAM: ChunkId = ChunkId(*b"CNAM");
pub const PNAM: ChunkId = ChunkId(*b"PNAM");
pub const PRFX: ChunkId = ChunkId(*b"PRFX");
pub const CDEF: ChunkId = ChunkId(*b"CDEF");
pub const OBJS: ChunkId = ChunkId(*b"OBJS");
pub const SPWN: ChunkId = ChunkId(*b"SPWN");
pub const DSTR: ChunkId = ChunkId(*b"DSTR");

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Write a complete save archive to `output`.
pub fn write_save(output: &mut impl Write, data: &SaveData) -> Result<(), ArchiveError> {
    let mut root = ByteWriter::new();
    root.write_bytes(&MAGIC);
    root.write_u32(FORMAT_VERSION);
    write_chunk(&mut root, INFO, &encode_info(&data.info));
    write_chunk(&mut root, GLOB, &encode_global(&data.global));
    for level in data.levels.values() {
        write_chunk(&mut root, LEVL, &encode_level(level));
    }
    output.write_all(root.as_slice())?;
    Ok(())
}

fn write_chunk(out: &mut ByteWriter, id: ChunkId, payload: &[u8]) {
    out.write_bytes(&id.0);
    out.write_u32(payload.len() as u32);
    out.write_bytes(payload);
}

fn encode_info(info: &SaveInfo) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.write_str(&info.title);
    w.write_i64(info.timestamp);
    w.into_bytes()
}

fn encode_global(global: &GlobalData) -> Vec<u8> {
    let mut w = ByteWriter::new();
    write_chunk(&mut w, META, &encode_metadata(&global.metadata));
    write_chunk(&mut w, OBJS, &encode_named_objects(&global.objects));
    w.into_bytes()
}

fn encode_level(level: &LevelData) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.write_str(&level.name);
    write_chunk(&mut w, META, &encode_metadata(&level.metadata));
    write_chunk(&mut w, OBJS, &encode_named_objects(&level.objects));
    write_chunk(&mut w, SPWN, &encode_spawned_objects(&level.spawned));
    write_chunk(&mut w, DSTR, &encode_destroyed(&level.destroyed));
    w.into_bytes()
}

fn encode_metadata(meta: &ClassMetadata) -> Vec<u8> {
    let mut w = ByteWriter::new();
    write_chunk(&mut w, CNAM, &encode_names(meta.class_names()));
    write_chunk(&mut w, PNAM, &encode_names(meta.property_names()));

    let mut prefixes = ByteWriter::new();
    prefixes.write_u32(meta.prefixes().len() as u32);
    for entry in meta.prefixes() {
        prefixes.write_u32(entry.parent.0);
        prefixes.write_u32(entry.property.0);
    }
    write_chunk(&mut w, PRFX, prefixes.as_slice());

    let mut defs = ByteWriter::new();
    defs.write_u32(meta.class_defs().len() as u32);
    for def in meta.class_defs() {
        defs.write_u32(def.class_id.0);
        defs.write_u32(def.properties.len() as u32);
        for stored in &def.properties {
            defs.write_u32(stored.prefix.0);
            defs.write_u32(stored.property.0);
            defs.write_u16(stored.kind);
        }
    }
    write_chunk(&mut w, CDEF, defs.as_slice());
    w.into_bytes()
}

fn encode_names(names: &[String]) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.write_u32(names.len() as u32);
    for name in names {
        w.write_str(name);
    }
    w.into_bytes()
}

fn encode_record(w: &mut ByteWriter, core: &[u8], properties: &PropertyData, custom: &[u8]) {
    w.write_u32(core.len() as u32);
    w.write_bytes(core);
    w.write_u32(properties.offsets.len() as u32);
    for &offset in &properties.offsets {
        w.write_u32(offset);
    }
    w.write_u32(properties.blob.len() as u32);
    w.write_bytes(&properties.blob);
    w.write_u32(custom.len() as u32);
    w.write_bytes(custom);
}

fn encode_named_objects(objects: &BTreeMap<String, NamedObjectData>) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.write_u32(objects.len() as u32);
    for (name, record) in objects {
        w.write_str(name);
        w.write_u32(record.class_id.0);
        encode_record(&mut w, &record.core, &record.properties, &record.custom);
    }
    w.into_bytes()
}

fn encode_spawned_objects(spawned: &BTreeMap<Guid, SpawnedObjectData>) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.write_u32(spawned.len() as u32);
    for record in spawned.values() {
        w.write_guid(record.guid);
        w.write_u32(record.class_id.0);
        encode_record(&mut w, &record.core, &record.properties, &record.custom);
    }
    w.into_bytes()
}

fn encode_destroyed(destroyed: &BTreeSet<String>) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.write_u32(destroyed.len() as u32);
    for name in destroyed {
        w.write_str(name);
    }
    w.into_bytes()
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Read a complete save archive from `input`.
pub fn read_save(input: &mut impl Read) -> Result<SaveData, ArchiveError> {
    let mut bytes = Vec::new();
    input.read_to_end(&mut bytes)?;
    parse_save(&bytes)
}

fn parse_save(bytes: &[u8]) -> Result<SaveData, ArchiveError> {
    let mut reader = ByteReader::new(bytes);
    check_header(&mut reader)?;
    let mut data = SaveData::new();
    let mut seen_info = false;
    while let Some((id, payload)) = next_chunk(&mut reader)? {
        match &id.0 {
            b"INFO" => {
                data.info = decode_info(payload)?;
                seen_info = true;
            }
            b"GLOB" => data.global = decode_global(payload)?,
            b"LEVL" => {
                let level = decode_level(payload)?;
                data.levels.insert(level.name.clone(), level);
            }
            _ => log::debug!("skipping unknown chunk {id}"),
        }
    }
    if !seen_info {
        return Err(ArchiveError::MissingChunk(INFO));
    }
    Ok(data)
}

/// Read only the descriptive header of a save archive.
///
/// Stops at the `INFO` chunk; the object state that follows is never
/// pulled into memory.
pub fn read_save_info(input: &mut impl Read) -> Result<SaveInfo, ArchiveError> {
    let mut magic = [0u8; 4];
    read_exact_or(input, &mut magic, "file header")?;
    if magic != MAGIC {
        return Err(ArchiveError::BadMagic(magic));
    }
    let mut version_bytes = [0u8; 4];
    read_exact_or(input, &mut version_bytes, "file header")?;
    let version = u32::from_le_bytes(version_bytes);
    if version > FORMAT_VERSION {
        return Err(ArchiveError::UnsupportedVersion(version));
    }
    loop {
        let mut id = [0u8; 4];
        match input.read_exact(&mut id) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(ArchiveError::MissingChunk(INFO));
            }
            Err(err) => return Err(err.into()),
        }
        let mut len_bytes = [0u8; 4];
        read_exact_or(input, &mut len_bytes, "chunk header")?;
        let len = u32::from_le_bytes(len_bytes) as u64;
        let mut limited = input.by_ref().take(len);
        if id == INFO.0 {
            let mut payload = Vec::new();
            limited.read_to_end(&mut payload)?;
            if payload.len() as u64 != len {
                return Err(ArchiveError::Truncated("save info"));
            }
            return decode_info(&payload);
        }
        let skipped = io::copy(&mut limited, &mut io::sink())?;
        if skipped != len {
            return Err(ArchiveError::Truncated("chunk payload"));
        }
    }
}

fn read_exact_or(
    input: &mut impl Read,
    buf: &mut [u8],
    what: &'static str,
) -> Result<(), ArchiveError> {
    input.read_exact(buf).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            ArchiveError::Truncated(what)
        } else {
            ArchiveError::Io(err)
        }
    })
}

fn check_header(reader: &mut ByteReader<'_>) -> Result<(), ArchiveError> {
    let magic = read_chunk_id(reader).ok_or(ArchiveError::Truncated("file header"))?;
    if magic.0 != MAGIC {
        return Err(ArchiveError::BadMagic(magic.0));
    }
    let version = reader
        .read_u32()
        .ok_or(ArchiveError::Truncated("file header"))?;
    if version > FORMAT_VERSION {
        return Err(ArchiveError::UnsupportedVersion(version));
    }
    Ok(())
}

/// Next chunk of a chunk stream, or `None` at its end. Payload slices
/// borrow the input buffer.
fn next_chunk<'a>(reader: &mut ByteReader<'a>) -> Result<Option<(ChunkId, &'a [u8])>, ArchiveError> {
    if reader.is_empty() {
        return Ok(None);
    }
    let id = read_chunk_id(reader).ok_or(ArchiveError::Truncated("chunk header"))?;
    let len = reader
        .read_u32()
        .ok_or(ArchiveError::Truncated("chunk header"))? as usize;
    let payload = reader
        .read_bytes(len)
        .ok_or(ArchiveError::Truncated("chunk payload"))?;
    Ok(Some((id, payload)))
}

fn read_chunk_id(reader: &mut ByteReader<'_>) -> Option<ChunkId> {
    let bytes = reader.read_bytes(4)?;
    Some(ChunkId([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn require<T>(value: Option<T>, what: &'static str) -> Result<T, ArchiveError> {
    value.ok_or(ArchiveError::Malformed(what))
}

fn decode_info(payload: &[u8]) -> Result<SaveInfo, ArchiveError> {
    let mut reader = ByteReader::new(payload);
    let title = require(reader.read_str(), "save info")?;
    let timestamp = require(reader.read_i64(), "save info")?;
    Ok(SaveInfo { title, timestamp })
}

fn decode_global(payload: &[u8]) -> Result<GlobalData, ArchiveError> {
    let mut reader = ByteReader::new(payload);
    let mut global = GlobalData::default();
    while let Some((id, chunk)) = next_chunk(&mut reader)? {
        match &id.0 {
            b"META" => global.metadata = decode_metadata(chunk)?,
            b"OBJS" => global.objects = decode_named_objects(chunk)?,
            _ => log::debug!("skipping unknown chunk {id} in global data"),
        }
    }
    Ok(global)
}

fn decode_level(payload: &[u8]) -> Result<LevelData, ArchiveError> {
    let mut reader = ByteReader::new(payload);
    let name = require(reader.read_str(), "level name")?;
    let mut level = LevelData::new(&name);
    while let Some((id, chunk)) = next_chunk(&mut reader)? {
        match &id.0 {
            b"META" => level.metadata = decode_metadata(chunk)?,
            b"OBJS" => level.objects = decode_named_objects(chunk)?,
            b"SPWN" => level.spawned = decode_spawned_objects(chunk)?,
            b"DSTR" => level.destroyed = decode_destroyed(chunk)?,
            _ => log::debug!("skipping unknown chunk {id} in level {name}"),
        }
    }
    Ok(level)
}

fn decode_metadata(payload: &[u8]) -> Result<ClassMetadata, ArchiveError> {
    let mut reader = ByteReader::new(payload);
    let mut class_names = Vec::new();
    let mut property_names = Vec::new();
    let mut prefixes = Vec::new();
    let mut class_defs = Vec::new();
    while let Some((id, chunk)) = next_chunk(&mut reader)? {
        match &id.0 {
            b"CNAM" => class_names = decode_names(chunk)?,
            b"PNAM" => property_names = decode_names(chunk)?,
            b"PRFX" => prefixes = decode_prefixes(chunk)?,
            b"CDEF" => class_defs = decode_class_defs(chunk)?,
            _ => log::debug!("skipping unknown chunk {id} in metadata"),
        }
    }
    Ok(ClassMetadata::from_parts(
        class_names,
        class_defs,
        property_names,
        prefixes,
    ))
}

fn decode_names(payload: &[u8]) -> Result<Vec<String>, ArchiveError> {
    let mut reader = ByteReader::new(payload);
    let count = require(reader.read_u32(), "name table")?;
    let mut names = Vec::new();
    for _ in 0..count {
        names.push(require(reader.read_str(), "name table")?);
    }
    Ok(names)
}

fn decode_prefixes(payload: &[u8]) -> Result<Vec<PrefixEntry>, ArchiveError> {
    let mut reader = ByteReader::new(payload);
    let count = require(reader.read_u32(), "prefix table")?;
    let mut prefixes = Vec::new();
    for _ in 0..count {
        let parent = require(reader.read_u32(), "prefix table")?;
        let property = require(reader.read_u32(), "prefix table")?;
        prefixes.push(PrefixEntry {
            parent: PrefixId(parent),
            property: PropertyId(property),
        });
    }
    Ok(prefixes)
}

fn decode_class_defs(payload: &[u8]) -> Result<Vec<ClassDef>, ArchiveError> {
    let mut reader = ByteReader::new(payload);
    let count = require(reader.read_u32(), "class defs")?;
    let mut defs = Vec::new();
    for _ in 0..count {
        let class_id = require(reader.read_u32(), "class defs")?;
        let mut def = ClassDef::new(ClassId(class_id));
        let slots = require(reader.read_u32(), "class defs")?;
        for _ in 0..slots {
            let prefix = require(reader.read_u32(), "class defs")?;
            let property = require(reader.read_u32(), "class defs")?;
            let kind = require(reader.read_u16(), "class defs")?;
            def.properties.push(StoredProperty {
                prefix: PrefixId(prefix),
                property: PropertyId(property),
                kind,
            });
        }
        defs.push(def);
    }
    Ok(defs)
}

fn decode_record(reader: &mut ByteReader<'_>) -> Result<(Vec<u8>, PropertyData, Vec<u8>), ArchiveError> {
    let core_len = require(reader.read_u32(), "object record")? as usize;
    let core = require(reader.read_bytes(core_len), "object record")?.to_vec();
    let offset_count = require(reader.read_u32(), "object record")?;
    let mut offsets = Vec::new();
    for _ in 0..offset_count {
        offsets.push(require(reader.read_u32(), "object record")?);
    }
    let blob_len = require(reader.read_u32(), "object record")? as usize;
    let blob = require(reader.read_bytes(blob_len), "object record")?.to_vec();
    let custom_len = require(reader.read_u32(), "object record")? as usize;
    let custom = require(reader.read_bytes(custom_len), "object record")?.to_vec();
    Ok((core, PropertyData { blob, offsets }, custom))
}

fn decode_named_objects(payload: &[u8]) -> Result<BTreeMap<String, NamedObjectData>, ArchiveError> {
    let mut reader = ByteReader::new(payload);
    let count = require(reader.read_u32(), "object table")?;
    let mut objects = BTreeMap::new();
    for _ in 0..count {
        let name = require(reader.read_str(), "object table")?;
        let class_id = ClassId(require(reader.read_u32(), "object table")?);
        let (core, properties, custom) = decode_record(&mut reader)?;
        objects.insert(
            name,
            NamedObjectData {
                class_id,
                core,
                properties,
                custom,
            },
        );
    }
    Ok(objects)
}

fn decode_spawned_objects(payload: &[u8]) -> Result<BTreeMap<Guid, SpawnedObjectData>, ArchiveError> {
    let mut reader = ByteReader::new(payload);
    let count = require(reader.read_u32(), "spawned table")?;
    let mut spawned = BTreeMap::new();
    for _ in 0..count {
        let guid = require(reader.read_guid(), "spawned table")?;
        let class_id = ClassId(require(reader.read_u32(), "spawned table")?);
        let (core, properties, custom) = decode_record(&mut reader)?;
        spawned.insert(
            guid,
            SpawnedObjectData {
                guid,
                class_id,
                core,
                properties,
                custom,
            },
        );
    }
    Ok(spawned)
}

fn decode_destroyed(payload: &[u8]) -> Result<BTreeSet<String>, ArchiveError> {
    let mut reader = ByteReader::new(payload);
    let count = require(reader.read_u32(), "destroyed table")?;
    let mut destroyed = BTreeSet::new();
    for _ in 0..count {
        destroyed.insert(require(reader.read_str(), "destroyed table")?);
    }
    Ok(destroyed)
}
