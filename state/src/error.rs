use std::fmt;

use crate::archive::ChunkId;
use crate::subsystem::SystemState;

/// Errors raised while encoding or decoding a save archive.
#[derive(Debug)]
pub enum ArchiveError {
    /// An IO error occurred while reading or writing the underlying stream.
    Io(std::io::Error),
    /// The stream does not start with the save archive magic.
    BadMagic([u8; 4]),
    /// The archive format version is newer than this build understands.
    UnsupportedVersion(u32),
    /// The stream ended in the middle of the named structure.
    Truncated(&'static str),
    /// A required chunk is missing from the archive.
    MissingChunk(ChunkId),
    /// A chunk payload failed to decode.
    Malformed(&'static str),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveError::Io(err) => write!(f, "IO error: {err}"),
            ArchiveError::BadMagic(magic) => {
                write!(f, "bad archive magic: {magic:02x?}")
            }
            ArchiveError::UnsupportedVersion(version) => {
                write!(f, "unsupported archive version: {version}")
            }
            ArchiveError::Truncated(what) => write!(f, "archive truncated in {what}"),
            ArchiveError::MissingChunk(id) => write!(f, "missing required chunk: {id}"),
            ArchiveError::Malformed(what) => write!(f, "malformed chunk payload: {what}"),
        }
    }
}

impl std::error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArchiveError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        ArchiveError::Io(err)
    }
}

/// Errors raised by the save subsystem.
#[derive(Debug)]
pub enum SaveError {
    /// A save or load was requested while another one is in flight.
    Busy(SystemState),
    /// The subsystem is disabled; no game session is active.
    NotActive,
    /// The slot name is empty or contains path separators.
    InvalidSlot(String),
    /// No save file exists for the given slot.
    SlotNotFound(String),
    /// The root directory holds no saves to continue from.
    NoSaves,
    /// The save archive failed to encode or decode.
    Archive(ArchiveError),
    /// An IO error occurred while accessing the save directory.
    Io(std::io::Error),
}

impl fmt::Display for SaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveError::Busy(state) => write!(f, "save system is busy: {state:?}"),
            SaveError::NotActive => write!(f, "save system is not active"),
            SaveError::InvalidSlot(slot) => write!(f, "invalid slot name: {slot}"),
            SaveError::SlotNotFound(slot) => write!(f, "no save found for slot: {slot}"),
            SaveError::NoSaves => write!(f, "no saves to continue from"),
            SaveError::Archive(err) => write!(f, "archive error: {err}"),
            SaveError::Io(err) => write!(f, "IO error: {err}"),
        }
    }
}

impl std::error::Error for SaveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SaveError::Archive(err) => Some(err),
            SaveError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ArchiveError> for SaveError {
    fn from(err: ArchiveError) -> Self {
        SaveError::Archive(err)
    }
}

impl From<std::io::Error> for SaveError {
    fn from(err: std::io::Error) -> Self {
        SaveError::Io(err)
    }
}
