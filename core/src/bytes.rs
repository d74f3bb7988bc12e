//! Little-endian packed byte buffers.
//!
//! All stored value encoding goes through [`ByteWriter`] and [`ByteReader`]:
//! property blobs, packed core data, and the opaque custom blobs written by
//! object callbacks. Reads return `None` past the end of the buffer instead
//! of panicking; callers treat truncation as a local, logged skip.

use glam::{Quat, Vec3};

use crate::guid::Guid;
use crate::math::Transform;

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Append-only little-endian byte buffer.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// A `u32` byte length followed by UTF-8 content.
    pub fn write_str(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn write_guid(&mut self, guid: Guid) {
        self.buf.extend_from_slice(&guid.to_bytes());
    }

    pub fn write_vec3(&mut self, v: Vec3) {
        self.write_f32(v.x);
        self.write_f32(v.y);
        self.write_f32(v.z);
    }

    pub fn write_quat(&mut self, q: Quat) {
        self.write_f32(q.x);
        self.write_f32(q.y);
        self.write_f32(q.z);
        self.write_f32(q.w);
    }

    pub fn write_transform(&mut self, t: &Transform) {
        self.write_vec3(t.translation);
        self.write_quat(t.rotation);
        self.write_vec3(t.scale);
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Forward-only cursor over a byte slice.
///
/// Slices returned by [`read_bytes`](Self::read_bytes) borrow the underlying
/// buffer, not the reader, so they can outlive the cursor.
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Advance past `count` bytes. `false` if fewer remain.
    pub fn skip(&mut self, count: usize) -> bool {
        if self.remaining() < count {
            return false;
        }
        self.pos += count;
        true
    }

    pub fn read_bytes(&mut self, count: usize) -> Option<&'a [u8]> {
        if self.remaining() < count {
            return None;
        }
        let slice = &self.buf[self.pos..self.pos + count];
        self.pos += count;
        Some(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let slice = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Some(out)
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        let [b] = self.read_array::<1>()?;
        Some(b)
    }

    pub fn read_bool(&mut self) -> Option<bool> {
        Some(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Option<u16> {
        Some(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        Some(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Option<u64> {
        Some(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Option<i32> {
        Some(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Option<i64> {
        Some(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Option<f32> {
        Some(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> Option<f64> {
        Some(f64::from_le_bytes(self.read_array()?))
    }

    /// Counterpart of [`ByteWriter::write_str`]. `None` on truncation or
    /// invalid UTF-8.
    pub fn read_str(&mut self) -> Option<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).ok()
    }

    pub fn read_guid(&mut self) -> Option<Guid> {
        Some(Guid::from_bytes(self.read_array()?))
    }

    pub fn read_vec3(&mut self) -> Option<Vec3> {
        Some(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    pub fn read_quat(&mut self) -> Option<Quat> {
        let x = self.read_f32()?;
        let y = self.read_f32()?;
        let z = self.read_f32()?;
        let w = self.read_f32()?;
        Some(Quat::from_xyzw(x, y, z, w))
    }

    pub fn read_transform(&mut self) -> Option<Transform> {
        Some(Transform {
            translation: self.read_vec3()?,
            rotation: self.read_quat()?,
            scale: self.read_vec3()?,
        })
    }
}
