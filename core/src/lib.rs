//! # Stasis Core
//!
//! Shared low-level types for the Stasis persistence engine:
//!
//! - [`Guid`]: persistent identity token for runtime-spawned objects
//! - [`Transform`]: translation/rotation/scale spatial state
//! - [`ByteWriter`] / [`ByteReader`]: little-endian packed byte buffers

pub mod bytes;
pub mod guid;
pub mod math;

pub use bytes::{ByteReader, ByteWriter};
pub use guid::Guid;
pub use math::{Quat, Transform, Vec3};

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
