//! Persistent identity tokens.
//!
//! Runtime-spawned objects are keyed by a [`Guid`] rather than by a level
//! name. The nil value doubles as "no identity assigned yet": an object
//! whose identity slot still holds [`Guid::NIL`] receives a fresh token on
//! its first snapshot.

use std::fmt;

use uuid::Uuid;

/// A 128-bit persistent identity token.
///
/// Ordered and hashable so it can key the stored spawned-object containers.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Guid(Uuid);

impl Guid {
    /// The all-zero token, meaning "no identity assigned".
    pub const NIL: Self = Self(Uuid::nil());

    /// Generate a fresh random token.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Whether this token is a usable identity (non-nil).
    pub fn is_valid(&self) -> bool {
        !self.0.is_nil()
    }

    /// The token's raw 16 bytes.
    pub fn to_bytes(self) -> [u8; 16] {
        *self.0.as_bytes()
    }

    /// Rebuild a token from its raw 16 bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for Guid {
    fn default() -> Self {
        Self::NIL
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_is_not_valid() {
        assert!(!Guid::NIL.is_valid());
        assert!(!Guid::default().is_valid());
    }

    #[test]
    fn random_tokens_are_valid_and_distinct() {
        let a = Guid::random();
        let b = Guid::random();
        assert!(a.is_valid());
        assert!(b.is_valid());
        assert_ne!(a, b);
    }

    #[test]
    fn byte_round_trip() {
        let guid = Guid::random();
        assert_eq!(Guid::from_bytes(guid.to_bytes()), guid);
        assert_eq!(Guid::from_bytes([0; 16]), Guid::NIL);
    }

    #[test]
    fn display_is_hyphenated() {
        let text = Guid::random().to_string();
        assert_eq!(text.len(), 36);
        assert_eq!(text.matches('-').count(), 4);
    }
}
