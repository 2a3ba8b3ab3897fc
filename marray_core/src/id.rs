//! Globally unique element identifiers.

use std::fmt;

use uuid::Uuid;

/// A globally unique identifier for an [[Element]], stable for its entire lifetime.
///
/// Rendered as 32 lowercase hex characters, per the wire-agnostic shape the
/// embedder is expected to serialize.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u128);

impl ElementId {
    /// Generate a fresh, random id. Collisions are astronomically unlikely
    /// (128 bits of randomness from [[Uuid::new_v4]]); [[crate::Replica]] still
    /// guards against one slipping through with a `debug_assert!` in its
    /// `insert_new` helper, which checks a freshly generated id against the
    /// existing element map before inserting.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4().as_u128())
    }

    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    pub const fn as_u128(&self) -> u128 {
        self.0
    }
}

impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementId({self})")
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_32_lowercase_hex_chars() {
        let id = ElementId::from_u128(0xdead_beef);
        let rendered = id.to_string();
        assert_eq!(rendered.len(), 32);
        assert!(rendered.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert!(rendered.ends_with("deadbeef"));
    }

    #[test]
    fn random_ids_are_distinct() {
        let a = ElementId::new_random();
        let b = ElementId::new_random();
        assert_ne!(a, b);
    }
}
