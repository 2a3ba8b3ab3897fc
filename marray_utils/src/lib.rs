use std::fmt;

/// An opaque, non-empty identifier for a single CRDT replica.
///
/// Construction is the one place in this workspace that rejects input
/// outright: everywhere else, failure is reported as `false`/`None`, but an
/// empty replica id is a construction-time mistake, not a runtime outcome.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplicaId(Box<str>);

impl ReplicaId {
    /// Create a new [[ReplicaId]], rejecting the empty string.
    pub fn new(s: impl Into<String>) -> Result<Self, EmptyReplicaId> {
        let s = s.into();
        if s.is_empty() {
            Err(EmptyReplicaId)
        } else {
            Ok(Self(s.into_boxed_str()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The error returned when constructing a [[ReplicaId]] from an empty string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmptyReplicaId;

impl fmt::Display for EmptyReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a replica id must not be empty")
    }
}

impl std::error::Error for EmptyReplicaId {}

impl TryFrom<String> for ReplicaId {
    type Error = EmptyReplicaId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ReplicaId {
    type Error = EmptyReplicaId;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Debug for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // A bit shorter than the full derived Debug.
        write!(f, "r\"{}\"", self.0)
    }
}
impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ReplicaId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for ReplicaId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
