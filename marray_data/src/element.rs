//! The element record: a stable identity plus three independently versioned facets.

use marray_core::{ElementId, VectorClock};
use ordered_float::NotNan;

/// A value facet: the user data plus the clock of its last local or adopted write.
#[derive(Clone, Debug)]
pub struct VersionedValue<T> {
    pub data: T,
    pub clock: VectorClock,
}

/// A position facet: a fractional index plus the clock of its last local or adopted write.
#[derive(Clone, Debug)]
pub struct VersionedIndex {
    pub pos: NotNan<f64>,
    pub clock: VectorClock,
}

/// A single array element: stable `id`, independently versioned value/position/liveness
/// facets, and a `summary_clock` that is the componentwise max of all three.
#[derive(Clone, Debug)]
pub struct Element<T> {
    pub(crate) id: ElementId,
    pub(crate) value: VersionedValue<T>,
    pub(crate) position: VersionedIndex,
    pub(crate) deleted: bool,
    pub(crate) delete_clock: Option<VectorClock>,
    pub(crate) summary_clock: VectorClock,
}

impl<T> Element<T> {
    /// Create a freshly inserted element: value and position facets share the same
    /// clock, since insertion is a single local mutation stamping both at once.
    pub(crate) fn new(id: ElementId, data: T, pos: NotNan<f64>, clock: VectorClock) -> Self {
        Self {
            id,
            value: VersionedValue {
                data,
                clock: clock.clone(),
            },
            position: VersionedIndex {
                pos,
                clock: clock.clone(),
            },
            deleted: false,
            delete_clock: None,
            summary_clock: clock,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        id: ElementId,
        value_data: T,
        value_clock: VectorClock,
        position_pos: NotNan<f64>,
        position_clock: VectorClock,
        deleted: bool,
        delete_clock: Option<VectorClock>,
        summary_clock: VectorClock,
    ) -> Self {
        Self {
            id,
            value: VersionedValue {
                data: value_data,
                clock: value_clock,
            },
            position: VersionedIndex {
                pos: position_pos,
                clock: position_clock,
            },
            deleted,
            delete_clock,
            summary_clock,
        }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn value(&self) -> &T {
        &self.value.data
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub(crate) fn position(&self) -> &VersionedIndex {
        &self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marray_utils::ReplicaId;

    #[test]
    fn new_element_shares_one_clock_across_both_facets() {
        let replica = ReplicaId::new("r1").unwrap();
        let mut clock = VectorClock::new();
        clock.increment(&replica);

        let element = Element::new(
            ElementId::new_random(),
            "hello",
            NotNan::new(1000.0).unwrap(),
            clock.clone(),
        );

        assert_eq!(element.value.clock, clock);
        assert_eq!(element.position.clock, clock);
        assert_eq!(element.summary_clock, clock);
        assert!(!element.is_deleted());
    }
}
