//! The transferable replica view: a plain owned struct, not a streaming sink.
//!
//! A fractional-index array has no boundary-node bookkeeping to stream around, so
//! unlike a linked-list/RGA encoding, the whole state fits naturally in one struct.
//! Serialization to a wire format is the embedder's concern; this module only defines
//! the in-memory shape and its one fallible boundary operation, reconstruction.

use ahash::AHashMap;
use marray_core::errors::{Errors, ErrorsExt};
use marray_core::{ElementId, VectorClock};
use marray_utils::ReplicaId;
use ordered_float::NotNan;
use snafu::Snafu;

use crate::config::ReplicaConfig;
use crate::element::Element;

/// One element's facets, as transferred across the replica boundary.
#[derive(Clone, Debug)]
pub struct ElementSnapshot<T> {
    pub id: ElementId,
    pub deleted: bool,
    pub delete_clock: Option<VectorClock>,
    pub value: T,
    pub value_clock: VectorClock,
    pub position: f64,
    pub position_clock: VectorClock,
    pub summary_clock: VectorClock,
}

impl<T: Clone> ElementSnapshot<T> {
    pub(crate) fn from_element(element: &Element<T>) -> Self {
        Self {
            id: element.id,
            deleted: element.deleted,
            delete_clock: element.delete_clock.clone(),
            value: element.value.data.clone(),
            value_clock: element.value.clock.clone(),
            position: element.position.pos.into_inner(),
            position_clock: element.position.clock.clone(),
            summary_clock: element.summary_clock.clone(),
        }
    }
}

/// A transferable view of a replica: its own vector clock, its configuration, and one
/// [[ElementSnapshot]] per element (live or tombstoned).
#[derive(Clone, Debug)]
pub struct ReplicaSnapshot<T> {
    pub replica_id: ReplicaId,
    pub clock: VectorClock,
    pub config: ReplicaConfig<T>,
    pub elements: Vec<ElementSnapshot<T>>,
}

/// Errors while reconstructing a [[crate::Replica]] from an [[ElementSnapshot]] that
/// came from an untrusted source, such as a deserializer.
///
/// Unlike the operation-level error taxonomy (booleans/options for ordinary not-found
/// or out-of-range outcomes), this boundary can see genuinely malformed input, so it
/// reports via `snafu` and can be collected into [[Errors]] when several nodes are bad
/// at once.
#[derive(Debug, Snafu)]
pub enum SnapshotError {
    #[snafu(display("element {id} at snapshot index {index} has a non-finite position"))]
    NonFinitePosition { id: ElementId, index: usize },
    #[snafu(display("element {id} at snapshot index {index} duplicates an earlier id"))]
    DuplicateElementId { id: ElementId, index: usize },
}

/// Validate and convert `snapshot.elements` into the internal map, collecting every
/// malformed node rather than bailing out on the first.
pub(crate) fn elements_from_snapshot<T: Clone>(
    elements: Vec<ElementSnapshot<T>>,
) -> Result<AHashMap<ElementId, Element<T>>, Errors<SnapshotError>> {
    elements
        .iter()
        .enumerate()
        .ensure_for_all(|(index, snapshot)| {
            if snapshot.position.is_finite() {
                Ok(())
            } else {
                Err(SnapshotError::NonFinitePosition {
                    id: snapshot.id,
                    index,
                })
            }
        })?;

    let mut seen = ahash::AHashSet::default();
    let mut duplicates = Vec::new();
    for (index, snapshot) in elements.iter().enumerate() {
        if !seen.insert(snapshot.id) {
            duplicates.push(SnapshotError::DuplicateElementId {
                id: snapshot.id,
                index,
            });
        }
    }
    if let Some(errors) = Errors::from_vec(duplicates) {
        return Err(errors);
    }

    Ok(elements
        .into_iter()
        .map(|snapshot| {
            let pos = NotNan::new(snapshot.position).expect("validated finite above");
            let element = Element::from_parts(
                snapshot.id,
                snapshot.value,
                snapshot.value_clock,
                pos,
                snapshot.position_clock,
                snapshot.deleted,
                snapshot.delete_clock,
                snapshot.summary_clock,
            );
            (snapshot.id, element)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use marray_core::VectorClock;

    fn valid_snapshot(pos: f64) -> ElementSnapshot<&'static str> {
        ElementSnapshot {
            id: ElementId::new_random(),
            deleted: false,
            delete_clock: None,
            value: "v",
            value_clock: VectorClock::new(),
            position: pos,
            position_clock: VectorClock::new(),
            summary_clock: VectorClock::new(),
        }
    }

    #[test]
    fn valid_snapshots_convert_cleanly() {
        let snapshots = vec![valid_snapshot(10.0), valid_snapshot(20.0)];
        let elements = elements_from_snapshot(snapshots).unwrap();
        assert_eq!(elements.len(), 2);
    }

    #[test]
    fn non_finite_position_is_rejected() {
        let mut bad = valid_snapshot(f64::NAN);
        bad.position = f64::NAN;
        let err = elements_from_snapshot(vec![bad]).unwrap_err();
        assert_eq!(err.len(), 1);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut a = valid_snapshot(10.0);
        let mut b = valid_snapshot(20.0);
        b.id = a.id;
        a.position = 10.0;
        let err = elements_from_snapshot(vec![a, b]).unwrap_err();
        assert_eq!(err.len(), 1);
    }

    #[test]
    fn multiple_malformed_nodes_are_all_collected() {
        let mut a = valid_snapshot(f64::NAN);
        a.position = f64::NAN;
        let mut b = valid_snapshot(f64::INFINITY);
        b.position = f64::INFINITY;
        let err = elements_from_snapshot(vec![a, b]).unwrap_err();
        assert_eq!(err.len(), 2);
    }
}
