//! Cached materialized view: the `(position, id)`-sorted sequence of live elements.

use std::sync::Mutex;

use ahash::AHashMap;
use marray_core::ElementId;
use ordered_float::NotNan;

use crate::element::Element;

/// A cache of the live, sorted element id sequence.
///
/// The cache is behind its own [[Mutex]] rather than relying on the replica's outer
/// reader/writer lock, because read-only operations (`len`, `get`, `toSequence`) take
/// only the replica's shared lock, yet still need to lazily rebuild this cache.
#[derive(Debug, Default)]
pub(crate) struct View {
    cache: Mutex<Option<Vec<ElementId>>>,
}

impl View {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn invalidate(&self) {
        *self.cache.lock().unwrap() = None;
    }

    /// The live element ids, ordered by `(position.pos, id)`, rebuilding the cache if
    /// it was invalidated since the last call.
    pub(crate) fn materialize<T>(&self, elements: &AHashMap<ElementId, Element<T>>) -> Vec<ElementId> {
        let mut guard = self.cache.lock().unwrap();
        if guard.is_none() {
            let mut live: Vec<(NotNan<f64>, ElementId)> = elements
                .values()
                .filter(|element| !element.is_deleted())
                .map(|element| (element.position().pos, element.id()))
                .collect();
            live.sort_unstable();
            *guard = Some(live.into_iter().map(|(_, id)| id).collect());
        }
        guard.clone().expect("cache was just populated")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marray_core::VectorClock;
    use marray_utils::ReplicaId;

    fn element_at(pos: f64) -> Element<&'static str> {
        let replica = ReplicaId::new("r1").unwrap();
        let mut clock = VectorClock::new();
        clock.increment(&replica);
        Element::new(ElementId::new_random(), "v", NotNan::new(pos).unwrap(), clock)
    }

    #[test]
    fn materialize_sorts_by_position_and_excludes_deleted() {
        let view = View::new();
        let mut elements = AHashMap::default();

        let a = element_at(30.0);
        let b = element_at(10.0);
        let mut c = element_at(20.0);
        c.deleted = true;

        let a_id = a.id();
        let b_id = b.id();
        elements.insert(a.id(), a);
        elements.insert(b.id(), b);
        elements.insert(c.id(), c);

        let ordered = view.materialize(&elements);
        assert_eq!(ordered, vec![b_id, a_id]);
    }

    #[test]
    fn invalidate_forces_rebuild_on_next_materialize() {
        let view = View::new();
        let mut elements = AHashMap::default();
        let a = element_at(10.0);
        elements.insert(a.id(), a);

        let first = view.materialize(&elements);
        assert_eq!(first.len(), 1);

        let b = element_at(5.0);
        elements.insert(b.id(), b);
        // Without invalidation, the stale cache would still report one element.
        view.invalidate();
        let second = view.materialize(&elements);
        assert_eq!(second.len(), 2);
    }
}
