//! The public `Replica<T>` API: every mutation in the operation table, guarded by a
//! single reader/writer lock per the concurrency model.

use std::cmp::Ordering;
use std::sync::RwLock;

use ahash::AHashMap;
use itertools::Itertools;
use marray_core::errors::Errors;
use marray_core::{ElementId, VectorClock};
use marray_utils::ReplicaId;
use ordered_float::NotNan;

use crate::config::ReplicaConfig;
use crate::element::Element;
use crate::position;
use crate::merge;
use crate::snapshot::{ElementSnapshot, ReplicaSnapshot, SnapshotError, elements_from_snapshot};
use crate::view::View;

struct ReplicaState<T> {
    clock: VectorClock,
    elements: AHashMap<ElementId, Element<T>>,
    view: View,
}

impl<T> Default for ReplicaState<T> {
    fn default() -> Self {
        Self {
            clock: VectorClock::new(),
            elements: AHashMap::default(),
            view: View::new(),
        }
    }
}

/// A single replica of the CRDT: an in-memory element map, a local vector clock, and
/// configuration, all behind one reader/writer lock.
///
/// Every public mutator is a thin locking entry point delegating to a private
/// `_locked` body that assumes the lock is already held, so that no helper ever
/// reacquires the lock its caller holds.
pub struct Replica<T> {
    replica_id: ReplicaId,
    config: ReplicaConfig<T>,
    state: RwLock<ReplicaState<T>>,
}

impl<T> Replica<T> {
    pub fn new(replica_id: ReplicaId) -> Self {
        Self::with_config(replica_id, ReplicaConfig::default())
    }

    pub fn with_config(replica_id: ReplicaId, config: ReplicaConfig<T>) -> Self {
        Self {
            replica_id,
            config,
            state: RwLock::new(ReplicaState::default()),
        }
    }

    pub(crate) fn from_parts(
        replica_id: ReplicaId,
        config: ReplicaConfig<T>,
        clock: VectorClock,
        elements: AHashMap<ElementId, Element<T>>,
    ) -> Self {
        Self {
            replica_id,
            config,
            state: RwLock::new(ReplicaState {
                clock,
                elements,
                view: View::new(),
            }),
        }
    }

    pub fn replica_id(&self) -> &ReplicaId {
        &self.replica_id
    }

    pub fn config(&self) -> &ReplicaConfig<T> {
        &self.config
    }

    /// Advance the replica clock once, fork it, advance the fork once more, and
    /// return the fork. This is the exact double-increment sequence every local
    /// mutation uses to stamp a facet: the fork is strictly after the replica's
    /// previous view and uniquely ordered relative to any concurrent foreign write.
    fn stamp_facet(state: &mut ReplicaState<T>, replica_id: &ReplicaId) -> VectorClock {
        let pre_stamp = state.clock.clone();
        state.clock.increment(replica_id);
        let mut facet_clock = state.clock.fork();
        facet_clock.increment(replica_id);
        debug_assert!(
            facet_clock.after(&pre_stamp),
            "a locally stamped facet clock must strictly advance past its pre-stamp value"
        );
        facet_clock
    }

    fn live_ids(state: &ReplicaState<T>) -> Vec<ElementId> {
        state.view.materialize(&state.elements)
    }

    fn live_positions(state: &ReplicaState<T>, ids: &[ElementId]) -> Vec<NotNan<f64>> {
        ids.iter().map(|id| state.elements[id].position().pos).collect()
    }

    fn maybe_reindex(state: &mut ReplicaState<T>, config: &ReplicaConfig<T>, replica_id: &ReplicaId) {
        if !config.auto_reindex() {
            return;
        }
        let ids = Self::live_ids(state);
        let positions = Self::live_positions(state, &ids);
        if !position::needs_reindex(&positions, config.reindex_threshold()) {
            return;
        }
        log::debug!(
            "reindexing {} live elements on replica {}: {}",
            ids.len(),
            replica_id,
            ids.iter().map(ElementId::to_string).join(", ")
        );
        let new_positions = position::reindexed(ids.len(), config.index_spacing());
        for (id, new_pos) in ids.into_iter().zip(new_positions) {
            let facet_clock = Self::stamp_facet(state, replica_id);
            let element = state.elements.get_mut(&id).expect("id came from the live view");
            element.position.pos = new_pos;
            element.position.clock = facet_clock.clone();
            element.summary_clock.merge(&facet_clock);
        }
        state.view.invalidate();
    }

    fn maybe_keep_sorted(state: &mut ReplicaState<T>, config: &ReplicaConfig<T>, replica_id: &ReplicaId) {
        if !config.keep_sorted() {
            return;
        }
        let Some(comparator) = config.comparator() else {
            return;
        };
        let mut ids = Self::live_ids(state);
        ids.sort_by(|a, b| comparator(state.elements[a].value(), state.elements[b].value()));
        Self::restamp_order(state, config, replica_id, &ids);
    }

    /// Assign fresh `i * spacing` positions to `ids` in the given order, stamping each
    /// element's position facet with a *distinct* forked clock, per the no-shared-clock
    /// invariant for bulk reorders.
    fn restamp_order(state: &mut ReplicaState<T>, config: &ReplicaConfig<T>, replica_id: &ReplicaId, ids: &[ElementId]) {
        let spacing = config.index_spacing();
        for (i, id) in ids.iter().enumerate() {
            let new_pos = NotNan::new((i as f64 + 1.0) * spacing).expect("reindex arithmetic is always finite");
            let facet_clock = Self::stamp_facet(state, replica_id);
            let element = state.elements.get_mut(id).expect("id came from the live view");
            element.position.pos = new_pos;
            element.position.clock = facet_clock.clone();
            element.summary_clock.merge(&facet_clock);
        }
        state.view.invalidate();
    }

    // --- insertion -----------------------------------------------------

    fn insert_new(state: &mut ReplicaState<T>, replica_id: &ReplicaId, pos: NotNan<f64>, value: T) -> ElementId {
        let facet_clock = Self::stamp_facet(state, replica_id);
        let id = ElementId::new_random();
        debug_assert!(
            !state.elements.contains_key(&id),
            "freshly generated element id collided with an existing one"
        );
        state.elements.insert(id, Element::new(id, value, pos, facet_clock));
        state.view.invalidate();
        id
    }

    pub fn push(&self, value: T) -> ElementId {
        let mut state = self.state.write().unwrap();
        let ids = Self::live_ids(&state);
        let positions = Self::live_positions(&state, &ids);
        let pos = position::append(&positions, self.config.initial_index(), self.config.index_spacing());
        let id = Self::insert_new(&mut state, &self.replica_id, pos, value);
        Self::maybe_reindex(&mut state, &self.config, &self.replica_id);
        Self::maybe_keep_sorted(&mut state, &self.config, &self.replica_id);
        id
    }

    pub fn unshift(&self, value: T) -> ElementId {
        let mut state = self.state.write().unwrap();
        let ids = Self::live_ids(&state);
        let positions = Self::live_positions(&state, &ids);
        let pos = position::prepend(&positions, self.config.initial_index(), self.config.index_spacing());
        let id = Self::insert_new(&mut state, &self.replica_id, pos, value);
        Self::maybe_reindex(&mut state, &self.config, &self.replica_id);
        Self::maybe_keep_sorted(&mut state, &self.config, &self.replica_id);
        id
    }

    /// Inserts at materialized index `k`, clamped to `[0, len]`. Negative indices
    /// clamp to `0`.
    pub fn insert(&self, k: i64, value: T) -> ElementId {
        let mut state = self.state.write().unwrap();
        let ids = Self::live_ids(&state);
        let k = k.max(0) as usize;
        let k = k.min(ids.len());
        let positions = Self::live_positions(&state, &ids);
        let pos = position::insert_at(&positions, k, self.config.initial_index(), self.config.index_spacing());
        let id = Self::insert_new(&mut state, &self.replica_id, pos, value);
        Self::maybe_reindex(&mut state, &self.config, &self.replica_id);
        Self::maybe_keep_sorted(&mut state, &self.config, &self.replica_id);
        id
    }

    // --- reads -----------------------------------------------------

    pub fn len(&self) -> usize {
        let state = self.state.read().unwrap();
        Self::live_ids(&state).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<ElementId> {
        let state = self.state.read().unwrap();
        Self::live_ids(&state)
    }

    pub fn get(&self, k: usize) -> Option<T>
    where
        T: Clone,
    {
        let state = self.state.read().unwrap();
        let ids = Self::live_ids(&state);
        let id = ids.get(k)?;
        Some(state.elements[id].value().clone())
    }

    pub fn to_sequence(&self) -> Vec<T>
    where
        T: Clone,
    {
        let state = self.state.read().unwrap();
        Self::live_ids(&state)
            .into_iter()
            .map(|id| state.elements[&id].value().clone())
            .collect()
    }

    // --- value / liveness mutation -----------------------------------------------------

    pub fn set(&self, id: ElementId, value: T) -> bool {
        let mut state = self.state.write().unwrap();
        let is_live = state.elements.get(&id).is_some_and(|e| !e.is_deleted());
        if !is_live {
            return false;
        }
        let facet_clock = Self::stamp_facet(&mut state, &self.replica_id);
        let element = state.elements.get_mut(&id).unwrap();
        element.value.data = value;
        element.value.clock = facet_clock.clone();
        element.summary_clock.merge(&facet_clock);
        true
    }

    pub fn delete(&self, id: ElementId) -> bool {
        let mut state = self.state.write().unwrap();
        let is_live = state.elements.get(&id).is_some_and(|e| !e.is_deleted());
        if !is_live {
            return false;
        }
        let facet_clock = Self::stamp_facet(&mut state, &self.replica_id);
        let element = state.elements.get_mut(&id).unwrap();
        element.deleted = true;
        element.delete_clock = Some(facet_clock.clone());
        element.summary_clock.merge(&facet_clock);
        state.view.invalidate();
        true
    }

    pub fn pop(&self) -> Option<T>
    where
        T: Clone,
    {
        let mut state = self.state.write().unwrap();
        let ids = Self::live_ids(&state);
        let id = *ids.last()?;
        let value = state.elements[&id].value().clone();
        let facet_clock = Self::stamp_facet(&mut state, &self.replica_id);
        let element = state.elements.get_mut(&id).unwrap();
        element.deleted = true;
        element.delete_clock = Some(facet_clock.clone());
        element.summary_clock.merge(&facet_clock);
        state.view.invalidate();
        Some(value)
    }

    pub fn shift(&self) -> Option<T>
    where
        T: Clone,
    {
        let mut state = self.state.write().unwrap();
        let ids = Self::live_ids(&state);
        let id = *ids.first()?;
        let value = state.elements[&id].value().clone();
        let facet_clock = Self::stamp_facet(&mut state, &self.replica_id);
        let element = state.elements.get_mut(&id).unwrap();
        element.deleted = true;
        element.delete_clock = Some(facet_clock.clone());
        element.summary_clock.merge(&facet_clock);
        state.view.invalidate();
        Some(value)
    }

    pub fn clear(&self) {
        let mut state = self.state.write().unwrap();
        // A single replica-clock step covers the whole bulk delete; each affected
        // element still gets its own forked+incremented clock off that one step.
        state.clock.increment(&self.replica_id);
        let live = Self::live_ids(&state);
        for id in live {
            let mut facet_clock = state.clock.fork();
            facet_clock.increment(&self.replica_id);
            let element = state.elements.get_mut(&id).unwrap();
            element.deleted = true;
            element.delete_clock = Some(facet_clock.clone());
            element.summary_clock.merge(&facet_clock);
        }
        state.view.invalidate();
    }

    // --- positioning -----------------------------------------------------

    /// Moves to materialized index `k`, clamped to `[0, len]`; negative indices clamp
    /// to `0`. Resurrects `id` if it was deleted.
    pub fn move_to(&self, id: ElementId, k: i64) -> bool {
        let mut state = self.state.write().unwrap();
        if !state.elements.contains_key(&id) {
            return false;
        }
        let ids: Vec<ElementId> = Self::live_ids(&state).into_iter().filter(|&i| i != id).collect();
        let k = k.max(0) as usize;
        let k = k.min(ids.len());
        let positions = Self::live_positions(&state, &ids);
        let pos = position::insert_at(&positions, k, self.config.initial_index(), self.config.index_spacing());

        let facet_clock = Self::stamp_facet(&mut state, &self.replica_id);
        let element = state.elements.get_mut(&id).unwrap();
        element.deleted = false;
        element.delete_clock = None;
        element.position.pos = pos;
        element.position.clock = facet_clock.clone();
        element.summary_clock.merge(&facet_clock);
        state.view.invalidate();
        Self::maybe_reindex(&mut state, &self.config, &self.replica_id);
        true
    }

    pub fn move_after(&self, id: ElementId, anchor: ElementId) -> bool {
        self.move_relative(id, anchor, true)
    }

    pub fn move_before(&self, id: ElementId, anchor: ElementId) -> bool {
        self.move_relative(id, anchor, false)
    }

    fn move_relative(&self, id: ElementId, anchor: ElementId, after: bool) -> bool {
        if id == anchor {
            return false;
        }
        let mut state = self.state.write().unwrap();
        if !state.elements.contains_key(&id) {
            return false;
        }
        let anchor_live = state.elements.get(&anchor).is_some_and(|e| !e.is_deleted());
        if !anchor_live {
            return false;
        }
        let anchor_pos = state.elements[&anchor].position().pos;

        let ids: Vec<ElementId> = Self::live_ids(&state).into_iter().filter(|&i| i != id).collect();
        let anchor_idx = ids.iter().position(|&i| i == anchor).expect("anchor was checked live above");

        let pos = if after {
            let successor = ids.get(anchor_idx + 1).map(|sid| state.elements[sid].position().pos);
            position::after(anchor_pos, successor, self.config.index_spacing())
        } else {
            let predecessor = anchor_idx
                .checked_sub(1)
                .and_then(|i| ids.get(i))
                .map(|sid| state.elements[sid].position().pos);
            position::before(anchor_pos, predecessor, self.config.index_spacing())
        };

        let facet_clock = Self::stamp_facet(&mut state, &self.replica_id);
        let element = state.elements.get_mut(&id).unwrap();
        element.deleted = false;
        element.delete_clock = None;
        element.position.pos = pos;
        element.position.clock = facet_clock.clone();
        element.summary_clock.merge(&facet_clock);
        state.view.invalidate();
        Self::maybe_reindex(&mut state, &self.config, &self.replica_id);
        true
    }

    pub fn swap(&self, a: ElementId, b: ElementId) -> bool {
        let mut state = self.state.write().unwrap();
        if a == b {
            return state.elements.get(&a).is_some_and(|e| !e.is_deleted());
        }
        let (Some(pos_a), Some(pos_b)) = (
            state.elements.get(&a).filter(|e| !e.is_deleted()).map(|e| e.position().pos),
            state.elements.get(&b).filter(|e| !e.is_deleted()).map(|e| e.position().pos),
        ) else {
            return false;
        };

        let facet_clock_a = Self::stamp_facet(&mut state, &self.replica_id);
        {
            let element = state.elements.get_mut(&a).unwrap();
            element.position.pos = pos_b;
            element.position.clock = facet_clock_a.clone();
            element.summary_clock.merge(&facet_clock_a);
        }
        let facet_clock_b = Self::stamp_facet(&mut state, &self.replica_id);
        {
            let element = state.elements.get_mut(&b).unwrap();
            element.position.pos = pos_a;
            element.position.clock = facet_clock_b.clone();
            element.summary_clock.merge(&facet_clock_b);
        }
        state.view.invalidate();
        true
    }

    // --- bulk reorders -----------------------------------------------------

    pub fn sort_by(&self, compare: impl Fn(&T, &T) -> Ordering) {
        let mut state = self.state.write().unwrap();
        let mut ids = Self::live_ids(&state);
        ids.sort_by(|a, b| compare(state.elements[a].value(), state.elements[b].value()));
        Self::restamp_order(&mut state, &self.config, &self.replica_id, &ids);
    }

    pub fn reverse(&self) {
        let mut state = self.state.write().unwrap();
        let mut ids = Self::live_ids(&state);
        ids.reverse();
        Self::restamp_order(&mut state, &self.config, &self.replica_id, &ids);
    }

    pub fn rotate(&self, n: i64) {
        let mut state = self.state.write().unwrap();
        let ids = Self::live_ids(&state);
        if ids.is_empty() {
            return;
        }
        let shift = n.rem_euclid(ids.len() as i64) as usize;
        let mut rotated = ids.clone();
        rotated.rotate_left(shift);
        Self::restamp_order(&mut state, &self.config, &self.replica_id, &rotated);
    }

    /// Fisher-Yates shuffle driven by a caller-supplied index picker, `pick(bound)`
    /// returning a value used modulo `bound`. No randomness source lives in this
    /// crate; the embedder supplies one (e.g. backed by `rand`), keeping this crate's
    /// dependency stack free of a PRNG it otherwise has no use for.
    pub fn shuffle(&self, mut pick: impl FnMut(usize) -> usize) {
        let mut state = self.state.write().unwrap();
        let mut ids = Self::live_ids(&state);
        for i in (1..ids.len()).rev() {
            let j = pick(i + 1) % (i + 1);
            ids.swap(i, j);
        }
        Self::restamp_order(&mut state, &self.config, &self.replica_id, &ids);
    }

    // --- merge -----------------------------------------------------

    /// Merge `other`'s state into `self`. Acquires `self` exclusively and `other`
    /// shared. Per the concurrency model, callers must not merge two replicas
    /// bidirectionally on the same thread while another thread holds either side.
    pub fn merge(&self, other: &Self)
    where
        T: Clone,
    {
        let mut local = self.state.write().unwrap();
        let remote = other.state.read().unwrap();
        Self::merge_elements(&mut local, remote.elements.iter());
        local.clock.merge(&remote.clock);
        local.view.invalidate();
    }

    pub fn merge_snapshot(&self, snapshot: ReplicaSnapshot<T>) -> Result<(), Errors<SnapshotError>>
    where
        T: Clone,
    {
        let remote_elements = elements_from_snapshot(snapshot.elements)?;
        let mut local = self.state.write().unwrap();
        Self::merge_elements(&mut local, remote_elements.iter());
        local.clock.merge(&snapshot.clock);
        local.view.invalidate();
        Ok(())
    }

    fn merge_elements<'a>(
        local: &mut ReplicaState<T>,
        remote_elements: impl Iterator<Item = (&'a ElementId, &'a Element<T>)>,
    ) where
        T: Clone,
        T: 'a,
    {
        for (id, remote_element) in remote_elements {
            match local.elements.get_mut(id) {
                Some(local_element) => merge::merge_element(local_element, remote_element),
                None => {
                    local.elements.insert(*id, remote_element.clone());
                }
            }
            local.clock.merge(&remote_element.summary_clock);
        }
    }

    pub fn snapshot(&self) -> ReplicaSnapshot<T>
    where
        T: Clone,
    {
        let state = self.state.read().unwrap();
        ReplicaSnapshot {
            replica_id: self.replica_id.clone(),
            clock: state.clock.clone(),
            config: self.config.clone(),
            elements: state.elements.values().map(ElementSnapshot::from_element).collect(),
        }
    }

    pub fn from_snapshot(snapshot: ReplicaSnapshot<T>) -> Result<Self, Errors<SnapshotError>>
    where
        T: Clone,
    {
        let elements = elements_from_snapshot(snapshot.elements)?;
        Ok(Self::from_parts(snapshot.replica_id, snapshot.config, snapshot.clock, elements))
    }
}

impl<T: Clone> Clone for Replica<T> {
    fn clone(&self) -> Self {
        let state = self.state.read().unwrap();
        Self {
            replica_id: self.replica_id.clone(),
            config: self.config.clone(),
            state: RwLock::new(ReplicaState {
                clock: state.clock.clone(),
                elements: state.elements.clone(),
                view: View::new(),
            }),
        }
    }
}
