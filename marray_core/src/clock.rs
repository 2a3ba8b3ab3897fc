//! [[VectorClock]] tracks per-replica causality for every versioned facet in the system.
//!
//! This is a direct generalization of the teacher's fixed-arity, position-indexed version
//! vector to an open, replica-id-keyed map: a new replica simply appears as a fresh entry
//! with an implicit count of zero everywhere else, so there is no notion of an
//! "incomparable" clock the way there is for two fixed-length vectors of different arity.

use std::cmp;

use ahash::AHashMap;
use itertools::Itertools;
use marray_utils::ReplicaId;

/// Establishes the "happened-before" order between two comparable values.
///
/// This is a form of partial order; the additional variant beyond [[cmp::Ordering]] is
/// "concurrent", for values that are causally unrelated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HappenedBeforeOrdering {
    /// `a` happened strictly before `b`.
    Before,
    /// `a == b`.
    Equal,
    /// `a` happened strictly after `b`.
    After,
    /// `a` and `b` are concurrent: neither dominates the other.
    Concurrent,
}

impl HappenedBeforeOrdering {
    /// Reverses the ordering. `Before` becomes `After` and vice versa; everything else
    /// stays the same.
    pub const fn reverse(self) -> HappenedBeforeOrdering {
        match self {
            HappenedBeforeOrdering::Before => HappenedBeforeOrdering::After,
            HappenedBeforeOrdering::After => HappenedBeforeOrdering::Before,
            other => other,
        }
    }
}

impl From<cmp::Ordering> for HappenedBeforeOrdering {
    fn from(value: cmp::Ordering) -> Self {
        match value {
            cmp::Ordering::Less => HappenedBeforeOrdering::Before,
            cmp::Ordering::Equal => HappenedBeforeOrdering::Equal,
            cmp::Ordering::Greater => HappenedBeforeOrdering::After,
        }
    }
}

/// Trait for types that can establish a [happened-before order](HappenedBeforeOrdering).
pub trait HappenedBeforeOrd<Rhs = Self>: PartialEq<Rhs>
where
    Rhs: ?Sized,
{
    fn hb_cmp(&self, other: &Rhs) -> HappenedBeforeOrdering;
}

/// A mapping from replica id to a monotonically increasing counter.
///
/// Absent entries are treated as zero everywhere: `after`/`concurrent`/`merge` all behave
/// as if every [[VectorClock]] implicitly has every replica id in scope, pinned at zero
/// until that replica increments it.
#[derive(Clone, Debug, Default)]
pub struct VectorClock {
    entries: AHashMap<ReplicaId, u64>,
}

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// The counter for `replica`, or `0` if it has never been observed.
    pub fn get(&self, replica: &ReplicaId) -> u64 {
        self.entries.get(replica).copied().unwrap_or(0)
    }

    /// Advance `replica`'s counter by one and return the new value.
    pub fn increment(&mut self, replica: &ReplicaId) -> u64 {
        let entry = self.entries.entry(replica.clone()).or_insert(0);
        *entry = entry.checked_add(1).expect("vector clock counter overflow");
        *entry
    }

    /// A deep copy of this clock, for stamping a facet before a further local increment.
    ///
    /// Named separately from [[Clone::clone]] to match the spec's two-step local-write
    /// sequence: fork, then increment the fork. Every call returns an independent map, so
    /// two elements stamped from two separate forks never share backing storage.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Pointwise max-merge `other` into `self`.
    pub fn merge(&mut self, other: &Self) {
        for (replica, &count) in other.entries.iter() {
            let entry = self.entries.entry(replica.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
    }

    /// A new clock equal to the pointwise max of `self` and `other`, leaving both unchanged.
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// Whether `self` strictly dominates `other`: every component of `self` is `>=` the
    /// corresponding component of `other`, and at least one is strictly greater.
    pub fn after(&self, other: &Self) -> bool {
        self.hb_cmp(other) == HappenedBeforeOrdering::After
    }

    /// Whether neither clock dominates the other.
    pub fn concurrent(&self, other: &Self) -> bool {
        self.hb_cmp(other) == HappenedBeforeOrdering::Concurrent
    }

    /// The lexicographically largest replica id with a nonzero counter, used only as a
    /// deterministic tiebreaker between concurrent clocks. `None` for a clock with no
    /// nonzero entries.
    pub fn dominant_replica(&self) -> Option<&ReplicaId> {
        self.entries
            .iter()
            .filter(|&(_, &count)| count > 0)
            .map(|(replica, _)| replica)
            .max()
    }

    /// Iterate over the replica ids this clock has an entry for (not necessarily nonzero).
    pub fn replicas(&self) -> impl Iterator<Item = &ReplicaId> {
        self.entries.keys()
    }

    /// Pick the clock with the greater [[dominant_replica]] between two mutually concurrent
    /// clocks. Panics in debug builds if neither clock has a nonzero entry, since that can
    /// only happen for two empty clocks, which are equal, not concurrent.
    pub fn tiebreak_concurrent<'a>(a: &'a Self, b: &'a Self) -> ConcurrentWinner {
        debug_assert!(a.concurrent(b), "tiebreak_concurrent requires concurrent clocks");
        match (a.dominant_replica(), b.dominant_replica()) {
            (Some(ra), Some(rb)) if ra > rb => ConcurrentWinner::Left,
            (Some(_), Some(_)) => ConcurrentWinner::Right,
            (Some(_), None) => ConcurrentWinner::Left,
            (None, Some(_)) => ConcurrentWinner::Right,
            (None, None) => unreachable!("concurrent clocks with no nonzero entries"),
        }
    }
}

/// Which side won a [[VectorClock::tiebreak_concurrent]] call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConcurrentWinner {
    Left,
    Right,
}

impl PartialEq for VectorClock {
    fn eq(&self, other: &Self) -> bool {
        self.hb_cmp(other) == HappenedBeforeOrdering::Equal
    }
}
impl Eq for VectorClock {}

/// This is somewhat equivalent to a `Set<Ordering>`, just much more compact, and lets
/// `hb_cmp` bail out the moment both a `Less` and a `Greater` have been seen.
struct EncounteredOrderings {
    has_less: bool,
    has_greater: bool,
}
impl EncounteredOrderings {
    const fn none() -> Self {
        Self {
            has_less: false,
            has_greater: false,
        }
    }

    fn update(&mut self, ord: cmp::Ordering) {
        match ord {
            cmp::Ordering::Less => self.has_less = true,
            cmp::Ordering::Equal => {}
            cmp::Ordering::Greater => self.has_greater = true,
        }
    }

    fn has_less_and_greater(&self) -> bool {
        self.has_less && self.has_greater
    }

    fn resolve(&self) -> HappenedBeforeOrdering {
        match (self.has_less, self.has_greater) {
            (false, false) => HappenedBeforeOrdering::Equal,
            (true, false) => HappenedBeforeOrdering::Before,
            (false, true) => HappenedBeforeOrdering::After,
            (true, true) => HappenedBeforeOrdering::Concurrent,
        }
    }
}

impl HappenedBeforeOrd for VectorClock {
    fn hb_cmp(&self, other: &Self) -> HappenedBeforeOrdering {
        let mut orderings = EncounteredOrderings::none();
        for replica in self.entries.keys().chain(other.entries.keys()).unique() {
            orderings.update(self.get(replica).cmp(&other.get(replica)));
            if orderings.has_less_and_greater() {
                // We can stop checking early in this case.
                return HappenedBeforeOrdering::Concurrent;
            }
        }
        orderings.resolve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashmap;
    use proptest::prelude::*;

    fn clock(entries: std::collections::HashMap<&str, u64>) -> VectorClock {
        let mut vc = VectorClock::new();
        for (replica, count) in entries {
            let id = ReplicaId::new(replica).unwrap();
            for _ in 0..count {
                vc.increment(&id);
            }
        }
        vc
    }

    #[test]
    fn empty_clocks_are_equal() {
        assert_eq!(VectorClock::new(), VectorClock::new());
        assert_eq!(VectorClock::new().hb_cmp(&VectorClock::new()), HappenedBeforeOrdering::Equal);
    }

    #[test]
    fn absent_entries_are_treated_as_zero() {
        let a = clock(hashmap! {"r1" => 1});
        let b = VectorClock::new();
        assert_eq!(a.hb_cmp(&b), HappenedBeforeOrdering::After);
        assert_eq!(b.hb_cmp(&a), HappenedBeforeOrdering::Before);
        assert!(a.after(&b));
        assert!(!b.after(&a));
    }

    #[test]
    fn disjoint_replicas_are_concurrent() {
        let a = clock(hashmap! {"r1" => 1});
        let b = clock(hashmap! {"r2" => 1});
        assert!(a.concurrent(&b));
        assert!(b.concurrent(&a));
    }

    #[test]
    fn mixed_components_are_concurrent() {
        let a = clock(hashmap! {"r1" => 2, "r2" => 1});
        let b = clock(hashmap! {"r1" => 1, "r2" => 2});
        assert_eq!(a.hb_cmp(&b), HappenedBeforeOrdering::Concurrent);
    }

    #[test]
    fn merge_is_pointwise_max() {
        let mut a = clock(hashmap! {"r1" => 2, "r2" => 1});
        let b = clock(hashmap! {"r1" => 1, "r2" => 5, "r3" => 3});
        a.merge(&b);
        let r1 = ReplicaId::new("r1").unwrap();
        let r2 = ReplicaId::new("r2").unwrap();
        let r3 = ReplicaId::new("r3").unwrap();
        assert_eq!(a.get(&r1), 2);
        assert_eq!(a.get(&r2), 5);
        assert_eq!(a.get(&r3), 3);
    }

    #[test]
    fn dominant_replica_is_lexicographically_largest_nonzero() {
        let clock = clock(hashmap! {"alice" => 1, "zeus" => 1, "bob" => 0});
        assert_eq!(clock.dominant_replica().map(|r| r.as_str()), Some("zeus"));
    }

    #[test]
    fn dominant_replica_of_empty_clock_is_none() {
        assert_eq!(VectorClock::new().dominant_replica(), None);
    }

    #[test]
    fn tiebreak_concurrent_picks_larger_dominant_replica() {
        let r1 = clock(hashmap! {"R1" => 1});
        let r2 = clock(hashmap! {"R2" => 1});
        assert!(r1.concurrent(&r2));
        assert_eq!(VectorClock::tiebreak_concurrent(&r1, &r2), ConcurrentWinner::Right);
        assert_eq!(VectorClock::tiebreak_concurrent(&r2, &r1), ConcurrentWinner::Left);
    }

    #[test]
    fn fork_then_increment_never_aliases_the_source() {
        let r1 = ReplicaId::new("r1").unwrap();
        let mut base = VectorClock::new();
        base.increment(&r1);

        let mut forked = base.fork();
        forked.increment(&r1);

        assert_eq!(base.get(&r1), 1);
        assert_eq!(forked.get(&r1), 2);
    }

    proptest! {
        #[test]
        fn reflexive(counts in proptest::collection::vec((0u8..5, 0u64..5), 0..5)) {
            let mut vc = VectorClock::new();
            for (replica, count) in counts {
                let id = ReplicaId::new(format!("r{replica}")).unwrap();
                for _ in 0..count {
                    vc.increment(&id);
                }
            }
            prop_assert_eq!(vc.hb_cmp(&vc), HappenedBeforeOrdering::Equal);
            prop_assert_eq!(&vc, &vc);
        }

        #[test]
        fn antisymmetric(
            left in proptest::collection::vec((0u8..5, 0u64..5), 0..5),
            right in proptest::collection::vec((0u8..5, 0u64..5), 0..5),
        ) {
            let build = |counts: Vec<(u8, u64)>| {
                let mut vc = VectorClock::new();
                for (replica, count) in counts {
                    let id = ReplicaId::new(format!("r{replica}")).unwrap();
                    for _ in 0..count {
                        vc.increment(&id);
                    }
                }
                vc
            };
            let a = build(left);
            let b = build(right);
            prop_assert_eq!(a.hb_cmp(&b), b.hb_cmp(&a).reverse());
        }

        #[test]
        fn merge_dominates_both_sides(
            left in proptest::collection::vec((0u8..5, 0u64..5), 0..5),
            right in proptest::collection::vec((0u8..5, 0u64..5), 0..5),
        ) {
            let build = |counts: Vec<(u8, u64)>| {
                let mut vc = VectorClock::new();
                for (replica, count) in counts {
                    let id = ReplicaId::new(format!("r{replica}")).unwrap();
                    for _ in 0..count {
                        vc.increment(&id);
                    }
                }
                vc
            };
            let a = build(left);
            let b = build(right);
            let merged = a.merged(&b);
            let a_cmp = merged.hb_cmp(&a);
            prop_assert!(matches!(a_cmp, HappenedBeforeOrdering::After | HappenedBeforeOrdering::Equal));
            let b_cmp = merged.hb_cmp(&b);
            prop_assert!(matches!(b_cmp, HappenedBeforeOrdering::After | HappenedBeforeOrdering::Equal));
        }
    }
}
