//! Per-facet last-writer-wins resolution and the delete-vs-move resurrection rule.

use marray_core::{ConcurrentWinner, VectorClock};

use crate::element::{Element, VersionedIndex, VersionedValue};

enum Winner {
    Local,
    Remote,
}

/// Resolve a single facet: the side whose clock dominates wins; concurrent clocks are
/// broken by the greater `dominant_replica`, a stable tiebreaker independent of merge
/// order. Equal clocks keep the local value (the facets are equal anyway).
fn resolve(local: &VectorClock, remote: &VectorClock) -> Winner {
    if remote.after(local) {
        Winner::Remote
    } else if local.after(remote) {
        Winner::Local
    } else if local == remote {
        Winner::Local
    } else {
        let winner = match VectorClock::tiebreak_concurrent(remote, local) {
            ConcurrentWinner::Left => Winner::Remote,
            ConcurrentWinner::Right => Winner::Local,
        };
        log::trace!(
            "concurrent facet clocks, tiebreaking by dominant replica: local={:?} remote={:?}",
            local.dominant_replica(),
            remote.dominant_replica()
        );
        winner
    }
}

fn merge_value<T: Clone>(local: &mut VersionedValue<T>, remote: &VersionedValue<T>) {
    if let Winner::Remote = resolve(&local.clock, &remote.clock) {
        local.data = remote.data.clone();
        local.clock = remote.clock.clone();
    }
}

fn merge_position(local: &mut VersionedIndex, remote: &VersionedIndex) {
    if let Winner::Remote = resolve(&local.clock, &remote.clock) {
        local.pos = remote.pos;
        local.clock = remote.clock.clone();
    }
}

struct Candidate<'a> {
    clock: &'a VectorClock,
    is_delete: bool,
}

/// A role-independent total order over clocks used only to break a tie between two
/// mutually concurrent candidates that also have the same `dominant_replica()` —
/// which can happen once three or more replicas share a common highest-lexicographic
/// ancestor component. Ranking by the clock's *full* sorted entry list, rather than
/// by the candidate's position in a caller-assembled list, guarantees both sides of
/// a `merge` land on the same winner regardless of which replica calls it.
fn canonical_clock_rank(clock: &VectorClock) -> Vec<(String, u64)> {
    let mut entries: Vec<(String, u64)> = clock.replicas().map(|r| (r.as_str().to_owned(), clock.get(r))).collect();
    entries.sort();
    entries
}

/// The delete-vs-move resurrection rule: build the up-to-four candidate operations,
/// pick the one not dominated by any other, breaking ties (mutually concurrent,
/// none dominated) by the greater `dominant_replica`, and any further tie (shared
/// `dominant_replica`) by `canonical_clock_rank`, so the outcome never depends on
/// which side of the merge is "local" and which is "remote".
fn resolve_deleted(
    local_delete: Option<&VectorClock>,
    remote_delete: Option<&VectorClock>,
    local_move: &VectorClock,
    remote_move: &VectorClock,
) -> (bool, Option<VectorClock>) {
    let mut candidates = Vec::with_capacity(4);
    if let Some(clock) = local_delete {
        candidates.push(Candidate { clock, is_delete: true });
    }
    if let Some(clock) = remote_delete {
        candidates.push(Candidate { clock, is_delete: true });
    }
    candidates.push(Candidate { clock: local_move, is_delete: false });
    candidates.push(Candidate { clock: remote_move, is_delete: false });

    let maximal: Vec<&Candidate> = candidates
        .iter()
        .filter(|candidate| {
            !candidates
                .iter()
                .any(|other| other.clock.after(candidate.clock))
        })
        .collect();

    let winner = if maximal.len() == 1 {
        maximal[0]
    } else {
        maximal
            .into_iter()
            .max_by(|a, b| {
                a.clock
                    .dominant_replica()
                    .cmp(&b.clock.dominant_replica())
                    .then_with(|| canonical_clock_rank(a.clock).cmp(&canonical_clock_rank(b.clock)))
            })
            .expect("at least one candidate is always present")
    };

    if winner.is_delete {
        (true, Some(winner.clock.clone()))
    } else {
        (false, None)
    }
}

/// Merge `remote` into `local` for an element known on both sides: per-facet LWW on
/// value and position, then the delete-vs-move resurrection rule, then summary clocks.
pub(crate) fn merge_element<T: Clone>(local: &mut Element<T>, remote: &Element<T>) {
    let local_move_clock = local.position.clock.clone();
    let remote_move_clock = remote.position.clock.clone();

    merge_value(&mut local.value, &remote.value);
    merge_position(&mut local.position, &remote.position);

    let (deleted, delete_clock) = resolve_deleted(
        local.delete_clock.as_ref(),
        remote.delete_clock.as_ref(),
        &local_move_clock,
        &remote_move_clock,
    );
    local.deleted = deleted;
    local.delete_clock = delete_clock;

    local.summary_clock.merge(&remote.summary_clock);
}

#[cfg(test)]
mod tests {
    use super::*;
    use marray_utils::ReplicaId;

    fn clock(replica: &str, n: u64) -> VectorClock {
        let id = ReplicaId::new(replica).unwrap();
        let mut c = VectorClock::new();
        for _ in 0..n {
            c.increment(&id);
        }
        c
    }

    fn multi_clock(entries: &[(&str, u64)]) -> VectorClock {
        let mut c = VectorClock::new();
        for &(replica, n) in entries {
            let id = ReplicaId::new(replica).unwrap();
            for _ in 0..n {
                c.increment(&id);
            }
        }
        c
    }

    #[test]
    fn move_after_delete_resurrects_when_move_dominates() {
        let delete = clock("r1", 1);
        let move_clock = clock("r1", 2);
        assert!(move_clock.after(&delete));

        let (deleted, _) = resolve_deleted(Some(&delete), None, &move_clock, &VectorClock::new());
        assert!(!deleted);
    }

    #[test]
    fn delete_after_move_stays_deleted() {
        let mv = clock("r1", 1);
        let mut delete = mv.clone();
        let r1 = ReplicaId::new("r1").unwrap();
        delete.increment(&r1);

        let (deleted, delete_clock) = resolve_deleted(Some(&delete), None, &mv, &VectorClock::new());
        assert!(deleted);
        assert_eq!(delete_clock.as_ref(), Some(&delete));
    }

    #[test]
    fn concurrent_delete_and_move_breaks_tie_by_dominant_replica() {
        let delete = clock("R1", 1);
        let mv = clock("R2", 1);
        assert!(delete.concurrent(&mv));

        let (deleted, _) = resolve_deleted(Some(&delete), None, &mv, &VectorClock::new());
        // "R2" > "R1" lexicographically, and it tags a move, so the element survives.
        assert!(!deleted);
    }

    #[test]
    fn concurrent_deletes_with_a_shared_dominant_replica_resolve_the_same_regardless_of_role() {
        // Both deletes carry a "z" component from a common ancestor, so their
        // `dominant_replica()` ties; the winner must still be decided by the clocks'
        // full content, not by which one happens to be passed as "local".
        let delete_a = multi_clock(&[("z", 1), ("r1", 5)]);
        let delete_b = multi_clock(&[("z", 1), ("r2", 3)]);
        assert!(delete_a.concurrent(&delete_b));
        assert_eq!(delete_a.dominant_replica(), delete_b.dominant_replica());

        let (deleted_ab, clock_ab) =
            resolve_deleted(Some(&delete_a), Some(&delete_b), &VectorClock::new(), &VectorClock::new());
        let (deleted_ba, clock_ba) =
            resolve_deleted(Some(&delete_b), Some(&delete_a), &VectorClock::new(), &VectorClock::new());

        assert!(deleted_ab);
        assert!(deleted_ba);
        assert_eq!(clock_ab, clock_ba);
    }
}
