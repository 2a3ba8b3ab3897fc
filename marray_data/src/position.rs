//! Fractional-index arithmetic for the positioning layer.
//!
//! Positions are never exposed to users; they are implementation state used only to
//! establish the materialized order. Every function here is pure: the mutation layer
//! decides what to do with the returned value (stamp it onto a facet, trigger a reindex).

use ordered_float::NotNan;

fn finite(value: f64) -> NotNan<f64> {
    NotNan::new(value).expect("position arithmetic produced a non-finite value")
}

/// Position for an append (`push`): one spacing past the current maximum, or
/// `initial_index` if the sequence is empty.
pub(crate) fn append(existing: &[NotNan<f64>], initial_index: f64, spacing: f64) -> NotNan<f64> {
    match existing.iter().max() {
        Some(max) => finite(max.into_inner() + spacing),
        None => finite(initial_index),
    }
}

/// Position for a prepend (`unshift`): one spacing before the current minimum, or
/// `initial_index` if the sequence is empty.
pub(crate) fn prepend(existing: &[NotNan<f64>], initial_index: f64, spacing: f64) -> NotNan<f64> {
    match existing.iter().min() {
        Some(min) => finite(min.into_inner() - spacing),
        None => finite(initial_index),
    }
}

/// Position for inserting at materialized index `k` into `ordered` (ascending, excluding
/// the element being placed). `k` is clamped to `[0, ordered.len()]` by the caller.
pub(crate) fn insert_at(ordered: &[NotNan<f64>], k: usize, initial_index: f64, spacing: f64) -> NotNan<f64> {
    let len = ordered.len();
    if ordered.is_empty() {
        finite(initial_index)
    } else if k == 0 {
        finite(ordered[0].into_inner() - spacing)
    } else if k >= len {
        finite(ordered[len - 1].into_inner() + spacing)
    } else {
        finite((ordered[k - 1].into_inner() + ordered[k].into_inner()) / 2.0)
    }
}

fn midpoint(a: NotNan<f64>, b: NotNan<f64>) -> NotNan<f64> {
    finite((a.into_inner() + b.into_inner()) / 2.0)
}

/// Position for `moveAfter(id, anchor)`: midpoint of `anchor` and its successor, or
/// `anchor + spacing` if `anchor` is currently the tail.
pub(crate) fn after(anchor: NotNan<f64>, successor: Option<NotNan<f64>>, spacing: f64) -> NotNan<f64> {
    match successor {
        Some(succ) => midpoint(anchor, succ),
        None => finite(anchor.into_inner() + spacing),
    }
}

/// Position for `moveBefore(id, anchor)`: midpoint of `anchor` and its predecessor, or
/// `anchor - spacing` if `anchor` is currently the head.
pub(crate) fn before(anchor: NotNan<f64>, predecessor: Option<NotNan<f64>>, spacing: f64) -> NotNan<f64> {
    match predecessor {
        Some(pred) => midpoint(pred, anchor),
        None => finite(anchor.into_inner() - spacing),
    }
}

/// Whether any two adjacent values in `ordered` (ascending) are closer than `threshold`.
pub(crate) fn needs_reindex(ordered: &[NotNan<f64>], threshold: f64) -> bool {
    ordered
        .windows(2)
        .any(|pair| (pair[1].into_inner() - pair[0].into_inner()) < threshold)
}

/// Renumbered positions `i * spacing` for `i = 1..=n`, in materialized order.
pub(crate) fn reindexed(n: usize, spacing: f64) -> Vec<NotNan<f64>> {
    (1..=n).map(|i| finite(i as f64 * spacing)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_to_empty_uses_initial_index() {
        assert_eq!(append(&[], 1000.0, 1000.0).into_inner(), 1000.0);
    }

    #[test]
    fn append_adds_one_spacing_past_max() {
        let existing = [finite(10.0), finite(20.0)];
        assert_eq!(append(&existing, 1000.0, 5.0).into_inner(), 25.0);
    }

    #[test]
    fn prepend_subtracts_one_spacing_from_min() {
        let existing = [finite(10.0), finite(20.0)];
        assert_eq!(prepend(&existing, 1000.0, 5.0).into_inner(), 5.0);
    }

    #[test]
    fn insert_at_head_and_tail_clamp_via_caller() {
        let ordered = [finite(10.0), finite(20.0), finite(30.0)];
        assert_eq!(insert_at(&ordered, 0, 1000.0, 5.0).into_inner(), 5.0);
        assert_eq!(insert_at(&ordered, 3, 1000.0, 5.0).into_inner(), 35.0);
    }

    #[test]
    fn insert_at_middle_is_midpoint() {
        let ordered = [finite(10.0), finite(20.0), finite(30.0)];
        assert_eq!(insert_at(&ordered, 1, 1000.0, 5.0).into_inner(), 15.0);
        assert_eq!(insert_at(&ordered, 2, 1000.0, 5.0).into_inner(), 25.0);
    }

    #[test]
    fn needs_reindex_detects_close_adjacent_positions() {
        let ordered = [finite(1.0), finite(1.00001), finite(2.0)];
        assert!(needs_reindex(&ordered, 1e-4));
        let spaced = [finite(1.0), finite(2.0), finite(3.0)];
        assert!(!needs_reindex(&spaced, 1e-4));
    }

    #[test]
    fn reindexed_produces_evenly_spaced_positions() {
        let positions = reindexed(3, 1000.0);
        assert_eq!(
            positions.iter().map(|p| p.into_inner()).collect::<Vec<_>>(),
            vec![1000.0, 2000.0, 3000.0]
        );
    }

    proptest::proptest! {
        #[test]
        fn reindexed_is_always_strictly_ascending_and_settles(n in 0usize..200, spacing in 1.0f64..1e6) {
            let positions = reindexed(n, spacing);
            proptest::prop_assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
            proptest::prop_assert!(!needs_reindex(&positions, 1e-9));
        }
    }
}
