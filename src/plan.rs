use crate::error::StorageError;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PlanEntry {
    pub old_id: i64,
    pub new_id: i64,
}

/// Mapping from current ids to 1-based ranks under the snapshot order.
///
/// The old and new id sets may overlap (a pure permutation overlaps fully),
/// so dependent remaps route through a staged range above both: `staged(n)`
/// is collision-free against every old id and every final id.
#[derive(Debug, Clone)]
pub(crate) struct RenumberPlan {
    entries: Vec<PlanEntry>,
    shift: i64,
}

impl RenumberPlan {
    /// `old_ids` must already be in the authoritative snapshot order.
    pub fn from_ordered_ids(table: &str, old_ids: &[i64]) -> Result<Self, StorageError> {
        let mut seen = HashSet::with_capacity(old_ids.len());
        for &id in old_ids {
            if !seen.insert(id) {
                return Err(StorageError::DuplicateKey {
                    table: table.to_string(),
                    key: id,
                });
            }
        }
        let len = old_ids.len() as i64;
        let max_old = old_ids.iter().copied().max().unwrap_or(0);
        let shift = max_old.max(len);
        if shift.checked_add(len).is_none() {
            return Err(StorageError::InvalidStatement {
                message: format!("staged remap for table '{table}' would overflow the id range"),
            });
        }
        let entries = old_ids
            .iter()
            .enumerate()
            .map(|(index, &old_id)| PlanEntry {
                old_id,
                new_id: index as i64 + 1,
            })
            .collect();
        Ok(Self { entries, shift })
    }

    pub fn is_noop(&self) -> bool {
        self.entries.iter().all(|e| e.old_id == e.new_id)
    }

    pub fn moves(&self) -> impl Iterator<Item = PlanEntry> + '_ {
        self.entries.iter().copied().filter(|e| e.old_id != e.new_id)
    }

    pub fn max_assigned(&self) -> i64 {
        self.entries.len() as i64
    }

    pub fn staged(&self, new_id: i64) -> i64 {
        new_id + self.shift
    }
}

#[cfg(test)]
mod tests {
    use super::RenumberPlan;
    use crate::error::StorageError;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn gapped_ids_map_to_ranks() {
        let plan = RenumberPlan::from_ordered_ids("agencies", &[5, 10, 15]).expect("plan");
        let moves: Vec<(i64, i64)> = plan.moves().map(|e| (e.old_id, e.new_id)).collect();
        assert_eq!(moves, vec![(5, 1), (10, 2), (15, 3)]);
        assert_eq!(plan.max_assigned(), 3);
        assert!(!plan.is_noop());
    }

    #[test]
    fn contiguous_ids_are_a_noop() {
        let plan = RenumberPlan::from_ordered_ids("agencies", &[1, 2, 3]).expect("plan");
        assert!(plan.is_noop());
        assert_eq!(plan.moves().count(), 0);
    }

    #[test]
    fn permutation_moves_every_row() {
        let plan = RenumberPlan::from_ordered_ids("agencies", &[2, 1]).expect("plan");
        let moves: Vec<(i64, i64)> = plan.moves().map(|e| (e.old_id, e.new_id)).collect();
        assert_eq!(moves, vec![(2, 1), (1, 2)]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = RenumberPlan::from_ordered_ids("agencies", &[3, 3]).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey { key: 3, .. }));
    }

    #[test]
    fn overflowing_stage_range_is_rejected() {
        let err = RenumberPlan::from_ordered_ids("agencies", &[i64::MAX]).unwrap_err();
        assert!(matches!(err, StorageError::InvalidStatement { .. }));
    }

    proptest! {
        #[test]
        fn new_ids_are_always_contiguous(ids in prop::collection::hash_set(1i64..10_000, 1..64)) {
            let ids: Vec<i64> = ids.into_iter().collect();
            let plan = RenumberPlan::from_ordered_ids("t", &ids).expect("plan");
            let mut new_ids: Vec<i64> = (1..=ids.len() as i64).collect();
            let mut assigned: Vec<i64> = plan.moves().map(|e| e.new_id).collect();
            assigned.extend(
                ids.iter()
                    .enumerate()
                    .filter(|&(i, &old)| old == i as i64 + 1)
                    .map(|(i, _)| i as i64 + 1),
            );
            assigned.sort_unstable();
            new_ids.sort_unstable();
            prop_assert_eq!(assigned, new_ids);
        }

        #[test]
        fn staged_range_never_collides(ids in prop::collection::hash_set(1i64..10_000, 1..64)) {
            let ids: Vec<i64> = ids.into_iter().collect();
            let plan = RenumberPlan::from_ordered_ids("t", &ids).expect("plan");
            let olds: HashSet<i64> = ids.iter().copied().collect();
            let finals: HashSet<i64> = (1..=ids.len() as i64).collect();
            for entry in plan.moves() {
                let staged = plan.staged(entry.new_id);
                prop_assert!(!olds.contains(&staged));
                prop_assert!(!finals.contains(&staged));
            }
        }

        #[test]
        fn noop_exactly_when_already_ranked(ids in prop::collection::hash_set(1i64..128, 1..32)) {
            let ids: Vec<i64> = ids.into_iter().collect();
            let plan = RenumberPlan::from_ordered_ids("t", &ids).expect("plan");
            let ranked = ids.iter().enumerate().all(|(i, &old)| old == i as i64 + 1);
            prop_assert_eq!(plan.is_noop(), ranked);
        }
    }
}
