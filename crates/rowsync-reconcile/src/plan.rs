//! Pure matching of desired rows against existing rows.
//!
//! # Design
//! - Matching is by business key only; primary keys supplied by callers are
//!   ignored.
//! - When several existing rows share a key the first one wins and the rest
//!   are planned for deletion. Two desired rows with the same key are a caller
//!   error; the second one is planned as an insert.

use std::collections::HashMap;
use std::hash::Hash;

/// Write plan for one parent's collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan<C> {
    /// Matched existing index for each desired index.
    pub matches: Vec<Option<usize>>,
    /// `(desired index, existing index, change)` for matched pairs that differ.
    pub updates: Vec<(usize, usize, C)>,
    /// Desired indexes without a match.
    pub inserts: Vec<usize>,
    /// Existing indexes without a match.
    pub deletes: Vec<usize>,
    /// Existing indexes shadowed by an earlier row with the same key; also in `deletes`.
    pub duplicates: Vec<usize>,
}

impl<C> Plan<C> {
    /// Whether executing the plan writes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.inserts.is_empty() && self.deletes.is_empty()
    }
}

/// Match `desired` against `existing` and compute the minimal write plan.
///
/// `diff` returns `None` when a matched pair needs no write.
pub fn plan<D, E, K, C>(
    desired: &[D],
    existing: &[E],
    key_of_desired: impl Fn(&D) -> K,
    key_of_existing: impl Fn(&E) -> K,
    diff: impl Fn(&D, &E) -> Option<C>,
) -> Plan<C>
where
    K: Eq + Hash,
{
    let mut index: HashMap<K, usize> = HashMap::with_capacity(existing.len());
    let mut duplicates = Vec::new();
    for (position, row) in existing.iter().enumerate() {
        let key = key_of_existing(row);
        if index.contains_key(&key) {
            duplicates.push(position);
        } else {
            index.insert(key, position);
        }
    }

    let mut claimed = vec![false; existing.len()];
    let mut matches = Vec::with_capacity(desired.len());
    let mut updates = Vec::new();
    let mut inserts = Vec::new();
    for (position, row) in desired.iter().enumerate() {
        match index.get(&key_of_desired(row)).copied() {
            Some(found) if !claimed[found] => {
                claimed[found] = true;
                matches.push(Some(found));
                if let Some(change) = diff(row, &existing[found]) {
                    updates.push((position, found, change));
                }
            }
            _ => {
                matches.push(None);
                inserts.push(position);
            }
        }
    }

    let deletes = (0..existing.len())
        .filter(|position| !claimed[*position])
        .collect();

    Plan {
        matches,
        updates,
        inserts,
        deletes,
        duplicates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Item = (&'static str, i32);

    fn run(desired: &[Item], existing: &[Item]) -> Plan<i32> {
        plan(
            desired,
            existing,
            |row| row.0,
            |row| row.0,
            |d, e| (d.1 != e.1).then_some(d.1),
        )
    }

    #[test]
    fn identical_sets_plan_nothing() {
        let rows = [("a", 1), ("b", 2)];
        let plan = run(&rows, &rows);
        assert!(plan.is_empty());
        assert_eq!(plan.matches, vec![Some(0), Some(1)]);
    }

    #[test]
    fn changed_rows_update_and_unmatched_rows_insert_or_delete() {
        let plan = run(&[("a", 5), ("c", 3)], &[("a", 1), ("b", 2)]);
        assert_eq!(plan.updates, vec![(0, 0, 5)]);
        assert_eq!(plan.inserts, vec![1]);
        assert_eq!(plan.deletes, vec![1]);
    }

    #[test]
    fn duplicate_existing_keys_keep_the_first() {
        let plan = run(&[("a", 1)], &[("a", 1), ("a", 9)]);
        assert_eq!(plan.matches, vec![Some(0)]);
        assert_eq!(plan.duplicates, vec![1]);
        assert_eq!(plan.deletes, vec![1]);
        assert!(plan.updates.is_empty());
    }

    #[test]
    fn duplicate_desired_keys_insert_the_second() {
        let plan = run(&[("a", 1), ("a", 1)], &[("a", 1)]);
        assert_eq!(plan.matches, vec![Some(0), None]);
        assert_eq!(plan.inserts, vec![1]);
    }

    #[test]
    fn empty_existing_inserts_everything_in_order() {
        let plan = run(&[("x", 1), ("y", 2), ("z", 3)], &[]);
        assert_eq!(plan.inserts, vec![0, 1, 2]);
        assert!(plan.deletes.is_empty());
    }
}
