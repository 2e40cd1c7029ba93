//! The authoritative in-memory storage index.
//!
//! [`StorageIndex`] co-maintains two structures: container location → contents, and
//! item identity → locations holding it. Every mutation goes through a method here so
//! the two views never disagree: a location is listed under an item exactly when that
//! container's record holds a positive count of the item.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{Result, StockpileError};
use crate::index::types::{Aggregate, ContainerLocation, ContainerRecord, ItemEntry};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageIndex {
    contents: BTreeMap<ContainerLocation, ContainerRecord>,
    /// Locations per item, in the order they were first recorded for that item.
    locations: HashMap<String, Vec<ContainerLocation>>,
}

impl StorageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever was known about `loc` with `record`.
    ///
    /// Items that disappeared from the container drop `loc` from their location list;
    /// items that appeared get `loc` appended. Zero-count entries are dropped.
    /// Recording the same contents twice leaves the index unchanged.
    pub fn record_container(&mut self, loc: ContainerLocation, mut record: ContainerRecord) {
        let empty: Vec<String> = record
            .iter()
            .filter(|(_, entry)| entry.count == 0)
            .map(|(name, _)| name.to_owned())
            .collect();
        for name in &empty {
            record.remove(name);
        }

        if let Some(previous) = self.contents.get(&loc) {
            let gone: Vec<String> = previous
                .item_names()
                .filter(|name| record.get(name).is_none())
                .map(str::to_owned)
                .collect();
            for name in gone {
                self.unlink(&name, loc);
            }
        }

        for name in record.item_names() {
            self.link(name, loc);
        }

        self.contents.insert(loc, record);
    }

    /// Remove `amount` of `item` from the record at `loc`.
    ///
    /// The amount must not exceed the indexed count. When the count reaches zero the
    /// entry is deleted and `loc` leaves the item's location list. Returns the count
    /// left behind.
    pub fn apply_withdrawal(
        &mut self,
        loc: ContainerLocation,
        item: &str,
        amount: u32,
    ) -> Result<u32> {
        let record = self.contents.get_mut(&loc).ok_or_else(|| {
            StockpileError::IndexInconsistency(format!("withdrawal from unindexed container {loc}"))
        })?;
        let entry = record.entry_mut(item).ok_or_else(|| {
            StockpileError::IndexInconsistency(format!("withdrawal of {item} not indexed at {loc}"))
        })?;

        if amount > entry.count {
            return Err(StockpileError::IndexInconsistency(format!(
                "withdrawal of {amount} {item} exceeds indexed count {} at {loc}",
                entry.count
            )));
        }

        entry.count -= amount;
        let left = entry.count;
        if left == 0 {
            record.remove(item);
            self.unlink(item, loc);
        }
        Ok(left)
    }

    /// Add `amount` of `item` to the record at `loc`, creating the entry if needed.
    ///
    /// `loc` must already be indexed. Returns the new count.
    pub fn apply_deposit(&mut self, loc: ContainerLocation, item: &str, amount: u32) -> Result<u32> {
        let record = self.contents.get_mut(&loc).ok_or_else(|| {
            StockpileError::IndexInconsistency(format!("deposit into unindexed container {loc}"))
        })?;
        if amount == 0 {
            return Ok(record.count_of(item));
        }

        let count = match record.entry_mut(item) {
            Some(entry) => {
                entry.count = entry.count.checked_add(amount).ok_or_else(|| {
                    StockpileError::IndexInconsistency(format!("count overflow for {item} at {loc}"))
                })?;
                entry.count
            }
            None => {
                record.insert(item.to_string(), ItemEntry { count: amount, slot: None });
                amount
            }
        };

        self.link(item, loc);
        Ok(count)
    }

    /// Sum every item whose identity satisfies `predicate`. Read-only.
    pub fn aggregate<F>(&self, predicate: F) -> Aggregate
    where
        F: Fn(&str) -> bool,
    {
        let mut result = Aggregate::default();
        for (loc, record) in &self.contents {
            for (name, entry) in record.iter().filter(|&(name, _)| predicate(name)) {
                let summary = result.matches.entry(name.to_string()).or_default();
                summary.count += entry.count as u64;
                summary.containers.push(*loc);
                result.total += entry.count as u64;
            }
        }
        result
    }

    /// Locations holding `item`, in discovery order. Empty when unknown.
    pub fn locations_of(&self, item: &str) -> &[ContainerLocation] {
        self.locations.get(item).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn record(&self, loc: &ContainerLocation) -> Option<&ContainerRecord> {
        self.contents.get(loc)
    }

    /// Indexed count of `item` at `loc`, zero when either is unknown.
    pub fn count_at(&self, loc: &ContainerLocation, item: &str) -> u32 {
        self.contents
            .get(loc)
            .map(|r| r.count_of(item))
            .unwrap_or(0)
    }

    /// Every known container, empty ones included, in coordinate order.
    pub fn containers(&self) -> impl Iterator<Item = (&ContainerLocation, &ContainerRecord)> {
        self.contents.iter()
    }

    pub fn container_count(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Verify that both views agree. Used by tests and diagnostics.
    pub fn check_invariants(&self) -> Result<()> {
        for (loc, record) in &self.contents {
            for (name, entry) in record.iter() {
                if entry.count == 0 {
                    return Err(StockpileError::IndexInconsistency(format!(
                        "zero-count entry for {name} at {loc}"
                    )));
                }
                if !self.locations_of(name).contains(loc) {
                    return Err(StockpileError::IndexInconsistency(format!(
                        "{loc} holds {name} but is not listed under it"
                    )));
                }
            }
        }

        for (name, locs) in &self.locations {
            let mut seen = HashSet::new();
            for loc in locs {
                if !seen.insert(loc) {
                    return Err(StockpileError::IndexInconsistency(format!(
                        "{loc} listed twice under {name}"
                    )));
                }
                if self.count_at(loc, name) == 0 {
                    return Err(StockpileError::IndexInconsistency(format!(
                        "{loc} listed under {name} but holds none"
                    )));
                }
            }
            if locs.is_empty() {
                return Err(StockpileError::IndexInconsistency(format!(
                    "empty location list kept for {name}"
                )));
            }
        }
        Ok(())
    }

    fn link(&mut self, item: &str, loc: ContainerLocation) {
        let locs = self.locations.entry(item.to_string()).or_default();
        if !locs.contains(&loc) {
            locs.push(loc);
        }
    }

    fn unlink(&mut self, item: &str, loc: ContainerLocation) {
        if let Some(locs) = self.locations.get_mut(item) {
            locs.retain(|l| *l != loc);
            if locs.is_empty() {
                self.locations.remove(item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::SlotStack;

    fn record(items: &[(&str, u32)]) -> ContainerRecord {
        let stacks: Vec<SlotStack> = items
            .iter()
            .enumerate()
            .map(|(i, (name, count))| SlotStack {
                item: name.to_string(),
                count: *count,
                slot: Some(i as u32),
            })
            .collect();
        ContainerRecord::from_stacks(&stacks)
    }

    fn loc(x: i32) -> ContainerLocation {
        ContainerLocation::new(x, 64, 0)
    }

    #[test]
    fn record_container_links_every_item() {
        let mut index = StorageIndex::new();
        index.record_container(loc(0), record(&[("stick", 3), ("stone", 64)]));
        index.record_container(loc(1), record(&[("stick", 10)]));

        assert_eq!(index.locations_of("stick"), &[loc(0), loc(1)]);
        assert_eq!(index.locations_of("stone"), &[loc(0)]);
        assert!(index.locations_of("dirt").is_empty());
        index.check_invariants().unwrap();
    }

    #[test]
    fn record_container_replaces_previous_contents() {
        let mut index = StorageIndex::new();
        index.record_container(loc(0), record(&[("stick", 3), ("stone", 64)]));
        index.record_container(loc(0), record(&[("stone", 5), ("dirt", 1)]));

        assert!(index.locations_of("stick").is_empty());
        assert_eq!(index.count_at(&loc(0), "stone"), 5);
        assert_eq!(index.locations_of("dirt"), &[loc(0)]);
        index.check_invariants().unwrap();
    }

    #[test]
    fn record_container_is_idempotent() {
        let mut index = StorageIndex::new();
        index.record_container(loc(0), record(&[("stick", 3)]));
        index.record_container(loc(1), record(&[("stick", 4)]));
        let before = index.clone();

        index.record_container(loc(0), record(&[("stick", 3)]));
        assert_eq!(index, before);
    }

    #[test]
    fn zero_count_entries_are_not_recorded() {
        let record: ContainerRecord = serde_json::from_str(
            r#"{"items":{"stick":{"count":0,"slot":null},"stone":{"count":2,"slot":1}}}"#,
        )
        .unwrap();
        let mut index = StorageIndex::new();
        index.record_container(loc(0), record);

        let stored = index.record(&loc(0)).unwrap();
        assert!(stored.get("stick").is_none());
        assert_eq!(stored.count_of("stone"), 2);
        assert!(index.locations_of("stick").is_empty());
        index.check_invariants().unwrap();
    }

    #[test]
    fn empty_containers_are_still_known() {
        let mut index = StorageIndex::new();
        index.record_container(loc(0), ContainerRecord::new());
        assert_eq!(index.container_count(), 1);
        assert!(index.record(&loc(0)).unwrap().is_empty());
        index.check_invariants().unwrap();
    }

    #[test]
    fn withdrawal_to_zero_deletes_entry() {
        let mut index = StorageIndex::new();
        index.record_container(loc(0), record(&[("stick", 3)]));
        index.record_container(loc(1), record(&[("stick", 10)]));

        assert_eq!(index.apply_withdrawal(loc(0), "stick", 3).unwrap(), 0);
        assert_eq!(index.apply_withdrawal(loc(1), "stick", 2).unwrap(), 8);

        assert!(index.record(&loc(0)).unwrap().get("stick").is_none());
        assert_eq!(index.locations_of("stick"), &[loc(1)]);
        index.check_invariants().unwrap();
    }

    #[test]
    fn over_withdrawal_is_rejected_before_mutation() {
        let mut index = StorageIndex::new();
        index.record_container(loc(0), record(&[("stick", 3)]));
        let before = index.clone();

        let err = index.apply_withdrawal(loc(0), "stick", 4).unwrap_err();
        assert!(matches!(err, StockpileError::IndexInconsistency(_)));
        assert_eq!(index, before);

        let err = index.apply_withdrawal(loc(9), "stick", 1).unwrap_err();
        assert!(err.is_fatal());
        let err = index.apply_withdrawal(loc(0), "stone", 1).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn deposit_creates_and_links_entry() {
        let mut index = StorageIndex::new();
        index.record_container(loc(0), ContainerRecord::new());

        assert_eq!(index.apply_deposit(loc(0), "dirt", 64).unwrap(), 64);
        assert_eq!(index.apply_deposit(loc(0), "dirt", 6).unwrap(), 70);
        assert_eq!(index.locations_of("dirt"), &[loc(0)]);
        assert_eq!(index.record(&loc(0)).unwrap().get("dirt").unwrap().slot, None);
        index.check_invariants().unwrap();
    }

    #[test]
    fn deposit_into_unknown_container_is_rejected() {
        let mut index = StorageIndex::new();
        let err = index.apply_deposit(loc(3), "dirt", 1).unwrap_err();
        assert!(matches!(err, StockpileError::IndexInconsistency(_)));
        assert!(index.is_empty());
    }

    #[test]
    fn zero_deposit_does_not_create_entry() {
        let mut index = StorageIndex::new();
        index.record_container(loc(0), ContainerRecord::new());
        assert_eq!(index.apply_deposit(loc(0), "dirt", 0).unwrap(), 0);
        assert!(index.locations_of("dirt").is_empty());
        index.check_invariants().unwrap();
    }

    #[test]
    fn aggregate_sums_across_containers() {
        let mut index = StorageIndex::new();
        index.record_container(loc(0), record(&[("stone", 64), ("dirt", 2)]));
        index.record_container(loc(1), record(&[("cobblestone", 32), ("stone", 1)]));

        let all = index.aggregate(|_| true);
        assert_eq!(all.total, 99);
        assert_eq!(all.matches["stone"].count, 65);
        assert_eq!(all.matches["stone"].containers, vec![loc(0), loc(1)]);

        let stone = index.aggregate(|name| name.contains("stone"));
        assert_eq!(stone.total, 97);
        assert_eq!(stone.matches.len(), 2);
    }

    #[test]
    fn invariants_hold_across_mixed_sequence() {
        let mut index = StorageIndex::new();
        index.record_container(loc(0), record(&[("stick", 5)]));
        index.record_container(loc(1), ContainerRecord::new());
        index.check_invariants().unwrap();

        index.apply_deposit(loc(1), "stick", 7).unwrap();
        index.check_invariants().unwrap();
        index.apply_withdrawal(loc(0), "stick", 5).unwrap();
        index.check_invariants().unwrap();
        index.record_container(loc(0), record(&[("stick", 1)]));
        index.check_invariants().unwrap();
        index.apply_withdrawal(loc(1), "stick", 7).unwrap();
        index.check_invariants().unwrap();

        assert_eq!(index.locations_of("stick"), &[loc(0)]);
        assert_eq!(index.aggregate(|n| n == "stick").total, 1);
    }
}
