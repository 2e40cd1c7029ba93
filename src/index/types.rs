//! Core index type definitions.
//!
//! Defines [`BlockPos`] (the integer coordinate that keys every container),
//! [`ContainerRecord`] (what one container holds), and the aggregate views returned
//! by search and listing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::world::{Position, SlotStack};

/// An integer block coordinate in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// Identifies one indexed container: always the primary half of a double container.
pub type ContainerLocation = BlockPos;

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// The block directly on top of this one.
    pub fn above(&self) -> Self {
        self.offset(0, 1, 0)
    }

    pub fn as_position(&self) -> Position {
        Position::new(self.x as f64, self.y as f64, self.z as f64)
    }

    /// Euclidean distance from `origin` to this block's corner coordinate.
    pub fn distance_from(&self, origin: &Position) -> f64 {
        origin.distance_to(&self.as_position())
    }
}

impl From<[i32; 3]> for BlockPos {
    fn from([x, y, z]: [i32; 3]) -> Self {
        Self::new(x, y, z)
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}

impl std::str::FromStr for BlockPos {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(format!("expected x,y,z but got: {s}"));
        }
        let parse = |p: &str| {
            p.parse::<i32>()
                .map_err(|e| format!("bad coordinate {p:?} in {s}: {e}"))
        };
        Ok(Self::new(parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
    }
}

/// Count and representative slot of one item kind inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemEntry {
    pub count: u32,
    /// First slot the item was seen in. `None` for entries created by a deposit.
    pub slot: Option<u32>,
}

/// The contents of one container, keyed by item identity.
///
/// An entry exists only while its count is positive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    items: BTreeMap<String, ItemEntry>,
}

impl ContainerRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from raw slot stacks, summing stacks of the same item.
    /// Empty stacks are ignored.
    pub fn from_stacks(stacks: &[SlotStack]) -> Self {
        let mut items: BTreeMap<String, ItemEntry> = BTreeMap::new();
        for stack in stacks.iter().filter(|s| s.count > 0) {
            items
                .entry(stack.item.clone())
                .and_modify(|e| e.count = e.count.saturating_add(stack.count))
                .or_insert(ItemEntry {
                    count: stack.count,
                    slot: stack.slot,
                });
        }
        Self { items }
    }

    pub fn get(&self, item: &str) -> Option<&ItemEntry> {
        self.items.get(item)
    }

    /// Count of `item` held here, zero when absent.
    pub fn count_of(&self, item: &str) -> u32 {
        self.items.get(item).map(|e| e.count).unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ItemEntry)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn item_names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Sum of all item counts in this container.
    pub fn total(&self) -> u64 {
        self.items.values().map(|e| e.count as u64).sum()
    }

    pub(crate) fn entry_mut(&mut self, item: &str) -> Option<&mut ItemEntry> {
        self.items.get_mut(item)
    }

    pub(crate) fn insert(&mut self, item: String, entry: ItemEntry) {
        self.items.insert(item, entry);
    }

    pub(crate) fn remove(&mut self, item: &str) -> Option<ItemEntry> {
        self.items.remove(item)
    }
}

/// Aggregate of one item identity across every container that holds it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ItemSummary {
    pub count: u64,
    pub containers: Vec<ContainerLocation>,
}

/// Result of an aggregate query: grand total plus per-item breakdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Aggregate {
    pub total: u64,
    pub matches: BTreeMap<String, ItemSummary>,
}

impl Aggregate {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(item: &str, count: u32, slot: u32) -> SlotStack {
        SlotStack {
            item: item.into(),
            count,
            slot: Some(slot),
        }
    }

    #[test]
    fn block_pos_round_trips_through_display() {
        let pos = BlockPos::new(-12, 70, 3);
        assert_eq!(pos.to_string(), "-12,70,3");
        assert_eq!("-12, 70, 3".parse::<BlockPos>().unwrap(), pos);
        assert!("1,2".parse::<BlockPos>().is_err());
        assert!("1,two,3".parse::<BlockPos>().is_err());
    }

    #[test]
    fn distance_uses_block_corner() {
        let origin = Position::new(0.0, 0.0, 0.0);
        assert_eq!(BlockPos::new(3, 4, 0).distance_from(&origin), 5.0);
    }

    #[test]
    fn record_sums_stacks_and_keeps_first_slot() {
        let record = ContainerRecord::from_stacks(&[
            stack("stone", 64, 0),
            stack("dirt", 12, 1),
            stack("stone", 10, 5),
            stack("air", 0, 6),
        ]);
        assert_eq!(record.len(), 2);
        assert_eq!(
            record.get("stone"),
            Some(&ItemEntry {
                count: 74,
                slot: Some(0)
            })
        );
        assert_eq!(record.count_of("dirt"), 12);
        assert_eq!(record.count_of("air"), 0);
        assert_eq!(record.total(), 86);
    }
}
