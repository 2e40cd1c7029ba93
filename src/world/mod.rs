//! Ports to the outside world.
//!
//! The engine never talks to a game connection directly. It drives an [`Agent`]:
//! something that can move ([`MobilityPort`]), look at blocks ([`WorldView`]), and
//! report what it carries ([`AgentInventory`]). Opening a container yields a
//! [`ContainerHandle`] that performs the actual item transfers.
//!
//! [`sim::SimulatedWorld`] implements every port in memory and is what the binary
//! and the tests run against.

pub mod sim;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::index::types::BlockPos;

/// A continuous position (agent location).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// One occupied slot as reported by an open container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStack {
    pub item: String,
    pub count: u32,
    #[serde(default)]
    pub slot: Option<u32>,
}

/// One item kind carried by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldStack {
    pub item: String,
    pub count: u32,
}

/// What a world query knows about a single block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl BlockInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// The right half of a double chest. Its inventory is served by the left half.
    pub fn is_secondary_half(&self) -> bool {
        self.properties.get("type").map(String::as_str) == Some("right")
    }
}

/// Read-only queries against world blocks.
pub trait WorldView: Send {
    /// The block at `pos`, or `None` if that part of the world is not loaded.
    fn block_at(&self, pos: BlockPos) -> Option<BlockInfo>;
}

/// Physical movement and container access for the single storage agent.
///
/// Every method that suspends is a travel or container step; nothing else in the
/// engine waits.
#[async_trait]
pub trait MobilityPort: Send {
    /// Current location of the agent, the reference point for distance ordering.
    fn position(&self) -> Position;

    /// Travel until within `tolerance` blocks of `target`.
    async fn move_near(&mut self, target: BlockPos, tolerance: u32) -> Result<()>;

    /// Travel onto `target` exactly.
    async fn move_to(&mut self, target: BlockPos) -> Result<()>;

    /// Travel until within `tolerance` blocks of the named player.
    async fn move_near_player(&mut self, player: &str, tolerance: u32) -> Result<()>;

    /// Open the container at `location`. The agent must already be in reach.
    async fn open_container(&mut self, location: BlockPos) -> Result<Box<dyn ContainerHandle>>;

    /// Break the block at `pos`.
    async fn clear_block(&mut self, pos: BlockPos) -> Result<()>;
}

/// An open container window.
#[async_trait]
pub trait ContainerHandle: Send {
    fn location(&self) -> BlockPos;

    /// Every occupied slot.
    fn contents(&self) -> Vec<SlotStack>;

    /// Move up to `amount` of `item` (from `slot` when given) into the agent's
    /// inventory. Returns how many actually moved.
    async fn withdraw(&mut self, item: &str, slot: Option<u32>, amount: u32) -> Result<u32>;

    /// Move up to `amount` of `item` from the agent into this container. Returns how
    /// many actually moved; less than `amount` means the container is full.
    async fn deposit(&mut self, item: &str, amount: u32) -> Result<u32>;

    async fn close(&mut self);
}

/// The agent's own inventory.
#[async_trait]
pub trait AgentInventory: Send {
    fn current_items(&self) -> Vec<HeldStack>;

    /// Count held of one item kind.
    fn held(&self, item: &str) -> u32 {
        self.current_items()
            .iter()
            .filter(|s| s.item == item)
            .map(|s| s.count)
            .sum()
    }

    /// Throw up to `amount` of `item` toward whoever is in front of the agent.
    async fn toss(&mut self, item: &str, amount: u32) -> Result<u32>;
}

/// Everything the engine needs from the storage agent.
pub trait Agent: MobilityPort + WorldView + AgentInventory {}

impl<T: MobilityPort + WorldView + AgentInventory> Agent for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn right_half_is_secondary() {
        let right = BlockInfo::new("chest").with_property("type", "right");
        let left = BlockInfo::new("chest").with_property("type", "left");
        let single = BlockInfo::new("chest");
        assert!(right.is_secondary_half());
        assert!(!left.is_secondary_half());
        assert!(!single.is_secondary_half());
    }

    #[test]
    fn position_distance() {
        let a = Position::new(1.0, 2.0, 3.0);
        let b = Position::new(1.0, 2.0, 7.0);
        assert_eq!(a.distance_to(&b), 4.0);
        assert_eq!(b.distance_to(&a), 4.0);
    }
}
