//! In-memory world backend.
//!
//! [`SimulatedWorld`] holds blocks, chest inventories, the agent, and online players
//! behind one shared lock. [`SimulatedAgent`] is the [`Agent`](super::Agent) view of
//! it handed to the engine; the world handle itself stays with the caller for
//! inspection. Worlds are built either from a JSON fixture file or with the builder
//! methods used throughout the tests.
//!
//! Failure injection: unreachable locations, containers that refuse to open, and
//! containers whose transfers break after a given number of items.

use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

use super::{
    AgentInventory, BlockInfo, ContainerHandle, HeldStack, MobilityPort, Position, SlotStack,
    WorldView,
};
use crate::error::{Result, StockpileError};
use crate::index::types::BlockPos;

/// Items per slot.
pub const STACK_SIZE: u32 = 64;
pub const SINGLE_CHEST_SLOTS: usize = 27;
pub const DOUBLE_CHEST_SLOTS: usize = 54;

// ── Fixture format ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WorldFixture {
    pub agent: FixtureAgent,
    pub chests: Vec<FixtureChest>,
    pub blocks: Vec<FixtureBlock>,
    pub players: Vec<FixturePlayer>,
    pub failures: FixtureFailures,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FixtureAgent {
    pub position: [f64; 3],
    pub inventory: Vec<HeldStack>,
}

#[derive(Debug, Deserialize)]
pub struct FixtureChest {
    pub at: [i32; 3],
    #[serde(default = "default_chest_name")]
    pub name: String,
    /// Second half of a double chest. The chest at `at` becomes the primary half.
    #[serde(default)]
    pub partner: Option<[i32; 3]>,
    #[serde(default)]
    pub items: Vec<HeldStack>,
}

#[derive(Debug, Deserialize)]
pub struct FixtureBlock {
    pub at: [i32; 3],
    pub name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct FixturePlayer {
    pub name: String,
    pub position: [f64; 3],
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FixtureFailures {
    pub unreachable: Vec<[i32; 3]>,
    pub fail_open: Vec<[i32; 3]>,
    pub withdraw_limits: Vec<FixtureLimit>,
}

#[derive(Debug, Deserialize)]
pub struct FixtureLimit {
    pub at: [i32; 3],
    pub limit: u32,
}

fn default_chest_name() -> String {
    "chest".into()
}

// ── Shared state ─────────────────────────────────────────────────────────────

/// Something the agent did, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    Travelled(BlockPos),
    Opened(BlockPos),
    Cleared(BlockPos),
    MetPlayer(String),
}

#[derive(Debug, Default)]
struct SimContainer {
    slots: Vec<Option<(String, u32)>>,
}

impl SimContainer {
    fn with_slots(n: usize) -> Self {
        Self {
            slots: vec![None; n],
        }
    }

    /// A container at `at` filled with `items`. Whatever does not fit is dropped
    /// with a warning.
    fn stocked(at: BlockPos, slots: usize, items: &[(&str, u32)]) -> Self {
        let mut container = Self::with_slots(slots);
        for (item, count) in items {
            let stored = container.insert(item, *count);
            if stored < *count {
                warn!(
                    location = %at,
                    item = %item,
                    dropped = count - stored,
                    "chest is full, dropping fixture items"
                );
            }
        }
        container
    }

    fn contents(&self) -> Vec<SlotStack> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| {
                s.as_ref().map(|(item, count)| SlotStack {
                    item: item.clone(),
                    count: *count,
                    slot: Some(i as u32),
                })
            })
            .collect()
    }

    fn count_of(&self, item: &str) -> u32 {
        self.slots
            .iter()
            .flatten()
            .filter(|(name, _)| name == item)
            .map(|(_, c)| *c)
            .sum()
    }

    /// Fill matching stacks first, then empty slots. Returns how many fit.
    fn insert(&mut self, item: &str, amount: u32) -> u32 {
        let mut left = amount;
        for (name, count) in self.slots.iter_mut().flatten() {
            if left == 0 {
                break;
            }
            if name == item && *count < STACK_SIZE {
                let add = left.min(STACK_SIZE - *count);
                *count += add;
                left -= add;
            }
        }
        for slot in self.slots.iter_mut().filter(|s| s.is_none()) {
            if left == 0 {
                break;
            }
            let add = left.min(STACK_SIZE);
            *slot = Some((item.to_string(), add));
            left -= add;
        }
        amount - left
    }

    /// Take from `preferred` first, then any other stack of `item`.
    fn take(&mut self, item: &str, preferred: Option<u32>, amount: u32) -> u32 {
        let mut order: Vec<usize> = (0..self.slots.len()).collect();
        if let Some(p) = preferred.map(|p| p as usize).filter(|p| *p < self.slots.len()) {
            order.retain(|i| *i != p);
            order.insert(0, p);
        }

        let mut left = amount;
        for i in order {
            if left == 0 {
                break;
            }
            let emptied = match &mut self.slots[i] {
                Some((name, count)) if name == item => {
                    let sub = left.min(*count);
                    *count -= sub;
                    left -= sub;
                    *count == 0
                }
                _ => false,
            };
            if emptied {
                self.slots[i] = None;
            }
        }
        amount - left
    }
}

#[derive(Debug, Default)]
struct SimState {
    blocks: BTreeMap<BlockPos, BlockInfo>,
    containers: BTreeMap<BlockPos, SimContainer>,
    /// Secondary half → primary half.
    partners: BTreeMap<BlockPos, BlockPos>,
    position: Position,
    inventory: BTreeMap<String, u32>,
    players: BTreeMap<String, Position>,
    facing_player: Option<String>,
    delivered: BTreeMap<(String, String), u32>,
    unreachable: BTreeSet<BlockPos>,
    fail_open: BTreeSet<BlockPos>,
    withdraw_limits: BTreeMap<BlockPos, u32>,
    journal: Vec<SimEvent>,
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── World handle ─────────────────────────────────────────────────────────────

/// A shared, inspectable in-memory world.
#[derive(Debug, Clone, Default)]
pub struct SimulatedWorld {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a world from a JSON fixture file.
    pub fn load(path: impl AsRef<Path>) -> AnyResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read world fixture {}", path.display()))?;
        let fixture: WorldFixture =
            serde_json::from_str(&contents).context("failed to parse world fixture JSON")?;
        Ok(Self::from_fixture(fixture))
    }

    pub fn from_fixture(fixture: WorldFixture) -> Self {
        let [x, y, z] = fixture.agent.position;
        let mut world = Self::new().with_agent_at(Position::new(x, y, z));

        for held in fixture.agent.inventory {
            world = world.holding(&held.item, held.count);
        }
        for chest in fixture.chests {
            let items: Vec<(&str, u32)> =
                chest.items.iter().map(|s| (s.item.as_str(), s.count)).collect();
            world = match chest.partner {
                Some(partner) => world.with_named_double_chest(
                    &chest.name,
                    chest.at.into(),
                    partner.into(),
                    &items,
                ),
                None => world.with_named_chest(&chest.name, chest.at.into(), SINGLE_CHEST_SLOTS, &items),
            };
        }
        for block in fixture.blocks {
            let mut info = BlockInfo::new(block.name);
            info.properties = block.properties;
            world = world.with_block(block.at.into(), info);
        }
        for player in fixture.players {
            let [x, y, z] = player.position;
            world = world.with_player(&player.name, Position::new(x, y, z));
        }
        for at in fixture.failures.unreachable {
            world = world.unreachable(at.into());
        }
        for at in fixture.failures.fail_open {
            world = world.failing_open(at.into());
        }
        for limit in fixture.failures.withdraw_limits {
            world = world.withdraw_limit(limit.at.into(), limit.limit);
        }
        world
    }

    /// A new agent bound to this world.
    pub fn agent(&self) -> SimulatedAgent {
        SimulatedAgent {
            state: Arc::clone(&self.state),
        }
    }

    // ── builder ──

    pub fn with_agent_at(self, position: Position) -> Self {
        lock(&self.state).position = position;
        self
    }

    /// A single chest holding `items`.
    pub fn with_chest(self, at: BlockPos, items: &[(&str, u32)]) -> Self {
        self.with_named_chest("chest", at, SINGLE_CHEST_SLOTS, items)
    }

    /// A single chest with a custom number of slots.
    pub fn with_chest_slots(self, at: BlockPos, slots: usize, items: &[(&str, u32)]) -> Self {
        self.with_named_chest("chest", at, slots, items)
    }

    /// A double chest whose inventory lives at `primary`.
    pub fn with_double_chest(
        self,
        primary: BlockPos,
        secondary: BlockPos,
        items: &[(&str, u32)],
    ) -> Self {
        self.with_named_double_chest("chest", primary, secondary, items)
    }

    pub fn with_named_chest(
        self,
        name: &str,
        at: BlockPos,
        slots: usize,
        items: &[(&str, u32)],
    ) -> Self {
        {
            let mut state = lock(&self.state);
            state
                .blocks
                .insert(at, BlockInfo::new(name).with_property("type", "single"));
            state.containers.insert(at, SimContainer::stocked(at, slots, items));
        }
        self
    }

    pub fn with_named_double_chest(
        self,
        name: &str,
        primary: BlockPos,
        secondary: BlockPos,
        items: &[(&str, u32)],
    ) -> Self {
        {
            let mut state = lock(&self.state);
            state
                .blocks
                .insert(primary, BlockInfo::new(name).with_property("type", "left"));
            state
                .blocks
                .insert(secondary, BlockInfo::new(name).with_property("type", "right"));
            state
                .containers
                .insert(primary, SimContainer::stocked(primary, DOUBLE_CHEST_SLOTS, items));
            state.partners.insert(secondary, primary);
        }
        self
    }

    pub fn with_block(self, at: BlockPos, info: BlockInfo) -> Self {
        lock(&self.state).blocks.insert(at, info);
        self
    }

    pub fn holding(self, item: &str, count: u32) -> Self {
        *lock(&self.state).inventory.entry(item.to_string()).or_default() += count;
        self
    }

    pub fn with_player(self, name: &str, position: Position) -> Self {
        lock(&self.state).players.insert(name.to_string(), position);
        self
    }

    pub fn unreachable(self, at: BlockPos) -> Self {
        lock(&self.state).unreachable.insert(at);
        self
    }

    pub fn failing_open(self, at: BlockPos) -> Self {
        lock(&self.state).fail_open.insert(at);
        self
    }

    /// Transfers out of `at` fail once `limit` items have been withdrawn.
    pub fn withdraw_limit(self, at: BlockPos, limit: u32) -> Self {
        lock(&self.state).withdraw_limits.insert(at, limit);
        self
    }

    // ── live mutation ──

    /// Remove a container block (and its partner half) from the world.
    pub fn remove_container(&self, at: BlockPos) {
        let mut state = lock(&self.state);
        state.containers.remove(&at);
        state.blocks.remove(&at);
        let secondaries: Vec<BlockPos> = state
            .partners
            .iter()
            .filter(|(_, p)| **p == at)
            .map(|(s, _)| *s)
            .collect();
        for s in secondaries {
            state.partners.remove(&s);
            state.blocks.remove(&s);
        }
    }

    /// Put items into a container behind the agent's back.
    pub fn stock(&self, at: BlockPos, item: &str, count: u32) -> u32 {
        let mut state = lock(&self.state);
        state
            .containers
            .get_mut(&at)
            .map(|c| c.insert(item, count))
            .unwrap_or(0)
    }

    pub fn set_reachable(&self, at: BlockPos) {
        lock(&self.state).unreachable.remove(&at);
    }

    // ── inspection ──

    pub fn container_count(&self, at: BlockPos, item: &str) -> u32 {
        lock(&self.state)
            .containers
            .get(&at)
            .map(|c| c.count_of(item))
            .unwrap_or(0)
    }

    pub fn held(&self, item: &str) -> u32 {
        lock(&self.state).inventory.get(item).copied().unwrap_or(0)
    }

    pub fn delivered(&self, player: &str, item: &str) -> u32 {
        lock(&self.state)
            .delivered
            .get(&(player.to_string(), item.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn block(&self, at: BlockPos) -> Option<BlockInfo> {
        lock(&self.state).blocks.get(&at).cloned()
    }

    pub fn journal(&self) -> Vec<SimEvent> {
        lock(&self.state).journal.clone()
    }

    /// Containers opened, in order.
    pub fn opened(&self) -> Vec<BlockPos> {
        self.journal()
            .into_iter()
            .filter_map(|e| match e {
                SimEvent::Opened(at) => Some(at),
                _ => None,
            })
            .collect()
    }

    pub fn agent_position(&self) -> Position {
        lock(&self.state).position
    }
}

// ── Agent ────────────────────────────────────────────────────────────────────

/// The engine-facing view of a [`SimulatedWorld`].
#[derive(Debug, Clone)]
pub struct SimulatedAgent {
    state: Arc<Mutex<SimState>>,
}

impl WorldView for SimulatedAgent {
    fn block_at(&self, pos: BlockPos) -> Option<BlockInfo> {
        lock(&self.state).blocks.get(&pos).cloned()
    }
}

#[async_trait]
impl MobilityPort for SimulatedAgent {
    fn position(&self) -> Position {
        lock(&self.state).position
    }

    async fn move_near(&mut self, target: BlockPos, _tolerance: u32) -> Result<()> {
        self.move_to(target).await
    }

    async fn move_to(&mut self, target: BlockPos) -> Result<()> {
        tokio::task::yield_now().await;
        let mut state = lock(&self.state);
        if state.unreachable.contains(&target) {
            return Err(StockpileError::Unreachable {
                location: target,
                reason: "no path found".into(),
            });
        }
        state.position = target.as_position();
        state.facing_player = None;
        state.journal.push(SimEvent::Travelled(target));
        Ok(())
    }

    async fn move_near_player(&mut self, player: &str, _tolerance: u32) -> Result<()> {
        tokio::task::yield_now().await;
        let mut state = lock(&self.state);
        let Some(position) = state.players.get(player).copied() else {
            return Err(StockpileError::PlayerOffline(player.to_string()));
        };
        state.position = position;
        state.facing_player = Some(player.to_string());
        state.journal.push(SimEvent::MetPlayer(player.to_string()));
        Ok(())
    }

    async fn open_container(&mut self, location: BlockPos) -> Result<Box<dyn ContainerHandle>> {
        tokio::task::yield_now().await;
        let mut state = lock(&self.state);
        let primary = state.partners.get(&location).copied().unwrap_or(location);
        if state.fail_open.contains(&primary) {
            return Err(StockpileError::OpenFailed {
                location: primary,
                reason: "window did not open".into(),
            });
        }
        if !state.containers.contains_key(&primary) {
            return Err(StockpileError::NotAContainer(location));
        }
        state.journal.push(SimEvent::Opened(primary));
        Ok(Box::new(SimContainerHandle {
            state: Arc::clone(&self.state),
            location: primary,
        }))
    }

    async fn clear_block(&mut self, pos: BlockPos) -> Result<()> {
        tokio::task::yield_now().await;
        let mut state = lock(&self.state);
        state.blocks.remove(&pos);
        state.journal.push(SimEvent::Cleared(pos));
        Ok(())
    }
}

#[async_trait]
impl AgentInventory for SimulatedAgent {
    fn current_items(&self) -> Vec<HeldStack> {
        lock(&self.state)
            .inventory
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(item, count)| HeldStack {
                item: item.clone(),
                count: *count,
            })
            .collect()
    }

    async fn toss(&mut self, item: &str, amount: u32) -> Result<u32> {
        let mut state = lock(&self.state);
        let held = state.inventory.get(item).copied().unwrap_or(0);
        let moved = held.min(amount);
        if moved == 0 {
            return Ok(0);
        }
        state.inventory.insert(item.to_string(), held - moved);
        if let Some(player) = state.facing_player.clone() {
            *state.delivered.entry((player, item.to_string())).or_default() += moved;
        }
        Ok(moved)
    }
}

struct SimContainerHandle {
    state: Arc<Mutex<SimState>>,
    location: BlockPos,
}

#[async_trait]
impl ContainerHandle for SimContainerHandle {
    fn location(&self) -> BlockPos {
        self.location
    }

    fn contents(&self) -> Vec<SlotStack> {
        lock(&self.state)
            .containers
            .get(&self.location)
            .map(SimContainer::contents)
            .unwrap_or_default()
    }

    async fn withdraw(&mut self, item: &str, slot: Option<u32>, amount: u32) -> Result<u32> {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        let mut allowed = amount;
        if let Some(limit) = state.withdraw_limits.get(&self.location) {
            if *limit == 0 {
                return Err(StockpileError::TransferFailed {
                    location: self.location,
                    reason: "window closed mid-transfer".into(),
                });
            }
            allowed = allowed.min(*limit);
        }

        let container = state
            .containers
            .get_mut(&self.location)
            .ok_or(StockpileError::NotAContainer(self.location))?;
        let moved = container.take(item, slot, allowed);
        if let Some(limit) = state.withdraw_limits.get_mut(&self.location) {
            *limit -= moved;
        }
        *state.inventory.entry(item.to_string()).or_default() += moved;
        Ok(moved)
    }

    async fn deposit(&mut self, item: &str, amount: u32) -> Result<u32> {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        let held = state.inventory.get(item).copied().unwrap_or(0);
        let wanted = held.min(amount);
        let container = state
            .containers
            .get_mut(&self.location)
            .ok_or(StockpileError::NotAContainer(self.location))?;
        let moved = container.insert(item, wanted);
        state.inventory.insert(item.to_string(), held - moved);
        Ok(moved)
    }

    async fn close(&mut self) {}
}
