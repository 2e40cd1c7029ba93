#![allow(dead_code)]

use std::sync::Arc;

use stockpile::config::StockpileConfig;
use stockpile::index::types::BlockPos;
use stockpile::index::StorageIndex;
use stockpile::service::Warehouse;
use stockpile::world::sim::SimulatedWorld;

/// Home sits at the origin; every test chest lives inside this box.
pub const AREA: [[i32; 3]; 2] = [[-16, 60, -16], [32, 70, 16]];

pub const NEAR: BlockPos = BlockPos::new(2, 64, 0);
pub const MID: BlockPos = BlockPos::new(10, 64, 0);
pub const FAR: BlockPos = BlockPos::new(20, 64, 0);

/// Defaults plus the test storage area and a fixed placement seed.
pub fn test_config() -> StockpileConfig {
    let mut config = StockpileConfig::default();
    config.world.storage_corners = AREA.to_vec();
    config.allocation.placement_seed = Some(7);
    config
}

pub fn warehouse_with(world: &SimulatedWorld, config: StockpileConfig) -> Arc<Warehouse> {
    Arc::new(Warehouse::new(Arc::new(config), Box::new(world.agent())).unwrap())
}

/// A warehouse over `world` whose index has already been built by one reload.
pub async fn loaded(world: &SimulatedWorld) -> Arc<Warehouse> {
    loaded_with(world, test_config()).await
}

pub async fn loaded_with(world: &SimulatedWorld, config: StockpileConfig) -> Arc<Warehouse> {
    let warehouse = warehouse_with(world, config);
    warehouse.request_reload(None).await.unwrap();
    warehouse
}

/// Snapshot the index and assert both views of it agree.
pub fn consistent_index(warehouse: &Warehouse) -> StorageIndex {
    let index = warehouse.index_snapshot().unwrap();
    index.check_invariants().unwrap();
    index
}

/// Sum of `item` over every indexed container, computed from the records directly.
pub fn indexed_total(index: &StorageIndex, item: &str) -> u64 {
    index
        .containers()
        .map(|(_, record)| record.count_of(item) as u64)
        .sum()
}
