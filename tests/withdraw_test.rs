mod helpers;

use helpers::{consistent_index, loaded, loaded_with, test_config, FAR, MID, NEAR};
use stockpile::allocation::WithdrawOutcome;
use stockpile::index::types::BlockPos;
use stockpile::world::sim::SimulatedWorld;
use stockpile::world::Position;

#[tokio::test]
async fn empty_index_reports_not_found() {
    let world = SimulatedWorld::new();
    let warehouse = loaded(&world).await;

    let response = warehouse.request_withdraw("stick", 5).await.unwrap();
    assert_eq!(response.report.outcome, WithdrawOutcome::NotFound);
    assert_eq!(response.report.fulfilled, 0);
    assert_eq!(response.report.shortfall, 5);
    assert!(response.report.steps.is_empty());
    assert!(world.opened().is_empty());
}

#[tokio::test]
async fn takes_from_nearest_container_first() {
    let world = SimulatedWorld::new()
        .with_chest(FAR, &[("stick", 10)])
        .with_chest(NEAR, &[("stick", 3)]);
    let warehouse = loaded(&world).await;
    let scanned = world.opened().len();

    let response = warehouse.request_withdraw("stick", 5).await.unwrap();
    assert_eq!(response.report.outcome, WithdrawOutcome::Fulfilled);
    assert_eq!(response.report.fulfilled, 5);
    assert_eq!(response.report.shortfall, 0);
    assert_eq!(world.opened()[scanned..], [NEAR, FAR]);

    let index = consistent_index(&warehouse);
    assert!(index.record(&NEAR).unwrap().get("stick").is_none());
    assert_eq!(index.count_at(&FAR, "stick"), 8);
    assert_eq!(index.locations_of("stick"), &[FAR]);
    assert_eq!(world.held("stick"), 5);
}

#[tokio::test]
async fn plan_is_repeatable_and_breaks_ties_by_discovery_order() {
    // Equidistant from home; the scan finds the negative-z chest first.
    let left = BlockPos::new(0, 64, -6);
    let right = BlockPos::new(0, 64, 6);
    let world = SimulatedWorld::new()
        .with_chest(right, &[("torch", 4)])
        .with_chest(left, &[("torch", 4)])
        .with_chest(FAR, &[("torch", 4)]);
    let warehouse = loaded(&world).await;
    let index = warehouse.index_snapshot().unwrap();
    let lock = std::sync::RwLock::new(index);
    let settings = test_config().allocation;
    let engine = stockpile::allocation::AllocationEngine::new(&lock, &settings);
    let home = Position::new(0.0, 64.0, 0.0);

    let first = engine.plan_withdrawal("torch", &home, 6).unwrap();
    let second = engine.plan_withdrawal("torch", &home, 6).unwrap();
    assert_eq!(first.locations(), vec![left, right, FAR]);
    assert_eq!(first.locations(), second.locations());
    assert_eq!(first.planned_total(), 6);
}

#[tokio::test]
async fn shortfall_is_a_result_not_an_error() {
    let world = SimulatedWorld::new()
        .with_chest(NEAR, &[("stick", 3)])
        .with_chest(MID, &[("stick", 2)]);
    let warehouse = loaded(&world).await;

    let response = warehouse.request_withdraw("stick", 10).await.unwrap();
    assert_eq!(response.report.outcome, WithdrawOutcome::Shortfall);
    assert_eq!(response.report.fulfilled, 5);
    assert_eq!(response.report.shortfall, 5);

    let index = consistent_index(&warehouse);
    assert!(index.locations_of("stick").is_empty());
    assert!(warehouse.request_search("stick").unwrap().is_empty());
}

#[tokio::test]
async fn broken_transfer_keeps_what_actually_moved() {
    let world = SimulatedWorld::new()
        .with_chest(NEAR, &[("iron_ingot", 20)])
        .with_chest(FAR, &[("iron_ingot", 20)])
        .withdraw_limit(NEAR, 7);
    let warehouse = loaded(&world).await;

    let response = warehouse.request_withdraw("iron_ingot", 25).await.unwrap();
    let report = &response.report;
    assert_eq!(report.outcome, WithdrawOutcome::Fulfilled);
    assert_eq!(report.steps[0].location, NEAR);
    assert_eq!(report.steps[0].taken, 7);
    assert!(report.steps[0].error.is_some());
    assert_eq!(report.steps[1].taken, 18);

    let index = consistent_index(&warehouse);
    assert_eq!(index.count_at(&NEAR, "iron_ingot"), world.container_count(NEAR, "iron_ingot"));
    assert_eq!(index.count_at(&FAR, "iron_ingot"), world.container_count(FAR, "iron_ingot"));
    assert_eq!(index.count_at(&NEAR, "iron_ingot"), 13);
    assert_eq!(index.count_at(&FAR, "iron_ingot"), 2);
}

#[tokio::test]
async fn containers_that_vanished_leave_the_index_alone() {
    let world = SimulatedWorld::new()
        .with_chest(NEAR, &[("stick", 3)])
        .with_chest(FAR, &[("stick", 3)]);
    let warehouse = loaded(&world).await;
    world.remove_container(NEAR);

    let response = warehouse.request_withdraw("stick", 4).await.unwrap();
    assert_eq!(response.report.fulfilled, 3);
    assert!(response.report.steps[0].error.is_some());

    // Stale until the next reload, never silently repaired.
    let index = consistent_index(&warehouse);
    assert_eq!(index.count_at(&NEAR, "stick"), 3);
    assert_eq!(index.count_at(&FAR, "stick"), 0);
}

#[tokio::test]
async fn withdrawn_items_are_handed_to_the_owner() {
    let world = SimulatedWorld::new()
        .with_chest(NEAR, &[("bread", 16)])
        .with_player("alex", Position::new(-3.0, 64.0, 4.0));
    let mut config = test_config();
    config.world.owner = Some("alex".into());
    let warehouse = loaded_with(&world, config).await;

    let response = warehouse.request_withdraw("bread", 6).await.unwrap();
    let delivery = response.delivery.expect("owner is configured");
    assert_eq!(delivery.recipient, "alex");
    assert_eq!(delivery.delivered, 6);
    assert!(delivery.returned_to_storage.is_none());
    assert_eq!(world.delivered("alex", "bread"), 6);
    assert_eq!(world.held("bread"), 0);
}

#[tokio::test]
async fn offline_owner_means_items_go_back_into_storage() {
    let world = SimulatedWorld::new()
        .with_chest(NEAR, &[("bread", 16)])
        .with_chest(MID, &[]);
    let mut config = test_config();
    config.world.owner = Some("alex".into());
    let warehouse = loaded_with(&world, config).await;

    let response = warehouse.request_withdraw("bread", 6).await.unwrap();
    assert_eq!(response.report.fulfilled, 6);
    let delivery = response.delivery.expect("owner is configured");
    assert_eq!(delivery.delivered, 0);
    let returned = delivery.returned_to_storage.expect("items returned");
    assert_eq!(returned.deposited, 6);
    assert_eq!(world.held("bread"), 0);

    let index = consistent_index(&warehouse);
    assert_eq!(helpers::indexed_total(&index, "bread"), 16);
    assert_eq!(
        world.container_count(NEAR, "bread") + world.container_count(MID, "bread"),
        16
    );
}

#[tokio::test]
async fn nothing_to_deliver_when_nothing_was_taken() {
    let world = SimulatedWorld::new().with_player("alex", Position::new(1.0, 64.0, 1.0));
    let mut config = test_config();
    config.world.owner = Some("alex".into());
    let warehouse = loaded_with(&world, config).await;

    let response = warehouse.request_withdraw("diamond", 1).await.unwrap();
    assert_eq!(response.report.outcome, WithdrawOutcome::NotFound);
    assert!(response.delivery.is_none());
}

#[tokio::test]
async fn response_serializes_flat() {
    let world = SimulatedWorld::new().with_chest(NEAR, &[("stick", 3)]);
    let warehouse = loaded(&world).await;

    let response = warehouse.request_withdraw("stick", 5).await.unwrap();
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["fulfilled"], 3);
    assert_eq!(json["shortfall"], 2);
    assert_eq!(json["outcome"], "shortfall");
    assert!(json.get("delivery").is_none());
}
