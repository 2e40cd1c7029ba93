mod helpers;

use helpers::{consistent_index, indexed_total, loaded, FAR, MID, NEAR};
use stockpile::world::sim::SimulatedWorld;

fn stocked_world() -> SimulatedWorld {
    SimulatedWorld::new()
        .with_chest(NEAR, &[("stone", 64)])
        .with_chest(MID, &[("cobblestone", 32), ("torch", 5)])
        .with_chest(FAR, &[("stone", 6), ("Mossy_Cobblestone", 2)])
}

#[tokio::test]
async fn substring_search_aggregates_matches() {
    let world = SimulatedWorld::new()
        .with_chest(NEAR, &[("stone", 64)])
        .with_chest(FAR, &[("cobblestone", 32)]);
    let warehouse = loaded(&world).await;

    let result = warehouse.request_search("ston").unwrap();
    assert_eq!(result.total, 96);
    assert_eq!(result.matches.len(), 2);
    assert_eq!(result.matches["stone"].count, 64);
    assert_eq!(result.matches["stone"].containers, vec![NEAR]);
    assert_eq!(result.matches["cobblestone"].count, 32);
    assert_eq!(result.matches["cobblestone"].containers, vec![FAR]);
}

#[tokio::test]
async fn search_ignores_case() {
    let warehouse = loaded(&stocked_world()).await;

    let result = warehouse.request_search("COBBLE").unwrap();
    assert_eq!(result.total, 34);
    assert!(result.matches.contains_key("cobblestone"));
    assert!(result.matches.contains_key("Mossy_Cobblestone"));
}

#[tokio::test]
async fn search_total_matches_per_item_sums() {
    let warehouse = loaded(&stocked_world()).await;
    let index = consistent_index(&warehouse);

    for query in ["", "st", "stone", "o", "zzz"] {
        let result = warehouse.request_search(query).unwrap();
        let summed: u64 = result.matches.values().map(|s| s.count).sum();
        assert_eq!(result.total, summed, "query {query:?}");
        for (item, summary) in &result.matches {
            assert_eq!(summary.count, indexed_total(&index, item));
        }
    }
}

#[tokio::test]
async fn empty_query_returns_everything() {
    let warehouse = loaded(&stocked_world()).await;

    let result = warehouse.request_search("").unwrap();
    assert_eq!(result.matches.len(), 4);
    assert_eq!(result.total, 64 + 32 + 5 + 6 + 2);
    assert_eq!(result.matches["stone"].containers, vec![NEAR, FAR]);
}

#[tokio::test]
async fn search_never_touches_the_index_or_the_agent() {
    let world = stocked_world();
    let warehouse = loaded(&world).await;
    let before = warehouse.index_snapshot().unwrap();
    let journal = world.journal().len();

    warehouse.request_search("stone").unwrap();
    warehouse.request_search("").unwrap();
    warehouse.request_listing().unwrap();

    assert_eq!(warehouse.index_snapshot().unwrap(), before);
    assert_eq!(world.journal().len(), journal);
}

#[tokio::test]
async fn listing_agrees_with_search_and_index() {
    let warehouse = loaded(&stocked_world()).await;

    let listing = warehouse.request_listing().unwrap();
    let everything = warehouse.request_search("").unwrap();
    assert_eq!(listing.total, everything.total);
    assert_eq!(listing.matches, everything.matches);
    assert_eq!(listing.containers_indexed, 3);
    assert!(listing.last_scan.is_some());

    let json = serde_json::to_value(&listing).unwrap();
    assert_eq!(json["total"], 109);
    assert_eq!(json["matches"]["torch"]["count"], 5);
    assert_eq!(json["matches"]["torch"]["containers"][0]["x"], MID.x);
}

#[tokio::test]
async fn listing_tracks_withdrawals() {
    let world = stocked_world();
    let warehouse = loaded(&world).await;

    warehouse.request_withdraw("stone", 66).await.unwrap();
    let listing = warehouse.request_listing().unwrap();
    assert_eq!(listing.matches["stone"].count, 4);
    assert_eq!(listing.total, 109 - 66);
}
