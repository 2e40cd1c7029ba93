pub mod console;
pub mod list;
pub mod search;

use std::collections::BTreeMap;

use stockpile::index::types::ItemSummary;

/// Print one line per item with its count and the chests holding it.
fn print_aggregate(matches: &BTreeMap<String, ItemSummary>, total: u64) {
    if matches.is_empty() {
        println!("Storage is empty.");
        return;
    }

    for (item, summary) in matches {
        let places: Vec<String> = summary.containers.iter().map(|c| c.to_string()).collect();
        println!("  {:<24} {:>6}  [{}]", item, summary.count, places.join("; "));
    }
    println!();
    println!("Total: {total}");
}
