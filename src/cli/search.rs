use anyhow::Result;

use stockpile::config::StockpileConfig;

/// Index the configured storage area and print items matching `query`.
pub async fn search(config: StockpileConfig, query: &str) -> Result<()> {
    let warehouse = crate::server::open_warehouse(config).await?;
    let result = warehouse.request_search(query)?;

    if result.is_empty() {
        println!("No items matching {query:?}.");
        return Ok(());
    }

    println!("Found {} item kind(s) matching {query:?}\n", result.matches.len());
    super::print_aggregate(&result.matches, result.total);
    Ok(())
}
