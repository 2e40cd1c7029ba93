use anyhow::Result;

use stockpile::config::StockpileConfig;
use stockpile::service::StorageListing;

/// Index the configured storage area and print everything in it.
pub async fn list(config: StockpileConfig) -> Result<()> {
    let warehouse = crate::server::open_warehouse(config).await?;
    let listing = warehouse.request_listing()?;
    print_listing(&listing);
    Ok(())
}

pub fn print_listing(listing: &StorageListing) {
    println!("Storage");
    println!("{}", "=".repeat(40));
    println!("  Containers indexed:  {}", listing.containers_indexed);
    match &listing.last_scan {
        Some(at) => println!("  Last scan:           {}", at.to_rfc3339()),
        None => println!("  Last scan:           never"),
    }
    println!();
    super::print_aggregate(&listing.matches, listing.total);
}
