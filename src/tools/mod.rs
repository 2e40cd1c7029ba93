pub mod deposit_all;
pub mod reload_storage;
pub mod search_items;
pub mod storage_listing;
pub mod withdraw_item;

use deposit_all::DepositAllParams;
use reload_storage::ReloadStorageParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use search_items::SearchItemsParams;
use std::sync::Arc;
use storage_listing::StorageListingParams;
use withdraw_item::WithdrawItemParams;

use stockpile::scan::ScanRegion;
use stockpile::service::Warehouse;

/// The Stockpile MCP tool handler. Every tool is a thin wrapper over one
/// [`Warehouse`] request.
#[derive(Clone)]
pub struct StockpileTools {
    tool_router: ToolRouter<Self>,
    warehouse: Arc<Warehouse>,
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("serialization failed: {e}"))
}

#[tool_router]
impl StockpileTools {
    pub fn new(warehouse: Arc<Warehouse>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            warehouse,
        }
    }

    /// Fetch items from storage, nearest chest first.
    #[tool(description = "Withdraw an item from storage. Visits the nearest chests first and reports how much was fulfilled and any shortfall. Delivers to the configured owner when one is set.")]
    async fn withdraw_item(
        &self,
        Parameters(params): Parameters<WithdrawItemParams>,
    ) -> Result<String, String> {
        if params.item.trim().is_empty() {
            return Err("item must not be empty".into());
        }
        tracing::info!(item = %params.item, amount = params.amount, "withdraw_item called");

        let response = self
            .warehouse
            .request_withdraw(params.item.trim(), params.amount)
            .await
            .map_err(|e| format!("withdraw failed: {e}"))?;
        to_json(&response)
    }

    /// Put everything the agent carries into storage.
    #[tool(description = "Deposit everything the agent is holding into known storage chests.")]
    async fn deposit_all(
        &self,
        Parameters(_params): Parameters<DepositAllParams>,
    ) -> Result<String, String> {
        tracing::info!("deposit_all called");
        let report = self
            .warehouse
            .request_deposit_all()
            .await
            .map_err(|e| format!("deposit failed: {e}"))?;
        to_json(&report)
    }

    /// Rescan the storage area and rebuild the index.
    #[tool(description = "Rescan the storage area, opening every chest once, and rebuild the storage index.")]
    async fn reload_storage(
        &self,
        Parameters(params): Parameters<ReloadStorageParams>,
    ) -> Result<String, String> {
        let region = match (params.corner_a, params.corner_b) {
            (Some(a), Some(b)) => Some(ScanRegion::from_corners(a.into(), b.into())),
            (None, None) => None,
            _ => return Err("give both corner_a and corner_b, or neither".into()),
        };
        tracing::info!(custom_region = region.is_some(), "reload_storage called");

        let report = self
            .warehouse
            .request_reload(region)
            .await
            .map_err(|e| format!("reload failed: {e}"))?;
        to_json(&report)
    }

    /// Substring search over stored item names.
    #[tool(description = "Search stored items by case-insensitive substring. Returns the total and, per item, its count and the chests holding it.")]
    async fn search_items(
        &self,
        Parameters(params): Parameters<SearchItemsParams>,
    ) -> Result<String, String> {
        tracing::info!(query = %params.query, "search_items called");
        let result = self
            .warehouse
            .request_search(&params.query)
            .map_err(|e| format!("search failed: {e}"))?;
        to_json(&result)
    }

    #[tool(description = "List everything in storage, aggregated per item, with the number of indexed chests and the time of the last scan.")]
    async fn storage_listing(
        &self,
        Parameters(_params): Parameters<StorageListingParams>,
    ) -> Result<String, String> {
        tracing::info!("storage_listing called");
        let listing = self
            .warehouse
            .request_listing()
            .map_err(|e| format!("listing failed: {e}"))?;
        to_json(&listing)
    }
}

#[tool_handler]
impl ServerHandler for StockpileTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Stockpile runs a storage area full of chests. Use reload_storage to index it, \
                 search_items or storage_listing to see what is stored, withdraw_item to fetch \
                 items, and deposit_all to put everything back."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
