//! MCP `search_items` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `search_items` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchItemsParams {
    /// Case-insensitive substring. Empty matches every item.
    #[schemars(description = "Case-insensitive substring of the item name. An empty query lists everything.")]
    pub query: String,
}
