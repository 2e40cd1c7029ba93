//! MCP `withdraw_item` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `withdraw_item` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct WithdrawItemParams {
    /// Exact item identity, e.g. `"cobblestone"`.
    #[schemars(description = "Exact item name to withdraw, e.g. 'cobblestone'")]
    pub item: String,

    #[schemars(description = "How many to withdraw")]
    pub amount: u32,
}
