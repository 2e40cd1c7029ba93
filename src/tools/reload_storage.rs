//! MCP `reload_storage` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `reload_storage` MCP tool.
///
/// Give both corners to scan a custom area, or neither to scan the configured one.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReloadStorageParams {
    #[schemars(description = "First corner [x, y, z] of the area to scan. Defaults to the configured storage area.")]
    pub corner_a: Option<[i32; 3]>,

    #[schemars(description = "Opposite corner [x, y, z] of the area to scan. Required when corner_a is given.")]
    pub corner_b: Option<[i32; 3]>,
}
