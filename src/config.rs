use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StockpileConfig {
    pub server: ServerConfig,
    pub world: WorldConfig,
    pub scan: ScanConfig,
    pub allocation: AllocationConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub log_level: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WorldConfig {
    /// JSON fixture describing the simulated world.
    pub fixture: String,
    pub home: [i32; 3],
    /// Two opposite corners of the storage area.
    pub storage_corners: Vec<[i32; 3]>,
    /// Player that receives withdrawn items.
    pub owner: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScanConfig {
    pub container_types: Vec<String>,
    /// Blocks that may sit on top of a container without blocking its lid.
    pub passable_above: Vec<String>,
    pub clear_obstructions: bool,
    /// Largest region, in blocks, a single reload may walk.
    pub max_volume: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AllocationConfig {
    /// Most items moved into a container per deposit step (one stack).
    pub batch_cap: u32,
    pub reach_tolerance: u32,
    pub placement: String,
    pub busy_policy: String,
    pub return_home: bool,
    /// Seed for the random placement policy. Unset means seeded from entropy.
    pub placement_seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            log_level: "info".into(),
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        let fixture = default_stockpile_dir()
            .join("world.json")
            .to_string_lossy()
            .into_owned();
        Self {
            fixture,
            home: [0, 64, 0],
            storage_corners: Vec::new(),
            owner: None,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            container_types: vec!["chest".into(), "trapped_chest".into()],
            passable_above: ["air", "chest", "trapped_chest", "slab", "fence", "torch", "glass", "stairs"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            clear_obstructions: true,
            max_volume: 1_000_000,
        }
    }
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            batch_cap: 64,
            reach_tolerance: 5,
            placement: "random".into(),
            busy_policy: "queue".into(),
            return_home: true,
            placement_seed: None,
        }
    }
}

impl ScanConfig {
    pub fn is_container(&self, block_name: &str) -> bool {
        self.container_types.iter().any(|t| t == block_name)
    }

    pub fn is_passable(&self, block_name: &str) -> bool {
        self.passable_above.iter().any(|t| t == block_name)
    }
}

/// Returns `~/.stockpile/`
pub fn default_stockpile_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".stockpile")
}

/// Returns the default config file path: `~/.stockpile/config.toml`
pub fn default_config_path() -> PathBuf {
    default_stockpile_dir().join("config.toml")
}

impl StockpileConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            StockpileConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (STOCKPILE_WORLD, STOCKPILE_LOG_LEVEL,
    /// STOCKPILE_OWNER).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("STOCKPILE_WORLD") {
            self.world.fixture = val;
        }
        if let Ok(val) = std::env::var("STOCKPILE_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("STOCKPILE_OWNER") {
            self.world.owner = Some(val).filter(|v| !v.is_empty());
        }
    }

    /// Resolve the world fixture path, expanding `~` if needed.
    pub fn resolved_fixture_path(&self) -> PathBuf {
        expand_tilde(&self.world.fixture)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = StockpileConfig::default();
        assert_eq!(config.server.transport, "stdio");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.allocation.batch_cap, 64);
        assert_eq!(config.allocation.reach_tolerance, 5);
        assert_eq!(config.allocation.placement, "random");
        assert!(config.scan.is_container("trapped_chest"));
        assert!(!config.scan.is_container("barrel"));
        assert!(config.scan.is_passable("air"));
        assert!(config.world.fixture.ends_with("world.json"));
        assert!(config.world.storage_corners.is_empty());
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[world]
home = [10, 70, -5]
storage_corners = [[0, 60, 0], [20, 66, 12]]
owner = "alex"

[allocation]
placement = "nearest"
"#;
        let config: StockpileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.world.home, [10, 70, -5]);
        assert_eq!(config.world.storage_corners.len(), 2);
        assert_eq!(config.world.owner.as_deref(), Some("alex"));
        assert_eq!(config.allocation.placement, "nearest");
        // defaults still apply for unset fields
        assert_eq!(config.allocation.batch_cap, 64);
        assert_eq!(config.scan.container_types, vec!["chest", "trapped_chest"]);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[allocation]\nbatch_cap = 16\n").unwrap();

        let config = StockpileConfig::load_from(&path).unwrap();
        assert_eq!(config.allocation.batch_cap, 16);

        let missing = StockpileConfig::load_from(dir.path().join("nope.toml")).unwrap();
        assert_eq!(missing.allocation.batch_cap, 64);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = StockpileConfig::default();
        std::env::set_var("STOCKPILE_WORLD", "/tmp/override.json");
        std::env::set_var("STOCKPILE_LOG_LEVEL", "trace");
        std::env::set_var("STOCKPILE_OWNER", "steve");

        config.apply_env_overrides();

        assert_eq!(config.world.fixture, "/tmp/override.json");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.world.owner.as_deref(), Some("steve"));

        // Clean up
        std::env::remove_var("STOCKPILE_WORLD");
        std::env::remove_var("STOCKPILE_LOG_LEVEL");
        std::env::remove_var("STOCKPILE_OWNER");
    }
}
