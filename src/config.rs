use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Hard ceiling on page size accepted by the backend.
pub const BACKEND_MAX_LIMIT: usize = 1000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub engine: EngineConfig,
}

/// Sizing and defaults for the search orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    /// Entries retained internally by each popularity map.
    #[serde(default = "default_top_n_popular")]
    pub top_n_popular: usize,
    /// Entries reported in a snapshot.
    #[serde(default = "default_top_n_reported")]
    pub top_n_reported: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_sort_field")]
    pub default_sort_field: String,
    #[serde(default = "default_facet_fields")]
    pub facet_fields: Vec<String>,
    #[serde(default = "default_max_suggested_queries")]
    pub max_suggested_queries: usize,
    /// Distinct query patterns remembered for `unique_query_patterns`.
    #[serde(default = "default_max_tracked_patterns")]
    pub max_tracked_patterns: usize,
    /// When false every search goes to the executor and nothing is stored.
    #[serde(default = "default_enabled")]
    pub enable_cache: bool,
    /// When false searches are not recorded and snapshots stay empty.
    #[serde(default = "default_enabled")]
    pub enable_analytics: bool,
}

fn default_max_entries() -> usize {
    1000
}
fn default_ttl_seconds() -> u64 {
    300
}
fn default_top_n_popular() -> usize {
    50
}
fn default_top_n_reported() -> usize {
    10
}
fn default_max_limit() -> usize {
    BACKEND_MAX_LIMIT
}
fn default_limit() -> usize {
    50
}
fn default_sort_field() -> String {
    "updated".to_string()
}
fn default_facet_fields() -> Vec<String> {
    ["project", "assignee", "State", "Priority", "Type"]
        .iter()
        .map(|f| f.to_string())
        .collect()
}
fn default_max_suggested_queries() -> usize {
    3
}
fn default_max_tracked_patterns() -> usize {
    100_000
}
fn default_enabled() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            ttl_seconds: default_ttl_seconds(),
            top_n_popular: default_top_n_popular(),
            top_n_reported: default_top_n_reported(),
            max_limit: default_max_limit(),
            default_limit: default_limit(),
            default_sort_field: default_sort_field(),
            facet_fields: default_facet_fields(),
            max_suggested_queries: default_max_suggested_queries(),
            max_tracked_patterns: default_max_tracked_patterns(),
            enable_cache: default_enabled(),
            enable_analytics: default_enabled(),
        }
    }
}

impl EngineConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::Invalid("max_entries must be at least 1".into()));
        }
        if self.max_limit == 0 || self.max_limit > BACKEND_MAX_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_limit must be between 1 and {BACKEND_MAX_LIMIT}"
            )));
        }
        if self.max_tracked_patterns == 0 {
            return Err(ConfigError::Invalid("max_tracked_patterns must be at least 1".into()));
        }
        if self.default_limit == 0 {
            return Err(ConfigError::Invalid("default_limit must be at least 1".into()));
        }
        if self.top_n_reported > self.top_n_popular {
            return Err(ConfigError::Invalid(format!(
                "top_n_reported ({}) exceeds top_n_popular ({})",
                self.top_n_reported, self.top_n_popular
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Loads the first config file found, or defaults when there is none.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::find_config_path(),
        };

        let config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.engine.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn find_config_path() -> Option<PathBuf> {
        if let Some(xdg_config) = dirs::config_dir() {
            let xdg_path = xdg_config.join("ytsearch/config.toml");
            if xdg_path.exists() {
                return Some(xdg_path);
            }
        }

        if let Some(home) = dirs::home_dir() {
            let home_path = home.join(".ytsearch.toml");
            if home_path.exists() {
                return Some(home_path);
            }
        }

        let current_path = Path::new(".ytsearch.toml");
        if current_path.exists() {
            return Some(current_path.to_path_buf());
        }

        None
    }
}
