use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_IMPORT_MAX_NODES: usize = 5_000;
const DEFAULT_HIERARCHY_MAX_DEPTH: i32 = 10;
const DEFAULT_SEQUENCE_GAP: i32 = 10;
const DEFAULT_EVENT_BUFFER: usize = 256;

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_db_max_connections() -> u32 {
    DEFAULT_DB_MAX_CONNECTIONS
}

fn default_import_max_nodes() -> usize {
    DEFAULT_IMPORT_MAX_NODES
}

fn default_allow_item_autocreate() -> bool {
    true
}

fn default_hierarchy_max_depth() -> i32 {
    DEFAULT_HIERARCHY_MAX_DEPTH
}

fn default_sequence_gap() -> i32 {
    DEFAULT_SEQUENCE_GAP
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

/// Import adapter limits
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct ImportConfig {
    /// Upper bound on nodes accepted by a single import operation; bounds
    /// worst-case transaction size.
    #[serde(default = "default_import_max_nodes")]
    #[validate(range(min = 1))]
    pub max_nodes: usize,

    /// Whether unknown item numbers are implicitly created in the catalog
    /// during import (a warning is emitted per created item).
    #[serde(default = "default_allow_item_autocreate")]
    pub allow_item_autocreate: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_IMPORT_MAX_NODES,
            allow_item_autocreate: true,
        }
    }
}

/// Hierarchy walker limits
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct HierarchyConfig {
    /// Hard depth ceiling for the cross-structure walk, independent of the
    /// visited-set cycle guard.
    #[serde(default = "default_hierarchy_max_depth")]
    #[validate(range(min = 1, max = 64))]
    pub max_depth: i32,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_HIERARCHY_MAX_DEPTH,
        }
    }
}

/// Application configuration, layered from `config/default.toml`, an
/// environment-specific file, and `APP_`-prefixed environment variables.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(length(min = 1))]
    pub database_url: String,

    #[serde(default = "default_db_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_environment")]
    pub environment: String,

    /// Gap between consecutive sibling sequence numbers, so items can later
    /// be slotted between existing ones without renumbering.
    #[serde(default = "default_sequence_gap")]
    #[validate(range(min = 1))]
    pub sequence_gap: i32,

    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    #[serde(default)]
    #[validate]
    pub import: ImportConfig,

    #[serde(default)]
    #[validate]
    pub hierarchy: HierarchyConfig,
}

impl AppConfig {
    /// Loads and validates configuration for the current `RUN_ENV`.
    pub fn load() -> Result<Self, ConfigError> {
        let run_env = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

        info!("Loading configuration for environment: {}", run_env);

        let config = Config::builder()
            .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
            .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;

        app_config
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;

        Ok(app_config)
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}
