//! Configuration types for FoodFlow components.
//!
//! Values resolve in layers: built-in defaults, then `foodflow.toml`, then
//! CLI flags / environment variables (applied by the binary).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AppError;

/// Run configuration shared by the sync and embedding orchestrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum number of concurrent product imports.
    pub concurrency: usize,
    /// Maximum number of product ids per embedding request.
    /// The actual batch size is `min(this, backend.max_batch_size())`.
    pub embedding_batch_size: usize,
    /// Maximum number of embedding requests in flight.
    pub embedding_concurrency: usize,
    /// Regenerate embeddings even for products that already have them.
    pub force_reembed: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: 6,
            embedding_batch_size: 64,
            embedding_concurrency: 2,
            force_reembed: false,
        }
    }
}

impl SyncConfig {
    /// Sets the import concurrency (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sets the embedding batch size (at least 1).
    pub fn with_embedding_batch_size(mut self, size: usize) -> Self {
        self.embedding_batch_size = size.max(1);
        self
    }

    /// Sets the number of concurrent embedding requests (at least 1).
    pub fn with_embedding_concurrency(mut self, concurrency: usize) -> Self {
        self.embedding_concurrency = concurrency.max(1);
        self
    }

    /// Enables regeneration of existing embeddings.
    pub fn with_force_reembed(mut self) -> Self {
        self.force_reembed = true;
        self
    }
}

/// Connection settings for the inventory backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the inventory API (routes live under `api/`).
    pub url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:4000".to_string(),
            timeout_secs: 30,
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Root structure of `foodflow.toml`.
///
/// # Example
///
/// ```toml
/// [backend]
/// url = "http://localhost:4000"
/// timeout_secs = 30
///
/// [sync]
/// concurrency = 6
/// embedding_batch_size = 64
/// embedding_concurrency = 2
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub sync: SyncConfig,
}

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "foodflow.toml";

/// Returns the default configuration directory: `~/.config/foodflow/`.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("foodflow"))
}

/// Returns the default configuration file path: `~/.config/foodflow/foodflow.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join(CONFIG_FILE_NAME))
}

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# FoodFlow configuration
#
# CLI flags and environment variables (FOODFLOW_BACKEND_URL, ...) override
# the values below.

[backend]
url = "http://localhost:4000"
timeout_secs = 30

[sync]
# Concurrent product imports
concurrency = 6
# Product ids per embedding request
embedding_batch_size = 64
# Concurrent embedding requests
embedding_concurrency = 2
# Regenerate embeddings that already exist
force_reembed = false
"#;

/// Loads configuration from a TOML file.
///
/// # Returns
/// * `Ok(Some(config))` - Configuration loaded successfully
/// * `Ok(None)` - No configuration directory available on this platform
/// * `Err(e)` - A custom path does not exist, or the file is invalid
///
/// When no file exists at the default path, a commented template is written
/// there first and then loaded.
pub fn load_config(path: Option<PathBuf>) -> Result<Option<AppConfig>, AppError> {
    let using_default_path = path.is_none();
    let config_path = match path {
        Some(p) => p,
        None => match default_config_path() {
            Some(p) => p,
            None => return Ok(None),
        },
    };

    if !config_path.exists() {
        if using_default_path {
            if let Err(e) = create_default_config(&config_path) {
                tracing::warn!("Could not create default config template: {}", e);
                return Ok(None);
            }
        } else {
            return Err(AppError::ConfigError(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }
    }

    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        AppError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            config_path.display(),
            e
        ))
    })?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        AppError::ConfigError(format!(
            "Invalid TOML in '{}': {}",
            config_path.display(),
            e
        ))
    })?;

    Ok(Some(config))
}

fn create_default_config(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
    tracing::info!("Created default config template at: {}", path.display());

    Ok(())
}
