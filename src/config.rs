use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::db::DEFAULT_BUSY_TIMEOUT_MS;
use crate::errors::{ContactGraphError, Result};

/// Name of the configuration file stored inside the data directory.
pub const CONFIG_FILENAME: &str = "config.json";

/// Name of the hidden directory holding the database and configuration.
pub const DATA_DIR: &str = ".contactgraph";

/// Configuration for a contact graph deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactGraphConfig {
    /// Schema version of the configuration.
    pub version: u32,
    /// Directory the data directory lives under.
    pub root_dir: String,
    /// Database file name, relative to the data directory.
    pub database_file: String,
    /// Default tracing filter; `RUST_LOG` takes precedence.
    pub log_level: String,
    /// How long a writer waits for the database lock, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Service name reported by the `health` method.
    pub service_name: String,
}

impl Default for ContactGraphConfig {
    fn default() -> Self {
        Self {
            version: 1,
            root_dir: String::new(),
            database_file: "contacts.db".to_string(),
            log_level: "info".to_string(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            service_name: "identity-reconciliation".to_string(),
        }
    }
}

/// Returns the path to the `.contactgraph` directory within the given root.
pub fn get_data_dir(root: &Path) -> PathBuf {
    root.join(DATA_DIR)
}

/// Returns the path to `config.json` within the data directory.
pub fn get_config_path(root: &Path) -> PathBuf {
    get_data_dir(root).join(CONFIG_FILENAME)
}

/// Returns the path of the database file named by `config`.
pub fn get_database_path(root: &Path, config: &ContactGraphConfig) -> PathBuf {
    get_data_dir(root).join(&config.database_file)
}

/// Loads the configuration from disk.
///
/// If the configuration file does not exist, returns a default configuration
/// with `root_dir` set to the given root. Missing fields take their defaults.
pub fn load_config(root: &Path) -> Result<ContactGraphConfig> {
    let config_path = get_config_path(root);

    if !config_path.exists() {
        return Ok(ContactGraphConfig {
            root_dir: root.to_string_lossy().to_string(),
            ..ContactGraphConfig::default()
        });
    }

    let contents = fs::read_to_string(&config_path).map_err(|e| ContactGraphError::Config {
        message: format!(
            "failed to read config file '{}': {}",
            config_path.display(),
            e
        ),
    })?;

    let config: ContactGraphConfig =
        serde_json::from_str(&contents).map_err(|e| ContactGraphError::Config {
            message: format!(
                "failed to parse config file '{}': {}",
                config_path.display(),
                e
            ),
        })?;

    Ok(config)
}

/// Saves the configuration to disk using an atomic write.
///
/// Writes to a temporary file first and then renames it into place.
pub fn save_config(root: &Path, config: &ContactGraphConfig) -> Result<()> {
    let data_dir = get_data_dir(root);
    fs::create_dir_all(&data_dir).map_err(|e| ContactGraphError::Config {
        message: format!(
            "failed to create data directory '{}': {}",
            data_dir.display(),
            e
        ),
    })?;

    let config_path = get_config_path(root);
    let tmp_path = config_path.with_extension("tmp");

    let json = serde_json::to_string_pretty(config).map_err(|e| ContactGraphError::Config {
        message: format!("failed to serialize config: {}", e),
    })?;

    fs::write(&tmp_path, &json).map_err(|e| ContactGraphError::Config {
        message: format!(
            "failed to write temporary config file '{}': {}",
            tmp_path.display(),
            e
        ),
    })?;

    fs::rename(&tmp_path, &config_path).map_err(|e| ContactGraphError::Config {
        message: format!(
            "failed to rename temporary config file '{}' to '{}': {}",
            tmp_path.display(),
            config_path.display(),
            e
        ),
    })?;

    Ok(())
}
