//! Configuration loader for mdflow.
//!
//! Reads `mdflow.toml` and deserializes it into [`MdflowConfig`]. The lenient
//! loader falls back to defaults when the file is missing or malformed; the
//! strict loader reports what went wrong.

use std::path::{Path, PathBuf};

use mdflow_types::config::MdflowConfig;

/// Conventional config file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "mdflow.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Load configuration from `path`, reporting any failure.
pub async fn load_config_strict(path: &Path) -> Result<MdflowConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound(path.to_path_buf())
        } else {
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    toml::from_str::<MdflowConfig>(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load configuration from `path`.
///
/// - Missing file: returns [`MdflowConfig::default()`].
/// - Unreadable or malformed file: logs a warning and returns the default.
pub async fn load_config(path: &Path) -> MdflowConfig {
    match load_config_strict(path).await {
        Ok(config) => config,
        Err(ConfigError::NotFound(_)) => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            MdflowConfig::default()
        }
        Err(err) => {
            tracing::warn!("{err}, using defaults");
            MdflowConfig::default()
        }
    }
}
