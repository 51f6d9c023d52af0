//! Pipeline configuration files

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use pulsewear_core::PipelineConfig;

/// Errors loading a configuration file
#[derive(Error, Debug)]
pub enum ConfigFileError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that was opened
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid configuration JSON
    #[error("invalid configuration in {path}: {source}")]
    Parse {
        /// File that was parsed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// Configuration could not be rendered
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Load a configuration file. Missing fields take their defaults.
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigFileError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigFileError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Render the default configuration as pretty JSON.
pub fn default_config_json() -> Result<String, ConfigFileError> {
    Ok(serde_json::to_string_pretty(&PipelineConfig::default())?)
}
