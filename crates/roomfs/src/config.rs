//! Service configuration file.
//!
//! One TOML file per service name, under the platform configuration directory
//! unless a path is given explicitly. A missing file means defaults; `--conf`
//! writes the defaults out for editing.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use roomfs_core::SessionConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Homeserver used when the configuration names none.
pub const DEFAULT_ADDRESS: &str = "https://matrix.org";

/// Errors loading or writing configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading or writing a file failed.
    #[error("{path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying failure.
        source: io::Error,
    },

    /// File is not valid configuration TOML.
    #[error("{path}: {source}")]
    Parse {
        /// File involved.
        path: PathBuf,
        /// Parser failure.
        source: toml::de::Error,
    },

    /// Defaults could not be rendered as TOML.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Homeserver address is unusable.
    #[error("invalid homeserver address: {0:?}")]
    InvalidAddress(String),

    /// `--conf` refuses to replace an existing file.
    #[error("configuration already exists at {0}")]
    AlreadyExists(PathBuf),

    /// Platform has no home directory to derive default paths from.
    #[error("no home directory; pass --config and --log-dir explicitly")]
    NoHomeDirectory,
}

/// Contents of a service configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Homeserver address. A bare host gets an `https://` scheme.
    pub address: String,
    /// Root directory for buffers. Defaults to the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    /// Session engine settings.
    pub session: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            log_dir: None,
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    /// Default location of the file for `service`.
    pub fn default_path(service: &str) -> Result<PathBuf, ConfigError> {
        Ok(project_dirs()?.config_dir().join(format!("{service}.toml")))
    }

    /// Load `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no configuration file, using defaults");
                return Ok(Self::default());
            },
            Err(source) => return Err(ConfigError::Io { path: path.to_path_buf(), source }),
        };
        toml::from_str(&contents)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Write the default configuration to `path`.
    ///
    /// Fails with [`ConfigError::AlreadyExists`] rather than overwrite.
    pub fn create(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::Io { path: parent.to_path_buf(), source })?;
        }
        let contents = toml::to_string_pretty(&Self::default())?;
        fs::write(path, contents)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })
    }

    /// Homeserver URL with a scheme.
    pub fn homeserver(&self) -> Result<String, ConfigError> {
        normalize_address(&self.address)
    }

    /// Directory holding the buffers of `service`.
    pub fn buffer_root(&self, service: &str) -> Result<PathBuf, ConfigError> {
        match &self.log_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(project_dirs()?.data_dir().join(service)),
        }
    }
}

fn project_dirs() -> Result<ProjectDirs, ConfigError> {
    ProjectDirs::from("", "", "roomfs").ok_or(ConfigError::NoHomeDirectory)
}

/// Add an `https://` scheme to a bare host and strip trailing slashes.
fn normalize_address(address: &str) -> Result<String, ConfigError> {
    let trimmed = address.trim().trim_end_matches('/');
    let (scheme, host) = match trimmed.split_once("://") {
        Some((scheme, host)) => (scheme, host),
        None => ("https", trimmed),
    };
    if host.is_empty() || !matches!(scheme, "http" | "https") || host.contains(char::is_whitespace)
    {
        return Err(ConfigError::InvalidAddress(address.to_string()));
    }
    Ok(format!("{scheme}://{host}"))
}
