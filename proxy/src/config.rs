//! TOML configuration.
//!
//! ```toml
//! listen = "127.0.0.1:50910"
//! path = "/proxy"
//! connect_timeout_seconds = 30
//! idle_timeout_seconds = 60
//! max_stream_seconds = 300
//! max_body_bytes = 2147483648
//! max_redirects = 5
//! isolation_headers = false
//! static_dir = "app"
//! ```
use std::path::{Path, PathBuf};
use std::{env, fs, io};

use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "RESOURCERY_CONFIG";

/// Boundary-level configuration; every field is optional.
///
/// Converted into [`crate::ResolvedConfig`] before use.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// Socket address to bind. Default: `127.0.0.1:50910`.
    pub listen: Option<String>,

    /// Route of the proxy endpoint. Default: `/proxy`.
    pub path: Option<String>,

    /// User-Agent sent upstream.
    pub user_agent: Option<String>,

    /// TCP connect timeout. Default: 30.
    pub connect_timeout_seconds: Option<u64>,

    /// Maximum silence between upstream chunks. Default: 60.
    pub idle_timeout_seconds: Option<u64>,

    /// Wall-clock budget for relaying one body. Default: 300.
    pub max_stream_seconds: Option<u64>,

    /// Largest body relayed, declared or actual. Default: 2 GiB.
    pub max_body_bytes: Option<u64>,

    /// Redirects followed after the origin request. Default: 5.
    pub max_redirects: Option<u32>,

    /// Add `Cross-Origin-Embedder-Policy` / `Cross-Origin-Opener-Policy`
    /// to every response, as the development host does for the app shell.
    #[serde(default)]
    pub isolation_headers: bool,

    /// Directory served for every path outside the proxy and liveness
    /// routes. Unset means those paths get the JSON 404.
    pub static_dir: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for `{field}`: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl ProxyConfig {
    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| {
            tracing::warn!("Failed to read config at {}: {}", path.display(), source);
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;

        toml::from_str(&content).map_err(|source| {
            tracing::warn!("Failed to parse config at {}: {}", path.display(), source);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Load from `explicit`, else `$RESOURCERY_CONFIG`, else the default path
    /// if it exists. Returns defaults when no file is found.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        if let Some(path) = env::var_os(CONFIG_ENV_VAR).filter(|v| !v.is_empty()) {
            return Self::load_from(Path::new(&path));
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/resourcery/config.toml`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("resourcery").join("config.toml"))
    }
}
