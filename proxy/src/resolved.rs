//! Resolved, invariant-safe configuration.
//!
//! Converts the optional, boundary-level [`ProxyConfig`] into concrete values
//! so request handling never deals with `Option`.
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{ConfigError, ProxyConfig};
use crate::stream::StreamLimits;

pub(crate) const DEFAULT_LISTEN: &str = "127.0.0.1:50910";
pub(crate) const DEFAULT_PATH: &str = "/proxy";
pub(crate) const HEALTH_PATH: &str = "/healthz";
pub(crate) const DEFAULT_USER_AGENT: &str = concat!("resourcery-proxy/", env!("CARGO_PKG_VERSION"));
const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_IDLE_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_MAX_STREAM_SECONDS: u64 = 5 * 60;
const DEFAULT_MAX_BODY_BYTES: u64 = 2 * 1024 * 1024 * 1024;
const DEFAULT_MAX_REDIRECTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub listen: SocketAddr,
    pub path: String,
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub max_redirects: u32,
    pub limits: StreamLimits,
    pub isolation_headers: bool,
    pub static_dir: Option<PathBuf>,
}

impl ResolvedConfig {
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ConfigError> {
        let listen_raw = config.listen.as_deref().unwrap_or(DEFAULT_LISTEN);
        let listen = listen_raw
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                field: "listen",
                message: format!("{listen_raw}: {e}"),
            })?;

        let path = config
            .path
            .clone()
            .unwrap_or_else(|| DEFAULT_PATH.to_string());
        if !path.starts_with('/') || path.contains(['?', '#', '{', '}', '*']) {
            return Err(ConfigError::Invalid {
                field: "path",
                message: format!("{path}: must be a literal absolute path without query"),
            });
        }
        if path == HEALTH_PATH {
            return Err(ConfigError::Invalid {
                field: "path",
                message: format!("{path} is reserved for the liveness route"),
            });
        }

        let user_agent = config
            .user_agent
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let connect_timeout = seconds(
            "connect_timeout_seconds",
            config.connect_timeout_seconds,
            DEFAULT_CONNECT_TIMEOUT_SECONDS,
        )?;
        let idle_timeout = seconds(
            "idle_timeout_seconds",
            config.idle_timeout_seconds,
            DEFAULT_IDLE_TIMEOUT_SECONDS,
        )?;
        let max_duration = seconds(
            "max_stream_seconds",
            config.max_stream_seconds,
            DEFAULT_MAX_STREAM_SECONDS,
        )?;

        let max_bytes = config.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES);
        if max_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_body_bytes",
                message: "must be greater than zero".to_string(),
            });
        }

        if let Some(dir) = &config.static_dir
            && !dir.is_dir()
        {
            return Err(ConfigError::Invalid {
                field: "static_dir",
                message: format!("{}: not a directory", dir.display()),
            });
        }

        Ok(Self {
            listen,
            path,
            user_agent,
            connect_timeout,
            max_redirects: config.max_redirects.unwrap_or(DEFAULT_MAX_REDIRECTS),
            limits: StreamLimits {
                idle_timeout,
                max_duration,
                max_bytes,
            },
            isolation_headers: config.isolation_headers,
            static_dir: config.static_dir.clone(),
        })
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 50910)),
            path: DEFAULT_PATH.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECONDS),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            limits: StreamLimits::default(),
            isolation_headers: false,
            static_dir: None,
        }
    }
}

fn seconds(field: &'static str, value: Option<u64>, default: u64) -> Result<Duration, ConfigError> {
    match value.unwrap_or(default) {
        0 => Err(ConfigError::Invalid {
            field,
            message: "must be greater than zero".to_string(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECONDS),
            max_duration: Duration::from_secs(DEFAULT_MAX_STREAM_SECONDS),
            max_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let resolved = ResolvedConfig::from_config(&ProxyConfig::default()).unwrap();
        assert_eq!(resolved.listen, "127.0.0.1:50910".parse().unwrap());
        assert_eq!(resolved.path, "/proxy");
        assert_eq!(resolved.connect_timeout, Duration::from_secs(30));
        assert_eq!(resolved.limits.idle_timeout, Duration::from_secs(60));
        assert_eq!(resolved.limits.max_duration, Duration::from_secs(300));
        assert_eq!(resolved.limits.max_bytes, 2_147_483_648);
        assert_eq!(resolved.max_redirects, 5);
        assert!(!resolved.isolation_headers);
        assert!(resolved.static_dir.is_none());
    }

    #[test]
    fn test_default_impl_matches_empty_config() {
        let from_empty = ResolvedConfig::from_config(&ProxyConfig::default()).unwrap();
        let default = ResolvedConfig::default();
        assert_eq!(from_empty.listen, default.listen);
        assert_eq!(from_empty.limits, default.limits);
        assert_eq!(from_empty.user_agent, default.user_agent);
    }

    #[test]
    fn test_blank_user_agent_falls_back() {
        let resolved = ResolvedConfig::from_config(&ProxyConfig {
            user_agent: Some("   ".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert!(resolved.user_agent.starts_with("resourcery-proxy/"));
    }

    #[test]
    fn test_invalid_listen() {
        let err = ResolvedConfig::from_config(&ProxyConfig {
            listen: Some("localhost".to_string()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "listen", .. }));
    }

    #[test]
    fn test_invalid_path() {
        let err = ResolvedConfig::from_config(&ProxyConfig {
            path: Some("proxy".to_string()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "path", .. }));
    }

    #[test]
    fn test_health_path_reserved() {
        let err = ResolvedConfig::from_config(&ProxyConfig {
            path: Some("/healthz".to_string()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "path", .. }));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = ResolvedConfig::from_config(&ProxyConfig {
            idle_timeout_seconds: Some(0),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "idle_timeout_seconds",
                ..
            }
        ));
    }

    #[test]
    fn test_static_dir_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = ResolvedConfig::from_config(&ProxyConfig {
            static_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(resolved.static_dir.as_deref(), Some(dir.path()));

        let err = ResolvedConfig::from_config(&ProxyConfig {
            static_dir: Some(dir.path().join("missing")),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "static_dir",
                ..
            }
        ));
    }
}
