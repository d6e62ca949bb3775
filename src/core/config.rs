//! Configuration management with layered hierarchy
//!
//! Sources, lowest priority first:
//! 1. Built-in defaults
//! 2. Global user config (`~/.config/linkcache/config.yaml`)
//! 3. An explicit config file (`--config`)
//! 4. Environment variables (`LINKCACHE_*`)
//!
//! Command-line flags are applied on top by the CLI.

use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use crate::core::store::DEFAULT_EVENT_RETENTION;

pub const DEFAULT_BASE_URL: &str = "https://scrapbox.io";
pub const DEFAULT_MAX_AGE: i64 = 3600;
pub const DEFAULT_WATCH_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },

    #[error("Invalid base URL {value}: {message}")]
    BaseUrl { value: String, message: String },

    #[error("Cannot determine a data directory; set LINKCACHE_DB or pass --database")]
    NoDataDir,
}

/// linkcache configuration with layered hierarchy
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the SQLite store
    pub database: Option<PathBuf>,

    /// Remote API base URL
    pub base_url: Option<String>,

    /// Session cookie for private collections
    pub sid: Option<String>,

    /// Seconds before a checked collection is considered stale
    pub max_age: Option<i64>,

    /// Poll interval of `linkcache watch`
    pub watch_interval_ms: Option<u64>,

    /// Seconds cross-process events are kept
    pub event_retention: Option<i64>,

    /// User-Agent sent to the remote
    pub user_agent: Option<String>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // Global config is optional; a broken one is reported but not fatal
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                match Self::from_file(&global_path) {
                    Ok(global) => config.merge(global),
                    Err(e) => tracing::warn!("ignoring global config: {}", e),
                }
            }
        }

        if let Some(path) = explicit {
            config.merge(Self::from_file(path)?);
        }

        config.merge(Self::from_env(|var| std::env::var(var).ok())?);

        Ok(config)
    }

    /// Read one config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        // An empty file parses as null
        if contents.trim().is_empty() {
            return Ok(Config::default());
        }

        serde_yml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Config from `LINKCACHE_*` variables, read through `get`
    fn from_env(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config {
            database: get("LINKCACHE_DB").map(PathBuf::from),
            base_url: get("LINKCACHE_BASE_URL"),
            sid: get("LINKCACHE_SID"),
            ..Config::default()
        };

        if let Some(value) = get("LINKCACHE_MAX_AGE") {
            let max_age = value.parse().map_err(|_| ConfigError::Env {
                var: "LINKCACHE_MAX_AGE",
                value: value.clone(),
            })?;
            config.max_age = Some(max_age);
        }

        Ok(config)
    }

    /// Get the path to the global config file
    pub fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "linkcache")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Config) {
        if other.database.is_some() {
            self.database = other.database;
        }
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.sid.is_some() {
            self.sid = other.sid;
        }
        if other.max_age.is_some() {
            self.max_age = other.max_age;
        }
        if other.watch_interval_ms.is_some() {
            self.watch_interval_ms = other.watch_interval_ms;
        }
        if other.event_retention.is_some() {
            self.event_retention = other.event_retention;
        }
        if other.user_agent.is_some() {
            self.user_agent = other.user_agent;
        }
    }

    /// Get the store path, defaulting to the user data directory
    pub fn database(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref path) = self.database {
            return Ok(path.clone());
        }

        directories::ProjectDirs::from("", "", "linkcache")
            .map(|dirs| dirs.data_dir().join("links.db"))
            .ok_or(ConfigError::NoDataDir)
    }

    /// The remote API base URL; it must be able to carry a path
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let value = self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let invalid = |message: String| ConfigError::BaseUrl {
            value: value.to_string(),
            message,
        };

        let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(invalid("not a hierarchical URL".to_string()));
        }
        Ok(url)
    }

    pub fn max_age(&self) -> i64 {
        self.max_age.unwrap_or(DEFAULT_MAX_AGE)
    }

    pub fn watch_interval_ms(&self) -> u64 {
        self.watch_interval_ms.unwrap_or(DEFAULT_WATCH_INTERVAL_MS)
    }

    pub fn event_retention(&self) -> i64 {
        self.event_retention.unwrap_or(DEFAULT_EVENT_RETENTION)
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("linkcache/{}", env!("CARGO_PKG_VERSION")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.base_url().unwrap().as_str(), "https://scrapbox.io/");
        assert_eq!(config.max_age(), 3600);
        assert_eq!(config.watch_interval_ms(), 1000);
        assert_eq!(config.event_retention(), DEFAULT_EVENT_RETENTION);
        assert!(config.user_agent().starts_with("linkcache/"));
    }

    #[test]
    fn test_from_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(
            &path,
            "database: /tmp/links.db\nmax_age: 60\nsid: s%3Aabc\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.database().unwrap(), PathBuf::from("/tmp/links.db"));
        assert_eq!(config.max_age(), 60);
        assert_eq!(config.sid.as_deref(), Some("s%3Aabc"));
        assert!(config.base_url.is_none());
    }

    #[test]
    fn test_empty_file_is_default() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert!(config.database.is_none());
    }

    #[test]
    fn test_invalid_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "max_age: soon\n").unwrap();

        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            Config::from_file(&tmp.path().join("missing.yaml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config {
            max_age: Some(60),
            base_url: Some("http://file".into()),
            ..Config::default()
        };
        let env: HashMap<&str, &str> =
            [("LINKCACHE_MAX_AGE", "120"), ("LINKCACHE_SID", "secret")].into();

        config.merge(Config::from_env(|var| env.get(var).map(|v| v.to_string())).unwrap());

        assert_eq!(config.max_age(), 120);
        assert_eq!(config.sid.as_deref(), Some("secret"));
        assert_eq!(config.base_url.as_deref(), Some("http://file"));
    }

    #[test]
    fn test_malformed_base_url_is_a_config_error() {
        for value in ["not a url", "mailto:someone@example.com"] {
            let config = Config {
                base_url: Some(value.into()),
                ..Config::default()
            };
            assert!(matches!(
                config.base_url(),
                Err(ConfigError::BaseUrl { .. })
            ));
        }
    }

    #[test]
    fn test_invalid_env_value() {
        let result = Config::from_env(|var| {
            (var == "LINKCACHE_MAX_AGE").then(|| "an hour".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Env { .. })));
    }
}
