//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: ACTON_, sections separated by `__`,
//!    e.g. `ACTON_QUERY__MAX_LIMIT=100` or `ACTON_SERVICE__LOG_LEVEL=debug`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/acton-query/{service_name}/config.toml
//! 4. System directory: /etc/acton-query/{service_name}/config.toml
//! 5. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
#[cfg(feature = "database")]
use std::time::Duration;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,

    /// Query planning limits
    #[serde(default)]
    pub query: QueryConfig,

    /// Database configuration (optional)
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Environment (dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Query planning limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Window size used when a caller does not pick one
    #[serde(default = "default_limit")]
    pub default_limit: u64,

    /// Largest window a single page may request; larger limits are capped
    #[serde(default = "default_max_limit")]
    pub max_limit: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum idle connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Maximum retry attempts for establishing database connection
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retry attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

#[cfg(feature = "database")]
impl DatabaseConfig {
    /// Connection acquire timeout
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_limit() -> u64 {
    20
}

fn default_max_limit() -> u64 {
    1000
}

fn default_max_connections() -> u32 {
    50
}

fn default_min_connections() -> u32 {
    5
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    2
}

impl Config {
    /// Load configuration from all sources
    ///
    /// Searches for config files in this order (first found is used):
    /// 1. Current working directory: ./config.toml
    /// 2. XDG config directory: ~/.config/acton-query/{service_name}/config.toml
    /// 3. System directory: /etc/acton-query/{service_name}/config.toml
    ///
    /// Environment variables (ACTON_ prefix, `__` between section and key)
    /// override all file-based configs.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "acton-query".to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Lowest priority first so higher priority files override
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("ACTON_").split("__"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// Bypasses XDG directories. Environment variables still override.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ACTON_").split("__"))
            .extract()?;

        Ok(config)
    }

    /// Candidate config file paths, highest priority first
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix("acton-query");
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Some(path) = xdg_dirs.find_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(
            PathBuf::from("/etc/acton-query")
                .join(service_name)
                .join("config.toml"),
        );

        paths
    }

    /// Get database URL
    pub fn database_url(&self) -> Option<&str> {
        self.database.as_ref().map(|db| db.url.as_str())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "acton-query".to_string(),
                log_level: default_log_level(),
                environment: default_environment(),
            },
            query: QueryConfig::default(),
            database: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.query.default_limit, 20);
        assert_eq!(config.query.max_limit, 1000);
        assert!(config.database_url().is_none());
    }

    // Loading reads ACTON_* variables; Jail keeps tests that set them isolated

    #[test]
    fn test_load_from_file_overrides_defaults() {
        Jail::expect_with(|_jail| {
            let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
            writeln!(
                file,
                r#"
[service]
name = "member-search"

[query]
max_limit = 50

[database]
url = "postgres://localhost/members"
"#
            )
            .unwrap();

            let config = Config::load_from(file.path()).unwrap();
            assert_eq!(config.service.name, "member-search");
            assert_eq!(config.query.max_limit, 50);
            assert_eq!(config.query.default_limit, 20);
            let database = config.database.unwrap();
            assert_eq!(database.url, "postgres://localhost/members");
            assert_eq!(database.max_retries, 5);
            Ok(())
        });
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let dir = tempfile::tempdir().unwrap();
            let config = Config::load_from(dir.path().join("absent.toml")).unwrap();
            assert_eq!(config.service.name, "acton-query");
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_snake_case_keys() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[query]\nmax_limit = 50\n")?;
            jail.set_env("ACTON_QUERY__MAX_LIMIT", 7);
            jail.set_env("ACTON_QUERY__DEFAULT_LIMIT", 5);
            jail.set_env("ACTON_SERVICE__LOG_LEVEL", "debug");

            let config = Config::load_from("config.toml").unwrap();
            assert_eq!(config.query.max_limit, 7);
            assert_eq!(config.query.default_limit, 5);
            assert_eq!(config.service.log_level, "debug");
            assert_eq!(config.service.name, "acton-query");
            Ok(())
        });
    }

    #[test]
    fn test_single_underscore_does_not_split_keys() {
        Jail::expect_with(|jail| {
            jail.set_env("ACTON_QUERY_MAX_LIMIT", 7);
            let config = Config::load_from(jail.directory().join("absent.toml")).unwrap();
            assert_eq!(config.query.max_limit, 1000);
            Ok(())
        });
    }
}
