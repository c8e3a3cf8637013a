//! Configuration loading and resolution
//!
//! Settings resolve with the same priority order everywhere:
//! command-line argument, then environment variable, then TOML config file,
//! then compiled default.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Environment variable overriding the database path
pub const ENV_DATABASE: &str = "CW_DATABASE";
/// Environment variable overriding the upstream feed URL
pub const ENV_FEED_URL: &str = "CW_FEED_URL";
/// Environment variable carrying the Gemini API key
pub const ENV_GEMINI_API_KEY: &str = "CW_GEMINI_API_KEY";

/// Default upstream feed: NASA EONET v3 open events
pub const DEFAULT_FEED_URL: &str = "https://eonet.gsfc.nasa.gov/api/v3/events";

/// TOML configuration file contents (`~/.config/crisiswatch/config.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Path to the SQLite database file
    pub database: Option<String>,
    /// Upstream hazard feed URL
    pub feed_url: Option<String>,
    /// Gemini API key (environment variable takes priority)
    pub gemini_api_key: Option<String>,
    /// Enrichment worker tuning
    #[serde(default)]
    pub worker: WorkerToml,
}

/// Enrichment worker settings, all optional in the file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerToml {
    /// Records fetched per discovery cycle (default 10)
    pub batch_size: Option<u32>,
    /// Concurrent analysis calls in flight (default 5)
    pub pool_width: Option<u32>,
    /// Token-bucket budget for the analysis service (default 50/min)
    pub requests_per_minute: Option<u32>,
    /// Sleep when discovery finds nothing, seconds (default 300)
    pub idle_backoff_secs: Option<u64>,
    /// Sleep after finishing a batch, seconds (default 60)
    pub cooldown_secs: Option<u64>,
    /// Sleep after a loop-level failure, seconds (default 60)
    pub error_backoff_secs: Option<u64>,
}

/// Standard User-Agent for outbound HTTP clients
pub fn get_user_agent() -> String {
    format!("CrisisWatch/{}", env!("CARGO_PKG_VERSION"))
}

/// Default configuration file path for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("crisiswatch").join("config.toml"))
}

/// Load the TOML config file.
///
/// A missing file yields defaults; a present but unparseable file is an
/// error so misconfiguration is not silently ignored.
pub fn load_toml_config() -> Result<TomlConfig> {
    let Some(path) = default_config_path() else {
        return Ok(TomlConfig::default());
    };
    if !path.exists() {
        return Ok(TomlConfig::default());
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Resolve the SQLite database path.
///
/// Priority: CLI argument, `CW_DATABASE`, TOML `database`, then the
/// OS-dependent data directory.
pub fn resolve_database_path(cli_arg: Option<&str>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var(ENV_DATABASE) {
        return PathBuf::from(path);
    }
    if let Some(path) = &config.database {
        return PathBuf::from(path);
    }
    default_database_path()
}

/// OS-dependent default database location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("crisiswatch"))
        .unwrap_or_else(|| PathBuf::from("./crisiswatch_data"))
        .join("crisiswatch.db")
}

/// Resolve the upstream feed URL (CLI → ENV → TOML → EONET default)
pub fn resolve_feed_url(cli_arg: Option<&str>, config: &TomlConfig) -> String {
    if let Some(url) = cli_arg {
        return url.to_string();
    }
    if let Ok(url) = std::env::var(ENV_FEED_URL) {
        return url;
    }
    config
        .feed_url
        .clone()
        .unwrap_or_else(|| DEFAULT_FEED_URL.to_string())
}

/// Resolve the Gemini API key from ENV → TOML.
///
/// Warns when the key is present in both sources, since a stale TOML copy
/// shadowed by the environment is a common misconfiguration.
pub fn resolve_gemini_api_key(config: &TomlConfig) -> Result<String> {
    let env_key = std::env::var(ENV_GEMINI_API_KEY)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = config
        .gemini_api_key
        .as_deref()
        .filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "Gemini API key found in both environment and TOML; using environment (highest priority)"
        );
    }

    if let Some(key) = env_key {
        return Ok(key);
    }
    if let Some(key) = toml_key {
        return Ok(key.to_string());
    }

    Err(Error::Config(format!(
        "Gemini API key not configured. Set one of:\n\
         1. Environment: {}=your-key-here\n\
         2. TOML config: ~/.config/crisiswatch/config.toml (gemini_api_key = \"your-key\")",
        ENV_GEMINI_API_KEY
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("abc123"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   "));
    }

    #[test]
    fn test_resolve_database_path_cli_wins() {
        let config = TomlConfig {
            database: Some("/from/toml.db".to_string()),
            ..Default::default()
        };
        let path = resolve_database_path(Some("/from/cli.db"), &config);
        assert_eq!(path, PathBuf::from("/from/cli.db"));
    }

    #[test]
    fn test_resolve_feed_url_default() {
        let config = TomlConfig::default();
        // Only meaningful when CW_FEED_URL is unset in the test environment
        if std::env::var(ENV_FEED_URL).is_err() {
            assert_eq!(resolve_feed_url(None, &config), DEFAULT_FEED_URL);
        }
    }

    #[test]
    fn test_worker_toml_all_optional() {
        let config: TomlConfig = toml::from_str("").expect("empty config parses");
        assert!(config.worker.batch_size.is_none());

        let config: TomlConfig = toml::from_str(
            r#"
            database = "/tmp/cw.db"

            [worker]
            batch_size = 25
            requests_per_minute = 30
            "#,
        )
        .expect("partial worker section parses");
        assert_eq!(config.worker.batch_size, Some(25));
        assert_eq!(config.worker.requests_per_minute, Some(30));
        assert!(config.worker.pool_width.is_none());
    }
}
