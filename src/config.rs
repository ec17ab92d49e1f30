//! Service configuration.
//!
//! Loaded from a TOML file (`AQMON_CONFIG`, else `./aqmon.toml`). Every
//! field has a default, so a missing file runs the monitor against the live
//! page with the standard 5-minute cadence. A few environment variables
//! override the file for container deployments.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::page::FetchSettings;
use crate::logging::LogLevel;
use crate::schedule::divides_day;

pub const DEFAULT_CONFIG_PATH: &str = "./aqmon.toml";
pub const DEFAULT_URL: &str = "https://www.ineossarnia.com/real-time-emission-data";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Page exposing the live readings table.
    pub url: String,
    pub data_log_path: PathBuf,
    pub error_log_path: PathBuf,
    pub poll_interval_secs: u64,
    pub fetch_timeout_secs: u64,
    /// Pause after the polling loop faults, before it is rebuilt.
    pub cooldown_secs: u64,
    /// Pause between re-polls while the table has not appeared yet.
    pub fetch_retry_delay_ms: u64,
    pub user_agent: String,
    pub log_level: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            data_log_path: PathBuf::from("air_quality_log.csv"),
            error_log_path: PathBuf::from("scraper_error.log"),
            poll_interval_secs: 300,
            fetch_timeout_secs: 15,
            cooldown_secs: 30,
            fetch_retry_delay_ms: 1000,
            user_agent: concat!("aqmon_service/", env!("CARGO_PKG_VERSION")).to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            timeout: self.fetch_timeout(),
            retry_delay: Duration::from_millis(self.fetch_retry_delay_ms),
            user_agent: self.user_agent.clone(),
        }
    }

    pub fn log_level(&self) -> Result<LogLevel, ConfigError> {
        self.log_level.parse().map_err(ConfigError::Invalid)
    }

    /// Rejects settings the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Invalid("url must not be empty".to_string()));
        }
        if !divides_day(self.poll_interval_secs) {
            return Err(ConfigError::Invalid(format!(
                "poll_interval_secs must be > 0 and divide 86400 evenly (got {})",
                self.poll_interval_secs
            )));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid("fetch_timeout_secs must be > 0".to_string()));
        }
        if self.cooldown_secs == 0 {
            return Err(ConfigError::Invalid("cooldown_secs must be > 0".to_string()));
        }
        if self.fetch_retry_delay_ms == 0 {
            return Err(ConfigError::Invalid("fetch_retry_delay_ms must be > 0".to_string()));
        }
        self.log_level()?;
        Ok(())
    }

    /// Applies `AQMON_URL`, `AQMON_DATA_LOG` and `AQMON_ERROR_LOG`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("AQMON_URL") {
            self.url = url;
        }
        if let Ok(path) = std::env::var("AQMON_DATA_LOG") {
            self.data_log_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("AQMON_ERROR_LOG") {
            self.error_log_path = PathBuf::from(path);
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Cannot read config: {}", e),
            ConfigError::Parse(e) => write!(f, "Invalid config TOML: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parses and validates a TOML document.
pub fn parse_config(text: &str) -> Result<MonitorConfig, ConfigError> {
    let config: MonitorConfig = toml::from_str(text).map_err(ConfigError::Parse)?;
    config.validate()?;
    Ok(config)
}

/// Loads `path`; a missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<MonitorConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_config(&text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(MonitorConfig::default()),
        Err(e) => Err(ConfigError::Io(e)),
    }
}

/// Loads `.env`, then the config file named by `explicit` or `AQMON_CONFIG`,
/// then environment overrides.
pub fn load_from_env(explicit: Option<&Path>) -> Result<MonitorConfig, ConfigError> {
    dotenv::dotenv().ok();

    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => std::env::var("AQMON_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
    };

    let mut config = load_config(&path)?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}
