//! Configuration management for the recap tools.
//!
//! The configuration lives at `~/.ashare-recap/config.json`. A missing file
//! means defaults; every section is optional.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `TUSHARE_TOKEN` → sources.tushare_token
//! - `ASHARE_LOG_LEVEL` → observability.log_level
//! - `ASHARE_REPORT_DIR` → recap.report_dir

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".ashare-recap"),
        |dirs| dirs.home_dir().join(".ashare-recap"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Expand `~` and environment variables in a configured path.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::full(raw).map_or_else(|_| raw.to_string(), |p| p.into_owned()))
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Upstream data source settings
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Recap pipeline tunables
    #[serde(default)]
    pub recap: RecapConfig,

    /// Grid recommendation and backtest tunables
    #[serde(default)]
    pub grid: GridConfig,

    /// Securities analyzed by `grid` and monitored by `watch`
    #[serde(default)]
    pub stocks: Vec<StockEntry>,

    /// Price watcher settings
    #[serde(default)]
    pub watch: WatchConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration (default path or an explicit one) and apply
    /// environment overrides.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TUSHARE_TOKEN").filter(|t| !t.is_empty()) {
            self.sources.tushare_token = Some(token);
        }
        if let Some(level) = lookup("ASHARE_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(dir) = lookup("ASHARE_REPORT_DIR") {
            self.recap.report_dir = dir;
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// Upstream data source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Tushare Pro token. Without it the Tushare-backed needs go straight to
    /// their page fallback.
    #[serde(default)]
    pub tushare_token: Option<String>,

    /// Upper bound for any single API or page call, in seconds
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// User-Agent strings rotated across page requests
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,
}

impl SourcesConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            tushare_token: None,
            call_timeout_secs: default_call_timeout_secs(),
            user_agents: default_user_agents(),
        }
    }
}

/// Recap pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecapConfig {
    /// Number of sectors whose leaders are looked up
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Leaders kept per sector, first N in source order
    #[serde(default = "default_leader_cap")]
    pub leader_cap: usize,

    /// Maximum leader lookups in flight
    #[serde(default = "default_leader_concurrency")]
    pub leader_concurrency: usize,

    /// Ledger rows rendered in the report
    #[serde(default = "default_ledger_limit")]
    pub ledger_limit: usize,

    /// Directory receiving recap reports
    #[serde(default = "default_report_dir")]
    pub report_dir: String,

    /// Directory receiving headline digests
    #[serde(default = "default_news_dir")]
    pub news_dir: String,
}

impl RecapConfig {
    pub fn report_dir_path(&self) -> PathBuf {
        expand_path(&self.report_dir)
    }

    pub fn news_dir_path(&self) -> PathBuf {
        expand_path(&self.news_dir)
    }
}

impl Default for RecapConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            leader_cap: default_leader_cap(),
            leader_concurrency: default_leader_concurrency(),
            ledger_limit: default_ledger_limit(),
            report_dir: default_report_dir(),
            news_dir: default_news_dir(),
        }
    }
}

/// Grid recommendation and backtest configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Dip/rise threshold used by the backtest, in percent
    #[serde(default = "default_threshold_pct")]
    pub threshold_pct: f64,

    /// Shares per simulated trade
    #[serde(default = "default_unit_size")]
    pub unit_size: f64,

    /// Minimum candles before a recommendation is produced
    #[serde(default = "default_min_history")]
    pub min_history: usize,

    /// Average amplitude ratio is multiplied by this to get a grid percentage
    #[serde(default = "default_amplitude_multiplier")]
    pub amplitude_multiplier: f64,

    /// Daily candles fetched per security
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            threshold_pct: default_threshold_pct(),
            unit_size: default_unit_size(),
            min_history: default_min_history(),
            amplitude_multiplier: default_amplitude_multiplier(),
            lookback_days: default_lookback_days(),
        }
    }
}

/// A configured security.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockEntry {
    /// Exchange code, bare ("600519") or suffixed ("600519.SH")
    pub code: String,

    /// Watcher buy threshold
    #[serde(default)]
    pub buy_price: Option<f64>,

    /// Watcher sell threshold
    #[serde(default)]
    pub sell_price: Option<f64>,
}

/// Price watcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Seconds between quote polls
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Seconds between buffered log flushes
    #[serde(default = "default_write_interval_secs")]
    pub write_interval_secs: u64,

    /// Seconds before a new log file is started
    #[serde(default = "default_file_interval_secs")]
    pub file_interval_secs: u64,

    /// Directory receiving watcher logs
    #[serde(default = "default_watch_log_dir")]
    pub log_dir: String,
}

impl WatchConfig {
    pub fn log_dir_path(&self) -> PathBuf {
        expand_path(&self.log_dir)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            write_interval_secs: default_write_interval_secs(),
            file_interval_secs: default_file_interval_secs(),
            log_dir: default_watch_log_dir(),
        }
    }
}

// ============================================================================
// Defaults
// ============================================================================

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
fn default_call_timeout_secs() -> u64 {
    15
}
fn default_user_agents() -> Vec<String> {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36".into(),
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36".into(),
        "Mozilla/5.0 (Windows NT 10.0; WOW64; rv:45.0) Gecko/20100101 Firefox/45.0".into(),
    ]
}
fn default_top_k() -> usize {
    20
}
fn default_leader_cap() -> usize {
    3
}
fn default_leader_concurrency() -> usize {
    3
}
fn default_ledger_limit() -> usize {
    30
}
fn default_report_dir() -> String {
    "log".into()
}
fn default_news_dir() -> String {
    "news".into()
}
fn default_threshold_pct() -> f64 {
    3.0
}
fn default_unit_size() -> f64 {
    100.0
}
fn default_min_history() -> usize {
    10
}
fn default_amplitude_multiplier() -> f64 {
    50.0
}
fn default_lookback_days() -> u32 {
    90
}
fn default_interval_secs() -> u64 {
    60
}
fn default_write_interval_secs() -> u64 {
    60
}
fn default_file_interval_secs() -> u64 {
    600
}
fn default_watch_log_dir() -> String {
    "log".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sources.call_timeout(), Duration::from_secs(15));
        assert_eq!(config.recap.top_k, 20);
        assert_eq!(config.recap.leader_cap, 3);
        assert_eq!(config.recap.leader_concurrency, 3);
        assert_eq!(config.recap.ledger_limit, 30);
        assert_eq!(config.grid.min_history, 10);
        assert_eq!(config.grid.threshold_pct, 3.0);
        assert_eq!(config.watch.file_interval_secs, 600);
        assert!(config.stocks.is_empty());
        assert!(!config.sources.user_agents.is_empty());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"stocks": [{{"code": "600519", "buy_price": 1500.0}}], "recap": {{"top_k": 5}}}}"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.recap.top_k, 5);
        assert_eq!(config.recap.leader_cap, 3);
        assert_eq!(config.stocks.len(), 1);
        assert_eq!(config.stocks[0].buy_price, Some(1500.0));
        assert_eq!(config.stocks[0].sell_price, None);
    }

    #[test]
    fn test_load_from_rejects_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TUSHARE_TOKEN", "abc"),
            ("ASHARE_LOG_LEVEL", "debug"),
            ("ASHARE_REPORT_DIR", "/tmp/reports"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.sources.tushare_token.as_deref(), Some("abc"));
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.recap.report_dir_path(), PathBuf::from("/tmp/reports"));
    }

    #[test]
    fn test_empty_token_override_ignored() {
        let mut config = Config::default();
        config.sources.tushare_token = Some("kept".into());
        config.apply_overrides_from(|k| (k == "TUSHARE_TOKEN").then(String::new));
        assert_eq!(config.sources.tushare_token.as_deref(), Some("kept"));
    }
}
