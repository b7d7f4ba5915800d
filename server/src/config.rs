use clap::{Parser, ValueEnum};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::presence::TrackerSettings;

/// Command-line flags. Only flags that were actually given (or set through
/// their env var) override the file and environment layers.
#[derive(Parser, Serialize, Debug, Default)]
#[command(name = "visitors-server", version, about = "Visitor presence server")]
pub struct Cli {
    /// Port to listen on
    #[arg(long, env = "VISITORS_PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long, env = "VISITORS_BIND_ADDRESS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./visitors.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "VISITORS_JSON_LOGS")]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for the SQLite database
    #[arg(long, env = "VISITORS_DATA_DIR")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Storage backend: "sqlite" (durable) or "memory" (lost on restart)
    #[arg(long, env = "VISITORS_STORAGE", value_enum)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageBackend>,

    /// Bearer secret for /api/cleanup. The endpoint rejects every call when unset.
    #[arg(long, env = "VISITORS_CRON_SECRET")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron_secret: Option<String>,
}

/// Resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub config: String,
    pub json_logs: bool,
    pub generate_config: bool,
    pub data_dir: String,
    pub storage: StorageBackend,
    pub cron_secret: Option<String>,

    /// Tracker tuning (loaded from [tracker] section in TOML)
    #[serde(default)]
    pub tracker: TrackerConfig,
}

#[derive(ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

/// Staleness, reaping and store-call limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Seconds without join/ping before a session is reaped (default: 120)
    #[serde(default = "default_staleness_timeout")]
    pub staleness_timeout_secs: u64,

    /// Minimum seconds between inline reaps; 0 reaps on every request (default: 0)
    #[serde(default)]
    pub reap_interval_secs: u64,

    /// Seconds between background sweeps; 0 disables the sweeper (default: 60)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Timeout for a single store call in milliseconds (default: 2000)
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,

    /// Attempts per store call, including the first (default: 3)
    #[serde(default = "default_store_attempts")]
    pub store_attempts: u32,

    /// Backoff before the first retry in milliseconds, doubled per retry (default: 100)
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            staleness_timeout_secs: 120,
            reap_interval_secs: 0,
            sweep_interval_secs: 60,
            store_timeout_ms: 2000,
            store_attempts: 3,
            retry_backoff_ms: 100,
        }
    }
}

fn default_staleness_timeout() -> u64 {
    120
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_store_timeout() -> u64 {
    2000
}

fn default_store_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    100
}

impl TrackerConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl From<&TrackerConfig> for TrackerSettings {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            staleness_timeout: Duration::from_secs(config.staleness_timeout_secs),
            reap_interval: Duration::from_secs(config.reap_interval_secs),
            store_timeout: Duration::from_millis(config.store_timeout_ms),
            store_attempts: config.store_attempts,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3030,
            bind_address: "0.0.0.0".to_string(),
            config: "./visitors.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            storage: StorageBackend::Sqlite,
            cron_secret: None,
            tracker: TrackerConfig::default(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (VISITORS_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment(Cli::parse()).extract()
    }

    fn figment(cli: Cli) -> Figment {
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("VISITORS_").split("__"))
            .merge(Serialized::defaults(cli))
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Visitor Presence Server Configuration
# Place this file at ./visitors.toml or specify with --config <path>
# All settings can be overridden via environment variables (VISITORS_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 3030)
# port = 3030

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database
# data_dir = "./data"

# Storage backend: "sqlite" (durable) or "memory" (lost on restart)
# storage = "sqlite"

# Bearer secret for the scheduled cleanup endpoint (/api/cleanup)
# Leave unset to disable the endpoint
# cron_secret = ""

# ---- Presence Tracking ----
# [tracker]

# Seconds without join/ping before a visitor is dropped from the online count
# staleness_timeout_secs = 120

# Minimum seconds between inline reaps (0 = reap on every request)
# Clamped to staleness_timeout_secs
# reap_interval_secs = 0

# Seconds between background sweeps (0 = disabled)
# sweep_interval_secs = 60

# Store call limits: per-call timeout, attempts, and initial retry backoff
# store_timeout_ms = 2000
# store_attempts = 3
# retry_backoff_ms = 100
"#
    .to_string()
}
