use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration loaded from `~/.config/concord/config.toml`,
/// following `at_core::config::Config`'s section-struct-with-defaults shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub huly: HulyConfig,
    #[serde(default)]
    pub vibe: VibeConfig,
    #[serde(default)]
    pub beads: BeadsConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfigSection,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub sinks: SinksConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            huly: HulyConfig::default(),
            vibe: VibeConfig::default(),
            beads: BeadsConfig::default(),
            sync: SyncConfig::default(),
            circuit_breaker: CircuitBreakerConfigSection::default(),
            store: StoreConfig::default(),
            bridge: BridgeConfig::default(),
            sinks: SinksConfig::default(),
        }
    }
}

impl Config {
    /// Load config from `~/.config/concord/config.toml`, falling back to
    /// defaults when the file does not exist, then apply environment
    /// variable overrides (§6) — env wins over file.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        let mut cfg = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
            toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else {
            Config::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Load from a specific path (useful for tests and `--config`).
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let mut cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("concord")
            .join("config.toml")
    }

    /// Apply the recognized environment variables from §6, each overriding
    /// the corresponding config field when set.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LOG_FORMAT") {
            self.general.log_format = v;
        }
        if let Some(v) = env_u64("SYNC_INTERVAL") {
            self.sync.interval_ms = v;
        }
        if let Some(v) = env_u64("API_DELAY") {
            self.sync.api_delay_ms = v;
        }
        if let Some(v) = env_u64("MAX_WORKERS") {
            self.sync.max_workers = v as u32;
        }
        if let Some(v) = env_bool("SKIP_EMPTY_PROJECTS") {
            self.sync.skip_empty_projects = v;
        }
        if let Some(v) = env_bool("DRY_RUN") {
            self.sync.dry_run = v;
        }
        if let Some(v) = env_bool("PARALLEL_SYNC") {
            self.sync.parallel_sync = v;
        }
        if let Some(v) = env_u64("CIRCUIT_BREAKER_THRESHOLD") {
            self.circuit_breaker.failure_threshold = v as u32;
        }
        if let Some(v) = env_u64("CIRCUIT_BREAKER_COOLDOWN_MS") {
            self.circuit_breaker.cooldown_ms = v;
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `"human"` or `"json"` (`LOG_FORMAT`, §10.2). JSON is the expected
    /// mode under a process supervisor; human is the interactive default.
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "human".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HulyConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,
}

impl Default for HulyConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            requests_per_second: default_rate_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VibeConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,
}

impl Default for VibeConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            requests_per_second: default_rate_limit(),
        }
    }
}

fn default_rate_limit() -> u32 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeadsConfig {
    /// Repository paths containing `issues.jsonl`, one per project.
    #[serde(default)]
    pub repo_paths: Vec<String>,
    #[serde(default = "default_beads_cli")]
    pub cli_path: String,
    #[serde(default = "default_subprocess_concurrency")]
    pub max_concurrent_cli: u32,
}

impl Default for BeadsConfig {
    fn default() -> Self {
        Self {
            repo_paths: Vec::new(),
            cli_path: default_beads_cli(),
            max_concurrent_cli: default_subprocess_concurrency(),
        }
    }
}

fn default_beads_cli() -> String {
    "bd".into()
}

fn default_subprocess_concurrency() -> u32 {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_api_delay_ms")]
    pub api_delay_ms: u64,
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,
    #[serde(default)]
    pub skip_empty_projects: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub parallel_sync: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            api_delay_ms: default_api_delay_ms(),
            max_workers: default_max_workers(),
            skip_empty_projects: false,
            dry_run: false,
            parallel_sync: false,
        }
    }
}

fn default_interval_ms() -> u64 {
    60_000
}
fn default_api_delay_ms() -> u64 {
    10
}
fn default_max_workers() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfigSection {
    #[serde(default = "default_cb_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cb_cooldown_ms")]
    pub cooldown_ms: u64,
}

impl Default for CircuitBreakerConfigSection {
    fn default() -> Self {
        Self {
            failure_threshold: default_cb_threshold(),
            cooldown_ms: default_cb_cooldown_ms(),
        }
    }
}

fn default_cb_threshold() -> u32 {
    3
}
fn default_cb_cooldown_ms() -> u64 {
    5 * 60 * 1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> String {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("concord")
        .join("mappings.sqlite3")
        .to_string_lossy()
        .into_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_bridge_host")]
    pub host: String,
    #[serde(default = "default_bridge_port")]
    pub port: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: default_bridge_host(),
            port: default_bridge_port(),
        }
    }
}

fn default_bridge_host() -> String {
    "127.0.0.1".into()
}
fn default_bridge_port() -> u16 {
    8787
}

/// External sinks (C9) are peripheral collaborators: left unconfigured,
/// `concord-sinks` falls back to `NoopSink` rather than failing startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinksConfig {
    #[serde(default)]
    pub letta_base_url: Option<String>,
    #[serde(default)]
    pub letta_token: Option<String>,
    #[serde(default)]
    pub graph_base_url: Option<String>,
    #[serde(default)]
    pub graph_token: Option<String>,
}

impl Default for SinksConfig {
    fn default() -> Self {
        Self {
            letta_base_url: None,
            letta_token: None,
            graph_base_url: None,
            graph_token: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_sync_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.sync.interval_ms, 60_000);
        assert_eq!(cfg.sync.api_delay_ms, 10);
        assert_eq!(cfg.sync.max_workers, 5);
        assert!(!cfg.sync.dry_run);
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = Config::default();
        let text = cfg.to_toml().expect("serialize");
        let parsed: Config = toml::from_str(&text).expect("parse");
        assert_eq!(parsed.sync.interval_ms, cfg.sync.interval_ms);
        assert_eq!(parsed.beads.cli_path, cfg.beads.cli_path);
    }

    #[test]
    fn default_log_format_is_human() {
        assert_eq!(Config::default().general.log_format, "human");
    }

    #[test]
    fn circuit_breaker_defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.circuit_breaker.failure_threshold, 3);
        assert_eq!(cfg.circuit_breaker.cooldown_ms, 300_000);
    }
}
