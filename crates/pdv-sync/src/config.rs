//! # Sync Configuration
//!
//! Configuration management for the terminal's sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     PDV_TENANT_ID=empresa-01                                           │
//! │     PDV_REMOTE_URL=https://retaguarda.example.com                      │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/pdv/sync.toml (Linux)                                    │
//! │     ~/Library/Application Support/br.pdv.pdv/sync.toml (macOS)         │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     offline terminal, 5 minute interval, store in the data dir         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [terminal]
//! id = "pdv-01"
//! name = "Caixa 1"
//!
//! [tenant]
//! id = "empresa-01"
//!
//! [remote]
//! url = "https://retaguarda.example.com"
//! api_key = "<anon key>"
//!
//! [sync]
//! interval_secs = 300
//!
//! [sync.remote_tables]
//! payment_methods = "formas_pagamento"
//!
//! [store]
//! path = "/var/lib/pdv/pdv.db"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use pdv_db::DbConfig;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Terminal Configuration
// =============================================================================

/// Identity of this terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Terminal identifier written on every cash movement.
    #[serde(default = "default_terminal_id")]
    pub id: String,

    /// Human-readable name ("Caixa 1").
    #[serde(default = "default_terminal_name")]
    pub name: String,
}

fn default_terminal_id() -> String {
    "pdv-01".to_string()
}

fn default_terminal_name() -> String {
    "Caixa 1".to_string()
}

impl Default for TerminalConfig {
    fn default() -> Self {
        TerminalConfig {
            id: default_terminal_id(),
            name: default_terminal_name(),
        }
    }
}

// =============================================================================
// Tenant Configuration
// =============================================================================

/// The tenant (empresa) this terminal sells for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Backend id of the tenant. Every pull and push is scoped to it.
    #[serde(default)]
    pub id: String,
}

// =============================================================================
// Remote Settings
// =============================================================================

/// Backend (retaguarda) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL of the backend. `None` keeps the terminal offline.
    #[serde(default)]
    pub url: Option<String>,

    /// Public API key, sent as `apikey`.
    #[serde(default)]
    pub api_key: String,

    /// User access token. When empty the API key is also the bearer.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,

    /// Initial backoff (milliseconds) between retried reads.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Give up retrying a read after this long (seconds).
    #[serde(default = "default_max_elapsed")]
    pub max_retry_secs: u64,
}

fn default_request_timeout() -> u64 {
    15
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_elapsed() -> u64 {
    30
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            url: None,
            api_key: String::new(),
            access_token: None,
            timeout_secs: default_request_timeout(),
            initial_backoff_ms: default_initial_backoff(),
            max_retry_secs: default_max_elapsed(),
        }
    }
}

impl RemoteSettings {
    /// The credential sent as bearer token.
    pub fn bearer(&self) -> &str {
        match self.access_token.as_deref() {
            Some(token) if !token.is_empty() => token,
            _ => &self.api_key,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Run the periodic scheduler. `--once` ignores this.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between scheduled runs (seconds).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Push cash movements in the background after each cash operation.
    #[serde(default = "default_true")]
    pub push_on_cash_change: bool,

    /// Known remote table names per entity, skipping discovery.
    ///
    /// Keys: `payment_methods`, `catalog_items`, `customers`.
    #[serde(default)]
    pub remote_tables: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    300
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            enabled: true,
            interval_secs: default_interval(),
            push_on_cash_change: true,
            remote_tables: HashMap::new(),
        }
    }
}

impl SyncSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

// =============================================================================
// Store Settings
// =============================================================================

/// Where the LocalStore lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Store file. Defaults to `pdv.db` in the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            path: None,
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub terminal: TerminalConfig,

    #[serde(default)]
    pub tenant: TenantConfig,

    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub store: StoreSettings,
}

impl SyncConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document without touching the environment.
    pub fn from_toml(contents: &str) -> SyncResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Validates the configuration.
    ///
    /// Credentials are checked by the gateway when it is built, not here.
    pub fn validate(&self) -> SyncResult<()> {
        if self.terminal.id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("terminal.id must not be empty".into()));
        }

        if self.tenant.id.trim().is_empty() {
            return Err(SyncError::InvalidConfig(
                "tenant.id must be set (PDV_TENANT_ID or [tenant] id)".into(),
            ));
        }

        if let Some(ref raw) = self.remote.url {
            let parsed = url::Url::parse(raw)
                .map_err(|e| SyncError::InvalidConfig(format!("remote.url '{}': {}", raw, e)))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(SyncError::InvalidConfig(format!(
                    "remote.url must start with http:// or https://, got: {}",
                    raw
                )));
            }
        }

        if self.sync.interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "sync.interval_secs must be greater than 0".into(),
            ));
        }

        if self.store.max_connections == 0 {
            return Err(SyncError::InvalidConfig(
                "store.max_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("PDV_TERMINAL_ID") {
            debug!(terminal_id = %id, "Overriding terminal ID from environment");
            self.terminal.id = id;
        }

        if let Ok(id) = std::env::var("PDV_TENANT_ID") {
            debug!(tenant_id = %id, "Overriding tenant from environment");
            self.tenant.id = id;
        }

        if let Ok(url) = std::env::var("PDV_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.url = Some(url);
        }

        if let Ok(key) = std::env::var("PDV_REMOTE_API_KEY") {
            self.remote.api_key = key;
        }

        if let Ok(token) = std::env::var("PDV_ACCESS_TOKEN") {
            self.remote.access_token = Some(token);
        }

        if let Ok(interval) = std::env::var("PDV_SYNC_INTERVAL_SECS") {
            match interval.parse::<u64>() {
                Ok(secs) => self.sync.interval_secs = secs,
                Err(_) => warn!(value = %interval, "Ignoring invalid PDV_SYNC_INTERVAL_SECS"),
            }
        }

        if let Ok(path) = std::env::var("PDV_STORE_PATH") {
            self.store.path = Some(PathBuf::from(path));
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("br", "pdv", "pdv")
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn tenant_id(&self) -> &str {
        &self.tenant.id
    }

    pub fn terminal_id(&self) -> &str {
        &self.terminal.id
    }

    /// Returns true if a backend is configured.
    pub fn is_online(&self) -> bool {
        self.remote.url.is_some()
    }

    /// Configured remote table for an entity key, if any.
    pub fn remote_table(&self, entity: &str) -> Option<&str> {
        self.sync.remote_tables.get(entity).map(String::as_str)
    }

    /// Store file path: configured, or `pdv.db` in the data directory.
    pub fn store_path(&self) -> PathBuf {
        self.store.path.clone().unwrap_or_else(|| {
            Self::project_dirs()
                .map(|dirs| dirs.data_dir().join("pdv.db"))
                .unwrap_or_else(|| PathBuf::from("pdv.db"))
        })
    }

    /// LocalStore configuration derived from `[store]`.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.store_path()).max_connections(self.store.max_connections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [terminal]
        id = "pdv-07"

        [tenant]
        id = "empresa-01"

        [remote]
        url = "https://retaguarda.example.com"
        api_key = "anon"

        [sync]
        interval_secs = 60

        [sync.remote_tables]
        payment_methods = "payment_methods"
    "#;

    #[test]
    fn test_parse_sample() {
        let config = SyncConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.terminal_id(), "pdv-07");
        assert_eq!(config.terminal.name, "Caixa 1");
        assert_eq!(config.tenant_id(), "empresa-01");
        assert_eq!(config.sync.interval(), Duration::from_secs(60));
        assert_eq!(config.remote_table("payment_methods"), Some("payment_methods"));
        assert_eq!(config.remote_table("customers"), None);
        assert!(config.is_online());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();
        // Tenant is mandatory
        assert!(config.validate().is_err());

        config.tenant.id = "empresa-01".into();
        assert!(config.validate().is_ok());

        config.remote.url = Some("ftp://retaguarda".into());
        assert!(config.validate().is_err());

        config.remote.url = Some("https://retaguarda.example.com".into());
        config.sync.interval_secs = 0;
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn test_bearer_prefers_access_token() {
        let mut remote = RemoteSettings {
            api_key: "anon".into(),
            ..Default::default()
        };
        assert_eq!(remote.bearer(), "anon");

        remote.access_token = Some(String::new());
        assert_eq!(remote.bearer(), "anon");

        remote.access_token = Some("user-jwt".into());
        assert_eq!(remote.bearer(), "user-jwt");
    }

    #[test]
    fn test_toml_serialization() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[terminal]"));
        assert!(toml_str.contains("[sync]"));
    }
}
