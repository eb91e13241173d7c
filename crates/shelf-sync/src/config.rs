//! # Sync Configuration
//!
//! Configuration for the catalog clients, the rate limiter, the identity
//! store and the reconciliation pass.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Load Order (later overrides earlier)                   │
//! │                                                                         │
//! │  1. Defaults (this file)                                               │
//! │  2. shelf-sync.toml (explicit path or platform config directory)       │
//! │  3. SHELF_* environment variables                                      │
//! │  4. validate()                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [pos]
//! base_url = "https://api.ready2order.com/v1"
//! api_key = "..."
//!
//! [storefront]
//! graphql_url = "https://shop.example/admin/api/2024-10/graphql.json"
//! access_token = "..."
//! page_size = 100
//! read_only = false
//! variant_overflow = "fail"   # fail | skip
//!
//! [rate_limit]
//! window_secs = 60
//! max_requests = 60
//! buffer_secs = 2
//!
//! [database]
//! path = "shelf-sync.db"
//!
//! [reconcile]
//! drift_detection = true
//! ```
//!
//! ## Environment Variables
//! | Variable                      | Overrides                    |
//! |-------------------------------|------------------------------|
//! | `SHELF_POS_BASE_URL`          | `pos.base_url`               |
//! | `SHELF_POS_API_KEY`           | `pos.api_key`                |
//! | `SHELF_STOREFRONT_URL`        | `storefront.graphql_url`     |
//! | `SHELF_STOREFRONT_TOKEN`      | `storefront.access_token`    |
//! | `SHELF_STOREFRONT_READ_ONLY`  | `storefront.read_only`       |
//! | `SHELF_VARIANT_OVERFLOW`      | `storefront.variant_overflow`|
//! | `SHELF_DATABASE_PATH`         | `database.path`              |
//! | `SHELF_DRIFT_DETECTION`       | `reconcile.drift_detection`  |

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};
use crate::rate_limit::RateLimitPolicy;

const CONFIG_FILE_NAME: &str = "shelf-sync.toml";
const DATABASE_FILE_NAME: &str = "shelf-sync.db";

// =============================================================================
// Variant Overflow Policy
// =============================================================================

/// What to do with a storefront product whose variants span several pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantOverflow {
    /// Fail the listing with `SyncError::VariantPageOverflow`.
    #[default]
    Fail,

    /// Keep the product, flag it truncated; the engine reports it unsynced.
    Skip,
}

impl std::fmt::Display for VariantOverflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VariantOverflow::Fail => write!(f, "fail"),
            VariantOverflow::Skip => write!(f, "skip"),
        }
    }
}

impl std::str::FromStr for VariantOverflow {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail" | "error" => Ok(VariantOverflow::Fail),
            "skip" => Ok(VariantOverflow::Skip),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown variant overflow policy: '{}'. Valid options: fail, skip",
                other
            ))),
        }
    }
}

// =============================================================================
// POS Settings
// =============================================================================

/// POS REST API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosSettings {
    /// Base URL of the REST API.
    #[serde(default = "default_pos_base_url")]
    pub base_url: String,

    /// Bearer API key.
    #[serde(default)]
    pub api_key: String,

    /// Per-request timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_pos_base_url() -> String {
    "https://api.ready2order.com/v1".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for PosSettings {
    fn default() -> Self {
        PosSettings {
            base_url: default_pos_base_url(),
            api_key: String::new(),
            timeout_secs: default_timeout(),
        }
    }
}

impl PosSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Storefront Settings
// =============================================================================

/// Storefront GraphQL API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorefrontSettings {
    /// GraphQL endpoint.
    #[serde(default = "default_graphql_url")]
    pub graphql_url: String,

    /// Admin access token, sent as `X-Shopify-Access-Token`.
    #[serde(default)]
    pub access_token: String,

    /// Products per page and variants per product.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Simulate writes instead of sending them.
    #[serde(default)]
    pub read_only: bool,

    #[serde(default)]
    pub variant_overflow: VariantOverflow,

    /// Per-request timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_graphql_url() -> String {
    "https://example.myshopify.com/admin/api/2024-10/graphql.json".to_string()
}

fn default_page_size() -> u32 {
    100
}

impl Default for StorefrontSettings {
    fn default() -> Self {
        StorefrontSettings {
            graphql_url: default_graphql_url(),
            access_token: String::new(),
            page_size: default_page_size(),
            read_only: false,
            variant_overflow: VariantOverflow::default(),
            timeout_secs: default_timeout(),
        }
    }
}

impl StorefrontSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Rate Limit Settings
// =============================================================================

/// Sliding-window quota applied per catalog client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    /// Extra wait added to every computed delay, absorbs clock skew.
    #[serde(default = "default_buffer_secs")]
    pub buffer_secs: u64,
}

fn default_window_secs() -> u64 {
    60
}

fn default_max_requests() -> usize {
    60
}

fn default_buffer_secs() -> u64 {
    2
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        RateLimitSettings {
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
            buffer_secs: default_buffer_secs(),
        }
    }
}

impl RateLimitSettings {
    pub fn policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            window: Duration::from_secs(self.window_secs),
            max_requests: self.max_requests,
            buffer: Duration::from_secs(self.buffer_secs),
        }
    }
}

// =============================================================================
// Database / Reconcile Settings
// =============================================================================

/// Identity store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join(DATABASE_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(DATABASE_FILE_NAME))
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
        }
    }
}

/// Reconciliation pass settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileSettings {
    /// Mark links deleted when their variant disappeared from either catalog.
    #[serde(default = "default_true")]
    pub drift_detection: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        ReconcileSettings {
            drift_detection: true,
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub pos: PosSettings,

    #[serde(default)]
    pub storefront: StorefrontSettings,

    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub reconcile: ReconcileSettings,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path).map_err(|e| {
                    SyncError::ConfigLoadFailed(format!("{}: {}", path.display(), e))
                })?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        validate_http_url("pos.base_url", &self.pos.base_url)?;
        validate_http_url("storefront.graphql_url", &self.storefront.graphql_url)?;

        if self.storefront.page_size == 0 {
            return Err(SyncError::InvalidConfig(
                "storefront.page_size must be greater than 0".into(),
            ));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(SyncError::InvalidConfig(
                "rate_limit.max_requests must be greater than 0".into(),
            ));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "rate_limit.window_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from a variable lookup.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("SHELF_POS_BASE_URL") {
            debug!(url = %url, "Overriding POS base URL from environment");
            self.pos.base_url = url;
        }

        if let Some(key) = lookup("SHELF_POS_API_KEY") {
            self.pos.api_key = key;
        }

        if let Some(url) = lookup("SHELF_STOREFRONT_URL") {
            debug!(url = %url, "Overriding storefront URL from environment");
            self.storefront.graphql_url = url;
        }

        if let Some(token) = lookup("SHELF_STOREFRONT_TOKEN") {
            self.storefront.access_token = token;
        }

        if let Some(value) = lookup("SHELF_STOREFRONT_READ_ONLY") {
            match parse_flag(&value) {
                Some(flag) => self.storefront.read_only = flag,
                None => warn!(value = %value, "Ignoring invalid SHELF_STOREFRONT_READ_ONLY"),
            }
        }

        if let Some(value) = lookup("SHELF_VARIANT_OVERFLOW") {
            match value.parse() {
                Ok(policy) => self.storefront.variant_overflow = policy,
                Err(e) => warn!(error = %e, "Ignoring invalid SHELF_VARIANT_OVERFLOW"),
            }
        }

        if let Some(path) = lookup("SHELF_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(value) = lookup("SHELF_DRIFT_DETECTION") {
            match parse_flag(&value) {
                Some(flag) => self.reconcile.drift_detection = flag,
                None => warn!(value = %value, "Ignoring invalid SHELF_DRIFT_DETECTION"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "shelf", "shelf-sync")
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn validate_http_url(field: &str, value: &str) -> SyncResult<()> {
    let url = Url::parse(value)
        .map_err(|e| SyncError::InvalidUrl(format!("{}: {} ({})", field, value, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(SyncError::InvalidUrl(format!(
            "{} must use http or https, got: {}",
            field, value
        )));
    }
    Ok(())
}
