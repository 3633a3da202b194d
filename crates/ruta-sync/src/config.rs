//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     RUTA_REMOTE_URL=https://ventas.example.com/api                     │
//! │     RUTA_DEVICE_ID=abc-123                                             │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/ruta-agent/sync.toml (Linux)                             │
//! │     ~/Library/Application Support/com.ruta.agent/sync.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     auto-generated device id, auto-sync on, 5 concurrent downloads     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Tablet Zona Norte"
//! agent_id = "agent-17"
//!
//! [remote]
//! base_url = "https://ventas.example.com/api"
//! request_timeout_secs = 30
//!
//! [sync]
//! auto_sync = true
//! periodic_interval_secs = 300
//!
//! [assets]
//! max_concurrent_downloads = 5
//! batch_pause_ms = 100
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "ruta", "agent")
}

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4).
    /// Auto-generated on first run if not provided.
    #[serde(default = "default_device_id")]
    pub id: String,

    /// Human-readable device name.
    #[serde(default = "default_device_name")]
    pub name: String,

    /// Sales agent signed in on this device. Orders and carts are kept
    /// under this id.
    #[serde(default)]
    pub agent_id: Option<String>,
}

fn default_device_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_device_name() -> String {
    "Ruta Device".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: default_device_id(),
            name: default_device_name(),
            agent_id: None,
        }
    }
}

// =============================================================================
// Remote System Configuration
// =============================================================================

/// Where the system of record lives and how hard to try reaching it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the REST API (`http://` or `https://`).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Retries of a single request on transient failure.
    /// Set to 0 to disable.
    #[serde(default = "default_max_request_retries")]
    pub max_request_retries: u32,

    /// Initial backoff duration (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_request_retries() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    10
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            base_url: default_base_url(),
            api_token: None,
            request_timeout_secs: default_request_timeout(),
            max_request_retries: default_max_request_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `{base_url}/health`, polled by the connectivity probe.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url.trim_end_matches('/'))
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Run an incremental sync on reconnect and periodically.
    #[serde(default = "default_true")]
    pub auto_sync: bool,

    /// Interval between periodic syncs while online (seconds).
    #[serde(default = "default_periodic_interval")]
    pub periodic_interval_secs: u64,

    /// Orders pushed per remote call.
    #[serde(default = "default_outbox_batch_size")]
    pub outbox_batch_size: usize,

    /// Interval between connectivity probes (seconds).
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_periodic_interval() -> u64 {
    300
}

fn default_outbox_batch_size() -> usize {
    100
}

fn default_probe_interval() -> u64 {
    15
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            auto_sync: true,
            periodic_interval_secs: default_periodic_interval(),
            outbox_batch_size: default_outbox_batch_size(),
            probe_interval_secs: default_probe_interval(),
        }
    }
}

impl SyncSettings {
    pub fn periodic_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_interval_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

// =============================================================================
// Asset Settings
// =============================================================================

/// Product image cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSettings {
    /// Directory holding `{product_id}.jpg` files.
    #[serde(default = "default_asset_dir")]
    pub dir: PathBuf,

    /// Downloads running at once.
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,

    /// Pause between download chunks (milliseconds).
    #[serde(default = "default_batch_pause")]
    pub batch_pause_ms: u64,

    /// False where the host cannot keep local files (browser shell).
    /// Images are then always served from the remote URL.
    #[serde(default = "default_true")]
    pub local_files_available: bool,
}

fn default_asset_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.cache_dir().join("images"))
        .unwrap_or_else(|| PathBuf::from("images"))
}

fn default_max_concurrent_downloads() -> usize {
    5
}

fn default_batch_pause() -> u64 {
    100
}

impl Default for AssetSettings {
    fn default() -> Self {
        AssetSettings {
            dir: default_asset_dir(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
            batch_pause_ms: default_batch_pause(),
            local_files_available: true,
        }
    }
}

impl AssetSettings {
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

// =============================================================================
// Store Configuration
// =============================================================================

/// Local store location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl StoreConfig {
    /// Configured path, else `{data_dir}/ruta.db`.
    pub fn resolve_database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            project_dirs()
                .map(|dirs| dirs.data_dir().join("ruta.db"))
                .unwrap_or_else(|| PathBuf::from("ruta.db"))
        })
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
///
/// ## Example Config File
/// ```toml
/// [device]
/// id = "550e8400-e29b-41d4-a716-446655440000"
/// name = "Tablet Zona Norte"
/// agent_id = "agent-17"
///
/// [remote]
/// base_url = "https://ventas.example.com/api"
/// api_token = "..."
/// max_request_retries = 3
///
/// [sync]
/// auto_sync = true
/// periodic_interval_secs = 300
/// outbox_batch_size = 100
///
/// [assets]
/// dir = "/var/lib/ruta/images"
/// local_files_available = true
///
/// [store]
/// database_path = "/var/lib/ruta/ruta.db"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Device-specific configuration.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Remote system settings.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Sync behavior settings.
    #[serde(default)]
    pub sync: SyncSettings,

    /// Image cache settings.
    #[serde(default)]
    pub assets: AssetSettings,

    /// Local store settings.
    #[serde(default)]
    pub store: StoreConfig,
}

impl SyncConfig {
    /// Creates a new config with defaults and a generated device ID.
    pub fn new() -> Self {
        Self::default()
    }

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
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(SyncError::MissingDeviceId);
        }

        let url = Url::parse(&self.remote.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "Remote URL must start with http:// or https://, got: {}",
                self.remote.base_url
            )));
        }

        if self.remote.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.sync.outbox_batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "outbox_batch_size must be greater than 0".into(),
            ));
        }

        if self.sync.periodic_interval_secs == 0 || self.sync.probe_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "sync intervals must be greater than 0".into(),
            ));
        }

        if self.assets.max_concurrent_downloads == 0 {
            return Err(SyncError::InvalidConfig(
                "max_concurrent_downloads must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("RUTA_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Ok(agent) = std::env::var("RUTA_AGENT_ID") {
            self.device.agent_id = Some(agent);
        }

        if let Ok(url) = std::env::var("RUTA_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.base_url = url;
        }

        if let Ok(token) = std::env::var("RUTA_API_TOKEN") {
            self.remote.api_token = Some(token);
        }

        if let Ok(auto) = std::env::var("RUTA_AUTO_SYNC") {
            match auto.to_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => self.sync.auto_sync = true,
                "0" | "false" | "off" | "no" => self.sync.auto_sync = false,
                _ => warn!(value = %auto, "Unknown RUTA_AUTO_SYNC value in environment"),
            }
        }

        if let Ok(dir) = std::env::var("RUTA_ASSET_DIR") {
            self.assets.dir = PathBuf::from(dir);
        }

        if let Ok(path) = std::env::var("RUTA_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.store.database_path = Some(PathBuf::from(path));
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the device ID.
    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    /// Returns the signed-in agent, if any.
    pub fn agent_id(&self) -> Option<&str> {
        self.device.agent_id.as_deref()
    }

    /// Returns the remote base URL.
    pub fn base_url(&self) -> &str {
        &self.remote.base_url
    }
}
