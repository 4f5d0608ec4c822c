//! TOML-based configuration persistence for the host application.
//!
//! Reads and writes [`AppConfig`] to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\BuzzerHost\config.toml`
//! - Linux:    `~/.config/buzzer-host/config.toml`
//! - macOS:    `~/Library/Application Support/BuzzerHost/config.toml`
//!
//! # What is TOML? (for beginners)
//!
//! TOML is a configuration file format designed to be easy to read and write.
//! Example:
//!
//! ```toml
//! [host]
//! log_level = "debug"
//!
//! [usb]
//! vendor_id = 51966
//! poll_interval_ms = 250
//!
//! [ble]
//! enabled = false
//! ```
//!
//! # Serde default values
//!
//! Every field is annotated with `#[serde(default = "some_fn")]`, so a missing
//! file, a missing section or a missing key all fall back to the built-in
//! value.  An empty file is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use buzzer_core::protocol::endpoints::{gatt, DEFAULT_VENDOR_ID};
use buzzer_core::protocol::EXPECTED_DEVICE_VERSION;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::application::lifecycle::LifecycleOptions;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level application configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub usb: UsbConfig,
    #[serde(default)]
    pub ble: BleConfig,
}

/// Settings shared by both transports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    /// `tracing` log level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Firmware protocol version the host speaks.
    #[serde(default = "default_expected_version")]
    pub expected_device_version: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsbConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,
    /// Optional product id filter; any product of the vendor when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<u16>,
    #[serde(default = "default_usb_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Wait between the failed first open and the single retry.
    #[serde(default = "default_open_retry_backoff_ms")]
    pub open_retry_backoff_ms: u64,
    #[serde(default = "default_control_timeout_ms")]
    pub control_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_service_uuid")]
    pub service_uuid: Uuid,
    /// Peer-table polling interval when notifications are unavailable.
    #[serde(default = "default_ble_poll_interval_ms")]
    pub fallback_poll_interval_ms: u64,
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_expected_version() -> u8 {
    EXPECTED_DEVICE_VERSION
}
fn default_true() -> bool {
    true
}
fn default_vendor_id() -> u16 {
    DEFAULT_VENDOR_ID
}
fn default_usb_poll_interval_ms() -> u64 {
    500
}
fn default_open_retry_backoff_ms() -> u64 {
    100
}
fn default_control_timeout_ms() -> u64 {
    1_000
}
fn default_service_uuid() -> Uuid {
    gatt::SERVICE
}
fn default_ble_poll_interval_ms() -> u64 {
    1_000
}
fn default_scan_timeout_ms() -> u64 {
    10_000
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            expected_device_version: default_expected_version(),
        }
    }
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            vendor_id: default_vendor_id(),
            product_id: None,
            poll_interval_ms: default_usb_poll_interval_ms(),
            open_retry_backoff_ms: default_open_retry_backoff_ms(),
            control_timeout_ms: default_control_timeout_ms(),
        }
    }
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            service_uuid: default_service_uuid(),
            fallback_poll_interval_ms: default_ble_poll_interval_ms(),
            scan_timeout_ms: default_scan_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Lifecycle settings derived from `[host]` and `[usb]`.
    pub fn lifecycle_options(&self) -> LifecycleOptions {
        LifecycleOptions {
            expected_version: self.host.expected_device_version,
            open_retry_backoff: Duration::from_millis(self.usb.open_retry_backoff_ms),
        }
    }
}

impl UsbConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }
}

impl BleConfig {
    pub fn fallback_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fallback_poll_interval_ms)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads [`AppConfig`] from the platform config file, returning
/// `AppConfig::default()` if the file does not yet exist.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads [`AppConfig`] from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to the platform config file.
///
/// # Errors
///
/// See [`save_config_to`].
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory, including the application folder.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("BuzzerHost"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("buzzer-host"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("BuzzerHost")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("buzzer_host_test_{}", Uuid::new_v4()))
    }

    #[test]
    fn test_defaults_match_gateway_protocol() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert
        assert_eq!(cfg.host.expected_device_version, 0x13);
        assert_eq!(cfg.usb.vendor_id, 0xCAFE);
        assert_eq!(cfg.usb.poll_interval(), Duration::from_millis(500));
        assert_eq!(cfg.ble.fallback_poll_interval(), Duration::from_millis(1_000));
        assert_eq!(cfg.ble.service_uuid, gatt::SERVICE);
    }

    #[test]
    fn test_empty_toml_is_default_config() {
        let cfg: AppConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_partial_section_overrides_only_given_keys() {
        // Arrange
        let toml_str = r#"
[usb]
product_id = 16385
poll_interval_ms = 250

[ble]
enabled = false
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.usb.product_id, Some(0x4001));
        assert_eq!(cfg.usb.poll_interval_ms, 250);
        assert_eq!(cfg.usb.vendor_id, 0xCAFE);
        assert!(!cfg.ble.enabled);
        assert_eq!(cfg.ble.scan_timeout_ms, 10_000);
    }

    #[test]
    fn test_service_uuid_parses_from_text() {
        let cfg: AppConfig =
            toml::from_str("[ble]\nservice_uuid = \"f7551fb0-05c3-4dff-a944-4980f40779e1\"\n")
                .expect("deserialize");
        assert_eq!(cfg.ble.service_uuid, gatt::PEER_LIST);
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        let result: Result<AppConfig, toml::de::Error> = toml::from_str("[[[ not valid toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_lifecycle_options_follow_config() {
        let mut cfg = AppConfig::default();
        cfg.host.expected_device_version = 0x14;
        cfg.usb.open_retry_backoff_ms = 250;

        let options = cfg.lifecycle_options();

        assert_eq!(options.expected_version, 0x14);
        assert_eq!(options.open_retry_backoff, Duration::from_millis(250));
    }

    #[test]
    fn test_load_config_from_missing_file_returns_default() {
        let path = temp_dir().join("config.toml");
        let cfg = load_config_from(&path).expect("missing file is not an error");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip_via_temp_dir() {
        // Arrange
        let dir = temp_dir();
        let path = dir.join("nested").join("config.toml");
        let mut cfg = AppConfig::default();
        cfg.host.log_level = "debug".to_string();
        cfg.usb.product_id = Some(0x0001);

        // Act
        save_config_to(&cfg, &path).expect("save");
        let loaded = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(loaded, cfg);

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_absent_product_id_is_omitted_from_toml() {
        let toml_str = toml::to_string_pretty(&AppConfig::default()).expect("serialize");
        assert!(!toml_str.contains("product_id"));
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(
                path.ends_with("config.toml"),
                "config file must be named config.toml, got {path:?}"
            );
        }
    }
}
