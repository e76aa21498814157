use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bluetooth::ScanProfile;

/// Default settle time after an EC mode exit before mode entry is retried.
///
/// tVDMWaitModeExit (50ms) for each of SOP, SOP' and SOP'' plus a typical
/// ectool round trip, doubled for scheduler slack.
const DEFAULT_EXIT_MODE_WAIT_MS: u64 = 300;

/// Upper bound accepted for the exit mode settle time
const MAX_EXIT_MODE_WAIT_MS: u64 = 5_000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read or written
    #[error("IO error on {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    /// The config file is not valid JSON for [`AppConfig`]
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds a value outside its accepted range
    #[error("Invalid value for {0}: {1}")]
    ValidationFailed(String, String),
}

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        write!(f, "{}", s)
    }
}

/// Discovery parameters used by the scan manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Profile used while at least one client requests discovery
    pub active_scan: ScanProfile,
    /// Profile used for background reconnection scanning
    pub passive_scan: ScanProfile,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            active_scan: ScanProfile::active_scan(),
            passive_scan: ScanProfile::passive_scan(),
        }
    }
}

/// Type-C mode entry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypecConfig {
    /// Allow the AP to drive alternate mode entry at all.
    /// The EC still has to report support at startup.
    pub mode_entry_enabled: bool,
    /// Whether the host ports are USB4 capable
    pub usb4_host_supported: bool,
    /// Time to wait after ExitMode before re-running mode entry
    pub exit_mode_wait_ms: u64,
    /// Root of the Type-C class directory
    pub sysfs_root: PathBuf,
}

impl Default for TypecConfig {
    fn default() -> Self {
        Self {
            mode_entry_enabled: true,
            usb4_host_supported: true,
            exit_mode_wait_ms: DEFAULT_EXIT_MODE_WAIT_MS,
            sysfs_root: PathBuf::from("/sys/class/typec"),
        }
    }
}

impl TypecConfig {
    /// Settle delay as a [`Duration`]
    pub fn exit_mode_wait(&self) -> Duration {
        Duration::from_millis(self.exit_mode_wait_ms)
    }
}

/// Process-level settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Log verbosity
    pub log_level: LogLevel,
    /// Optional log file, appended to
    pub log_file: Option<PathBuf>,
    /// Mirror log output to stderr
    pub console_log: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_file: None,
            console_log: true,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub bluetooth: BluetoothConfig,
    pub typec: TypecConfig,
    pub system: SystemConfig,
}

impl AppConfig {
    /// Load configuration from `path`.
    ///
    /// A missing file yields the defaults; a present but broken file is an error.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!(
                "No configuration at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: AppConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to `path`, creating parent directories
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::Io(parent.to_path_buf(), e))?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| ConfigError::Io(path.to_path_buf(), e))
    }

    /// Check every field against its accepted range
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bluetooth
            .active_scan
            .validate()
            .map_err(|reason| {
                ConfigError::ValidationFailed("bluetooth.active_scan".to_string(), reason)
            })?;
        self.bluetooth
            .passive_scan
            .validate()
            .map_err(|reason| {
                ConfigError::ValidationFailed("bluetooth.passive_scan".to_string(), reason)
            })?;

        if self.typec.exit_mode_wait_ms > MAX_EXIT_MODE_WAIT_MS {
            return Err(ConfigError::ValidationFailed(
                "typec.exit_mode_wait_ms".to_string(),
                format!(
                    "{} exceeds the maximum of {} ms",
                    self.typec.exit_mode_wait_ms, MAX_EXIT_MODE_WAIT_MS
                ),
            ));
        }

        Ok(())
    }
}

/// Get the default settings path
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .map(|config_dir| config_dir.join("policyd").join("config.json"))
        .unwrap_or_else(|| PathBuf::from("policyd.json"))
}
