//! Settings management

mod app_config;

pub use app_config::{
    default_config_path, AppConfig, BluetoothConfig, ConfigError, LogLevel, SystemConfig,
    TypecConfig,
};

/// Trait for configurable components
pub trait Configurable {
    /// Apply configuration
    fn apply_config(&mut self, config: &AppConfig);
}
