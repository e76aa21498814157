// Root module exports
pub mod bluetooth;
pub mod config;
pub mod logging;
pub mod typec;

// Module exports for library users
pub mod app;
pub mod error;

// Re-export common items for convenience
pub use bluetooth::{DeviceInfo, Filter, FilterTable, ScanManager, ScanProfile, ScanState};
pub use typec::{PortManager, TypeCMode};

// Re-exports for convenience
pub use app::{Daemon, DaemonEvent};
pub use config::AppConfig;
pub use error::{AppError, ErrorContext};
pub use logging::configure_logging;
