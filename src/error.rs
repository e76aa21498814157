//! Error types for policyd
//!
//! Parse problems in scan filters and advertising data are tolerated and never
//! show up here. Only failures of the external collaborators (the discovery
//! engine, the EC, sysfs) and configuration problems are represented.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::typec::TypeCMode;

/// Failure reported by the underlying discovery engine
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The engine refused to start discovery
    #[error("failed to start discovery: {0}")]
    StartFailed(String),

    /// The engine refused to stop discovery
    #[error("failed to stop discovery: {0}")]
    StopFailed(String),
}

/// Error returned by scan client operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// A discovery engine command failed while changing scan state
    #[error("scan state update failed: {0}")]
    Discovery(#[from] DiscoveryError),
}

/// Failure of an EC command
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EcError {
    /// Mode entry was rejected
    #[error("failed to enter {mode} mode on port {port}")]
    EnterModeFailed { port: u32, mode: TypeCMode },

    /// Mode exit was rejected
    #[error("failed to exit mode on port {port}")]
    ExitModeFailed { port: u32 },

    /// The EC could not be reached at all
    #[error("EC command failed: {0}")]
    CommandFailed(String),
}

/// Errors raised while tracking Type-C ports
#[derive(Debug, Error)]
pub enum TypecError {
    /// A sysfs attribute could not be read
    #[error("failed to read {path}: {source}")]
    Sysfs {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A sysfs attribute held something we could not parse
    #[error("invalid value {value:?} in {path}")]
    InvalidAttribute { path: PathBuf, value: String },

    /// A sysfs path did not name a Type-C device we know about
    #[error("unrecognized Type-C device path: {0}")]
    UnknownDevice(PathBuf),

    /// EC command failure
    #[error(transparent)]
    Ec(#[from] EcError),
}

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Scan manager error
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    /// Type-C error
    #[error("Type-C error: {0}")]
    Typec(#[from] TypecError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Event script could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

impl From<String> for AppError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

/// Where a log line or error came from
///
/// Displays as a `[Component::operation] ` prefix so it can be glued in
/// front of a log message.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Component name (e.g. "ScanManager")
    pub component: String,
    /// Operation being performed
    pub operation: String,
    /// Extra key/value pairs shown after the prefix
    pub metadata: HashMap<String, String>,
}

impl ErrorContext {
    /// Create a new context
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            component: component.to_string(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
        }
    }

    /// Attach a key/value pair
    pub fn with_metadata(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}::{}] ", self.component, self.operation)?;
        if !self.metadata.is_empty() {
            let mut pairs: Vec<_> = self
                .metadata
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            pairs.sort();
            write!(f, "({}) ", pairs.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_display() {
        let ctx = ErrorContext::new("ScanManager", "update_scan");
        assert_eq!(ctx.to_string(), "[ScanManager::update_scan] ");

        let ctx = ctx.with_metadata("port", 1).with_metadata("mode", "DP");
        assert_eq!(
            ctx.to_string(),
            "[ScanManager::update_scan] (mode=DP, port=1) "
        );
    }

    #[test]
    fn test_scan_error_from_discovery_error() {
        let err: ScanError = DiscoveryError::StopFailed("busy".to_string()).into();
        assert_eq!(
            err.to_string(),
            "scan state update failed: failed to stop discovery: busy"
        );
    }

    #[test]
    fn test_ec_error_message() {
        let err = EcError::EnterModeFailed {
            port: 2,
            mode: TypeCMode::Tbt,
        };
        assert_eq!(err.to_string(), "failed to enter TBT mode on port 2");
    }

    #[test]
    fn test_app_error_from_str() {
        let err: AppError = "boom".into();
        assert!(matches!(err, AppError::Other(ref msg) if msg == "boom"));
    }
}
