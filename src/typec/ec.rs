//! Embedded controller boundary
//!
//! Mode entry itself is carried out by the EC; the port manager only decides
//! what to ask for.

use std::path::PathBuf;
use std::process::Command;

use log::{debug, error};

use crate::error::{EcError, ErrorContext};
use crate::typec::{DeviceConnectedType, TypeCMode};

/// EC feature bit: the AP drives alternate mode entry
pub const EC_FEATURE_TYPEC_AP_MODE_ENTRY: u32 = 42;

/// `typeccontrol` sub-commands
const TYPEC_CONTROL_EXIT_MODES: u32 = 0;
const TYPEC_CONTROL_ENTER_MODE: u32 = 2;

/// Commands the port manager issues to the EC
pub trait EcUtil: Send {
    /// Whether the EC lets the AP drive mode entry
    fn mode_entry_supported(&self) -> Result<bool, EcError>;

    fn enter_mode(&mut self, port: u32, mode: TypeCMode) -> Result<(), EcError>;

    /// Exit whatever mode the port is in
    fn exit_mode(&mut self, port: u32) -> Result<(), EcError>;
}

/// Receives device connection notifications for the user
pub trait NotificationManager: Send {
    fn notify_connected(&self, connected_type: DeviceConnectedType);
}

/// [`EcUtil`] backed by the `ectool` binary
#[derive(Debug, Clone)]
pub struct EctoolEcUtil {
    ectool: PathBuf,
}

impl Default for EctoolEcUtil {
    fn default() -> Self {
        Self::new()
    }
}

impl EctoolEcUtil {
    /// Use `ectool` from `PATH`
    pub fn new() -> Self {
        Self {
            ectool: PathBuf::from("ectool"),
        }
    }

    /// Use a specific `ectool` binary
    pub fn with_path(ectool: impl Into<PathBuf>) -> Self {
        Self {
            ectool: ectool.into(),
        }
    }

    fn run(&self, args: &[String]) -> Result<String, EcError> {
        let ctx = ErrorContext::new("EctoolEcUtil", "run").with_metadata("args", args.join(" "));
        debug!("{}Running {}", ctx, self.ectool.display());

        let output = Command::new(&self.ectool)
            .args(args)
            .output()
            .map_err(|e| EcError::CommandFailed(format!("{}: {}", self.ectool.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("{}ectool exited with {}: {}", ctx, output.status, stderr.trim());
            return Err(EcError::CommandFailed(format!(
                "ectool {} exited with {}",
                args.join(" "),
                output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Look for `feature` in `ectool inventory` output.
///
/// Feature lines look like `42  : AP directed mode entry`.
pub fn inventory_has_feature(inventory: &str, feature: u32) -> bool {
    inventory.lines().any(|line| {
        line.split(':')
            .next()
            .and_then(|num| num.trim().parse::<u32>().ok())
            == Some(feature)
    })
}

impl EcUtil for EctoolEcUtil {
    fn mode_entry_supported(&self) -> Result<bool, EcError> {
        let inventory = self.run(&["inventory".to_string()])?;
        Ok(inventory_has_feature(
            &inventory,
            EC_FEATURE_TYPEC_AP_MODE_ENTRY,
        ))
    }

    fn enter_mode(&mut self, port: u32, mode: TypeCMode) -> Result<(), EcError> {
        let index = mode
            .ec_index()
            .ok_or(EcError::EnterModeFailed { port, mode })?;

        self.run(&[
            "typeccontrol".to_string(),
            port.to_string(),
            TYPEC_CONTROL_ENTER_MODE.to_string(),
            index.to_string(),
        ])
        .map_err(|e| {
            error!("Enter {} on port {}: {}", mode, port, e);
            EcError::EnterModeFailed { port, mode }
        })?;
        Ok(())
    }

    fn exit_mode(&mut self, port: u32) -> Result<(), EcError> {
        self.run(&[
            "typeccontrol".to_string(),
            port.to_string(),
            TYPEC_CONTROL_EXIT_MODES.to_string(),
        ])
        .map_err(|e| {
            error!("Exit mode on port {}: {}", port, e);
            EcError::ExitModeFailed { port }
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_feature_lookup() {
        let inventory = "EC supported features:\n\
                         \x20 0  : Limited image, load RW at boot\n\
                         \x20 41 : Type-C Power Delivery Multiple PD ports\n\
                         \x20 42 : AP directed mode entry\n";

        assert!(inventory_has_feature(inventory, 42));
        assert!(inventory_has_feature(inventory, 0));
        assert!(!inventory_has_feature(inventory, 4));
    }

    #[test]
    fn test_missing_ectool_is_command_failure() {
        let ec = EctoolEcUtil::with_path("/nonexistent/ectool");
        assert!(matches!(
            ec.mode_entry_supported(),
            Err(EcError::CommandFailed(_))
        ));
    }

    #[test]
    fn test_enter_none_is_rejected() {
        let mut ec = EctoolEcUtil::with_path("/nonexistent/ectool");
        assert_eq!(
            ec.enter_mode(1, TypeCMode::None),
            Err(EcError::EnterModeFailed {
                port: 1,
                mode: TypeCMode::None
            })
        );
    }
}
