//! Backends that only log
//!
//! Used when policyd runs without controller or EC access, e.g. when replaying
//! an event script against a copy of a sysfs tree.

use log::info;
use tokio::sync::mpsc::UnboundedSender;

use crate::bluetooth::{AdvertisingReport, DeviceHandler, DeviceInfo, DiscoveryEngine, ScanProfile};
use crate::error::{DiscoveryError, EcError};
use crate::typec::{DeviceConnectedType, EcUtil, NotificationManager, TypeCMode};

/// Discovery engine that accepts every request and never reports anything
#[derive(Debug, Default)]
pub struct LoggingDiscoveryEngine {
    running: Option<ScanProfile>,
}

impl LoggingDiscoveryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Profile of the running discovery
    pub fn running(&self) -> Option<&ScanProfile> {
        self.running.as_ref()
    }
}

impl DiscoveryEngine for LoggingDiscoveryEngine {
    fn start_discovery(
        &mut self,
        profile: &ScanProfile,
        _reports: UnboundedSender<AdvertisingReport>,
    ) -> Result<(), DiscoveryError> {
        if self.running.is_some() {
            return Err(DiscoveryError::StartFailed(
                "discovery already running".to_string(),
            ));
        }
        info!(
            "Start discovery: active={} interval={} window={}",
            profile.active, profile.scan_interval, profile.scan_window
        );
        self.running = Some(profile.clone());
        Ok(())
    }

    fn stop_discovery(&mut self) -> Result<(), DiscoveryError> {
        info!("Stop discovery");
        self.running = None;
        Ok(())
    }
}

/// Prints each discovered device as a JSON line on stdout
#[derive(Debug, Default)]
pub struct LoggingDeviceHandler {
    discovered: usize,
}

impl LoggingDeviceHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceHandler for LoggingDeviceHandler {
    fn on_device_discovered(&mut self, device: DeviceInfo) {
        self.discovered += 1;
        info!(
            "Device found: {} name={:?} rssi={}",
            device.address, device.name, device.rssi
        );
        match serde_json::to_string(&device) {
            Ok(json) => println!("{}", json),
            Err(e) => log::warn!("Failed to serialize device {}: {}", device.address, e),
        }
    }
}

/// EC stand-in that logs the commands it would have sent
#[derive(Debug)]
pub struct DryRunEcUtil {
    mode_entry_supported: bool,
}

impl DryRunEcUtil {
    pub fn new(mode_entry_supported: bool) -> Self {
        Self {
            mode_entry_supported,
        }
    }
}

impl EcUtil for DryRunEcUtil {
    fn mode_entry_supported(&self) -> Result<bool, EcError> {
        Ok(self.mode_entry_supported)
    }

    fn enter_mode(&mut self, port: u32, mode: TypeCMode) -> Result<(), EcError> {
        info!("EC: enter {} on port {}", mode, port);
        Ok(())
    }

    fn exit_mode(&mut self, port: u32) -> Result<(), EcError> {
        info!("EC: exit mode on port {}", port);
        Ok(())
    }
}

/// Logs peripheral connection notifications
#[derive(Debug, Default)]
pub struct LoggingNotifier;

impl NotificationManager for LoggingNotifier {
    fn notify_connected(&self, kind: DeviceConnectedType) {
        info!("Notification: {:?} device connected", kind);
    }
}
