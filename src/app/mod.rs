//! Daemon wiring
//!
//! The daemon owns the scan manager and the port manager and applies
//! [`DaemonEvent`]s to them one at a time, in arrival order.

pub mod dry_run;
mod events;

use std::path::Path;

use log::{debug, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::bluetooth::{
    DeviceHandler, DeviceObserver, DiscoveryEngine, ScanManager, ScanProfiles, ScanState,
};
use crate::config::{AppConfig, Configurable};
use crate::error::{AppError, ErrorContext, Result};
use crate::logging::log_error;
use crate::typec::{
    enumerate_typec_devices, EcUtil, NotificationManager, PortManager, TypecUdevEvent,
};

pub use events::{decode_hex, DaemonEvent};

/// Main daemon struct
pub struct Daemon {
    /// BLE discovery
    scan_manager: ScanManager,
    /// Type-C ports and mode entry
    port_manager: PortManager,
    /// Events applied so far
    events_handled: usize,
}

impl Daemon {
    /// Create a daemon from already built managers
    pub fn new(scan_manager: ScanManager, port_manager: PortManager) -> Self {
        Self {
            scan_manager,
            port_manager,
            events_handled: 0,
        }
    }

    /// Build both managers from `config` and the given backends
    pub fn from_config(
        config: &AppConfig,
        engine: Box<dyn DiscoveryEngine>,
        device_handler: Box<dyn DeviceHandler>,
        ec_util: Box<dyn EcUtil>,
        notify_mgr: Option<Box<dyn NotificationManager>>,
    ) -> Self {
        let profiles = ScanProfiles::new(
            config.bluetooth.active_scan.clone(),
            config.bluetooth.passive_scan.clone(),
        );
        let scan_manager = ScanManager::new(engine, device_handler, profiles);

        let mut port_manager = PortManager::new(ec_util)
            .with_exit_mode_wait(config.typec.exit_mode_wait())
            .with_usb4_host_supported(config.typec.usb4_host_supported);
        if let Some(notify_mgr) = notify_mgr {
            port_manager = port_manager.with_notification_manager(notify_mgr);
        }

        Self::new(scan_manager, port_manager)
    }

    /// Ask the EC about mode entry, then apply `config` on top.
    ///
    /// A config with mode entry disabled wins over the EC.
    pub fn initialize(&mut self, config: &AppConfig) {
        if config.typec.mode_entry_enabled {
            self.port_manager.probe_mode_entry_support();
        }
        self.apply_config(config);
        info!(
            "Daemon initialized, mode entry {}",
            if self.port_manager.mode_entry_supported() {
                "enabled"
            } else {
                "disabled"
            }
        );
    }

    /// Register every Type-C device already present under `root`
    pub fn coldplug(&mut self, root: &Path) -> Result<usize> {
        let events = enumerate_typec_devices(root)?;
        for event in &events {
            self.port_manager.handle_udev_event(event);
        }
        info!("Coldplugged {} Type-C devices from {}", events.len(), root.display());
        Ok(events.len())
    }

    /// Apply one event
    pub async fn dispatch(&mut self, event: DaemonEvent) -> Result<()> {
        let result = self.apply(event).await;
        self.events_handled += 1;

        // Reports queued by the engine while the event was handled
        let drained = self.scan_manager.process_pending_reports();
        if drained > 0 {
            debug!("Processed {} queued advertising reports", drained);
        }
        result
    }

    async fn apply(&mut self, event: DaemonEvent) -> Result<()> {
        match event {
            DaemonEvent::StartScan { client } => self.scan_manager.start_scan(&client)?,
            DaemonEvent::StopScan { client } => self.scan_manager.stop_scan(&client)?,
            DaemonEvent::SetFilter { client, filter } => {
                self.scan_manager.set_filter(&client, &filter)
            }
            DaemonEvent::Suspend => self.scan_manager.update_scan_suspension_state(true)?,
            DaemonEvent::Resume => self.scan_manager.update_scan_suspension_state(false)?,
            DaemonEvent::DevicePaired { address } => self.scan_manager.on_device_paired(address),
            DaemonEvent::DeviceUnpaired { address } => {
                self.scan_manager.on_device_unpaired(address)
            }
            DaemonEvent::GattConnected { address } => self.scan_manager.on_gatt_connected(address),
            DaemonEvent::GattDisconnected {
                address,
                by_manager,
            } => self.scan_manager.on_gatt_disconnected(address, by_manager),
            ref event @ DaemonEvent::Advertisement { .. } => {
                let report = match event.to_report() {
                    Some(report) => report.map_err(AppError::Other)?,
                    None => return Ok(()),
                };
                // No discovery running, so the controller would not have reported it
                if self.scan_manager.scan_state() == ScanState::Idle {
                    debug!("Dropping report from {} while idle", report.address);
                    return Ok(());
                }
                self.scan_manager.on_advertising_report(report);
            }
            DaemonEvent::Udev { action, path } => {
                let event = TypecUdevEvent::from_device(action, &path)?;
                self.port_manager.handle_udev_event(&event);
            }
            DaemonEvent::ScreenLocked => self.port_manager.on_screen_is_locked(),
            DaemonEvent::ScreenUnlocked => self.port_manager.on_screen_is_unlocked().await,
            DaemonEvent::SessionStarted => self.port_manager.on_session_started().await,
            DaemonEvent::SessionStopped => self.port_manager.on_session_stopped().await,
        }
        Ok(())
    }

    /// Read JSON events line by line and dispatch them until EOF.
    ///
    /// Blank lines and lines starting with `#` are skipped. Lines that fail to
    /// decode or apply are logged and do not stop the run. Returns the number
    /// of events applied successfully.
    pub async fn run<R: AsyncBufRead + Unpin>(&mut self, reader: R) -> Result<usize> {
        let mut lines = reader.lines();
        let mut applied = 0;
        let mut line_no = 0;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let ctx = ErrorContext::new("Daemon", "run").with_metadata("line", line_no);
            let event = match DaemonEvent::from_json(line) {
                Ok(event) => event,
                Err(e) => {
                    warn!("{}Skipping malformed event: {}", ctx, e);
                    continue;
                }
            };

            debug!("{}{:?}", ctx, event);
            match self.dispatch(event).await {
                Ok(()) => applied += 1,
                Err(e) => log_error(&e, &ctx),
            }
        }

        info!("Event stream ended after {} lines, {} applied", line_no, applied);
        Ok(applied)
    }

    pub fn scan_manager(&self) -> &ScanManager {
        &self.scan_manager
    }

    pub fn scan_manager_mut(&mut self) -> &mut ScanManager {
        &mut self.scan_manager
    }

    pub fn port_manager(&self) -> &PortManager {
        &self.port_manager
    }

    pub fn port_manager_mut(&mut self) -> &mut PortManager {
        &mut self.port_manager
    }

    /// Number of events dispatched, failed ones included
    pub fn events_handled(&self) -> usize {
        self.events_handled
    }
}

impl Configurable for Daemon {
    fn apply_config(&mut self, config: &AppConfig) {
        self.scan_manager.apply_config(config);
        self.port_manager.apply_config(config);
    }
}
