//! BLE discovery controller
//!
//! The scan manager decides whether the controller should be idle, actively
//! scanning for discovery clients, or passively scanning to reconnect paired
//! devices, and drives the discovery engine accordingly. Advertising reports
//! from the engine are parsed, filtered and handed to the device handler.

use std::collections::HashMap;
use std::fmt;

use btleplug::api::BDAddr;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, watch};

use crate::bluetooth::engine::{DeviceHandler, DeviceObserver, DiscoveryEngine};
use crate::bluetooth::filter::{Filter, FilterParams, FilterTable};
use crate::bluetooth::{parse_eir, AdvertisingReport, DeviceInfo, ScanProfiles};
use crate::config::{AppConfig, Configurable};
use crate::error::{ErrorContext, ScanError};

/// What the controller is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    Idle,
    ActiveScan,
    PassiveScan,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanState::Idle => write!(f, "idle"),
            ScanState::ActiveScan => write!(f, "active scan"),
            ScanState::PassiveScan => write!(f, "passive scan"),
        }
    }
}

/// Connection bookkeeping for a paired device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PairedDeviceInfo {
    pub is_connected: bool,
    /// The link was dropped by us rather than by the peer
    pub is_disconnected_by_manager: bool,
}

impl PairedDeviceInfo {
    /// A paired device we lost without meaning to should be scanned for
    fn wants_reconnect(&self) -> bool {
        !self.is_connected && !self.is_disconnected_by_manager
    }
}

/// BLE scan manager
pub struct ScanManager {
    engine: Box<dyn DiscoveryEngine>,
    device_handler: Box<dyn DeviceHandler>,
    profiles: ScanProfiles,
    /// Clients that requested discovery, in request order
    clients: Vec<String>,
    filters: FilterTable,
    scan_state: ScanState,
    number_of_clients: usize,
    needs_background_scan: bool,
    is_in_suspension: bool,
    paired_devices: HashMap<BDAddr, PairedDeviceInfo>,
    /// Published `Discovering` property
    discovering: watch::Sender<bool>,
    report_tx: mpsc::UnboundedSender<AdvertisingReport>,
    report_rx: Option<mpsc::UnboundedReceiver<AdvertisingReport>>,
}

impl ScanManager {
    /// Create an idle scan manager
    pub fn new(
        engine: Box<dyn DiscoveryEngine>,
        device_handler: Box<dyn DeviceHandler>,
        profiles: ScanProfiles,
    ) -> Self {
        let (discovering, _) = watch::channel(false);
        let (report_tx, report_rx) = mpsc::unbounded_channel();

        Self {
            engine,
            device_handler,
            profiles,
            clients: Vec::new(),
            filters: FilterTable::new(),
            scan_state: ScanState::Idle,
            number_of_clients: 0,
            needs_background_scan: false,
            is_in_suspension: false,
            paired_devices: HashMap::new(),
            discovering,
            report_tx,
            report_rx: Some(report_rx),
        }
    }

    /// Store a client's filter, merging it right away if the client is
    /// scanning
    pub fn set_filter(&mut self, client: &str, params: &FilterParams) {
        self.filters.set(client, params);

        if !self.clients.iter().any(|c| c == client) {
            debug!("Client {} is not scanning, filter merge postponed", client);
            return;
        }
        self.filters.merge(&self.clients);
    }

    /// Add a discovery client.
    ///
    /// On failure the client and its filter are removed again.
    pub fn start_scan(&mut self, client: &str) -> Result<(), ScanError> {
        let ctx = ErrorContext::new("ScanManager", "start_scan").with_metadata("client", client);

        self.clients.push(client.to_string());
        self.filters.ensure_default(client);
        self.filters.merge(&self.clients);

        if let Err(e) = self.update_scan() {
            warn!("{}Rolling back client: {}", ctx, e);
            self.clients.pop();
            self.filters.remove(client);
            self.filters.merge(&self.clients);
            return Err(e);
        }
        Ok(())
    }

    /// Remove a discovery client.
    ///
    /// On failure the client is put back but its filter is not restored.
    pub fn stop_scan(&mut self, client: &str) -> Result<(), ScanError> {
        let ctx = ErrorContext::new("ScanManager", "stop_scan").with_metadata("client", client);

        self.clients.retain(|c| c != client);
        self.filters.merge(&self.clients);

        if let Err(e) = self.update_scan() {
            warn!("{}Keeping client: {}", ctx, e);
            self.clients.push(client.to_string());
            self.filters.merge(&self.clients);
            return Err(e);
        }
        self.filters.remove(client);
        Ok(())
    }

    /// Enter or leave system suspension
    pub fn update_scan_suspension_state(&mut self, is_in_suspension: bool) -> Result<(), ScanError> {
        self.is_in_suspension = is_in_suspension;
        self.update_scan()
    }

    fn desired_state(&self) -> ScanState {
        if self.is_in_suspension {
            ScanState::Idle
        } else if self.number_of_clients > 0 {
            ScanState::ActiveScan
        } else if self.needs_background_scan {
            ScanState::PassiveScan
        } else {
            ScanState::Idle
        }
    }

    /// Bring the discovery engine in line with current demand
    pub fn update_scan(&mut self) -> Result<(), ScanError> {
        let ctx = ErrorContext::new("ScanManager", "update_scan");

        self.number_of_clients = self.clients.len();
        let new_state = self.desired_state();

        if new_state == self.scan_state {
            debug!("{}No need to change scan state", ctx);
            return Ok(());
        }

        debug!(
            "{}Scan state change from {} to {}",
            ctx, self.scan_state, new_state
        );

        match new_state {
            ScanState::Idle => {
                self.engine.stop_discovery()?;
                info!("{}Stop scan", ctx);
            }
            ScanState::ActiveScan | ScanState::PassiveScan => {
                // The engine runs one configuration at a time
                if self.scan_state != ScanState::Idle {
                    if let Err(e) = self.engine.stop_discovery() {
                        error!("{}Failed to stop discovery: {}", ctx, e);
                        return Err(e.into());
                    }
                    // Stay idle if the restart below fails
                    self.scan_state = ScanState::Idle;
                    self.discovering.send_replace(false);
                }

                let profile = if new_state == ScanState::ActiveScan {
                    &self.profiles.active
                } else {
                    &self.profiles.passive
                };
                if let Err(e) = self
                    .engine
                    .start_discovery(profile, self.report_tx.clone())
                {
                    error!("{}Failed to start discovery: {}", ctx, e);
                    return Err(e.into());
                }
                info!("{}Start {}", ctx, new_state);
            }
        }

        self.scan_state = new_state;
        self.discovering.send_replace(self.scan_state != ScanState::Idle);
        Ok(())
    }

    fn update_background_scan(&mut self) {
        self.needs_background_scan = self
            .paired_devices
            .values()
            .any(PairedDeviceInfo::wants_reconnect);
        debug!(
            "Background scan needed: {}",
            if self.needs_background_scan { "yes" } else { "no" }
        );

        if let Err(e) = self.update_scan() {
            error!(
                "{}{}",
                ErrorContext::new("ScanManager", "update_background_scan"),
                e
            );
        }
    }

    /// Handle one advertisement from the discovery engine
    pub fn on_advertising_report(&mut self, report: AdvertisingReport) {
        let mut device = DeviceInfo::from_report(&report, self.number_of_clients > 0);
        parse_eir(&mut device, &report.eir);

        if self.filters.is_match(&device) {
            self.device_handler.on_device_discovered(device);
        } else {
            debug!("Device {} filtered out", report.address);
        }
    }

    /// Process reports queued by the engine; returns how many were handled.
    ///
    /// Does nothing once the receiver has been taken.
    pub fn process_pending_reports(&mut self) -> usize {
        let mut reports = Vec::new();
        if let Some(rx) = self.report_rx.as_mut() {
            while let Ok(report) = rx.try_recv() {
                reports.push(report);
            }
        }

        let count = reports.len();
        for report in reports {
            self.on_advertising_report(report);
        }
        count
    }

    /// Take the receiving end of the advertising report channel
    pub fn take_report_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<AdvertisingReport>> {
        self.report_rx.take()
    }

    pub fn scan_state(&self) -> ScanState {
        self.scan_state
    }

    /// Current value of the `Discovering` property
    pub fn is_discovering(&self) -> bool {
        *self.discovering.borrow()
    }

    /// Watch the `Discovering` property
    pub fn subscribe_discovering(&self) -> watch::Receiver<bool> {
        self.discovering.subscribe()
    }

    pub fn merged_filter(&self) -> &Filter {
        self.filters.merged()
    }

    pub fn is_filtered_scan(&self) -> bool {
        self.filters.is_filtered_scan()
    }

    pub fn filter(&self, client: &str) -> Option<&Filter> {
        self.filters.get(client)
    }

    pub fn needs_background_scan(&self) -> bool {
        self.needs_background_scan
    }

    pub fn is_in_suspension(&self) -> bool {
        self.is_in_suspension
    }

    /// Scanning clients in request order
    pub fn clients(&self) -> &[String] {
        &self.clients
    }

    pub fn paired_device(&self, address: &BDAddr) -> Option<&PairedDeviceInfo> {
        self.paired_devices.get(address)
    }
}

impl DeviceObserver for ScanManager {
    fn on_device_paired(&mut self, address: BDAddr) {
        debug!("Device paired: {}", address);
        self.paired_devices.entry(address).or_default();
        self.update_background_scan();
    }

    fn on_device_unpaired(&mut self, address: BDAddr) {
        debug!("Device unpaired: {}", address);
        self.paired_devices.remove(&address);
        self.update_background_scan();
    }

    fn on_gatt_connected(&mut self, address: BDAddr) {
        match self.paired_devices.get_mut(&address) {
            Some(device) => device.is_connected = true,
            None => debug!("GATT connected to unpaired device {}", address),
        }
        self.update_background_scan();
    }

    fn on_gatt_disconnected(&mut self, address: BDAddr, by_manager: bool) {
        match self.paired_devices.get_mut(&address) {
            Some(device) => {
                device.is_connected = false;
                device.is_disconnected_by_manager = by_manager;
            }
            None => debug!("GATT disconnected from unpaired device {}", address),
        }
        self.update_background_scan();
    }
}

impl Configurable for ScanManager {
    /// New profiles take effect on the next scan state change
    fn apply_config(&mut self, config: &AppConfig) {
        self.profiles = ScanProfiles::new(
            config.bluetooth.active_scan.clone(),
            config.bluetooth.passive_scan.clone(),
        );
    }
}
