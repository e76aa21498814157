//! Mock implementations of the policyd collaborators
//!
//! Lets the managers run without a controller or an EC.

use std::sync::{Arc, Mutex};

use mockall::mock;
use tokio::sync::mpsc::UnboundedSender;

use policyd::bluetooth::{AdvertisingReport, DeviceHandler, DeviceInfo, DiscoveryEngine, ScanProfile};
use policyd::error::{DiscoveryError, EcError};
use policyd::typec::{DeviceConnectedType, EcUtil, NotificationManager, TypeCMode};

mock! {
    pub Ec {}

    impl EcUtil for Ec {
        fn mode_entry_supported(&self) -> Result<bool, EcError>;
        fn enter_mode(&mut self, port: u32, mode: TypeCMode) -> Result<(), EcError>;
        fn exit_mode(&mut self, port: u32) -> Result<(), EcError>;
    }
}

mock! {
    pub Notifier {}

    impl NotificationManager for Notifier {
        fn notify_connected(&self, kind: DeviceConnectedType);
    }
}

mock! {
    pub Engine {}

    impl DiscoveryEngine for Engine {
        fn start_discovery(
            &mut self,
            profile: &ScanProfile,
            reports: UnboundedSender<AdvertisingReport>,
        ) -> Result<(), DiscoveryError>;
        fn stop_discovery(&mut self) -> Result<(), DiscoveryError>;
    }
}

/// Engine command as seen by [`SharedEngine`]
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    /// Start with an active (true) or passive (false) profile
    Start(bool),
    Stop,
}

/// Engine whose calls and report sender stay visible to the test
#[derive(Default, Clone)]
pub struct SharedEngine {
    pub calls: Arc<Mutex<Vec<EngineCall>>>,
    pub sender: Arc<Mutex<Option<UnboundedSender<AdvertisingReport>>>>,
}

impl SharedEngine {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Push a report the way a controller would
    pub fn report(&self, report: AdvertisingReport) {
        let sender = self.sender.lock().unwrap();
        sender
            .as_ref()
            .expect("discovery not running")
            .send(report)
            .unwrap();
    }
}

impl DiscoveryEngine for SharedEngine {
    fn start_discovery(
        &mut self,
        profile: &ScanProfile,
        reports: UnboundedSender<AdvertisingReport>,
    ) -> Result<(), DiscoveryError> {
        self.calls.lock().unwrap().push(EngineCall::Start(profile.active));
        *self.sender.lock().unwrap() = Some(reports);
        Ok(())
    }

    fn stop_discovery(&mut self) -> Result<(), DiscoveryError> {
        self.calls.lock().unwrap().push(EngineCall::Stop);
        *self.sender.lock().unwrap() = None;
        Ok(())
    }
}

/// Handler that keeps every device it is given
#[derive(Default, Clone)]
pub struct CollectingHandler {
    pub devices: Arc<Mutex<Vec<DeviceInfo>>>,
}

impl CollectingHandler {
    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.devices.lock().unwrap().clone()
    }
}

impl DeviceHandler for CollectingHandler {
    fn on_device_discovered(&mut self, device: DeviceInfo) {
        self.devices.lock().unwrap().push(device);
    }
}
