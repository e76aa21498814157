//! Boundaries between the scan manager and the rest of the stack

use btleplug::api::BDAddr;
use tokio::sync::mpsc::UnboundedSender;

use crate::bluetooth::{AdvertisingReport, DeviceInfo, ScanProfile};
use crate::error::DiscoveryError;

/// Controller-side discovery.
///
/// Only one discovery configuration can run at a time. Reports for the
/// running configuration are pushed into the sender given at start.
pub trait DiscoveryEngine: Send {
    /// Start discovery with `profile`
    fn start_discovery(
        &mut self,
        profile: &ScanProfile,
        reports: UnboundedSender<AdvertisingReport>,
    ) -> Result<(), DiscoveryError>;

    /// Stop the running discovery
    fn stop_discovery(&mut self) -> Result<(), DiscoveryError>;
}

/// Receives devices that passed the merged scan filter
pub trait DeviceHandler: Send {
    fn on_device_discovered(&mut self, device: DeviceInfo);
}

/// Pairing and GATT connection events for known devices
pub trait DeviceObserver {
    fn on_device_paired(&mut self, address: BDAddr);
    fn on_device_unpaired(&mut self, address: BDAddr);
    fn on_gatt_connected(&mut self, address: BDAddr);
    /// `by_manager` is set when the local stack dropped the link on purpose
    fn on_gatt_disconnected(&mut self, address: BDAddr, by_manager: bool);
}
