//! BLE discovery management and advertisement parsing

mod device;
pub mod eir;
pub mod engine;
pub mod filter;
mod scan_manager;
mod scan_profile;

pub use device::{parse_bdaddr, AddressType, AdvertisingReport, DeviceInfo, ReplyType};

pub use eir::{appearance_to_icon, parse_eir, EirType, NAME_SUFFIX};

pub use engine::{DeviceHandler, DeviceObserver, DiscoveryEngine};

pub use filter::{Filter, FilterParams, FilterTable};

pub use scan_manager::{PairedDeviceInfo, ScanManager, ScanState};

pub use scan_profile::{ScanProfile, ScanProfiles};

pub(crate) use device::bdaddr_serde;
