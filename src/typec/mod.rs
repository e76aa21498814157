//! USB Type-C alternate mode entry

pub mod alt_mode;
pub mod ec;
mod mode;
pub mod peripheral;
mod port;
mod port_manager;
pub mod sysfs;
pub mod udev;

pub use alt_mode::{AltMode, DP_ALT_MODE_SVID, TBT_ALT_MODE_SVID};

pub use ec::{EcUtil, EctoolEcUtil, NotificationManager};

pub use mode::{DataRole, DeviceConnectedType, TypeCMode};

pub use peripheral::{Cable, CableSpeed, Identity, Partner, ProductType};

pub use port::{Port, PortCapabilities};

pub use port_manager::{select_mode, PortManager, DEFAULT_EXIT_MODE_WAIT};

pub use udev::{enumerate_typec_devices, TypecDeviceKind, TypecUdevEvent, UdevAction};
