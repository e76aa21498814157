//! Type-C port registry, mode entry sequencing and session policy
//!
//! Mode entry runs whenever a partner, cable or alt mode shows up. Each
//! connection gets at most one mode; session changes can exit that mode and
//! run entry again so that TBT is only used while a user is present.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::config::{AppConfig, Configurable};
use crate::error::{ErrorContext, TypecError};
use crate::typec::ec::{EcUtil, NotificationManager};
use crate::typec::port::{Port, PortCapabilities};
use crate::typec::udev::{TypecDeviceKind, TypecUdevEvent, UdevAction};
use crate::typec::{DataRole, DeviceConnectedType, TypeCMode};

/// Time for the EC to finish ExitMode.
///
/// tVDMWaitModeExit (50ms) for each of SOP, SOP' and SOP'' plus a typical
/// ectool round trip, doubled for scheduler delays.
pub const DEFAULT_EXIT_MODE_WAIT: Duration = Duration::from_millis(300);

/// Pick the mode to enter for a port with `caps`.
///
/// USB4 wins outright. TBT comes next, except that DP is preferred while no
/// user is active and the partner can do DP.
pub fn select_mode(caps: PortCapabilities, user_active: bool) -> Option<TypeCMode> {
    if caps.usb4 {
        Some(TypeCMode::Usb4)
    } else if caps.tbt {
        if !user_active && caps.dp {
            Some(TypeCMode::Dp)
        } else {
            Some(TypeCMode::Tbt)
        }
    } else if caps.dp {
        Some(TypeCMode::Dp)
    } else {
        None
    }
}

/// Tracks Type-C ports and drives mode entry through the EC
pub struct PortManager {
    ports: BTreeMap<u32, Port>,
    ec_util: Box<dyn EcUtil>,
    notify_mgr: Option<Box<dyn NotificationManager>>,
    mode_entry_supported: bool,
    user_active: bool,
    exit_mode_wait: Duration,
    usb4_host_supported: bool,
}

impl PortManager {
    pub fn new(ec_util: Box<dyn EcUtil>) -> Self {
        Self {
            ports: BTreeMap::new(),
            ec_util,
            notify_mgr: None,
            mode_entry_supported: true,
            user_active: false,
            exit_mode_wait: DEFAULT_EXIT_MODE_WAIT,
            usb4_host_supported: true,
        }
    }

    pub fn with_notification_manager(mut self, notify_mgr: Box<dyn NotificationManager>) -> Self {
        self.notify_mgr = Some(notify_mgr);
        self
    }

    pub fn with_exit_mode_wait(mut self, wait: Duration) -> Self {
        self.exit_mode_wait = wait;
        self
    }

    pub fn with_usb4_host_supported(mut self, supported: bool) -> Self {
        self.set_usb4_host_supported(supported);
        self
    }

    fn set_usb4_host_supported(&mut self, supported: bool) {
        self.usb4_host_supported = supported;
        for port in self.ports.values_mut() {
            port.set_usb4_host_supported(supported);
        }
    }

    /// Ask the EC whether the AP may drive mode entry; failures count as no
    pub fn probe_mode_entry_support(&mut self) -> bool {
        let supported = match self.ec_util.mode_entry_supported() {
            Ok(supported) => supported,
            Err(e) => {
                error!("Failed to query mode entry support: {}", e);
                false
            }
        };
        info!("AP mode entry supported: {}", supported);
        self.mode_entry_supported = supported;
        supported
    }

    pub fn set_mode_entry_supported(&mut self, supported: bool) {
        self.mode_entry_supported = supported;
    }

    pub fn mode_entry_supported(&self) -> bool {
        self.mode_entry_supported
    }

    pub fn set_user_active(&mut self, active: bool) {
        self.user_active = active;
    }

    pub fn user_active(&self) -> bool {
        self.user_active
    }

    pub fn port(&self, port_num: u32) -> Option<&Port> {
        self.ports.get(&port_num)
    }

    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.values()
    }

    fn port_mut(&mut self, port_num: u32, what: &str) -> Option<&mut Port> {
        let port = self.ports.get_mut(&port_num);
        if port.is_none() {
            warn!("{} attempted for non-existent port {}", what, port_num);
        }
        port
    }

    /// Log a sysfs failure from a registry update
    fn report(ctx: &ErrorContext, result: Result<(), TypecError>) {
        if let Err(e) = result {
            warn!("{}{}", ctx, e);
        }
    }

    pub fn on_port_added_or_removed(&mut self, path: &Path, port_num: u32, added: bool) {
        if added {
            if self.ports.contains_key(&port_num) {
                warn!("Attempting to add an already added port {}", port_num);
                return;
            }
            let port = Port::new(path, port_num).with_usb4_host_supported(self.usb4_host_supported);
            self.ports.insert(port_num, port);
            info!("Port {} added", port_num);
        } else {
            if self.ports.remove(&port_num).is_none() {
                warn!("Attempting to remove a non-existent port {}", port_num);
                return;
            }
            info!("Port {} removed", port_num);
        }
    }

    pub fn on_partner_added_or_removed(&mut self, path: &Path, port_num: u32, added: bool) {
        let ctx = ErrorContext::new("PortManager", "on_partner_added_or_removed")
            .with_metadata("port", port_num);
        let Some(port) = self.port_mut(port_num, "Partner add/remove") else {
            return;
        };

        if added {
            Self::report(&ctx, port.add_partner(path));
            self.run_mode_entry(port_num);
        } else {
            port.remove_partner();
            port.set_current_mode(TypeCMode::None);
        }
    }

    pub fn on_partner_alt_mode_added_or_removed(&mut self, path: &Path, port_num: u32, added: bool) {
        let ctx = ErrorContext::new("PortManager", "on_partner_alt_mode_added_or_removed")
            .with_metadata("port", port_num);
        let Some(port) = self.port_mut(port_num, "Partner alt mode add/remove") else {
            return;
        };

        Self::report(&ctx, port.add_remove_partner_alt_mode(path, added));
        if added {
            self.run_mode_entry(port_num);
        }
    }

    pub fn on_cable_added_or_removed(&mut self, path: &Path, port_num: u32, added: bool) {
        let ctx = ErrorContext::new("PortManager", "on_cable_added_or_removed")
            .with_metadata("port", port_num);
        let Some(port) = self.port_mut(port_num, "Cable add/remove") else {
            return;
        };

        if added {
            Self::report(&ctx, port.add_cable(path));
        } else {
            port.remove_cable();
        }
    }

    pub fn on_cable_plug_added(&mut self, path: &Path, port_num: u32) {
        let ctx =
            ErrorContext::new("PortManager", "on_cable_plug_added").with_metadata("port", port_num);
        let Some(port) = self.port_mut(port_num, "Cable plug add") else {
            return;
        };

        Self::report(&ctx, port.add_cable_plug(path));
        self.run_mode_entry(port_num);
    }

    pub fn on_cable_alt_mode_added(&mut self, path: &Path, port_num: u32) {
        let ctx = ErrorContext::new("PortManager", "on_cable_alt_mode_added")
            .with_metadata("port", port_num);
        let Some(port) = self.port_mut(port_num, "Cable alt mode add") else {
            return;
        };

        Self::report(&ctx, port.add_cable_alt_mode(path));
        self.run_mode_entry(port_num);
    }

    pub fn on_partner_changed(&mut self, port_num: u32) {
        let ctx =
            ErrorContext::new("PortManager", "on_partner_changed").with_metadata("port", port_num);
        let Some(port) = self.port_mut(port_num, "Partner change") else {
            return;
        };

        Self::report(&ctx, port.partner_changed());
        self.run_mode_entry(port_num);
    }

    /// Route a classified udev event to its handler
    pub fn handle_udev_event(&mut self, event: &TypecUdevEvent) {
        let added = event.action == UdevAction::Add;
        let path = event.path.as_path();

        match (event.kind, event.action) {
            (TypecDeviceKind::Port, UdevAction::Add | UdevAction::Remove) => {
                self.on_port_added_or_removed(path, event.port, added)
            }
            (TypecDeviceKind::Partner, UdevAction::Add | UdevAction::Remove) => {
                self.on_partner_added_or_removed(path, event.port, added)
            }
            (TypecDeviceKind::Partner, UdevAction::Change) => self.on_partner_changed(event.port),
            (TypecDeviceKind::PartnerAltMode, UdevAction::Add | UdevAction::Remove) => {
                self.on_partner_alt_mode_added_or_removed(path, event.port, added)
            }
            (TypecDeviceKind::Cable, UdevAction::Add | UdevAction::Remove) => {
                self.on_cable_added_or_removed(path, event.port, added)
            }
            (TypecDeviceKind::CablePlug, UdevAction::Add) => {
                self.on_cable_plug_added(path, event.port)
            }
            (TypecDeviceKind::CableAltMode, UdevAction::Add) => {
                self.on_cable_alt_mode_added(path, event.port)
            }
            (kind, action) => debug!(
                "Ignoring {:?} {:?} for {}",
                action,
                kind,
                path.display()
            ),
        }
    }

    /// Enter the best mode the port supports, if it is ready for one
    pub fn run_mode_entry(&mut self, port_num: u32) {
        let ctx = ErrorContext::new("PortManager", "run_mode_entry").with_metadata("port", port_num);

        if !self.mode_entry_supported {
            return;
        }

        let Some(port) = self.ports.get_mut(&port_num) else {
            warn!("{}Mode entry attempted for non-existent port", ctx);
            return;
        };

        if port.data_role() != DataRole::Host {
            warn!("{}Can't enter mode; data role is not DFP", ctx);
            return;
        }

        if !port.is_partner_discovery_complete() {
            info!("{}Can't enter mode; partner discovery not complete", ctx);
            return;
        }

        if !port.is_cable_discovery_complete() {
            info!("{}Can't enter mode; cable discovery not complete", ctx);
            return;
        }

        if port.current_mode() != TypeCMode::None {
            info!(
                "{}Mode entry already executed, mode: {}",
                ctx,
                port.current_mode()
            );
            return;
        }

        let caps = port.capabilities();

        if let (Some(notify_mgr), true) = (&self.notify_mgr, caps.tbt) {
            notify_mgr.notify_connected(if caps.dp {
                DeviceConnectedType::ThunderboltDp
            } else {
                DeviceConnectedType::ThunderboltOnly
            });
        }

        let Some(mode) = select_mode(caps, self.user_active) else {
            debug!("{}No supported mode", ctx);
            return;
        };
        if mode == TypeCMode::Dp && caps.tbt {
            info!("{}Not entering TBT compat mode since user not active", ctx);
        }

        match self.ec_util.enter_mode(port_num, mode) {
            Ok(()) => {
                port.set_current_mode(mode);
                info!("{}Entered {} mode", ctx, mode);
            }
            Err(e) => error!("{}Attempt to enter {} failed: {}", ctx, mode, e),
        }
    }

    pub fn on_screen_is_locked(&mut self) {
        self.set_user_active(false);
    }

    pub async fn on_screen_is_unlocked(&mut self) {
        self.handle_unlock().await;
    }

    /// Handled the same way as an unlock
    pub async fn on_session_started(&mut self) {
        self.handle_unlock().await;
    }

    pub async fn on_session_stopped(&mut self) {
        self.handle_session_stopped().await;
    }

    /// User is back: move DP ports that could run TBT over to TBT
    pub async fn handle_unlock(&mut self) {
        if !self.mode_entry_supported {
            return;
        }
        self.set_user_active(true);
        self.switch_modes(TypeCMode::Dp, |caps| caps.tbt).await;
    }

    /// User is gone: move TBT ports that could run DP over to DP
    pub async fn handle_session_stopped(&mut self) {
        if !self.mode_entry_supported {
            return;
        }
        self.set_user_active(false);
        self.switch_modes(TypeCMode::Tbt, |caps| caps.dp).await;
    }

    /// Exit `from` on every port where `eligible` holds, wait for the EC to
    /// settle, then run mode entry again. Ports are handled one at a time.
    async fn switch_modes(&mut self, from: TypeCMode, eligible: fn(PortCapabilities) -> bool) {
        let port_nums: Vec<u32> = self.ports.keys().copied().collect();

        for port_num in port_nums {
            let ctx = ErrorContext::new("PortManager", "switch_modes").with_metadata("port", port_num);
            let Some(port) = self.ports.get_mut(&port_num) else {
                continue;
            };
            if port.current_mode() != from || !eligible(port.capabilities()) {
                continue;
            }

            if let Err(e) = self.ec_util.exit_mode(port_num) {
                error!("{}Attempt to call ExitMode failed: {}", ctx, e);
                continue;
            }
            port.set_current_mode(TypeCMode::None);
            info!("{}Exited {} mode", ctx, from);

            tokio::time::sleep(self.exit_mode_wait).await;

            self.run_mode_entry(port_num);
        }
    }
}

impl Configurable for PortManager {
    fn apply_config(&mut self, config: &AppConfig) {
        self.exit_mode_wait = config.typec.exit_mode_wait();
        self.set_usb4_host_supported(config.typec.usb4_host_supported);
        if !config.typec.mode_entry_enabled {
            self.mode_entry_supported = false;
        }
    }
}
