//! A physical Type-C port and whatever is plugged into it

use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::TypecError;
use crate::typec::peripheral::{Cable, CableSpeed, Partner};
use crate::typec::{sysfs, DataRole, TypeCMode};

/// Modes a port could enter with its current partner and cable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortCapabilities {
    pub usb4: bool,
    pub tbt: bool,
    pub dp: bool,
}

/// One `portN` entry of the Type-C class
#[derive(Debug)]
pub struct Port {
    path: PathBuf,
    port_num: u32,
    partner: Option<Partner>,
    cable: Option<Cable>,
    current_mode: TypeCMode,
    usb4_host_supported: bool,
}

impl Port {
    pub fn new(path: &Path, port_num: u32) -> Self {
        Self {
            path: path.to_path_buf(),
            port_num,
            partner: None,
            cable: None,
            current_mode: TypeCMode::None,
            usb4_host_supported: true,
        }
    }

    /// Set whether this host port can run USB4
    pub fn with_usb4_host_supported(mut self, supported: bool) -> Self {
        self.usb4_host_supported = supported;
        self
    }

    pub fn set_usb4_host_supported(&mut self, supported: bool) {
        self.usb4_host_supported = supported;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn port_num(&self) -> u32 {
        self.port_num
    }

    pub fn partner(&self) -> Option<&Partner> {
        self.partner.as_ref()
    }

    pub fn cable(&self) -> Option<&Cable> {
        self.cable.as_ref()
    }

    pub fn add_partner(&mut self, path: &Path) -> Result<(), TypecError> {
        if self.partner.is_some() {
            warn!("Partner already registered on port {}", self.port_num);
            return Ok(());
        }
        self.partner = Some(Partner::from_sysfs(path)?);
        info!("Partner added to port {}", self.port_num);
        Ok(())
    }

    /// Drop the partner; whatever mode it was in goes with it
    pub fn remove_partner(&mut self) {
        if self.partner.take().is_none() {
            warn!("No partner to remove on port {}", self.port_num);
        }
        self.current_mode = TypeCMode::None;
        info!("Partner removed from port {}", self.port_num);
    }

    pub fn add_remove_partner_alt_mode(&mut self, path: &Path, added: bool) -> Result<(), TypecError> {
        match self.partner.as_mut() {
            Some(partner) => partner.add_remove_alt_mode(path, added),
            None => {
                warn!("Partner alt mode event without partner on port {}", self.port_num);
                Ok(())
            }
        }
    }

    pub fn partner_changed(&mut self) -> Result<(), TypecError> {
        match self.partner.as_mut() {
            Some(partner) => partner.refresh(),
            None => {
                warn!("Partner change without partner on port {}", self.port_num);
                Ok(())
            }
        }
    }

    pub fn add_cable(&mut self, path: &Path) -> Result<(), TypecError> {
        if self.cable.is_some() {
            warn!("Cable already registered on port {}", self.port_num);
            return Ok(());
        }
        self.cable = Some(Cable::from_sysfs(path)?);
        info!("Cable added to port {}", self.port_num);
        Ok(())
    }

    pub fn remove_cable(&mut self) {
        if self.cable.take().is_none() {
            warn!("No cable to remove on port {}", self.port_num);
            return;
        }
        info!("Cable removed from port {}", self.port_num);
    }

    pub fn add_cable_plug(&mut self, path: &Path) -> Result<(), TypecError> {
        match self.cable.as_mut() {
            Some(cable) => cable.add_plug(path),
            None => {
                warn!("Cable plug without cable on port {}", self.port_num);
                Ok(())
            }
        }
    }

    pub fn add_cable_alt_mode(&mut self, path: &Path) -> Result<(), TypecError> {
        match self.cable.as_mut() {
            Some(cable) => cable.add_alt_mode(path),
            None => {
                warn!("Cable alt mode without cable on port {}", self.port_num);
                Ok(())
            }
        }
    }

    /// Current data role, read from sysfs on every call
    pub fn data_role(&self) -> DataRole {
        let role_path = self.path.join("data_role");
        match sysfs::read_attribute(&role_path) {
            Ok(value) => value.parse().unwrap_or_else(|e| {
                debug!("Port {}: {}", self.port_num, e);
                DataRole::Unknown
            }),
            Err(e) => {
                debug!("Port {}: {}", self.port_num, e);
                DataRole::Unknown
            }
        }
    }

    pub fn is_partner_discovery_complete(&self) -> bool {
        self.partner
            .as_ref()
            .map_or(false, Partner::discovery_complete)
    }

    pub fn is_cable_discovery_complete(&self) -> bool {
        self.cable.as_ref().map_or(false, Cable::discovery_complete)
    }

    pub fn can_enter_dp_alt_mode(&self) -> bool {
        self.partner.as_ref().map_or(false, Partner::supports_dp)
    }

    /// Partner speaks TBT and the cable can carry it: either the cable has
    /// a TBT alt mode itself or it is a passive cable rated Gen1 or better.
    pub fn can_enter_tbt_compatibility_mode(&self) -> bool {
        let (Some(partner), Some(cable)) = (&self.partner, &self.cable) else {
            return false;
        };
        partner.supports_tbt()
            && (cable.supports_tbt()
                || (cable.is_passive() && cable.speed().at_least(CableSpeed::Usb32Gen1)))
    }

    pub fn can_enter_usb4(&self) -> bool {
        if !self.usb4_host_supported {
            return false;
        }
        let (Some(partner), Some(cable)) = (&self.partner, &self.cable) else {
            return false;
        };
        partner.supports_usb4()
            && (cable.supports_tbt() || cable.speed().at_least(CableSpeed::Usb32Gen2))
    }

    pub fn capabilities(&self) -> PortCapabilities {
        PortCapabilities {
            usb4: self.can_enter_usb4(),
            tbt: self.can_enter_tbt_compatibility_mode(),
            dp: self.can_enter_dp_alt_mode(),
        }
    }

    pub fn current_mode(&self) -> TypeCMode {
        self.current_mode
    }

    pub fn set_current_mode(&mut self, mode: TypeCMode) {
        self.current_mode = mode;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// port0 with a DP+TBT partner and a passive Gen2 cable
    fn dock_tree() -> TempDir {
        let root = tempdir().unwrap();
        let r = root.path();
        write(&r.join("port0/data_role"), "[host] device\n");

        write(&r.join("port0-partner/number_of_alternate_modes"), "2");
        write(&r.join("port0-partner/identity/id_header"), "0x10000000");
        write(&r.join("port0-partner/identity/product_type_vdo1"), "0x0");
        write(&r.join("port0-partner/port0-partner.0/svid"), "ff01");
        write(&r.join("port0-partner/port0-partner.0/vdo"), "0x001c0045");
        write(&r.join("port0-partner/port0-partner.1/svid"), "8087");
        write(&r.join("port0-partner/port0-partner.1/vdo"), "0x00000001");

        write(&r.join("port0-cable/identity/id_header"), "0x18000000");
        write(&r.join("port0-cable/identity/product_type_vdo1"), "0x2");
        write(&r.join("port0-plug0/number_of_alternate_modes"), "0");
        root
    }

    fn populated_port(root: &Path) -> Port {
        let mut port = Port::new(&root.join("port0"), 0);
        port.add_partner(&root.join("port0-partner")).unwrap();
        port.add_remove_partner_alt_mode(&root.join("port0-partner/port0-partner.0"), true)
            .unwrap();
        port.add_remove_partner_alt_mode(&root.join("port0-partner/port0-partner.1"), true)
            .unwrap();
        port.add_cable(&root.join("port0-cable")).unwrap();
        port.add_cable_plug(&root.join("port0-plug0")).unwrap();
        port
    }

    #[test]
    fn test_data_role_from_sysfs() {
        let root = dock_tree();
        let port = Port::new(&root.path().join("port0"), 0);
        assert_eq!(port.data_role(), DataRole::Host);

        write(&root.path().join("port0/data_role"), "host [device]\n");
        assert_eq!(port.data_role(), DataRole::Device);

        let missing = Port::new(&root.path().join("port9"), 9);
        assert_eq!(missing.data_role(), DataRole::Unknown);
    }

    #[test]
    fn test_dock_capabilities() {
        let root = dock_tree();
        let port = populated_port(root.path());

        assert!(port.is_partner_discovery_complete());
        assert!(port.is_cable_discovery_complete());
        assert_eq!(
            port.capabilities(),
            PortCapabilities {
                usb4: false,
                tbt: true,
                dp: true,
            }
        );
    }

    #[test]
    fn test_usb4_needs_host_support() {
        let root = dock_tree();
        write(
            &root.path().join("port0-partner/identity/product_type_vdo1"),
            "0x08000000",
        );

        let port = populated_port(root.path());
        assert!(port.can_enter_usb4());

        let port = populated_port(root.path()).with_usb4_host_supported(false);
        assert!(!port.can_enter_usb4());
    }

    #[test]
    fn test_usb2_cable_blocks_tbt() {
        let root = dock_tree();
        write(
            &root.path().join("port0-cable/identity/product_type_vdo1"),
            "0x0",
        );

        let port = populated_port(root.path());
        assert!(!port.can_enter_tbt_compatibility_mode());
        assert!(port.can_enter_dp_alt_mode());
    }

    #[test]
    fn test_remove_partner_resets_mode() {
        let root = dock_tree();
        let mut port = populated_port(root.path());
        port.set_current_mode(TypeCMode::Tbt);

        port.remove_partner();

        assert_eq!(port.current_mode(), TypeCMode::None);
        assert!(port.partner().is_none());
        assert!(!port.is_partner_discovery_complete());
        assert!(!port.can_enter_dp_alt_mode());
    }

    #[test]
    fn test_cable_events_without_cable_are_ignored() {
        let root = dock_tree();
        let mut port = Port::new(&root.path().join("port0"), 0);

        port.add_cable_plug(&root.path().join("port0-plug0")).unwrap();
        port.remove_cable();

        assert!(port.cable().is_none());
        assert!(!port.is_cable_discovery_complete());
    }
}
