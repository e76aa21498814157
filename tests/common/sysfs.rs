//! Fake Type-C class trees
//!
//! Mirrors the kernel layout: ports, partners, cables and plugs at the top,
//! alt modes inside their partner or plug directory.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{tempdir, TempDir};

/// ID header: peripheral product type
pub const ID_HEADER_PERIPHERAL: &str = "0x10000000";
/// ID header: passive cable product type
pub const ID_HEADER_PASSIVE_CABLE: &str = "0x18000000";
/// UFP VDO with the USB4 device capability bit
pub const UFP_VDO_USB4: &str = "0x08000000";
/// Cable VDO rated USB 3.2 Gen2
pub const CABLE_VDO_GEN2: &str = "0x2";
/// Cable VDO rated USB 2.0 only
pub const CABLE_VDO_USB2: &str = "0x0";

pub const DP_SVID: &str = "ff01";
pub const TBT_SVID: &str = "8087";
/// DP mode VDO that can act as a sink
pub const DP_SINK_VDO: &str = "0x001c0045";
pub const TBT_VDO: &str = "0x00000001";

pub struct TypecTree {
    dir: TempDir,
}

impl TypecTree {
    pub fn new() -> Self {
        Self {
            dir: tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.root().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    /// Port in host data role
    pub fn add_port(&self, port: u32) -> PathBuf {
        self.write(&format!("port{}/data_role", port), "[host] device\n");
        self.root().join(format!("port{}", port))
    }

    pub fn set_data_role(&self, port: u32, role: &str) {
        self.write(&format!("port{}/data_role", port), role);
    }

    pub fn add_partner(&self, port: u32, vdo1: &str, alt_modes: u32) -> PathBuf {
        let name = format!("port{}-partner", port);
        self.write(&format!("{}/identity/id_header", name), ID_HEADER_PERIPHERAL);
        self.write(&format!("{}/identity/product_type_vdo1", name), vdo1);
        self.write(
            &format!("{}/number_of_alternate_modes", name),
            &alt_modes.to_string(),
        );
        self.root().join(name)
    }

    pub fn add_partner_alt_mode(&self, port: u32, index: u32, svid: &str, vdo: &str) -> PathBuf {
        let dir = format!("port{0}-partner/port{0}-partner.{1}", port, index);
        self.write(&format!("{}/svid", dir), svid);
        self.write(&format!("{}/vdo", dir), vdo);
        self.root().join(dir)
    }

    pub fn add_cable(&self, port: u32, vdo1: &str) -> PathBuf {
        let name = format!("port{}-cable", port);
        self.write(&format!("{}/identity/id_header", name), ID_HEADER_PASSIVE_CABLE);
        self.write(&format!("{}/identity/product_type_vdo1", name), vdo1);
        self.root().join(name)
    }

    pub fn add_plug(&self, port: u32, alt_modes: u32) -> PathBuf {
        let name = format!("port{}-plug0", port);
        self.write(
            &format!("{}/number_of_alternate_modes", name),
            &alt_modes.to_string(),
        );
        self.root().join(name)
    }

    /// Thunderbolt dock that can also do DP, on a passive Gen2 cable
    pub fn add_tbt_dock(&self, port: u32) {
        self.add_port(port);
        self.add_partner(port, "0x0", 2);
        self.add_partner_alt_mode(port, 0, DP_SVID, DP_SINK_VDO);
        self.add_partner_alt_mode(port, 1, TBT_SVID, TBT_VDO);
        self.add_cable(port, CABLE_VDO_GEN2);
        self.add_plug(port, 0);
    }

    /// USB4 device with TBT and DP alt modes, on a passive Gen2 cable
    pub fn add_usb4_device(&self, port: u32) {
        self.add_port(port);
        self.add_partner(port, UFP_VDO_USB4, 2);
        self.add_partner_alt_mode(port, 0, DP_SVID, DP_SINK_VDO);
        self.add_partner_alt_mode(port, 1, TBT_SVID, TBT_VDO);
        self.add_cable(port, CABLE_VDO_GEN2);
        self.add_plug(port, 0);
    }

    /// Thunderbolt-only peripheral, on a passive Gen2 cable
    pub fn add_tbt_only_device(&self, port: u32) {
        self.add_port(port);
        self.add_partner(port, "0x0", 1);
        self.add_partner_alt_mode(port, 0, TBT_SVID, TBT_VDO);
        self.add_cable(port, CABLE_VDO_GEN2);
        self.add_plug(port, 0);
    }

    /// DP monitor, on a USB 2.0 cable
    pub fn add_dp_monitor(&self, port: u32) {
        self.add_port(port);
        self.add_partner(port, "0x0", 1);
        self.add_partner_alt_mode(port, 0, DP_SVID, DP_SINK_VDO);
        self.add_cable(port, CABLE_VDO_USB2);
        self.add_plug(port, 0);
    }
}
