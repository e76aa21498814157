//! Port partners and cables
//!
//! Both are read from their sysfs directories. The PD Discover Identity
//! response is exposed under `identity/`; the files read as 0 until the
//! kernel has run discovery.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::TypecError;
use crate::typec::alt_mode::AltMode;
use crate::typec::sysfs;

/// ID Header product type field (bits 29:27)
const ID_HEADER_PRODUCT_TYPE_SHIFT: u32 = 27;
const ID_HEADER_PRODUCT_TYPE_MASK: u32 = 0x7;

/// UFP VDO device capability: USB4 device (bit 27)
const UFP_VDO_DEVICE_CAP_USB4: u32 = 1 << 27;

/// Cable VDO USB highest speed (bits 2:0)
const CABLE_VDO_SPEED_MASK: u32 = 0x7;

/// Product type from the ID Header VDO
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductType {
    Undefined,
    Hub,
    Peripheral,
    PassiveCable,
    ActiveCable,
    Other(u32),
}

impl From<u32> for ProductType {
    fn from(id_header: u32) -> Self {
        match (id_header >> ID_HEADER_PRODUCT_TYPE_SHIFT) & ID_HEADER_PRODUCT_TYPE_MASK {
            0 => ProductType::Undefined,
            1 => ProductType::Hub,
            2 => ProductType::Peripheral,
            3 => ProductType::PassiveCable,
            4 => ProductType::ActiveCable,
            other => ProductType::Other(other),
        }
    }
}

/// Highest USB signalling a cable is rated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CableSpeed {
    Usb20,
    Usb32Gen1,
    Usb32Gen2,
    Usb4Gen3,
    Reserved,
}

impl From<u32> for CableSpeed {
    fn from(cable_vdo: u32) -> Self {
        match cable_vdo & CABLE_VDO_SPEED_MASK {
            0 => CableSpeed::Usb20,
            1 => CableSpeed::Usb32Gen1,
            2 => CableSpeed::Usb32Gen2,
            3 => CableSpeed::Usb4Gen3,
            _ => CableSpeed::Reserved,
        }
    }
}

impl CableSpeed {
    /// Rated for at least `speed`; reserved encodings are rated for nothing
    pub fn at_least(self, speed: CableSpeed) -> bool {
        self != CableSpeed::Reserved && self >= speed
    }
}

/// Discover Identity VDOs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Identity {
    pub id_header: u32,
    pub product_type_vdo1: u32,
}

impl Identity {
    fn from_sysfs(dir: &Path) -> Result<Self, TypecError> {
        let identity = dir.join("identity");
        Ok(Self {
            id_header: sysfs::read_hex_or_zero(&identity.join("id_header"))?,
            product_type_vdo1: sysfs::read_hex_or_zero(&identity.join("product_type_vdo1"))?,
        })
    }

    pub fn product_type(&self) -> ProductType {
        ProductType::from(self.id_header)
    }
}

/// Register or drop an alt mode keyed by its index
fn add_remove_alt_mode(
    alt_modes: &mut BTreeMap<u32, AltMode>,
    path: &Path,
    added: bool,
) -> Result<(), TypecError> {
    if !added {
        let index = sysfs::index_from_name(path)
            .ok_or_else(|| TypecError::UnknownDevice(path.to_path_buf()))?;
        if alt_modes.remove(&index).is_none() {
            warn!("Removing unregistered alt mode {}", path.display());
        }
        return Ok(());
    }

    let alt_mode = AltMode::from_sysfs(path)?;
    if alt_modes.contains_key(&alt_mode.index()) {
        warn!("Alt mode {} already registered", path.display());
        return Ok(());
    }
    debug!(
        "Registered alt mode {} svid {:#06x}",
        path.display(),
        alt_mode.svid()
    );
    alt_modes.insert(alt_mode.index(), alt_mode);
    Ok(())
}

/// Device attached to a port
#[derive(Debug, Clone)]
pub struct Partner {
    path: PathBuf,
    identity: Identity,
    number_of_alt_modes: Option<u32>,
    alt_modes: BTreeMap<u32, AltMode>,
}

impl Partner {
    pub fn from_sysfs(path: &Path) -> Result<Self, TypecError> {
        Ok(Self {
            path: path.to_path_buf(),
            identity: Identity::from_sysfs(path)?,
            number_of_alt_modes: sysfs::read_optional_decimal(
                &path.join("number_of_alternate_modes"),
            )?,
            alt_modes: BTreeMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn alt_modes(&self) -> impl Iterator<Item = &AltMode> {
        self.alt_modes.values()
    }

    pub fn add_remove_alt_mode(&mut self, path: &Path, added: bool) -> Result<(), TypecError> {
        add_remove_alt_mode(&mut self.alt_modes, path, added)
    }

    /// Re-read identity and alt mode count after a change event
    pub fn refresh(&mut self) -> Result<(), TypecError> {
        self.identity = Identity::from_sysfs(&self.path)?;
        self.number_of_alt_modes =
            sysfs::read_optional_decimal(&self.path.join("number_of_alternate_modes"))?;
        Ok(())
    }

    /// All alt modes the partner declared have been registered
    pub fn discovery_complete(&self) -> bool {
        self.number_of_alt_modes
            .map_or(false, |n| n as usize == self.alt_modes.len())
    }

    pub fn supports_dp(&self) -> bool {
        self.alt_modes.values().any(AltMode::is_dp_sink)
    }

    pub fn supports_tbt(&self) -> bool {
        self.alt_modes.values().any(AltMode::is_tbt)
    }

    /// UFP VDO advertises USB4 device capability
    pub fn supports_usb4(&self) -> bool {
        matches!(
            self.identity.product_type(),
            ProductType::Hub | ProductType::Peripheral
        ) && self.identity.product_type_vdo1 & UFP_VDO_DEVICE_CAP_USB4 != 0
    }
}

/// SOP' plug of a cable
#[derive(Debug, Clone)]
struct CablePlug {
    path: PathBuf,
    number_of_alt_modes: Option<u32>,
}

/// Cable attached to a port
#[derive(Debug, Clone)]
pub struct Cable {
    path: PathBuf,
    identity: Identity,
    plug: Option<CablePlug>,
    alt_modes: BTreeMap<u32, AltMode>,
}

impl Cable {
    pub fn from_sysfs(path: &Path) -> Result<Self, TypecError> {
        Ok(Self {
            path: path.to_path_buf(),
            identity: Identity::from_sysfs(path)?,
            plug: None,
            alt_modes: BTreeMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn add_plug(&mut self, path: &Path) -> Result<(), TypecError> {
        if self.plug.is_some() {
            warn!("Cable plug already registered for {}", self.path.display());
            return Ok(());
        }
        self.plug = Some(CablePlug {
            path: path.to_path_buf(),
            number_of_alt_modes: sysfs::read_optional_decimal(
                &path.join("number_of_alternate_modes"),
            )?,
        });
        Ok(())
    }

    pub fn has_plug(&self) -> bool {
        self.plug.is_some()
    }

    pub fn plug_path(&self) -> Option<&Path> {
        self.plug.as_ref().map(|plug| plug.path.as_path())
    }

    pub fn add_alt_mode(&mut self, path: &Path) -> Result<(), TypecError> {
        add_remove_alt_mode(&mut self.alt_modes, path, true)
    }

    /// The plug is registered along with every alt mode it declared.
    ///
    /// A plug without a declared count has no alt modes to wait for.
    pub fn discovery_complete(&self) -> bool {
        match &self.plug {
            Some(plug) => plug
                .number_of_alt_modes
                .map_or(true, |n| n as usize == self.alt_modes.len()),
            None => false,
        }
    }

    pub fn speed(&self) -> CableSpeed {
        CableSpeed::from(self.identity.product_type_vdo1)
    }

    pub fn is_passive(&self) -> bool {
        self.identity.product_type() == ProductType::PassiveCable
    }

    pub fn supports_tbt(&self) -> bool {
        self.alt_modes.values().any(AltMode::is_tbt)
    }
}
