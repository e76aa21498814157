//! Alternate modes advertised by partners and cable plugs

use std::path::{Path, PathBuf};

use crate::error::TypecError;
use crate::typec::sysfs;

/// VESA DisplayPort SVID
pub const DP_ALT_MODE_SVID: u16 = 0xff01;
/// Intel Thunderbolt SVID
pub const TBT_ALT_MODE_SVID: u16 = 0x8087;

/// DP mode VDO: port can act as UFP_D
const DP_MODE_VDO_UFP_D_CAPABLE: u32 = 1 << 0;

/// One alternate mode directory, e.g. `port0-partner.0`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltMode {
    path: PathBuf,
    svid: u16,
    vdo: u32,
    index: u32,
}

impl AltMode {
    /// Read `svid` and `vdo` from the alt mode directory
    pub fn from_sysfs(path: &Path) -> Result<Self, TypecError> {
        let index = sysfs::index_from_name(path)
            .ok_or_else(|| TypecError::UnknownDevice(path.to_path_buf()))?;

        let svid_path = path.join("svid");
        let svid = sysfs::read_hex(&svid_path)?;
        let svid = u16::try_from(svid).map_err(|_| TypecError::InvalidAttribute {
            path: svid_path,
            value: format!("{:#x}", svid),
        })?;
        let vdo = sysfs::read_hex(&path.join("vdo"))?;

        Ok(Self {
            path: path.to_path_buf(),
            svid,
            vdo,
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn svid(&self) -> u16 {
        self.svid
    }

    pub fn vdo(&self) -> u32 {
        self.vdo
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// DisplayPort mode in which the far end can be a DP sink
    pub fn is_dp_sink(&self) -> bool {
        self.svid == DP_ALT_MODE_SVID && self.vdo & DP_MODE_VDO_UFP_D_CAPABLE != 0
    }

    pub fn is_tbt(&self) -> bool {
        self.svid == TBT_ALT_MODE_SVID
    }
}
