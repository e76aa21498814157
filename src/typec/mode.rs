//! Mode and role vocabulary shared by the Type-C modules

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Mode a port has entered through the EC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeCMode {
    #[default]
    None,
    /// DisplayPort alternate mode
    Dp,
    /// Thunderbolt compatibility mode
    Tbt,
    Usb4,
}

impl TypeCMode {
    /// Mode number understood by the EC, if the mode can be entered at all
    pub fn ec_index(&self) -> Option<u8> {
        match self {
            TypeCMode::Dp => Some(0),
            TypeCMode::Tbt => Some(1),
            TypeCMode::Usb4 => Some(2),
            TypeCMode::None => None,
        }
    }
}

impl fmt::Display for TypeCMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeCMode::None => "none",
            TypeCMode::Dp => "DP",
            TypeCMode::Tbt => "TBT",
            TypeCMode::Usb4 => "USB4",
        };
        write!(f, "{}", name)
    }
}

/// USB data role of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataRole {
    Host,
    Device,
    #[default]
    Unknown,
}

impl FromStr for DataRole {
    type Err = String;

    /// Parse the kernel `data_role` attribute, where the active role is
    /// bracketed: `"[host] device"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let active = match (s.find('['), s.find(']')) {
            (Some(start), Some(end)) if start < end => &s[start + 1..end],
            _ => s,
        };

        match active {
            "host" => Ok(DataRole::Host),
            "device" => Ok(DataRole::Device),
            other => Err(format!("unknown data role: {}", other)),
        }
    }
}

impl fmt::Display for DataRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataRole::Host => write!(f, "host"),
            DataRole::Device => write!(f, "device"),
            DataRole::Unknown => write!(f, "unknown"),
        }
    }
}

/// Kind of Thunderbolt device reported to the notification manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceConnectedType {
    /// Thunderbolt device that can also run DisplayPort
    ThunderboltDp,
    ThunderboltOnly,
}
