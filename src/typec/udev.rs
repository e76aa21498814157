//! Classification of Type-C class devices from their kernel names
//!
//! The typec class names its devices after the port they hang off:
//! `port0`, `port0-partner`, `port0-partner.1`, `port0-cable`,
//! `port0-plug0` and `port0-plug0.0`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::TypecError;

lazy_static! {
    static ref PORT_RE: Regex = Regex::new(r"^port(\d+)$").unwrap();
    static ref PARTNER_RE: Regex = Regex::new(r"^port(\d+)-partner$").unwrap();
    static ref PARTNER_ALT_MODE_RE: Regex = Regex::new(r"^port(\d+)-partner\.(\d+)$").unwrap();
    static ref CABLE_RE: Regex = Regex::new(r"^port(\d+)-cable$").unwrap();
    static ref PLUG_RE: Regex = Regex::new(r"^port(\d+)-plug(\d+)$").unwrap();
    static ref PLUG_ALT_MODE_RE: Regex = Regex::new(r"^port(\d+)-plug(\d+)\.(\d+)$").unwrap();
}

/// Kind of Type-C device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TypecDeviceKind {
    Port,
    Partner,
    Cable,
    CablePlug,
    PartnerAltMode,
    CableAltMode,
}

impl TypecDeviceKind {
    /// Coldplug order: parents before children
    fn depth(&self) -> u8 {
        match self {
            TypecDeviceKind::Port => 0,
            TypecDeviceKind::Partner | TypecDeviceKind::Cable => 1,
            TypecDeviceKind::CablePlug => 2,
            TypecDeviceKind::PartnerAltMode | TypecDeviceKind::CableAltMode => 3,
        }
    }
}

/// udev action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UdevAction {
    Add,
    Remove,
    Change,
}

/// A udev event for a Type-C device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypecUdevEvent {
    pub action: UdevAction,
    pub kind: TypecDeviceKind,
    pub port: u32,
    pub path: PathBuf,
}

/// Classify a device name, returning its kind and port number
pub fn classify(name: &str) -> Option<(TypecDeviceKind, u32)> {
    let table: [(&Regex, TypecDeviceKind); 6] = [
        (&*PORT_RE, TypecDeviceKind::Port),
        (&*PARTNER_RE, TypecDeviceKind::Partner),
        (&*PARTNER_ALT_MODE_RE, TypecDeviceKind::PartnerAltMode),
        (&*CABLE_RE, TypecDeviceKind::Cable),
        (&*PLUG_RE, TypecDeviceKind::CablePlug),
        (&*PLUG_ALT_MODE_RE, TypecDeviceKind::CableAltMode),
    ];

    table.iter().find_map(|(re, kind)| {
        let caps = re.captures(name)?;
        let port = caps.get(1)?.as_str().parse().ok()?;
        Some((*kind, port))
    })
}

impl TypecUdevEvent {
    /// Build an event from the device path the kernel reported
    pub fn from_device(action: UdevAction, path: &Path) -> Result<Self, TypecError> {
        let (kind, port) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(classify)
            .ok_or_else(|| TypecError::UnknownDevice(path.to_path_buf()))?;

        Ok(Self {
            action,
            kind,
            port,
            path: path.to_path_buf(),
        })
    }
}

fn collect_dir(dir: &Path, found: &mut BTreeMap<String, PathBuf>) -> Result<(), TypecError> {
    let entries = fs::read_dir(dir).map_err(|source| TypecError::Sysfs {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if let Some((kind, _)) = classify(&name) {
            found.entry(name).or_insert_with(|| path.clone());
            // Alt modes live below their partner or plug
            if matches!(kind, TypecDeviceKind::Partner | TypecDeviceKind::CablePlug) {
                collect_dir(&path, found)?;
            }
        }
    }
    Ok(())
}

/// Coldplug `Add` events for every Type-C device under `root`.
///
/// Ports come first, then partners and cables, then plugs, then alt modes.
pub fn enumerate_typec_devices(root: &Path) -> Result<Vec<TypecUdevEvent>, TypecError> {
    let mut found = BTreeMap::new();
    collect_dir(root, &mut found)?;

    let mut events = found
        .values()
        .map(|path| TypecUdevEvent::from_device(UdevAction::Add, path))
        .collect::<Result<Vec<_>, _>>()?;
    events.sort_by(|a, b| {
        (a.kind.depth(), a.port, &a.path).cmp(&(b.kind.depth(), b.port, &b.path))
    });

    debug!("Found {} Type-C devices under {}", events.len(), root.display());
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_classify_names() {
        assert_eq!(classify("port0"), Some((TypecDeviceKind::Port, 0)));
        assert_eq!(classify("port1-partner"), Some((TypecDeviceKind::Partner, 1)));
        assert_eq!(
            classify("port1-partner.2"),
            Some((TypecDeviceKind::PartnerAltMode, 1))
        );
        assert_eq!(classify("port2-cable"), Some((TypecDeviceKind::Cable, 2)));
        assert_eq!(classify("port0-plug0"), Some((TypecDeviceKind::CablePlug, 0)));
        assert_eq!(
            classify("port0-plug0.1"),
            Some((TypecDeviceKind::CableAltMode, 0))
        );
        assert_eq!(classify("usb_power_delivery"), None);
        assert_eq!(classify("port0-partner.x"), None);
    }

    #[test]
    fn test_from_device_rejects_unknown() {
        let result = TypecUdevEvent::from_device(UdevAction::Add, Path::new("/sys/class/typec/pd0"));
        assert!(matches!(result, Err(TypecError::UnknownDevice(_))));
    }

    #[test]
    fn test_enumerate_orders_parents_first() {
        let root = tempdir().unwrap();
        let r = root.path();
        for dir in [
            "port1",
            "port0",
            "port0-partner/port0-partner.0",
            "port0-cable",
            "port0-plug0/port0-plug0.0",
            "unrelated",
        ] {
            fs::create_dir_all(r.join(dir)).unwrap();
        }

        let events = enumerate_typec_devices(r).unwrap();
        let names: Vec<String> = events
            .iter()
            .map(|e| e.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            names,
            vec![
                "port0",
                "port1",
                "port0-cable",
                "port0-partner",
                "port0-plug0",
                "port0-partner.0",
                "port0-plug0.0",
            ]
        );
        assert!(events.iter().all(|e| e.action == UdevAction::Add));
    }
}
