//! Events fed to the daemon
//!
//! One JSON object per line, tagged by `"event"`:
//!
//! ```json
//! {"event": "start_scan", "client": ":1.42"}
//! {"event": "set_filter", "client": ":1.42", "filter": {"RSSI": -70}}
//! {"event": "advertisement", "address": "00:11:22:33:44:55", "rssi": -60, "eir": "0303bbaa"}
//! {"event": "udev", "action": "add", "path": "/sys/class/typec/port0-partner"}
//! {"event": "screen_unlocked"}
//! ```

use std::path::PathBuf;

use btleplug::api::BDAddr;
use serde::{Deserialize, Serialize};

use crate::bluetooth::{bdaddr_serde, AdvertisingReport, FilterParams};
use crate::typec::UdevAction;

/// Something that happened on the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DaemonEvent {
    /// A discovery client asked for scanning
    StartScan { client: String },
    StopScan { client: String },
    SetFilter {
        client: String,
        #[serde(default)]
        filter: FilterParams,
    },
    Suspend,
    Resume,
    DevicePaired {
        #[serde(with = "bdaddr_serde")]
        address: BDAddr,
    },
    DeviceUnpaired {
        #[serde(with = "bdaddr_serde")]
        address: BDAddr,
    },
    GattConnected {
        #[serde(with = "bdaddr_serde")]
        address: BDAddr,
    },
    GattDisconnected {
        #[serde(with = "bdaddr_serde")]
        address: BDAddr,
        #[serde(default)]
        by_manager: bool,
    },
    /// Raw advertising report, EIR as hex
    Advertisement {
        #[serde(with = "bdaddr_serde")]
        address: BDAddr,
        #[serde(default)]
        address_type: u8,
        #[serde(default, with = "bdaddr_serde::option")]
        resolved_address: Option<BDAddr>,
        rssi: i8,
        #[serde(default)]
        reply_type: u8,
        #[serde(default)]
        eir: String,
    },
    /// Kernel event for a Type-C device
    Udev { action: UdevAction, path: PathBuf },
    ScreenLocked,
    ScreenUnlocked,
    SessionStarted,
    SessionStopped,
}

/// Decode a hex string, ignoring whitespace and `:` separators
pub fn decode_hex(s: &str) -> Result<Vec<u8>, String> {
    let digits: String = s
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && *c != ':')
        .collect();
    hex::decode(&digits).map_err(|e| format!("invalid hex {:?}: {}", s, e))
}

impl DaemonEvent {
    /// Parse one script line
    pub fn from_json(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// The advertising report carried by an `advertisement` event
    pub fn to_report(&self) -> Option<Result<AdvertisingReport, String>> {
        let DaemonEvent::Advertisement {
            address,
            address_type,
            resolved_address,
            rssi,
            reply_type,
            eir,
        } = self
        else {
            return None;
        };

        Some(decode_hex(eir).map(|eir| AdvertisingReport {
            address: *address,
            address_type: (*address_type).into(),
            resolved_address: *resolved_address,
            rssi: *rssi,
            reply_type: (*reply_type).into(),
            eir,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::{AddressType, ReplyType};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_scan_events() {
        assert_eq!(
            DaemonEvent::from_json(r#"{"event": "start_scan", "client": "a"}"#).unwrap(),
            DaemonEvent::StartScan {
                client: "a".to_string()
            }
        );
        assert_eq!(
            DaemonEvent::from_json(r#"{"event": "suspend"}"#).unwrap(),
            DaemonEvent::Suspend
        );

        match DaemonEvent::from_json(
            r#"{"event": "set_filter", "client": "a", "filter": {"RSSI": -70, "UUIDs": []}}"#,
        )
        .unwrap()
        {
            DaemonEvent::SetFilter { client, filter } => {
                assert_eq!(client, "a");
                assert_eq!(filter.len(), 2);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_advertisement() {
        let event = DaemonEvent::from_json(
            r#"{"event": "advertisement", "address": "00:11:22:33:44:55",
                "address_type": 1, "rssi": -60, "eir": "03 03 bb aa"}"#,
        )
        .unwrap();

        let report = event.to_report().unwrap().unwrap();
        assert_eq!(report.address, BDAddr::from([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]));
        assert_eq!(report.address_type, AddressType::Random);
        assert_eq!(report.reply_type, ReplyType::AdvInd);
        assert_eq!(report.resolved_address, None);
        assert_eq!(report.eir, vec![0x03, 0x03, 0xBB, 0xAA]);
    }

    #[test]
    fn test_parse_udev_and_session() {
        assert_eq!(
            DaemonEvent::from_json(
                r#"{"event": "udev", "action": "remove", "path": "/sys/class/typec/port0-cable"}"#
            )
            .unwrap(),
            DaemonEvent::Udev {
                action: UdevAction::Remove,
                path: PathBuf::from("/sys/class/typec/port0-cable"),
            }
        );
        assert_eq!(
            DaemonEvent::from_json(r#"{"event": "screen_unlocked"}"#).unwrap(),
            DaemonEvent::ScreenUnlocked
        );
    }

    #[test]
    fn test_bad_lines_are_errors() {
        assert!(DaemonEvent::from_json(r#"{"event": "reboot"}"#).is_err());
        assert!(DaemonEvent::from_json(r#"{"event": "device_paired", "address": "nope"}"#).is_err());
    }

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode_hex("02:01:06").unwrap(), vec![0x02, 0x01, 0x06]);
        assert_eq!(decode_hex("").unwrap(), Vec::<u8>::new());
        assert!(decode_hex("0").is_err());
        assert!(decode_hex("zz").is_err());
        assert!(decode_hex("+1+2").is_err());
        assert!(decode_hex("-1").is_err());
    }
}
