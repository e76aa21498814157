//! Discovered device information built from a single advertising report

use std::collections::{HashMap, HashSet};

use btleplug::api::BDAddr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// LE address type reported with an advertisement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressType {
    Public,
    Random,
    Unknown(u8),
}

impl From<u8> for AddressType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => AddressType::Public,
            0x01 => AddressType::Random,
            other => AddressType::Unknown(other),
        }
    }
}

/// Advertising report event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplyType {
    /// Connectable undirected advertising
    AdvInd,
    /// Connectable directed advertising
    AdvDirectInd,
    /// Scannable undirected advertising
    AdvScanInd,
    /// Non-connectable undirected advertising
    AdvNonconnInd,
    /// Scan response
    ScanRsp,
    Unknown(u8),
}

impl From<u8> for ReplyType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => ReplyType::AdvInd,
            0x01 => ReplyType::AdvDirectInd,
            0x02 => ReplyType::AdvScanInd,
            0x03 => ReplyType::AdvNonconnInd,
            0x04 => ReplyType::ScanRsp,
            other => ReplyType::Unknown(other),
        }
    }
}

/// Raw advertisement as delivered by the discovery engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingReport {
    /// Address the advertisement was sent from
    pub address: BDAddr,
    pub address_type: AddressType,
    /// Identity address when the controller resolved a private address
    pub resolved_address: Option<BDAddr>,
    pub rssi: i8,
    pub reply_type: ReplyType,
    /// EIR / AD payload
    pub eir: Vec<u8>,
}

/// Device information decoded from one advertising report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceInfo {
    /// Whether a client had requested discovery when this was seen
    pub has_active_discovery_client: bool,
    /// Device address
    #[serde(with = "bdaddr_serde")]
    pub address: BDAddr,
    pub address_type: AddressType,
    /// Resolved identity address, if any
    #[serde(with = "bdaddr_serde::option")]
    pub resolved_address: Option<BDAddr>,
    /// RSSI (signal strength) value
    pub rssi: i8,
    pub reply_type: ReplyType,
    /// Advertised transmit power in dBm
    pub tx_power: Option<i8>,
    /// 24-bit class of device
    pub eir_class: Option<u32>,
    /// GAP appearance value
    pub appearance: Option<u16>,
    /// Icon name derived from the appearance
    pub icon: Option<String>,
    /// Device name if available
    pub name: Option<String>,
    /// First octet of the advertising flags
    pub flags: Option<u8>,
    /// Services advertised by the device
    pub service_uuids: HashSet<Uuid>,
    /// Service data from the device
    pub service_data: HashMap<Uuid, Vec<u8>>,
    /// Manufacturer data keyed by company id
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
}

impl DeviceInfo {
    /// Create device info carrying only the report header fields
    pub fn new(
        has_active_discovery_client: bool,
        address: BDAddr,
        address_type: AddressType,
        resolved_address: Option<BDAddr>,
        rssi: i8,
        reply_type: ReplyType,
    ) -> Self {
        Self {
            has_active_discovery_client,
            address,
            address_type,
            resolved_address,
            rssi,
            reply_type,
            tx_power: None,
            eir_class: None,
            appearance: None,
            icon: None,
            name: None,
            flags: None,
            service_uuids: HashSet::new(),
            service_data: HashMap::new(),
            manufacturer_data: HashMap::new(),
        }
    }

    /// Header fields of a report, before EIR parsing
    pub fn from_report(report: &AdvertisingReport, has_active_discovery_client: bool) -> Self {
        Self::new(
            has_active_discovery_client,
            report.address,
            report.address_type,
            report.resolved_address,
            report.rssi,
            report.reply_type,
        )
    }

    /// Path loss in dB, when the device advertises its transmit power
    pub fn pathloss(&self) -> Option<i16> {
        self.tx_power
            .map(|tx_power| i16::from(tx_power) - i16::from(self.rssi))
    }
}

/// Parse a BDAddr from a string
pub fn parse_bdaddr(s: &str) -> Result<BDAddr, String> {
    let bytes: Vec<&str> = s.split(':').collect();

    if bytes.len() != 6 {
        return Err(format!("Invalid BDAddr format: {}", s));
    }

    let mut addr = [0u8; 6];
    for (i, byte) in bytes.iter().enumerate() {
        if byte.len() != 2 {
            return Err(format!("Invalid hex byte '{}' in {}", byte, s));
        }
        addr[i] = u8::from_str_radix(byte, 16)
            .map_err(|e| format!("Invalid hex byte '{}': {}", byte, e))?;
    }

    Ok(BDAddr::from(addr))
}

// Serialize BDAddr as its "AA:BB:CC:DD:EE:FF" string form
pub(crate) mod bdaddr_serde {
    use btleplug::api::BDAddr;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bdaddr: &BDAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        bdaddr.to_string().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BDAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let addr_str = String::deserialize(deserializer)?;
        super::parse_bdaddr(&addr_str).map_err(D::Error::custom)
    }

    pub mod option {
        use btleplug::api::BDAddr;
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        pub fn serialize<S>(bdaddr: &Option<BDAddr>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            bdaddr.map(|addr| addr.to_string()).serialize(serializer)
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<BDAddr>, D::Error>
        where
            D: Deserializer<'de>,
        {
            use serde::de::Error;

            match Option::<String>::deserialize(deserializer)? {
                Some(addr_str) => super::super::parse_bdaddr(&addr_str)
                    .map(Some)
                    .map_err(D::Error::custom),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bdaddr_valid() {
        let addr = parse_bdaddr("12:34:56:78:9A:BC").unwrap();
        assert_eq!(addr, BDAddr::from([0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC]));
    }

    #[test]
    fn test_parse_bdaddr_invalid_format() {
        assert!(parse_bdaddr("12:34:56:78:9A").is_err());
        assert!(parse_bdaddr("12:34:56:78:9A:ZZ").is_err());
        assert!(parse_bdaddr("12:34:56:78:9A:BCD").is_err());
    }

    #[test]
    fn test_report_type_decoding() {
        assert_eq!(AddressType::from(1), AddressType::Random);
        assert_eq!(AddressType::from(7), AddressType::Unknown(7));
        assert_eq!(ReplyType::from(4), ReplyType::ScanRsp);
        assert_eq!(ReplyType::from(9), ReplyType::Unknown(9));
    }

    #[test]
    fn test_pathloss_needs_tx_power() {
        let mut device = DeviceInfo::new(
            false,
            BDAddr::default(),
            AddressType::Public,
            None,
            -70,
            ReplyType::AdvInd,
        );
        assert_eq!(device.pathloss(), None);

        device.tx_power = Some(4);
        assert_eq!(device.pathloss(), Some(74));
    }

    #[test]
    fn test_device_info_serializes_address_as_string() {
        let device = DeviceInfo::new(
            true,
            BDAddr::from([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
            AddressType::Public,
            None,
            -40,
            ReplyType::AdvInd,
        );
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["address"], "00:11:22:33:44:55");
        assert!(json["resolved_address"].is_null());
    }
}
