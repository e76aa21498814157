//! Extended Inquiry Response / Advertising Data parsing
//!
//! A payload is a sequence of `[len][type][len - 1 bytes of data]` fields.
//! Parsing is best effort: a zero length ends the payload, a field running
//! past the end of the buffer ends it too, and everything decoded before that
//! point is kept.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::bluetooth::DeviceInfo;

/// Bluetooth base UUID, 0000xxxx-0000-1000-8000-00805f9b34fb
pub const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Longest device name the HCI layer carries
pub const MAX_NAME_LEN: usize = 248;

/// Appended to every advertised name so it can be told apart from names
/// learned through other stacks
pub const NAME_SUFFIX: &str = " (newblue)";

const UUID16_SIZE: usize = 2;
const UUID32_SIZE: usize = 4;
const UUID128_SIZE: usize = 16;

/// AD types understood by the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EirType {
    Flags,
    Uuid16Incomplete,
    Uuid16Complete,
    Uuid32Incomplete,
    Uuid32Complete,
    Uuid128Incomplete,
    Uuid128Complete,
    NameShort,
    NameComplete,
    TxPower,
    ClassOfDevice,
    ServiceData16,
    GapAppearance,
    ServiceData32,
    ServiceData128,
    ManufacturerData,
    Unknown(u8),
}

impl From<u8> for EirType {
    fn from(value: u8) -> Self {
        match value {
            0x01 => EirType::Flags,
            0x02 => EirType::Uuid16Incomplete,
            0x03 => EirType::Uuid16Complete,
            0x04 => EirType::Uuid32Incomplete,
            0x05 => EirType::Uuid32Complete,
            0x06 => EirType::Uuid128Incomplete,
            0x07 => EirType::Uuid128Complete,
            0x08 => EirType::NameShort,
            0x09 => EirType::NameComplete,
            0x0A => EirType::TxPower,
            0x0D => EirType::ClassOfDevice,
            0x16 => EirType::ServiceData16,
            0x19 => EirType::GapAppearance,
            0x20 => EirType::ServiceData32,
            0x21 => EirType::ServiceData128,
            0xFF => EirType::ManufacturerData,
            other => EirType::Unknown(other),
        }
    }
}

/// Widen a 16-bit assigned number onto the base UUID
pub fn uuid_from_u16(short: u16) -> Uuid {
    uuid_from_u32(u32::from(short))
}

/// Widen a 32-bit assigned number onto the base UUID
pub fn uuid_from_u32(short: u32) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | (u128::from(short) << 96))
}

/// Decode a little-endian UUID of 2, 4 or 16 bytes
fn uuid_from_le_bytes(bytes: &[u8]) -> Option<Uuid> {
    match bytes.len() {
        UUID16_SIZE => Some(uuid_from_u16(u16::from_le_bytes([bytes[0], bytes[1]]))),
        UUID32_SIZE => Some(uuid_from_u32(u32::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ]))),
        UUID128_SIZE => {
            let mut be = [0u8; UUID128_SIZE];
            be.copy_from_slice(bytes);
            be.reverse();
            Some(Uuid::from_bytes(be))
        }
        _ => None,
    }
}

/// Map a GAP appearance value to an icon name, following the BlueZ table
pub fn appearance_to_icon(appearance: u16) -> Option<&'static str> {
    match (appearance & 0xffc0) >> 6 {
        0x00 => Some("unknown"),
        0x01 => Some("phone"),
        0x02 => Some("computer"),
        0x05 => Some("video-display"),
        0x0a => Some("multimedia-player"),
        0x0b => Some("scanner"),
        // HID generic
        0x0f => match appearance & 0x3f {
            0x01 => Some("input-keyboard"),
            0x02 => Some("input-mouse"),
            0x03 | 0x04 => Some("input-gaming"),
            0x05 => Some("input-tablet"),
            0x08 => Some("scanner"),
            _ => None,
        },
        _ => None,
    }
}

/// Turn raw name bytes into a printable name.
///
/// Some devices pad the name with NULs, so only the bytes before the first
/// NUL count. Non-ASCII bytes are replaced with '?'.
fn name_from_bytes(data: &[u8]) -> String {
    let limited = &data[..data.len().min(MAX_NAME_LEN)];
    let end = limited.iter().position(|&b| b == 0).unwrap_or(limited.len());

    let mut name: String = limited[..end]
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect();
    name.push_str(NAME_SUFFIX);
    name
}

fn parse_uuids(uuids: &mut HashSet<Uuid>, uuid_size: usize, data: &[u8]) {
    // A trailing partial UUID is dropped.
    uuids.extend(data.chunks_exact(uuid_size).filter_map(uuid_from_le_bytes));
}

fn parse_service_data(
    service_data: &mut HashMap<Uuid, Vec<u8>>,
    uuid_size: usize,
    data: &[u8],
) {
    if data.len() < uuid_size {
        return;
    }
    let (uuid_bytes, value) = data.split_at(uuid_size);
    if let Some(uuid) = uuid_from_le_bytes(uuid_bytes) {
        service_data.insert(uuid, value.to_vec());
    }
}

/// Decode `eir` into `device`.
///
/// Service UUIDs and service data on `device` are only replaced when the
/// payload carried at least one of them; merging across advertisements from
/// the same device is up to the caller.
pub fn parse_eir(device: &mut DeviceInfo, eir: &[u8]) {
    let mut pos = 0usize;
    let mut service_uuids = HashSet::new();
    let mut service_data = HashMap::new();

    while pos + 1 < eir.len() {
        let field_len = eir[pos] as usize;

        // End of EIR
        if field_len == 0 {
            break;
        }

        // Corrupt EIR data
        if pos + field_len >= eir.len() {
            log::debug!(
                "EIR field at offset {} overruns the {} byte payload",
                pos,
                eir.len()
            );
            break;
        }

        let eir_type = EirType::from(eir[pos + 1]);
        let data = &eir[pos + 2..pos + 1 + field_len];

        match eir_type {
            // Only octet 0 of the flags is defined. An empty flags field is
            // left unset; downstream consumers do not cope with zero-length
            // flags.
            EirType::Flags => {
                if let Some(&flags) = data.first() {
                    device.flags = Some(flags);
                }
            }

            EirType::Uuid16Incomplete | EirType::Uuid16Complete => {
                parse_uuids(&mut service_uuids, UUID16_SIZE, data)
            }
            EirType::Uuid32Incomplete | EirType::Uuid32Complete => {
                parse_uuids(&mut service_uuids, UUID32_SIZE, data)
            }
            EirType::Uuid128Incomplete | EirType::Uuid128Complete => {
                parse_uuids(&mut service_uuids, UUID128_SIZE, data)
            }

            EirType::NameShort | EirType::NameComplete => {
                device.name = Some(name_from_bytes(data));
            }

            EirType::TxPower => {
                if let [tx_power] = data {
                    device.tx_power = Some(*tx_power as i8);
                }
            }

            EirType::ClassOfDevice => {
                if let [b0, b1, b2] = data {
                    device.eir_class = Some(u32::from_le_bytes([*b0, *b1, *b2, 0]));
                }
            }

            EirType::ServiceData16 => parse_service_data(&mut service_data, UUID16_SIZE, data),
            EirType::ServiceData32 => parse_service_data(&mut service_data, UUID32_SIZE, data),
            EirType::ServiceData128 => {
                parse_service_data(&mut service_data, UUID128_SIZE, data)
            }

            EirType::GapAppearance => {
                if let [lo, hi] = data {
                    let appearance = u16::from_le_bytes([*lo, *hi]);
                    device.appearance = Some(appearance);
                    device.icon = appearance_to_icon(appearance).map(str::to_string);
                }
            }

            EirType::ManufacturerData => {
                if data.len() >= 2 {
                    let company_id = u16::from_le_bytes([data[0], data[1]]);
                    let mut manufacturer_data = HashMap::new();
                    manufacturer_data.insert(company_id, data[2..].to_vec());
                    device.manufacturer_data = manufacturer_data;
                }
            }

            EirType::Unknown(value) => {
                log::trace!("Skipping EIR type {:#04x}", value);
            }
        }

        pos += field_len + 1;
    }

    if !service_uuids.is_empty() {
        device.service_uuids = service_uuids;
    }
    if !service_data.is_empty() {
        device.service_data = service_data;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::{AddressType, ReplyType};
    use btleplug::api::BDAddr;

    fn blank_device() -> DeviceInfo {
        DeviceInfo::new(
            false,
            BDAddr::from([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]),
            AddressType::Public,
            None,
            -50,
            ReplyType::AdvInd,
        )
    }

    #[test]
    fn test_uuid16_and_name() {
        let eir = [
            0x03, 0x03, 0xBB, 0xAA, // complete 16-bit UUIDs: 0xAABB
            0x04, 0x09, b'F', b'o', b'o', // complete name
        ];
        let mut device = blank_device();
        parse_eir(&mut device, &eir);

        assert_eq!(device.service_uuids.len(), 1);
        assert!(device.service_uuids.contains(&uuid_from_u16(0xAABB)));
        assert_eq!(device.name.as_deref(), Some("Foo (newblue)"));
    }

    #[test]
    fn test_uuid_widening() {
        assert_eq!(
            uuid_from_u16(0x180D).to_string(),
            "0000180d-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            uuid_from_u32(0x1234_5678).to_string(),
            "12345678-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_uuid128_is_little_endian() {
        let expected = Uuid::from_u128(0x00112233_4455_6677_8899_aabbccddeeff);
        let mut field = vec![0x11, 0x07];
        let mut le = *expected.as_bytes();
        le.reverse();
        field.extend_from_slice(&le);

        let mut device = blank_device();
        parse_eir(&mut device, &field);
        assert!(device.service_uuids.contains(&expected));
    }

    #[test]
    fn test_uuid_fields_accumulate() {
        let eir = [
            0x05, 0x02, 0x0D, 0x18, 0x0F, 0x18, // incomplete: 0x180D, 0x180F
            0x05, 0x03, 0x0D, 0x18, 0x12, 0x18, // complete: 0x180D (dup), 0x1812
        ];
        let mut device = blank_device();
        parse_eir(&mut device, &eir);

        let expected: HashSet<Uuid> = [0x180D, 0x180F, 0x1812]
            .iter()
            .map(|&u| uuid_from_u16(u))
            .collect();
        assert_eq!(device.service_uuids, expected);
    }

    #[test]
    fn test_truncated_field_stops_parsing() {
        let eir = [
            0x02, 0x01, 0x06, // flags
            0x02, 0x0A, 0xF4, // tx power -12
            0x09, 0x09, b'B', b'a', // name claiming 8 data bytes, only 2 present
        ];
        let mut device = blank_device();
        parse_eir(&mut device, &eir);

        assert_eq!(device.flags, Some(0x06));
        assert_eq!(device.tx_power, Some(-12));
        assert_eq!(device.name, None);
    }

    #[test]
    fn test_zero_length_terminates() {
        let eir = [0x02, 0x01, 0x1A, 0x00, 0x02, 0x0A, 0x05];
        let mut device = blank_device();
        parse_eir(&mut device, &eir);

        assert_eq!(device.flags, Some(0x1A));
        assert_eq!(device.tx_power, None);
    }

    #[test]
    fn test_empty_flags_not_stored() {
        let eir = [0x01, 0x01, 0x02, 0x0A, 0x00];
        let mut device = blank_device();
        parse_eir(&mut device, &eir);

        assert_eq!(device.flags, None);
        assert_eq!(device.tx_power, Some(0));
    }

    #[test]
    fn test_name_stops_at_nul_and_masks_non_ascii() {
        let eir = [0x07, 0x08, b'K', 0xC3, b'b', 0x00, 0x00, 0x00];
        let mut device = blank_device();
        parse_eir(&mut device, &eir);

        assert_eq!(device.name.as_deref(), Some("K?b (newblue)"));
    }

    #[test]
    fn test_tx_power_requires_single_byte() {
        let eir = [0x03, 0x0A, 0x01, 0x02];
        let mut device = blank_device();
        parse_eir(&mut device, &eir);
        assert_eq!(device.tx_power, None);
    }

    #[test]
    fn test_class_of_device() {
        let eir = [0x04, 0x0D, 0x0C, 0x02, 0x5A];
        let mut device = blank_device();
        parse_eir(&mut device, &eir);
        assert_eq!(device.eir_class, Some(0x5A020C));
    }

    #[test]
    fn test_service_data_later_occurrence_wins() {
        let eir = [
            0x05, 0x16, 0x0F, 0x18, 0x50, 0x51, // battery service data
            0x04, 0x16, 0x0F, 0x18, 0x63, // same uuid again
        ];
        let mut device = blank_device();
        parse_eir(&mut device, &eir);

        assert_eq!(device.service_data.len(), 1);
        assert_eq!(device.service_data[&uuid_from_u16(0x180F)], vec![0x63]);
    }

    #[test]
    fn test_appearance_and_icon() {
        let eir = [0x03, 0x19, 0xC1, 0x03]; // 0x03C1: HID keyboard
        let mut device = blank_device();
        parse_eir(&mut device, &eir);

        assert_eq!(device.appearance, Some(0x03C1));
        assert_eq!(device.icon.as_deref(), Some("input-keyboard"));
        assert_eq!(appearance_to_icon(0x0040), Some("phone"));
        assert_eq!(appearance_to_icon(0x03C6), None);
    }

    #[test]
    fn test_manufacturer_data() {
        let eir = [0x06, 0xFF, 0x4C, 0x00, 0x07, 0x19, 0x01];
        let mut device = blank_device();
        parse_eir(&mut device, &eir);

        assert_eq!(device.manufacturer_data.len(), 1);
        assert_eq!(device.manufacturer_data[&0x004C], vec![0x07, 0x19, 0x01]);
    }

    #[test]
    fn test_manufacturer_data_too_short() {
        let eir = [0x02, 0xFF, 0x4C];
        let mut device = blank_device();
        parse_eir(&mut device, &eir);
        assert!(device.manufacturer_data.is_empty());
    }

    #[test]
    fn test_absent_uuids_keep_previous_values() {
        let mut device = blank_device();
        device.service_uuids.insert(uuid_from_u16(0x1812));
        device
            .service_data
            .insert(uuid_from_u16(0x180F), vec![0x42]);

        parse_eir(&mut device, &[0x02, 0x01, 0x06]);

        assert!(device.service_uuids.contains(&uuid_from_u16(0x1812)));
        assert_eq!(device.service_data[&uuid_from_u16(0x180F)], vec![0x42]);
    }

    #[test]
    fn test_unknown_type_skipped() {
        let eir = [0x03, 0x2A, 0x01, 0x02, 0x02, 0x0A, 0x08];
        let mut device = blank_device();
        parse_eir(&mut device, &eir);
        assert_eq!(device.tx_power, Some(8));
    }
}
