//! Attribute readers for the Type-C class directory

use std::fs;
use std::io;
use std::path::Path;

use crate::error::TypecError;

/// Read an attribute file, trimmed
pub fn read_attribute(path: &Path) -> Result<String, TypecError> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|source| TypecError::Sysfs {
            path: path.to_path_buf(),
            source,
        })
}

fn invalid(path: &Path, value: &str) -> TypecError {
    TypecError::InvalidAttribute {
        path: path.to_path_buf(),
        value: value.to_string(),
    }
}

/// Parse hex with or without a `0x` prefix
fn parse_hex(value: &str) -> Option<u32> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u32::from_str_radix(digits, 16).ok()
}

/// Read a hex attribute such as `svid` or `vdo`
pub fn read_hex(path: &Path) -> Result<u32, TypecError> {
    let value = read_attribute(path)?;
    parse_hex(&value).ok_or_else(|| invalid(path, &value))
}

/// Read a hex attribute, treating a missing file as 0.
///
/// Identity VDOs only show up once PD discovery has run.
pub fn read_hex_or_zero(path: &Path) -> Result<u32, TypecError> {
    match read_hex(path) {
        Err(TypecError::Sysfs { source, .. }) if source.kind() == io::ErrorKind::NotFound => Ok(0),
        other => other,
    }
}

/// Read a decimal attribute; a missing file reads as `None`
pub fn read_optional_decimal(path: &Path) -> Result<Option<u32>, TypecError> {
    let value = match read_attribute(path) {
        Ok(value) => value,
        Err(TypecError::Sysfs { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            return Ok(None)
        }
        Err(e) => return Err(e),
    };
    value
        .parse::<u32>()
        .map(Some)
        .map_err(|_| invalid(path, &value))
}

/// Index carried in a `.N` directory suffix, e.g. `port0-partner.2` → 2
pub fn index_from_name(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    let (_, index) = name.rsplit_once('.')?;
    index.parse().ok()
}
