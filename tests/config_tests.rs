//! Configuration loading and validation

use std::fs;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::tempdir;

use policyd::config::{AppConfig, ConfigError, LogLevel};
use policyd::ScanProfile;

#[test]
fn test_missing_file_gives_defaults() {
    let dir = tempdir().unwrap();
    let config = AppConfig::load_from_path(&dir.path().join("absent.json")).unwrap();
    assert_eq!(config, AppConfig::default());
}

#[test]
fn test_save_and_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let mut config = AppConfig::default();
    config.bluetooth.passive_scan = ScanProfile::passive_scan().with_interval(0x0100).with_window(0x0040);
    config.typec.exit_mode_wait_ms = 500;
    config.typec.usb4_host_supported = false;
    config.system.log_level = LogLevel::Debug;

    config.save_to_path(&path).unwrap();
    let loaded = AppConfig::load_from_path(&path).unwrap();

    assert_eq!(loaded, config);
    assert_eq!(loaded.typec.exit_mode_wait(), Duration::from_millis(500));
}

#[test]
fn test_partial_file_keeps_other_sections() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, r#"{"typec": {"mode_entry_enabled": false}}"#).unwrap();

    let config = AppConfig::load_from_path(&path).unwrap();

    assert!(!config.typec.mode_entry_enabled);
    assert_eq!(config.typec.exit_mode_wait_ms, 300);
    assert_eq!(config.bluetooth, AppConfig::default().bluetooth);
}

#[test]
fn test_broken_json_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        AppConfig::load_from_path(&path),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_scan_window_wider_than_interval_rejected() {
    let mut config = AppConfig::default();
    config.bluetooth.active_scan = ScanProfile::active_scan().with_interval(0x0010).with_window(0x0020);

    match config.validate() {
        Err(ConfigError::ValidationFailed(field, _)) => assert_eq!(field, "bluetooth.active_scan"),
        other => panic!("expected validation failure, got {:?}", other),
    }
}
