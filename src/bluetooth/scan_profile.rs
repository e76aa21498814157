//! Discovery parameter sets handed to the discovery engine

use serde::{Deserialize, Serialize};

/// Smallest scan interval/window the controller accepts (2.5 ms)
pub const MIN_SCAN_TIMING: u16 = 0x0004;
/// Largest scan interval/window the controller accepts (10.24 s)
pub const MAX_SCAN_TIMING: u16 = 0x4000;

/// Parameters for one discovery configuration.
///
/// Interval and window are in 0.625 ms controller units. The engine runs a
/// single configuration at a time, so switching profiles needs a full
/// stop/start cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProfile {
    /// Send scan requests (active) or only listen (passive)
    pub active: bool,
    /// Time between the start of two consecutive scan windows
    pub scan_interval: u16,
    /// Time spent listening within each interval
    pub scan_window: u16,
    /// Scan from a random device address
    pub use_random_address: bool,
    /// Only report devices on the controller accept list
    pub only_whitelist: bool,
    /// Let the controller drop duplicate reports
    pub filter_duplicates: bool,
}

impl Default for ScanProfile {
    fn default() -> Self {
        Self::active_scan()
    }
}

impl ScanProfile {
    /// Profile used while a client has requested discovery
    pub fn active_scan() -> Self {
        Self {
            active: true,
            scan_interval: 36,
            scan_window: 18,
            use_random_address: true,
            only_whitelist: false,
            filter_duplicates: false,
        }
    }

    /// Low duty-cycle profile for reconnecting paired devices
    pub fn passive_scan() -> Self {
        Self {
            active: false,
            scan_interval: 96,
            scan_window: 48,
            use_random_address: false,
            only_whitelist: false,
            filter_duplicates: true,
        }
    }

    /// Set the scan interval
    pub fn with_interval(mut self, scan_interval: u16) -> Self {
        self.scan_interval = scan_interval;
        self
    }

    /// Set the scan window
    pub fn with_window(mut self, scan_window: u16) -> Self {
        self.scan_window = scan_window;
        self
    }

    /// Set whether duplicates are filtered by the controller
    pub fn with_filter_duplicates(mut self, filter_duplicates: bool) -> Self {
        self.filter_duplicates = filter_duplicates;
        self
    }

    /// Set whether only accept-listed devices are reported
    pub fn with_only_whitelist(mut self, only_whitelist: bool) -> Self {
        self.only_whitelist = only_whitelist;
        self
    }

    /// Check timing against controller limits
    pub fn validate(&self) -> Result<(), String> {
        let range = MIN_SCAN_TIMING..=MAX_SCAN_TIMING;
        if !range.contains(&self.scan_interval) {
            return Err(format!(
                "scan interval {:#06x} outside {:#06x}..={:#06x}",
                self.scan_interval, MIN_SCAN_TIMING, MAX_SCAN_TIMING
            ));
        }
        if !range.contains(&self.scan_window) {
            return Err(format!(
                "scan window {:#06x} outside {:#06x}..={:#06x}",
                self.scan_window, MIN_SCAN_TIMING, MAX_SCAN_TIMING
            ));
        }
        if self.scan_window > self.scan_interval {
            return Err(format!(
                "scan window {} larger than interval {}",
                self.scan_window, self.scan_interval
            ));
        }
        Ok(())
    }
}

/// The two profiles the scan manager switches between
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanProfiles {
    pub active: ScanProfile,
    pub passive: ScanProfile,
}

impl ScanProfiles {
    pub fn new(active: ScanProfile, passive: ScanProfile) -> Self {
        Self { active, passive }
    }
}

impl Default for ScanProfiles {
    fn default() -> Self {
        Self::new(ScanProfile::active_scan(), ScanProfile::passive_scan())
    }
}
