//! Per-client scan filters and their merged form
//!
//! Every discovery client may register a filter. While clients are scanning,
//! their filters are folded into a single merged filter that decides which
//! discovered devices are reported.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::debug;
use serde_json::Value;
use uuid::Uuid;

use crate::bluetooth::eir::{uuid_from_u16, uuid_from_u32};
use crate::bluetooth::DeviceInfo;

/// Filter key for the RSSI lower bound
pub const FILTER_KEY_RSSI: &str = "RSSI";
/// Filter key for the pathloss upper bound
pub const FILTER_KEY_PATHLOSS: &str = "Pathloss";
/// Filter key for the service UUID list
pub const FILTER_KEY_UUIDS: &str = "UUIDs";

/// Key/value parameters supplied by a client
pub type FilterParams = HashMap<String, Value>;

/// Scan constraint for one client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    /// Minimum RSSI a device must reach
    pub rssi: i16,
    /// Maximum tolerated path loss
    pub pathloss: u16,
    /// Services of interest; empty means any
    pub uuids: HashSet<Uuid>,
}

impl Default for Filter {
    /// The unfiltered filter
    fn default() -> Self {
        Self {
            rssi: i16::MIN,
            pathloss: u16::MAX,
            uuids: HashSet::new(),
        }
    }
}

impl Filter {
    /// Build a filter from client parameters.
    ///
    /// Parsing never fails. Unknown keys are ignored and a value of the wrong
    /// type or range leaves its field at the unfiltered default.
    pub fn from_params(params: &FilterParams) -> Self {
        let mut filter = Filter::default();

        if let Some(rssi) = params
            .get(FILTER_KEY_RSSI)
            .and_then(Value::as_i64)
            .and_then(|v| i16::try_from(v).ok())
        {
            filter.rssi = rssi;
        }

        if let Some(pathloss) = params
            .get(FILTER_KEY_PATHLOSS)
            .and_then(Value::as_u64)
            .and_then(|v| u16::try_from(v).ok())
        {
            filter.pathloss = pathloss;
        }

        if let Some(uuids) = params.get(FILTER_KEY_UUIDS).and_then(parse_uuid_list) {
            filter.uuids = uuids;
        }

        filter
    }

    /// Whether this filter lets every device through
    pub fn is_unfiltered(&self) -> bool {
        self == &Filter::default()
    }
}

/// Parse a JSON array of UUID strings; any bad entry rejects the list
fn parse_uuid_list(value: &Value) -> Option<HashSet<Uuid>> {
    value
        .as_array()?
        .iter()
        .map(|entry| entry.as_str().and_then(parse_uuid))
        .collect()
}

/// Parse a UUID in canonical form or as a 16/32-bit short form
pub fn parse_uuid(s: &str) -> Option<Uuid> {
    let s = s.trim();
    let hex = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);

    match hex.len() {
        4 => u16::from_str_radix(hex, 16).ok().map(uuid_from_u16),
        8 => u32::from_str_radix(hex, 16).ok().map(uuid_from_u32),
        _ => Uuid::parse_str(s).ok(),
    }
}

/// Filters of all known clients plus the merged result
#[derive(Debug, Clone)]
pub struct FilterTable {
    filters: BTreeMap<String, Filter>,
    merged: Filter,
    is_filtered_scan: bool,
}

impl Default for FilterTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            filters: BTreeMap::new(),
            merged: Filter::default(),
            is_filtered_scan: false,
        }
    }

    /// Store a client's filter; empty params reset it to unfiltered
    pub fn set(&mut self, client: &str, params: &FilterParams) {
        let filter = if params.is_empty() {
            debug!("Filter removed for client: {}", client);
            Filter::default()
        } else {
            Filter::from_params(params)
        };

        debug!(
            "Scan filter for {}: RSSI = {}, Pathloss = {}, {} UUIDs",
            client,
            filter.rssi,
            filter.pathloss,
            filter.uuids.len()
        );
        self.filters.insert(client.to_string(), filter);
    }

    /// Give the client an unfiltered filter unless it already has one
    pub fn ensure_default(&mut self, client: &str) {
        self.filters.entry(client.to_string()).or_default();
    }

    /// Drop the client's filter
    pub fn remove(&mut self, client: &str) -> Option<Filter> {
        self.filters.remove(client)
    }

    /// Whether the client has a filter stored
    pub fn contains(&self, client: &str) -> bool {
        self.filters.contains_key(client)
    }

    /// Stored filter for a client
    pub fn get(&self, client: &str) -> Option<&Filter> {
        self.filters.get(client)
    }

    /// Recompute the merged filter from the filters of `active_clients`.
    ///
    /// Each bound takes the most permissive value among the clients that
    /// set it; a bound nobody set stays unfiltered. UUIDs are the union,
    /// unless some active client has no UUIDs, which disables UUID filtering
    /// for everyone.
    pub fn merge(&mut self, active_clients: &[String]) {
        if active_clients.is_empty() {
            self.is_filtered_scan = false;
            debug!("Filter scan disabled, no active clients");
            return;
        }

        let mut rssi: Option<i16> = None;
        let mut pathloss: Option<u16> = None;
        let mut merged = Filter::default();
        let mut is_filter_by_uuid = true;

        for (_, filter) in self
            .filters
            .iter()
            .filter(|(client, _)| active_clients.contains(client))
        {
            if filter.rssi != i16::MIN {
                rssi = Some(rssi.map_or(filter.rssi, |r| r.min(filter.rssi)));
            }
            if filter.pathloss != u16::MAX {
                pathloss = Some(pathloss.map_or(filter.pathloss, |p| p.max(filter.pathloss)));
            }

            if !is_filter_by_uuid {
                continue;
            }
            if filter.uuids.is_empty() {
                is_filter_by_uuid = false;
                merged.uuids.clear();
            } else {
                merged.uuids.extend(filter.uuids.iter().copied());
            }
        }
        merged.rssi = rssi.unwrap_or(i16::MIN);
        merged.pathloss = pathloss.unwrap_or(u16::MAX);

        self.is_filtered_scan =
            merged.rssi != i16::MIN || merged.pathloss != u16::MAX || is_filter_by_uuid;
        self.merged = merged;

        debug!(
            "Merged filter: filtered = {}, RSSI = {}, Pathloss = {}, {} UUIDs",
            self.is_filtered_scan,
            self.merged.rssi,
            self.merged.pathloss,
            self.merged.uuids.len()
        );
    }

    /// Whether a discovered device passes the merged filter
    pub fn is_match(&self, device: &DeviceInfo) -> bool {
        if !self.is_filtered_scan {
            return true;
        }

        // Only drop devices that are too weak by both measures
        let rssi_too_low = i16::from(device.rssi) < self.merged.rssi;
        let pathloss_too_high = match device.pathloss() {
            Some(pathloss) => i32::from(pathloss) > i32::from(self.merged.pathloss),
            None => true,
        };
        if rssi_too_low && pathloss_too_high {
            return false;
        }

        if self.merged.uuids.is_empty() {
            return true;
        }
        !self.merged.uuids.is_disjoint(&device.service_uuids)
    }

    /// The most recently merged filter
    pub fn merged(&self) -> &Filter {
        &self.merged
    }

    /// Whether the last merge left any constraint in place
    pub fn is_filtered_scan(&self) -> bool {
        self.is_filtered_scan
    }
}
