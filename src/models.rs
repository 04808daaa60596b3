//! Core data models for cache key inspection

use serde::{Deserialize, Serialize};
use std::fmt;

/// Device class the proxy segments full-page cache entries by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    Desktop,
    Mobile,
    /// Key carries no device suffix
    All,
}

impl Device {
    /// Suffix appended to the cache key for this device class
    pub fn suffix(&self) -> &'static str {
        match self {
            Device::Desktop => "Desktop",
            Device::Mobile => "Mobile",
            Device::All => "",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Desktop => "Desktop",
            Device::Mobile => "Mobile",
            Device::All => "All",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of a raw cache key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedEntry {
    /// Display form: scheme stripped, trailing slash trimmed
    pub url: String,
    pub device: Device,
    /// Scheme-qualified URL, trailing slash trimmed
    pub full_url: String,
    /// The key exactly as stored
    pub raw_key: String,
    /// False when decoding had to guess (missing prefix, scheme or suffix)
    pub well_formed: bool,
}

/// All cache entries stored for one URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlGroup {
    pub url: String,
    /// Device classes in first-seen order, no duplicates
    pub devices: Vec<Device>,
    /// Raw keys in scan order, one per stored entry
    pub keys: Vec<String>,
}

impl UrlGroup {
    pub fn new(url: impl Into<String>) -> Self {
        UrlGroup {
            url: url.into(),
            devices: Vec::new(),
            keys: Vec::new(),
        }
    }

    /// Fold one decoded entry into the group
    pub fn absorb(&mut self, entry: DecodedEntry) {
        if !self.devices.contains(&entry.device) {
            self.devices.push(entry.device);
        }
        self.keys.push(entry.raw_key);
    }
}

/// One page of a cursor-based key scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub keys: Vec<String>,
    /// Cursor for the next call; 0 means the scan is complete
    pub next_cursor: u64,
}

impl ScanPage {
    pub fn is_last(&self) -> bool {
        self.next_cursor == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, device: Device, key: &str) -> DecodedEntry {
        DecodedEntry {
            url: url.to_string(),
            device,
            full_url: format!("https://{}", url),
            raw_key: key.to_string(),
            well_formed: true,
        }
    }

    #[test]
    fn test_device_strings() {
        assert_eq!(Device::Desktop.suffix(), "Desktop");
        assert_eq!(Device::All.suffix(), "");
        assert_eq!(Device::All.to_string(), "All");
        assert_eq!(serde_json::to_string(&Device::Mobile).unwrap(), "\"Mobile\"");
    }

    #[test]
    fn test_url_group_absorb_dedups_devices() {
        let mut group = UrlGroup::new("example.com/a");
        group.absorb(entry("example.com/a", Device::Mobile, "k1"));
        group.absorb(entry("example.com/a", Device::Desktop, "k2"));
        group.absorb(entry("example.com/a", Device::Mobile, "k3"));

        assert_eq!(group.devices, vec![Device::Mobile, Device::Desktop]);
        assert_eq!(group.keys, vec!["k1", "k2", "k3"]);
    }

    #[test]
    fn test_scan_page_last() {
        assert!(ScanPage::default().is_last());
        let page = ScanPage {
            keys: vec![],
            next_cursor: 17,
        };
        assert!(!page.is_last());
    }
}
