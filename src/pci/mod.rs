// PCI device module for the FC passthrough tool
//
// This module holds the device inventory types, the lspci parser and
// the bus address codec used by the detach/attach steps

pub mod address;
pub mod detection;

use serde::Serialize;

/// PCI class name reported by lspci for Fibre Channel HBAs
pub const FIBRE_CHANNEL_CLASS: &str = "Fibre Channel";

/// Ordered key/value sub-records of one device block.
///
/// Insertion order is kept; setting an existing key replaces its value
/// in place, so the last occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing an earlier value for the same key
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One PCI device as reported by `lspci -D -vv`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceRecord {
    pub bus_address: String,       // Domain:Bus:Slot.Function (e.g., "0000:05:00.2")
    pub device_class: String,      // Class name (e.g., "Fibre Channel")
    pub description: String,       // Vendor/model text
    pub attributes: Attributes,    // Indented "key: value" sub-lines
}

impl DeviceRecord {
    /// Returns true if lspci reports this device with the exact FC class name
    pub fn is_fibre_channel(&self) -> bool {
        self.device_class == FIBRE_CHANNEL_CLASS
    }

    /// Kernel driver currently bound to the device, if lspci reported one
    pub fn kernel_driver(&self) -> Option<&str> {
        self.attributes.get("Kernel driver in use")
    }
}
