// PCI bus address codec
//
// Splits "domain:bus:slot.function" into its parts and renders the two
// forms virsh needs: the node device name for detach and the hostdev
// XML fragment for attach.

use std::fmt;

use serde::Serialize;

use crate::error::{PassthroughError, Result};

/// Domain written into the hostdev XML by the legacy template
pub const LEGACY_XML_DOMAIN: &str = "0000";

/// Which PCI domain goes into the hostdev XML
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DomainPolicy {
    /// Always `0x0000`, whatever the device's real domain is. Devices on
    /// other domains get the wrong address; kept for compatibility.
    #[default]
    Legacy,
    /// Use the domain parsed from the bus address
    Preserve,
}

/// The four parts of a PCI bus address, kept as the original text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PciAddress {
    pub domain_id: String,
    pub bus_id: String,
    pub slot_id: String,
    pub function_id: String,
}

impl PciAddress {
    /// Parses "0000:05:00.2". Fails unless there are exactly three
    /// ':'-separated parts and the last one holds exactly one '.'.
    pub fn parse(bus_address: &str) -> Result<Self> {
        let malformed = |reason: String| PassthroughError::MalformedAddress {
            address: bus_address.to_string(),
            reason,
        };

        let parts: Vec<&str> = bus_address.split(':').collect();
        if parts.len() != 3 {
            return Err(malformed(format!(
                "expected domain:bus:slot.function, found {} ':'-separated part(s)",
                parts.len()
            )));
        }

        let slot_function: Vec<&str> = parts[2].split('.').collect();
        if slot_function.len() != 2 {
            return Err(malformed(format!(
                "expected slot.function, found {} '.'-separated part(s) in '{}'",
                slot_function.len(),
                parts[2]
            )));
        }

        Ok(Self {
            domain_id: parts[0].to_string(),
            bus_id: parts[1].to_string(),
            slot_id: slot_function[0].to_string(),
            function_id: slot_function[1].to_string(),
        })
    }

    /// Name virsh uses for the host device, e.g. `pci_0000_05_00_2`
    pub fn node_device_name(&self) -> String {
        format!(
            "pci_{}_{}_{}_{}",
            self.domain_id, self.bus_id, self.slot_id, self.function_id
        )
    }

    /// Hostdev XML with the legacy fixed `0x0000` domain
    pub fn render_xml(&self) -> String {
        self.render_xml_with(DomainPolicy::Legacy)
    }

    /// Hostdev XML requesting managed subsystem passthrough of this device
    pub fn render_xml_with(&self, policy: DomainPolicy) -> String {
        let domain = match policy {
            DomainPolicy::Legacy => LEGACY_XML_DOMAIN,
            DomainPolicy::Preserve => self.domain_id.as_str(),
        };
        format!(
            "<hostdev mode='subsystem' type='pci' managed='yes'><source>\
             <address domain='0x{}' bus='0x{}' slot='0x{}' function='0x{}'/>\
             </source></hostdev>",
            domain, self.bus_id, self.slot_id, self.function_id
        )
    }

    /// True when the legacy template would address a different domain
    pub fn domain_lost_by_legacy_template(&self) -> bool {
        self.domain_id != LEGACY_XML_DOMAIN
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}.{}",
            self.domain_id, self.bus_id, self.slot_id, self.function_id
        )
    }
}
