// PCI detection module for the FC passthrough tool
//
// This module turns `lspci -D -vv` output into DeviceRecords and picks
// out the Fibre Channel adapters among them

use tracing::{debug, info};

use crate::core::command::{CommandLine, CommandRunner};
use crate::error::{PassthroughError, Result};
use crate::pci::{Attributes, DeviceRecord};

/// Command used to dump the PCI inventory with full domain addresses
pub fn lspci_command() -> CommandLine {
    CommandLine::new("lspci", ["-D", "-vv"])
}

/// Runs lspci and parses every device it reports
pub fn discover_devices(runner: &dyn CommandRunner) -> Result<Vec<DeviceRecord>> {
    let command = lspci_command();
    let output = runner.run(&command).map_err(|e| PassthroughError::DiscoveryFailed {
        reason: e.to_string(),
    })?;

    if !output.success() {
        return Err(PassthroughError::DiscoveryFailed {
            reason: format!(
                "'{}' exited with {:?}: {}",
                command,
                output.exit_code,
                output.stderr.trim()
            ),
        });
    }

    let devices = parse_inventory(&output.stdout);
    info!("Discovered {} PCI devices", devices.len());
    Ok(devices)
}

/// Discovers devices and returns only the Fibre Channel adapters
pub fn detect_fc_devices(runner: &dyn CommandRunner) -> Result<Vec<DeviceRecord>> {
    let devices = discover_devices(runner)?;
    let fc_devices = filter_fibre_channel(&devices);
    info!("Found {} Fibre Channel device(s)", fc_devices.len());
    Ok(fc_devices)
}

/// Keeps the devices whose class is exactly "Fibre Channel", in input order
pub fn filter_fibre_channel(devices: &[DeviceRecord]) -> Vec<DeviceRecord> {
    devices
        .iter()
        .filter(|dev| dev.is_fibre_channel())
        .cloned()
        .collect()
}

/// Accumulates the lines of one device block
#[derive(Default)]
struct PendingRecord {
    header: Option<(String, String, String)>,
    attributes: Attributes,
}

impl PendingRecord {
    fn is_empty(&self) -> bool {
        self.header.is_none() && self.attributes.is_empty()
    }

    fn finish(self) -> DeviceRecord {
        let (bus_address, device_class, description) = self.header.unwrap_or_default();
        DeviceRecord {
            bus_address,
            device_class,
            description,
            attributes: self.attributes,
        }
    }
}

/// Parses raw `lspci -D -vv` output into device records.
///
/// Blocks are separated by blank lines. A block starts with an unindented
/// `<address> <class>: <description>` line followed by tab-indented
/// `key: value` lines. The last block is flushed even without a trailing
/// blank line.
pub fn parse_inventory(text: &str) -> Vec<DeviceRecord> {
    let mut devices = Vec::new();
    let mut pending = PendingRecord::default();

    for line in text.lines() {
        if line.trim().is_empty() {
            flush(&mut pending, &mut devices);
            continue;
        }

        if line.starts_with('\t') {
            // "\tKernel driver in use: lpfc"
            if let Some((key, value)) = line.split_once(':') {
                pending.attributes.insert(key.trim(), value.trim());
            }
            continue;
        }

        // A second header inside one block starts a new record
        if pending.header.is_some() {
            flush(&mut pending, &mut devices);
        }
        pending.header = Some(parse_header(line));
    }

    flush(&mut pending, &mut devices);
    debug!("Parsed {} device blocks", devices.len());
    devices
}

fn flush(pending: &mut PendingRecord, devices: &mut Vec<DeviceRecord>) {
    if !pending.is_empty() {
        devices.push(std::mem::take(pending).finish());
    }
}

/// Splits "0000:05:00.2 Fibre Channel: Emulex Corporation ..." into
/// address, class and description
fn parse_header(line: &str) -> (String, String, String) {
    let line = line.trim_start();
    let (address, rest) = match line.find(char::is_whitespace) {
        Some(idx) => (&line[..idx], &line[idx..]),
        None => (line, ""),
    };

    let (class, description) = match rest.split_once(':') {
        Some((class, description)) => (class.trim(), description.trim()),
        None => (rest.trim(), ""),
    };

    (address.to_string(), class.to_string(), description.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::command::CommandOutput;
    use std::cell::RefCell;

    const SAMPLE: &str = "\
0000:00:1f.2 SATA controller: Intel Corporation C610/X99 series chipset 6-Port SATA Controller [AHCI mode] (rev 05)
\tSubsystem: Super Micro Computer Inc Device 0834
\tControl: I/O+ Mem+ BusMaster+ SpecCycle- MemWINV- VGASnoop- ParErr- Stepping- SERR- FastB2B- DisINTx+
\tKernel driver in use: ahci

0000:05:00.2 Fibre Channel: Emulex Corporation OneConnect 10Gb FCoE Initiator (be3) (rev 01)
\tSubsystem: Hewlett-Packard Company NC553i 10Gb 2-port FlexFabric Converged Network Adapter
\tRegion 0: Memory at f7e00000 (64-bit, non-prefetchable) [size=16K]
\tKernel driver in use: lpfc
\tKernel modules: lpfc

0000:06:00.0 Ethernet controller: Intel Corporation I350 Gigabit Network Connection (rev 01)
\tKernel driver in use: igb

0000:07:00.1 Fibre Channel: QLogic Corp. ISP2532-based 8Gb Fibre Channel to PCI Express HBA (rev 02)
\tKernel driver in use: qla2xxx
";

    #[test]
    fn parses_headers_and_attributes() {
        let devices = parse_inventory(SAMPLE);
        assert_eq!(devices.len(), 4);

        let emulex = &devices[1];
        assert_eq!(emulex.bus_address, "0000:05:00.2");
        assert_eq!(emulex.device_class, "Fibre Channel");
        assert_eq!(
            emulex.description,
            "Emulex Corporation OneConnect 10Gb FCoE Initiator (be3) (rev 01)"
        );
        assert_eq!(emulex.kernel_driver(), Some("lpfc"));
        assert_eq!(emulex.attributes.get("Kernel modules"), Some("lpfc"));
        assert_eq!(
            emulex.attributes.get("Region 0"),
            Some("Memory at f7e00000 (64-bit, non-prefetchable) [size=16K]")
        );
    }

    #[test]
    fn flushes_final_block_without_trailing_blank_line() {
        let devices = parse_inventory(SAMPLE.trim_end());
        assert_eq!(devices.len(), 4);
        assert_eq!(devices[3].bus_address, "0000:07:00.1");
        assert_eq!(devices[3].kernel_driver(), Some("qla2xxx"));
    }

    #[test]
    fn empty_and_blank_input_yield_no_devices() {
        assert!(parse_inventory("").is_empty());
        assert!(parse_inventory("\n\n   \n\t\n").is_empty());
    }

    #[test]
    fn repeated_blank_lines_do_not_emit_empty_records() {
        let text = "\n\n0000:05:00.0 Fibre Channel: Emulex\n\n\n\n\
                    0000:06:00.1 Fibre Channel: QLogic\n\n";
        let devices = parse_inventory(text);
        assert_eq!(devices.len(), 2);
    }

    #[test]
    fn sub_lines_without_colon_are_ignored() {
        let text = "0000:05:00.0 Fibre Channel: Emulex\n\
                    \tCapabilities <access denied>\n\
                    \tFlags: bus master\n";
        let devices = parse_inventory(text);
        assert_eq!(devices[0].attributes.len(), 1);
        assert_eq!(devices[0].attributes.get("Flags"), Some("bus master"));
    }

    #[test]
    fn header_without_description() {
        let devices = parse_inventory("0000:00:00.0 Host bridge\n");
        assert_eq!(devices[0].device_class, "Host bridge");
        assert_eq!(devices[0].description, "");
    }

    #[test]
    fn description_keeps_text_after_first_colon() {
        let devices = parse_inventory("0000:05:00.0 Fibre Channel: Vendor: Model X\n");
        assert_eq!(devices[0].device_class, "Fibre Channel");
        assert_eq!(devices[0].description, "Vendor: Model X");
    }

    #[test]
    fn parsing_is_idempotent() {
        assert_eq!(parse_inventory(SAMPLE), parse_inventory(SAMPLE));
    }

    #[test]
    fn filter_keeps_fc_devices_in_order() {
        let devices = parse_inventory(SAMPLE);
        let fc = filter_fibre_channel(&devices);
        let addrs: Vec<_> = fc.iter().map(|d| d.bus_address.as_str()).collect();
        assert_eq!(addrs, vec!["0000:05:00.2", "0000:07:00.1"]);
    }

    struct CannedRunner {
        output: CommandOutput,
        seen: RefCell<Vec<String>>,
    }

    impl CommandRunner for CannedRunner {
        fn run(&self, command: &CommandLine) -> Result<CommandOutput> {
            self.seen.borrow_mut().push(command.to_string());
            Ok(self.output.clone())
        }
    }

    #[test]
    fn detect_runs_lspci_and_filters() {
        let runner = CannedRunner {
            output: CommandOutput {
                exit_code: Some(0),
                stdout: SAMPLE.to_string(),
                stderr: String::new(),
            },
            seen: RefCell::new(Vec::new()),
        };
        let fc = detect_fc_devices(&runner).unwrap();
        assert_eq!(fc.len(), 2);
        assert_eq!(*runner.seen.borrow(), vec!["lspci -D -vv".to_string()]);
    }

    #[test]
    fn lspci_failure_is_discovery_error() {
        let runner = CannedRunner {
            output: CommandOutput {
                exit_code: Some(1),
                stdout: String::new(),
                stderr: "pcilib: cannot open /sys/bus/pci".to_string(),
            },
            seen: RefCell::new(Vec::new()),
        };
        let err = discover_devices(&runner).unwrap_err();
        assert!(matches!(err, PassthroughError::DiscoveryFailed { .. }));
    }
}
