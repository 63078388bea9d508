// PCI passthrough orchestration for the FC passthrough tool
//
// For each selected device: detach it from the host with
// `virsh nodedev-detach`, then attach it to the VM with
// `virsh attach-device` using a hostdev XML written to a temporary file.
// Devices are processed one after another and a failure only affects
// the device it happened on.

use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

use crate::core::command::{CommandLine, CommandRunner};
use crate::error::{PassthroughError, Result};
use crate::pci::address::{DomainPolicy, PciAddress};
use crate::pci::DeviceRecord;
use crate::utils::Reporter;

/// Exit status when some devices failed and the rest were still processed
pub const EXIT_PARTIAL_FAILURE: u8 = 2;

/// Error paired with the workflow step it happened in
type StepResult = std::result::Result<(), (Step, PassthroughError)>;

/// One device to pass through to one VM
#[derive(Debug, Clone)]
pub struct PassthroughRequest {
    pub target_device: DeviceRecord,
    pub vm_name: String,
    pub dry_run: bool,
}

impl PassthroughRequest {
    /// Builds one request per device, in order
    pub fn for_devices(devices: Vec<DeviceRecord>, vm_name: &str, dry_run: bool) -> Vec<Self> {
        devices
            .into_iter()
            .map(|target_device| Self {
                target_device,
                vm_name: vm_name.to_string(),
                dry_run,
            })
            .collect()
    }
}

/// Workflow step a device failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    ParseAddress,
    Detach,
    WriteXml,
    Attach,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Step::ParseAddress => "parse address",
            Step::Detach => "detach",
            Step::WriteXml => "write hostdev XML",
            Step::Attach => "attach",
        };
        write!(f, "{}", name)
    }
}

/// Result of processing one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    Failed { step: Step, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub bus_address: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }
}

/// Outcomes of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub vm_name: String,
    pub dry_run: bool,
    pub outcomes: Vec<Outcome>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    /// Process exit status for the run: `EXIT_PARTIAL_FAILURE` when any
    /// device failed, unless `allow_partial` is set
    pub fn exit_code(&self, allow_partial: bool) -> u8 {
        if self.has_failures() && !allow_partial {
            EXIT_PARTIAL_FAILURE
        } else {
            0
        }
    }
}

/// Options shared by every request in a batch
#[derive(Debug, Clone, Default)]
pub struct PassthroughOptions {
    pub domain_policy: DomainPolicy,
    /// Directory for the hostdev XML files; the system temp dir when unset
    pub temp_dir: Option<PathBuf>,
}

/// Runs detach/attach for a batch of requests
pub struct PassthroughManager<'a> {
    runner: &'a dyn CommandRunner,
    reporter: &'a dyn Reporter,
    options: PassthroughOptions,
}

impl<'a> PassthroughManager<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        reporter: &'a dyn Reporter,
        options: PassthroughOptions,
    ) -> Self {
        Self {
            runner,
            reporter,
            options,
        }
    }

    /// Processes requests strictly in order, one outcome per request.
    /// Nothing is rolled back when a later device fails.
    pub fn execute(&self, requests: &[PassthroughRequest]) -> Vec<Outcome> {
        debug!("Doing passthrough for {} device(s)", requests.len());
        requests.iter().map(|request| self.process(request)).collect()
    }

    /// Builds requests for `devices` and returns the summary of the run
    pub fn run(&self, vm_name: &str, devices: Vec<DeviceRecord>, dry_run: bool) -> RunSummary {
        let requests = PassthroughRequest::for_devices(devices, vm_name, dry_run);
        RunSummary {
            vm_name: vm_name.to_string(),
            dry_run,
            outcomes: self.execute(&requests),
        }
    }

    fn process(&self, request: &PassthroughRequest) -> Outcome {
        let bus_address = request.target_device.bus_address.clone();
        let status = match self.pass_through(request) {
            Ok(()) => {
                self.reporter.success(&format!(
                    "Device {} {} VM '{}'",
                    bus_address,
                    if request.dry_run { "would be attached to" } else { "attached to" },
                    request.vm_name
                ));
                OutcomeStatus::Succeeded
            }
            Err((step, err)) => {
                debug_assert!(err.is_device_scoped(), "run-scoped error in device step: {err}");
                let message = err.to_string();
                error!(device = %bus_address, %step, "Failure: {}", message);
                self.reporter
                    .error(&format!("Device {} failed at {}: {}", bus_address, step, message));
                OutcomeStatus::Failed { step, message }
            }
        };
        Outcome { bus_address, status }
    }

    fn pass_through(&self, request: &PassthroughRequest) -> StepResult {
        let address = PciAddress::parse(&request.target_device.bus_address)
            .map_err(|e| (Step::ParseAddress, e))?;

        let legacy = self.options.domain_policy == DomainPolicy::Legacy;
        if legacy && address.domain_lost_by_legacy_template() {
            self.reporter.warning(&format!(
                "Device {} is on PCI domain {}, but the hostdev XML always requests domain 0x0000 \
                 (use --preserve-domain to keep the real domain)",
                address, address.domain_id
            ));
        }

        self.detach(&address, request.dry_run).map_err(|e| (Step::Detach, e))?;

        let xml = address.render_xml_with(self.options.domain_policy);
        debug!("PCI xml: {}", xml);
        self.attach(&xml, &request.vm_name, request.dry_run)
    }

    /// Detaches the device from the host. Skipped in dry-run mode.
    fn detach(&self, address: &PciAddress, dry_run: bool) -> Result<()> {
        let command = CommandLine::new(
            "virsh",
            ["nodedev-detach".to_string(), address.node_device_name()],
        );

        if dry_run {
            info!("Detach virsh command '{}'", command);
            self.reporter.info(&format!("[DRY RUN] Would execute: {}", command));
            return Ok(());
        }

        info!("Executing: {}", command);
        self.runner.run(&command)?.check(&command)?;
        Ok(())
    }

    /// Writes the hostdev XML to a temporary file and attaches it to the
    /// VM. The file is removed on every path out of this function.
    fn attach(&self, xml: &str, vm_name: &str, dry_run: bool) -> StepResult {
        let temp = self.write_xml(xml).map_err(|e| (Step::WriteXml, e))?;
        let path = temp.path().to_path_buf();
        debug!("Temp file = {}", path.display());

        let command = CommandLine::new(
            "virsh",
            ["attach-device".to_string(), vm_name.to_string(), path.display().to_string()],
        );

        let result = if dry_run {
            info!("Attach Device command '{}'", command);
            self.reporter.info(&format!("[DRY RUN] Would execute: {}", command));
            Ok(())
        } else {
            info!("Executing: {}", command);
            self.runner.run(&command).and_then(|out| out.check(&command)).map(|_| ())
        };

        // Cleanup problems are reported but do not change the attach result
        if let Err(e) = temp.close() {
            let err = PassthroughError::TempResource {
                context: "remove hostdev XML".to_string(),
                path: Some(path.clone()),
                source: e,
            };
            error!(path = %path.display(), "{}", err);
            self.reporter.warning(&err.to_string());
        }

        result.map_err(|e| (Step::Attach, e))
    }

    fn write_xml(&self, xml: &str) -> Result<NamedTempFile> {
        let temp_err = |context: &str, source| PassthroughError::TempResource {
            context: context.to_string(),
            path: self.options.temp_dir.clone(),
            source,
        };

        let mut builder = tempfile::Builder::new();
        builder.prefix("fc-hostdev-").suffix(".xml");
        let mut temp = match &self.options.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| temp_err("create hostdev XML", e))?;

        temp.write_all(xml.as_bytes())
            .and_then(|_| temp.flush())
            .map_err(|e| temp_err("write hostdev XML", e))?;
        Ok(temp)
    }
}
