// Command line configuration for the FC passthrough tool

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::core::selection::{SelectionMode, DEFAULT_MAX_ATTEMPTS};
use crate::pci::address::DomainPolicy;
use crate::utils::logging::{LogConfig, DEFAULT_LOG_FILE};

/// Enable Fibre Channel HBA PCI passthrough.
/// If a device isn't specified, you will be prompted.
#[derive(Parser, Debug, Clone)]
#[command(name = "fc-passthrough", author, version, about, long_about = None)]
pub struct Args {
    /// The libvirt VM name to give access to the FC device(s). Use "virsh list" to get the name
    #[arg(required_unless_present = "list")]
    pub vmname: Option<String>,

    /// Pass through all discovered FC PCI devices
    #[arg(long = "all", conflicts_with = "device")]
    pub all_devices: bool,

    /// The PCI bus ID of the device you want to pass through to the VM
    /// (lspci -Dv), e.g. 0000:05:00.2
    #[arg(long)]
    pub device: Option<String>,

    /// Do a dry run. Doesn't actually run virsh commands
    #[arg(long)]
    pub trial: bool,

    /// Turn on debug/verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// List discovered FC devices and exit
    #[arg(long)]
    pub list: bool,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Write the device's own PCI domain into the hostdev XML instead of 0x0000
    #[arg(long)]
    pub preserve_domain: bool,

    /// Give up on a virsh/lspci command after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Invalid menu answers allowed before aborting
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_ATTEMPTS as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub max_attempts: u64,

    /// Exit with status 0 even if some devices failed
    #[arg(long)]
    pub allow_partial: bool,

    /// Log file path
    #[arg(
        long,
        value_name = "PATH",
        default_value = DEFAULT_LOG_FILE,
        conflicts_with = "no_log_file"
    )]
    pub log_file: PathBuf,

    /// Don't write a log file
    #[arg(long)]
    pub no_log_file: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// What the run should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Print the discovered FC devices
    List,
    /// Pass devices through to the named VM
    Passthrough { vm_name: String, selection: SelectionMode },
}

/// Validated settings for one invocation
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub action: Action,
    pub dry_run: bool,
    pub json: bool,
    pub domain_policy: DomainPolicy,
    pub command_timeout: Option<Duration>,
    pub max_attempts: usize,
    pub allow_partial: bool,
    pub color: bool,
    pub log: LogConfig,
}

impl From<Args> for RunConfig {
    fn from(args: Args) -> Self {
        let action = match (args.list, args.vmname) {
            (true, _) | (false, None) => Action::List,
            (false, Some(vm_name)) => {
                let selection = if args.all_devices {
                    SelectionMode::All
                } else if let Some(device) = args.device {
                    SelectionMode::Explicit(device)
                } else {
                    SelectionMode::Interactive
                };
                Action::Passthrough { vm_name, selection }
            }
        };

        let color = !args.no_color;
        RunConfig {
            action,
            dry_run: args.trial,
            json: args.json,
            domain_policy: if args.preserve_domain {
                DomainPolicy::Preserve
            } else {
                DomainPolicy::Legacy
            },
            command_timeout: args.timeout.map(Duration::from_secs),
            max_attempts: usize::try_from(args.max_attempts).unwrap_or(usize::MAX),
            allow_partial: args.allow_partial,
            color,
            log: LogConfig {
                verbose: args.verbose,
                file: (!args.no_log_file).then_some(args.log_file),
                color,
            },
        }
    }
}

impl RunConfig {
    pub fn from_args() -> Self {
        Args::parse().into()
    }
}
