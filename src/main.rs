use std::io;
use std::process::ExitCode;

use anyhow::Context;
use fc_passthrough::config::{Action, RunConfig};
use fc_passthrough::core::command::SystemCommandRunner;
use fc_passthrough::core::passthrough::{
    OutcomeStatus, PassthroughManager, PassthroughOptions, RunSummary,
};
use fc_passthrough::core::selection::{DeviceSelector, PromptOptions, SelectionMode};
use fc_passthrough::pci::detection::detect_fc_devices;
use fc_passthrough::pci::DeviceRecord;
use fc_passthrough::ui;
use fc_passthrough::utils::logging::init_logging;
use fc_passthrough::utils::{ConsoleReporter, Reporter};
use fc_passthrough::PassthroughError;

fn main() -> ExitCode {
    let config = RunConfig::from_args();
    let reporter = ConsoleReporter::new(config.color);

    // Held until exit so buffered log lines are flushed
    let _guard = match init_logging(&config.log) {
        Ok(guard) => guard,
        Err(e) => {
            reporter.error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };
    // Verbose mode echoes error events to stderr through the log layer
    let reporter = reporter.with_console_log(config.log.verbose);

    match run(&config, &reporter) {
        Ok(code) => code,
        Err(e) => {
            let reported = e
                .downcast_ref::<PassthroughError>()
                .map_or(false, PassthroughError::is_reported);
            if !reported {
                reporter.error(&format!("{:#}", e));
            }
            ExitCode::FAILURE
        }
    }
}

fn run(config: &RunConfig, reporter: &dyn Reporter) -> anyhow::Result<ExitCode> {
    tracing::debug!("fc-passthrough {}", fc_passthrough::VERSION);

    let runner = SystemCommandRunner::with_timeout(config.command_timeout);
    let fc_devices = detect_fc_devices(&runner).context("cannot list PCI devices")?;

    match &config.action {
        Action::List => {
            list_devices(&fc_devices, config.json)?;
            Ok(ExitCode::SUCCESS)
        }
        Action::Passthrough { vm_name, selection } => {
            let summary = passthrough(config, reporter, &runner, vm_name, selection, &fc_devices)?;
            print_summary(&summary, config.json, reporter)?;
            Ok(ExitCode::from(summary.exit_code(config.allow_partial)))
        }
    }
}

fn passthrough(
    config: &RunConfig,
    reporter: &dyn Reporter,
    runner: &SystemCommandRunner,
    vm_name: &str,
    selection: &SelectionMode,
    fc_devices: &[DeviceRecord],
) -> anyhow::Result<RunSummary> {
    let prompt = PromptOptions {
        max_attempts: config.max_attempts,
        width: ui::terminal_width(),
        color: config.color,
    };
    let stdin = io::stdin();
    let mut selector = DeviceSelector::new(stdin.lock(), io::stdout(), prompt, reporter);
    let devices = selector.select(selection, fc_devices)?;

    if config.dry_run {
        reporter.info("Trial run: virsh commands will only be logged");
    }

    let manager = PassthroughManager::new(
        runner,
        reporter,
        PassthroughOptions {
            domain_policy: config.domain_policy,
            temp_dir: None,
        },
    );
    Ok(manager.run(vm_name, devices, config.dry_run))
}

/// Prints "All" followed by every FC bus address, one per line
fn list_devices(fc_devices: &[DeviceRecord], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(fc_devices)?);
        return Ok(());
    }
    if !fc_devices.is_empty() {
        println!("All");
    }
    for device in fc_devices {
        println!("{}", device.bus_address);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, json: bool, reporter: &dyn Reporter) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    let failed: Vec<&str> = summary
        .outcomes
        .iter()
        .filter(|o| matches!(o.status, OutcomeStatus::Failed { .. }))
        .map(|o| o.bus_address.as_str())
        .collect();
    if !failed.is_empty() {
        reporter.error(&format!("Failed device(s): {}", failed.join(", ")));
    }

    let line = format!(
        "{} of {} device(s) passed through to '{}'{}",
        summary.succeeded(),
        summary.outcomes.len(),
        summary.vm_name,
        if summary.dry_run { " (trial run)" } else { "" }
    );
    if summary.has_failures() {
        reporter.warning(&line);
    } else {
        reporter.success(&line);
    }
    Ok(())
}
