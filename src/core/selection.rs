// Device selection for the FC passthrough tool
//
// Resolves what the operator asked for (one bus address, a menu choice,
// or every FC device) into the list of devices to pass through.

use std::io::{BufRead, Write};

use tracing::{debug, info};

use crate::error::{PassthroughError, Result};
use crate::pci::DeviceRecord;
use crate::ui::menu::DeviceMenu;
use crate::utils::Reporter;

/// Default number of invalid menu answers tolerated before giving up
pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

const PROMPT: &str = "Select which FC device you want to use: ";

/// How the operator picked devices
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionMode {
    /// A bus address given on the command line
    Explicit(String),
    /// Ask on the terminal
    Interactive,
    /// Every discovered FC device
    All,
}

/// Options for the interactive menu
#[derive(Debug, Clone)]
pub struct PromptOptions {
    pub max_attempts: usize,
    pub width: usize,
    pub color: bool,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            width: 80,
            color: false,
        }
    }
}

/// Finds the FC device with the given bus address. If several match,
/// the last one wins.
pub fn find_device<'a>(
    device_id: &str,
    fc_devices: &'a [DeviceRecord],
) -> Option<&'a DeviceRecord> {
    fc_devices
        .iter()
        .filter(|dev| dev.bus_address == device_id)
        .last()
}

/// Shows the numbered menu and reads answers until a valid index is
/// given. Returns `None` on abort (`0`), end of input, or after
/// `options.max_attempts` invalid answers.
pub fn prompt_device<'a, R, W>(
    fc_devices: &'a [DeviceRecord],
    input: &mut R,
    output: &mut W,
    options: &PromptOptions,
) -> Result<Option<&'a DeviceRecord>>
where
    R: BufRead,
    W: Write,
{
    let menu = DeviceMenu::new(fc_devices, options.width).with_color(options.color);
    writeln!(output, "{}", menu.render())?;

    for attempt in 1..=options.max_attempts {
        write!(output, "{}", PROMPT)?;
        output.flush()?;

        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            debug!("Input closed before a device was selected");
            return Ok(None);
        }
        let answer = answer.trim();

        match answer.parse::<usize>().ok().and_then(|idx| menu.resolve(idx)) {
            Some(choice) => return Ok(choice),
            None => {
                debug!(attempt, answer, "Invalid menu selection");
                writeln!(
                    output,
                    "Invalid selection '{}'. Enter a number between 0 and {}.",
                    answer,
                    menu.max_index()
                )?;
            }
        }
    }

    writeln!(output, "Too many invalid selections.")?;
    Ok(None)
}

/// Resolves operator intent against the discovered FC devices
pub struct DeviceSelector<'r, R, W> {
    input: R,
    output: W,
    options: PromptOptions,
    reporter: &'r dyn Reporter,
}

impl<'r, R: BufRead, W: Write> DeviceSelector<'r, R, W> {
    pub fn new(input: R, output: W, options: PromptOptions, reporter: &'r dyn Reporter) -> Self {
        Self {
            input,
            output,
            options,
            reporter,
        }
    }

    /// Returns the devices to process. An explicit id that matches nothing
    /// or an aborted menu is `NoDeviceSelected`; all mode on a host without
    /// FC devices yields an empty list.
    pub fn select(
        &mut self,
        mode: &SelectionMode,
        fc_devices: &[DeviceRecord],
    ) -> Result<Vec<DeviceRecord>> {
        let selected = match mode {
            SelectionMode::All => {
                info!("Selecting all {} FC device(s)", fc_devices.len());
                if fc_devices.is_empty() {
                    self.reporter.warning("No Fibre Channel devices found");
                }
                fc_devices.to_vec()
            }
            SelectionMode::Explicit(device_id) => match find_device(device_id, fc_devices) {
                Some(device) => vec![device.clone()],
                None => {
                    self.reporter.error(&format!(
                        "{} is not a discovered Fibre Channel device",
                        device_id
                    ));
                    return Err(self.abort());
                }
            },
            SelectionMode::Interactive => {
                let choice =
                    prompt_device(fc_devices, &mut self.input, &mut self.output, &self.options)?;
                match choice {
                    Some(device) => vec![device.clone()],
                    None => return Err(self.abort()),
                }
            }
        };

        for device in &selected {
            self.reporter.info(&format!("Using device {}", device.bus_address));
        }
        Ok(selected)
    }

    fn abort(&self) -> PassthroughError {
        self.reporter.error("No valid FC device selected. Aborting");
        PassthroughError::NoDeviceSelected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{Level, MemoryReporter};
    use std::io::Cursor;

    fn fc(addr: &str, description: &str) -> DeviceRecord {
        DeviceRecord {
            bus_address: addr.into(),
            device_class: "Fibre Channel".into(),
            description: description.into(),
            ..Default::default()
        }
    }

    fn devices() -> Vec<DeviceRecord> {
        vec![fc("0000:05:00.0", "Emulex"), fc("0000:06:00.1", "QLogic")]
    }

    fn selector<'r>(
        reporter: &'r MemoryReporter,
        answers: &str,
    ) -> DeviceSelector<'r, Cursor<Vec<u8>>, Vec<u8>> {
        DeviceSelector::new(
            Cursor::new(answers.as_bytes().to_vec()),
            Vec::new(),
            PromptOptions::default(),
            reporter,
        )
    }

    fn prompt(answers: &str, max_attempts: usize) -> (Option<String>, String) {
        let devs = devices();
        let mut input = Cursor::new(answers.as_bytes().to_vec());
        let mut output = Vec::new();
        let options = PromptOptions {
            max_attempts,
            ..Default::default()
        };
        let picked = prompt_device(&devs, &mut input, &mut output, &options)
            .unwrap()
            .map(|d| d.bus_address.clone());
        (picked, String::from_utf8(output).unwrap())
    }

    #[test]
    fn explicit_id_finds_matching_device() {
        let devs = devices();
        let dev = find_device("0000:06:00.1", &devs).unwrap();
        assert_eq!(dev.description, "QLogic");
        assert!(find_device("0000:09:00.0", &devs).is_none());
    }

    #[test]
    fn explicit_id_last_duplicate_wins() {
        let devs = vec![fc("0000:05:00.0", "first"), fc("0000:05:00.0", "second")];
        assert_eq!(find_device("0000:05:00.0", &devs).unwrap().description, "second");
    }

    #[test]
    fn prompt_returns_chosen_device() {
        let (picked, output) = prompt("2\n", 3);
        assert_eq!(picked.as_deref(), Some("0000:06:00.1"));
        assert!(output
            .starts_with("0) Abort\n1) Emulex - 0000:05:00.0\n2) QLogic - 0000:06:00.1\n"));
    }

    #[test]
    fn prompt_abort_returns_none() {
        assert_eq!(prompt("0\n", 3).0, None);
    }

    #[test]
    fn prompt_reprompts_on_invalid_input() {
        let (picked, output) = prompt("abc\n7\n\n1\n", 10);
        assert_eq!(picked.as_deref(), Some("0000:05:00.0"));
        assert_eq!(output.matches(PROMPT).count(), 4);
        assert_eq!(output.matches("Invalid selection").count(), 3);
    }

    #[test]
    fn prompt_gives_up_after_max_attempts() {
        let (picked, output) = prompt("9\n9\n9\n1\n", 3);
        assert_eq!(picked, None);
        assert!(output.contains("Too many invalid selections."));
    }

    #[test]
    fn prompt_end_of_input_is_abort() {
        assert_eq!(prompt("", 3).0, None);
    }

    #[test]
    fn selector_all_returns_every_device_in_order() {
        let reporter = MemoryReporter::new();
        let mut selector = selector(&reporter, "");
        let picked = selector.select(&SelectionMode::All, &devices()).unwrap();
        assert_eq!(picked, devices());
    }

    #[test]
    fn selector_unknown_id_is_fatal() {
        let reporter = MemoryReporter::new();
        let mut selector = selector(&reporter, "");
        let err = selector
            .select(&SelectionMode::Explicit("0000:99:00.0".into()), &devices())
            .unwrap_err();
        assert!(matches!(err, PassthroughError::NoDeviceSelected));
        assert_eq!(reporter.at(Level::Error).len(), 2);
    }

    #[test]
    fn selector_interactive_uses_prompt() {
        let reporter = MemoryReporter::new();
        let mut selector = selector(&reporter, "1\n");
        let picked = selector.select(&SelectionMode::Interactive, &devices()).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].bus_address, "0000:05:00.0");
        assert_eq!(reporter.at(Level::Info), vec!["Using device 0000:05:00.0".to_string()]);
    }

    #[test]
    fn selector_all_with_no_devices_is_empty() {
        let reporter = MemoryReporter::new();
        let mut selector = selector(&reporter, "");
        let picked = selector.select(&SelectionMode::All, &[]).unwrap();
        assert!(picked.is_empty());
        assert!(reporter.at(Level::Error).is_empty());
        assert_eq!(reporter.at(Level::Warning), vec!["No Fibre Channel devices found".to_string()]);
    }

    #[test]
    fn selector_interactive_abort_is_fatal() {
        let reporter = MemoryReporter::new();
        let mut selector = selector(&reporter, "0\n");
        let err = selector.select(&SelectionMode::Interactive, &devices()).unwrap_err();
        assert!(matches!(err, PassthroughError::NoDeviceSelected));
        assert_eq!(reporter.at(Level::Error).len(), 1);
    }
}
