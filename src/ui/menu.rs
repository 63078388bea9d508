// Numbered device menu for interactive selection

use crate::pci::DeviceRecord;
use crate::ui::colors::{paint, Theme};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Label of the always-present abort entry
pub const ABORT_LABEL: &str = "Abort";

/// Renders FC devices as a numbered menu: `0) Abort` followed by
/// `N) <description> - <bus address>` for each device, 1-based
pub struct DeviceMenu<'a> {
    devices: &'a [DeviceRecord],
    theme: Theme,
    width: usize,
    color: bool,
}

impl<'a> DeviceMenu<'a> {
    /// Create a plain menu limited to `width` columns per entry
    pub fn new(devices: &'a [DeviceRecord], width: usize) -> Self {
        Self {
            devices,
            theme: Theme::default(),
            width,
            color: false,
        }
    }

    /// Enable or disable colored output
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Highest valid menu index
    pub fn max_index(&self) -> usize {
        self.devices.len()
    }

    /// Resolves a menu index: `Some(None)` for abort, `Some(Some(dev))`
    /// for a device, `None` when the index is out of range
    pub fn resolve(&self, index: usize) -> Option<Option<&'a DeviceRecord>> {
        match index {
            0 => Some(None),
            n => self.devices.get(n - 1).map(Some),
        }
    }

    /// Render the menu as a string, one entry per line
    pub fn render(&self) -> String {
        let mut lines = Vec::with_capacity(self.devices.len() + 1);
        lines.push(self.entry(0, ABORT_LABEL, true));

        for (i, device) in self.devices.iter().enumerate() {
            let label = format!("{} - {}", device.description, device.bus_address);
            lines.push(self.entry(i + 1, &label, false));
        }

        lines.join("\n")
    }

    fn entry(&self, index: usize, label: &str, is_abort: bool) -> String {
        let prefix = format!("{}) ", index);
        let available = self.width.saturating_sub(prefix.len());
        let label = truncate(label, available);

        let prefix = paint(&prefix, self.theme.primary, self.color);
        let color = if is_abort { self.theme.muted } else { self.theme.text };
        format!("{}{}", prefix, paint(&label, color, self.color))
    }
}

/// Truncates `text` to `max_width` display columns, marking the cut with "..."
fn truncate(text: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(text) <= max_width {
        return text.to_string();
    }

    let budget = max_width.saturating_sub(3);
    let mut displayable = String::new();
    let mut current_width = 0;
    for c in text.chars() {
        let char_width = c.width().unwrap_or(0);
        if current_width + char_width > budget {
            break;
        }
        displayable.push(c);
        current_width += char_width;
    }
    displayable.push_str("...");
    displayable
}
