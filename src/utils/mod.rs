// Utility functions for the FC passthrough tool

pub mod logging;

use std::cell::RefCell;
use std::io::{self, Write};

use crate::ui::colors::{paint, Theme};

/// Severity of an operator-facing message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

/// Operator-facing output.
///
/// Components receive a reporter instead of printing, so every message
/// can be both shown to the operator and written to the log.
pub trait Reporter {
    fn report(&self, level: Level, message: &str);

    fn info(&self, message: &str) {
        self.report(Level::Info, message);
    }

    fn success(&self, message: &str) {
        self.report(Level::Success, message);
    }

    fn warning(&self, message: &str) {
        self.report(Level::Warning, message);
    }

    fn error(&self, message: &str) {
        self.report(Level::Error, message);
    }
}

/// Prints styled messages to the terminal and mirrors them into the log
#[derive(Debug, Clone)]
pub struct ConsoleReporter {
    theme: Theme,
    color: bool,
    console_log: bool,
}

impl ConsoleReporter {
    pub fn new(color: bool) -> Self {
        Self {
            theme: Theme::default(),
            color,
            console_log: false,
        }
    }

    /// Set when the logging setup already echoes events to stderr
    pub fn with_console_log(mut self, console_log: bool) -> Self {
        self.console_log = console_log;
        self
    }

    /// Whether a message at `level` is printed directly. Errors go through
    /// the console log layer instead when it is active.
    pub fn prints(&self, level: Level) -> bool {
        !(self.console_log && level == Level::Error)
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, level: Level, message: &str) {
        let (tag, color) = match level {
            Level::Info => ("INFO", self.theme.accent),
            Level::Success => ("SUCCESS", self.theme.success),
            Level::Warning => ("WARNING", self.theme.warning),
            Level::Error => ("ERROR", self.theme.error),
        };
        let line = format!("{}: {}", paint(tag, color, self.color), message);

        match level {
            Level::Info => tracing::info!("{}", message),
            Level::Success => tracing::info!("{}", message),
            Level::Warning => tracing::warn!("{}", message),
            Level::Error => tracing::error!("{}", message),
        }

        // A closed stdout/stderr is not worth failing a device over
        if !self.prints(level) {
            return;
        }
        if level == Level::Error {
            let _ = writeln!(io::stderr(), "{}", line);
        } else {
            let _ = writeln!(io::stdout(), "{}", line);
        }
    }
}

/// Keeps messages in memory; used by tests and embedding callers
#[derive(Debug, Default)]
pub struct MemoryReporter {
    messages: RefCell<Vec<(Level, String)>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(Level, String)> {
        self.messages.borrow().clone()
    }

    /// Messages reported at `level`
    pub fn at(&self, level: Level) -> Vec<String> {
        self.messages
            .borrow()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, level: Level, message: &str) {
        self.messages.borrow_mut().push((level, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_reporter_records_levels() {
        let reporter = MemoryReporter::new();
        reporter.info("Using device 0000:05:00.2");
        reporter.error("Failed to detach device");
        reporter.warning("domain mismatch");

        assert_eq!(reporter.messages().len(), 3);
        assert_eq!(reporter.at(Level::Error), vec!["Failed to detach device".to_string()]);
        assert!(reporter.at(Level::Success).is_empty());
    }

    #[test]
    fn console_log_layer_takes_over_errors() {
        let plain = ConsoleReporter::new(false);
        assert!(plain.prints(Level::Error));

        let verbose = ConsoleReporter::new(false).with_console_log(true);
        assert!(!verbose.prints(Level::Error));
        assert!(verbose.prints(Level::Warning));
        assert!(verbose.prints(Level::Info));
    }
}
