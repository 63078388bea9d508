// Logging setup
//
// Configured once at process start. Everything goes to the log file;
// the console only gets log lines in verbose mode.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as fmt_layer, EnvFilter};

use crate::error::{PassthroughError, Result};

/// Default log file, relative to the working directory
pub const DEFAULT_LOG_FILE: &str = "pci_passthrough.log";

/// Logging options resolved from the command line
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub verbose: bool,
    pub file: Option<PathBuf>,
    pub color: bool,
}

impl LogConfig {
    /// `debug` when verbose, `info` otherwise
    pub fn level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

/// Local wall-clock timestamps, e.g. `2024-05-01 13:37:00`
struct LocalTime;

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Keeps the background log writer alive; drop it last
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Installs the global subscriber. `RUST_LOG` overrides the level.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level()));

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            let layer = fmt_layer::layer()
                .with_timer(LocalTime)
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = config.verbose.then(|| {
        fmt_layer::layer()
            .with_timer(LocalTime)
            .with_ansi(config.color)
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| PassthroughError::Logging(e.to_string()))?;

    Ok(LoggingGuard { _file: guard })
}

fn file_writer(path: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path.file_name().ok_or_else(|| {
        PassthroughError::Logging(format!("log path {} has no file name", path.display()))
    })?;

    fs::create_dir_all(&dir)
        .map_err(|e| PassthroughError::Logging(format!("cannot create {}: {}", dir.display(), e)))?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}
