// Error types for the FC passthrough tool
//
// Device-scoped errors are caught by the orchestrator and turned into a
// per-device outcome. Run-scoped errors unwind to the entry point.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PassthroughError>;

/// Everything that can go wrong while discovering or passing through devices.
#[derive(Error, Debug)]
pub enum PassthroughError {
    #[error("Malformed PCI bus address '{address}': {reason}")]
    MalformedAddress { address: String, reason: String },

    #[error("Command '{command}' failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Command '{command}' did not finish within {timeout:?}")]
    CommandTimedOut { command: String, timeout: Duration },

    #[error("Failed to execute '{command}': {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("No valid FC device selected")]
    NoDeviceSelected,

    #[error("Temporary file error ({context}): {source}")]
    TempResource {
        context: String,
        path: Option<PathBuf>,
        #[source]
        source: io::Error,
    },

    #[error("PCI device discovery failed: {reason}")]
    DiscoveryFailed { reason: String },

    #[error("Failed to read operator selection: {0}")]
    Prompt(#[from] io::Error),

    #[error("Failed to initialise logging: {0}")]
    Logging(String),
}

impl PassthroughError {
    /// True for errors that only affect the device being processed.
    pub fn is_device_scoped(&self) -> bool {
        matches!(
            self,
            PassthroughError::MalformedAddress { .. }
                | PassthroughError::CommandFailed { .. }
                | PassthroughError::CommandTimedOut { .. }
                | PassthroughError::CommandSpawn { .. }
                | PassthroughError::TempResource { .. }
        )
    }

    /// True when the operator has already been told about this error at
    /// the point it was raised, so the entry point should not repeat it.
    pub fn is_reported(&self) -> bool {
        matches!(self, PassthroughError::NoDeviceSelected)
    }
}
