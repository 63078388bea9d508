// FC Passthrough
//
// Discovers Fibre Channel HBAs with lspci and passes them through to
// libvirt virtual machines with virsh

pub mod config;

// Detach/attach workflow and device selection
pub mod core;

pub mod error;

// PCI inventory parsing and bus addresses
pub mod pci;

// Operator-facing output
pub mod ui;

// Logging and reporting
pub mod utils;

pub use error::{PassthroughError, Result};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
