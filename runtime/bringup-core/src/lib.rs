//! Bring-up Core - Hardware identification and access for switch platforms
//!
//! # Purpose
//! Identifies the platform a process is running on from its descriptor
//! EEPROM, brings up the kernel drivers that platform needs, and gives
//! drivers scoped access to memory-mapped register files.
//!
//! # Integration Points
//! - Depends on: Linux sysfs, `modprobe`, `/proc/cmdline`, `/dev/kmsg`
//! - Provides to: Platform definitions, bring-up tooling
//! - External collaborators: descriptor decoder (see [`DescriptorDecoder`])
//!
//! # Architecture
//! The [`ExecutionMode`] is computed once from the kernel command line and
//! selects, through a [`BringupContext`], whether module and register
//! operations touch real hardware or are logged and skipped. Platforms are
//! looked up by SKU in a [`PlatformRegistry`]; the SKU itself comes from the
//! [`DescriptorReader`].
//!
//! # Testing Strategy
//! - Unit tests: boot parameter parsing, window bounds, retry bounds
//! - Integration tests: fake sysfs trees and register files in temp dirs
//! - Hardware sim tests: simulated execution mode end to end

pub mod context;
pub mod descriptor;
pub mod driver;
pub mod klog;
pub mod kmod;
pub mod mmio;
pub mod mode;
pub mod registry;
pub mod retry;

pub use context::BringupContext;
pub use descriptor::{
    system_descriptor, DescriptorDecoder, DescriptorReader, DescriptorSource, KeyValueDecoder,
    PlatformDescriptor, SystemDescriptor, SIMULATION_SKU, SKU_KEY,
};
pub use driver::KernelDriver;
pub use klog::klog;
pub use kmod::{DriverHandle, ModuleControl, Modprobe, SimulatedModules};
pub use mmio::{MappedRegisters, RegisterAccess, RegisterWindow, SimulatedRegisters, WindowGuard};
pub use mode::{BootParams, Environment, ExecutionMode, CMDLINE_PATH};
pub use registry::{Platform, PlatformCtor, PlatformRegistry};
pub use retry::Retrying;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error types for bring-up operations
#[derive(Debug, Error)]
pub enum BringupError {
    #[error("Could not find valid system descriptor")]
    HardwareNotFound,

    #[error("Unknown platform: {sku}")]
    UnknownPlatform { sku: String },

    #[error("Failed to load driver {name}: {reason}")]
    DriverLoad { name: String, reason: String },

    #[error("Failed to unload driver {name}: {reason}")]
    DriverUnload { name: String, reason: String },

    #[error("Cannot read loaded module list {}: {source}", path.display())]
    ModuleList {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to mmap {}: {source}", path.display())]
    Map {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Register access at {offset:#x} out of bounds (window size {size:#x})")]
    OutOfBounds { offset: usize, size: usize },

    #[error("Register access at {offset:#x} is not 4-byte aligned")]
    Misaligned { offset: usize },

    #[error("Register window is not mapped")]
    NotMapped,

    #[error("Register window is already mapped")]
    AlreadyMapped,

    #[error("Cannot read boot parameters from {}: {source}", path.display())]
    BootParams {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Execution mode already initialized")]
    ModeAlreadySet,

    #[error("Descriptor decode error: {detail}")]
    Decode { detail: String },
}

pub type Result<T> = std::result::Result<T, BringupError>;
