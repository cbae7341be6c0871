//! Execution Mode - Real hardware vs. simulation
//!
//! The bootloader adds `Aboot` to the kernel command line when the system
//! runs on real hardware. Any other environment (a developer machine, a
//! container, CI) runs in simulation, where hardware operations are logged
//! instead of performed.
//!
//! The mode is computed once per process and never recomputed.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use crate::{BringupError, Result};

/// Kernel command line
pub const CMDLINE_PATH: &str = "/proc/cmdline";

/// Token added by the bootloader on real hardware
pub const ABOOT_TOKEN: &str = "Aboot";

/// Token enabling verbose driver tracing
pub const DEBUG_TOKEN: &str = "arista-debug";

static MODE: OnceLock<ExecutionMode> = OnceLock::new();

/// Parsed kernel command line
///
/// Bare flags map to `None`, `key=value` tokens map to `Some(value)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootParams {
    entries: BTreeMap<String, Option<String>>,
}

impl BootParams {
    /// Parse a whitespace-separated command line
    ///
    /// Only the first `=` of a token splits key from value. A key given
    /// twice keeps its last value.
    pub fn parse(cmdline: &str) -> Self {
        let entries = cmdline
            .split_whitespace()
            .map(|token| match token.split_once('=') {
                Some((key, value)) => (key.to_string(), Some(value.to_string())),
                None => (token.to_string(), None),
            })
            .collect();

        Self { entries }
    }

    /// Read and parse a command line file
    ///
    /// # Errors
    /// Returns `BootParams` if the file cannot be read
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| BringupError::BootParams {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self::parse(&raw))
    }

    /// Check whether a flag or key is present
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Value of a `key=value` token
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(|value| value.as_deref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where hardware operations go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Running under the bootloader on real hardware
    Real,

    /// No hardware; operations are logged and skipped
    Simulated,
}

/// Process-wide execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionMode {
    environment: Environment,
    debug: bool,
}

impl ExecutionMode {
    pub const fn new(environment: Environment, debug: bool) -> Self {
        Self { environment, debug }
    }

    /// Simulated mode without debug tracing
    pub const fn simulated() -> Self {
        Self::new(Environment::Simulated, false)
    }

    /// Derive the mode from boot parameters
    pub fn from_params(params: &BootParams) -> Self {
        let environment = if params.contains(ABOOT_TOKEN) {
            Environment::Real
        } else {
            Environment::Simulated
        };

        Self::new(environment, params.contains(DEBUG_TOKEN))
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn is_simulated(&self) -> bool {
        self.environment == Environment::Simulated
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Process-wide mode, read from `/proc/cmdline` on first use
    ///
    /// # Errors
    /// An unreadable command line is fatal for bring-up: the process cannot
    /// tell real hardware from simulation.
    pub fn current() -> Result<Self> {
        Self::init_from(CMDLINE_PATH)
    }

    /// Process-wide mode, read from `path` on first use
    ///
    /// Once the mode is set, later calls return it and ignore `path`.
    pub fn init_from(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(mode) = MODE.get() {
            return Ok(*mode);
        }

        let mode = Self::from_params(&BootParams::read(path)?);
        Ok(*MODE.get_or_init(|| mode))
    }

    /// Set the process-wide mode explicitly
    ///
    /// Must happen before anything calls [`ExecutionMode::current`].
    ///
    /// # Errors
    /// Returns `ModeAlreadySet` if the mode was already computed or installed
    pub fn install(self) -> Result<()> {
        MODE.set(self).map_err(|_| BringupError::ModeAlreadySet)
    }
}
