//! Kernel Drivers - Platform driver setup and teardown
//!
//! A [`KernelDriver`] is a module the platform needs, plus the arguments it
//! loads with and, optionally, a file the driver creates once it is ready.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::kmod::{DriverHandle, ModuleControl};
use crate::retry::{Retrying, DEFAULT_DELAY, DEFAULT_INTERVAL};
use crate::Result;

/// Kernel module required by a platform
#[derive(Debug, Clone)]
pub struct KernelDriver {
    handle: DriverHandle,
    args: Vec<String>,

    /// File that appears once the driver has probed
    wait_file: Option<PathBuf>,

    /// How long to wait for `wait_file`
    wait_timeout: Duration,
}

impl KernelDriver {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            handle: DriverHandle::new(module),
            args: Vec::new(),
            wait_file: None,
            wait_timeout: DEFAULT_INTERVAL,
        }
    }

    /// Module arguments passed on load
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Wait for `path` to exist after loading, for up to `timeout`
    pub fn wait_for(mut self, path: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        self.wait_file = Some(path.into());
        self.wait_timeout = timeout.unwrap_or(DEFAULT_INTERVAL);
        self
    }

    pub fn module(&self) -> &str {
        self.handle.name()
    }

    pub fn handle(&self) -> &DriverHandle {
        &self.handle
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn wait_file(&self) -> Option<&Path> {
        self.wait_file.as_deref()
    }

    pub fn loaded(&self, modules: &dyn ModuleControl) -> Result<bool> {
        self.handle.is_loaded(modules)
    }

    /// Load the module and wait for its ready file
    ///
    /// A ready file that never appears is logged, not returned as an error;
    /// dependent drivers report their own failures.
    pub fn setup(&self, modules: &dyn ModuleControl) -> Result<()> {
        self.handle.load_with(modules, &self.args)?;
        self.wait_file_ready();
        Ok(())
    }

    /// Unload the module, logging failures
    pub fn clean(&self, modules: &dyn ModuleControl) {
        if let Err(e) = self.handle.unload(modules) {
            log::error!("Failed to unload {}: {}", self.handle, e);
        }
    }

    /// Returns whether the ready file exists, `true` when none is configured
    pub fn wait_file_ready(&self) -> bool {
        let Some(wait_file) = &self.wait_file else {
            return true;
        };

        log::debug!("Starting driver. Waiting file {}.", wait_file.display());

        let ready = Retrying::new(Some(self.wait_timeout), DEFAULT_DELAY).until(|attempt| {
            let exists = wait_file.exists();
            if !exists {
                log::debug!(
                    "Starting driver. Waiting file {} attempt {}.",
                    wait_file.display(),
                    attempt
                );
            }
            exists
        });

        if !ready && !wait_file.exists() {
            log::error!("Starting driver. Waiting file {} failed.", wait_file.display());
            return false;
        }
        true
    }
}

impl fmt::Display for KernelDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KernelDriver({})", self.handle)
    }
}
