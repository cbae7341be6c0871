//! Kernel Modules - Idempotent driver load and unload
//!
//! [`DriverHandle`] names a kernel module and loads or unloads it through a
//! [`ModuleControl`] capability. Loading a module that is already present,
//! or unloading one that is absent, succeeds without touching the system.
//!
//! The handle never checks the execution mode itself. The caller picks the
//! capability: [`Modprobe`] on real hardware, [`SimulatedModules`] otherwise.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

use crate::mode::ExecutionMode;
use crate::{BringupError, Result};

/// Loaded module list
pub const PROC_MODULES: &str = "/proc/modules";

/// Extra argument enabling dynamic debug output for a module
pub const DYNDBG_ARG: &str = "dyndbg=+pf";

/// Kernel module names use `_` where packaging uses `-`
pub fn module_name(name: &str) -> String {
    name.replace('-', "_")
}

/// Kernel module control capability
pub trait ModuleControl {
    /// Check whether `name` is currently loaded
    ///
    /// # Errors
    /// Returns `ModuleList` when the loaded module list cannot be read
    fn is_loaded(&self, name: &str) -> Result<bool>;

    /// Insert `name` with module arguments
    ///
    /// # Errors
    /// Returns `DriverLoad` when the kernel rejects the module
    fn insert(&self, name: &str, args: &[String]) -> Result<()>;

    /// Remove `name`
    ///
    /// # Errors
    /// Returns `DriverUnload` when the module is busy or removal is rejected
    fn remove(&self, name: &str) -> Result<()>;
}

/// Module control matching `mode`: `modprobe` on hardware, logging otherwise
pub fn module_control(mode: ExecutionMode) -> Box<dyn ModuleControl> {
    if mode.is_simulated() {
        Box::new(SimulatedModules::new())
    } else {
        Box::new(Modprobe::new().with_debug(mode.is_debug()))
    }
}

/// Real module control through `modprobe`
#[derive(Debug, Clone)]
pub struct Modprobe {
    program: PathBuf,
    proc_modules: PathBuf,
    debug: bool,
}

impl Modprobe {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("modprobe"),
            proc_modules: PathBuf::from(PROC_MODULES),
            debug: false,
        }
    }

    /// Use a different `modprobe` binary
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Read the loaded module list from a different file
    pub fn with_proc_modules(mut self, path: impl Into<PathBuf>) -> Self {
        self.proc_modules = path.into();
        self
    }

    /// Append `dyndbg=+pf` to every load
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    fn load_args(&self, name: &str, args: &[String]) -> Vec<String> {
        let mut argv = vec![module_name(name)];
        argv.extend(args.iter().cloned());
        if self.debug {
            argv.push(DYNDBG_ARG.to_string());
        }
        argv
    }

    fn run(&self, argv: &[String]) -> std::result::Result<(), String> {
        log::debug!("exec: {} {}", self.program.display(), argv.join(" "));

        let output = Command::new(&self.program)
            .args(argv)
            .output()
            .map_err(|e| format!("cannot run {}: {}", self.program.display(), e))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(failure_reason(&output))
        }
    }
}

impl Default for Modprobe {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleControl for Modprobe {
    fn is_loaded(&self, name: &str) -> Result<bool> {
        let modules =
            fs::read_to_string(&self.proc_modules).map_err(|source| BringupError::ModuleList {
                path: self.proc_modules.clone(),
                source,
            })?;

        let prefix = format!("{} ", module_name(name));
        Ok(modules.lines().any(|line| line.starts_with(&prefix)))
    }

    fn insert(&self, name: &str, args: &[String]) -> Result<()> {
        self.run(&self.load_args(name, args))
            .map_err(|reason| BringupError::DriverLoad {
                name: name.to_string(),
                reason,
            })
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.run(&["-r".to_string(), module_name(name)])
            .map_err(|reason| BringupError::DriverUnload {
                name: name.to_string(),
                reason,
            })
    }
}

fn failure_reason(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        output.status.to_string()
    } else {
        stderr.to_string()
    }
}

/// Simulated module control
///
/// Logs each operation and tracks which modules it has "loaded", so
/// load/unload sequences behave the same as on hardware.
#[derive(Debug, Default)]
pub struct SimulatedModules {
    loaded: RefCell<BTreeSet<String>>,
}

impl SimulatedModules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Modules currently marked as loaded
    pub fn loaded(&self) -> Vec<String> {
        self.loaded.borrow().iter().cloned().collect()
    }
}

impl ModuleControl for SimulatedModules {
    fn is_loaded(&self, name: &str) -> Result<bool> {
        Ok(self.loaded.borrow().contains(&module_name(name)))
    }

    fn insert(&self, name: &str, args: &[String]) -> Result<()> {
        log::debug!("exec: modprobe {} {}", module_name(name), args.join(" "));
        self.loaded.borrow_mut().insert(module_name(name));
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        log::debug!("exec: modprobe -r {}", module_name(name));
        self.loaded.borrow_mut().remove(&module_name(name));
        Ok(())
    }
}

/// Kernel driver identified by module name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DriverHandle {
    name: String,
}

impl DriverHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_loaded(&self, modules: &dyn ModuleControl) -> Result<bool> {
        modules.is_loaded(&self.name)
    }

    /// Load the driver; succeeds if it is already loaded
    pub fn load(&self, modules: &dyn ModuleControl) -> Result<()> {
        self.load_with(modules, &[])
    }

    /// Load the driver with module arguments
    ///
    /// Arguments are ignored when the module is already loaded.
    ///
    /// # Errors
    /// Returns `DriverLoad` if the module state cannot be read or the kernel
    /// rejects the module
    pub fn load_with(&self, modules: &dyn ModuleControl, args: &[String]) -> Result<()> {
        let loaded = modules.is_loaded(&self.name).map_err(|e| BringupError::DriverLoad {
            name: self.name.clone(),
            reason: e.to_string(),
        })?;
        if loaded {
            log::debug!("module {} already loaded", self.name);
            return Ok(());
        }

        log::debug!("loading module {}", self.name);
        modules.insert(&self.name, args)
    }

    /// Unload the driver; succeeds if it is not loaded
    ///
    /// # Errors
    /// Returns `DriverUnload` if the module state cannot be read or removal
    /// is rejected
    pub fn unload(&self, modules: &dyn ModuleControl) -> Result<()> {
        let loaded = modules.is_loaded(&self.name).map_err(|e| BringupError::DriverUnload {
            name: self.name.clone(),
            reason: e.to_string(),
        })?;
        if !loaded {
            log::debug!("module {} is not loaded", self.name);
            return Ok(());
        }

        log::debug!("unloading module {}", self.name);
        modules.remove(&self.name)
    }
}

impl fmt::Display for DriverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
