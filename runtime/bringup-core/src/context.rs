//! Bring-up Context - Hardware capabilities for the current mode
//!
//! Platforms never ask whether they run simulated. They receive a context
//! whose module and register capabilities already match the mode.

use crate::kmod::{module_control, ModuleControl};
use crate::mmio::{MappedRegisters, RegisterAccess, SimulatedRegisters};
use crate::mode::ExecutionMode;

/// Capabilities handed to platform setup and clean
pub struct BringupContext {
    mode: ExecutionMode,
    modules: Box<dyn ModuleControl>,
    registers: Box<dyn RegisterAccess>,
}

impl BringupContext {
    /// Select capabilities for `mode`
    pub fn new(mode: ExecutionMode) -> Self {
        let registers: Box<dyn RegisterAccess> = if mode.is_simulated() {
            Box::new(SimulatedRegisters)
        } else {
            Box::new(MappedRegisters)
        };

        Self {
            mode,
            modules: module_control(mode),
            registers,
        }
    }

    pub fn with_modules(mut self, modules: Box<dyn ModuleControl>) -> Self {
        self.modules = modules;
        self
    }

    pub fn with_registers(mut self, registers: Box<dyn RegisterAccess>) -> Self {
        self.registers = registers;
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn modules(&self) -> &dyn ModuleControl {
        self.modules.as_ref()
    }

    pub fn registers(&self) -> &dyn RegisterAccess {
        self.registers.as_ref()
    }
}
