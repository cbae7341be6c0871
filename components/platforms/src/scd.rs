//! SCD - System control device register block
//!
//! The SCD is a PCI FPGA that owns board-level controls such as reset lines.
//! Its registers are exposed through the PCI `resource0` file and accessed
//! through the context's [`RegisterAccess`] capability.

use std::fmt;
use std::path::PathBuf;

use bringup_core::mmio::RegisterAccess;
use bringup_core::{BringupContext, KernelDriver, Result};

/// Sysfs directory of PCI devices
pub const PCI_SYSFS_ROOT: &str = "/sys/bus/pci/devices";

/// PCI device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PciAddr {
    pub domain: u16,
    pub bus: u8,
    pub device: u8,
    pub func: u8,
}

impl PciAddr {
    /// Function 0 of device 0 on `bus`
    pub const fn bus(bus: u8) -> Self {
        Self {
            domain: 0,
            bus,
            device: 0,
            func: 0,
        }
    }

    pub const fn new(bus: u8, device: u8, func: u8) -> Self {
        Self {
            domain: 0,
            bus,
            device,
            func,
        }
    }
}

impl fmt::Display for PciAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.func
        )
    }
}

/// Reset line driven by one register bit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetGpio {
    /// Register offset
    pub addr: usize,

    /// Bit within the register
    pub bit: u32,

    /// Reset is asserted by clearing the bit
    pub active_low: bool,

    pub name: &'static str,
}

impl ResetGpio {
    pub const fn new(addr: usize, bit: u32, active_low: bool, name: &'static str) -> Self {
        Self {
            addr,
            bit,
            active_low,
            name,
        }
    }

    pub fn mask(&self) -> u32 {
        1 << self.bit
    }

    /// Put the device behind this line into reset
    pub fn reset_in(&self, regs: &dyn RegisterAccess, resource: &std::path::Path) -> Result<u32> {
        regs.update32(resource, self.addr, self.mask(), !self.active_low)
    }

    /// Take the device behind this line out of reset
    pub fn reset_out(&self, regs: &dyn RegisterAccess, resource: &std::path::Path) -> Result<u32> {
        regs.update32(resource, self.addr, self.mask(), self.active_low)
    }
}

/// Named status line read from one register bit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedGpio {
    /// Register offset
    pub addr: usize,

    /// Bit within the register
    pub bit: u32,

    /// The line is asserted when the bit is clear
    pub active_low: bool,

    pub name: &'static str,
}

impl NamedGpio {
    pub const fn new(addr: usize, bit: u32, active_low: bool, name: &'static str) -> Self {
        Self {
            addr,
            bit,
            active_low,
            name,
        }
    }

    /// Whether the line is asserted
    pub fn read(&self, regs: &dyn RegisterAccess, resource: &std::path::Path) -> Result<bool> {
        let value = regs.read32(resource, self.addr)?;
        Ok((value & (1 << self.bit) != 0) != self.active_low)
    }
}

/// System control device
#[derive(Debug, Clone)]
pub struct Scd {
    addr: PciAddr,
    driver: KernelDriver,
    resets: Vec<ResetGpio>,
    gpios: Vec<NamedGpio>,
    pci_root: PathBuf,
}

impl Scd {
    pub fn new(addr: PciAddr) -> Self {
        Self {
            addr,
            driver: KernelDriver::new("scd"),
            resets: Vec::new(),
            gpios: Vec::new(),
            pci_root: PathBuf::from(PCI_SYSFS_ROOT),
        }
    }

    /// Look for PCI devices under `root` instead of sysfs
    pub fn with_pci_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.pci_root = root.into();
        self
    }

    pub fn add_resets(&mut self, resets: impl IntoIterator<Item = ResetGpio>) {
        self.resets.extend(resets);
    }

    pub fn add_gpios(&mut self, gpios: impl IntoIterator<Item = NamedGpio>) {
        self.gpios.extend(gpios);
    }

    pub fn addr(&self) -> PciAddr {
        self.addr
    }

    pub fn driver(&self) -> &KernelDriver {
        &self.driver
    }

    pub fn resets(&self) -> &[ResetGpio] {
        &self.resets
    }

    pub fn gpios(&self) -> &[NamedGpio] {
        &self.gpios
    }

    /// State of the GPIO called `name`, `None` if there is no such GPIO
    pub fn read_gpio(&self, ctx: &BringupContext, name: &str) -> Result<Option<bool>> {
        match self.gpios.iter().find(|gpio| gpio.name == name) {
            Some(gpio) => gpio.read(ctx.registers(), &self.resource_path()).map(Some),
            None => Ok(None),
        }
    }

    /// State of every GPIO, in declaration order
    pub fn read_gpios(&self, ctx: &BringupContext) -> Result<Vec<(&'static str, bool)>> {
        let resource = self.resource_path();
        self.gpios
            .iter()
            .map(|gpio| Ok((gpio.name, gpio.read(ctx.registers(), &resource)?)))
            .collect()
    }

    /// Register file of BAR 0
    pub fn resource_path(&self) -> PathBuf {
        self.pci_root.join(self.addr.to_string()).join("resource0")
    }

    /// Assert every reset line
    pub fn reset_in(&self, ctx: &BringupContext) -> Result<()> {
        let resource = self.resource_path();
        for reset in &self.resets {
            log::debug!("{}: reset in {}", self.addr, reset.name);
            reset.reset_in(ctx.registers(), &resource)?;
        }
        Ok(())
    }

    /// Release every reset line
    pub fn reset_out(&self, ctx: &BringupContext) -> Result<()> {
        let resource = self.resource_path();
        for reset in &self.resets {
            log::debug!("{}: reset out {}", self.addr, reset.name);
            reset.reset_out(ctx.registers(), &resource)?;
        }
        Ok(())
    }

    /// Load the driver, then release resets
    pub fn setup(&self, ctx: &BringupContext) -> Result<()> {
        self.driver.setup(ctx.modules())?;
        self.reset_out(ctx)
    }

    /// Assert resets, then unload the driver
    pub fn clean(&self, ctx: &BringupContext) {
        if let Err(e) = self.reset_in(ctx) {
            log::error!("{}: failed to put devices in reset: {}", self.addr, e);
        }
        self.driver.clean(ctx.modules());
    }
}
