//! Rook CPLD platforms
//!
//! Alhambra is the 64-port 100G system built around the Rook fan and LED
//! CPLDs, with an SCD on PCI bus 6 and a second SCD acting as system CPLD.

use std::path::PathBuf;

use bringup_core::registry::{clean_drivers, setup_drivers};
use bringup_core::{BringupContext, KernelDriver, Platform, Result};

use crate::base::base_drivers;
use crate::scd::{NamedGpio, PciAddr, ResetGpio, Scd};

/// SKUs sold as Alhambra
pub const ALHAMBRA_SKUS: &[&str] = &["DCS-7170-64", "DCS-7170-64C", "DCS-7170-64C-SSD"];

/// Reset control register of the Alhambra SCD
pub const RESET_REG: usize = 0x4000;

/// PSU status register of the Alhambra SCD
pub const PSU_REG: usize = 0x5000;

/// Number of power supply slots
pub const PSU_COUNT: u8 = 2;

/// DCS-7170-64 family
#[derive(Debug)]
pub struct Alhambra {
    drivers: Vec<KernelDriver>,
    scd: Scd,
    cpld: Scd,
}

impl Alhambra {
    pub fn new() -> Self {
        let mut drivers = base_drivers();
        drivers.push(KernelDriver::new("rook-fan-cpld"));
        drivers.push(KernelDriver::new("rook-led-driver"));

        let mut scd = Scd::new(PciAddr::bus(0x06));
        scd.add_resets([
            ResetGpio::new(RESET_REG, 8, false, "switch_chip_reset"),
            ResetGpio::new(RESET_REG, 1, false, "security_chip_reset"),
            ResetGpio::new(RESET_REG, 0, false, "repeater_sfp_reset"),
        ]);
        scd.add_gpios([
            NamedGpio::new(PSU_REG, 0, false, "psu1_present"),
            NamedGpio::new(PSU_REG, 1, false, "psu2_present"),
            NamedGpio::new(PSU_REG, 8, false, "psu1_status"),
            NamedGpio::new(PSU_REG, 9, false, "psu2_status"),
            NamedGpio::new(PSU_REG, 10, false, "psu1_ac_status"),
            NamedGpio::new(PSU_REG, 11, false, "psu2_ac_status"),
        ]);

        let cpld = Scd::new(PciAddr::new(0xff, 0x0b, 3));

        Self { drivers, scd, cpld }
    }

    pub fn create() -> Box<dyn Platform> {
        Box::new(Self::new())
    }

    /// Look for both SCDs under `root` instead of sysfs
    pub fn with_pci_root(mut self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        self.scd = self.scd.with_pci_root(root.clone());
        self.cpld = self.cpld.with_pci_root(root);
        self
    }

    pub fn scd(&self) -> &Scd {
        &self.scd
    }

    pub fn cpld(&self) -> &Scd {
        &self.cpld
    }

    /// Whether a supply sits in slot `psu` (1-based)
    pub fn psu_present(&self, ctx: &BringupContext, psu: u8) -> Result<bool> {
        let name = format!("psu{}_present", psu);
        Ok(self.scd.read_gpio(ctx, &name)?.unwrap_or(false))
    }
}

impl Default for Alhambra {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for Alhambra {
    fn name(&self) -> &str {
        "Alhambra"
    }

    fn drivers(&self) -> &[KernelDriver] {
        &self.drivers
    }

    fn setup(&self, ctx: &BringupContext) -> Result<()> {
        setup_drivers(&self.drivers, ctx)?;
        self.scd.setup(ctx)?;
        self.cpld.setup(ctx)
    }

    fn clean(&self, ctx: &BringupContext) {
        self.cpld.clean(ctx);
        self.scd.clean(ctx);
        clean_drivers(&self.drivers, ctx);
    }

    fn gpio_status(&self, ctx: &BringupContext) -> Result<Vec<(&'static str, bool)>> {
        self.scd.read_gpios(ctx)
    }
}
