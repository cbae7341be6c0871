//! Drivers every platform needs

use bringup_core::descriptor::EEPROM_DRIVER;
use bringup_core::KernelDriver;

/// Userspace i2c access
pub const I2C_DEV_DRIVER: &str = "i2c-dev";

/// Descriptor EEPROM and i2c device drivers
pub fn base_drivers() -> Vec<KernelDriver> {
    vec![
        KernelDriver::new(EEPROM_DRIVER),
        KernelDriver::new(I2C_DEV_DRIVER),
    ]
}
