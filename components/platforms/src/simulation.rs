//! Platform reported when running without hardware

use bringup_core::{KernelDriver, Platform};

use crate::base::base_drivers;

#[derive(Debug)]
pub struct Simulation {
    drivers: Vec<KernelDriver>,
}

impl Simulation {
    pub fn new() -> Self {
        Self {
            drivers: base_drivers(),
        }
    }

    pub fn create() -> Box<dyn Platform> {
        Box::new(Self::new())
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for Simulation {
    fn name(&self) -> &str {
        "Simulation"
    }

    fn drivers(&self) -> &[KernelDriver] {
        &self.drivers
    }
}
