//! Platforms - Switch platform definitions
//!
//! # Purpose
//! Describes each supported switch platform: the kernel drivers it needs and
//! the register blocks its setup touches. Every platform is registered under
//! the SKUs it ships as.
//!
//! # Integration Points
//! - Depends on: bringup-core
//! - Provides to: bring-up tooling
//!
//! # Architecture
//! [`registry`] builds the process-wide registry once, from the explicit
//! list in [`register_platforms`]. Lookups never happen before that list has
//! run.

pub mod base;
pub mod rook;
pub mod scd;
pub mod simulation;

use std::sync::OnceLock;

use bringup_core::{PlatformRegistry, SIMULATION_SKU};

pub use rook::Alhambra;
pub use scd::{NamedGpio, PciAddr, ResetGpio, Scd};
pub use simulation::Simulation;

static REGISTRY: OnceLock<PlatformRegistry> = OnceLock::new();

/// Register every known platform
pub fn register_platforms(registry: &mut PlatformRegistry) {
    registry.register(SIMULATION_SKU, Simulation::create);
    registry.register_all(rook::ALHAMBRA_SKUS.iter().copied(), Alhambra::create);
}

/// Process-wide platform registry
pub fn registry() -> &'static PlatformRegistry {
    REGISTRY.get_or_init(|| {
        let mut registry = PlatformRegistry::new();
        register_platforms(&mut registry);
        log::debug!("{} platforms registered", registry.len());
        registry
    })
}
