//! Platform Registry - SKU to platform lookup
//!
//! Platforms are registered under the SKUs they ship as, by an explicit
//! bootstrap call, before any lookup. [`PlatformRegistry::get`] builds a new
//! platform object on every call.
//!
//! Registering a SKU twice keeps the later constructor.

use std::collections::HashMap;
use std::fmt;

use crate::context::BringupContext;
use crate::descriptor::DescriptorSource;
use crate::driver::KernelDriver;
use crate::{BringupError, Result};

/// A hardware platform
pub trait Platform: fmt::Debug {
    /// Human-readable platform name
    fn name(&self) -> &str;

    /// Kernel drivers in load order
    fn drivers(&self) -> &[KernelDriver];

    /// Load every driver in order
    fn setup(&self, ctx: &BringupContext) -> Result<()> {
        setup_drivers(self.drivers(), ctx)
    }

    /// Unload every driver in reverse order
    fn clean(&self, ctx: &BringupContext) {
        clean_drivers(self.drivers(), ctx)
    }

    /// Named status lines and whether each is asserted
    fn gpio_status(&self, _ctx: &BringupContext) -> Result<Vec<(&'static str, bool)>> {
        Ok(Vec::new())
    }
}

/// Load `drivers` in order, stopping at the first failure
pub fn setup_drivers(drivers: &[KernelDriver], ctx: &BringupContext) -> Result<()> {
    for driver in drivers {
        log::debug!("setup {}", driver);
        driver.setup(ctx.modules())?;
    }
    Ok(())
}

/// Unload `drivers` in reverse order
pub fn clean_drivers(drivers: &[KernelDriver], ctx: &BringupContext) {
    for driver in drivers.iter().rev() {
        log::debug!("clean {}", driver);
        driver.clean(ctx.modules());
    }
}

/// Platform constructor
pub type PlatformCtor = fn() -> Box<dyn Platform>;

/// SKU to platform constructor map
#[derive(Default)]
pub struct PlatformRegistry {
    platforms: HashMap<String, PlatformCtor>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `ctor` under `sku`
    ///
    /// An existing registration for `sku` is replaced.
    // TODO: decide whether duplicate SKUs should be rejected instead of replaced
    pub fn register(&mut self, sku: impl Into<String>, ctor: PlatformCtor) {
        let sku = sku.into();
        if self.platforms.insert(sku.clone(), ctor).is_some() {
            log::debug!("platform {} registered again, keeping the latest", sku);
        }
    }

    /// Register `ctor` under every SKU in `skus`
    pub fn register_all<I, S>(&mut self, skus: I, ctor: PlatformCtor)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for sku in skus {
            self.register(sku, ctor);
        }
    }

    /// Look up the constructor for `sku`
    ///
    /// # Errors
    /// Returns `UnknownPlatform` if `sku` has no registration
    pub fn resolve(&self, sku: &str) -> Result<PlatformCtor> {
        self.platforms
            .get(sku)
            .copied()
            .ok_or_else(|| BringupError::UnknownPlatform {
                sku: sku.to_string(),
            })
    }

    /// SKU of the running hardware
    pub fn detect(&self, source: &dyn DescriptorSource) -> Result<String> {
        Ok(source.descriptor()?.sku().to_string())
    }

    /// Build the platform for `sku`, or for the detected SKU
    pub fn get(&self, sku: Option<&str>, source: &dyn DescriptorSource) -> Result<Box<dyn Platform>> {
        let sku = match sku {
            Some(sku) => sku.to_string(),
            None => self.detect(source)?,
        };

        let ctor = self.resolve(&sku)?;
        log::debug!("platform for {}", sku);
        Ok(ctor())
    }

    /// Registered SKUs, sorted
    pub fn skus(&self) -> Vec<&str> {
        let mut skus: Vec<&str> = self.platforms.keys().map(String::as_str).collect();
        skus.sort_unstable();
        skus
    }

    pub fn contains(&self, sku: &str) -> bool {
        self.platforms.contains_key(sku)
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }
}

impl fmt::Debug for PlatformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformRegistry")
            .field("skus", &self.skus())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::PlatformDescriptor;

    #[derive(Debug)]
    struct Named {
        name: &'static str,
        drivers: Vec<KernelDriver>,
    }

    impl Platform for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn drivers(&self) -> &[KernelDriver] {
            &self.drivers
        }
    }

    fn first() -> Box<dyn Platform> {
        Box::new(Named {
            name: "first",
            drivers: Vec::new(),
        })
    }

    fn second() -> Box<dyn Platform> {
        Box::new(Named {
            name: "second",
            drivers: vec![KernelDriver::new("eeprom"), KernelDriver::new("i2c-dev")],
        })
    }

    struct Fixed(PlatformDescriptor);

    impl DescriptorSource for Fixed {
        fn descriptor(&self) -> Result<&PlatformDescriptor> {
            Ok(&self.0)
        }
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = PlatformRegistry::new();
        match registry.resolve("DCS-0000") {
            Err(BringupError::UnknownPlatform { sku }) => assert_eq!(sku, "DCS-0000"),
            other => panic!("expected UnknownPlatform, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_last_registration_wins() {
        let mut registry = PlatformRegistry::new();
        registry.register("DCS-001", first);
        registry.register("DCS-001", second);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("DCS-001").unwrap()().name(), "second");
    }

    #[test]
    fn test_register_all() {
        let mut registry = PlatformRegistry::new();
        registry.register_all(["B", "A", "C"], first);

        assert_eq!(registry.skus(), vec!["A", "B", "C"]);
        assert!(registry.contains("B"));
        assert!(!registry.contains("D"));
    }

    #[test]
    fn test_get_explicit_sku_skips_detection() {
        let mut registry = PlatformRegistry::new();
        registry.register("DCS-001", first);

        let source = Fixed(PlatformDescriptor::simulated());
        assert_eq!(registry.get(Some("DCS-001"), &source).unwrap().name(), "first");
        assert!(matches!(
            registry.get(None, &source),
            Err(BringupError::UnknownPlatform { .. })
        ));
    }

    #[test]
    fn test_default_setup_and_clean() {
        use crate::kmod::SimulatedModules;
        use crate::mode::ExecutionMode;

        let ctx = BringupContext::new(ExecutionMode::simulated())
            .with_modules(Box::new(SimulatedModules::new()));
        let platform = second();

        platform.setup(&ctx).unwrap();
        assert!(platform.drivers().iter().all(|d| d.loaded(ctx.modules()).unwrap()));

        platform.clean(&ctx);
        assert!(platform.drivers().iter().all(|d| !d.loaded(ctx.modules()).unwrap()));
    }
}
