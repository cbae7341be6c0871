//! Integration tests for the bring-up core
//!
//! These tests walk through complete bring-up workflows combining:
//! - Descriptor reading from a fake sysfs tree
//! - Platform registration and lookup
//! - Driver setup through a bring-up context
//! - Register polling with a retry policy

use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::time::Duration;

use bringup_core::*;

#[derive(Debug)]
struct PlatformA {
    drivers: Vec<KernelDriver>,
}

impl Platform for PlatformA {
    fn name(&self) -> &str {
        "PlatformA"
    }

    fn drivers(&self) -> &[KernelDriver] {
        &self.drivers
    }
}

#[derive(Debug)]
struct PlatformB {
    drivers: Vec<KernelDriver>,
}

impl Platform for PlatformB {
    fn name(&self) -> &str {
        "PlatformB"
    }

    fn drivers(&self) -> &[KernelDriver] {
        &self.drivers
    }
}

fn platform_a() -> Box<dyn Platform> {
    Box::new(PlatformA {
        drivers: vec![KernelDriver::new("eeprom")],
    })
}

fn platform_b() -> Box<dyn Platform> {
    Box::new(PlatformB {
        drivers: vec![
            KernelDriver::new("eeprom"),
            KernelDriver::new("i2c-dev"),
            KernelDriver::new("rook-fan-cpld"),
        ],
    })
}

fn test_registry() -> PlatformRegistry {
    let mut registry = PlatformRegistry::new();
    registry.register("DCS-001", platform_a);
    registry.register("DCS-002", platform_b);
    registry
}

fn fake_sysfs(root: &Path, addr: &str, descriptor: &str) {
    let dir = root.join(addr);
    fs::create_dir_all(&dir).expect("Failed to create sysfs dir");
    fs::write(dir.join("eeprom"), descriptor).expect("Failed to write eeprom");
}

fn hardware_reader(root: &Path) -> DescriptorReader {
    DescriptorReader::new(ExecutionMode::new(Environment::Real, false))
        .with_modules(Box::new(SimulatedModules::new()))
        .with_sysfs_root(root)
}

/// Test detection and construction of the platform named by the descriptor
#[test]
fn test_get_detected_platform() {
    let sysfs = tempfile::tempdir().expect("Failed to create temp dir");
    fake_sysfs(sysfs.path(), "1-0052", "SKU: DCS-002\nSerialNumber: JPE0001\n");

    let reader = hardware_reader(sysfs.path());
    let registry = test_registry();

    assert_eq!(registry.detect(&reader).expect("Failed to detect"), "DCS-002");

    let first = registry.get(None, &reader).expect("Failed to get platform");
    let second = registry.get(None, &reader).expect("Failed to get platform");

    assert_eq!(first.name(), "PlatformB");
    assert_eq!(second.name(), "PlatformB");

    // Every call builds a new object graph
    assert!(!std::ptr::addr_eq(first.as_ref(), second.as_ref()));
}

/// Test that an unregistered SKU stops bring-up
#[test]
fn test_unknown_detected_platform() {
    let sysfs = tempfile::tempdir().expect("Failed to create temp dir");
    fake_sysfs(sysfs.path(), "1-0052", "SKU: DCS-999\n");

    let reader = hardware_reader(sysfs.path());
    let result = test_registry().get(None, &reader);

    assert!(matches!(result, Err(BringupError::UnknownPlatform { sku }) if sku == "DCS-999"));
}

/// Test that missing hardware is reported as such
#[test]
fn test_missing_descriptor_halts_bring_up() {
    let sysfs = tempfile::tempdir().expect("Failed to create temp dir");
    let reader = hardware_reader(sysfs.path());

    assert!(matches!(
        test_registry().get(None, &reader),
        Err(BringupError::HardwareNotFound)
    ));
}

/// Test full simulated bring-up: descriptor, lookup, setup and clean
#[test]
fn test_simulated_bring_up() {
    let mode = ExecutionMode::simulated();
    let reader = DescriptorReader::new(mode).with_sysfs_root("/nonexistent");

    let mut registry = test_registry();
    registry.register(SIMULATION_SKU, platform_b);

    let platform = registry.get(None, &reader).expect("Failed to get platform");
    let ctx = BringupContext::new(mode).with_modules(Box::new(SimulatedModules::new()));

    platform.setup(&ctx).expect("Failed to set up platform");
    for driver in platform.drivers() {
        assert!(
            driver.loaded(ctx.modules()).expect("Failed to read module state"),
            "{} should be loaded",
            driver
        );
    }

    platform.clean(&ctx);
    for driver in platform.drivers() {
        assert!(
            !driver.loaded(ctx.modules()).expect("Failed to read module state"),
            "{} should be unloaded",
            driver
        );
    }
}

/// Test driver setup order and teardown order
#[test]
fn test_setup_and_clean_order() {
    #[derive(Default)]
    struct Recorder {
        log: RefCell<Vec<String>>,
        modules: SimulatedModules,
    }

    impl ModuleControl for Recorder {
        fn is_loaded(&self, name: &str) -> Result<bool> {
            self.modules.is_loaded(name)
        }

        fn insert(&self, name: &str, args: &[String]) -> Result<()> {
            self.log.borrow_mut().push(format!("+{name}"));
            self.modules.insert(name, args)
        }

        fn remove(&self, name: &str) -> Result<()> {
            self.log.borrow_mut().push(format!("-{name}"));
            self.modules.remove(name)
        }
    }

    let recorder = Recorder::default();
    let platform = platform_b();

    for driver in platform.drivers() {
        driver.setup(&recorder).expect("Failed to set up driver");
    }
    for driver in platform.drivers().iter().rev() {
        driver.clean(&recorder);
    }

    assert_eq!(
        *recorder.log.borrow(),
        vec![
            "+eeprom",
            "+i2c-dev",
            "+rook-fan-cpld",
            "-rook-fan-cpld",
            "-i2c-dev",
            "-eeprom",
        ]
    );
}

/// Test polling a register until a status bit is set
#[test]
fn test_poll_register_until_ready() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("resource0");
    fs::write(&path, vec![0u8; 0x100]).expect("Failed to create register file");

    const STATUS: usize = 0x40;
    const READY: u32 = 1 << 0;

    let mut window = RegisterWindow::new(&path);
    let mut guard = window.acquire().expect("Failed to map registers");

    let ready = Retrying::new(Some(Duration::from_secs(1)), Duration::from_millis(1))
        .until(|attempt| {
            // The "device" raises the bit on the third poll
            if attempt == 3 {
                guard.update32(STATUS, READY, true).expect("Failed to write status");
            }
            guard.read32(STATUS).expect("Failed to read status") & READY != 0
        });

    assert!(ready);
    drop(guard);
    assert!(!window.is_mapped());

    let bytes = fs::read(&path).expect("Failed to read register file");
    assert_eq!(bytes[STATUS], 1);
}

/// Test that a failed register poll is just an exhausted sequence
#[test]
fn test_poll_register_times_out() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("resource0");
    fs::write(&path, vec![0u8; 16]).expect("Failed to create register file");

    let regs = MappedRegisters;
    let mut attempts = 0;
    let ready = Retrying::new(None, Duration::ZERO)
        .max_attempts(4)
        .until(|_| {
            attempts += 1;
            regs.read32(&path, 0).expect("Failed to read") != 0
        });

    assert!(!ready);
    assert_eq!(attempts, 4);
}
