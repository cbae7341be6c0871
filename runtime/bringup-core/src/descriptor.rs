//! System Descriptor - Platform identity from the descriptor EEPROM
//!
//! Every platform carries an EEPROM on its i2c bus holding identity fields
//! (SKU, serial number, MAC base, ...). The kernel `eeprom` driver exposes
//! it through sysfs. This module finds the first readable descriptor among a
//! fixed list of bus addresses, decodes it, and caches the result.
//!
//! Decoding the on-EEPROM format belongs to a [`DescriptorDecoder`]; the
//! only requirement imposed here is that the decoded fields carry a `SKU`.
//!
//! # Caching
//! A reader decodes at most once. Later calls return the cached fields even
//! if the hardware has changed since.

use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::kmod::{module_control, DriverHandle, ModuleControl};
use crate::mode::ExecutionMode;
use crate::{BringupError, Result};

/// Descriptor field identifying the platform model
pub const SKU_KEY: &str = "SKU";

/// SKU reported in simulation
pub const SIMULATION_SKU: &str = "simulation";

/// Driver exposing the descriptor EEPROM
pub const EEPROM_DRIVER: &str = "eeprom";

/// Sysfs directory of the eeprom driver's devices
pub const EEPROM_SYSFS_ROOT: &str = "/sys/bus/i2c/drivers/eeprom";

/// Bus addresses probed for a descriptor, highest priority first
pub const DEFAULT_CANDIDATES: &[&str] = &["1-0052"];

static SYSTEM_DESCRIPTOR: OnceLock<PlatformDescriptor> = OnceLock::new();

/// Decoded descriptor fields
///
/// Always contains a `SKU` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDescriptor {
    fields: BTreeMap<String, String>,
}

impl PlatformDescriptor {
    /// Wrap decoded fields
    ///
    /// # Errors
    /// Returns `Decode` if there is no `SKU` field
    pub fn new(fields: BTreeMap<String, String>) -> Result<Self> {
        if !fields.contains_key(SKU_KEY) {
            return Err(BringupError::Decode {
                detail: format!("descriptor has no {} field", SKU_KEY),
            });
        }
        Ok(Self { fields })
    }

    /// The fixed descriptor used in simulation
    pub fn simulated() -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(SKU_KEY.to_string(), SIMULATION_SKU.to_string());
        Self { fields }
    }

    pub fn sku(&self) -> &str {
        &self.fields[SKU_KEY]
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn check(&self) {
        assert!(
            self.fields.contains_key(SKU_KEY),
            "cached descriptor has no {} field",
            SKU_KEY
        );
    }
}

/// Descriptor format decoder
pub trait DescriptorDecoder {
    /// Decode a raw descriptor into string fields
    fn decode(&self, input: &mut dyn Read) -> Result<BTreeMap<String, String>>;
}

/// Decoder for the textual `Key: Value` dump of a descriptor
///
/// Lines without a `:` are ignored. Keys and values are trimmed.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyValueDecoder;

impl DescriptorDecoder for KeyValueDecoder {
    fn decode(&self, input: &mut dyn Read) -> Result<BTreeMap<String, String>> {
        let mut raw = Vec::new();
        input.read_to_end(&mut raw).map_err(|e| BringupError::Decode {
            detail: e.to_string(),
        })?;
        let text = String::from_utf8(raw).map_err(|e| BringupError::Decode {
            detail: format!("descriptor is not text: {}", e),
        })?;

        let fields: BTreeMap<String, String> = text
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .filter(|(key, _)| !key.is_empty())
            .collect();

        if fields.is_empty() {
            return Err(BringupError::Decode {
                detail: "descriptor has no fields".to_string(),
            });
        }
        Ok(fields)
    }
}

/// Anything that can produce the platform descriptor
pub trait DescriptorSource {
    fn descriptor(&self) -> Result<&PlatformDescriptor>;
}

/// Descriptor reader with a per-reader cache
pub struct DescriptorReader {
    mode: ExecutionMode,
    modules: Box<dyn ModuleControl>,
    decoder: Box<dyn DescriptorDecoder>,
    sysfs_root: PathBuf,
    candidates: Vec<String>,
    cache: OnceCell<PlatformDescriptor>,
}

impl DescriptorReader {
    /// Reader for the standard sysfs location
    ///
    /// Module control follows `mode`: `modprobe` on real hardware, logging
    /// only in simulation.
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            modules: module_control(mode),
            decoder: Box::new(KeyValueDecoder),
            sysfs_root: PathBuf::from(EEPROM_SYSFS_ROOT),
            candidates: DEFAULT_CANDIDATES.iter().map(|s| s.to_string()).collect(),
            cache: OnceCell::new(),
        }
    }

    pub fn with_modules(mut self, modules: Box<dyn ModuleControl>) -> Self {
        self.modules = modules;
        self
    }

    pub fn with_decoder(mut self, decoder: Box<dyn DescriptorDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    pub fn with_candidates<I, S>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.candidates = candidates.into_iter().map(Into::into).collect();
        self
    }

    /// Path of the descriptor file for a bus address
    pub fn candidate_path(&self, addr: &str) -> PathBuf {
        self.sysfs_root.join(addr).join("eeprom")
    }

    /// Read the descriptor, decoding it on first use
    ///
    /// # Errors
    /// - `DriverLoad` if the eeprom driver cannot be loaded
    /// - `HardwareNotFound` if no candidate decodes
    pub fn read_descriptor(&self) -> Result<&PlatformDescriptor> {
        if let Some(descriptor) = self.cache.get() {
            descriptor.check();
            return Ok(descriptor);
        }

        let descriptor = self.load()?;
        Ok(self.cache.get_or_init(|| descriptor))
    }

    fn load(&self) -> Result<PlatformDescriptor> {
        if self.mode.is_simulated() {
            log::debug!("bypass descriptor reading by returning default values");
            return Ok(PlatformDescriptor::simulated());
        }

        DriverHandle::new(EEPROM_DRIVER).load(self.modules.as_ref())?;

        for addr in &self.candidates {
            let path = self.candidate_path(addr);
            if !path.exists() {
                continue;
            }

            match self.decode_at(&path) {
                Ok(descriptor) => return Ok(descriptor),
                Err(e) => {
                    log::warn!("could not obtain descriptor from {}", path.display());
                    log::warn!("error seen: {}", e);
                }
            }
        }

        Err(BringupError::HardwareNotFound)
    }

    fn decode_at(&self, path: &Path) -> Result<PlatformDescriptor> {
        log::debug!("reading system eeprom from {}", path.display());

        let mut file = File::open(path).map_err(|e| BringupError::Decode {
            detail: format!("cannot open {}: {}", path.display(), e),
        })?;
        let fields = self.decoder.decode(&mut file)?;
        PlatformDescriptor::new(fields)
    }
}

impl DescriptorSource for DescriptorReader {
    fn descriptor(&self) -> Result<&PlatformDescriptor> {
        self.read_descriptor()
    }
}

/// Process-wide descriptor
///
/// Decoded once, using the process-wide [`ExecutionMode`], and kept for the
/// life of the process.
pub fn system_descriptor() -> Result<&'static PlatformDescriptor> {
    if let Some(descriptor) = SYSTEM_DESCRIPTOR.get() {
        descriptor.check();
        return Ok(descriptor);
    }

    let reader = DescriptorReader::new(ExecutionMode::current()?);
    let descriptor = reader.read_descriptor()?.clone();
    Ok(SYSTEM_DESCRIPTOR.get_or_init(|| descriptor))
}

/// [`DescriptorSource`] backed by [`system_descriptor`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDescriptor;

impl DescriptorSource for SystemDescriptor {
    fn descriptor(&self) -> Result<&PlatformDescriptor> {
        system_descriptor()
    }
}
