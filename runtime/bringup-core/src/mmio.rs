//! MMIO Windows - Scoped mapping of register files
//!
//! Hardware register blocks are exposed by the kernel as fixed-size files
//! (PCI `resourceN` files, for example). A [`RegisterWindow`] maps the whole
//! file read-write and shared, and offers little-endian 32-bit accesses.
//!
//! # Lifetime
//! A window is either mapped or not. Mapping twice without a release fails
//! with `AlreadyMapped`; accesses outside a mapping fail with `NotMapped`.
//! Every access is a single volatile 32-bit load or store at a 4-byte
//! aligned offset.
//! [`RegisterWindow::acquire`] returns a guard that releases the mapping
//! when it goes out of scope, on every exit path.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::ptr;

use memmap2::{MmapMut, MmapOptions};

use crate::{BringupError, Result};

/// Width of a register access in bytes
pub const REGISTER_WIDTH: usize = 4;

/// Mapping of one register file
#[derive(Debug)]
pub struct RegisterWindow {
    path: PathBuf,
    map: Option<MmapMut>,
}

impl RegisterWindow {
    /// Create an unmapped window over `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            map: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_mapped(&self) -> bool {
        self.map.is_some()
    }

    /// Size of the mapped region, 0 when unmapped
    pub fn size(&self) -> usize {
        self.map.as_ref().map_or(0, |map| map.len())
    }

    /// Map the whole backing file
    ///
    /// The file descriptor is closed before returning, on success and on
    /// every failure; the mapping stays valid without it.
    ///
    /// # Errors
    /// - `AlreadyMapped` if the window is mapped
    /// - `Map` if the file cannot be opened, stat'd or mapped
    pub fn map(&mut self) -> Result<()> {
        if self.map.is_some() {
            return Err(BringupError::AlreadyMapped);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| self.map_error("open", e))?;

        let size = file
            .metadata()
            .map_err(|e| self.map_error("stat", e))?
            .len();
        let size = usize::try_from(size)
            .map_err(|_| self.map_error("size", io::Error::from(io::ErrorKind::InvalidData)))?;

        // SAFETY: the mapping is only accessed through bounds-checked,
        // aligned volatile loads and stores of single registers.
        let map = unsafe { MmapOptions::new().len(size).map_mut(&file) }
            .map_err(|e| self.map_error("mmap", e))?;

        log::debug!("mapped {} ({:#x} bytes)", self.path.display(), size);
        self.map = Some(map);
        Ok(())
    }

    /// Unmap the window; no-op when unmapped
    pub fn release(&mut self) {
        if self.map.take().is_some() {
            log::debug!("unmapped {}", self.path.display());
        }
    }

    /// Map the window for the lifetime of the returned guard
    pub fn acquire(&mut self) -> Result<WindowGuard<'_>> {
        self.map()?;
        Ok(WindowGuard { window: self })
    }

    /// Read a little-endian 32-bit register
    pub fn read32(&self, offset: usize) -> Result<u32> {
        let map = self.map.as_ref().ok_or(BringupError::NotMapped)?;
        check_register(offset, map.len())?;

        // SAFETY: `offset + 4` lies within the mapping and the mapping is page
        // aligned, so the pointer is valid and 4-byte aligned.
        let raw = unsafe { ptr::read_volatile(map.as_ptr().add(offset) as *const u32) };
        Ok(u32::from_le(raw))
    }

    /// Write a little-endian 32-bit register
    pub fn write32(&mut self, offset: usize, value: u32) -> Result<()> {
        let map = self.map.as_mut().ok_or(BringupError::NotMapped)?;
        check_register(offset, map.len())?;

        // SAFETY: as in `read32`
        unsafe { ptr::write_volatile(map.as_mut_ptr().add(offset) as *mut u32, value.to_le()) };
        Ok(())
    }

    fn map_error(&self, step: &str, source: io::Error) -> BringupError {
        log::error!("failed to {} {} for mmap: {}", step, self.path.display(), source);
        BringupError::Map {
            path: self.path.clone(),
            source,
        }
    }
}

/// Bounds first, then alignment
fn check_register(offset: usize, size: usize) -> Result<()> {
    offset
        .checked_add(REGISTER_WIDTH)
        .filter(|end| *end <= size)
        .ok_or(BringupError::OutOfBounds { offset, size })?;

    if offset % REGISTER_WIDTH != 0 {
        return Err(BringupError::Misaligned { offset });
    }
    Ok(())
}

/// Active mapping of a [`RegisterWindow`]
///
/// Releases the mapping on drop.
#[derive(Debug)]
pub struct WindowGuard<'a> {
    window: &'a mut RegisterWindow,
}

impl WindowGuard<'_> {
    pub fn size(&self) -> usize {
        self.window.size()
    }

    pub fn read32(&self, offset: usize) -> Result<u32> {
        self.window.read32(offset)
    }

    pub fn write32(&mut self, offset: usize, value: u32) -> Result<()> {
        self.window.write32(offset, value)
    }

    /// Set or clear `mask` in a register, returning the value written
    pub fn update32(&mut self, offset: usize, mask: u32, set: bool) -> Result<u32> {
        let current = self.read32(offset)?;
        let value = if set { current | mask } else { current & !mask };
        self.write32(offset, value)?;
        Ok(value)
    }
}

impl Drop for WindowGuard<'_> {
    fn drop(&mut self) {
        self.window.release();
    }
}

/// Register access capability
///
/// Platforms go through this trait so the same setup code runs on real
/// hardware and in simulation.
pub trait RegisterAccess {
    /// Read a register from the file at `path`
    fn read32(&self, path: &Path, offset: usize) -> Result<u32>;

    /// Write a register in the file at `path`
    fn write32(&self, path: &Path, offset: usize, value: u32) -> Result<()>;

    /// Set or clear `mask` in a register, returning the value written
    fn update32(&self, path: &Path, offset: usize, mask: u32, set: bool) -> Result<u32>;
}

/// Real register access through a window per operation
#[derive(Debug, Default, Clone, Copy)]
pub struct MappedRegisters;

impl RegisterAccess for MappedRegisters {
    fn read32(&self, path: &Path, offset: usize) -> Result<u32> {
        let mut window = RegisterWindow::new(path);
        let guard = window.acquire()?;
        guard.read32(offset)
    }

    fn write32(&self, path: &Path, offset: usize, value: u32) -> Result<()> {
        let mut window = RegisterWindow::new(path);
        let mut guard = window.acquire()?;
        guard.write32(offset, value)
    }

    fn update32(&self, path: &Path, offset: usize, mask: u32, set: bool) -> Result<u32> {
        let mut window = RegisterWindow::new(path);
        let mut guard = window.acquire()?;
        guard.update32(offset, mask, set)
    }
}

/// Simulated register access: logs and reads back zero
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedRegisters;

impl RegisterAccess for SimulatedRegisters {
    fn read32(&self, path: &Path, offset: usize) -> Result<u32> {
        log::debug!("read32({}, {:#x})", path.display(), offset);
        Ok(0)
    }

    fn write32(&self, path: &Path, offset: usize, value: u32) -> Result<()> {
        log::debug!("write32({}, {:#x}, {:#010x})", path.display(), offset, value);
        Ok(())
    }

    fn update32(&self, path: &Path, offset: usize, mask: u32, set: bool) -> Result<u32> {
        log::debug!(
            "update32({}, {:#x}, mask={:#010x}, set={})",
            path.display(),
            offset,
            mask,
            set
        );
        Ok(if set { mask } else { 0 })
    }
}
