use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use log::{debug, info, warn};

use nvb_core::{BondError, BondResult};
use nvb_hal::FlashStorage;

pub mod stack;
pub use stack::HostStack;

/// Erased NOR flash reads back as all ones.
pub const ERASED: u8 = 0xFF;

/// Flash page backed by an image file.
///
/// Writes land in memory; `flush` replaces the file atomically. Anything
/// written but not flushed is gone after a reopen, like a power cut before
/// the program cycle finished.
pub struct FileFlash {
    path: PathBuf,
    base: u32,
    image: Vec<u8>,
    dirty: bool,
}

impl FileFlash {
    /// Opens `path`, or starts from an erased page if it does not exist yet.
    pub fn open(path: impl AsRef<Path>, base: u32, size: u32) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();

        let image = if path.exists() {
            let mut buf = Vec::new();
            File::open(&path)
                .and_then(|mut f| f.read_to_end(&mut buf))
                .with_context(|| format!("reading flash image {}", path.display()))?;
            if buf.len() != size as usize {
                bail!("flash image {} is {} bytes, expected {}", path.display(), buf.len(), size);
            }
            info!("FLASH: image {} loaded", path.display());
            buf
        } else {
            info!("FLASH: new erased image {} ({} bytes)", path.display(), size);
            vec![ERASED; size as usize]
        };

        Ok(Self { path, base, image, dirty: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }

    fn range(&self, addr: u32, len: usize) -> BondResult<Range<usize>> {
        let start = addr.checked_sub(self.base).ok_or(BondError::StorageIo)? as usize;
        let end = start.checked_add(len).ok_or(BondError::StorageIo)?;
        if end > self.image.len() {
            warn!("FLASH: access 0x{:05X}+{} outside the page", addr, len);
            return Err(BondError::StorageIo);
        }
        Ok(start..end)
    }

    fn persist(&self) -> std::io::Result<()> {
        let tmp_path = self.path.with_extension("tmp");

        // 1. Write .tmp
        {
            let mut file = OpenOptions::new()
                .write(true).create(true).truncate(true)
                .open(&tmp_path)?;
            file.write_all(&self.image)?;

            // 2. FSYNC
            file.sync_all()?;
        }

        // 3. Rename (Atomic)
        fs::rename(&tmp_path, &self.path)?;

        // 4. Sync Parent Dir
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if let Ok(f) = File::open(dir) { let _ = f.sync_all(); }
        }
        Ok(())
    }
}

impl FlashStorage for FileFlash {
    fn write(&mut self, addr: u32, data: &[u8]) -> BondResult<usize> {
        let r = self.range(addr, data.len())?;
        self.image[r].copy_from_slice(data);
        self.dirty = true;
        Ok(data.len())
    }

    fn read(&mut self, dst: &mut [u8], addr: u32) -> BondResult<()> {
        let r = self.range(addr, dst.len())?;
        dst.copy_from_slice(&self.image[r]);
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), BondError> {
        if !self.dirty { return Ok(()); }
        match self.persist() {
            Ok(()) => {
                self.dirty = false;
                debug!("FLASH: {} synced", self.path.display());
                Ok(())
            }
            Err(e) => {
                warn!("FLASH: sync of {} failed: {}", self.path.display(), e);
                Err(nb::Error::Other(BondError::StorageIo))
            }
        }
    }
}
