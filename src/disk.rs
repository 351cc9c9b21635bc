//! # Block Store
//!
//! Fixed-geometry sector access over the flash disk window: 256 sectors of
//! 512 bytes starting at `DISK_ADDR_MIN`. A pure translation layer with
//! bounds checks; it keeps no state of its own and never retries.
//!
//! Sector `n` lives at `DISK_ADDR_MIN + 512 * n`. Writes pack the bytes
//! into little-endian words (byte 0 is the low byte of word 0) because the
//! flash only programs whole aligned words.

use log::{debug, trace, warn};

use crate::config::{
    DISK_ADDR_MAX, DISK_ADDR_MIN, ERASE_BLOCK_SIZE, SECTOR_SIZE, SECTOR_WORDS,
};
use crate::flash::Flash;

/// Block Store failure codes. Success is `Ok(())` (code 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DiskError {
    /// Generic read/write failure (or unsupported drive).
    Error = 1,
    /// The medium refuses writes.
    WriteProtected = 2,
    /// The medium is not ready.
    NotReady = 3,
    /// Sector outside the disk window.
    ParamError = 4,
}

impl DiskError {
    /// Numeric result code.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl core::fmt::Display for DiskError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DiskError::Error => f.write_str("R/W error"),
            DiskError::WriteProtected => f.write_str("write protected"),
            DiskError::NotReady => f.write_str("not ready"),
            DiskError::ParamError => f.write_str("invalid parameter"),
        }
    }
}

/// One sector's worth of bytes.
pub type Sector = [u8; SECTOR_SIZE];

/// The Block Store over a flash driver.
pub struct Disk<F: Flash> {
    flash: F,
}

impl<F: Flash> Disk<F> {
    pub const fn new(flash: F) -> Self {
        Self { flash }
    }

    /// Check the drive number. Only drive 0 exists; the internal flash
    /// needs no further initialization.
    pub fn init(&self, drive: u32) -> Result<(), DiskError> {
        if drive == 0 {
            Ok(())
        } else {
            Err(DiskError::Error)
        }
    }

    /// Copy sector `sector` into `buffer`. The buffer is untouched on error.
    pub fn read_sector(&self, buffer: &mut Sector, sector: u32) -> Result<(), DiskError> {
        let address = sector_address(sector)?;
        self.flash.read(address, buffer);
        trace!("read sector {}", sector);
        Ok(())
    }

    /// Program `buffer` into sector `sector`.
    ///
    /// The sector must have been erased (or only need bits cleared). Fails
    /// with `Error` unless the flash reports every word programmed and the
    /// sector reads back as `buffer`. Programming cannot set bits, so a
    /// sector left dirty by an earlier write fails the read-back.
    pub fn write_sector(&mut self, buffer: &Sector, sector: u32) -> Result<(), DiskError> {
        let address = sector_address(sector)?;
        if self.flash.is_write_protected() {
            return Err(DiskError::WriteProtected);
        }

        let words = pack_words(buffer);
        let written = self.flash.write_array(&words, address);
        if written != SECTOR_WORDS {
            warn!("sector {}: {} of {} words programmed", sector, written, SECTOR_WORDS);
            return Err(DiskError::Error);
        }

        let mut readback = [0u8; SECTOR_SIZE];
        self.flash.read(address, &mut readback);
        if readback != *buffer {
            warn!("sector {}: read-back mismatch, sector was not erased", sector);
            return Err(DiskError::Error);
        }
        trace!("wrote sector {}", sector);
        Ok(())
    }

    /// Erase the whole disk window, one erase block at a time.
    ///
    /// Every block is attempted even after a failure, and the result is an
    /// error if any block failed to erase.
    pub fn format(&mut self) -> Result<(), DiskError> {
        if self.flash.is_write_protected() {
            return Err(DiskError::WriteProtected);
        }

        let mut result = Ok(());
        let mut address = DISK_ADDR_MIN;
        while address < DISK_ADDR_MAX {
            if self.flash.erase(address).is_err() {
                warn!("erase failed at {:#010x}", address);
                result = Err(DiskError::Error);
            }
            address += ERASE_BLOCK_SIZE;
        }
        debug!("disk formatted: {:?}", result);
        result
    }

    /// The underlying flash driver.
    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// The underlying flash driver, mutably.
    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }
}

/// Base address of `sector`, or `ParamError` if the sector does not fit in
/// the disk window.
fn sector_address(sector: u32) -> Result<u32, DiskError> {
    let address = sector
        .checked_mul(SECTOR_SIZE as u32)
        .and_then(|offset| offset.checked_add(DISK_ADDR_MIN))
        .ok_or(DiskError::ParamError)?;
    let last = address
        .checked_add(SECTOR_SIZE as u32 - 1)
        .ok_or(DiskError::ParamError)?;
    if last > DISK_ADDR_MAX {
        return Err(DiskError::ParamError);
    }
    Ok(address)
}

/// Pack a sector's bytes into little-endian words.
fn pack_words(buffer: &Sector) -> [u32; SECTOR_WORDS] {
    let mut words = [0u32; SECTOR_WORDS];
    for (word, bytes) in words.iter_mut().zip(buffer.chunks_exact(4)) {
        *word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    }
    words
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
