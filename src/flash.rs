//! # Raw Flash Interface
//!
//! The narrow contract the Block Store needs from the flash driver, plus a
//! RAM-backed simulation of it.
//!
//! The medium is erase-before-write NOR flash: erasing sets a whole
//! `ERASE_BLOCK_SIZE` block to 0xFF, and programming can only clear bits.
//! Programming is word-granular and word-aligned.

use log::trace;

use crate::config::{DISK_ADDR_MIN, DISK_SIZE, ERASE_BLOCK_SIZE};

/// The erase primitive reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashError;

impl core::fmt::Display for FlashError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("flash erase failed")
    }
}

/// Raw flash program/erase/read primitive.
///
/// Addresses are absolute (the disk window starts at `DISK_ADDR_MIN`).
pub trait Flash {
    /// Program `source` into consecutive words starting at the word-aligned
    /// `address`. Returns how many words were programmed successfully.
    fn write_array(&mut self, source: &[u32], address: u32) -> usize;

    /// Erase the block starting at the block-aligned `address`.
    fn erase(&mut self, address: u32) -> Result<(), FlashError>;

    /// Copy `buffer.len()` bytes starting at `address` into `buffer`.
    fn read(&self, address: u32, buffer: &mut [u8]);

    /// Whether the medium currently refuses writes.
    fn is_write_protected(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Simulated flash
// ---------------------------------------------------------------------------

/// RAM model of the disk window with NOR semantics.
///
/// Starts out erased. Programming ANDs the new word into the old one, so
/// rewriting a location without erasing it only ever clears bits, exactly
/// like the real part. Faults can be injected for tests.
pub struct SimFlash {
    data: [u8; DISK_SIZE],
    failing_erase_block: Option<u32>,
    program_limit: Option<usize>,
    write_protected: bool,
    erase_count: usize,
}

impl SimFlash {
    /// A fully erased disk window.
    pub const fn new() -> Self {
        Self {
            data: [0xFF; DISK_SIZE],
            failing_erase_block: None,
            program_limit: None,
            write_protected: false,
            erase_count: 0,
        }
    }

    /// Make every erase of the block at `address` fail.
    pub fn fail_erase_at(&mut self, address: u32) {
        self.failing_erase_block = Some(address);
    }

    /// Stop each `write_array` after `words` words, or remove the limit.
    pub fn limit_program(&mut self, words: Option<usize>) {
        self.program_limit = words;
    }

    /// Turn write protection on or off.
    pub fn set_write_protected(&mut self, protected: bool) {
        self.write_protected = protected;
    }

    /// Number of erase operations attempted so far.
    pub fn erase_count(&self) -> usize {
        self.erase_count
    }

    /// Byte offset of `address` in the window, if `len` bytes fit there.
    fn offset(address: u32, len: usize) -> Option<usize> {
        let start = address.checked_sub(DISK_ADDR_MIN)? as usize;
        let end = start.checked_add(len)?;
        (end <= DISK_SIZE).then_some(start)
    }
}

impl Default for SimFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl Flash for SimFlash {
    fn write_array(&mut self, source: &[u32], address: u32) -> usize {
        if self.write_protected || address % 4 != 0 {
            return 0;
        }
        let Some(start) = Self::offset(address, source.len() * 4) else {
            return 0;
        };

        let count = self.program_limit.map_or(source.len(), |limit| limit.min(source.len()));
        for (i, word) in source[..count].iter().enumerate() {
            let cell = &mut self.data[start + i * 4..start + i * 4 + 4];
            let old = u32::from_le_bytes([cell[0], cell[1], cell[2], cell[3]]);
            cell.copy_from_slice(&(old & word).to_le_bytes());
        }
        trace!("programmed {}/{} words at {:#010x}", count, source.len(), address);
        count
    }

    fn erase(&mut self, address: u32) -> Result<(), FlashError> {
        self.erase_count += 1;
        if self.write_protected
            || address % ERASE_BLOCK_SIZE != 0
            || self.failing_erase_block == Some(address)
        {
            return Err(FlashError);
        }
        let start = Self::offset(address, ERASE_BLOCK_SIZE as usize).ok_or(FlashError)?;
        self.data[start..start + ERASE_BLOCK_SIZE as usize].fill(0xFF);
        Ok(())
    }

    fn read(&self, address: u32, buffer: &mut [u8]) {
        match Self::offset(address, buffer.len()) {
            Some(start) => buffer.copy_from_slice(&self.data[start..start + buffer.len()]),
            None => buffer.fill(0xFF),
        }
    }

    fn is_write_protected(&self) -> bool {
        self.write_protected
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
