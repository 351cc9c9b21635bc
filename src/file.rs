//! # File System
//!
//! A flat file system on top of the Block Store. Sector 255 holds the
//! metadata image: a 256-byte Directory followed by a 256-byte allocation
//! table (FAT).
//!
//! - `directory[file]` is the first sector of `file`, or 255 if the file is
//!   empty or unused.
//! - `fat[sector]` is the next sector of the same file, or 255 at the end
//!   of the chain.
//!
//! Files only grow. The next free sector is one past the highest sector in
//! use, so space is handed out in increasing order and never reclaimed.
//!
//! The metadata is mounted into RAM on first use and written back only by
//! `flush()`. Rewriting sector 255 without an erase works on this medium
//! because every metadata byte goes from 255 to a sector number at most once
//! between formats, which only clears bits.
//!
//! There is no locking: one thread owns the file system.

use log::{debug, error, trace, warn};

use crate::config::{DIRECTORY_SECTOR, NO_ENTRY, NUM_SECTORS, SECTOR_SIZE};
use crate::disk::{Disk, DiskError, Sector};
use crate::flash::Flash;

/// File number, 0..=254. 255 means "no file".
pub type FileId = u8;

/// Longest possible chain: every data sector in one file.
const DATA_SECTORS: usize = NUM_SECTORS - 1;

/// File system failure. Deliberately carries no detail: a full disk, a
/// corrupted allocation table and an I/O error all look the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileError;

impl FileError {
    /// Status code of a failed operation.
    pub const CODE: u8 = 255;
}

impl core::fmt::Display for FileError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("file system error")
    }
}

impl From<DiskError> for FileError {
    fn from(err: DiskError) -> Self {
        warn!("disk error: {}", err);
        FileError
    }
}

/// Status code of a file system result: 0 on success, 255 on failure.
pub fn status<T>(result: &Result<T, FileError>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(_) => FileError::CODE,
    }
}

/// The file system, owning its disk and the RAM copy of the metadata.
pub struct FileSystem<F: Flash> {
    disk: Disk<F>,
    directory: [u8; NUM_SECTORS],
    fat: [u8; NUM_SECTORS],
    mounted: bool,
}

impl<F: Flash> FileSystem<F> {
    /// Wrap `disk`. Nothing is read until the first operation.
    pub fn new(disk: Disk<F>) -> Self {
        Self {
            disk,
            directory: [NO_ENTRY; NUM_SECTORS],
            fat: [NO_ENTRY; NUM_SECTORS],
            mounted: false,
        }
    }

    /// Whether the metadata is loaded in RAM.
    pub fn mounted(&self) -> bool {
        self.mounted
    }

    /// Give the disk back, dropping any unflushed metadata. Used to model a
    /// power cycle.
    pub fn into_disk(self) -> Disk<F> {
        self.disk
    }

    /// The underlying disk.
    pub fn disk_mut(&mut self) -> &mut Disk<F> {
        &mut self.disk
    }

    /// Load Directory and FAT from sector 255 unless already loaded.
    fn mount(&mut self) -> Result<(), FileError> {
        if self.mounted {
            return Ok(());
        }

        let mut buffer = [0u8; SECTOR_SIZE];
        self.disk.read_sector(&mut buffer, DIRECTORY_SECTOR as u32)?;
        let (directory, fat) = buffer.split_at(NUM_SECTORS);
        self.directory.copy_from_slice(directory);
        self.fat.copy_from_slice(fat);
        self.mounted = true;

        debug!("directory mounted");
        Ok(())
    }

    /// First unused file number. Does not reserve it: until something is
    /// appended, the same number is returned again.
    pub fn new_file(&mut self) -> Result<FileId, FileError> {
        self.mount()?;
        match self.directory[..DATA_SECTORS].iter().position(|&s| s == NO_ENTRY) {
            Some(id) => Ok(id as FileId),
            None => {
                warn!("directory full");
                Err(FileError)
            }
        }
    }

    /// Number of sectors in `file`.
    ///
    /// A file holds at most 255 sectors; a chain that runs past that without
    /// an end marker is corrupt and reported as an error.
    pub fn size(&mut self, file: FileId) -> Result<usize, FileError> {
        check_id(file)?;
        self.mount()?;

        let mut sector = self.directory[file as usize];
        if sector == NO_ENTRY {
            return Ok(0);
        }
        for count in 1..=DATA_SECTORS {
            sector = self.fat[sector as usize];
            if sector == NO_ENTRY {
                return Ok(count);
            }
        }
        Err(corrupt(file))
    }

    /// Write one sector of `data` at the end of `file`.
    ///
    /// Takes the sector after the highest one in use. Fails without linking
    /// anything if the disk is full or the write fails. A sector still
    /// holding data from an append that was never flushed cannot be
    /// reprogrammed, so that also fails until the next format.
    pub fn append(&mut self, file: FileId, data: &Sector) -> Result<(), FileError> {
        check_id(file)?;
        self.mount()?;

        let sector = self.find_free_sector()?;
        self.disk.write_sector(data, sector as u32)?;

        match self.last_sector(file)? {
            None => self.directory[file as usize] = sector,
            Some(last) => self.fat[last as usize] = sector,
        }
        self.fat[sector as usize] = NO_ENTRY;

        trace!("file {}: appended sector {}", file, sector);
        Ok(())
    }

    /// Read the `location`-th sector (0-based) of `file` into `buffer`.
    pub fn read(&mut self, file: FileId, location: u8, buffer: &mut Sector) -> Result<(), FileError> {
        check_id(file)?;
        self.mount()?;

        let mut sector = self.directory[file as usize];
        if sector == NO_ENTRY {
            return Err(FileError);
        }
        for _ in 0..location {
            sector = self.fat[sector as usize];
            if sector == NO_ENTRY {
                return Err(FileError);
            }
        }
        self.disk.read_sector(buffer, sector as u32)?;
        Ok(())
    }

    /// Write Directory and FAT back to sector 255. Power may be removed
    /// afterwards.
    pub fn flush(&mut self) -> Result<(), FileError> {
        self.mount()?;

        let mut buffer = [0u8; SECTOR_SIZE];
        let (directory, fat) = buffer.split_at_mut(NUM_SECTORS);
        directory.copy_from_slice(&self.directory);
        fat.copy_from_slice(&self.fat);
        self.disk.write_sector(&buffer, DIRECTORY_SECTOR as u32)?;

        debug!("directory flushed");
        Ok(())
    }

    /// Erase every file. The next operation mounts the fresh, empty
    /// metadata from disk.
    pub fn format(&mut self) -> Result<(), FileError> {
        self.mounted = false;
        self.directory = [NO_ENTRY; NUM_SECTORS];
        self.fat = [NO_ENTRY; NUM_SECTORS];
        self.disk.format()?;
        Ok(())
    }

    /// Last sector of `file`, or `None` if it is empty.
    fn last_sector(&self, file: FileId) -> Result<Option<u8>, FileError> {
        let mut sector = self.directory[file as usize];
        if sector == NO_ENTRY {
            return Ok(None);
        }
        for _ in 0..DATA_SECTORS {
            let next = self.fat[sector as usize];
            if next == NO_ENTRY {
                return Ok(Some(sector));
            }
            sector = next;
        }
        Err(corrupt(file))
    }

    /// One past the highest sector used by any file, or 0 on an empty disk.
    fn find_free_sector(&self) -> Result<u8, FileError> {
        let mut highest: Option<u8> = None;
        for file in 0..DATA_SECTORS as u8 {
            if let Some(last) = self.last_sector(file)? {
                highest = highest.max(Some(last));
            }
        }

        let free = highest.map_or(0, |s| s as usize + 1);
        if free >= DATA_SECTORS {
            warn!("disk full");
            return Err(FileError);
        }
        Ok(free as u8)
    }
}

fn check_id(file: FileId) -> Result<(), FileError> {
    if file == NO_ENTRY {
        return Err(FileError);
    }
    Ok(())
}

fn corrupt(file: FileId) -> FileError {
    error!("file {}: allocation chain has no end", file);
    FileError
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::SimFlash;

    fn formatted() -> FileSystem<SimFlash> {
        let mut fs = FileSystem::new(Disk::new(SimFlash::new()));
        fs.format().unwrap();
        fs
    }

    fn power_cycle(fs: FileSystem<SimFlash>) -> FileSystem<SimFlash> {
        FileSystem::new(fs.into_disk())
    }

    fn filled(byte: u8) -> Sector {
        [byte; SECTOR_SIZE]
    }

    #[test]
    fn test_round_trip_through_power_cycle() {
        let mut fs = formatted();
        assert_eq!(fs.new_file(), Ok(0));
        fs.append(0, &filled(0xAA)).unwrap();
        fs.flush().unwrap();

        let mut fs = power_cycle(fs);
        assert!(!fs.mounted());
        let mut out = filled(0);
        fs.read(0, 0, &mut out).unwrap();
        assert!(fs.mounted());
        assert_eq!(out, filled(0xAA));
    }

    #[test]
    fn test_unflushed_metadata_is_lost() {
        let mut fs = formatted();
        fs.append(0, &filled(1)).unwrap();

        let mut fs = power_cycle(fs);
        assert_eq!(fs.size(0), Ok(0));
        assert_eq!(fs.new_file(), Ok(0));
    }

    #[test]
    fn test_size_grows_by_one_per_append() {
        let mut fs = formatted();
        for n in 0..10u8 {
            assert_eq!(fs.size(3), Ok(n as usize));
            fs.append(3, &filled(n)).unwrap();
        }
        assert_eq!(fs.size(3), Ok(10));
    }

    #[test]
    fn test_new_file_does_not_reserve() {
        let mut fs = formatted();
        assert_eq!(fs.new_file(), Ok(0));
        assert_eq!(fs.new_file(), Ok(0));
        fs.append(0, &filled(0)).unwrap();
        assert_eq!(fs.new_file(), Ok(1));
    }

    #[test]
    fn test_interleaved_files_keep_their_chains() {
        let mut fs = formatted();
        // Sectors are handed out in order: 0->f0, 1->f1, 2->f0, 3->f1, 4->f0
        for i in 0..5u8 {
            fs.append(i % 2, &filled(i)).unwrap();
        }
        fs.flush().unwrap();
        let mut fs = power_cycle(fs);

        assert_eq!(fs.size(0), Ok(3));
        assert_eq!(fs.size(1), Ok(2));
        let mut out = filled(0);
        for (location, expected) in [0u8, 2, 4].into_iter().enumerate() {
            fs.read(0, location as u8, &mut out).unwrap();
            assert_eq!(out, filled(expected));
        }
        fs.read(1, 1, &mut out).unwrap();
        assert_eq!(out, filled(3));
    }

    #[test]
    fn test_read_past_end_fails() {
        let mut fs = formatted();
        let mut out = filled(0x77);
        assert_eq!(fs.read(0, 0, &mut out), Err(FileError));

        fs.append(0, &filled(1)).unwrap();
        assert_eq!(fs.read(0, 1, &mut out), Err(FileError));
        assert_eq!(out, filled(0x77));
        assert_eq!(status(&fs.read(0, 0, &mut out)), 0);
    }

    #[test]
    fn test_reserved_file_id_rejected() {
        let mut fs = formatted();
        let mut out = filled(0);
        assert_eq!(fs.append(NO_ENTRY, &filled(0)), Err(FileError));
        assert_eq!(fs.size(NO_ENTRY), Err(FileError));
        assert_eq!(fs.read(NO_ENTRY, 0, &mut out), Err(FileError));
        assert_eq!(status(&fs.size(NO_ENTRY)), FileError::CODE);
    }

    #[test]
    fn test_disk_fills_after_255_sectors() {
        let mut fs = formatted();
        for i in 0..DATA_SECTORS {
            fs.append(0, &filled(i as u8)).unwrap();
        }
        assert_eq!(fs.size(0), Ok(255));
        assert_eq!(fs.append(1, &filled(0)), Err(FileError));
        assert_eq!(fs.size(1), Ok(0));

        fs.flush().unwrap();
        let mut fs = power_cycle(fs);
        assert_eq!(fs.size(0), Ok(255));
        let mut out = filled(0);
        fs.read(0, 254, &mut out).unwrap();
        assert_eq!(out, filled(254));
    }

    #[test]
    fn test_repeated_flush_without_erase() {
        let mut fs = formatted();
        fs.append(0, &filled(1)).unwrap();
        fs.flush().unwrap();
        fs.append(0, &filled(2)).unwrap();
        fs.append(1, &filled(3)).unwrap();
        fs.flush().unwrap();

        let mut fs = power_cycle(fs);
        assert_eq!(fs.size(0), Ok(2));
        assert_eq!(fs.size(1), Ok(1));
        let mut out = filled(0);
        fs.read(0, 1, &mut out).unwrap();
        assert_eq!(out, filled(2));
    }

    #[test]
    fn test_metadata_image_layout() {
        let mut fs = formatted();
        fs.append(4, &filled(0)).unwrap();
        fs.append(4, &filled(0)).unwrap();
        fs.flush().unwrap();

        let mut image = [0u8; SECTOR_SIZE];
        fs.disk_mut().read_sector(&mut image, DIRECTORY_SECTOR as u32).unwrap();
        assert_eq!(image[4], 0); // directory: file 4 starts at sector 0
        assert_eq!(image[0], NO_ENTRY);
        assert_eq!(image[NUM_SECTORS], 1); // fat: 0 -> 1
        assert_eq!(image[NUM_SECTORS + 1], NO_ENTRY); // fat: 1 -> end
    }

    #[test]
    fn test_failed_write_links_nothing() {
        let mut fs = formatted();
        fs.append(0, &filled(1)).unwrap();
        fs.disk_mut().flash_mut().limit_program(Some(1));

        assert_eq!(fs.append(0, &filled(2)), Err(FileError));
        assert_eq!(fs.size(0), Ok(1));
    }

    #[test]
    fn test_append_over_unflushed_sector_fails() {
        let mut fs = formatted();
        fs.append(0, &filled(0x0F)).unwrap();

        // Power lost before the flush: sector 0 is programmed but unlinked
        let mut fs = power_cycle(fs);
        assert_eq!(fs.size(0), Ok(0));
        assert_eq!(status(&fs.append(0, &filled(0xF0))), FileError::CODE);
        assert_eq!(fs.size(0), Ok(0));

        let mut raw = filled(0);
        fs.disk_mut().read_sector(&mut raw, 0).unwrap();
        assert_eq!(raw, filled(0x0F & 0xF0));
    }

    #[test]
    fn test_format_forgets_files() {
        let mut fs = formatted();
        fs.append(0, &filled(9)).unwrap();
        fs.flush().unwrap();

        fs.format().unwrap();
        assert!(!fs.mounted());
        assert_eq!(fs.size(0), Ok(0));
        assert_eq!(fs.new_file(), Ok(0));
    }

    #[test]
    fn test_format_failure_reported() {
        let mut fs = formatted();
        fs.disk_mut().flash_mut().fail_erase_at(crate::config::DISK_ADDR_MIN);
        assert_eq!(fs.format(), Err(FileError));
    }

    #[test]
    fn test_cyclic_chain_is_an_error() {
        let mut fs = formatted();
        let mut image = [NO_ENTRY; SECTOR_SIZE];
        image[0] = 0; // file 0 starts at sector 0
        image[NUM_SECTORS] = 1; // 0 -> 1
        image[NUM_SECTORS + 1] = 0; // 1 -> 0
        fs.disk_mut().write_sector(&image, DIRECTORY_SECTOR as u32).unwrap();

        let mut fs = power_cycle(fs);
        assert_eq!(fs.size(0), Err(FileError));
        assert_eq!(fs.append(1, &filled(0)), Err(FileError));
    }
}
