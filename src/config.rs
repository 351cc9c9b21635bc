//! # RingOS Configuration
//!
//! Compile-time constants for the kernel and the flash disk.
//! All limits are fixed at compile time, there is no dynamic allocation.

// ---------------------------------------------------------------------------
// Kernel
// ---------------------------------------------------------------------------

/// Number of thread slots in the ring. Every slot is populated exactly once
/// by `kernel::add_threads()`.
pub const NUM_THREADS: usize = 6;

/// Maximum number of periodic tasks run by the tick dispatcher.
pub const NUM_PERIODIC: usize = 2;

/// Per-thread stack size in 32-bit words. Must hold the deepest call chain
/// plus the 16-word initial frame (8 hardware-stacked, 8 software-saved).
pub const STACK_WORDS: usize = 100;

/// Number of semaphore slots in the kernel's counter table.
pub const MAX_SEMAPHORES: usize = 8;

/// Capacity of the FIFO used by the demo firmware.
pub const FIFO_SIZE: usize = 10;

/// Tick dispatcher frequency in Hz. Sleep countdowns, periodic task periods
/// and time slices are all measured in these ticks.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (TM4C123 PIOSC, no PLL bring-up).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Largest accepted time slice, in ticks. The bound is the 24-bit SysTick
/// reload range; slices themselves are counted in software.
pub const MAX_TIME_SLICE: u32 = (1 << 24) - 1;

/// xPSR value for a fresh thread: only the Thumb bit is set.
pub const INITIAL_XPSR: u32 = 0x0100_0000;

// ---------------------------------------------------------------------------
// Disk geometry
// ---------------------------------------------------------------------------

/// Bytes per sector. Append/Read in the file system move exactly one sector.
pub const SECTOR_SIZE: usize = 512;

/// Words per sector, the unit handed to the flash program primitive.
pub const SECTOR_WORDS: usize = SECTOR_SIZE / 4;

/// Number of addressable sectors.
pub const NUM_SECTORS: usize = 256;

/// Sector holding the packed Directory + allocation table image.
pub const DIRECTORY_SECTOR: u8 = 255;

/// Sentinel for "no file", "free directory slot" and "end of chain".
/// Also the value of erased flash bytes.
pub const NO_ENTRY: u8 = 255;

/// Size of one flash erase block in bytes.
pub const ERASE_BLOCK_SIZE: u32 = 1024;

/// First byte of the disk window.
pub const DISK_ADDR_MIN: u32 = 0x0002_0000;

/// Last byte of the disk window (inclusive).
pub const DISK_ADDR_MAX: u32 = 0x0003_FFFF;

/// Size of the disk window in bytes.
pub const DISK_SIZE: usize = (DISK_ADDR_MAX - DISK_ADDR_MIN + 1) as usize;
