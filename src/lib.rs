//! # RingOS
//!
//! A minimal embedded operating system for single-core ARM Cortex-M4
//! microcontrollers without an MMU or heap: a fixed ring of six threads with
//! round-robin preemptive/cooperative scheduling and blocking semaphores,
//! plus a flash-resident file system on a raw sector store.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │              Application Threads & Periodic Tasks       │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │   init · add_threads · add_periodic_task · launch       │
//! │   sleep · suspend · wait · signal · fifo_put/get        │
//! ├──────────────┬──────────────────┬──────────────────────┤
//! │  Scheduler   │  Semaphores      │  FIFO                │
//! │  scheduler.rs│  semaphore.rs    │  fifo.rs             │
//! │  ─ schedule()│  ─ wait()        │  ─ try_put()         │
//! │  ─ tick()    │  ─ signal()      │  ─ start_get/take()  │
//! ├──────────────┴──────────────────┴──────────────────────┤
//! │              Thread Model (thread.rs)                   │
//! │        TCB · ring link · blocked · sleep · stack        │
//! ├────────────────────────────────────────────────────────┤
//! │     Arch Port (arch/cortex_m4.rs, arch/host.rs)         │
//! │        PendSV · SysTick · first-thread launch           │
//! └────────────────────────────────────────────────────────┘
//!
//! ┌────────────────────────────────────────────────────────┐
//! │  File System (file.rs): Directory + FAT in sector 255   │
//! ├────────────────────────────────────────────────────────┤
//! │  Block Store (disk.rs): 256 × 512-byte sectors          │
//! ├────────────────────────────────────────────────────────┤
//! │  Flash (flash.rs): program words · erase 1 KiB blocks   │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! The file system does not use the kernel; it is driven synchronously by
//! a single owner.
//!
//! ## Memory Model
//!
//! - **No heap**: All state is statically allocated
//! - **Fixed thread ring**: `[ThreadControlBlock; NUM_THREADS]`, each with
//!   an inline `[u32; STACK_WORDS]` stack
//! - **Critical sections**: `critical_section::with()` around all shared
//!   kernel state
//!
//! Logging goes through the `log` facade; the firmware installs no logger.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod sync;
pub mod thread;
pub mod scheduler;
pub mod semaphore;
pub mod fifo;
pub mod arch;
pub mod kernel;
pub mod flash;
pub mod disk;
pub mod file;

pub use disk::{Disk, DiskError};
pub use fifo::{Fifo, FifoFull};
pub use file::{FileError, FileId, FileSystem};
pub use flash::{Flash, FlashError, SimFlash};
pub use scheduler::{KernelError, Scheduler};
pub use semaphore::{Semaphore, WaitResult};
