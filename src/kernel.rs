//! # Kernel
//!
//! Public API of RingOS. Owns the global `Scheduler` and couples it to the
//! context-switch port. Every call takes the kernel lock (a critical
//! section) for the shortest span that establishes the new state, then
//! pends a switch outside it when the calling thread has to give up the CPU.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()               ← Interrupts off, state reset
//!         ├─► kernel::add_threads()        ← All six threads, once
//!         ├─► kernel::add_periodic_task()  ← Up to two
//!         ├─► kernel::init_semaphore() / kernel::fifo_init()
//!         └─► kernel::launch()             ← No return
//!               ├─► Configure SysTick
//!               ├─► Set interrupt priorities
//!               └─► Start thread 0 via arch::start_first_task()
//! ```
//!
//! ## Suspension Points
//!
//! A thread only gives up the CPU mid-operation in `suspend()`, `sleep()`,
//! a `wait()` that blocks, and a `fifo_get()` on an empty FIFO. Time-slice
//! expiry preempts it from the tick handler.

use core::cell::RefCell;

use crate::arch::port;
use crate::config::NUM_THREADS;
use crate::fifo::{Fifo, FifoFull};
use crate::scheduler::{KernelError, PeriodicFn, Scheduler};
use crate::semaphore::{Semaphore, WaitResult};
use crate::sync::{self, Mutex};
use crate::thread::ThreadEntry;

// ---------------------------------------------------------------------------
// Global kernel instance
// ---------------------------------------------------------------------------

/// Global kernel state. Threads, the tick handler and PendSV all reach it
/// through `with_kernel()`.
static KERNEL: Mutex<RefCell<Scheduler>> = Mutex::new(RefCell::new(Scheduler::new()));

/// Run `f` on the kernel state inside a critical section.
///
/// Must not be re-entered from within `f`; periodic tasks are run by
/// `on_tick()` only after the lock is released for that reason.
pub fn with_kernel<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    sync::critical_section(|cs| f(&mut KERNEL.borrow_ref_mut(cs)))
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

/// Initialize the kernel: disable interrupts (on target) and reset all
/// kernel state.
///
/// Must be called exactly once, from `main`, before any other kernel call.
pub fn init() {
    port::init();
    with_kernel(|k| *k = Scheduler::new());
}

/// Populate the thread ring. Thread 0 runs first.
pub fn add_threads(entries: [ThreadEntry; NUM_THREADS]) -> Result<(), KernelError> {
    with_kernel(|k| k.add_threads(entries))
}

/// Register a periodic task fired by the tick dispatcher every `period`
/// ticks. At most two, before `launch()`.
pub fn add_periodic_task(task: PeriodicFn, period: u32) -> Result<(), KernelError> {
    with_kernel(|k| k.add_periodic_task(task, period))
}

/// Start the kernel. **Does not return** on success.
///
/// Configures SysTick as the tick source, sets the exception priorities and
/// jumps into thread 0. `time_slice` is the preemption period in ticks and
/// must be in `1..=MAX_TIME_SLICE`. SysTick itself always runs at
/// `TICK_HZ`.
///
/// # Errors
/// Returns only if the configuration is rejected (no threads, bad slice,
/// already launched).
#[cfg(target_arch = "arm")]
pub fn launch(
    mut core_peripherals: cortex_m::Peripherals,
    time_slice: u32,
) -> Result<core::convert::Infallible, KernelError> {
    let first_sp = with_kernel(|k| -> Result<*mut u32, KernelError> {
        let first = k.launch(time_slice)?;
        Ok(k.threads[first].stack_ptr())
    })?;

    port::configure_systick(&mut core_peripherals.SYST);
    port::set_interrupt_priorities();

    unsafe { port::start_first_task(first_sp) }
}

/// Host version of `launch()`: freezes configuration and returns the index
/// of the first thread. The caller drives ticks and switches.
#[cfg(not(target_arch = "arm"))]
pub fn launch(time_slice: u32) -> Result<usize, KernelError> {
    with_kernel(|k| k.launch(time_slice))
}

// ---------------------------------------------------------------------------
// Thread API
// ---------------------------------------------------------------------------

/// Cooperatively give up the CPU. The next thread gets a full time slice;
/// this one runs again when the ring comes back around to it.
pub fn suspend() {
    with_kernel(|k| k.suspend());
    port::pend_switch();
}

/// Sleep for `ticks` ticks. `sleep(0)` just yields.
pub fn sleep(ticks: u32) {
    with_kernel(|k| k.sleep(ticks));
    port::pend_switch();
}

/// Index of the running thread.
pub fn current_thread() -> usize {
    with_kernel(|k| k.current())
}

// ---------------------------------------------------------------------------
// Semaphores
// ---------------------------------------------------------------------------

/// Set a semaphore's counter. Call before any `wait()`/`signal()` on it.
pub fn init_semaphore(sem: Semaphore, initial: i32) {
    with_kernel(|k| k.init_semaphore(sem, initial));
}

/// Decrement `sem`, blocking the calling thread while the result is
/// negative. Returns once the thread holds the semaphore.
///
/// The lock is released before suspending so the tick dispatcher keeps
/// running while this thread is blocked.
pub fn wait(sem: Semaphore) {
    if with_kernel(|k| k.wait(sem)) == WaitResult::Blocked {
        port::pend_switch();
    }
}

/// Increment `sem`, making one blocked thread eligible to run. Never
/// blocks; safe to call from periodic tasks.
pub fn signal(sem: Semaphore) {
    with_kernel(|k| k.signal(sem));
}

// ---------------------------------------------------------------------------
// FIFO
// ---------------------------------------------------------------------------

/// Empty `fifo` and zero its occupancy semaphore.
pub fn fifo_init<const N: usize>(fifo: &Fifo<N>) {
    with_kernel(|k| fifo.init(k));
}

/// Non-blocking put for the single producer. Fails (and counts the loss)
/// when the FIFO is full.
pub fn fifo_put<const N: usize>(fifo: &Fifo<N>, data: u32) -> Result<(), FifoFull> {
    with_kernel(|k| fifo.try_put(k, data))
}

/// Blocking get for the single consumer thread.
pub fn fifo_get<const N: usize>(fifo: &Fifo<N>) -> u32 {
    if with_kernel(|k| fifo.start_get(k)) == WaitResult::Blocked {
        port::pend_switch();
    }
    fifo.take()
}

// ---------------------------------------------------------------------------
// Port entry points
// ---------------------------------------------------------------------------

/// Tick entry point, called by the port's periodic interrupt.
///
/// Sleep countdowns are decremented first, then the due periodic tasks run
/// to completion in registration order with the lock released, and finally
/// a switch is pended if the time slice ran out.
pub fn on_tick() {
    let due = with_kernel(|k| k.tick());
    for task in due.into_iter().flatten() {
        task();
    }
    if with_kernel(|k| k.is_launched() && k.needs_reschedule) {
        port::pend_switch();
    }
}

/// Store the PSP of the thread being switched out.
pub fn save_context(psp: *mut u32) {
    with_kernel(|k| k.current_tcb_mut().set_stack_ptr(psp));
}

/// Advance the run pointer and return the PSP to restore, or `None` if no
/// thread is Runnable right now.
pub fn next_context() -> Option<*mut u32> {
    with_kernel(|k| -> Option<*mut u32> {
        let next = k.schedule()?;
        Some(k.threads[next].stack_ptr())
    })
}

/// Host harness helper: run the selection half of a context switch and
/// return the new running thread.
#[cfg(not(target_arch = "arm"))]
pub fn switch_context() -> Option<usize> {
    with_kernel(|k| k.schedule())
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
