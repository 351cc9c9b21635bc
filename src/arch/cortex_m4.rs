//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor.
//! Implements context switching via PendSV, the SysTick tick source, and
//! first-thread launch.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): Used by the kernel and interrupt handlers
//! - **PSP** (Process Stack Pointer): Used by threads in Thread mode
//!
//! On exception entry, the hardware automatically stacks R0–R3, R12, LR, PC,
//! and xPSR onto the process stack. The PendSV handler saves and restores
//! R4–R11, which completes the frame laid out by `ThreadControlBlock::init_stack()`.
//!
//! ## Interrupt Priorities
//!
//! - SysTick: priority 0xE0. Runs the tick dispatcher (sleep countdowns,
//!   periodic tasks, time slice) and preempts PendSV.
//! - PendSV: priority 0xFF (lowest). Only switches once no other handler
//!   is active.
//!
//! Target `thumbv7em-none-eabi`: the switch does not save FPU state.

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::syst::SystClkSource;

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

/// Disable interrupts for the duration of kernel setup. They are enabled
/// again when the first thread starts.
pub fn init() {
    cortex_m::interrupt::disable();
}

/// Configure SysTick as the kernel tick source.
///
/// Fires at `TICK_HZ` using the processor clock. Each tick enters `SysTick`
/// below, which calls `kernel::on_tick()`.
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Set PendSV to the lowest priority and SysTick one step above it, so the
/// tick dispatcher can run while a switch is in progress but never preempts
/// a higher application ISR.
pub fn set_interrupt_priorities() {
    unsafe {
        // System Handler Priority Register 3 (SHPR3): 0xE000_ED20
        // Bits [23:16] = PendSV priority
        // Bits [31:24] = SysTick priority
        let shpr3: *mut u32 = 0xE000_ED20 as *mut u32;
        let val = core::ptr::read_volatile(shpr3) & 0x0000_FFFF;
        let val = val | (0xFF << 16) | (0xE0 << 24);
        core::ptr::write_volatile(shpr3, val);
    }
}

// ---------------------------------------------------------------------------
// PendSV trigger
// ---------------------------------------------------------------------------

/// Pend a PendSV exception to perform a context switch.
///
/// Sets PENDSVSET in the Interrupt Control and State Register (ICSR). From
/// Thread mode with interrupts enabled the switch happens before the next
/// instruction; from a handler or a critical section it happens on exit.
#[inline]
pub fn pend_switch() {
    // ICSR address: 0xE000_ED04, PENDSVSET = bit 28
    const ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
    unsafe {
        core::ptr::write_volatile(ICSR, 1 << 28);
    }
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

// ---------------------------------------------------------------------------
// First thread launch
// ---------------------------------------------------------------------------

/// Start the first thread by switching to PSP and branching to Thread mode.
///
/// Called once from `kernel::launch()` and never returns. `psp` is the
/// thread's saved stack pointer, pointing at the software-saved R4–R11 of
/// its initial stack image.
///
/// # Safety
/// Must only be called once, with a stack pointer produced by
/// `ThreadControlBlock::init_stack()`.
pub unsafe fn start_first_task(psp: *const u32) -> ! {
    asm!(
        // Set PSP to the thread's stack pointer (skip SW-saved R4-R11)
        "adds r0, #32",        // Skip 8 SW registers (8×4 = 32 bytes)
        "msr psp, r0",         // Set process stack pointer

        // Switch to PSP for Thread mode (set CONTROL.SPSEL = 1)
        "movs r0, #2",
        "msr control, r0",
        "isb",

        // Pop the hardware frame manually since we're not really returning from an exception
        "pop {{r0-r3, r12}}",  // R0-R3, R12
        "pop {{r4}}",          // LR (discarded, threads never return)
        "pop {{r5}}",          // PC (thread entry point)
        "pop {{r6}}",          // xPSR (discarded, set by processor)

        // Branch to the thread
        "cpsie i",             // Enable interrupts
        "bx r5",               // Jump to thread entry

        in("r0") psp,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler: performs the actual context switch.
///
/// ## Sequence
/// 1. Save R4–R11 onto the current thread's stack (PSP)
/// 2. Store the updated PSP into the current thread's TCB
/// 3. Run the round-robin selection
/// 4. Load the next thread's PSP from its TCB
/// 5. Restore R4–R11 from the new thread's stack
/// 6. Return from exception (hardware restores R0–R3, R12, LR, PC, xPSR)
///
/// # Safety
/// Naked handler entered directly by the NVIC; follows the Cortex-M4
/// exception entry/exit convention.
#[unsafe(naked)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        // --- Save current context ---
        "mrs r0, psp",             // Get current PSP
        "stmdb r0!, {{r4-r11}}",   // Push R4-R11 onto thread stack

        // Store updated PSP into current TCB
        "bl {save_context}",       // save_current_context(r0: *mut u32)

        // --- Select next thread ---
        "bl {do_schedule}",        // Returns new PSP in r0

        // --- Restore new context ---
        "ldmia r0!, {{r4-r11}}",   // Pop R4-R11 from new thread stack
        "msr psp, r0",             // Set PSP to new thread's stack

        // Return to Thread mode on PSP (EXC_RETURN = 0xFFFFFFFD)
        "ldr r0, =0xFFFFFFFD",
        "bx r0",

        save_context = sym save_current_context,
        do_schedule = sym do_context_switch,
    );
}

/// Save the running thread's stack pointer. Called from PendSV.
unsafe extern "C" fn save_current_context(psp: *mut u32) {
    crate::kernel::save_context(psp);
}

/// Pick the next thread and return its PSP. Called from PendSV.
///
/// If every thread is Sleeping or Blocked, wait for an interrupt and retry.
/// SysTick outranks PendSV, so the tick dispatcher keeps counting down
/// sleepers (and periodic tasks keep signalling) while we wait. The
/// scheduler stays idle meanwhile, so those ticks leave no PendSV pending
/// behind the thread we return to.
unsafe extern "C" fn do_context_switch() -> *mut u32 {
    loop {
        if let Some(psp) = crate::kernel::next_context() {
            return psp;
        }
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler: kernel tick entry point.
///
/// Called at `TICK_HZ`. Runs the tick dispatcher and pends PendSV when the
/// running thread's time slice is used up.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn SysTick() {
    crate::kernel::on_tick();
}
