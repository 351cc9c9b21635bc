//! # Synchronization Primitives
//!
//! Interrupt-safe critical section abstraction. All shared kernel state
//! (run pointer, thread blocking/sleep fields, semaphore counters) is
//! touched only inside one of these.
//!
//! On Cortex-M the implementation comes from `cortex-m`'s
//! `critical-section-single-core` feature (PRIMASK save, `cpsid i`, restore).
//! Host builds use the `std` implementation from `critical-section`.

pub use critical_section::{CriticalSection, Mutex};

/// Execute a closure within a critical section (interrupts disabled).
///
/// Interrupts are disabled on entry and restored to their previous state on
/// exit, so nesting is allowed.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|cs| {
///     // Access shared state safely
/// });
/// ```
///
/// Keep the enclosed work short: the tick dispatcher is held off for as
/// long as the closure runs.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}
