//! # Host Port
//!
//! Stand-in for the context-switch hardware on development machines.
//! Switch requests are counted instead of performed; a test harness services
//! them by calling `kernel::switch_context()` or by driving a `Scheduler`
//! directly. A thread that blocks in `kernel::wait()` therefore returns
//! immediately on the host.

use core::sync::atomic::{AtomicUsize, Ordering};

static SWITCH_REQUESTS: AtomicUsize = AtomicUsize::new(0);

/// Nothing to configure; interrupts do not exist on the host.
pub fn init() {}

/// Record a context switch request.
#[inline]
pub fn pend_switch() {
    SWITCH_REQUESTS.fetch_add(1, Ordering::Relaxed);
}

/// Number of switch requests since the last call, resetting the count.
pub fn take_switch_requests() -> usize {
    SWITCH_REQUESTS.swap(0, Ordering::Relaxed)
}
