//! # Counting Semaphores
//!
//! Blocking counting semaphores built on the scheduler's suspend path.
//!
//! A `Semaphore` is a small copyable handle naming one slot of the
//! scheduler's counter table. Threads record the handle they block on, so
//! "which thread waits on what" is a plain handle comparison.
//!
//! The counter obeys `value = initial + signals - waits`. A negative value's
//! magnitude is the number of threads blocked on the semaphore.
//!
//! Wake order is ring order starting after the run pointer, not arrival
//! order. The wake search is O(`NUM_THREADS`), which is fixed and small.

use log::{error, trace};

use crate::config::MAX_SEMAPHORES;
use crate::scheduler::Scheduler;

/// Handle to one semaphore counter.
///
/// Handles are assigned statically; each semaphore in the firmware uses a
/// distinct slot below `MAX_SEMAPHORES`:
///
/// ```ignore
/// const MUTEX: Semaphore = Semaphore::new(0);
/// const DATA_READY: Semaphore = Semaphore::new(1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Semaphore(u8);

impl Semaphore {
    /// Handle for counter slot `slot`. Fails const evaluation if the slot is
    /// out of range.
    pub const fn new(slot: u8) -> Self {
        assert!((slot as usize) < MAX_SEMAPHORES, "semaphore slot out of range");
        Self(slot)
    }

    /// Index into the counter table.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Result of a `wait()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// The counter stayed non-negative; the caller proceeds.
    Acquired,
    /// The caller is now Blocked and must suspend. It resumes once a
    /// `signal()` clears its blocking reference.
    Blocked,
}

impl Scheduler {
    /// Set the counter to `initial`. No thread is woken or blocked.
    pub fn init_semaphore(&mut self, sem: Semaphore, initial: i32) {
        self.semaphores[sem.index()] = initial;
    }

    /// Current counter value.
    #[inline]
    pub fn semaphore_value(&self, sem: Semaphore) -> i32 {
        self.semaphores[sem.index()]
    }

    /// Decrement the counter; if it went negative, block the running thread
    /// on `sem` and request a switch.
    pub fn wait(&mut self, sem: Semaphore) -> WaitResult {
        let value = &mut self.semaphores[sem.index()];
        *value -= 1;
        if *value >= 0 {
            return WaitResult::Acquired;
        }

        trace!("thread {} blocks on {:?} ({})", self.current, sem, *value);
        self.current_tcb_mut().blocked = Some(sem);
        self.suspend();
        WaitResult::Blocked
    }

    /// Increment the counter; if a thread is waiting, clear the blocking
    /// reference of the first one found in ring order after the run pointer.
    ///
    /// The woken thread does not run immediately, it becomes eligible at the
    /// next scheduling decision. Returns its index.
    ///
    /// A non-positive counter with no blocked thread means the counter
    /// invariant was broken. That trips a debug assertion; release builds
    /// log it and wake nobody.
    pub fn signal(&mut self, sem: Semaphore) -> Option<usize> {
        let value = &mut self.semaphores[sem.index()];
        *value += 1;
        if *value > 0 {
            return None;
        }

        let mut candidate = self.threads[self.current].next;
        for _ in 0..self.threads.len() {
            if self.threads[candidate].blocked == Some(sem) {
                self.threads[candidate].blocked = None;
                trace!("{:?} wakes thread {}", sem, candidate);
                return Some(candidate);
            }
            candidate = self.threads[candidate].next;
        }

        error!("{:?} signalled at {} with no blocked thread", sem, self.semaphores[sem.index()]);
        debug_assert!(false, "semaphore counter negative without a waiter");
        None
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
