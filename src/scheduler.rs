//! # Scheduler
//!
//! Core scheduling state for RingOS: the thread ring, the run pointer, the
//! semaphore counters and the tick dispatcher. Everything here is plain
//! data plus methods, with no hardware access, so the whole kernel logic can
//! be driven by host tests. The global instance and the calls into the
//! context-switch port live in `kernel.rs`.
//!
//! ## Scheduling Algorithm
//!
//! Round robin over the ring, skipping Sleeping and Blocked threads:
//! 1. Start at the slot after the run pointer (always advance at least one)
//! 2. Keep following `next` while the candidate is Sleeping or Blocked
//! 3. The first Runnable slot becomes the new run pointer
//!
//! The currently running thread is therefore only picked again after every
//! other slot has been passed over, even when it is the only Runnable one.
//!
//! ## Tick Dispatch
//!
//! At each tick (`tick()`, interrupt context):
//! 1. Every nonzero sleep countdown is decremented
//! 2. The shared tick counter advances modulo the largest registered period
//! 3. Periodic tasks whose period divides the counter are returned to the
//!    caller, in registration order, to be run once the kernel lock is released
//! 4. The running thread's time slice is decremented; expiry requests a switch

use log::{debug, trace, warn};

use crate::config::{MAX_SEMAPHORES, MAX_TIME_SLICE, NUM_PERIODIC, NUM_THREADS};
use crate::thread::{ThreadControlBlock, ThreadEntry};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Misuse of the kernel's configuration API.
///
/// Runtime precondition violations (all threads blocked, a signal with no
/// waiter) are not reported through this type; see `Scheduler::schedule()`
/// and `Scheduler::signal()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// `add_threads()` was already called.
    ThreadsAlreadyAdded,
    /// `launch()` was called before `add_threads()`.
    NoThreads,
    /// Both periodic task slots are taken.
    TooManyPeriodicTasks,
    /// A periodic task period of zero ticks.
    InvalidPeriod,
    /// A time slice of zero or above `MAX_TIME_SLICE`.
    InvalidTimeSlice,
    /// The call is only allowed before `launch()`.
    AlreadyLaunched,
}

impl core::fmt::Display for KernelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            KernelError::ThreadsAlreadyAdded => f.write_str("threads already added"),
            KernelError::NoThreads => f.write_str("no threads added"),
            KernelError::TooManyPeriodicTasks => f.write_str("periodic task slots exhausted"),
            KernelError::InvalidPeriod => f.write_str("periodic task period must be at least 1"),
            KernelError::InvalidTimeSlice => f.write_str("time slice out of range"),
            KernelError::AlreadyLaunched => f.write_str("kernel already launched"),
        }
    }
}

// ---------------------------------------------------------------------------
// Periodic tasks
// ---------------------------------------------------------------------------

/// Periodic task body. Runs at interrupt priority and must not block,
/// sleep or suspend; it may signal semaphores and put into a FIFO.
pub type PeriodicFn = fn();

/// A registered periodic task.
#[derive(Debug, Clone, Copy)]
pub struct PeriodicTask {
    pub task: PeriodicFn,
    pub period: u32,
}

/// Periodic tasks due in one tick, in registration order.
pub type DueTasks = [Option<PeriodicFn>; NUM_PERIODIC];

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The kernel state. Holds the thread ring, the run pointer, the semaphore
/// counters and the tick dispatcher. Stored behind a critical-section mutex
/// in `kernel.rs`.
pub struct Scheduler {
    /// Fixed ring of thread slots.
    pub threads: [ThreadControlBlock; NUM_THREADS],

    /// Index of the running thread (the run pointer).
    pub(crate) current: usize,

    /// Semaphore counters, indexed by `Semaphore::index()`.
    pub(crate) semaphores: [i32; MAX_SEMAPHORES],

    /// Registered periodic tasks.
    periodic: [Option<PeriodicTask>; NUM_PERIODIC],

    /// Largest registered period; the tick counter cycles modulo this.
    max_period: u32,

    /// Shared periodic-task counter, in `0..max_period`.
    tick_counter: u32,

    /// Time slice length in ticks, fixed by `launch()`.
    time_slice: u32,

    /// Ticks left in the running thread's slice.
    slice_remaining: u32,

    /// Set when a context switch should be pended on the way out.
    pub needs_reschedule: bool,

    /// The last decision found nothing Runnable; the port is waiting for a
    /// tick to wake a sleeper.
    idle: bool,

    threads_added: bool,
    launched: bool,
}

impl Scheduler {
    /// Create an empty kernel state: no threads, no periodic tasks, all
    /// semaphore counters zero.
    pub const fn new() -> Self {
        Self {
            threads: [ThreadControlBlock::EMPTY; NUM_THREADS],
            current: 0,
            semaphores: [0; MAX_SEMAPHORES],
            periodic: [None; NUM_PERIODIC],
            max_period: 0,
            tick_counter: 0,
            time_slice: 0,
            slice_remaining: 0,
            needs_reschedule: false,
            idle: false,
            threads_added: false,
            launched: false,
        }
    }

    /// Populate the whole ring. Thread 0 runs first.
    ///
    /// # Errors
    /// - `ThreadsAlreadyAdded` on a second call
    /// - `AlreadyLaunched` after `launch()`
    pub fn add_threads(&mut self, entries: [ThreadEntry; NUM_THREADS]) -> Result<(), KernelError> {
        if self.launched {
            return Err(KernelError::AlreadyLaunched);
        }
        if self.threads_added {
            return Err(KernelError::ThreadsAlreadyAdded);
        }

        for (i, entry) in entries.into_iter().enumerate() {
            self.threads[i].init(i, entry);
        }
        self.current = 0;
        self.threads_added = true;

        debug!("{} threads added", NUM_THREADS);
        Ok(())
    }

    /// Register a periodic task. At most `NUM_PERIODIC` may be registered,
    /// all before `launch()`.
    ///
    /// The tick counter cycles modulo the largest registered period, so a
    /// task whose period does not divide that maximum fires at an uneven
    /// cadence. That is kept as-is and only reported with a warning.
    pub fn add_periodic_task(&mut self, task: PeriodicFn, period: u32) -> Result<(), KernelError> {
        if self.launched {
            return Err(KernelError::AlreadyLaunched);
        }
        if period == 0 {
            return Err(KernelError::InvalidPeriod);
        }
        let slot = self
            .periodic
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(KernelError::TooManyPeriodicTasks)?;
        *slot = Some(PeriodicTask { task, period });

        self.max_period = self.max_period.max(period);
        for registered in self.periodic.iter().flatten() {
            if self.max_period % registered.period != 0 {
                warn!(
                    "periodic task period {} does not divide max period {}; cadence will be uneven",
                    registered.period, self.max_period
                );
            }
        }
        Ok(())
    }

    /// Freeze configuration and arm the time slice. Returns the index of the
    /// thread that starts running (always slot 0).
    ///
    /// `time_slice` counts dispatcher ticks (`1 / TICK_HZ` s each), not
    /// SysTick clock cycles: SysTick always reloads at the tick rate and the
    /// slice is run down in software. The `MAX_TIME_SLICE` bound is kept so
    /// that callers written for a reload-register slice stay in range.
    pub fn launch(&mut self, time_slice: u32) -> Result<usize, KernelError> {
        if self.launched {
            return Err(KernelError::AlreadyLaunched);
        }
        if !self.threads_added {
            return Err(KernelError::NoThreads);
        }
        if time_slice == 0 || time_slice > MAX_TIME_SLICE {
            return Err(KernelError::InvalidTimeSlice);
        }

        self.time_slice = time_slice;
        self.slice_remaining = time_slice;
        self.launched = true;

        debug!("launching thread {} with a {}-tick slice", self.current, time_slice);
        Ok(self.current)
    }

    /// Whether `launch()` has succeeded.
    #[inline]
    pub fn is_launched(&self) -> bool {
        self.launched
    }

    /// Index of the running thread.
    #[inline]
    pub fn current(&self) -> usize {
        self.current
    }

    /// Get a mutable reference to the running thread's TCB.
    pub fn current_tcb_mut(&mut self) -> &mut ThreadControlBlock {
        &mut self.threads[self.current]
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    /// The slot the next decision would pick, without moving the run pointer.
    ///
    /// Walks the ring from the slot after the run pointer, at most one full
    /// lap. `None` means every thread is Sleeping or Blocked.
    pub fn next_runnable(&self) -> Option<usize> {
        let mut candidate = self.threads[self.current].next;
        for _ in 0..NUM_THREADS {
            if self.threads[candidate].is_runnable() {
                return Some(candidate);
            }
            candidate = self.threads[candidate].next;
        }
        None
    }

    /// Advance the run pointer to the next Runnable thread and give it a
    /// full time slice.
    ///
    /// Returns `None`, leaving the run pointer where it was, if no thread is
    /// Runnable. Callers must not create that state on purpose; the
    /// Cortex-M4 port retries with interrupts enabled so a sleeping thread
    /// can be woken by the tick dispatcher. Until a later call succeeds,
    /// ticks neither run down the time slice nor request a switch, so the
    /// thread eventually picked is not preempted by a stale request.
    pub fn schedule(&mut self) -> Option<usize> {
        self.needs_reschedule = false;
        let Some(next) = self.next_runnable() else {
            self.idle = true;
            return None;
        };
        trace!("switch {} -> {}", self.current, next);
        self.current = next;
        self.slice_remaining = self.time_slice;
        self.idle = false;
        Some(next)
    }

    /// Cooperatively give up the rest of the time slice.
    ///
    /// The caller pends the context switch once it leaves the critical
    /// section; the next thread starts with a full slice.
    pub fn suspend(&mut self) {
        self.slice_remaining = self.time_slice;
        self.needs_reschedule = true;
    }

    /// Put the running thread to sleep for `ticks` ticks and suspend.
    /// `sleep(0)` is a plain yield.
    pub fn sleep(&mut self, ticks: u32) {
        let current = self.current;
        self.threads[current].sleep = ticks;
        self.suspend();
    }

    // -----------------------------------------------------------------------
    // Tick dispatch
    // -----------------------------------------------------------------------

    /// One tick of the dispatcher. Called from interrupt context with the
    /// kernel lock held.
    ///
    /// Sleep countdowns are decremented before the due periodic tasks are
    /// computed. The tasks are returned rather than called so they can take
    /// the kernel lock themselves (to signal a semaphore, say).
    pub fn tick(&mut self) -> DueTasks {
        for thread in self.threads.iter_mut() {
            if thread.sleep > 0 {
                thread.sleep -= 1;
            }
        }

        let due = self.due_periodic_tasks();

        if self.launched && !self.idle {
            self.slice_remaining = self.slice_remaining.saturating_sub(1);
            if self.slice_remaining == 0 {
                self.needs_reschedule = true;
            }
        }

        due
    }

    /// Advance the periodic counter and collect the tasks that fire.
    fn due_periodic_tasks(&mut self) -> DueTasks {
        let mut due = [None; NUM_PERIODIC];
        if self.max_period == 0 {
            return due;
        }

        self.tick_counter = (self.tick_counter + 1) % self.max_period;
        for (slot, registered) in due.iter_mut().zip(self.periodic.iter()) {
            if let Some(p) = registered {
                if self.tick_counter % p.period == 0 {
                    *slot = Some(p.task);
                }
            }
        }
        due
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::semaphore::Semaphore;
    use crate::thread::ThreadState;

    extern "C" fn idle() -> ! {
        loop {}
    }

    pub(crate) fn launched() -> Scheduler {
        let mut s = Scheduler::new();
        s.add_threads([idle; NUM_THREADS]).unwrap();
        s.launch(10).unwrap();
        s
    }

    fn noop() {}

    #[test]
    fn test_round_robin_visits_each_thread_once() {
        let mut s = launched();
        s.current = 2;

        let mut visited = [0usize; NUM_THREADS];
        for slot in visited.iter_mut() {
            *slot = s.schedule().unwrap();
        }

        assert_eq!(visited, [3, 4, 5, 0, 1, 2]);
    }

    #[test]
    fn test_sole_runnable_thread_is_reselected() {
        let mut s = launched();
        for i in 1..NUM_THREADS {
            s.threads[i].sleep = 100;
        }
        assert_eq!(s.schedule(), Some(0));
        assert_eq!(s.current(), 0);
    }

    #[test]
    fn test_skips_sleeping_and_blocked() {
        let mut s = launched();
        s.threads[1].sleep = 4;
        s.threads[2].blocked = Some(Semaphore::new(0));

        assert_eq!(s.schedule(), Some(3));
        assert_eq!(s.threads[1].state(), ThreadState::Sleeping);
    }

    #[test]
    fn test_no_runnable_thread_leaves_run_pointer() {
        let mut s = launched();
        s.current = 4;
        for t in s.threads.iter_mut() {
            t.blocked = Some(Semaphore::new(1));
        }
        assert_eq!(s.next_runnable(), None);
        assert_eq!(s.schedule(), None);
        assert_eq!(s.current(), 4);
    }

    #[test]
    fn test_sleeping_thread_skipped_until_countdown_expires() {
        // T0..T2 live, the rest parked; T1 sleeps 5 at tick 0.
        let mut s = launched();
        for i in 3..NUM_THREADS {
            s.threads[i].blocked = Some(Semaphore::new(7));
        }
        s.current = 1;
        s.sleep(5);

        for _tick in 1..=5 {
            // Decisions during ticks 1..=5 never land on T1
            for _ in 0..3 {
                assert_ne!(s.schedule(), Some(1));
            }
            s.tick();
        }

        // Tick 6: T1 is eligible again
        s.current = 0;
        assert_eq!(s.schedule(), Some(1));
    }

    #[test]
    fn test_time_slice_expiry_requests_switch() {
        let mut s = launched();
        for _ in 0..9 {
            s.tick();
            assert!(!s.needs_reschedule);
        }
        s.tick();
        assert!(s.needs_reschedule);

        // A switch restores a full slice
        s.schedule();
        assert!(!s.needs_reschedule);
        s.tick();
        assert!(!s.needs_reschedule);
    }

    #[test]
    fn test_thread_woken_after_idle_gets_full_slice() {
        let mut s = launched();
        for i in 1..NUM_THREADS {
            s.threads[i].blocked = Some(Semaphore::new(7));
        }

        // The only unblocked thread sleeps: nothing can run
        s.sleep(3);
        assert_eq!(s.schedule(), None);
        assert!(!s.needs_reschedule);

        // Ticks while idle must not queue up a switch
        for _ in 0..3 {
            s.tick();
            assert!(!s.needs_reschedule);
        }

        // Thread 0 wakes; once it runs, another thread becomes Runnable and
        // thread 0 still keeps the CPU for its whole slice
        assert_eq!(s.schedule(), Some(0));
        s.threads[1].blocked = None;
        for _ in 0..9 {
            s.tick();
            assert!(!s.needs_reschedule);
        }
        s.tick();
        assert!(s.needs_reschedule);
    }

    #[test]
    fn test_suspend_grants_next_thread_full_slice() {
        let mut s = launched();
        for _ in 0..7 {
            s.tick();
        }
        s.suspend();
        assert!(s.needs_reschedule);
        assert_eq!(s.schedule(), Some(1));
        for _ in 0..9 {
            s.tick();
        }
        assert!(!s.needs_reschedule);
    }

    #[test]
    fn test_sleep_zero_yields_without_sleeping() {
        let mut s = launched();
        s.sleep(0);
        assert!(s.needs_reschedule);
        assert!(s.threads[0].is_runnable());
    }

    #[test]
    fn test_periodic_tasks_fire_by_divisibility() {
        let mut s = Scheduler::new();
        s.add_periodic_task(noop, 1).unwrap();
        s.add_periodic_task(noop, 4).unwrap();

        let mut fired = [[false; NUM_PERIODIC]; 8];
        for tick in fired.iter_mut() {
            let due = s.tick();
            for (f, d) in tick.iter_mut().zip(due.iter()) {
                *f = d.is_some();
            }
        }

        // Counter runs 1,2,3,0,1,2,3,0
        for (i, tick) in fired.iter().enumerate() {
            assert!(tick[0]);
            assert_eq!(tick[1], i % 4 == 3);
        }
    }

    #[test]
    fn test_non_divisor_period_fires_unevenly() {
        let mut s = Scheduler::new();
        s.add_periodic_task(noop, 3).unwrap();
        s.add_periodic_task(noop, 4).unwrap();

        let fired: [bool; 8] = core::array::from_fn(|_| s.tick()[0].is_some());

        // Counter runs 1,2,3,0,1,2,3,0: period-3 task fires at 3 and 0
        assert_eq!(fired, [false, false, true, true, false, false, true, true]);
    }

    #[test]
    fn test_sleep_decremented_every_tick() {
        let mut s = launched();
        s.threads[3].sleep = 2;
        s.tick();
        assert_eq!(s.threads[3].sleep, 1);
        s.tick();
        s.tick();
        assert_eq!(s.threads[3].sleep, 0);
    }

    #[test]
    fn test_configuration_errors() {
        let mut s = Scheduler::new();
        assert_eq!(s.launch(10), Err(KernelError::NoThreads));
        assert_eq!(s.add_periodic_task(noop, 0), Err(KernelError::InvalidPeriod));
        s.add_periodic_task(noop, 1).unwrap();
        s.add_periodic_task(noop, 2).unwrap();
        assert_eq!(s.add_periodic_task(noop, 2), Err(KernelError::TooManyPeriodicTasks));

        s.add_threads([idle; NUM_THREADS]).unwrap();
        assert_eq!(s.add_threads([idle; NUM_THREADS]), Err(KernelError::ThreadsAlreadyAdded));
        assert_eq!(s.launch(0), Err(KernelError::InvalidTimeSlice));
        assert_eq!(s.launch(MAX_TIME_SLICE + 1), Err(KernelError::InvalidTimeSlice));
        assert_eq!(s.launch(MAX_TIME_SLICE), Ok(0));
        assert_eq!(s.launch(1), Err(KernelError::AlreadyLaunched));
    }
}
