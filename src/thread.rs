//! # Thread Control Block
//!
//! Defines the thread model for RingOS. The kernel owns a fixed ring of
//! `NUM_THREADS` slots; each slot carries its own stack, the saved stack
//! pointer, the ring link, and the two fields that decide whether the
//! scheduler may pick it: a blocking reference and a sleep countdown.
//!
//! Slots are populated once by `Scheduler::add_threads()` and never created
//! or destroyed afterwards.

use crate::config::{INITIAL_XPSR, NUM_THREADS, STACK_WORDS};
use crate::semaphore::Semaphore;

/// Thread entry point. Threads never return.
pub type ThreadEntry = extern "C" fn() -> !;

/// Number of words in the initial stack image (8 hardware + 8 software).
pub const FRAME_WORDS: usize = 16;

// ---------------------------------------------------------------------------
// Thread state
// ---------------------------------------------------------------------------

/// Scheduling state of a thread, derived from its blocking reference and
/// sleep countdown.
///
/// ```text
///   ┌──────────┐   wait() < 0    ┌─────────┐
///   │ Runnable │ ──────────────► │ Blocked │
///   └──────────┘ ◄────────────── └─────────┘
///     │    ▲       signal()
///     │    │
///  sleep(n) │ countdown reaches 0
///     ▼    │
///   ┌──────────┐
///   │ Sleeping │
///   └──────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Neither blocked nor sleeping; eligible at the next decision.
    Runnable,
    /// Sleep countdown is nonzero.
    Sleeping,
    /// Blocked on the given semaphore.
    Blocked(Semaphore),
}

// ---------------------------------------------------------------------------
// Stack
// ---------------------------------------------------------------------------

/// Private stack memory of one thread. Aligned to 8 bytes as required by
/// the ARM AAPCS for the exception frame.
#[repr(C, align(8))]
pub struct Stack(pub [u32; STACK_WORDS]);

// ---------------------------------------------------------------------------
// Thread Control Block
// ---------------------------------------------------------------------------

/// Thread Control Block (TCB), one per ring slot.
///
/// The saved stack pointer is kept as a word offset into `stack` rather than
/// a raw pointer, so a `ThreadControlBlock` can be moved (host tests build
/// schedulers on the test thread's stack). The arch layer converts it to and
/// from the PSP value with `stack_ptr()` / `set_stack_ptr()`.
pub struct ThreadControlBlock {
    /// Word offset of the saved stack pointer within `stack`.
    pub sp: usize,

    /// Index of the next slot in the ring.
    pub next: usize,

    /// Semaphore this thread is blocked on, if any.
    pub blocked: Option<Semaphore>,

    /// Ticks left to sleep. Zero means awake.
    pub sleep: u32,

    /// Per-thread stack memory.
    pub stack: Stack,
}

impl ThreadControlBlock {
    /// An unpopulated slot. Used to initialize the static ring.
    pub const EMPTY: Self = Self {
        sp: STACK_WORDS,
        next: 0,
        blocked: None,
        sleep: 0,
        stack: Stack([0; STACK_WORDS]),
    };

    /// Populate slot `index` of the ring with a thread starting at `entry`.
    ///
    /// Clears the blocking reference and sleep countdown, links the slot to
    /// `(index + 1) % NUM_THREADS`, and writes the initial stack image.
    pub fn init(&mut self, index: usize, entry: ThreadEntry) {
        self.next = (index + 1) % NUM_THREADS;
        self.blocked = None;
        self.sleep = 0;
        self.init_stack(entry as usize as u32);
    }

    /// Write the initial stack image so that the first context restore
    /// starts executing at `entry_address`.
    ///
    /// ## Stack Layout (top = high address, growing down)
    ///
    /// ```text
    /// [Hardware stacked frame]
    ///   xPSR  0x0100_0000 (Thumb bit)
    ///   PC    entry point
    ///   LR    0x1414_1414
    ///   R12   0x1212_1212
    ///   R3    0x0303_0303
    ///   R2    0x0202_0202
    ///   R1    0x0101_0101
    ///   R0    0x0000_0000
    /// [Software saved context]
    ///   R11   0x1111_1111
    ///   ...
    ///   R4    0x0404_0404   <- sp after init
    /// ```
    ///
    /// Register values other than PC and xPSR are test patterns, which makes
    /// a corrupted restore easy to spot in a debugger.
    pub fn init_stack(&mut self, entry_address: u32) {
        const TOP: usize = STACK_WORDS;
        let s = &mut self.stack.0;

        s[TOP - 1] = INITIAL_XPSR; // xPSR
        s[TOP - 2] = entry_address; // PC
        s[TOP - 3] = 0x1414_1414; // LR (R14)
        s[TOP - 4] = 0x1212_1212; // R12
        s[TOP - 5] = 0x0303_0303; // R3
        s[TOP - 6] = 0x0202_0202; // R2
        s[TOP - 7] = 0x0101_0101; // R1
        s[TOP - 8] = 0x0000_0000; // R0
        s[TOP - 9] = 0x1111_1111; // R11
        s[TOP - 10] = 0x1010_1010; // R10
        s[TOP - 11] = 0x0909_0909; // R9
        s[TOP - 12] = 0x0808_0808; // R8
        s[TOP - 13] = 0x0707_0707; // R7
        s[TOP - 14] = 0x0606_0606; // R6
        s[TOP - 15] = 0x0505_0505; // R5
        s[TOP - 16] = 0x0404_0404; // R4

        self.sp = TOP - FRAME_WORDS;
    }

    /// Current scheduling state.
    pub fn state(&self) -> ThreadState {
        match self.blocked {
            Some(sem) => ThreadState::Blocked(sem),
            None if self.sleep > 0 => ThreadState::Sleeping,
            None => ThreadState::Runnable,
        }
    }

    /// Neither blocked nor sleeping.
    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.blocked.is_none() && self.sleep == 0
    }

    /// Saved stack pointer as a raw pointer into this thread's stack.
    pub fn stack_ptr(&mut self) -> *mut u32 {
        // sp never exceeds STACK_WORDS, so this stays within (or one past)
        // the stack array.
        self.stack.0.as_mut_ptr().wrapping_add(self.sp)
    }

    /// Record the stack pointer saved by the context switch.
    pub fn set_stack_ptr(&mut self, psp: *mut u32) {
        let base = self.stack.0.as_ptr() as usize;
        let offset = (psp as usize).wrapping_sub(base) / core::mem::size_of::<u32>();
        debug_assert!(offset <= STACK_WORDS, "saved PSP outside thread stack");
        self.sp = offset.min(STACK_WORDS);
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn spin() -> ! {
        loop {}
    }

    #[test]
    fn test_init_links_ring_and_clears_state() {
        let mut tcb = ThreadControlBlock::EMPTY;
        tcb.blocked = Some(Semaphore::new(2));
        tcb.sleep = 9;

        tcb.init(NUM_THREADS - 1, spin);

        assert_eq!(tcb.next, 0);
        assert_eq!(tcb.blocked, None);
        assert_eq!(tcb.sleep, 0);
        assert_eq!(tcb.state(), ThreadState::Runnable);
    }

    #[test]
    fn test_initial_stack_image() {
        let mut tcb = ThreadControlBlock::EMPTY;
        tcb.init_stack(0x0000_1235);

        assert_eq!(tcb.sp, STACK_WORDS - FRAME_WORDS);
        let frame = &tcb.stack.0[tcb.sp..];
        // R4..R11, then R0..R3, R12, LR, PC, xPSR
        assert_eq!(frame[0], 0x0404_0404);
        assert_eq!(frame[7], 0x1111_1111);
        assert_eq!(frame[8], 0);
        assert_eq!(frame[13], 0x1414_1414);
        assert_eq!(frame[14], 0x0000_1235);
        assert_eq!(frame[15], INITIAL_XPSR);
        assert!(frame.iter().enumerate().all(|(i, &w)| i == 8 || w != 0));
    }

    #[test]
    fn test_entry_function_lands_in_pc_slot() {
        let mut tcb = ThreadControlBlock::EMPTY;
        tcb.init(0, spin);
        assert_eq!(tcb.stack.0[STACK_WORDS - 2], spin as usize as u32);
    }

    #[test]
    fn test_state_precedence() {
        let mut tcb = ThreadControlBlock::EMPTY;
        tcb.sleep = 3;
        assert_eq!(tcb.state(), ThreadState::Sleeping);
        assert!(!tcb.is_runnable());

        tcb.sleep = 0;
        tcb.blocked = Some(Semaphore::new(1));
        assert_eq!(tcb.state(), ThreadState::Blocked(Semaphore::new(1)));
        assert!(!tcb.is_runnable());
    }

    #[test]
    fn test_stack_pointer_round_trip() {
        let mut tcb = ThreadControlBlock::EMPTY;
        tcb.init_stack(0x100);
        let psp = tcb.stack_ptr();
        // PendSV pops R4-R11 and later pushes them back 8 words lower
        tcb.set_stack_ptr(psp.wrapping_add(8));
        assert_eq!(tcb.sp, STACK_WORDS - FRAME_WORDS + 8);
    }
}
