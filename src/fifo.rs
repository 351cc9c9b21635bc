//! # Bounded FIFO
//!
//! Single-producer / single-consumer queue of 32-bit words, built on a
//! counting semaphore that doubles as the occupancy count.
//!
//! The producer is typically a periodic task (interrupt context) and never
//! blocks: a put into a full queue bumps the lost-item counter and fails.
//! "Full" is judged by the slots still holding unread data, not by the
//! semaphore: the counter goes negative while the consumer is blocked and
//! drops as soon as its wait is satisfied, before `take()` frees the slot.
//! The consumer is a thread and blocks on the semaphore while the queue is
//! empty.
//!
//! There is no exclusion between several producers or several consumers.
//! Ordering is still strict FIFO with one of each, because the put index is
//! only ever advanced by the producer and the get index only by the consumer.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use log::warn;

use crate::scheduler::Scheduler;
use crate::semaphore::{Semaphore, WaitResult};

/// Returned by a put into a full FIFO. The item is dropped and counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FifoFull;

impl core::fmt::Display for FifoFull {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("fifo full")
    }
}

/// Ring buffer of `N` words plus its occupancy semaphore.
///
/// Meant to live in a `static`; the semaphore slot is fixed at construction:
///
/// ```ignore
/// static SAMPLES: Fifo<FIFO_SIZE> = Fifo::new(Semaphore::new(3));
/// ```
pub struct Fifo<const N: usize> {
    buffer: UnsafeCell<[u32; N]>,
    put_index: AtomicUsize,
    get_index: AtomicUsize,
    /// Slots written by `try_put()` and not yet consumed by `take()`.
    unread: AtomicUsize,
    lost: AtomicU32,
    size: Semaphore,
}

// Safety: the producer only writes a slot while `unread < N`, i.e. after
// `take()` released it, and the consumer only reads a slot after its wait on
// the size semaphore succeeded, which happens after the write. The two never
// touch the same slot concurrently.
unsafe impl<const N: usize> Sync for Fifo<N> {}

impl<const N: usize> Fifo<N> {
    /// An empty FIFO using `size` as its occupancy semaphore.
    pub const fn new(size: Semaphore) -> Self {
        assert!(N > 0, "fifo capacity must be nonzero");
        Self {
            buffer: UnsafeCell::new([0; N]),
            put_index: AtomicUsize::new(0),
            get_index: AtomicUsize::new(0),
            unread: AtomicUsize::new(0),
            lost: AtomicU32::new(0),
            size,
        }
    }

    /// Empty the queue, reset the lost counter and set the occupancy
    /// semaphore to zero. Call before any producer or consumer runs.
    pub fn init(&self, sched: &mut Scheduler) {
        self.put_index.store(0, Ordering::Relaxed);
        self.get_index.store(0, Ordering::Relaxed);
        self.unread.store(0, Ordering::Relaxed);
        self.lost.store(0, Ordering::Relaxed);
        sched.init_semaphore(self.size, 0);
    }

    /// Non-blocking put, producer side.
    ///
    /// Fails without touching the buffer when `N` slots hold unread items,
    /// including one a woken consumer has not taken yet.
    /// Otherwise stores the item, advances the put index and signals the
    /// occupancy semaphore, which may wake a consumer blocked in a get.
    pub fn try_put(&self, sched: &mut Scheduler, data: u32) -> Result<(), FifoFull> {
        if self.unread.load(Ordering::Acquire) >= N {
            let lost = self.lost.load(Ordering::Relaxed).wrapping_add(1);
            self.lost.store(lost, Ordering::Relaxed);
            warn!("fifo full, {} items lost", lost);
            return Err(FifoFull);
        }

        let put = self.put_index.load(Ordering::Relaxed);
        // Safety: only the producer writes, and slot `put` is not readable
        // by the consumer until the signal below.
        unsafe {
            (*self.buffer.get())[put] = data;
        }
        self.put_index.store((put + 1) % N, Ordering::Release);
        self.unread.fetch_add(1, Ordering::Release);
        sched.signal(self.size);
        Ok(())
    }

    /// Consumer side, first half of a get: wait on the occupancy semaphore.
    ///
    /// On `Blocked` the calling thread must suspend; once it runs again an
    /// item is available. Either way the get completes with `take()`.
    pub fn start_get(&self, sched: &mut Scheduler) -> WaitResult {
        sched.wait(self.size)
    }

    /// Consumer side, second half of a get: read at the get index and
    /// advance it. Only valid after `start_get()` has been satisfied.
    pub fn take(&self) -> u32 {
        let get = self.get_index.load(Ordering::Acquire);
        // Safety: only the consumer reads, and the satisfied wait guarantees
        // the producer finished writing this slot.
        let data = unsafe { (*self.buffer.get())[get] };
        self.get_index.store((get + 1) % N, Ordering::Relaxed);
        self.unread.fetch_sub(1, Ordering::Release);
        data
    }

    /// Number of items dropped by puts into a full queue.
    pub fn lost(&self) -> u32 {
        self.lost.load(Ordering::Relaxed)
    }

    /// Number of items in the buffer that `take()` has not consumed.
    pub fn len(&self) -> usize {
        self.unread.load(Ordering::Acquire)
    }

    /// Whether no item is waiting in the buffer.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity.
    pub const fn capacity(&self) -> usize {
        N
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::tests::launched;

    const SIZE: Semaphore = Semaphore::new(5);

    fn get_now(fifo: &Fifo<4>, s: &mut Scheduler) -> u32 {
        assert_eq!(fifo.start_get(s), WaitResult::Acquired);
        fifo.take()
    }

    #[test]
    fn test_full_fifo_counts_lost_items() {
        let mut s = launched();
        let fifo: Fifo<4> = Fifo::new(SIZE);
        fifo.init(&mut s);

        for i in 0..4 {
            assert_eq!(fifo.try_put(&mut s, i), Ok(()));
        }
        assert_eq!(fifo.len(), 4);

        assert_eq!(fifo.try_put(&mut s, 99), Err(FifoFull));
        assert_eq!(fifo.lost(), 1);
        assert_eq!(fifo.try_put(&mut s, 100), Err(FifoFull));
        assert_eq!(fifo.lost(), 2);

        // Rejected puts left the contents alone
        for i in 0..4 {
            assert_eq!(get_now(&fifo, &mut s), i);
        }
        assert!(fifo.is_empty());
    }

    #[test]
    fn test_order_preserved_across_wraparound() {
        let mut s = launched();
        let fifo: Fifo<4> = Fifo::new(SIZE);
        fifo.init(&mut s);

        let mut next_in = 0;
        let mut next_out = 0;
        for round in 0..5 {
            for _ in 0..(round % 3 + 1) {
                fifo.try_put(&mut s, next_in).unwrap();
                next_in += 1;
            }
            while !fifo.is_empty() {
                assert_eq!(get_now(&fifo, &mut s), next_out);
                next_out += 1;
            }
        }
        assert_eq!(next_in, next_out);
        assert_eq!(fifo.lost(), 0);
    }

    #[test]
    fn test_get_on_empty_blocks_until_put() {
        let mut s = launched();
        let fifo: Fifo<4> = Fifo::new(SIZE);
        fifo.init(&mut s);

        // Consumer is thread 2
        s.current = 2;
        assert_eq!(fifo.start_get(&mut s), WaitResult::Blocked);
        assert!(!s.threads[2].is_runnable());
        assert_eq!(s.schedule(), Some(3));

        // Producer (a periodic task, running while thread 3 is current)
        fifo.try_put(&mut s, 0xBEEF).unwrap();
        assert!(s.threads[2].is_runnable());
        assert_eq!(s.semaphore_value(SIZE), 0);
        assert_eq!(fifo.len(), 1);

        // Consumer resumes and completes its get
        s.current = 1;
        assert_eq!(s.schedule(), Some(2));
        assert_eq!(fifo.take(), 0xBEEF);
    }

    #[test]
    fn test_blocked_consumer_item_not_overwritten() {
        let mut s = launched();
        let fifo: Fifo<4> = Fifo::new(SIZE);
        fifo.init(&mut s);

        // Consumer blocks on the empty queue before the producer runs
        assert_eq!(fifo.start_get(&mut s), WaitResult::Blocked);
        s.schedule();

        let accepted = (0..6).filter(|&i| fifo.try_put(&mut s, i).is_ok()).count();
        assert_eq!(accepted, 4);
        assert_eq!(fifo.lost(), 2);

        // The woken consumer finishes its get, then drains the rest
        let mut received = vec![fifo.take()];
        while !fifo.is_empty() {
            received.push(get_now(&fifo, &mut s));
        }
        assert_eq!(received, [0, 1, 2, 3]);

        // Taking frees a slot for the producer again
        fifo.try_put(&mut s, 9).unwrap();
        assert_eq!(get_now(&fifo, &mut s), 9);
    }

    #[test]
    fn test_init_resets_state() {
        let mut s = launched();
        let fifo: Fifo<4> = Fifo::new(SIZE);
        fifo.init(&mut s);
        for i in 0..6 {
            let _ = fifo.try_put(&mut s, i);
        }
        fifo.init(&mut s);

        assert_eq!(fifo.lost(), 0);
        assert!(fifo.is_empty());
        fifo.try_put(&mut s, 7).unwrap();
        assert_eq!(get_now(&fifo, &mut s), 7);
    }
}
