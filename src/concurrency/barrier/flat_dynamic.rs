//! `FlatDynamic` — a single-word barrier whose participant set can grow or
//! shrink at runtime via `opt_in`/`opt_out`.
//!
//! Ground truth: `examples/original_source/include/DynBar/FlatMultiDynamicBarrier.hpp`
//! with `max_barriers == 1` (no phase index to track).

#[cfg(not(loom))]
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{AtomicU64, Ordering};

const ORDER: Ordering = Ordering::SeqCst;

const EXITING_BIT: u64 = 1 << 62;
const COUNT_MASK: u64 = (1 << 31) - 1;
const THREADS_SHIFT: u32 = 31;

#[inline(always)]
fn pack(exiting: bool, threads: u32, waiting: u32) -> u64 {
    debug_assert!(u64::from(threads) <= COUNT_MASK);
    debug_assert!(u64::from(waiting) <= COUNT_MASK);
    (u64::from(exiting) << 62) | (u64::from(threads) << THREADS_SHIFT) | u64::from(waiting)
}

#[inline(always)]
fn unpack(word: u64) -> (bool, u32, u32) {
    let exiting = word & EXITING_BIT != 0;
    let threads = ((word >> THREADS_SHIFT) & COUNT_MASK) as u32;
    let waiting = (word & COUNT_MASK) as u32;
    (exiting, threads, waiting)
}

/// A barrier whose enrolled participant count changes at runtime via
/// [`opt_in`](Self::opt_in)/[`opt_out`](Self::opt_out), rather than being
/// fixed at construction.
///
/// The packed word holds one spare bit (state:1, threads:31, waiting:31 in a
/// 64-bit word) and is updated with a single compare-exchange per
/// transition.
pub struct FlatDynamic {
    max_threads: u32,
    word: AtomicU64,
}

impl FlatDynamic {
    /// Creates a barrier that can hold up to `max_threads` enrolled
    /// participants, with `initial_enrolled` already opted in.
    #[must_use]
    pub fn new(max_threads: u32, initial_enrolled: u32) -> Self {
        debug_assert!(initial_enrolled <= max_threads);
        Self {
            max_threads,
            word: AtomicU64::new(pack(false, initial_enrolled, 0)),
        }
    }

    /// The capacity this barrier was constructed with.
    pub fn max_threads(&self) -> u32 {
        self.max_threads
    }

    /// The number of participants currently enrolled (opted in).
    ///
    /// This is an instantaneous, unstable snapshot intended for telemetry.
    pub fn opted_in(&self) -> u32 {
        unpack(self.word.load(ORDER)).1
    }

    /// The number of enrolled participants currently blocked at the
    /// rendezvous point.
    ///
    /// This is an instantaneous, unstable snapshot intended for telemetry.
    pub fn waiting(&self) -> u32 {
        unpack(self.word.load(ORDER)).2
    }

    /// Enrolls the calling thread, incrementing `threads`.
    ///
    /// Only legal while the barrier is quiescent (`waiting == 0` and no
    /// phase is draining); spins until that holds.
    pub fn opt_in(&self) {
        let mut cur = self.word.load(ORDER);
        loop {
            let (_, threads, _) = unpack(cur);
            let assumed = pack(false, threads, 0);
            let new = pack(false, threads + 1, 0);
            match self.word.compare_exchange_weak(assumed, new, ORDER, ORDER) {
                Ok(_) => return,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Disenrolls the calling thread, decrementing `threads`.
    ///
    /// Allowed at any point while `state == ENTERING` and `waiting <
    /// threads` — deliberately *not* gated on full quiescence, since a
    /// thread opting out may itself be the one other arrivals are blocked
    /// waiting for. If this decrement closes the gap (`waiting == threads`
    /// afterward, with at least one thread left), the state flips to
    /// `EXITING` in the same compare-exchange, releasing the waiters.
    pub fn opt_out(&self) {
        let mut old = self.word.load(ORDER);
        loop {
            let (mut exiting, mut threads, mut waiting) = unpack(old);
            while exiting || waiting == threads {
                old = self.word.load(ORDER);
                let u = unpack(old);
                exiting = u.0;
                threads = u.1;
                waiting = u.2;
            }
            let new_threads = threads - 1;
            let new_exiting = waiting == new_threads && new_threads != 0;
            let new = pack(new_exiting, new_threads, waiting);
            match self.word.compare_exchange_weak(old, new, ORDER, ORDER) {
                Ok(_) => return,
                Err(actual) => old = actual,
            }
        }
    }

    /// Arrives at the barrier, blocking until every enrolled participant has
    /// arrived, then returns this call's 0-based arrival order within the
    /// phase.
    pub fn arrive(&self) -> u32 {
        let mut old = self.word.load(ORDER);
        let pre_waiting;
        loop {
            let (exiting, threads, waiting) = unpack(old);
            if exiting {
                // A prior phase is still draining; admission for the next
                // phase must wait for it to finish.
                old = self.word.load(ORDER);
                continue;
            }
            let new_waiting = waiting + 1;
            let new_exiting = new_waiting == threads;
            let new = pack(new_exiting, threads, new_waiting);
            match self.word.compare_exchange_weak(old, new, ORDER, ORDER) {
                Ok(prev) => {
                    pre_waiting = unpack(prev).2;
                    break;
                }
                Err(actual) => old = actual,
            }
        }

        // Wait for the phase to start draining.
        while !unpack(self.word.load(ORDER)).0 {
            std::hint::spin_loop();
        }

        // Drain: decrement waiting, flipping back to ENTERING on the last exit.
        let mut old = self.word.load(ORDER);
        loop {
            let (_, threads, waiting) = unpack(old);
            let new_waiting = waiting - 1;
            let new_exiting = new_waiting != 0;
            let new = pack(new_exiting, threads, new_waiting);
            match self.word.compare_exchange_weak(old, new, ORDER, ORDER) {
                Ok(_) => break,
                Err(actual) => old = actual,
            }
        }

        pre_waiting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn single_thread_rendezvous() {
        let barrier = FlatDynamic::new(1, 1);
        assert_eq!(barrier.arrive(), 0);
        assert_eq!(barrier.waiting(), 0);
    }

    #[test]
    fn four_threads_distinct_orders() {
        let barrier = Arc::new(FlatDynamic::new(4, 4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let barrier = barrier.clone();
                thread::spawn(move || barrier.arrive())
            })
            .collect();
        let mut orders: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        orders.sort_unstable();
        assert_eq!(orders, vec![0, 1, 2, 3]);
    }

    #[test]
    fn opt_out_of_last_enrolled_returns_to_neutral() {
        let barrier = FlatDynamic::new(4, 1);
        barrier.opt_out();
        assert_eq!(barrier.opted_in(), 0);
        assert_eq!(barrier.waiting(), 0);
    }

    #[test]
    fn opt_out_while_others_wait_releases_them() {
        // T1 and T2 are enrolled and arrive; T3 is enrolled but opts out
        // instead of arriving, closing the gap for T1/T2.
        let barrier = Arc::new(FlatDynamic::new(4, 3));

        let b1 = barrier.clone();
        let b2 = barrier.clone();
        let h1 = thread::spawn(move || b1.arrive());
        let h2 = thread::spawn(move || b2.arrive());

        // Give T1/T2 a chance to reach the rendezvous before T3 opts out.
        while barrier.waiting() < 2 {
            thread::yield_now();
        }
        barrier.opt_out();

        let mut orders = vec![h1.join().unwrap(), h2.join().unwrap()];
        orders.sort_unstable();
        assert_eq!(orders, vec![0, 1]);
        assert_eq!(barrier.opted_in(), 2);
        assert_eq!(barrier.waiting(), 0);
    }
}
