//! `FlatMultiDynamic` — [`super::FlatDynamic`] extended with a configurable
//! cycle of phases, each addressed by an index.
//!
//! Ground truth: `examples/original_source/include/DynBar/FlatMultiDynamicBarrier.hpp`.

use std::sync::atomic::{AtomicU64, Ordering};

const ORDER: Ordering = Ordering::SeqCst;

const EXITING_BIT: u64 = 1 << 63;
const INDEX_SHIFT: u32 = 56;
const INDEX_MASK: u64 = (1 << 7) - 1;
const THREADS_SHIFT: u32 = 28;
const COUNT_MASK: u64 = (1 << 28) - 1;

#[inline(always)]
fn pack(exiting: bool, index: u8, threads: u32, waiting: u32) -> u64 {
    debug_assert!(u64::from(index) <= INDEX_MASK);
    debug_assert!(u64::from(threads) <= COUNT_MASK);
    debug_assert!(u64::from(waiting) <= COUNT_MASK);
    (u64::from(exiting) << 63)
        | (u64::from(index) << INDEX_SHIFT)
        | (u64::from(threads) << THREADS_SHIFT)
        | u64::from(waiting)
}

#[inline(always)]
fn unpack(word: u64) -> (bool, u8, u32, u32) {
    let exiting = word & EXITING_BIT != 0;
    let index = ((word >> INDEX_SHIFT) & INDEX_MASK) as u8;
    let threads = ((word >> THREADS_SHIFT) & COUNT_MASK) as u32;
    let waiting = (word & COUNT_MASK) as u32;
    (exiting, index, threads, waiting)
}

/// A barrier implementing a cycle of `max_phases` logical barriers, sharing
/// one dynamic participant set.
///
/// The phase `index` advances modulo `max_phases` each time the cycle's
/// current phase fully drains, in the same compare-exchange that flips the
/// state back to `ENTERING`. `opt_in`/`opt_out` additionally require
/// `index == 0` (the cycle is at its home position), bounding the latency
/// of a pending membership change to one full cycle rather than one phase.
pub struct FlatMultiDynamic {
    max_threads: u32,
    max_phases: u8,
    word: AtomicU64,
}

impl FlatMultiDynamic {
    /// Maximum number of phases a single cycle may have (bounded by the
    /// packed word's 7-bit `index` field).
    pub const MAX_PHASES: u8 = 127;

    /// Creates a barrier with `max_phases` phases per cycle, capacity for
    /// `max_threads` enrolled participants, and `initial_enrolled` already
    /// opted in.
    #[must_use]
    pub fn new(max_phases: u8, max_threads: u32, initial_enrolled: u32) -> Self {
        debug_assert!(max_phases >= 1);
        debug_assert!(initial_enrolled <= max_threads);
        Self {
            max_threads,
            max_phases,
            word: AtomicU64::new(pack(false, 0, initial_enrolled, 0)),
        }
    }

    /// The capacity this barrier was constructed with.
    pub fn max_threads(&self) -> u32 {
        self.max_threads
    }

    /// The number of phases in one cycle.
    pub fn max_phases(&self) -> u8 {
        self.max_phases
    }

    /// The number of participants currently enrolled (opted in).
    ///
    /// This is an instantaneous, unstable snapshot intended for telemetry.
    pub fn opted_in(&self) -> u32 {
        unpack(self.word.load(ORDER)).2
    }

    /// The number of enrolled participants currently blocked at the
    /// rendezvous point.
    ///
    /// This is an instantaneous, unstable snapshot intended for telemetry.
    pub fn waiting(&self) -> u32 {
        unpack(self.word.load(ORDER)).3
    }

    /// The phase index currently being served.
    ///
    /// This is an instantaneous, unstable snapshot intended for telemetry.
    pub fn index(&self) -> u8 {
        unpack(self.word.load(ORDER)).1
    }

    /// Enrolls the calling thread, incrementing `threads`.
    ///
    /// Requires the cycle be at its home position (`index == 0`) and
    /// quiescent; spins until that holds.
    pub fn opt_in(&self) {
        let mut cur = self.word.load(ORDER);
        loop {
            let (_, _, threads, _) = unpack(cur);
            let assumed = pack(false, 0, threads, 0);
            let new = pack(false, 0, threads + 1, 0);
            match self.word.compare_exchange_weak(assumed, new, ORDER, ORDER) {
                Ok(_) => return,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Disenrolls the calling thread, decrementing `threads`.
    ///
    /// Allowed whenever the cycle is at its home position (`index == 0`),
    /// the state is `ENTERING`, and `waiting < threads` — not gated on full
    /// quiescence, for the same deadlock-avoidance reason as
    /// [`FlatDynamic::opt_out`](super::FlatDynamic::opt_out). If the
    /// decrement closes the gap, the state flips to `EXITING` in the same
    /// compare-exchange.
    pub fn opt_out(&self) {
        let mut old = self.word.load(ORDER);
        loop {
            let (mut exiting, mut index, mut threads, mut waiting) = unpack(old);
            while exiting || waiting == threads || index != 0 {
                old = self.word.load(ORDER);
                let u = unpack(old);
                exiting = u.0;
                index = u.1;
                threads = u.2;
                waiting = u.3;
            }
            let new_threads = threads - 1;
            let new_exiting = waiting == new_threads && new_threads != 0;
            let new = pack(new_exiting, index, new_threads, waiting);
            match self.word.compare_exchange_weak(old, new, ORDER, ORDER) {
                Ok(_) => return,
                Err(actual) => old = actual,
            }
        }
    }

    /// Arrives at phase `phase` of the cycle, blocking until every enrolled
    /// participant has arrived at that phase, then returns this call's
    /// 0-based arrival order within the phase.
    ///
    /// If the barrier's cycle is currently serving a different phase, this
    /// call spins until the cycle reaches `phase`.
    pub fn arrive(&self, phase: u8) -> u32 {
        debug_assert!(phase < self.max_phases);

        let mut old = self.word.load(ORDER);
        let pre_waiting;
        loop {
            let (exiting, index, threads, waiting) = unpack(old);
            if exiting || index != phase {
                // Either this phase is still draining from a prior round,
                // or the cycle hasn't reached `phase` yet; either way,
                // admission must wait.
                old = self.word.load(ORDER);
                continue;
            }
            let new_waiting = waiting + 1;
            let new_exiting = new_waiting == threads;
            let new = pack(new_exiting, index, threads, new_waiting);
            match self.word.compare_exchange_weak(old, new, ORDER, ORDER) {
                Ok(prev) => {
                    pre_waiting = unpack(prev).3;
                    break;
                }
                Err(actual) => old = actual,
            }
        }

        // Wait for the phase to start draining.
        while !unpack(self.word.load(ORDER)).0 {
            std::hint::spin_loop();
        }

        // Drain: decrement waiting; the last exit also advances the phase
        // index modulo `max_phases` and flips back to ENTERING.
        let mut old = self.word.load(ORDER);
        loop {
            let (_, index, threads, waiting) = unpack(old);
            let new_waiting = waiting - 1;
            let (new_exiting, new_index) = if new_waiting == 0 {
                let next = index + 1;
                let next = if next == self.max_phases { 0 } else { next };
                (false, next)
            } else {
                (true, index)
            };
            let new = pack(new_exiting, new_index, threads, new_waiting);
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
    fn single_phase_behaves_like_flat_dynamic() {
        let barrier = Arc::new(FlatMultiDynamic::new(1, 4, 4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let barrier = barrier.clone();
                thread::spawn(move || barrier.arrive(0))
            })
            .collect();
        let mut orders: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        orders.sort_unstable();
        assert_eq!(orders, vec![0, 1, 2, 3]);
        assert_eq!(barrier.index(), 0);
    }

    #[test]
    fn two_phase_cycle_completes_many_rounds() {
        let barrier = Arc::new(FlatMultiDynamic::new(2, 4, 4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let barrier = barrier.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        barrier.arrive(0);
                        barrier.arrive(1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(barrier.index(), 0);
        assert_eq!(barrier.waiting(), 0);
    }

    #[test]
    fn higher_phase_blocks_until_lower_phase_drains() {
        let barrier = Arc::new(FlatMultiDynamic::new(2, 2, 2));
        let b1 = barrier.clone();

        // One thread waits on phase 1 while phase 0 has not been reached by
        // anyone yet; it must never observe `waiting > 0` on phase 1 before
        // phase 0 has drained.
        let probe = thread::spawn(move || {
            for _ in 0..200 {
                assert_eq!(b1.index(), 0, "cycle advanced before phase 0 completed");
                thread::yield_now();
            }
        });

        thread::sleep(std::time::Duration::from_millis(5));
        probe.join().unwrap();

        let b2 = barrier.clone();
        let h1 = thread::spawn(move || b2.arrive(0));
        let h2 = thread::spawn(move || barrier.arrive(0));
        h1.join().unwrap();
        h2.join().unwrap();
    }
}
