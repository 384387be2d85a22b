//! `FlatSimple` — a single-word barrier with a fixed target, adjustable
//! between phases.
//!
//! Ground truth: `examples/original_source/include/DynBar/FlatDynamicBarrier.hpp`.
//! Upstream calls this type `FlatDynamicBarrier`; this crate reserves that
//! name for the dynamic-membership variant ([`super::FlatDynamic`]) and
//! calls the fixed-target, single-word barrier `FlatSimple` instead, to
//! avoid the two being confused.

use std::sync::atomic::{AtomicU64, Ordering};

const ORDER: Ordering = Ordering::SeqCst;

#[inline(always)]
fn pack(target: u32, count: u32) -> u64 {
    ((target as u64) << 32) | (count as u64)
}

#[inline(always)]
fn unpack(word: u64) -> (u32, u32) {
    ((word >> 32) as u32, word as u32)
}

/// A barrier whose participant target is fixed for the duration of a phase,
/// but adjustable between phases via [`increment_target`](Self::increment_target)
/// / [`decrement_target`](Self::decrement_target).
///
/// The whole `(target, count)` pair lives in a single `AtomicU64`, so every
/// transition is one compare-exchange. `count` doubles as the in-flight
/// arrival counter and the phase marker: the thread that observes
/// `count == 0` pre-increment is the phase's leader and is responsible for
/// releasing everyone else once `count == target`.
pub struct FlatSimple {
    word: AtomicU64,
}

impl Default for FlatSimple {
    fn default() -> Self {
        Self::new()
    }
}

impl FlatSimple {
    /// Creates a barrier with target `0` and no in-flight arrivals.
    #[must_use]
    pub fn new() -> Self {
        Self {
            word: AtomicU64::new(pack(0, 0)),
        }
    }

    /// Increments the target participant count.
    ///
    /// Legal only between phases. The compare-exchange assumes `count == 0`
    /// and retries until that assumption holds, which is how the barrier
    /// waits out an in-progress phase without a separate "is quiescent"
    /// check.
    pub fn increment_target(&self) {
        let mut cur = self.word.load(ORDER);
        loop {
            let (target, _) = unpack(cur);
            let assumed = pack(target, 0);
            let new = pack(target + 1, 0);
            match self.word.compare_exchange_weak(assumed, new, ORDER, ORDER) {
                Ok(_) => return,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Decrements the target participant count.
    ///
    /// To avoid deadlocking on a phase that is waiting for this very thread
    /// to arrive, the decrement is allowed at any point where `count <
    /// target` (a phase is not fully rendezvoused); it spins until that
    /// holds rather than waiting for full quiescence.
    pub fn decrement_target(&self) {
        let mut old = self.word.load(ORDER);
        loop {
            let (mut target, mut count) = unpack(old);
            while count == target {
                old = self.word.load(ORDER);
                let u = unpack(old);
                target = u.0;
                count = u.1;
            }
            let new = pack(target - 1, count);
            match self.word.compare_exchange_weak(old, new, ORDER, ORDER) {
                Ok(_) => return,
                Err(actual) => old = actual,
            }
        }
    }

    /// Arrives at the barrier, blocking until `target` participants have
    /// arrived, then returns this call's 0-based arrival order.
    pub fn arrive(&self) -> u32 {
        let mut old = self.word.load(ORDER);
        loop {
            let (target, count) = unpack(old);
            let new = pack(target, count + 1);
            match self.word.compare_exchange_weak(old, new, ORDER, ORDER) {
                Ok(prev) => {
                    old = prev;
                    break;
                }
                Err(actual) => old = actual,
            }
        }

        let (target, pre_count) = unpack(old);
        if pre_count == 0 {
            // Leader: wait for everyone else to arrive, then reset the
            // counter to release them (and itself).
            let mut assumed = pack(target, target);
            loop {
                match self
                    .word
                    .compare_exchange_weak(assumed, pack(target, 0), ORDER, ORDER)
                {
                    Ok(_) => break,
                    Err(actual) => {
                        let (t, _) = unpack(actual);
                        assumed = pack(t, t);
                    }
                }
            }
            0
        } else {
            // Not the leader: wait for the leader's reset.
            while unpack(self.word.load(ORDER)).1 != 0 {
                std::hint::spin_loop();
            }
            pre_count
        }
    }

    /// Returns the current target participant count.
    ///
    /// This is an instantaneous, unstable snapshot intended for telemetry.
    pub fn target(&self) -> u32 {
        unpack(self.word.load(ORDER)).0
    }

    /// Returns the number of arrivals recorded for the in-progress phase.
    ///
    /// This is an instantaneous, unstable snapshot intended for telemetry.
    pub fn count(&self) -> u32 {
        unpack(self.word.load(ORDER)).1
    }
}
