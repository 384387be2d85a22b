//! Dynamic thread barriers: rendezvous points whose participant set can
//! grow or shrink between episodes via `opt_in`/`opt_out`, instead of being
//! fixed for the barrier's lifetime.
//!
//! All four variants share the same packed-atomic-word technique: a node's
//! `(state, threads, waiting, ...)` tuple lives in a single atomic integer,
//! updated with one compare-exchange per transition, rather than a mutex
//! guarding separate fields. None of them park or signal a waker — arrival
//! is a busy-spin on the packed word, which keeps the hot path allocation-
//! and syscall-free at the cost of burning a core while blocked.

mod error;
mod flat_dynamic;
mod flat_multi_dynamic;
mod flat_simple;
mod tree_dynamic;

pub use error::BarrierError;
pub use flat_dynamic::FlatDynamic;
pub use flat_multi_dynamic::FlatMultiDynamic;
pub use flat_simple::FlatSimple;
pub use tree_dynamic::TreeDynamic;
