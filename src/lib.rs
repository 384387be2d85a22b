//! # `dynbar` - Dynamic Thread Barriers
//!
//! A family of lock-free thread barriers whose participant set can grow or
//! shrink between rendezvous episodes, without destroying and recreating the
//! barrier.
//!
//! ## Key features
//!
//! - **Dynamic membership**: threads opt in and opt out at runtime via
//!   `opt_in`/`opt_out`, rather than being fixed at construction.
//! - **Packed atomic state**: each barrier node's `(state, threads, waiting)`
//!   tuple (plus, for [`FlatMultiDynamic`], a phase `index`) lives in a
//!   single atomic word, so every transition is one compare-exchange.
//! - **Four variants, one algorithm family**: a flat fixed-target barrier, a
//!   flat dynamic barrier, a multi-phase cycle of dynamic barriers, and a
//!   k-ary tree of dynamic barriers for lower contention at scale.
//!
//! ## Architecture
//!
//! - [`concurrency::barrier::FlatSimple`] — single atomic word, target
//!   adjusted via `increment_target`/`decrement_target`.
//! - [`concurrency::barrier::FlatDynamic`] — single atomic word, dynamic
//!   membership via `opt_in`/`opt_out`.
//! - [`concurrency::barrier::FlatMultiDynamic`] — `FlatDynamic` extended with
//!   a configurable cycle of phases.
//! - [`concurrency::barrier::TreeDynamic`] — a k-ary tree of `FlatDynamic`-like
//!   nodes, trading one contended word for a logarithmic chain of less
//!   contended ones.
//!
//! ## Example
//!
//! ```rust
//! use dynbar::concurrency::barrier::FlatDynamic;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let barrier = Arc::new(FlatDynamic::new(4, 4));
//! let handles: Vec<_> = (0..4)
//!     .map(|_| {
//!         let barrier = barrier.clone();
//!         thread::spawn(move || barrier.arrive())
//!     })
//!     .collect();
//! let mut orders: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
//! orders.sort_unstable();
//! assert_eq!(orders, vec![0, 1, 2, 3]);
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod concurrency;

pub use concurrency::barrier::{
    BarrierError, FlatDynamic, FlatMultiDynamic, FlatSimple, TreeDynamic,
};
