//! Concurrency primitives.
//!
//! This module holds the dynamic thread barriers that are the reason this
//! crate exists, plus the small amount of supporting machinery they share.

pub mod barrier;
pub mod cache_padded;

pub use cache_padded::CachePadded;
