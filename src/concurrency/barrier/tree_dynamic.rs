//! `TreeDynamic` — a k-ary tree of [`super::FlatDynamic`]-like nodes, trading
//! one hot contended word for a logarithmic chain of less-contended ones.
//!
//! Ground truth: `examples/original_source/include/DynBar/TreeDynamicBarrier.hpp`.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Mutex;

use crate::concurrency::barrier::error::BarrierError;
use crate::concurrency::cache_padded::CachePadded;

const ORDER: Ordering = Ordering::SeqCst;

const EXITING_BIT: u16 = 1 << 15;
const THREADS_SHIFT: u32 = 8;
const THREADS_MASK: u16 = (1 << 7) - 1;
const WAITING_MASK: u16 = (1 << 8) - 1;

#[inline(always)]
fn pack(exiting: bool, threads: u16, waiting: u16) -> u16 {
    debug_assert!(threads <= THREADS_MASK);
    debug_assert!(waiting <= WAITING_MASK);
    (u16::from(exiting) << 15) | (threads << THREADS_SHIFT) | waiting
}

#[inline(always)]
fn unpack(word: u16) -> (bool, u16, u16) {
    let exiting = word & EXITING_BIT != 0;
    let threads = (word >> THREADS_SHIFT) & THREADS_MASK;
    let waiting = word & WAITING_MASK;
    (exiting, threads, waiting)
}

type Node = CachePadded<AtomicU16>;

/// Decrements `waiting` at `node`, forcing the state to `EXITING` (or back
/// to `ENTERING` if this decrement drains it to zero).
///
/// Used for every "exit" transition in the tree: a thread that wasn't last
/// to arrive at some node, the root's self-drain when it *was* last
/// everywhere, and the downward pass that drains every level below where
/// the upward walk turned around.
fn drain_step(node: &Node) {
    let mut old = node.load(ORDER);
    loop {
        let (_, threads, waiting) = unpack(old);
        let new_waiting = waiting - 1;
        let new_exiting = new_waiting != 0;
        let new = pack(new_exiting, threads, new_waiting);
        match node.compare_exchange_weak(old, new, ORDER, ORDER) {
            Ok(_) => return,
            Err(actual) => old = actual,
        }
    }
}

/// A k-ary tree of dynamic barrier nodes.
///
/// Each thread has a fixed identity `tid` that selects a leaf via `tid >>
/// shift`, where `shift = log2(node_size)`; ancestors are found by further
/// right-shifting. A non-leaf node's `threads` counts the number of
/// immediate child nodes with at least one enrolled participant (not
/// individual threads); its rendezvous represents "every non-empty subtree
/// has rendezvoused."
///
/// Arrivals contend only with the siblings sharing a leaf; only the single
/// lucky last arriver at a node walks higher, so the critical path for a
/// rendezvous is `O(depth)` compare-exchanges rather than `O(threads)` on
/// one word.
pub struct TreeDynamic {
    max_threads: u32,
    node_size: u32,
    shift_amount: u32,
    /// `levels[0]` is the root (always exactly one node); `levels[depth-1]`
    /// is the leaf level.
    levels: Vec<Vec<Node>>,
    opt_in_mutex: Mutex<()>,
}

impl TreeDynamic {
    /// Largest `node_size` this implementation supports, to keep a node's
    /// packed payload within a 16-bit word.
    pub const MAX_NODE_SIZE: u32 = 8;

    /// Creates a tree barrier for up to `max_threads` participants, with
    /// `node_size` children per node, and `initial_enrolled` threads
    /// (`0..initial_enrolled`) already opted in.
    ///
    /// # Errors
    /// Returns [`BarrierError::NodeSizeNotPowerOfTwo`] if `node_size` is not
    /// a power of two, or [`BarrierError::NodeSizeTooLarge`] if it exceeds
    /// [`Self::MAX_NODE_SIZE`].
    pub fn new(max_threads: u32, node_size: u32, initial_enrolled: u32) -> Result<Self, BarrierError> {
        let mut tree = Self::new_empty(max_threads, node_size)?;
        for tid in 0..initial_enrolled {
            tree.opt_in(tid);
        }
        Ok(tree)
    }

    /// Creates a tree barrier for up to `max_threads` participants, with
    /// `node_size` children per node, and no participants opted in.
    ///
    /// # Errors
    /// Same as [`Self::new`].
    pub fn new_empty(max_threads: u32, node_size: u32) -> Result<Self, BarrierError> {
        if !node_size.is_power_of_two() {
            return Err(BarrierError::NodeSizeNotPowerOfTwo(node_size));
        }
        if node_size > Self::MAX_NODE_SIZE {
            return Err(BarrierError::NodeSizeTooLarge(node_size));
        }

        let shift_amount = node_size.trailing_zeros();

        // depth = floor(log_node_size(max_threads + 1)), computed exactly
        // with integer exponentiation rather than floating-point logs.
        let mut depth = 0usize;
        let mut acc: u64 = 1;
        while acc.saturating_mul(u64::from(node_size)) <= u64::from(max_threads) + 1 {
            acc *= u64::from(node_size);
            depth += 1;
        }
        let depth = depth.max(1);

        let mut levels = Vec::with_capacity(depth);
        for level in 0..depth {
            let nodes_in_level = (node_size as u64).pow(level as u32) as usize;
            let mut nodes = Vec::with_capacity(nodes_in_level);
            nodes.resize_with(nodes_in_level, || CachePadded::new(AtomicU16::new(pack(false, 0, 0))));
            levels.push(nodes);
        }

        Ok(Self {
            max_threads,
            node_size,
            shift_amount,
            levels,
            opt_in_mutex: Mutex::new(()),
        })
    }

    /// The capacity this barrier was constructed with.
    pub fn max_threads(&self) -> u32 {
        self.max_threads
    }

    /// The fan-out (child count) of each tree node.
    pub fn node_size(&self) -> u32 {
        self.node_size
    }

    /// The total number of enrolled participants, summed across leaf nodes.
    ///
    /// This is an instantaneous, unstable snapshot intended for telemetry.
    pub fn opted_in(&self) -> u32 {
        let leaves = self.levels.last().expect("tree always has at least one level");
        leaves
            .iter()
            .map(|n| u32::from(unpack(n.load(ORDER)).1))
            .sum()
    }

    /// The total number of enrolled participants currently blocked at the
    /// rendezvous point, summed across leaf nodes.
    ///
    /// This is an instantaneous, unstable snapshot intended for telemetry.
    pub fn waiting(&self) -> u32 {
        let leaves = self.levels.last().expect("tree always has at least one level");
        leaves
            .iter()
            .map(|n| u32::from(unpack(n.load(ORDER)).2))
            .sum()
    }

    /// Depth of the tree, in levels (root is level `0`; leaves are level
    /// `depth() - 1`).
    fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Index, within its level, of the node that `tid` resolves to at
    /// `level` (`0` = root; `depth() - 1` = leaf).
    fn node_index(&self, tid: u32, level: usize) -> usize {
        let levels_below = (self.depth() - level) as u32;
        (tid >> (self.shift_amount * levels_below)) as usize
    }

    fn node_at(&self, tid: u32, level: usize) -> &Node {
        &self.levels[level][self.node_index(tid, level)]
    }

    /// Enrolls `tid`, incrementing `threads` at its leaf and, if that leaf
    /// was previously empty, propagating the opt-in up through every
    /// ancestor that was also previously empty.
    ///
    /// Serialized by a single tree-wide mutex: opt-in is rare relative to
    /// `arrive`, so paying for a lock here in exchange for a much simpler
    /// upward-propagation race is a good trade.
    pub fn opt_in(&self, tid: u32) {
        let _guard = self.opt_in_mutex.lock().unwrap();

        for level in (0..self.depth()).rev() {
            let node = self.node_at(tid, level);
            let mut cur = node.load(ORDER);
            let pre_threads;
            loop {
                let (_, threads, _) = unpack(cur);
                let assumed = pack(false, threads, 0);
                let new = pack(false, threads + 1, 0);
                match node.compare_exchange_weak(assumed, new, ORDER, ORDER) {
                    Ok(_) => {
                        pre_threads = threads;
                        break;
                    }
                    Err(actual) => cur = actual,
                }
            }
            if pre_threads != 0 {
                break;
            }
        }
    }

    /// Disenrolls `tid`, decrementing `threads` at its leaf and, if that
    /// leaf becomes empty, propagating the opt-out up through every
    /// ancestor subtree that becomes empty as a result.
    ///
    /// Takes no lock: each node's decrement uses the same
    /// deadlock-avoiding precondition as [`super::FlatDynamic::opt_out`]
    /// (`state == ENTERING && waiting < threads`), so a thread opting out
    /// never has to wait on a rendezvous it would otherwise be blocking.
    pub fn opt_out(&self, tid: u32) {
        for level in (0..self.depth()).rev() {
            let node = self.node_at(tid, level);
            let mut old = node.load(ORDER);
            let new_threads;
            loop {
                let (mut exiting, mut threads, mut waiting) = unpack(old);
                while exiting || waiting == threads {
                    old = node.load(ORDER);
                    let u = unpack(old);
                    exiting = u.0;
                    threads = u.1;
                    waiting = u.2;
                }
                let nt = threads - 1;
                let new_exiting = waiting == nt && nt != 0;
                let new = pack(new_exiting, nt, waiting);
                match node.compare_exchange_weak(old, new, ORDER, ORDER) {
                    Ok(_) => {
                        new_threads = nt;
                        break;
                    }
                    Err(actual) => old = actual,
                }
            }
            if new_threads == 0 && level > 0 {
                continue;
            }
            break;
        }
    }

    /// Arrives at the barrier as thread `tid`, blocking until every subtree
    /// containing `tid`'s leaf has rendezvoused.
    ///
    /// Unlike the flat variants, this does not return an arrival order: a
    /// leaf-local rank would not reflect a total order across leaves until
    /// the root rendezvous completes, and synthesizing one would
    /// misrepresent genuine cross-leaf concurrency.
    pub fn arrive(&self, tid: u32) {
        let mut level = self.depth() - 1;
        let turning_level = loop {
            let node = self.node_at(tid, level);
            let mut old = node.load(ORDER);
            let new_waiting;
            let threads;
            loop {
                let (exiting, t, waiting) = unpack(old);
                if exiting {
                    // A prior round is still draining this node; admission
                    // for a new round must wait for it to finish.
                    old = node.load(ORDER);
                    continue;
                }
                let nw = waiting + 1;
                let new = pack(false, t, nw);
                match node.compare_exchange_weak(old, new, ORDER, ORDER) {
                    Ok(_) => {
                        new_waiting = nw;
                        threads = t;
                        break;
                    }
                    Err(actual) => old = actual,
                }
            }

            if new_waiting != threads {
                // Not the last arriver at this node: wait for it to start
                // draining, then perform this node's own exit, and stop
                // going up.
                while !unpack(node.load(ORDER)).0 {
                    std::hint::spin_loop();
                }
                drain_step(node);
                break level;
            }

            if level == 0 {
                // Last arriver, and we are at the root: begin the drain
                // here immediately.
                drain_step(node);
                break level;
            }

            level -= 1;
        };

        // Drain every level below where the upward walk turned around; the
        // admission (waiting++) for those levels already happened above.
        for level in (turning_level + 1)..self.depth() {
            let node = self.node_at(tid, level);
            drain_step(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn rejects_non_power_of_two_node_size() {
        assert_eq!(
            TreeDynamic::new_empty(16, 3).unwrap_err(),
            BarrierError::NodeSizeNotPowerOfTwo(3)
        );
    }

    #[test]
    fn rejects_node_size_above_cap() {
        assert_eq!(
            TreeDynamic::new_empty(16, 16).unwrap_err(),
            BarrierError::NodeSizeTooLarge(16)
        );
    }

    #[test]
    fn degenerates_to_single_leaf_like_flat_dynamic() {
        let tree = Arc::new(TreeDynamic::new(4, 4, 4).unwrap());
        let handles: Vec<_> = (0..4u32)
            .map(|tid| {
                let tree = tree.clone();
                thread::spawn(move || tree.arrive(tid))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tree.waiting(), 0);
        assert_eq!(tree.opted_in(), 4);
    }

    #[test]
    fn hierarchical_rendezvous_many_rounds() {
        let tree = Arc::new(TreeDynamic::new(16, 4, 16).unwrap());
        let handles: Vec<_> = (0..16u32)
            .map(|tid| {
                let tree = tree.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        tree.arrive(tid);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tree.waiting(), 0);
    }

    #[test]
    fn opt_out_of_last_enrolled_returns_to_neutral() {
        let tree = TreeDynamic::new(4, 4, 1).unwrap();
        tree.opt_out(0);
        assert_eq!(tree.opted_in(), 0);
        assert_eq!(tree.waiting(), 0);
    }
}
