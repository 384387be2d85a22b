//! Construction-time validation errors for [`super::TreeDynamic`].

use thiserror::Error;

/// Errors returned when constructing a barrier with invalid parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BarrierError {
    /// `node_size` must be a power of two so that a thread's ancestor chain
    /// can be found by right-shifting its id; the offending value is given.
    #[error("tree node size {0} is not a power of two")]
    NodeSizeNotPowerOfTwo(u32),

    /// `node_size` exceeded [`TreeDynamic::MAX_NODE_SIZE`](super::TreeDynamic::MAX_NODE_SIZE),
    /// the largest fan-out whose node payload still fits in a 16-bit word.
    #[error("tree node size {0} exceeds the maximum of {max}", max = super::TreeDynamic::MAX_NODE_SIZE)]
    NodeSizeTooLarge(u32),
}
