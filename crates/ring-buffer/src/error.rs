//! Ring Buffer Error Types

use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`RingBuffer`](crate::RingBuffer) operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingBufferError {
    /// Attempted to construct a buffer with no storage
    #[error("Ring buffer capacity must be greater than zero")]
    ZeroCapacity,

    /// The buffer was interrupted while a reader was waiting for samples
    #[error("Read interrupted with {available} of {requested} samples available")]
    Interrupted { requested: usize, available: usize },

    /// Not enough samples arrived before the deadline
    #[error("Timed out after {0:?} waiting for samples")]
    Timeout(Duration),
}
