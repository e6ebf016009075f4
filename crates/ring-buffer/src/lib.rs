//! Blocking Ring Buffer
//!
//! Provides a fixed-capacity circular buffer that hands analog samples from a
//! producer thread (the per-block processing callback) to a consumer thread
//! (the hardware writer). Writes never block and overwrite the oldest unread
//! samples when the buffer is full; reads block until a full request can be
//! satisfied or the buffer is interrupted.

mod buffer;
mod error;

pub use buffer::{RingBuffer, RingStats, DEFAULT_CAPACITY};
pub use error::RingBufferError;
