//! Sink trait for drained chunks.
//!
//! A [`Sink`] is whatever finally consumes the chunks the drain loop pulls
//! out of the ring: usually a hardware write call, or a [`ChannelSink`]
//! when another thread wants the chunks.

mod channel;

pub use channel::ChannelSink;

use crate::SinkError;

/// A destination for drained sample chunks.
///
/// All methods are called from the drain thread, never while the ring
/// buffer lock is held. Methods take `&self`; use interior mutability if the
/// sink needs to track state.
///
/// # Example
///
/// ```
/// use drain_loop::{Sink, SinkError};
///
/// struct NullSink;
///
/// impl Sink<f64> for NullSink {
///     fn name(&self) -> &str {
///         "null"
///     }
///
///     fn write_chunk(&self, chunk: &[f64]) -> Result<usize, SinkError> {
///         Ok(chunk.len())
///     }
/// }
/// ```
pub trait Sink<T>: Send + Sync {
    /// Human-readable name for logging and error messages
    fn name(&self) -> &str;

    /// Called once before the drain thread is spawned.
    ///
    /// Errors here keep the loop stopped.
    fn on_start(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Write one chunk, returning how many samples were accepted.
    ///
    /// Accepting fewer than `chunk.len()` samples drops the remainder.
    fn write_chunk(&self, chunk: &[T]) -> Result<usize, SinkError>;

    /// Called after the drain thread has exited; release device resources here
    fn on_stop(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
