//! Drain Loop Error Types

use thiserror::Error;

/// Errors reported by a [`Sink`](crate::Sink).
///
/// Most sink errors are recoverable: the drain loop counts them and carries
/// on with the next chunk. Fatal errors (see [`SinkError::is_fatal`]) stop
/// the loop and are surfaced to the owner through
/// [`DrainLoop::stop`](crate::DrainLoop::stop).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// A single write failed but the device is still usable
    #[error("Write failed: {reason}")]
    WriteFailed { reason: String },

    /// The device did not accept the chunk in time
    #[error("Device write timed out after {0}ms")]
    Timeout(u64),

    /// The device is gone; no further writes can succeed
    #[error("Device disconnected: {reason}")]
    Disconnected { reason: String },

    /// The sink panicked while handling a chunk
    #[error("Sink panicked: {message}")]
    Panicked { message: String },

    /// Custom error for user-implemented sinks
    #[error("{0}")]
    Custom(String),
}

impl SinkError {
    /// Creates a write failed error with the given reason
    pub fn write_failed(reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            reason: reason.into(),
        }
    }

    /// Creates a disconnected error with the given reason
    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self::Disconnected {
            reason: reason.into(),
        }
    }

    /// Creates a custom sink error with the given message
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Whether this error ends the drain loop
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Disconnected { .. } | Self::Panicked { .. })
    }
}

/// Errors returned by [`DrainLoop`](crate::DrainLoop) lifecycle calls
#[derive(Debug, Error)]
pub enum DrainError {
    /// Chunk size is zero or can never be satisfied by the ring
    #[error("Invalid chunk size {chunk_size} for ring capacity {capacity}")]
    InvalidChunkSize { chunk_size: usize, capacity: usize },

    /// The OS refused to spawn the drain thread
    #[error("Failed to spawn drain thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The sink failed to start, failed fatally while running, or failed to stop
    #[error("Sink '{sink}' failed: {source}")]
    Sink {
        sink: String,
        #[source]
        source: SinkError,
    },

    /// The drain thread itself panicked outside the sink
    #[error("Drain thread panicked")]
    ThreadPanicked,
}

impl DrainError {
    pub(crate) fn sink(sink: &str, source: SinkError) -> Self {
        Self::Sink {
            sink: sink.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(SinkError::disconnected("usb unplugged").is_fatal());
        assert!(SinkError::Panicked {
            message: "boom".to_string()
        }
        .is_fatal());
        assert!(!SinkError::write_failed("underrun").is_fatal());
        assert!(!SinkError::Timeout(10).is_fatal());
        assert!(!SinkError::custom("odd").is_fatal());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            SinkError::write_failed("buffer full").to_string(),
            "Write failed: buffer full"
        );

        let err = DrainError::sink("Dev1/ao0", SinkError::disconnected("gone"));
        assert_eq!(
            err.to_string(),
            "Sink 'Dev1/ao0' failed: Device disconnected: gone"
        );

        let err = DrainError::InvalidChunkSize {
            chunk_size: 0,
            capacity: 8,
        };
        assert_eq!(err.to_string(), "Invalid chunk size 0 for ring capacity 8");
    }
}
