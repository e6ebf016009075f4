//! Analog Output Error Types

use drain_loop::{DrainError, SinkError};
use ring_buffer::RingBufferError;
use thiserror::Error;

/// Errors that can occur while configuring or running an analog output
#[derive(Debug, Error)]
pub enum OutputError {
    /// Configuration could not be loaded or parsed
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    /// Sample rate is not one of the supported rates for this device
    #[error("Sample rate {requested} Hz not supported (available: {available:?})")]
    UnsupportedSampleRate { requested: f64, available: Vec<f64> },

    /// Voltage range is empty or inverted
    #[error("Invalid voltage range [{min}, {max}] V")]
    InvalidVoltageRange { min: f64, max: f64 },

    /// Some other configuration value is out of bounds
    #[error("Invalid output configuration: {0}")]
    InvalidConfig(String),

    /// Ring buffer construction failed
    #[error("Ring buffer error: {0}")]
    Ring(#[from] RingBufferError),

    /// Drain loop lifecycle failed
    #[error("Drain loop error: {0}")]
    Drain(#[from] DrainError),

    /// Digital output write failed
    #[error("Digital output error: {0}")]
    Digital(#[source] SinkError),

    /// Logging could not be initialized
    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}
