//! Drain Loop for Steady Sink Output
//!
//! Runs a dedicated background thread that pulls fixed-size chunks out of a
//! [`RingBuffer`](ring_buffer::RingBuffer) and forwards them to a [`Sink`],
//! decoupling the producer's irregular block cadence from the steady chunk
//! cadence a hardware writer needs.

mod config;
mod drain;
mod error;
mod sink;

pub use config::DrainConfig;
pub use drain::{DrainLoop, DrainState, DrainStats};
pub use error::{DrainError, SinkError};
pub use sink::{ChannelSink, Sink};
