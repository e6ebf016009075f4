//! Analog Output Streaming
//!
//! Owning component for a DAQ analog output channel. Producer blocks of
//! normalized samples are scaled into the configured voltage range and
//! queued on a [`RingBuffer`](ring_buffer::RingBuffer); a
//! [`DrainLoop`](drain_loop::DrainLoop) thread hands fixed-size chunks to the
//! device at its own pace.

mod config;
mod device;
mod error;
mod logging;
mod output;

pub use self::config::{
    default_sample_rate, supported_sample_rates, OutputConfig, VoltageRange, SAMPLE_RATES_HZ,
};
pub use device::{DigitalOutput, SimulatedDevice, SIMULATED_DIGITAL_LINES};
pub use error::OutputError;
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use output::AnalogOutput;

pub use drain_loop::{ChannelSink, DrainState, DrainStats, Sink, SinkError};
pub use ring_buffer::RingStats;
