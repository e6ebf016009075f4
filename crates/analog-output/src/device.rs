//! Simulated analog output device

use drain_loop::{Sink, SinkError};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::OutputConfig;

/// Samples of history kept by default
const DEFAULT_HISTORY: usize = 65_536;

/// Digital lines on the simulated device's output port
pub const SIMULATED_DIGITAL_LINES: u32 = 8;

/// Digital output port of a device
pub trait DigitalOutput: Send + Sync {
    /// Drive `line` high or low
    fn digital_write(&self, line: u32, high: bool) -> Result<(), SinkError>;

    /// Drive every line low
    fn set_all_low(&self) -> Result<(), SinkError>;
}

#[derive(Default)]
struct DeviceState {
    open: bool,
    history: VecDeque<f64>,
    chunks_written: u64,
    samples_written: u64,
    pending_errors: VecDeque<SinkError>,
    accept_limit: Option<usize>,
    digital_lines: BTreeMap<u32, bool>,
}

/// Stand-in for a DAQ analog output task when no hardware is attached.
///
/// Accepts chunks like a device would, optionally sleeping for each chunk's
/// playback time so the drain loop runs at the configured sample rate, and
/// keeps the most recent samples for inspection. Failures can be injected
/// to exercise the drain loop's error handling.
pub struct SimulatedDevice {
    name: String,
    sample_rate_hz: f64,
    channels: usize,
    pace_realtime: bool,
    history_limit: usize,
    state: Mutex<DeviceState>,
}

impl SimulatedDevice {
    /// Create a simulated device running at `sample_rate_hz`
    pub fn new(name: impl Into<String>, sample_rate_hz: f64, channels: usize) -> Self {
        Self {
            name: name.into(),
            sample_rate_hz,
            channels: channels.max(1),
            pace_realtime: false,
            history_limit: DEFAULT_HISTORY,
            state: Mutex::new(DeviceState::default()),
        }
    }

    /// Create a simulated device matching an output config
    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(config.device.clone(), config.sample_rate_hz, config.channels)
            .with_pacing(config.pace_realtime)
    }

    /// Sleep for each chunk's playback time
    pub fn with_pacing(mut self, pace_realtime: bool) -> Self {
        self.pace_realtime = pace_realtime;
        self
    }

    /// Keep at most `limit` samples of history
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Make the next write fail with `error`
    pub fn fail_next(&self, error: SinkError) {
        self.state.lock().pending_errors.push_back(error);
    }

    /// Make the next write report that the device went away
    pub fn disconnect(&self) {
        self.fail_next(SinkError::disconnected(format!("{} removed", self.name)));
    }

    /// Accept at most `limit` samples per write (`None` accepts everything)
    pub fn limit_accept(&self, limit: Option<usize>) {
        self.state.lock().accept_limit = limit;
    }

    /// Most recent samples written, oldest first
    pub fn history(&self) -> Vec<f64> {
        self.state.lock().history.iter().copied().collect()
    }

    /// Chunks written since creation
    pub fn chunks_written(&self) -> u64 {
        self.state.lock().chunks_written
    }

    /// Samples accepted since creation
    pub fn samples_written(&self) -> u64 {
        self.state.lock().samples_written
    }

    /// Whether the output task is started
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Last level written to a digital line (`None` if never written)
    pub fn digital_line(&self, line: u32) -> Option<bool> {
        self.state.lock().digital_lines.get(&line).copied()
    }

    /// Zero for rates that cannot be paced (zero, negative or NaN)
    fn playback_time(&self, samples: usize) -> Duration {
        let frames = samples / self.channels;
        Duration::try_from_secs_f64(frames as f64 / self.sample_rate_hz).unwrap_or_default()
    }
}

impl DigitalOutput for SimulatedDevice {
    fn digital_write(&self, line: u32, high: bool) -> Result<(), SinkError> {
        if line >= SIMULATED_DIGITAL_LINES {
            return Err(SinkError::write_failed(format!(
                "digital line {} out of range (port has {})",
                line, SIMULATED_DIGITAL_LINES
            )));
        }
        self.state.lock().digital_lines.insert(line, high);
        trace!("Simulated device '{}' DO line {} -> {}", self.name, line, high);
        Ok(())
    }

    fn set_all_low(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        for line in 0..SIMULATED_DIGITAL_LINES {
            state.digital_lines.insert(line, false);
        }
        Ok(())
    }
}

impl Sink<f64> for SimulatedDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_start(&self) -> Result<(), SinkError> {
        self.state.lock().open = true;
        info!(
            "Simulated device '{}' started at {} Hz",
            self.name, self.sample_rate_hz
        );
        Ok(())
    }

    fn write_chunk(&self, chunk: &[f64]) -> Result<usize, SinkError> {
        let accepted = {
            let mut state = self.state.lock();
            if !state.open {
                return Err(SinkError::write_failed("output task not started"));
            }
            if let Some(error) = state.pending_errors.pop_front() {
                return Err(error);
            }

            let accepted = state.accept_limit.map_or(chunk.len(), |limit| limit.min(chunk.len()));
            state.history.extend(chunk[..accepted].iter().copied());
            let excess = state.history.len().saturating_sub(self.history_limit);
            state.history.drain(..excess);
            state.chunks_written += 1;
            state.samples_written += accepted as u64;
            accepted
        };

        if self.pace_realtime {
            thread::sleep(self.playback_time(chunk.len()));
        }
        Ok(accepted)
    }

    fn on_stop(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        state.open = false;
        debug!(
            "Simulated device '{}' stopped after {} chunks",
            self.name, state.chunks_written
        );
        Ok(())
    }
}
