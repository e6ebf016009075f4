//! Analog output component

use drain_loop::{DrainLoop, DrainState, DrainStats, Sink, SinkError};
use ring_buffer::{RingBuffer, RingStats};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::{DigitalOutput, OutputConfig, OutputError, SimulatedDevice};

/// Streams normalized producer blocks to an analog output device.
///
/// Owns the sample ring and the drain loop. The producer side
/// ([`process`](Self::process)) scales each block into volts and writes it
/// to the ring without blocking; the drain thread delivers fixed-size chunks
/// to the device sink between [`start_acquisition`](Self::start_acquisition)
/// and [`stop_acquisition`](Self::stop_acquisition).
///
/// TTL events on the configured input line are mirrored onto a digital
/// output line when a [`DigitalOutput`] is attached.
pub struct AnalogOutput {
    config: OutputConfig,
    ring: Arc<RingBuffer<f64>>,
    drain: DrainLoop<f64>,
    digital: Option<Arc<dyn DigitalOutput>>,
    scratch: Vec<f64>,
}

impl AnalogOutput {
    /// Create an output that drains into `sink`
    pub fn new(config: OutputConfig, sink: Arc<dyn Sink<f64>>) -> Result<Self, OutputError> {
        config.validate()?;

        let ring = Arc::new(RingBuffer::new(config.ring_capacity)?);
        let drain = DrainLoop::new(Arc::clone(&ring), sink, config.drain_config())?;

        info!(
            "Analog output on '{}' ready: {} Hz, ring {} samples, {} samples per write",
            config.device,
            config.sample_rate_hz,
            config.ring_capacity,
            config.chunk_size()
        );

        Ok(Self {
            scratch: Vec::with_capacity(config.frames_per_chunk),
            config,
            ring,
            drain,
            digital: None,
        })
    }

    /// Attach the digital port TTL events are mirrored onto
    pub fn with_digital_output(mut self, digital: Arc<dyn DigitalOutput>) -> Self {
        self.digital = Some(digital);
        self
    }

    /// Create an output backed by a [`SimulatedDevice`]
    pub fn simulated(config: OutputConfig) -> Result<(Self, Arc<SimulatedDevice>), OutputError> {
        let device = Arc::new(SimulatedDevice::from_config(&config));
        let output = Self::new(config, Arc::clone(&device) as Arc<dyn Sink<f64>>)?
            .with_digital_output(Arc::clone(&device) as Arc<dyn DigitalOutput>);
        Ok((output, device))
    }

    /// Scale a block of normalized samples into volts and queue it.
    ///
    /// Never blocks. Returns the number of queued samples that were
    /// overwritten because the device fell behind.
    pub fn process(&mut self, block: &[f32]) -> usize {
        let range = self.config.voltage_range;
        self.scratch.clear();
        self.scratch.extend(block.iter().map(|&sample| range.scale(sample)));

        let lost = self.ring.write(&self.scratch);
        if lost > 0 {
            metrics::counter!("analog_output_overwritten_samples_total").increment(lost as u64);
        }
        lost
    }

    /// Queue samples that are already in volts
    pub fn write_volts(&self, samples: &[f64]) -> usize {
        let lost = self.ring.write(samples);
        if lost > 0 {
            metrics::counter!("analog_output_overwritten_samples_total").increment(lost as u64);
        }
        lost
    }

    /// Mirror a TTL input transition onto the digital output.
    ///
    /// Events on lines other than `ttl_input_line` are ignored. Returns
    /// whether the digital output was driven.
    pub fn handle_ttl_event(&self, line: u32, high: bool) -> Result<bool, OutputError> {
        if line != self.config.ttl_input_line {
            trace!("Ignoring TTL event on line {}", line);
            return Ok(false);
        }
        let Some(digital) = &self.digital else {
            debug!("TTL event on line {} with no digital output attached", line);
            return Ok(false);
        };

        debug!(
            "TTL line {} {}, driving DO line {}",
            line,
            if high { "high" } else { "low" },
            self.config.digital_output_line
        );
        digital
            .digital_write(self.config.digital_output_line, high)
            .map_err(OutputError::Digital)?;
        Ok(true)
    }

    /// Start delivering queued samples to the device.
    ///
    /// Fails with the device error if the previous acquisition stopped on
    /// one that was never taken; calling again starts afresh.
    pub fn start_acquisition(&self) -> Result<(), OutputError> {
        self.drain.start()?;
        Ok(())
    }

    /// Stop delivery, drive the digital outputs low and release the device
    pub fn stop_acquisition(&self) -> Result<(), OutputError> {
        let outputs_low = match &self.digital {
            Some(digital) => digital.set_all_low(),
            None => Ok(()),
        };
        let stopped = self.drain.stop();

        if let Err(e) = &outputs_low {
            warn!("Could not drive digital outputs low: {}", e);
        }
        stopped?;
        outputs_low.map_err(OutputError::Digital)
    }

    /// Check if samples are being delivered
    pub fn is_running(&self) -> bool {
        self.drain.is_running()
    }

    /// Drain loop lifecycle state
    pub fn state(&self) -> DrainState {
        self.drain.state()
    }

    /// Take the device error that stopped delivery, if any
    pub fn take_fatal_error(&self) -> Option<SinkError> {
        self.drain.take_fatal_error()
    }

    /// Drain loop counters
    pub fn stats(&self) -> DrainStats {
        self.drain.stats()
    }

    /// Ring buffer cursors and counters
    pub fn ring_stats(&self) -> RingStats {
        self.ring.stats()
    }

    /// Active configuration
    pub fn config(&self) -> &OutputConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drain_loop::{ChannelSink, DrainError};
    use std::thread;
    use std::time::{Duration, Instant};

    fn test_config() -> OutputConfig {
        OutputConfig {
            ring_capacity: 64,
            frames_per_chunk: 8,
            pace_realtime: false,
            ..Default::default()
        }
    }

    fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_blocks_reach_device_in_volts() {
        let (mut output, device) = AnalogOutput::simulated(test_config()).unwrap();
        output.start_acquisition().unwrap();
        assert!(device.is_open());

        output.process(&[-1.0, -0.5, 0.0, 0.5]);
        output.process(&[1.0, 1.0, 0.0, 0.0]);

        assert!(wait_for(Duration::from_secs(2), || device.chunks_written() == 1));
        output.stop_acquisition().unwrap();

        assert_eq!(
            device.history(),
            vec![-10.0, -5.0, 0.0, 5.0, 10.0, 10.0, 0.0, 0.0]
        );
        assert!(!device.is_open());
        assert_eq!(output.stats().chunks_written, 1);
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let (output, device) = AnalogOutput::simulated(test_config()).unwrap();
        assert!(!output.is_running());

        output.start_acquisition().unwrap();
        output.start_acquisition().unwrap();
        assert!(output.is_running());

        let started = Instant::now();
        output.stop_acquisition().unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(!output.is_running());
        assert!(!device.is_open());
    }

    #[test]
    fn test_overflow_is_reported() {
        let (mut output, _device) = AnalogOutput::simulated(test_config()).unwrap();

        assert_eq!(output.process(&[0.0; 60]), 0);
        assert_eq!(output.process(&[0.0; 10]), 6);

        let ring = output.ring_stats();
        assert_eq!(ring.len, 64);
        assert_eq!(ring.overwritten, 6);
        assert_eq!(ring.total_written, 70);
    }

    #[test]
    fn test_device_disconnect_surfaces_on_stop() {
        let (output, device) = AnalogOutput::simulated(test_config()).unwrap();
        output.start_acquisition().unwrap();
        device.disconnect();
        output.write_volts(&[1.0; 8]);

        assert!(wait_for(Duration::from_secs(2), || !output.is_running()));
        match output.stop_acquisition() {
            Err(OutputError::Drain(DrainError::Sink { source, .. })) => assert!(source.is_fatal()),
            other => panic!("expected device error, got {:?}", other),
        }
    }

    #[test]
    fn test_restart_reports_unseen_disconnect() {
        let (output, device) = AnalogOutput::simulated(test_config()).unwrap();
        output.start_acquisition().unwrap();
        device.disconnect();
        output.write_volts(&[1.0; 8]);
        assert!(wait_for(Duration::from_secs(2), || !output.is_running()));
        assert_eq!(output.state(), DrainState::Stopped);

        match output.start_acquisition() {
            Err(OutputError::Drain(DrainError::Sink { source, .. })) => assert!(source.is_fatal()),
            other => panic!("expected device error on restart, got {:?}", other),
        }
        assert!(!output.is_running());

        output.start_acquisition().unwrap();
        assert!(output.is_running());
        output.stop_acquisition().unwrap();
    }

    #[test]
    fn test_take_fatal_error() {
        let (output, device) = AnalogOutput::simulated(test_config()).unwrap();
        output.start_acquisition().unwrap();
        device.disconnect();
        output.write_volts(&[1.0; 8]);
        assert!(wait_for(Duration::from_secs(2), || !output.is_running()));

        let fatal = output.take_fatal_error().unwrap();
        assert!(matches!(fatal, SinkError::Disconnected { .. }));
        assert_eq!(output.take_fatal_error(), None);
        output.stop_acquisition().unwrap();
    }

    #[test]
    fn test_ttl_events_drive_digital_output() {
        let config = OutputConfig {
            ttl_input_line: 1,
            digital_output_line: 4,
            ..test_config()
        };
        let (output, device) = AnalogOutput::simulated(config).unwrap();
        output.start_acquisition().unwrap();

        assert!(output.handle_ttl_event(1, true).unwrap());
        assert_eq!(device.digital_line(4), Some(true));

        assert!(!output.handle_ttl_event(0, false).unwrap());
        assert_eq!(device.digital_line(4), Some(true));

        assert!(output.handle_ttl_event(1, false).unwrap());
        assert_eq!(device.digital_line(4), Some(false));

        output.handle_ttl_event(1, true).unwrap();
        output.stop_acquisition().unwrap();
        assert_eq!(device.digital_line(4), Some(false));
    }

    #[test]
    fn test_ttl_event_on_bad_line_is_error() {
        let config = OutputConfig {
            digital_output_line: crate::SIMULATED_DIGITAL_LINES,
            ..test_config()
        };
        let (output, _device) = AnalogOutput::simulated(config).unwrap();
        assert!(matches!(
            output.handle_ttl_event(0, true),
            Err(OutputError::Digital(_))
        ));
    }

    #[test]
    fn test_ttl_event_without_digital_output() {
        let (tx, _rx) = crossbeam_channel::bounded(1);
        let output = AnalogOutput::new(test_config(), Arc::new(ChannelSink::new(tx))).unwrap();
        assert!(!output.handle_ttl_event(0, true).unwrap());
    }

    #[test]
    fn test_recoverable_device_error_is_counted() {
        let (output, device) = AnalogOutput::simulated(test_config()).unwrap();
        output.start_acquisition().unwrap();
        device.fail_next(SinkError::write_failed("underflow"));
        output.write_volts(&[0.5; 16]);

        assert!(wait_for(Duration::from_secs(2), || device.chunks_written() == 1));
        output.stop_acquisition().unwrap();

        let stats = output.stats();
        assert_eq!(stats.sink_errors, 1);
        assert_eq!(stats.chunks_written, 1);
    }

    #[test]
    fn test_stereo_chunks_are_interleaved_frames() {
        let config = OutputConfig {
            channels: 2,
            frames_per_chunk: 4,
            ..test_config()
        };
        let (tx, rx) = crossbeam_channel::bounded(4);
        let output = AnalogOutput::new(config, Arc::new(ChannelSink::new(tx))).unwrap();
        output.start_acquisition().unwrap();
        output.write_volts(&[1.0, -1.0, 2.0, -2.0, 3.0, -3.0, 4.0, -4.0]);

        let chunk = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        output.stop_acquisition().unwrap();
        assert_eq!(chunk.len(), 8);
        assert_eq!(chunk[6..], [4.0, -4.0]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = OutputConfig {
            ring_capacity: 4,
            ..test_config()
        };
        assert!(matches!(
            AnalogOutput::simulated(config),
            Err(OutputError::InvalidConfig(_))
        ));
    }
}
