//! Analog output configuration

use ::config::{Config, Environment, File};
use drain_loop::DrainConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::logging::LoggingConfig;
use crate::OutputError;

/// Output sample rates offered to the user, in Hz
pub const SAMPLE_RATES_HZ: [f64; 17] = [
    1000.0, 1250.0, 1500.0, 2000.0, 2500.0, 3000.0, 3330.0, 4000.0, 5000.0, 6250.0, 8000.0,
    10000.0, 12500.0, 15000.0, 20000.0, 25000.0, 30000.0,
];

/// Sample rates a device with the given maximum rate can run at (ascending)
pub fn supported_sample_rates(max_rate_hz: f64) -> Vec<f64> {
    SAMPLE_RATES_HZ
        .iter()
        .copied()
        .take_while(|&rate| rate <= max_rate_hz)
        .collect()
}

/// Highest supported sample rate, used as the default selection
pub fn default_sample_rate(max_rate_hz: f64) -> Option<f64> {
    supported_sample_rates(max_rate_hz).last().copied()
}

/// Output voltage range of the analog channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoltageRange {
    /// Lowest output voltage (V)
    pub min: f64,
    /// Highest output voltage (V)
    pub max: f64,
}

impl Default for VoltageRange {
    fn default() -> Self {
        Self {
            min: -10.0,
            max: 10.0,
        }
    }
}

impl VoltageRange {
    /// Create a range, rejecting empty or inverted bounds
    pub fn new(min: f64, max: f64) -> Result<Self, OutputError> {
        let range = Self { min, max };
        range.validate()?;
        Ok(range)
    }

    /// Map a normalized sample in `[-1, 1]` onto the range, clamping outliers
    pub fn scale(&self, normalized: f32) -> f64 {
        let clamped = f64::from(normalized.clamp(-1.0, 1.0));
        self.min + (clamped + 1.0) * 0.5 * self.span()
    }

    /// Width of the range in volts
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Check whether a voltage lies within the range
    pub fn contains(&self, volts: f64) -> bool {
        (self.min..=self.max).contains(&volts)
    }

    fn validate(&self) -> Result<(), OutputError> {
        if !(self.min.is_finite() && self.max.is_finite()) || self.min >= self.max {
            return Err(OutputError::InvalidVoltageRange {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// Analog output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Device name, e.g. "Dev1"; "Simulated" when no hardware is present
    pub device: String,

    /// Selected output sample rate (Hz)
    pub sample_rate_hz: f64,

    /// Maximum rate the device supports (Hz)
    pub max_sample_rate_hz: f64,

    /// Output voltage range
    pub voltage_range: VoltageRange,

    /// Ring buffer capacity in samples
    pub ring_capacity: usize,

    /// Frames handed to the device per write
    pub frames_per_chunk: usize,

    /// Output channels per frame
    pub channels: usize,

    /// Simulated device sleeps for each chunk's playback time
    pub pace_realtime: bool,

    /// TTL input line (zero-based) mirrored onto the digital output
    pub ttl_input_line: u32,

    /// Digital output line driven by TTL events
    pub digital_output_line: u32,

    /// Logging setup
    pub logging: LoggingConfig,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device: "Simulated".to_string(),
            sample_rate_hz: 30000.0,
            max_sample_rate_hz: 30000.0,
            voltage_range: VoltageRange::default(),
            ring_capacity: ring_buffer::DEFAULT_CAPACITY,
            frames_per_chunk: 1024,
            channels: 1,
            pace_realtime: true,
            ttl_input_line: 0,
            digital_output_line: 0,
            logging: LoggingConfig::default(),
        }
    }
}

impl OutputConfig {
    /// Create low-latency config (small chunks, small ring)
    pub fn low_latency() -> Self {
        Self {
            ring_capacity: 4096,
            frames_per_chunk: 256,
            ..Default::default()
        }
    }

    /// Create high-throughput config (large chunks, deep ring)
    pub fn high_throughput() -> Self {
        Self {
            ring_capacity: 131_072,
            frames_per_chunk: 4096,
            ..Default::default()
        }
    }

    /// Load configuration from an optional file plus `ANALOG_OUTPUT_*`
    /// environment overrides (nested keys use `__`, e.g.
    /// `ANALOG_OUTPUT_VOLTAGE_RANGE__MIN`).
    pub fn load(path: Option<&Path>) -> Result<Self, OutputError> {
        Self::load_with_env(path, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix("ANALOG_OUTPUT")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, OutputError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!("Loading output configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: OutputConfig = builder.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// One-line description of the output setup, for startup logs
    pub fn summary(&self) -> String {
        format!(
            "device {}, {} Hz, [{}, {}] V, ring {} samples, chunk {} frames x {} ch, TTL line {} -> DO line {}",
            self.device,
            self.sample_rate_hz,
            self.voltage_range.min,
            self.voltage_range.max,
            self.ring_capacity,
            self.frames_per_chunk,
            self.channels,
            self.ttl_input_line,
            self.digital_output_line
        )
    }

    /// Check every value against what the pipeline can run with
    pub fn validate(&self) -> Result<(), OutputError> {
        let available = supported_sample_rates(self.max_sample_rate_hz);
        if !available.contains(&self.sample_rate_hz) {
            return Err(OutputError::UnsupportedSampleRate {
                requested: self.sample_rate_hz,
                available,
            });
        }

        self.voltage_range.validate()?;

        if self.channels == 0 {
            return Err(OutputError::InvalidConfig(
                "channels must be at least 1".to_string(),
            ));
        }
        if self.frames_per_chunk == 0 {
            return Err(OutputError::InvalidConfig(
                "frames_per_chunk must be at least 1".to_string(),
            ));
        }
        if self.chunk_size() > self.ring_capacity {
            return Err(OutputError::InvalidConfig(format!(
                "chunk of {} samples does not fit ring of {} samples",
                self.chunk_size(),
                self.ring_capacity
            )));
        }
        Ok(())
    }

    /// Samples per device write
    pub fn chunk_size(&self) -> usize {
        self.frames_per_chunk * self.channels
    }

    /// Drain loop settings derived from this config
    pub fn drain_config(&self) -> DrainConfig {
        DrainConfig {
            frames_per_chunk: self.frames_per_chunk,
            channels: self.channels,
            thread_name: format!("ao-writer-{}", self.device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_from(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        OutputConfig::environment().source(Some(map))
    }

    #[test]
    fn test_sample_rate_table() {
        assert_eq!(supported_sample_rates(2500.0), vec![1000.0, 1250.0, 1500.0, 2000.0, 2500.0]);
        assert_eq!(supported_sample_rates(30000.0).len(), 17);
        assert!(supported_sample_rates(500.0).is_empty());
        assert_eq!(default_sample_rate(12000.0), Some(10000.0));
        assert_eq!(default_sample_rate(10.0), None);
    }

    #[test]
    fn test_voltage_scaling() {
        let range = VoltageRange::default();
        assert_eq!(range.scale(-1.0), -10.0);
        assert_eq!(range.scale(0.0), 0.0);
        assert_eq!(range.scale(1.0), 10.0);
        assert_eq!(range.scale(3.0), 10.0);

        let unipolar = VoltageRange::new(0.0, 5.0).unwrap();
        assert_eq!(unipolar.scale(0.0), 2.5);
        assert_eq!(unipolar.scale(-2.0), 0.0);
        assert!(unipolar.contains(unipolar.scale(0.3)));
    }

    #[test]
    fn test_invalid_voltage_range() {
        assert!(matches!(
            VoltageRange::new(5.0, -5.0),
            Err(OutputError::InvalidVoltageRange { .. })
        ));
        assert!(VoltageRange::new(1.0, 1.0).is_err());
        assert!(VoltageRange::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        OutputConfig::default().validate().unwrap();
        OutputConfig::low_latency().validate().unwrap();
        OutputConfig::high_throughput().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = OutputConfig {
            sample_rate_hz: 44100.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(OutputError::UnsupportedSampleRate { .. })
        ));

        let config = OutputConfig {
            sample_rate_hz: 30000.0,
            max_sample_rate_hz: 20000.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = OutputConfig {
            channels: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(OutputError::InvalidConfig(_))));

        let config = OutputConfig {
            ring_capacity: 512,
            frames_per_chunk: 1024,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(OutputError::InvalidConfig(_))));
    }

    #[test]
    fn test_drain_config_shape() {
        let config = OutputConfig {
            device: "Dev1".to_string(),
            frames_per_chunk: 128,
            channels: 2,
            ..Default::default()
        };
        let drain = config.drain_config();
        assert_eq!(drain.chunk_size(), 256);
        assert_eq!(drain.thread_name, "ao-writer-Dev1");
    }

    #[test]
    fn test_summary_describes_setup() {
        let config = OutputConfig {
            device: "Dev2".to_string(),
            sample_rate_hz: 20000.0,
            digital_output_line: 3,
            ..Default::default()
        };
        assert_eq!(
            config.summary(),
            "device Dev2, 20000 Hz, [-10, 10] V, ring 32768 samples, chunk 1024 frames x 1 ch, TTL line 0 -> DO line 3"
        );
    }

    #[test]
    fn test_load_defaults_without_sources() {
        let config = OutputConfig::load_with_env(None, env_from(&[])).unwrap();
        assert_eq!(config, OutputConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
device = "Dev1"
sample_rate_hz = 10000.0
frames_per_chunk = 500

[voltage_range]
min = -5.0
max = 5.0
"#
        )
        .unwrap();

        let config = OutputConfig::load_with_env(Some(file.path()), env_from(&[])).unwrap();
        assert_eq!(config.device, "Dev1");
        assert_eq!(config.sample_rate_hz, 10000.0);
        assert_eq!(config.frames_per_chunk, 500);
        assert_eq!(config.voltage_range, VoltageRange { min: -5.0, max: 5.0 });
        assert_eq!(config.channels, 1);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "sample_rate_hz = 10000.0").unwrap();

        let env = env_from(&[
            ("ANALOG_OUTPUT_SAMPLE_RATE_HZ", "20000"),
            ("ANALOG_OUTPUT_VOLTAGE_RANGE__MAX", "5"),
            ("ANALOG_OUTPUT_VOLTAGE_RANGE__MIN", "0"),
            ("ANALOG_OUTPUT_DIGITAL_OUTPUT_LINE", "2"),
        ]);
        let config = OutputConfig::load_with_env(Some(file.path()), env).unwrap();
        assert_eq!(config.sample_rate_hz, 20000.0);
        assert_eq!(config.voltage_range, VoltageRange { min: 0.0, max: 5.0 });
        assert_eq!(config.digital_output_line, 2);
        assert_eq!(config.ttl_input_line, 0);
    }

    #[test]
    fn test_load_rejects_invalid() {
        let env = env_from(&[("ANALOG_OUTPUT_SAMPLE_RATE_HZ", "44100")]);
        assert!(matches!(
            OutputConfig::load_with_env(None, env),
            Err(OutputError::UnsupportedSampleRate { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = OutputConfig::load_with_env(
            Some(Path::new("/nonexistent/analog-output.toml")),
            env_from(&[]),
        );
        assert!(matches!(result, Err(OutputError::Config(_))));
    }
}
