//! Analog Output Pipeline - Demo Entry Point
//!
//! Streams a sine wave through the ring and drain loop into a simulated
//! device, toggling the TTL input once per second.

use analog_output::{init_logging, AnalogOutput, OutputConfig};
use anyhow::Context;
use clap::Parser;
use std::f32::consts::TAU;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

/// Samples produced per processing callback
const BLOCK_SIZE: usize = 512;

/// Frequency of the generated test tone
const TONE_HZ: f32 = 10.0;

/// Stream a test tone to a simulated analog output device
#[derive(Parser, Debug)]
#[command(name = "analog-output-demo", version, about, long_about = None)]
struct Args {
    /// Output configuration file (TOML, JSON or YAML)
    #[arg(value_name = "FILE")]
    config: Option<PathBuf>,

    /// How long to stream, in seconds
    #[arg(default_value_t = 2.0)]
    seconds: f64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = OutputConfig::load(args.config.as_deref()).context("loading output configuration")?;
    init_logging(&config.logging)?;

    info!("=== Analog Output Pipeline v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Output configured: {}", config.summary());
    let ttl_line = config.ttl_input_line;

    let sample_rate = config.sample_rate_hz;
    let (mut output, device) = AnalogOutput::simulated(config)?;
    output.start_acquisition()?;

    let block_period = Duration::from_secs_f64(BLOCK_SIZE as f64 / sample_rate);
    let run_for = Duration::try_from_secs_f64(args.seconds)
        .context("duration must be a non-negative number of seconds")?;
    let started = Instant::now();
    let mut block = vec![0.0f32; BLOCK_SIZE];
    let mut phase = 0.0f32;
    let step = TAU * TONE_HZ / sample_rate as f32;

    let mut ttl_high = false;

    while started.elapsed() < run_for {
        for sample in block.iter_mut() {
            *sample = phase.sin();
            phase = (phase + step) % TAU;
        }
        output.process(&block);

        let second_is_odd = started.elapsed().as_secs() % 2 == 1;
        if second_is_odd != ttl_high {
            ttl_high = second_is_odd;
            output.handle_ttl_event(ttl_line, ttl_high)?;
        }
        thread::sleep(block_period);
    }

    output.stop_acquisition()?;

    let stats = output.stats();
    let ring = output.ring_stats();
    info!(
        "Delivered {} chunks ({} samples) to '{}'; {} dropped by device, {} overwritten in ring, {} sink errors",
        stats.chunks_written,
        device.samples_written(),
        output.config().device,
        stats.samples_dropped,
        ring.overwritten,
        stats.sink_errors
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["analog-output-demo"]).unwrap();
        assert_eq!(args.config, None);
        assert_eq!(args.seconds, 2.0);
    }

    #[test]
    fn test_args_config_and_duration() {
        let args = Args::try_parse_from(["analog-output-demo", "out.toml", "0.5"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("out.toml")));
        assert_eq!(args.seconds, 0.5);

        assert!(Args::try_parse_from(["analog-output-demo", "out.toml", "soon"]).is_err());
    }
}
