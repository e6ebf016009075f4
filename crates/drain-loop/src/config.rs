//! Drain loop configuration

use serde::{Deserialize, Serialize};

/// Drain loop configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrainConfig {
    /// Frames pulled from the ring per iteration (hardware transfer size)
    pub frames_per_chunk: usize,

    /// Interleaved channels per frame
    pub channels: usize,

    /// Name given to the background thread
    pub thread_name: String,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            frames_per_chunk: 1024,
            channels: 1,
            thread_name: "drain-loop".to_string(),
        }
    }
}

impl DrainConfig {
    /// Create a single-channel config with the given chunk length
    pub fn mono(frames_per_chunk: usize) -> Self {
        Self {
            frames_per_chunk,
            ..Default::default()
        }
    }

    /// Samples pulled from the ring per iteration
    pub fn chunk_size(&self) -> usize {
        self.frames_per_chunk * self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_size_scales_with_channels() {
        let config = DrainConfig {
            frames_per_chunk: 256,
            channels: 2,
            ..Default::default()
        };
        assert_eq!(config.chunk_size(), 512);
        assert_eq!(DrainConfig::mono(4).chunk_size(), 4);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: DrainConfig = serde_json::from_str(r#"{ "frames_per_chunk": 64 }"#).unwrap();
        assert_eq!(config.frames_per_chunk, 64);
        assert_eq!(config.channels, 1);
        assert_eq!(config.thread_name, "drain-loop");
    }
}
