//! Audio output configuration
//!
//! Device selection, buffer size and sample rate preferences for the cpal
//! output stream.

use serde::{Deserialize, Serialize};

/// Default buffer size when no preference is specified (frames)
/// 512 frames is a safe default that works on most systems
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Smallest buffer size accepted for a fixed request (frames)
pub const MIN_BUFFER_SIZE: u32 = 64;

/// Preferred buffer size for the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Use [`DEFAULT_BUFFER_SIZE`]
    #[default]
    Default,
    /// Request a specific buffer size in frames (clamped to a sane range)
    Fixed(u32),
}

impl BufferSize {
    /// Get the buffer size in frames, or None for the default
    pub fn as_frames(&self) -> Option<u32> {
        match self {
            BufferSize::Default => None,
            BufferSize::Fixed(frames) => Some(*frames),
        }
    }

    /// Calculate latency in milliseconds for a given sample rate
    pub fn latency_ms(&self, sample_rate: u32) -> Option<f32> {
        self.as_frames()
            .map(|frames| (frames as f32 / sample_rate as f32) * 1000.0)
    }
}

/// Audio device identifier
///
/// Includes the host backend (ALSA, JACK, CoreAudio...) so devices with the
/// same name on different hosts can be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host name; None searches every host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Display label including the host if known
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the audio backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device (None = system default)
    pub device: Option<DeviceId>,

    /// Preferred buffer size
    pub buffer_size: BufferSize,

    /// Preferred sample rate (None = 44.1kHz, falling back to what the device supports)
    pub sample_rate: Option<u32>,
}

impl AudioConfig {
    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    /// Set a fixed buffer size in frames
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    /// Buffer size to request from the device, in frames
    pub fn buffer_frames(&self, max_frames: u32) -> u32 {
        match self.buffer_size {
            BufferSize::Default => DEFAULT_BUFFER_SIZE,
            BufferSize::Fixed(frames) => frames.clamp(MIN_BUFFER_SIZE, max_frames),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_frames_clamped() {
        assert_eq!(AudioConfig::default().buffer_frames(8192), DEFAULT_BUFFER_SIZE);
        assert_eq!(AudioConfig::default().with_buffer_frames(16).buffer_frames(8192), 64);
        assert_eq!(AudioConfig::default().with_buffer_frames(100_000).buffer_frames(8192), 8192);
        assert_eq!(AudioConfig::default().with_buffer_frames(256).buffer_frames(8192), 256);
    }

    #[test]
    fn test_latency_ms() {
        let latency = BufferSize::Fixed(441).latency_ms(44100).unwrap();
        assert!((latency - 10.0).abs() < 1e-4);
        assert_eq!(BufferSize::Default.latency_ms(44100), None);
    }

    #[test]
    fn test_device_label() {
        assert_eq!(DeviceId::new("hw:0,0").display_label(), "hw:0,0");
        assert_eq!(DeviceId::with_host("hw:0,0", "ALSA").display_label(), "[ALSA] hw:0,0");
    }

    #[test]
    fn test_yaml_device_without_host() {
        let config: AudioConfig = serde_yaml::from_str("device:\n  name: Speakers\n").unwrap();
        assert_eq!(config.device, Some(DeviceId::new("Speakers")));
        assert_eq!(config.buffer_size, BufferSize::Default);
    }
}
