//! Playback transport
//!
//! Owns one positionable source and tracks play/pause state, gain and
//! end-of-stream. A stopped transport (or one without a source) outputs
//! silence and does not advance its source.

use crate::types::AudioBuffer;

use super::source::PositionableSource;

/// Transport around a single source
pub struct Transport<S: PositionableSource> {
    source: Option<S>,
    gain: f32,
    /// Gain applied at the end of the previous block (ramp start)
    last_gain: f32,
    playing: bool,
    stream_finished: bool,
}

impl<S: PositionableSource> Transport<S> {
    pub fn new() -> Self {
        Self {
            source: None,
            gain: 1.0,
            last_gain: 1.0,
            playing: false,
            stream_finished: false,
        }
    }

    /// Attach a source (or detach with `None`), stopping playback first
    ///
    /// Returns the previously attached source.
    pub fn set_source(&mut self, source: Option<S>) -> Option<S> {
        self.stop();
        self.stream_finished = false;
        std::mem::replace(&mut self.source, source)
    }

    pub fn source(&self) -> Option<&S> {
        self.source.as_ref()
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Start playback (no-op without a source)
    pub fn start(&mut self) {
        if !self.playing && self.source.is_some() {
            self.playing = true;
            self.stream_finished = false;
        }
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// True once a non-looping source has been read to its end
    pub fn has_stream_finished(&self) -> bool {
        self.stream_finished
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Seek to a position in seconds (clamped by the source)
    pub fn set_position(&mut self, seconds: f64) {
        if let Some(source) = self.source.as_mut() {
            let rate = source.sample_rate();
            let frames = if seconds.is_finite() {
                (seconds * rate) as i64
            } else {
                0
            };
            source.set_next_read_position(frames);
            self.stream_finished = false;
        }
    }

    /// Seek to an absolute frame index (clamped by the source)
    pub fn set_next_read_position(&mut self, frames: i64) {
        if let Some(source) = self.source.as_mut() {
            source.set_next_read_position(frames);
            self.stream_finished = false;
        }
    }

    /// Read cursor in frames (0 without a source)
    pub fn next_read_position(&self) -> i64 {
        self.source.as_ref().map_or(0, |s| s.next_read_position())
    }

    /// Total length in frames (0 without a source)
    pub fn total_length(&self) -> i64 {
        self.source.as_ref().map_or(0, |s| s.total_length())
    }

    /// Sample rate of the attached source (0 without a source)
    pub fn sample_rate(&self) -> f64 {
        self.source.as_ref().map_or(0.0, |s| s.sample_rate())
    }

    /// Position in seconds
    pub fn current_position(&self) -> f64 {
        let rate = self.sample_rate();
        if rate > 0.0 {
            self.next_read_position() as f64 / rate
        } else {
            0.0
        }
    }

    /// Length in seconds
    pub fn length_in_seconds(&self) -> f64 {
        let rate = self.sample_rate();
        if rate > 0.0 {
            self.total_length() as f64 / rate
        } else {
            0.0
        }
    }

    /// Produce the next block
    ///
    /// Gain changes are ramped across the block to avoid zipper noise.
    pub fn get_next_audio_block(&mut self, block: &mut AudioBuffer) {
        let source = match self.source.as_mut() {
            Some(source) if self.playing => source,
            _ => {
                block.fill_silence();
                self.last_gain = self.gain;
                return;
            }
        };

        source.read_block(block);
        block.apply_gain_ramp(self.last_gain, self.gain);
        self.last_gain = self.gain;

        if !source.is_looping() && source.next_read_position() >= source.total_length() {
            self.playing = false;
            self.stream_finished = true;
        }
    }
}

impl<S: PositionableSource> Default for Transport<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::gc::gc_handle;
    use crate::engine::source::FileSource;
    use basedrop::Shared;

    fn transport_with(samples: Vec<f32>, rate: u32) -> Transport<FileSource> {
        let buffer = Shared::new(&gc_handle(), AudioBuffer::from_channels(vec![samples]));
        let mut transport = Transport::new();
        transport.set_source(Some(FileSource::new(buffer, rate)));
        transport
    }

    #[test]
    fn test_stopped_transport_is_silent_and_still() {
        let mut transport = transport_with(vec![1.0; 8], 4);
        let mut block = AudioBuffer::silence(1, 4);

        transport.get_next_audio_block(&mut block);

        assert_eq!(block.peak(), 0.0);
        assert_eq!(transport.next_read_position(), 0);
    }

    #[test]
    fn test_transport_without_source_cannot_start() {
        let mut transport: Transport<FileSource> = Transport::new();
        transport.start();
        assert!(!transport.is_playing());
        assert_eq!(transport.current_position(), 0.0);
        assert_eq!(transport.length_in_seconds(), 0.0);
    }

    #[test]
    fn test_transport_finishes_at_end() {
        let mut transport = transport_with(vec![1.0; 6], 4);
        let mut block = AudioBuffer::silence(1, 4);

        transport.start();
        transport.get_next_audio_block(&mut block);
        assert!(transport.is_playing());
        transport.get_next_audio_block(&mut block);

        assert!(!transport.is_playing());
        assert!(transport.has_stream_finished());
        assert_eq!(block.channel(0), &[1.0, 1.0, 0.0, 0.0]);

        // Seeking clears the finished flag
        transport.set_position(0.5);
        assert!(!transport.has_stream_finished());
        assert_eq!(transport.next_read_position(), 2);
    }

    #[test]
    fn test_transport_positions_in_seconds() {
        let mut transport = transport_with(vec![0.0; 40], 10);

        assert!((transport.length_in_seconds() - 4.0).abs() < 1e-12);
        transport.set_position(1.5);
        assert!((transport.current_position() - 1.5).abs() < 1e-12);
        transport.set_position(100.0);
        assert!((transport.current_position() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_gain_is_ramped_then_held() {
        let mut transport = transport_with(vec![1.0; 64], 10);
        let mut block = AudioBuffer::silence(1, 8);

        transport.start();
        transport.set_gain(0.5);
        transport.get_next_audio_block(&mut block);
        assert_eq!(block.sample(0, 0), 1.0);
        assert!(block.sample(0, 7) < 1.0);

        transport.get_next_audio_block(&mut block);
        assert!(block.channel(0).iter().all(|s| (*s - 0.5).abs() < 1e-6));
    }
}
