//! Common types for OtoDeck
//!
//! This module contains the fundamental audio types used throughout the
//! engine: the planar multi-channel sample buffer used both for decoded
//! tracks and for per-callback audio blocks, the playback direction flag,
//! and deck identifiers.

use rayon::prelude::*;

/// Default sample rate used before the audio device reports its own
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Number of decks in the player
pub const NUM_DECKS: usize = 2;

/// Number of output channels produced by the engine (stereo)
pub const OUTPUT_CHANNELS: usize = 2;

/// Audio sample type (32-bit float for processing)
pub type Sample = f32;

/// Playback direction of a deck
///
/// Governs which transport is drained for output and how positions are
/// interpreted for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

impl Direction {
    /// Check if playing forward
    #[inline]
    pub fn is_forward(&self) -> bool {
        matches!(self, Self::Forward)
    }

    /// Check if playing in reverse
    #[inline]
    pub fn is_reverse(&self) -> bool {
        matches!(self, Self::Reverse)
    }

    /// The opposite direction
    pub fn flipped(&self) -> Self {
        match self {
            Self::Forward => Self::Reverse,
            Self::Reverse => Self::Forward,
        }
    }
}

/// A planar multi-channel buffer of samples
///
/// One `Vec` per channel, all of equal length. Used for two things:
/// - whole decoded tracks (forward and reversed mirror), built off the audio thread
/// - per-callback audio blocks, pre-allocated to a fixed capacity and resized
///   with [`AudioBuffer::set_len_from_capacity`] so the audio thread never allocates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<Sample>>,
}

impl AudioBuffer {
    /// Create an empty buffer with `capacity` frames reserved per channel
    pub fn with_capacity(num_channels: usize, capacity: usize) -> Self {
        Self {
            channels: (0..num_channels).map(|_| Vec::with_capacity(capacity)).collect(),
        }
    }

    /// Create a buffer filled with silence
    pub fn silence(num_channels: usize, len: usize) -> Self {
        Self {
            channels: (0..num_channels).map(|_| vec![0.0; len]).collect(),
        }
    }

    /// Create a buffer from per-channel sample vectors
    pub fn from_channels(channels: Vec<Vec<Sample>>) -> Self {
        if let Some(first) = channels.first() {
            let len = first.len();
            assert!(
                channels.iter().all(|c| c.len() == len),
                "Channel lengths must match"
            );
        }
        Self { channels }
    }

    /// Create a buffer from interleaved samples [c0, c1, ..., c0, c1, ...]
    ///
    /// A trailing partial frame is discarded.
    pub fn from_interleaved(interleaved: &[Sample], num_channels: usize) -> Self {
        assert!(num_channels > 0, "Interleaved buffer needs at least one channel");
        let frames = interleaved.len() / num_channels;
        let mut channels: Vec<Vec<Sample>> =
            (0..num_channels).map(|_| Vec::with_capacity(frames)).collect();
        for frame in interleaved.chunks_exact(num_channels) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }
        Self { channels }
    }

    /// Number of channels
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames (samples per channel)
    #[inline]
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Check if the buffer holds no frames
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames reserved per channel
    pub fn capacity(&self) -> usize {
        self.channels.first().map_or(0, Vec::capacity)
    }

    /// Get one channel's samples
    #[inline]
    pub fn channel(&self, channel: usize) -> &[Sample] {
        &self.channels[channel]
    }

    /// Get one channel's samples mutably
    #[inline]
    pub fn channel_mut(&mut self, channel: usize) -> &mut [Sample] {
        &mut self.channels[channel]
    }

    /// Iterate over channels
    pub fn channels(&self) -> impl Iterator<Item = &[Sample]> {
        self.channels.iter().map(Vec::as_slice)
    }

    /// Iterate over channels mutably
    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut [Sample]> {
        self.channels.iter_mut().map(Vec::as_mut_slice)
    }

    /// Read a single sample
    #[inline]
    pub fn sample(&self, channel: usize, index: usize) -> Sample {
        self.channels[channel][index]
    }

    /// Set the working length of a pre-allocated buffer (real-time safe)
    ///
    /// Never allocates as long as `new_len <= capacity()`.
    /// Newly exposed frames are filled with silence.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        for channel in &mut self.channels {
            debug_assert!(
                new_len <= channel.capacity(),
                "set_len_from_capacity called with len > capacity"
            );
            channel.resize(new_len, 0.0);
        }
    }

    /// Fill the buffer with silence
    pub fn fill_silence(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
    }

    /// Add another buffer to this one (summing samples)
    ///
    /// Channels of `other` beyond our channel count are ignored; missing
    /// channels in `other` contribute nothing.
    pub fn add_buffer(&mut self, other: &AudioBuffer) {
        assert_eq!(self.len(), other.len(), "Buffer lengths must match");
        for (dst, src) in self.channels.iter_mut().zip(other.channels.iter()) {
            for (d, s) in dst.iter_mut().zip(src.iter()) {
                *d += *s;
            }
        }
    }

    /// Scale all samples by a factor
    pub fn scale(&mut self, factor: Sample) {
        for channel in &mut self.channels {
            for sample in channel.iter_mut() {
                *sample *= factor;
            }
        }
    }

    /// Apply a linear gain ramp from `start` to `end` across the buffer
    pub fn apply_gain_ramp(&mut self, start: Sample, end: Sample) {
        let len = self.len();
        if len == 0 {
            return;
        }
        if start == end {
            if start != 1.0 {
                self.scale(start);
            }
            return;
        }
        let step = (end - start) / len as Sample;
        for channel in &mut self.channels {
            let mut gain = start;
            for sample in channel.iter_mut() {
                *sample *= gain;
                gain += step;
            }
        }
    }

    /// Build the time-reversed mirror of this buffer
    ///
    /// Every channel is reversed independently (in parallel):
    /// `reversed[c][i] == self[c][len - 1 - i]`.
    pub fn reversed(&self) -> Self {
        let channels = self
            .channels
            .par_iter()
            .map(|channel| channel.iter().rev().copied().collect())
            .collect();
        Self { channels }
    }

    /// Write frames into an interleaved device buffer
    ///
    /// Device channels beyond ours are filled with silence; frames beyond our
    /// length are silent as well.
    pub fn write_interleaved(&self, output: &mut [Sample], output_channels: usize) {
        let len = self.len();
        for (i, frame) in output.chunks_mut(output_channels).enumerate() {
            for (c, out) in frame.iter_mut().enumerate() {
                *out = if i < len && c < self.channels.len() {
                    self.channels[c][i]
                } else {
                    0.0
                };
            }
        }
    }

    /// Get the peak amplitude in the buffer
    pub fn peak(&self) -> Sample {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .map(|s| s.abs())
            .fold(0.0, Sample::max)
    }
}

/// Deck identifier (0-1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeckId(pub usize);

impl DeckId {
    /// Create a new deck ID (panics if >= NUM_DECKS)
    pub fn new(id: usize) -> Self {
        assert!(id < NUM_DECKS, "Deck ID must be less than {}", NUM_DECKS);
        Self(id)
    }

    /// Get the deck number (1-2 for display)
    pub fn display_number(&self) -> usize {
        self.0 + 1
    }
}

impl std::fmt::Display for DeckId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Deck {}", self.display_number())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_from_interleaved() {
        let buffer = AudioBuffer::from_interleaved(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2);

        assert_eq!(buffer.num_channels(), 2);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.channel(0), &[1.0, 3.0, 5.0]);
        assert_eq!(buffer.channel(1), &[2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_reversed_mirrors_every_channel() {
        let buffer = AudioBuffer::from_channels(vec![
            vec![0.1, 0.2, 0.3, 0.4],
            vec![-1.0, -2.0, -3.0, -4.0],
        ]);
        let reversed = buffer.reversed();
        let n = buffer.len();

        assert_eq!(reversed.num_channels(), buffer.num_channels());
        assert_eq!(reversed.len(), n);
        for c in 0..buffer.num_channels() {
            for i in 0..n {
                assert_eq!(reversed.sample(c, i), buffer.sample(c, n - 1 - i));
            }
        }
    }

    #[test]
    fn test_set_len_from_capacity_keeps_allocation() {
        let mut block = AudioBuffer::with_capacity(2, 1024);
        let capacity = block.capacity();

        block.set_len_from_capacity(512);
        assert_eq!(block.len(), 512);
        block.set_len_from_capacity(64);
        assert_eq!(block.len(), 64);
        assert_eq!(block.capacity(), capacity);
    }

    #[test]
    fn test_write_interleaved_pads_extra_device_channels() {
        let buffer = AudioBuffer::from_channels(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let mut out = [9.0; 6];
        buffer.write_interleaved(&mut out, 3);

        assert_eq!(out, [1.0, 3.0, 0.0, 2.0, 4.0, 0.0]);
    }

    #[test]
    fn test_gain_ramp_reaches_target() {
        let mut buffer = AudioBuffer::from_channels(vec![vec![1.0; 4]]);
        buffer.apply_gain_ramp(0.0, 1.0);

        assert_eq!(buffer.sample(0, 0), 0.0);
        assert!(buffer.sample(0, 3) > buffer.sample(0, 1));
        assert!(buffer.sample(0, 3) < 1.0);
    }

    #[test]
    fn test_direction_flip() {
        assert_eq!(Direction::default(), Direction::Forward);
        assert!(Direction::Forward.flipped().is_reverse());
        assert!(Direction::Reverse.flipped().is_forward());
    }
}
