//! Variable-speed linear resampler
//!
//! Wraps a [`Transport`] and plays it back at a speed ratio (no pitch
//! correction). The step per output frame also folds in the ratio between the
//! source's native sample rate and the device rate, so a 48kHz track plays at
//! the right pitch on a 44.1kHz device.
//!
//! Linear interpolation between two adjacent frames:
//!
//! ```text
//! out[j] = w[i] + (w[i + 1] - w[i]) * t      where  i + t = frac + j * step
//! ```
//!
//! `w` is a small window of frames pulled from the transport. Frames before the
//! next read position are dropped after every chunk; the fractional remainder
//! carries over so consecutive blocks are phase-continuous.

use crate::types::{AudioBuffer, Sample};

use super::engine::MAX_BUFFER_SIZE;
use super::source::PositionableSource;
use super::transport::Transport;

/// Slowest allowed playback speed
pub const MIN_SPEED_RATIO: f64 = 0.05;

/// Fastest allowed playback speed
pub const MAX_SPEED_RATIO: f64 = 4.0;

/// Upper bound on source frames consumed per output frame
const MAX_STEP: f64 = 64.0;

/// Frames held in the interpolation window
const WINDOW_CAPACITY: usize = MAX_BUFFER_SIZE * 4;

#[inline]
fn lerp_sample(s0: Sample, s1: Sample, t: f32) -> Sample {
    s0 + (s1 - s0) * t
}

/// Speed-changing wrapper around a transport
pub struct Resampler<S: PositionableSource> {
    transport: Transport<S>,
    speed: f64,
    output_rate: f64,
    /// Interpolation window, `window[0]` sits at position 0
    window: AudioBuffer,
    /// Scratch block the transport renders into
    pull: AudioBuffer,
    /// Fractional read position into the window
    frac: f64,
}

impl<S: PositionableSource> Resampler<S> {
    /// Create a resampler producing `num_channels` output channels
    pub fn new(num_channels: usize, output_rate: u32) -> Self {
        let mut resampler = Self {
            transport: Transport::new(),
            speed: 1.0,
            output_rate: output_rate as f64,
            window: AudioBuffer::with_capacity(num_channels, WINDOW_CAPACITY),
            pull: AudioBuffer::with_capacity(num_channels, WINDOW_CAPACITY),
            frac: 0.0,
        };
        resampler.flush();
        resampler
    }

    /// Set the device sample rate
    pub fn prepare_to_play(&mut self, output_rate: u32) {
        self.output_rate = output_rate as f64;
        self.flush();
    }

    pub fn transport(&self) -> &Transport<S> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport<S> {
        &mut self.transport
    }

    /// Set the speed ratio, clamped to the supported range
    ///
    /// Non-finite ratios are ignored.
    pub fn set_speed(&mut self, ratio: f64) {
        if ratio.is_finite() {
            self.speed = ratio.clamp(MIN_SPEED_RATIO, MAX_SPEED_RATIO);
        }
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Source frames consumed per output frame
    pub fn step(&self) -> f64 {
        let source_rate = self.transport.sample_rate();
        let correction = if source_rate > 0.0 && self.output_rate > 0.0 {
            source_rate / self.output_rate
        } else {
            1.0
        };
        (self.speed * correction).clamp(f64::MIN_POSITIVE, MAX_STEP)
    }

    /// Drop buffered frames
    ///
    /// Call after seeking or switching direction so stale frames from the old
    /// position are not interpolated into the new one.
    pub fn flush(&mut self) {
        self.window.set_len_from_capacity(0);
        self.window.set_len_from_capacity(1);
        self.frac = 0.0;
    }

    /// Fill `block` with resampled audio
    pub fn get_next_audio_block(&mut self, block: &mut AudioBuffer) {
        let frames = block.len();
        let step = self.step();
        let mut done = 0;

        while done < frames {
            let room = (WINDOW_CAPACITY - 2) as f64 - self.frac;
            let max_chunk = ((room / step).floor() as usize).max(1);
            let count = (frames - done).min(max_chunk);
            self.render_chunk(block, done, count, step);
            done += count;
        }
    }

    fn render_chunk(&mut self, block: &mut AudioBuffer, offset: usize, count: usize, step: f64) {
        let last = self.frac + (count - 1) as f64 * step;
        let end = self.frac + count as f64 * step;
        let needed = last.floor() as usize + 2;
        let consumed = end.floor() as usize;
        let target = needed.max(consumed);

        let have = self.window.len();
        if target > have {
            self.pull.set_len_from_capacity(target - have);
            self.transport.get_next_audio_block(&mut self.pull);
            self.window.set_len_from_capacity(target);
            for (dst, src) in self.window.channels_mut().zip(self.pull.channels()) {
                dst[have..target].copy_from_slice(src);
            }
        }

        for (dst, src) in block.channels_mut().zip(self.window.channels()) {
            let dst = &mut dst[offset..offset + count];
            for (j, out) in dst.iter_mut().enumerate() {
                let pos = self.frac + j as f64 * step;
                let i = pos.floor() as usize;
                let t = (pos - i as f64) as f32;
                *out = lerp_sample(src[i], src[i + 1], t);
            }
        }
        // Output channels the window doesn't cover stay silent
        let channels = self.window.num_channels();
        for dst in block.channels_mut().skip(channels) {
            dst[offset..offset + count].fill(0.0);
        }

        let total = self.window.len();
        for channel in self.window.channels_mut() {
            channel.copy_within(consumed..total, 0);
        }
        self.window.set_len_from_capacity(total - consumed);
        self.frac = end - consumed as f64;
    }
}
