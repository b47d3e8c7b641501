//! Positionable audio sources
//!
//! A deck reads its audio through two sources that share one interface:
//! - [`FileSource`]: the decoded track, read front to back
//! - [`MemorySource`]: the time-reversed mirror of the track
//!
//! Both hold a `Shared` view of a buffer owned by the loaded track, keep an
//! integer read cursor, and never allocate or mutate the buffer while reading.

use basedrop::Shared;

use crate::types::AudioBuffer;

/// An audio source with a seekable read cursor
pub trait PositionableSource: Send {
    /// Fill every frame of `block`, advancing the cursor
    fn read_block(&mut self, block: &mut AudioBuffer);

    /// Move the read cursor (clamped to the source's valid range)
    fn set_next_read_position(&mut self, position: i64);

    /// Current read cursor in frames
    fn next_read_position(&self) -> i64;

    /// Total length in frames
    fn total_length(&self) -> i64;

    /// Whether reading wraps around at the end
    fn is_looping(&self) -> bool;

    fn set_looping(&mut self, looping: bool);

    /// Sample rate of the underlying buffer
    fn sample_rate(&self) -> f64;
}

/// Copy `frames` samples starting at `start` from `src` into `dst`,
/// wrapping or padding with silence at the end of the source.
///
/// Returns the cursor after the run.
#[inline]
fn copy_run(src: &[f32], dst: &mut [f32], start: usize, looping: bool) -> usize {
    let len = src.len();
    let mut cursor = start;
    for slot in dst.iter_mut() {
        if cursor >= len {
            if looping && len > 0 {
                cursor = 0;
            } else {
                *slot = 0.0;
                continue;
            }
        }
        *slot = src[cursor];
        cursor += 1;
    }
    cursor
}

/// Read one block from a shared buffer into `block`
///
/// Destination channel `c` reads source channel `c % source_channels`, so a
/// mono track plays on both output channels. All channels read the same run
/// and the returned cursor reflects a single advance.
fn read_shared(
    buffer: &AudioBuffer,
    block: &mut AudioBuffer,
    cursor: usize,
    looping: bool,
) -> usize {
    let source_channels = buffer.num_channels();
    if source_channels == 0 || buffer.is_empty() {
        block.fill_silence();
        return cursor;
    }

    let mut next = cursor;
    for (c, dst) in block.channels_mut().enumerate() {
        next = copy_run(buffer.channel(c % source_channels), dst, cursor, looping);
    }
    next
}

/// Forward source over the decoded track
///
/// Seeks clamp to `[0, length]`; reading past the end yields silence.
pub struct FileSource {
    buffer: Shared<AudioBuffer>,
    sample_rate: f64,
    cursor: usize,
    looping: bool,
}

impl FileSource {
    pub fn new(buffer: Shared<AudioBuffer>, sample_rate: u32) -> Self {
        Self {
            buffer,
            sample_rate: sample_rate as f64,
            cursor: 0,
            looping: false,
        }
    }
}

impl PositionableSource for FileSource {
    fn read_block(&mut self, block: &mut AudioBuffer) {
        self.cursor = read_shared(&self.buffer, block, self.cursor, self.looping);
    }

    fn set_next_read_position(&mut self, position: i64) {
        let len = self.buffer.len() as i64;
        self.cursor = position.clamp(0, len) as usize;
    }

    fn next_read_position(&self) -> i64 {
        self.cursor as i64
    }

    fn total_length(&self) -> i64 {
        self.buffer.len() as i64
    }

    fn is_looping(&self) -> bool {
        self.looping
    }

    fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

/// Reverse source over the mirrored buffer
///
/// Seeks clamp to `[0, length - 1]`. Once the cursor reaches the end it stays
/// there and the rest of the block is silent, unless looping is enabled.
pub struct MemorySource {
    buffer: Shared<AudioBuffer>,
    sample_rate: f64,
    cursor: usize,
    looping: bool,
}

impl MemorySource {
    pub fn new(buffer: Shared<AudioBuffer>, sample_rate: u32, looping: bool) -> Self {
        Self {
            buffer,
            sample_rate: sample_rate as f64,
            cursor: 0,
            looping,
        }
    }

    /// Cursor position in seconds
    pub fn current_position(&self) -> f64 {
        if self.sample_rate <= 0.0 {
            return 0.0;
        }
        self.cursor as f64 / self.sample_rate
    }
}

impl PositionableSource for MemorySource {
    fn read_block(&mut self, block: &mut AudioBuffer) {
        self.cursor = read_shared(&self.buffer, block, self.cursor, self.looping);
    }

    fn set_next_read_position(&mut self, position: i64) {
        let last = (self.buffer.len() as i64 - 1).max(0);
        self.cursor = position.clamp(0, last) as usize;
    }

    fn next_read_position(&self) -> i64 {
        self.cursor as i64
    }

    fn total_length(&self) -> i64 {
        self.buffer.len() as i64
    }

    fn is_looping(&self) -> bool {
        self.looping
    }

    fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}
