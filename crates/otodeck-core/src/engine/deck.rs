//! Deck - dual-direction track player
//!
//! Each deck holds a track twice: as decoded (forward) and as its reversed
//! mirror. Two transports, each behind its own resampler, read one buffer
//! apiece and only the one selected by the direction flag is audible.
//!
//! Switching direction translates the playhead so the listener hears the
//! track turn around at the same spot:
//!
//! ```text
//! forward:  0 ──────────── p ──────────── L
//! reverse:  L ──────────── p ──────────── 0     reverse cursor = L - p
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::{AudioBuffer, DeckId, Direction, DEFAULT_SAMPLE_RATE, OUTPUT_CHANNELS};

use super::resampler::Resampler;
use super::source::{FileSource, MemorySource};
use super::track::PreparedTrack;

/// Lock-free playback state for UI access
///
/// The audio thread publishes a snapshot after every block and after every
/// control command. Readers see values at most one callback period old.
///
/// All operations use `Ordering::Relaxed` since we only need visibility,
/// not synchronization with other memory operations.
pub struct DeckAtomics {
    /// Whether a track is loaded
    pub loaded: AtomicBool,
    /// Whether the active transport is playing
    pub playing: AtomicBool,
    /// Direction flag (true = reverse)
    pub reversed: AtomicBool,
    /// Whether the active transport reached the end of its stream
    pub finished: AtomicBool,
    /// Relative position on the forward timeline (f64 bits)
    pub position_relative: AtomicU64,
    /// Track length in seconds (f64 bits)
    pub length_seconds: AtomicU64,
    /// Seconds read on the active buffer (f64 bits)
    pub display_position: AtomicU64,
    /// Current speed ratio (f64 bits)
    pub speed: AtomicU64,
    /// Current gain (f64 bits)
    pub gain: AtomicU64,
}

impl DeckAtomics {
    pub fn new() -> Self {
        Self {
            loaded: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            reversed: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            position_relative: AtomicU64::new(0f64.to_bits()),
            length_seconds: AtomicU64::new(0f64.to_bits()),
            display_position: AtomicU64::new(0f64.to_bits()),
            speed: AtomicU64::new(1f64.to_bits()),
            gain: AtomicU64::new(1f64.to_bits()),
        }
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_reversed(&self) -> bool {
        self.reversed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }

    /// Relative position in `[0, 1]` on the forward timeline
    #[inline]
    pub fn position_relative(&self) -> f64 {
        f64::from_bits(self.position_relative.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn length_seconds(&self) -> f64 {
        f64::from_bits(self.length_seconds.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn display_position(&self) -> f64 {
        f64::from_bits(self.display_position.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn speed(&self) -> f64 {
        f64::from_bits(self.speed.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn gain(&self) -> f64 {
        f64::from_bits(self.gain.load(Ordering::Relaxed))
    }
}

impl Default for DeckAtomics {
    fn default() -> Self {
        Self::new()
    }
}

/// A single deck
pub struct Deck {
    id: DeckId,
    /// Reads the decoded buffer front to back
    forward: Resampler<FileSource>,
    /// Reads the reversed mirror front to back
    reverse: Resampler<MemorySource>,
    direction: Direction,
    /// Device sample rate
    output_rate: u32,
    /// Native rate of the loaded track
    track_rate: u32,
    path: Option<PathBuf>,
    atomics: Arc<DeckAtomics>,
}

impl Deck {
    /// Create a new empty deck
    pub fn new(id: DeckId) -> Self {
        Self::with_format(id, OUTPUT_CHANNELS, DEFAULT_SAMPLE_RATE)
    }

    /// Create a deck for a given channel count and device rate
    pub fn with_format(id: DeckId, num_channels: usize, output_rate: u32) -> Self {
        Self {
            id,
            forward: Resampler::new(num_channels, output_rate),
            reverse: Resampler::new(num_channels, output_rate),
            direction: Direction::Forward,
            output_rate,
            track_rate: 0,
            path: None,
            atomics: Arc::new(DeckAtomics::new()),
        }
    }

    /// Get a reference to the lock-free atomic state
    pub fn atomics(&self) -> Arc<DeckAtomics> {
        Arc::clone(&self.atomics)
    }

    pub fn id(&self) -> DeckId {
        self.id
    }

    /// Set the device sample rate
    pub fn prepare_to_play(&mut self, output_rate: u32) {
        self.output_rate = output_rate;
        self.forward.prepare_to_play(output_rate);
        self.reverse.prepare_to_play(output_rate);
    }

    /// Decode a file and load it
    ///
    /// Blocks while decoding, so never call this on the audio thread. On
    /// failure the error is logged and the current track keeps playing.
    pub fn load_track(&mut self, path: &Path) -> bool {
        match PreparedTrack::load(path) {
            Ok(track) => {
                log::info!("{}: loaded {:?} ({:.1}s)", self.id, path, track.duration_seconds());
                self.load_prepared(track);
                true
            }
            Err(e) => {
                log::warn!("{}: failed to load {:?}: {}", self.id, path, e);
                false
            }
        }
    }

    /// Swap in a prepared track and start playing it forward
    ///
    /// Real-time safe: the previous buffers are handed to the collector
    /// thread when their sources are dropped.
    pub fn load_prepared(&mut self, track: PreparedTrack) {
        let PreparedTrack {
            path,
            forward,
            reversed,
            sample_rate,
        } = track;

        self.forward.transport_mut().stop();
        self.reverse.transport_mut().stop();
        self.forward.transport_mut().set_source(None);
        self.reverse.transport_mut().set_source(None);

        self.forward
            .transport_mut()
            .set_source(Some(FileSource::new(forward, sample_rate)));
        self.reverse
            .transport_mut()
            .set_source(Some(MemorySource::new(reversed, sample_rate, false)));
        self.forward.flush();
        self.reverse.flush();

        self.track_rate = sample_rate;
        self.path = Some(path);
        self.direction = Direction::Forward;
        self.forward.transport_mut().start();
        self.publish_atomics();
    }

    /// Remove the loaded track
    pub fn unload(&mut self) {
        self.forward.transport_mut().set_source(None);
        self.reverse.transport_mut().set_source(None);
        self.forward.flush();
        self.reverse.flush();
        self.direction = Direction::Forward;
        self.track_rate = 0;
        self.path = None;
        self.publish_atomics();
    }

    pub fn is_loaded(&self) -> bool {
        self.forward.transport().has_source()
    }

    /// Path of the loaded track
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Resume or switch to forward playback
    pub fn start(&mut self) {
        self.start_forward();
    }

    /// Play forward, translating the playhead if currently reversed
    pub fn start_forward(&mut self) {
        if !self.is_loaded() {
            return;
        }
        if self.direction.is_forward() {
            self.forward.transport_mut().start();
        } else {
            let length = self.total_frames();
            let reverse_pos = self.reverse.transport().next_read_position();
            self.reverse.transport_mut().stop();

            self.forward.flush();
            self.forward
                .transport_mut()
                .set_next_read_position(length - reverse_pos);
            self.forward.transport_mut().start();
            self.direction = Direction::Forward;
        }
        self.publish_atomics();
    }

    /// Play in reverse, translating the playhead if currently forward
    pub fn start_reverse(&mut self) {
        if !self.is_loaded() {
            return;
        }
        if self.direction.is_reverse() {
            self.reverse.transport_mut().start();
        } else {
            let length = self.total_frames();
            let forward_pos = self.forward.transport().next_read_position();
            self.forward.transport_mut().stop();

            self.reverse.flush();
            self.reverse
                .transport_mut()
                .set_next_read_position(length - forward_pos);
            self.reverse.transport_mut().start();
            self.direction = Direction::Reverse;
        }
        self.publish_atomics();
    }

    /// Pause the active transport
    pub fn stop(&mut self) {
        match self.direction {
            Direction::Forward => self.forward.transport_mut().stop(),
            Direction::Reverse => self.reverse.transport_mut().stop(),
        }
        self.publish_atomics();
    }

    /// Seek by fraction of the track (clamped to `[0, 1]`)
    ///
    /// The fraction is on the forward timeline in both directions, so `0.25`
    /// always means a quarter of the way into the track as written.
    pub fn set_position_relative(&mut self, position: f64) {
        if !self.is_loaded() {
            return;
        }
        let position = if position.is_nan() {
            0.0
        } else {
            position.clamp(0.0, 1.0)
        };
        let length = self.total_frames();
        let frames = (position * length as f64) as i64;

        match self.direction {
            Direction::Forward => {
                self.forward.flush();
                self.forward.transport_mut().set_next_read_position(frames);
            }
            Direction::Reverse => {
                self.reverse.flush();
                self.reverse
                    .transport_mut()
                    .set_next_read_position(length - frames);
            }
        }
        self.publish_atomics();
    }

    /// Seek to a time on the forward timeline
    ///
    /// In reverse the time is mirrored onto the reversed buffer's cursor, so the
    /// frame heard next is the one at `seconds` in the original track.
    ///
    /// Negative and NaN times seek to the start, times past the end to the end.
    pub fn set_position(&mut self, seconds: f64) {
        if !self.is_loaded() {
            return;
        }
        let seconds = if seconds.is_nan() {
            0.0
        } else {
            seconds.clamp(0.0, self.length_in_seconds())
        };
        match self.direction {
            Direction::Forward => {
                self.forward.flush();
                self.forward.transport_mut().set_position(seconds);
            }
            Direction::Reverse => {
                let total = self.total_frames();
                let frames = ((seconds * self.track_rate as f64).floor() as i64)
                    .clamp(0, (total - 1).max(0));
                let cursor = total - frames - 1;
                self.reverse.flush();
                self.reverse.transport_mut().set_next_read_position(cursor);
            }
        }
        self.publish_atomics();
    }

    /// Set the gain on both transports (negative values become 0)
    pub fn set_gain(&mut self, gain: f32) {
        let gain = if gain.is_finite() { gain.max(0.0) } else { 0.0 };
        self.forward.transport_mut().set_gain(gain);
        self.reverse.transport_mut().set_gain(gain);
        self.publish_atomics();
    }

    pub fn gain(&self) -> f32 {
        self.forward.transport().gain()
    }

    /// Set the speed ratio on both resamplers
    pub fn set_speed(&mut self, ratio: f64) {
        self.forward.set_speed(ratio);
        self.reverse.set_speed(ratio);
        self.publish_atomics();
    }

    pub fn speed(&self) -> f64 {
        self.forward.speed()
    }

    /// Playhead as a fraction of the forward timeline
    ///
    /// 0.0 when nothing is loaded.
    pub fn position_relative(&self) -> f64 {
        let length = self.length_in_seconds();
        if length <= 0.0 {
            return 0.0;
        }
        let relative = match self.direction {
            Direction::Forward => self.forward.transport().current_position() / length,
            Direction::Reverse => 1.0 - self.reverse.transport().current_position() / length,
        };
        if relative.is_nan() {
            0.0
        } else {
            relative.clamp(0.0, 1.0)
        }
    }

    /// Seconds read on the active transport
    ///
    /// In reverse this counts from the end of the track.
    pub fn current_position(&self) -> f64 {
        match self.direction {
            Direction::Forward => self.forward.transport().current_position(),
            Direction::Reverse => self.reverse.transport().current_position(),
        }
    }

    /// Position shown to the user by the UI timer
    pub fn display_position(&self) -> f64 {
        match self.direction {
            Direction::Forward => self.forward.transport().current_position(),
            Direction::Reverse => self
                .reverse
                .transport()
                .source()
                .map_or(0.0, MemorySource::current_position),
        }
    }

    pub fn length_in_seconds(&self) -> f64 {
        self.forward.transport().length_in_seconds()
    }

    fn total_frames(&self) -> i64 {
        self.forward.transport().total_length()
    }

    pub fn is_playing(&self) -> bool {
        match self.direction {
            Direction::Forward => self.forward.transport().is_playing(),
            Direction::Reverse => self.reverse.transport().is_playing(),
        }
    }

    pub fn is_reversed(&self) -> bool {
        self.direction.is_reverse()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// True once the active transport has played to its end
    pub fn is_track_finished(&self) -> bool {
        match self.direction {
            Direction::Forward => self.forward.transport().has_stream_finished(),
            Direction::Reverse => self.reverse.transport().has_stream_finished(),
        }
    }

    /// Device sample rate the deck renders at
    pub fn sample_rate(&self) -> u32 {
        self.output_rate
    }

    /// Render the next block from the active direction
    ///
    /// Real-time safe. Outputs silence when nothing is loaded.
    pub fn get_next_audio_block(&mut self, block: &mut AudioBuffer) {
        if !self.is_loaded() {
            block.fill_silence();
        } else {
            match self.direction {
                Direction::Forward => self.forward.get_next_audio_block(block),
                Direction::Reverse => self.reverse.get_next_audio_block(block),
            }
        }
        self.publish_atomics();
    }

    /// Write the current state to the atomics
    pub fn publish_atomics(&self) {
        let a = &self.atomics;
        a.loaded.store(self.is_loaded(), Ordering::Relaxed);
        a.playing.store(self.is_playing(), Ordering::Relaxed);
        a.reversed.store(self.is_reversed(), Ordering::Relaxed);
        a.finished.store(self.is_track_finished(), Ordering::Relaxed);
        a.position_relative
            .store(self.position_relative().to_bits(), Ordering::Relaxed);
        a.length_seconds
            .store(self.length_in_seconds().to_bits(), Ordering::Relaxed);
        a.display_position
            .store(self.display_position().to_bits(), Ordering::Relaxed);
        a.speed.store(self.speed().to_bits(), Ordering::Relaxed);
        a.gain.store((self.gain() as f64).to_bits(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 44100;
    const BLOCK: usize = 441;

    /// 2-channel track where each frame holds its own index
    fn indexed_track(seconds: usize) -> PreparedTrack {
        let frames = seconds * RATE as usize;
        let left: Vec<f32> = (0..frames).map(|i| i as f32).collect();
        let right = left.iter().map(|s| -s).collect();
        PreparedTrack::from_buffer(
            Path::new("indexed.wav"),
            AudioBuffer::from_channels(vec![left, right]),
            RATE,
        )
    }

    fn loaded_deck(seconds: usize) -> Deck {
        let mut deck = Deck::with_format(DeckId::new(0), 2, RATE);
        deck.load_prepared(indexed_track(seconds));
        deck
    }

    fn pull_seconds(deck: &mut Deck, seconds: f64) -> AudioBuffer {
        let mut block = AudioBuffer::silence(2, BLOCK);
        let blocks = (seconds * RATE as f64 / BLOCK as f64).round() as usize;
        for _ in 0..blocks {
            deck.get_next_audio_block(&mut block);
        }
        block
    }

    #[test]
    fn test_empty_deck_reports_zero_and_is_silent() {
        let mut deck = Deck::with_format(DeckId::new(1), 2, RATE);
        let mut block = AudioBuffer::from_channels(vec![vec![1.0; 64], vec![1.0; 64]]);

        deck.start();
        deck.get_next_audio_block(&mut block);

        assert_eq!(block.peak(), 0.0);
        assert_eq!(deck.position_relative(), 0.0);
        assert_eq!(deck.length_in_seconds(), 0.0);
        assert!(!deck.is_playing());
        assert!(!deck.atomics().is_loaded());
    }

    #[test]
    fn test_empty_deck_ignores_transport_calls() {
        let mut deck = Deck::with_format(DeckId::new(0), 2, RATE);

        deck.start_reverse();
        deck.set_position(3.0);
        deck.set_position_relative(0.5);
        assert!(!deck.is_reversed());
        assert!(!deck.atomics().is_reversed());
        assert_eq!(deck.direction(), Direction::Forward);

        deck.start_forward();
        assert!(!deck.is_playing());
        assert_eq!(deck.position_relative(), 0.0);
    }

    #[test]
    fn test_reverse_seek_clamps_out_of_range_times() {
        let mut deck = loaded_deck(1);
        deck.start_reverse();

        deck.set_position(-1e300);
        assert!(deck.position_relative() < 0.001);

        deck.set_position(1e300);
        assert!((deck.position_relative() - 1.0).abs() < 0.001);

        deck.set_position(f64::NAN);
        assert!(deck.position_relative() < 0.001);

        deck.set_position(f64::NEG_INFINITY);
        assert!(deck.position_relative() < 0.001);
        assert!(deck.is_reversed());
    }

    #[test]
    fn test_forward_seek_clamps_out_of_range_times() {
        let mut deck = loaded_deck(1);

        deck.set_position(-1e300);
        assert_eq!(deck.position_relative(), 0.0);

        deck.set_position(1e300);
        assert_eq!(deck.position_relative(), 1.0);
    }

    #[test]
    fn test_load_starts_forward() {
        let deck = loaded_deck(1);

        assert!(deck.is_playing());
        assert!(!deck.is_reversed());
        assert!((deck.length_in_seconds() - 1.0).abs() < 1e-9);
        assert_eq!(deck.path(), Some(Path::new("indexed.wav")));
    }

    #[test]
    fn test_forward_then_reverse_scenario() {
        let mut deck = loaded_deck(10);

        pull_seconds(&mut deck, 5.0);
        assert!((deck.position_relative() - 0.5).abs() < 0.01);

        deck.start_reverse();
        assert!(deck.is_reversed());
        assert!((deck.position_relative() - 0.5).abs() < 0.01);

        pull_seconds(&mut deck, 5.0);
        assert!(deck.position_relative() < 0.01);
        assert!(deck.is_track_finished());
        assert!(!deck.is_playing());
        assert!(deck.atomics().is_finished());
    }

    #[test]
    fn test_reverse_output_runs_backwards() {
        let mut deck = loaded_deck(2);
        pull_seconds(&mut deck, 1.0);
        deck.start_reverse();

        let block = pull_seconds(&mut deck, 0.1);
        let left = block.channel(0);
        assert!(left.windows(2).all(|w| w[1] < w[0]));
        // Right channel mirrors the left with inverted sign
        assert_eq!(block.channel(1)[10], -left[10]);
    }

    #[test]
    fn test_direction_round_trip_preserves_position() {
        let mut deck = loaded_deck(4);
        pull_seconds(&mut deck, 1.3);
        let before = deck.position_relative();

        deck.start_reverse();
        deck.start_forward();

        let tolerance = BLOCK as f64 / (4.0 * RATE as f64);
        assert!((deck.position_relative() - before).abs() <= tolerance);
        assert!(!deck.is_reversed());
        assert!(deck.is_playing());
    }

    #[test]
    fn test_relative_position_monotonic_both_directions() {
        let mut deck = loaded_deck(3);
        let mut block = AudioBuffer::silence(2, BLOCK);

        let mut last = deck.position_relative();
        for _ in 0..50 {
            deck.get_next_audio_block(&mut block);
            let now = deck.position_relative();
            assert!(now >= last);
            last = now;
        }

        deck.start_reverse();
        let mut last = deck.position_relative();
        for _ in 0..50 {
            deck.get_next_audio_block(&mut block);
            let now = deck.position_relative();
            assert!(now <= last);
            last = now;
        }
    }

    #[test]
    fn test_set_position_relative_clamps() {
        let mut deck = loaded_deck(2);

        deck.set_position_relative(1.5);
        assert!((deck.position_relative() - 1.0).abs() < 1e-9);

        deck.set_position_relative(-0.5);
        assert_eq!(deck.position_relative(), 0.0);

        deck.start_reverse();
        deck.set_position_relative(0.25);
        assert!((deck.position_relative() - 0.25).abs() < 1e-6);
        // Reverse cursor clamps one frame short of the end
        deck.set_position_relative(f64::NAN);
        assert!(deck.position_relative() < 1e-4);
    }

    #[test]
    fn test_set_position_in_reverse_uses_forward_timeline() {
        let mut deck = loaded_deck(4);
        deck.start_reverse();

        deck.set_position(1.0);
        // The frame at 1.0s is the next one heard
        let mut block = AudioBuffer::silence(2, 4);
        deck.get_next_audio_block(&mut block);
        assert_eq!(block.sample(0, 1), RATE as f32);
        assert!((deck.position_relative() - 0.25).abs() < 0.001);
    }

    #[test]
    fn test_stop_only_pauses_active_direction() {
        let mut deck = loaded_deck(2);
        deck.start_reverse();
        deck.stop();
        assert!(!deck.is_playing());

        let before = deck.position_relative();
        pull_seconds(&mut deck, 0.5);
        assert_eq!(deck.position_relative(), before);

        // Starting the already-active direction just resumes
        deck.start_reverse();
        assert!(deck.is_playing());
        assert!(deck.is_reversed());
        assert_eq!(deck.position_relative(), before);
    }

    #[test]
    fn test_gain_and_speed_apply_to_both_directions() {
        let mut deck = loaded_deck(2);
        deck.set_gain(-1.0);
        assert_eq!(deck.gain(), 0.0);
        deck.set_gain(0.8);
        deck.set_speed(10.0);

        deck.start_reverse();
        assert_eq!(deck.gain(), 0.8);
        assert_eq!(deck.speed(), 4.0);
        assert_eq!(deck.atomics().speed(), 4.0);
    }

    #[test]
    fn test_unload_resets_deck() {
        let mut deck = loaded_deck(1);
        deck.start_reverse();
        deck.unload();

        assert!(!deck.is_loaded());
        assert!(!deck.is_reversed());
        assert_eq!(deck.length_in_seconds(), 0.0);
        assert_eq!(deck.display_position(), 0.0);
    }

    #[test]
    fn test_failed_load_keeps_current_track() {
        let mut deck = loaded_deck(1);
        assert!(!deck.load_track(Path::new("/nonexistent/missing.wav")));
        assert!(deck.is_loaded());
        assert!(deck.is_playing());
    }
}
