//! Main audio engine - ties together the decks, the mixing bus and recording

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::recorder::RecordingTap;
use crate::types::{AudioBuffer, DeckId, DEFAULT_SAMPLE_RATE, NUM_DECKS, OUTPUT_CHANNELS};

use super::command::EngineCommand;
use super::{Deck, DeckAtomics, Mixer};

/// Maximum buffer size to pre-allocate for real-time safety
///
/// Covers every common device period (64 to 4096 frames). Blocks larger than
/// this are still handled, at the cost of an allocation on the first one.
pub const MAX_BUFFER_SIZE: usize = 8192;

/// The main audio engine
///
/// Owns both decks. Everything here runs on the audio thread; other threads
/// talk to it through [`EngineCommand`]s and read state through
/// [`DeckAtomics`].
pub struct AudioEngine {
    decks: [Deck; NUM_DECKS],
    mixer: Mixer,
    /// Master output tap for set recording
    recorder: Option<RecordingTap>,
    sample_rate: u32,
}

impl AudioEngine {
    /// Create an engine at the default sample rate
    pub fn new() -> Self {
        Self::new_with_sample_rate(DEFAULT_SAMPLE_RATE)
    }

    /// Create an engine for a device running at `sample_rate`
    pub fn new_with_sample_rate(sample_rate: u32) -> Self {
        Self {
            decks: std::array::from_fn(|i| {
                Deck::with_format(DeckId::new(i), OUTPUT_CHANNELS, sample_rate)
            }),
            mixer: Mixer::new(OUTPUT_CHANNELS),
            recorder: None,
            sample_rate,
        }
    }

    /// Device sample rate the decks render at
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Change the output rate (device restart)
    pub fn prepare_to_play(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        for deck in &mut self.decks {
            deck.prepare_to_play(sample_rate);
        }
    }

    pub fn deck(&self, id: usize) -> Option<&Deck> {
        self.decks.get(id)
    }

    pub fn deck_mut(&mut self, id: usize) -> Option<&mut Deck> {
        self.decks.get_mut(id)
    }

    /// Lock-free state for all decks
    ///
    /// Call once during initialization and keep the Arcs; they outlive the
    /// engine once it moves into the audio callback.
    pub fn deck_atomics(&self) -> [Arc<DeckAtomics>; NUM_DECKS] {
        std::array::from_fn(|i| self.decks[i].atomics())
    }

    /// Master clip indicator
    pub fn clip_indicator(&self) -> Arc<AtomicBool> {
        self.mixer.clip_indicator()
    }

    /// Whether a recording tap is attached
    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    /// Apply every pending command
    ///
    /// Called at the start of each audio callback. Never blocks.
    pub fn process_commands(&mut self, rx: &mut rtrb::Consumer<EngineCommand>) {
        while let Ok(cmd) = rx.pop() {
            self.apply_command(cmd);
        }
    }

    /// Apply one command
    pub fn apply_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::AttachRecorder(tap) => {
                self.recorder = Some(*tap);
                return;
            }
            EngineCommand::DetachRecorder => {
                self.recorder = None;
                return;
            }
            _ => {}
        }

        let Some(deck_idx) = cmd.deck() else {
            return;
        };
        let Some(deck) = self.decks.get_mut(deck_idx) else {
            return;
        };

        match cmd {
            EngineCommand::LoadTrack { track, .. } => deck.load_prepared(*track),
            EngineCommand::UnloadTrack { .. } => deck.unload(),
            EngineCommand::Start { .. } => deck.start(),
            EngineCommand::StartForward { .. } => deck.start_forward(),
            EngineCommand::StartReverse { .. } => deck.start_reverse(),
            EngineCommand::Stop { .. } => deck.stop(),
            EngineCommand::SetGain { gain, .. } => deck.set_gain(gain),
            EngineCommand::SetSpeed { ratio, .. } => deck.set_speed(ratio),
            EngineCommand::SetPosition { seconds, .. } => deck.set_position(seconds),
            EngineCommand::SetPositionRelative { position, .. } => {
                deck.set_position_relative(position)
            }
            EngineCommand::AttachRecorder(_) | EngineCommand::DetachRecorder => {}
        }
    }

    /// Render one block of master output
    ///
    /// `master_out` must be sized to the callback's frame count.
    pub fn process(&mut self, master_out: &mut AudioBuffer) {
        self.mixer.process(&mut self.decks, master_out);

        if let Some(tap) = self.recorder.as_mut() {
            tap.push_block(master_out);
        }
    }
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{command_channel, PreparedTrack};
    use crate::recorder::Recorder;
    use std::path::Path;

    fn ramp_track(frames: usize) -> Box<PreparedTrack> {
        let ramp: Vec<f32> = (0..frames).map(|i| i as f32 / frames as f32).collect();
        let buffer = AudioBuffer::from_channels(vec![ramp.clone(), ramp]);
        Box::new(PreparedTrack::from_buffer(Path::new("ramp.wav"), buffer, 44100))
    }

    #[test]
    fn test_process_empty_engine() {
        let mut engine = AudioEngine::new();
        let mut master = AudioBuffer::silence(OUTPUT_CHANNELS, 256);

        engine.process(&mut master);

        assert_eq!(master.len(), 256);
        assert_eq!(master.peak(), 0.0);
    }

    #[test]
    fn test_commands_drive_decks() {
        let mut engine = AudioEngine::new_with_sample_rate(44100);
        let atomics = engine.deck_atomics();
        let (mut tx, mut rx) = command_channel();

        tx.push(EngineCommand::LoadTrack {
            deck: 1,
            track: ramp_track(44100),
        })
        .ok()
        .unwrap();
        tx.push(EngineCommand::SetGain { deck: 1, gain: 0.5 }).ok().unwrap();
        tx.push(EngineCommand::Start { deck: 1 }).ok().unwrap();
        engine.process_commands(&mut rx);

        assert!(atomics[1].is_loaded());
        assert!(atomics[1].is_playing());
        assert!(!atomics[0].is_loaded());
        assert_eq!(atomics[1].gain(), 0.5);

        let mut master = AudioBuffer::silence(OUTPUT_CHANNELS, 512);
        engine.process(&mut master);
        assert!(atomics[1].position_relative() > 0.0);

        tx.push(EngineCommand::StartReverse { deck: 1 }).ok().unwrap();
        engine.process_commands(&mut rx);
        assert!(atomics[1].is_reversed());

        tx.push(EngineCommand::Stop { deck: 1 }).ok().unwrap();
        engine.process_commands(&mut rx);
        assert!(!atomics[1].is_playing());
    }

    #[test]
    fn test_invalid_deck_is_ignored() {
        let mut engine = AudioEngine::new();
        engine.apply_command(EngineCommand::Start { deck: 7 });
        engine.apply_command(EngineCommand::SetGain { deck: 9, gain: 2.0 });

        assert!(engine.deck(0).is_some_and(|d| !d.is_playing()));
        assert!(engine.deck(7).is_none());
    }

    #[test]
    fn test_recorder_tap_receives_master() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("set.wav");
        let (recorder, tap) = Recorder::start(&path, 44100, OUTPUT_CHANNELS as u16).unwrap();

        let mut engine = AudioEngine::new_with_sample_rate(44100);
        engine.apply_command(EngineCommand::LoadTrack {
            deck: 0,
            track: ramp_track(44100),
        });
        engine.apply_command(EngineCommand::Start { deck: 0 });
        engine.apply_command(EngineCommand::AttachRecorder(Box::new(tap)));
        assert!(engine.is_recording());

        let mut master = AudioBuffer::silence(OUTPUT_CHANNELS, 441);
        for _ in 0..10 {
            engine.process(&mut master);
        }
        engine.apply_command(EngineCommand::DetachRecorder);
        assert!(!engine.is_recording());

        let summary = recorder.stop().unwrap();
        assert_eq!(summary.frames_written, 4410);
        assert_eq!(hound::WavReader::open(&path).unwrap().duration(), 4410);
    }
}
