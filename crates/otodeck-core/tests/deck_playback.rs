//! Decode a real WAV file and drive a deck through a forward/reverse pass

use std::path::Path;

use otodeck_core::engine::{AudioEngine, Deck, EngineCommand, PreparedTrack};
use otodeck_core::types::{AudioBuffer, DeckId};

const RATE: u32 = 44100;
const BLOCK: usize = 441;

/// Write a stereo 16-bit WAV: left ramps up, right holds a constant
fn write_fixture(path: &Path, seconds: usize) {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = seconds * RATE as usize;
    for i in 0..frames {
        let ramp = (i as f64 / frames as f64 * 30000.0) as i16;
        writer.write_sample(ramp).unwrap();
        writer.write_sample(8000i16).unwrap();
    }
    writer.finalize().unwrap();
}

fn pull_seconds(deck: &mut Deck, seconds: f64) {
    let mut block = AudioBuffer::silence(2, BLOCK);
    let blocks = (seconds * RATE as f64 / BLOCK as f64).round() as usize;
    for _ in 0..blocks {
        deck.get_next_audio_block(&mut block);
    }
}

#[test]
fn test_decoded_track_is_mirrored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ramp.wav");
    write_fixture(&path, 1);

    let track = PreparedTrack::load(&path).unwrap();

    assert_eq!(track.sample_rate, RATE);
    assert_eq!(track.len(), RATE as usize);
    assert_eq!(track.forward.num_channels(), 2);

    let n = track.len();
    for c in 0..2 {
        for i in [0, 1, n / 2, n - 1] {
            assert_eq!(track.reversed.sample(c, i), track.forward.sample(c, n - 1 - i));
        }
    }
}

#[test]
fn test_ten_second_forward_then_reverse() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ten.wav");
    write_fixture(&path, 10);

    let mut deck = Deck::with_format(DeckId::new(0), 2, RATE);
    assert!(deck.load_track(&path));
    assert!((deck.length_in_seconds() - 10.0).abs() < 1e-6);

    deck.start_forward();
    pull_seconds(&mut deck, 5.0);
    assert!((deck.position_relative() - 0.5).abs() < 0.01);

    deck.start_reverse();
    assert!((deck.position_relative() - 0.5).abs() < 0.01);

    pull_seconds(&mut deck, 5.0);
    assert!(deck.position_relative() < 0.01);
    assert!(deck.is_track_finished());
}

#[test]
fn test_bad_file_keeps_decoded_track() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.wav");
    let bad = dir.path().join("bad.wav");
    write_fixture(&good, 2);
    std::fs::write(&bad, b"not really a wav file").unwrap();

    let mut deck = Deck::with_format(DeckId::new(1), 2, RATE);
    assert!(deck.load_track(&good));
    pull_seconds(&mut deck, 0.5);
    let position = deck.position_relative();

    assert!(!deck.load_track(&bad));
    assert_eq!(deck.path(), Some(good.as_path()));
    assert!(deck.is_playing());
    assert_eq!(deck.position_relative(), position);
}

#[test]
fn test_engine_mixes_decoded_decks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mix.wav");
    write_fixture(&path, 1);

    let mut engine = AudioEngine::new_with_sample_rate(RATE);
    for deck in 0..2 {
        let track = PreparedTrack::load(&path).unwrap();
        engine.apply_command(EngineCommand::LoadTrack {
            deck,
            track: Box::new(track),
        });
    }
    engine.apply_command(EngineCommand::SetGain { deck: 1, gain: 0.5 });

    let mut master = AudioBuffer::silence(2, BLOCK);
    engine.process(&mut master);
    engine.process(&mut master);

    // Right channel is a constant 8000/32768 on both decks: 1.0 + 0.5 of it
    let expected = 1.5 * 8000.0 / 32768.0;
    let right = master.channel(1);
    assert!((right[BLOCK / 2] - expected).abs() < 1e-3);
}
