//! Offline deck renderer
//!
//! Plays a track forward, flips it to reverse at the same spot, and writes
//! what a listener would have heard to a WAV file. Handy for checking the
//! turnaround by ear without an audio device.
//!
//! Usage: render-deck <input> <output.wav> [forward_secs] [reverse_secs] [speed]

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use otodeck_core::engine::{Deck, PreparedTrack};
use otodeck_core::types::{AudioBuffer, DeckId, OUTPUT_CHANNELS};

/// Frames rendered per pull, matching a typical device period
const BLOCK_FRAMES: usize = 512;

struct Args {
    input: PathBuf,
    output: PathBuf,
    forward_secs: f64,
    reverse_secs: f64,
    speed: f64,
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        bail!("usage: render-deck <input> <output.wav> [forward_secs] [reverse_secs] [speed]");
    }

    let number = |idx: usize, default: f64, name: &str| -> Result<f64> {
        match args.get(idx) {
            Some(s) => s
                .parse::<f64>()
                .with_context(|| format!("Invalid {}: {:?}", name, s)),
            None => Ok(default),
        }
    };

    Ok(Args {
        input: PathBuf::from(&args[0]),
        output: PathBuf::from(&args[1]),
        forward_secs: number(2, 5.0, "forward_secs")?,
        reverse_secs: number(3, 5.0, "reverse_secs")?,
        speed: number(4, 1.0, "speed")?,
    })
}

/// Pull blocks for `seconds` of output, stopping early once the deck finishes
fn render(
    deck: &mut Deck,
    writer: &mut hound::WavWriter<std::io::BufWriter<std::fs::File>>,
    block: &mut AudioBuffer,
    seconds: f64,
) -> Result<u64> {
    let total = (seconds.max(0.0) * deck.sample_rate() as f64) as u64;
    let mut rendered = 0u64;

    while rendered < total && !deck.is_track_finished() {
        let frames = ((total - rendered) as usize).min(BLOCK_FRAMES);
        block.set_len_from_capacity(frames);
        deck.get_next_audio_block(block);

        for i in 0..frames {
            for channel in block.channels() {
                writer.write_sample(channel[i])?;
            }
        }
        rendered += frames as u64;
    }
    Ok(rendered)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;

    let track = PreparedTrack::load(&args.input)
        .with_context(|| format!("Failed to load {:?}", args.input))?;
    let sample_rate = track.sample_rate;
    log::info!(
        "Loaded {} ({:.1}s @ {}Hz)",
        track.filename(),
        track.duration_seconds(),
        sample_rate
    );

    let mut deck = Deck::with_format(DeckId::new(0), OUTPUT_CHANNELS, sample_rate);
    deck.load_prepared(track);
    deck.set_speed(args.speed);

    let spec = hound::WavSpec {
        channels: OUTPUT_CHANNELS as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&args.output, spec)
        .with_context(|| format!("Failed to create {:?}", args.output))?;
    let mut block = AudioBuffer::with_capacity(OUTPUT_CHANNELS, BLOCK_FRAMES);

    deck.start_forward();
    let forward = render(&mut deck, &mut writer, &mut block, args.forward_secs)?;
    log::info!(
        "Forward: {} frames, turnaround at {:.3}",
        forward,
        deck.position_relative()
    );

    deck.start_reverse();
    let reverse = render(&mut deck, &mut writer, &mut block, args.reverse_secs)?;
    log::info!(
        "Reverse: {} frames, ended at {:.3}{}",
        reverse,
        deck.position_relative(),
        if deck.is_track_finished() { " (reached start)" } else { "" }
    );

    writer.finalize().context("Failed to finalize output")?;
    println!(
        "Wrote {:?}: {:.2}s",
        args.output,
        (forward + reverse) as f64 / sample_rate as f64
    );
    Ok(())
}
