//! OtoDeck Player - two decks that play forward and in reverse
//!
//! Terminal front-end. It:
//! 1. Starts the cpal output stream (the audio thread owns the engine)
//! 2. Reads control commands from stdin
//! 3. Polls the deck atomics on a timer for end-of-track and clip reports
//! 4. Runs track loading and BPM/key analysis on background threads
//!
//! ## Command line
//!
//! `otodeck-player [--config <path>] [track...]`
//!
//! The first two tracks are loaded onto decks 1 and 2; all of them are added
//! to the track list and analyzed if `analysis.analyze_on_startup` is set.

mod commands;
mod library;
mod loader;

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;

use otodeck_core::analysis::{AnalysisCommand, AnalysisEvent, AnalysisService, ServiceHandle};
use otodeck_core::audio::{get_output_devices, start_audio_system, AudioSystemResult};
use otodeck_core::config::{default_config_path, load_config, save_config, OtoDeckConfig};
use otodeck_core::engine::EngineCommand;
use otodeck_core::recorder::{default_recording_path, Recorder};
use otodeck_core::types::{DeckId, NUM_DECKS, OUTPUT_CHANNELS};

use commands::{parse_command, ControlCommand, HELP};
use library::Library;
use loader::{TrackLoadResult, TrackLoader};

/// How often the UI timer polls deck state
const UI_TIMER_INTERVAL: Duration = Duration::from_millis(100);

/// Shortest wait for the audio thread to drop a detached recording tap
const MIN_DETACH_WAIT: Duration = Duration::from_millis(20);

struct CliArgs {
    config_path: PathBuf,
    tracks: Vec<PathBuf>,
}

fn parse_args() -> Result<CliArgs> {
    let mut config_path = default_config_path();
    let mut tracks = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let Some(path) = args.next() else {
                    bail!("--config needs a path");
                };
                config_path = PathBuf::from(path);
            }
            "-h" | "--help" => {
                println!("usage: otodeck-player [--config <path>] [track...]\n\n{}", HELP);
                std::process::exit(0);
            }
            _ => tracks.push(PathBuf::from(arg)),
        }
    }

    Ok(CliArgs {
        config_path,
        tracks,
    })
}

/// Format seconds as `m:ss.s`
fn format_time(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let minutes = (seconds / 60.0).floor();
    format!("{}:{:04.1}", minutes as u64, seconds - minutes * 60.0)
}

/// Control-thread state
struct Player {
    config: OtoDeckConfig,
    audio: AudioSystemResult,
    loader: TrackLoader,
    analysis: Option<ServiceHandle<AnalysisCommand>>,
    /// Keeps the event channel open even without an analysis service
    _analysis_tx: Sender<AnalysisEvent>,
    analysis_rx: Receiver<AnalysisEvent>,
    library: Library,
    recorder: Option<Recorder>,
    deck_tracks: [Option<PathBuf>; NUM_DECKS],
    /// End-of-track state seen by the last timer tick
    finished: [bool; NUM_DECKS],
}

impl Player {
    fn new(config: OtoDeckConfig) -> Result<Self> {
        let audio = start_audio_system(&config.audio).context("Failed to start audio output")?;
        println!(
            "Audio: {} @ {}Hz, {} frames (~{:.1}ms)",
            audio.handle.device_name(),
            audio.sample_rate,
            audio.buffer_size,
            audio.latency_ms
        );

        let loader = TrackLoader::spawn().context("Failed to spawn track loader")?;

        let (analysis_tx, analysis_rx) = channel::unbounded();
        let analysis = match AnalysisService::spawn(config.analysis.clone(), analysis_tx.clone()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("BPM analysis unavailable: {}", e);
                None
            }
        };

        Ok(Self {
            config,
            audio,
            loader,
            analysis,
            _analysis_tx: analysis_tx,
            analysis_rx,
            library: Library::new(),
            recorder: None,
            deck_tracks: Default::default(),
            finished: [false; NUM_DECKS],
        })
    }

    /// Queue a command for the audio thread
    fn send(&mut self, cmd: EngineCommand) {
        if self.audio.command_sender.send(cmd).is_err() {
            log::warn!("Engine command queue full, command dropped");
        }
    }

    fn request_load(&mut self, deck: usize, path: PathBuf) -> Result<()> {
        self.library.add(&path);
        println!("{}: loading {}", DeckId::new(deck), path.display());
        self.loader.load(deck, path)
    }

    fn request_analysis(&self, paths: Vec<PathBuf>) {
        match &self.analysis {
            Some(service) => {
                if service.send(AnalysisCommand::Analyze { paths }).is_err() {
                    log::warn!("Analysis service stopped");
                }
            }
            None => log::warn!("BPM analysis unavailable"),
        }
    }

    /// Returns false when the player should exit
    fn handle_command(&mut self, command: ControlCommand) -> Result<bool> {
        match command {
            ControlCommand::Load { deck, path } => self.request_load(deck, path)?,
            ControlCommand::Play { deck } => self.send(EngineCommand::Start { deck }),
            ControlCommand::Forward { deck } => {
                log::info!("{}: forward", DeckId::new(deck));
                self.send(EngineCommand::StartForward { deck })
            }
            ControlCommand::Reverse { deck } => {
                log::info!("{}: reverse", DeckId::new(deck));
                self.send(EngineCommand::StartReverse { deck })
            }
            ControlCommand::Stop { deck } => self.send(EngineCommand::Stop { deck }),
            ControlCommand::Gain { deck, gain } => self.send(EngineCommand::SetGain { deck, gain }),
            ControlCommand::Speed { deck, ratio } => {
                self.send(EngineCommand::SetSpeed { deck, ratio })
            }
            ControlCommand::Seek { deck, seconds } => {
                self.send(EngineCommand::SetPosition { deck, seconds })
            }
            ControlCommand::Position { deck, position } => {
                self.send(EngineCommand::SetPositionRelative { deck, position })
            }
            ControlCommand::RecordStart { path } => self.start_recording(path)?,
            ControlCommand::RecordStop => self.stop_recording()?,
            ControlCommand::Analyze { paths } => {
                for path in &paths {
                    self.library.add(path);
                }
                self.request_analysis(paths);
            }
            ControlCommand::Tracks => self.print_tracks(),
            ControlCommand::Suggest { track } => {
                let Some(current) = self.library.get(track) else {
                    bail!("No track #{}", track + 1);
                };
                let current_title = current.title();
                match self.library.suggest_next(track).and_then(|i| self.library.get(i).map(|t| (i, t))) {
                    Some((index, next)) => println!(
                        "After {}: #{} {}{}",
                        current_title,
                        index + 1,
                        next.title(),
                        next.analysis
                            .as_ref()
                            .map(|a| format!(" ({:.1} BPM, {})", a.bpm, a.key))
                            .unwrap_or_default()
                    ),
                    None => println!("No suggestion for {} (needs analyzed tracks)", current_title),
                }
            }
            ControlCommand::Devices => match get_output_devices() {
                Ok(devices) => {
                    for device in devices {
                        println!("  {}", device);
                    }
                }
                Err(e) => println!("{}", e),
            },
            ControlCommand::Status => self.print_status(),
            ControlCommand::Help => println!("{}", HELP),
            ControlCommand::Quit => return Ok(false),
        }
        Ok(true)
    }

    fn on_track_loaded(&mut self, loaded: TrackLoadResult) {
        let deck_id = DeckId::new(loaded.deck_idx);
        match loaded.result {
            Ok(track) => {
                println!(
                    "{}: {} ({})",
                    deck_id,
                    track.filename(),
                    format_time(track.duration_seconds())
                );
                self.deck_tracks[loaded.deck_idx] = Some(loaded.path);
                self.finished[loaded.deck_idx] = false;
                self.send(EngineCommand::LoadTrack {
                    deck: loaded.deck_idx,
                    track: Box::new(track),
                });
            }
            Err(e) => {
                // The deck keeps whatever it had
                log::warn!("{}: failed to load {:?}: {}", deck_id, loaded.path, e);
                println!("{}: could not load {}", deck_id, loaded.path.display());
            }
        }
    }

    fn on_analysis_event(&mut self, event: AnalysisEvent) {
        match event {
            AnalysisEvent::TrackAnalyzed { path, analysis } => {
                let bpm = analysis.bpm;
                let key = analysis.key.clone();
                let index = self.library.set_analysis(&path, analysis);
                println!("#{} {}: {:.1} BPM, key {}", index + 1, path.display(), bpm, key);
            }
            AnalysisEvent::BatchComplete { count } => {
                log::info!("Analysis finished for {} track(s)", count);
            }
        }
    }

    /// UI timer: report decks reaching their end and master clipping
    fn on_tick(&mut self) {
        for (idx, atomics) in self.audio.deck_atomics.iter().enumerate() {
            let finished = atomics.is_loaded() && atomics.is_finished();
            if finished && !self.finished[idx] {
                let edge = if atomics.is_reversed() { "start" } else { "end" };
                println!("{}: reached the {} of the track", DeckId::new(idx), edge);
            }
            self.finished[idx] = finished;
        }

        if self.audio.clip_indicator.swap(false, Ordering::Relaxed) {
            log::warn!("Master output clipping");
        }
    }

    fn start_recording(&mut self, path: Option<PathBuf>) -> Result<()> {
        if let Some(recorder) = &self.recorder {
            bail!("Already recording to {}", recorder.path().display());
        }

        let path = path.unwrap_or_else(|| default_recording_path(&self.config.recording.directory));
        let (recorder, tap) = Recorder::start(&path, self.audio.sample_rate, OUTPUT_CHANNELS as u16)
            .with_context(|| format!("Failed to start recording to {}", path.display()))?;

        if self
            .audio
            .command_sender
            .send(EngineCommand::AttachRecorder(Box::new(tap)))
            .is_err()
        {
            recorder.stop()?;
            bail!("Engine command queue full, recording not started");
        }

        println!("Recording to {}", path.display());
        self.recorder = Some(recorder);
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<()> {
        let Some(recorder) = self.recorder.take() else {
            bail!("Not recording");
        };

        self.send(EngineCommand::DetachRecorder);
        // Give the audio thread a couple of periods to drop the tap
        let wait = Duration::from_secs_f32(self.audio.latency_ms * 2.0 / 1000.0);
        thread::sleep(wait.max(MIN_DETACH_WAIT));

        let summary = recorder.stop()?;
        println!(
            "Saved {} ({}){}",
            summary.path.display(),
            format_time(summary.duration_seconds()),
            if summary.frames_dropped > 0 {
                format!(", {} frames dropped", summary.frames_dropped)
            } else {
                String::new()
            }
        );
        Ok(())
    }

    fn print_status(&self) {
        for (idx, atomics) in self.audio.deck_atomics.iter().enumerate() {
            let deck_id = DeckId::new(idx);
            if !atomics.is_loaded() {
                println!("{}: empty", deck_id);
                continue;
            }
            let title = self.deck_tracks[idx]
                .as_deref()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let position = atomics.position_relative();
            println!(
                "{}: {} {} {} / {} ({:.1}%) gain {:.2} speed {:.2}x  {}",
                deck_id,
                if atomics.is_playing() { "playing" } else { "stopped" },
                if atomics.is_reversed() { "rev" } else { "fwd" },
                format_time(position * atomics.length_seconds()),
                format_time(atomics.length_seconds()),
                position * 100.0,
                atomics.gain(),
                atomics.speed(),
                title
            );
        }
        if let Some(recorder) = &self.recorder {
            println!("Recording: {}", recorder.path().display());
        }
    }

    fn print_tracks(&self) {
        if self.library.tracks().is_empty() {
            println!("No tracks yet");
        }
        for (idx, track) in self.library.tracks().iter().enumerate() {
            let info = match &track.analysis {
                Some(a) if a.has_bpm() => format!("{:.1} BPM, {}", a.bpm, a.key),
                Some(a) => format!("BPM unknown, {}", a.key),
                None => "not analyzed".to_string(),
            };
            println!("  #{} {} ({})", idx + 1, track.title(), info);
        }
    }

    fn shutdown(mut self) {
        if self.recorder.is_some() {
            if let Err(e) = self.stop_recording() {
                log::warn!("Failed to finalize recording: {:#}", e);
            }
        }
        if let Some(service) = self.analysis.take() {
            service.shutdown();
        }
    }
}

/// Forward stdin lines to the control loop
fn spawn_stdin_reader() -> Result<Receiver<String>> {
    let (tx, rx) = channel::unbounded();
    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn stdin reader")?;
    Ok(rx)
}

fn main() -> Result<()> {
    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;

    // Reversing runs on rayon; start the pool before audio so its lazy init
    // never lands in the middle of a load
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .thread_name(|i| format!("rayon-loader-{}", i))
        .build_global()
    {
        log::warn!("Failed to initialize Rayon thread pool: {}", e);
    }

    let config: OtoDeckConfig = load_config(&args.config_path);
    if !args.config_path.exists() {
        if let Err(e) = save_config(&config, &args.config_path) {
            log::warn!("Could not write default config: {:#}", e);
        }
    }

    println!("OtoDeck Player (type 'help' for commands)");

    let mut player = Player::new(config)?;

    for (idx, path) in args.tracks.iter().enumerate() {
        if idx < NUM_DECKS {
            player.request_load(idx, path.clone())?;
        } else {
            player.library.add(path);
        }
    }
    if player.config.analysis.analyze_on_startup && !args.tracks.is_empty() {
        player.request_analysis(args.tracks.clone());
    }

    let lines = spawn_stdin_reader()?;
    let load_results = player.loader.results().clone();
    let analysis_events = player.analysis_rx.clone();
    let ticker = channel::tick(UI_TIMER_INTERVAL);

    loop {
        select! {
            recv(lines) -> line => {
                let Ok(line) = line else {
                    // stdin closed
                    break;
                };
                match parse_command(&line) {
                    Ok(Some(command)) => match player.handle_command(command) {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => println!("error: {:#}", e),
                    },
                    Ok(None) => {}
                    Err(e) => println!("error: {:#}", e),
                }
            }
            recv(load_results) -> loaded => {
                match loaded {
                    Ok(loaded) => player.on_track_loaded(loaded),
                    Err(_) => bail!("Track loader stopped"),
                }
            }
            recv(analysis_events) -> event => {
                if let Ok(event) = event {
                    player.on_analysis_event(event);
                }
            }
            recv(ticker) -> _ => player.on_tick(),
        }
    }

    player.shutdown();
    println!("OtoDeck Player stopped.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "0:00.0");
        assert_eq!(format_time(62.5), "1:02.5");
        assert_eq!(format_time(600.0), "10:00.0");
        assert_eq!(format_time(-3.0), "0:00.0");
    }
}
