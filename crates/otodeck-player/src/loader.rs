//! Background track loader
//!
//! Decoding and building the reversed mirror takes long enough to be felt,
//! so it runs on its own thread. The control loop receives a ready
//! `PreparedTrack` and only has to queue it for the audio thread.

use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel::{self, Receiver, Sender};
use otodeck_core::audio_file::AudioFileError;
use otodeck_core::engine::PreparedTrack;

/// Request to load a track in the background
#[derive(Debug)]
pub struct TrackLoadRequest {
    pub deck_idx: usize,
    pub path: PathBuf,
}

/// Result of a background track load
pub struct TrackLoadResult {
    pub deck_idx: usize,
    pub path: PathBuf,
    pub result: Result<PreparedTrack, AudioFileError>,
}

/// Handle to the background loader thread
pub struct TrackLoader {
    tx: Sender<TrackLoadRequest>,
    rx: Receiver<TrackLoadResult>,
    _handle: JoinHandle<()>,
}

impl TrackLoader {
    /// Spawn the background loader thread
    pub fn spawn() -> std::io::Result<Self> {
        let (request_tx, request_rx) = channel::unbounded::<TrackLoadRequest>();
        let (result_tx, result_rx) = channel::unbounded::<TrackLoadResult>();

        let handle = thread::Builder::new()
            .name("track-loader".to_string())
            .spawn(move || loader_thread(request_rx, result_tx))?;

        Ok(Self {
            tx: request_tx,
            rx: result_rx,
            _handle: handle,
        })
    }

    /// Request loading a track (non-blocking)
    pub fn load(&self, deck_idx: usize, path: PathBuf) -> anyhow::Result<()> {
        self.tx
            .send(TrackLoadRequest { deck_idx, path })
            .map_err(|e| anyhow::anyhow!("Loader thread disconnected: {}", e))
    }

    /// Completed loads, for use in `select!`
    pub fn results(&self) -> &Receiver<TrackLoadResult> {
        &self.rx
    }
}

fn loader_thread(rx: Receiver<TrackLoadRequest>, tx: Sender<TrackLoadResult>) {
    log::info!("Track loader thread started");

    while let Ok(request) = rx.recv() {
        let start = Instant::now();
        let result = PreparedTrack::load(&request.path);
        if let Ok(track) = &result {
            log::debug!(
                "Prepared {} ({} frames @ {}Hz) in {:?}",
                track.filename(),
                track.len(),
                track.sample_rate,
                start.elapsed()
            );
        }

        let sent = tx.send(TrackLoadResult {
            deck_idx: request.deck_idx,
            path: request.path,
            result,
        });
        if sent.is_err() {
            break;
        }
    }

    log::info!("Track loader thread shutting down");
}
