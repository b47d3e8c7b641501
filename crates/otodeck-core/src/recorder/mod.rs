//! Set recording
//!
//! The mixed master block is copied into a lock-free ring by the audio thread
//! and written to a 16-bit WAV file by a dedicated writer thread:
//!
//! ```text
//! ┌──────────────────┐  push (interleaved)  ┌──────────────┐  pop   ┌──────────────┐
//! │   Audio Thread   │─────────────────────►│  rtrb ring   │───────►│ Writer Thread│──► .wav
//! │  (RecordingTap)  │   drop on overflow   │  (~2s audio) │        │   (hound)    │
//! └──────────────────┘                      └──────────────┘        └──────────────┘
//! ```
//!
//! The audio thread never blocks: when the ring is full the whole block is
//! dropped and counted. The file is finalized only by [`Recorder::stop`],
//! which runs on the control thread.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

use crate::types::AudioBuffer;

/// Seconds of audio the ring can hold before blocks are dropped
const RING_SECONDS: usize = 2;

/// How long the writer sleeps when the ring is empty
const WRITER_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Errors that can occur while recording
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Failed to create recording directory: {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create WAV file: {0}")]
    Create(#[source] hound::Error),

    #[error("Failed to write WAV data: {0}")]
    Write(#[source] hound::Error),

    #[error("Invalid recording format: {0}")]
    InvalidFormat(String),

    #[error("Recording writer thread panicked")]
    WriterPanicked,

    #[error("Failed to spawn writer thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Summary returned when a recording is finalized
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSummary {
    pub path: PathBuf,
    /// Frames written to disk
    pub frames_written: u64,
    /// Frames lost because the ring was full
    pub frames_dropped: u64,
    pub sample_rate: u32,
    pub channels: u16,
}

impl RecordingSummary {
    pub fn duration_seconds(&self) -> f64 {
        self.frames_written as f64 / self.sample_rate as f64
    }
}

/// Real-time side of a recording session
///
/// Owned by the audio engine. Pushing never blocks or allocates.
pub struct RecordingTap {
    producer: rtrb::Producer<f32>,
    channels: usize,
    frames_dropped: Arc<AtomicU64>,
}

impl RecordingTap {
    /// Append one block, interleaving its channels
    ///
    /// Drops the whole block if the ring can't take it.
    pub fn push_block(&mut self, block: &AudioBuffer) {
        let frames = block.len();
        let needed = frames * self.channels;
        if self.producer.slots() < needed {
            self.frames_dropped.fetch_add(frames as u64, Ordering::Relaxed);
            return;
        }

        let block_channels = block.num_channels();
        for i in 0..frames {
            for c in 0..self.channels {
                let sample = if c < block_channels {
                    block.sample(c, i)
                } else {
                    0.0
                };
                // Slots were checked above
                let _ = self.producer.push(sample);
            }
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}

/// Control side of a recording session
pub struct Recorder {
    path: PathBuf,
    stop_flag: Arc<AtomicBool>,
    frames_dropped: Arc<AtomicU64>,
    writer: Option<JoinHandle<Result<u64, RecorderError>>>,
    sample_rate: u32,
    channels: u16,
}

impl Recorder {
    /// Open a WAV file and start the writer thread
    ///
    /// Creates the parent directory if needed. Returns the recorder (kept on
    /// the control thread) and the tap (handed to the audio engine).
    pub fn start(
        path: &Path,
        sample_rate: u32,
        channels: u16,
    ) -> Result<(Recorder, RecordingTap), RecorderError> {
        if channels == 0 || sample_rate == 0 {
            return Err(RecorderError::InvalidFormat(format!(
                "{} channels @ {}Hz",
                channels, sample_rate
            )));
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| RecorderError::CreateDir {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec).map_err(RecorderError::Create)?;

        let capacity = sample_rate as usize * channels as usize * RING_SECONDS;
        let (producer, consumer) = rtrb::RingBuffer::new(capacity);

        let stop_flag = Arc::new(AtomicBool::new(false));
        let frames_dropped = Arc::new(AtomicU64::new(0));

        let thread_stop = Arc::clone(&stop_flag);
        let handle = thread::Builder::new()
            .name("recorder-writer".to_string())
            .spawn(move || run_writer(writer, consumer, thread_stop, channels))
            .map_err(RecorderError::Spawn)?;

        log::info!(
            "Recording started: {:?} ({} channels @ {}Hz)",
            path,
            channels,
            sample_rate
        );

        let recorder = Recorder {
            path: path.to_path_buf(),
            stop_flag,
            frames_dropped: Arc::clone(&frames_dropped),
            writer: Some(handle),
            sample_rate,
            channels,
        };
        let tap = RecordingTap {
            producer,
            channels: channels as usize,
            frames_dropped,
        };
        Ok((recorder, tap))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frames dropped so far because the ring was full
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    /// Drain what's left in the ring, finalize the file and join the writer
    ///
    /// Detach the tap from the engine first so no more blocks arrive.
    pub fn stop(mut self) -> Result<RecordingSummary, RecorderError> {
        self.stop_flag.store(true, Ordering::Release);
        let frames_written = match self.writer.take() {
            Some(handle) => handle.join().map_err(|_| RecorderError::WriterPanicked)??,
            None => 0,
        };

        let summary = RecordingSummary {
            path: self.path.clone(),
            frames_written,
            frames_dropped: self.frames_dropped(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        };

        log::info!(
            "Recording saved: {:?} ({:.1}s, {} frames dropped)",
            summary.path,
            summary.duration_seconds(),
            summary.frames_dropped
        );

        Ok(summary)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        // Finalize even if stop() was never called
        if let Some(handle) = self.writer.take() {
            self.stop_flag.store(true, Ordering::Release);
            match handle.join() {
                Ok(Err(e)) => log::warn!("Recording {:?} ended with error: {}", self.path, e),
                Err(_) => log::warn!("Recording writer for {:?} panicked", self.path),
                Ok(Ok(_)) => {}
            }
        }
    }
}

/// Convert a float sample to 16-bit PCM
#[inline]
fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

fn run_writer(
    mut writer: hound::WavWriter<BufWriter<File>>,
    mut consumer: rtrb::Consumer<f32>,
    stop_flag: Arc<AtomicBool>,
    channels: u16,
) -> Result<u64, RecorderError> {
    let mut samples_written: u64 = 0;

    loop {
        // Read the flag before draining so nothing pushed before stop() is lost
        let stopping = stop_flag.load(Ordering::Acquire) || consumer.is_abandoned();

        let mut drained = false;
        while let Ok(sample) = consumer.pop() {
            writer
                .write_sample(to_i16(sample))
                .map_err(RecorderError::Write)?;
            samples_written += 1;
            drained = true;
        }

        if stopping {
            break;
        }
        if !drained {
            thread::sleep(WRITER_POLL_INTERVAL);
        }
    }

    writer.finalize().map_err(RecorderError::Write)?;
    Ok(samples_written / channels as u64)
}

/// Default recording path: `<dir>/otodeck-YYYYmmdd-HHMMSS.wav`
pub fn default_recording_path(dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    dir.join(format!("otodeck-{}.wav", stamp))
}
