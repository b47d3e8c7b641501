//! Audio file decoding
//!
//! Decodes a whole audio file (WAV, MP3, FLAC, OGG/Vorbis) into a planar
//! [`AudioBuffer`] using symphonia. Tracks are held entirely in RAM so the
//! reversed mirror can be built once and both directions can seek instantly.

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::types::AudioBuffer;

/// File extensions the decoder is built to handle
pub const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "ogg"];

/// Errors that can occur while decoding an audio file
#[derive(Error, Debug)]
pub enum AudioFileError {
    #[error("Failed to open audio file: {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("No audio track found in {0}")]
    NoAudioTrack(PathBuf),

    #[error("Unknown sample rate in {0}")]
    UnknownSampleRate(PathBuf),

    #[error("Failed to create decoder: {0}")]
    Decoder(String),

    #[error("Audio file contains no samples: {0}")]
    Empty(PathBuf),
}

/// A fully decoded audio file
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Decoded samples, one vector per channel
    pub buffer: AudioBuffer,
    /// Native sample rate reported by the decoder
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Number of channels in the file
    pub fn channels(&self) -> usize {
        self.buffer.num_channels()
    }

    /// Length in frames
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if no frames were decoded
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Duration in seconds at the native sample rate
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.buffer.len() as f64 / self.sample_rate as f64
    }
}

/// Check whether a path has an extension the decoder understands
pub fn is_supported_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Decode an entire audio file into memory
///
/// Channel count, length and sample rate come from the decoder. Corrupt
/// packets are skipped with a warning; the rest of the file still decodes.
pub fn decode_file(path: &Path) -> Result<DecodedAudio, AudioFileError> {
    let file = File::open(path).map_err(|e| AudioFileError::Open {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AudioFileError::UnsupportedFormat(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioFileError::NoAudioTrack(path.to_path_buf()))?;

    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AudioFileError::UnknownSampleRate(path.to_path_buf()))?;

    // Some containers only report the layout once the first packet is decoded
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioFileError::Decoder(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                log::warn!("Error reading packet from {:?}: {}", path, e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("Error decoding packet from {:?}: {}", path, e);
                continue;
            }
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            channels = spec.channels.count();
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    if channels == 0 || samples.len() < channels {
        return Err(AudioFileError::Empty(path.to_path_buf()));
    }

    let buffer = AudioBuffer::from_interleaved(&samples, channels);

    log::debug!(
        "Decoded {:?}: {} channels, {} frames @ {}Hz",
        path,
        buffer.num_channels(),
        buffer.len(),
        sample_rate
    );

    Ok(DecodedAudio {
        buffer,
        sample_rate,
    })
}
