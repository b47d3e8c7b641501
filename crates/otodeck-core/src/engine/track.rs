//! Tracks prepared for loading onto a deck

use std::path::{Path, PathBuf};

use basedrop::Shared;

use crate::audio_file::{decode_file, AudioFileError};
use crate::types::AudioBuffer;

use super::gc::gc_handle;

/// A decoded track with its reversed mirror, ready to hand to a deck
///
/// Built entirely off the audio thread. Decoding and reversal happen here so
/// the deck only has to swap pointers, and a file that fails to decode never
/// disturbs whatever the deck is currently playing.
pub struct PreparedTrack {
    pub path: PathBuf,
    /// Samples as decoded
    pub forward: Shared<AudioBuffer>,
    /// `reversed[c][i] == forward[c][len - 1 - i]`
    pub reversed: Shared<AudioBuffer>,
    /// Native sample rate of the file
    pub sample_rate: u32,
}

impl PreparedTrack {
    /// Decode a file and build its reversed mirror
    pub fn load(path: &Path) -> Result<Self, AudioFileError> {
        let decoded = decode_file(path)?;
        Ok(Self::from_buffer(path, decoded.buffer, decoded.sample_rate))
    }

    /// Wrap an already decoded buffer
    pub fn from_buffer(path: &Path, forward: AudioBuffer, sample_rate: u32) -> Self {
        let reversed = forward.reversed();
        let handle = gc_handle();
        Self {
            path: path.to_path_buf(),
            forward: Shared::new(&handle, forward),
            reversed: Shared::new(&handle, reversed),
            sample_rate,
        }
    }

    /// Length in frames
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.forward.len() as f64 / self.sample_rate as f64
    }

    /// File name without the directory
    pub fn filename(&self) -> &str {
        self.path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
    }
}

impl std::fmt::Debug for PreparedTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedTrack")
            .field("path", &self.path)
            .field("channels", &self.forward.num_channels())
            .field("frames", &self.forward.len())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepared_track_mirrors_buffer() {
        let forward = AudioBuffer::from_channels(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        let track = PreparedTrack::from_buffer(Path::new("/music/a.wav"), forward, 3);

        assert_eq!(track.len(), 3);
        assert_eq!(track.reversed.channel(0), &[3.0, 2.0, 1.0]);
        assert_eq!(track.reversed.channel(1), &[6.0, 5.0, 4.0]);
        assert!((track.duration_seconds() - 1.0).abs() < 1e-12);
        assert_eq!(track.filename(), "a.wav");
    }

    #[test]
    fn test_prepared_track_load_failure() {
        assert!(PreparedTrack::load(Path::new("/nonexistent/b.flac")).is_err());
    }
}
