//! Session track list with analysis results

use std::path::{Path, PathBuf};

use otodeck_core::analysis::{suggest_next_track, TrackAnalysis};

/// A track the player knows about
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEntry {
    pub path: PathBuf,
    /// None until the analysis service reports back
    pub analysis: Option<TrackAnalysis>,
}

impl TrackEntry {
    pub fn title(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Tracks in the order they were first seen
#[derive(Debug, Default)]
pub struct Library {
    tracks: Vec<TrackEntry>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracks(&self) -> &[TrackEntry] {
        &self.tracks
    }

    pub fn get(&self, index: usize) -> Option<&TrackEntry> {
        self.tracks.get(index)
    }

    /// Add a track if it isn't listed yet, returning its index
    pub fn add(&mut self, path: &Path) -> usize {
        if let Some(index) = self.index_of(path) {
            return index;
        }
        self.tracks.push(TrackEntry {
            path: path.to_path_buf(),
            analysis: None,
        });
        self.tracks.len() - 1
    }

    pub fn index_of(&self, path: &Path) -> Option<usize> {
        self.tracks.iter().position(|t| t.path == path)
    }

    /// Store an analysis result, adding the track if needed
    pub fn set_analysis(&mut self, path: &Path, analysis: TrackAnalysis) -> usize {
        let index = self.add(path);
        self.tracks[index].analysis = Some(analysis);
        index
    }

    /// Closest-BPM track to `current`; unanalyzed tracks count as unknown BPM
    pub fn suggest_next(&self, current: usize) -> Option<usize> {
        let analyses: Vec<TrackAnalysis> = self
            .tracks
            .iter()
            .map(|t| t.analysis.clone().unwrap_or_else(TrackAnalysis::unknown))
            .collect();
        suggest_next_track(current, &analyses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(bpm: f32, key: &str) -> TrackAnalysis {
        TrackAnalysis {
            bpm,
            key: key.to_string(),
        }
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut library = Library::new();
        assert_eq!(library.add(Path::new("a.wav")), 0);
        assert_eq!(library.add(Path::new("b.wav")), 1);
        assert_eq!(library.add(Path::new("a.wav")), 0);
        assert_eq!(library.tracks().len(), 2);
        assert_eq!(library.get(1).map(TrackEntry::title), Some("b.wav".to_string()));
    }

    #[test]
    fn test_suggest_uses_analysis() {
        let mut library = Library::new();
        library.set_analysis(Path::new("a.wav"), analysis(128.0, "Am"));
        library.add(Path::new("pending.wav"));
        library.set_analysis(Path::new("b.wav"), analysis(140.0, "C"));
        library.set_analysis(Path::new("c.wav"), analysis(130.0, "G"));

        assert_eq!(library.suggest_next(0), Some(3));
        // An unanalyzed current track compares against 0 BPM
        assert_eq!(library.suggest_next(1), Some(0));
        assert_eq!(library.suggest_next(9), None);
    }
}
