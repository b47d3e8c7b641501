//! Application settings

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::audio::AudioConfig;

use super::paths::default_recordings_dir;

/// Top-level configuration stored in `config.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtoDeckConfig {
    pub audio: AudioConfig,
    pub analysis: AnalysisConfig,
    pub recording: RecordingConfig,
}

/// External BPM/key analysis tool
///
/// Invoked as `<python> <script> <track path>`; the tool prints `bpm,key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Interpreter used to run the script
    /// Overridden by the `OTODECK_PYTHON` environment variable
    pub python: String,
    /// Path to the analysis script
    pub script: PathBuf,
    /// Analyze every track passed on the command line at startup
    pub analyze_on_startup: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            python: "python".to_string(),
            script: PathBuf::from("scripts/analyze_track.py"),
            analyze_on_startup: true,
        }
    }
}

impl AnalysisConfig {
    /// Interpreter to run, honoring the environment override
    pub fn python_command(&self) -> String {
        std::env::var("OTODECK_PYTHON").unwrap_or_else(|_| self.python.clone())
    }
}

/// Set recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Directory for timestamped recordings
    pub directory: PathBuf,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            directory: default_recordings_dir(),
        }
    }
}
