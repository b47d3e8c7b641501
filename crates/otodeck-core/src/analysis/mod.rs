//! BPM/key analysis service
//!
//! Tempo and key detection runs out of process: an external script is invoked
//! once per track and prints `bpm,key` on stdout. The service runs those jobs
//! on a background thread and publishes results as events.
//!
//! ```text
//! ┌─────────────┐   AnalysisCommand   ┌─────────────────┐   spawn   ┌──────────────────┐
//! │   Control   │ ──────────────────► │ AnalysisService │ ────────► │ python script.py │
//! │   Thread    │ ◄────────────────── │  (background)   │ ◄──────── │   "128.0,Am"     │
//! └─────────────┘    AnalysisEvent    └─────────────────┘   stdout  └──────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use thiserror::Error;

use crate::config::AnalysisConfig;

/// Key reported when the tool doesn't provide one
pub const UNKNOWN_KEY: &str = "Unknown";

/// Errors from running the analysis tool
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Failed to run analysis tool {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Analysis tool failed for {path} (exit code {code:?}): {stderr}")]
    ToolFailed {
        path: PathBuf,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to spawn analysis thread: {0}")]
    Thread(#[source] std::io::Error),
}

/// Tempo and key of one track
#[derive(Debug, Clone, PartialEq)]
pub struct TrackAnalysis {
    /// Beats per minute, 0.0 when unknown
    pub bpm: f32,
    pub key: String,
}

impl TrackAnalysis {
    /// Result used when the tool fails
    pub fn unknown() -> Self {
        Self {
            bpm: 0.0,
            key: UNKNOWN_KEY.to_string(),
        }
    }

    /// Whether a usable tempo was detected
    pub fn has_bpm(&self) -> bool {
        self.bpm > 0.0
    }
}

impl Default for TrackAnalysis {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Parse the tool's `bpm,key` output
///
/// Non-positive or unparsable BPM becomes 0.0; a missing or empty key
/// becomes "Unknown".
pub fn parse_analysis_output(output: &str) -> TrackAnalysis {
    let line = output.lines().next().unwrap_or("").trim();
    let mut parts = line.splitn(2, ',');

    let bpm = parts
        .next()
        .and_then(|s| s.trim().parse::<f32>().ok())
        .filter(|bpm| bpm.is_finite() && *bpm > 0.0)
        .unwrap_or(0.0);

    let key = parts
        .next()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .unwrap_or(UNKNOWN_KEY)
        .to_string();

    TrackAnalysis { bpm, key }
}

/// Run the analysis tool on a single track (blocking)
pub fn analyze_track(config: &AnalysisConfig, path: &Path) -> Result<TrackAnalysis, AnalysisError> {
    let python = config.python_command();
    log::debug!("Analyzing {:?} with {} {:?}", path, python, config.script);

    let output = Command::new(&python)
        .arg(&config.script)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| AnalysisError::Spawn {
            command: python.clone(),
            source: e,
        })?;

    if !output.status.success() {
        // The tool reports errors on stdout as often as on stderr
        let mut message = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if message.is_empty() {
            message = String::from_utf8_lossy(&output.stdout).trim().to_string();
        }
        return Err(AnalysisError::ToolFailed {
            path: path.to_path_buf(),
            code: output.status.code(),
            stderr: message,
        });
    }

    Ok(parse_analysis_output(&String::from_utf8_lossy(&output.stdout)))
}

/// Index of the track whose BPM is closest to the current one
///
/// Skips `current` itself and tracks without a positive BPM. Returns `None`
/// when `current` is out of range or nothing qualifies.
pub fn suggest_next_track(current: usize, analyses: &[TrackAnalysis]) -> Option<usize> {
    let current_bpm = analyses.get(current)?.bpm;

    analyses
        .iter()
        .enumerate()
        .filter(|(i, a)| *i != current && a.has_bpm())
        .map(|(i, a)| (i, (a.bpm - current_bpm).abs()))
        // First of equally close candidates wins
        .fold(None, |best: Option<(usize, f32)>, (i, diff)| match best {
            Some((_, best_diff)) if best_diff <= diff => best,
            _ => Some((i, diff)),
        })
        .map(|(i, _)| i)
}

/// Commands for the analysis service
pub enum AnalysisCommand {
    /// Analyze tracks in order, one event per track
    Analyze { paths: Vec<PathBuf> },
    /// Finish pending work and exit
    Shutdown,
}

/// Events published by the analysis service
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisEvent {
    /// One track finished (failures are reported as `TrackAnalysis::unknown()`)
    TrackAnalyzed {
        path: PathBuf,
        analysis: TrackAnalysis,
    },
    /// Every track of an `Analyze` command has been processed
    BatchComplete { count: usize },
}

/// Handle to a background service thread
pub struct ServiceHandle<Cmd> {
    pub command_tx: Sender<Cmd>,
    pub thread_handle: Option<thread::JoinHandle<()>>,
}

impl<Cmd> ServiceHandle<Cmd> {
    pub fn send(&self, cmd: Cmd) -> Result<(), channel::SendError<Cmd>> {
        self.command_tx.send(cmd)
    }
}

impl ServiceHandle<AnalysisCommand> {
    /// Ask the service to stop and wait for it
    pub fn shutdown(mut self) {
        let _ = self.command_tx.send(AnalysisCommand::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::warn!("Analysis thread panicked");
            }
        }
    }
}

/// Background BPM/key analysis
pub struct AnalysisService;

impl AnalysisService {
    /// Spawn the service thread
    ///
    /// Results are sent to `event_tx`. The thread exits on `Shutdown` or
    /// when every command sender is dropped.
    pub fn spawn(
        config: AnalysisConfig,
        event_tx: Sender<AnalysisEvent>,
    ) -> Result<ServiceHandle<AnalysisCommand>, AnalysisError> {
        let (command_tx, command_rx) = channel::unbounded();

        let thread_handle = thread::Builder::new()
            .name("bpm-analysis".to_string())
            .spawn(move || Self::run(config, command_rx, event_tx))
            .map_err(AnalysisError::Thread)?;

        Ok(ServiceHandle {
            command_tx,
            thread_handle: Some(thread_handle),
        })
    }

    fn run(config: AnalysisConfig, command_rx: Receiver<AnalysisCommand>, event_tx: Sender<AnalysisEvent>) {
        log::info!("Analysis service started");

        while let Ok(cmd) = command_rx.recv() {
            match cmd {
                AnalysisCommand::Analyze { paths } => {
                    let count = paths.len();
                    for path in paths {
                        let analysis = match analyze_track(&config, &path) {
                            Ok(analysis) => {
                                log::info!(
                                    "Analyzed {:?}: {:.1} BPM, key {}",
                                    path,
                                    analysis.bpm,
                                    analysis.key
                                );
                                analysis
                            }
                            Err(e) => {
                                log::warn!("{}", e);
                                TrackAnalysis::unknown()
                            }
                        };
                        if event_tx
                            .send(AnalysisEvent::TrackAnalyzed { path, analysis })
                            .is_err()
                        {
                            log::debug!("Analysis event receiver dropped, stopping");
                            return;
                        }
                    }
                    let _ = event_tx.send(AnalysisEvent::BatchComplete { count });
                }
                AnalysisCommand::Shutdown => break,
            }
        }

        log::info!("Analysis service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn analysis(bpm: f32) -> TrackAnalysis {
        TrackAnalysis {
            bpm,
            key: UNKNOWN_KEY.to_string(),
        }
    }

    #[test]
    fn test_parse_bpm_and_key() {
        let result = parse_analysis_output("128.0,Am\n");
        assert_eq!(result.bpm, 128.0);
        assert_eq!(result.key, "Am");
    }

    #[test]
    fn test_parse_missing_key() {
        let result = parse_analysis_output("  97.5 ");
        assert_eq!(result.bpm, 97.5);
        assert_eq!(result.key, UNKNOWN_KEY);

        assert_eq!(parse_analysis_output("120,").key, UNKNOWN_KEY);
    }

    #[test]
    fn test_parse_bad_bpm_is_zero() {
        assert_eq!(parse_analysis_output("-12.0,C").bpm, 0.0);
        assert_eq!(parse_analysis_output("Error analyzing track: boom").bpm, 0.0);
        assert_eq!(parse_analysis_output("").bpm, 0.0);
        assert_eq!(parse_analysis_output("nan,C").bpm, 0.0);
    }

    #[test]
    fn test_suggest_closest_bpm() {
        let tracks = vec![analysis(128.0), analysis(140.0), analysis(126.0), analysis(0.0)];

        assert_eq!(suggest_next_track(0, &tracks), Some(2));
        assert_eq!(suggest_next_track(1, &tracks), Some(0));
    }

    #[test]
    fn test_suggest_skips_unknown_and_out_of_range() {
        let tracks = vec![analysis(128.0), analysis(0.0)];

        assert_eq!(suggest_next_track(0, &tracks), None);
        assert_eq!(suggest_next_track(5, &tracks), None);
        assert_eq!(suggest_next_track(0, &[]), None);
    }

    #[test]
    fn test_suggest_tie_prefers_first() {
        let tracks = vec![analysis(120.0), analysis(124.0), analysis(116.0)];
        assert_eq!(suggest_next_track(0, &tracks), Some(1));
    }

    #[cfg(unix)]
    fn script_config(dir: &Path, body: &str) -> AnalysisConfig {
        let script = dir.join("fake_analyzer.sh");
        std::fs::write(&script, body).unwrap();
        AnalysisConfig {
            python: "sh".to_string(),
            script,
            analyze_on_startup: false,
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_analyze_track_runs_tool() {
        let dir = tempfile::tempdir().unwrap();
        let config = script_config(dir.path(), "echo \"124.3,F#m\"\n");

        let result = analyze_track(&config, Path::new("track.wav")).unwrap();
        assert_eq!(result.bpm, 124.3);
        assert_eq!(result.key, "F#m");
    }

    #[cfg(unix)]
    #[test]
    fn test_analyze_track_failure_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = script_config(dir.path(), "echo \"Error analyzing track: nope\"\nexit 1\n");

        let result = analyze_track(&config, Path::new("track.wav"));
        assert!(matches!(result, Err(AnalysisError::ToolFailed { code: Some(1), .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_service_publishes_events() {
        let dir = tempfile::tempdir().unwrap();
        let config = script_config(dir.path(), "echo \"100.0,C\"\n");
        let (event_tx, event_rx) = channel::unbounded();

        let handle = AnalysisService::spawn(config, event_tx).unwrap();
        handle
            .send(AnalysisCommand::Analyze {
                paths: vec![PathBuf::from("a.wav"), PathBuf::from("b.wav")],
            })
            .unwrap();

        let timeout = Duration::from_secs(10);
        let first = event_rx.recv_timeout(timeout).unwrap();
        assert_eq!(
            first,
            AnalysisEvent::TrackAnalyzed {
                path: PathBuf::from("a.wav"),
                analysis: TrackAnalysis {
                    bpm: 100.0,
                    key: "C".to_string()
                },
            }
        );
        assert!(matches!(
            event_rx.recv_timeout(timeout).unwrap(),
            AnalysisEvent::TrackAnalyzed { .. }
        ));
        assert_eq!(
            event_rx.recv_timeout(timeout).unwrap(),
            AnalysisEvent::BatchComplete { count: 2 }
        );

        handle.shutdown();
    }

    #[cfg(unix)]
    #[test]
    fn test_service_reports_missing_tool_as_unknown() {
        let config = AnalysisConfig {
            python: "/nonexistent/python".to_string(),
            script: PathBuf::from("missing.py"),
            analyze_on_startup: false,
        };
        let (event_tx, event_rx) = channel::unbounded();

        let handle = AnalysisService::spawn(config, event_tx).unwrap();
        handle
            .send(AnalysisCommand::Analyze {
                paths: vec![PathBuf::from("a.wav")],
            })
            .unwrap();

        match event_rx.recv_timeout(Duration::from_secs(10)).unwrap() {
            AnalysisEvent::TrackAnalyzed { analysis, .. } => {
                assert_eq!(analysis, TrackAnalysis::unknown())
            }
            other => panic!("unexpected event {:?}", other),
        }
        handle.shutdown();
    }
}
