//! Configuration
//!
//! - Generic YAML config loading/saving
//! - Standard paths under `~/Music/otodeck`
//! - The [`OtoDeckConfig`] settings tree
//!
//! ```ignore
//! use otodeck_core::config::{default_config_path, load_config, save_config, OtoDeckConfig};
//!
//! let path = default_config_path();
//! let config: OtoDeckConfig = load_config(&path);
//! save_config(&config, &path)?;
//! ```

mod io;
mod paths;
mod settings;

pub use io::{load_config, save_config};
pub use paths::{default_config_path, default_data_dir, default_recordings_dir, CONFIG_FILENAME};
pub use settings::{AnalysisConfig, OtoDeckConfig, RecordingConfig};
