//! OtoDeck Core - two-deck forward/reverse playback engine

pub mod analysis;
pub mod audio;
pub mod audio_file;
pub mod config;
pub mod engine;
pub mod recorder;
pub mod types;

pub use types::*;
