//! Audio output via cpal
//!
//! The audio system follows a lock-free design for real-time safety:
//!
//! - **Control Thread**: Sends commands via a lock-free ringbuffer
//! - **Audio Thread**: Owns the AudioEngine exclusively, processes commands
//! - **Atomics**: The control thread reads playback state via relaxed atomics
//!
//! ```ignore
//! use otodeck_core::audio::{start_audio_system, AudioConfig};
//! use otodeck_core::engine::EngineCommand;
//!
//! let mut audio = start_audio_system(&AudioConfig::default())?;
//! audio.command_sender.send(EngineCommand::StartReverse { deck: 0 });
//! let position = audio.deck_atomics[0].position_relative();
//! ```

mod backend;
mod config;
mod cpal_backend;
mod device;
mod error;

pub use backend::{AudioSystemResult, CommandSender};
pub use config::{AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, MIN_BUFFER_SIZE};
pub use cpal_backend::{start_audio_system, CpalAudioHandle};
pub use device::{find_device_by_id, get_cpal_default_device, get_output_devices, AudioDevice};
pub use error::{AudioError, AudioResult};
