//! Lock-free command queue for real-time deck control
//!
//! The control thread never touches a deck directly. It pushes commands onto
//! an `rtrb` ring buffer and the audio thread applies them at the start of the
//! next callback, so state never changes mid-block.
//!
//! ```ignore
//! let (mut tx, mut rx) = command_channel();
//!
//! // Control thread (never blocks)
//! tx.push(EngineCommand::StartReverse { deck: 0 });
//!
//! // Audio thread
//! engine.process_commands(&mut rx);
//! ```
//!
//! Decoding happens before a track is queued (see [`PreparedTrack`]), so a
//! file that fails to decode never reaches the audio thread and the deck keeps
//! whatever it was playing.

use super::PreparedTrack;
use crate::recorder::RecordingTap;

/// Commands sent from the control thread to the audio thread
pub enum EngineCommand {
    // ─────────────────────────────────────────────────────────────
    // Track Management
    // ─────────────────────────────────────────────────────────────
    /// Swap a decoded track onto a deck
    ///
    /// Boxed to keep the enum pointer-sized; the buffers inside are shared
    /// and freed off the audio thread.
    LoadTrack {
        deck: usize,
        track: Box<PreparedTrack>,
    },
    /// Stop and release the deck's track
    UnloadTrack { deck: usize },

    // ─────────────────────────────────────────────────────────────
    // Playback Control
    // ─────────────────────────────────────────────────────────────
    /// Start in the forward direction
    Start { deck: usize },
    /// Switch to forward playback at the mirrored position and start
    StartForward { deck: usize },
    /// Switch to reverse playback at the mirrored position and start
    StartReverse { deck: usize },
    /// Stop whichever direction is playing
    Stop { deck: usize },

    // ─────────────────────────────────────────────────────────────
    // Deck Parameters
    // ─────────────────────────────────────────────────────────────
    /// Linear output gain (>= 0)
    SetGain { deck: usize, gain: f32 },
    /// Playback speed ratio (1.0 = native)
    SetSpeed { deck: usize, ratio: f64 },
    /// Seek to an absolute time in seconds
    SetPosition { deck: usize, seconds: f64 },
    /// Seek to a fraction of the track, 0.0 to 1.0
    SetPositionRelative { deck: usize, position: f64 },

    // ─────────────────────────────────────────────────────────────
    // Recording
    // ─────────────────────────────────────────────────────────────
    /// Start copying the master output into a recording
    AttachRecorder(Box<RecordingTap>),
    /// Stop feeding the current recording
    DetachRecorder,
}

impl EngineCommand {
    /// Deck addressed by this command, if any
    pub fn deck(&self) -> Option<usize> {
        match self {
            Self::LoadTrack { deck, .. }
            | Self::UnloadTrack { deck }
            | Self::Start { deck }
            | Self::StartForward { deck }
            | Self::StartReverse { deck }
            | Self::Stop { deck }
            | Self::SetGain { deck, .. }
            | Self::SetSpeed { deck, .. }
            | Self::SetPosition { deck, .. }
            | Self::SetPositionRelative { deck, .. } => Some(*deck),
            Self::AttachRecorder(_) | Self::DetachRecorder => None,
        }
    }
}

/// Capacity of the command queue
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;

/// Create a new command channel
///
/// The producer is owned by the control thread, the consumer by the audio
/// callback.
pub fn command_channel() -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}
