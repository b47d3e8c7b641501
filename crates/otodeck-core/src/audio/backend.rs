//! Handles returned to the control thread when the audio system starts
//!
//! The audio thread owns the `AudioEngine` exclusively. The control thread
//! keeps only these: a command sender, the deck atomics, and the stream
//! handle that keeps the device running.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::engine::{DeckAtomics, EngineCommand};
use crate::types::NUM_DECKS;

use super::cpal_backend::CpalAudioHandle;

/// Result of starting the audio system
pub struct AudioSystemResult {
    /// Keeps the stream alive (drop to stop audio)
    pub handle: CpalAudioHandle,
    /// Command sender for the control thread (lock-free)
    pub command_sender: CommandSender,
    /// Deck atomics for lock-free reads
    pub deck_atomics: [Arc<DeckAtomics>; NUM_DECKS],
    /// Raised by the mixer when the master output clips
    pub clip_indicator: Arc<AtomicBool>,
    /// Device sample rate
    pub sample_rate: u32,
    /// Buffer size in frames
    pub buffer_size: u32,
    /// Output latency in milliseconds
    pub latency_ms: f32,
}

/// Command sender for the control thread
///
/// Wraps the lock-free producer. Sending never blocks.
pub struct CommandSender {
    pub(crate) producer: rtrb::Producer<EngineCommand>,
}

impl CommandSender {
    pub fn new(producer: rtrb::Producer<EngineCommand>) -> Self {
        Self { producer }
    }

    /// Queue a command for the audio thread
    ///
    /// Returns the command back if the queue is full.
    pub fn send(&mut self, cmd: EngineCommand) -> Result<(), EngineCommand> {
        self.producer.push(cmd).map_err(|e| match e {
            rtrb::PushError::Full(value) => value,
        })
    }

    /// Check if the queue has space for more commands
    pub fn has_space(&self) -> bool {
        self.producer.slots() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{command_channel, COMMAND_QUEUE_CAPACITY};

    #[test]
    fn test_full_queue_returns_command() {
        let (tx, _rx) = command_channel();
        let mut sender = CommandSender::new(tx);

        for _ in 0..COMMAND_QUEUE_CAPACITY {
            assert!(sender.send(EngineCommand::Stop { deck: 0 }).is_ok());
        }
        assert!(!sender.has_space());

        let rejected = sender.send(EngineCommand::Start { deck: 1 });
        assert!(matches!(rejected, Err(EngineCommand::Start { deck: 1 })));
    }
}
