//! Mixing bus - sums the deck outputs into the master block
//!
//! Plain summation, no crossfader and no limiting. The bus only watches for
//! samples outside `[-1, 1]` and raises a clip indicator the UI can poll.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::types::{AudioBuffer, NUM_DECKS};

use super::deck::Deck;
use super::engine::MAX_BUFFER_SIZE;

pub struct Mixer {
    /// Pre-allocated per-deck scratch blocks (real-time safe)
    deck_buffers: [AudioBuffer; NUM_DECKS],
    /// Set when the summed output exceeds full scale; cleared by the reader
    clip_indicator: Arc<AtomicBool>,
}

impl Mixer {
    pub fn new(num_channels: usize) -> Self {
        Self {
            deck_buffers: std::array::from_fn(|_| {
                AudioBuffer::with_capacity(num_channels, MAX_BUFFER_SIZE)
            }),
            clip_indicator: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Clip indicator for the UI (swap to false after reading)
    pub fn clip_indicator(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.clip_indicator)
    }

    /// Pull one block from every deck and sum them into `out`
    pub fn process(&mut self, decks: &mut [Deck; NUM_DECKS], out: &mut AudioBuffer) {
        let frames = out.len();
        out.fill_silence();

        for (deck, buffer) in decks.iter_mut().zip(self.deck_buffers.iter_mut()) {
            buffer.set_len_from_capacity(frames);
            deck.get_next_audio_block(buffer);
            out.add_buffer(buffer);
        }

        if out.peak() > 1.0 {
            self.clip_indicator.store(true, Ordering::Relaxed);
        }
    }
}
