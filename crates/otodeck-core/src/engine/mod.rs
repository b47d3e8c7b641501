//! Audio engine - decks, transports, resampling and mixing
//!
//! - Deck: one track held forward and reversed, with a direction switch
//! - Transport / Resampler: start/stop/gain and speed over a positionable source
//! - Mixer: sums both decks into the master output
//! - AudioEngine: owns the decks and applies queued commands

mod command;
mod deck;
mod engine;
pub mod gc;
mod mixer;
mod resampler;
mod source;
mod track;
mod transport;

pub use command::*;
pub use deck::*;
pub use engine::*;
pub use mixer::*;
pub use resampler::*;
pub use source::*;
pub use track::*;
pub use transport::*;
