//! Speech output: sentence formatting, voice registry, and the synthesis driver.

mod driver;
mod espeak;
mod format;
mod voices;

use thiserror::Error;

pub use driver::SpeechDriver;
pub use espeak::EspeakEngine;
pub use format::format_price_text;
pub use voices::{VoiceRegistry, VoiceSelection, VoiceSource, print_voices};

#[cfg(test)]
pub(crate) use driver::testing;

/// Failure talking to the synthesis engine. Never fatal: speech degrades or is skipped.
#[derive(Error, Debug)]
pub enum SpeechError {
    /// The engine process could not be started.
    #[error("could not start speech engine: {0}")]
    Spawn(String),

    /// Voice enumeration failed.
    #[error("could not list voices: {0}")]
    VoiceList(String),
}
