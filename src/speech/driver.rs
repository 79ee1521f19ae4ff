//! Speech driver: cancel-then-speak on top of a synthesis engine.

use std::sync::Arc;

use tracing::debug;

use super::voices::{VoiceRegistry, VoiceSelection};

/// Speaking rate relative to the engine's normal speed.
pub const SPEECH_RATE: f32 = 0.9;

/// Output volume relative to full scale.
pub const SPEECH_VOLUME: f32 = 0.8;

/// One synthesis request.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub voice: Option<String>, // None = engine default
    pub rate: f32,
    pub volume: f32,
}

/// A text-to-speech engine.
///
/// `speak` starts an utterance and returns without waiting for it to finish; `cancel`
/// silences whatever is playing.
pub trait SpeechEngine: Send + Sync {
    fn speak(&self, utterance: Utterance);
    fn cancel(&self);
    fn is_speaking(&self) -> bool;
}

/// Resolves voices and guarantees at most one active utterance.
#[derive(Clone)]
pub struct SpeechDriver {
    engine: Arc<dyn SpeechEngine>,
    registry: VoiceRegistry,
}

impl SpeechDriver {
    pub fn new(engine: Arc<dyn SpeechEngine>, registry: VoiceRegistry) -> Self {
        Self { engine, registry }
    }

    /// Map a selection to the voice id handed to the engine.
    ///
    /// The default sentinel, an empty registry, and names no longer in the registry all
    /// resolve to the engine default.
    pub fn resolve_voice(&self, selection: &VoiceSelection) -> Option<String> {
        match selection {
            VoiceSelection::Default => None,
            VoiceSelection::Named(id) => match self.registry.find(id) {
                Some(voice) => Some(voice.id),
                None => {
                    debug!("Voice '{}' is not available, using the engine default", id);
                    None
                }
            },
        }
    }

    /// Speak `text`, interrupting anything still playing.
    pub fn speak(&self, text: &str, selection: &VoiceSelection) {
        self.engine.cancel();
        let utterance = Utterance { text: text.to_string(), voice: self.resolve_voice(selection), rate: SPEECH_RATE, volume: SPEECH_VOLUME };
        debug!("Speaking {:?} with voice {:?}", utterance.text, utterance.voice);
        self.engine.speak(utterance);
    }

    /// Silence any in-flight utterance.
    pub fn cancel(&self) {
        self.engine.cancel();
    }

    pub fn is_speaking(&self) -> bool {
        self.engine.is_speaking()
    }
}
