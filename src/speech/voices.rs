//! Registry of the synthesis voices currently available.
//!
//! Voices arrive asynchronously: the registry starts empty and not ready, a
//! [`VoiceSource`] populates it later, and it can be refreshed at any time. Consumers
//! either read the current snapshot with [`VoiceRegistry::list_voices`] or subscribe to
//! change notifications instead of assuming the list exists at startup.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use super::SpeechError;

/// Markers that flag a voice as a lower-quality variant when picking a default.
pub const DISFAVORED_MARKERS: &[&str] = &["mbrola", "mb-"];

/// A synthesis voice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub id: String,       // Identifier passed to the engine
    pub name: String,     // Human-readable name
    pub language: String, // Locale tag, e.g. "en-us"
}

/// Which voice to speak with.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VoiceSelection {
    /// Whatever the engine uses when no voice is given
    #[default]
    Default,
    /// A voice id from the registry
    Named(String),
}

impl VoiceSelection {
    /// Parse user input; `default` (any case) or an empty string selects the engine default.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.is_empty() || input.eq_ignore_ascii_case("default") {
            VoiceSelection::Default
        } else {
            VoiceSelection::Named(input.to_string())
        }
    }
}

impl std::fmt::Display for VoiceSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoiceSelection::Default => write!(f, "default"),
            VoiceSelection::Named(id) => write!(f, "{}", id),
        }
    }
}

/// Something that can enumerate voices, e.g. the espeak-ng binary.
pub trait VoiceSource: Send + Sync {
    fn list_voices(&self) -> impl Future<Output = Result<Vec<Voice>, SpeechError>> + Send;
}

/// Snapshot published to subscribers.
#[derive(Debug, Clone, Default)]
pub struct VoiceSnapshot {
    pub ready: bool,             // Set once the first population finished
    pub voices: Arc<Vec<Voice>>, // Current voice list
}

/// Re-queryable, asynchronously populated voice list.
#[derive(Clone)]
pub struct VoiceRegistry {
    tx: Arc<watch::Sender<VoiceSnapshot>>,
}

impl VoiceRegistry {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(VoiceSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    /// Current voices (empty until populated).
    pub fn list_voices(&self) -> Arc<Vec<Voice>> {
        self.tx.borrow().voices.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.tx.borrow().ready
    }

    /// Subscribe to "voices changed" notifications.
    pub fn subscribe(&self) -> watch::Receiver<VoiceSnapshot> {
        self.tx.subscribe()
    }

    /// Wait until the first population has happened.
    pub async fn ready(&self) {
        let mut rx = self.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|snapshot| snapshot.ready).await;
    }

    /// Replace the voice list and notify subscribers.
    pub fn replace(&self, voices: Vec<Voice>) {
        self.tx.send_replace(VoiceSnapshot { ready: true, voices: Arc::new(voices) });
    }

    /// Re-enumerate voices from `source`.
    ///
    /// A failed enumeration still marks the registry ready, with no voices, so speech
    /// falls back to the engine default instead of waiting forever.
    pub async fn refresh<S: VoiceSource>(&self, source: &S) {
        match source.list_voices().await {
            Ok(voices) => {
                info!("🗣️  {} voices available", voices.len());
                self.replace(voices);
            }
            Err(e) => {
                warn!("⚠️  Could not list voices ({}), using the engine default", e);
                self.replace(Vec::new());
            }
        }
    }

    /// Look up a voice id in the current snapshot.
    pub fn find(&self, id: &str) -> Option<Voice> {
        self.tx.borrow().voices.iter().find(|v| v.id == id || v.name == id).cloned()
    }

    /// The selected voice id, if it is named and absent from the current snapshot.
    pub fn missing<'a>(&self, selection: &'a VoiceSelection) -> Option<&'a str> {
        match selection {
            VoiceSelection::Named(id) if self.find(id).is_none() => Some(id),
            _ => None,
        }
    }

    /// Pick the default voice according to [`default_voice`].
    pub fn default_selection(&self) -> VoiceSelection {
        default_voice(&self.list_voices())
    }
}

impl Default for VoiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn is_english(voice: &Voice) -> bool {
    voice.language.to_ascii_lowercase().contains("en")
}

fn is_disfavored(voice: &Voice) -> bool {
    let name = voice.name.to_ascii_lowercase();
    let id = voice.id.to_ascii_lowercase();
    DISFAVORED_MARKERS.iter().any(|m| name.contains(m) || id.contains(m))
}

/// Choose a default voice.
///
/// Preference order: an English voice without a disfavored marker, any English voice,
/// the first voice, and finally the engine default when the list is empty.
pub fn default_voice(voices: &[Voice]) -> VoiceSelection {
    voices
        .iter()
        .find(|v| is_english(v) && !is_disfavored(v))
        .or_else(|| voices.iter().find(|v| is_english(v)))
        .or_else(|| voices.first())
        .map(|v| VoiceSelection::Named(v.id.clone()))
        .unwrap_or_default()
}

/// Print voices as a table.
pub fn print_voices(voices: &[Voice]) {
    if voices.is_empty() {
        println!("No voices found; the engine default will be used.");
        return;
    }

    println!("{:<24} {:<10} NAME", "VOICE", "LANGUAGE");
    println!("{}", "─".repeat(60));
    for voice in voices {
        println!("{:<24} {:<10} {}", voice.id, voice.language, voice.name);
    }
    println!();
    println!("Default: {}", default_voice(voices));
}
