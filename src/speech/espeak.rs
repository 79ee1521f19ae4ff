//! espeak-ng speech engine.
//!
//! Each utterance runs as its own `espeak-ng` process that plays straight to the
//! default audio device. A supervisor task waits for the process and kills it when the
//! utterance is cancelled, so cancelling takes effect immediately.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::SpeechError;
use super::driver::{SpeechEngine, Utterance};
use super::voices::{Voice, VoiceSource};

/// espeak-ng's default speed in words per minute.
const BASE_WORDS_PER_MINUTE: f32 = 175.0;

/// espeak-ng's default amplitude.
const BASE_AMPLITUDE: f32 = 100.0;

/// The utterance currently playing.
struct ActiveUtterance {
    id: u64,
    token: CancellationToken,
}

/// Speech engine backed by the `espeak-ng` command line tool.
pub struct EspeakEngine {
    binary: String,                              // Path or name of the espeak-ng binary
    next_id: AtomicU64,                          // Utterance counter
    active: Arc<Mutex<Option<ActiveUtterance>>>, // Currently playing utterance
}

impl EspeakEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into(), next_id: AtomicU64::new(1), active: Arc::new(Mutex::new(None)) }
    }

    /// Command line arguments for one utterance.
    fn utterance_args(utterance: &Utterance) -> Vec<String> {
        let mut args = vec![
            "-s".to_string(),
            words_per_minute(utterance.rate).to_string(),
            "-a".to_string(),
            amplitude(utterance.volume).to_string(),
        ];
        if let Some(ref voice) = utterance.voice {
            args.push("-v".to_string());
            args.push(voice.clone());
        }
        args.push(utterance.text.clone());
        args
    }

    fn spawn_utterance(&self, utterance: &Utterance) -> Result<(), SpeechError> {
        let mut child = Command::new(&self.binary)
            .args(Self::utterance_args(utterance))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpeechError::Spawn(format!("{}: {}", self.binary, e)))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        *self.active.lock() = Some(ActiveUtterance { id, token: token.clone() });

        let active = self.active.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) if status.success() => debug!("Utterance {} finished", id),
                    Ok(status) => warn!("espeak-ng exited with {}", status),
                    Err(e) => warn!("Failed to wait for espeak-ng: {}", e),
                },
                _ = token.cancelled() => {
                    if let Err(e) = child.kill().await {
                        debug!("espeak-ng already gone: {}", e);
                    }
                    debug!("Utterance {} cancelled", id);
                }
            }

            let mut active = active.lock();
            if active.as_ref().is_some_and(|a| a.id == id) {
                *active = None;
            }
        });

        Ok(())
    }
}

impl SpeechEngine for EspeakEngine {
    fn speak(&self, utterance: Utterance) {
        self.cancel();
        if let Err(e) = self.spawn_utterance(&utterance) {
            error!("❌ Speech failed: {}", e);
        }
    }

    fn cancel(&self) {
        if let Some(active) = self.active.lock().take() {
            active.token.cancel();
        }
    }

    fn is_speaking(&self) -> bool {
        self.active.lock().is_some()
    }
}

impl VoiceSource for EspeakEngine {
    async fn list_voices(&self) -> Result<Vec<Voice>, SpeechError> {
        let output = Command::new(&self.binary)
            .arg("--voices")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| SpeechError::VoiceList(format!("{}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(SpeechError::VoiceList(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }

        Ok(parse_voices(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Map a relative rate onto espeak-ng's words-per-minute scale.
pub fn words_per_minute(rate: f32) -> u32 {
    (BASE_WORDS_PER_MINUTE * rate).round().max(1.0) as u32
}

/// Map a relative volume onto espeak-ng's amplitude scale.
pub fn amplitude(volume: f32) -> u32 {
    (BASE_AMPLITUDE * volume.clamp(0.0, 2.0)).round() as u32
}

/// Parse the table printed by `espeak-ng --voices`.
///
/// Columns: `Pty Language Age/Gender VoiceName File Other-Languages`. The language
/// tag doubles as the voice id since espeak-ng accepts it for `-v`.
pub fn parse_voices(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .filter(|line| !line.trim_start().starts_with("Pty"))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _priority = fields.next()?;
            let language = fields.next()?;
            let _age_gender = fields.next()?;
            let name = fields.next()?;
            Some(Voice { id: language.to_string(), name: name.replace('_', " "), language: language.to_string() })
        })
        .collect()
}
