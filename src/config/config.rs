//! Application configuration and CLI argument parsing.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::assets::{self, Asset};
use crate::price::ChangeWindow;
use crate::speech::VoiceSelection;

/// Polling periods the user can pick from, in seconds.
pub const INTERVAL_CHOICES: &[u64] = &[10, 15, 30, 60, 120, 300, 600];

/// Default CoinGecko API base URL.
pub const DEFAULT_API_URL: &str = "https://api.coingecko.com/api/v3";

/// Seconds between announcements, restricted to [`INTERVAL_CHOICES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct PollInterval(u64);

impl PollInterval {
    pub fn seconds(self) -> u64 {
        self.0
    }

    pub fn as_duration(self) -> std::time::Duration {
        std::time::Duration::from_secs(self.0)
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        PollInterval(60)
    }
}

impl TryFrom<u64> for PollInterval {
    type Error = String;

    fn try_from(seconds: u64) -> Result<Self, Self::Error> {
        if INTERVAL_CHOICES.contains(&seconds) {
            Ok(PollInterval(seconds))
        } else {
            Err(format!("interval must be one of {:?} seconds, got {}", INTERVAL_CHOICES, seconds))
        }
    }
}

impl From<PollInterval> for u64 {
    fn from(interval: PollInterval) -> Self {
        interval.0
    }
}

impl FromStr for PollInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let seconds: u64 = s.trim_end_matches('s').parse().map_err(|_| format!("'{}' is not a number of seconds", s))?;
        PollInterval::try_from(seconds)
    }
}

impl fmt::Display for PollInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// How often to announce and which change to mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub interval: PollInterval,
    pub change_window: ChangeWindow,
}

/// Price announcer configuration.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(name = "crypto-voice")]
#[command(author, version, about = "Announces cryptocurrency prices out loud", long_about = None)]
pub struct AppConfig {
    /// List the supported assets and exit
    #[arg(long)]
    pub list_assets: bool,

    /// List the available speech voices and exit
    #[arg(long)]
    pub list_voices: bool,

    /// Asset to announce (CoinGecko id or ticker, e.g. bitcoin or BTC)
    #[arg(long, short = 'a', env = "CRYPTO_VOICE_ASSET", default_value = "bitcoin")]
    pub asset: Asset,

    /// Seconds between announcements (10, 15, 30, 60, 120, 300 or 600)
    #[arg(long, short = 'i', env = "CRYPTO_VOICE_INTERVAL", default_value = "60")]
    pub interval: PollInterval,

    /// Which percentage change to announce
    #[arg(long, short = 'c', env = "CRYPTO_VOICE_CHANGE_WINDOW", value_enum, default_value = "24h")]
    pub change_window: ChangeWindow,

    /// Voice id (see --list-voices); "default" lets the engine decide.
    /// When omitted, an English voice is picked once the voice list is loaded
    #[arg(long, env = "CRYPTO_VOICE_VOICE")]
    pub voice: Option<String>,

    /// Price API base URL
    #[arg(long, short = 'u', env = "CRYPTO_VOICE_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Timeout for a single price request in seconds
    #[arg(long, default_value = "10")]
    pub request_timeout_secs: u64,

    /// Path to the espeak-ng binary
    #[arg(long, env = "CRYPTO_VOICE_ESPEAK", default_value = "espeak-ng")]
    pub espeak_binary: String,

    /// Stay quiet when the price has not moved since the last announcement
    #[arg(long)]
    pub skip_unchanged: bool,

    /// Start announcing immediately instead of waiting for the `start` command
    #[arg(long)]
    pub autostart: bool,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl AppConfig {
    /// Parse configuration from command line arguments.
    pub fn from_args() -> Self {
        let config = Self::parse();

        if config.list_assets {
            assets::print_assets();
            std::process::exit(0);
        }

        config
    }

    /// Schedule part of the configuration.
    pub fn schedule(&self) -> ScheduleConfig {
        ScheduleConfig { interval: self.interval, change_window: self.change_window }
    }

    /// Voice requested on the command line, if any.
    pub fn voice_selection(&self) -> Option<VoiceSelection> {
        self.voice.as_deref().map(VoiceSelection::parse)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            anyhow::bail!("API URL must start with http:// or https://, got {}", self.api_url);
        }

        if self.request_timeout_secs == 0 {
            anyhow::bail!("Request timeout must be positive");
        }

        if self.request_timeout_secs > self.interval.seconds() {
            anyhow::bail!("Request timeout ({}s) must not exceed the interval ({})", self.request_timeout_secs, self.interval);
        }

        if self.espeak_binary.trim().is_empty() {
            anyhow::bail!("espeak-ng binary path must not be empty");
        }

        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        info!("  Asset: {}", self.asset);
        info!("  Interval: {}", self.interval);
        info!("  Change window: {}", self.change_window);
        info!("  Voice: {}", self.voice.as_deref().unwrap_or("auto"));
        info!("  API URL: {}", self.api_url);
        info!("  Request timeout: {}s", self.request_timeout_secs);
        info!("  espeak-ng: {}", self.espeak_binary);
        if self.skip_unchanged {
            info!("  Skipping unchanged prices");
        }
    }
}
