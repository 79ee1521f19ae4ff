//! Console commands: parsing user input and applying it to the loop.

use std::fmt::Write as _;

use thiserror::Error;
use time::macros::format_description;

use super::loop_controller::{LoopController, LoopState, LoopStatus};
use crate::config::{Asset, PollInterval};
use crate::price::{ChangeWindow, QuoteSource};
use crate::speech::{VoiceRegistry, VoiceSelection, VoiceSource, print_voices};

/// A parsed console command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Stop,
    SpeakNow,
    Asset(Asset),
    Interval(PollInterval),
    Window(ChangeWindow),
    Voice(VoiceSelection),
    Voices,
    Status,
    Help,
    Quit,
}

/// Malformed console input.
#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("unknown command '{0}' (type 'help' for the list)")]
    Unknown(String),

    #[error("'{0}' needs an argument (type 'help' for usage)")]
    MissingArgument(&'static str),

    #[error("{0}")]
    InvalidArgument(String),
}

/// What the console should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub const HELP: &str = "\
Commands:
  start                 Start announcing on the schedule
  stop                  Stop announcing and silence speech
  speak                 Announce the current price now
  asset <id|ticker>     Switch asset (e.g. asset ETH)
  interval <seconds>    Change the interval (10, 15, 30, 60, 120, 300, 600)
  window <off|1h|24h|7d>
                        Change which percentage change is announced
  voice <id|default>    Change the voice
  voices                List available voices
  status                Show the current state
  help                  Show this help
  quit                  Exit";

/// Parse one line of input. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let mut parts = line.split_whitespace();
    let Some(name) = parts.next() else {
        return Ok(None);
    };
    let argument = parts.collect::<Vec<_>>().join(" ");
    let argument = argument.as_str();

    let command = match name.to_ascii_lowercase().as_str() {
        "start" => Command::Start,
        "stop" => Command::Stop,
        "speak" | "now" => Command::SpeakNow,
        "voices" => Command::Voices,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        "asset" => Command::Asset(required(argument, "asset")?.parse().map_err(CommandError::InvalidArgument)?),
        "interval" => Command::Interval(required(argument, "interval")?.parse().map_err(CommandError::InvalidArgument)?),
        "window" => {
            let value = required(argument, "window")?;
            let window = <ChangeWindow as clap::ValueEnum>::from_str(value, true)
                .map_err(|_| CommandError::InvalidArgument(format!("window must be one of off, 1h, 24h, 7d, got '{}'", value)))?;
            Command::Window(window)
        }
        "voice" => Command::Voice(VoiceSelection::parse(required(argument, "voice")?)),
        other => return Err(CommandError::Unknown(other.to_string())),
    };

    Ok(Some(command))
}

fn required<'a>(argument: &'a str, command: &'static str) -> Result<&'a str, CommandError> {
    if argument.is_empty() { Err(CommandError::MissingArgument(command)) } else { Ok(argument) }
}

/// Apply a command to the loop.
///
/// # Arguments
/// * `controller` - Loop to drive
/// * `registry` - Voice registry, for listing and validating voices
/// * `voices` - Engine to re-enumerate voices from on `voices`
/// * `command` - Parsed command
///
/// # Returns
/// Whether the console should keep reading input.
pub async fn execute<Q: QuoteSource, V: VoiceSource>(controller: &LoopController<Q>, registry: &VoiceRegistry, voices: &V, command: Command) -> Flow {
    match command {
        Command::Start => controller.start(),
        Command::Stop => controller.stop(),
        Command::SpeakNow => controller.speak_now().await,
        Command::Asset(asset) => {
            let mut config = controller.config();
            config.asset = asset;
            controller.apply_config(config).await;
            println!("Asset: {}", asset);
        }
        Command::Interval(interval) => {
            let mut config = controller.config();
            config.schedule.interval = interval;
            controller.apply_config(config).await;
            println!("Interval: {}", interval);
        }
        Command::Window(window) => {
            let mut config = controller.config();
            config.schedule.change_window = window;
            controller.apply_config(config).await;
            println!("Change window: {}", window);
        }
        Command::Voice(voice) => {
            if let Some(id) = registry.missing(&voice) {
                println!("Voice '{}' is not available right now; the engine default will be used until it is.", id);
            }
            let mut config = controller.config();
            config.voice = voice.clone();
            controller.apply_config(config).await;
            println!("Voice: {}", voice);
        }
        Command::Voices => {
            registry.refresh(voices).await;
            print_voices(&registry.list_voices());
        }
        Command::Status => println!("{}", render_status(&controller.status())),
        Command::Help => println!("{}", HELP),
        Command::Quit => return Flow::Quit,
    }

    Flow::Continue
}

/// Human-readable status block.
pub fn render_status(status: &LoopStatus) -> String {
    let mut out = String::new();

    let speaking = if status.speaking { ", speaking" } else { "" };
    match status.state {
        LoopState::Running => {
            let _ = writeln!(out, "State:    running (next in {}s){}", status.countdown, speaking);
        }
        LoopState::Idle => {
            let _ = writeln!(out, "State:    idle{}", speaking);
        }
    }

    let config = &status.config;
    let _ = writeln!(
        out,
        "Asset:    {} | interval {} | change {} | voice {}",
        config.asset, config.schedule.interval, config.schedule.change_window, config.voice
    );

    match status.latest {
        Some(ref latest) => {
            let at = latest.at.format(format_description!("[hour]:[minute]:[second]")).unwrap_or_default();
            let quote = &latest.quote;
            let quiet = if latest.spoken { "" } else { " (not spoken)" };
            let _ = writeln!(
                out,
                "Quote:    {} ${} | 1h {} | 24h {} | 7d {} | {}",
                latest.asset.ticker(),
                quote.price,
                change_label(quote.change_1h),
                change_label(quote.change_24h),
                change_label(quote.change_7d),
                latest.movement
            );
            let _ = write!(out, "Latest:   {} at {}{}", latest.text, at, quiet);
        }
        None => {
            let _ = write!(out, "Latest:   none yet");
        }
    }

    if let Some(ref error) = status.last_error {
        let _ = write!(out, "\nError:    {}", error);
    }

    out
}

fn change_label(change: Option<f64>) -> String {
    match change {
        Some(change) => format!("{:+.2}%", change),
        None => "n/a".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::controller::loop_controller::{Announcement, LoopConfig};
    use crate::price::{PriceFetcher, PriceMovement, PriceQuote};
    use crate::speech::SpeechDriver;
    use crate::speech::testing::{self, RecordingEngine, SwappableVoices};

    fn console(registry: &VoiceRegistry) -> LoopController<PriceFetcher> {
        // Never contacted: none of these commands fetch a price.
        let fetcher = PriceFetcher::with_endpoint("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let driver = SpeechDriver::new(Arc::new(RecordingEngine::default()), registry.clone());
        LoopController::new(fetcher, driver, LoopConfig::default(), false)
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("start"), Ok(Some(Command::Start)));
        assert_eq!(parse_command("  STOP "), Ok(Some(Command::Stop)));
        assert_eq!(parse_command("speak"), Ok(Some(Command::SpeakNow)));
        assert_eq!(parse_command("voices"), Ok(Some(Command::Voices)));
        assert_eq!(parse_command("status"), Ok(Some(Command::Status)));
        assert_eq!(parse_command("help"), Ok(Some(Command::Help)));
        assert_eq!(parse_command("exit"), Ok(Some(Command::Quit)));
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_command("asset eth"), Ok(Some(Command::Asset(Asset::Ethereum))));
        assert_eq!(parse_command("interval 30"), Ok(Some(Command::Interval(PollInterval::try_from(30).unwrap()))));
        assert_eq!(parse_command("window 7d"), Ok(Some(Command::Window(ChangeWindow::SevenDays))));
        assert_eq!(parse_command("window OFF"), Ok(Some(Command::Window(ChangeWindow::Disabled))));
        assert_eq!(parse_command("voice en-gb"), Ok(Some(Command::Voice(VoiceSelection::Named("en-gb".into())))));
        assert_eq!(parse_command("voice default"), Ok(Some(Command::Voice(VoiceSelection::Default))));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_command("dance"), Err(CommandError::Unknown("dance".into())));
        assert_eq!(parse_command("asset"), Err(CommandError::MissingArgument("asset")));
        assert!(matches!(parse_command("asset monero"), Err(CommandError::InvalidArgument(_))));
        assert!(matches!(parse_command("interval 45"), Err(CommandError::InvalidArgument(_))));
        assert!(matches!(parse_command("window 2h"), Err(CommandError::InvalidArgument(_))));
        assert_eq!(parse_command("voice"), Err(CommandError::MissingArgument("voice")));
    }

    #[test]
    fn test_render_status() {
        let mut status = LoopStatus { state: LoopState::Idle, countdown: 0, config: LoopConfig::default(), latest: None, last_error: None, speaking: false };
        let text = render_status(&status);
        assert!(text.contains("idle"));
        assert!(!text.contains("speaking"));
        assert!(text.contains("Bitcoin (BTC)"));
        assert!(text.contains("none yet"));

        status.state = LoopState::Running;
        status.countdown = 42;
        status.speaking = true;
        status.last_error = Some("price API returned HTTP 429".into());
        status.latest = Some(Announcement {
            asset: Asset::Bitcoin,
            quote: PriceQuote { price: 43250.5, change_24h: Some(2.47), ..Default::default() },
            text: "BTC price is $43251".into(),
            movement: PriceMovement::First,
            spoken: true,
            at: OffsetDateTime::UNIX_EPOCH,
        });
        let text = render_status(&status);
        assert!(text.contains("next in 42s), speaking"));
        assert!(text.contains("Quote:    BTC $43250.5 | 1h n/a | 24h +2.47% | 7d n/a | first quote"));
        assert!(text.contains("BTC price is $43251 at 00:00:00"));
        assert!(text.contains("HTTP 429"));
    }

    #[tokio::test]
    async fn test_voices_command_requeries_engine() {
        let registry = VoiceRegistry::new();
        let controller = console(&registry);
        let source = SwappableVoices::default();

        assert_eq!(execute(&controller, &registry, &source, Command::Voices).await, Flow::Continue);
        assert!(registry.is_ready());
        assert!(registry.list_voices().is_empty());

        *source.voices.lock() = vec![testing::voice("en-us", "en-us")];
        execute(&controller, &registry, &source, Command::Voices).await;
        assert_eq!(*source.queries.lock(), 2);
        assert!(registry.find("en-us").is_some());
    }

    #[tokio::test]
    async fn test_config_commands_update_controller() {
        let registry = VoiceRegistry::new();
        let controller = console(&registry);
        let source = SwappableVoices::default();

        execute(&controller, &registry, &source, Command::Asset(Asset::Litecoin)).await;
        execute(&controller, &registry, &source, Command::Window(ChangeWindow::OneHour)).await;
        execute(&controller, &registry, &source, Command::Voice(VoiceSelection::Named("en-gb".into()))).await;

        let config = controller.config();
        assert_eq!(config.asset, Asset::Litecoin);
        assert_eq!(config.schedule.change_window, ChangeWindow::OneHour);
        assert_eq!(config.voice, VoiceSelection::Named("en-gb".into()));
        assert_eq!(execute(&controller, &registry, &source, Command::Quit).await, Flow::Quit);
    }
}
