//! Crypto Voice - speaks cryptocurrency prices out loud on a schedule.
//!
//! Prices come from the CoinGecko simple-price API (with a synthetic fallback when it
//! is unreachable) and are spoken through espeak-ng. The loop is driven from a small
//! line-based console on stdin.

mod config;
mod controller;
mod price;
mod speech;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use config::AppConfig;
use controller::{Flow, HELP, LoopConfig, LoopController, execute, parse_command};
use price::PriceFetcher;
use speech::{EspeakEngine, SpeechDriver, VoiceRegistry, VoiceSelection};

/// How long startup waits for the voice list before falling back to the engine default.
const VOICE_READY_TIMEOUT: Duration = Duration::from_secs(3);

/// Spawn the task that reports voice list changes.
///
/// Warns when the voice the loop currently uses disappears; speech keeps working with
/// the engine default until it comes back.
///
/// # Arguments
/// * `registry` - Voice registry to watch
/// * `controller` - Loop whose configured voice is checked
///
/// # Returns
/// Join handle for the spawned task
fn spawn_voice_watch_task(registry: VoiceRegistry, controller: Arc<LoopController<PriceFetcher>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rx = registry.subscribe();
        while rx.changed().await.is_ok() {
            let count = rx.borrow_and_update().voices.len();
            debug!("Voice list changed ({} voices)", count);

            let selected = controller.config().voice;
            if let Some(id) = registry.missing(&selected) {
                warn!("⚠️  Voice '{}' is no longer available, using the engine default", id);
            }
        }
    })
}

/// Read console commands from stdin until `quit` or end of input.
async fn run_console(controller: &LoopController<PriceFetcher>, registry: &VoiceRegistry, engine: &EspeakEngine) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        if execute(controller, registry, engine, command).await == Flow::Quit {
            info!("👋 Quit requested");
            break;
        }
        debug!("Loop {:?}, {} timers armed, interval {:?}", controller.state(), controller.armed_timers(), controller.armed_interval());
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("🛑 Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        warn!("Failed to register SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("🛑 Received SIGTERM, shutting down...");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let config = AppConfig::from_args();

    // Respect RUST_LOG env var, fallback to verbose flag, default to info
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| if config.verbose { EnvFilter::try_new("debug") } else { EnvFilter::try_new("info") })?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("❌ Configuration error: {}", e);
        std::process::exit(1);
    }

    let engine = Arc::new(EspeakEngine::new(config.espeak_binary.clone()));
    let registry = VoiceRegistry::new();

    if config.list_voices {
        registry.refresh(engine.as_ref()).await;
        speech::print_voices(&registry.list_voices());
        return Ok(());
    }

    info!("🪙 Crypto Voice v{}", env!("CARGO_PKG_VERSION"));
    config.log_config();

    // Voices load in the background; the loop never blocks on them
    let voice_engine = engine.clone();
    let voice_registry = registry.clone();
    tokio::spawn(async move { voice_registry.refresh(voice_engine.as_ref()).await });

    let voice = match config.voice_selection() {
        Some(selection) => selection,
        None => match tokio::time::timeout(VOICE_READY_TIMEOUT, registry.ready()).await {
            Ok(()) => registry.default_selection(),
            Err(_) => {
                warn!("⚠️  Voice list not ready after {:?}, using the engine default", VOICE_READY_TIMEOUT);
                VoiceSelection::Default
            }
        },
    };
    info!("🗣️  Voice: {}", voice);

    let fetcher = PriceFetcher::new(&config).context("Failed to create the price fetcher")?;
    let driver = SpeechDriver::new(engine.clone(), registry.clone());
    let loop_config = LoopConfig { asset: config.asset, schedule: config.schedule(), voice };
    let controller = Arc::new(LoopController::new(fetcher, driver, loop_config, config.skip_unchanged));
    let voice_watch = spawn_voice_watch_task(registry.clone(), controller.clone());

    println!("{}", HELP);
    if config.autostart {
        controller.start();
    }

    tokio::select! {
        result = run_console(&controller, &registry, &engine) => {
            if let Err(e) = result {
                error!("❌ Console error: {}", e);
            }
        }
        _ = wait_for_shutdown() => {}
    }

    controller.shutdown().await;
    voice_watch.abort();

    info!("✅ Crypto Voice stopped");

    // A pending stdin read cannot be cancelled and would hold the runtime open
    std::process::exit(0)
}
