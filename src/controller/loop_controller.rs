//! Polling loop: fetch → format → speak on a schedule.
//!
//! The controller is a two-state machine (Idle/Running). Entering Running performs one
//! cycle right away, then arms a repeating poll timer and a one-second countdown timer.
//! Leaving Running disarms both, resets the countdown, and silences speech. A
//! configuration change while Running goes through a full stop/start so the new interval,
//! asset, and voice take effect together.
//!
//! Every scheduled cycle takes a generation number. A scheduled result is applied only
//! if no newer scheduled cycle started and the loop was not stopped while it was in
//! flight, so slow responses never overwrite fresher ones. On-demand cycles are only
//! invalidated by a stop or a configuration change.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{Asset, PollInterval, ScheduleConfig};
use crate::price::{PriceMovement, PriceQuote, QuoteSource, compare_quotes};
use crate::speech::{SpeechDriver, VoiceSelection, format_price_text};

/// Period of the countdown display timer.
const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
}

/// Everything the loop needs to know about what to announce.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoopConfig {
    pub asset: Asset,
    pub schedule: ScheduleConfig,
    pub voice: VoiceSelection,
}

/// Outcome of one completed cycle.
#[derive(Debug, Clone)]
pub struct Announcement {
    pub asset: Asset,
    pub quote: PriceQuote,
    pub text: String,
    pub movement: PriceMovement,
    pub spoken: bool,
    pub at: OffsetDateTime,
}

/// Point-in-time view for the console.
#[derive(Debug, Clone)]
pub struct LoopStatus {
    pub state: LoopState,
    pub countdown: u64,
    pub config: LoopConfig,
    pub latest: Option<Announcement>,
    pub last_error: Option<String>,
    pub speaking: bool,
}

/// Why a cycle runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleKind {
    Scheduled,
    OnDemand,
}

/// Identifies a cycle when its result comes back.
#[derive(Debug, Clone, Copy)]
struct Ticket {
    kind: CycleKind,
    epoch: u64,
    generation: u64,
}

/// Bookkeeping for discarding stale results.
#[derive(Debug, Default)]
struct CycleClock {
    epoch: u64,  // Bumped each time the loop is disarmed
    newest: u64, // Generation of the newest scheduled cycle
}

impl CycleClock {
    fn begin(&mut self, kind: CycleKind) -> Ticket {
        if kind == CycleKind::Scheduled {
            self.newest += 1;
        }
        Ticket { kind, epoch: self.epoch, generation: self.newest }
    }

    fn is_current(&self, ticket: Ticket) -> bool {
        ticket.epoch == self.epoch && (ticket.kind == CycleKind::OnDemand || ticket.generation == self.newest)
    }

    fn invalidate(&mut self) {
        self.epoch += 1;
    }
}

/// State shared between the controller and its timer tasks.
struct Shared<Q> {
    source: Q,                               // Price source
    driver: SpeechDriver,                    // Speech output
    skip_unchanged: bool,                    // Stay quiet on unchanged prices
    config: Mutex<LoopConfig>,               // Last applied configuration
    cycles: Mutex<CycleClock>,               // Guards applying results
    previous: Mutex<Option<PriceQuote>>,     // Quote of the last applied cycle
    countdown: Mutex<u64>,                   // Seconds until the next scheduled cycle
    latest: Mutex<Option<Announcement>>,     // Last applied announcement
}

/// Timers armed while Running.
struct ArmedTimers {
    token: CancellationToken,
    interval: PollInterval,
    poll: JoinHandle<()>,
    countdown: JoinHandle<()>,
}

impl ArmedTimers {
    /// Wait for both timer tasks to wind down after cancellation.
    async fn join(self) {
        let _ = self.poll.await;
        let _ = self.countdown.await;
    }
}

/// Owns the polling and countdown timers.
pub struct LoopController<Q: QuoteSource> {
    shared: Arc<Shared<Q>>,
    timers: Mutex<Option<ArmedTimers>>,
}

impl<Q: QuoteSource> LoopController<Q> {
    /// Create an idle controller.
    ///
    /// # Arguments
    /// * `source` - Where quotes come from
    /// * `driver` - Speech output
    /// * `config` - Initial asset, schedule, and voice
    /// * `skip_unchanged` - Do not speak scheduled quotes whose price did not move
    pub fn new(source: Q, driver: SpeechDriver, config: LoopConfig, skip_unchanged: bool) -> Self {
        let shared = Shared {
            source,
            driver,
            skip_unchanged,
            config: Mutex::new(config),
            cycles: Mutex::new(CycleClock::default()),
            previous: Mutex::new(None),
            countdown: Mutex::new(0),
            latest: Mutex::new(None),
        };
        Self { shared: Arc::new(shared), timers: Mutex::new(None) }
    }

    pub fn state(&self) -> LoopState {
        if self.timers.lock().is_some() { LoopState::Running } else { LoopState::Idle }
    }

    /// Number of armed timers: 2 while Running, 0 while Idle.
    pub fn armed_timers(&self) -> usize {
        if self.timers.lock().is_some() { 2 } else { 0 }
    }

    /// Period of the armed poll timer, if Running.
    pub fn armed_interval(&self) -> Option<PollInterval> {
        self.timers.lock().as_ref().map(|t| t.interval)
    }

    pub fn config(&self) -> LoopConfig {
        self.shared.config.lock().clone()
    }

    pub fn countdown(&self) -> u64 {
        *self.shared.countdown.lock()
    }

    pub fn status(&self) -> LoopStatus {
        LoopStatus {
            state: self.state(),
            countdown: self.countdown(),
            config: self.config(),
            latest: self.shared.latest.lock().clone(),
            last_error: self.shared.source.last_error(),
            speaking: self.shared.driver.is_speaking(),
        }
    }

    /// Idle → Running. Does nothing if already running.
    pub fn start(&self) {
        let mut timers = self.timers.lock();
        if timers.is_some() {
            debug!("Loop already running");
            return;
        }

        let config = self.shared.config.lock().clone();
        let interval = config.schedule.interval;
        let token = CancellationToken::new();

        *self.shared.countdown.lock() = interval.seconds();

        let poll = tokio::spawn(poll_loop(self.shared.clone(), interval, token.clone()));
        let countdown = tokio::spawn(countdown_loop(self.shared.clone(), interval, token.clone()));
        *timers = Some(ArmedTimers { token, interval, poll, countdown });

        info!("▶️  Announcing {} every {} (change: {})", config.asset, interval, config.schedule.change_window);
    }

    /// Running → Idle. Also silences speech when already idle.
    pub fn stop(&self) {
        if self.disarm().is_some() {
            info!("⏹️  Stopped");
        }
    }

    /// Apply a new configuration, restarting the loop if it is running.
    pub async fn apply_config(&self, config: LoopConfig) {
        {
            let mut current = self.shared.config.lock();
            if current.asset != config.asset {
                *self.shared.previous.lock() = None;
            }
            *current = config;
        }

        if let Some(timers) = self.disarm() {
            debug!("Restarting loop with new configuration");
            timers.join().await;
            self.start();
        }
    }

    /// Fetch and announce once, outside the schedule.
    pub async fn speak_now(&self) {
        self.shared.clone().run_cycle(CycleKind::OnDemand, CancellationToken::new()).await;
    }

    /// Disarm everything and wait for the timer tasks to finish.
    pub async fn shutdown(&self) {
        if let Some(timers) = self.disarm() {
            timers.join().await;
        }
        debug!("Loop controller shut down");
    }

    /// Cancel timers, invalidate in-flight cycles, reset the countdown, and silence speech.
    fn disarm(&self) -> Option<ArmedTimers> {
        let timers = self.timers.lock().take();
        if let Some(ref t) = timers {
            t.token.cancel();
            t.poll.abort();
            t.countdown.abort();
        }

        self.shared.cycles.lock().invalidate();
        *self.shared.countdown.lock() = 0;
        self.shared.driver.cancel();
        timers
    }
}

impl<Q: QuoteSource> Drop for LoopController<Q> {
    fn drop(&mut self) {
        if let Some(timers) = self.timers.get_mut().take() {
            timers.token.cancel();
            timers.poll.abort();
            timers.countdown.abort();
        }
    }
}

impl<Q: QuoteSource> Shared<Q> {
    /// One fetch → format → speak cycle.
    async fn run_cycle(self: Arc<Self>, kind: CycleKind, token: CancellationToken) {
        let ticket = self.cycles.lock().begin(kind);
        let config = self.config.lock().clone();

        let quote = tokio::select! {
            _ = token.cancelled() => {
                debug!("{:?} cycle cancelled before the quote arrived", kind);
                return;
            }
            quote = self.source.fetch_price(config.asset) => quote,
        };

        // Held while speaking so a concurrent stop either invalidates this cycle first
        // or cancels the utterance after it starts.
        let cycles = self.cycles.lock();
        if !cycles.is_current(ticket) || token.is_cancelled() {
            debug!("Discarding stale quote from {:?} cycle {} (newest {})", kind, ticket.generation, cycles.newest);
            return;
        }

        let movement = {
            let mut previous = self.previous.lock();
            let movement = compare_quotes(previous.as_ref(), &quote);
            *previous = Some(quote);
            movement
        };

        let text = format_price_text(config.asset.ticker(), quote.price, &quote, config.schedule.change_window);
        let spoken = !(kind == CycleKind::Scheduled && self.skip_unchanged && movement == PriceMovement::Unchanged);

        if spoken {
            info!("📢 {}", text);
            self.driver.speak(&text, &config.voice);
        } else {
            debug!("{} unchanged, staying quiet", config.asset.ticker());
        }
        drop(cycles);

        let at = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        *self.latest.lock() = Some(Announcement { asset: config.asset, quote, text, movement, spoken, at });
    }
}

/// Repeating poll timer. The first tick fires immediately.
async fn poll_loop<Q: QuoteSource>(shared: Arc<Shared<Q>>, interval: PollInterval, token: CancellationToken) {
    let mut ticker = tokio::time::interval(interval.as_duration());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                // Cycles run on their own task so a slow fetch never delays the schedule.
                tokio::spawn(shared.clone().run_cycle(CycleKind::Scheduled, token.child_token()));
            }
        }
    }
}

/// One-second countdown to the next scheduled cycle.
async fn countdown_loop<Q: QuoteSource>(shared: Arc<Shared<Q>>, interval: PollInterval, token: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + COUNTDOWN_TICK, COUNTDOWN_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let mut countdown = shared.countdown.lock();
                if !token.is_cancelled() {
                    *countdown = next_countdown(*countdown, interval.seconds());
                }
            }
        }
    }
}

/// Next countdown value: decrement, wrapping to `interval` instead of reaching zero.
pub fn next_countdown(current: u64, interval: u64) -> u64 {
    if current <= 1 { interval } else { current - 1 }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::price::ChangeWindow;
    use crate::speech::VoiceRegistry;
    use crate::speech::testing::{RecordingEngine, SpeechEngine};

    /// Quote source returning 100, 101, 102, ... with optional per-call delays.
    #[derive(Default)]
    struct ScriptedSource {
        calls: AtomicUsize,
        delays: Mutex<VecDeque<Duration>>,
        constant: bool,
    }

    impl ScriptedSource {
        fn with_delays(delays: &[u64]) -> Self {
            Self { delays: Mutex::new(delays.iter().map(|s| Duration::from_secs(*s)).collect()), ..Default::default() }
        }
    }

    impl QuoteSource for ScriptedSource {
        async fn fetch_price(&self, _asset: Asset) -> PriceQuote {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delays.lock().pop_front();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let price = if self.constant { 100.0 } else { 100.0 + call as f64 };
            PriceQuote { price, change_1h: None, change_24h: Some(1.0), change_7d: None }
        }

        fn last_error(&self) -> Option<String> {
            None
        }
    }

    fn loop_config(interval: u64, window: ChangeWindow) -> LoopConfig {
        LoopConfig {
            asset: Asset::Solana,
            schedule: ScheduleConfig { interval: PollInterval::try_from(interval).unwrap(), change_window: window },
            voice: VoiceSelection::Default,
        }
    }

    fn controller(source: ScriptedSource, config: LoopConfig, skip_unchanged: bool) -> (Arc<RecordingEngine>, LoopController<ScriptedSource>) {
        let engine = Arc::new(RecordingEngine::default());
        let driver = SpeechDriver::new(engine.clone(), VoiceRegistry::new());
        (engine, LoopController::new(source, driver, config, skip_unchanged))
    }

    async fn advance(millis: u64) {
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    #[test]
    fn test_next_countdown_wraps() {
        assert_eq!(next_countdown(10, 10), 9);
        assert_eq!(next_countdown(2, 10), 1);
        assert_eq!(next_countdown(1, 10), 10);
        assert_eq!(next_countdown(0, 10), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_then_stop_leaves_nothing_armed() {
        let (engine, controller) = controller(ScriptedSource::default(), loop_config(10, ChangeWindow::Disabled), false);

        controller.start();
        assert_eq!(controller.state(), LoopState::Running);
        assert_eq!(controller.armed_timers(), 2);

        controller.stop();
        assert_eq!(controller.state(), LoopState::Idle);
        assert_eq!(controller.armed_timers(), 0);
        assert_eq!(controller.countdown(), 0);
        assert!(!engine.is_speaking());

        advance(60_000).await;
        assert!(engine.spoken.lock().is_empty());
        assert!(!engine.is_speaking());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_cycle_is_immediate_then_repeats() {
        let (engine, controller) = controller(ScriptedSource::default(), loop_config(10, ChangeWindow::OneDay), false);

        controller.start();
        advance(1).await;
        assert_eq!(engine.texts(), vec!["SOL price is $100, up 1.0 percent in 24 hours"]);

        advance(10_000).await;
        assert_eq!(engine.texts().len(), 2);
        assert_eq!(engine.texts()[1], "SOL price is $101, up 1.0 percent in 24 hours");

        let status = controller.status();
        assert_eq!(status.latest.unwrap().movement, PriceMovement::Up);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_change_rearms_single_timer() {
        let source = ScriptedSource::default();
        let (_engine, controller) = controller(source, loop_config(10, ChangeWindow::Disabled), false);

        controller.start();
        advance(1).await;

        controller.apply_config(loop_config(30, ChangeWindow::Disabled)).await;
        assert_eq!(controller.armed_timers(), 2);
        assert_eq!(controller.armed_interval(), Some(PollInterval::try_from(30).unwrap()));

        // Initial cycle, immediate cycle after restart, then one more at +30s.
        advance(35_000).await;
        assert_eq!(controller.shared.source.calls.load(Ordering::SeqCst), 3);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_change_while_idle_does_not_start() {
        let (engine, controller) = controller(ScriptedSource::default(), loop_config(10, ChangeWindow::Disabled), false);

        controller.apply_config(loop_config(60, ChangeWindow::SevenDays)).await;
        assert_eq!(controller.state(), LoopState::Idle);
        assert_eq!(controller.config().schedule.change_window, ChangeWindow::SevenDays);

        advance(120_000).await;
        assert!(engine.spoken.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_wraps_to_interval() {
        let (_engine, controller) = controller(ScriptedSource::default(), loop_config(10, ChangeWindow::Disabled), false);

        controller.start();
        assert_eq!(controller.countdown(), 10);

        advance(1_500).await;
        assert_eq!(controller.countdown(), 9);

        advance(8_000).await;
        assert_eq!(controller.countdown(), 1);

        advance(1_000).await;
        assert_eq!(controller.countdown(), 10);

        controller.stop();
        assert_eq!(controller.countdown(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_is_discarded() {
        // The first fetch takes 25s; the cycles at 10s and 20s answer immediately.
        let (engine, controller) = controller(ScriptedSource::with_delays(&[25]), loop_config(10, ChangeWindow::Disabled), false);

        controller.start();
        advance(26_000).await;

        assert_eq!(engine.texts(), vec!["SOL price is $101", "SOL price is $102"]);
        assert_eq!(controller.status().latest.unwrap().quote.price, 102.0);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_in_flight_fetch() {
        let (engine, controller) = controller(ScriptedSource::with_delays(&[5]), loop_config(10, ChangeWindow::Disabled), false);

        controller.start();
        advance(1).await;
        controller.stop();

        advance(30_000).await;
        assert!(engine.spoken.lock().is_empty());
        assert!(controller.status().latest.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_speak_now_while_idle() {
        let (engine, controller) = controller(ScriptedSource::default(), loop_config(10, ChangeWindow::Disabled), false);

        controller.speak_now().await;
        assert_eq!(engine.texts(), vec!["SOL price is $100"]);
        assert_eq!(controller.armed_timers(), 0);
    }

    #[test]
    fn test_cycle_clock_tickets() {
        let mut clock = CycleClock::default();
        let first = clock.begin(CycleKind::Scheduled);
        let on_demand = clock.begin(CycleKind::OnDemand);
        let second = clock.begin(CycleKind::Scheduled);

        assert!(!clock.is_current(first));
        assert!(clock.is_current(second));
        assert!(clock.is_current(on_demand));

        clock.invalidate();
        assert!(!clock.is_current(second));
        assert!(!clock.is_current(on_demand));
    }

    #[tokio::test(start_paused = true)]
    async fn test_speak_now_survives_overlapping_tick() {
        // Cycle at 0s answers at once; the on-demand fetch started at 5s takes 8s and
        // the scheduled cycle at 10s answers at once.
        let (engine, controller) = controller(ScriptedSource::with_delays(&[0, 8]), loop_config(10, ChangeWindow::Disabled), false);

        controller.start();
        advance(5_000).await;
        tokio::join!(controller.speak_now(), advance(9_000));

        assert_eq!(engine.texts(), vec!["SOL price is $100", "SOL price is $102", "SOL price is $101"]);
        assert_eq!(controller.status().latest.unwrap().movement, PriceMovement::Down);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_on_demand_fetch() {
        let (engine, controller) = controller(ScriptedSource::with_delays(&[5]), loop_config(10, ChangeWindow::Disabled), false);

        tokio::join!(controller.speak_now(), async {
            advance(1_000).await;
            controller.stop();
        });

        assert!(engine.spoken.lock().is_empty());
        assert!(controller.status().latest.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_unchanged_stays_quiet() {
        let source = ScriptedSource { constant: true, ..Default::default() };
        let (engine, controller) = controller(source, loop_config(10, ChangeWindow::Disabled), true);

        controller.start();
        advance(25_000).await;

        assert_eq!(engine.texts().len(), 1);
        let latest = controller.status().latest.unwrap();
        assert_eq!(latest.movement, PriceMovement::Unchanged);
        assert!(!latest.spoken);

        // On-demand announcements are always spoken.
        controller.speak_now().await;
        assert_eq!(engine.texts().len(), 2);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_asset_change_uses_new_ticker_and_resets_previous() {
        let (engine, controller) = controller(ScriptedSource::default(), loop_config(10, ChangeWindow::Disabled), false);

        controller.start();
        advance(1).await;

        let mut config = loop_config(10, ChangeWindow::Disabled);
        config.asset = Asset::Ethereum;
        controller.apply_config(config).await;
        advance(1).await;

        assert_eq!(engine.texts().last().unwrap(), "ETH price is $101");
        assert_eq!(controller.status().latest.unwrap().movement, PriceMovement::First);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_disarms_everything() {
        let (engine, controller) = controller(ScriptedSource::default(), loop_config(10, ChangeWindow::Disabled), false);

        controller.start();
        advance(1).await;
        assert!(engine.is_speaking());
        assert!(controller.status().speaking);

        controller.shutdown().await;
        assert_eq!(controller.armed_timers(), 0);
        assert!(!engine.is_speaking());
    }
}
