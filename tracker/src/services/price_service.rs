use crate::api_client::PriceFetcher;
use crate::config::{normalize_symbols, validate_interval, validate_symbols, RefreshConfig};
use crate::error::{TrackerError, TrackerResult};
use crate::history::{BoundedHistory, DEFAULT_HISTORY_CAPACITY};
use crate::models::{PriceSnapshot, RefreshState};
use crate::observer::{ObserverRegistry, RefreshObserver, SubscriptionId};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Result of a manual refresh request.
#[derive(Debug, Clone, PartialEq)]
pub enum ManualRefresh {
    /// The fetch ran; carries the state observers were given.
    Completed(RefreshState),
    /// Another fetch was already outstanding, nothing was started.
    AlreadyInFlight,
}

/// Polls a [`PriceFetcher`] on a timer and on demand, keeping the latest
/// snapshot and a bounded history of past ones.
///
/// At most one fetch is outstanding at any time; timer ticks and
/// [`refresh_now`](Self::refresh_now) share the same in-flight flag. The
/// refresher must be started from inside a tokio runtime.
pub struct PollingRefresher {
    shared: Arc<Shared>,
    run: Option<Run>,
}

struct Shared {
    inner: RwLock<Inner>,
    in_flight: AtomicBool,
    // Signalled whenever `in_flight` is released
    idle: Notify,
    observers: ObserverRegistry,
}

struct Inner {
    config: RefreshConfig,
    state: RefreshState,
    history: BoundedHistory,
    // Bumped whenever results of an outstanding fetch must not be applied
    generation: u64,
}

/// One start..stop span.
struct Run {
    control: Arc<RunControl>,
    fetcher: Arc<dyn PriceFetcher>,
    _task: JoinHandle<()>,
}

#[derive(Default)]
struct RunControl {
    stopped: AtomicBool,
    wake: Notify,
}

impl RunControl {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl PollingRefresher {
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: RwLock::new(Inner {
                    config: RefreshConfig::default(),
                    state: RefreshState::default(),
                    history: BoundedHistory::new(capacity),
                    generation: 0,
                }),
                in_flight: AtomicBool::new(false),
                idle: Notify::new(),
                observers: ObserverRegistry::default(),
            }),
            run: None,
        }
    }

    /// Reset state, fetch once immediately, then once per `config.interval`.
    ///
    /// Calling `start` on a running refresher restarts it with the new config.
    pub async fn start(
        &mut self,
        config: RefreshConfig,
        fetcher: Arc<dyn PriceFetcher>,
    ) -> TrackerResult<()> {
        config.validate()?;
        self.stop();

        {
            let mut inner = self.shared.inner.write().await;
            inner.generation += 1;
            inner.history.clear();
            inner.state = RefreshState {
                in_flight: self.shared.in_flight.load(Ordering::SeqCst),
                ..RefreshState::default()
            };
            inner.config = config.clone();
        }

        info!(
            "Starting price polling for {} in {} ({}ms interval)",
            config.symbols.join(","),
            config.quote_currency,
            config.interval.as_millis()
        );

        let control = Arc::new(RunControl::default());
        let task = tokio::spawn(poll_loop(
            self.shared.clone(),
            fetcher.clone(),
            control.clone(),
        ));

        self.run = Some(Run {
            control,
            fetcher,
            _task: task,
        });
        Ok(())
    }

    /// Cancel the timer. A fetch already dispatched still completes and
    /// updates state, but observers are not notified. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(run) = self.run.take() {
            run.control.stopped.store(true, Ordering::SeqCst);
            run.control.wake.notify_one();
            info!("Stopping price polling");
        }
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Replace the timer period. The wait already underway keeps its old
    /// deadline; every later tick uses `interval`.
    pub async fn set_interval(&self, interval: Duration) -> TrackerResult<()> {
        validate_interval(interval)?;
        let mut inner = self.shared.inner.write().await;
        if inner.config.interval != interval {
            info!(
                "Refresh interval changed {}ms -> {}ms",
                inner.config.interval.as_millis(),
                interval.as_millis()
            );
            inner.config.interval = interval;
        }
        Ok(())
    }

    /// Replace the tracked symbols. History and current readings are dropped
    /// so series for different assets never mix; a fetch still outstanding
    /// for the old symbols is discarded when it lands.
    pub async fn set_symbols<I, S>(&self, symbols: I) -> TrackerResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let symbols = normalize_symbols(symbols);
        validate_symbols(&symbols)?;

        let mut inner = self.shared.inner.write().await;
        if inner.config.symbols == symbols {
            return Ok(());
        }

        info!("Tracked symbols changed to {}", symbols.join(","));
        inner.config.symbols = symbols;
        inner.generation += 1;
        inner.history.clear();
        inner.state.current = None;
        inner.state.previous = None;
        Ok(())
    }

    /// Fetch right now, outside the timer schedule.
    ///
    /// Returns [`ManualRefresh::AlreadyInFlight`] without fetching when a
    /// fetch is already outstanding. Dropping the returned future does not
    /// abandon the attempt; it still lands in state and reaches observers.
    pub async fn refresh_now(&self) -> TrackerResult<ManualRefresh> {
        let run = self.run.as_ref().ok_or(TrackerError::NotRunning)?;
        let Some(guard) = InFlightGuard::acquire(&self.shared) else {
            debug!("Fetch already in flight, skipping manual refresh");
            return Ok(ManualRefresh::AlreadyInFlight);
        };

        let cycle = tokio::spawn(run_cycle(guard, run.fetcher.clone(), run.control.clone()));
        let state = cycle
            .await
            .map_err(|e| TrackerError::FetchFailed(format!("refresh task failed: {e}")))?;
        Ok(ManualRefresh::Completed(state))
    }

    pub fn subscribe(&self, observer: Arc<dyn RefreshObserver>) -> SubscriptionId {
        self.shared.observers.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.observers.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.observers.len()
    }

    pub async fn state(&self) -> RefreshState {
        self.shared.inner.read().await.state.clone()
    }

    pub async fn config(&self) -> RefreshConfig {
        self.shared.inner.read().await.config.clone()
    }

    pub async fn interval(&self) -> Duration {
        self.shared.inner.read().await.config.interval
    }

    /// Chart series for `symbol` over the retained history.
    pub async fn series(&self, symbol: &str) -> Vec<Option<f64>> {
        self.shared.inner.read().await.history.to_series(symbol)
    }

    pub async fn history(&self) -> BoundedHistory {
        self.shared.inner.read().await.history.clone()
    }

    pub async fn history_len(&self) -> usize {
        self.shared.inner.read().await.history.len()
    }
}

impl Default for PollingRefresher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PollingRefresher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(shared: Arc<Shared>, fetcher: Arc<dyn PriceFetcher>, control: Arc<RunControl>) {
    let mut next_tick = Instant::now();
    let mut first_tick = true;

    loop {
        tokio::select! {
            _ = control.wake.notified() => {}
            _ = sleep_until(next_tick) => {}
        }

        if control.is_stopped() {
            break;
        }

        let tick_started = Instant::now();
        let guard = if first_tick {
            first_tick = false;
            // A fetch left over from a previous run may still hold the flag
            Some(InFlightGuard::wait_for(&shared).await)
        } else {
            InFlightGuard::acquire(&shared)
        };

        match guard {
            Some(guard) if !control.is_stopped() => {
                run_cycle(guard, fetcher.clone(), control.clone()).await;
            }
            Some(_) => break,
            None => debug!("Fetch already in flight, skipping tick"),
        }

        // Read after the cycle so an interval change applies from the next tick
        let period = shared.inner.read().await.config.interval;
        next_tick = tick_started + period;
    }

    debug!("Price polling loop exited");
}

/// One fetch attempt, start to finish. The caller must already hold the
/// in-flight flag.
async fn run_cycle(
    guard: InFlightGuard,
    fetcher: Arc<dyn PriceFetcher>,
    control: Arc<RunControl>,
) -> RefreshState {
    let shared = guard.shared.clone();

    let (config, generation) = {
        let mut inner = shared.inner.write().await;
        inner.state.in_flight = true;
        inner.state.last_attempt = Some(Utc::now());
        (inner.config.clone(), inner.generation)
    };

    let result = fetcher
        .fetch_prices(&config.symbols, &config.quote_currency)
        .await
        .and_then(|quotes| PriceSnapshot::from_quotes(Utc::now(), &config.symbols, quotes));

    let state = {
        let mut inner = shared.inner.write().await;
        if inner.generation != generation {
            debug!("Discarding fetch result for superseded config");
        } else {
            match result {
                Ok(snapshot) => {
                    debug!("Fetched prices: {:?}", snapshot.prices);
                    inner.history.push(snapshot.clone());
                    inner.state.record_success(snapshot);
                }
                Err(e) => {
                    warn!("Failed to fetch prices: {}", e);
                    inner.state.record_failure(e);
                }
            }
        }
        inner.state.in_flight = false;
        inner.state.clone()
    };
    drop(guard);

    if control.is_stopped() {
        debug!("Refresher stopped, not notifying observers");
    } else {
        shared.observers.notify(&state);
    }

    state
}

/// Holds the single in-flight slot; releasing it wakes `wait_for` callers.
struct InFlightGuard {
    shared: Arc<Shared>,
}

impl InFlightGuard {
    fn acquire(shared: &Arc<Shared>) -> Option<Self> {
        shared
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                shared: shared.clone(),
            })
    }

    async fn wait_for(shared: &Arc<Shared>) -> Self {
        loop {
            let idle = shared.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();

            if let Some(guard) = Self::acquire(shared) {
                return guard;
            }
            idle.await;
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.shared.in_flight.store(false, Ordering::Release);
        self.shared.idle.notify_waiters();
    }
}
