//! Two-cadence synchronizer for the dashboard cache.
//!
//! A fast cycle pulls live traffic state; a slow cycle pulls metrics and the
//! dashboard summary together. The cycles are independent timers and never
//! wait on each other. Every fetch failure is caught, flattened to a message
//! on its own channel, and the cycle carries on at its next tick.
//!
//! Results are only committed while the run that issued them is still current:
//! after `stop()` (or a restart) late responses are dropped.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::{Fault, Snapshot, SnapshotCache};
use crate::config::SyncConfig;
use crate::protocol::{
    ControlAction, DashboardSummary, MetricsSnapshot, Strategy, TrafficState,
};
use crate::provider::DataProvider;
use crate::request::{Channel, Demand, InFlight, InFlightGuard};

/// Observer for cache updates.
///
/// Callbacks run on the task that committed the value, after the cache lock has
/// been released. They fire only for committed results.
pub trait SyncListener: Send + Sync {
    fn on_state_update(&self, _state: &Arc<TrafficState>) {}

    fn on_metrics_update(&self, _metrics: &Arc<MetricsSnapshot>) {}

    fn on_summary_update(&self, _summary: &Arc<DashboardSummary>) {}

    fn on_strategy_update(&self, _strategy: Strategy) {}

    fn on_fault(&self, _fault: &Fault) {}
}

struct NoopListener;

impl SyncListener for NoopListener {}

/// Failure of an operator-issued write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("control action failed: {0}")]
    Control(String),
    #[error("strategy update failed: {0}")]
    Strategy(String),
}

struct Shared {
    cache: SnapshotCache,
    /// Bumped on every start and stop; commits must match the epoch they began in.
    epoch: u64,
    stopped: bool,
    /// Pending-fetch slots of the current run. Replaced on start so requests
    /// left over from a previous run cannot block the new one.
    flight: Arc<InFlight>,
}

/// What a fetch is stamped with when it is issued.
struct Run {
    epoch: u64,
    flight: Arc<InFlight>,
}

struct Inner {
    provider: Arc<dyn DataProvider>,
    listener: Arc<dyn SyncListener>,
    shared: RwLock<Shared>,
}

impl Inner {
    /// The run to stamp a new fetch with, or `None` once stopped.
    fn ticket(&self) -> Option<Run> {
        let shared = self.shared.read();
        (!shared.stopped).then(|| Run {
            epoch: shared.epoch,
            flight: Arc::clone(&shared.flight),
        })
    }

    fn is_current(&self, epoch: u64) -> bool {
        let shared = self.shared.read();
        !shared.stopped && shared.epoch == epoch
    }

    fn commit<T>(&self, epoch: u64, f: impl FnOnce(&mut SnapshotCache) -> T) -> Option<T> {
        let mut shared = self.shared.write();
        if shared.stopped || shared.epoch != epoch {
            return None;
        }
        Some(f(&mut shared.cache))
    }

    fn fail(&self, epoch: u64, fault: Fault) {
        if self.commit(epoch, |cache| cache.record_fault(&fault)).is_none() {
            debug!("discarding late {} failure: {}", fault.channel, fault.message);
            return;
        }
        warn!("{fault}");
        self.listener.on_fault(&fault);
    }

    /// Claim `channel` for a new fetch. A busy slot refuses scheduled ticks
    /// and records eager demands for its holder.
    fn begin<'r>(&self, run: &'r Run, channel: Channel, demand: Demand) -> Option<InFlightGuard<'r>> {
        let guard = run.flight.try_begin(channel, demand);
        if guard.is_none() {
            match demand {
                Demand::Scheduled => debug!("{channel} fetch still pending; skipping tick"),
                Demand::Eager => debug!("{channel} fetch still pending; will fetch again when it lands"),
            }
        }
        guard
    }

    /// Called after each landed fetch: `true` if a write asked for fresh data
    /// meanwhile and the run is still current.
    fn again(&self, run: &Run, guard: &mut InFlightGuard<'_>, channel: Channel) -> bool {
        if !guard.finish() || !self.is_current(run.epoch) {
            return false;
        }
        debug!("{channel} may predate a write; fetching again");
        true
    }

    async fn refresh_state(&self, demand: Demand) {
        let Some(run) = self.ticket() else {
            return;
        };
        let Some(mut guard) = self.begin(&run, Channel::State, demand) else {
            return;
        };
        loop {
            match self.provider.fetch_state().await {
                Ok(state) => match self.commit(run.epoch, |cache| cache.commit_state(state)) {
                    Some(state) => self.listener.on_state_update(&state),
                    None => debug!("discarding late state response"),
                },
                Err(err) => self.fail(run.epoch, Fault::new(Channel::State, err.to_string())),
            }
            if !self.again(&run, &mut guard, Channel::State) {
                break;
            }
        }
    }

    async fn refresh_metrics(&self, demand: Demand) {
        let Some(run) = self.ticket() else {
            return;
        };
        let Some(mut guard) = self.begin(&run, Channel::Metrics, demand) else {
            return;
        };
        loop {
            match self.provider.fetch_metrics().await {
                Ok(metrics) => {
                    if let Some(metrics) = self.commit(run.epoch, |cache| cache.commit_metrics(metrics)) {
                        self.listener.on_metrics_update(&metrics);
                    }
                }
                Err(err) => self.fail(run.epoch, Fault::new(Channel::Metrics, err.to_string())),
            }
            if !self.again(&run, &mut guard, Channel::Metrics) {
                break;
            }
        }
    }

    async fn refresh_summary(&self, demand: Demand) {
        let Some(run) = self.ticket() else {
            return;
        };
        let Some(mut guard) = self.begin(&run, Channel::Summary, demand) else {
            return;
        };
        loop {
            match self.provider.fetch_summary().await {
                Ok(summary) => {
                    if let Some(summary) = self.commit(run.epoch, |cache| cache.commit_summary(summary)) {
                        self.listener.on_summary_update(&summary);
                    }
                }
                Err(err) => self.fail(run.epoch, Fault::new(Channel::Summary, err.to_string())),
            }
            if !self.again(&run, &mut guard, Channel::Summary) {
                break;
            }
        }
    }

    async fn refresh_slow(&self, demand: Demand) {
        tokio::join!(self.refresh_metrics(demand), self.refresh_summary(demand));
    }

    async fn refresh_settings(&self, demand: Demand) {
        let Some(run) = self.ticket() else {
            return;
        };
        let Some(mut guard) = self.begin(&run, Channel::Settings, demand) else {
            return;
        };
        loop {
            match self.provider.fetch_settings().await {
                Ok(settings) => {
                    let strategy = settings.strategy;
                    let committed = self.commit(run.epoch, |cache| {
                        cache.commit_strategy(Channel::Settings, strategy)
                    });
                    if committed.is_some() {
                        self.listener.on_strategy_update(strategy);
                    }
                }
                Err(err) => self.fail(run.epoch, Fault::new(Channel::Settings, err.to_string())),
            }
            if !self.again(&run, &mut guard, Channel::Settings) {
                break;
            }
        }
    }

    async fn refresh_all(&self, demand: Demand) {
        tokio::join!(self.refresh_state(demand), self.refresh_slow(demand));
    }
}

#[derive(Debug, Copy, Clone)]
enum Cycle {
    Fast,
    Slow,
}

fn spawn_cycle(inner: Arc<Inner>, cycle: Cycle, period: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            // The first tick completes immediately.
            ticker.tick().await;
            let inner = Arc::clone(&inner);
            // Detached: a slow response must not hold up the timer.
            tokio::spawn(async move {
                match cycle {
                    Cycle::Fast => inner.refresh_state(Demand::Scheduled).await,
                    Cycle::Slow => inner.refresh_slow(Demand::Scheduled).await,
                }
            });
        }
    })
}

/// Keeps the dashboard cache in step with a [`DataProvider`].
///
/// Must be started from within a tokio runtime.
pub struct Synchronizer {
    inner: Arc<Inner>,
    config: SyncConfig,
    cycles: Mutex<Vec<JoinHandle<()>>>,
}

impl Synchronizer {
    pub fn new(provider: Arc<dyn DataProvider>, config: SyncConfig) -> Self {
        Self::with_listener(provider, config, Arc::new(NoopListener))
    }

    pub fn with_listener(
        provider: Arc<dyn DataProvider>,
        config: SyncConfig,
        listener: Arc<dyn SyncListener>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                listener,
                shared: RwLock::new(Shared {
                    cache: SnapshotCache::new(),
                    epoch: 0,
                    stopped: false,
                    flight: Arc::new(InFlight::new()),
                }),
            }),
            config: config.sanitized(),
            cycles: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Start both polling cycles. Each fires once immediately; settings are
    /// fetched once. Calling `start` while running is a no-op.
    pub fn start(&self) {
        let mut cycles = self.cycles.lock();
        if !cycles.is_empty() {
            debug!("synchronizer already running");
            return;
        }
        {
            let mut shared = self.inner.shared.write();
            shared.stopped = false;
            shared.epoch += 1;
            shared.flight = Arc::new(InFlight::new());
        }

        info!(
            "synchronizer starting (fast={:?}, slow={:?})",
            self.config.fast_period, self.config.slow_period
        );
        cycles.push(spawn_cycle(
            Arc::clone(&self.inner),
            Cycle::Fast,
            self.config.fast_period,
        ));
        cycles.push(spawn_cycle(
            Arc::clone(&self.inner),
            Cycle::Slow,
            self.config.slow_period,
        ));

        if self.config.fetch_settings_on_start {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.refresh_settings(Demand::Scheduled).await });
        }
    }

    /// Cancel both cycles. Requests already in flight run to completion but
    /// their results are discarded.
    pub fn stop(&self) {
        let mut cycles = self.cycles.lock();
        for handle in cycles.drain(..) {
            handle.abort();
        }
        let mut shared = self.inner.shared.write();
        if !shared.stopped {
            info!("synchronizer stopped");
        }
        shared.stopped = true;
        shared.epoch += 1;
    }

    pub fn is_running(&self) -> bool {
        !self.cycles.lock().is_empty()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.shared.read().cache.snapshot().clone()
    }

    /// Message of the most severe active fault.
    pub fn last_error(&self) -> Option<String> {
        self.last_fault().map(|f| f.to_string())
    }

    pub fn last_fault(&self) -> Option<Fault> {
        self.inner.shared.read().cache.snapshot().last_error()
    }

    pub fn strategy(&self) -> Option<Strategy> {
        self.inner.shared.read().cache.snapshot().strategy
    }

    pub fn revision(&self, channel: Channel) -> u64 {
        self.inner.shared.read().cache.revision(channel)
    }

    // Manual refreshes are eager: if a fetch is already pending they return at
    // once and the pending fetch is followed by one more.

    pub async fn refresh_state(&self) {
        self.inner.refresh_state(Demand::Eager).await;
    }

    pub async fn refresh_slow(&self) {
        self.inner.refresh_slow(Demand::Eager).await;
    }

    pub async fn refresh_settings(&self) {
        self.inner.refresh_settings(Demand::Eager).await;
    }

    /// Out-of-schedule refresh of state, metrics and summary.
    pub async fn refresh_now(&self) {
        self.inner.refresh_all(Demand::Eager).await;
    }

    /// Dispatch a control action. On success the cache is refreshed eagerly;
    /// on failure nothing is refreshed and the control channel is flagged.
    pub async fn send_control(&self, action: ControlAction) -> Result<ControlAction, SyncError> {
        let epoch = self.inner.ticket().map(|run| run.epoch);
        match self.inner.provider.send_control(action).await {
            Ok(ack) => {
                info!("control {} applied to {}", ack.action, ack.intersection);
                if let Some(epoch) = epoch {
                    self.inner.commit(epoch, |cache| cache.commit_write());
                }
                self.refresh_now().await;
                Ok(ack)
            }
            Err(err) => {
                let message = err.to_string();
                if let Some(epoch) = epoch {
                    self.inner.fail(epoch, Fault::new(Channel::Control, message.clone()));
                }
                Err(SyncError::Control(message))
            }
        }
    }

    /// Switch between AI and manual optimization. Refreshes eagerly on success.
    pub async fn set_strategy(&self, ai_enabled: bool) -> Result<Strategy, SyncError> {
        let wanted = Strategy::from_enabled(ai_enabled);
        let epoch = self.inner.ticket().map(|run| run.epoch);
        match self.inner.provider.update_settings(wanted).await {
            Ok(settings) => {
                let strategy = settings.strategy;
                info!("optimization strategy is now {strategy}");
                let committed = epoch.and_then(|epoch| {
                    self.inner
                        .commit(epoch, |cache| cache.commit_strategy(Channel::Control, strategy))
                });
                if committed.is_some() {
                    self.inner.listener.on_strategy_update(strategy);
                }
                self.refresh_now().await;
                Ok(strategy)
            }
            Err(err) => {
                let message = err.to_string();
                if let Some(epoch) = epoch {
                    self.inner.fail(epoch, Fault::new(Channel::Control, message.clone()));
                }
                Err(SyncError::Strategy(message))
            }
        }
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        for handle in self.cycles.get_mut().drain(..) {
            handle.abort();
        }
    }
}
