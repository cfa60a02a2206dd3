//! Adaptive background polling.
//!
//! A [`Poller`] repeatedly runs a [`Refresh`] operation on its own timer,
//! picking the short or long interval from a pending source, skipping work
//! while the host surface is hidden and never running two refreshes at once.

mod config;
mod visibility;

pub use config::{interval_from_millis, PollerConfig, DEFAULT_INTERVAL, DEFAULT_PENDING_INTERVAL};
pub use visibility::{AlwaysVisible, Visibility, VisibilityHandle};

use anyhow::Result;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[async_trait]
pub trait Refresh: Send + Sync + 'static {
    async fn refresh(&self) -> Result<()>;
}

#[async_trait]
impl<F, Fut> Refresh for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn refresh(&self) -> Result<()> {
        (self)().await
    }
}

/// Reports whether work is still in progress. Read on every scheduling
/// decision; must not call back into the poller.
pub enum Pending {
    Never,
    #[allow(dead_code)]
    Predicate(Box<dyn Fn() -> bool + Send + Sync>),
    /// Changes to the value reschedule the next wake-up immediately.
    Watch(watch::Receiver<bool>),
}

impl Pending {
    #[allow(dead_code)]
    pub fn predicate(f: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Pending::Predicate(Box::new(f))
    }

    fn is_pending(&self) -> bool {
        match self {
            Pending::Never => false,
            Pending::Predicate(f) => f(),
            Pending::Watch(rx) => *rx.borrow(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStatus {
    pub active: bool,
    pub paused: bool,
    pub running: bool,
}

struct State {
    active: bool,
    paused: bool,
    running: bool,
    interval: Duration,
    pending_interval: Duration,
    timer: Option<JoinHandle<()>>,
    // Bumped on every cancel so a timer that already woke up cannot act.
    generation: u64,
    consecutive_failures: u32,
}

impl State {
    fn status(&self) -> PollerStatus {
        PollerStatus {
            active: self.active,
            paused: self.paused,
            running: self.running,
        }
    }

    fn is_ticking(&self) -> bool {
        self.active && !self.paused
    }

    fn clear_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }
}

struct Shared {
    state: Mutex<State>,
    refresh: Box<dyn Refresh>,
    pending: Pending,
    visibility: Arc<dyn Visibility>,
    immediate: bool,
    runtime: Handle,
    status_tx: watch::Sender<PollerStatus>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &State) {
        let status = state.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    fn resolve_interval(&self, state: &State) -> Duration {
        config::resolve_interval(
            state.interval,
            state.pending_interval,
            self.pending.is_pending(),
        )
    }
}

/// Replaces whatever wake-up is outstanding. `None` uses the freshly
/// resolved interval.
fn schedule(shared: &Arc<Shared>, state: &mut State, delay: Option<Duration>) {
    state.clear_timer();
    if !state.is_ticking() {
        return;
    }

    let delay = delay.unwrap_or_else(|| shared.resolve_interval(state));
    let generation = state.generation;
    let task_shared = Arc::clone(shared);

    tracing::trace!(delay_ms = delay.as_millis() as u64, "Scheduling next poll");
    state.timer = Some(shared.runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        tick(task_shared, generation).await;
    }));
}

async fn tick(shared: Arc<Shared>, generation: u64) {
    {
        let mut state = shared.lock();
        if state.generation != generation {
            return;
        }
        // Detach rather than abort: stop() must not cancel the refresh below.
        state.timer = None;

        if !state.is_ticking() {
            return;
        }

        if shared.visibility.is_hidden() {
            tracing::debug!("Surface hidden, deferring refresh");
            schedule(&shared, &mut state, None);
            return;
        }

        if state.running {
            tracing::debug!("Refresh still in flight, skipping tick");
            schedule(&shared, &mut state, None);
            return;
        }

        state.running = true;
        shared.publish(&state);
    }

    let outcome = AssertUnwindSafe(shared.refresh.refresh())
        .catch_unwind()
        .await;

    let mut state = shared.lock();
    state.running = false;

    match outcome {
        Ok(Ok(())) => {
            if state.consecutive_failures > 0 {
                tracing::info!(
                    failures = state.consecutive_failures,
                    "Refresh recovered after failures"
                );
            }
            state.consecutive_failures = 0;
        }
        Ok(Err(e)) => {
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            tracing::warn!(
                error = %format!("{e:#}"),
                consecutive_failures = state.consecutive_failures,
                "Refresh failed, polling continues"
            );
        }
        Err(_) => {
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            tracing::error!(
                consecutive_failures = state.consecutive_failures,
                "Refresh panicked, polling continues"
            );
        }
    }

    schedule(&shared, &mut state, None);
    shared.publish(&state);
}

async fn watch_visibility(shared: Weak<Shared>, mut hidden_rx: watch::Receiver<bool>) {
    hidden_rx.borrow_and_update();

    while hidden_rx.changed().await.is_ok() {
        if *hidden_rx.borrow_and_update() {
            continue;
        }

        let Some(shared) = shared.upgrade() else {
            break;
        };
        let mut state = shared.lock();
        if state.is_ticking() {
            tracing::debug!("Surface visible again, refreshing now");
            schedule(&shared, &mut state, Some(Duration::ZERO));
        }
    }
}

async fn watch_pending(shared: Weak<Shared>, mut pending_rx: watch::Receiver<bool>) {
    pending_rx.borrow_and_update();

    while pending_rx.changed().await.is_ok() {
        let pending = *pending_rx.borrow_and_update();

        let Some(shared) = shared.upgrade() else {
            break;
        };
        let mut state = shared.lock();
        if state.is_ticking() {
            tracing::debug!(pending, "Pending state changed, rescheduling");
            schedule(&shared, &mut state, None);
        }
    }
}

pub struct PollerBuilder {
    refresh: Box<dyn Refresh>,
    config: PollerConfig,
    pending: Pending,
    visibility: Option<Arc<dyn Visibility>>,
}

impl PollerBuilder {
    pub fn config(mut self, config: PollerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn pending(mut self, pending: Pending) -> Self {
        self.pending = pending;
        self
    }

    pub fn visibility(mut self, visibility: Arc<dyn Visibility>) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Attaches the poller to the current Tokio runtime and, when
    /// `auto_start` is set, starts it.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn spawn(self) -> Poller {
        let runtime = Handle::current();
        let visibility = self
            .visibility
            .unwrap_or_else(|| Arc::new(AlwaysVisible::new()));
        let (status_tx, _status_rx) = watch::channel(PollerStatus::default());

        let pending_rx = match &self.pending {
            Pending::Watch(rx) => Some(rx.clone()),
            _ => None,
        };

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                active: false,
                paused: false,
                running: false,
                interval: self.config.interval,
                pending_interval: self.config.pending_interval,
                timer: None,
                generation: 0,
                consecutive_failures: 0,
            }),
            refresh: self.refresh,
            pending: self.pending,
            visibility: Arc::clone(&visibility),
            immediate: self.config.immediate,
            runtime: runtime.clone(),
            status_tx,
        });

        let mut watchers = vec![runtime.spawn(watch_visibility(
            Arc::downgrade(&shared),
            visibility.subscribe(),
        ))];
        if let Some(rx) = pending_rx {
            watchers.push(runtime.spawn(watch_pending(Arc::downgrade(&shared), rx)));
        }

        let poller = Poller { shared, watchers };
        if self.config.auto_start {
            poller.start();
        }
        poller
    }
}

/// Handle to a running poll loop. Dropping it stops polling for good.
pub struct Poller {
    shared: Arc<Shared>,
    watchers: Vec<JoinHandle<()>>,
}

impl Poller {
    pub fn builder(refresh: impl Refresh) -> PollerBuilder {
        PollerBuilder {
            refresh: Box::new(refresh),
            config: PollerConfig::default(),
            pending: Pending::Never,
            visibility: None,
        }
    }

    pub fn start(&self) {
        let mut state = self.shared.lock();
        if state.active {
            return;
        }

        state.active = true;
        state.paused = false;
        let delay = self.shared.immediate.then_some(Duration::ZERO);
        schedule(&self.shared, &mut state, delay);
        self.shared.publish(&state);
        tracing::debug!("Poller started");
    }

    /// Stops polling. A refresh already in flight runs to completion but
    /// does not schedule another.
    pub fn stop(&self) {
        let mut state = self.shared.lock();
        let was_active = state.active;

        state.active = false;
        state.paused = false;
        state.clear_timer();
        self.shared.publish(&state);

        if was_active {
            tracing::debug!("Poller stopped");
        }
    }

    pub fn pause(&self) {
        let mut state = self.shared.lock();
        if !state.is_ticking() {
            return;
        }

        state.paused = true;
        state.clear_timer();
        self.shared.publish(&state);
        tracing::debug!("Poller paused");
    }

    pub fn resume(&self) {
        let mut state = self.shared.lock();
        if !state.active || !state.paused {
            return;
        }

        state.paused = false;
        let delay = self.shared.immediate.then_some(Duration::ZERO);
        schedule(&self.shared, &mut state, delay);
        self.shared.publish(&state);
        tracing::debug!("Poller resumed");
    }

    pub fn set_interval(&self, interval: Duration) {
        let mut state = self.shared.lock();
        if state.interval == interval {
            return;
        }
        state.interval = interval;
        if state.is_ticking() {
            schedule(&self.shared, &mut state, None);
        }
    }

    pub fn set_pending_interval(&self, interval: Duration) {
        let mut state = self.shared.lock();
        if state.pending_interval == interval {
            return;
        }
        state.pending_interval = interval;
        if state.is_ticking() {
            schedule(&self.shared, &mut state, None);
        }
    }

    #[allow(dead_code)]
    pub fn is_active(&self) -> bool {
        self.shared.lock().active
    }

    #[allow(dead_code)]
    pub fn is_paused(&self) -> bool {
        self.shared.lock().paused
    }

    #[allow(dead_code)]
    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    pub fn status(&self) -> PollerStatus {
        self.shared.lock().status()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollerStatus> {
        self.shared.status_tx.subscribe()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        for watcher in &self.watchers {
            watcher.abort();
        }
        self.stop();
    }
}
