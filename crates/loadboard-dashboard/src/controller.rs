//! Dashboard lifecycle controller
//!
//! Owns the view state and drives it: one refresh on activation, then a
//! periodic refresh loop until deactivation. Refreshes are numbered; only the
//! newest one may write its result, and nothing is written once the
//! controller is inactive. Renderers observe the state through a
//! [`tokio::sync::watch`] channel.

use crate::error::{DashboardError, DashboardResult};
use crate::fetcher::DashboardFetcher;
use crate::planner;
use crate::presentation::{self, TimeFormatter};
use crate::service::{ListAction, Services, Severity};
use crate::state::{DashboardState, DashboardStats};
use chrono::{NaiveDate, Utc};
use loadboard_core::{DashboardConfig, DateRange, LoadingState, StatTile};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Message shown after a successful manual refresh
pub const REFRESHED_MESSAGE: &str = "Dashboard refreshed";

/// Message shown when a refresh fails
pub const FAILED_MESSAGE: &str = "Failed to load dashboard data";

/// What started a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshTrigger {
    /// Activation
    Initial,
    /// User request; success is announced
    Manual,
    /// Periodic timer
    Interval,
    /// Backend change signal
    Realtime,
    /// Date range edit
    RangeChange,
}

impl fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Initial => "initial",
            Self::Manual => "manual",
            Self::Interval => "interval",
            Self::Realtime => "realtime",
            Self::RangeChange => "range_change",
        })
    }
}

/// Fate of a completed refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshOutcome {
    /// Result written to the view state
    Applied,
    /// A newer refresh started meanwhile; result dropped
    Superseded,
    /// The controller was deactivated meanwhile; result dropped
    Inactive,
}

/// Queues refreshes on a running controller
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    tx: mpsc::Sender<RefreshTrigger>,
}

impl RefreshHandle {
    /// Ask the refresh loop for a refresh
    ///
    /// Returns `false` when a request is already pending, which then covers
    /// this one too.
    pub fn request(&self, trigger: RefreshTrigger) -> bool {
        self.tx.try_send(trigger).is_ok()
    }
}

#[derive(Default)]
struct Lifecycle {
    token: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    services: Services,
    fetcher: DashboardFetcher,
    formatter: TimeFormatter,
    interval: Duration,
    state: watch::Sender<DashboardState>,
    generation: AtomicU64,
    active: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
    requests_tx: mpsc::Sender<RefreshTrigger>,
    requests_rx: tokio::sync::Mutex<mpsc::Receiver<RefreshTrigger>>,
}

/// Instance-scoped dashboard controller
///
/// Cheap to clone; clones share the same state and lifecycle. The refresh
/// loop keeps the controller alive until [`Self::deactivate`] or
/// [`Self::shutdown`] is called.
#[derive(Clone)]
pub struct DashboardController {
    inner: Arc<Inner>,
}

impl fmt::Debug for DashboardController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DashboardController")
            .field("fetcher", &self.inner.fetcher)
            .field("interval", &self.inner.interval)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl DashboardController {
    /// Build a controller over `services`
    ///
    /// # Errors
    ///
    /// Returns an error if the configured date range or display offset is
    /// invalid.
    pub fn new(services: Services, config: &DashboardConfig) -> DashboardResult<Self> {
        let range = config.range.resolve()?;
        let formatter = TimeFormatter::from_config(&config.display)?;
        let fetcher = DashboardFetcher::new(
            Arc::clone(&services.query),
            config.tiles.clone(),
            config.refresh.recent_limit,
        );
        Ok(Self::with_parts(
            services,
            fetcher,
            formatter,
            config.refresh.interval(),
            range,
        ))
    }

    /// Build a controller from already constructed parts
    #[must_use]
    pub fn with_parts(
        services: Services,
        fetcher: DashboardFetcher,
        formatter: TimeFormatter,
        interval: Duration,
        range: DateRange,
    ) -> Self {
        let (state, _) = watch::channel(DashboardState::new(range));
        let (requests_tx, requests_rx) = mpsc::channel(1);
        Self {
            inner: Arc::new(Inner {
                services,
                fetcher,
                formatter,
                interval,
                state,
                generation: AtomicU64::new(0),
                active: AtomicBool::new(false),
                lifecycle: Mutex::new(Lifecycle::default()),
                requests_tx,
                requests_rx: tokio::sync::Mutex::new(requests_rx),
            }),
        }
    }

    /// Current view state
    #[must_use]
    pub fn state(&self) -> DashboardState {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every view state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DashboardState> {
        self.inner.state.subscribe()
    }

    /// Handle for queueing refreshes from other tasks
    #[must_use]
    pub fn refresh_handle(&self) -> RefreshHandle {
        RefreshHandle {
            tx: self.inner.requests_tx.clone(),
        }
    }

    /// Whether the controller is between activation and deactivation
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Load once, then refresh periodically until [`Self::deactivate`]
    ///
    /// A failing first load is reported like any other refresh failure and
    /// does not prevent activation.
    ///
    /// # Errors
    ///
    /// Returns [`DashboardError::AlreadyActive`] if the controller is running.
    #[instrument(skip(self))]
    pub async fn activate(&self) -> DashboardResult<()> {
        let token = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.token.is_some() {
                return Err(DashboardError::AlreadyActive);
            }
            let token = CancellationToken::new();
            lifecycle.token = Some(token.clone());
            self.inner.active.store(true, Ordering::SeqCst);
            token
        };
        info!(interval_secs = self.inner.interval.as_secs(), "Activating dashboard");

        if let Err(e) = self.refresh(RefreshTrigger::Initial).await {
            warn!(error = %e, "Initial dashboard load failed");
        }

        let mut lifecycle = self.inner.lifecycle.lock();
        if token.is_cancelled() {
            debug!("Deactivated during initial load, not scheduling refreshes");
            return Ok(());
        }
        lifecycle.task = Some(tokio::spawn(self.clone().run(token)));
        Ok(())
    }

    /// Stop the refresh loop; in-flight refreshes finish but their results are dropped
    ///
    /// Returns `false` if the controller was not active.
    #[instrument(skip(self))]
    pub fn deactivate(&self) -> bool {
        let mut lifecycle = self.inner.lifecycle.lock();
        self.inner.active.store(false, Ordering::SeqCst);
        let Some(token) = lifecycle.token.take() else {
            return false;
        };
        token.cancel();
        lifecycle.task = None;
        self.inner.state.send_if_modified(DashboardState::cancel_refresh);
        info!("Dashboard deactivated");
        true
    }

    /// Deactivate and wait for the refresh loop to exit
    pub async fn shutdown(&self) {
        let task = {
            let mut lifecycle = self.inner.lifecycle.lock();
            self.inner.active.store(false, Ordering::SeqCst);
            if let Some(token) = lifecycle.token.take() {
                token.cancel();
            }
            lifecycle.task.take()
        };
        self.inner.state.send_if_modified(DashboardState::cancel_refresh);
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Refresh loop ended abnormally");
            }
        }
        info!("Dashboard shut down");
    }

    async fn run(self, token: CancellationToken) {
        let period = self.inner.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut requests = tokio::select! {
            () = token.cancelled() => return,
            requests = self.inner.requests_rx.lock() => requests,
        };
        // Requests queued while inactive are stale
        while requests.try_recv().is_ok() {}

        loop {
            let trigger = tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => RefreshTrigger::Interval,
                Some(trigger) = requests.recv() => trigger,
            };
            if let Err(e) = self.refresh(trigger).await {
                debug!(%trigger, error = %e, "Scheduled refresh failed");
            }
        }
        debug!("Refresh loop stopped");
    }

    /// Run one refresh for the current date range
    ///
    /// Failures are recorded in the view state and announced before being
    /// returned; the previous data stays visible.
    ///
    /// # Errors
    ///
    /// Returns [`DashboardError::NotActive`] when called on an inactive
    /// controller, otherwise the first query error of the batch.
    #[instrument(skip(self), fields(generation))]
    pub async fn refresh(&self, trigger: RefreshTrigger) -> DashboardResult<RefreshOutcome> {
        if !self.is_active() {
            return Err(DashboardError::NotActive);
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::Span::current().record("generation", generation);

        let mut range = DateRange::unbounded();
        self.inner.state.send_modify(|state| {
            state.begin_refresh();
            range = state.range;
        });

        let result = self
            .inner
            .fetcher
            .fetch(&range)
            .await
            .map(|batch| presentation::snapshot(batch, &self.inner.formatter, Utc::now()));

        if !self.is_active() {
            debug!("Dropping refresh result, dashboard inactive");
            self.inner.state.send_if_modified(DashboardState::cancel_refresh);
            return Ok(RefreshOutcome::Inactive);
        }
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            debug!("Dropping refresh result, superseded");
            return Ok(RefreshOutcome::Superseded);
        }

        match result {
            Ok(snapshot) => {
                self.inner.state.send_modify(|state| state.apply(snapshot));
                debug!("Dashboard state updated");
                if trigger == RefreshTrigger::Manual {
                    self.inner
                        .services
                        .notifications
                        .notify(REFRESHED_MESSAGE, Severity::Success);
                }
                Ok(RefreshOutcome::Applied)
            }
            Err(e) => {
                warn!(error = %e, "Dashboard refresh failed");
                let message = e.to_string();
                self.inner.state.send_modify(|state| state.fail(message));
                self.inner
                    .services
                    .notifications
                    .notify(FAILED_MESSAGE, Severity::Danger);
                Err(e)
            }
        }
    }

    /// Merge pushed counters into the stats record
    pub fn merge_stats(&self, stats: DashboardStats) {
        if !self.is_active() || stats.is_empty() {
            return;
        }
        self.inner.state.send_modify(|state| state.stats.merge(stats));
    }

    /// Announce a message through the notification service
    pub fn notify(&self, message: &str, severity: Severity) {
        self.inner.services.notifications.notify(message, severity);
    }

    /// Open the records counted by `tile`
    ///
    /// The action carries the same domain the count used.
    pub fn open_tile(&self, tile: StatTile) -> ListAction {
        let range = self.inner.state.borrow().range;
        let action = ListAction::for_model(tile.model(), planner::tile_domain(tile, &range));
        info!(%tile, "Opening tile drill-down");
        self.inner
            .services
            .navigation
            .open_filtered_list(action.clone());
        action
    }

    /// Open the requests in `state` within the date range
    pub fn open_state(&self, state: &LoadingState) -> ListAction {
        let range = self.inner.state.borrow().range;
        let action = ListAction::for_model(
            loadboard_core::Model::LoadingRequest,
            planner::state_drilldown_domain(state, &range),
        );
        info!(%state, "Opening state drill-down");
        self.inner
            .services
            .navigation
            .open_filtered_list(action.clone());
        action
    }

    /// Replace the date range and refresh if active
    ///
    /// # Errors
    ///
    /// Returns the refresh error, if any.
    pub async fn set_range(&self, range: DateRange) -> DashboardResult<()> {
        self.inner.state.send_modify(|state| state.range = range);
        info!(start = ?range.start(), end = ?range.end(), "Date range changed");
        if self.is_active() {
            self.refresh(RefreshTrigger::RangeChange).await?;
        }
        Ok(())
    }

    /// Set the first dispatch day, `None` for open-ended
    ///
    /// # Errors
    ///
    /// Returns the refresh error, if any.
    pub async fn set_start_date(&self, start: Option<NaiveDate>) -> DashboardResult<()> {
        let range = self.inner.state.borrow().range.with_start(start);
        self.set_range(range).await
    }

    /// Set the last dispatch day, `None` for open-ended
    ///
    /// # Errors
    ///
    /// Returns the refresh error, if any.
    pub async fn set_end_date(&self, end: Option<NaiveDate>) -> DashboardResult<()> {
        let range = self.inner.state.borrow().range.with_end(end);
        self.set_range(range).await
    }
}
