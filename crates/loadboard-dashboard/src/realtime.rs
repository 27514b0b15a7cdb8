//! Backend change signals
//!
//! Two channels report backend changes: bus topics pushed by the backend and
//! the legacy updates endpoint polled over HTTP. Both feed one signal queue;
//! a debouncer coalesces bursts into a single refresh request so overlapping
//! signals never start overlapping refreshes.

use crate::controller::{DashboardController, RefreshTrigger};
use crate::error::{DashboardError, DashboardResult};
use crate::service::Severity;
use crate::state::DashboardStats;
use chrono::Utc;
use loadboard_core::config::RealtimeConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Topic carrying loading request changes
pub const REQUEST_TOPIC: &str = "ice_loading_request_update";

/// Topic carrying fleet vehicle status changes
pub const VEHICLE_TOPIC: &str = "fleet_vehicle_status_update";

/// Topics the dashboard listens to
pub const TOPICS: [&str; 2] = [REQUEST_TOPIC, VEHICLE_TOPIC];

const BUS_CAPACITY: usize = 64;

/// Live subscription to one bus topic; dropping it unsubscribes
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    receiver: broadcast::Receiver<Value>,
}

impl Subscription {
    /// Wrap a broadcast receiver
    #[must_use]
    pub fn new(topic: impl Into<String>, receiver: broadcast::Receiver<Value>) -> Self {
        Self {
            topic: topic.into(),
            receiver,
        }
    }

    /// Topic name
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next message, or `None` once the bus is gone
    ///
    /// Messages dropped because this subscriber lagged are skipped.
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "Bus subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!(topic = %self.topic, "Unsubscribed");
    }
}

/// Publish/subscribe transport of the host application
pub trait RealtimeBus: Send + Sync {
    /// Subscribe to `topic`
    ///
    /// # Errors
    ///
    /// Returns [`DashboardError::Subscription`] if the transport refuses.
    fn subscribe(&self, topic: &str) -> DashboardResult<Subscription>;
}

/// In-process bus backed by tokio broadcast channels
#[derive(Debug, Default)]
pub struct LocalBus {
    topics: Mutex<HashMap<String, broadcast::Sender<Value>>>,
}

impl LocalBus {
    /// Create an empty bus
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Value> {
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(BUS_CAPACITY).0)
            .clone()
    }

    /// Deliver `message` to the subscribers of `topic`; returns how many got it
    pub fn publish(&self, topic: &str, message: Value) -> usize {
        self.sender(topic).send(message).unwrap_or(0)
    }

    /// Current subscriber count of `topic`
    #[must_use]
    pub fn subscribers(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

impl RealtimeBus for LocalBus {
    fn subscribe(&self, topic: &str) -> DashboardResult<Subscription> {
        if topic.trim().is_empty() {
            return Err(DashboardError::subscription(topic, "empty topic name"));
        }
        Ok(Subscription::new(topic, self.sender(topic).subscribe()))
    }
}

/// Kind of a polled update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateKind {
    /// A request moved to another state
    LoadingRequestStateChange,
    /// A vehicle changed loading status
    CarStatusChange,
    /// An urgent request was created
    NewUrgentRequest,
    /// Fresh counters
    StatsUpdate,
    /// Anything else
    Other(String),
}

/// One entry of the updates endpoint response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Update type tag
    #[serde(rename = "type")]
    pub kind: String,
    /// Type specific payload
    #[serde(default)]
    pub data: Value,
}

impl Update {
    /// Parsed type tag
    #[must_use]
    pub fn kind(&self) -> UpdateKind {
        match self.kind.as_str() {
            "loading_request_state_change" => UpdateKind::LoadingRequestStateChange,
            "car_status_change" => UpdateKind::CarStatusChange,
            "new_urgent_request" => UpdateKind::NewUrgentRequest,
            "stats_update" => UpdateKind::StatsUpdate,
            other => UpdateKind::Other(other.to_string()),
        }
    }

    /// Counters carried by a `stats_update`; non-numeric entries are skipped
    #[must_use]
    pub fn stats(&self) -> DashboardStats {
        let mut stats = DashboardStats::new();
        if let Value::Object(map) = &self.data {
            for (key, value) in map {
                if let Some(count) = value.as_u64() {
                    stats.insert(key.clone(), count);
                }
            }
        }
        stats
    }

    /// Announcement for a `new_urgent_request`
    #[must_use]
    pub fn urgent_message(&self) -> String {
        let name = self
            .data
            .get("request_name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        format!("Urgent loading request created: {name}")
    }
}

/// Response of the updates endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdatesResponse {
    /// Whether anything changed since `last_update`
    #[serde(default)]
    pub has_updates: bool,
    /// The changes
    #[serde(default)]
    pub updates: Vec<Update>,
}

/// Client of the legacy `POST {updates_path}` endpoint
#[derive(Debug, Clone)]
pub struct UpdatePoller {
    client: reqwest::Client,
    url: String,
    session_id: Option<String>,
    last_update: i64,
}

impl UpdatePoller {
    /// Poller for `base_url` + `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, path: &str, timeout: Duration) -> DashboardResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), path),
            session_id: None,
            last_update: Utc::now().timestamp_millis(),
        })
    }

    /// Send `session_id` as a cookie
    #[must_use]
    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Milliseconds timestamp sent as `last_update`
    #[must_use]
    pub const fn last_update(&self) -> i64 {
        self.last_update
    }

    /// Ask for changes since the last poll that reported any
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-success status or an
    /// undecodable body.
    pub async fn poll(&mut self) -> DashboardResult<Vec<Update>> {
        let mut request = self
            .client
            .post(&self.url)
            .header("X-Requested-With", "XMLHttpRequest")
            .json(&json!({ "last_update": self.last_update }));
        if let Some(session_id) = &self.session_id {
            request = request.header(reqwest::header::COOKIE, format!("session_id={session_id}"));
        }

        let response: UpdatesResponse = request.send().await?.error_for_status()?.json().await?;
        if !response.has_updates {
            return Ok(Vec::new());
        }
        self.last_update = Utc::now().timestamp_millis();
        debug!(updates = response.updates.len(), "Backend reported updates");
        Ok(response.updates)
    }
}

/// Coalesces bursts of signals into single firings
#[derive(Debug, Clone, Copy)]
pub struct Debouncer {
    window: Duration,
}

impl Debouncer {
    /// Debouncer waiting `window` after the first signal of a burst
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Call `fire` once per burst until `signals` closes
    ///
    /// A burst is every signal received within `window` of its first one.
    /// A burst cut short by the channel closing still fires.
    pub async fn run<F: FnMut()>(self, mut signals: mpsc::Receiver<()>, mut fire: F) {
        while signals.recv().await.is_some() {
            let deadline = sleep(self.window);
            tokio::pin!(deadline);
            let mut closed = false;
            loop {
                tokio::select! {
                    () = &mut deadline => break,
                    signal = signals.recv() => if signal.is_none() {
                        closed = true;
                        break;
                    },
                }
            }
            fire();
            if closed {
                break;
            }
        }
    }
}

/// Wires bus and poll signals into a controller's refresh queue
pub struct RealtimeBridge {
    controller: DashboardController,
    config: RealtimeConfig,
    bus: Option<Arc<dyn RealtimeBus>>,
    poller: Option<UpdatePoller>,
}

impl fmt::Debug for RealtimeBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeBridge")
            .field("mode", &self.config.mode)
            .field("bus", &self.bus.is_some())
            .field("poller", &self.poller)
            .finish_non_exhaustive()
    }
}

impl RealtimeBridge {
    /// Bridge for `controller`; add channels with the builder methods
    #[must_use]
    pub const fn new(controller: DashboardController, config: RealtimeConfig) -> Self {
        Self {
            controller,
            config,
            bus: None,
            poller: None,
        }
    }

    /// Listen to bus topics
    #[must_use]
    pub fn with_bus(mut self, bus: Arc<dyn RealtimeBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Poll the updates endpoint
    #[must_use]
    pub fn with_poller(mut self, poller: UpdatePoller) -> Self {
        self.poller = Some(poller);
        self
    }

    /// Start listening until `token` is cancelled
    ///
    /// # Errors
    ///
    /// Returns an error if a bus subscription fails.
    pub fn spawn(self, token: CancellationToken) -> DashboardResult<Vec<JoinHandle<()>>> {
        let (signal_tx, signal_rx) = mpsc::channel(BUS_CAPACITY);
        let mut handles = Vec::new();

        if let Some(bus) = &self.bus {
            for topic in TOPICS {
                let subscription = bus.subscribe(topic)?;
                info!(topic, "Subscribed to bus topic");
                handles.push(spawn_bus_listener(subscription, signal_tx.clone(), token.clone()));
            }
        }

        if let Some(poller) = self.poller {
            handles.push(spawn_poller(
                poller,
                self.config.poll_interval(),
                self.controller.clone(),
                signal_tx.clone(),
                token.clone(),
            ));
        }
        drop(signal_tx);

        let refresh = self.controller.refresh_handle();
        let debouncer = Debouncer::new(self.config.debounce());
        handles.push(tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = debouncer.run(signal_rx, || {
                    if refresh.request(RefreshTrigger::Realtime) {
                        debug!("Realtime refresh requested");
                    }
                }) => {}
            }
        }));

        Ok(handles)
    }
}

fn spawn_bus_listener(
    mut subscription: Subscription,
    signals: mpsc::Sender<()>,
    token: CancellationToken,
) -> JoinHandle<()> {
    let topic = subscription.topic().to_string();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                message = subscription.recv() => match message {
                    Some(_) => {
                        debug!(%topic, "Bus message received");
                        let _ = signals.try_send(());
                    }
                    None => break,
                },
            }
        }
    })
}

/// Apply one polled update; returns whether it calls for a refresh
pub fn handle_update(controller: &DashboardController, update: &Update) -> bool {
    match update.kind() {
        UpdateKind::StatsUpdate => {
            controller.merge_stats(update.stats());
            false
        }
        UpdateKind::NewUrgentRequest => {
            controller.notify(&update.urgent_message(), Severity::Danger);
            true
        }
        UpdateKind::LoadingRequestStateChange | UpdateKind::CarStatusChange => true,
        UpdateKind::Other(kind) => {
            debug!(%kind, "Ignoring unknown update");
            false
        }
    }
}

fn spawn_poller(
    mut poller: UpdatePoller,
    period: Duration,
    controller: DashboardController,
    signals: mpsc::Sender<()>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if !controller.is_active() {
                continue;
            }
            match poller.poll().await {
                Ok(updates) => {
                    let mut wants_refresh = false;
                    for update in &updates {
                        wants_refresh |= handle_update(&controller, update);
                    }
                    if wants_refresh {
                        let _ = signals.try_send(());
                    }
                }
                Err(e) => warn!(error = %e, "Polling for updates failed"),
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_update_kinds() {
        let update: Update = serde_json::from_value(json!({
            "type": "new_urgent_request",
            "data": {"request_name": "LR/0042"}
        }))
        .unwrap();
        assert_eq!(update.kind(), UpdateKind::NewUrgentRequest);
        assert_eq!(update.urgent_message(), "Urgent loading request created: LR/0042");

        let other: Update = serde_json::from_value(json!({"type": "weather"})).unwrap();
        assert_eq!(other.kind(), UpdateKind::Other("weather".to_string()));
        assert_eq!(other.data, Value::Null);
    }

    #[test]
    fn test_stats_update_payload() {
        let update = Update {
            kind: "stats_update".to_string(),
            data: json!({"busy_cars": 4, "label": "x"}),
        };
        let stats = update.stats();
        assert_eq!(stats.get("busy_cars"), Some(4));
        assert_eq!(stats.len(), 1);
    }

    #[tokio::test]
    async fn test_local_bus_delivers_and_unsubscribes() {
        let bus = LocalBus::new();
        let mut subscription = bus.subscribe(REQUEST_TOPIC).unwrap();
        assert_eq!(bus.subscribers(REQUEST_TOPIC), 1);

        assert_eq!(bus.publish(REQUEST_TOPIC, json!({"id": 1})), 1);
        assert_eq!(subscription.recv().await, Some(json!({"id": 1})));

        drop(subscription);
        assert_eq!(bus.subscribers(REQUEST_TOPIC), 0);
        assert_eq!(bus.publish(REQUEST_TOPIC, json!({"id": 2})), 0);
        assert!(bus.subscribe("  ").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_coalesces_bursts() {
        let (tx, rx) = mpsc::channel(16);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let task = tokio::spawn(Debouncer::new(Duration::from_millis(500)).run(rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        for _ in 0..5 {
            tx.send(()).await.unwrap();
            sleep(Duration::from_millis(50)).await;
        }
        sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        tx.send(()).await.unwrap();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        drop(tx);
        task.await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
