//! Ice loading dashboard aggregator
//!
//! Plans the backend queries behind each dashboard tile, runs them as one
//! concurrent batch, turns the raw records into display-ready values and keeps
//! the result current through periodic and realtime refreshes. The backend is
//! reached only through the service traits in [`service`], so the same
//! controller runs against [`rpc::JsonRpcQueryService`] in production and
//! [`mock::MockRecordService`] in tests.

#![forbid(unsafe_code)]

pub mod controller;
pub mod error;
pub mod fetcher;
pub mod mock;
pub mod planner;
pub mod presentation;
pub mod realtime;
pub mod rpc;
pub mod service;
pub mod state;

// Re-export commonly used types
pub use controller::{DashboardController, RefreshHandle, RefreshOutcome, RefreshTrigger};
pub use error::{DashboardError, DashboardResult};
pub use fetcher::{DashboardFetcher, FetchedBatch};
pub use presentation::TimeFormatter;
pub use realtime::{LocalBus, RealtimeBridge, RealtimeBus, Update, UpdatePoller};
pub use rpc::JsonRpcQueryService;
pub use service::{
    ListAction, NavigationService, NotificationService, RecordQueryService, Services, Severity,
    TracingNavigator, TracingNotifier,
};
pub use state::{DashboardSnapshot, DashboardState, DashboardStats, Phase};

use loadboard_core::DashboardConfig;
use std::sync::Arc;

/// Build a controller talking to the configured backend over JSON-RPC
///
/// Navigation and notifications go to the tracing log.
///
/// # Errors
///
/// Returns [`DashboardError`] if:
/// - The HTTP client cannot be built
/// - The configured date range or display offset is invalid
pub fn connect(config: &DashboardConfig) -> DashboardResult<DashboardController> {
    let services = Services {
        query: Arc::new(JsonRpcQueryService::new(&config.backend)?),
        navigation: Arc::new(TracingNavigator),
        notifications: Arc::new(TracingNotifier),
    };
    DashboardController::new(services, config)
}
