//! Dashboard view state
//!
//! The controller owns one [`DashboardState`] and publishes clones of it.
//! Each successful refresh produces a [`DashboardSnapshot`] which replaces the
//! derived lists wholesale and merges into the stats record.

use crate::presentation::{self, WeightBand};
use loadboard_core::types::relation;
use loadboard_core::{DateRange, LoadingState, Priority, StatTile, VehicleStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where the dashboard is in its load cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No refresh has completed yet
    #[default]
    Initializing,
    /// Showing the result of the last refresh
    Loaded,
    /// A refresh is in flight; previous data stays visible
    Refreshing,
}

/// Named counters, merged key by key across refreshes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DashboardStats(BTreeMap<String, u64>);

impl DashboardStats {
    /// Empty record
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Counter stored under `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<u64> {
        self.0.get(key).copied()
    }

    /// Counter of `tile`
    #[must_use]
    pub fn tile(&self, tile: StatTile) -> Option<u64> {
        self.get(tile.key())
    }

    /// Set a single counter
    pub fn insert(&mut self, key: impl Into<String>, value: u64) {
        self.0.insert(key.into(), value);
    }

    /// Overwrite counters present in `batch`; keys absent from it keep their value
    pub fn merge(&mut self, batch: Self) {
        self.0.extend(batch.0);
    }

    /// Counters in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(key, value)| (key.as_str(), *value))
    }

    /// Number of counters
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no counter has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(StatTile, u64)> for DashboardStats {
    fn from_iter<I: IntoIterator<Item = (StatTile, u64)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(tile, value)| (tile.key().to_string(), value))
                .collect(),
        )
    }
}

/// Vehicle attached to a recent request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSummary {
    /// Vehicle id
    pub id: i64,
    /// Display name
    pub name: String,
    /// Capacity in kg, 0 when unknown
    pub capacity: f64,
    /// Loading status, `None` when the vehicle was not found or has none
    pub status: Option<VehicleStatus>,
    /// Status label, empty without a status
    pub status_label: String,
    /// Status badge class
    pub status_class: String,
}

/// One row of the recent-activity list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentRequestView {
    /// Request id
    pub id: i64,
    /// Request reference
    pub name: String,
    /// Vehicle, serialized as `false` when absent
    #[serde(serialize_with = "relation::serialize_or_false")]
    pub car_id: Option<VehicleSummary>,
    /// Salesman display name
    pub salesman: Option<String>,
    /// Raw state
    pub state: LoadingState,
    /// State label
    pub state_label: String,
    /// State badge class
    pub state_class: String,
    /// State background class
    pub state_background: String,
    /// State icon
    pub state_icon: String,
    /// Priority, if set
    pub priority: Option<Priority>,
    /// Priority label, empty when unset
    pub priority_label: String,
    /// Priority badge class, empty when unset or unknown
    pub priority_class: String,
    /// Priority icon
    pub priority_icon: String,
    /// Raw dispatch timestamp (UTC)
    pub dispatch_time: Option<String>,
    /// Dispatch time in the viewer's zone
    pub dispatch_time_formatted: String,
    /// Dispatch day relative to the refresh, e.g. `Yesterday`
    pub dispatch_day: String,
    /// Loaded weight in kg
    pub total_weight: f64,
    /// Load as a share of the vehicle capacity
    pub weight_percentage: f64,
    /// Rounded load percentage
    pub efficiency: u8,
    /// Load band
    pub weight_band: WeightBand,
    /// Progress bar background class
    pub weight_background: String,
}

impl RecentRequestView {
    /// `"{weight}/{capacity} kg"`, or the formatted weight when no vehicle is set
    #[must_use]
    pub fn progress_text(&self) -> String {
        match &self.car_id {
            Some(car) => presentation::progress_text(self.total_weight, car.capacity),
            None => presentation::format_weight(self.total_weight),
        }
    }
}

/// One slice of a distribution chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionEntry<K> {
    /// Category; `None` for records with the field unset
    pub category: Option<K>,
    /// Records in the category
    pub count: u64,
    /// Category label
    pub label: String,
    /// Chart color
    pub color: String,
}

/// Total and mean load of the non-cancelled requests in range
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightSummary {
    /// Sum of `total_weight` in kg
    pub total: f64,
    /// Mean `total_weight` per request in kg
    pub average: f64,
    /// Requests contributing to the sum
    pub requests: u64,
}

impl WeightSummary {
    /// Summary of `total` kg over `requests` requests
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(total: f64, requests: u64) -> Self {
        let average = if requests == 0 {
            0.0
        } else {
            total / requests as f64
        };
        Self {
            total,
            average,
            requests,
        }
    }
}

/// Result of one successful refresh
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    /// Tile counters of this batch
    pub stats: DashboardStats,
    /// Recent requests, newest first
    pub recent: Vec<RecentRequestView>,
    /// Requests per state
    pub state_distribution: Vec<DistributionEntry<LoadingState>>,
    /// Requests per priority
    pub priority_distribution: Vec<DistributionEntry<Priority>>,
    /// Load totals
    pub weights: WeightSummary,
}

/// Everything the dashboard renders
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardState {
    /// Load phase
    pub phase: Phase,
    /// Message of the last failed refresh, cleared by the next success
    pub error: Option<String>,
    /// Dispatch-time filter
    pub range: DateRange,
    /// Tile counters
    pub stats: DashboardStats,
    /// Recent requests, newest first
    pub recent: Vec<RecentRequestView>,
    /// Requests per state
    pub state_distribution: Vec<DistributionEntry<LoadingState>>,
    /// Requests per priority
    pub priority_distribution: Vec<DistributionEntry<Priority>>,
    /// Load totals
    pub weights: WeightSummary,
}

impl DashboardState {
    /// Empty state filtered by `range`
    #[must_use]
    pub fn new(range: DateRange) -> Self {
        Self {
            range,
            ..Self::default()
        }
    }

    /// Mark a refresh as started
    pub fn begin_refresh(&mut self) {
        if self.phase == Phase::Loaded {
            self.phase = Phase::Refreshing;
        }
    }

    /// Drop an in-flight refresh without a result; true if the phase changed
    pub fn cancel_refresh(&mut self) -> bool {
        if self.phase == Phase::Refreshing {
            self.phase = Phase::Loaded;
            return true;
        }
        false
    }

    /// Install the result of a successful refresh
    pub fn apply(&mut self, snapshot: DashboardSnapshot) {
        self.stats.merge(snapshot.stats);
        self.recent = snapshot.recent;
        self.state_distribution = snapshot.state_distribution;
        self.priority_distribution = snapshot.priority_distribution;
        self.weights = snapshot.weights;
        self.error = None;
        self.phase = Phase::Loaded;
    }

    /// Record a failed refresh; the previous data stays in place
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        if self.phase == Phase::Refreshing {
            self.phase = Phase::Loaded;
        }
    }

    /// True once a refresh has succeeded
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.phase != Phase::Initializing
    }
}
