//! Concurrent aggregation of every dashboard query
//!
//! One refresh issues all tile counts, the recent-activity list, both
//! distributions and the weight totals at once, then a single batch lookup
//! for the vehicles referenced by the recent rows. The first error aborts the
//! whole batch.

use crate::error::{DashboardError, DashboardResult};
use crate::planner;
use crate::service::{GroupCount, ListOptions, Record, RecordQueryService};
use futures::future::try_join_all;
use loadboard_core::types::relation;
use loadboard_core::{DateRange, LoadingState, Many2One, Model, Priority, StatTile};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Serde adapters for the backend's loosely typed field values
mod lenient {
    use loadboard_core::{LoadingState, Priority};
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Int(i64),
        Float(f64),
        Text(String),
        Flag(bool),
        Null(()),
    }

    /// Text, with `false` and `null` read as `None`
    pub(super) fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        Ok(match Scalar::deserialize(deserializer)? {
            Scalar::Text(text) => Some(text),
            Scalar::Int(n) => Some(n.to_string()),
            Scalar::Float(n) => Some(n.to_string()),
            Scalar::Flag(_) | Scalar::Null(()) => None,
        })
    }

    /// Number, with `false` and `null` read as 0
    #[allow(clippy::cast_precision_loss)]
    pub(super) fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(match Scalar::deserialize(deserializer)? {
            Scalar::Int(n) => n as f64,
            Scalar::Float(n) => n,
            Scalar::Text(text) => text.trim().parse().unwrap_or_default(),
            Scalar::Flag(_) | Scalar::Null(()) => 0.0,
        })
    }

    /// Priority sent as an integer or a numeric selection key
    pub(super) fn priority<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Priority>, D::Error> {
        Ok(match Scalar::deserialize(deserializer)? {
            Scalar::Int(n) => Some(Priority::from_code(n)),
            Scalar::Text(text) => text.trim().parse().ok().map(Priority::from_code),
            Scalar::Float(_) | Scalar::Flag(_) | Scalar::Null(()) => None,
        })
    }

    /// State code; an unset state reads as `draft`, the backend default
    pub(super) fn state<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LoadingState, D::Error> {
        Ok(text(deserializer)?.map_or(LoadingState::Draft, |code| LoadingState::from_code(&code)))
    }
}

/// A loading request as read for the recent-activity list
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RequestRow {
    /// Record id
    pub id: i64,
    /// Reference
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
    /// Assigned vehicle
    #[serde(default, deserialize_with = "relation::deserialize")]
    pub car_id: Option<Many2One>,
    /// Salesman
    #[serde(default, deserialize_with = "relation::deserialize")]
    pub salesman_id: Option<Many2One>,
    /// Workflow state
    #[serde(default = "default_state", deserialize_with = "lenient::state")]
    pub state: LoadingState,
    /// Dispatch timestamp (UTC)
    #[serde(default, deserialize_with = "lenient::text")]
    pub dispatch_time: Option<String>,
    /// Priority
    #[serde(default, deserialize_with = "lenient::priority")]
    pub loading_priority: Option<Priority>,
    /// Loaded weight in kg
    #[serde(default, deserialize_with = "lenient::number")]
    pub total_weight: f64,
    /// Creation timestamp (UTC)
    #[serde(default, deserialize_with = "lenient::text")]
    pub create_date: Option<String>,
}

const fn default_state() -> LoadingState {
    LoadingState::Draft
}

/// A fleet vehicle as read for the recent-activity rows
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VehicleRow {
    /// Record id
    pub id: i64,
    /// Display name
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
    /// Loading status code, if set
    #[serde(default, deserialize_with = "lenient::text")]
    pub loading_status: Option<String>,
    /// Capacity in kg
    #[serde(default, deserialize_with = "lenient::number")]
    pub total_weight_capacity: f64,
}

/// Raw results of one refresh, before presentation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedBatch {
    /// Count per enabled tile, in configured order
    pub counts: Vec<(StatTile, u64)>,
    /// Recent requests, newest first
    pub recent: Vec<RequestRow>,
    /// Vehicles referenced by `recent`, by id
    pub vehicles: HashMap<i64, VehicleRow>,
    /// Requests per state
    pub states: Vec<(Option<LoadingState>, u64)>,
    /// Requests per priority
    pub priorities: Vec<(Option<Priority>, u64)>,
    /// Sum of `total_weight` over non-cancelled requests
    pub weight_total: f64,
    /// Number of requests in the weight sum
    pub weight_requests: u64,
}

fn decode<T: DeserializeOwned>(model: Model, record: Record) -> DashboardResult<T> {
    serde_json::from_value(Value::Object(record))
        .map_err(|source| DashboardError::decode(model.as_str(), source))
}

fn state_key(key: &Value) -> Option<LoadingState> {
    key.as_str().map(LoadingState::from_code)
}

fn priority_key(key: &Value) -> Option<Priority> {
    match key {
        Value::Number(n) => n.as_i64().map(Priority::from_code),
        Value::String(s) => s.trim().parse().ok().map(Priority::from_code),
        _ => None,
    }
}

/// Runs the query batch of one refresh
#[derive(Clone)]
pub struct DashboardFetcher {
    query: Arc<dyn RecordQueryService>,
    tiles: Vec<StatTile>,
    recent_limit: usize,
}

impl std::fmt::Debug for DashboardFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardFetcher")
            .field("tiles", &self.tiles)
            .field("recent_limit", &self.recent_limit)
            .finish_non_exhaustive()
    }
}

impl DashboardFetcher {
    /// Fetcher counting `tiles` and listing `recent_limit` recent requests
    #[must_use]
    pub fn new(query: Arc<dyn RecordQueryService>, tiles: Vec<StatTile>, recent_limit: usize) -> Self {
        Self {
            query,
            tiles,
            recent_limit,
        }
    }

    /// Tiles this fetcher counts
    #[must_use]
    pub fn tiles(&self) -> &[StatTile] {
        &self.tiles
    }

    async fn count_tiles(&self, range: &DateRange) -> DashboardResult<Vec<(StatTile, u64)>> {
        try_join_all(self.tiles.iter().map(|&tile| async move {
            let domain = planner::tile_domain(tile, range);
            let count = self.query.count(tile.model(), &domain).await?;
            Ok::<_, DashboardError>((tile, count))
        }))
        .await
    }

    async fn recent_requests(&self, range: &DateRange) -> DashboardResult<Vec<RequestRow>> {
        let domain = planner::recent_domain(range);
        let options = ListOptions {
            order: Some(planner::RECENT_ORDER.to_string()),
            limit: Some(self.recent_limit),
        };
        self.query
            .search_read(
                Model::LoadingRequest,
                &domain,
                &planner::RECENT_FIELDS,
                &options,
            )
            .await?
            .into_iter()
            .map(|record| decode(Model::LoadingRequest, record))
            .collect()
    }

    async fn vehicles_for(&self, rows: &[RequestRow]) -> DashboardResult<HashMap<i64, VehicleRow>> {
        let ids: Vec<i64> = rows
            .iter()
            .filter_map(|row| row.car_id.as_ref().map(|car| car.id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        debug!(vehicles = ids.len(), "Looking up vehicle capacities");
        self.query
            .read_by_ids(Model::FleetVehicle, &ids, &planner::VEHICLE_FIELDS)
            .await?
            .into_iter()
            .map(|record| {
                decode::<VehicleRow>(Model::FleetVehicle, record).map(|vehicle| (vehicle.id, vehicle))
            })
            .collect()
    }

    /// Run every query for `range`
    ///
    /// # Errors
    ///
    /// Returns the first query or decode error; no partial batch is produced.
    #[instrument(skip(self), fields(tiles = self.tiles.len()))]
    pub async fn fetch(&self, range: &DateRange) -> DashboardResult<FetchedBatch> {
        let state_domain = planner::state_distribution_domain(range);
        let priority_domain = planner::priority_distribution_domain(range);
        let weight_domain = planner::weight_domain(range);

        let (counts, recent, states, priorities, weight_total, weight_requests) = futures::try_join!(
            self.count_tiles(range),
            self.recent_requests(range),
            self.query
                .read_group(Model::LoadingRequest, &state_domain, planner::STATE_FIELD),
            self.query.read_group(
                Model::LoadingRequest,
                &priority_domain,
                planner::PRIORITY_FIELD
            ),
            self.query
                .sum(Model::LoadingRequest, &weight_domain, planner::WEIGHT_FIELD),
            self.query.count(Model::LoadingRequest, &weight_domain),
        )?;

        let vehicles = self.vehicles_for(&recent).await?;

        debug!(
            recent = recent.len(),
            vehicles = vehicles.len(),
            "Dashboard batch fetched"
        );

        Ok(FetchedBatch {
            counts,
            recent,
            vehicles,
            states: states
                .iter()
                .map(|GroupCount { key, count }| (state_key(key), *count))
                .collect(),
            priorities: priorities
                .iter()
                .map(|GroupCount { key, count }| (priority_key(key), *count))
                .collect(),
            weight_total,
            weight_requests,
        })
    }
}
