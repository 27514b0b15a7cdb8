//! Filter predicates for every dashboard query
//!
//! All functions here are pure. A tile's count and its drill-down navigation
//! both call [`tile_domain`], so the list a user opens always holds exactly
//! the records that were counted.

use loadboard_core::{DateRange, Domain, LoadingState, Operator, StatTile, VehicleStatus};

/// Timestamp field the date range applies to
pub const DISPATCH_FIELD: &str = "dispatch_time";

/// Field read by the state distribution
pub const STATE_FIELD: &str = "state";

/// Field read by the priority distribution
pub const PRIORITY_FIELD: &str = "loading_priority";

/// Field summed by the weight summary
pub const WEIGHT_FIELD: &str = "total_weight";

/// Fields read for the recent-activity rows
pub const RECENT_FIELDS: [&str; 8] = [
    "name",
    "car_id",
    "salesman_id",
    "state",
    "dispatch_time",
    "loading_priority",
    "total_weight",
    "create_date",
];

/// Fields read in the vehicle lookup
pub const VEHICLE_FIELDS: [&str; 3] = ["name", "loading_status", "total_weight_capacity"];

/// Ordering of the recent-activity list
pub const RECENT_ORDER: &str = "create_date desc";

/// Inclusive `dispatch_time` bounds; absent bounds add no clause
#[must_use]
pub fn date_range_domain(range: &DateRange) -> Domain {
    let mut domain = Domain::new();
    if let Some(start) = range.start_bound() {
        domain = domain.with(DISPATCH_FIELD, Operator::Ge, start);
    }
    if let Some(end) = range.end_bound() {
        domain = domain.with(DISPATCH_FIELD, Operator::Le, end);
    }
    domain
}

/// Requests in exactly `state`
#[must_use]
pub fn state_domain(state: &LoadingState) -> Domain {
    Domain::new().with(STATE_FIELD, Operator::Eq, state)
}

fn states_in(states: &[LoadingState]) -> Domain {
    Domain::new().with(
        STATE_FIELD,
        Operator::In,
        states.iter().map(LoadingState::code).collect::<Vec<_>>(),
    )
}

fn states_not_in(states: &[LoadingState]) -> Domain {
    Domain::new().with(
        STATE_FIELD,
        Operator::NotIn,
        states.iter().map(LoadingState::code).collect::<Vec<_>>(),
    )
}

/// Predicate counted by `tile`, before any date scoping
#[must_use]
pub fn tile_condition(tile: StatTile) -> Domain {
    match tile {
        StatTile::TotalRequests => Domain::new(),
        StatTile::UrgentRequests => Domain::new()
            .with(PRIORITY_FIELD, Operator::Eq, 1_i64)
            .and(states_not_in(&[LoadingState::Cancelled, LoadingState::Done])),
        StatTile::DraftRequests => state_domain(&LoadingState::Draft),
        StatTile::CarChecking => state_domain(&LoadingState::CarChecking),
        StatTile::ReadyForLoading => state_domain(&LoadingState::ReadyForLoading),
        StatTile::Loading => state_domain(&LoadingState::Loading),
        StatTile::IceHandled => state_domain(&LoadingState::IceHandled),
        StatTile::Plugged => state_domain(&LoadingState::Plugged),
        StatTile::InTransit => states_in(&[
            LoadingState::Delivering,
            LoadingState::SecondLoadingDelivering,
        ]),
        StatTile::SecondLoading => states_in(&[
            LoadingState::ReadyForSecondLoading,
            LoadingState::StartedSecondLoading,
        ]),
        StatTile::Delivered => state_domain(&LoadingState::Delivered),
        StatTile::DoneRequests => state_domain(&LoadingState::Done),
        StatTile::PendingCashCollection => Domain::new()
            .with("is_warehouse_check", Operator::Eq, true)
            .with("cash_payment_id", Operator::Eq, false),
        StatTile::PendingCarReturn => Domain::new()
            .with("is_warehouse_check", Operator::Eq, true)
            .with("is_car_received", Operator::Eq, false),
        StatTile::AvailableCars => {
            Domain::new().with("loading_status", Operator::Eq, &VehicleStatus::Available)
        }
        StatTile::BusyCars => Domain::new().with(
            "loading_status",
            Operator::In,
            vec![
                &VehicleStatus::InUse,
                &VehicleStatus::ReadyForLoading,
                &VehicleStatus::Plugged,
            ],
        ),
    }
}

/// Full domain of `tile`: its condition, date scoped for request tiles
///
/// Used unchanged for both the count and the drill-down.
#[must_use]
pub fn tile_domain(tile: StatTile, range: &DateRange) -> Domain {
    match tile.model() {
        loadboard_core::Model::LoadingRequest => {
            tile_condition(tile).and(date_range_domain(range))
        }
        loadboard_core::Model::FleetVehicle => tile_condition(tile),
    }
}

/// Requests in `state` within the range, opened from the state distribution
#[must_use]
pub fn state_drilldown_domain(state: &LoadingState, range: &DateRange) -> Domain {
    state_domain(state).and(date_range_domain(range))
}

/// Domain of the recent-activity list
#[must_use]
pub fn recent_domain(range: &DateRange) -> Domain {
    date_range_domain(range)
}

/// Domain of the state distribution; cancelled requests are excluded
#[must_use]
pub fn state_distribution_domain(range: &DateRange) -> Domain {
    states_not_in(&[LoadingState::Cancelled]).and(date_range_domain(range))
}

/// Domain of the priority distribution; cancelled and done are excluded
#[must_use]
pub fn priority_distribution_domain(range: &DateRange) -> Domain {
    states_not_in(&[LoadingState::Cancelled, LoadingState::Done]).and(date_range_domain(range))
}

/// Domain of the weight summary; cancelled requests are excluded
#[must_use]
pub fn weight_domain(range: &DateRange) -> Domain {
    states_not_in(&[LoadingState::Cancelled]).and(date_range_domain(range))
}
