//! Integration tests for the dashboard controller lifecycle
#![forbid(unsafe_code)]
#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::float_cmp)]

mod common;

use chrono::NaiveDate;
use common::*;
use loadboard_core::{DateRange, LoadingState, Model, StatTile, VehicleStatus};
use loadboard_dashboard::controller::{FAILED_MESSAGE, REFRESHED_MESSAGE};
use loadboard_dashboard::mock::MockRecordService;
use loadboard_dashboard::{
    DashboardError, DashboardStats, Phase, RecordQueryService, RefreshOutcome, RefreshTrigger,
    Severity,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Activation loads every tile, both distributions and the load totals
#[tokio::test]
async fn test_activation_builds_full_dashboard() {
    init_test_logging();
    let (controller, recorder) = controller_with(seeded_backend(), &test_config(30));
    controller.activate().await.unwrap();

    let state = controller.state();
    assert_eq!(state.phase, Phase::Loaded);
    assert_eq!(state.error, None);

    let expected = [
        (StatTile::TotalRequests, 5),
        (StatTile::UrgentRequests, 1),
        (StatTile::DraftRequests, 1),
        (StatTile::ReadyForLoading, 1),
        (StatTile::InTransit, 1),
        (StatTile::DoneRequests, 1),
        (StatTile::PendingCashCollection, 1),
        (StatTile::PendingCarReturn, 1),
        (StatTile::AvailableCars, 1),
        (StatTile::BusyCars, 2),
        (StatTile::Plugged, 0),
    ];
    for (tile, count) in expected {
        assert_eq!(state.stats.tile(tile), Some(count), "tile {tile}");
    }
    assert_eq!(state.stats.len(), StatTile::ALL.len());

    assert_eq!(state.weights.total, 2550.0);
    assert_eq!(state.weights.requests, 4);
    assert_eq!(state.weights.average, 637.5);

    let states: Vec<_> = state
        .state_distribution
        .iter()
        .map(|entry| (entry.category.clone(), entry.count))
        .collect();
    assert_eq!(states.len(), 4);
    assert!(states.iter().all(|(_, count)| *count == 1));
    assert!(!states.contains(&(Some(LoadingState::Cancelled), 1)));
    assert_eq!(state.priority_distribution.len(), 3);

    assert_eq!(
        state.recent.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![5, 4, 3, 2, 1]
    );
    let done = &state.recent[1];
    let car = done.car_id.as_ref().unwrap();
    assert_eq!((car.id, car.name.as_str(), car.capacity), (3, "TRK-03", 1500.0));
    assert_eq!(car.status, Some(VehicleStatus::Plugged));
    assert_eq!((car.status_label.as_str(), car.status_class.as_str()), ("Plugged", "bg-primary"));
    assert!((done.weight_percentage - 26.666).abs() < 0.01);
    assert_eq!(done.efficiency, 27);
    assert_eq!((done.state_icon.as_str(), done.priority_icon.as_str()), ("🏁", "🔴"));
    assert_eq!(done.dispatch_day, "03/05/2024");
    assert_eq!(done.salesman.as_deref(), Some("Ravi"));
    assert!(state.recent[0].car_id.is_none());

    assert!(recorder.notes().is_empty());
    controller.shutdown().await;
}

/// Refreshing unchanged data leaves the view state unchanged
#[tokio::test]
async fn test_refresh_is_idempotent() {
    init_test_logging();
    let (controller, _) = controller_with(seeded_backend(), &test_config(30));
    controller.activate().await.unwrap();

    let first = controller.state();
    controller.refresh(RefreshTrigger::Interval).await.unwrap();
    assert_eq!(controller.state(), first);
    controller.shutdown().await;
}

/// Counters from a refresh overwrite their keys and keep the others
#[tokio::test]
async fn test_refresh_merges_stats() {
    init_test_logging();
    let (controller, _) = controller_with(seeded_backend(), &test_config(30));
    controller.activate().await.unwrap();

    let mut pushed = DashboardStats::new();
    pushed.insert("late_deliveries", 3);
    pushed.insert(StatTile::TotalRequests.key(), 99);
    controller.merge_stats(pushed);
    assert_eq!(controller.state().stats.get("late_deliveries"), Some(3));
    assert_eq!(controller.state().stats.tile(StatTile::TotalRequests), Some(99));

    controller.refresh(RefreshTrigger::Interval).await.unwrap();
    let stats = controller.state().stats;
    assert_eq!(stats.get("late_deliveries"), Some(3));
    assert_eq!(stats.tile(StatTile::TotalRequests), Some(5));
    controller.shutdown().await;
}

/// A refresh still running at deactivation leaves the pre-refresh state behind
#[tokio::test(start_paused = true)]
async fn test_deactivation_discards_in_flight_refresh() {
    init_test_logging();
    let mock = seeded_backend();
    let (controller, recorder) = controller_with(mock.clone(), &test_config(3600));
    controller.activate().await.unwrap();

    mock.set_delay(Some(Duration::from_secs(2)));
    mock.insert(
        Model::LoadingRequest,
        json!({"id": 6, "name": "LR/0006", "state": "loading", "dispatch_time": "2024-05-04 08:00:00"}),
    );
    let before = controller.state();
    assert_eq!(before.phase, Phase::Loaded);
    let pending = tokio::spawn({
        let controller = controller.clone();
        async move { controller.refresh(RefreshTrigger::Manual).await }
    });
    sleep(Duration::from_millis(10)).await;
    assert_eq!(controller.state().phase, Phase::Refreshing);

    assert!(controller.deactivate());

    let outcome = pending.await.unwrap().unwrap();
    assert_eq!(outcome, RefreshOutcome::Inactive);
    assert_eq!(controller.state(), before);
    assert_eq!(controller.state().stats.tile(StatTile::Loading), Some(0));
    assert!(recorder.notes().is_empty());

    assert!(matches!(
        controller.refresh(RefreshTrigger::Manual).await,
        Err(DashboardError::NotActive)
    ));
}

/// Only the newest of overlapping refreshes is written
#[tokio::test(start_paused = true)]
async fn test_newer_refresh_supersedes_older() {
    init_test_logging();
    let mock = seeded_backend();
    let (controller, recorder) = controller_with(mock.clone(), &test_config(3600));
    controller.activate().await.unwrap();

    mock.set_delay(Some(Duration::from_secs(5)));
    let older = tokio::spawn({
        let controller = controller.clone();
        async move { controller.refresh(RefreshTrigger::Manual).await }
    });
    sleep(Duration::from_millis(10)).await;

    mock.set_delay(None);
    mock.update(Model::LoadingRequest, 1, "state", json!("loading"));
    let newer = controller.refresh(RefreshTrigger::Manual).await.unwrap();
    assert_eq!(newer, RefreshOutcome::Applied);

    assert_eq!(older.await.unwrap().unwrap(), RefreshOutcome::Superseded);
    let state = controller.state();
    assert_eq!(state.stats.tile(StatTile::Loading), Some(1));
    assert_eq!(state.stats.tile(StatTile::DraftRequests), Some(0));
    assert_eq!(
        recorder.notes(),
        vec![(REFRESHED_MESSAGE.to_string(), Severity::Success)]
    );
    controller.shutdown().await;
}

/// Every tile drill-down lists exactly the records it counted
#[tokio::test]
async fn test_tile_drilldown_matches_count() {
    init_test_logging();
    let mock = seeded_backend();
    let (controller, recorder) = controller_with(mock.clone(), &test_config(30));
    controller.activate().await.unwrap();
    controller.set_range(DateRange::single_day(day(2024, 5, 1))).await.unwrap();

    let state = controller.state();
    let counted = mock.counted_domains();
    for tile in StatTile::ALL {
        let action = controller.open_tile(tile);
        assert_eq!(action.model, tile.model());
        assert!(
            counted.iter().any(|(model, domain)| *model == tile.model() && *domain == action.domain),
            "tile {tile} opened a domain it never counted"
        );
        let listed = mock.count(action.model, &action.domain).await.unwrap();
        assert_eq!(Some(listed), state.stats.tile(tile), "tile {tile}");
    }
    assert_eq!(recorder.actions().len(), StatTile::ALL.len());
    controller.shutdown().await;
}

/// State drill-down applies the state and the date range
#[tokio::test]
async fn test_state_drilldown() {
    init_test_logging();
    let mock = seeded_backend();
    let (controller, recorder) = controller_with(mock.clone(), &test_config(30));
    controller.set_range(DateRange::single_day(day(2024, 5, 1))).await.unwrap();

    let action = controller.open_state(&LoadingState::ReadyForLoading);
    assert_eq!(action.model, Model::LoadingRequest);
    assert_eq!(mock.count(Model::LoadingRequest, &action.domain).await.unwrap(), 1);

    let window = action.to_act_window();
    assert_eq!(window["type"], "ir.actions.act_window");
    assert_eq!(window["res_model"], "ice.loading.request");
    assert_eq!(recorder.actions(), vec![action]);
}

/// Changing the date range refreshes request tiles but not vehicle tiles
#[tokio::test]
async fn test_date_range_scopes_requests_only() {
    init_test_logging();
    let (controller, _) = controller_with(seeded_backend(), &test_config(30));
    controller.activate().await.unwrap();

    controller.set_range(DateRange::single_day(day(2024, 5, 1))).await.unwrap();
    let state = controller.state();
    assert_eq!(state.range, DateRange::single_day(day(2024, 5, 1)));
    assert_eq!(state.stats.tile(StatTile::TotalRequests), Some(2));
    assert_eq!(state.stats.tile(StatTile::BusyCars), Some(2));
    assert_eq!(state.weights.total, 950.0);
    assert_eq!(state.weights.average, 475.0);
    assert_eq!(state.recent.len(), 2);

    controller.set_start_date(None).await.unwrap();
    assert_eq!(controller.state().stats.tile(StatTile::TotalRequests), Some(2));
    controller.set_end_date(None).await.unwrap();
    assert_eq!(controller.state().stats.tile(StatTile::TotalRequests), Some(5));
    controller.shutdown().await;
}

/// A range entered backwards is read in order
#[tokio::test]
async fn test_reversed_range_is_swapped() {
    init_test_logging();
    let (controller, _) = controller_with(seeded_backend(), &test_config(30));
    controller.activate().await.unwrap();

    controller
        .set_range(DateRange::new(Some(day(2024, 5, 3)), Some(day(2024, 5, 2))))
        .await
        .unwrap();
    let state = controller.state();
    assert_eq!(state.range.start(), Some(day(2024, 5, 2)));
    assert_eq!(state.range.end(), Some(day(2024, 5, 3)));
    assert_eq!(state.stats.tile(StatTile::TotalRequests), Some(3));
    controller.shutdown().await;
}

/// A failed refresh keeps the previous data and announces the failure
#[tokio::test]
async fn test_failure_keeps_previous_data() {
    init_test_logging();
    let mock = seeded_backend();
    let (controller, recorder) = controller_with(mock.clone(), &test_config(30));
    controller.activate().await.unwrap();
    let loaded = controller.state();

    mock.fail_with("connection reset");
    let result = controller.refresh(RefreshTrigger::Manual).await;
    assert!(matches!(result, Err(DashboardError::Backend { .. })));

    let failed = controller.state();
    assert_eq!(failed.phase, Phase::Loaded);
    assert!(failed.error.as_deref().unwrap().contains("connection reset"));
    assert_eq!(failed.stats, loaded.stats);
    assert_eq!(failed.recent, loaded.recent);
    assert_eq!(
        recorder.notes(),
        vec![(FAILED_MESSAGE.to_string(), Severity::Danger)]
    );

    mock.recover();
    controller.refresh(RefreshTrigger::Interval).await.unwrap();
    assert_eq!(controller.state().error, None);
    controller.shutdown().await;
}

/// A failing first load leaves the dashboard uninitialised but running
#[tokio::test]
async fn test_failed_first_load() {
    init_test_logging();
    let mock = Arc::new(MockRecordService::new().with_failure("backend down"));
    let (controller, recorder) = controller_with(mock.clone(), &test_config(30));
    controller.activate().await.unwrap();

    let state = controller.state();
    assert_eq!(state.phase, Phase::Initializing);
    assert!(state.error.is_some());
    assert!(state.stats.is_empty());
    assert!(controller.is_active());
    assert_eq!(recorder.notes().len(), 1);

    mock.recover();
    controller.refresh(RefreshTrigger::Manual).await.unwrap();
    assert!(controller.state().is_loaded());
    controller.shutdown().await;
}

/// The refresh loop reloads once per interval and stops on shutdown
#[tokio::test(start_paused = true)]
async fn test_periodic_refresh() {
    init_test_logging();
    let mock = seeded_backend();
    let (controller, recorder) = controller_with(mock.clone(), &test_config(30));
    let mut updates = controller.subscribe();
    controller.activate().await.unwrap();

    mock.insert(
        Model::LoadingRequest,
        json!({"id": 6, "name": "LR/0006", "state": "ready_for_loading"}),
    );
    sleep(Duration::from_secs(29)).await;
    assert_eq!(controller.state().stats.tile(StatTile::ReadyForLoading), Some(1));

    sleep(Duration::from_secs(2)).await;
    timeout(Duration::from_secs(5), async {
        loop {
            if updates.borrow_and_update().stats.tile(StatTile::ReadyForLoading) == Some(2) {
                break;
            }
            updates.changed().await.unwrap();
        }
    })
    .await
    .unwrap();
    assert!(recorder.notes().is_empty());

    controller.shutdown().await;
    let calls = mock.calls();
    sleep(Duration::from_secs(120)).await;
    assert_eq!(mock.calls(), calls);
}

/// Queued refreshes run on the loop
#[tokio::test(start_paused = true)]
async fn test_refresh_handle_queues_refresh() {
    init_test_logging();
    let mock = seeded_backend();
    let (controller, recorder) = controller_with(mock.clone(), &test_config(3600));
    controller.activate().await.unwrap();

    // Let the loop start; requests queued before it runs are dropped
    sleep(Duration::from_millis(10)).await;
    let handle = controller.refresh_handle();
    assert!(handle.request(RefreshTrigger::Manual));
    timeout(Duration::from_secs(5), async {
        while recorder.notes().is_empty() {
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(
        recorder.notes(),
        vec![(REFRESHED_MESSAGE.to_string(), Severity::Success)]
    );
    controller.shutdown().await;
}
