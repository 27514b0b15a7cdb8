//! Shared fixtures for the dashboard integration tests

#![allow(dead_code, clippy::unwrap_used)]

use loadboard_core::{DashboardConfig, Model};
use loadboard_dashboard::mock::MockRecordService;
use loadboard_dashboard::{
    DashboardController, ListAction, NavigationService, NotificationService, Services, Severity,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::{Arc, Once};

static INIT_LOGGER: Once = Once::new();

/// Initialize test logging (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    });
}

/// Captures notifications and navigation requests
#[derive(Debug, Default)]
pub struct Recorder {
    pub notes: Mutex<Vec<(String, Severity)>>,
    pub actions: Mutex<Vec<ListAction>>,
}

impl Recorder {
    pub fn notes(&self) -> Vec<(String, Severity)> {
        self.notes.lock().clone()
    }

    pub fn actions(&self) -> Vec<ListAction> {
        self.actions.lock().clone()
    }
}

impl NotificationService for Recorder {
    fn notify(&self, message: &str, severity: Severity) {
        self.notes.lock().push((message.to_string(), severity));
    }
}

impl NavigationService for Recorder {
    fn open_filtered_list(&self, action: ListAction) {
        self.actions.lock().push(action);
    }
}

/// Configuration with every date, UTC display and the given refresh period
pub fn test_config(interval_seconds: u64) -> DashboardConfig {
    let mut config = DashboardConfig::default();
    config.range.unbounded = true;
    config.display.utc_offset = Some("UTC".to_string());
    config.refresh.interval_seconds = interval_seconds;
    config
}

/// Controller over `mock` with a recorder for both host services
pub fn controller_with(
    mock: Arc<MockRecordService>,
    config: &DashboardConfig,
) -> (DashboardController, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let services = Services {
        query: mock,
        navigation: recorder.clone(),
        notifications: recorder.clone(),
    };
    (DashboardController::new(services, config).unwrap(), recorder)
}

/// A small fleet and a week of requests
pub fn seeded_backend() -> Arc<MockRecordService> {
    let mock = MockRecordService::new();

    for vehicle in [
        json!({"id": 1, "name": "TRK-01", "loading_status": "available", "total_weight_capacity": 1000.0}),
        json!({"id": 2, "name": "TRK-02", "loading_status": "in_use", "total_weight_capacity": 2000.0}),
        json!({"id": 3, "name": "TRK-03", "loading_status": "plugged", "total_weight_capacity": 1500.0}),
        json!({"id": 4, "name": "TRK-04", "loading_status": "maintenance", "total_weight_capacity": 800.0}),
    ] {
        mock.insert(Model::FleetVehicle, vehicle);
    }

    for request in [
        json!({"id": 1, "name": "LR/0001", "state": "draft", "loading_priority": "3",
               "car_id": false, "salesman_id": [7, "Dana"], "total_weight": 0.0,
               "dispatch_time": "2024-05-01 08:00:00", "create_date": "2024-04-30 10:00:00"}),
        json!({"id": 2, "name": "LR/0002", "state": "ready_for_loading", "loading_priority": "1",
               "car_id": [1, "TRK-01"], "salesman_id": [7, "Dana"], "total_weight": 950.0,
               "dispatch_time": "2024-05-01 09:30:00", "create_date": "2024-04-30 11:00:00"}),
        json!({"id": 3, "name": "LR/0003", "state": "delivering", "loading_priority": "2",
               "car_id": [2, "TRK-02"], "salesman_id": false, "total_weight": 1200.0,
               "dispatch_time": "2024-05-02 07:15:00", "create_date": "2024-05-01 09:00:00",
               "is_warehouse_check": true, "cash_payment_id": false, "is_car_received": false}),
        json!({"id": 4, "name": "LR/0004", "state": "done", "loading_priority": "1",
               "car_id": [3, "TRK-03"], "salesman_id": [8, "Ravi"], "total_weight": 400.0,
               "dispatch_time": "2024-05-03 14:00:00", "create_date": "2024-05-02 08:00:00",
               "is_warehouse_check": true, "cash_payment_id": [5, "CASH/5"], "is_car_received": true}),
        json!({"id": 5, "name": "LR/0005", "state": "cancelled", "loading_priority": "1",
               "car_id": false, "salesman_id": false, "total_weight": 300.0,
               "dispatch_time": "2024-05-03 16:00:00", "create_date": "2024-05-02 09:00:00"}),
    ] {
        mock.insert(Model::LoadingRequest, request);
    }

    Arc::new(mock)
}
