//! Backend service contracts consumed by the dashboard
//!
//! The dashboard never talks to storage directly. Every query goes through a
//! [`RecordQueryService`], every drill-down through a [`NavigationService`]
//! and every user-visible message through a [`NotificationService`]. The
//! controller receives all three bundled in [`Services`].

use crate::error::DashboardResult;
use async_trait::async_trait;
use loadboard_core::{Domain, Model};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A backend record as returned by read queries
pub type Record = serde_json::Map<String, Value>;

/// Ordering and paging for list queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// Order clause, e.g. `create_date desc`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,

    /// Maximum number of records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// One row of a group-by query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCount {
    /// Group key as the backend reports it
    pub key: Value,

    /// Number of records in the group
    pub count: u64,
}

/// Record query contract of the host backend
#[async_trait]
pub trait RecordQueryService: Send + Sync {
    /// Count records matching `domain`
    async fn count(&self, model: Model, domain: &Domain) -> DashboardResult<u64>;

    /// Read `fields` of the records matching `domain`
    async fn search_read(
        &self,
        model: Model,
        domain: &Domain,
        fields: &[&str],
        options: &ListOptions,
    ) -> DashboardResult<Vec<Record>>;

    /// Count records matching `domain` per distinct value of `group_by`
    async fn read_group(
        &self,
        model: Model,
        domain: &Domain,
        group_by: &str,
    ) -> DashboardResult<Vec<GroupCount>>;

    /// Read `fields` of the given records; missing ids are skipped
    async fn read_by_ids(
        &self,
        model: Model,
        ids: &[i64],
        fields: &[&str],
    ) -> DashboardResult<Vec<Record>>;

    /// Sum a numeric field over the records matching `domain`
    async fn sum(&self, model: Model, domain: &Domain, field: &str) -> DashboardResult<f64>;
}

/// Request to open a filtered record list in the host application
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListAction {
    /// Window title
    pub name: String,

    /// Target model
    pub model: Model,

    /// View kinds, first one shown
    pub view_modes: Vec<String>,

    /// Filter applied to the list
    pub domain: Domain,
}

impl ListAction {
    /// Action listing `model` records matching `domain`
    #[must_use]
    pub fn for_model(model: Model, domain: Domain) -> Self {
        Self {
            name: model.display_name().to_string(),
            model,
            view_modes: model.view_modes().iter().map(ToString::to_string).collect(),
            domain,
        }
    }

    /// Window action in the backend's `act_window` shape
    #[must_use]
    pub fn to_act_window(&self) -> Value {
        json!({
            "name": self.name,
            "type": "ir.actions.act_window",
            "res_model": self.model.as_str(),
            "view_mode": self.view_modes.join(","),
            "domain": self.domain,
            "context": {},
        })
    }
}

/// View-opening contract of the host application
pub trait NavigationService: Send + Sync {
    /// Open a list scoped to the action's domain; fire-and-forget
    fn open_filtered_list(&self, action: ListAction);
}

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational
    Info,
    /// Operation succeeded
    Success,
    /// Needs attention
    Warning,
    /// Operation failed
    Danger,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Danger => "danger",
        })
    }
}

/// Transient message contract of the host application
pub trait NotificationService: Send + Sync {
    /// Show `message` to the user
    fn notify(&self, message: &str, severity: Severity);
}

/// Service bundle handed to the controller at construction
#[derive(Clone)]
pub struct Services {
    /// Record queries
    pub query: Arc<dyn RecordQueryService>,

    /// Drill-down navigation
    pub navigation: Arc<dyn NavigationService>,

    /// User notifications
    pub notifications: Arc<dyn NotificationService>,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

/// Notifications written to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl NotificationService for TracingNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info | Severity::Success => info!(%severity, "{message}"),
            Severity::Warning => warn!(%severity, "{message}"),
            Severity::Danger => error!(%severity, "{message}"),
        }
    }
}

/// Navigation requests written to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNavigator;

impl NavigationService for TracingNavigator {
    fn open_filtered_list(&self, action: ListAction) {
        info!(
            model = %action.model,
            name = %action.name,
            domain = %serde_json::to_string(&action.domain).unwrap_or_default(),
            "Opening filtered list"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadboard_core::Operator;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_act_window_shape() {
        let domain = Domain::new().with("state", Operator::Eq, "ready_for_loading");
        let action = ListAction::for_model(Model::LoadingRequest, domain);

        assert_eq!(
            action.to_act_window(),
            json!({
                "name": "Loading Requests",
                "type": "ir.actions.act_window",
                "res_model": "ice.loading.request",
                "view_mode": "kanban,list,form",
                "domain": [["state", "=", "ready_for_loading"]],
                "context": {},
            })
        );
    }

    #[test]
    fn test_vehicle_action_uses_list_view() {
        let action = ListAction::for_model(Model::FleetVehicle, Domain::new());
        assert_eq!(action.view_modes, vec!["list", "form"]);
        assert_eq!(action.name, "Fleet Vehicles");
    }

    #[test]
    fn test_list_options_skip_unset_fields() {
        let options = ListOptions {
            order: Some("create_date desc".to_string()),
            limit: None,
        };
        assert_eq!(
            serde_json::to_value(&options).unwrap_or_default(),
            json!({"order": "create_date desc"})
        );
    }
}
