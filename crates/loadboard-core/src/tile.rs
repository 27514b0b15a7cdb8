//! Dashboard tile catalogue

use crate::types::Model;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A summary counter shown on the dashboard, with a drill-down action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatTile {
    /// Every request in range
    TotalRequests,
    /// Priority 1 requests not yet cancelled or done
    UrgentRequests,
    /// Requests in `draft`
    DraftRequests,
    /// Requests in `car_checking`
    CarChecking,
    /// Requests in `ready_for_loading`
    ReadyForLoading,
    /// Requests in `loading`
    Loading,
    /// Requests in `ice_handled`
    IceHandled,
    /// Requests in `plugged`
    Plugged,
    /// Requests out on delivery (first or second loading)
    InTransit,
    /// Requests in a second loading cycle
    SecondLoading,
    /// Requests in `delivered`
    Delivered,
    /// Requests in `done`
    DoneRequests,
    /// Warehouse-checked requests with no cash payment recorded
    PendingCashCollection,
    /// Warehouse-checked requests whose car has not come back
    PendingCarReturn,
    /// Vehicles available for loading
    AvailableCars,
    /// Vehicles engaged in a loading cycle
    BusyCars,
}

impl StatTile {
    /// Every tile, in display order
    pub const ALL: [Self; 16] = [
        Self::TotalRequests,
        Self::UrgentRequests,
        Self::DraftRequests,
        Self::CarChecking,
        Self::ReadyForLoading,
        Self::Loading,
        Self::IceHandled,
        Self::Plugged,
        Self::InTransit,
        Self::SecondLoading,
        Self::Delivered,
        Self::DoneRequests,
        Self::PendingCashCollection,
        Self::PendingCarReturn,
        Self::AvailableCars,
        Self::BusyCars,
    ];

    /// Stable snake_case key used in the stats record
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::TotalRequests => "total_requests",
            Self::UrgentRequests => "urgent_requests",
            Self::DraftRequests => "draft_requests",
            Self::CarChecking => "car_checking",
            Self::ReadyForLoading => "ready_for_loading",
            Self::Loading => "loading",
            Self::IceHandled => "ice_handled",
            Self::Plugged => "plugged",
            Self::InTransit => "in_transit",
            Self::SecondLoading => "second_loading",
            Self::Delivered => "delivered",
            Self::DoneRequests => "done_requests",
            Self::PendingCashCollection => "pending_cash_collection",
            Self::PendingCarReturn => "pending_car_return",
            Self::AvailableCars => "available_cars",
            Self::BusyCars => "busy_cars",
        }
    }

    /// Human readable tile caption
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::TotalRequests => "Total Requests",
            Self::UrgentRequests => "Urgent Requests",
            Self::DraftRequests => "Draft",
            Self::CarChecking => "Car Checking",
            Self::ReadyForLoading => "Ready for Loading",
            Self::Loading => "Loading",
            Self::IceHandled => "Ice Handled",
            Self::Plugged => "Plugged",
            Self::InTransit => "In Transit",
            Self::SecondLoading => "Second Loading",
            Self::Delivered => "Delivered",
            Self::DoneRequests => "Done",
            Self::PendingCashCollection => "Pending Cash Collection",
            Self::PendingCarReturn => "Pending Car Return",
            Self::AvailableCars => "Available Cars",
            Self::BusyCars => "Busy Cars",
        }
    }

    /// Model the tile counts
    #[must_use]
    pub const fn model(self) -> Model {
        match self {
            Self::AvailableCars | Self::BusyCars => Model::FleetVehicle,
            _ => Model::LoadingRequest,
        }
    }
}

impl fmt::Display for StatTile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for StatTile {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|tile| tile.key() == wanted)
            .ok_or_else(|| crate::Error::validation("tile", format!("unknown tile '{s}'")))
    }
}
