//! Domain types shared by the dashboard crates
//!
//! Backend selection codes (request state, priority, vehicle loading status)
//! are modelled as exhaustive enums with an `Other` fallback variant, so every
//! code the backend can send maps to a value and every mapping over them is
//! total.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer, ser::SerializeTuple};
use std::fmt;
use tracing::warn;

/// Backend models the dashboard reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Model {
    /// `ice.loading.request`
    #[serde(rename = "ice.loading.request")]
    LoadingRequest,
    /// `fleet.vehicle`
    #[serde(rename = "fleet.vehicle")]
    FleetVehicle,
}

impl Model {
    /// Technical model name on the backend
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoadingRequest => "ice.loading.request",
            Self::FleetVehicle => "fleet.vehicle",
        }
    }

    /// Window title used when opening a list of this model
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::LoadingRequest => "Loading Requests",
            Self::FleetVehicle => "Fleet Vehicles",
        }
    }

    /// View kinds offered when drilling into this model
    #[must_use]
    pub const fn view_modes(self) -> &'static [&'static str] {
        match self {
            Self::LoadingRequest => &["kanban", "list", "form"],
            Self::FleetVehicle => &["list", "form"],
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a loading request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LoadingState {
    /// `draft`
    Draft,
    /// `car_checking`
    CarChecking,
    /// `ready_for_loading`
    ReadyForLoading,
    /// `loading`
    Loading,
    /// `ready_for_second_loading`
    ReadyForSecondLoading,
    /// `started_second_loading`
    StartedSecondLoading,
    /// `ice_handled`
    IceHandled,
    /// `plugged`
    Plugged,
    /// `delivering`
    Delivering,
    /// `second_loading_delivering`
    SecondLoadingDelivering,
    /// `session_closed`
    SessionClosed,
    /// `delivered`
    Delivered,
    /// `done`
    Done,
    /// `cancelled`
    Cancelled,
    /// Any code not known to this build
    Other(String),
}

impl LoadingState {
    /// Every known state, in workflow order
    pub const KNOWN: [Self; 14] = [
        Self::Draft,
        Self::CarChecking,
        Self::ReadyForLoading,
        Self::Loading,
        Self::ReadyForSecondLoading,
        Self::StartedSecondLoading,
        Self::IceHandled,
        Self::Plugged,
        Self::Delivering,
        Self::SecondLoadingDelivering,
        Self::SessionClosed,
        Self::Delivered,
        Self::Done,
        Self::Cancelled,
    ];

    /// Parse a backend selection code
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "draft" => Self::Draft,
            "car_checking" => Self::CarChecking,
            "ready_for_loading" => Self::ReadyForLoading,
            "loading" => Self::Loading,
            "ready_for_second_loading" => Self::ReadyForSecondLoading,
            "started_second_loading" => Self::StartedSecondLoading,
            "ice_handled" => Self::IceHandled,
            "plugged" => Self::Plugged,
            "delivering" => Self::Delivering,
            "second_loading_delivering" => Self::SecondLoadingDelivering,
            "session_closed" => Self::SessionClosed,
            "delivered" => Self::Delivered,
            "done" => Self::Done,
            "cancelled" => Self::Cancelled,
            other => Self::Other(other.to_string()),
        }
    }

    /// Backend selection code
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Draft => "draft",
            Self::CarChecking => "car_checking",
            Self::ReadyForLoading => "ready_for_loading",
            Self::Loading => "loading",
            Self::ReadyForSecondLoading => "ready_for_second_loading",
            Self::StartedSecondLoading => "started_second_loading",
            Self::IceHandled => "ice_handled",
            Self::Plugged => "plugged",
            Self::Delivering => "delivering",
            Self::SecondLoadingDelivering => "second_loading_delivering",
            Self::SessionClosed => "session_closed",
            Self::Delivered => "delivered",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::Other(code) => code,
        }
    }
}

impl From<String> for LoadingState {
    fn from(code: String) -> Self {
        Self::from_code(&code)
    }
}

impl From<LoadingState> for String {
    fn from(state: LoadingState) -> Self {
        state.code().to_string()
    }
}

impl fmt::Display for LoadingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Loading priority; lower numbers are more urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Priority {
    /// 1
    Urgent,
    /// 2
    High,
    /// 3
    Normal,
    /// Any other numeric code
    Other(i64),
}

impl Priority {
    /// Parse a numeric priority code
    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Urgent,
            2 => Self::High,
            3 => Self::Normal,
            other => Self::Other(other),
        }
    }

    /// Numeric priority code
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Urgent => 1,
            Self::High => 2,
            Self::Normal => 3,
            Self::Other(code) => code,
        }
    }
}

impl From<i64> for Priority {
    fn from(code: i64) -> Self {
        Self::from_code(code)
    }
}

impl From<Priority> for i64 {
    fn from(priority: Priority) -> Self {
        priority.code()
    }
}

/// Loading status of a fleet vehicle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VehicleStatus {
    /// `available`
    Available,
    /// `in_use`
    InUse,
    /// `ready_for_loading`
    ReadyForLoading,
    /// `plugged`
    Plugged,
    /// `not_available`
    NotAvailable,
    /// Any code not known to this build
    Other(String),
}

impl VehicleStatus {
    /// Parse a backend selection code
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "available" => Self::Available,
            "in_use" => Self::InUse,
            "ready_for_loading" => Self::ReadyForLoading,
            "plugged" => Self::Plugged,
            "not_available" => Self::NotAvailable,
            other => Self::Other(other.to_string()),
        }
    }

    /// Backend selection code
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Available => "available",
            Self::InUse => "in_use",
            Self::ReadyForLoading => "ready_for_loading",
            Self::Plugged => "plugged",
            Self::NotAvailable => "not_available",
            Self::Other(code) => code,
        }
    }
}

impl From<String> for VehicleStatus {
    fn from(code: String) -> Self {
        Self::from_code(&code)
    }
}

impl From<VehicleStatus> for String {
    fn from(status: VehicleStatus) -> Self {
        status.code().to_string()
    }
}

/// Comparison operator of a domain condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// `=`
    #[serde(rename = "=")]
    Eq,
    /// `!=`
    #[serde(rename = "!=")]
    Ne,
    /// `>=`
    #[serde(rename = ">=")]
    Ge,
    /// `<=`
    #[serde(rename = "<=")]
    Le,
    /// `in`
    #[serde(rename = "in")]
    In,
    /// `not in`
    #[serde(rename = "not in")]
    NotIn,
}

/// Right-hand side of a domain condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DomainValue {
    /// Boolean, also used for "unset relation" (`false`)
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// Text, including formatted datetimes
    Text(String),
    /// Membership list
    List(Vec<DomainValue>),
}

impl From<bool> for DomainValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for DomainValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for DomainValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for DomainValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&LoadingState> for DomainValue {
    fn from(state: &LoadingState) -> Self {
        Self::Text(state.code().to_string())
    }
}

impl From<&VehicleStatus> for DomainValue {
    fn from(status: &VehicleStatus) -> Self {
        Self::Text(status.code().to_string())
    }
}

impl<T: Into<Self>> From<Vec<T>> for DomainValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// A single `(field, operator, value)` triple
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Field name
    pub field: String,
    /// Operator
    pub operator: Operator,
    /// Value
    pub value: DomainValue,
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(&self.field)?;
        tuple.serialize_element(&self.operator)?;
        tuple.serialize_element(&self.value)?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (field, operator, value) = <(String, Operator, DomainValue)>::deserialize(deserializer)?;
        Ok(Self {
            field,
            operator,
            value,
        })
    }
}

/// Conjunction of conditions, serialised as the backend's domain list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Domain(Vec<Condition>);

impl Domain {
    /// Empty domain, matching every record
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Add a condition
    #[must_use]
    pub fn with(
        mut self,
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<DomainValue>,
    ) -> Self {
        self.0.push(Condition {
            field: field.into(),
            operator,
            value: value.into(),
        });
        self
    }

    /// Conjunction of both domains
    #[must_use]
    pub fn and(mut self, other: Self) -> Self {
        self.0.extend(other.0);
        self
    }

    /// Conditions in declaration order
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.0
    }

    /// True when the domain matches every record
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Inclusive day range applied to `dispatch_time`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl DateRange {
    /// Datetime layout the backend uses for stored timestamps
    pub const DATETIME_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S";

    /// Build a range; reversed bounds are swapped
    #[must_use]
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        match (start, end) {
            (Some(s), Some(e)) if s > e => {
                warn!(start = %s, end = %e, "Date range start is after end, swapping bounds");
                Self {
                    start: Some(e),
                    end: Some(s),
                }
            }
            _ => Self { start, end },
        }
    }

    /// Range with no bounds
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    /// Range covering exactly one day
    #[must_use]
    pub const fn single_day(day: NaiveDate) -> Self {
        Self {
            start: Some(day),
            end: Some(day),
        }
    }

    /// Range covering the current UTC day
    ///
    /// Dispatch times are stored in UTC, so the day boundary is UTC midnight.
    #[must_use]
    pub fn today() -> Self {
        Self::day_of(Utc::now())
    }

    /// Range covering the UTC day that contains `now`
    #[must_use]
    pub fn day_of(now: DateTime<Utc>) -> Self {
        Self::single_day(now.date_naive())
    }

    /// Start day, if bounded
    #[must_use]
    pub const fn start(&self) -> Option<NaiveDate> {
        self.start
    }

    /// End day, if bounded
    #[must_use]
    pub const fn end(&self) -> Option<NaiveDate> {
        self.end
    }

    /// Replace the start day, keeping the range ordered
    #[must_use]
    pub fn with_start(self, start: Option<NaiveDate>) -> Self {
        Self::new(start, self.end)
    }

    /// Replace the end day, keeping the range ordered
    #[must_use]
    pub fn with_end(self, end: Option<NaiveDate>) -> Self {
        Self::new(self.start, end)
    }

    /// Lower bound formatted as a backend datetime (`00:00:00`)
    #[must_use]
    pub fn start_bound(&self) -> Option<String> {
        self.start
            .map(|day| format!("{} 00:00:00", day.format("%Y-%m-%d")))
    }

    /// Upper bound formatted as a backend datetime (`23:59:59`)
    #[must_use]
    pub fn end_bound(&self) -> Option<String> {
        self.end
            .map(|day| format!("{} 23:59:59", day.format("%Y-%m-%d")))
    }

    /// Parse a `YYYY-MM-DD` day
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidDate`] when the input is not a valid day.
    pub fn parse_day(input: &str) -> crate::Result<NaiveDate> {
        NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").map_err(|source| {
            crate::Error::InvalidDate {
                input: input.to_string(),
                source,
            }
        })
    }
}

/// Reference to a related record, `[id, display_name]` on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Many2One {
    /// Related record id
    pub id: i64,
    /// Related record display name
    pub name: String,
}

/// Serde adapters for the backend's "relation or `false`" encoding
pub mod relation {
    use super::Many2One;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Pair(i64, String),
        Id(i64),
        Unset(bool),
        Null(()),
    }

    /// Deserialize `[id, name]`, a bare id, `false` or `null`
    ///
    /// # Errors
    ///
    /// Fails when the value has none of the accepted shapes.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Many2One>, D::Error> {
        Ok(match Wire::deserialize(deserializer)? {
            Wire::Pair(id, name) => Some(Many2One { id, name }),
            Wire::Id(id) => Some(Many2One {
                id,
                name: String::new(),
            }),
            Wire::Unset(_) | Wire::Null(()) => None,
        })
    }

    /// Serialize `None` as `false`, anything else as itself
    ///
    /// # Errors
    ///
    /// Propagates the inner serializer error.
    pub fn serialize_or_false<T: Serialize, S: Serializer>(
        value: &Option<T>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_bool(false),
        }
    }
}
