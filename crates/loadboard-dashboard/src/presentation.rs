//! Labels, colors and classes for raw backend codes
//!
//! Every mapping here is total: unknown codes get a readable fallback and
//! nothing in this module can fail.

use crate::fetcher::{FetchedBatch, RequestRow, VehicleRow};
use crate::state::{
    DashboardSnapshot, DistributionEntry, RecentRequestView, VehicleSummary, WeightSummary,
};
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use loadboard_core::config::DisplayConfig;
use loadboard_core::{LoadingState, Many2One, Priority, VehicleStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;

/// Color used for anything without a dedicated one
pub const NEUTRAL_COLOR: &str = "#6c757d";

/// Human readable label of a request state; unknown codes are shown verbatim
#[must_use]
pub fn state_label(state: &LoadingState) -> String {
    match state {
        LoadingState::Draft => "Draft",
        LoadingState::CarChecking => "Car Checking",
        LoadingState::ReadyForLoading => "Ready for Loading",
        LoadingState::Loading => "Loading",
        LoadingState::ReadyForSecondLoading => "Ready for Second Loading",
        LoadingState::StartedSecondLoading => "Started Second Loading",
        LoadingState::IceHandled => "Ice Handled",
        LoadingState::Plugged => "Plugged",
        LoadingState::Delivering => "Delivering",
        LoadingState::SecondLoadingDelivering => "Second Loading Delivering",
        LoadingState::SessionClosed => "Session Closed",
        LoadingState::Delivered => "Delivered",
        LoadingState::Done => "Done",
        LoadingState::Cancelled => "Cancelled",
        LoadingState::Other(code) => code.as_str(),
    }
    .to_string()
}

/// Chart color of a request state
#[must_use]
pub const fn state_color(state: &LoadingState) -> &'static str {
    match state {
        LoadingState::CarChecking => "#ffc107",
        LoadingState::ReadyForLoading => "#fd7e14",
        LoadingState::Loading => "#0d6efd",
        LoadingState::ReadyForSecondLoading => "#20c997",
        LoadingState::StartedSecondLoading => "#17a2b8",
        LoadingState::IceHandled => "#e83e8c",
        LoadingState::Plugged => "#28a745",
        LoadingState::Delivering | LoadingState::SecondLoadingDelivering => "#dc3545",
        LoadingState::SessionClosed => "#6f42c1",
        LoadingState::Delivered => "#343a40",
        LoadingState::Done => "#198754",
        LoadingState::Draft | LoadingState::Cancelled | LoadingState::Other(_) => NEUTRAL_COLOR,
    }
}

/// Badge class of a request state, `o_field_badge_<code>`
#[must_use]
pub fn state_class(state: &LoadingState) -> String {
    format!("o_field_badge_{}", state.code())
}

/// Bootstrap background class of a request state
#[must_use]
pub const fn state_background(state: &LoadingState) -> &'static str {
    match state {
        LoadingState::CarChecking => "bg-warning",
        LoadingState::ReadyForLoading | LoadingState::Loading => "bg-primary",
        LoadingState::ReadyForSecondLoading | LoadingState::StartedSecondLoading => "bg-info",
        LoadingState::IceHandled | LoadingState::Plugged | LoadingState::Done => "bg-success",
        LoadingState::Delivering | LoadingState::SecondLoadingDelivering => "bg-danger",
        LoadingState::Delivered | LoadingState::SessionClosed => "bg-dark",
        LoadingState::Draft | LoadingState::Cancelled | LoadingState::Other(_) => "bg-secondary",
    }
}

/// Icon of a request state; unknown codes get `❓`
#[must_use]
pub const fn state_icon(state: &LoadingState) -> &'static str {
    match state {
        LoadingState::Draft => "📝",
        LoadingState::CarChecking => "🔧",
        LoadingState::ReadyForLoading => "📦",
        LoadingState::Loading
        | LoadingState::ReadyForSecondLoading
        | LoadingState::StartedSecondLoading => "⏳",
        LoadingState::IceHandled => "❄️🚛",
        LoadingState::Plugged => "🔌",
        LoadingState::Delivering | LoadingState::SecondLoadingDelivering => "🚚",
        LoadingState::SessionClosed => "🔒",
        LoadingState::Delivered => "✅",
        LoadingState::Done => "🏁",
        LoadingState::Cancelled => "❌",
        LoadingState::Other(_) => "❓",
    }
}

/// Icon shown for an unset or unknown priority
pub const NEUTRAL_PRIORITY_ICON: &str = "⚪";

/// Icon of a priority; codes outside 1..=4 get [`NEUTRAL_PRIORITY_ICON`]
#[must_use]
pub const fn priority_icon(priority: Priority) -> &'static str {
    match priority {
        Priority::Urgent => "🔴",
        Priority::High => "🟠",
        Priority::Normal => "🟡",
        Priority::Other(4) => "🟢",
        Priority::Other(_) => NEUTRAL_PRIORITY_ICON,
    }
}

/// Label of a priority; codes outside 1..=3 read `Priority {n}`
#[must_use]
pub fn priority_label(priority: Priority) -> String {
    match priority {
        Priority::Urgent => "Urgent".to_string(),
        Priority::High => "High".to_string(),
        Priority::Normal => "Normal".to_string(),
        Priority::Other(code) => format!("Priority {code}"),
    }
}

/// Chart color of a priority
#[must_use]
pub const fn priority_color(priority: Priority) -> &'static str {
    match priority {
        Priority::Urgent => "#dc3545",
        Priority::High => "#fd7e14",
        Priority::Normal => "#ffc107",
        Priority::Other(_) => NEUTRAL_COLOR,
    }
}

/// Badge class of a priority; empty for unknown codes
#[must_use]
pub fn priority_class(priority: Priority) -> String {
    match priority {
        Priority::Other(_) => String::new(),
        known => format!("o_priority_badge_{}", known.code()),
    }
}

/// Label of a vehicle loading status
#[must_use]
pub fn vehicle_status_label(status: &VehicleStatus) -> String {
    match status {
        VehicleStatus::Available => "Available",
        VehicleStatus::InUse => "In Use",
        VehicleStatus::ReadyForLoading => "Ready for Loading",
        VehicleStatus::Plugged => "Plugged",
        VehicleStatus::NotAvailable => "Not Available",
        VehicleStatus::Other(code) => code.as_str(),
    }
    .to_string()
}

/// Bootstrap background class of a vehicle loading status
#[must_use]
pub const fn vehicle_status_class(status: &VehicleStatus) -> &'static str {
    match status {
        VehicleStatus::Available => "bg-success",
        VehicleStatus::InUse => "bg-warning",
        VehicleStatus::ReadyForLoading => "bg-info",
        VehicleStatus::Plugged => "bg-primary",
        VehicleStatus::NotAvailable | VehicleStatus::Other(_) => "bg-secondary",
    }
}

/// Load as a share of capacity, in `[0, 100]`
///
/// A non-positive `max` yields 0.
#[must_use]
pub fn weight_percentage(current: f64, max: f64) -> f64 {
    if max <= 0.0 || max.is_nan() || current.is_nan() {
        return 0.0;
    }
    (current / max * 100.0).clamp(0.0, 100.0)
}

/// Rounded [`weight_percentage`]
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn efficiency(current: f64, max: f64) -> u8 {
    weight_percentage(current, max).round() as u8
}

/// Load band of a weight percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightBand {
    /// Below 75%
    Safe,
    /// 75% up to 90%
    Warning,
    /// 90% and above
    Danger,
}

impl WeightBand {
    /// Band of `percentage`
    #[must_use]
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 90.0 {
            Self::Danger
        } else if percentage >= 75.0 {
            Self::Warning
        } else {
            Self::Safe
        }
    }

    /// Band of `current` against `max`
    #[must_use]
    pub fn of(current: f64, max: f64) -> Self {
        Self::from_percentage(weight_percentage(current, max))
    }

    /// Short name, also the efficiency label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }

    /// Progress bar class
    #[must_use]
    pub const fn css_class(self) -> &'static str {
        match self {
            Self::Safe => "o_weight_progress_safe",
            Self::Warning => "o_weight_progress_warning",
            Self::Danger => "o_weight_progress_danger",
        }
    }

    /// Bootstrap background class
    #[must_use]
    pub const fn background(self) -> &'static str {
        match self {
            Self::Safe => "bg-success",
            Self::Warning => "bg-warning",
            Self::Danger => "bg-danger",
        }
    }
}

/// Weight with a unit: tonnes from 1000 kg up, kilograms below
#[must_use]
pub fn format_weight(kg: f64) -> String {
    if kg >= 1000.0 {
        format!("{:.1} T", kg / 1000.0)
    } else {
        format!("{kg:.1} kg")
    }
}

/// Progress caption `"{current}/{max} kg"`
#[must_use]
pub fn progress_text(current: f64, max: f64) -> String {
    format!("{current}/{max} kg")
}

/// Renders backend UTC timestamps in the viewer's zone
#[derive(Debug, Clone)]
pub struct TimeFormatter {
    offset: Option<FixedOffset>,
    date_format: String,
    time_format: String,
}

impl Default for TimeFormatter {
    fn default() -> Self {
        Self::new(None, "%d/%m/%Y", "%H:%M")
    }
}

impl TimeFormatter {
    /// Formatter for a fixed offset, or the host zone when `offset` is `None`
    #[must_use]
    pub fn new(offset: Option<FixedOffset>, date_format: &str, time_format: &str) -> Self {
        Self {
            offset,
            date_format: date_format.to_string(),
            time_format: time_format.to_string(),
        }
    }

    /// Formatter described by the display settings
    ///
    /// # Errors
    ///
    /// Returns an error when the configured offset is malformed.
    pub fn from_config(display: &DisplayConfig) -> loadboard_core::Result<Self> {
        Ok(Self::new(
            display.offset()?,
            &display.date_format,
            &display.time_format,
        ))
    }

    fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(raw.trim(), loadboard_core::DateRange::DATETIME_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    fn render<Tz: TimeZone>(&self, at: &DateTime<Tz>, with_time: bool) -> Option<String>
    where
        Tz::Offset: std::fmt::Display,
    {
        let mut out = String::new();
        write!(out, "{}", at.format(&self.date_format)).ok()?;
        if with_time {
            write!(out, " {}", at.format(&self.time_format)).ok()?;
        }
        Some(out)
    }

    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        match self.offset {
            Some(offset) => at.with_timezone(&offset).date_naive(),
            None => at.with_timezone(&Local).date_naive(),
        }
    }

    fn render_in_zone(&self, at: DateTime<Utc>, with_time: bool) -> Option<String> {
        match self.offset {
            Some(offset) => self.render(&at.with_timezone(&offset), with_time),
            None => self.render(&at.with_timezone(&Local), with_time),
        }
    }

    /// Date and short time of a backend timestamp; empty when absent or unparsable
    #[must_use]
    pub fn format_datetime(&self, raw: Option<&str>) -> String {
        raw.and_then(Self::parse_utc)
            .and_then(|at| self.render_in_zone(at, true))
            .unwrap_or_default()
    }

    /// `Today`, `Yesterday`, `N days ago` within a week of `now`, else the date
    #[must_use]
    pub fn relative_date(&self, raw: Option<&str>, now: DateTime<Utc>) -> String {
        let Some(at) = raw.and_then(Self::parse_utc) else {
            return String::new();
        };
        let days = (self.local_date(now) - self.local_date(at)).num_days();
        match days {
            0 => "Today".to_string(),
            1 => "Yesterday".to_string(),
            2..=7 => format!("{days} days ago"),
            _ => self.render_in_zone(at, false).unwrap_or_default(),
        }
    }
}

/// Vehicle summary of a request's vehicle, resolved from `vehicles`
///
/// A vehicle missing from the lookup keeps its id and name with a zero
/// capacity and no status.
fn vehicle_summary(car: Many2One, vehicles: &HashMap<i64, VehicleRow>) -> VehicleSummary {
    let found = vehicles.get(&car.id);
    let name = found
        .and_then(|vehicle| vehicle.name.clone())
        .filter(|_| car.name.is_empty())
        .unwrap_or(car.name);
    let status = found
        .and_then(|vehicle| vehicle.loading_status.as_deref())
        .map(VehicleStatus::from_code);
    VehicleSummary {
        id: car.id,
        name,
        capacity: found.map_or(0.0, |vehicle| vehicle.total_weight_capacity),
        status_label: status.as_ref().map(vehicle_status_label).unwrap_or_default(),
        status_class: status
            .as_ref()
            .map_or(vehicle_status_class(&VehicleStatus::NotAvailable), vehicle_status_class)
            .to_string(),
        status,
    }
}

/// Recent-activity row with its vehicle resolved from `vehicles`
///
/// An unset vehicle stays `None`. `now` anchors the relative dispatch day.
#[must_use]
pub fn recent_view(
    row: RequestRow,
    vehicles: &HashMap<i64, VehicleRow>,
    formatter: &TimeFormatter,
    now: DateTime<Utc>,
) -> RecentRequestView {
    let car = row.car_id.map(|car| vehicle_summary(car, vehicles));
    let capacity = car.as_ref().map_or(0.0, |car| car.capacity);
    let percentage = weight_percentage(row.total_weight, capacity);
    let band = WeightBand::from_percentage(percentage);

    RecentRequestView {
        id: row.id,
        name: row.name.unwrap_or_default(),
        salesman: row.salesman_id.map(|salesman| salesman.name),
        state_label: state_label(&row.state),
        state_class: state_class(&row.state),
        state_background: state_background(&row.state).to_string(),
        state_icon: state_icon(&row.state).to_string(),
        priority_label: row.loading_priority.map(priority_label).unwrap_or_default(),
        priority_class: row.loading_priority.map(priority_class).unwrap_or_default(),
        priority_icon: row
            .loading_priority
            .map_or(NEUTRAL_PRIORITY_ICON, priority_icon)
            .to_string(),
        dispatch_time_formatted: formatter.format_datetime(row.dispatch_time.as_deref()),
        dispatch_day: formatter.relative_date(row.dispatch_time.as_deref(), now),
        state: row.state,
        priority: row.loading_priority,
        dispatch_time: row.dispatch_time,
        total_weight: row.total_weight,
        weight_percentage: percentage,
        efficiency: efficiency(row.total_weight, capacity),
        weight_band: band,
        weight_background: band.background().to_string(),
        car_id: car,
    }
}

/// State chart slices; an unset state is labelled `Undefined`
#[must_use]
pub fn state_slices(groups: Vec<(Option<LoadingState>, u64)>) -> Vec<DistributionEntry<LoadingState>> {
    groups
        .into_iter()
        .map(|(state, count)| DistributionEntry {
            label: state.as_ref().map_or_else(|| "Undefined".to_string(), state_label),
            color: state.as_ref().map_or(NEUTRAL_COLOR, state_color).to_string(),
            category: state,
            count,
        })
        .collect()
}

/// Priority chart slices; an unset priority is labelled `Undefined`
#[must_use]
pub fn priority_slices(groups: Vec<(Option<Priority>, u64)>) -> Vec<DistributionEntry<Priority>> {
    groups
        .into_iter()
        .map(|(priority, count)| DistributionEntry {
            label: priority.map_or_else(|| "Undefined".to_string(), priority_label),
            color: priority.map_or(NEUTRAL_COLOR, priority_color).to_string(),
            category: priority,
            count,
        })
        .collect()
}

/// Shape a fetched batch into view data, with relative days counted from `now`
#[must_use]
pub fn snapshot(batch: FetchedBatch, formatter: &TimeFormatter, now: DateTime<Utc>) -> DashboardSnapshot {
    let FetchedBatch {
        counts,
        recent,
        vehicles,
        states,
        priorities,
        weight_total,
        weight_requests,
    } = batch;

    DashboardSnapshot {
        stats: counts.into_iter().collect(),
        recent: recent
            .into_iter()
            .map(|row| recent_view(row, &vehicles, formatter, now))
            .collect(),
        state_distribution: state_slices(states),
        priority_distribution: priority_slices(priorities),
        weights: WeightSummary::new(weight_total, weight_requests),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(95.0, 100.0, WeightBand::Danger, "o_weight_progress_danger")]
    #[case(80.0, 100.0, WeightBand::Warning, "o_weight_progress_warning")]
    #[case(50.0, 100.0, WeightBand::Safe, "o_weight_progress_safe")]
    fn test_weight_bands(
        #[case] current: f64,
        #[case] max: f64,
        #[case] band: WeightBand,
        #[case] class: &str,
    ) {
        assert_eq!(WeightBand::of(current, max), band);
        assert_eq!(band.css_class(), class);
    }

    #[test]
    fn test_band_edges() {
        assert_eq!(WeightBand::from_percentage(90.0), WeightBand::Danger);
        assert_eq!(WeightBand::from_percentage(75.0), WeightBand::Warning);
        assert_eq!(WeightBand::from_percentage(74.9), WeightBand::Safe);
        assert_eq!(WeightBand::Warning.as_str(), "warning");
    }

    #[test]
    fn test_zero_capacity_is_zero_percent() {
        assert!(weight_percentage(500.0, 0.0).abs() < f64::EPSILON);
        assert!(weight_percentage(500.0, -3.0).abs() < f64::EPSILON);
        assert_eq!(efficiency(500.0, 0.0), 0);
    }

    #[test]
    fn test_overload_is_capped() {
        assert!((weight_percentage(150.0, 100.0) - 100.0).abs() < f64::EPSILON);
        assert_eq!(efficiency(2.0, 3.0), 67);
    }

    #[test]
    fn test_known_state_mapping() {
        let state = LoadingState::ReadyForLoading;
        assert_eq!(state_label(&state), "Ready for Loading");
        assert_eq!(state_color(&state), "#fd7e14");
        assert_eq!(state_class(&state), "o_field_badge_ready_for_loading");
    }

    #[rstest]
    #[case(Priority::Urgent, "Urgent", "#dc3545", "o_priority_badge_1")]
    #[case(Priority::High, "High", "#fd7e14", "o_priority_badge_2")]
    #[case(Priority::Normal, "Normal", "#ffc107", "o_priority_badge_3")]
    #[case(Priority::Other(4), "Priority 4", NEUTRAL_COLOR, "")]
    fn test_priority_mapping(
        #[case] priority: Priority,
        #[case] label: &str,
        #[case] color: &str,
        #[case] class: &str,
    ) {
        assert_eq!(priority_label(priority), label);
        assert_eq!(priority_color(priority), color);
        assert_eq!(priority_class(priority), class);
    }

    #[test]
    fn test_vehicle_status_mapping() {
        assert_eq!(vehicle_status_label(&VehicleStatus::InUse), "In Use");
        assert_eq!(vehicle_status_class(&VehicleStatus::InUse), "bg-warning");
        assert_eq!(
            vehicle_status_class(&VehicleStatus::Other("scrapped".to_string())),
            "bg-secondary"
        );
    }

    #[rstest]
    #[case(LoadingState::Draft, "📝", "bg-secondary")]
    #[case(LoadingState::CarChecking, "🔧", "bg-warning")]
    #[case(LoadingState::ReadyForLoading, "📦", "bg-primary")]
    #[case(LoadingState::Plugged, "🔌", "bg-success")]
    #[case(LoadingState::SecondLoadingDelivering, "🚚", "bg-danger")]
    #[case(LoadingState::Delivered, "✅", "bg-dark")]
    #[case(LoadingState::Done, "🏁", "bg-success")]
    #[case(LoadingState::Cancelled, "❌", "bg-secondary")]
    #[case(LoadingState::Other("archived".to_string()), "❓", "bg-secondary")]
    fn test_state_icon_and_background(
        #[case] state: LoadingState,
        #[case] icon: &str,
        #[case] background: &str,
    ) {
        assert_eq!(state_icon(&state), icon);
        assert_eq!(state_background(&state), background);
    }

    #[rstest]
    #[case(Priority::Urgent, "🔴")]
    #[case(Priority::High, "🟠")]
    #[case(Priority::Normal, "🟡")]
    #[case(Priority::Other(4), "🟢")]
    #[case(Priority::Other(5), "⚪")]
    #[case(Priority::Other(-1), "⚪")]
    fn test_priority_icon(#[case] priority: Priority, #[case] icon: &str) {
        assert_eq!(priority_icon(priority), icon);
    }

    #[test]
    fn test_band_backgrounds() {
        assert_eq!(WeightBand::Safe.background(), "bg-success");
        assert_eq!(WeightBand::Warning.background(), "bg-warning");
        assert_eq!(WeightBand::Danger.background(), "bg-danger");
    }

    #[rstest]
    #[case(1500.0, "1.5 T")]
    #[case(1000.0, "1.0 T")]
    #[case(950.0, "950.0 kg")]
    #[case(0.0, "0.0 kg")]
    fn test_format_weight(#[case] kg: f64, #[case] expected: &str) {
        assert_eq!(format_weight(kg), expected);
    }

    #[test]
    fn test_progress_text() {
        assert_eq!(progress_text(95.0, 100.0), "95/100 kg");
        assert_eq!(progress_text(12.5, 40.0), "12.5/40 kg");
    }

    fn utc_formatter() -> TimeFormatter {
        TimeFormatter::new(FixedOffset::east_opt(0), "%d/%m/%Y", "%H:%M")
    }

    #[test]
    fn test_timestamp_is_read_as_utc() {
        let formatter = TimeFormatter::new(FixedOffset::east_opt(3 * 3600), "%Y-%m-%d", "%H:%M");
        assert_eq!(
            formatter.format_datetime(Some("2024-05-01 22:30:00")),
            "2024-05-02 01:30"
        );
    }

    #[test]
    fn test_missing_timestamp_formats_empty() {
        let formatter = utc_formatter();
        assert_eq!(formatter.format_datetime(None), "");
        assert_eq!(formatter.format_datetime(Some("not a date")), "");
    }

    #[test]
    fn test_relative_dates() {
        let formatter = utc_formatter();
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();

        assert_eq!(formatter.relative_date(Some("2024-05-10 08:00:00"), now), "Today");
        assert_eq!(formatter.relative_date(Some("2024-05-09 23:00:00"), now), "Yesterday");
        assert_eq!(formatter.relative_date(Some("2024-05-05 10:00:00"), now), "5 days ago");
        assert_eq!(formatter.relative_date(Some("2024-04-01 10:00:00"), now), "01/04/2024");
    }

    fn refreshed_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap()
    }

    fn request(car: serde_json::Value) -> RequestRow {
        serde_json::from_value(serde_json::json!({
            "id": 1,
            "name": "LR/0001",
            "car_id": car,
            "salesman_id": [2, "Sam"],
            "state": "ice_handled",
            "dispatch_time": "2024-05-01 06:00:00",
            "loading_priority": 1,
            "total_weight": 950.0,
        }))
        .unwrap()
    }

    #[test]
    fn test_recent_view_resolves_vehicle_capacity() {
        let vehicles = HashMap::from([(
            4,
            VehicleRow {
                id: 4,
                name: Some("TRK-04".to_string()),
                loading_status: Some("in_use".to_string()),
                total_weight_capacity: 1000.0,
            },
        )]);

        let view = recent_view(
            request(serde_json::json!([4, "TRK-04"])),
            &vehicles,
            &utc_formatter(),
            refreshed_at(),
        );

        let car = view.car_id.clone().unwrap();
        assert!((car.capacity - 1000.0).abs() < f64::EPSILON);
        assert_eq!(car.status, Some(VehicleStatus::InUse));
        assert_eq!(car.status_label, "In Use");
        assert_eq!(car.status_class, "bg-warning");
        assert_eq!(view.weight_band, WeightBand::Danger);
        assert_eq!(view.weight_background, "bg-danger");
        assert_eq!(view.efficiency, 95);
        assert_eq!(view.state_label, "Ice Handled");
        assert_eq!(view.state_background, "bg-success");
        assert_eq!(view.state_icon, "❄️🚛");
        assert_eq!(view.priority_class, "o_priority_badge_1");
        assert_eq!(view.priority_icon, "🔴");
        assert_eq!(view.salesman.as_deref(), Some("Sam"));
        assert_eq!(view.dispatch_time_formatted, "01/05/2024 06:00");
        assert_eq!(view.dispatch_day, "Yesterday");
        assert_eq!(view.progress_text(), "950/1000 kg");
    }

    #[test]
    fn test_recent_view_without_car_is_false() {
        let view = recent_view(
            request(serde_json::json!(false)),
            &HashMap::new(),
            &utc_formatter(),
            refreshed_at(),
        );
        assert_eq!(view.car_id, None);
        assert_eq!(serde_json::to_value(&view).unwrap()["car_id"], serde_json::json!(false));
        assert_eq!(view.weight_band, WeightBand::Safe);
        assert_eq!(view.weight_background, "bg-success");
        assert_eq!(view.efficiency, 0);
    }

    #[test]
    fn test_deleted_vehicle_keeps_reference() {
        let view = recent_view(
            request(serde_json::json!([8, "TRK-08"])),
            &HashMap::new(),
            &utc_formatter(),
            refreshed_at(),
        );
        let car = view.car_id.unwrap();
        assert_eq!(car.name, "TRK-08");
        assert!(car.capacity.abs() < f64::EPSILON);
        assert_eq!(car.status, None);
        assert_eq!(car.status_label, "");
        assert_eq!(car.status_class, "bg-secondary");
    }

    #[test]
    fn test_slices_label_unset_category() {
        let slices = state_slices(vec![(Some(LoadingState::Plugged), 4), (None, 1)]);
        assert_eq!(slices[0].label, "Plugged");
        assert_eq!(slices[0].color, "#28a745");
        assert_eq!(slices[1].label, "Undefined");
        assert_eq!(slices[1].color, NEUTRAL_COLOR);

        let slices = priority_slices(vec![(Some(Priority::Other(9)), 2)]);
        assert_eq!(slices[0].label, "Priority 9");
    }

    #[test]
    fn test_snapshot_collects_stats() {
        let batch = FetchedBatch {
            counts: vec![
                (loadboard_core::StatTile::TotalRequests, 12),
                (loadboard_core::StatTile::BusyCars, 3),
            ],
            weight_total: 1200.0,
            weight_requests: 4,
            ..FetchedBatch::default()
        };
        let snapshot = snapshot(batch, &utc_formatter(), refreshed_at());
        assert_eq!(snapshot.stats.get("total_requests"), Some(12));
        assert_eq!(snapshot.stats.get("busy_cars"), Some(3));
        assert!((snapshot.weights.average - 300.0).abs() < f64::EPSILON);
    }

    proptest! {
        #[test]
        fn prop_percentage_is_clamped(current in -1.0e6_f64..1.0e6, max in -1.0e6_f64..1.0e6) {
            let pct = weight_percentage(current, max);
            prop_assert!((0.0..=100.0).contains(&pct));
            if max <= 0.0 {
                prop_assert!(pct.abs() < f64::EPSILON);
            }
        }

        #[test]
        fn prop_unknown_state_falls_back(code in "[a-z_]{1,24}") {
            let state = LoadingState::from_code(&code);
            prop_assume!(matches!(state, LoadingState::Other(_)));
            prop_assert_eq!(state_label(&state), code.clone());
            prop_assert_eq!(state_color(&state), NEUTRAL_COLOR);
            prop_assert_eq!(state_class(&state), format!("o_field_badge_{code}"));
        }

        #[test]
        fn prop_unknown_priority_is_literal(code in 4_i64..10_000) {
            prop_assert_eq!(priority_label(Priority::from_code(code)), format!("Priority {code}"));
        }

        #[test]
        fn prop_every_state_has_an_icon(code in "[a-z_]{1,24}") {
            prop_assert!(!state_icon(&LoadingState::from_code(&code)).is_empty());
        }
    }
}
