//! Delta comparisons ("+1:20 vs yesterday") and the formatting helpers shared by
//! the tracker and the analytics.

use chrono::{Days, Timelike};
use serde::{Deserialize, Serialize};

use crate::clock::local_time;
use crate::Trip;

/// Differences smaller than this are reported as [`DeltaType::Same`].
pub const SAME_THRESHOLD_MS: i64 = 30_000;

/// Reported when there are no trips to average.
pub const DEFAULT_DEPARTURE: &str = "08:00";

const WEEK_MS: i64 = 7 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum DeltaType {
    Faster,
    Slower,
    Same,
}

/// Signed difference between two durations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct DeltaComparison {
    /// `current - comparison` in milliseconds; negative is faster
    pub value: i64,
    #[serde(rename = "type")]
    pub delta_type: DeltaType,
    /// `+M:SS` or `-M:SS`
    pub formatted: String,
}

/// A trip measured against its own history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TripComparison {
    /// Against a trip on the same route the previous calendar day
    pub vs_yesterday: Option<DeltaComparison>,
    /// Against the mean of the same route's trips in the preceding 7 days
    pub vs_weekly_average: Option<DeltaComparison>,
    /// Against the fastest other trip on the same route
    pub vs_personal_best: Option<DeltaComparison>,
    /// This trip's departure, `HH:MM` local
    pub departure: String,
    /// Mean departure of the other trips on the route, `HH:MM` local
    pub usual_departure: String,
}

/// Compare `current` against `comparison` (both milliseconds).
///
/// # Example
///
/// ```rust
/// use delta_tracker::{calculate_delta, DeltaType};
///
/// let delta = calculate_delta(25 * 60_000, 23 * 60_000 + 40_000);
/// assert_eq!(delta.delta_type, DeltaType::Slower);
/// assert_eq!(delta.formatted, "+1:20");
/// ```
pub fn calculate_delta(current: i64, comparison: i64) -> DeltaComparison {
    let difference = current - comparison;

    let delta_type = if difference.abs() < SAME_THRESHOLD_MS {
        DeltaType::Same
    } else if difference < 0 {
        DeltaType::Faster
    } else {
        DeltaType::Slower
    };
    let sign = if difference >= 0 { '+' } else { '-' };

    DeltaComparison {
        value: difference,
        delta_type,
        formatted: format!("{}{}", sign, format_duration(difference.abs())),
    }
}

/// Format milliseconds as `M:SS`. Negative durations format as `0:00`.
pub fn format_duration(millis: i64) -> String {
    let total_seconds = millis.max(0) / 1000;
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

/// Local wall-clock time of a timestamp as `HH:MM`.
pub fn format_time(millis: i64) -> String {
    let local = local_time(millis);
    format!("{:02}:{:02}", local.hour(), local.minute())
}

/// Local minutes since midnight of a timestamp.
pub(crate) fn minute_of_day(millis: i64) -> u32 {
    let local = local_time(millis);
    local.hour() * 60 + local.minute()
}

/// Mean local departure time of `trips` as `HH:MM`, `08:00` when empty.
pub fn average_departure(trips: &[Trip]) -> String {
    mean_departure(trips)
}

pub(crate) fn mean_departure<'a, I>(trips: I) -> String
where
    I: IntoIterator<Item = &'a Trip>,
{
    let (count, total) = trips.into_iter().fold((0u64, 0u64), |(n, sum), t| {
        (n + 1, sum + u64::from(minute_of_day(t.start_time)))
    });
    if count == 0 {
        return DEFAULT_DEPARTURE.to_string();
    }

    let average = (total as f64 / count as f64).round() as u64;
    format!("{:02}:{:02}", average / 60, average % 60)
}

/// Measure `trip` against the other trips on its route in `history`.
pub fn compare_trip(history: &[Trip], trip: &Trip) -> TripComparison {
    let others: Vec<Trip> = history
        .iter()
        .filter(|t| t.route_id == trip.route_id && t.id != trip.id)
        .cloned()
        .collect();

    let yesterday = local_time(trip.start_time)
        .date_naive()
        .checked_sub_days(Days::new(1));
    let vs_yesterday = yesterday
        .and_then(|day| {
            others
                .iter()
                .find(|t| local_time(t.start_time).date_naive() == day)
        })
        .map(|t| calculate_delta(trip.duration, t.duration));

    let week_start = trip.start_time - WEEK_MS;
    let weekly: Vec<i64> = others
        .iter()
        .filter(|t| t.start_time >= week_start && t.start_time < trip.start_time)
        .map(|t| t.duration)
        .collect();
    let vs_weekly_average = if weekly.is_empty() {
        None
    } else {
        let mean = weekly.iter().sum::<i64>() as f64 / weekly.len() as f64;
        Some(calculate_delta(trip.duration, mean.round() as i64))
    };

    let vs_personal_best = others
        .iter()
        .map(|t| t.duration)
        .min()
        .map(|best| calculate_delta(trip.duration, best));

    TripComparison {
        vs_yesterday,
        vs_weekly_average,
        vs_personal_best,
        departure: format_time(trip.start_time),
        usual_departure: average_departure(&others),
    }
}
