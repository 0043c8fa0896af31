//! # Commute Analytics
//!
//! Pure reads over the trip history. Nothing is cached: every call recomputes
//! from the trips it is given, and every function accepts an empty history.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`trip_analytics`] | Totals, best/worst, consistency score |
//! | [`weekly_patterns`] | One entry per day of week |
//! | [`time_patterns`] | Morning departure hours 06..=10 |
//! | [`trend_analysis`] | Improving / declining / stable over a window |
//! | [`optimal_timing`] | Best and worst departure hour |
//! | [`insights`] | Up to four short natural-language remarks |
//!
//! All functions take an optional route id; `None` analyses every trip.
//! Day-of-week and hour buckets use local time.
//!
//! ## Example
//!
//! ```rust
//! use delta_tracker::analytics;
//!
//! let summary = analytics::trip_analytics(&[], None);
//! assert_eq!(summary.total_trips, 0);
//! assert_eq!(summary.consistency, 0);
//! ```

use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};

use crate::clock::local_time;
use crate::delta::{format_duration, mean_departure, DEFAULT_DEPARTURE};
use crate::Trip;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Default trend window in days.
pub const DEFAULT_TREND_DAYS: u32 = 30;

/// Morning commute hours covered by [`time_patterns`].
const MORNING_HOURS: std::ops::RangeInclusive<u32> = 6..=10;

/// Trend analysis needs at least this many trips in the window.
const MIN_TREND_TRIPS: usize = 4;

/// Relative changes below this percentage are "stable".
const STABLE_CHANGE_PERCENT: f64 = 5.0;

/// Trips needed for full confidence in the optimal timing.
const FULL_CONFIDENCE_TRIPS: f64 = 10.0;

const MAX_INSIGHTS: usize = 4;

const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TripAnalytics {
    pub total_trips: u32,
    /// Milliseconds
    pub average_duration: f64,
    pub best_time: i64,
    pub worst_time: i64,
    /// Meters
    pub total_distance: f64,
    /// km/h, over trips that recorded a positive speed
    pub average_speed: f64,
    /// 0-100
    pub consistency: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct WeeklyPattern {
    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week: u8,
    pub day_name: String,
    pub average_duration: f64,
    pub trip_count: u32,
    /// `HH:MM`
    pub average_departure: String,
    pub consistency: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TimePattern {
    pub hour: u8,
    pub average_duration: f64,
    pub trip_count: u32,
    /// Percentage faster (positive) or slower (negative) than the overall average
    pub efficiency: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TrendAnalysis {
    pub direction: TrendDirection,
    /// Rounded to one decimal place
    pub change_percent: f64,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct OptimalTiming {
    /// `HH:00`
    pub best_departure_time: String,
    /// `HH:00`
    pub worst_departure_time: String,
    /// Milliseconds
    pub time_savings: f64,
    /// 0-100
    pub confidence: u32,
}

/// Thresholds for the insight heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct InsightThresholds {
    /// Consistency above this is praised.
    /// Default: 80
    pub high_consistency: u32,

    /// Consistency below this is flagged.
    /// Default: 50
    pub low_consistency: u32,

    /// Optimal-timing confidence required for a timing suggestion.
    /// Default: 50
    pub min_timing_confidence: u32,

    /// Savings (ms) required for a timing suggestion.
    /// Default: 60000 (1 minute)
    pub min_time_savings: f64,
}

impl Default for InsightThresholds {
    fn default() -> Self {
        Self {
            high_consistency: 80,
            low_consistency: 50,
            min_timing_confidence: 50,
            min_time_savings: 60_000.0,
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn for_route<'a>(trips: &'a [Trip], route_id: Option<&str>) -> Vec<&'a Trip> {
    trips
        .iter()
        .filter(|t| route_id.map_or(true, |id| t.route_id == id))
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn mean_duration(trips: &[&Trip]) -> f64 {
    let durations: Vec<f64> = trips.iter().map(|t| t.duration as f64).collect();
    mean(&durations)
}

/// `max(0, 100 - cv * 100)` rounded, where cv is the coefficient of variation
/// (population standard deviation over mean).
fn consistency_score(durations: &[f64]) -> u32 {
    let average = mean(durations);
    if durations.is_empty() || average <= 0.0 {
        return 0;
    }

    let variance = durations
        .iter()
        .map(|d| (d - average).powi(2))
        .sum::<f64>()
        / durations.len() as f64;
    let score = 100.0 - variance.sqrt() / average * 100.0;
    score.max(0.0).round() as u32
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ============================================================================
// Analyses
// ============================================================================

/// Summary statistics. All-zero when there are no trips.
pub fn trip_analytics(trips: &[Trip], route_id: Option<&str>) -> TripAnalytics {
    let trips = for_route(trips, route_id);
    if trips.is_empty() {
        return TripAnalytics::default();
    }

    let durations: Vec<f64> = trips.iter().map(|t| t.duration as f64).collect();
    let speeds: Vec<f64> = trips
        .iter()
        .filter_map(|t| t.average_speed)
        .filter(|s| *s > 0.0)
        .collect();

    TripAnalytics {
        total_trips: trips.len() as u32,
        average_duration: mean(&durations),
        best_time: trips.iter().map(|t| t.duration).min().unwrap_or(0),
        worst_time: trips.iter().map(|t| t.duration).max().unwrap_or(0),
        total_distance: trips.iter().filter_map(|t| t.distance).sum(),
        average_speed: mean(&speeds),
        consistency: consistency_score(&durations),
    }
}

/// One pattern per day of week, Sunday first. Days without trips report zeros
/// and the default `08:00` departure.
pub fn weekly_patterns(trips: &[Trip], route_id: Option<&str>) -> Vec<WeeklyPattern> {
    let trips = for_route(trips, route_id);
    let mut by_day: [Vec<&Trip>; 7] = Default::default();
    for trip in trips {
        let day = local_time(trip.start_time).weekday().num_days_from_sunday() as usize;
        by_day[day].push(trip);
    }

    by_day
        .iter()
        .enumerate()
        .map(|(day, day_trips)| {
            if day_trips.is_empty() {
                return WeeklyPattern {
                    day_of_week: day as u8,
                    day_name: DAY_NAMES[day].to_string(),
                    average_duration: 0.0,
                    trip_count: 0,
                    average_departure: DEFAULT_DEPARTURE.to_string(),
                    consistency: 0,
                };
            }

            let durations: Vec<f64> = day_trips.iter().map(|t| t.duration as f64).collect();
            WeeklyPattern {
                day_of_week: day as u8,
                day_name: DAY_NAMES[day].to_string(),
                average_duration: mean(&durations),
                trip_count: day_trips.len() as u32,
                average_departure: mean_departure(day_trips.iter().copied()),
                consistency: consistency_score(&durations),
            }
        })
        .collect()
}

/// Departure-hour buckets for 06:00 through 10:59 local.
pub fn time_patterns(trips: &[Trip], route_id: Option<&str>) -> Vec<TimePattern> {
    let trips = for_route(trips, route_id);
    let overall = mean_duration(&trips);

    MORNING_HOURS
        .map(|hour| {
            let hour_trips: Vec<&Trip> = trips
                .iter()
                .copied()
                .filter(|t| local_time(t.start_time).hour() == hour)
                .collect();

            if hour_trips.is_empty() {
                return TimePattern {
                    hour: hour as u8,
                    average_duration: 0.0,
                    trip_count: 0,
                    efficiency: 0,
                };
            }

            let average = mean_duration(&hour_trips);
            let efficiency = if overall > 0.0 {
                (overall - average) / overall * 100.0
            } else {
                0.0
            };

            TimePattern {
                hour: hour as u8,
                average_duration: average,
                trip_count: hour_trips.len() as u32,
                efficiency: efficiency.round() as i32,
            }
        })
        .collect()
}

/// Compare the older and newer halves of the trips started in the last `days`
/// days before `now`.
pub fn trend_analysis(
    trips: &[Trip],
    route_id: Option<&str>,
    days: u32,
    now: i64,
) -> TrendAnalysis {
    let cutoff = now - i64::from(days) * DAY_MS;
    let mut recent: Vec<&Trip> = for_route(trips, route_id)
        .into_iter()
        .filter(|t| t.start_time >= cutoff)
        .collect();

    if recent.len() < MIN_TREND_TRIPS {
        return TrendAnalysis {
            direction: TrendDirection::Stable,
            change_percent: 0.0,
            description: "Not enough data for trend analysis".to_string(),
            recommendation: Some("Complete more trips to see trends".to_string()),
        };
    }

    recent.sort_by_key(|t| t.start_time);
    let (older, newer) = recent.split_at(recent.len() / 2);
    let older_avg = mean_duration(older);
    let newer_avg = mean_duration(newer);

    let change = if older_avg > 0.0 {
        (newer_avg - older_avg) / older_avg * 100.0
    } else {
        0.0
    };

    let (direction, description, recommendation) = if change.abs() < STABLE_CHANGE_PERCENT {
        (
            TrendDirection::Stable,
            "Your commute times are consistent".to_string(),
            "Try leaving at different times to find optimization opportunities",
        )
    } else if change < 0.0 {
        (
            TrendDirection::Improving,
            format!("Your commute times are improving by {:.1}%", change.abs()),
            "Keep up the good work! Your route optimization is paying off",
        )
    } else {
        (
            TrendDirection::Declining,
            format!("Your commute times are increasing by {:.1}%", change.abs()),
            "Consider adjusting your departure time or exploring alternative routes",
        )
    };

    TrendAnalysis {
        direction,
        change_percent: round_to_tenth(change),
        description,
        recommendation: Some(recommendation.to_string()),
    }
}

/// Fastest and slowest morning departure hour.
///
/// Needs trips in at least two distinct hours; otherwise both times are `08:00`
/// with zero savings and zero confidence.
pub fn optimal_timing(trips: &[Trip], route_id: Option<&str>) -> OptimalTiming {
    let patterns: Vec<TimePattern> = time_patterns(trips, route_id)
        .into_iter()
        .filter(|p| p.trip_count > 0)
        .collect();

    if patterns.len() < 2 {
        return OptimalTiming {
            best_departure_time: DEFAULT_DEPARTURE.to_string(),
            worst_departure_time: DEFAULT_DEPARTURE.to_string(),
            time_savings: 0.0,
            confidence: 0,
        };
    }

    // Ties keep the earliest hour
    let mut best = &patterns[0];
    let mut worst = &patterns[0];
    for pattern in &patterns[1..] {
        if pattern.average_duration < best.average_duration {
            best = pattern;
        }
        if pattern.average_duration > worst.average_duration {
            worst = pattern;
        }
    }

    let total: u32 = patterns.iter().map(|p| p.trip_count).sum();
    let confidence = (f64::from(total) / FULL_CONFIDENCE_TRIPS * 100.0).min(100.0);

    OptimalTiming {
        best_departure_time: format!("{:02}:00", best.hour),
        worst_departure_time: format!("{:02}:00", worst.hour),
        time_savings: worst.average_duration - best.average_duration,
        confidence: confidence.round() as u32,
    }
}

/// Up to four remarks, in this order: consistency, best vs worst weekday,
/// departure timing, trend.
pub fn insights(
    trips: &[Trip],
    route_id: Option<&str>,
    now: i64,
    thresholds: &InsightThresholds,
) -> Vec<String> {
    let summary = trip_analytics(trips, route_id);
    let weekly = weekly_patterns(trips, route_id);
    let timing = optimal_timing(trips, route_id);
    let trend = trend_analysis(trips, route_id, DEFAULT_TREND_DAYS, now);

    let mut remarks = Vec::new();

    // An empty history scores 0 and is flagged like any other low score
    if summary.consistency > thresholds.high_consistency {
        remarks.push("🎯 Your commute times are very consistent".to_string());
    } else if summary.consistency < thresholds.low_consistency {
        remarks.push("⚠️ Your commute times vary significantly - look for patterns".to_string());
    }

    let active_days: Vec<&WeeklyPattern> = weekly.iter().filter(|d| d.trip_count > 0).collect();
    if let (Some(first), Some(rest)) = (active_days.first(), active_days.get(1..)) {
        let mut fastest = *first;
        let mut slowest = *first;
        for &day in rest {
            if day.average_duration < fastest.average_duration {
                fastest = day;
            }
            if day.average_duration > slowest.average_duration {
                slowest = day;
            }
        }
        if fastest.day_of_week != slowest.day_of_week {
            let gap = (slowest.average_duration - fastest.average_duration).round() as i64;
            remarks.push(format!(
                "📅 {}s are your fastest ({} faster than {}s)",
                fastest.day_name,
                format_duration(gap),
                slowest.day_name
            ));
        }
    }

    if timing.confidence > thresholds.min_timing_confidence
        && timing.time_savings > thresholds.min_time_savings
    {
        remarks.push(format!(
            "⏰ Leaving at {} could save you {}",
            timing.best_departure_time,
            format_duration(timing.time_savings.round() as i64)
        ));
    }

    if trend.recommendation.is_some() {
        remarks.push(format!("📈 {}", trend.description));
    }

    remarks.truncate(MAX_INSIGHTS);
    remarks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::{Clock, Location};

    const MIN: i64 = 60_000;
    const DAY: i64 = 24 * 60 * MIN;

    fn trip(route_id: &str, start_time: i64, duration: i64) -> Trip {
        let loc = Location::new(0.0, 0.0, start_time);
        Trip {
            id: format!("{}-{}", route_id, start_time),
            route_id: route_id.into(),
            start_time,
            end_time: start_time + duration,
            duration,
            start_location: loc,
            end_location: loc,
            route_points: vec![],
            sector_times: vec![],
            distance: Some(5_000.0),
            average_speed: Some(20.0),
            created_at: start_time,
        }
    }

    /// Monday 8 January 2024 at the given local hour.
    fn monday_at(hour: u32) -> i64 {
        ManualClock::at_local(2024, 1, 8, hour, 0).unwrap().now_millis()
    }

    #[test]
    fn test_empty_history() {
        assert_eq!(trip_analytics(&[], None), TripAnalytics::default());

        let weekly = weekly_patterns(&[], None);
        assert_eq!(weekly.len(), 7);
        assert_eq!(weekly[0].day_name, "Sunday");
        assert!(weekly.iter().all(|d| d.trip_count == 0 && d.average_departure == "08:00"));

        let hours = time_patterns(&[], None);
        assert_eq!(hours.iter().map(|h| h.hour).collect::<Vec<_>>(), vec![6, 7, 8, 9, 10]);

        let timing = optimal_timing(&[], None);
        assert_eq!(timing.best_departure_time, "08:00");
        assert_eq!(timing.confidence, 0);

        assert_eq!(
            insights(&[], None, monday_at(12), &InsightThresholds::default()),
            vec![
                "⚠️ Your commute times vary significantly - look for patterns".to_string(),
                "📈 Not enough data for trend analysis".to_string(),
            ]
        );
    }

    #[test]
    fn test_trip_analytics_summary() {
        let base = monday_at(8);
        let mut trips = vec![
            trip("r", base, 20 * MIN),
            trip("r", base + DAY, 30 * MIN),
            trip("other", base, 99 * MIN),
        ];
        trips[1].average_speed = None;

        let summary = trip_analytics(&trips, Some("r"));
        assert_eq!(summary.total_trips, 2);
        assert_eq!(summary.average_duration, 25.0 * MIN as f64);
        assert_eq!(summary.best_time, 20 * MIN);
        assert_eq!(summary.worst_time, 30 * MIN);
        assert_eq!(summary.total_distance, 10_000.0);
        assert_eq!(summary.average_speed, 20.0);
        // stddev 5 over mean 25
        assert_eq!(summary.consistency, 80);
    }

    #[test]
    fn test_consistency_decreases_with_spread() {
        let mean = 1_000.0;
        let mut previous = u32::MAX;
        for spread in [0.0, 50.0, 200.0, 500.0, 900.0, 1_000.0] {
            let score = consistency_score(&[mean - spread, mean + spread]);
            assert!(score <= previous, "spread {} gave {}", spread, score);
            previous = score;
        }
        assert_eq!(consistency_score(&[mean, mean]), 100);
        assert_eq!(consistency_score(&[0.0, 2_000.0]), 0);
    }

    #[test]
    fn test_weekly_patterns() {
        let base = monday_at(8);
        let trips = vec![
            trip("r", base - 10 * MIN, 20 * MIN),
            trip("r", base + 7 * DAY + 15 * MIN, 24 * MIN),
            trip("r", base + DAY, 30 * MIN),
        ];

        let weekly = weekly_patterns(&trips, None);
        let monday = &weekly[1];
        assert_eq!(monday.day_name, "Monday");
        assert_eq!(monday.trip_count, 2);
        assert_eq!(monday.average_duration, 22.0 * MIN as f64);
        assert_eq!(monday.average_departure, "08:03");
        assert_eq!(weekly[2].trip_count, 1);
        assert_eq!(weekly[2].consistency, 100);
        assert_eq!(weekly[3].trip_count, 0);
    }

    #[test]
    fn test_time_patterns_efficiency() {
        let trips = vec![
            trip("r", monday_at(7), 20 * MIN),
            trip("r", monday_at(9), 40 * MIN),
            trip("r", monday_at(12), 30 * MIN),
        ];
        let hours = time_patterns(&trips, None);

        // Overall average 30 minutes
        assert_eq!(hours[1].hour, 7);
        assert_eq!(hours[1].efficiency, 33);
        assert_eq!(hours[3].efficiency, -33);
        assert_eq!(hours[2].trip_count, 0);
    }

    #[test]
    fn test_trend_requires_four_trips() {
        let now = monday_at(12);
        let trips: Vec<_> = (0..3).map(|i| trip("r", now - i * DAY, 20 * MIN)).collect();
        let trend = trend_analysis(&trips, None, DEFAULT_TREND_DAYS, now);
        assert_eq!(trend.direction, TrendDirection::Stable);
        assert_eq!(trend.change_percent, 0.0);
    }

    #[test]
    fn test_trend_is_chronological() {
        let now = monday_at(12);
        // History is stored newest first; the newest trips are the fastest
        let trips = vec![
            trip("r", now - DAY, 18 * MIN),
            trip("r", now - 2 * DAY, 18 * MIN),
            trip("r", now - 3 * DAY, 24 * MIN),
            trip("r", now - 4 * DAY, 24 * MIN),
            trip("r", now - 60 * DAY, 5 * MIN),
        ];

        let trend = trend_analysis(&trips, Some("r"), DEFAULT_TREND_DAYS, now);
        assert_eq!(trend.direction, TrendDirection::Improving);
        assert_eq!(trend.change_percent, -25.0);
        assert_eq!(trend.description, "Your commute times are improving by 25.0%");
    }

    #[test]
    fn test_trend_declining_and_stable() {
        let now = monday_at(12);
        let declining: Vec<_> = [20i64, 20, 23, 23]
            .iter()
            .enumerate()
            .map(|(i, m)| trip("r", now - (4 - i as i64) * DAY, m * MIN))
            .collect();
        let trend = trend_analysis(&declining, None, DEFAULT_TREND_DAYS, now);
        assert_eq!(trend.direction, TrendDirection::Declining);
        assert_eq!(trend.change_percent, 15.0);

        let stable: Vec<_> = (0..4).map(|i| trip("r", now - i * DAY, 20 * MIN)).collect();
        let trend = trend_analysis(&stable, None, DEFAULT_TREND_DAYS, now);
        assert_eq!(trend.direction, TrendDirection::Stable);
        assert_eq!(trend.description, "Your commute times are consistent");
    }

    #[test]
    fn test_optimal_timing() {
        let mut trips = Vec::new();
        for week in 0..3 {
            trips.push(trip("r", monday_at(7) + week * 7 * DAY, 20 * MIN));
            trips.push(trip("r", monday_at(8) + week * 7 * DAY, 26 * MIN));
        }

        let timing = optimal_timing(&trips, None);
        assert_eq!(timing.best_departure_time, "07:00");
        assert_eq!(timing.worst_departure_time, "08:00");
        assert_eq!(timing.time_savings, 6.0 * MIN as f64);
        assert_eq!(timing.confidence, 60);
    }

    #[test]
    fn test_insights_order_and_limit() {
        let now = monday_at(12);
        let mut trips = Vec::new();
        // Mondays at 07:00 are fast, Tuesdays at 09:00 are slow
        for week in 0..3 {
            trips.push(trip("r", monday_at(7) - week * 7 * DAY, 10 * MIN));
            trips.push(trip("r", monday_at(9) + DAY - (week + 1) * 7 * DAY, 50 * MIN));
        }

        let remarks = insights(&trips, None, now, &InsightThresholds::default());
        assert_eq!(remarks.len(), 4);
        assert!(remarks[0].starts_with("⚠️"));
        assert_eq!(remarks[1], "📅 Mondays are your fastest (40:00 faster than Tuesdays)");
        assert_eq!(remarks[2], "⏰ Leaving at 07:00 could save you 40:00");
        assert!(remarks[3].starts_with("📈"));
    }

    #[test]
    fn test_insight_thresholds_configurable() {
        let now = monday_at(12);
        let trips: Vec<_> = (0..4).map(|i| trip("r", now - i * DAY, 20 * MIN)).collect();

        let defaults = insights(&trips, None, now, &InsightThresholds::default());
        assert_eq!(defaults[0], "🎯 Your commute times are very consistent");

        let strict = InsightThresholds {
            high_consistency: 100,
            ..InsightThresholds::default()
        };
        let remarks = insights(&trips, None, now, &strict);
        assert!(!remarks.iter().any(|r| r.starts_with("🎯")));
    }
}
