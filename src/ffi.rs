//! FFI exports for the mobile shells.
//!
//! Only the pure computations cross the boundary; the tracker itself runs on the
//! Rust side behind the host-fed location source.

use log::{debug, info, warn};

use crate::analytics::{self, DEFAULT_TREND_DAYS};
use crate::tracking::compute_sector_times;
use crate::{
    delta, geo_utils, init_logging, DeltaComparison, DeltaConfig, InsightThresholds, Location,
    OptimalTiming, Route, RoutePoint, TimePattern, TrendAnalysis, Trip, TripAnalytics,
    TripComparison, TripSectorTime, WeeklyPattern,
};

// ============================================================================
// Geometry
// ============================================================================

/// Great-circle distance in meters.
#[uniffi::export]
pub fn ffi_haversine_distance(a: Location, b: Location) -> f64 {
    geo_utils::haversine_distance(&a, &b)
}

/// Speed between two samples in km/h.
#[uniffi::export]
pub fn ffi_speed_kmh(a: RoutePoint, b: RoutePoint) -> f64 {
    geo_utils::speed_kmh(&a, &b)
}

#[uniffi::export]
pub fn ffi_is_within_radius(current: Location, target: Location, radius_meters: f64) -> bool {
    geo_utils::is_within_radius(&current, &target, radius_meters)
}

#[uniffi::export]
pub fn ffi_compute_sector_times(route: Route, points: Vec<RoutePoint>) -> Vec<TripSectorTime> {
    init_logging();
    debug!(
        "[DeltaTrackerRust] Sector times for {} ({} sectors, {} points)",
        route.id,
        route.sectors.len(),
        points.len()
    );
    compute_sector_times(&route, &points)
}

// ============================================================================
// Analytics
// ============================================================================

#[uniffi::export]
pub fn ffi_trip_analytics(trips: Vec<Trip>, route_id: Option<String>) -> TripAnalytics {
    init_logging();
    info!("[DeltaTrackerRust] trip_analytics over {} trips", trips.len());
    analytics::trip_analytics(&trips, route_id.as_deref())
}

#[uniffi::export]
pub fn ffi_weekly_patterns(trips: Vec<Trip>, route_id: Option<String>) -> Vec<WeeklyPattern> {
    init_logging();
    analytics::weekly_patterns(&trips, route_id.as_deref())
}

#[uniffi::export]
pub fn ffi_time_patterns(trips: Vec<Trip>, route_id: Option<String>) -> Vec<TimePattern> {
    init_logging();
    analytics::time_patterns(&trips, route_id.as_deref())
}

/// Trend over the last `days` days (30 when `None`) before `now`.
#[uniffi::export]
pub fn ffi_trend_analysis(
    trips: Vec<Trip>,
    route_id: Option<String>,
    days: Option<u32>,
    now: i64,
) -> TrendAnalysis {
    init_logging();
    let days = days.unwrap_or(DEFAULT_TREND_DAYS);
    let trend = analytics::trend_analysis(&trips, route_id.as_deref(), days, now);
    info!(
        "[DeltaTrackerRust] Trend over {} days: {:?} ({:.1}%)",
        days, trend.direction, trend.change_percent
    );
    trend
}

#[uniffi::export]
pub fn ffi_optimal_timing(trips: Vec<Trip>, route_id: Option<String>) -> OptimalTiming {
    init_logging();
    analytics::optimal_timing(&trips, route_id.as_deref())
}

#[uniffi::export]
pub fn ffi_insights(
    trips: Vec<Trip>,
    route_id: Option<String>,
    now: i64,
    thresholds: Option<InsightThresholds>,
) -> Vec<String> {
    init_logging();
    let thresholds = thresholds.unwrap_or_default();
    analytics::insights(&trips, route_id.as_deref(), now, &thresholds)
}

// ============================================================================
// Deltas
// ============================================================================

#[uniffi::export]
pub fn ffi_calculate_delta(current: i64, comparison: i64) -> DeltaComparison {
    delta::calculate_delta(current, comparison)
}

#[uniffi::export]
pub fn ffi_compare_trip(history: Vec<Trip>, trip: Trip) -> TripComparison {
    init_logging();
    delta::compare_trip(&history, &trip)
}

#[uniffi::export]
pub fn ffi_format_duration(millis: i64) -> String {
    delta::format_duration(millis)
}

// ============================================================================
// Configuration
// ============================================================================

#[uniffi::export]
pub fn default_config() -> DeltaConfig {
    DeltaConfig::default()
}

/// Parse and validate a JSON configuration. Returns `None` when invalid.
#[uniffi::export]
pub fn parse_config(json: String) -> Option<DeltaConfig> {
    init_logging();
    match DeltaConfig::from_json(&json) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!("[DeltaTrackerRust] Rejected configuration: {}", e);
            None
        }
    }
}
