//! # Delta Tracker
//!
//! Automatic commute detection, trip tracking and commute analytics.
//!
//! This library provides:
//! - A trip tracking state machine that turns a stream of GPS samples into trips
//!   along a pre-defined route (geofenced start/end, idle detection, sector splits)
//! - Analytics over the trip history (consistency, weekly and time-of-day patterns,
//!   trends, optimal departure time, insights)
//! - Delta comparisons against yesterday, the weekly average and the personal best
//! - Route management on top of an abstract key-value store and location source
//!
//! ## Features
//!
//! - **`persistence`** - Enable the SQLite-backed key-value store
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use delta_tracker::{
//!     ChannelLocationSource, CommuteStore, DeltaConfig, Location, MemoryStore, RouteManager,
//!     SystemClock, TripTracker,
//! };
//!
//! let config = DeltaConfig::default();
//! let store = CommuteStore::new(Arc::new(MemoryStore::new()), &config.storage);
//! let source = Arc::new(ChannelLocationSource::new());
//! let clock = Arc::new(SystemClock);
//!
//! let routes = RouteManager::new(store.clone(), source.clone(), clock.clone(), config.geolocation.clone());
//! let home = Location::new(51.5074, -0.1278, 0);
//! let office = Location::new(51.5155, -0.0922, 0);
//! let route = routes.create_route("Morning commute", home, office).unwrap();
//! assert!(route.is_active);
//!
//! let mut tracker = TripTracker::new(config.tracking.clone(), store, source.clone(), clock);
//! tracker.start_auto_detection().unwrap();
//! let events = tracker.subscribe();
//! // feed samples with `source.push_fix(..)` and drive with `tracker.process_pending()`
//! # drop(events);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{DeltaError, LocationError, OptionExt, Result};

// Resolved configuration object
pub mod config;
pub use config::{DeltaConfig, GeolocationConfig, StorageConfig, TrackingConfig};

// Geographic utilities (distance, speed, geofence containment)
pub mod geo_utils;

// Injectable wall clock
pub mod clock;
pub use clock::{Clock, ManualClock, SystemClock};

// Abstract location source + host-fed implementation
pub mod location;
pub use location::{
    ChannelLocationSource, LocationSource, LocationUpdate, LocationWatch, PositionOptions, WatchId,
};

// Key-value persistence and typed record access
pub mod storage;
pub use storage::{CommuteStore, DataExport, KeyValueStore, MemoryStore};

// SQLite key-value store
#[cfg(feature = "persistence")]
pub mod sqlite;
#[cfg(feature = "persistence")]
pub use sqlite::SqliteStore;

// Trip tracking state machine
pub mod tracking;
pub use tracking::{PartialTrip, TrackerEvent, TripStatus, TripTracker};

// Route/session management
pub mod routes;
pub use routes::{RouteManager, SectorDraft};

// Trip history analytics
pub mod analytics;
pub use analytics::{
    insights, optimal_timing, time_patterns, trend_analysis, trip_analytics, weekly_patterns,
    InsightThresholds, OptimalTiming, TimePattern, TrendAnalysis, TrendDirection, TripAnalytics,
    WeeklyPattern,
};

// Delta comparisons and formatting helpers
pub mod delta;
pub use delta::{
    calculate_delta, compare_trip, format_duration, DeltaComparison, DeltaType, TripComparison,
};

// FFI bindings for mobile platforms (iOS/Android)
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
pub(crate) fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("DeltaTrackerRust"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
pub(crate) fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A single geographic fix.
///
/// Timestamps are Unix epoch milliseconds throughout the crate.
///
/// # Example
/// ```
/// use delta_tracker::Location;
/// let fix = Location::new(51.5074, -0.1278, 1_700_000_000_000); // London
/// assert!(fix.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in meters, when the source reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    pub timestamp: i64,
}

impl Location {
    /// Create a new fix without accuracy information.
    pub fn new(latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
            timestamp,
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Check if the fix has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// A fix captured during continuous tracking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct RoutePoint {
    #[serde(flatten)]
    pub location: Location,
    /// Speed reported by the device in m/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Heading in degrees from true north
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
}

impl RoutePoint {
    pub fn new(latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Self::from_location(Location::new(latitude, longitude, timestamp))
    }

    pub fn from_location(location: Location) -> Self {
        Self {
            location,
            speed: None,
            heading: None,
        }
    }

    pub fn timestamp(&self) -> i64 {
        self.location.timestamp
    }
}

impl AsRef<Location> for Location {
    fn as_ref(&self) -> &Location {
        self
    }
}

impl AsRef<Location> for RoutePoint {
    fn as_ref(&self) -> &Location {
        &self.location
    }
}

/// A named sub-segment of a route used to attribute partial trip times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct RouteSector {
    pub id: String,
    pub name: String,
    pub start_point: Location,
    pub end_point: Location,
    /// Sectors are kept sorted by this value, ascending
    pub order: i32,
}

/// A habitual trip between two places.
///
/// At most one route is active at a time; the tracker only detects trips on the
/// active route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Route {
    pub id: String,
    pub name: String,
    pub start_location: Location,
    pub end_location: Location,
    #[serde(default)]
    pub sectors: Vec<RouteSector>,
    pub created_at: i64,
    #[serde(default)]
    pub is_active: bool,
}

/// Time spent in one sector during one trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TripSectorTime {
    pub sector_id: String,
    pub start_time: i64,
    pub end_time: i64,
    /// Milliseconds
    pub duration: i64,
}

/// A completed trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Trip {
    pub id: String,
    pub route_id: String,
    pub start_time: i64,
    pub end_time: i64,
    /// Milliseconds, always `end_time - start_time`
    pub duration: i64,
    pub start_location: Location,
    pub end_location: Location,
    #[serde(default)]
    pub route_points: Vec<RoutePoint>,
    #[serde(default)]
    pub sector_times: Vec<TripSectorTime>,
    /// Meters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// km/h
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_speed: Option<f64>,
    pub created_at: i64,
}

/// How eagerly the user wants trips detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum DetectionSensitivity {
    Low,
    #[default]
    Medium,
    High,
}

/// Working hours as `HH:MM` strings in local time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct WorkingHours {
    pub start: String,
    pub end: String,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start: "08:00".to_string(),
            end: "17:00".to_string(),
        }
    }
}

/// The single user preferences record, created lazily with defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct UserPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_location: Option<Location>,
    pub tracking_enabled: bool,
    pub notifications_enabled: bool,
    pub auto_detection_sensitivity: DetectionSensitivity,
    pub working_hours: WorkingHours,
    /// 0 = Sunday .. 6 = Saturday
    pub working_days: Vec<u8>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            home_location: None,
            work_location: None,
            tracking_enabled: true,
            notifications_enabled: true,
            auto_detection_sensitivity: DetectionSensitivity::Medium,
            working_hours: WorkingHours::default(),
            working_days: vec![1, 2, 3, 4, 5],
        }
    }
}

/// Generate a fresh record identifier.
pub(crate) fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// Tests
// ============================================================================
