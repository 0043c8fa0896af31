//! Resolved configuration consumed by the tracking core.
//!
//! Every field has a default, so a partial JSON document (or none at all) yields
//! a usable configuration. Keys use camelCase to match the persisted records.

use serde::{Deserialize, Serialize};

use crate::error::{DeltaError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct DeltaConfig {
    pub geolocation: GeolocationConfig,
    pub tracking: TrackingConfig,
    pub storage: StorageConfig,
}

impl DeltaConfig {
    /// Parse a (possibly partial) JSON configuration document and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: DeltaConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the thresholds make sense.
    pub fn validate(&self) -> Result<()> {
        let t = &self.tracking;
        if !(t.geofence_radius.is_finite() && t.geofence_radius > 0.0) {
            return Err(DeltaError::validation("tracking.geofenceRadius must be positive"));
        }
        if !(t.min_speed_threshold.is_finite() && t.min_speed_threshold >= 0.0) {
            return Err(DeltaError::validation(
                "tracking.minSpeedThreshold must be non-negative",
            ));
        }
        if t.idle_timeout <= 0 {
            return Err(DeltaError::validation("tracking.idleTimeout must be positive"));
        }
        if t.min_trip_duration < 0 {
            return Err(DeltaError::validation(
                "tracking.minTripDuration must be non-negative",
            ));
        }
        if self.geolocation.timeout == 0 {
            return Err(DeltaError::validation("geolocation.timeout must be positive"));
        }
        if self.storage.prefix.is_empty() {
            return Err(DeltaError::validation("storage.prefix must not be empty"));
        }
        Ok(())
    }
}

/// Options passed to location requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct GeolocationConfig {
    /// One-shot fix timeout in milliseconds.
    /// Default: 10000
    pub timeout: u64,

    /// Maximum age of a cached fix for one-shot requests, in milliseconds.
    /// Default: 60000
    pub maximum_age: u64,

    /// Ask the platform for GPS-grade accuracy.
    /// Default: false
    pub enable_high_accuracy: bool,

    /// Per-sample timeout for the continuous subscription, in milliseconds.
    /// Default: 5000
    pub watch_timeout: u64,

    /// Maximum age of a cached fix for the continuous subscription, in milliseconds.
    /// Default: 1000
    pub watch_maximum_age: u64,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            timeout: 10_000,
            maximum_age: 60_000,
            enable_high_accuracy: false,
            watch_timeout: 5_000,
            watch_maximum_age: 1_000,
        }
    }
}

/// Trip detection thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TrackingConfig {
    /// Start/end proximity threshold in meters.
    /// Default: 100.0
    pub geofence_radius: f64,

    /// Speed (km/h) between consecutive samples required to start a trip.
    /// Default: 5.0
    pub min_speed_threshold: f64,

    /// Milliseconds spent stationary before a trip is ended automatically.
    /// Default: 300000 (5 minutes)
    pub idle_timeout: i64,

    /// Trips shorter than this (milliseconds) are discarded instead of saved.
    /// Default: 120000 (2 minutes)
    pub min_trip_duration: i64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            geofence_radius: 100.0,
            min_speed_threshold: 5.0,
            idle_timeout: 300_000,
            min_trip_duration: 120_000,
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct StorageConfig {
    /// Prefix prepended to every record key.
    /// Default: "delta_"
    pub prefix: String,

    /// Trip history cap; the oldest trips beyond it are dropped on save.
    /// Default: 100
    pub max_stored_trips: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            prefix: "delta_".to_string(),
            max_stored_trips: 100,
        }
    }
}
