//! # Geographic Utilities
//!
//! Core geographic computations used by the trip tracker and the analytics.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two fixes |
//! | [`speed_kmh`] | Speed between two consecutive samples |
//! | [`is_within_radius`] | Geofence containment test |
//! | [`polyline_length`] | Total length of a sample track |
//!
//! ## Example
//!
//! ```rust
//! use delta_tracker::{geo_utils, Location, RoutePoint};
//!
//! let home = Location::new(51.5074, -0.1278, 0);
//! let a = RoutePoint::new(51.5074, -0.1278, 0);
//! let b = RoutePoint::new(51.5083, -0.1278, 10_000);
//!
//! // ~100m in 10s
//! let speed = geo_utils::speed_kmh(&a, &b);
//! assert!(speed > 30.0 && speed < 40.0);
//!
//! assert!(geo_utils::is_within_radius(&a, &home, 100.0));
//! ```
//!
//! ## Algorithm Notes
//!
//! Distances use the haversine formula on a sphere of radius 6,371,000 m. This is
//! accurate to within 0.5% for commute-scale distances, well below GPS noise.
//!
//! All functions expect WGS84 latitude/longitude in degrees.

use crate::{Location, RoutePoint};

/// Mean Earth radius used for all distance computations, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two fixes using the Haversine formula.
///
/// Accepts anything that exposes a [`Location`] (plain fixes and tracked samples).
/// The result is symmetric and exactly `0.0` for identical coordinates.
///
/// # Example
///
/// ```rust
/// use delta_tracker::{geo_utils, Location};
///
/// let london = Location::new(51.5074, -0.1278, 0);
/// let paris = Location::new(48.8566, 2.3522, 0);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_500.0).abs() < 1000.0); // ~344 km
/// ```
#[inline]
pub fn haversine_distance<A, B>(a: &A, b: &B) -> f64
where
    A: AsRef<Location> + ?Sized,
    B: AsRef<Location> + ?Sized,
{
    let a = a.as_ref();
    let b = b.as_ref();

    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Calculate the speed between two samples in km/h.
///
/// Uses the sample timestamps, not the device-reported speed. Returns `0.0` when
/// both samples carry the same timestamp.
///
/// # Example
///
/// ```rust
/// use delta_tracker::{geo_utils, RoutePoint};
///
/// let a = RoutePoint::new(0.0, 0.0, 5_000);
/// let b = RoutePoint::new(0.0, 0.01, 5_000);
/// assert_eq!(geo_utils::speed_kmh(&a, &b), 0.0);
/// ```
pub fn speed_kmh(a: &RoutePoint, b: &RoutePoint) -> f64 {
    let elapsed_secs = (b.timestamp() - a.timestamp()) as f64 / 1000.0;
    if elapsed_secs == 0.0 {
        return 0.0;
    }

    let meters_per_second = haversine_distance(a, b) / elapsed_secs;
    meters_per_second * 3.6
}

/// Check whether `current` lies within `radius_meters` of `target` (inclusive).
#[inline]
pub fn is_within_radius<A, B>(current: &A, target: &B, radius_meters: f64) -> bool
where
    A: AsRef<Location> + ?Sized,
    B: AsRef<Location> + ?Sized,
{
    haversine_distance(current, target) <= radius_meters
}

/// Calculate the total length of a track in meters.
///
/// Sums the haversine distance between consecutive points. Empty or single-point
/// tracks return 0.0.
pub fn polyline_length<T: AsRef<Location>>(points: &[T]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

// =============================================================================
// Unit Tests
// =============================================================================
