//! # Trip Tracking
//!
//! State machine that turns a stream of location samples into trips along the
//! active route.
//!
//! ```text
//!            start_auto_detection                qualifying start sample
//!   Idle ─────────────────────────▶ Detecting ─────────────────────────▶ Tracking
//!    ▲                                  ▲                                    │
//!    │ stop_auto_detection              │  near end / idle / force_end_trip  │
//!    └──────────────────────────────────┴────────────────────────────────────┘
//! ```
//!
//! A trip starts when a sample is within the geofence of the route start, the
//! speed since the previous sample exceeds the movement threshold, and the local
//! time falls within the user's working days and hours (with a two hour buffer).
//! It ends at the route end geofence, or when the last five samples sit within
//! 50 m of each other for longer than the idle timeout.
//!
//! Samples are consumed from a single [`LocationWatch`] in arrival order; the
//! in-progress trip is persisted after every sample so it survives a restart.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Local, NaiveTime, Timelike};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::{GeolocationConfig, TrackingConfig};
use crate::delta::format_duration;
use crate::error::{LocationError, Result};
use crate::geo_utils::{haversine_distance, is_within_radius, polyline_length, speed_kmh};
use crate::location::{LocationSource, LocationUpdate, LocationWatch, PositionOptions};
use crate::storage::CommuteStore;
use crate::{generate_id, Location, Route, RoutePoint, Trip, TripSectorTime, UserPreferences};

/// A route point this close to a sector boundary marks the sector start/end.
const SECTOR_PROXIMITY_METERS: f64 = 100.0;

/// Number of trailing samples inspected by the idle check.
const IDLE_WINDOW: usize = 5;

/// Samples closer than this to the current one count as stationary.
const STATIONARY_RADIUS_METERS: f64 = 50.0;

/// Trips may start this long before working hours begin or after they end.
const WORKING_HOURS_BUFFER_MINUTES: i64 = 120;

// ============================================================================
// Types
// ============================================================================

/// Resting state of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum TripStatus {
    Idle,
    Detecting,
    Tracking,
}

/// Notification emitted by the tracker, delivered in the order things happen.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    Started(PartialTrip),
    Updated(PartialTrip),
    Completed(Trip),
    StatusChanged(TripStatus),
    /// The location source reported an error; tracking state is unchanged.
    LocationFailed(LocationError),
}

/// An in-progress trip.
///
/// Snapshots are immutable: every sample produces a new value via
/// [`PartialTrip::with_sample`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialTrip {
    pub id: String,
    pub route_id: String,
    pub start_time: i64,
    pub start_location: Location,
    pub route_points: Vec<RoutePoint>,
    #[serde(default)]
    pub sector_times: Vec<TripSectorTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    pub created_at: i64,
}

impl PartialTrip {
    /// Open a trip on `route_id` at wall-clock time `now`.
    pub fn begin(route_id: &str, sample: RoutePoint, now: i64) -> Self {
        Self {
            id: generate_id(),
            route_id: route_id.to_string(),
            start_time: now,
            start_location: sample.location,
            route_points: vec![sample],
            sector_times: Vec::new(),
            duration: None,
            distance: None,
            created_at: now,
        }
    }

    /// New snapshot with `sample` appended and duration, distance and sector
    /// times recomputed.
    pub fn with_sample(&self, sample: RoutePoint, route: &Route, now: i64) -> Self {
        let mut route_points = Vec::with_capacity(self.route_points.len() + 1);
        route_points.extend_from_slice(&self.route_points);
        route_points.push(sample);

        let distance = if route_points.len() > 1 {
            Some(polyline_length(&route_points))
        } else {
            self.distance
        };

        Self {
            id: self.id.clone(),
            route_id: self.route_id.clone(),
            start_time: self.start_time,
            start_location: self.start_location,
            sector_times: compute_sector_times(route, &route_points),
            route_points,
            duration: Some(now - self.start_time),
            distance,
            created_at: self.created_at,
        }
    }

    pub fn last_point(&self) -> Option<&RoutePoint> {
        self.route_points.last()
    }

    /// Finalize into a completed trip ending at `end` at time `now`.
    pub fn finish(&self, end: &RoutePoint, now: i64) -> Trip {
        let duration = now - self.start_time;
        let distance = polyline_length(&self.route_points);
        let average_speed = if duration > 0 {
            (distance / 1000.0) / (duration as f64 / 3_600_000.0)
        } else {
            0.0
        };

        Trip {
            id: self.id.clone(),
            route_id: self.route_id.clone(),
            start_time: self.start_time,
            end_time: now,
            duration,
            start_location: self.start_location,
            end_location: end.location,
            route_points: self.route_points.clone(),
            sector_times: self.sector_times.clone(),
            distance: Some(distance),
            average_speed: Some(average_speed),
            created_at: self.created_at,
        }
    }
}

// ============================================================================
// Pure helpers
// ============================================================================

/// Attribute times to each sector of `route`.
///
/// Each sector is matched independently over the whole track: the first point
/// within 100 m of its start and the first within 100 m of its end. Sectors
/// missing either match are omitted.
pub fn compute_sector_times(route: &Route, points: &[RoutePoint]) -> Vec<TripSectorTime> {
    let first_near = |target: &Location| {
        points
            .iter()
            .find(|p| haversine_distance(*p, target) <= SECTOR_PROXIMITY_METERS)
            .map(|p| p.timestamp())
    };

    route
        .sectors
        .iter()
        .filter_map(|sector| {
            let start_time = first_near(&sector.start_point)?;
            let end_time = first_near(&sector.end_point)?;
            Some(TripSectorTime {
                sector_id: sector.id.clone(),
                start_time,
                end_time,
                duration: end_time - start_time,
            })
        })
        .collect()
}

/// True when the trailing samples (current included) are stationary around
/// `current` and the oldest of them is older than `idle_timeout`.
fn has_been_idle(points: &[RoutePoint], current: &RoutePoint, now: i64, idle_timeout: i64) -> bool {
    if points.len() < 2 {
        return false;
    }

    let recent = &points[points.len().saturating_sub(IDLE_WINDOW)..];
    let stationary = recent
        .iter()
        .all(|p| haversine_distance(p, current) < STATIONARY_RADIUS_METERS);

    stationary && now - recent[0].timestamp() > idle_timeout
}

fn minutes_of_day(hhmm: &str) -> Option<i64> {
    let time = NaiveTime::parse_from_str(hhmm.trim(), "%H:%M").ok()?;
    Some(i64::from(time.hour() * 60 + time.minute()))
}

/// Working-day and working-hours check, with the buffer on both sides.
/// Unparseable hours never match.
fn within_working_hours(prefs: &UserPreferences, now: &DateTime<Local>) -> bool {
    let day = now.weekday().num_days_from_sunday() as u8;
    if !prefs.working_days.contains(&day) {
        return false;
    }

    let (Some(start), Some(end)) = (
        minutes_of_day(&prefs.working_hours.start),
        minutes_of_day(&prefs.working_hours.end),
    ) else {
        warn!(
            "[TripTracker] Invalid working hours {}-{}",
            prefs.working_hours.start, prefs.working_hours.end
        );
        return false;
    };

    let current = i64::from(now.hour() * 60 + now.minute());
    current >= start - WORKING_HOURS_BUFFER_MINUTES && current <= end + WORKING_HOURS_BUFFER_MINUTES
}

// ============================================================================
// Tracker
// ============================================================================

/// Automatic trip detection and tracking.
///
/// All dependencies are injected. Samples are processed one at a time, to
/// completion, in arrival order.
pub struct TripTracker {
    config: TrackingConfig,
    watch_options: PositionOptions,
    store: CommuteStore,
    source: Arc<dyn LocationSource>,
    clock: Arc<dyn Clock>,
    status: TripStatus,
    current: Option<PartialTrip>,
    last_sample: Option<RoutePoint>,
    watch: Option<LocationWatch>,
    subscribers: Vec<Sender<TrackerEvent>>,
}

impl TripTracker {
    /// Create a tracker, recovering any persisted in-progress trip.
    ///
    /// With a well-formed snapshot in storage the tracker starts in `Tracking`
    /// with that trip; otherwise it starts `Idle`.
    pub fn new(
        config: TrackingConfig,
        store: CommuteStore,
        source: Arc<dyn LocationSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let current = store.current_trip();
        let (status, last_sample) = match &current {
            Some(trip) => {
                info!(
                    "[TripTracker] Recovered trip {} with {} points",
                    trip.id,
                    trip.route_points.len()
                );
                (TripStatus::Tracking, trip.last_point().copied())
            }
            None => (TripStatus::Idle, None),
        };

        Self {
            config,
            watch_options: PositionOptions::continuous(&GeolocationConfig::default()),
            store,
            source,
            clock,
            status,
            current,
            last_sample,
            watch: None,
            subscribers: Vec::new(),
        }
    }

    /// Use these options for the continuous subscription.
    pub fn with_geolocation(mut self, geolocation: &GeolocationConfig) -> Self {
        self.watch_options = PositionOptions::continuous(geolocation);
        self
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&mut self) -> Receiver<TrackerEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn status(&self) -> TripStatus {
        self.status
    }

    pub fn current_trip(&self) -> Option<&PartialTrip> {
        self.current.as_ref()
    }

    pub fn last_sample(&self) -> Option<&RoutePoint> {
        self.last_sample.as_ref()
    }

    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Request permission and subscribe to the location source.
    ///
    /// Resumes a trip still persisted in storage; otherwise enters `Detecting`.
    /// Calling it while already subscribed does nothing.
    pub fn start_auto_detection(&mut self) -> Result<()> {
        if self.watch.is_some() {
            return Ok(());
        }

        if let Err(e) = self.source.request_permission() {
            warn!("[TripTracker] Cannot start auto-detection: {}", e);
            return Err(e.into());
        }
        let watch = self.source.watch_position(&self.watch_options).map_err(|e| {
            warn!("[TripTracker] Cannot subscribe to location updates: {}", e);
            e
        })?;
        self.watch = Some(watch);

        self.current = self.store.current_trip();
        if let Some(trip) = &self.current {
            info!("[TripTracker] Resuming trip {}", trip.id);
            if self.last_sample.is_none() {
                self.last_sample = trip.last_point().copied();
            }
            self.set_status(TripStatus::Tracking);
        } else {
            self.set_status(TripStatus::Detecting);
        }

        info!("[TripTracker] Auto-detection started");
        Ok(())
    }

    /// Unsubscribe immediately. Queued samples are dropped; an in-progress trip
    /// stays persisted so the next start can resume it.
    pub fn stop_auto_detection(&mut self) {
        if let Some(watch) = self.watch.take() {
            self.source.clear_watch(watch.id());
        }
        self.set_status(TripStatus::Idle);
        info!("[TripTracker] Auto-detection stopped");
    }

    /// Process every queued update without blocking. Returns how many were handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let next = match &self.watch {
                Some(watch) => watch.try_next(),
                None => break,
            };
            match next {
                Ok(update) => {
                    self.handle_update(update);
                    handled += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.on_source_closed();
                    break;
                }
            }
        }
        handled
    }

    /// Block up to `timeout` for the next update, then drain the rest.
    pub fn wait_for_samples(&mut self, timeout: Duration) -> usize {
        let first = match &self.watch {
            Some(watch) => watch.next_timeout(timeout),
            None => return 0,
        };
        match first {
            Ok(update) => {
                self.handle_update(update);
                1 + self.process_pending()
            }
            Err(RecvTimeoutError::Timeout) => 0,
            Err(RecvTimeoutError::Disconnected) => {
                self.on_source_closed();
                0
            }
        }
    }

    fn on_source_closed(&mut self) {
        warn!("[TripTracker] Location source closed the subscription");
        self.watch = None;
        self.emit(TrackerEvent::LocationFailed(LocationError::PositionUnavailable));
        self.set_status(TripStatus::Idle);
    }

    /// Handle one update from the subscription.
    pub fn handle_update(&mut self, update: LocationUpdate) {
        match update {
            Ok(sample) => self.handle_sample(sample),
            Err(e) => {
                warn!("[TripTracker] Location error: {}", e);
                self.emit(TrackerEvent::LocationFailed(e));
            }
        }
    }

    /// Handle one sample. Ignored unless auto-detection is running.
    pub fn handle_sample(&mut self, sample: RoutePoint) {
        if self.watch.is_none() {
            debug!("[TripTracker] Ignoring sample while not subscribed");
            return;
        }

        match self.status {
            TripStatus::Idle => {}
            TripStatus::Detecting => self.detect_start(sample),
            TripStatus::Tracking => self.track(sample),
        }
    }

    // ------------------------------------------------------------------------
    // Manual overrides
    // ------------------------------------------------------------------------

    /// Start a trip at the last sample. Only while detecting, with an active route.
    pub fn force_start_trip(&mut self) -> bool {
        if self.status != TripStatus::Detecting {
            return false;
        }
        let Some(sample) = self.last_sample else {
            return false;
        };
        let Some(route) = self.store.active_route() else {
            return false;
        };

        info!("[TripTracker] Trip start forced");
        self.begin_trip(&route, sample);
        true
    }

    /// End the current trip at the last sample. Only while tracking.
    pub fn force_end_trip(&mut self) -> bool {
        if self.status != TripStatus::Tracking {
            return false;
        }
        let Some(sample) = self.last_sample else {
            return false;
        };

        info!("[TripTracker] Trip end forced");
        self.complete_trip(sample);
        true
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    fn detect_start(&mut self, sample: RoutePoint) {
        let Some(route) = self.store.active_route() else {
            debug!("[TripTracker] No active route configured");
            return;
        };

        let should_start = self.should_start(&route, &sample);
        self.last_sample = Some(sample);
        if should_start {
            self.begin_trip(&route, sample);
        }
    }

    fn should_start(&self, route: &Route, sample: &RoutePoint) -> bool {
        let near_start = is_within_radius(sample, &route.start_location, self.config.geofence_radius);
        let speed = self
            .last_sample
            .as_ref()
            .map(|previous| speed_kmh(previous, sample));
        let moving = speed.is_some_and(|s| s > self.config.min_speed_threshold);
        let working_time = within_working_hours(&self.store.preferences(), &self.clock.now_local());

        debug!(
            "[TripTracker] Start check: near_start={} speed={:?} working_time={} distance={:.0}m",
            near_start,
            speed,
            working_time,
            haversine_distance(sample, &route.start_location)
        );

        near_start && moving && working_time
    }

    fn begin_trip(&mut self, route: &Route, sample: RoutePoint) {
        let trip = PartialTrip::begin(&route.id, sample, self.clock.now_millis());
        self.store.save_current_trip(&trip);
        self.current = Some(trip.clone());
        self.set_status(TripStatus::Tracking);

        info!("[TripTracker] Trip {} started on route {}", trip.id, route.name);
        self.emit(TrackerEvent::Started(trip));
    }

    fn track(&mut self, sample: RoutePoint) {
        self.last_sample = Some(sample);

        let Some(trip) = self.current.as_ref() else {
            self.set_status(self.resting_status());
            return;
        };
        let Some(route) = self.store.route(&trip.route_id) else {
            warn!(
                "[TripTracker] Route {} no longer exists, discarding trip {}",
                trip.route_id, trip.id
            );
            self.discard_trip();
            return;
        };

        let now = self.clock.now_millis();
        let updated = trip.with_sample(sample, &route, now);

        let near_end = is_within_radius(&sample, &route.end_location, self.config.geofence_radius);
        let idle = has_been_idle(&updated.route_points, &sample, now, self.config.idle_timeout);

        self.current = Some(updated);
        if near_end || idle {
            debug!(
                "[TripTracker] End conditions met: near_end={} idle={}",
                near_end, idle
            );
            self.complete_trip(sample);
        } else if let Some(trip) = self.current.clone() {
            self.store.save_current_trip(&trip);
            self.emit(TrackerEvent::Updated(trip));
        }
    }

    fn complete_trip(&mut self, end: RoutePoint) {
        let Some(trip) = self.current.take() else {
            return;
        };

        let now = self.clock.now_millis();
        let duration = now - trip.start_time;
        if duration < self.config.min_trip_duration {
            info!(
                "[TripTracker] Trip too short ({}), discarding",
                format_duration(duration)
            );
            self.store.clear_current_trip();
            self.set_status(self.resting_status());
            return;
        }

        let completed = trip.finish(&end, now);
        self.store.save_trip(&completed);
        self.store.clear_current_trip();

        info!(
            "[TripTracker] Trip {} completed: {} over {:.2} km",
            completed.id,
            format_duration(completed.duration),
            completed.distance.unwrap_or(0.0) / 1000.0
        );
        self.emit(TrackerEvent::Completed(completed));
        self.set_status(self.resting_status());
    }

    fn discard_trip(&mut self) {
        self.current = None;
        self.store.clear_current_trip();
        self.set_status(self.resting_status());
    }

    /// Where the machine settles after a trip ends.
    fn resting_status(&self) -> TripStatus {
        if self.watch.is_some() {
            TripStatus::Detecting
        } else {
            TripStatus::Idle
        }
    }

    fn set_status(&mut self, status: TripStatus) {
        if self.status != status {
            debug!("[TripTracker] {:?} -> {:?}", self.status, status);
            self.status = status;
            self.emit(TrackerEvent::StatusChanged(status));
        }
    }

    fn emit(&mut self, event: TrackerEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Drop for TripTracker {
    fn drop(&mut self) {
        if let Some(watch) = self.watch.take() {
            self.source.clear_watch(watch.id());
        }
    }
}
