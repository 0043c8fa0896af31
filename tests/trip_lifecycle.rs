//! End-to-end trip detection against a host-fed location source, a manual clock
//! and an in-memory store.

use std::sync::mpsc::Receiver;
use std::sync::Arc;

use delta_tracker::{
    ChannelLocationSource, Clock, CommuteStore, GeolocationConfig, Location, LocationError,
    ManualClock, MemoryStore, PartialTrip, Route, RouteManager, RoutePoint, SectorDraft,
    StorageConfig, TrackerEvent, TrackingConfig, TripStatus, TripTracker,
};

const SEC: i64 = 1_000;
const MIN: i64 = 60 * SEC;

struct Harness {
    source: Arc<ChannelLocationSource>,
    clock: Arc<ManualClock>,
    store: CommuteStore,
    routes: RouteManager,
    tracker: TripTracker,
    events: Receiver<TrackerEvent>,
    route: Route,
}

impl Harness {
    /// Route (0,0) -> (0,0.01), about 1.1 km, on Monday 8 January 2024 at 08:00.
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let clock = Arc::new(ManualClock::at_local(2024, 1, 8, 8, 0).expect("valid local time"));
        let source = Arc::new(ChannelLocationSource::with_clock(clock.clone()));
        let store = CommuteStore::new(Arc::new(MemoryStore::new()), &StorageConfig::default());
        let routes = RouteManager::new(
            store.clone(),
            source.clone(),
            clock.clone(),
            GeolocationConfig::default(),
        );
        let route = routes
            .create_route("Commute", Location::new(0.0, 0.0, 0), Location::new(0.0, 0.01, 0))
            .unwrap();

        let mut tracker = TripTracker::new(
            TrackingConfig::default(),
            store.clone(),
            source.clone(),
            clock.clone(),
        );
        let events = tracker.subscribe();
        tracker.start_auto_detection().unwrap();

        let harness = Self {
            source,
            clock,
            store,
            routes,
            tracker,
            events,
            route,
        };
        harness.drain();
        harness
    }

    /// Advance the clock, push a fix stamped with the new time and process it.
    fn feed(&mut self, latitude: f64, longitude: f64, after: i64) -> usize {
        self.clock.advance(after);
        let now = self.clock.now_millis();
        self.source.push_fix(RoutePoint::new(latitude, longitude, now));
        self.tracker.process_pending()
    }

    fn drain(&self) -> Vec<TrackerEvent> {
        self.events.try_iter().collect()
    }

    /// Stationary fix at the start, then ~33 km/h away from it.
    fn start_trip(&mut self) -> PartialTrip {
        self.feed(0.0, 0.0, 0);
        self.feed(0.0, 0.0005, 6 * SEC);
        assert_eq!(self.tracker.status(), TripStatus::Tracking);
        self.drain();
        self.tracker.current_trip().cloned().unwrap()
    }

    fn restart_tracker(&mut self) {
        let mut tracker = TripTracker::new(
            TrackingConfig::default(),
            self.store.clone(),
            self.source.clone(),
            self.clock.clone(),
        );
        self.events = tracker.subscribe();
        // Dropping the old tracker closes its subscription
        self.tracker = tracker;
    }
}

fn count_started(events: &[TrackerEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, TrackerEvent::Started(_)))
        .count()
}

#[test]
fn test_start_requires_movement_near_start() {
    let mut h = Harness::new();

    // A single stationary fix cannot start a trip
    h.feed(0.0, 0.0, 0);
    assert_eq!(h.tracker.status(), TripStatus::Detecting);
    assert!(h.store.current_trip().is_none());

    // ~55.6 m in 6 s is ~33 km/h
    h.feed(0.0, 0.0005, 6 * SEC);
    assert_eq!(h.tracker.status(), TripStatus::Tracking);

    let events = h.drain();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], TrackerEvent::StatusChanged(TripStatus::Tracking));
    let TrackerEvent::Started(trip) = &events[1] else {
        panic!("expected Started, got {:?}", events[1]);
    };

    assert_eq!(trip.route_id, h.route.id);
    assert_eq!(trip.start_time, h.clock.now_millis());
    assert_eq!(trip.route_points.len(), 1);
    assert_eq!(trip.start_location.longitude, 0.0005);
    assert_eq!(h.store.current_trip().as_ref(), Some(trip));
}

#[test]
fn test_zero_elapsed_time_does_not_start() {
    let mut h = Harness::new();
    h.feed(0.0, 0.0, 0);
    // Same timestamp: speed is 0, not a division by zero
    h.feed(0.0, 0.0005, 0);

    assert_eq!(h.tracker.status(), TripStatus::Detecting);
    assert_eq!(count_started(&h.drain()), 0);
}

#[test]
fn test_no_start_outside_working_days() {
    let mut h = Harness::new();
    let saturday = ManualClock::at_local(2024, 1, 13, 8, 0).unwrap().now_millis();
    h.clock.set(saturday);

    h.feed(0.0, 0.0, 0);
    h.feed(0.0, 0.0005, 6 * SEC);
    assert_eq!(h.tracker.status(), TripStatus::Detecting);
}

#[test]
fn test_second_qualifying_sample_does_not_start_another_trip() {
    let mut h = Harness::new();
    let trip = h.start_trip();

    // Still near the start and still moving
    h.feed(0.0, 0.0008, 6 * SEC);

    assert_eq!(h.tracker.status(), TripStatus::Tracking);
    let events = h.drain();
    assert_eq!(count_started(&events), 0);
    assert!(matches!(&events[..], [TrackerEvent::Updated(t)] if t.id == trip.id));

    let current = h.tracker.current_trip().unwrap();
    assert_eq!(current.id, trip.id);
    assert_eq!(current.route_points.len(), 2);
    assert_eq!(current.duration, Some(6 * SEC));
}

#[test]
fn test_short_trip_is_discarded() {
    let mut h = Harness::new();
    h.start_trip();

    // Reaches the end after one minute, below the two minute minimum
    h.feed(0.0, 0.01, MIN);

    assert_eq!(h.tracker.status(), TripStatus::Detecting);
    assert!(h.store.all_trips().is_empty());
    assert!(h.store.current_trip().is_none());
    assert!(h.tracker.current_trip().is_none());

    let events = h.drain();
    assert!(!events.iter().any(|e| matches!(e, TrackerEvent::Completed(_))));
    assert_eq!(events, vec![TrackerEvent::StatusChanged(TripStatus::Detecting)]);
}

#[test]
fn test_trip_completes_at_end_geofence() {
    let mut h = Harness::new();
    let draft = SectorDraft {
        name: "Middle".into(),
        start_point: Location::new(0.0, 0.003, 0),
        end_point: Location::new(0.0, 0.006, 0),
        order: 0,
    };
    let route = h.routes.add_sector_to_route(&h.route.id, draft).unwrap();

    let started = h.start_trip();
    h.feed(0.0, 0.003, 2 * MIN);
    h.feed(0.0, 0.006, 2 * MIN);
    h.feed(0.0, 0.01, 2 * MIN);

    assert_eq!(h.tracker.status(), TripStatus::Detecting);
    assert!(h.store.current_trip().is_none());

    let trips = h.store.all_trips();
    assert_eq!(trips.len(), 1);
    let trip = &trips[0];
    assert_eq!(trip.id, started.id);
    assert_eq!(trip.duration, 6 * MIN);
    assert_eq!(trip.end_time - trip.start_time, trip.duration);
    assert_eq!(trip.end_location.longitude, 0.01);
    assert_eq!(trip.route_points.len(), 4);

    // 0.0095 degrees of longitude on the equator
    let distance = trip.distance.unwrap();
    assert!((distance - 1_056.35).abs() < 0.1, "distance {}", distance);
    assert!((trip.average_speed.unwrap() - 10.56).abs() < 0.01);

    assert_eq!(trip.sector_times.len(), 1);
    assert_eq!(trip.sector_times[0].sector_id, route.sectors[0].id);
    assert_eq!(trip.sector_times[0].duration, 2 * MIN);

    let events = h.drain();
    let completed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            TrackerEvent::Completed(t) => Some(t),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![trip]);
    assert_eq!(
        events.last(),
        Some(&TrackerEvent::StatusChanged(TripStatus::Detecting))
    );
}

#[test]
fn test_trip_ends_when_idle() {
    let mut h = Harness::new();
    h.start_trip();

    // Stopped well short of the destination
    for _ in 0..4 {
        h.feed(0.0, 0.004, 2 * MIN);
        assert_eq!(h.tracker.status(), TripStatus::Tracking);
    }
    h.feed(0.0, 0.004, 2 * MIN);

    assert_eq!(h.tracker.status(), TripStatus::Detecting);
    let trips = h.store.all_trips();
    assert_eq!(trips.len(), 1);
    assert_eq!(trips[0].duration, 10 * MIN);
    assert_eq!(trips[0].end_location.longitude, 0.004);
}

#[test]
fn test_trip_resumes_after_restart() {
    let mut h = Harness::new();
    let started = h.start_trip();
    h.feed(0.0, 0.003, 2 * MIN);

    h.restart_tracker();
    assert_eq!(h.tracker.status(), TripStatus::Tracking);
    let recovered = h.tracker.current_trip().unwrap();
    assert_eq!(recovered.id, started.id);
    assert_eq!(recovered.start_time, started.start_time);
    assert_eq!(recovered.route_points.len(), 2);
    assert_eq!(h.source.watcher_count(), 0);

    h.tracker.start_auto_detection().unwrap();
    assert_eq!(h.tracker.status(), TripStatus::Tracking);
    h.feed(0.0, 0.01, 2 * MIN);

    let trips = h.store.all_trips();
    assert_eq!(trips.len(), 1);
    assert_eq!(trips[0].id, started.id);
    assert_eq!(trips[0].duration, 4 * MIN);
    assert_eq!(trips[0].route_points.len(), 3);
}

#[test]
fn test_stop_drops_in_flight_samples_and_keeps_trip() {
    let mut h = Harness::new();
    let started = h.start_trip();

    h.clock.advance(2 * MIN);
    let queued = h.source.push_fix(RoutePoint::new(0.0, 0.01, h.clock.now_millis()));
    assert_eq!(queued, 1);

    h.tracker.stop_auto_detection();
    assert_eq!(h.tracker.process_pending(), 0);
    assert_eq!(h.tracker.status(), TripStatus::Idle);
    assert_eq!(h.source.watcher_count(), 0);

    // The queued end-of-route fix was never processed
    assert!(h.store.all_trips().is_empty());
    assert_eq!(h.store.current_trip().unwrap().id, started.id);

    h.tracker.start_auto_detection().unwrap();
    assert_eq!(h.tracker.status(), TripStatus::Tracking);
    assert_eq!(h.tracker.current_trip().unwrap().id, started.id);
}

#[test]
fn test_force_start_and_end() {
    let mut h = Harness::new();
    assert!(!h.tracker.force_end_trip());

    h.feed(0.0, 0.0, 0);
    assert!(h.tracker.force_start_trip());
    assert_eq!(h.tracker.status(), TripStatus::Tracking);
    assert!(!h.tracker.force_start_trip());

    // Ending immediately is below the minimum duration
    assert!(h.tracker.force_end_trip());
    assert_eq!(h.tracker.status(), TripStatus::Detecting);
    assert!(h.store.all_trips().is_empty());

    assert!(h.tracker.force_start_trip());
    h.feed(0.0, 0.002, 3 * MIN);
    assert!(h.tracker.force_end_trip());

    let trips = h.store.all_trips();
    assert_eq!(trips.len(), 1);
    assert_eq!(trips[0].duration, 3 * MIN);
    assert_eq!(trips[0].end_location.longitude, 0.002);
    assert_eq!(count_started(&h.drain()), 2);
}

#[test]
fn test_location_errors_do_not_change_state() {
    let mut h = Harness::new();
    h.start_trip();

    h.source.push_error(LocationError::PositionUnavailable);
    assert_eq!(h.tracker.process_pending(), 1);
    assert_eq!(h.tracker.status(), TripStatus::Tracking);
    assert_eq!(
        h.drain(),
        vec![TrackerEvent::LocationFailed(LocationError::PositionUnavailable)]
    );
}

#[test]
fn test_deleted_route_discards_trip() {
    let mut h = Harness::new();
    h.start_trip();

    h.routes.delete_route(&h.route.id).unwrap();
    h.feed(0.0, 0.003, 2 * MIN);

    assert_eq!(h.tracker.status(), TripStatus::Detecting);
    assert!(h.store.current_trip().is_none());
    assert!(h.store.all_trips().is_empty());
}

#[test]
fn test_samples_ignored_without_active_route() {
    let mut h = Harness::new();
    h.routes.delete_route(&h.route.id).unwrap();

    h.feed(0.0, 0.0, 0);
    h.feed(0.0, 0.0005, 6 * SEC);
    assert_eq!(h.tracker.status(), TripStatus::Detecting);
    assert!(h.tracker.last_sample().is_none());
    assert!(!h.tracker.force_start_trip());
}

#[test]
fn test_export_import_reproduces_history() {
    let mut h = Harness::new();
    h.start_trip();
    h.feed(0.0, 0.005, 2 * MIN);
    h.feed(0.0, 0.01, 2 * MIN);
    h.routes
        .create_route("Evening", Location::new(0.0, 0.01, 0), Location::new(0.0, 0.0, 0))
        .unwrap();
    assert_eq!(h.store.all_trips().len(), 1);

    let json = h.store.export_data().unwrap();
    let fresh = CommuteStore::new(Arc::new(MemoryStore::new()), &StorageConfig::default());
    fresh.import_data(&json).unwrap();

    assert_eq!(fresh.all_trips(), h.store.all_trips());
    assert_eq!(fresh.all_routes(), h.store.all_routes());
    assert_eq!(fresh.preferences(), h.store.preferences());
}
