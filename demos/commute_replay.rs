//! Replay two weeks of synthetic commutes through the tracker and print the
//! resulting analytics.
//!
//! ```text
//! RUST_LOG=info cargo run --example commute_replay
//! ```

use std::sync::Arc;

use delta_tracker::{
    compare_trip, insights, optimal_timing, trend_analysis, trip_analytics, weekly_patterns,
    ChannelLocationSource, Clock, CommuteStore, DeltaConfig, InsightThresholds, Location,
    ManualClock, MemoryStore, RouteManager, RoutePoint, TrackerEvent, TripTracker,
};

const MIN: i64 = 60_000;
const DAY: i64 = 24 * 60 * MIN;

/// Longitude steps from home (0,0) to the office (0,0.02), about 2.2 km.
const LEGS: usize = 8;

fn main() -> delta_tracker::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = DeltaConfig::default();
    let first_monday = ManualClock::at_local(2024, 1, 8, 7, 45)
        .ok_or_else(|| delta_tracker::DeltaError::validation("ambiguous local time"))?
        .now_millis();
    let clock = Arc::new(ManualClock::new(first_monday));
    let source = Arc::new(ChannelLocationSource::with_clock(clock.clone()));
    let store = CommuteStore::new(Arc::new(MemoryStore::new()), &config.storage);

    let routes = RouteManager::new(
        store.clone(),
        source.clone(),
        clock.clone(),
        config.geolocation.clone(),
    );
    let route = routes.create_route(
        "Home to office",
        Location::new(0.0, 0.0, 0),
        Location::new(0.0, 0.02, 0),
    )?;

    let mut tracker = TripTracker::new(
        config.tracking.clone(),
        store.clone(),
        source.clone(),
        clock.clone(),
    )
    .with_geolocation(&config.geolocation);
    let events = tracker.subscribe();
    tracker.start_auto_detection()?;

    for day in 0..14 {
        let start = first_monday + day * DAY + (day % 3) * 10 * MIN;
        clock.set(start);

        // Slower on Mondays and later departures
        let leg = MIN + (day % 7 == 0) as i64 * 30_000 + (day % 3) * 15_000;
        let mut feed = |longitude: f64, after: i64| {
            clock.advance(after);
            source.push_fix(RoutePoint::new(0.0, longitude, clock.now_millis()));
            tracker.process_pending();
        };

        feed(0.0, 0);
        feed(0.0005, 6_000);
        for step in 1..=LEGS {
            feed(0.0005 + 0.0195 * step as f64 / LEGS as f64, leg);
        }
    }

    for event in events.try_iter() {
        if let TrackerEvent::Completed(trip) = event {
            let history = store.trips_for_route(&route.id);
            let comparison = compare_trip(&history, &trip);
            let best = comparison
                .vs_personal_best
                .map(|d| d.formatted)
                .unwrap_or_else(|| "-".into());
            println!(
                "{} departed {} took {} (vs best {})",
                trip.id,
                comparison.departure,
                delta_tracker::format_duration(trip.duration),
                best
            );
        }
    }

    let trips = store.trips_for_route(&route.id);
    let now = clock.now_millis();
    let summary = trip_analytics(&trips, Some(route.id.as_str()));
    println!(
        "\n{} trips, average {}, consistency {}%",
        summary.total_trips,
        delta_tracker::format_duration(summary.average_duration.round() as i64),
        summary.consistency
    );

    for pattern in weekly_patterns(&trips, Some(route.id.as_str())) {
        if pattern.trip_count > 0 {
            println!(
                "  {:<9} {} over {} trips",
                pattern.day_name,
                delta_tracker::format_duration(pattern.average_duration.round() as i64),
                pattern.trip_count
            );
        }
    }

    let trend = trend_analysis(&trips, Some(route.id.as_str()), 30, now);
    println!("Trend: {:?} ({:+.1}%)", trend.direction, trend.change_percent);

    let timing = optimal_timing(&trips, Some(route.id.as_str()));
    println!(
        "Best departure {} ({}% confidence)",
        timing.best_departure_time, timing.confidence
    );

    for line in insights(&trips, Some(route.id.as_str()), now, &InsightThresholds::default()) {
        println!("{}", line);
    }

    tracker.stop_auto_detection();
    Ok(())
}
