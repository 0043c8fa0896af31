//! # Persistence
//!
//! The core only needs a key-value capability: `put`, `get` and `remove` of JSON
//! values by key ([`KeyValueStore`]). [`CommuteStore`] layers typed record access
//! on top of it:
//!
//! | Key | Record |
//! |-----|--------|
//! | `<prefix>trips` | trip history, newest first |
//! | `<prefix>routes` | route list |
//! | `<prefix>user_preferences` | the single preferences record |
//! | `<prefix>current_trip` | in-progress trip snapshot |
//!
//! Each logical record is written with a single `put`, so a record is never left
//! half-updated. Storage failures never reach business logic: they are logged,
//! reads become "no data" and writes become no-ops.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::StorageConfig;
use crate::error::{DeltaError, Result};
use crate::tracking::PartialTrip;
use crate::{Route, Trip, UserPreferences};

const TRIPS_KEY: &str = "trips";
const ROUTES_KEY: &str = "routes";
const PREFERENCES_KEY: &str = "user_preferences";
const CURRENT_TRIP_KEY: &str = "current_trip";

/// Abstract key-value persistence capability.
///
/// Implementations must make each `put` atomic for its key.
pub trait KeyValueStore: Send + Sync {
    fn put(&self, key: &str, value: &Value) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local store, used by tests and hosts without durable storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn put(&self, key: &str, value: &Value) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| DeltaError::storage("memory store lock poisoned"))?;
        entries.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| DeltaError::storage("memory store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| DeltaError::storage("memory store lock poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

/// Full data export document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataExport {
    pub trips: Vec<Trip>,
    pub routes: Vec<Route>,
    pub preferences: UserPreferences,
    /// ISO-8601 UTC timestamp
    pub export_date: String,
}

/// Import accepts any subset of the export's top-level keys.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataImport {
    trips: Option<Vec<Trip>>,
    routes: Option<Vec<Route>>,
    preferences: Option<UserPreferences>,
}

// ============================================================================
// Typed record access
// ============================================================================

/// Typed access to the commute records of one key-value store.
///
/// Cheap to clone; clones share the underlying store.
#[derive(Clone)]
pub struct CommuteStore {
    kv: Arc<dyn KeyValueStore>,
    prefix: String,
    max_stored_trips: usize,
}

impl CommuteStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, config: &StorageConfig) -> Self {
        Self {
            kv,
            prefix: config.prefix.clone(),
            max_stored_trips: config.max_stored_trips as usize,
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn read<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let key = self.key(name);
        let value = match self.kv.get(&key) {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(e) => {
                warn!("[CommuteStore] Failed to read {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("[CommuteStore] Ignoring malformed {}: {}", key, e);
                None
            }
        }
    }

    fn write<T: Serialize + ?Sized>(&self, name: &str, record: &T) {
        let key = self.key(name);
        let result = serde_json::to_value(record)
            .map_err(DeltaError::from)
            .and_then(|value| self.kv.put(&key, &value));
        if let Err(e) = result {
            warn!("[CommuteStore] Failed to write {}: {}", key, e);
        }
    }

    fn erase(&self, name: &str) {
        let key = self.key(name);
        if let Err(e) = self.kv.remove(&key) {
            warn!("[CommuteStore] Failed to remove {}: {}", key, e);
        }
    }

    // ------------------------------------------------------------------------
    // Trips
    // ------------------------------------------------------------------------

    /// All trips, newest first.
    pub fn all_trips(&self) -> Vec<Trip> {
        self.read(TRIPS_KEY).unwrap_or_default()
    }

    pub fn trip(&self, id: &str) -> Option<Trip> {
        self.all_trips().into_iter().find(|t| t.id == id)
    }

    pub fn trips_for_route(&self, route_id: &str) -> Vec<Trip> {
        self.all_trips()
            .into_iter()
            .filter(|t| t.route_id == route_id)
            .collect()
    }

    /// Trips whose start time lies in `[start, end]`.
    pub fn trips_in_range(&self, start: i64, end: i64) -> Vec<Trip> {
        self.all_trips()
            .into_iter()
            .filter(|t| t.start_time >= start && t.start_time <= end)
            .collect()
    }

    /// Insert or replace a trip by id.
    pub fn save_trip(&self, trip: &Trip) {
        let mut trips = self.all_trips();
        match trips.iter_mut().find(|t| t.id == trip.id) {
            Some(existing) => *existing = trip.clone(),
            None => trips.push(trip.clone()),
        }
        self.write_trips(trips);
    }

    /// Returns false when no trip had that id.
    pub fn delete_trip(&self, id: &str) -> bool {
        let mut trips = self.all_trips();
        let before = trips.len();
        trips.retain(|t| t.id != id);
        if trips.len() == before {
            return false;
        }
        self.write_trips(trips);
        true
    }

    fn write_trips(&self, mut trips: Vec<Trip>) {
        trips.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        if self.max_stored_trips > 0 && trips.len() > self.max_stored_trips {
            debug!(
                "[CommuteStore] Trimming trip history from {} to {}",
                trips.len(),
                self.max_stored_trips
            );
            trips.truncate(self.max_stored_trips);
        }
        self.write(TRIPS_KEY, &trips);
    }

    // ------------------------------------------------------------------------
    // Routes
    // ------------------------------------------------------------------------

    pub fn all_routes(&self) -> Vec<Route> {
        self.read(ROUTES_KEY).unwrap_or_default()
    }

    pub fn route(&self, id: &str) -> Option<Route> {
        self.all_routes().into_iter().find(|r| r.id == id)
    }

    pub fn active_route(&self) -> Option<Route> {
        self.all_routes().into_iter().find(|r| r.is_active)
    }

    /// Insert or replace a route by id. Saving an active route deactivates the others.
    pub fn save_route(&self, route: &Route) {
        let mut routes = self.all_routes();
        if route.is_active {
            for other in routes.iter_mut() {
                other.is_active = false;
            }
        }
        match routes.iter_mut().find(|r| r.id == route.id) {
            Some(existing) => *existing = route.clone(),
            None => routes.push(route.clone()),
        }
        self.write(ROUTES_KEY, &routes);
    }

    /// Make `id` the only active route. Returns false when the route is unknown.
    pub fn set_active_route(&self, id: &str) -> bool {
        let mut routes = self.all_routes();
        if !routes.iter().any(|r| r.id == id) {
            return false;
        }
        for route in routes.iter_mut() {
            route.is_active = route.id == id;
        }
        self.write(ROUTES_KEY, &routes);
        true
    }

    /// Delete a route and every trip that references it.
    pub fn delete_route(&self, id: &str) -> bool {
        let mut routes = self.all_routes();
        let before = routes.len();
        routes.retain(|r| r.id != id);
        if routes.len() == before {
            return false;
        }
        self.write(ROUTES_KEY, &routes);

        let trips = self.all_trips();
        let kept: Vec<Trip> = trips.iter().filter(|t| t.route_id != id).cloned().collect();
        if kept.len() != trips.len() {
            info!(
                "[CommuteStore] Deleted route {} and {} dependent trips",
                id,
                trips.len() - kept.len()
            );
            self.write_trips(kept);
        }
        true
    }

    // ------------------------------------------------------------------------
    // Preferences
    // ------------------------------------------------------------------------

    /// The preferences record, created with defaults on first access.
    pub fn preferences(&self) -> UserPreferences {
        match self.read(PREFERENCES_KEY) {
            Some(prefs) => prefs,
            None => {
                let prefs = UserPreferences::default();
                self.write(PREFERENCES_KEY, &prefs);
                prefs
            }
        }
    }

    pub fn save_preferences(&self, prefs: &UserPreferences) {
        self.write(PREFERENCES_KEY, prefs);
    }

    // ------------------------------------------------------------------------
    // Current trip snapshot
    // ------------------------------------------------------------------------

    pub fn save_current_trip(&self, trip: &PartialTrip) {
        self.write(CURRENT_TRIP_KEY, trip);
    }

    /// The persisted in-progress trip, if present and well-formed.
    pub fn current_trip(&self) -> Option<PartialTrip> {
        self.read(CURRENT_TRIP_KEY)
    }

    pub fn clear_current_trip(&self) {
        self.erase(CURRENT_TRIP_KEY);
    }

    // ------------------------------------------------------------------------
    // Export / import
    // ------------------------------------------------------------------------

    /// Snapshot of all trips, routes and preferences.
    pub fn export(&self) -> DataExport {
        DataExport {
            trips: self.all_trips(),
            routes: self.all_routes(),
            preferences: self.preferences(),
            export_date: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Pretty-printed JSON export document.
    pub fn export_data(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.export())?)
    }

    /// Apply whichever of `trips`, `routes` and `preferences` the document contains.
    pub fn import_data(&self, json: &str) -> Result<()> {
        let data: DataImport = serde_json::from_str(json)?;

        if let Some(trips) = data.trips {
            info!("[CommuteStore] Importing {} trips", trips.len());
            if self.max_stored_trips > 0 && trips.len() > self.max_stored_trips {
                info!(
                    "[CommuteStore] Keeping the newest {} imported trips, dropping {}",
                    self.max_stored_trips,
                    trips.len() - self.max_stored_trips
                );
            }
            self.write_trips(trips);
        }
        if let Some(mut routes) = data.routes {
            info!("[CommuteStore] Importing {} routes", routes.len());
            // At most one active route: the first one flagged wins
            let mut seen_active = false;
            for route in routes.iter_mut() {
                if route.is_active && seen_active {
                    warn!("[CommuteStore] Deactivating imported route {}", route.id);
                    route.is_active = false;
                }
                seen_active |= route.is_active;
            }
            self.write(ROUTES_KEY, &routes);
        }
        if let Some(prefs) = data.preferences {
            self.save_preferences(&prefs);
        }
        Ok(())
    }

    /// Remove every record, including the current-trip snapshot.
    pub fn clear_all_data(&self) {
        for name in [TRIPS_KEY, ROUTES_KEY, PREFERENCES_KEY, CURRENT_TRIP_KEY] {
            self.erase(name);
        }
        info!("[CommuteStore] Cleared all data");
    }
}
