//! Route and session management: route CRUD plus "create a route where I am".

use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::GeolocationConfig;
use crate::error::{DeltaError, OptionExt, Result};
use crate::location::{LocationSource, PositionOptions};
use crate::storage::CommuteStore;
use crate::{generate_id, Location, Route, RouteSector};

/// User-supplied sector data; the id is assigned on insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct SectorDraft {
    pub name: String,
    pub start_point: Location,
    pub end_point: Location,
    pub order: i32,
}

pub struct RouteManager {
    store: CommuteStore,
    source: Arc<dyn LocationSource>,
    clock: Arc<dyn Clock>,
    options: PositionOptions,
}

impl RouteManager {
    pub fn new(
        store: CommuteStore,
        source: Arc<dyn LocationSource>,
        clock: Arc<dyn Clock>,
        geolocation: GeolocationConfig,
    ) -> Self {
        Self {
            store,
            source,
            clock,
            options: PositionOptions::one_shot(&geolocation),
        }
    }

    pub fn routes(&self) -> Vec<Route> {
        self.store.all_routes()
    }

    pub fn route(&self, id: &str) -> Option<Route> {
        self.store.route(id)
    }

    pub fn active_route(&self) -> Option<Route> {
        self.store.active_route()
    }

    /// Create a route with no sectors. The first route ever created is active.
    pub fn create_route(&self, name: &str, start: Location, end: Location) -> Result<Route> {
        let name = validate_name(name, "route")?;
        if !start.is_valid() || !end.is_valid() {
            return Err(DeltaError::validation("route endpoints must be valid coordinates"));
        }

        let route = Route {
            id: generate_id(),
            name,
            start_location: start,
            end_location: end,
            sectors: Vec::new(),
            created_at: self.clock.now_millis(),
            is_active: self.store.all_routes().is_empty(),
        };
        self.store.save_route(&route);

        info!(
            "[RouteManager] Created route '{}' ({}), active={}",
            route.name, route.id, route.is_active
        );
        Ok(route)
    }

    /// One fix from the location source, or `None` if it fails or times out.
    pub fn current_location(&self) -> Option<Location> {
        match self.source.current_position(&self.options) {
            Ok(fix) => Some(fix),
            Err(e) => {
                warn!("[RouteManager] Could not get current location: {}", e);
                None
            }
        }
    }

    /// Create a route starting and ending at the current location.
    ///
    /// The end is a placeholder until the route is refined.
    pub fn create_route_from_current_location(&self, name: &str) -> Option<Route> {
        let here = self.current_location()?;
        match self.create_route(name, here, here) {
            Ok(route) => Some(route),
            Err(e) => {
                warn!("[RouteManager] Could not create route: {}", e);
                None
            }
        }
    }

    /// Activate `id` and deactivate every other route.
    pub fn set_active_route(&self, id: &str) -> Result<()> {
        if !self.store.set_active_route(id) {
            return Err(DeltaError::not_found("Route", id));
        }
        info!("[RouteManager] Active route is now {}", id);
        Ok(())
    }

    /// Delete a route together with its trips.
    pub fn delete_route(&self, id: &str) -> Result<()> {
        if !self.store.delete_route(id) {
            return Err(DeltaError::not_found("Route", id));
        }
        Ok(())
    }

    /// Append a sector, keeping sectors sorted by `order`.
    pub fn add_sector_to_route(&self, route_id: &str, draft: SectorDraft) -> Result<Route> {
        let mut route = self.store.route(route_id).ok_or_missing("Route", route_id)?;
        let name = validate_name(&draft.name, "sector")?;

        route.sectors.push(RouteSector {
            id: generate_id(),
            name,
            start_point: draft.start_point,
            end_point: draft.end_point,
            order: draft.order,
        });
        route.sectors.sort_by_key(|s| s.order);

        self.store.save_route(&route);
        Ok(route)
    }

    /// Replace a stored route wholesale.
    pub fn update_route(&self, route: Route) -> Result<()> {
        validate_name(&route.name, "route")?;
        self.store.route(&route.id).ok_or_missing("Route", &route.id)?;
        self.store.save_route(&route);
        Ok(())
    }
}

fn validate_name(name: &str, kind: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DeltaError::validation(format!("{} name must not be empty", kind)));
    }
    Ok(name.to_string())
}
