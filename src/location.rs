//! # Location Source
//!
//! The tracking core never talks to a platform location API directly. It depends on
//! the [`LocationSource`] contract:
//!
//! - `request_permission` - ask for access once, before subscribing
//! - `current_position` - one-shot fix, bounded by [`PositionOptions::timeout`]
//! - `watch_position` - standing subscription delivering samples in arrival order
//! - `clear_watch` - end a subscription; nothing more is delivered afterwards
//!
//! [`ChannelLocationSource`] is the host-fed implementation used by mobile shells:
//! the platform callback pushes each fix with [`ChannelLocationSource::push_fix`]
//! and the source fans it out to every open watch.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::GeolocationConfig;
use crate::error::LocationError;
use crate::{Location, RoutePoint};

/// One item of a continuous subscription.
pub type LocationUpdate = std::result::Result<RoutePoint, LocationError>;

/// Identifier of an open subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// Options for a location request.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionOptions {
    pub timeout: Duration,
    pub maximum_age: Duration,
    pub enable_high_accuracy: bool,
}

impl PositionOptions {
    /// Options for one-shot fixes.
    pub fn one_shot(config: &GeolocationConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout),
            maximum_age: Duration::from_millis(config.maximum_age),
            enable_high_accuracy: config.enable_high_accuracy,
        }
    }

    /// Options for the continuous subscription (shorter timeout, fresher fixes).
    pub fn continuous(config: &GeolocationConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.watch_timeout),
            maximum_age: Duration::from_millis(config.watch_maximum_age),
            enable_high_accuracy: config.enable_high_accuracy,
        }
    }
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self::one_shot(&GeolocationConfig::default())
    }
}

/// An open subscription: an ordered, single-consumer stream of updates.
#[derive(Debug)]
pub struct LocationWatch {
    id: WatchId,
    receiver: Receiver<LocationUpdate>,
}

impl LocationWatch {
    pub fn new(id: WatchId, receiver: Receiver<LocationUpdate>) -> Self {
        Self { id, receiver }
    }

    pub fn id(&self) -> WatchId {
        self.id
    }

    /// Next queued update without blocking.
    ///
    /// `Err(TryRecvError::Disconnected)` means the source will never deliver again.
    pub fn try_next(&self) -> std::result::Result<LocationUpdate, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Wait up to `timeout` for the next update.
    pub fn next_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<LocationUpdate, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Abstract device location capability.
pub trait LocationSource: Send + Sync {
    /// Ask for location access. Fails with `PermissionDenied` when refused and
    /// `PositionUnavailable` when the device has no location capability.
    fn request_permission(&self) -> std::result::Result<(), LocationError>;

    /// Obtain one fix. Implementations must return within `options.timeout`.
    fn current_position(
        &self,
        options: &PositionOptions,
    ) -> std::result::Result<Location, LocationError>;

    /// Open a continuous subscription. Returns as soon as it is established.
    fn watch_position(
        &self,
        options: &PositionOptions,
    ) -> std::result::Result<LocationWatch, LocationError>;

    /// Close a subscription. Unknown ids are ignored.
    fn clear_watch(&self, id: WatchId);
}

// ============================================================================
// Host-fed source
// ============================================================================

struct FeedState {
    permission_granted: bool,
    available: bool,
    last_fix: Option<RoutePoint>,
    watchers: HashMap<WatchId, Sender<LocationUpdate>>,
    /// Pending one-shot requests, keyed by request id
    waiters: Vec<(u64, Sender<Location>)>,
    next_watch_id: u64,
    next_waiter_id: u64,
}

/// Location source fed by the host platform.
///
/// Permission and availability are whatever the host last reported; both start
/// out granted.
pub struct ChannelLocationSource {
    state: Mutex<FeedState>,
    clock: Arc<dyn Clock>,
}

impl ChannelLocationSource {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Use `clock` to decide whether a cached fix is fresh enough for one-shot requests.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(FeedState {
                permission_granted: true,
                available: true,
                last_fix: None,
                watchers: HashMap::new(),
                waiters: Vec::new(),
                next_watch_id: 1,
                next_waiter_id: 1,
            }),
            clock,
        }
    }

    fn state(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_permission(&self, granted: bool) {
        self.state().permission_granted = granted;
    }

    pub fn set_available(&self, available: bool) {
        self.state().available = available;
    }

    /// Deliver a fix to every open watch and pending one-shot request.
    ///
    /// Returns the number of watches that received it.
    pub fn push_fix(&self, point: RoutePoint) -> usize {
        let mut state = self.state();
        state.last_fix = Some(point);

        for (_, waiter) in state.waiters.drain(..) {
            let _ = waiter.send(point.location);
        }

        state.watchers.retain(|id, tx| {
            let alive = tx.send(Ok(point)).is_ok();
            if !alive {
                debug!("[LocationSource] Dropping closed watch {:?}", id);
            }
            alive
        });
        state.watchers.len()
    }

    /// Deliver an error to every open watch.
    pub fn push_error(&self, error: LocationError) {
        warn!("[LocationSource] Platform reported: {}", error);
        self.state()
            .watchers
            .retain(|_, tx| tx.send(Err(error)).is_ok());
    }

    /// Most recent fix pushed by the host.
    pub fn last_known(&self) -> Option<RoutePoint> {
        self.state().last_fix
    }

    pub fn watcher_count(&self) -> usize {
        self.state().watchers.len()
    }

    /// One-shot requests still waiting for a fix.
    pub fn pending_requests(&self) -> usize {
        self.state().waiters.len()
    }

    fn check_access(state: &FeedState) -> std::result::Result<(), LocationError> {
        if !state.permission_granted {
            return Err(LocationError::PermissionDenied);
        }
        if !state.available {
            return Err(LocationError::PositionUnavailable);
        }
        Ok(())
    }
}

impl Default for ChannelLocationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationSource for ChannelLocationSource {
    fn request_permission(&self) -> std::result::Result<(), LocationError> {
        Self::check_access(&self.state())
    }

    fn current_position(
        &self,
        options: &PositionOptions,
    ) -> std::result::Result<Location, LocationError> {
        let (waiter_id, receiver) = {
            let mut state = self.state();
            Self::check_access(&state)?;

            if let Some(fix) = state.last_fix {
                let age = self.clock.now_millis() - fix.timestamp();
                if age >= 0 && (age as u128) <= options.maximum_age.as_millis() {
                    return Ok(fix.location);
                }
            }

            let id = state.next_waiter_id;
            state.next_waiter_id += 1;
            let (tx, rx) = mpsc::channel();
            state.waiters.push((id, tx));
            (id, rx)
        };

        // Wait outside the lock so the host can push the fix
        match receiver.recv_timeout(options.timeout) {
            Ok(location) => Ok(location),
            Err(RecvTimeoutError::Timeout) => {
                self.state().waiters.retain(|(id, _)| *id != waiter_id);
                Err(LocationError::Timeout)
            }
            Err(RecvTimeoutError::Disconnected) => Err(LocationError::PositionUnavailable),
        }
    }

    fn watch_position(
        &self,
        _options: &PositionOptions,
    ) -> std::result::Result<LocationWatch, LocationError> {
        let mut state = self.state();
        Self::check_access(&state)?;

        let id = WatchId(state.next_watch_id);
        state.next_watch_id += 1;

        let (tx, rx) = mpsc::channel();
        state.watchers.insert(id, tx);
        debug!("[LocationSource] Opened watch {:?}", id);

        Ok(LocationWatch::new(id, rx))
    }

    fn clear_watch(&self, id: WatchId) {
        if self.state().watchers.remove(&id).is_some() {
            debug!("[LocationSource] Cleared watch {:?}", id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::thread;

    fn fast_options() -> PositionOptions {
        PositionOptions {
            timeout: Duration::from_millis(50),
            maximum_age: Duration::from_millis(1_000),
            enable_high_accuracy: false,
        }
    }

    #[test]
    fn test_watch_receives_fixes_in_order() {
        let source = ChannelLocationSource::new();
        let watch = source.watch_position(&fast_options()).unwrap();

        source.push_fix(RoutePoint::new(0.0, 0.0, 1));
        source.push_fix(RoutePoint::new(0.0, 0.1, 2));

        assert_eq!(watch.try_next().unwrap().unwrap().timestamp(), 1);
        assert_eq!(watch.try_next().unwrap().unwrap().timestamp(), 2);
        assert!(matches!(watch.try_next(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_clear_watch_stops_delivery() {
        let source = ChannelLocationSource::new();
        let watch = source.watch_position(&fast_options()).unwrap();
        source.clear_watch(watch.id());

        assert_eq!(source.push_fix(RoutePoint::new(0.0, 0.0, 1)), 0);
        assert!(matches!(watch.try_next(), Err(TryRecvError::Disconnected)));
    }

    #[test]
    fn test_permission_denied() {
        let source = ChannelLocationSource::new();
        source.set_permission(false);

        assert_eq!(source.request_permission(), Err(LocationError::PermissionDenied));
        assert_eq!(
            source.watch_position(&fast_options()).unwrap_err(),
            LocationError::PermissionDenied
        );
        assert_eq!(
            source.current_position(&fast_options()).unwrap_err(),
            LocationError::PermissionDenied
        );
    }

    #[test]
    fn test_current_position_times_out() {
        let source = ChannelLocationSource::new();
        assert_eq!(
            source.current_position(&fast_options()),
            Err(LocationError::Timeout)
        );
    }

    #[test]
    fn test_timed_out_request_is_released() {
        let source = ChannelLocationSource::new();
        for _ in 0..3 {
            assert_eq!(
                source.current_position(&fast_options()),
                Err(LocationError::Timeout)
            );
        }
        assert_eq!(source.pending_requests(), 0);
    }

    #[test]
    fn test_current_position_uses_fresh_cache() {
        let clock = Arc::new(ManualClock::new(10_000));
        let source = ChannelLocationSource::with_clock(clock.clone());
        source.push_fix(RoutePoint::new(51.5, -0.12, 9_500));

        let fix = source.current_position(&fast_options()).unwrap();
        assert_eq!(fix.latitude, 51.5);

        // Too old for maximum_age, and nothing new arrives
        clock.advance(5_000);
        assert_eq!(
            source.current_position(&fast_options()),
            Err(LocationError::Timeout)
        );
    }

    #[test]
    fn test_current_position_waits_for_next_fix() {
        let source = Arc::new(ChannelLocationSource::new());
        let feeder = {
            let source = Arc::clone(&source);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                source.push_fix(RoutePoint::new(48.85, 2.35, 0));
            })
        };

        let options = PositionOptions {
            timeout: Duration::from_secs(2),
            ..fast_options()
        };
        let fix = source.current_position(&options).unwrap();
        assert_eq!(fix.longitude, 2.35);
        feeder.join().unwrap();
    }

    #[test]
    fn test_errors_are_forwarded_to_watches() {
        let source = ChannelLocationSource::new();
        let watch = source.watch_position(&fast_options()).unwrap();
        source.push_error(LocationError::Timeout);
        assert_eq!(watch.try_next().unwrap(), Err(LocationError::Timeout));
    }
}
