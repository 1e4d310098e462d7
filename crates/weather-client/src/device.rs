//! Device collaborators: geolocation and the network connectivity signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use thiserror::Error;

use crate::model::Coordinates;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeolocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("{0}")]
    Unavailable(String),
}

pub trait Geolocator {
    fn current_position(&self) -> Result<Coordinates, GeolocationError>;
}

impl<G: Geolocator + ?Sized> Geolocator for Arc<G> {
    fn current_position(&self) -> Result<Coordinates, GeolocationError> {
        (**self).current_position()
    }
}

/// Position supplied up front (CLI flags); `None` reports the position as
/// unavailable.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FixedGeolocator {
    position: Option<Coordinates>,
}

impl FixedGeolocator {
    pub fn new(position: Option<Coordinates>) -> Self {
        Self { position }
    }
}

impl Geolocator for FixedGeolocator {
    fn current_position(&self) -> Result<Coordinates, GeolocationError> {
        self.position.ok_or_else(|| {
            GeolocationError::Unavailable(
                "device position unavailable: pass both --lat and --lon".to_string(),
            )
        })
    }
}

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// Subscribable boolean "is the network reachable" state.
///
/// A new subscriber is called once with the current value, then on every
/// change.
pub struct ConnectivitySignal {
    connected: AtomicBool,
    next_id: AtomicU64,
    listeners: Mutex<Vec<(Subscription, Listener)>>,
}

impl Default for ConnectivitySignal {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivitySignal {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let subscription = Subscription(self.next_id.fetch_add(1, Ordering::SeqCst));
        let listener: Listener = Arc::new(listener);
        self.listeners
            .lock()
            .push((subscription, Arc::clone(&listener)));
        listener(self.is_connected());
        subscription
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.listeners.lock().retain(|(id, _)| *id != subscription);
    }

    pub fn set_connected(&self, connected: bool) {
        if self.connected.swap(connected, Ordering::SeqCst) == connected {
            return;
        }
        tracing::info!(connected, "connectivity changed");

        // Listeners run outside the lock so they may (un)subscribe.
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(connected);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.lock().len()
    }
}
