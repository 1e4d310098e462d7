//! Shared session state and the context object views act through.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::Serialize;

use crate::cache::CacheStore;
use crate::config::RuntimeConfig;
use crate::coordinator::WeatherFetchCoordinator;
use crate::device::{ConnectivitySignal, Geolocator, Subscription};
use crate::error::FetchError;
use crate::history::SearchHistory;
use crate::model::{
    AirQualitySnapshot, CityLocation, Coordinates, FetchSource, TemperatureUnit, WeatherSnapshot,
};
use crate::providers::ProviderApi;
use crate::storage::{KeyValueStore, StorageError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    pub city: String,
    pub selected_location: Option<CityLocation>,
    pub loading: bool,
    pub error: Option<String>,
    /// Soft failure next to a successful result, e.g. missing air quality.
    pub warning: Option<String>,
    pub unit: TemperatureUnit,
    pub last_fetch_source: Option<FetchSource>,
    pub is_connected: bool,
    pub weather: Option<WeatherSnapshot>,
    pub air_quality: Option<AirQualitySnapshot>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            city: String::new(),
            selected_location: None,
            loading: false,
            error: None,
            warning: None,
            unit: TemperatureUnit::default(),
            last_fetch_source: None,
            is_connected: true,
            weather: None,
            air_quality: None,
        }
    }
}

/// Identifies one coordinator operation. Only the newest ticket may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Lock around [`SessionState`] plus the request generation counter.
///
/// Readers get clones, so nobody observes a half-applied update.
#[derive(Debug, Default)]
pub struct SessionCell {
    state: RwLock<SessionState>,
    generation: AtomicU64,
}

impl SessionCell {
    pub fn new(state: SessionState) -> Self {
        Self {
            state: RwLock::new(state),
            generation: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn with<R>(&self, read: impl FnOnce(&SessionState) -> R) -> R {
        read(&self.state.read())
    }

    /// Unguarded write for view-level setters (city text, unit, connectivity).
    pub fn update(&self, write: impl FnOnce(&mut SessionState)) {
        write(&mut self.state.write());
    }

    /// Start a new operation: supersede every earlier ticket and apply
    /// `reset` in the same critical section.
    pub fn begin(&self, reset: impl FnOnce(&mut SessionState)) -> Ticket {
        let mut state = self.state.write();
        let ticket = Ticket(self.generation.fetch_add(1, Ordering::SeqCst) + 1);
        reset(&mut state);
        ticket
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.0
    }

    /// Apply `write` only while `ticket` is the newest. Returns whether it
    /// landed.
    pub fn apply(&self, ticket: Ticket, write: impl FnOnce(&mut SessionState)) -> bool {
        let mut state = self.state.write();
        if !self.is_current(ticket) {
            tracing::debug!(ticket = ticket.0, "dropping result of superseded request");
            return false;
        }
        write(&mut state);
        true
    }
}

/// Root-level context: owns the coordinator, search history and the
/// connectivity subscription, and exposes the view-level operations.
pub struct WeatherSession<P, S, G> {
    cell: Arc<SessionCell>,
    coordinator: WeatherFetchCoordinator<P, Arc<S>, G>,
    history: SearchHistory<Arc<S>>,
    connectivity: Arc<ConnectivitySignal>,
    subscription: Subscription,
}

impl<P, S, G> WeatherSession<P, S, G>
where
    P: ProviderApi,
    S: KeyValueStore,
    G: Geolocator,
{
    pub fn new(
        config: &RuntimeConfig,
        providers: P,
        store: Arc<S>,
        geolocator: G,
        connectivity: Arc<ConnectivitySignal>,
    ) -> Self {
        let cell = Arc::new(SessionCell::new(SessionState {
            is_connected: connectivity.is_connected(),
            ..SessionState::default()
        }));

        let listener_cell: Weak<SessionCell> = Arc::downgrade(&cell);
        let subscription = connectivity.subscribe(move |connected| {
            if let Some(cell) = listener_cell.upgrade() {
                cell.update(|state| state.is_connected = connected);
            }
        });

        let coordinator = WeatherFetchCoordinator::new(
            Arc::clone(&cell),
            Arc::clone(&connectivity),
            providers,
            CacheStore::new(Arc::clone(&store), config.cache_ttl),
            geolocator,
        )
        .with_endpoints(config.endpoints.clone())
        .with_forecast_days(config.forecast_days);

        Self {
            cell,
            coordinator,
            history: SearchHistory::load(store),
            connectivity,
            subscription,
        }
    }

    pub fn state(&self) -> SessionState {
        self.cell.snapshot()
    }

    pub fn coordinator(&self) -> &WeatherFetchCoordinator<P, Arc<S>, G> {
        &self.coordinator
    }

    /// Editing the search text drops any selected location.
    pub fn set_city(&self, text: &str) {
        self.cell.update(|state| {
            state.city = text.to_string();
            state.selected_location = None;
        });
    }

    pub fn select_location(&self, location: CityLocation) {
        self.cell.update(|state| {
            state.city = location.label();
            state.selected_location = Some(location);
        });
    }

    pub fn handle_search(&self) -> Result<WeatherSnapshot, FetchError> {
        let snapshot = self.coordinator.handle_search()?;
        if let Err(error) = self.history.add(&snapshot.location) {
            tracing::warn!(%error, "failed to record search history");
        }
        Ok(snapshot)
    }

    pub fn use_current_location(&self, force_refresh: bool) -> Result<WeatherSnapshot, FetchError> {
        self.coordinator.fetch_for_current_location(force_refresh)
    }

    pub fn fetch_by_coordinates(
        &self,
        coordinates: Coordinates,
        label: &str,
    ) -> Result<WeatherSnapshot, FetchError> {
        self.coordinator.fetch_by_coordinates(coordinates, label)
    }

    pub fn fetch_cached_only(&self, label: &str) -> bool {
        self.coordinator.fetch_cached_only(label)
    }

    /// Re-open a history entry: cache first, then a live search through the
    /// label heuristic when online.
    pub fn select_history(&self, label: &str) -> Result<WeatherSnapshot, FetchError> {
        if let Some(cached) = self.coordinator.load_cached(label) {
            return Ok(cached);
        }
        if !self.connectivity.is_connected() {
            return self.coordinator.reject(FetchError::Connectivity);
        }

        self.set_city(label);
        self.handle_search()
    }

    /// Change the unit; with a result on screen the last fetch is replayed so
    /// the provider converts the values.
    pub fn set_unit(&self, unit: TemperatureUnit) -> Result<(), FetchError> {
        let (changed, has_weather) = self
            .cell
            .with(|state| (state.unit != unit, state.weather.is_some()));
        if !changed {
            return Ok(());
        }

        self.cell.update(|state| state.unit = unit);
        if !has_weather {
            return Ok(());
        }
        self.replay()
    }

    pub fn toggle_unit(&self) -> Result<(), FetchError> {
        let unit = self.cell.with(|state| state.unit);
        self.set_unit(if unit.is_fahrenheit() {
            TemperatureUnit::Celsius
        } else {
            TemperatureUnit::Fahrenheit
        })
    }

    /// Pull-to-refresh.
    pub fn refresh(&self) -> Result<(), FetchError> {
        self.replay()
    }

    fn replay(&self) -> Result<(), FetchError> {
        match self.cell.with(|state| state.last_fetch_source) {
            Some(FetchSource::City) => self.handle_search().map(drop),
            Some(FetchSource::Location) => self.use_current_location(true).map(drop),
            None => Ok(()),
        }
    }

    pub fn restore_last_query(&self) -> bool {
        self.coordinator.restore_last_query()
    }

    pub fn suggest(&self, text: &str) -> Result<Vec<CityLocation>, FetchError> {
        self.coordinator.suggest(text)
    }

    pub fn history(&self) -> Vec<String> {
        self.history.entries()
    }

    pub fn clear_history(&self) -> Result<(), StorageError> {
        self.history.clear()
    }
}

impl<P, S, G> Drop for WeatherSession<P, S, G> {
    fn drop(&mut self) {
        self.connectivity.unsubscribe(self.subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NO_NETWORK_MESSAGE, SELECT_CITY_MESSAGE};
    use crate::storage::MemoryStore;
    use crate::test_support::{FakeGeolocator, FakeProviders, geocode_fixture};

    type TestSession = WeatherSession<Arc<FakeProviders>, MemoryStore, Arc<FakeGeolocator>>;

    struct Fixture {
        session: TestSession,
        providers: Arc<FakeProviders>,
        geolocator: Arc<FakeGeolocator>,
        connectivity: Arc<ConnectivitySignal>,
        store: Arc<MemoryStore>,
    }

    fn fixture_with(providers: FakeProviders, connected: bool) -> Fixture {
        let providers = Arc::new(providers);
        let geolocator = Arc::new(FakeGeolocator::at(51.5, -0.1));
        let connectivity = Arc::new(ConnectivitySignal::new(connected));
        let store = Arc::new(MemoryStore::new());
        let session = WeatherSession::new(
            &RuntimeConfig::default(),
            Arc::clone(&providers),
            Arc::clone(&store),
            Arc::clone(&geolocator),
            Arc::clone(&connectivity),
        );

        Fixture {
            session,
            providers,
            geolocator,
            connectivity,
            store,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(FakeProviders::new(), true)
    }

    fn berlin() -> CityLocation {
        CityLocation {
            name: "Berlin".to_string(),
            admin1: Some("Land Berlin".to_string()),
            country: "Germany".to_string(),
            latitude: 52.52,
            longitude: 13.41,
        }
    }

    #[test]
    fn session_cell_drops_writes_from_superseded_tickets() {
        let cell = SessionCell::default();
        let first = cell.begin(|state| state.loading = true);
        let second = cell.begin(|state| state.city = "newer".to_string());

        assert!(!cell.apply(first, |state| state.loading = false));
        assert!(cell.snapshot().loading);
        assert!(cell.apply(second, |state| state.loading = false));
        assert!(!cell.snapshot().loading);
        assert!(cell.is_current(second));
    }

    #[test]
    fn session_tracks_connectivity_until_dropped() {
        let Fixture {
            session,
            connectivity,
            ..
        } = fixture();
        assert!(session.state().is_connected);

        connectivity.set_connected(false);
        assert!(!session.state().is_connected);
        assert_eq!(connectivity.subscriber_count(), 1);

        drop(session);
        assert_eq!(connectivity.subscriber_count(), 0);
    }

    #[test]
    fn session_search_records_history_on_success_only() {
        let fx = fixture();
        fx.session.select_location(berlin());

        let snapshot = fx.session.handle_search().expect("search");
        assert_eq!(snapshot.location, "Berlin, Land Berlin, Germany");
        assert_eq!(fx.session.history(), vec!["Berlin, Land Berlin, Germany"]);

        fx.session.set_city("   ");
        let error = fx.session.handle_search().expect_err("must fail");
        assert_eq!(error.to_string(), SELECT_CITY_MESSAGE);
        assert_eq!(fx.session.history().len(), 1);
    }

    #[test]
    fn unit_toggle_replays_city_fetch_once() {
        let fx = fixture();
        fx.session.select_location(berlin());
        fx.session.handle_search().expect("search");
        assert_eq!(fx.providers.forecast_calls(), 1);

        fx.session.toggle_unit().expect("replay");

        let state = fx.session.state();
        assert_eq!(fx.providers.forecast_calls(), 2);
        assert_eq!(fx.geolocator.calls(), 0);
        assert_eq!(state.last_fetch_source, Some(FetchSource::City));
        assert_eq!(state.unit, TemperatureUnit::Fahrenheit);
        assert!(
            fx.providers.forecast_urls()[1]
                .ends_with("&temperature_unit=fahrenheit&windspeed_unit=mph")
        );
    }

    #[test]
    fn unit_toggle_replays_location_fetch_with_forced_refresh() {
        let fx = fixture();
        fx.session.use_current_location(false).expect("locate");
        assert_eq!(fx.providers.forecast_calls(), 1);

        fx.session.toggle_unit().expect("replay");

        assert_eq!(fx.geolocator.calls(), 2);
        assert_eq!(fx.providers.forecast_calls(), 2, "forced replay skips the cache");
        assert_eq!(
            fx.session.state().last_fetch_source,
            Some(FetchSource::Location)
        );
    }

    #[test]
    fn unit_change_without_result_does_not_fetch() {
        let fx = fixture();
        fx.session.set_unit(TemperatureUnit::Fahrenheit).expect("unit");
        fx.session.set_unit(TemperatureUnit::Fahrenheit).expect("unit");

        assert_eq!(fx.providers.network_calls(), 0);
        assert!(fx.session.state().unit.is_fahrenheit());
    }

    #[test]
    fn select_history_prefers_cache() {
        let fx = fixture();
        fx.session.select_location(berlin());
        fx.session.handle_search().expect("search");
        let calls = fx.providers.network_calls();

        fx.connectivity.set_connected(false);
        let cached = fx
            .session
            .select_history("Berlin, Land Berlin, Germany")
            .expect("cached");

        assert_eq!(cached.location, "Berlin, Land Berlin, Germany");
        assert_eq!(fx.providers.network_calls(), calls);
        assert_eq!(fx.session.state().error, None);
    }

    #[test]
    fn select_history_miss_searches_with_first_and_last_segment() {
        let fx = fixture_with(
            FakeProviders::new().with_geocode(geocode_fixture(&[(
                "Dublin",
                Some("Leinster"),
                "Ireland",
            )])),
            true,
        );

        let snapshot = fx
            .session
            .select_history("Dublin, Leinster, Ireland")
            .expect("search");

        assert_eq!(snapshot.location, "Dublin, Leinster, Ireland");
        assert!(fx.providers.geocode_urls()[0].contains("name=Dublin%2C+Ireland"));
        assert_eq!(
            fx.session
                .state()
                .selected_location
                .map(|location| location.name),
            Some("Dublin".to_string())
        );
    }

    #[test]
    fn select_history_miss_offline_reports_connectivity() {
        let fx = fixture_with(FakeProviders::new(), false);

        let error = fx
            .session
            .select_history("Dublin, Leinster, Ireland")
            .expect_err("must fail");

        assert_eq!(error, FetchError::Connectivity);
        assert_eq!(fx.session.state().error.as_deref(), Some(NO_NETWORK_MESSAGE));
        assert_eq!(fx.providers.network_calls(), 0);
    }

    #[test]
    fn restore_last_query_publishes_previous_result() {
        let fx = fixture();
        fx.session.select_location(berlin());
        let snapshot = fx.session.handle_search().expect("search");

        let restored = fixture_reusing(&fx);
        assert!(restored.restore_last_query());
        let state = restored.state();
        assert_eq!(state.weather, Some(snapshot));
        assert!(!state.loading);
        assert!(!restored.restore_last_query(), "already showing a result");
    }

    #[test]
    fn refresh_replays_city_search() {
        let fx = fixture();
        fx.session.select_location(berlin());
        fx.session.handle_search().expect("search");

        fx.session.refresh().expect("refresh");

        let state = fx.session.state();
        assert_eq!(fx.providers.forecast_calls(), 2);
        assert_eq!(fx.geolocator.calls(), 0);
        assert_eq!(state.last_fetch_source, Some(FetchSource::City));
        assert_eq!(
            state.weather.map(|weather| weather.location),
            Some("Berlin, Land Berlin, Germany".to_string())
        );
        assert_eq!(fx.session.history(), vec!["Berlin, Land Berlin, Germany"]);
    }

    #[test]
    fn refresh_replays_location_fetch_past_the_cache() {
        let fx = fixture();
        fx.session.use_current_location(false).expect("locate");

        fx.session.refresh().expect("refresh");

        assert_eq!(fx.geolocator.calls(), 2);
        assert_eq!(fx.providers.forecast_calls(), 2);
        assert_eq!(
            fx.session.state().last_fetch_source,
            Some(FetchSource::Location)
        );
    }

    #[test]
    fn refresh_without_previous_fetch_does_nothing() {
        let fx = fixture();

        fx.session.refresh().expect("refresh");

        assert_eq!(fx.providers.network_calls(), 0);
        assert_eq!(fx.geolocator.calls(), 0);
        assert_eq!(fx.session.state().last_fetch_source, None);
    }

    #[test]
    fn unit_toggle_offline_after_location_keeps_result() {
        let fx = fixture();
        let snapshot = fx.session.use_current_location(false).expect("locate");
        fx.connectivity.set_connected(false);

        let error = fx.session.toggle_unit().expect_err("must fail");

        let state = fx.session.state();
        assert_eq!(error, FetchError::Connectivity);
        assert_eq!(state.weather, Some(snapshot));
        assert_eq!(state.error.as_deref(), Some(NO_NETWORK_MESSAGE));
        assert!(!state.loading);
        assert_eq!(fx.geolocator.calls(), 1);
    }

    #[test]
    fn fetch_by_coordinates_caches_under_label() {
        let fx = fixture();
        let coordinates = Coordinates {
            latitude: 48.85,
            longitude: 2.35,
        };

        let snapshot = fx
            .session
            .fetch_by_coordinates(coordinates, "Paris, France")
            .expect("fetch");

        assert_eq!(snapshot.location, "Paris, France");
        assert_eq!(
            fx.session.state().last_fetch_source,
            Some(FetchSource::City)
        );
        assert_eq!(
            fx.session
                .coordinator()
                .cache()
                .get::<WeatherSnapshot>("city:paris, france"),
            Some(snapshot)
        );
        assert!(fx.session.history().is_empty());
    }

    #[test]
    fn session_cache_uses_configured_ttl() {
        let fx = fixture();
        assert_eq!(fx.session.coordinator().cache().ttl(), None);

        let config = RuntimeConfig::from_pairs([("WEATHER_CACHE_TTL_SECS", "600")]);
        let session: TestSession = WeatherSession::new(
            &config,
            Arc::clone(&fx.providers),
            Arc::clone(&fx.store),
            Arc::clone(&fx.geolocator),
            Arc::clone(&fx.connectivity),
        );
        assert_eq!(
            session.coordinator().cache().ttl(),
            Some(std::time::Duration::from_secs(600))
        );
    }

    fn fixture_reusing(fx: &Fixture) -> TestSession {
        WeatherSession::new(
            &RuntimeConfig::default(),
            Arc::clone(&fx.providers),
            Arc::clone(&fx.store),
            Arc::clone(&fx.geolocator),
            Arc::clone(&fx.connectivity),
        )
    }
}
