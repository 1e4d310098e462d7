use std::sync::Arc;

use crate::cache::{CacheStore, city_cache_key, coords_cache_key};
use crate::config::{DEFAULT_FORECAST_DAYS, Endpoints};
use crate::device::{ConnectivitySignal, Geolocator};
use crate::error::FetchError;
use crate::geocoding::GeoResolver;
use crate::model::{
    CityLocation, Coordinates, FetchSource, WeatherSnapshot, history_geocode_query,
};
use crate::providers::open_meteo::build_weather_snapshot;
use crate::providers::ProviderApi;
use crate::session::{SessionCell, Ticket};
use crate::storage::KeyValueStore;
use crate::urls::{ForecastParams, build_air_quality_url, build_forecast_url};

pub const CURRENT_LOCATION_LABEL: &str = "Current location";

/// Runs fetch operations against the providers and publishes their results
/// into the shared [`SessionCell`].
///
/// Each operation holds a request ticket; once a newer operation starts, the
/// older one's remaining writes are dropped. Within an operation the order is
/// geocode, forecast, air quality, cache write. Failures end up in the
/// session's `error` field and `loading` is cleared on every exit.
pub struct WeatherFetchCoordinator<P, S, G> {
    session: Arc<SessionCell>,
    connectivity: Arc<ConnectivitySignal>,
    providers: P,
    cache: CacheStore<S>,
    geolocator: G,
    endpoints: Endpoints,
    forecast_days: u8,
}

impl<P, S, G> WeatherFetchCoordinator<P, S, G>
where
    P: ProviderApi,
    S: KeyValueStore,
    G: Geolocator,
{
    pub fn new(
        session: Arc<SessionCell>,
        connectivity: Arc<ConnectivitySignal>,
        providers: P,
        cache: CacheStore<S>,
        geolocator: G,
    ) -> Self {
        Self {
            session,
            connectivity,
            providers,
            cache,
            geolocator,
            endpoints: Endpoints::default(),
            forecast_days: DEFAULT_FORECAST_DAYS,
        }
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_forecast_days(mut self, forecast_days: u8) -> Self {
        self.forecast_days = forecast_days;
        self
    }

    pub fn cache(&self) -> &CacheStore<S> {
        &self.cache
    }

    pub fn is_connected(&self) -> bool {
        self.connectivity.is_connected()
    }

    pub fn geo_resolver(&self) -> GeoResolver<'_, P> {
        GeoResolver::new(&self.providers, &self.endpoints.geocoding)
    }

    /// Fetch and publish weather for known coordinates, cached under the
    /// `city:` key of `label`.
    pub fn fetch_by_coordinates(
        &self,
        coordinates: Coordinates,
        label: &str,
    ) -> Result<WeatherSnapshot, FetchError> {
        let ticket = self.start(FetchSource::City);
        let result = self.fetch_and_publish(ticket, coordinates, label, &city_cache_key(label));
        self.finish(ticket, "fetch_by_coordinates", result)
    }

    /// Weather for the device position. Without `force_refresh` a
    /// `coords:` cache hit is served without touching the network, even
    /// offline.
    pub fn fetch_for_current_location(
        &self,
        force_refresh: bool,
    ) -> Result<WeatherSnapshot, FetchError> {
        if force_refresh && !self.is_connected() {
            return self.reject(FetchError::Connectivity);
        }

        let ticket = self.start(FetchSource::Location);
        let result = self.locate_and_fetch(ticket, force_refresh);
        self.finish(ticket, "fetch_for_current_location", result)
    }

    /// Publish the `city:` cache entry for `label` if there is one. Never
    /// touches the network.
    pub fn fetch_cached_only(&self, label: &str) -> bool {
        self.load_cached(label).is_some()
    }

    pub fn load_cached(&self, label: &str) -> Option<WeatherSnapshot> {
        let cached = self.cache.get::<WeatherSnapshot>(&city_cache_key(label));
        let published = cached.clone();

        self.session.begin(|state| {
            state.last_fetch_source = Some(FetchSource::City);
            state.city = label.to_string();
            state.selected_location = None;
            state.air_quality = None;
            state.error = None;
            state.warning = None;
            state.loading = false;
            if let Some(snapshot) = published {
                state.weather = Some(snapshot);
            }
        });

        if cached.is_some() {
            tracing::info!(label, "serving weather from cache");
        }
        cached
    }

    /// Search for the selected location, or for the typed text when nothing
    /// was selected.
    pub fn handle_search(&self) -> Result<WeatherSnapshot, FetchError> {
        if !self.is_connected() {
            return self.reject(FetchError::Connectivity);
        }

        let (city, selected) = self
            .session
            .with(|state| (state.city.clone(), state.selected_location.clone()));
        if selected.is_none() && city.trim().is_empty() {
            return self.reject(FetchError::Validation);
        }

        let ticket = self.start(FetchSource::City);
        let result = self
            .resolve_selection(ticket, &city, selected)
            .and_then(|location| {
                let label = location.label();
                self.fetch_and_publish(
                    ticket,
                    location.coordinates(),
                    &label,
                    &city_cache_key(&label),
                )
            });
        self.finish(ticket, "handle_search", result)
    }

    /// Publish the last successful result when nothing is shown yet.
    pub fn restore_last_query(&self) -> bool {
        if self.session.with(|state| state.weather.is_some()) {
            return false;
        }

        let ticket = self.session.begin(|state| state.loading = true);
        let last = self.cache.get_last_query();
        let restored = last.is_some();
        self.session.apply(ticket, |state| {
            if state.weather.is_none() {
                state.weather = last;
            }
            state.loading = false;
        });
        restored
    }

    /// Autocomplete matches for `text`. Does not touch session state.
    pub fn suggest(&self, text: &str) -> Result<Vec<CityLocation>, FetchError> {
        if !self.is_connected() {
            return Err(FetchError::Connectivity);
        }
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self.geo_resolver().resolve_many(text)?)
    }

    /// Publish `error` without starting a fetch.
    pub fn reject(&self, error: FetchError) -> Result<WeatherSnapshot, FetchError> {
        tracing::warn!(%error, "request rejected");
        self.session.begin(|state| {
            state.loading = false;
            state.error = Some(error.to_string());
        });
        Err(error)
    }

    fn start(&self, source: FetchSource) -> Ticket {
        self.session.begin(|state| {
            if source == FetchSource::Location {
                state.city.clear();
            }
            state.loading = true;
            state.weather = None;
            state.air_quality = None;
            state.error = None;
            state.warning = None;
            state.last_fetch_source = Some(source);
        })
    }

    fn finish(
        &self,
        ticket: Ticket,
        operation: &'static str,
        result: Result<WeatherSnapshot, FetchError>,
    ) -> Result<WeatherSnapshot, FetchError> {
        match &result {
            Ok(snapshot) => tracing::info!(operation, location = %snapshot.location, "weather ready"),
            Err(error) => tracing::warn!(operation, %error, "weather request failed"),
        }

        self.session.apply(ticket, |state| {
            state.loading = false;
            if let Err(error) = &result {
                state.error = Some(error.to_string());
            }
        });
        result
    }

    fn resolve_selection(
        &self,
        ticket: Ticket,
        city: &str,
        selected: Option<CityLocation>,
    ) -> Result<CityLocation, FetchError> {
        if let Some(location) = selected {
            return Ok(location);
        }

        let query = history_geocode_query(city).ok_or(FetchError::Validation)?;
        let location = self.geo_resolver().resolve_one(&query)?;
        self.session.apply(ticket, |state| {
            state.selected_location = Some(location.clone());
        });
        Ok(location)
    }

    fn locate_and_fetch(
        &self,
        ticket: Ticket,
        force_refresh: bool,
    ) -> Result<WeatherSnapshot, FetchError> {
        let coordinates = self.geolocator.current_position()?;
        let cache_key = coords_cache_key(coordinates.latitude, coordinates.longitude);

        if !force_refresh {
            if let Some(cached) = self.cache.get::<WeatherSnapshot>(&cache_key) {
                tracing::info!(%cache_key, "serving current location from cache");
                self.session.apply(ticket, |state| {
                    state.weather = Some(cached.clone());
                });
                return Ok(cached);
            }
        }

        self.fetch_and_publish(ticket, coordinates, CURRENT_LOCATION_LABEL, &cache_key)
    }

    fn fetch_and_publish(
        &self,
        ticket: Ticket,
        coordinates: Coordinates,
        label: &str,
        cache_key: &str,
    ) -> Result<WeatherSnapshot, FetchError> {
        if !self.is_connected() {
            return Err(FetchError::Connectivity);
        }

        let unit = self.session.with(|state| state.unit);
        let url = build_forecast_url(
            &self.endpoints.forecast,
            ForecastParams {
                latitude: coordinates.latitude,
                longitude: coordinates.longitude,
                unit,
                forecast_days: self.forecast_days,
            },
        )?;
        tracing::info!(label, unit = ?unit, "fetching forecast");

        let snapshot = build_weather_snapshot(self.providers.fetch_forecast(&url)?, label)?;
        self.session.apply(ticket, |state| {
            state.weather = Some(snapshot.clone());
        });

        self.publish_air_quality(ticket, coordinates);
        self.persist(cache_key, &snapshot);
        Ok(snapshot)
    }

    /// Air quality is secondary: a failure becomes a warning and the weather
    /// already published stays.
    fn publish_air_quality(&self, ticket: Ticket, coordinates: Coordinates) {
        let result = build_air_quality_url(
            &self.endpoints.air_quality,
            coordinates.latitude,
            coordinates.longitude,
            None,
        )
        .and_then(|url| self.providers.fetch_air_quality(&url));

        match result {
            Ok(air_quality) => {
                self.session.apply(ticket, |state| {
                    state.air_quality = Some(air_quality);
                });
            }
            Err(error) => {
                tracing::warn!(%error, "air quality unavailable");
                self.session.apply(ticket, |state| {
                    state.warning = Some(format!("Air quality unavailable: {error}"));
                });
            }
        }
    }

    fn persist(&self, cache_key: &str, snapshot: &WeatherSnapshot) {
        if let Err(error) = self.cache.set(cache_key, snapshot) {
            tracing::warn!(cache_key, %error, "failed to cache weather");
        }
        if let Err(error) = self.cache.save_last_query(snapshot) {
            tracing::warn!(%error, "failed to save last query");
        }
    }
}
