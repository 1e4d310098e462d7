use crate::model::CityLocation;
use crate::providers::{ProviderApi, ProviderError};
use crate::urls::build_geocoding_url;

/// Matches requested when a search must settle on one place.
pub const SINGLE_MATCH_COUNT: u8 = 1;
/// Matches requested for autocomplete suggestions.
pub const SUGGESTION_COUNT: u8 = 6;

/// Turns free text into coordinates through the geocoding endpoint.
///
/// Neither call retries; a failed lookup is reported to the caller as is.
pub struct GeoResolver<'a, P> {
    providers: &'a P,
    endpoint: &'a str,
}

impl<'a, P: ProviderApi> GeoResolver<'a, P> {
    pub fn new(providers: &'a P, endpoint: &'a str) -> Self {
        Self {
            providers,
            endpoint,
        }
    }

    /// First match for `query`, or [`ProviderError::NotFound`] when the
    /// geocoder has none.
    pub fn resolve_one(&self, query: &str) -> Result<CityLocation, ProviderError> {
        let url = build_geocoding_url(self.endpoint, query, SINGLE_MATCH_COUNT)?;
        tracing::debug!(query, "resolving location");

        self.providers
            .fetch_geocode(&url)?
            .into_locations()
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NotFound(query.to_string()))
    }

    /// Up to six matches; no results is an empty list rather than an error.
    pub fn resolve_many(&self, query: &str) -> Result<Vec<CityLocation>, ProviderError> {
        let url = build_geocoding_url(self.endpoint, query, SUGGESTION_COUNT)?;
        Ok(self.providers.fetch_geocode(&url)?.into_locations())
    }
}
