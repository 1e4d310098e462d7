use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use thiserror::Error;

use crate::config::RetryPolicy;
use crate::model::AirQualitySnapshot;

pub mod open_meteo;

pub use open_meteo::{ForecastResponse, GeocodeResponse};

/// Outbound HTTP seam. Every call takes a URL built by [`crate::urls`].
pub trait ProviderApi {
    fn fetch_geocode(&self, url: &Url) -> Result<GeocodeResponse, ProviderError>;
    fn fetch_forecast(&self, url: &Url) -> Result<ForecastResponse, ProviderError>;
    fn fetch_air_quality(&self, url: &Url) -> Result<AirQualitySnapshot, ProviderError>;
}

impl<P: ProviderApi + ?Sized> ProviderApi for std::sync::Arc<P> {
    fn fetch_geocode(&self, url: &Url) -> Result<GeocodeResponse, ProviderError> {
        (**self).fetch_geocode(url)
    }

    fn fetch_forecast(&self, url: &Url) -> Result<ForecastResponse, ProviderError> {
        (**self).fetch_forecast(url)
    }

    fn fetch_air_quality(&self, url: &Url) -> Result<AirQualitySnapshot, ProviderError> {
        (**self).fetch_air_quality(url)
    }
}

#[derive(Debug, Clone)]
pub struct HttpProviders {
    client: Client,
    retry_policy: RetryPolicy,
}

impl HttpProviders {
    pub fn new(timeout: Duration, retry_policy: RetryPolicy) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nils-weather-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| ProviderError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            retry_policy,
        })
    }
}

impl ProviderApi for HttpProviders {
    /// Geocoding is never retried; the caller owns retry policy for searches.
    fn fetch_geocode(&self, url: &Url) -> Result<GeocodeResponse, ProviderError> {
        open_meteo::fetch_geocode(&self.client, url)
    }

    fn fetch_forecast(&self, url: &Url) -> Result<ForecastResponse, ProviderError> {
        open_meteo::fetch_forecast(&self.client, url, self.retry_policy)
    }

    fn fetch_air_quality(&self, url: &Url) -> Result<AirQualitySnapshot, ProviderError> {
        open_meteo::fetch_air_quality(&self.client, url, self.retry_policy)
    }
}

pub fn execute_with_retry<T, F, S>(
    provider_name: &'static str,
    policy: RetryPolicy,
    mut operation: F,
    mut sleep_fn: S,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Result<T, ProviderError>,
    S: FnMut(Duration),
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match operation() {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.retryable() || attempt == max_attempts {
                    return Err(error.with_provider(provider_name));
                }

                let delay = policy.backoff_for_attempt(attempt + 1);
                tracing::debug!(provider_name, attempt, delay_ms = delay, %error, "retrying");
                sleep_fn(Duration::from_millis(delay));
            }
        }
    }

    Err(ProviderError::InvalidResponse(format!(
        "{provider_name}: exhausted retry attempts"
    )))
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http error ({status}): {message}")]
    Http { status: u16, message: String },
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("location not found: {0}")]
    NotFound(String),
}

impl ProviderError {
    pub fn retryable(&self) -> bool {
        match self {
            ProviderError::Transport(_) => true,
            ProviderError::Http { status, .. } => *status == 429 || (500..=599).contains(status),
            ProviderError::InvalidResponse(_) => false,
            ProviderError::NotFound(_) => false,
        }
    }

    pub fn with_provider(self, provider: &'static str) -> Self {
        match self {
            ProviderError::Transport(message) => {
                ProviderError::Transport(format!("{provider}: {message}"))
            }
            ProviderError::Http { status, message } => ProviderError::Http {
                status,
                message: format!("{provider}: {message}"),
            },
            ProviderError::InvalidResponse(message) => {
                ProviderError::InvalidResponse(format!("{provider}: {message}"))
            }
            ProviderError::NotFound(message) => {
                ProviderError::NotFound(format!("{provider}: {message}"))
            }
        }
    }
}
