use reqwest::Url;

use crate::model::TemperatureUnit;
use crate::providers::ProviderError;

pub const HOURLY_FIELDS: &str = "relative_humidity_2m";
pub const DAILY_FIELDS: &str = "temperature_2m_max,temperature_2m_min,weather_code";
pub const AIR_QUALITY_FIELDS: &str =
    "pm2_5,pm10,carbon_monoxide,nitrogen_dioxide,sulphur_dioxide,ozone,european_aqi";
const AIR_QUALITY_FORECAST_DAYS: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastParams {
    pub latitude: f64,
    pub longitude: f64,
    pub unit: TemperatureUnit,
    pub forecast_days: u8,
}

/// Forecast request URL. Coordinates are passed at full precision.
pub fn build_forecast_url(endpoint: &str, params: ForecastParams) -> Result<Url, ProviderError> {
    let mut url = parse_endpoint(endpoint)?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("latitude", &params.latitude.to_string())
            .append_pair("longitude", &params.longitude.to_string())
            .append_pair("current_weather", "true")
            .append_pair("hourly", HOURLY_FIELDS)
            .append_pair("daily", DAILY_FIELDS)
            .append_pair("forecast_days", &params.forecast_days.to_string())
            .append_pair("timezone", "auto");
        if params.unit.is_fahrenheit() {
            query
                .append_pair("temperature_unit", "fahrenheit")
                .append_pair("windspeed_unit", "mph");
        }
    }
    Ok(url)
}

/// Air-quality request URL. Coordinates are rounded to 4 decimal places so
/// that jittery device positions map to the same request.
pub fn build_air_quality_url(
    endpoint: &str,
    latitude: f64,
    longitude: f64,
    timezone: Option<&str>,
) -> Result<Url, ProviderError> {
    let mut url = parse_endpoint(endpoint)?;
    url.query_pairs_mut()
        .append_pair("latitude", &format!("{latitude:.4}"))
        .append_pair("longitude", &format!("{longitude:.4}"))
        .append_pair("forecast_days", &AIR_QUALITY_FORECAST_DAYS.to_string())
        .append_pair("hourly", AIR_QUALITY_FIELDS)
        .append_pair("timezone", timezone.unwrap_or("auto"));
    Ok(url)
}

pub fn build_geocoding_url(endpoint: &str, query: &str, count: u8) -> Result<Url, ProviderError> {
    let mut url = parse_endpoint(endpoint)?;
    url.query_pairs_mut()
        .append_pair("name", query)
        .append_pair("count", &count.to_string());
    Ok(url)
}

fn parse_endpoint(endpoint: &str) -> Result<Url, ProviderError> {
    Url::parse(endpoint)
        .map_err(|error| ProviderError::InvalidResponse(format!("endpoint {endpoint}: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        DEFAULT_AIR_QUALITY_ENDPOINT, DEFAULT_FORECAST_ENDPOINT, DEFAULT_GEOCODING_ENDPOINT,
    };

    fn params(unit: TemperatureUnit) -> ForecastParams {
        ForecastParams {
            latitude: 53.349805,
            longitude: -6.26031,
            unit,
            forecast_days: 5,
        }
    }

    fn query_value(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.into_owned())
    }

    #[test]
    fn forecast_url_has_fixed_query_shape() {
        let url = build_forecast_url(DEFAULT_FORECAST_ENDPOINT, params(TemperatureUnit::Celsius))
            .expect("url");

        assert_eq!(url.path(), "/v1/forecast");
        assert_eq!(query_value(&url, "current_weather").as_deref(), Some("true"));
        assert_eq!(query_value(&url, "hourly").as_deref(), Some(HOURLY_FIELDS));
        assert_eq!(query_value(&url, "daily").as_deref(), Some(DAILY_FIELDS));
        assert_eq!(query_value(&url, "forecast_days").as_deref(), Some("5"));
        assert_eq!(query_value(&url, "timezone").as_deref(), Some("auto"));
    }

    #[test]
    fn forecast_url_adds_unit_params_only_for_fahrenheit() {
        let celsius =
            build_forecast_url(DEFAULT_FORECAST_ENDPOINT, params(TemperatureUnit::Celsius))
                .expect("url");
        assert!(!celsius.as_str().contains("temperature_unit"));
        assert!(!celsius.as_str().contains("windspeed_unit"));

        let fahrenheit =
            build_forecast_url(DEFAULT_FORECAST_ENDPOINT, params(TemperatureUnit::Fahrenheit))
                .expect("url");
        assert!(
            fahrenheit
                .as_str()
                .ends_with("&temperature_unit=fahrenheit&windspeed_unit=mph")
        );
    }

    #[test]
    fn forecast_url_keeps_full_coordinate_precision() {
        let url = build_forecast_url(DEFAULT_FORECAST_ENDPOINT, params(TemperatureUnit::Celsius))
            .expect("url");

        assert_eq!(query_value(&url, "latitude").as_deref(), Some("53.349805"));
        assert_eq!(query_value(&url, "longitude").as_deref(), Some("-6.26031"));
    }

    #[test]
    fn air_quality_url_rounds_coordinates_to_four_places() {
        let url = build_air_quality_url(DEFAULT_AIR_QUALITY_ENDPOINT, 53.349805, -6.26031, None)
            .expect("url");

        assert_eq!(query_value(&url, "latitude").as_deref(), Some("53.3498"));
        assert_eq!(query_value(&url, "longitude").as_deref(), Some("-6.2603"));
        assert_eq!(query_value(&url, "forecast_days").as_deref(), Some("1"));
        assert_eq!(query_value(&url, "hourly").as_deref(), Some(AIR_QUALITY_FIELDS));
        assert_eq!(query_value(&url, "timezone").as_deref(), Some("auto"));
    }

    #[test]
    fn air_quality_url_is_stable_under_coordinate_jitter() {
        let first = build_air_quality_url(DEFAULT_AIR_QUALITY_ENDPOINT, 51.50000001, -0.1, None)
            .expect("url");
        let second =
            build_air_quality_url(DEFAULT_AIR_QUALITY_ENDPOINT, 51.49999999, -0.10000002, None)
                .expect("url");

        assert_eq!(first, second);
    }

    #[test]
    fn geocoding_url_percent_encodes_query() {
        let url = build_geocoding_url(DEFAULT_GEOCODING_ENDPOINT, "TestCity,TestLand", 1)
            .expect("url");

        assert_eq!(
            url.as_str(),
            "https://geocoding-api.open-meteo.com/v1/search?name=TestCity%2CTestLand&count=1"
        );
    }

    #[test]
    fn invalid_endpoint_is_reported() {
        let error = build_geocoding_url("not a url", "Dublin", 1).expect_err("must fail");
        assert!(matches!(error, ProviderError::InvalidResponse(message) if message.contains("not a url")));
    }
}
