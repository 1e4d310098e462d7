use std::cell::{Cell, RefCell};

use reqwest::Url;

use crate::device::{GeolocationError, Geolocator};
use crate::model::{AirQualitySnapshot, Coordinates};
use crate::providers::open_meteo::{GeocodeResult, parse_air_quality_response, parse_forecast_response};
use crate::providers::{ForecastResponse, GeocodeResponse, ProviderApi, ProviderError};

pub const FORECAST_FIXTURE: &str = r#"{
    "current_weather": {"temperature": 10.0, "windspeed": 5.0, "weathercode": 0, "time": "2025-07-10T10:00"},
    "hourly": {
        "time": ["2025-07-10T09:00", "2025-07-10T10:00", "2025-07-10T11:00"],
        "relative_humidity_2m": [50, 60, 70]
    },
    "daily": {
        "time": ["2025-07-10", "2025-07-11", "2025-07-12", "2025-07-13", "2025-07-14"],
        "temperature_2m_max": [15.0, 16.0, 17.0, 18.0, 19.0],
        "temperature_2m_min": [5.0, 6.0, 7.0, 8.0, 9.0],
        "weather_code": [0, 1, 61, 3, 95]
    }
}"#;

pub const AIR_QUALITY_FIXTURE: &str = r#"{
    "latitude": 51.5,
    "longitude": -0.1,
    "elevation": 12.0,
    "timezone": "Europe/London",
    "hourly": {
        "time": ["2025-07-10T00:00", "2025-07-10T01:00"],
        "european_aqi": [18, 24],
        "pm2_5": [3.0, 3.5],
        "pm10": [6.0, 6.5],
        "carbon_monoxide": [110.0, 115.0],
        "nitrogen_dioxide": [9.0, 9.5],
        "sulphur_dioxide": [0.8, 0.9],
        "ozone": [60.0, 61.0]
    }
}"#;

pub fn forecast_fixture() -> ForecastResponse {
    parse_forecast_response(FORECAST_FIXTURE).expect("forecast fixture")
}

pub fn air_quality_fixture() -> AirQualitySnapshot {
    parse_air_quality_response(AIR_QUALITY_FIXTURE).expect("air quality fixture")
}

pub fn geocode_fixture(
    matches: &[(&str, Option<&str>, &str)],
) -> Result<GeocodeResponse, ProviderError> {
    let results = matches
        .iter()
        .enumerate()
        .map(|(index, (name, admin1, country))| GeocodeResult {
            name: (*name).to_string(),
            admin1: admin1.map(str::to_string),
            country: Some((*country).to_string()),
            latitude: 50.0 + index as f64,
            longitude: 10.0 + index as f64,
        })
        .collect();

    Ok(GeocodeResponse {
        results: Some(results),
    })
}

pub struct FakeProviders {
    geocode_result: Result<GeocodeResponse, ProviderError>,
    forecast_result: Result<ForecastResponse, ProviderError>,
    air_quality_result: Result<AirQualitySnapshot, ProviderError>,
    geocode_urls: RefCell<Vec<String>>,
    forecast_urls: RefCell<Vec<String>>,
    air_quality_calls: Cell<usize>,
}

impl FakeProviders {
    pub fn new() -> Self {
        Self {
            geocode_result: geocode_fixture(&[("Berlin", Some("Land Berlin"), "Germany")]),
            forecast_result: Ok(forecast_fixture()),
            air_quality_result: Ok(air_quality_fixture()),
            geocode_urls: RefCell::new(Vec::new()),
            forecast_urls: RefCell::new(Vec::new()),
            air_quality_calls: Cell::new(0),
        }
    }

    pub fn with_geocode(mut self, result: Result<GeocodeResponse, ProviderError>) -> Self {
        self.geocode_result = result;
        self
    }

    pub fn with_forecast(mut self, result: Result<ForecastResponse, ProviderError>) -> Self {
        self.forecast_result = result;
        self
    }

    pub fn with_air_quality(mut self, result: Result<AirQualitySnapshot, ProviderError>) -> Self {
        self.air_quality_result = result;
        self
    }

    pub fn geocode_urls(&self) -> Vec<String> {
        self.geocode_urls.borrow().clone()
    }

    pub fn forecast_urls(&self) -> Vec<String> {
        self.forecast_urls.borrow().clone()
    }

    pub fn forecast_calls(&self) -> usize {
        self.forecast_urls.borrow().len()
    }

    pub fn air_quality_calls(&self) -> usize {
        self.air_quality_calls.get()
    }

    pub fn network_calls(&self) -> usize {
        self.geocode_urls.borrow().len() + self.forecast_calls() + self.air_quality_calls()
    }
}

impl ProviderApi for FakeProviders {
    fn fetch_geocode(&self, url: &Url) -> Result<GeocodeResponse, ProviderError> {
        self.geocode_urls.borrow_mut().push(url.to_string());
        self.geocode_result.clone()
    }

    fn fetch_forecast(&self, url: &Url) -> Result<ForecastResponse, ProviderError> {
        self.forecast_urls.borrow_mut().push(url.to_string());
        self.forecast_result.clone()
    }

    fn fetch_air_quality(&self, _url: &Url) -> Result<AirQualitySnapshot, ProviderError> {
        self.air_quality_calls.set(self.air_quality_calls.get() + 1);
        self.air_quality_result.clone()
    }
}

pub struct FakeGeolocator {
    result: Result<Coordinates, GeolocationError>,
    calls: Cell<usize>,
}

impl FakeGeolocator {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            result: Ok(Coordinates {
                latitude,
                longitude,
            }),
            calls: Cell::new(0),
        }
    }

    pub fn denied() -> Self {
        Self {
            result: Err(GeolocationError::PermissionDenied),
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Geolocator for FakeGeolocator {
    fn current_position(&self) -> Result<Coordinates, GeolocationError> {
        self.calls.set(self.calls.get() + 1);
        self.result.clone()
    }
}
