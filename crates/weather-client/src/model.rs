use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time_series::{last_value_before, parse_timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn from_fahrenheit_flag(use_fahrenheit: bool) -> Self {
        if use_fahrenheit {
            Self::Fahrenheit
        } else {
            Self::Celsius
        }
    }

    pub fn is_fahrenheit(self) -> bool {
        matches!(self, Self::Fahrenheit)
    }

    pub fn temperature_symbol(self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
        }
    }

    pub fn windspeed_symbol(self) -> &'static str {
        match self {
            Self::Celsius => "km/h",
            Self::Fahrenheit => "mph",
        }
    }
}

/// What drove the most recent fetch; replayed on unit toggle and refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchSource {
    City,
    Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityLocation {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin1: Option<String>,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl CityLocation {
    pub fn label(&self) -> String {
        format_location(&self.name, self.admin1.as_deref(), &self.country)
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Display label, e.g. "Dublin, Leinster, Ireland" or "Berlin, Germany".
pub fn format_location(name: &str, admin1: Option<&str>, country: &str) -> String {
    match admin1.filter(|value| !value.is_empty()) {
        Some(admin1) => format!("{name}, {admin1}, {country}"),
        None => format!("{name}, {country}"),
    }
}

/// Reduce a stored history label to a "name, country" geocoder query.
///
/// Lossy: any middle segment (the admin1 region) is dropped, because the
/// geocoder rejects three-part queries. Two places sharing a name inside one
/// country can therefore resolve to the other one.
///
/// - `"Dublin, Leinster, Ireland"` -> `"Dublin, Ireland"`
/// - `"Berlin, Germany"` -> `"Berlin, Germany"`
/// - `"Paris"` -> `"Paris"`
/// - `" , "` -> `None`
///
/// A single segment is sent on its own instead of being paired with itself
/// (`"Paris, Paris"`), which would ask the geocoder for a country of the same
/// name.
pub fn history_geocode_query(label: &str) -> Option<String> {
    let parts: Vec<&str> = label
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    match parts.as_slice() {
        [] => None,
        [only] => Some((*only).to_string()),
        [first, .., last] => Some(format!("{first}, {last}")),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    pub date: String,
    pub min: f64,
    pub max: f64,
    pub code: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub location: String,
    pub temperature: f64,
    pub windspeed: f64,
    pub weathercode: i32,
    pub humidity: f64,
    #[serde(rename = "currentTime")]
    pub current_time: String,
    pub forecast: Vec<ForecastDay>,
}

/// One hour of air-quality data; pollutant values are `None` where the
/// provider reported null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirQualityReading {
    pub time: String,
    pub european_aqi: Option<f64>,
    pub pm2_5: Option<f64>,
    pub pm10: Option<f64>,
    pub carbon_monoxide: Option<f64>,
    pub nitrogen_dioxide: Option<f64>,
    pub sulphur_dioxide: Option<f64>,
    pub ozone: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirQualitySnapshot {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
    pub timezone: String,
    pub readings: Vec<AirQualityReading>,
}

impl AirQualitySnapshot {
    pub fn latest(&self) -> Option<&AirQualityReading> {
        self.readings.last()
    }

    /// Reading for the last hour at or before `reference`.
    pub fn reading_at(&self, reference: NaiveDateTime) -> Option<&AirQualityReading> {
        let times: Vec<&str> = self
            .readings
            .iter()
            .map(|reading| reading.time.as_str())
            .collect();
        let indexes: Vec<usize> = (0..self.readings.len()).collect();
        last_value_before(&times, &indexes, reference).and_then(|index| self.readings.get(index))
    }

    pub fn reading_at_str(&self, reference: &str) -> Option<&AirQualityReading> {
        parse_timestamp(reference).and_then(|reference| self.reading_at(reference))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitive,
    Unhealthy,
}

impl AqiCategory {
    pub fn from_index(aqi: f64) -> Self {
        if aqi <= 50.0 {
            Self::Good
        } else if aqi <= 100.0 {
            Self::Moderate
        } else if aqi <= 150.0 {
            Self::UnhealthyForSensitive
        } else {
            Self::Unhealthy
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Moderate => "Moderate",
            Self::UnhealthyForSensitive => "Unhealthy for Sensitive Groups",
            Self::Unhealthy => "Unhealthy",
        }
    }
}

pub fn validate_coordinates(lat: f64, lon: f64) -> Result<(), ValidationError> {
    if !((-90.0)..=90.0).contains(&lat) {
        return Err(ValidationError::InvalidLatitude(lat));
    }
    if !((-180.0)..=180.0).contains(&lon) {
        return Err(ValidationError::InvalidLongitude(lon));
    }
    Ok(())
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("partial coordinates: provide both --lat and --lon")]
    PartialCoordinates,
    #[error("invalid latitude: {0}")]
    InvalidLatitude(f64),
    #[error("invalid longitude: {0}")]
    InvalidLongitude(f64),
}
