use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;

use crate::config::RetryPolicy;
use crate::model::{
    AirQualityReading, AirQualitySnapshot, CityLocation, ForecastDay, WeatherSnapshot,
};
use crate::time_series::{last_value_before, parse_timestamp};

use super::{ProviderError, execute_with_retry};

const PROVIDER_NAME: &str = "open_meteo";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeocodeResponse {
    #[serde(default)]
    pub results: Option<Vec<GeocodeResult>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeResult {
    pub name: String,
    #[serde(default)]
    pub admin1: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

impl GeocodeResponse {
    /// Matches in provider order; an absent `results` field is an empty list.
    pub fn into_locations(self) -> Vec<CityLocation> {
        self.results
            .unwrap_or_default()
            .into_iter()
            .map(|result| CityLocation {
                name: result.name,
                admin1: result.admin1.filter(|value| !value.trim().is_empty()),
                country: result.country.unwrap_or_default(),
                latitude: result.latitude,
                longitude: result.longitude,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastResponse {
    pub current_weather: Option<CurrentWeather>,
    pub hourly: Option<HourlyBlock>,
    pub daily: Option<DailyBlock>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentWeather {
    pub temperature: f64,
    pub windspeed: f64,
    pub weathercode: i32,
    pub time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HourlyBlock {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub relative_humidity_2m: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyBlock {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub temperature_2m_max: Vec<f64>,
    #[serde(default)]
    pub temperature_2m_min: Vec<f64>,
    #[serde(default)]
    pub weather_code: Vec<i32>,
}

#[derive(Debug, Deserialize)]
struct AirQualityResponse {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    elevation: Option<f64>,
    #[serde(default)]
    timezone: Option<String>,
    hourly: Option<AirQualityHourly>,
}

#[derive(Debug, Deserialize)]
struct AirQualityHourly {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    european_aqi: Vec<Option<f64>>,
    #[serde(default)]
    pm2_5: Vec<Option<f64>>,
    #[serde(default)]
    pm10: Vec<Option<f64>>,
    #[serde(default)]
    carbon_monoxide: Vec<Option<f64>>,
    #[serde(default)]
    nitrogen_dioxide: Vec<Option<f64>>,
    #[serde(default)]
    sulphur_dioxide: Vec<Option<f64>>,
    #[serde(default)]
    ozone: Vec<Option<f64>>,
}

pub fn fetch_geocode(client: &Client, url: &Url) -> Result<GeocodeResponse, ProviderError> {
    execute_request(client.get(url.clone()))
        .and_then(|body| parse_geocode_response(&body))
        .map_err(|error| error.with_provider(PROVIDER_NAME))
}

pub fn fetch_forecast(
    client: &Client,
    url: &Url,
    retry_policy: RetryPolicy,
) -> Result<ForecastResponse, ProviderError> {
    execute_with_retry(
        PROVIDER_NAME,
        retry_policy,
        || execute_request(client.get(url.clone())).and_then(|body| parse_forecast_response(&body)),
        std::thread::sleep,
    )
}

pub fn fetch_air_quality(
    client: &Client,
    url: &Url,
    retry_policy: RetryPolicy,
) -> Result<AirQualitySnapshot, ProviderError> {
    execute_with_retry(
        PROVIDER_NAME,
        retry_policy,
        || {
            execute_request(client.get(url.clone()))
                .and_then(|body| parse_air_quality_response(&body))
        },
        std::thread::sleep,
    )
}

fn execute_request(request: RequestBuilder) -> Result<String, ProviderError> {
    let response = request
        .send()
        .map_err(|error| ProviderError::Transport(error.to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .map_err(|error| ProviderError::Transport(error.to_string()))?;

    if status.is_success() {
        return Ok(body);
    }

    let message = extract_error_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });

    Err(ProviderError::Http {
        status: status.as_u16(),
        message,
    })
}

pub fn parse_geocode_response(body: &str) -> Result<GeocodeResponse, ProviderError> {
    serde_json::from_str(body)
        .map_err(|error| ProviderError::InvalidResponse(format!("geocode payload: {error}")))
}

pub fn parse_forecast_response(body: &str) -> Result<ForecastResponse, ProviderError> {
    serde_json::from_str(body)
        .map_err(|error| ProviderError::InvalidResponse(format!("forecast payload: {error}")))
}

pub fn parse_air_quality_response(body: &str) -> Result<AirQualitySnapshot, ProviderError> {
    let payload: AirQualityResponse = serde_json::from_str(body)
        .map_err(|error| ProviderError::InvalidResponse(format!("air quality payload: {error}")))?;

    let hourly = payload.hourly.ok_or_else(|| {
        ProviderError::InvalidResponse("air quality payload: missing hourly".to_string())
    })?;

    Ok(AirQualitySnapshot {
        latitude: payload.latitude,
        longitude: payload.longitude,
        elevation: payload.elevation.unwrap_or_default(),
        timezone: payload.timezone.unwrap_or_default(),
        readings: build_air_quality_readings(hourly)?,
    })
}

fn build_air_quality_readings(
    hourly: AirQualityHourly,
) -> Result<Vec<AirQualityReading>, ProviderError> {
    let length = hourly.time.len();
    let series = [
        &hourly.european_aqi,
        &hourly.pm2_5,
        &hourly.pm10,
        &hourly.carbon_monoxide,
        &hourly.nitrogen_dioxide,
        &hourly.sulphur_dioxide,
        &hourly.ozone,
    ];
    if series.iter().any(|values| values.len() != length) {
        return Err(ProviderError::InvalidResponse(
            "air quality payload: hourly arrays length mismatch".to_string(),
        ));
    }

    Ok(hourly
        .time
        .iter()
        .enumerate()
        .map(|(index, time)| AirQualityReading {
            time: time.clone(),
            european_aqi: hourly.european_aqi[index],
            pm2_5: hourly.pm2_5[index],
            pm10: hourly.pm10[index],
            carbon_monoxide: hourly.carbon_monoxide[index],
            nitrogen_dioxide: hourly.nitrogen_dioxide[index],
            sulphur_dioxide: hourly.sulphur_dioxide[index],
            ozone: hourly.ozone[index],
        })
        .collect())
}

/// Normalize a forecast payload into a snapshot labelled `label`.
///
/// Humidity is the hourly value aligned to `current_weather.time`, falling
/// back to the first hourly value when the current time precedes every
/// sample.
pub fn build_weather_snapshot(
    payload: ForecastResponse,
    label: &str,
) -> Result<WeatherSnapshot, ProviderError> {
    let current = payload.current_weather.ok_or_else(|| {
        ProviderError::InvalidResponse("forecast payload: missing current_weather".to_string())
    })?;
    let hourly = payload.hourly.ok_or_else(|| {
        ProviderError::InvalidResponse("forecast payload: missing hourly".to_string())
    })?;
    let daily = payload
        .daily
        .ok_or_else(|| ProviderError::InvalidResponse("forecast payload: missing daily".into()))?;

    let aligned = parse_timestamp(&current.time)
        .and_then(|reference| {
            last_value_before(&hourly.time, &hourly.relative_humidity_2m, reference)
        })
        .flatten();
    let humidity = aligned
        .or_else(|| hourly.relative_humidity_2m.first().copied().flatten())
        .ok_or_else(|| {
            ProviderError::InvalidResponse("forecast payload: missing relative humidity".into())
        })?;

    Ok(WeatherSnapshot {
        location: label.to_string(),
        temperature: current.temperature,
        windspeed: current.windspeed,
        weathercode: current.weathercode,
        humidity,
        current_time: current.time,
        forecast: build_forecast_days(daily)?,
    })
}

fn build_forecast_days(daily: DailyBlock) -> Result<Vec<ForecastDay>, ProviderError> {
    let length = daily.time.len();

    if daily.weather_code.len() != length
        || daily.temperature_2m_max.len() != length
        || daily.temperature_2m_min.len() != length
    {
        return Err(ProviderError::InvalidResponse(
            "forecast payload: daily arrays length mismatch".to_string(),
        ));
    }

    let mut days = Vec::with_capacity(length);
    for index in 0..length {
        let date = daily.time[index].trim().to_string();
        if date.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "forecast payload: empty date in daily.time".to_string(),
            ));
        }

        days.push(ForecastDay {
            date,
            min: daily.temperature_2m_min[index],
            max: daily.temperature_2m_max[index],
            code: daily.weather_code[index],
        });
    }

    Ok(days)
}

fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let from_json = serde_json::from_str::<Value>(trimmed)
        .ok()
        .and_then(|json| {
            for key in ["reason", "message", "error", "detail", "description"] {
                if let Some(value) = json.get(key).and_then(Value::as_str) {
                    let message = value.trim();
                    if !message.is_empty() {
                        return Some(message.to_string());
                    }
                }
            }
            None
        });

    from_json.or_else(|| Some(trimmed.to_string()))
}
