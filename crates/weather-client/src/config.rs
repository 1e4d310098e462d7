use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const WEATHER_CACHE_DIR_ENV: &str = "WEATHER_CACHE_DIR";
pub const WEATHER_CACHE_TTL_SECS_ENV: &str = "WEATHER_CACHE_TTL_SECS";
pub const WEATHER_HTTP_TIMEOUT_SECS_ENV: &str = "WEATHER_HTTP_TIMEOUT_SECS";
pub const WEATHER_RETRY_MAX_ATTEMPTS_ENV: &str = "WEATHER_RETRY_MAX_ATTEMPTS";
pub const WEATHER_FORECAST_DAYS_ENV: &str = "WEATHER_FORECAST_DAYS";
pub const WEATHER_FORECAST_ENDPOINT_ENV: &str = "WEATHER_FORECAST_ENDPOINT";
pub const WEATHER_AIR_QUALITY_ENDPOINT_ENV: &str = "WEATHER_AIR_QUALITY_ENDPOINT";
pub const WEATHER_GEOCODING_ENDPOINT_ENV: &str = "WEATHER_GEOCODING_ENDPOINT";
const HOME_ENV: &str = "HOME";

pub const DEFAULT_FORECAST_ENDPOINT: &str = "https://api.open-meteo.com/v1/forecast";
pub const DEFAULT_AIR_QUALITY_ENDPOINT: &str =
    "https://air-quality-api.open-meteo.com/v1/air-quality";
pub const DEFAULT_GEOCODING_ENDPOINT: &str = "https://geocoding-api.open-meteo.com/v1/search";

pub const DEFAULT_FORECAST_DAYS: u8 = 5;
const MAX_FORECAST_DAYS: u8 = 16;

pub const PROVIDER_TIMEOUT_SECS: u64 = 10;
pub const PROVIDER_RETRY_MAX_ATTEMPTS: usize = 1;
pub const PROVIDER_RETRY_BASE_BACKOFF_MS: u64 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub forecast: String,
    pub air_quality: String,
    pub geocoding: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            forecast: DEFAULT_FORECAST_ENDPOINT.to_string(),
            air_quality: DEFAULT_AIR_QUALITY_ENDPOINT.to_string(),
            geocoding: DEFAULT_GEOCODING_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub cache_dir: PathBuf,
    /// `None` keeps cache entries until they are overwritten.
    pub cache_ttl: Option<Duration>,
    pub http_timeout: Duration,
    pub retry_policy: RetryPolicy,
    pub forecast_days: u8,
    pub endpoints: Endpoints,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_pairs(Vec::<(String, String)>::new())
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_pairs(std::env::vars())
    }

    pub(crate) fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            cache_dir: resolve_cache_dir(&map),
            cache_ttl: parse_positive::<u64>(&map, WEATHER_CACHE_TTL_SECS_ENV)
                .map(Duration::from_secs),
            http_timeout: Duration::from_secs(
                parse_positive(&map, WEATHER_HTTP_TIMEOUT_SECS_ENV)
                    .unwrap_or(PROVIDER_TIMEOUT_SECS),
            ),
            retry_policy: RetryPolicy {
                max_attempts: parse_positive(&map, WEATHER_RETRY_MAX_ATTEMPTS_ENV)
                    .unwrap_or(PROVIDER_RETRY_MAX_ATTEMPTS),
                ..RetryPolicy::default()
            },
            forecast_days: parse_positive(&map, WEATHER_FORECAST_DAYS_ENV)
                .map(|days: u8| days.min(MAX_FORECAST_DAYS))
                .unwrap_or(DEFAULT_FORECAST_DAYS),
            endpoints: Endpoints {
                forecast: non_empty(&map, WEATHER_FORECAST_ENDPOINT_ENV)
                    .unwrap_or_else(|| DEFAULT_FORECAST_ENDPOINT.to_string()),
                air_quality: non_empty(&map, WEATHER_AIR_QUALITY_ENDPOINT_ENV)
                    .unwrap_or_else(|| DEFAULT_AIR_QUALITY_ENDPOINT.to_string()),
                geocoding: non_empty(&map, WEATHER_GEOCODING_ENDPOINT_ENV)
                    .unwrap_or_else(|| DEFAULT_GEOCODING_ENDPOINT.to_string()),
            },
        }
    }
}

fn non_empty(env_map: &HashMap<String, String>, key: &str) -> Option<String> {
    env_map
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn parse_positive<T>(env_map: &HashMap<String, String>, key: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    non_empty(env_map, key)
        .and_then(|value| value.parse::<T>().ok())
        .filter(|value| *value > T::default())
}

fn resolve_cache_dir(env_map: &HashMap<String, String>) -> PathBuf {
    let home = env_map.get(HOME_ENV).map(String::as_str);
    non_empty(env_map, WEATHER_CACHE_DIR_ENV)
        .map(|value| expand_home_path(&value, home))
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("nils-weather-client"))
}

fn expand_home_path(raw: &str, home: Option<&str>) -> String {
    let trimmed = raw.trim();
    let Some(home) = home.map(str::trim).filter(|value| !value.is_empty()) else {
        return trimmed.to_string();
    };

    let home = home.trim_end_matches('/');
    let mut expanded = trimmed.replace("$HOME", home);

    if expanded == "~" {
        expanded = home.to_string();
    } else if let Some(rest) = expanded.strip_prefix("~/") {
        expanded = format!("{home}/{rest}");
    }

    expanded
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: PROVIDER_RETRY_MAX_ATTEMPTS,
            base_backoff_ms: PROVIDER_RETRY_BASE_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    pub const fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            base_backoff_ms: 0,
        }
    }

    pub fn backoff_for_attempt(self, attempt: usize) -> u64 {
        if attempt <= 1 {
            return 0;
        }

        let shift = (attempt - 2).min(8);
        self.base_backoff_ms.saturating_mul(1_u64 << shift)
    }
}
