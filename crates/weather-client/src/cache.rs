use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::model::WeatherSnapshot;
use crate::storage::{KeyValueStore, StorageError};

pub const CACHE_PREFIX: &str = "weather_cache";
pub const LAST_QUERY_KEY: &str = "last_query";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// Epoch milliseconds of the write.
    pub timestamp: i64,
    pub data: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
    pub age_secs: u64,
    pub is_fresh: bool,
}

pub fn city_cache_key(label: &str) -> String {
    format!("city:{}", label.to_lowercase())
}

pub fn coords_cache_key(latitude: f64, longitude: f64) -> String {
    format!("coords:{latitude:.4},{longitude:.4}")
}

pub fn evaluate_freshness(timestamp_ms: i64, now: DateTime<Utc>, ttl: Option<Duration>) -> Freshness {
    let age_ms = now.timestamp_millis().saturating_sub(timestamp_ms).max(0);
    let age_ms = u64::try_from(age_ms).unwrap_or(0);

    Freshness {
        age_secs: age_ms / 1_000,
        is_fresh: ttl.is_none_or(|ttl| u128::from(age_ms) <= ttl.as_millis()),
    }
}

/// Timestamped JSON entries in a [`KeyValueStore`], namespaced under
/// [`CACHE_PREFIX`].
///
/// With `ttl = None` entries live until overwritten. With a TTL an expired
/// entry reads as a miss and is removed at that point.
pub struct CacheStore<S> {
    store: S,
    ttl: Option<Duration>,
    now_fn: fn() -> DateTime<Utc>,
}

impl<S: KeyValueStore> CacheStore<S> {
    pub fn new(store: S, ttl: Option<Duration>) -> Self {
        Self {
            store,
            ttl,
            now_fn: Utc::now,
        }
    }

    pub fn with_clock(mut self, now_fn: fn() -> DateTime<Utc>) -> Self {
        self.now_fn = now_fn;
        self
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Cached data for `key`. A missing, unreadable, corrupt, or expired entry
    /// is a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let namespaced = namespaced(key);
        let raw = match self.store.get(&namespaced) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(key, "cache miss");
                return None;
            }
            Err(error) => {
                tracing::debug!(key, %error, "cache read failed; treating as miss");
                return None;
            }
        };

        let entry = match serde_json::from_str::<CacheEntry<T>>(&raw) {
            Ok(entry) => entry,
            Err(error) => {
                tracing::debug!(key, %error, "corrupt cache entry; treating as miss");
                return None;
            }
        };

        let freshness = evaluate_freshness(entry.timestamp, (self.now_fn)(), self.ttl);
        if !freshness.is_fresh {
            tracing::debug!(key, age_secs = freshness.age_secs, "cache entry expired");
            if let Err(error) = self.store.remove(&namespaced) {
                tracing::debug!(key, %error, "failed to drop expired cache entry");
            }
            return None;
        }

        tracing::debug!(key, age_secs = freshness.age_secs, "cache hit");
        Some(entry.data)
    }

    pub fn set<T: Serialize>(&self, key: &str, data: &T) -> Result<(), StorageError> {
        let entry = CacheEntry {
            timestamp: (self.now_fn)().timestamp_millis(),
            data,
        };
        let payload = serde_json::to_string(&entry).map_err(|error| StorageError::Write {
            path: namespaced(key).into(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, error),
        })?;
        self.store.set(&namespaced(key), &payload)
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.store.remove(&namespaced(key))
    }

    pub fn save_last_query(&self, snapshot: &WeatherSnapshot) -> Result<(), StorageError> {
        self.set(LAST_QUERY_KEY, snapshot)
    }

    pub fn get_last_query(&self) -> Option<WeatherSnapshot> {
        self.get(LAST_QUERY_KEY)
    }
}

fn namespaced(key: &str) -> String {
    format!("{CACHE_PREFIX}{key}")
}
