pub mod cache;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod error;
pub mod geocoding;
pub mod history;
pub mod model;
pub mod providers;
pub mod session;
pub mod storage;
pub mod time_series;
pub mod urls;
pub mod weather_code;

#[cfg(test)]
mod test_support;
