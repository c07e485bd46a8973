//! Runtime configuration
//!
//! Everything comes from environment variables (optionally via `.env`).
//! API keys are never compiled in.

use std::fmt;
use std::time::Duration;

pub const DEFAULT_AIR_QUALITY_URL: &str =
    "https://airquality.googleapis.com/v1/currentConditions:lookup";
pub const DEFAULT_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub air_quality_url: String,
    pub air_quality_api_key: Option<String>,
    pub weather_url: String,
    pub weather_api_key: Option<String>,
    /// Per-call upstream timeout
    pub fetch_timeout: Duration,
    /// Lifetime of cached live readings
    pub reading_cache_ttl: Duration,
    /// JSON snapshot for the repository; in-memory only when unset
    pub data_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            air_quality_url: DEFAULT_AIR_QUALITY_URL.to_string(),
            air_quality_api_key: None,
            weather_url: DEFAULT_WEATHER_URL.to_string(),
            weather_api_key: None,
            fetch_timeout: Duration::from_millis(5000),
            reading_cache_ttl: Duration::from_secs(300),
            data_file: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Self {
            port: get("PORT").and_then(|p| p.parse().ok()).unwrap_or(defaults.port),
            air_quality_url: get("AIR_QUALITY_BASE_URL").unwrap_or(defaults.air_quality_url),
            air_quality_api_key: get("AIR_QUALITY_API_KEY"),
            weather_url: get("WEATHER_BASE_URL").unwrap_or(defaults.weather_url),
            weather_api_key: get("WEATHER_API_KEY"),
            fetch_timeout: get("FETCH_TIMEOUT_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.fetch_timeout),
            reading_cache_ttl: get("READING_CACHE_TTL_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.reading_cache_ttl),
            data_file: get("DATA_FILE"),
        }
    }
}

fn redact(key: &Option<String>) -> &'static str {
    if key.is_some() { "<set>" } else { "<unset>" }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("air_quality_url", &self.air_quality_url)
            .field("air_quality_api_key", &redact(&self.air_quality_api_key))
            .field("weather_url", &self.weather_url)
            .field("weather_api_key", &redact(&self.weather_api_key))
            .field("fetch_timeout", &self.fetch_timeout)
            .field("reading_cache_ttl", &self.reading_cache_ttl)
            .field("data_file", &self.data_file)
            .finish()
    }
}
