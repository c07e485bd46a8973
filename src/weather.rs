//! Weather proxy
//!
//! Current conditions from an OpenWeatherMap-style endpoint, reshaped into a
//! small summary. Same failure policy as the air-quality fetcher: any failure
//! becomes a placeholder summary flagged `degraded`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::AdvisorError;
use crate::normalizer::sentence_case;
use crate::types::Coordinates;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSummary {
    /// Degrees Fahrenheit, rounded
    pub temperature: i32,
    /// Relative humidity, percent
    pub humidity: i32,
    /// Miles per hour, rounded
    pub wind_speed: i32,
    pub conditions: String,
    #[serde(default)]
    pub degraded: bool,
}

// Raw upstream shape
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawWeatherPayload {
    pub main: Option<RawMain>,
    pub wind: Option<RawWind>,
    #[serde(default)]
    pub weather: Vec<RawCondition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMain {
    pub temp: Option<f64>,
    pub humidity: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawWind {
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCondition {
    pub description: Option<String>,
}

pub fn fallback_weather() -> WeatherSummary {
    WeatherSummary {
        temperature: 78,
        humidity: 65,
        wind_speed: 8,
        conditions: "Partly cloudy".to_string(),
        degraded: true,
    }
}

/// Reshape a raw payload. Temperature is required; the rest default sensibly.
pub fn normalize_weather(raw: &RawWeatherPayload) -> Result<WeatherSummary, AdvisorError> {
    let main = raw
        .main
        .as_ref()
        .ok_or_else(|| AdvisorError::UpstreamUnavailable("weather payload missing main block".to_string()))?;
    let temp = main
        .temp
        .filter(|t| t.is_finite())
        .ok_or_else(|| AdvisorError::UpstreamUnavailable("weather payload missing temperature".to_string()))?;

    let conditions = raw
        .weather
        .first()
        .and_then(|w| w.description.as_deref())
        .map(sentence_case)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());

    Ok(WeatherSummary {
        temperature: temp.round() as i32,
        humidity: main.humidity.filter(|h| h.is_finite()).map(|h| h.round() as i32).unwrap_or(0),
        wind_speed: raw
            .wind
            .as_ref()
            .and_then(|w| w.speed)
            .filter(|s| s.is_finite())
            .map(|s| s.round() as i32)
            .unwrap_or(0),
        conditions,
        degraded: false,
    })
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current_weather(&self, coords: Coordinates) -> Result<RawWeatherPayload, AdvisorError>;
}

pub struct HttpWeatherProvider {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpWeatherProvider {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            url: url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl WeatherProvider for HttpWeatherProvider {
    async fn current_weather(&self, coords: Coordinates) -> Result<RawWeatherPayload, AdvisorError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AdvisorError::UpstreamUnavailable("weather API key not configured".to_string()))?;

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("lat", coords.lat.to_string()),
                ("lon", coords.lon.to_string()),
                ("appid", key.to_string()),
                ("units", "imperial".to_string()),
            ])
            .send()
            .await
            .map_err(|e| AdvisorError::UpstreamUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| AdvisorError::UpstreamUnavailable(e.to_string()))?;

        response
            .json::<RawWeatherPayload>()
            .await
            .map_err(|e| AdvisorError::UpstreamUnavailable(format!("malformed weather payload: {}", e)))
    }
}

#[derive(Clone)]
pub struct WeatherFetcher {
    provider: Arc<dyn WeatherProvider>,
    timeout: Duration,
}

impl WeatherFetcher {
    pub fn new(provider: Arc<dyn WeatherProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub async fn fetch(&self, coords: Coordinates) -> WeatherSummary {
        let result = match tokio::time::timeout(self.timeout, self.provider.current_weather(coords)).await {
            Ok(Ok(raw)) => normalize_weather(&raw),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AdvisorError::UpstreamUnavailable("weather request timed out".to_string())),
        };

        result.unwrap_or_else(|e| {
            tracing::warn!("Serving fallback weather for ({}, {}): {}", coords.lat, coords.lon, e);
            fallback_weather()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: &str) -> RawWeatherPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_normalize_rounds_and_capitalizes() {
        let summary = normalize_weather(&raw(
            r#"{"main": {"temp": 77.6, "humidity": 64}, "wind": {"speed": 7.4},
                "weather": [{"description": "scattered clouds"}]}"#,
        ))
        .unwrap();

        assert_eq!(summary.temperature, 78);
        assert_eq!(summary.humidity, 64);
        assert_eq!(summary.wind_speed, 7);
        assert_eq!(summary.conditions, "Scattered clouds");
        assert!(!summary.degraded);
    }

    #[test]
    fn test_missing_temperature_is_failure() {
        assert!(normalize_weather(&raw(r#"{"weather": []}"#)).is_err());
        assert!(normalize_weather(&raw(r#"{"main": {"humidity": 40}}"#)).is_err());
    }

    async fn serve(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn stub_upstream() -> axum::Router {
        use axum::{extract::Query, http::StatusCode, routing::get};
        use std::collections::HashMap;

        axum::Router::new()
            .route(
                "/down",
                get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "overloaded".to_string()) }),
            )
            .route(
                "/current",
                get(|Query(query): Query<HashMap<String, String>>| async move {
                    let shaped = query.get("appid").map(String::as_str) == Some("test-key")
                        && query.get("units").map(String::as_str) == Some("imperial")
                        && query.get("lat").map(String::as_str) == Some("29.76")
                        && query.get("lon").map(String::as_str) == Some("-95.37");
                    if shaped {
                        (
                            StatusCode::OK,
                            r#"{"main": {"temp": 83.2, "humidity": 58}, "wind": {"speed": 9.5},
                                "weather": [{"description": "few clouds"}]}"#
                                .to_string(),
                        )
                    } else {
                        (StatusCode::BAD_REQUEST, "unexpected request".to_string())
                    }
                }),
            )
    }

    #[tokio::test]
    async fn test_http_provider_against_local_upstream() {
        let base = serve(stub_upstream()).await;
        let coords = Coordinates::new(29.76, -95.37);
        let key = Some("test-key".to_string());

        let down = HttpWeatherProvider::new(format!("{}/down", base), key.clone(), Duration::from_secs(2));
        let err = down.current_weather(coords).await.unwrap_err();
        assert!(matches!(err, AdvisorError::UpstreamUnavailable(ref msg) if msg.contains("503")));
        let summary = WeatherFetcher::new(Arc::new(down), Duration::from_secs(2)).fetch(coords).await;
        assert_eq!(summary, fallback_weather());

        let live = HttpWeatherProvider::new(format!("{}/current", base), key, Duration::from_secs(2));
        let summary = WeatherFetcher::new(Arc::new(live), Duration::from_secs(2)).fetch(coords).await;
        assert_eq!(
            summary,
            WeatherSummary {
                temperature: 83,
                humidity: 58,
                wind_speed: 10,
                conditions: "Few clouds".to_string(),
                degraded: false,
            }
        );
    }

    struct FailingProvider;

    #[async_trait]
    impl WeatherProvider for FailingProvider {
        async fn current_weather(&self, _coords: Coordinates) -> Result<RawWeatherPayload, AdvisorError> {
            Err(AdvisorError::UpstreamUnavailable("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failure_serves_degraded_fallback() {
        let fetcher = WeatherFetcher::new(Arc::new(FailingProvider), Duration::from_secs(1));
        let summary = fetcher.fetch(Coordinates::new(29.76, -95.37)).await;
        assert_eq!(summary, fallback_weather());
        assert!(summary.degraded);
    }
}
