//! Fetcher
//!
//! The pipeline's failure boundary. Calls the upstream air-quality provider,
//! normalizes the payload, and substitutes a degraded fallback reading when
//! anything goes wrong.

use async_trait::async_trait;
use chrono::Utc;
use moka::future::Cache;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AdvisorError;
use crate::normalizer::{normalize, RawProviderPayload};
use crate::types::{AirQualityReading, Coordinates, IndexScheme, IndexValue, PollutantConcentrations};

/// Source of raw current-conditions payloads
#[async_trait]
pub trait AirQualityProvider: Send + Sync {
    async fn current_conditions(&self, coords: Coordinates) -> Result<RawProviderPayload, AdvisorError>;
}

// ============================================================================
// HTTP provider
// ============================================================================

/// Client for a `currentConditions:lookup`-style endpoint.
pub struct HttpAirQualityProvider {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpAirQualityProvider {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl AirQualityProvider for HttpAirQualityProvider {
    async fn current_conditions(&self, coords: Coordinates) -> Result<RawProviderPayload, AdvisorError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AdvisorError::UpstreamUnavailable("air quality API key not configured".to_string()))?;

        let body = json!({
            "location": { "latitude": coords.lat, "longitude": coords.lon },
            "universalAqi": true,
            "extraComputations": [
                "LOCAL_AQI",
                "POLLUTANT_CONCENTRATION",
                "DOMINANT_POLLUTANT_CONCENTRATION"
            ],
        });

        tracing::debug!("Requesting air quality for ({}, {})", coords.lat, coords.lon);

        let response = self
            .client
            .post(&self.url)
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| AdvisorError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdvisorError::UpstreamUnavailable(format!("provider returned {}", status)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| AdvisorError::UpstreamUnavailable(e.to_string()))?;

        RawProviderPayload::from_json(&text)
    }
}

// ============================================================================
// Fetcher
// ============================================================================

/// Placeholder reading served when no live data is available.
///
/// Carries no pollutant concentrations and is always flagged `degraded`.
pub fn fallback_reading() -> AirQualityReading {
    AirQualityReading {
        index: IndexValue::new(IndexScheme::RegionalEpa, 45),
        category: "Good air quality".to_string(),
        dominant_pollutant: Some("pm25".to_string()),
        pollutants: PollutantConcentrations::new(),
        observed_at: Utc::now(),
        region_code: Some("us".to_string()),
        degraded: true,
    }
}

fn cache_key(coords: Coordinates) -> String {
    format!("{:.3}:{:.3}", coords.lat, coords.lon)
}

#[derive(Clone)]
pub struct Fetcher {
    provider: Arc<dyn AirQualityProvider>,
    timeout: Duration,
    cache: Option<Cache<String, AirQualityReading>>,
}

impl Fetcher {
    pub fn new(provider: Arc<dyn AirQualityProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            timeout,
            cache: None,
        }
    }

    /// Cache live readings per ~100m cell for `ttl`
    pub fn with_cache(mut self, ttl: Duration) -> Self {
        self.cache = Some(
            Cache::builder()
                .max_capacity(10_000)
                .time_to_live(ttl)
                .build(),
        );
        self
    }

    /// Fetch and normalize, surfacing the failure instead of substituting.
    pub async fn try_fetch(&self, coords: Coordinates) -> Result<AirQualityReading, AdvisorError> {
        let key = cache_key(coords);
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key).await {
                tracing::debug!("Cache hit for reading {}", key);
                return Ok(hit);
            }
        }

        let payload = tokio::time::timeout(self.timeout, self.provider.current_conditions(coords))
            .await
            .map_err(|_| AdvisorError::UpstreamUnavailable(format!("timed out after {:?}", self.timeout)))??;

        let reading = normalize(&payload)?;

        if let Some(cache) = &self.cache {
            cache.insert(key, reading.clone()).await;
        }
        Ok(reading)
    }

    /// Fetch a reading, falling back to the degraded placeholder on any failure.
    pub async fn fetch(&self, coords: Coordinates) -> AirQualityReading {
        match self.try_fetch(coords).await {
            Ok(reading) => reading,
            Err(e) => {
                tracing::warn!(
                    "Serving fallback reading for ({}, {}): {}",
                    coords.lat, coords.lon, e
                );
                fallback_reading()
            }
        }
    }

    /// Fetch several coordinates concurrently, one task each.
    ///
    /// The output has one reading per input, in input order. A failed or
    /// panicked task yields a fallback for that coordinate only.
    pub async fn fetch_many(&self, coords: &[Coordinates]) -> Vec<AirQualityReading> {
        let handles: Vec<_> = coords
            .iter()
            .map(|&c| {
                let fetcher = self.clone();
                tokio::spawn(async move { fetcher.fetch(c).await })
            })
            .collect();

        futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| {
                joined.unwrap_or_else(|e| {
                    tracing::warn!("Fetch task failed: {}", e);
                    fallback_reading()
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticProvider {
        body: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AirQualityProvider for StaticProvider {
        async fn current_conditions(&self, _coords: Coordinates) -> Result<RawProviderPayload, AdvisorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            RawProviderPayload::from_json(self.body)
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl AirQualityProvider for SlowProvider {
        async fn current_conditions(&self, _coords: Coordinates) -> Result<RawProviderPayload, AdvisorError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(RawProviderPayload::default())
        }
    }

    fn provider(body: &'static str) -> Arc<StaticProvider> {
        Arc::new(StaticProvider {
            body,
            calls: AtomicUsize::new(0),
        })
    }

    const LIVE: &str = r#"{"indexes": [{"code": "usa_epa", "aqi": 72, "category": "Moderate"}]}"#;

    #[tokio::test]
    async fn test_live_reading_not_degraded() {
        let fetcher = Fetcher::new(provider(LIVE), Duration::from_secs(1));
        let reading = fetcher.fetch(Coordinates::new(29.76, -95.37)).await;
        assert_eq!(reading.aqi(), 72);
        assert!(!reading.degraded);
    }

    #[tokio::test]
    async fn test_missing_index_yields_degraded_fallback() {
        let fetcher = Fetcher::new(provider(r#"{"indexes": []}"#), Duration::from_secs(1));
        let coords = Coordinates::new(29.76, -95.37);

        assert!(matches!(
            fetcher.try_fetch(coords).await,
            Err(AdvisorError::MissingIndexData)
        ));
        let reading = fetcher.fetch(coords).await;
        assert!(reading.degraded);
        assert!(reading.pollutants.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_yields_degraded_fallback() {
        let fetcher = Fetcher::new(Arc::new(SlowProvider), Duration::from_millis(20));
        let coords = Coordinates::new(0.0, 0.0);

        let err = fetcher.try_fetch(coords).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(fetcher.fetch(coords).await.degraded);
    }

    #[tokio::test]
    async fn test_cache_reuses_live_readings() {
        let source = provider(LIVE);
        let fetcher = Fetcher::new(source.clone(), Duration::from_secs(1)).with_cache(Duration::from_secs(60));

        fetcher.fetch(Coordinates::new(29.76041, -95.36981)).await;
        fetcher.fetch(Coordinates::new(29.76039, -95.36979)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fallbacks_are_not_cached() {
        let source = provider("not json");
        let fetcher = Fetcher::new(source.clone(), Duration::from_secs(1)).with_cache(Duration::from_secs(60));

        let coords = Coordinates::new(10.0, 10.0);
        fetcher.fetch(coords).await;
        fetcher.fetch(coords).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    /// Serve `router` on an ephemeral local port and return its base URL
    async fn serve(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn stub_upstream() -> axum::Router {
        use axum::{extract::Query, http::StatusCode, routing::post, Json};
        use std::collections::HashMap;

        axum::Router::new()
            .route(
                "/down",
                post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "overloaded".to_string()) }),
            )
            .route(
                "/lookup",
                post(
                    |Query(query): Query<HashMap<String, String>>, Json(body): Json<serde_json::Value>| async move {
                        // Only answer requests shaped like a currentConditions lookup
                        let shaped = query.get("key").map(String::as_str) == Some("test-key")
                            && body["location"]["latitude"] == 29.76
                            && body["location"]["longitude"] == -95.37
                            && body["extraComputations"].is_array();
                        if shaped {
                            (StatusCode::OK, LIVE.to_string())
                        } else {
                            (StatusCode::BAD_REQUEST, "unexpected request".to_string())
                        }
                    },
                ),
            )
    }

    #[tokio::test]
    async fn test_http_provider_non_success_status_is_unavailable() {
        let base = serve(stub_upstream()).await;
        let coords = Coordinates::new(29.76, -95.37);
        let down = HttpAirQualityProvider::new(format!("{}/down", base), Some("test-key".to_string()), Duration::from_secs(2));

        let err = down.current_conditions(coords).await.unwrap_err();
        assert!(matches!(err, AdvisorError::UpstreamUnavailable(ref msg) if msg.contains("503")));

        let reading = Fetcher::new(Arc::new(down), Duration::from_secs(2)).fetch(coords).await;
        assert!(reading.degraded);
    }

    #[tokio::test]
    async fn test_http_provider_success_is_normalized() {
        let base = serve(stub_upstream()).await;
        let coords = Coordinates::new(29.76, -95.37);
        let live = HttpAirQualityProvider::new(format!("{}/lookup", base), Some("test-key".to_string()), Duration::from_secs(2));
        let fetcher = Fetcher::new(Arc::new(live), Duration::from_secs(2));

        let reading = fetcher.try_fetch(coords).await.unwrap();
        assert_eq!(reading.aqi(), 72);
        assert_eq!(reading.scheme(), IndexScheme::RegionalEpa);
        assert_eq!(reading.category, "Moderate");
        assert!(!reading.degraded);
    }

    #[tokio::test]
    async fn test_http_provider_without_key_is_unavailable() {
        let http = HttpAirQualityProvider::new("http://127.0.0.1:9/lookup", None, Duration::from_millis(100));
        let err = http.current_conditions(Coordinates::new(0.0, 0.0)).await.unwrap_err();
        assert!(matches!(err, AdvisorError::UpstreamUnavailable(_)));
    }
}
