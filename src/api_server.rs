// Axum API server
//
// Purpose: JSON endpoints for readings, assessments, profiles, places,
// weather, health logs and suggestions. Callers identify themselves with the
// X-User-Id header (the email they registered with).

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, patch, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::assessment::assess_places;
use crate::classifier::{classify, describe_epa_aqi};
use crate::config::Config;
use crate::error::AdvisorError;
use crate::fetcher::{Fetcher, HttpAirQualityProvider};
use crate::profile::ProfileUpdate;
use crate::repository::{MemoryRepository, Repository};
use crate::suggestions::{rule_based_suggestions, suggest, HealthContext, SuggestionSource};
use crate::types::{AirQualityReading, Coordinates, HealthLogEntry, IndexScheme};
use crate::weather::{HttpWeatherProvider, WeatherFetcher};

// ============================================================================
// Application State
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn Repository>,
    pub fetcher: Fetcher,
    pub weather: WeatherFetcher,
    /// External text generator; rule-based advice when absent
    pub suggestions: Option<Arc<dyn SuggestionSource>>,
}

impl AppState {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        tracing::info!("Initializing repository...");
        let repository: Arc<dyn Repository> = match &config.data_file {
            Some(path) => Arc::new(MemoryRepository::persistent(path).await?),
            None => {
                tracing::warn!("DATA_FILE not set, accounts will not survive a restart");
                Arc::new(MemoryRepository::new())
            }
        };

        if config.air_quality_api_key.is_none() {
            tracing::warn!("AIR_QUALITY_API_KEY not set, all readings will be degraded fallbacks");
        }
        if config.weather_api_key.is_none() {
            tracing::warn!("WEATHER_API_KEY not set, weather will be a degraded fallback");
        }

        tracing::info!("Initializing upstream clients (timeout {:?})...", config.fetch_timeout);
        let air_quality = HttpAirQualityProvider::new(
            &config.air_quality_url,
            config.air_quality_api_key.clone(),
            config.fetch_timeout,
        );
        let fetcher = Fetcher::new(Arc::new(air_quality), config.fetch_timeout)
            .with_cache(config.reading_cache_ttl);

        let weather_provider = HttpWeatherProvider::new(
            &config.weather_url,
            config.weather_api_key.clone(),
            config.fetch_timeout,
        );
        let weather = WeatherFetcher::new(Arc::new(weather_provider), config.fetch_timeout);

        Ok(Self {
            repository,
            fetcher,
            weather,
            suggestions: None,
        })
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))

        // Accounts
        .route("/register", post(register))

        // Air quality (no account needed for the raw reading)
        .route("/airQuality", get(get_air_quality))
        .route("/assessment", get(get_assessment))
        .route("/weather", get(get_weather))

        // Profile
        .route("/profile", get(get_profile).post(update_profile))

        // Places
        .route("/places", get(list_places).post(add_place))
        .route("/places/assessments", get(assess_saved_places))
        .route("/places/:id", patch(rename_place).delete(delete_place))

        // Health logs and suggestions
        .route("/healthLogs", get(list_health_logs).post(add_health_log))
        .route("/suggestions", post(get_suggestions))

        // Middleware (applied in reverse order)
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Request types
// ============================================================================

/// Caller identity from the `X-User-Id` header
pub struct UserId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_ascii_lowercase()))
            .ok_or_else(|| AppError::Unauthorized("missing X-User-Id header".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct CoordinateQuery {
    lat: f64,
    lon: f64,
}

impl CoordinateQuery {
    fn coordinates(&self) -> Result<Coordinates, AppError> {
        let coords = Coordinates::new(self.lat, self.lon);
        coords.validate()?;
        Ok(coords)
    }
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    name: Option<String>,
    email: Option<String>,
}

// Body fields are optional at the serde level so a missing one is reported
// through AppError instead of axum's plain-text rejection.

#[derive(Debug, Deserialize)]
struct NewPlaceRequest {
    name: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RenamePlaceRequest {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewHealthLogRequest {
    symptom: Option<String>,
    #[serde(default)]
    exposure: String,
}

#[derive(Debug, Deserialize)]
struct SuggestionRequest {
    lat: Option<f64>,
    lon: Option<f64>,
    location: Option<String>,
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::BadRequest(format!("{} is required", field)))
}

fn required_coordinates(lat: Option<f64>, lon: Option<f64>) -> Result<Coordinates, AppError> {
    let coords = Coordinates::new(required(lat, "lat")?, required(lon, "lon")?);
    coords.validate()?;
    Ok(coords)
}

/// Reading as JSON, with the EPA band description added for EPA-scheme readings
fn reading_json(reading: &AirQualityReading) -> Result<serde_json::Value, AppError> {
    let mut value = serde_json::to_value(reading).map_err(internal)?;
    if reading.scheme() == IndexScheme::RegionalEpa {
        if let Some(obj) = value.as_object_mut() {
            obj.insert("aqiDescription".to_string(), describe_epa_aqi(reading.aqi()).into());
        }
    }
    Ok(value)
}

// ============================================================================
// Endpoint Handlers
// ============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = payload
        .email
        .map(|e| e.trim().to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::BadRequest("email is required".to_string()))?;
    let name = payload.name.unwrap_or_default();

    let profile = state.repository.create_account(&email, &name).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "User created successfully",
            "userId": email,
            "profile": profile,
        })),
    ))
}

async fn get_air_quality(
    State(state): State<AppState>,
    Query(query): Query<CoordinateQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let coords = query.coordinates()?;
    let reading = state.fetcher.fetch(coords).await;
    Ok(Json(reading_json(&reading)?))
}

async fn get_assessment(
    State(state): State<AppState>,
    UserId(user): UserId,
    Query(query): Query<CoordinateQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let coords = query.coordinates()?;
    let profile = state.repository.get_profile(&user).await?;
    let reading = state.fetcher.fetch(coords).await;
    let assessment = classify(&reading, &profile);

    tracing::debug!(
        "Assessment for {} at ({}, {}): {}",
        user, coords.lat, coords.lon, assessment.risk_level
    );

    Ok(Json(serde_json::json!({
        "reading": reading_json(&reading)?,
        "assessment": assessment,
    })))
}

async fn get_weather(
    State(state): State<AppState>,
    Query(query): Query<CoordinateQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let coords = query.coordinates()?;
    let summary = state.weather.fetch(coords).await;
    Ok(Json(serde_json::to_value(summary).map_err(internal)?))
}

async fn get_profile(
    State(state): State<AppState>,
    UserId(user): UserId,
) -> Result<Json<serde_json::Value>, AppError> {
    let profile = state.repository.get_profile(&user).await?;
    Ok(Json(serde_json::to_value(profile).map_err(internal)?))
}

async fn update_profile(
    State(state): State<AppState>,
    UserId(user): UserId,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let update = ProfileUpdate::from_json_value(body)?;
    let next = state.repository.update_profile(&user, update).await?;

    tracing::info!("Updated profile for {}", user);
    Ok(Json(serde_json::to_value(next).map_err(internal)?))
}

async fn list_places(
    State(state): State<AppState>,
    UserId(user): UserId,
) -> Result<Json<serde_json::Value>, AppError> {
    let places = state.repository.list_places(&user).await?;
    Ok(Json(serde_json::to_value(places).map_err(internal)?))
}

async fn add_place(
    State(state): State<AppState>,
    UserId(user): UserId,
    Json(payload): Json<NewPlaceRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let name = required(payload.name, "name")?;
    let coords = required_coordinates(payload.lat, payload.lon)?;
    let place = state.repository.add_place(&user, &name, coords).await?;
    tracing::info!("Added place {} ({}) for {}", place.id, place.name, user);

    let places = state.repository.list_places(&user).await?;
    Ok(Json(serde_json::to_value(places).map_err(internal)?))
}

async fn rename_place(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(id): Path<u64>,
    Json(payload): Json<RenamePlaceRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let name = required(payload.name, "name")?;
    let place = state.repository.rename_place(&user, id, &name).await?;
    Ok(Json(serde_json::to_value(place).map_err(internal)?))
}

async fn delete_place(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.repository.delete_place(&user, id).await?;
    let places = state.repository.list_places(&user).await?;
    Ok(Json(serde_json::to_value(places).map_err(internal)?))
}

async fn assess_saved_places(
    State(state): State<AppState>,
    UserId(user): UserId,
) -> Result<Json<serde_json::Value>, AppError> {
    let profile = state.repository.get_profile(&user).await?;
    let places = state.repository.list_places(&user).await?;

    tracing::info!("Assessing {} places for {}", places.len(), user);
    let results = assess_places(&state.fetcher, &places, &profile).await;

    // Fallback readings are placeholders; they must not replace a real last-known value
    for result in results.iter().filter(|r| !r.reading.degraded) {
        state
            .repository
            .record_assessment(&user, result.place.id, result.assessment.clone())
            .await?;
    }

    Ok(Json(serde_json::to_value(results).map_err(internal)?))
}

async fn list_health_logs(
    State(state): State<AppState>,
    UserId(user): UserId,
) -> Result<Json<serde_json::Value>, AppError> {
    let logs = state.repository.list_health_logs(&user).await?;
    Ok(Json(serde_json::to_value(logs).map_err(internal)?))
}

async fn add_health_log(
    State(state): State<AppState>,
    UserId(user): UserId,
    Json(payload): Json<NewHealthLogRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let entry = HealthLogEntry {
        date: chrono::Utc::now().date_naive(),
        symptom: required(payload.symptom, "symptom")?,
        exposure: payload.exposure,
    };
    state.repository.add_health_log(&user, entry).await?;

    let logs = state.repository.list_health_logs(&user).await?;
    Ok(Json(serde_json::to_value(logs).map_err(internal)?))
}

async fn get_suggestions(
    State(state): State<AppState>,
    UserId(user): UserId,
    Json(payload): Json<SuggestionRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let coords = required_coordinates(payload.lat, payload.lon)?;

    let profile = state.repository.get_profile(&user).await?;
    let reading = state.fetcher.fetch(coords).await;
    let assessment = classify(&reading, &profile);

    let (suggestions, source) = match &state.suggestions {
        Some(generator) => {
            let context = HealthContext {
                profile,
                air_quality: reading,
                location: payload
                    .location
                    .unwrap_or_else(|| format!("{:.4}, {:.4}", coords.lat, coords.lon)),
            };
            (suggest(generator.as_ref(), &context).await, "generator")
        }
        None => (rule_based_suggestions(assessment.risk_level, &profile), "rules"),
    };

    Ok(Json(serde_json::json!({
        "suggestions": suggestions,
        "assessment": assessment,
        "source": source,
    })))
}

// ============================================================================
// Error Handling
// ============================================================================

fn internal(e: serde_json::Error) -> AppError {
    AppError::Internal(format!("JSON serialization error: {}", e))
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<AdvisorError> for AppError {
    fn from(e: AdvisorError) -> Self {
        let message = e.to_string();
        match e {
            AdvisorError::InvalidProfileInput(_) | AdvisorError::InvalidInput(_) => AppError::BadRequest(message),
            AdvisorError::NotFound(_) => AppError::NotFound(message),
            AdvisorError::Conflict(_) => AppError::Conflict(message),
            // Readings are resolved to fallbacks before reaching a handler
            AdvisorError::MissingIndexData
            | AdvisorError::UpstreamUnavailable(_)
            | AdvisorError::Storage(_) => {
                tracing::error!("Request failed: {}", message);
                AppError::Internal("data unavailable".to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
