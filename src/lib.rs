//! Air Advisor
//!
//! Personalized air-quality guidance: provider readings are normalized into a
//! canonical shape, then classified against a user's health profile.
//!
//! Pipeline: fetcher -> normalizer -> classifier.
//! - `normalizer/`: provider payload to [`AirQualityReading`] (pure)
//! - `classifier`: reading + profile to [`RiskAssessment`] (pure)
//! - `fetcher`: upstream calls and degraded fallbacks (feature `api`)
//! - `api_server`: Axum endpoints over a [`repository::Repository`] (feature `api`)

pub mod classifier;
pub mod config;
pub mod error;
pub mod normalizer;
pub mod profile;
pub mod types;

#[cfg(feature = "api")]
pub mod api_server;
#[cfg(feature = "api")]
pub mod assessment;
#[cfg(feature = "api")]
pub mod fetcher;
#[cfg(feature = "api")]
pub mod repository;
#[cfg(feature = "api")]
pub mod suggestions;
#[cfg(feature = "api")]
pub mod weather;

// Re-export commonly used types
pub use classifier::{classify, is_sensitive};
pub use config::Config;
pub use error::AdvisorError;
pub use normalizer::{normalize, RawProviderPayload};
pub use types::{
    AgeGroup, AirQualityReading, Coordinates, HealthProfile, IndexScheme, RiskAssessment, RiskLevel,
    SavedPlace, Sensitivity,
};

#[cfg(feature = "api")]
pub use api_server::{create_router, AppState};
