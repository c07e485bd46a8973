//! Per-place assessments
//!
//! Runs the full pipeline for every saved place of a user. Fetches are
//! concurrent and each place's failure stays with that place. A degraded
//! reading is classified for display but never becomes a place's
//! last-known assessment.

use serde::Serialize;

use crate::classifier::classify;
use crate::fetcher::Fetcher;
use crate::types::{AirQualityReading, HealthProfile, RiskAssessment, SavedPlace};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceAssessment {
    pub place: SavedPlace,
    pub reading: AirQualityReading,
    pub assessment: RiskAssessment,
}

/// One entry per place, in the order given.
///
/// `place.last_known_assessment` is refreshed from live readings only; a place
/// whose reading fell back keeps whatever it had before.
pub async fn assess_places(
    fetcher: &Fetcher,
    places: &[SavedPlace],
    profile: &HealthProfile,
) -> Vec<PlaceAssessment> {
    let coords: Vec<_> = places.iter().map(|p| p.coordinates).collect();
    let readings = fetcher.fetch_many(&coords).await;

    let degraded = readings.iter().filter(|r| r.degraded).count();
    if degraded > 0 {
        tracing::info!("{} of {} place readings degraded", degraded, readings.len());
    }

    places
        .iter()
        .zip(readings)
        .map(|(place, reading)| {
            let assessment = classify(&reading, profile);
            let mut place = place.clone();
            if !reading.degraded {
                place.last_known_assessment = Some(assessment.clone());
            }
            PlaceAssessment {
                place,
                reading,
                assessment,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdvisorError;
    use crate::fetcher::AirQualityProvider;
    use crate::normalizer::RawProviderPayload;
    use crate::types::{Coordinates, IndexScheme, RiskLevel};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    /// Fails for one latitude, serves AQI 120 everywhere else
    struct OneBadPlace {
        bad_lat: f64,
    }

    #[async_trait]
    impl AirQualityProvider for OneBadPlace {
        async fn current_conditions(&self, coords: Coordinates) -> Result<RawProviderPayload, AdvisorError> {
            if coords.lat == self.bad_lat {
                return Err(AdvisorError::UpstreamUnavailable("connection refused".to_string()));
            }
            RawProviderPayload::from_json(r#"{"indexes": [{"code": "usa_epa", "aqi": 120}]}"#)
        }
    }

    fn place(id: u64, lat: f64) -> SavedPlace {
        with_last_known(id, lat, None)
    }

    fn with_last_known(id: u64, lat: f64, last_known_assessment: Option<RiskAssessment>) -> SavedPlace {
        SavedPlace {
            id,
            name: format!("Place {}", id),
            coordinates: Coordinates::new(lat, -95.0),
            last_known_assessment,
        }
    }

    #[tokio::test]
    async fn test_failure_isolated_to_one_place() {
        let fetcher = Fetcher::new(Arc::new(OneBadPlace { bad_lat: 2.0 }), Duration::from_secs(1));
        let places = vec![place(1, 1.0), place(2, 2.0), place(3, 3.0)];

        let results = assess_places(&fetcher, &places, &HealthProfile::default()).await;

        assert_eq!(results.len(), 3);
        let ids: Vec<u64> = results.iter().map(|r| r.place.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        assert!(results[1].reading.degraded);
        for healthy in [&results[0], &results[2]] {
            assert!(!healthy.reading.degraded);
            assert_eq!(healthy.reading.aqi(), 120);
            assert_eq!(healthy.assessment.risk_level, RiskLevel::Caution);
            assert_eq!(healthy.place.last_known_assessment, Some(healthy.assessment.clone()));
        }
    }

    #[tokio::test]
    async fn test_degraded_reading_keeps_previous_last_known() {
        let fetcher = Fetcher::new(Arc::new(OneBadPlace { bad_lat: 2.0 }), Duration::from_secs(1));
        let danger = RiskAssessment {
            risk_level: RiskLevel::Danger,
            outlook_text: "Unhealthy air quality".to_string(),
            scheme: IndexScheme::RegionalEpa,
        };
        let places = vec![with_last_known(1, 2.0, Some(danger.clone())), place(2, 2.0)];

        let results = assess_places(&fetcher, &places, &HealthProfile::default()).await;

        assert!(results[0].reading.degraded);
        assert_eq!(results[0].place.last_known_assessment, Some(danger));
        assert_eq!(results[1].place.last_known_assessment, None);
    }

    #[tokio::test]
    async fn test_empty_place_list() {
        let fetcher = Fetcher::new(Arc::new(OneBadPlace { bad_lat: 0.0 }), Duration::from_secs(1));
        let results = assess_places(&fetcher, &[], &HealthProfile::default()).await;
        assert!(results.is_empty());
    }
}
