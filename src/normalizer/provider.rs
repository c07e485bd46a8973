//! Typed shape of the upstream current-conditions response.
//!
//! Every field is optional so a partial payload still parses; the normalizer
//! decides which absences are fatal. Structural mismatches (an `indexes` that
//! is not an array, a non-numeric `aqi`) fail the parse outright.

use serde::Deserialize;

use crate::error::AdvisorError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProviderPayload {
    pub date_time: Option<String>,
    pub region_code: Option<String>,
    #[serde(default)]
    pub indexes: Vec<RawIndex>,
    #[serde(default)]
    pub pollutants: Vec<RawPollutant>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawIndex {
    pub code: Option<String>,
    pub display_name: Option<String>,
    pub aqi: Option<f64>,
    pub category: Option<String>,
    pub dominant_pollutant: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPollutant {
    pub code: Option<String>,
    pub display_name: Option<String>,
    pub concentration: Option<RawConcentration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConcentration {
    pub value: Option<f64>,
    pub units: Option<String>,
}

impl RawProviderPayload {
    /// Parse a response body. A body that is not the expected shape is an
    /// upstream failure, not missing index data.
    pub fn from_json(body: &str) -> Result<Self, AdvisorError> {
        serde_json::from_str(body)
            .map_err(|e| AdvisorError::UpstreamUnavailable(format!("malformed payload: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_partial_payload() {
        let payload = RawProviderPayload::from_json(r#"{"regionCode":"us"}"#).unwrap();
        assert!(payload.indexes.is_empty());
        assert!(payload.pollutants.is_empty());
        assert_eq!(payload.region_code.as_deref(), Some("us"));
    }

    #[test]
    fn test_structural_mismatch_is_upstream_failure() {
        let err = RawProviderPayload::from_json(r#"{"indexes": {"code": "uaqi"}}"#).unwrap_err();
        assert!(matches!(err, AdvisorError::UpstreamUnavailable(_)));

        let err = RawProviderPayload::from_json("<html>").unwrap_err();
        assert!(err.is_retryable());
    }
}
