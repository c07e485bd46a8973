//! Normalizer
//!
//! Maps a provider payload onto the canonical [`AirQualityReading`].
//!
//! Rules:
//! - The regional EPA-style index wins over the universal index when both
//!   are present; unknown index codes are ignored.
//! - No usable index at all is [`AdvisorError::MissingIndexData`]; an AQI is
//!   never invented.
//! - Pollutants are extracted one by one. Missing ones are omitted, never
//!   zero-filled.
//! - Labels are sentence-cased regardless of provider casing.
//!
//! Pure: no I/O, no retries.

pub mod provider;
pub mod text;

use chrono::{DateTime, Utc};

use crate::error::AdvisorError;
use crate::types::{
    AirQualityReading, Concentration, ConcentrationUnit, IndexScheme, IndexValue,
    PollutantConcentrations,
};

pub use provider::{RawConcentration, RawIndex, RawPollutant, RawProviderPayload};
pub use text::{pollutant_code, sentence_case};

/// Preference order when several schemes are present
const SCHEME_PREFERENCE: [IndexScheme; 2] = [IndexScheme::RegionalEpa, IndexScheme::Universal];

/// Normalize a payload, using the current time if it carries no timestamp.
pub fn normalize(payload: &RawProviderPayload) -> Result<AirQualityReading, AdvisorError> {
    normalize_at(payload, Utc::now())
}

/// Normalize a payload; `retrieved_at` stands in for a missing or
/// unparseable provider timestamp.
pub fn normalize_at(
    payload: &RawProviderPayload,
    retrieved_at: DateTime<Utc>,
) -> Result<AirQualityReading, AdvisorError> {
    let (scheme, index, aqi) = select_index(&payload.indexes).ok_or(AdvisorError::MissingIndexData)?;

    let category = index
        .category
        .as_deref()
        .map(sentence_case)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());

    let dominant_pollutant = index
        .dominant_pollutant
        .as_deref()
        .map(pollutant_code)
        .filter(|c| !c.is_empty());

    let observed_at = payload
        .date_time
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(retrieved_at);

    let region_code = payload
        .region_code
        .as_deref()
        .map(|r| r.trim().to_ascii_lowercase())
        .filter(|r| !r.is_empty());

    Ok(AirQualityReading {
        index: IndexValue::new(scheme, aqi),
        category,
        dominant_pollutant,
        pollutants: extract_pollutants(&payload.pollutants),
        observed_at,
        region_code,
        degraded: false,
    })
}

/// Pick the most authoritative index that carries a usable value.
fn select_index(indexes: &[RawIndex]) -> Option<(IndexScheme, &RawIndex, i32)> {
    SCHEME_PREFERENCE.iter().find_map(|wanted| {
        indexes.iter().find_map(|idx| {
            let scheme = idx.code.as_deref().and_then(IndexScheme::from_code)?;
            if scheme != *wanted {
                return None;
            }
            let aqi = idx.aqi.filter(|v| v.is_finite())?;
            Some((scheme, idx, aqi.round() as i32))
        })
    })
}

/// Extract each pollutant independently.
///
/// Entries without a code, a finite non-negative value, or a unit are
/// dropped. The first occurrence of a code wins.
fn extract_pollutants(raw: &[RawPollutant]) -> PollutantConcentrations {
    let mut pollutants = PollutantConcentrations::new();

    for entry in raw {
        let Some(code) = entry.code.as_deref().map(pollutant_code).filter(|c| !c.is_empty()) else {
            continue;
        };
        if pollutants.contains(&code) {
            continue;
        }

        let Some(conc) = entry.concentration.as_ref() else {
            tracing::debug!("Pollutant {} has no concentration, omitting", code);
            continue;
        };
        let Some(value) = conc.value.filter(|v| v.is_finite() && *v >= 0.0) else {
            tracing::debug!("Pollutant {} has unusable value {:?}, omitting", code, conc.value);
            continue;
        };
        let Some(units) = conc.units.as_deref().filter(|u| !u.trim().is_empty()) else {
            tracing::debug!("Pollutant {} reported without units, omitting", code);
            continue;
        };

        pollutants.insert(
            code,
            Concentration {
                value,
                unit: ConcentrationUnit::parse(units),
            },
        );
    }

    pollutants
}
