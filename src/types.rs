//! Shared data model
//!
//! Canonical shapes that flow through the pipeline: readings produced by the
//! normalizer, profiles owned by users, and the assessments derived from both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::AdvisorError;

// ============================================================================
// Index schemes
// ============================================================================

/// Authority whose breakpoint table produced an AQI value.
///
/// Values from different schemes are not numerically comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexScheme {
    /// National EPA-style index (0-500, higher is worse)
    #[serde(rename = "usa_epa")]
    RegionalEpa,
    /// Provider's universal index (0-100, higher is cleaner)
    #[serde(rename = "uaqi")]
    Universal,
}

impl IndexScheme {
    /// Wire code used by the upstream provider
    pub fn code(&self) -> &'static str {
        match self {
            IndexScheme::RegionalEpa => "usa_epa",
            IndexScheme::Universal => "uaqi",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "usa_epa" => Some(IndexScheme::RegionalEpa),
            "uaqi" => Some(IndexScheme::Universal),
            _ => None,
        }
    }
}

impl fmt::Display for IndexScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// An AQI value bound to the scheme it was computed under.
///
/// Serialized flat as `aqi` + `indexScheme` so the pair is never split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexValue {
    pub aqi: i32,
    pub index_scheme: IndexScheme,
}

impl IndexValue {
    pub fn new(index_scheme: IndexScheme, aqi: i32) -> Self {
        Self { aqi, index_scheme }
    }
}

// ============================================================================
// Pollutants
// ============================================================================

/// Unit a concentration was reported in. Tracked per pollutant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConcentrationUnit {
    MicrogramsPerCubicMeter,
    MilligramsPerCubicMeter,
    PartsPerBillion,
    PartsPerMillion,
    Other(String),
}

impl ConcentrationUnit {
    pub fn as_str(&self) -> &str {
        match self {
            ConcentrationUnit::MicrogramsPerCubicMeter => "ug/m3",
            ConcentrationUnit::MilligramsPerCubicMeter => "mg/m3",
            ConcentrationUnit::PartsPerBillion => "ppb",
            ConcentrationUnit::PartsPerMillion => "ppm",
            ConcentrationUnit::Other(s) => s,
        }
    }

    /// Parse both the canonical short form and the provider's enum names
    /// (e.g. `MICROGRAMS_PER_CUBIC_METER`).
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ug/m3" | "µg/m³" | "μg/m³" | "micrograms_per_cubic_meter" => {
                ConcentrationUnit::MicrogramsPerCubicMeter
            }
            "mg/m3" | "milligrams_per_cubic_meter" => ConcentrationUnit::MilligramsPerCubicMeter,
            "ppb" | "parts_per_billion" => ConcentrationUnit::PartsPerBillion,
            "ppm" | "parts_per_million" => ConcentrationUnit::PartsPerMillion,
            _ => ConcentrationUnit::Other(raw.trim().to_string()),
        }
    }
}

impl From<String> for ConcentrationUnit {
    fn from(raw: String) -> Self {
        ConcentrationUnit::parse(&raw)
    }
}

impl From<ConcentrationUnit> for String {
    fn from(unit: ConcentrationUnit) -> Self {
        unit.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concentration {
    pub value: f64,
    pub unit: ConcentrationUnit,
}

/// Pollutant code (`pm25`, `o3`, ...) to measured concentration.
///
/// A pollutant that was not measured is absent from the map; it is never
/// stored as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PollutantConcentrations(BTreeMap<String, Concentration>);

impl PollutantConcentrations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: impl Into<String>, concentration: Concentration) {
        self.0.insert(code.into(), concentration);
    }

    pub fn get(&self, code: &str) -> Option<&Concentration> {
        self.0.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.0.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Concentration)> {
        self.0.iter()
    }
}

// ============================================================================
// Readings
// ============================================================================

/// Canonical normalized air-quality reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirQualityReading {
    #[serde(flatten)]
    pub index: IndexValue,
    /// Provider-supplied label for the index value
    pub category: String,
    /// Normalized pollutant code; absent when the provider does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_pollutant: Option<String>,
    pub pollutants: PollutantConcentrations,
    pub observed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_code: Option<String>,
    /// Set when the reading is placeholder data rather than a live fetch
    #[serde(default)]
    pub degraded: bool,
}

impl AirQualityReading {
    pub fn aqi(&self) -> i32 {
        self.index.aqi
    }

    pub fn scheme(&self) -> IndexScheme {
        self.index.index_scheme
    }
}

// ============================================================================
// Health profile
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AgeGroup {
    Child,
    #[default]
    Adult,
    OlderAdult,
}

impl FromStr for AgeGroup {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "child" => Ok(AgeGroup::Child),
            "adult" => Ok(AgeGroup::Adult),
            "olderadult" => Ok(AgeGroup::OlderAdult),
            _ => Err(AdvisorError::InvalidProfileInput(format!(
                "unknown ageGroup '{}' (expected child, adult or olderAdult)",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Sensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl FromStr for Sensitivity {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Sensitivity::Low),
            "medium" => Ok(Sensitivity::Medium),
            "high" => Ok(Sensitivity::High),
            _ => Err(AdvisorError::InvalidProfileInput(format!(
                "unknown sensitivity '{}' (expected low, medium or high)",
                s
            ))),
        }
    }
}

/// Static risk-modifying attributes owned by a single user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthProfile {
    pub name: String,
    pub has_asthma: bool,
    pub has_cardiopulmonary_disease: bool,
    pub is_pregnant: bool,
    pub age_group: AgeGroup,
    pub lifestyle_smoking_exposure: bool,
    pub lifestyle_mold_exposure: bool,
    pub sensitivity: Sensitivity,
}

impl HealthProfile {
    /// Default profile created at registration
    pub fn for_new_account(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

// ============================================================================
// Assessments
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Good,
    Caution,
    Danger,
}

impl RiskLevel {
    pub fn display_text(&self) -> &'static str {
        match self {
            RiskLevel::Good => "Good",
            RiskLevel::Caution => "Caution",
            RiskLevel::Danger => "Danger",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_text())
    }
}

/// Derived result of classifying one reading against one profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub outlook_text: String,
    /// Scheme whose breakpoint table was applied
    pub scheme: IndexScheme,
}

// ============================================================================
// Places and logs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn validate(&self) -> Result<(), AdvisorError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(AdvisorError::InvalidInput(format!(
                "latitude {} out of range [-90, 90]",
                self.lat
            )));
        }
        if !self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon) {
            return Err(AdvisorError::InvalidInput(format!(
                "longitude {} out of range [-180, 180]",
                self.lon
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPlace {
    /// Unique per owning user
    pub id: u64,
    pub name: String,
    pub coordinates: Coordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_known_assessment: Option<RiskAssessment>,
}

/// Self-reported symptom entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthLogEntry {
    pub date: chrono::NaiveDate,
    pub symptom: String,
    #[serde(default)]
    pub exposure: String,
}
