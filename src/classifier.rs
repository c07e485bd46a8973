//! Classifier
//!
//! Derives a [`RiskAssessment`] from a reading and a health profile.
//!
//! Each index scheme has its own breakpoint tables; a reading is only ever
//! compared against the tables of the scheme it was produced under.
//! Sensitive profiles get the tightened table.

use crate::types::{AgeGroup, AirQualityReading, HealthProfile, IndexScheme, RiskAssessment, RiskLevel, Sensitivity};

/// Which way the scale runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Higher values mean dirtier air (EPA-style)
    HigherIsWorse,
    /// Higher values mean cleaner air (universal index)
    HigherIsBetter,
}

/// Breakpoint table for one scheme and one sensitivity class.
///
/// For `HigherIsWorse`: `aqi <= good_limit` is Good, `aqi <= caution_limit`
/// is Caution, anything above is Danger. For `HigherIsBetter` the comparisons
/// flip to `>=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoints {
    pub scheme: IndexScheme,
    pub orientation: Orientation,
    pub good_limit: i32,
    pub caution_limit: i32,
}

const EPA_STANDARD: Breakpoints = Breakpoints {
    scheme: IndexScheme::RegionalEpa,
    orientation: Orientation::HigherIsWorse,
    good_limit: 100,
    caution_limit: 150,
};

const EPA_SENSITIVE: Breakpoints = Breakpoints {
    scheme: IndexScheme::RegionalEpa,
    orientation: Orientation::HigherIsWorse,
    good_limit: 50,
    caution_limit: 100,
};

// Universal index bands: 80-100 excellent, 60-79 good, 40-59 moderate,
// 20-39 low, 0-19 poor.
const UNIVERSAL_STANDARD: Breakpoints = Breakpoints {
    scheme: IndexScheme::Universal,
    orientation: Orientation::HigherIsBetter,
    good_limit: 60,
    caution_limit: 40,
};

const UNIVERSAL_SENSITIVE: Breakpoints = Breakpoints {
    scheme: IndexScheme::Universal,
    orientation: Orientation::HigherIsBetter,
    good_limit: 80,
    caution_limit: 60,
};

impl Breakpoints {
    pub fn for_scheme(scheme: IndexScheme, sensitive: bool) -> Self {
        match (scheme, sensitive) {
            (IndexScheme::RegionalEpa, false) => EPA_STANDARD,
            (IndexScheme::RegionalEpa, true) => EPA_SENSITIVE,
            (IndexScheme::Universal, false) => UNIVERSAL_STANDARD,
            (IndexScheme::Universal, true) => UNIVERSAL_SENSITIVE,
        }
    }

    pub fn risk_level(&self, aqi: i32) -> RiskLevel {
        match self.orientation {
            Orientation::HigherIsWorse => {
                if aqi <= self.good_limit {
                    RiskLevel::Good
                } else if aqi <= self.caution_limit {
                    RiskLevel::Caution
                } else {
                    RiskLevel::Danger
                }
            }
            Orientation::HigherIsBetter => {
                if aqi >= self.good_limit {
                    RiskLevel::Good
                } else if aqi >= self.caution_limit {
                    RiskLevel::Caution
                } else {
                    RiskLevel::Danger
                }
            }
        }
    }
}

/// A profile gets tightened thresholds if any health or demographic factor applies.
pub fn is_sensitive(profile: &HealthProfile) -> bool {
    profile.has_asthma
        || profile.has_cardiopulmonary_disease
        || profile.is_pregnant
        || profile.age_group != AgeGroup::Adult
        || profile.sensitivity == Sensitivity::High
        || profile.lifestyle_smoking_exposure
        || profile.lifestyle_mold_exposure
}

/// Fixed presentation phrase per risk level
pub fn outlook_text(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Good => "Stable air quality",
        RiskLevel::Caution => "Elevated pollutant levels",
        RiskLevel::Danger => "Unhealthy air quality",
    }
}

pub fn classify(reading: &AirQualityReading, profile: &HealthProfile) -> RiskAssessment {
    let breakpoints = Breakpoints::for_scheme(reading.scheme(), is_sensitive(profile));
    let risk_level = breakpoints.risk_level(reading.aqi());

    RiskAssessment {
        risk_level,
        outlook_text: outlook_text(risk_level).to_string(),
        scheme: breakpoints.scheme,
    }
}

/// Band description for an EPA-style AQI value.
pub fn describe_epa_aqi(aqi: i32) -> &'static str {
    match aqi {
        i32::MIN..=50 => "Good - Air quality is satisfactory",
        51..=100 => "Moderate - Air quality is acceptable",
        101..=150 => "Unhealthy for sensitive groups",
        151..=200 => "Unhealthy - Everyone may experience health effects",
        201..=300 => "Very unhealthy - Health warnings of emergency conditions",
        _ => "Hazardous - Everyone may experience serious health effects",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IndexValue, PollutantConcentrations};
    use chrono::Utc;

    fn reading(scheme: IndexScheme, aqi: i32) -> AirQualityReading {
        AirQualityReading {
            index: IndexValue::new(scheme, aqi),
            category: "Test".to_string(),
            dominant_pollutant: None,
            pollutants: PollutantConcentrations::new(),
            observed_at: Utc::now(),
            region_code: None,
            degraded: false,
        }
    }

    fn epa(aqi: i32) -> AirQualityReading {
        reading(IndexScheme::RegionalEpa, aqi)
    }

    fn asthmatic() -> HealthProfile {
        HealthProfile {
            has_asthma: true,
            ..HealthProfile::default()
        }
    }

    #[test]
    fn test_standard_boundaries() {
        let profile = HealthProfile::default();
        assert_eq!(classify(&epa(100), &profile).risk_level, RiskLevel::Good);
        assert_eq!(classify(&epa(101), &profile).risk_level, RiskLevel::Caution);
        assert_eq!(classify(&epa(150), &profile).risk_level, RiskLevel::Caution);
        assert_eq!(classify(&epa(151), &profile).risk_level, RiskLevel::Danger);
    }

    #[test]
    fn test_sensitive_boundaries() {
        let profile = asthmatic();
        assert_eq!(classify(&epa(50), &profile).risk_level, RiskLevel::Good);
        assert_eq!(classify(&epa(51), &profile).risk_level, RiskLevel::Caution);
        assert_eq!(classify(&epa(100), &profile).risk_level, RiskLevel::Caution);
        assert_eq!(classify(&epa(101), &profile).risk_level, RiskLevel::Danger);
    }

    #[test]
    fn test_every_factor_marks_sensitive() {
        let base = HealthProfile::default();
        assert!(!is_sensitive(&base));

        let variants = [
            HealthProfile { has_asthma: true, ..base.clone() },
            HealthProfile { has_cardiopulmonary_disease: true, ..base.clone() },
            HealthProfile { is_pregnant: true, ..base.clone() },
            HealthProfile { age_group: AgeGroup::Child, ..base.clone() },
            HealthProfile { age_group: AgeGroup::OlderAdult, ..base.clone() },
            HealthProfile { sensitivity: Sensitivity::High, ..base.clone() },
            HealthProfile { lifestyle_smoking_exposure: true, ..base.clone() },
            HealthProfile { lifestyle_mold_exposure: true, ..base.clone() },
        ];
        for profile in &variants {
            assert!(is_sensitive(profile), "{:?} should be sensitive", profile);
        }

        let low = HealthProfile { sensitivity: Sensitivity::Low, ..base };
        assert!(!is_sensitive(&low));
    }

    #[test]
    fn test_universal_scheme_uses_its_own_table() {
        let profile = HealthProfile::default();
        // 120 would be Caution on the EPA table; on the universal scale it is off the clean end
        let assessment = classify(&reading(IndexScheme::Universal, 120), &profile);
        assert_eq!(assessment.risk_level, RiskLevel::Good);
        assert_eq!(assessment.scheme, IndexScheme::Universal);

        assert_eq!(classify(&reading(IndexScheme::Universal, 60), &profile).risk_level, RiskLevel::Good);
        assert_eq!(classify(&reading(IndexScheme::Universal, 59), &profile).risk_level, RiskLevel::Caution);
        assert_eq!(classify(&reading(IndexScheme::Universal, 39), &profile).risk_level, RiskLevel::Danger);

        let sensitive = asthmatic();
        assert_eq!(classify(&reading(IndexScheme::Universal, 79), &sensitive).risk_level, RiskLevel::Caution);
        assert_eq!(classify(&reading(IndexScheme::Universal, 59), &sensitive).risk_level, RiskLevel::Danger);
    }

    #[test]
    fn test_assessment_records_scheme_and_outlook() {
        let assessment = classify(&epa(180), &HealthProfile::default());
        assert_eq!(assessment.scheme, IndexScheme::RegionalEpa);
        assert_eq!(assessment.outlook_text, "Unhealthy air quality");

        let assessment = classify(&epa(20), &HealthProfile::default());
        assert_eq!(assessment.outlook_text, "Stable air quality");
    }

    #[test]
    fn test_deterministic() {
        let r = epa(87);
        let p = asthmatic();
        let a = classify(&r, &p);
        let b = classify(&r, &p);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }

    #[test]
    fn test_epa_band_descriptions() {
        assert!(describe_epa_aqi(50).starts_with("Good"));
        assert!(describe_epa_aqi(51).starts_with("Moderate"));
        assert_eq!(describe_epa_aqi(150), "Unhealthy for sensitive groups");
        assert!(describe_epa_aqi(301).starts_with("Hazardous"));
    }
}
