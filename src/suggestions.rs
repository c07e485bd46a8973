//! Health suggestions
//!
//! Text generation is an external collaborator behind [`SuggestionSource`].
//! This module owns what surrounds it: the context handed over, parsing the
//! raw text back into records, and the fixed fallbacks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AdvisorError;
use crate::types::{AirQualityReading, HealthProfile, RiskLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Precaution,
    Recommendation,
    Warning,
    Tip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSuggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub icon: String,
}

/// Everything the generator gets to see
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthContext {
    pub profile: HealthProfile,
    pub air_quality: AirQualityReading,
    pub location: String,
}

#[async_trait]
pub trait SuggestionSource: Send + Sync {
    /// Raw generator output, expected to contain a JSON array of suggestions
    async fn generate(&self, context: &HealthContext) -> Result<String, AdvisorError>;
}

// ============================================================================
// Parsing
// ============================================================================

#[derive(Deserialize)]
struct LooseSuggestion {
    #[serde(rename = "type")]
    kind: Option<String>,
    title: Option<String>,
    description: Option<String>,
    priority: Option<String>,
    icon: Option<String>,
}

impl LooseSuggestion {
    fn into_suggestion(self) -> Option<HealthSuggestion> {
        let title = self.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;
        let description = self.description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty())?;

        let kind = match self.kind.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("precaution") => SuggestionKind::Precaution,
            Some("warning") => SuggestionKind::Warning,
            Some("tip") => SuggestionKind::Tip,
            _ => SuggestionKind::Recommendation,
        };
        let priority = match self.priority.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("high") => Priority::High,
            Some("low") => Priority::Low,
            _ => Priority::Medium,
        };

        Some(HealthSuggestion {
            kind,
            title,
            description,
            priority,
            icon: self.icon.unwrap_or_default(),
        })
    }
}

/// Slice from the first `[` to the last `]`
fn extract_json_array(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    if end <= start {
        return None;
    }
    Some(&raw[start..=end])
}

/// Pull top-level `{...}` objects out of a malformed array one at a time.
fn parse_objects_individually(array: &str) -> Vec<LooseSuggestion> {
    let mut found = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in array.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        if let Ok(item) = serde_json::from_str::<LooseSuggestion>(&array[s..=i]) {
                            found.push(item);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    found
}

/// Parse generator output. Returns an empty list when nothing usable is found.
pub fn parse_suggestions(raw: &str) -> Vec<HealthSuggestion> {
    let Some(array) = extract_json_array(raw) else {
        return Vec::new();
    };

    let loose = match serde_json::from_str::<Vec<LooseSuggestion>>(array) {
        Ok(items) => items,
        Err(e) => {
            tracing::debug!("Suggestion array did not parse whole ({}), trying per object", e);
            parse_objects_individually(array)
        }
    };

    loose.into_iter().filter_map(LooseSuggestion::into_suggestion).collect()
}

// ============================================================================
// Fallbacks
// ============================================================================

/// Served when the generator answered but nothing could be parsed
pub fn unparseable_fallback() -> HealthSuggestion {
    HealthSuggestion {
        kind: SuggestionKind::Recommendation,
        title: "Monitor air quality".to_string(),
        description: "Based on current conditions, consider limiting outdoor activities and monitoring your symptoms closely.".to_string(),
        priority: Priority::Medium,
        icon: "wind".to_string(),
    }
}

/// Served when the generator itself failed
pub fn generator_failed_fallback() -> HealthSuggestion {
    HealthSuggestion {
        kind: SuggestionKind::Warning,
        title: "Unable to generate AI suggestions".to_string(),
        description: "Please check your air quality data and try again. In the meantime, consider limiting outdoor activities if air quality is poor.".to_string(),
        priority: Priority::Low,
        icon: "alert-triangle".to_string(),
    }
}

/// Fixed advice per risk level, used when no generator is configured.
pub fn rule_based_suggestions(level: RiskLevel, profile: &HealthProfile) -> Vec<HealthSuggestion> {
    let mut out = match level {
        RiskLevel::Good => vec![HealthSuggestion {
            kind: SuggestionKind::Tip,
            title: "Enjoy outdoor activities".to_string(),
            description: "Air quality is within your comfort range. A good time for outdoor exercise.".to_string(),
            priority: Priority::Low,
            icon: "sun".to_string(),
        }],
        RiskLevel::Caution => vec![HealthSuggestion {
            kind: SuggestionKind::Precaution,
            title: "Limit prolonged exertion".to_string(),
            description: "Shorten or ease outdoor workouts and take breaks indoors.".to_string(),
            priority: Priority::Medium,
            icon: "activity".to_string(),
        }],
        RiskLevel::Danger => vec![
            HealthSuggestion {
                kind: SuggestionKind::Warning,
                title: "Stay indoors".to_string(),
                description: "Avoid outdoor activity, keep windows closed and run an air purifier if available.".to_string(),
                priority: Priority::High,
                icon: "home".to_string(),
            },
            HealthSuggestion {
                kind: SuggestionKind::Precaution,
                title: "Wear a well-fitted mask outside".to_string(),
                description: "An N95 or equivalent respirator reduces fine particle exposure when you must go out.".to_string(),
                priority: Priority::High,
                icon: "shield".to_string(),
            },
        ],
    };

    if profile.has_asthma && level != RiskLevel::Good {
        out.push(HealthSuggestion {
            kind: SuggestionKind::Recommendation,
            title: "Keep your inhaler at hand".to_string(),
            description: "Carry your rescue inhaler and follow your asthma action plan if symptoms appear.".to_string(),
            priority: Priority::High,
            icon: "heart".to_string(),
        });
    }

    out
}

/// Ask the generator, degrading to the fixed fallbacks.
pub async fn suggest(source: &dyn SuggestionSource, context: &HealthContext) -> Vec<HealthSuggestion> {
    match source.generate(context).await {
        Ok(raw) => {
            let parsed = parse_suggestions(&raw);
            if parsed.is_empty() {
                tracing::warn!("Suggestion output had no usable entries");
                vec![unparseable_fallback()]
            } else {
                parsed
            }
        }
        Err(e) => {
            tracing::warn!("Suggestion generator failed: {}", e);
            vec![generator_failed_fallback()]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::fallback_reading;

    #[test]
    fn test_parse_array_with_surrounding_prose() {
        let raw = r#"Here you go:
        [
          {"type": "warning", "title": "Stay in", "description": "AQI is high.", "priority": "high", "icon": "!"},
          {"type": "tip", "title": "Hydrate", "description": "Drink water.", "priority": "low", "icon": "~"}
        ]
        Stay safe."#;

        let parsed = parse_suggestions(raw);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].kind, SuggestionKind::Warning);
        assert_eq!(parsed[0].priority, Priority::High);
        assert_eq!(parsed[1].title, "Hydrate");
    }

    #[test]
    fn test_parse_recovers_valid_objects_from_broken_array() {
        let raw = r#"[
          {"type": "tip", "title": "Ventilate {briefly}", "description": "Open windows early.", "priority": "medium"},
          {"type": "tip", "title": broken},
          {"title": "Check forecasts", "description": "Look before heading out."}
        ]"#;

        let parsed = parse_suggestions(raw);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].title, "Ventilate {briefly}");
        assert_eq!(parsed[1].kind, SuggestionKind::Recommendation);
        assert_eq!(parsed[1].priority, Priority::Medium);
    }

    #[test]
    fn test_parse_nothing_usable() {
        assert!(parse_suggestions("no json here").is_empty());
        assert!(parse_suggestions("] backwards [").is_empty());
        assert!(parse_suggestions(r#"[{"title": "missing description"}]"#).is_empty());
    }

    #[test]
    fn test_rule_based_adds_asthma_advice() {
        let profile = HealthProfile {
            has_asthma: true,
            ..HealthProfile::default()
        };
        let good = rule_based_suggestions(RiskLevel::Good, &profile);
        assert_eq!(good.len(), 1);

        let danger = rule_based_suggestions(RiskLevel::Danger, &profile);
        assert_eq!(danger.len(), 3);
        assert!(danger.iter().any(|s| s.title.contains("inhaler")));
    }

    struct Canned(Result<&'static str, ()>);

    #[async_trait]
    impl SuggestionSource for Canned {
        async fn generate(&self, _context: &HealthContext) -> Result<String, AdvisorError> {
            self.0
                .map(str::to_string)
                .map_err(|_| AdvisorError::UpstreamUnavailable("quota exceeded".to_string()))
        }
    }

    fn context() -> HealthContext {
        HealthContext {
            profile: HealthProfile::default(),
            air_quality: fallback_reading(),
            location: "Houston, TX".to_string(),
        }
    }

    #[tokio::test]
    async fn test_suggest_fallbacks() {
        let out = suggest(&Canned(Ok("I cannot help with that.")), &context()).await;
        assert_eq!(out, vec![unparseable_fallback()]);

        let out = suggest(&Canned(Err(())), &context()).await;
        assert_eq!(out, vec![generator_failed_fallback()]);
    }

    #[test]
    fn test_suggestion_serializes_type_field() {
        let json = serde_json::to_value(unparseable_fallback()).unwrap();
        assert_eq!(json["type"], "recommendation");
        assert_eq!(json["priority"], "medium");
    }
}
