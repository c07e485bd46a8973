//! Profile updates
//!
//! Partial updates: present fields overwrite, absent fields keep their value.
//! An update is validated as a whole and either applies completely or not at all.

use serde::Deserialize;

use crate::error::AdvisorError;
use crate::types::{AgeGroup, HealthProfile, Sensitivity};

/// Incoming profile change. Accepts the older form field names as aliases.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub has_asthma: Option<bool>,
    #[serde(alias = "hasCardioDisease")]
    pub has_cardiopulmonary_disease: Option<bool>,
    #[serde(alias = "pregnant")]
    pub is_pregnant: Option<bool>,
    pub age_group: Option<String>,
    #[serde(alias = "lifestyleSmoking")]
    pub lifestyle_smoking_exposure: Option<bool>,
    #[serde(alias = "lifestyleMold")]
    pub lifestyle_mold_exposure: Option<bool>,
    pub sensitivity: Option<String>,
}

impl ProfileUpdate {
    /// Decode a request body, reporting shape errors as invalid profile input
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, AdvisorError> {
        serde_json::from_value(value).map_err(|e| AdvisorError::InvalidProfileInput(e.to_string()))
    }

    /// Produce the updated profile, leaving `current` untouched on error.
    pub fn apply(&self, current: &HealthProfile) -> Result<HealthProfile, AdvisorError> {
        let mut next = current.clone();

        if let Some(name) = &self.name {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                return Err(AdvisorError::InvalidProfileInput("name must not be empty".to_string()));
            }
            next.name = trimmed.to_string();
        }
        if let Some(age_group) = &self.age_group {
            next.age_group = age_group.parse::<AgeGroup>()?;
        }
        if let Some(sensitivity) = &self.sensitivity {
            next.sensitivity = sensitivity.parse::<Sensitivity>()?;
        }

        if let Some(v) = self.has_asthma {
            next.has_asthma = v;
        }
        if let Some(v) = self.has_cardiopulmonary_disease {
            next.has_cardiopulmonary_disease = v;
        }
        if let Some(v) = self.is_pregnant {
            next.is_pregnant = v;
        }
        if let Some(v) = self.lifestyle_smoking_exposure {
            next.lifestyle_smoking_exposure = v;
        }
        if let Some(v) = self.lifestyle_mold_exposure {
            next.lifestyle_mold_exposure = v;
        }

        Ok(next)
    }
}
