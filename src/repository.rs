//! Account, profile and place storage
//!
//! Handlers talk to the [`Repository`] trait only. [`MemoryRepository`] keeps
//! everything in a map and can mirror it to a JSON snapshot file after each
//! write.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::error::AdvisorError;
use crate::profile::ProfileUpdate;
use crate::types::{Coordinates, HealthLogEntry, HealthProfile, RiskAssessment, SavedPlace};

#[async_trait]
pub trait Repository: Send + Sync {
    /// Create an account with a default profile
    async fn create_account(&self, user_id: &str, name: &str) -> Result<HealthProfile, AdvisorError>;

    async fn get_profile(&self, user_id: &str) -> Result<HealthProfile, AdvisorError>;
    /// Apply a partial update against the stored profile in one step.
    /// Concurrent updates for the same user must not overwrite each other.
    async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> Result<HealthProfile, AdvisorError>;

    async fn list_places(&self, user_id: &str) -> Result<Vec<SavedPlace>, AdvisorError>;
    async fn add_place(&self, user_id: &str, name: &str, coords: Coordinates) -> Result<SavedPlace, AdvisorError>;
    async fn rename_place(&self, user_id: &str, place_id: u64, name: &str) -> Result<SavedPlace, AdvisorError>;
    async fn delete_place(&self, user_id: &str, place_id: u64) -> Result<(), AdvisorError>;
    async fn record_assessment(
        &self,
        user_id: &str,
        place_id: u64,
        assessment: RiskAssessment,
    ) -> Result<(), AdvisorError>;

    async fn list_health_logs(&self, user_id: &str) -> Result<Vec<HealthLogEntry>, AdvisorError>;
    async fn add_health_log(&self, user_id: &str, entry: HealthLogEntry) -> Result<(), AdvisorError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserRecord {
    profile: HealthProfile,
    #[serde(default)]
    places: Vec<SavedPlace>,
    #[serde(default)]
    next_place_id: u64,
    #[serde(default)]
    health_logs: Vec<HealthLogEntry>,
}

fn clean_name(name: &str, what: &str) -> Result<String, AdvisorError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AdvisorError::InvalidInput(format!("{} must not be empty", what)));
    }
    Ok(trimmed.to_string())
}

#[derive(Default)]
pub struct MemoryRepository {
    users: RwLock<FxHashMap<String, UserRecord>>,
    snapshot: Option<PathBuf>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path` if it exists and write back to it after every change.
    pub async fn persistent(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let path = path.as_ref().to_path_buf();
        let users: FxHashMap<String, UserRecord> = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse data file: {:?}", path))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("Data file {:?} not found, starting empty", path);
                FxHashMap::default()
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to read data file: {:?}", path)),
        };

        tracing::info!("Loaded {} accounts from {:?}", users.len(), path);
        Ok(Self {
            users: RwLock::new(users),
            snapshot: Some(path),
        })
    }

    async fn persist(&self, users: &FxHashMap<String, UserRecord>) -> Result<(), AdvisorError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };

        let json = serde_json::to_vec_pretty(users).map_err(|e| AdvisorError::Storage(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| AdvisorError::Storage(e.to_string()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| AdvisorError::Storage(e.to_string()))
    }

    /// Run `f` against one user's record under the write lock, then persist.
    async fn mutate<T, F>(&self, user_id: &str, f: F) -> Result<T, AdvisorError>
    where
        F: FnOnce(&mut UserRecord) -> Result<T, AdvisorError> + Send,
        T: Send,
    {
        let mut users = self.users.write().await;
        let record = users
            .get_mut(user_id)
            .ok_or_else(|| AdvisorError::NotFound(format!("user {}", user_id)))?;
        let out = f(record)?;
        self.persist(&users).await?;
        Ok(out)
    }

    async fn read<T, F>(&self, user_id: &str, f: F) -> Result<T, AdvisorError>
    where
        F: FnOnce(&UserRecord) -> T + Send,
        T: Send,
    {
        let users = self.users.read().await;
        users
            .get(user_id)
            .map(f)
            .ok_or_else(|| AdvisorError::NotFound(format!("user {}", user_id)))
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_account(&self, user_id: &str, name: &str) -> Result<HealthProfile, AdvisorError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(AdvisorError::InvalidInput("email is required".to_string()));
        }

        let mut users = self.users.write().await;
        if users.contains_key(user_id) {
            return Err(AdvisorError::Conflict(format!("user {}", user_id)));
        }

        let profile = HealthProfile::for_new_account(name.trim());
        users.insert(
            user_id.to_string(),
            UserRecord {
                profile: profile.clone(),
                next_place_id: 1,
                ..UserRecord::default()
            },
        );
        self.persist(&users).await?;

        tracing::info!("Created account {}", user_id);
        Ok(profile)
    }

    async fn get_profile(&self, user_id: &str) -> Result<HealthProfile, AdvisorError> {
        self.read(user_id, |r| r.profile.clone()).await
    }

    async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> Result<HealthProfile, AdvisorError> {
        self.mutate(user_id, move |r| {
            let next = update.apply(&r.profile)?;
            r.profile = next.clone();
            Ok(next)
        })
        .await
    }

    async fn list_places(&self, user_id: &str) -> Result<Vec<SavedPlace>, AdvisorError> {
        self.read(user_id, |r| r.places.clone()).await
    }

    async fn add_place(&self, user_id: &str, name: &str, coords: Coordinates) -> Result<SavedPlace, AdvisorError> {
        let name = clean_name(name, "place name")?;
        coords.validate()?;

        self.mutate(user_id, move |r| {
            let id = r.next_place_id.max(1);
            r.next_place_id = id + 1;
            let place = SavedPlace {
                id,
                name,
                coordinates: coords,
                last_known_assessment: None,
            };
            r.places.push(place.clone());
            Ok(place)
        })
        .await
    }

    async fn rename_place(&self, user_id: &str, place_id: u64, name: &str) -> Result<SavedPlace, AdvisorError> {
        let name = clean_name(name, "place name")?;

        self.mutate(user_id, move |r| {
            let place = r
                .places
                .iter_mut()
                .find(|p| p.id == place_id)
                .ok_or_else(|| AdvisorError::NotFound(format!("place {}", place_id)))?;
            place.name = name;
            Ok(place.clone())
        })
        .await
    }

    async fn delete_place(&self, user_id: &str, place_id: u64) -> Result<(), AdvisorError> {
        self.mutate(user_id, move |r| {
            let before = r.places.len();
            r.places.retain(|p| p.id != place_id);
            if r.places.len() == before {
                return Err(AdvisorError::NotFound(format!("place {}", place_id)));
            }
            Ok(())
        })
        .await
    }

    async fn record_assessment(
        &self,
        user_id: &str,
        place_id: u64,
        assessment: RiskAssessment,
    ) -> Result<(), AdvisorError> {
        self.mutate(user_id, move |r| {
            // The place may have been deleted while its reading was in flight
            if let Some(place) = r.places.iter_mut().find(|p| p.id == place_id) {
                place.last_known_assessment = Some(assessment);
            }
            Ok(())
        })
        .await
    }

    async fn list_health_logs(&self, user_id: &str) -> Result<Vec<HealthLogEntry>, AdvisorError> {
        self.read(user_id, |r| r.health_logs.clone()).await
    }

    async fn add_health_log(&self, user_id: &str, entry: HealthLogEntry) -> Result<(), AdvisorError> {
        let symptom = clean_name(&entry.symptom, "symptom")?;
        let entry = HealthLogEntry {
            symptom,
            exposure: entry.exposure.trim().to_string(),
            ..entry
        };

        self.mutate(user_id, move |r| {
            r.health_logs.push(entry);
            Ok(())
        })
        .await
    }
}
