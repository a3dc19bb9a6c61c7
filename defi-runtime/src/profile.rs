use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage::{KeyValueStore, ONBOARDING_COMPLETED_KEY, USER_PROFILE_KEY};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Experience {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    Conservative,
    Moderate,
    Aggressive,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeHorizon {
    Short,
    Medium,
    Long,
}

/// Onboarding answers, stored as JSON under [`USER_PROFILE_KEY`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub experience: Experience,
    pub risk_tolerance: RiskTolerance,
    #[serde(default)]
    pub goals: Vec<String>,
    pub investment_amount: Decimal,
    pub time_horizon: TimeHorizon,
    #[serde(default)]
    pub preferred_assets: Vec<String>,
}

/// Partial update; `None` fields are left as they are.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub experience: Option<Experience>,
    pub risk_tolerance: Option<RiskTolerance>,
    pub goals: Option<Vec<String>>,
    pub investment_amount: Option<Decimal>,
    pub time_horizon: Option<TimeHorizon>,
    pub preferred_assets: Option<Vec<String>>,
}

impl UserProfile {
    fn apply(&mut self, update: ProfileUpdate) {
        if let Some(v) = update.experience {
            self.experience = v;
        }
        if let Some(v) = update.risk_tolerance {
            self.risk_tolerance = v;
        }
        if let Some(v) = update.goals {
            self.goals = v;
        }
        if let Some(v) = update.investment_amount {
            self.investment_amount = v;
        }
        if let Some(v) = update.time_horizon {
            self.time_horizon = v;
        }
        if let Some(v) = update.preferred_assets {
            self.preferred_assets = v;
        }
    }
}

#[derive(Clone)]
pub struct ProfileStore {
    storage: Arc<dyn KeyValueStore>,
}

impl ProfileStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    pub fn is_onboarded(&self) -> Result<bool, StorageError> {
        Ok(self.storage.get(ONBOARDING_COMPLETED_KEY)?.as_deref() == Some("true"))
    }

    /// Stored profile, if any. An unreadable profile is logged and ignored.
    pub fn load(&self) -> Result<Option<UserProfile>, StorageError> {
        let Some(raw) = self.storage.get(USER_PROFILE_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(profile) => Ok(Some(profile)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse user profile");
                Ok(None)
            }
        }
    }

    pub fn complete_onboarding(&self, profile: &UserProfile) -> Result<(), StorageError> {
        self.storage.set(ONBOARDING_COMPLETED_KEY, "true")?;
        self.storage
            .set(USER_PROFILE_KEY, &serde_json::to_string(profile)?)?;
        tracing::info!(experience = ?profile.experience, risk = ?profile.risk_tolerance, "Onboarding completed");
        Ok(())
    }

    /// Merge `update` into the stored profile. Without a stored profile
    /// nothing is written and `None` is returned.
    pub fn update(&self, update: ProfileUpdate) -> Result<Option<UserProfile>, StorageError> {
        let Some(mut profile) = self.load()? else {
            return Ok(None);
        };
        profile.apply(update);
        self.storage
            .set(USER_PROFILE_KEY, &serde_json::to_string(&profile)?)?;
        Ok(Some(profile))
    }

    pub fn reset(&self) -> Result<(), StorageError> {
        self.storage.remove(ONBOARDING_COMPLETED_KEY)?;
        self.storage.remove(USER_PROFILE_KEY)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn profile() -> UserProfile {
        UserProfile {
            experience: Experience::Beginner,
            risk_tolerance: RiskTolerance::Moderate,
            goals: vec!["passive income".into()],
            investment_amount: Decimal::new(1000, 0),
            time_horizon: TimeHorizon::Long,
            preferred_assets: vec!["XLM".into(), "USDC".into()],
        }
    }

    #[test]
    fn test_onboarding_lifecycle() {
        let storage = Arc::new(MemoryStore::new());
        let store = ProfileStore::new(storage.clone());
        assert!(!store.is_onboarded().unwrap());
        assert_eq!(store.update(ProfileUpdate::default()).unwrap(), None);

        store.complete_onboarding(&profile()).unwrap();
        assert!(store.is_onboarded().unwrap());
        let raw = storage.get(USER_PROFILE_KEY).unwrap().unwrap();
        assert!(raw.contains("\"riskTolerance\":\"moderate\""));

        let updated = store
            .update(ProfileUpdate {
                risk_tolerance: Some(RiskTolerance::Aggressive),
                ..Default::default()
            })
            .unwrap()
            .unwrap();
        assert_eq!(updated.risk_tolerance, RiskTolerance::Aggressive);
        assert_eq!(updated.goals, profile().goals);
        assert_eq!(store.load().unwrap(), Some(updated));

        store.reset().unwrap();
        assert!(!store.is_onboarded().unwrap());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_corrupt_profile_is_ignored() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(USER_PROFILE_KEY, "{oops").unwrap();
        assert_eq!(ProfileStore::new(storage).load().unwrap(), None);
    }
}
