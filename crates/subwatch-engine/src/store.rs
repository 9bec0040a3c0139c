//! File-backed subscription and preference store.
//!
//! JSON files — human-readable, git-friendly. The real application keeps
//! these behind its own persistence layer; this store serves the CLI binary
//! and integration tests through the same trait seams.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use subwatch_core::config::NotificationPreferences;
use subwatch_core::error::{Result, SubwatchError};
use subwatch_core::traits::{PreferenceStore, SubscriptionStore};
use subwatch_core::types::Subscription;

/// Loads `subscriptions.json` and `preferences.json` from a directory.
/// Preferences are validated at load; invalid users are dropped with a
/// warning so one bad record never poisons the whole store.
pub struct FileStore {
    subscriptions: Vec<Subscription>,
    preferences: Vec<(String, NotificationPreferences)>,
}

impl FileStore {
    pub fn load(dir: &Path) -> Result<Self> {
        let subscriptions: Vec<Subscription> =
            read_json(&dir.join("subscriptions.json"))?.unwrap_or_default();

        let raw: BTreeMap<String, NotificationPreferences> =
            read_json(&dir.join("preferences.json"))?.unwrap_or_default();

        let mut preferences = Vec::new();
        for (user_id, prefs) in raw {
            match prefs.validate() {
                Ok(()) => preferences.push((user_id, prefs)),
                Err(e) => {
                    tracing::warn!("⚠️ Dropping preferences for user {user_id}: {e}");
                }
            }
        }

        tracing::info!(
            "💾 Loaded {} subscription(s), {} user(s) with preferences from {}",
            subscriptions.len(),
            preferences.len(),
            dir.display()
        );
        Ok(Self { subscriptions, preferences })
    }

    /// Default data directory (~/.subwatch/data).
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".subwatch")
            .join("data")
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| SubwatchError::Store(format!("read {}: {e}", path.display())))?;
    let value = serde_json::from_str(&content)
        .map_err(|e| SubwatchError::Store(format!("parse {}: {e}", path.display())))?;
    Ok(Some(value))
}

#[async_trait]
impl SubscriptionStore for FileStore {
    async fn list_active_for_user(&self, user_id: &str) -> Result<Vec<Subscription>> {
        Ok(self
            .subscriptions
            .iter()
            .filter(|s| s.user_id == user_id && s.active)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PreferenceStore for FileStore {
    async fn list_users_with_preferences(
        &self,
    ) -> Result<Vec<(String, NotificationPreferences)>> {
        Ok(self.preferences.clone())
    }

    async fn get_preferences(&self, user_id: &str) -> Result<Option<NotificationPreferences>> {
        Ok(self
            .preferences
            .iter()
            .find(|(id, _)| id == user_id)
            .map(|(_, prefs)| prefs.clone()))
    }
}
