//! Typed access to profiles, pets and hydration entries

use super::{Collection, DocumentQuery, DocumentStore, DocumentWrite};
use crate::error::EngineResult;
use crate::models::{HydrationEntry, UserProfile};
use crate::pet::PetState;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct HydrationRepository {
    store: Arc<dyn DocumentStore>,
}

impl HydrationRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub async fn get_profile(&self, user_id: &str) -> EngineResult<Option<UserProfile>> {
        self.get(Collection::Profiles, user_id).await
    }

    pub async fn save_profile(&self, profile: &UserProfile) -> EngineResult<()> {
        self.set(Collection::Profiles, &profile.user_id, profile).await
    }

    pub async fn list_profiles(&self) -> EngineResult<Vec<UserProfile>> {
        self.query(&DocumentQuery::new(Collection::Profiles)).await
    }

    pub async fn get_pet(&self, user_id: &str) -> EngineResult<Option<PetState>> {
        self.get(Collection::Pets, user_id).await
    }

    pub async fn save_pet(&self, pet: &PetState) -> EngineResult<()> {
        self.set(Collection::Pets, &pet.user_id, pet).await
    }

    pub async fn append_entry(&self, entry: &HydrationEntry) -> EngineResult<()> {
        self.set(Collection::Entries, &entry.entry_id.to_string(), entry)
            .await
    }

    /// Entries for a user in `[from, to)`, oldest first
    pub async fn entries_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EngineResult<Vec<HydrationEntry>> {
        self.query(
            &DocumentQuery::new(Collection::Entries)
                .for_user(user_id)
                .between(from, to),
        )
        .await
    }

    pub async fn entries_for_user(&self, user_id: &str) -> EngineResult<Vec<HydrationEntry>> {
        self.query(&DocumentQuery::new(Collection::Entries).for_user(user_id))
            .await
    }

    /// Write the entry and the fed pet as one unit
    ///
    /// Re-running with the same entry overwrites the same documents.
    pub async fn commit_feed(&self, entry: &HydrationEntry, pet: &PetState) -> EngineResult<()> {
        self.store
            .write_batch(vec![
                DocumentWrite::new(
                    Collection::Entries,
                    entry.entry_id.to_string(),
                    serde_json::to_value(entry)?,
                ),
                DocumentWrite::new(Collection::Pets, pet.user_id.clone(), serde_json::to_value(pet)?),
            ])
            .await?;
        debug!(user_id = %entry.user_id, entry_id = %entry.entry_id, "Committed entry and pet");
        Ok(())
    }

    async fn get<T: DeserializeOwned>(
        &self,
        collection: Collection,
        key: &str,
    ) -> EngineResult<Option<T>> {
        match self.store.get(collection, key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Sync>(
        &self,
        collection: Collection,
        key: &str,
        document: &T,
    ) -> EngineResult<()> {
        let value = serde_json::to_value(document)?;
        self.store.set(collection, key, value).await?;
        Ok(())
    }

    async fn query<T: DeserializeOwned>(&self, query: &DocumentQuery) -> EngineResult<Vec<T>> {
        self.store
            .query(query)
            .await?
            .into_iter()
            .map(|value: Value| serde_json::from_value(value).map_err(Into::into))
            .collect()
    }
}
