//! Document store access
//!
//! The engine treats persistence as a document store: JSON bodies addressed
//! by (collection, key), with a `user_id` + time-range query for the
//! append-only entries collection. Query indexes are read from the body's
//! `user_id` and `timestamp_utc` fields.

pub mod memory;
pub mod repository;
pub mod sqlite;

pub use memory::MemoryStore;
pub use repository::HydrationRepository;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hydra_common::Result;
use serde_json::Value;
use std::fmt;

/// Body field used as the user index
pub const USER_ID_FIELD: &str = "user_id";
/// Body field used as the time index (RFC 3339)
pub const TIMESTAMP_FIELD: &str = "timestamp_utc";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// UserProfile, keyed by user id
    Profiles,
    /// PetState, keyed by user id
    Pets,
    /// HydrationEntry, keyed by entry id, append-only
    Entries,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Profiles => "profiles",
            Collection::Pets => "pets",
            Collection::Entries => "entries",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter for [`DocumentStore::query`]
///
/// The range is `[from, to)`. Documents without a timestamp never match a
/// ranged query.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    pub collection: Collection,
    pub user_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DocumentQuery {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            user_id: None,
            from: None,
            to: None,
        }
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    /// In-process evaluation against extracted index fields
    pub fn matches(&self, index: &IndexFields) -> bool {
        if let Some(user_id) = &self.user_id {
            if index.user_id.as_deref() != Some(user_id.as_str()) {
                return false;
            }
        }
        if self.from.is_none() && self.to.is_none() {
            return true;
        }
        let Some(at_ms) = index.recorded_at_ms else {
            return false;
        };
        if let Some(from) = self.from {
            if at_ms < from.timestamp_millis() {
                return false;
            }
        }
        if let Some(to) = self.to {
            if at_ms >= to.timestamp_millis() {
                return false;
            }
        }
        true
    }
}

/// One document write inside a batch
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentWrite {
    pub collection: Collection,
    pub key: String,
    pub value: Value,
}

impl DocumentWrite {
    pub fn new(collection: Collection, key: impl Into<String>, value: Value) -> Self {
        Self {
            collection,
            key: key.into(),
            value,
        }
    }
}

/// Index values extracted from a document body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexFields {
    pub user_id: Option<String>,
    pub recorded_at_ms: Option<i64>,
}

pub fn index_fields(value: &Value) -> IndexFields {
    IndexFields {
        user_id: value
            .get(USER_ID_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string),
        recorded_at_ms: value
            .get(TIMESTAMP_FIELD)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|ts| ts.timestamp_millis()),
    }
}

/// Key-value document store collaborator
///
/// Query results are ordered by timestamp (undated documents first), then key.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>>;

    async fn set(&self, collection: Collection, key: &str, value: Value) -> Result<()>;

    async fn query(&self, query: &DocumentQuery) -> Result<Vec<Value>>;

    /// Apply writes as one unit where the backend supports it
    ///
    /// Default applies them in order; a failure part-way leaves earlier
    /// writes in place.
    async fn write_batch(&self, writes: Vec<DocumentWrite>) -> Result<()> {
        for write in writes {
            self.set(write.collection, &write.key, write.value).await?;
        }
        Ok(())
    }
}
