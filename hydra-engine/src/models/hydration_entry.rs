//! Hydration entry document (append-only)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One committed intake
///
/// Created exactly once per completed scan session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HydrationEntry {
    pub entry_id: Uuid,
    pub user_id: String,
    pub amount_ml: u32,
    pub timestamp_utc: DateTime<Utc>,
    pub bottle_type_label: Option<String>,
    /// False when the user skipped the empty-bottle photo
    pub verified: bool,
}

impl HydrationEntry {
    pub fn new(
        user_id: impl Into<String>,
        amount_ml: u32,
        timestamp_utc: DateTime<Utc>,
        bottle_type_label: Option<String>,
        verified: bool,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            user_id: user_id.into(),
            amount_ml,
            timestamp_utc,
            bottle_type_label,
            verified,
        }
    }
}

/// Sum of entry amounts
pub fn total_amount_ml<'a>(entries: impl IntoIterator<Item = &'a HydrationEntry>) -> u64 {
    entries.into_iter().map(|e| e.amount_ml as u64).sum()
}
