//! Event types for the Hydra push-notification hook
//!
//! The engine is pull-based (callers ask for leaderboards and pet status);
//! the EventBus lets consumers subscribe to changes without the core
//! committing to a real-time transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Hydra event types
///
/// Serializable so consumers can forward them over whatever transport they use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum HydraEvent {
    /// A scan session was started (supersedes any previous one for the user)
    SessionStarted {
        user_id: String,
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// An estimator failed; the capture degraded to the remaining sources
    EstimatorFailed {
        user_id: String,
        source: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Fused estimate below the confidence threshold
    ///
    /// User-facing: the UI should show `message`.
    LowConfidence {
        user_id: String,
        confidence: f64,
        source: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A hydration entry was committed
    EntryLogged {
        user_id: String,
        entry_id: Uuid,
        amount_ml: u32,
        verified: bool,
        timestamp: DateTime<Utc>,
    },

    /// Pet state changed after a feed
    PetUpdated {
        user_id: String,
        stage: String,
        level: u8,
        experience: u64,
        health: u8,
        timestamp: DateTime<Utc>,
    },

    /// Today's intake exceeded 150% of the daily goal
    OverdrinkFlagged {
        user_id: String,
        today_total_ml: u64,
        daily_goal_ml: u32,
        timestamp: DateTime<Utc>,
    },

    /// A leaderboard pass finished
    LeaderboardRecomputed {
        /// User ids in rank order
        ranking: Vec<String>,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for HydraEvent
///
/// Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HydraEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering `capacity` events per lagging subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<HydraEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: HydraEvent,
    ) -> Result<usize, broadcast::error::SendError<HydraEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: HydraEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
