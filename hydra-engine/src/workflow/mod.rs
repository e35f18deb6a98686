//! Scan workflow: capture → estimate → fuse → verify → log
//!
//! - [`verification`]: the per-session two-phase state machine
//! - [`tracker`]: [`HydrationTracker`], which owns sessions, estimators,
//!   the store and the event bus, and turns completed sessions into
//!   hydration entries and pet updates
//!
//! Types returned to callers live here.

pub mod tracker;
pub mod verification;

pub use tracker::{HydrationTracker, HydrationTrackerBuilder};
pub use verification::{
    CaptureTicket, CompletedScan, ConfirmOutcome, PhaseTransition, ScanPhase, ScanSession,
};

use crate::estimators::EstimatorOutcome;
use crate::fusion::FusedEstimate;
use crate::models::HydrationEntry;
use crate::pet::PetState;
use crate::types::ScanMode;
use uuid::Uuid;

/// What one capture produced
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureReport {
    pub session_id: Uuid,
    pub mode: ScanMode,
    pub fused: FusedEstimate,
    pub local: EstimatorOutcome,
    pub remote: EstimatorOutcome,
}

/// A committed intake and its consequences
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedIntake {
    pub entry: HydrationEntry,
    /// Pet after the feed
    pub pet: PetState,
    pub today_total_ml: u64,
    pub daily_goal_ml: u32,
    /// Today's total exceeds 150% of the goal
    pub overdrink: bool,
    pub prior_estimate: FusedEstimate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmResult {
    /// Initial photo accepted; capture the emptied bottle next
    AwaitingVerification {
        session_id: Uuid,
        prior_estimate: FusedEstimate,
    },
    Logged(LoggedIntake),
}

/// Pet with health decayed to the read time
#[derive(Debug, Clone, PartialEq)]
pub struct PetStatus {
    pub pet: PetState,
    pub current_health: u8,
}
