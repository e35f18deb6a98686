//! hydra-engine: hydration tracking core
//!
//! Bottle photo → concurrent volume estimators → fusion → two-phase
//! verification → hydration entry, pet progression, overdrink check and
//! leaderboard. [`HydrationTracker`] drives the whole flow; the pure pieces
//! (goal, fusion, pet, overdrink, ranking) are usable on their own.

pub mod db;
pub mod error;
pub mod estimators;
pub mod fusion;
pub mod goal;
pub mod leaderboard;
pub mod models;
pub mod overdrink;
pub mod pet;
pub mod types;
pub mod workflow;

pub use crate::error::{EngineError, EngineResult};
pub use crate::fusion::{fuse, FusedEstimate, FusionPolicy, LowConfidenceWarning};
pub use crate::goal::{compute_daily_goal, ActivityLevel, GoalPolicy, Sex, UserBiometrics};
pub use crate::leaderboard::{rank, Leaderboard, LeaderboardEntry, RankingInput};
pub use crate::models::{HydrationEntry, UserProfile};
pub use crate::overdrink::should_flag;
pub use crate::pet::{current_health, feed, feed_entry, EvolutionStage, PetState};
pub use crate::types::{
    BottleEstimate, CapturedImage, Confidence, EstimateSource, EstimationError, ScanMode,
    WaterLevel,
};
pub use crate::workflow::{
    CaptureReport, ConfirmResult, HydrationTracker, HydrationTrackerBuilder, LoggedIntake,
    PetStatus, ScanPhase, ScanSession,
};
