//! Hydration tracker - orchestrates captures, sessions and commits
//!
//! One scan session per user. A new capture cancels the user's in-flight
//! capture; a new session replaces the old one. Estimators run concurrently
//! with remote vision bounded by `estimation.remote_wait_ms`. Completed
//! sessions are committed as entry + pet in one store batch.

use super::verification::{CompletedScan, ConfirmOutcome, ScanPhase, ScanSession};
use super::{CaptureReport, ConfirmResult, LoggedIntake, PetStatus};
use crate::db::{DocumentStore, HydrationRepository};
use crate::error::{EngineError, EngineResult};
use crate::estimators::{
    run_bounded, run_estimator, EstimatorOutcome, LocalClassifier, LocalModel, RemoteVisionClient,
    SimulatedEstimator, VolumeEstimator,
};
use crate::fusion::FusionPolicy;
use crate::goal::{GoalPolicy, UserBiometrics};
use crate::leaderboard::{Leaderboard, LeaderboardEntry};
use crate::models::{total_amount_ml, HydrationEntry, UserProfile};
use crate::overdrink::should_flag;
use crate::pet::{current_health, feed_entry, PetState};
use crate::types::{CapturedImage, ScanMode};
use chrono::{DateTime, Utc};
use hydra_common::config::HydraConfig;
use hydra_common::events::{EventBus, HydraEvent};
use hydra_common::time::{Clock, DayBoundary, SystemClock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Name given to a pet recreated for a user who has none
pub const DEFAULT_PET_NAME: &str = "Droplet";

struct InFlightCapture {
    id: u64,
    token: CancellationToken,
}

pub struct HydrationTracker {
    config: HydraConfig,
    repository: HydrationRepository,
    local: Option<Arc<dyn VolumeEstimator>>,
    remote: Option<Arc<dyn VolumeEstimator>>,
    simulated: SimulatedEstimator,
    policy: FusionPolicy,
    goal_policy: GoalPolicy,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    day_boundary: DayBoundary,
    remote_wait: Duration,
    sessions: Mutex<HashMap<String, ScanSession>>,
    in_flight: Mutex<HashMap<String, InFlightCapture>>,
    next_capture_id: AtomicU64,
}

pub struct HydrationTrackerBuilder {
    config: HydraConfig,
    store: Arc<dyn DocumentStore>,
    local: Option<Arc<dyn VolumeEstimator>>,
    local_model: Option<Arc<LocalModel>>,
    remote: Option<Arc<dyn VolumeEstimator>>,
    clock: Option<Arc<dyn Clock>>,
    event_bus: Option<EventBus>,
    policy: Option<FusionPolicy>,
}

impl HydrationTrackerBuilder {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            config: HydraConfig::default(),
            store,
            local: None,
            local_model: None,
            remote: None,
            clock: None,
            event_bus: None,
            policy: None,
        }
    }

    pub fn config(mut self, config: HydraConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a [`LocalClassifier`] over this model (capacity default from config)
    pub fn local_model(mut self, model: Arc<LocalModel>) -> Self {
        self.local_model = Some(model);
        self
    }

    pub fn local_estimator(mut self, estimator: Arc<dyn VolumeEstimator>) -> Self {
        self.local = Some(estimator);
        self
    }

    /// Override the remote estimator (otherwise built from `[vision]` when a key is set)
    pub fn remote_estimator(mut self, estimator: Arc<dyn VolumeEstimator>) -> Self {
        self.remote = Some(estimator);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn fusion_policy(mut self, policy: FusionPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn build(self) -> EngineResult<HydrationTracker> {
        let config = self.config;

        let local = match (self.local, self.local_model) {
            (Some(estimator), _) => Some(estimator),
            (None, Some(model)) => Some(Arc::new(LocalClassifier::new(
                model,
                config.estimation.default_bottle_capacity_ml,
            )) as Arc<dyn VolumeEstimator>),
            (None, None) => None,
        };

        let remote = match self.remote {
            Some(estimator) => Some(estimator),
            None if config.vision.is_configured() => {
                Some(Arc::new(RemoteVisionClient::new(&config.vision)?) as Arc<dyn VolumeEstimator>)
            }
            None => None,
        };

        info!(
            local = local.is_some(),
            remote = remote.is_some(),
            remote_wait_ms = config.estimation.remote_wait_ms,
            goal_policy = ?config.goal.policy,
            "Hydration tracker initialized"
        );

        Ok(HydrationTracker {
            repository: HydrationRepository::new(self.store),
            local,
            remote,
            simulated: SimulatedEstimator::new(),
            policy: self
                .policy
                .unwrap_or_else(|| FusionPolicy::from_config(&config.fusion)),
            goal_policy: GoalPolicy::from(config.goal.policy),
            event_bus: self.event_bus.unwrap_or_default(),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            day_boundary: DayBoundary::from_offset_minutes(config.day.utc_offset_minutes),
            remote_wait: Duration::from_millis(config.estimation.remote_wait_ms),
            sessions: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            next_capture_id: AtomicU64::new(1),
            config,
        })
    }
}

impl HydrationTracker {
    pub fn builder(store: Arc<dyn DocumentStore>) -> HydrationTrackerBuilder {
        HydrationTrackerBuilder::new(store)
    }

    pub fn config(&self) -> &HydraConfig {
        &self.config
    }

    pub fn repository(&self) -> &HydrationRepository {
        &self.repository
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HydraEvent> {
        self.event_bus.subscribe()
    }

    fn emit(&self, event: HydraEvent) {
        self.event_bus.emit_lossy(event);
    }

    // ------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------

    /// Create (or replace) a profile; creates the pet on first onboarding
    pub async fn onboard(
        &self,
        user_id: &str,
        display_name: &str,
        biometrics: UserBiometrics,
        pet_name: &str,
    ) -> EngineResult<UserProfile> {
        let now = self.clock.now();
        let profile = UserProfile::new(user_id, display_name, biometrics, self.goal_policy, now)?;
        self.repository.save_profile(&profile).await?;

        if self.repository.get_pet(user_id).await?.is_none() {
            self.repository
                .save_pet(&PetState::new(user_id, pet_name, now))
                .await?;
        }

        info!(
            user_id = %user_id,
            daily_goal_ml = profile.daily_goal_ml,
            policy = ?profile.goal_policy,
            "User onboarded"
        );
        Ok(profile)
    }

    /// Replace biometrics and recompute the daily goal
    pub async fn update_biometrics(
        &self,
        user_id: &str,
        biometrics: UserBiometrics,
    ) -> EngineResult<UserProfile> {
        let mut profile = self.require_profile(user_id).await?;
        profile.update_biometrics(biometrics, self.clock.now())?;
        self.repository.save_profile(&profile).await?;
        debug!(user_id = %user_id, daily_goal_ml = profile.daily_goal_ml, "Biometrics updated");
        Ok(profile)
    }

    async fn require_profile(&self, user_id: &str) -> EngineResult<UserProfile> {
        self.repository
            .get_profile(user_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("profile for user {user_id}")))
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Open a scan session, replacing any existing one
    pub async fn start_session(&self, user_id: &str) -> EngineResult<Uuid> {
        self.require_profile(user_id).await?;
        self.cancel_capture(user_id).await;

        let now = self.clock.now();
        let session = ScanSession::new(user_id, now);
        let session_id = session.session_id;

        if let Some(previous) = self.sessions.lock().await.insert(user_id.to_string(), session) {
            debug!(
                user_id = %user_id,
                previous_session = %previous.session_id,
                "Superseding scan session"
            );
        }

        self.emit(HydraEvent::SessionStarted {
            user_id: user_id.to_string(),
            session_id,
            timestamp: now,
        });
        Ok(session_id)
    }

    /// Drop the session without logging anything
    pub async fn abandon(&self, user_id: &str) -> bool {
        self.cancel_capture(user_id).await;
        let removed = self.sessions.lock().await.remove(user_id);
        if let Some(session) = &removed {
            debug!(user_id = %user_id, session_id = %session.session_id, "Scan session abandoned");
        }
        removed.is_some()
    }

    pub async fn session_phase(&self, user_id: &str) -> Option<ScanPhase> {
        self.sessions.lock().await.get(user_id).map(ScanSession::phase)
    }

    // ------------------------------------------------------------------
    // Capture
    // ------------------------------------------------------------------

    /// Estimate a capture for the current phase of the user's session
    ///
    /// Fails with `CaptureSuperseded` when a newer capture (or session) for
    /// the same user replaces this one before it finishes.
    pub async fn capture(&self, user_id: &str, image: CapturedImage) -> EngineResult<CaptureReport> {
        let ticket = {
            let mut sessions = self.sessions.lock().await;
            let session = sessions
                .get_mut(user_id)
                .ok_or_else(|| EngineError::NoActiveSession(user_id.to_string()))?;
            session.begin_capture()?
        };

        let (capture_id, token) = self.register_capture(user_id).await;

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(EngineError::CaptureSuperseded),
            report = self.run_capture(user_id, ticket, image) => report,
        };

        self.release_capture(user_id, capture_id).await;

        if matches!(result, Err(EngineError::CaptureSuperseded)) {
            debug!(user_id = %user_id, capture_id, "Capture superseded");
        }
        result
    }

    async fn run_capture(
        &self,
        user_id: &str,
        ticket: super::CaptureTicket,
        image: CapturedImage,
    ) -> EngineResult<CaptureReport> {
        let mode = ticket.mode;
        let (local, remote) = tokio::join!(
            self.run_local(&image, mode),
            self.run_remote(&image, mode)
        );
        let simulated = self.simulated.simulate(&image, mode);
        let fused = self
            .policy
            .fuse(local.estimate(), remote.estimate(), &simulated, mode);

        let now = self.clock.now();
        for (estimator, outcome) in [(&self.local, &local), (&self.remote, &remote)] {
            if let (Some(estimator), Some(message)) = (estimator, outcome.failure_message()) {
                self.emit(HydraEvent::EstimatorFailed {
                    user_id: user_id.to_string(),
                    source: estimator.source().to_string(),
                    message,
                    timestamp: now,
                });
            }
        }

        if let Some(warning) = &fused.low_confidence {
            warn!(
                user_id = %user_id,
                source = %warning.source,
                confidence = warning.confidence,
                "Low confidence estimate"
            );
            self.emit(HydraEvent::LowConfidence {
                user_id: user_id.to_string(),
                confidence: warning.confidence,
                source: warning.source.to_string(),
                message: warning.message.clone(),
                timestamp: now,
            });
        }

        {
            let mut sessions = self.sessions.lock().await;
            let session = sessions
                .get_mut(user_id)
                .filter(|s| s.session_id == ticket.session_id)
                .ok_or(EngineError::CaptureSuperseded)?;
            session.record_capture(ticket, image, fused.clone())?;
        }

        debug!(
            user_id = %user_id,
            mode = ?mode,
            source = %fused.source(),
            water_ml = fused.water_volume_ml(),
            "Capture recorded"
        );

        Ok(CaptureReport {
            session_id: ticket.session_id,
            mode,
            fused,
            local,
            remote,
        })
    }

    async fn run_local(&self, image: &CapturedImage, mode: ScanMode) -> EstimatorOutcome {
        match &self.local {
            Some(estimator) => run_estimator(estimator.as_ref(), image, mode).await,
            None => EstimatorOutcome::Skipped,
        }
    }

    async fn run_remote(&self, image: &CapturedImage, mode: ScanMode) -> EstimatorOutcome {
        match &self.remote {
            Some(estimator) => run_bounded(estimator.as_ref(), image, mode, self.remote_wait).await,
            None => EstimatorOutcome::Skipped,
        }
    }

    async fn register_capture(&self, user_id: &str) -> (u64, CancellationToken) {
        let id = self.next_capture_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let previous = self.in_flight.lock().await.insert(
            user_id.to_string(),
            InFlightCapture {
                id,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            debug!(user_id = %user_id, superseded = previous.id, by = id, "Cancelling in-flight capture");
            previous.token.cancel();
        }
        (id, token)
    }

    async fn release_capture(&self, user_id: &str, capture_id: u64) {
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.get(user_id).map(|c| c.id) == Some(capture_id) {
            in_flight.remove(user_id);
        }
    }

    async fn cancel_capture(&self, user_id: &str) {
        if let Some(capture) = self.in_flight.lock().await.remove(user_id) {
            capture.token.cancel();
        }
    }

    // ------------------------------------------------------------------
    // Confirm / skip
    // ------------------------------------------------------------------

    /// Confirm the current phase
    ///
    /// Initial → Verification, or Verification → entry logged (verified).
    pub async fn confirm(&self, user_id: &str) -> EngineResult<ConfirmResult> {
        let now = self.clock.now();
        let scan = {
            let mut sessions = self.sessions.lock().await;
            let session = sessions
                .get_mut(user_id)
                .ok_or_else(|| EngineError::NoActiveSession(user_id.to_string()))?;

            match session.confirm(now) {
                Ok(ConfirmOutcome::AwaitingVerification) => {
                    let session_id = session.session_id;
                    let prior_estimate = session.prior_estimate().cloned().ok_or_else(|| {
                        EngineError::InvalidSessionState(format!(
                            "session {session_id} lost its prior estimate"
                        ))
                    })?;
                    debug!(user_id = %user_id, session_id = %session_id, "Awaiting verification photo");
                    return Ok(ConfirmResult::AwaitingVerification {
                        session_id,
                        prior_estimate,
                    });
                }
                Ok(ConfirmOutcome::Completed(scan)) => {
                    sessions.remove(user_id);
                    scan
                }
                Err(e) => {
                    if e.discards_session() {
                        sessions.remove(user_id);
                        warn!(user_id = %user_id, error = %e, "Scan session discarded");
                    }
                    return Err(e);
                }
            }
        };

        self.cancel_capture(user_id).await;
        self.finalize(scan, now).await.map(ConfirmResult::Logged)
    }

    /// Skip the empty-bottle photo; logs with `verified = false`
    pub async fn skip_verification(&self, user_id: &str) -> EngineResult<LoggedIntake> {
        let now = self.clock.now();
        let result = {
            let mut sessions = self.sessions.lock().await;
            let session = sessions
                .get_mut(user_id)
                .ok_or_else(|| EngineError::NoActiveSession(user_id.to_string()))?;
            let result = session.skip(now);
            // skip always ends the session, logged or not
            sessions.remove(user_id);
            result
        };

        self.cancel_capture(user_id).await;
        match result {
            Ok(scan) => self.finalize(scan, now).await,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Scan session discarded");
                Err(e)
            }
        }
    }

    async fn finalize(&self, scan: CompletedScan, now: DateTime<Utc>) -> EngineResult<LoggedIntake> {
        let user_id = scan.user_id.as_str();
        let profile = self.require_profile(user_id).await?;
        let pet = match self.repository.get_pet(user_id).await? {
            Some(pet) => pet,
            None => {
                warn!(user_id = %user_id, "No pet stored, creating one");
                PetState::new(user_id, DEFAULT_PET_NAME, now)
            }
        };

        let entry = HydrationEntry::new(
            user_id,
            scan.amount_ml,
            now,
            scan.bottle_type_label.clone(),
            scan.verified,
        );
        let fed = feed_entry(&pet, &entry);
        self.repository.commit_feed(&entry, &fed).await?;

        let today_total_ml = self.today_total_at(user_id, now).await?;
        let overdrink = should_flag(today_total_ml, profile.daily_goal_ml);

        info!(
            user_id = %user_id,
            entry_id = %entry.entry_id,
            amount_ml = entry.amount_ml,
            verified = entry.verified,
            today_total_ml,
            stage = %fed.evolution_stage,
            "Hydration logged"
        );

        self.emit(HydraEvent::EntryLogged {
            user_id: user_id.to_string(),
            entry_id: entry.entry_id,
            amount_ml: entry.amount_ml,
            verified: entry.verified,
            timestamp: now,
        });
        self.emit(HydraEvent::PetUpdated {
            user_id: user_id.to_string(),
            stage: fed.evolution_stage.to_string(),
            level: fed.level,
            experience: fed.experience,
            health: fed.health,
            timestamp: now,
        });
        if overdrink {
            warn!(
                user_id = %user_id,
                today_total_ml,
                daily_goal_ml = profile.daily_goal_ml,
                "Overdrink threshold exceeded"
            );
            self.emit(HydraEvent::OverdrinkFlagged {
                user_id: user_id.to_string(),
                today_total_ml,
                daily_goal_ml: profile.daily_goal_ml,
                timestamp: now,
            });
        }

        Ok(LoggedIntake {
            entry,
            pet: fed,
            today_total_ml,
            daily_goal_ml: profile.daily_goal_ml,
            overdrink,
            prior_estimate: scan.prior_estimate,
        })
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn pet_status(&self, user_id: &str) -> EngineResult<PetStatus> {
        let pet = self
            .repository
            .get_pet(user_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("pet for user {user_id}")))?;
        let current_health = current_health(&pet, self.clock.now());
        Ok(PetStatus {
            pet,
            current_health,
        })
    }

    /// Sum of today's entries (day starts at local midnight)
    pub async fn today_total(&self, user_id: &str) -> EngineResult<u64> {
        self.today_total_at(user_id, self.clock.now()).await
    }

    async fn today_total_at(&self, user_id: &str, now: DateTime<Utc>) -> EngineResult<u64> {
        let (from, to) = self.day_boundary.today(now);
        let entries = self.repository.entries_between(user_id, from, to).await?;
        Ok(total_amount_ml(&entries))
    }

    pub async fn leaderboard(&self) -> EngineResult<Vec<LeaderboardEntry>> {
        Leaderboard::new(self.repository.clone(), self.day_boundary)
            .with_event_bus(self.event_bus.clone())
            .recompute(self.clock.now())
            .await
    }
}
