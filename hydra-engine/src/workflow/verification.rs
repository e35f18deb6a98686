//! Two-phase scan session state machine
//!
//! Initial (full bottle) → Verification (emptied bottle) → Completed.
//! The Initial estimate is the amount; the Verification photo is evidence
//! only. Captures carry a ticket so a late result from a superseded capture
//! can never overwrite a newer one.

use crate::error::{EngineError, EngineResult};
use crate::fusion::FusedEstimate;
use crate::types::{CapturedImage, ScanMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Initial,
    Verification,
    /// Terminal
    Completed,
}

impl ScanPhase {
    /// Capture mode for this phase (`None` once completed)
    pub fn mode(self) -> Option<ScanMode> {
        match self {
            ScanPhase::Initial => Some(ScanMode::Initial),
            ScanPhase::Verification => Some(ScanMode::Verification),
            ScanPhase::Completed => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub session_id: Uuid,
    pub old_phase: ScanPhase,
    pub new_phase: ScanPhase,
    pub transitioned_at: DateTime<Utc>,
}

/// Issued by [`ScanSession::begin_capture`]; only the latest ticket of the
/// current phase is accepted by [`ScanSession::record_capture`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTicket {
    pub session_id: Uuid,
    pub generation: u64,
    pub mode: ScanMode,
}

/// Result of a finished session, ready to become a hydration entry
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedScan {
    pub session_id: Uuid,
    pub user_id: String,
    /// Rounded water volume of the prior (Initial) estimate
    pub amount_ml: u32,
    pub verified: bool,
    pub bottle_type_label: Option<String>,
    pub prior_estimate: FusedEstimate,
    /// Last Verification-phase estimate, if one was captured
    pub verification_estimate: Option<FusedEstimate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    /// Initial confirmed; waiting for the empty-bottle photo
    AwaitingVerification,
    Completed(CompletedScan),
}

#[derive(Debug, Clone)]
pub struct ScanSession {
    pub session_id: Uuid,
    pub user_id: String,
    phase: ScanPhase,
    captured_image: Option<CapturedImage>,
    fused_estimate: Option<FusedEstimate>,
    prior_estimate: Option<FusedEstimate>,
    prior_bottle_type: Option<String>,
    capture_generation: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ScanSession {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id: user_id.into(),
            phase: ScanPhase::Initial,
            captured_image: None,
            fused_estimate: None,
            prior_estimate: None,
            prior_bottle_type: None,
            capture_generation: 0,
            started_at: now,
            ended_at: None,
        }
    }

    /// Session entered directly in Verification (e.g. restored after restart)
    pub fn resume_verification(
        user_id: impl Into<String>,
        prior_estimate: Option<FusedEstimate>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut session = Self::new(user_id, now);
        session.phase = ScanPhase::Verification;
        session.prior_estimate = prior_estimate;
        session
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    pub fn is_terminal(&self) -> bool {
        self.phase == ScanPhase::Completed
    }

    /// Estimate of the current phase's latest capture
    pub fn fused_estimate(&self) -> Option<&FusedEstimate> {
        self.fused_estimate.as_ref()
    }

    pub fn prior_estimate(&self) -> Option<&FusedEstimate> {
        self.prior_estimate.as_ref()
    }

    pub fn captured_image(&self) -> Option<&CapturedImage> {
        self.captured_image.as_ref()
    }

    pub fn capture_generation(&self) -> u64 {
        self.capture_generation
    }

    fn completed_error(&self) -> EngineError {
        EngineError::InvalidSessionState(format!("session {} is already completed", self.session_id))
    }

    fn current_mode(&self) -> EngineResult<ScanMode> {
        self.phase.mode().ok_or_else(|| self.completed_error())
    }

    pub fn mode(&self) -> EngineResult<ScanMode> {
        self.current_mode()
    }

    /// Start a capture, superseding any capture still in progress
    pub fn begin_capture(&mut self) -> EngineResult<CaptureTicket> {
        let mode = self.current_mode()?;
        self.capture_generation += 1;
        Ok(CaptureTicket {
            session_id: self.session_id,
            generation: self.capture_generation,
            mode,
        })
    }

    /// Store a capture's fused estimate, replacing this phase's previous one
    pub fn record_capture(
        &mut self,
        ticket: CaptureTicket,
        image: CapturedImage,
        fused: FusedEstimate,
    ) -> EngineResult<()> {
        let mode = self.current_mode()?;
        if ticket.session_id != self.session_id
            || ticket.generation != self.capture_generation
            || ticket.mode != mode
        {
            debug!(
                session_id = %self.session_id,
                ticket_generation = ticket.generation,
                current_generation = self.capture_generation,
                "Discarding stale capture"
            );
            return Err(EngineError::CaptureSuperseded);
        }

        self.captured_image = Some(image);
        self.fused_estimate = Some(fused);
        Ok(())
    }

    /// Initial → Verification, or Verification → Completed (verified)
    pub fn confirm(&mut self, now: DateTime<Utc>) -> EngineResult<ConfirmOutcome> {
        match self.phase {
            ScanPhase::Initial => {
                let water_ml = match &self.fused_estimate {
                    Some(fused) => fused.water_volume_ml(),
                    None => {
                        return Err(EngineError::TransitionRejected(
                            "no estimate captured yet".to_string(),
                        ))
                    }
                };
                if water_ml <= 0.0 {
                    return Err(EngineError::TransitionRejected(
                        "bottle appears empty; capture a filled bottle first".to_string(),
                    ));
                }

                self.prior_estimate = self.fused_estimate.take();
                self.prior_bottle_type = self
                    .captured_image
                    .take()
                    .and_then(|image| image.bottle_type_label);
                // in-flight Initial captures must not land in Verification
                self.capture_generation += 1;
                self.transition_to(ScanPhase::Verification, now);
                Ok(ConfirmOutcome::AwaitingVerification)
            }
            ScanPhase::Verification => self.finalize(true, now).map(ConfirmOutcome::Completed),
            ScanPhase::Completed => Err(self.completed_error()),
        }
    }

    /// User bypass of verification; completes with `verified = false`
    ///
    /// From Initial the current estimate becomes the prior.
    pub fn skip(&mut self, now: DateTime<Utc>) -> EngineResult<CompletedScan> {
        match self.phase {
            ScanPhase::Initial => {
                self.prior_estimate = self.fused_estimate.take();
                self.prior_bottle_type = self
                    .captured_image
                    .take()
                    .and_then(|image| image.bottle_type_label);
                self.finalize(false, now)
            }
            ScanPhase::Verification => self.finalize(false, now),
            ScanPhase::Completed => Err(self.completed_error()),
        }
    }

    fn finalize(&mut self, verified: bool, now: DateTime<Utc>) -> EngineResult<CompletedScan> {
        let verification_estimate = match self.phase {
            ScanPhase::Verification => self.fused_estimate.take(),
            _ => None,
        };
        self.transition_to(ScanPhase::Completed, now);

        let prior = self.prior_estimate.take().ok_or_else(|| {
            EngineError::InvalidSessionState(format!(
                "session {} has no prior estimate to log",
                self.session_id
            ))
        })?;

        Ok(CompletedScan {
            session_id: self.session_id,
            user_id: self.user_id.clone(),
            amount_ml: prior.water_amount_ml(),
            verified,
            bottle_type_label: self.prior_bottle_type.take(),
            prior_estimate: prior,
            verification_estimate,
        })
    }

    fn transition_to(&mut self, new_phase: ScanPhase, now: DateTime<Utc>) -> PhaseTransition {
        let transition = PhaseTransition {
            session_id: self.session_id,
            old_phase: self.phase,
            new_phase,
            transitioned_at: now,
        };
        self.phase = new_phase;
        if new_phase == ScanPhase::Completed {
            self.ended_at = Some(now);
            self.captured_image = None;
        }
        debug!(
            session_id = %self.session_id,
            from = ?transition.old_phase,
            to = ?transition.new_phase,
            "Scan session transition"
        );
        transition
    }
}
