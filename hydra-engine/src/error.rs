//! Error types for hydra-engine
//!
//! Estimator failures are NOT here: they are recoverable and never escape the
//! estimator boundary (see [`crate::types::EstimationError`]). Everything in
//! this enum aborts the caller's action.

use thiserror::Error;

/// Engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    /// Session cannot proceed (e.g. finalising without a prior estimate).
    /// Fatal to the session: it is discarded and nothing is logged.
    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),

    /// Transition refused but the session is still usable
    #[error("Transition rejected: {0}")]
    TransitionRejected(String),

    /// No scan session open for this user
    #[error("No active scan session for user {0}")]
    NoActiveSession(String),

    /// A newer capture replaced this one before it finished
    #[error("Capture superseded by a newer capture")]
    CaptureSuperseded,

    /// Biometrics outside the accepted input ranges
    #[error("Invalid biometrics: {0}")]
    InvalidBiometrics(String),

    /// Requested document not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// hydra-common error (store, serialization, config)
    #[error(transparent)]
    Common(#[from] hydra_common::Error),
}

impl EngineError {
    /// Whether the scan session must be thrown away after this error
    pub fn discards_session(&self) -> bool {
        matches!(self, EngineError::InvalidSessionState(_))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Common(hydra_common::Error::Serialization(err))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Common(hydra_common::Error::Database(err))
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
