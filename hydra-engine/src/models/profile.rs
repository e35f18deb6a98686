//! User profile document
//!
//! `daily_goal_ml` is derived: it is recomputed every time the biometrics or
//! the goal policy change and is never set on its own.

use crate::error::EngineResult;
use crate::goal::{compute_daily_goal, GoalPolicy, UserBiometrics};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: String,
    pub biometrics: UserBiometrics,
    /// Formula that produced `daily_goal_ml`
    pub goal_policy: GoalPolicy,
    pub daily_goal_ml: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Validate biometrics and derive the goal
    pub fn new(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        biometrics: UserBiometrics,
        goal_policy: GoalPolicy,
        now: DateTime<Utc>,
    ) -> EngineResult<Self> {
        biometrics.validate()?;
        Ok(Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            daily_goal_ml: compute_daily_goal(&biometrics, goal_policy),
            biometrics,
            goal_policy,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replace biometrics; the profile is untouched if they are invalid
    pub fn update_biometrics(
        &mut self,
        biometrics: UserBiometrics,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        biometrics.validate()?;
        self.biometrics = biometrics;
        self.daily_goal_ml = compute_daily_goal(&self.biometrics, self.goal_policy);
        self.updated_at = now;
        Ok(())
    }

    pub fn set_goal_policy(&mut self, policy: GoalPolicy, now: DateTime<Utc>) {
        self.goal_policy = policy;
        self.daily_goal_ml = compute_daily_goal(&self.biometrics, policy);
        self.updated_at = now;
    }
}
