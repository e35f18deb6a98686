//! Daily hydration goal model
//!
//! Two named formulas are supported and never blended:
//! - [`GoalPolicy::Physiological`] (canonical): water balance from
//!   Mifflin-St Jeor BMR, activity TDEE and Du Bois body surface area
//! - [`GoalPolicy::WeightBased`] (legacy): weight × 35 ml × activity factor
//!
//! Both clamp to [1500, 5000] ml. Inputs are validated by
//! [`UserBiometrics::validate`] before they reach these functions.

use crate::error::{EngineError, EngineResult};
use hydra_common::config::GoalPolicyName;
use serde::{Deserialize, Serialize};

/// Lower goal bound (ml)
pub const MIN_DAILY_GOAL_ML: u32 = 1500;
/// Upper goal bound (ml)
pub const MAX_DAILY_GOAL_ML: u32 = 5000;

const URINE_LOSS_ML: f64 = 1500.0;
const FAECES_LOSS_ML: f64 = 150.0;
const SKIN_EVAPORATION_ML_PER_M2: f64 = 400.0;
const RESPIRATORY_LOSS_FRACTION: f64 = 0.13;
const METABOLIC_GAIN_FRACTION: f64 = 0.13;
const SWEAT_LOSS_FRACTION: f64 = 0.10;
const SEDENTARY_SWEAT_LOSS_ML: f64 = 100.0;
const SEDENTARY_MULTIPLIER: f64 = 1.2;
const WEIGHT_BASED_ML_PER_KG: f64 = 35.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl ActivityLevel {
    /// BMR → TDEE multiplier (physiological policy)
    pub fn tdee_multiplier(self) -> f64 {
        match self {
            ActivityLevel::Low => 1.2,
            ActivityLevel::Moderate => 1.55,
            ActivityLevel::High => 1.725,
            ActivityLevel::VeryHigh => 1.9,
        }
    }

    /// Multiplier for the weight-based policy
    pub fn weight_based_multiplier(self) -> f64 {
        match self {
            ActivityLevel::Low => 1.0,
            ActivityLevel::Moderate => 1.2,
            ActivityLevel::High => 1.5,
            ActivityLevel::VeryHigh => 1.8,
        }
    }
}

/// User biometrics supplied at onboarding
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserBiometrics {
    pub height_cm: f64,
    pub weight_kg: f64,
    pub age_years: u32,
    pub sex: Sex,
    pub activity_level: ActivityLevel,
}

impl UserBiometrics {
    /// Boundary check: height 50–250 cm, weight 20–300 kg, age 1–120
    pub fn validate(&self) -> EngineResult<()> {
        if !(50.0..=250.0).contains(&self.height_cm) {
            return Err(EngineError::InvalidBiometrics(format!(
                "height must be 50-250 cm, got {}",
                self.height_cm
            )));
        }
        if !(20.0..=300.0).contains(&self.weight_kg) {
            return Err(EngineError::InvalidBiometrics(format!(
                "weight must be 20-300 kg, got {}",
                self.weight_kg
            )));
        }
        if !(1..=120).contains(&self.age_years) {
            return Err(EngineError::InvalidBiometrics(format!(
                "age must be 1-120 years, got {}",
                self.age_years
            )));
        }
        Ok(())
    }
}

/// Named goal formula
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalPolicy {
    #[default]
    Physiological,
    WeightBased,
}

impl From<GoalPolicyName> for GoalPolicy {
    fn from(name: GoalPolicyName) -> Self {
        match name {
            GoalPolicyName::Physiological => GoalPolicy::Physiological,
            GoalPolicyName::WeightBased => GoalPolicy::WeightBased,
        }
    }
}

/// Intermediate values of the physiological formula
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaterBalance {
    pub bmr_kcal: f64,
    pub tdee_kcal: f64,
    pub body_surface_area_m2: f64,
    pub total_loss_ml: f64,
    pub total_gain_ml: f64,
}

impl WaterBalance {
    pub fn net_ml(&self) -> f64 {
        self.total_loss_ml - self.total_gain_ml
    }
}

/// Compute the daily goal (ml) with the given policy
pub fn compute_daily_goal(biometrics: &UserBiometrics, policy: GoalPolicy) -> u32 {
    match policy {
        GoalPolicy::Physiological => physiological_goal(biometrics),
        GoalPolicy::WeightBased => weight_based_goal(biometrics),
    }
}

/// Mifflin-St Jeor / Du Bois water balance, clamped
pub fn physiological_goal(biometrics: &UserBiometrics) -> u32 {
    clamp_goal(water_balance(biometrics).net_ml())
}

/// Legacy weight × 35 × activity formula, clamped
pub fn weight_based_goal(biometrics: &UserBiometrics) -> u32 {
    clamp_goal(
        biometrics.weight_kg
            * WEIGHT_BASED_ML_PER_KG
            * biometrics.activity_level.weight_based_multiplier(),
    )
}

/// Daily water loss/gain breakdown
pub fn water_balance(biometrics: &UserBiometrics) -> WaterBalance {
    let UserBiometrics {
        height_cm,
        weight_kg,
        age_years,
        sex,
        activity_level,
    } = *biometrics;

    let sex_offset = match sex {
        Sex::Male => 5.0,
        Sex::Female | Sex::Other => -161.0,
    };
    let bmr = 10.0 * weight_kg + 6.25 * height_cm - 5.0 * age_years as f64 + sex_offset;

    let multiplier = activity_level.tdee_multiplier();
    let tdee = bmr * multiplier;

    let bsa = 0.007184 * weight_kg.powf(0.425) * height_cm.powf(0.725);

    let sweat_loss = if multiplier > SEDENTARY_MULTIPLIER {
        SWEAT_LOSS_FRACTION * tdee
    } else {
        SEDENTARY_SWEAT_LOSS_ML
    };

    let total_loss = URINE_LOSS_ML
        + FAECES_LOSS_ML
        + SKIN_EVAPORATION_ML_PER_M2 * bsa
        + RESPIRATORY_LOSS_FRACTION * tdee
        + sweat_loss;
    let total_gain = METABOLIC_GAIN_FRACTION * tdee;

    WaterBalance {
        bmr_kcal: bmr,
        tdee_kcal: tdee,
        body_surface_area_m2: bsa,
        total_loss_ml: total_loss,
        total_gain_ml: total_gain,
    }
}

fn clamp_goal(raw_ml: f64) -> u32 {
    let rounded = raw_ml.round();
    if rounded.is_nan() || rounded < MIN_DAILY_GOAL_ML as f64 {
        MIN_DAILY_GOAL_ML
    } else if rounded > MAX_DAILY_GOAL_ML as f64 {
        MAX_DAILY_GOAL_ML
    } else {
        rounded as u32
    }
}
