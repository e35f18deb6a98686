//! Overdrink guard

/// Intake above goal × this factor is flagged
pub const OVERDRINK_FACTOR: f64 = 1.5;

/// True when today's intake strictly exceeds 1.5 × the daily goal
pub fn should_flag(today_total_ml: u64, daily_goal_ml: u32) -> bool {
    today_total_ml as f64 > daily_goal_ml as f64 * OVERDRINK_FACTOR
}
