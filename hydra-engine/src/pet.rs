//! Virtual pet progression
//!
//! Pure state transitions: stage and level are functions of experience,
//! health is reset on feed and decays at read time (1 point per hour since
//! the last feed). Nothing here persists.

use crate::models::HydrationEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Experience at which the level caps at 100
pub const MAX_LEVEL_EXPERIENCE: u64 = 2000;
pub const MAX_LEVEL: u8 = 100;
pub const FULL_HEALTH: u8 = 100;

const MS_PER_HOUR: i64 = 3_600_000;

/// Evolution stage, ordered by experience threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionStage {
    Seed,
    Sprout,
    Plant,
    Flower,
    Droplet,
    Fish,
}

impl EvolutionStage {
    /// All stages, lowest threshold first
    pub const ALL: [EvolutionStage; 6] = [
        EvolutionStage::Seed,
        EvolutionStage::Sprout,
        EvolutionStage::Plant,
        EvolutionStage::Flower,
        EvolutionStage::Droplet,
        EvolutionStage::Fish,
    ];

    /// Minimum experience for this stage (inclusive)
    pub fn threshold(self) -> u64 {
        match self {
            EvolutionStage::Seed => 0,
            EvolutionStage::Sprout => 100,
            EvolutionStage::Plant => 300,
            EvolutionStage::Flower => 600,
            EvolutionStage::Droplet => 1000,
            EvolutionStage::Fish => 1500,
        }
    }

    /// Highest stage whose threshold does not exceed `experience`
    pub fn for_experience(experience: u64) -> Self {
        Self::ALL
            .iter()
            .rev()
            .copied()
            .find(|stage| experience >= stage.threshold())
            .unwrap_or(EvolutionStage::Seed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EvolutionStage::Seed => "seed",
            EvolutionStage::Sprout => "sprout",
            EvolutionStage::Plant => "plant",
            EvolutionStage::Flower => "flower",
            EvolutionStage::Droplet => "droplet",
            EvolutionStage::Fish => "fish",
        }
    }
}

impl fmt::Display for EvolutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted pet document (one per user)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetState {
    pub user_id: String,
    pub name: String,
    pub evolution_stage: EvolutionStage,
    pub level: u8,
    pub experience: u64,
    /// Health at `last_fed_at`; use [`current_health`] for display
    pub health: u8,
    pub last_fed_at: DateTime<Utc>,
    /// Entry that produced the last feed (retry detection)
    #[serde(default)]
    pub last_feed_entry: Option<Uuid>,
}

impl PetState {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            evolution_stage: EvolutionStage::Seed,
            level: 0,
            experience: 0,
            health: FULL_HEALTH,
            last_fed_at: now,
            last_feed_entry: None,
        }
    }
}

/// 10 XP per 100 ml, floored
pub fn experience_for_water(water_ml: u32) -> u64 {
    water_ml as u64 / 10
}

/// Linear in experience, capped at [`MAX_LEVEL`]
pub fn level_for_experience(experience: u64) -> u8 {
    let level = (experience as f64 / MAX_LEVEL_EXPERIENCE as f64 * 100.0).round();
    if level >= MAX_LEVEL as f64 {
        MAX_LEVEL
    } else {
        level as u8
    }
}

/// Feed the pet `water_ml`
pub fn feed(pet: &PetState, water_ml: u32, now: DateTime<Utc>) -> PetState {
    let experience = pet.experience.saturating_add(experience_for_water(water_ml));
    PetState {
        user_id: pet.user_id.clone(),
        name: pet.name.clone(),
        evolution_stage: EvolutionStage::for_experience(experience),
        level: level_for_experience(experience),
        experience,
        health: FULL_HEALTH,
        last_fed_at: now,
        last_feed_entry: pet.last_feed_entry,
    }
}

/// Feed from a committed entry
///
/// Re-applying the entry that produced the last feed returns the pet
/// unchanged, so a retried write cannot double-count.
pub fn feed_entry(pet: &PetState, entry: &HydrationEntry) -> PetState {
    if pet.last_feed_entry == Some(entry.entry_id) {
        return pet.clone();
    }
    let mut fed = feed(pet, entry.amount_ml, entry.timestamp_utc);
    fed.last_feed_entry = Some(entry.entry_id);
    fed
}

/// Health after decay at `now`
pub fn current_health(pet: &PetState, now: DateTime<Utc>) -> u8 {
    let elapsed_ms = (now - pet.last_fed_at).num_milliseconds().max(0);
    let hours = (elapsed_ms / MS_PER_HOUR).min(u8::MAX as i64) as u8;
    pet.health.saturating_sub(hours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pet_with(experience: u64) -> PetState {
        let mut pet = PetState::new("u1", "Bubbles", Utc::now());
        pet.experience = experience;
        pet.evolution_stage = EvolutionStage::for_experience(experience);
        pet.level = level_for_experience(experience);
        pet
    }

    #[test]
    fn test_stage_thresholds_inclusive() {
        assert_eq!(EvolutionStage::for_experience(0), EvolutionStage::Seed);
        assert_eq!(EvolutionStage::for_experience(99), EvolutionStage::Seed);
        assert_eq!(EvolutionStage::for_experience(100), EvolutionStage::Sprout);
        assert_eq!(EvolutionStage::for_experience(300), EvolutionStage::Plant);
        assert_eq!(EvolutionStage::for_experience(600), EvolutionStage::Flower);
        assert_eq!(EvolutionStage::for_experience(1000), EvolutionStage::Droplet);
        assert_eq!(EvolutionStage::for_experience(1499), EvolutionStage::Droplet);
        assert_eq!(EvolutionStage::for_experience(1500), EvolutionStage::Fish);
        assert_eq!(EvolutionStage::for_experience(u64::MAX), EvolutionStage::Fish);
    }

    #[test]
    fn test_stage_monotonic() {
        let mut previous = EvolutionStage::Seed;
        for xp in 0..2500 {
            let stage = EvolutionStage::for_experience(xp);
            assert!(stage >= previous, "stage regressed at {xp}");
            previous = stage;
        }
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(level_for_experience(0), 0);
        assert_eq!(level_for_experience(10), 1);
        assert_eq!(level_for_experience(1000), 50);
        assert_eq!(level_for_experience(2000), 100);
        assert_eq!(level_for_experience(4000), 100);
    }

    #[test]
    fn test_experience_gain_floors() {
        assert_eq!(experience_for_water(500), 50);
        assert_eq!(experience_for_water(99), 9);
        assert_eq!(experience_for_water(5), 0);
    }

    #[test]
    fn test_feed_resets_health_and_grows() {
        let mut pet = pet_with(95);
        pet.health = 12;
        let now = Utc::now();

        let fed = feed(&pet, 50, now);
        assert_eq!(fed.experience, 100);
        assert_eq!(fed.evolution_stage, EvolutionStage::Sprout);
        assert_eq!(fed.health, FULL_HEALTH);
        assert_eq!(fed.last_fed_at, now);
        assert_eq!(fed.name, "Bubbles");
    }

    #[test]
    fn test_feed_zero_keeps_experience() {
        let pet = pet_with(420);
        let fed = feed(&pet, 0, Utc::now());
        assert_eq!(fed.experience, 420);
        assert_eq!(fed.evolution_stage, EvolutionStage::Plant);
    }

    #[test]
    fn test_feed_entry_is_retry_safe() {
        let pet = pet_with(0);
        let entry = HydrationEntry::new("u1", 500, Utc::now(), None, true);

        let once = feed_entry(&pet, &entry);
        let twice = feed_entry(&once, &entry);
        assert_eq!(once.experience, 50);
        assert_eq!(once, twice);

        let other = HydrationEntry::new("u1", 500, Utc::now(), None, true);
        assert_eq!(feed_entry(&twice, &other).experience, 100);
    }

    #[test]
    fn test_health_decays_per_full_hour() {
        let fed_at = Utc::now();
        let pet = PetState::new("u1", "Bubbles", fed_at);

        assert_eq!(current_health(&pet, fed_at), 100);
        assert_eq!(current_health(&pet, fed_at + Duration::minutes(59)), 100);
        assert_eq!(current_health(&pet, fed_at + Duration::minutes(150)), 98);
        assert_eq!(current_health(&pet, fed_at + Duration::hours(100)), 0);
        assert_eq!(current_health(&pet, fed_at + Duration::days(30)), 0);
    }

    #[test]
    fn test_clock_skew_counts_as_no_elapsed_time() {
        let fed_at = Utc::now();
        let pet = PetState::new("u1", "Bubbles", fed_at);
        assert_eq!(current_health(&pet, fed_at - Duration::hours(5)), 100);
    }

    #[test]
    fn test_missing_last_feed_entry_deserializes() {
        let json = serde_json::json!({
            "user_id": "u1",
            "name": "Bubbles",
            "evolution_stage": "plant",
            "level": 20,
            "experience": 400,
            "health": 90,
            "last_fed_at": "2026-01-01T00:00:00Z"
        });
        let pet: PetState = serde_json::from_value(json).unwrap();
        assert_eq!(pet.evolution_stage, EvolutionStage::Plant);
        assert_eq!(pet.last_feed_entry, None);
    }
}
