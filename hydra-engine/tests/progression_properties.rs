//! Property-style checks over the pure progression functions
//!
//! Inputs come from a seeded RNG so failures are reproducible.

use chrono::{Duration, TimeZone, Utc};
use hydra_engine::goal::{MAX_DAILY_GOAL_ML, MIN_DAILY_GOAL_ML};
use hydra_engine::pet::{experience_for_water, level_for_experience};
use hydra_engine::{
    compute_daily_goal, current_health, feed, fuse, rank, should_flag, ActivityLevel,
    BottleEstimate, EstimateSource, EvolutionStage, GoalPolicy, PetState, RankingInput, ScanMode,
    Sex, UserBiometrics,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const CASES: usize = 500;

const ACTIVITY_LEVELS: [ActivityLevel; 4] = [
    ActivityLevel::Low,
    ActivityLevel::Moderate,
    ActivityLevel::High,
    ActivityLevel::VeryHigh,
];

fn random_biometrics(rng: &mut StdRng) -> UserBiometrics {
    UserBiometrics {
        height_cm: rng.gen_range(50.0..=250.0),
        weight_kg: rng.gen_range(20.0..=300.0),
        age_years: rng.gen_range(1..=120),
        sex: [Sex::Male, Sex::Female, Sex::Other][rng.gen_range(0..3)],
        activity_level: ACTIVITY_LEVELS[rng.gen_range(0..4)],
    }
}

#[test]
fn goal_is_pure_and_bounded() {
    let mut rng = StdRng::seed_from_u64(0x4859_4452);
    for _ in 0..CASES {
        let biometrics = random_biometrics(&mut rng);
        assert!(biometrics.validate().is_ok());
        for policy in [GoalPolicy::Physiological, GoalPolicy::WeightBased] {
            let goal = compute_daily_goal(&biometrics, policy);
            assert_eq!(goal, compute_daily_goal(&biometrics, policy));
            assert!(
                (MIN_DAILY_GOAL_ML..=MAX_DAILY_GOAL_ML).contains(&goal),
                "{goal} out of bounds for {biometrics:?} ({policy:?})"
            );
        }
    }
}

#[test]
fn goal_does_not_drop_with_weight() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..CASES {
        let lighter = random_biometrics(&mut rng);
        let heavier = UserBiometrics {
            weight_kg: (lighter.weight_kg + rng.gen_range(0.0..50.0)).min(300.0),
            ..lighter
        };
        for policy in [GoalPolicy::Physiological, GoalPolicy::WeightBased] {
            assert!(compute_daily_goal(&heavier, policy) >= compute_daily_goal(&lighter, policy));
        }
    }
}

#[test]
fn feeding_never_regresses_the_pet() {
    let mut rng = StdRng::seed_from_u64(42);
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
    let mut pet = PetState::new("ada", "Bubbles", start);
    let mut now = start;

    for _ in 0..CASES {
        let water_ml = rng.gen_range(0..=2_000u32);
        now += Duration::minutes(rng.gen_range(0..600));
        let fed = feed(&pet, water_ml, now);

        assert_eq!(fed.experience, pet.experience + experience_for_water(water_ml));
        assert!(fed.evolution_stage >= pet.evolution_stage);
        assert!(fed.level >= pet.level);
        assert!(fed.level <= 100);
        assert_eq!(fed.level, level_for_experience(fed.experience));
        assert_eq!(fed.evolution_stage, EvolutionStage::for_experience(fed.experience));
        assert_eq!(fed.health, 100);
        assert_eq!(fed.last_fed_at, now);
        pet = fed;
    }
}

#[test]
fn health_decays_monotonically() {
    let fed_at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
    let pet = PetState::new("ada", "Bubbles", fed_at);

    let mut previous = current_health(&pet, fed_at);
    assert_eq!(previous, 100);
    for minutes in (0..=200 * 60).step_by(17) {
        let health = current_health(&pet, fed_at + Duration::minutes(minutes));
        assert!(health <= previous);
        assert_eq!(health as i64, (100 - minutes / 60).max(0));
        previous = health;
    }
    assert_eq!(current_health(&pet, fed_at - Duration::hours(3)), 100);
}

#[test]
fn ranking_is_sorted_dense_and_idempotent() {
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..50 {
        let rows: Vec<RankingInput> = (0..rng.gen_range(0..20))
            .map(|i| RankingInput {
                user_id: format!("user-{i}"),
                display_name: format!("User {i}"),
                total_hydration_today_ml: rng.gen_range(0..5u64) * 500,
                daily_goal_ml: rng.gen_range(1500..=5000),
                pet_health: rng.gen_range(0..=100),
            })
            .collect();

        let ranked = rank(&rows);
        assert_eq!(ranked.len(), rows.len());
        assert_eq!(rank(&rows), ranked);

        for (idx, entry) in ranked.iter().enumerate() {
            assert_eq!(entry.rank as usize, idx + 1);
        }
        for pair in ranked.windows(2) {
            assert!(pair[0].total_hydration_today_ml >= pair[1].total_hydration_today_ml);
            if pair[0].total_hydration_today_ml == pair[1].total_hydration_today_ml {
                let position = |id: &str| rows.iter().position(|r| r.user_id == id).unwrap();
                assert!(position(&pair[0].user_id) < position(&pair[1].user_id), "ties keep input order");
            }
        }
    }
}

#[test]
fn overdrink_threshold_is_strict() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..CASES {
        let goal = rng.gen_range(1500..=5000u32);
        let limit = goal as f64 * 1.5;
        let total = rng.gen_range(0..10_000u64);
        assert_eq!(should_flag(total, goal), total as f64 > limit);
    }
    assert!(!should_flag(3750, 2500));
    assert!(should_flag(3751, 2500));
}

#[test]
fn fusion_always_picks_a_candidate() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..CASES {
        let local = rng
            .gen_bool(0.5)
            .then(|| BottleEstimate::new(EstimateSource::LocalModel, 1000.0, 400.0, rng.gen()));
        let remote = rng
            .gen_bool(0.5)
            .then(|| BottleEstimate::new(EstimateSource::RemoteVision, 1000.0, 600.0, rng.gen()));
        let simulated = BottleEstimate::new(EstimateSource::Simulated, 1000.0, 500.0, 0.6);

        let fused = fuse(local.as_ref(), remote.as_ref(), &simulated, ScanMode::Initial);

        let expected = match (&local, &remote) {
            (_, Some(r)) if r.confidence > 0.5 => EstimateSource::RemoteVision,
            (Some(_), _) => EstimateSource::LocalModel,
            _ => EstimateSource::Simulated,
        };
        assert_eq!(fused.source(), expected);
        assert_eq!(fused.low_confidence.is_some(), fused.confidence() < 0.5);
    }
}
