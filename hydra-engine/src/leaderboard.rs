//! Leaderboard ranking
//!
//! Entries are always rebuilt from stored profiles, today's hydration entries
//! and pet states; nothing here is persisted. [`Leaderboard::recompute`] is
//! the pull contract, the `LeaderboardRecomputed` event the optional push.

use crate::db::HydrationRepository;
use crate::error::EngineResult;
use crate::models::{total_amount_ml, UserProfile};
use crate::pet::current_health;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use hydra_common::events::{EventBus, HydraEvent};
use hydra_common::time::DayBoundary;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Profiles read concurrently during a recompute
const PROFILE_CONCURRENCY: usize = 4;

/// One user's input to a ranking pass
#[derive(Debug, Clone, PartialEq)]
pub struct RankingInput {
    pub user_id: String,
    pub display_name: String,
    pub total_hydration_today_ml: u64,
    pub daily_goal_ml: u32,
    pub pet_health: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub display_name: String,
    pub total_hydration_today_ml: u64,
    /// May exceed 100
    pub percentage_of_goal: u32,
    pub pet_health: u8,
    /// 1-based
    pub rank: u32,
}

/// round(total / goal × 100), 0 for a zero goal
pub fn percentage_of_goal(total_ml: u64, goal_ml: u32) -> u32 {
    if goal_ml == 0 {
        return 0;
    }
    let pct = (total_ml as f64 / goal_ml as f64 * 100.0).round();
    if pct >= u32::MAX as f64 {
        u32::MAX
    } else {
        pct.max(0.0) as u32
    }
}

/// Sort descending by today's total and assign ranks
///
/// Stable: tied users keep their input order.
pub fn rank(rows: &[RankingInput]) -> Vec<LeaderboardEntry> {
    let mut sorted: Vec<&RankingInput> = rows.iter().collect();
    sorted.sort_by(|a, b| b.total_hydration_today_ml.cmp(&a.total_hydration_today_ml));

    sorted
        .into_iter()
        .enumerate()
        .map(|(idx, row)| LeaderboardEntry {
            user_id: row.user_id.clone(),
            display_name: row.display_name.clone(),
            total_hydration_today_ml: row.total_hydration_today_ml,
            percentage_of_goal: percentage_of_goal(row.total_hydration_today_ml, row.daily_goal_ml),
            pet_health: row.pet_health,
            rank: idx as u32 + 1,
        })
        .collect()
}

/// Pull-based leaderboard over the repository
pub struct Leaderboard {
    repository: HydrationRepository,
    day_boundary: DayBoundary,
    event_bus: Option<EventBus>,
}

impl Leaderboard {
    pub fn new(repository: HydrationRepository, day_boundary: DayBoundary) -> Self {
        Self {
            repository,
            day_boundary,
            event_bus: None,
        }
    }

    /// Publish a `LeaderboardRecomputed` event after each pass
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Rebuild the ranking as of `now`
    ///
    /// Eventually consistent: concurrent writers may not be reflected.
    pub async fn recompute(&self, now: DateTime<Utc>) -> EngineResult<Vec<LeaderboardEntry>> {
        let (from, to) = self.day_boundary.today(now);
        let profiles = self.repository.list_profiles().await?;

        // buffered keeps profile order, so ties rank stably
        let rows: Vec<RankingInput> = stream::iter(profiles)
            .map(|profile| self.ranking_input(profile, from, to, now))
            .buffered(PROFILE_CONCURRENCY)
            .try_collect()
            .await?;

        let ranking = rank(&rows);
        debug!(users = ranking.len(), "Leaderboard recomputed");

        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(HydraEvent::LeaderboardRecomputed {
                ranking: ranking.iter().map(|e| e.user_id.clone()).collect(),
                timestamp: now,
            });
        }

        Ok(ranking)
    }

    async fn ranking_input(
        &self,
        profile: UserProfile,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> EngineResult<RankingInput> {
        let entries = self
            .repository
            .entries_between(&profile.user_id, from, to)
            .await?;
        let pet_health = self
            .repository
            .get_pet(&profile.user_id)
            .await?
            .map_or(0, |pet| current_health(&pet, now));

        Ok(RankingInput {
            total_hydration_today_ml: total_amount_ml(&entries),
            user_id: profile.user_id,
            display_name: profile.display_name,
            daily_goal_ml: profile.daily_goal_ml,
            pet_health,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(user_id: &str, total: u64, goal: u32) -> RankingInput {
        RankingInput {
            user_id: user_id.to_string(),
            display_name: user_id.to_uppercase(),
            total_hydration_today_ml: total,
            daily_goal_ml: goal,
            pet_health: 100,
        }
    }

    #[test]
    fn test_rank_descending_with_stable_ties() {
        let rows = vec![row("a", 500, 2000), row("b", 1500, 2000), row("c", 500, 2000), row("d", 0, 2000)];
        let ranked = rank(&rows);
        let order: Vec<&str> = ranked.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c", "d"]);
        let ranks: Vec<u32> = ranked.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_rank_is_idempotent() {
        let rows = vec![row("a", 700, 2000), row("b", 700, 2500), row("c", 900, 3000)];
        assert_eq!(rank(&rows), rank(&rows));
    }

    #[test]
    fn test_percentage_not_capped() {
        assert_eq!(percentage_of_goal(5000, 2500), 200);
        assert_eq!(percentage_of_goal(1250, 2500), 50);
        assert_eq!(percentage_of_goal(1, 3000), 0);
        assert_eq!(percentage_of_goal(100, 0), 0);
    }

    #[test]
    fn test_rank_empty() {
        assert!(rank(&[]).is_empty());
    }
}
