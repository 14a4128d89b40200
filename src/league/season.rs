//! Season Lifecycle Manager
//!
//! Builds a double round-robin for every registered team, spreads the
//! rounds over the configured season length, and closes a season once its
//! last fixture has been played.
//!
//! Fixtures use the circle method: one team stays fixed while the rest
//! rotate, so every pair meets once per half. An odd roster gets a bye slot.
//! The second half repeats the first with home and away swapped.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::league::config::{LeagueConfig, OddsConfig, OddsRange};
use crate::league::history::{archive_season, recompute_user_stats, ArchiveOutcome};
use crate::models::{HistoricalSeasonRecord, MatchOdds, Season, SeasonStatus};
use crate::store::{LeagueDb, NewMatch};

/// Gap between kick-offs inside one round
pub const ROUND_STAGGER_HOURS: i64 = 2;
/// Offset of the first kick-off of a round from the round's day
const ROUND_START_OFFSET_HOURS: i64 = 12;

/// Pairings per round, `(home, away)`, first half then second half.
pub fn double_round_robin(team_ids: &[i64]) -> Vec<Vec<(i64, i64)>> {
    if team_ids.len() < 2 {
        return Vec::new();
    }

    let mut slots: Vec<Option<i64>> = team_ids.iter().copied().map(Some).collect();
    if slots.len() % 2 == 1 {
        slots.push(None);
    }
    let n = slots.len();

    let mut first_half = Vec::with_capacity(n - 1);
    for round in 0..n - 1 {
        let mut pairs = Vec::with_capacity(n / 2);
        for i in 0..n / 2 {
            if let (Some(a), Some(b)) = (slots[i], slots[n - 1 - i]) {
                // Alternate the fixed team's venue so nobody sits at home all half.
                if i == 0 && round % 2 == 1 {
                    pairs.push((b, a));
                } else {
                    pairs.push((a, b));
                }
            }
        }
        first_half.push(pairs);
        slots[1..].rotate_right(1);
    }

    let second_half: Vec<Vec<(i64, i64)>> = first_half
        .iter()
        .map(|pairs| pairs.iter().map(|&(home, away)| (away, home)).collect())
        .collect();

    first_half.into_iter().chain(second_half).collect()
}

fn draw_price<R: Rng + ?Sized>(range: &OddsRange, rng: &mut R) -> f64 {
    let raw = if range.max > range.min {
        rng.gen_range(range.min..=range.max)
    } else {
        range.min
    };
    (raw * 100.0).round() / 100.0
}

/// Fixture prices, each inside its configured bounds.
pub fn draw_odds<R: Rng + ?Sized>(config: &OddsConfig, rng: &mut R) -> MatchOdds {
    MatchOdds {
        home_win: draw_price(&config.home_win, rng),
        draw: draw_price(&config.draw, rng),
        away_win: draw_price(&config.away_win, rng),
        total_over: draw_price(&config.total_over, rng),
        total_under: draw_price(&config.total_under, rng),
        special_catch: draw_price(&config.special_catch, rng),
    }
}

/// A season ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonPlan {
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub team_ids: Vec<i64>,
    pub fixtures: Vec<NewMatch>,
}

/// Lay out fixtures from `starts_at`. Every kick-off is strictly after it.
pub fn plan_season<R: Rng + ?Sized>(
    name: String,
    team_ids: &[i64],
    config: &LeagueConfig,
    starts_at: DateTime<Utc>,
    rng: &mut R,
) -> SeasonPlan {
    let rounds = double_round_robin(team_ids);
    let length = Duration::days(config.season_length_days);
    let interval = if rounds.is_empty() {
        length
    } else {
        length / rounds.len() as i32
    };
    let offset = Duration::hours(ROUND_START_OFFSET_HOURS);
    let stagger = Duration::hours(ROUND_STAGGER_HOURS);

    let mut fixtures = Vec::new();
    for (round, pairs) in rounds.iter().enumerate() {
        let round_at = starts_at + interval * round as i32 + offset;
        for (slot, &(home, away)) in pairs.iter().enumerate() {
            fixtures.push(NewMatch {
                season_id: 0,
                home_team_id: home,
                away_team_id: away,
                scheduled_at: round_at + stagger * slot as i32,
                odds: draw_odds(&config.odds, rng),
            });
        }
    }

    let last_kickoff = fixtures
        .iter()
        .map(|f| f.scheduled_at)
        .max()
        .unwrap_or(starts_at);
    SeasonPlan {
        name,
        starts_at,
        ends_at: last_kickoff.max(starts_at + length),
        team_ids: team_ids.to_vec(),
        fixtures,
    }
}

/// Persist a planned season and activate it.
pub async fn create_season(db: &LeagueDb, plan: &SeasonPlan) -> Result<Season> {
    let season = db
        .create_season(
            &plan.name,
            &plan.starts_at,
            &plan.ends_at,
            &plan.team_ids,
            &plan.fixtures,
        )
        .await
        .context("create season")?;
    info!(
        season_id = season.id,
        name = %season.name,
        teams = plan.team_ids.len(),
        fixtures = plan.fixtures.len(),
        "Season generated"
    );
    Ok(season)
}

/// Mark the season finished once nothing is left to play, then archive it.
///
/// Also retries the archive for a season that finished earlier but whose
/// archive step failed. Returns the record only when this call wrote it.
pub async fn close_season_if_complete(
    db: &LeagueDb,
    season_id: i64,
    at: &DateTime<Utc>,
) -> Result<Option<HistoricalSeasonRecord>> {
    let newly_finished = db.finish_season_if_complete(season_id).await?;
    if newly_finished {
        info!(season_id, "Season finished");
    } else {
        match db.get_season(season_id).await? {
            Some(season) if season.status == SeasonStatus::Finished => {}
            _ => return Ok(None),
        }
    }

    match archive_season(db, season_id, at).await? {
        ArchiveOutcome::Archived(record) => {
            if let Err(e) = recompute_user_stats(db).await {
                warn!(season_id, "User stats recompute failed: {:#}", e);
            }
            Ok(Some(record))
        }
        ArchiveOutcome::AlreadyArchived => {
            debug!(season_id, "Season already archived");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::{HashMap, HashSet};

    #[test]
    fn test_every_pair_meets_home_and_away() {
        for n in [4usize, 5, 6, 7] {
            let teams: Vec<i64> = (1..=n as i64).collect();
            let rounds = double_round_robin(&teams);
            let slots = if n % 2 == 0 { n } else { n + 1 };
            assert_eq!(rounds.len(), 2 * (slots - 1));

            let fixtures: Vec<(i64, i64)> = rounds.iter().flatten().copied().collect();
            assert_eq!(fixtures.len(), n * (n - 1));
            let unique: HashSet<_> = fixtures.iter().collect();
            assert_eq!(unique.len(), fixtures.len(), "duplicate fixture for n={}", n);

            for round in &rounds {
                let mut seen = HashSet::new();
                for &(h, a) in round {
                    assert_ne!(h, a);
                    assert!(seen.insert(h) && seen.insert(a), "team twice in a round");
                }
            }
        }
    }

    #[test]
    fn test_odd_roster_sits_each_team_out_once_per_half() {
        let rounds = double_round_robin(&[1, 2, 3, 4, 5]);
        let mut byes: HashMap<i64, usize> = HashMap::new();
        for round in &rounds {
            assert_eq!(round.len(), 2);
            let playing: HashSet<i64> = round.iter().flat_map(|&(h, a)| [h, a]).collect();
            for team in 1..=5 {
                if !playing.contains(&team) {
                    *byes.entry(team).or_default() += 1;
                }
            }
        }
        assert!(byes.values().all(|&count| count == 2));
    }

    #[test]
    fn test_odds_stay_in_bounds() {
        let config = OddsConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..500 {
            let odds = draw_odds(&config, &mut rng);
            assert!(odds.home_win >= config.home_win.min && odds.home_win <= config.home_win.max);
            assert!(odds.draw >= config.draw.min && odds.draw <= config.draw.max);
            assert!(
                odds.special_catch >= config.special_catch.min
                    && odds.special_catch <= config.special_catch.max
            );
        }
    }

    #[test]
    fn test_plan_spreads_rounds_over_season() {
        let config = LeagueConfig::default();
        let start = Utc::now();
        let plan = plan_season(
            "Test".into(),
            &[1, 2, 3, 4],
            &config,
            start,
            &mut ChaCha8Rng::seed_from_u64(1),
        );

        assert_eq!(plan.fixtures.len(), 12);
        assert!(plan.fixtures.iter().all(|f| f.scheduled_at > start));
        let last = plan.fixtures.iter().map(|f| f.scheduled_at).max().unwrap();
        assert!(last <= start + Duration::days(config.season_length_days));
        assert!(last > start + Duration::days(config.season_length_days / 2));
        assert!(plan.ends_at >= last);
    }
}
