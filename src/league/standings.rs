//! Standings Recalculator
//!
//! League table for one season, rebuilt from that season's finished matches
//! and swapped in as a whole.

use anyhow::{Context, Result};
use std::collections::HashMap;
use tracing::debug;

use crate::models::{Match, MatchStatus, StandingsRow};
use crate::store::LeagueDb;

pub const POINTS_PER_WIN: u32 = 3;
pub const POINTS_PER_DRAW: u32 = 1;

fn credit(row: &mut StandingsRow, scored: u32, conceded: u32) {
    row.played += 1;
    row.points_for += scored;
    row.points_against += conceded;
    match scored.cmp(&conceded) {
        std::cmp::Ordering::Greater => row.won += 1,
        std::cmp::Ordering::Less => row.lost += 1,
        std::cmp::Ordering::Equal => row.drawn += 1,
    }
}

/// Build the ordered table. Every enrolled team gets a row, played or not.
///
/// Order: points, then goal difference, then points scored, all descending;
/// team id ascending settles anything left.
pub fn compute_standings(season_id: i64, team_ids: &[i64], matches: &[Match]) -> Vec<StandingsRow> {
    let mut rows: HashMap<i64, StandingsRow> = team_ids
        .iter()
        .map(|&team_id| {
            (
                team_id,
                StandingsRow {
                    season_id,
                    team_id,
                    ..Default::default()
                },
            )
        })
        .collect();

    for m in matches.iter().filter(|m| m.status == MatchStatus::Finished) {
        if let Some(home) = rows.get_mut(&m.home_team_id) {
            credit(home, m.home_score, m.away_score);
        }
        if let Some(away) = rows.get_mut(&m.away_team_id) {
            credit(away, m.away_score, m.home_score);
        }
    }

    let mut table: Vec<StandingsRow> = rows
        .into_values()
        .map(|mut row| {
            row.points = POINTS_PER_WIN * row.won + POINTS_PER_DRAW * row.drawn;
            row.goal_difference = row.points_for as i64 - row.points_against as i64;
            row
        })
        .collect();

    table.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then(b.goal_difference.cmp(&a.goal_difference))
            .then(b.points_for.cmp(&a.points_for))
            .then(a.team_id.cmp(&b.team_id))
    });
    for (idx, row) in table.iter_mut().enumerate() {
        row.position = idx as u32 + 1;
    }
    table
}

/// Recompute and persist a season's table.
pub async fn recompute_standings(db: &LeagueDb, season_id: i64) -> Result<Vec<StandingsRow>> {
    let team_ids = db
        .season_team_ids(season_id)
        .await
        .context("load season roster")?;
    let finished = db
        .list_season_matches(season_id, Some(MatchStatus::Finished))
        .await
        .context("load finished matches")?;

    let table = compute_standings(season_id, &team_ids, &finished);
    db.replace_standings(season_id, &table)
        .await
        .context("replace standings")?;

    debug!(
        season_id,
        teams = table.len(),
        matches = finished.len(),
        "Standings recomputed"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchOdds;
    use chrono::Utc;

    fn finished(id: i64, home: i64, away: i64, hs: u32, aws: u32) -> Match {
        Match {
            id,
            season_id: 1,
            home_team_id: home,
            away_team_id: away,
            scheduled_at: Utc::now(),
            status: MatchStatus::Finished,
            home_score: hs,
            away_score: aws,
            special_catch: false,
            catcher: None,
            duration_minutes: 120,
            consolidated: true,
            odds: MatchOdds::default(),
        }
    }

    #[test]
    fn test_points_are_three_per_win_one_per_draw() {
        let matches = vec![
            finished(1, 1, 2, 200, 100),
            finished(2, 2, 3, 50, 50),
            finished(3, 3, 1, 170, 160),
        ];
        let table = compute_standings(1, &[1, 2, 3], &matches);
        for row in &table {
            assert_eq!(row.points, 3 * row.won + row.drawn);
            assert_eq!(row.played, row.won + row.lost + row.drawn);
        }
        let positions: Vec<u32> = table.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[test]
    fn test_tie_breaks_goal_difference_then_scored() {
        // 1 and 2 both win once; 1 by a wider margin.
        let matches = vec![finished(1, 1, 3, 300, 100), finished(2, 2, 4, 200, 150)];
        let table = compute_standings(1, &[1, 2, 3, 4], &matches);
        assert_eq!(table[0].team_id, 1);
        assert_eq!(table[1].team_id, 2);

        // Same points and difference: more scored ranks higher.
        let matches = vec![finished(1, 1, 3, 150, 100), finished(2, 2, 4, 250, 200)];
        let table = compute_standings(1, &[1, 2, 3, 4], &matches);
        assert_eq!(table[0].team_id, 2);
        assert_eq!(table[0].goal_difference, 50);
    }

    #[test]
    fn test_unplayed_and_unfinished_are_zero_rows() {
        let mut pending = finished(1, 1, 2, 0, 0);
        pending.status = MatchStatus::Scheduled;
        let table = compute_standings(1, &[2, 1], &[pending]);
        assert_eq!(table.len(), 2);
        assert!(table.iter().all(|r| r.played == 0 && r.points == 0));
        assert_eq!(table[0].team_id, 1);
    }
}
