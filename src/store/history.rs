use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{to_millis, ts_col, u32_col, LeagueDb};
use crate::models::{HistoricalSeasonRecord, HistoricalTeamStats, HistoricalUserStats};

/// Wager money attributed to a season through each wager's primary match
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SeasonWagerTotals {
    pub wager_count: u32,
    /// Stake of every won or lost wager
    pub resolved_stake: f64,
    pub won_payout: f64,
}

/// One team's contribution to the all-time table for a single season
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamSeasonLine {
    pub team_id: i64,
    pub won: u32,
    pub lost: u32,
    pub drawn: u32,
    pub points_for: u32,
    pub points_against: u32,
    pub position: u32,
}

/// Everything written when a season is archived
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivePlan {
    pub season_id: i64,
    pub season_name: String,
    pub team_count: u32,
    pub match_count: u32,
    pub wager_count: u32,
    pub forecast_count: u32,
    pub revenue: f64,
    pub champion_team_id: Option<i64>,
    pub archived_at: DateTime<Utc>,
    pub teams: Vec<TeamSeasonLine>,
}

/// Raw per-user totals across every wager and forecast
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserActivity {
    pub user_id: i64,
    pub wagers_placed: u32,
    pub wagers_won: u32,
    pub wagers_lost: u32,
    pub total_staked: f64,
    pub resolved_staked: f64,
    pub total_paid_out: f64,
    pub forecasts_made: u32,
    pub forecasts_correct: u32,
    pub forecast_points: u32,
}

fn season_record_from_row(row: &Row<'_>) -> rusqlite::Result<HistoricalSeasonRecord> {
    Ok(HistoricalSeasonRecord {
        id: row.get(0)?,
        season_id: row.get(1)?,
        season_name: row.get(2)?,
        team_count: u32_col(row, 3)?,
        match_count: u32_col(row, 4)?,
        wager_count: u32_col(row, 5)?,
        forecast_count: u32_col(row, 6)?,
        revenue: row.get(7)?,
        champion_team_id: row.get(8)?,
        archived_at: ts_col(row, 9)?,
    })
}

const SEASON_RECORD_COLUMNS: &str = "id, season_id, season_name, team_count, match_count, \
    wager_count, forecast_count, revenue, champion_team_id, archived_at";

impl LeagueDb {
    pub async fn is_season_archived(&self, season_id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        let found: Option<i64> = conn
            .prepare_cached("SELECT id FROM historical_seasons WHERE season_id = ?1")?
            .query_row([season_id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    pub async fn season_wager_totals(&self, season_id: i64) -> Result<SeasonWagerTotals> {
        let conn = self.conn.lock().await;
        let totals = conn
            .prepare_cached(
                "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN w.status IN ('won', 'lost') THEN w.stake END), 0.0),
                    COALESCE(SUM(CASE WHEN w.status = 'won' THEN w.potential_payout END), 0.0)
                 FROM wagers w JOIN matches m ON m.id = w.match_id
                 WHERE m.season_id = ?1",
            )?
            .query_row([season_id], |row| {
                Ok(SeasonWagerTotals {
                    wager_count: u32_col(row, 0)?,
                    resolved_stake: row.get(1)?,
                    won_payout: row.get(2)?,
                })
            })?;
        Ok(totals)
    }

    pub async fn count_season_forecasts(&self, season_id: i64) -> Result<u32> {
        let conn = self.conn.lock().await;
        let n: i64 = conn
            .prepare_cached(
                "SELECT COUNT(*) FROM forecasts f JOIN matches m ON m.id = f.match_id
                 WHERE m.season_id = ?1",
            )?
            .query_row([season_id], |row| row.get(0))?;
        Ok(n.max(0) as u32)
    }

    /// Write the season record and fold team lines into the all-time table.
    ///
    /// `season_id` is unique in `historical_seasons`; if a record already
    /// exists nothing is written and `None` is returned.
    pub async fn write_archive(&self, plan: &ArchivePlan) -> Result<Option<HistoricalSeasonRecord>> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO historical_seasons
                (season_id, season_name, team_count, match_count, wager_count, forecast_count,
                 revenue, champion_team_id, archived_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                plan.season_id,
                &plan.season_name,
                plan.team_count,
                plan.match_count,
                plan.wager_count,
                plan.forecast_count,
                plan.revenue,
                plan.champion_team_id,
                to_millis(&plan.archived_at),
            ],
        )?;
        if inserted == 0 {
            return Ok(None);
        }

        {
            let mut fold = tx.prepare_cached(
                "INSERT INTO historical_team_stats
                    (team_id, seasons_played, wins, losses, draws, points_for, points_against,
                     championships, best_position, worst_position)
                 VALUES (?1, 1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                 ON CONFLICT(team_id) DO UPDATE SET
                    seasons_played = seasons_played + 1,
                    wins = wins + excluded.wins,
                    losses = losses + excluded.losses,
                    draws = draws + excluded.draws,
                    points_for = points_for + excluded.points_for,
                    points_against = points_against + excluded.points_against,
                    championships = championships + excluded.championships,
                    best_position = MIN(COALESCE(best_position, excluded.best_position), excluded.best_position),
                    worst_position = MAX(COALESCE(worst_position, excluded.worst_position), excluded.worst_position)",
            )?;
            for line in &plan.teams {
                fold.execute(params![
                    line.team_id,
                    line.won,
                    line.lost,
                    line.drawn,
                    line.points_for,
                    line.points_against,
                    (line.position == 1) as i64,
                    line.position,
                ])?;
            }
        }

        let record = tx
            .prepare_cached(&format!(
                "SELECT {} FROM historical_seasons WHERE season_id = ?1",
                SEASON_RECORD_COLUMNS
            ))?
            .query_row([plan.season_id], season_record_from_row)?;
        tx.commit().context("commit season archive")?;
        Ok(Some(record))
    }

    pub async fn list_historical_seasons(&self) -> Result<Vec<HistoricalSeasonRecord>> {
        let conn = self.conn.lock().await;
        let records = conn
            .prepare_cached(&format!(
                "SELECT {} FROM historical_seasons ORDER BY season_id ASC",
                SEASON_RECORD_COLUMNS
            ))?
            .query_map([], season_record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub async fn get_team_history(&self, team_id: i64) -> Result<Option<HistoricalTeamStats>> {
        let conn = self.conn.lock().await;
        let stats = conn
            .prepare_cached(
                "SELECT team_id, seasons_played, wins, losses, draws, points_for, points_against,
                        championships, best_position, worst_position
                 FROM historical_team_stats WHERE team_id = ?1",
            )?
            .query_row([team_id], |row| {
                Ok(HistoricalTeamStats {
                    team_id: row.get(0)?,
                    seasons_played: u32_col(row, 1)?,
                    wins: u32_col(row, 2)?,
                    losses: u32_col(row, 3)?,
                    draws: u32_col(row, 4)?,
                    points_for: u32_col(row, 5)?,
                    points_against: u32_col(row, 6)?,
                    championships: u32_col(row, 7)?,
                    best_position: row.get::<_, Option<i64>>(8)?.map(|p| p as u32),
                    worst_position: row.get::<_, Option<i64>>(9)?.map(|p| p as u32),
                })
            })
            .optional()?;
        Ok(stats)
    }

    /// Totals for every registered user. Cancelled wagers are ignored.
    pub async fn user_activity(&self) -> Result<Vec<UserActivity>> {
        let conn = self.conn.lock().await;
        let activity = conn
            .prepare_cached(
                "SELECT u.id,
                    (SELECT COUNT(*) FROM wagers w WHERE w.user_id = u.id AND w.status != 'cancelled'),
                    (SELECT COUNT(*) FROM wagers w WHERE w.user_id = u.id AND w.status = 'won'),
                    (SELECT COUNT(*) FROM wagers w WHERE w.user_id = u.id AND w.status = 'lost'),
                    (SELECT COALESCE(SUM(w.stake), 0.0) FROM wagers w
                        WHERE w.user_id = u.id AND w.status != 'cancelled'),
                    (SELECT COALESCE(SUM(w.stake), 0.0) FROM wagers w
                        WHERE w.user_id = u.id AND w.status IN ('won', 'lost')),
                    (SELECT COALESCE(SUM(w.potential_payout), 0.0) FROM wagers w
                        WHERE w.user_id = u.id AND w.status = 'won'),
                    (SELECT COUNT(*) FROM forecasts f WHERE f.user_id = u.id),
                    (SELECT COUNT(*) FROM forecasts f WHERE f.user_id = u.id AND f.status = 'correct'),
                    (SELECT COALESCE(SUM(f.points_awarded), 0) FROM forecasts f WHERE f.user_id = u.id)
                 FROM user_accounts u ORDER BY u.id ASC",
            )?
            .query_map([], |row| {
                Ok(UserActivity {
                    user_id: row.get(0)?,
                    wagers_placed: u32_col(row, 1)?,
                    wagers_won: u32_col(row, 2)?,
                    wagers_lost: u32_col(row, 3)?,
                    total_staked: row.get(4)?,
                    resolved_staked: row.get(5)?,
                    total_paid_out: row.get(6)?,
                    forecasts_made: u32_col(row, 7)?,
                    forecasts_correct: u32_col(row, 8)?,
                    forecast_points: u32_col(row, 9)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(activity)
    }

    /// Replace the whole user stats table.
    pub async fn replace_user_stats(&self, stats: &[HistoricalUserStats]) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM historical_user_stats", [])?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO historical_user_stats
                    (user_id, wagers_placed, wagers_won, wagers_lost, total_staked, total_paid_out,
                     net_profit, forecasts_made, forecasts_correct, forecast_points)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for s in stats {
                stmt.execute(params![
                    s.user_id,
                    s.wagers_placed,
                    s.wagers_won,
                    s.wagers_lost,
                    s.total_staked,
                    s.total_paid_out,
                    s.net_profit,
                    s.forecasts_made,
                    s.forecasts_correct,
                    s.forecast_points,
                ])?;
            }
        }

        tx.commit().context("commit user stats")?;
        Ok(())
    }

    pub async fn get_user_stats(&self, user_id: i64) -> Result<Option<HistoricalUserStats>> {
        let conn = self.conn.lock().await;
        let stats = conn
            .prepare_cached(
                "SELECT user_id, wagers_placed, wagers_won, wagers_lost, total_staked, total_paid_out,
                        net_profit, forecasts_made, forecasts_correct, forecast_points
                 FROM historical_user_stats WHERE user_id = ?1",
            )?
            .query_row([user_id], |row| {
                Ok(HistoricalUserStats {
                    user_id: row.get(0)?,
                    wagers_placed: u32_col(row, 1)?,
                    wagers_won: u32_col(row, 2)?,
                    wagers_lost: u32_col(row, 3)?,
                    total_staked: row.get(4)?,
                    total_paid_out: row.get(5)?,
                    net_profit: row.get(6)?,
                    forecasts_made: u32_col(row, 7)?,
                    forecasts_correct: u32_col(row, 8)?,
                    forecast_points: u32_col(row, 9)?,
                })
            })
            .optional()?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(season_id: i64) -> ArchivePlan {
        ArchivePlan {
            season_id,
            season_name: format!("Season {}", season_id),
            team_count: 2,
            match_count: 2,
            wager_count: 0,
            forecast_count: 0,
            revenue: 0.0,
            champion_team_id: Some(1),
            archived_at: Utc::now(),
            teams: vec![
                TeamSeasonLine {
                    team_id: 1,
                    won: 2,
                    lost: 0,
                    drawn: 0,
                    points_for: 400,
                    points_against: 100,
                    position: 1,
                },
                TeamSeasonLine {
                    team_id: 2,
                    won: 0,
                    lost: 2,
                    drawn: 0,
                    points_for: 100,
                    points_against: 400,
                    position: 2,
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_archive_writes_once() {
        let db = LeagueDb::in_memory().unwrap();
        assert!(db.write_archive(&plan(1)).await.unwrap().is_some());
        assert!(db.write_archive(&plan(1)).await.unwrap().is_none());

        assert!(db.is_season_archived(1).await.unwrap());
        assert_eq!(db.list_historical_seasons().await.unwrap().len(), 1);
        let champ = db.get_team_history(1).await.unwrap().unwrap();
        assert_eq!((champ.seasons_played, champ.championships), (1, 1));
    }

    #[tokio::test]
    async fn test_positions_fold_min_and_max() {
        let db = LeagueDb::in_memory().unwrap();
        db.write_archive(&plan(1)).await.unwrap();

        let mut second = plan(2);
        second.teams[0].position = 2;
        second.teams[1].position = 1;
        db.write_archive(&second).await.unwrap();

        let team1 = db.get_team_history(1).await.unwrap().unwrap();
        assert_eq!(team1.best_position, Some(1));
        assert_eq!(team1.worst_position, Some(2));
        assert_eq!(team1.wins, 4);
        let team2 = db.get_team_history(2).await.unwrap().unwrap();
        assert_eq!(team2.championships, 1);
        assert_eq!(team2.best_position, Some(1));
    }
}
