use anyhow::{Context, Result};
use rusqlite::params;

use super::{u32_col, LeagueDb};
use crate::models::StandingsRow;

impl LeagueDb {
    /// Swap the whole table for a season in one transaction.
    pub async fn replace_standings(&self, season_id: i64, rows: &[StandingsRow]) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM standings WHERE season_id = ?1", [season_id])?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO standings
                    (season_id, team_id, position, played, won, lost, drawn,
                     points_for, points_against, goal_difference, points)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for row in rows {
                stmt.execute(params![
                    season_id,
                    row.team_id,
                    row.position,
                    row.played,
                    row.won,
                    row.lost,
                    row.drawn,
                    row.points_for,
                    row.points_against,
                    row.goal_difference,
                    row.points,
                ])?;
            }
        }

        tx.commit().context("commit standings")?;
        Ok(())
    }

    pub async fn get_standings(&self, season_id: i64) -> Result<Vec<StandingsRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT season_id, team_id, position, played, won, lost, drawn,
                    points_for, points_against, goal_difference, points
             FROM standings WHERE season_id = ?1 ORDER BY position ASC",
        )?;
        let rows = stmt
            .query_map([season_id], |row| {
                Ok(StandingsRow {
                    season_id: row.get(0)?,
                    team_id: row.get(1)?,
                    position: u32_col(row, 2)?,
                    played: u32_col(row, 3)?,
                    won: u32_col(row, 4)?,
                    lost: u32_col(row, 5)?,
                    drawn: u32_col(row, 6)?,
                    points_for: u32_col(row, 7)?,
                    points_against: u32_col(row, 8)?,
                    goal_difference: row.get(9)?,
                    points: u32_col(row, 10)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
