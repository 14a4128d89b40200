use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::matches::insert_match;
use super::{enum_col, to_millis, ts_col, LeagueDb, NewMatch};
use crate::models::{Season, SeasonStatus};

const SEASON_COLUMNS: &str = "id, name, status, starts_at, ends_at";

fn season_from_row(row: &Row<'_>) -> rusqlite::Result<Season> {
    Ok(Season {
        id: row.get(0)?,
        name: row.get(1)?,
        status: enum_col(row, 2, SeasonStatus::from_str)?,
        starts_at: ts_col(row, 3)?,
        ends_at: ts_col(row, 4)?,
    })
}

fn get_season(conn: &Connection, season_id: i64) -> rusqlite::Result<Option<Season>> {
    conn.prepare_cached(&format!("SELECT {} FROM seasons WHERE id = ?1", SEASON_COLUMNS))?
        .query_row([season_id], season_from_row)
        .optional()
}

impl LeagueDb {
    /// Create a season with its roster and fixtures, then activate it.
    ///
    /// Fixture `season_id`s are overwritten with the new season's id.
    pub async fn create_season(
        &self,
        name: &str,
        starts_at: &DateTime<Utc>,
        ends_at: &DateTime<Utc>,
        team_ids: &[i64],
        fixtures: &[NewMatch],
    ) -> Result<Season> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO seasons (name, status, starts_at, ends_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                name,
                SeasonStatus::Upcoming.as_str(),
                to_millis(starts_at),
                to_millis(ends_at)
            ],
        )?;
        let season_id = tx.last_insert_rowid();

        {
            let mut enroll = tx.prepare_cached(
                "INSERT OR IGNORE INTO season_teams (season_id, team_id) VALUES (?1, ?2)",
            )?;
            for team_id in team_ids {
                enroll.execute(params![season_id, team_id])?;
            }
        }

        for fixture in fixtures {
            insert_match(
                &tx,
                &NewMatch {
                    season_id,
                    ..fixture.clone()
                },
            )?;
        }

        tx.execute(
            "UPDATE seasons SET status = ?2 WHERE id = ?1",
            params![season_id, SeasonStatus::Active.as_str()],
        )?;

        let season = get_season(&tx, season_id)?.context("season vanished after insert")?;
        tx.commit().context("commit season creation")?;
        Ok(season)
    }

    pub async fn get_season(&self, season_id: i64) -> Result<Option<Season>> {
        let conn = self.conn.lock().await;
        Ok(get_season(&conn, season_id)?)
    }

    pub async fn active_season(&self) -> Result<Option<Season>> {
        let conn = self.conn.lock().await;
        let season = conn
            .prepare_cached(&format!(
                "SELECT {} FROM seasons WHERE status = 'active' ORDER BY id DESC LIMIT 1",
                SEASON_COLUMNS
            ))?
            .query_row([], season_from_row)
            .optional()?;
        Ok(season)
    }

    pub async fn season_team_ids(&self, season_id: i64) -> Result<Vec<i64>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT team_id FROM season_teams WHERE season_id = ?1 ORDER BY team_id ASC",
        )?;
        let ids = stmt
            .query_map([season_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// `active -> finished` once no scheduled or live match remains.
    ///
    /// Conditional, so exactly one caller sees `true` per season.
    pub async fn finish_season_if_complete(&self, season_id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        let changed = conn
            .prepare_cached(
                "UPDATE seasons SET status = 'finished'
                 WHERE id = ?1 AND status = 'active'
                   AND NOT EXISTS (
                       SELECT 1 FROM matches
                       WHERE season_id = ?1 AND status IN ('scheduled', 'live')
                   )",
            )?
            .execute([season_id])?;
        Ok(changed > 0)
    }
}
