use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::teams::{apply_team_result, rebuild_team_record};
use super::{enum_col, to_millis, ts_col, u32_col, LeagueDb};
use crate::models::{
    EventKind, Match, MatchEvent, MatchOdds, MatchResult, MatchStatus, Side,
};

/// Fixture to be scheduled
#[derive(Debug, Clone, PartialEq)]
pub struct NewMatch {
    pub season_id: i64,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub scheduled_at: DateTime<Utc>,
    pub odds: MatchOdds,
}

const MATCH_COLUMNS: &str = "id, season_id, home_team_id, away_team_id, scheduled_at, status, \
    home_score, away_score, special_catch, catcher, duration_minutes, consolidated, \
    odds_home_win, odds_draw, odds_away_win, odds_total_over, odds_total_under, odds_special_catch";

fn match_from_row(row: &Row<'_>) -> rusqlite::Result<Match> {
    let catcher: Option<String> = row.get(9)?;
    Ok(Match {
        id: row.get(0)?,
        season_id: row.get(1)?,
        home_team_id: row.get(2)?,
        away_team_id: row.get(3)?,
        scheduled_at: ts_col(row, 4)?,
        status: enum_col(row, 5, MatchStatus::from_str)?,
        home_score: u32_col(row, 6)?,
        away_score: u32_col(row, 7)?,
        special_catch: row.get::<_, i64>(8)? == 1,
        catcher: catcher.as_deref().and_then(Side::from_str),
        duration_minutes: u32_col(row, 10)?,
        consolidated: row.get::<_, i64>(11)? == 1,
        odds: MatchOdds {
            home_win: row.get(12)?,
            draw: row.get(13)?,
            away_win: row.get(14)?,
            total_over: row.get(15)?,
            total_under: row.get(16)?,
            special_catch: row.get(17)?,
        },
    })
}

pub(super) fn insert_match(conn: &Connection, m: &NewMatch) -> rusqlite::Result<i64> {
    conn.prepare_cached(
        "INSERT INTO matches
            (season_id, home_team_id, away_team_id, scheduled_at, status,
             odds_home_win, odds_draw, odds_away_win, odds_total_over, odds_total_under, odds_special_catch)
         VALUES (?1, ?2, ?3, ?4, 'scheduled', ?5, ?6, ?7, ?8, ?9, ?10)",
    )?
    .execute(params![
        m.season_id,
        m.home_team_id,
        m.away_team_id,
        to_millis(&m.scheduled_at),
        m.odds.home_win,
        m.odds.draw,
        m.odds.away_win,
        m.odds.total_over,
        m.odds.total_under,
        m.odds.special_catch,
    ])?;
    Ok(conn.last_insert_rowid())
}

pub(super) fn get_match(conn: &Connection, match_id: i64) -> rusqlite::Result<Option<Match>> {
    conn.prepare_cached(&format!("SELECT {} FROM matches WHERE id = ?1", MATCH_COLUMNS))?
        .query_row([match_id], match_from_row)
        .optional()
}

fn team_ids(conn: &Connection, match_id: i64) -> rusqlite::Result<Option<(i64, i64)>> {
    conn.prepare_cached("SELECT home_team_id, away_team_id FROM matches WHERE id = ?1")?
        .query_row([match_id], |row| Ok((row.get(0)?, row.get(1)?)))
        .optional()
}

fn replace_events(conn: &Connection, match_id: i64, events: &[MatchEvent]) -> rusqlite::Result<()> {
    conn.prepare_cached("DELETE FROM match_events WHERE match_id = ?1")?
        .execute([match_id])?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO match_events (match_id, minute, side, kind, description, points)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for e in events {
        stmt.execute(params![
            match_id,
            e.minute,
            e.side.as_str(),
            e.kind.as_str(),
            &e.description,
            e.points
        ])?;
    }
    Ok(())
}

impl LeagueDb {
    pub async fn create_match(&self, m: &NewMatch) -> Result<Match> {
        let conn = self.conn.lock().await;
        let id = insert_match(&conn, m).context("insert match")?;
        get_match(&conn, id)?.context("match vanished after insert")
    }

    pub async fn get_match(&self, match_id: i64) -> Result<Option<Match>> {
        let conn = self.conn.lock().await;
        Ok(get_match(&conn, match_id)?)
    }

    /// Unfinished matches with `after < scheduled_at <= until`, oldest first.
    pub async fn list_due_matches(
        &self,
        after: &DateTime<Utc>,
        until: &DateTime<Utc>,
    ) -> Result<Vec<Match>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM matches
             WHERE status IN ('scheduled', 'live')
               AND scheduled_at > ?1 AND scheduled_at <= ?2
             ORDER BY scheduled_at ASC, id ASC",
            MATCH_COLUMNS
        ))?;
        let matches = stmt
            .query_map(params![to_millis(after), to_millis(until)], match_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(matches)
    }

    pub async fn next_scheduled_after(&self, after: &DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().await;
        let next: Option<i64> = conn
            .prepare_cached(
                "SELECT MIN(scheduled_at) FROM matches
                 WHERE status = 'scheduled' AND scheduled_at > ?1",
            )?
            .query_row([to_millis(after)], |row| row.get(0))?;
        Ok(next.map(crate::league::sim_time::millis_to_datetime))
    }

    pub async fn list_season_matches(
        &self,
        season_id: i64,
        status: Option<MatchStatus>,
    ) -> Result<Vec<Match>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM matches
             WHERE season_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY scheduled_at ASC, id ASC",
            MATCH_COLUMNS
        ))?;
        let matches = stmt
            .query_map(params![season_id, status.map(|s| s.as_str())], match_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(matches)
    }

    /// Scheduled or live matches left in a season.
    pub async fn count_open_matches(&self, season_id: i64) -> Result<usize> {
        let conn = self.conn.lock().await;
        let n: i64 = conn
            .prepare_cached(
                "SELECT COUNT(*) FROM matches
                 WHERE season_id = ?1 AND status IN ('scheduled', 'live')",
            )?
            .query_row([season_id], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub async fn list_match_events(&self, match_id: i64) -> Result<Vec<MatchEvent>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT minute, side, kind, description, points FROM match_events
             WHERE match_id = ?1 ORDER BY minute ASC, id ASC",
        )?;
        let events = stmt
            .query_map([match_id], |row| {
                Ok(MatchEvent {
                    minute: u32_col(row, 0)?,
                    side: enum_col(row, 1, Side::from_str)?,
                    kind: enum_col(row, 2, EventKind::from_str)?,
                    description: row.get(3)?,
                    points: u32_col(row, 4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    /// Write a final result exactly once.
    ///
    /// Conditional on the match still being unfinished and unconsolidated.
    /// The event log and both team records change in the same transaction.
    /// Returns false when another caller already settled the match.
    pub async fn finalize_match(
        &self,
        match_id: i64,
        result: &MatchResult,
        events: &[MatchEvent],
        settled_at: &DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let Some((home_team_id, away_team_id)) = team_ids(&tx, match_id)? else {
            return Ok(false);
        };

        let changed = tx
            .prepare_cached(
                "UPDATE matches SET
                    status = 'finished',
                    home_score = ?2,
                    away_score = ?3,
                    special_catch = ?4,
                    catcher = ?5,
                    duration_minutes = ?6,
                    consolidated = 1,
                    settled_at = ?7
                 WHERE id = ?1
                   AND status IN ('scheduled', 'live')
                   AND consolidated = 0",
            )?
            .execute(params![
                match_id,
                result.home_score,
                result.away_score,
                result.catcher.is_some(),
                result.catcher.map(|s| s.as_str()),
                result.duration_minutes,
                to_millis(settled_at),
            ])?;
        if changed == 0 {
            return Ok(false);
        }

        replace_events(&tx, match_id, events)?;
        apply_team_result(
            &tx,
            home_team_id,
            result.home_score,
            result.away_score,
            result.catcher == Some(Side::Home),
        )?;
        apply_team_result(
            &tx,
            away_team_id,
            result.away_score,
            result.home_score,
            result.catcher == Some(Side::Away),
        )?;

        tx.commit().context("commit finalize")?;
        Ok(true)
    }

    /// Return a finished match to `scheduled` and recount both team records.
    pub async fn reset_match(&self, match_id: i64) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let Some((home_team_id, away_team_id)) = team_ids(&tx, match_id)? else {
            return Ok(false);
        };

        let changed = tx
            .prepare_cached(
                "UPDATE matches SET
                    status = 'scheduled',
                    home_score = 0,
                    away_score = 0,
                    special_catch = 0,
                    catcher = NULL,
                    duration_minutes = 0,
                    consolidated = 0,
                    settled_at = NULL
                 WHERE id = ?1 AND status = 'finished'",
            )?
            .execute([match_id])?;
        if changed == 0 {
            return Ok(false);
        }

        replace_events(&tx, match_id, &[])?;
        rebuild_team_record(&tx, home_team_id)?;
        rebuild_team_record(&tx, away_team_id)?;

        tx.commit().context("commit match reset")?;
        Ok(true)
    }

    /// `scheduled -> postponed`; false if the match was not scheduled.
    pub async fn postpone_match(&self, match_id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        let changed = conn
            .prepare_cached(
                "UPDATE matches SET status = 'postponed'
                 WHERE id = ?1 AND status = 'scheduled'",
            )?
            .execute([match_id])?;
        Ok(changed > 0)
    }
}
