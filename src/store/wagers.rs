use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::accounts::{get_user, post_ledger};
use super::matches::get_match;
use super::{enum_col, opt_ts_col, to_millis, ts_col, LeagueDb};
use crate::league::error::LeagueError;
use crate::league::predicate::{LegColumns, Predicate};
use crate::models::{LedgerKind, MatchStatus, Wager, WagerLeg, WagerStatus};

/// Validated wager ready to be booked
#[derive(Debug, Clone, PartialEq)]
pub struct NewWager {
    pub user_id: i64,
    pub legs: Vec<WagerLeg>,
    pub stake: f64,
    pub odds: f64,
    pub placed_at: DateTime<Utc>,
}

const WAGER_COLUMNS: &str = "w.id, w.user_id, w.match_id, w.combined, w.stake, w.odds, \
    w.potential_payout, w.status, w.placed_at, w.resolved_at, w.resolution_reason";

fn wager_from_row(row: &Row<'_>) -> rusqlite::Result<Wager> {
    Ok(Wager {
        id: row.get(0)?,
        user_id: row.get(1)?,
        match_id: row.get(2)?,
        combined: row.get::<_, i64>(3)? == 1,
        legs: Vec::new(),
        stake: row.get(4)?,
        odds: row.get(5)?,
        potential_payout: row.get(6)?,
        status: enum_col(row, 7, WagerStatus::from_str)?,
        placed_at: ts_col(row, 8)?,
        resolved_at: opt_ts_col(row, 9)?,
        resolution_reason: row.get(10)?,
    })
}

fn load_legs(conn: &Connection, wager_id: i64) -> rusqlite::Result<Vec<WagerLeg>> {
    let mut stmt = conn.prepare_cached(
        "SELECT match_id, kind, line, category, selection FROM wager_legs
         WHERE wager_id = ?1 ORDER BY leg_index ASC",
    )?;
    let legs = stmt
        .query_map([wager_id], |row| {
            let cols = LegColumns {
                kind: row.get(1)?,
                line: row.get(2)?,
                category: row.get(3)?,
                selection: row.get(4)?,
            };
            Ok(WagerLeg {
                match_id: row.get(0)?,
                predicate: Predicate::from_columns(&cols),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(legs)
}

fn query_wagers(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<Wager>> {
    let mut wagers = conn
        .prepare_cached(sql)?
        .query_map(params, wager_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for wager in &mut wagers {
        wager.legs = load_legs(conn, wager.id)?;
    }
    Ok(wagers)
}

fn get_wager(conn: &Connection, wager_id: i64) -> rusqlite::Result<Option<Wager>> {
    let wager = conn
        .prepare_cached(&format!("SELECT {} FROM wagers w WHERE w.id = ?1", WAGER_COLUMNS))?
        .query_row([wager_id], wager_from_row)
        .optional()?;
    match wager {
        Some(mut w) => {
            w.legs = load_legs(conn, w.id)?;
            Ok(Some(w))
        }
        None => Ok(None),
    }
}

fn mark_resolved(
    conn: &Connection,
    wager_id: i64,
    status: WagerStatus,
    reason: &str,
    at: &DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let changed = conn
        .prepare_cached(
            "UPDATE wagers SET status = ?2, resolved_at = ?3, resolution_reason = ?4
             WHERE id = ?1 AND status = 'pending'",
        )?
        .execute(params![wager_id, status.as_str(), to_millis(at), reason])?;
    Ok(changed > 0)
}

impl LeagueDb {
    /// Book a wager: check funds and open matches, debit the stake, insert
    /// the wager with its legs. All or nothing.
    pub async fn place_wager(&self, new: &NewWager) -> Result<Wager> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let user = get_user(&tx, new.user_id)?.ok_or(LeagueError::UserNotFound(new.user_id))?;
        if user.balance < new.stake {
            return Err(LeagueError::InsufficientBalance {
                user_id: user.id,
                balance: user.balance,
                stake: new.stake,
            }
            .into());
        }

        let primary = new
            .legs
            .first()
            .map(|leg| leg.match_id)
            .ok_or_else(|| LeagueError::InvalidWager("no legs".into()))?;
        for leg in &new.legs {
            let m = get_match(&tx, leg.match_id)?.ok_or(LeagueError::MatchNotFound(leg.match_id))?;
            if m.status != MatchStatus::Scheduled {
                return Err(LeagueError::MatchNotOpen {
                    match_id: m.id,
                    status: m.status.as_str().to_string(),
                }
                .into());
            }
        }

        let combined = new.legs.len() > 1;
        let potential_payout = new.stake * new.odds;
        tx.execute(
            "INSERT INTO wagers
                (user_id, match_id, combined, stake, odds, potential_payout, status, placed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7)",
            params![
                new.user_id,
                primary,
                combined,
                new.stake,
                new.odds,
                potential_payout,
                to_millis(&new.placed_at)
            ],
        )?;
        let wager_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO wager_legs (wager_id, leg_index, match_id, kind, line, category, selection)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for (idx, leg) in new.legs.iter().enumerate() {
                let cols = leg.predicate.to_columns();
                stmt.execute(params![
                    wager_id,
                    idx as i64,
                    leg.match_id,
                    cols.kind,
                    cols.line,
                    cols.category,
                    cols.selection
                ])?;
            }
        }

        post_ledger(
            &tx,
            new.user_id,
            Some(wager_id),
            LedgerKind::Stake,
            -new.stake,
            &new.placed_at,
        )?;
        tx.execute(
            "UPDATE user_accounts SET total_staked = total_staked + ?2, wager_count = wager_count + 1
             WHERE id = ?1",
            params![new.user_id, new.stake],
        )?;

        let wager = get_wager(&tx, wager_id)?.context("wager vanished after insert")?;
        tx.commit().context("commit wager placement")?;
        Ok(wager)
    }

    pub async fn get_wager(&self, wager_id: i64) -> Result<Option<Wager>> {
        let conn = self.conn.lock().await;
        Ok(get_wager(&conn, wager_id)?)
    }

    /// Pending single-leg wagers whose match is `match_id`.
    pub async fn pending_single_wagers(&self, match_id: i64) -> Result<Vec<Wager>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM wagers w
             WHERE w.status = 'pending' AND w.combined = 0 AND w.match_id = ?1
             ORDER BY w.id ASC",
            WAGER_COLUMNS
        );
        Ok(query_wagers(&conn, &sql, [match_id])?)
    }

    pub async fn pending_combined_wagers(&self) -> Result<Vec<Wager>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM wagers w
             WHERE w.status = 'pending' AND w.combined = 1
             ORDER BY w.id ASC",
            WAGER_COLUMNS
        );
        Ok(query_wagers(&conn, &sql, [])?)
    }

    /// Pending wagers, single or combined, with any leg on `match_id`.
    pub async fn pending_wagers_touching(&self, match_id: i64) -> Result<Vec<Wager>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM wagers w
             WHERE w.status = 'pending'
               AND EXISTS (SELECT 1 FROM wager_legs l WHERE l.wager_id = w.id AND l.match_id = ?1)
             ORDER BY w.id ASC",
            WAGER_COLUMNS
        );
        Ok(query_wagers(&conn, &sql, [match_id])?)
    }

    /// Settle a pending wager as won or lost.
    ///
    /// A won wager credits the full potential payout (the stake was taken at
    /// placement); a lost one records a zero-amount `Loss` line. Returns false
    /// if the wager was no longer pending.
    pub async fn settle_wager(
        &self,
        wager_id: i64,
        won: bool,
        reason: &str,
        at: &DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let Some(wager) = get_wager(&tx, wager_id)? else {
            return Err(LeagueError::WagerNotFound(wager_id).into());
        };
        let status = if won { WagerStatus::Won } else { WagerStatus::Lost };
        if !mark_resolved(&tx, wager_id, status, reason, at)? {
            return Ok(false);
        }

        if won {
            post_ledger(
                &tx,
                wager.user_id,
                Some(wager_id),
                LedgerKind::Payout,
                wager.potential_payout,
                at,
            )?;
            tx.execute(
                "UPDATE user_accounts SET total_paid_out = total_paid_out + ?2, win_count = win_count + 1
                 WHERE id = ?1",
                params![wager.user_id, wager.potential_payout],
            )?;
        } else {
            post_ledger(&tx, wager.user_id, Some(wager_id), LedgerKind::Loss, 0.0, at)?;
        }

        tx.commit().context("commit wager settlement")?;
        Ok(true)
    }

    /// Cancel a pending wager and give the stake back.
    pub async fn cancel_wager(&self, wager_id: i64, reason: &str, at: &DateTime<Utc>) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let Some(wager) = get_wager(&tx, wager_id)? else {
            return Err(LeagueError::WagerNotFound(wager_id).into());
        };
        if !mark_resolved(&tx, wager_id, WagerStatus::Cancelled, reason, at)? {
            return Ok(false);
        }

        post_ledger(
            &tx,
            wager.user_id,
            Some(wager_id),
            LedgerKind::Refund,
            wager.stake,
            at,
        )?;
        tx.execute(
            "UPDATE user_accounts SET total_staked = total_staked - ?2 WHERE id = ?1",
            params![wager.user_id, wager.stake],
        )?;

        tx.commit().context("commit wager refund")?;
        Ok(true)
    }
}
