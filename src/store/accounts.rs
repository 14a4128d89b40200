use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{enum_col, to_millis, ts_col, LeagueDb};
use crate::models::{LedgerEntry, LedgerKind, UserAccount};

const USER_COLUMNS: &str =
    "id, username, balance, total_staked, total_paid_out, wager_count, win_count, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserAccount> {
    Ok(UserAccount {
        id: row.get(0)?,
        username: row.get(1)?,
        balance: row.get(2)?,
        total_staked: row.get(3)?,
        total_paid_out: row.get(4)?,
        wager_count: row.get(5)?,
        win_count: row.get(6)?,
        created_at: ts_col(row, 7)?,
    })
}

pub(super) fn get_user(conn: &Connection, user_id: i64) -> rusqlite::Result<Option<UserAccount>> {
    conn.prepare_cached(&format!("SELECT {} FROM user_accounts WHERE id = ?1", USER_COLUMNS))?
        .query_row([user_id], user_from_row)
        .optional()
}

/// Apply a balance change and append the matching ledger line.
///
/// Returns the balance after the change.
pub(super) fn post_ledger(
    conn: &Connection,
    user_id: i64,
    wager_id: Option<i64>,
    kind: LedgerKind,
    amount: f64,
    ts: &DateTime<Utc>,
) -> rusqlite::Result<f64> {
    conn.prepare_cached("UPDATE user_accounts SET balance = balance + ?2 WHERE id = ?1")?
        .execute(params![user_id, amount])?;
    let balance_after: f64 = conn
        .prepare_cached("SELECT balance FROM user_accounts WHERE id = ?1")?
        .query_row([user_id], |row| row.get(0))?;

    conn.prepare_cached(
        "INSERT INTO ledger_entries (id, user_id, wager_id, kind, amount, balance_after, ts)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?
    .execute(params![
        uuid::Uuid::new_v4().to_string(),
        user_id,
        wager_id,
        kind.as_str(),
        amount,
        balance_after,
        to_millis(ts),
    ])?;

    Ok(balance_after)
}

impl LeagueDb {
    pub async fn create_user(&self, username: &str, starting_balance: f64) -> Result<UserAccount> {
        let conn = self.conn.lock().await;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO user_accounts (username, balance, created_at) VALUES (?1, ?2, ?3)",
            params![username, starting_balance, to_millis(&now)],
        )
        .with_context(|| format!("insert user '{}'", username))?;

        get_user(&conn, conn.last_insert_rowid())?.context("user vanished after insert")
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<UserAccount>> {
        let conn = self.conn.lock().await;
        Ok(get_user(&conn, user_id)?)
    }

    pub async fn list_users(&self) -> Result<Vec<UserAccount>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM user_accounts ORDER BY id ASC",
            USER_COLUMNS
        ))?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// Newest first
    pub async fn list_ledger(&self, user_id: i64) -> Result<Vec<LedgerEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, user_id, wager_id, kind, amount, balance_after, ts
             FROM ledger_entries WHERE user_id = ?1
             ORDER BY ts DESC, rowid DESC",
        )?;
        let entries = stmt
            .query_map([user_id], |row| {
                Ok(LedgerEntry {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    wager_id: row.get(2)?,
                    kind: enum_col(row, 3, LedgerKind::from_str)?,
                    amount: row.get(4)?,
                    balance_after: row.get(5)?,
                    ts: ts_col(row, 6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}
