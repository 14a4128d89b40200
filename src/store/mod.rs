//! SQLite persistence for the league engine
//!
//! One connection behind an async mutex. Every multi-row write runs in a
//! transaction; settlement writes are conditional updates so that a second
//! caller observes zero changed rows instead of double-applying.

mod accounts;
mod clock;
mod forecasts;
mod history;
mod matches;
mod schema;
mod seasons;
mod standings;
mod teams;
mod wagers;

pub use history::{ArchivePlan, SeasonWagerTotals, TeamSeasonLine, UserActivity};
pub use matches::NewMatch;
pub use wagers::NewWager;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::league::sim_time::{datetime_to_millis, millis_to_datetime};

#[derive(Clone)]
pub struct LeagueDb {
    conn: Arc<Mutex<Connection>>,
}

impl LeagueDb {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open league db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();

        schema::create_tables(&conn).context("create league schema")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }
}

pub(crate) fn to_millis(dt: &DateTime<Utc>) -> i64 {
    datetime_to_millis(dt)
}

pub(crate) fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    Ok(millis_to_datetime(row.get::<_, i64>(idx)?))
}

pub(crate) fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row.get::<_, Option<i64>>(idx)?.map(millis_to_datetime))
}

/// Decode a string enum column, surfacing unknown values as a conversion error.
pub(crate) fn enum_col<T>(
    row: &Row<'_>,
    idx: usize,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unexpected value '{}'", raw).into(),
        )
    })
}

pub(crate) fn u32_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<u32> {
    Ok(row.get::<_, i64>(idx)?.max(0) as u32)
}
