use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, ErrorCode, OptionalExtension, Row};

use super::{enum_col, opt_ts_col, to_millis, ts_col, u32_col, LeagueDb};
use crate::league::error::LeagueError;
use crate::models::{Forecast, ForecastStatus, MatchOutcome};

const FORECAST_COLUMNS: &str =
    "id, user_id, match_id, outcome, confidence, status, points_awarded, created_at, resolved_at";

fn forecast_from_row(row: &Row<'_>) -> rusqlite::Result<Forecast> {
    Ok(Forecast {
        id: row.get(0)?,
        user_id: row.get(1)?,
        match_id: row.get(2)?,
        outcome: enum_col(row, 3, MatchOutcome::from_str)?,
        confidence: row.get::<_, i64>(4)?.clamp(0, u8::MAX as i64) as u8,
        status: enum_col(row, 5, ForecastStatus::from_str)?,
        points_awarded: u32_col(row, 6)?,
        created_at: ts_col(row, 7)?,
        resolved_at: opt_ts_col(row, 8)?,
    })
}

impl LeagueDb {
    /// Insert a pending forecast; a second one for the same (user, match)
    /// fails with `AlreadyForecast`.
    pub async fn insert_forecast(
        &self,
        user_id: i64,
        match_id: i64,
        outcome: MatchOutcome,
        confidence: u8,
        created_at: &DateTime<Utc>,
    ) -> Result<Forecast> {
        let conn = self.conn.lock().await;
        let inserted = conn.execute(
            "INSERT INTO forecasts (user_id, match_id, outcome, confidence, status, created_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
            params![
                user_id,
                match_id,
                outcome.as_str(),
                confidence,
                to_millis(created_at)
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(LeagueError::AlreadyForecast { user_id, match_id }.into());
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Forecast {
            id: conn.last_insert_rowid(),
            user_id,
            match_id,
            outcome,
            confidence,
            status: ForecastStatus::Pending,
            points_awarded: 0,
            created_at: *created_at,
            resolved_at: None,
        })
    }

    pub async fn get_forecast(&self, forecast_id: i64) -> Result<Option<Forecast>> {
        let conn = self.conn.lock().await;
        let forecast = conn
            .prepare_cached(&format!(
                "SELECT {} FROM forecasts WHERE id = ?1",
                FORECAST_COLUMNS
            ))?
            .query_row([forecast_id], forecast_from_row)
            .optional()?;
        Ok(forecast)
    }

    pub async fn pending_forecasts(&self, match_id: i64) -> Result<Vec<Forecast>> {
        let conn = self.conn.lock().await;
        let forecasts = conn
            .prepare_cached(&format!(
                "SELECT {} FROM forecasts WHERE match_id = ?1 AND status = 'pending' ORDER BY id ASC",
                FORECAST_COLUMNS
            ))?
            .query_map([match_id], forecast_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(forecasts)
    }

    /// Conditional on the forecast still being pending.
    pub async fn resolve_forecast(
        &self,
        forecast_id: i64,
        status: ForecastStatus,
        points_awarded: u32,
        at: &DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let changed = conn
            .prepare_cached(
                "UPDATE forecasts SET status = ?2, points_awarded = ?3, resolved_at = ?4
                 WHERE id = ?1 AND status = 'pending'",
            )?
            .execute(params![
                forecast_id,
                status.as_str(),
                points_awarded,
                to_millis(at)
            ])?;
        Ok(changed > 0)
    }
}
