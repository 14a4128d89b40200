//! Forecast submission and resolution
//!
//! A forecast names the winner (or a draw) with a confidence from 1 to the
//! configured maximum. A correct forecast earns `confidence × multiplier`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::league::config::LeagueConfig;
use crate::league::error::LeagueError;
use crate::league::pipeline::{Stage, StageError};
use crate::models::{Forecast, ForecastStatus, Match, MatchOutcome, MatchStatus};
use crate::store::LeagueDb;

pub async fn submit_forecast(
    db: &LeagueDb,
    config: &LeagueConfig,
    user_id: i64,
    match_id: i64,
    outcome: MatchOutcome,
    confidence: u8,
) -> Result<Forecast> {
    if confidence == 0 || confidence > config.max_forecast_confidence {
        return Err(LeagueError::InvalidForecast(format!(
            "confidence must be within 1..={}, got {}",
            config.max_forecast_confidence, confidence
        ))
        .into());
    }

    if db.get_user(user_id).await?.is_none() {
        return Err(LeagueError::UserNotFound(user_id).into());
    }
    let m = db
        .get_match(match_id)
        .await?
        .ok_or(LeagueError::MatchNotFound(match_id))?;
    if m.status != MatchStatus::Scheduled {
        return Err(LeagueError::MatchNotOpen {
            match_id,
            status: m.status.as_str().to_string(),
        }
        .into());
    }

    let forecast = db
        .insert_forecast(user_id, match_id, outcome, confidence, &Utc::now())
        .await?;
    info!(
        forecast_id = forecast.id,
        user_id,
        match_id,
        outcome = outcome.as_str(),
        confidence,
        "Forecast submitted"
    );
    Ok(forecast)
}

/// Status and points for one forecast against the actual outcome.
pub fn score_forecast(
    predicted: MatchOutcome,
    confidence: u8,
    actual: MatchOutcome,
    multiplier: u32,
) -> (ForecastStatus, u32) {
    if predicted == actual {
        (ForecastStatus::Correct, confidence as u32 * multiplier)
    } else {
        (ForecastStatus::Incorrect, 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastSettlement {
    pub correct: u32,
    pub incorrect: u32,
    pub errors: Vec<StageError>,
}

/// Resolve every pending forecast on a finished match.
pub async fn resolve_forecasts(
    db: &LeagueDb,
    finished: &Match,
    multiplier: u32,
    settled_at: &DateTime<Utc>,
) -> Result<ForecastSettlement> {
    let Some(result) = finished.result() else {
        return Ok(ForecastSettlement::default());
    };
    let actual = result.outcome();

    let pending = db
        .pending_forecasts(finished.id)
        .await
        .context("load pending forecasts")?;

    let mut settlement = ForecastSettlement::default();
    for forecast in &pending {
        let (status, points) =
            score_forecast(forecast.outcome, forecast.confidence, actual, multiplier);
        match db
            .resolve_forecast(forecast.id, status, points, settled_at)
            .await
        {
            Ok(true) if status == ForecastStatus::Correct => settlement.correct += 1,
            Ok(true) => settlement.incorrect += 1,
            Ok(false) => {}
            Err(e) => {
                error!(
                    match_id = finished.id,
                    forecast_id = forecast.id,
                    "Forecast resolution failed: {:#}",
                    e
                );
                settlement.errors.push(StageError::for_subject(
                    Stage::ForecastResolution,
                    finished.id,
                    forecast.id,
                    &e,
                ));
            }
        }
    }

    debug!(
        match_id = finished.id,
        correct = settlement.correct,
        incorrect = settlement.incorrect,
        "Forecasts resolved"
    );
    Ok(settlement)
}
