//! Post-finalize settlement pipeline
//!
//! Runs after a match result is committed:
//! wagers -> forecasts -> standings -> season close.
//!
//! A failing stage is recorded and the next stage still runs. Nothing here
//! can roll back the finalize itself; every stage is safe to re-run because
//! each write is conditional on the row still being pending.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info};

use crate::league::config::LeagueConfig;
use crate::league::forecasts::resolve_forecasts;
use crate::league::season::close_season_if_complete;
use crate::league::standings::recompute_standings;
use crate::league::wagers::WagerEngine;
use crate::models::{HistoricalSeasonRecord, Match};
use crate::store::LeagueDb;

// =============================================================================
// STAGES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Result write for a due match, before any settlement
    Finalize,
    WagerResolution,
    ForecastResolution,
    Standings,
    SeasonClose,
    /// Wager cancellation after a postponement
    Refund,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Finalize => "finalize",
            Stage::WagerResolution => "wager_resolution",
            Stage::ForecastResolution => "forecast_resolution",
            Stage::Standings => "standings",
            Stage::SeasonClose => "season_close",
            Stage::Refund => "refund",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A settlement step that failed for one match (and optionally one row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageError {
    pub stage: Stage,
    pub match_id: i64,
    /// Wager or forecast id when the failure is row-specific
    pub subject: Option<i64>,
    pub message: String,
}

impl StageError {
    pub fn new(stage: Stage, match_id: i64, err: &anyhow::Error) -> Self {
        Self {
            stage,
            match_id,
            subject: None,
            message: format!("{:#}", err),
        }
    }

    pub fn for_subject(stage: Stage, match_id: i64, subject: i64, err: &anyhow::Error) -> Self {
        Self {
            subject: Some(subject),
            ..Self::new(stage, match_id, err)
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.subject {
            Some(subject) => write!(
                f,
                "{} failed for match {} (row {}): {}",
                self.stage, self.match_id, subject, self.message
            ),
            None => write!(
                f,
                "{} failed for match {}: {}",
                self.stage, self.match_id, self.message
            ),
        }
    }
}

impl std::error::Error for StageError {}

// =============================================================================
// REPORT
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub match_id: i64,
    pub wagers_won: Vec<i64>,
    pub wagers_lost: Vec<i64>,
    pub forecasts_correct: u32,
    pub forecasts_incorrect: u32,
    pub standings_updated: bool,
    pub archived_season: Option<HistoricalSeasonRecord>,
    pub errors: Vec<StageError>,
}

impl SettlementReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

// =============================================================================
// PIPELINE
// =============================================================================

#[derive(Clone)]
pub struct SettlementPipeline {
    db: LeagueDb,
    wagers: WagerEngine,
    forecast_point_multiplier: u32,
}

impl SettlementPipeline {
    pub fn new(db: LeagueDb, config: &LeagueConfig) -> Self {
        Self {
            wagers: WagerEngine::new(db.clone()),
            db,
            forecast_point_multiplier: config.forecast_point_multiplier,
        }
    }

    /// Settle everything downstream of a finished match.
    pub async fn run(&self, finished: &Match, settled_at: &DateTime<Utc>) -> SettlementReport {
        let match_id = finished.id;
        let mut report = SettlementReport {
            match_id,
            ..Default::default()
        };

        match self.wagers.resolve_for_match(match_id, settled_at).await {
            Ok(outcome) => {
                report.wagers_won = outcome.won;
                report.wagers_lost = outcome.lost;
                report.errors.extend(outcome.errors);
            }
            Err(e) => {
                error!(match_id, stage = %Stage::WagerResolution, "Stage failed: {:#}", e);
                report
                    .errors
                    .push(StageError::new(Stage::WagerResolution, match_id, &e));
            }
        }

        match resolve_forecasts(&self.db, finished, self.forecast_point_multiplier, settled_at)
            .await
        {
            Ok(outcome) => {
                report.forecasts_correct = outcome.correct;
                report.forecasts_incorrect = outcome.incorrect;
                report.errors.extend(outcome.errors);
            }
            Err(e) => {
                error!(match_id, stage = %Stage::ForecastResolution, "Stage failed: {:#}", e);
                report
                    .errors
                    .push(StageError::new(Stage::ForecastResolution, match_id, &e));
            }
        }

        match recompute_standings(&self.db, finished.season_id).await {
            Ok(_) => report.standings_updated = true,
            Err(e) => {
                error!(match_id, stage = %Stage::Standings, "Stage failed: {:#}", e);
                report
                    .errors
                    .push(StageError::new(Stage::Standings, match_id, &e));
            }
        }

        match close_season_if_complete(&self.db, finished.season_id, settled_at).await {
            Ok(archived) => report.archived_season = archived,
            Err(e) => {
                error!(match_id, stage = %Stage::SeasonClose, "Stage failed: {:#}", e);
                report
                    .errors
                    .push(StageError::new(Stage::SeasonClose, match_id, &e));
            }
        }

        info!(
            match_id,
            won = report.wagers_won.len(),
            lost = report.wagers_lost.len(),
            forecasts = report.forecasts_correct + report.forecasts_incorrect,
            errors = report.errors.len(),
            "Settlement pipeline finished"
        );
        report
    }
}
