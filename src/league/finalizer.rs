//! Match Finalizer
//!
//! Produces a final result (simulated or supplied), commits it exactly once,
//! then hands the finished match to the settlement pipeline.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::league::config::LeagueConfig;
use crate::league::error::LeagueError;
use crate::league::outcome::{generate_outcome, OutcomeParams, SPECIAL_CATCH_POINTS};
use crate::league::pipeline::{SettlementPipeline, SettlementReport, StageError};
use crate::league::standings::recompute_standings;
use crate::league::wagers::WagerEngine;
use crate::models::{EventKind, Match, MatchEvent, MatchResult, MatchStatus};
use crate::store::LeagueDb;

/// Random stream shared by everything that simulates
pub type SharedRng = Arc<Mutex<ChaCha8Rng>>;

/// Seeded stream when `seed` is given, entropy otherwise.
pub fn shared_rng(seed: Option<u64>) -> SharedRng {
    let rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    Arc::new(Mutex::new(rng))
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchResolution {
    /// Generate the result from the two teams' profiles
    Simulate,
    /// Use a result supplied by an operator
    Manual(MatchResult),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    Finalized(SettlementReport),
    /// The match was already finished or consolidated; nothing was written
    AlreadySettled,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostponeReport {
    pub match_id: i64,
    pub refunded_wagers: Vec<i64>,
    pub errors: Vec<StageError>,
}

/// Simulated time at which a match is considered settled.
pub fn settled_at(m: &Match, result: &MatchResult) -> DateTime<Utc> {
    m.scheduled_at + Duration::minutes(result.duration_minutes as i64)
}

fn manual_events(result: &MatchResult) -> Vec<MatchEvent> {
    result
        .catcher
        .map(|side| MatchEvent {
            minute: result.duration_minutes,
            side,
            kind: EventKind::SpecialCatch,
            description: format!("{} special catch", side.as_str()),
            points: SPECIAL_CATCH_POINTS,
        })
        .into_iter()
        .collect()
}

#[derive(Clone)]
pub struct MatchFinalizer {
    db: LeagueDb,
    pipeline: SettlementPipeline,
    wagers: WagerEngine,
    rng: SharedRng,
    params: OutcomeParams,
}

impl MatchFinalizer {
    pub fn new(db: LeagueDb, config: &LeagueConfig, rng: SharedRng) -> Self {
        Self {
            pipeline: SettlementPipeline::new(db.clone(), config),
            wagers: WagerEngine::new(db.clone()),
            db,
            rng,
            params: OutcomeParams {
                catch_chance: config.catch_chance,
            },
        }
    }

    async fn simulate(&self, m: &Match) -> Result<(MatchResult, Vec<MatchEvent>)> {
        let home = self
            .db
            .get_team(m.home_team_id)
            .await?
            .ok_or(LeagueError::TeamNotFound(m.home_team_id))?;
        let away = self
            .db
            .get_team(m.away_team_id)
            .await?
            .ok_or(LeagueError::TeamNotFound(m.away_team_id))?;

        let outcome = {
            let mut rng = self.rng.lock();
            generate_outcome(&home.profile, &away.profile, m.id, &self.params, &mut *rng)
        };
        Ok(outcome.into_parts())
    }

    /// Finalize a match exactly once.
    ///
    /// Missing match is an error. Already finished or consolidated, including
    /// losing a race with a concurrent caller, is `AlreadySettled`.
    pub async fn finalize(
        &self,
        match_id: i64,
        resolution: MatchResolution,
    ) -> Result<FinalizeOutcome> {
        let m = self
            .db
            .get_match(match_id)
            .await
            .with_context(|| format!("load match {}", match_id))?
            .ok_or(LeagueError::MatchNotFound(match_id))?;

        if m.status == MatchStatus::Finished || m.consolidated {
            info!(match_id, "Match already settled, skipping");
            return Ok(FinalizeOutcome::AlreadySettled);
        }
        if m.status == MatchStatus::Postponed {
            return Err(LeagueError::MatchNotOpen {
                match_id,
                status: m.status.as_str().to_string(),
            }
            .into());
        }

        let (result, events) = match resolution {
            MatchResolution::Simulate => self.simulate(&m).await?,
            MatchResolution::Manual(result) => (result, manual_events(&result)),
        };
        let at = settled_at(&m, &result);

        let written = self
            .db
            .finalize_match(match_id, &result, &events, &at)
            .await
            .with_context(|| format!("finalize match {}", match_id))?;
        if !written {
            info!(match_id, "Match settled concurrently, skipping");
            return Ok(FinalizeOutcome::AlreadySettled);
        }

        info!(
            match_id,
            home_score = result.home_score,
            away_score = result.away_score,
            duration = result.duration_minutes,
            "Match finalized"
        );

        let finished = self
            .db
            .get_match(match_id)
            .await?
            .ok_or(LeagueError::MatchNotFound(match_id))?;
        let report = self.pipeline.run(&finished, &at).await;
        Ok(FinalizeOutcome::Finalized(report))
    }

    /// Return a finished match to `scheduled`.
    ///
    /// Team records are recounted and standings recomputed. Wagers and
    /// forecasts already resolved on this match stay resolved.
    pub async fn reset_match(&self, match_id: i64) -> Result<bool> {
        let m = self
            .db
            .get_match(match_id)
            .await?
            .ok_or(LeagueError::MatchNotFound(match_id))?;

        if !self.db.reset_match(match_id).await? {
            warn!(match_id, status = m.status.as_str(), "Reset ignored, match not finished");
            return Ok(false);
        }
        recompute_standings(&self.db, m.season_id)
            .await
            .context("standings after reset")?;

        info!(match_id, "Match reset to scheduled");
        Ok(true)
    }

    /// Postpone a scheduled match and refund every pending wager touching it.
    pub async fn postpone_match(&self, match_id: i64) -> Result<PostponeReport> {
        let m = self
            .db
            .get_match(match_id)
            .await?
            .ok_or(LeagueError::MatchNotFound(match_id))?;

        if !self.db.postpone_match(match_id).await? {
            return Err(LeagueError::MatchNotOpen {
                match_id,
                status: m.status.as_str().to_string(),
            }
            .into());
        }

        let refunds = self
            .wagers
            .refund_for_match(match_id, "match postponed", &Utc::now())
            .await?;
        info!(
            match_id,
            refunded = refunds.cancelled.len(),
            "Match postponed"
        );
        Ok(PostponeReport {
            match_id,
            refunded_wagers: refunds.cancelled,
            errors: refunds.errors,
        })
    }
}
