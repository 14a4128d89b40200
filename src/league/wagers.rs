//! Wager placement and the Wager Resolution Engine
//!
//! Single wagers settle when their match finishes. Combined wagers are
//! re-scanned after every finalization and settle only once every leg's
//! match is finished: won iff every leg holds, lost as soon as all legs
//! are known and one fails.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use crate::league::error::LeagueError;
use crate::league::pipeline::{Stage, StageError};
use crate::models::{MatchResult, Wager, WagerLeg};
use crate::store::{LeagueDb, NewWager};

/// Wager request as submitted by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceWager {
    pub user_id: i64,
    pub legs: Vec<WagerLeg>,
    pub stake: f64,
    /// Decimal odds; for combined wagers the product of the leg prices
    pub odds: f64,
}

impl PlaceWager {
    pub fn validate(&self) -> Result<(), LeagueError> {
        if self.legs.is_empty() {
            return Err(LeagueError::InvalidWager("at least one leg required".into()));
        }
        if !self.stake.is_finite() || self.stake <= 0.0 {
            return Err(LeagueError::InvalidWager(format!(
                "stake must be positive, got {}",
                self.stake
            )));
        }
        if !self.odds.is_finite() || self.odds <= 1.0 {
            return Err(LeagueError::InvalidWager(format!(
                "odds must be greater than 1, got {}",
                self.odds
            )));
        }
        Ok(())
    }
}

/// Validate, debit the stake and book the wager.
pub async fn place_wager(db: &LeagueDb, request: PlaceWager) -> Result<Wager> {
    request.validate()?;

    let wager = db
        .place_wager(&NewWager {
            user_id: request.user_id,
            legs: request.legs,
            stake: request.stake,
            odds: request.odds,
            placed_at: Utc::now(),
        })
        .await?;

    info!(
        wager_id = wager.id,
        user_id = wager.user_id,
        legs = wager.legs.len(),
        stake = wager.stake,
        odds = wager.odds,
        "Wager placed"
    );
    Ok(wager)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WagerVerdict {
    /// At least one leg's match has no result yet
    Pending,
    Won(String),
    Lost(String),
}

/// Judge a wager against the results known so far.
///
/// `results` maps match id to final result for finished matches only.
pub fn evaluate_wager(wager: &Wager, results: &HashMap<i64, MatchResult>) -> WagerVerdict {
    let mut reasons = Vec::with_capacity(wager.legs.len());
    let mut all_hit = true;

    for leg in &wager.legs {
        let Some(result) = results.get(&leg.match_id) else {
            return WagerVerdict::Pending;
        };
        let verdict = leg.predicate.evaluate(result);
        all_hit &= verdict.hit;
        reasons.push(format!(
            "match {}: {} ({})",
            leg.match_id,
            verdict.reason,
            if verdict.hit { "hit" } else { "miss" }
        ));
    }

    let reason = reasons.join("; ");
    if all_hit {
        WagerVerdict::Won(reason)
    } else {
        WagerVerdict::Lost(reason)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WagerSettlement {
    pub won: Vec<i64>,
    pub lost: Vec<i64>,
    pub cancelled: Vec<i64>,
    pub errors: Vec<StageError>,
}

#[derive(Clone)]
pub struct WagerEngine {
    db: LeagueDb,
}

impl WagerEngine {
    pub fn new(db: LeagueDb) -> Self {
        Self { db }
    }

    async fn known_results(
        &self,
        wagers: &[Wager],
        cache: &mut HashMap<i64, Option<MatchResult>>,
    ) -> Result<HashMap<i64, MatchResult>> {
        for leg in wagers.iter().flat_map(|w| w.legs.iter()) {
            if !cache.contains_key(&leg.match_id) {
                let result = self
                    .db
                    .get_match(leg.match_id)
                    .await
                    .with_context(|| format!("load leg match {}", leg.match_id))?
                    .and_then(|m| m.result());
                cache.insert(leg.match_id, result);
            }
        }
        Ok(cache
            .iter()
            .filter_map(|(id, r)| r.map(|r| (*id, r)))
            .collect())
    }

    /// Settle single wagers on `match_id` and every combined wager whose
    /// legs are now all finished.
    ///
    /// A failure on one wager is logged and recorded; the rest still settle.
    pub async fn resolve_for_match(
        &self,
        match_id: i64,
        settled_at: &DateTime<Utc>,
    ) -> Result<WagerSettlement> {
        let singles = self
            .db
            .pending_single_wagers(match_id)
            .await
            .context("load pending single wagers")?;
        let combined = self
            .db
            .pending_combined_wagers()
            .await
            .context("load pending combined wagers")?;

        let mut cache = HashMap::new();
        let mut settlement = WagerSettlement::default();
        let results = self.known_results(&singles, &mut cache).await?;
        self.settle_batch(match_id, &singles, &results, settled_at, &mut settlement)
            .await;
        let results = self.known_results(&combined, &mut cache).await?;
        self.settle_batch(match_id, &combined, &results, settled_at, &mut settlement)
            .await;

        debug!(
            match_id,
            won = settlement.won.len(),
            lost = settlement.lost.len(),
            errors = settlement.errors.len(),
            "Wagers resolved"
        );
        Ok(settlement)
    }

    async fn settle_batch(
        &self,
        match_id: i64,
        wagers: &[Wager],
        results: &HashMap<i64, MatchResult>,
        settled_at: &DateTime<Utc>,
        settlement: &mut WagerSettlement,
    ) {
        for wager in wagers {
            let (won, reason) = match evaluate_wager(wager, results) {
                WagerVerdict::Pending => continue,
                WagerVerdict::Won(reason) => (true, reason),
                WagerVerdict::Lost(reason) => (false, reason),
            };

            match self
                .db
                .settle_wager(wager.id, won, &reason, settled_at)
                .await
            {
                Ok(true) if won => settlement.won.push(wager.id),
                Ok(true) => settlement.lost.push(wager.id),
                Ok(false) => {
                    debug!(wager_id = wager.id, "Wager already settled elsewhere");
                }
                Err(e) => {
                    error!(match_id, wager_id = wager.id, "Wager settlement failed: {:#}", e);
                    settlement.errors.push(StageError::for_subject(
                        Stage::WagerResolution,
                        match_id,
                        wager.id,
                        &e,
                    ));
                }
            }
        }
    }

    /// Cancel and refund every pending wager with a leg on `match_id`.
    pub async fn refund_for_match(
        &self,
        match_id: i64,
        reason: &str,
        at: &DateTime<Utc>,
    ) -> Result<WagerSettlement> {
        let wagers = self
            .db
            .pending_wagers_touching(match_id)
            .await
            .context("load wagers to refund")?;

        let mut settlement = WagerSettlement::default();
        for wager in &wagers {
            match self.db.cancel_wager(wager.id, reason, at).await {
                Ok(true) => settlement.cancelled.push(wager.id),
                Ok(false) => {}
                Err(e) => {
                    warn!(match_id, wager_id = wager.id, "Wager refund failed: {:#}", e);
                    settlement.errors.push(StageError::for_subject(
                        Stage::Refund,
                        match_id,
                        wager.id,
                        &e,
                    ));
                }
            }
        }
        Ok(settlement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::league::predicate::Predicate;
    use crate::models::{Side, WagerStatus};

    fn wager(legs: Vec<(i64, Predicate)>) -> Wager {
        Wager {
            id: 1,
            user_id: 1,
            match_id: legs[0].0,
            combined: legs.len() > 1,
            legs: legs
                .into_iter()
                .map(|(match_id, predicate)| WagerLeg {
                    match_id,
                    predicate,
                })
                .collect(),
            stake: 10.0,
            odds: 3.0,
            potential_payout: 30.0,
            status: WagerStatus::Pending,
            placed_at: Utc::now(),
            resolved_at: None,
            resolution_reason: None,
        }
    }

    fn result(home: u32, away: u32) -> MatchResult {
        MatchResult {
            home_score: home,
            away_score: away,
            catcher: Some(Side::Home),
            duration_minutes: 60,
        }
    }

    #[test]
    fn test_combined_pending_until_all_legs_finish() {
        let w = wager(vec![
            (1, Predicate::WinnerHome),
            (2, Predicate::TotalOver { line: 100.0 }),
        ]);
        let mut results = HashMap::new();
        results.insert(1, result(200, 100));
        assert_eq!(evaluate_wager(&w, &results), WagerVerdict::Pending);

        results.insert(2, result(60, 30));
        assert!(matches!(evaluate_wager(&w, &results), WagerVerdict::Lost(_)));

        results.insert(2, result(60, 50));
        assert!(matches!(evaluate_wager(&w, &results), WagerVerdict::Won(_)));
    }

    #[test]
    fn test_malformed_leg_loses_combined() {
        let w = wager(vec![
            (1, Predicate::WinnerHome),
            (
                1,
                Predicate::LegacyRaw {
                    category: "exact_score".into(),
                    prediction: "exact".into(),
                },
            ),
        ]);
        let results = HashMap::from([(1, result(200, 100))]);
        match evaluate_wager(&w, &results) {
            WagerVerdict::Lost(reason) => assert!(reason.contains("no score embedded")),
            other => panic!("expected loss, got {:?}", other),
        }
    }

    #[test]
    fn test_request_validation() {
        let ok = PlaceWager {
            user_id: 1,
            legs: vec![WagerLeg {
                match_id: 1,
                predicate: Predicate::WinnerDraw,
            }],
            stake: 5.0,
            odds: 12.0,
        };
        assert!(ok.validate().is_ok());
        assert!(PlaceWager { stake: 0.0, ..ok.clone() }.validate().is_err());
        assert!(PlaceWager { odds: 1.0, ..ok.clone() }.validate().is_err());
        assert!(PlaceWager { legs: vec![], ..ok }.validate().is_err());
    }
}
