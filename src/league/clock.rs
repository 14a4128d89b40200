//! Virtual Clock
//!
//! Owns simulated time. Advancing finalizes every match that became due in
//! chronological order, then commits the new time. Calls on one clock are
//! serialized; the conditional finalize write keeps two clocks on the same
//! database from double-settling.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::league::config::LeagueConfig;
use crate::league::finalizer::{FinalizeOutcome, MatchFinalizer, MatchResolution, SharedRng};
use crate::league::pipeline::{Stage, StageError};
use crate::league::season::{create_season, plan_season};
use crate::league::sim_time::{datetime_to_millis, millis_to_datetime, SimClock, MILLIS_PER_DAY};
use crate::models::{ClockSpeed, Season, VirtualClockState};
use crate::store::LeagueDb;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceOptions {
    /// Move by exactly this much; must not be negative
    pub delta: Option<Duration>,
    /// Without `delta`, jump to the next scheduled kick-off
    pub until_next_match: bool,
    /// Finalize due matches on the way
    pub simulate: bool,
}

impl Default for AdvanceOptions {
    fn default() -> Self {
        Self {
            delta: None,
            until_next_match: false,
            simulate: true,
        }
    }
}

impl AdvanceOptions {
    pub fn by(delta: Duration) -> Self {
        Self {
            delta: Some(delta),
            ..Default::default()
        }
    }

    pub fn next_match() -> Self {
        Self {
            until_next_match: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvanceReport {
    pub previous_time: DateTime<Utc>,
    pub new_time: DateTime<Utc>,
    pub simulated_match_ids: Vec<i64>,
    pub errors: Vec<StageError>,
}

pub struct VirtualClock {
    db: LeagueDb,
    config: LeagueConfig,
    finalizer: MatchFinalizer,
    rng: SharedRng,
    /// Cached singleton; the lock also serializes advances
    state: Mutex<VirtualClockState>,
}

impl VirtualClock {
    /// Load the persisted clock, or start one at the current wall-clock hour.
    pub async fn open(db: LeagueDb, config: LeagueConfig, rng: SharedRng) -> Result<Self> {
        let state = match db.load_clock_state().await.context("load clock state")? {
            Some(state) => state,
            None => {
                let now = Utc::now();
                let start = now.duration_trunc(Duration::hours(1)).unwrap_or(now);
                let state = VirtualClockState::starting_at(start);
                db.save_clock_state(&state).await?;
                info!(start = %start, "Virtual clock initialized");
                state
            }
        };

        Ok(Self {
            finalizer: MatchFinalizer::new(db.clone(), &config, rng.clone()),
            db,
            config,
            rng,
            state: Mutex::new(state),
        })
    }

    pub fn finalizer(&self) -> &MatchFinalizer {
        &self.finalizer
    }

    pub fn config(&self) -> &LeagueConfig {
        &self.config
    }

    pub async fn state(&self) -> VirtualClockState {
        self.state.lock().await.clone()
    }

    /// Move simulated time forward, finalizing due matches first.
    ///
    /// Due means `current < scheduled_at <= candidate`, taken in
    /// `(scheduled_at, id)` order. Finalize failures are reported and do not
    /// stop the batch or the clock.
    pub async fn advance(&self, options: AdvanceOptions) -> Result<AdvanceReport> {
        let mut state = self.state.lock().await;
        let previous_time = state.current_time;
        let mut clock = SimClock::from_datetime(&previous_time);

        let candidate = match options.delta {
            Some(delta) => clock.peek_by(delta.num_milliseconds())?,
            None => {
                let next = if options.until_next_match {
                    self.db.next_scheduled_after(&previous_time).await?
                } else {
                    None
                };
                match next {
                    Some(at) => datetime_to_millis(&at),
                    None => clock.peek_by(MILLIS_PER_DAY)?,
                }
            }
        };
        let candidate_time = millis_to_datetime(candidate);

        let mut simulated_match_ids = Vec::new();
        let mut errors = Vec::new();
        if options.simulate {
            let due = self
                .db
                .list_due_matches(&previous_time, &candidate_time)
                .await
                .context("load due matches")?;
            debug!(count = due.len(), until = %candidate_time, "Matches due");

            for m in &due {
                match self.finalizer.finalize(m.id, MatchResolution::Simulate).await {
                    Ok(FinalizeOutcome::Finalized(report)) => {
                        simulated_match_ids.push(m.id);
                        errors.extend(report.errors);
                    }
                    Ok(FinalizeOutcome::AlreadySettled) => {}
                    Err(e) => {
                        error!(match_id = m.id, "Finalize failed: {:#}", e);
                        errors.push(StageError::new(Stage::Finalize, m.id, &e));
                    }
                }
            }
        }

        clock.advance_to(candidate)?;
        state.current_time = clock.now_datetime();
        state.last_update = Utc::now();
        self.sync_active_season(&mut state).await?;
        self.db
            .save_clock_state(&state)
            .await
            .context("persist clock state")?;

        info!(
            from = %previous_time,
            to = %state.current_time,
            simulated = simulated_match_ids.len(),
            errors = errors.len(),
            "Clock advanced"
        );
        Ok(AdvanceReport {
            previous_time,
            new_time: state.current_time,
            simulated_match_ids,
            errors,
        })
    }

    /// Point `active_season_id` at the active season, clearing a stale one.
    async fn sync_active_season(&self, state: &mut VirtualClockState) -> Result<()> {
        let active = self.db.active_season().await?.map(|s| s.id);
        if active != state.active_season_id {
            debug!(
                previous = ?state.active_season_id,
                current = ?active,
                "Active season changed"
            );
            state.active_season_id = active;
        }
        Ok(())
    }

    pub async fn set_speed(&self, speed: ClockSpeed) -> Result<VirtualClockState> {
        let mut state = self.state.lock().await;
        state.speed = speed;
        state.last_update = Utc::now();
        self.db.save_clock_state(&state).await?;
        info!(speed = speed.as_str(), "Clock speed set");
        Ok(state.clone())
    }

    pub async fn set_auto_advance(&self, enabled: bool) -> Result<VirtualClockState> {
        let mut state = self.state.lock().await;
        state.auto_advance = enabled;
        state.last_update = Utc::now();
        self.db.save_clock_state(&state).await?;
        info!(enabled, "Auto-advance toggled");
        Ok(state.clone())
    }

    /// Start a season when auto mode is on, none is active and enough teams exist.
    pub async fn generate_season_if_needed(&self) -> Result<Option<Season>> {
        self.start_season(false).await
    }

    /// Like `generate_season_if_needed`; `force` skips the auto mode check.
    pub async fn start_season(&self, force: bool) -> Result<Option<Season>> {
        let mut state = self.state.lock().await;
        if !force && !state.auto_advance {
            return Ok(None);
        }

        if let Some(active) = self.db.active_season().await? {
            state.active_season_id = Some(active.id);
            self.db.save_clock_state(&state).await?;
            return Ok(None);
        }

        let teams = self.db.list_teams().await?;
        if teams.len() < self.config.min_teams_for_season {
            debug!(
                teams = teams.len(),
                required = self.config.min_teams_for_season,
                "Not enough teams for a season"
            );
            return Ok(None);
        }

        let team_ids: Vec<i64> = teams.iter().map(|t| t.id).collect();
        let name = format!("Season {}", state.current_time.format("%Y-%m-%d"));
        let plan = {
            let mut rng = self.rng.lock();
            plan_season(name, &team_ids, &self.config, state.current_time, &mut *rng)
        };
        let season = create_season(&self.db, &plan).await?;

        state.active_season_id = Some(season.id);
        self.db.save_clock_state(&state).await?;
        Ok(Some(season))
    }
}

/// Advance by the speed step every `tick` while auto-advance is on.
pub fn spawn_auto_advance(clock: Arc<VirtualClock>, tick: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            let state = clock.state().await;
            if !state.auto_advance {
                continue;
            }

            if let Err(e) = clock.generate_season_if_needed().await {
                warn!("Season generation failed: {:#}", e);
            }

            match clock.advance(AdvanceOptions::by(state.speed.step())).await {
                Ok(report) if !report.errors.is_empty() => {
                    warn!(
                        to = %report.new_time,
                        errors = report.errors.len(),
                        "Auto-advance tick had settlement errors"
                    );
                }
                Ok(report) => {
                    debug!(to = %report.new_time, simulated = report.simulated_match_ids.len(), "Auto-advance tick");
                }
                Err(e) => error!("Auto-advance failed: {:#}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::league::error::LeagueError;
    use crate::league::finalizer::shared_rng;
    use crate::models::{MatchOdds, MatchStatus, StrengthProfile};
    use crate::store::NewMatch;

    async fn clock_with_teams(n: usize) -> (LeagueDb, VirtualClock) {
        let db = LeagueDb::in_memory().unwrap();
        for i in 0..n {
            db.insert_team(&format!("Team {}", i), &StrengthProfile::uniform(50 + i as u8 * 5))
                .await
                .unwrap();
        }
        let clock = VirtualClock::open(db.clone(), LeagueConfig::default(), shared_rng(Some(1)))
            .await
            .unwrap();
        (db, clock)
    }

    #[tokio::test]
    async fn test_negative_delta_rejected() {
        let (_db, clock) = clock_with_teams(0).await;
        let before = clock.state().await;
        let err = clock
            .advance(AdvanceOptions::by(Duration::hours(-1)))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LeagueError>(),
            Some(LeagueError::InvalidAdvance(_))
        ));
        assert_eq!(clock.state().await.current_time, before.current_time);
    }

    #[tokio::test]
    async fn test_default_advance_is_one_day() {
        let (_db, clock) = clock_with_teams(0).await;
        let before = clock.state().await.current_time;
        let report = clock.advance(AdvanceOptions::default()).await.unwrap();
        assert_eq!(report.new_time - before, Duration::days(1));
        assert!(report.simulated_match_ids.is_empty());
    }

    #[tokio::test]
    async fn test_due_matches_finalize_in_order() {
        let (db, clock) = clock_with_teams(2).await;
        let now = clock.state().await.current_time;
        let teams = db.list_teams().await.unwrap();

        let mut ids = Vec::new();
        for hours in [5, 1, 3] {
            let m = db
                .create_match(&NewMatch {
                    season_id: 1,
                    home_team_id: teams[0].id,
                    away_team_id: teams[1].id,
                    scheduled_at: now + Duration::hours(hours),
                    odds: MatchOdds::default(),
                })
                .await
                .unwrap();
            ids.push(m.id);
        }

        let report = clock.advance(AdvanceOptions::by(Duration::hours(4))).await.unwrap();
        assert_eq!(report.simulated_match_ids, vec![ids[1], ids[2]]);
        let later = db.get_match(ids[0]).await.unwrap().unwrap();
        assert_eq!(later.status, MatchStatus::Scheduled);

        let report = clock.advance(AdvanceOptions::next_match()).await.unwrap();
        assert_eq!(report.new_time, now + Duration::hours(5));
        assert_eq!(report.simulated_match_ids, vec![ids[0]]);
    }

    #[tokio::test]
    async fn test_no_simulate_moves_time_only() {
        let (db, clock) = clock_with_teams(2).await;
        let now = clock.state().await.current_time;
        let teams = db.list_teams().await.unwrap();
        let m = db
            .create_match(&NewMatch {
                season_id: 1,
                home_team_id: teams[0].id,
                away_team_id: teams[1].id,
                scheduled_at: now + Duration::hours(1),
                odds: MatchOdds::default(),
            })
            .await
            .unwrap();

        let report = clock
            .advance(AdvanceOptions {
                simulate: false,
                ..AdvanceOptions::by(Duration::hours(2))
            })
            .await
            .unwrap();
        assert!(report.simulated_match_ids.is_empty());
        assert_eq!(
            db.get_match(m.id).await.unwrap().unwrap().status,
            MatchStatus::Scheduled
        );
    }

    #[tokio::test]
    async fn test_season_generation_requires_auto_and_teams() {
        let (_db, clock) = clock_with_teams(3).await;
        assert!(clock.generate_season_if_needed().await.unwrap().is_none());
        clock.set_auto_advance(true).await.unwrap();
        assert!(clock.generate_season_if_needed().await.unwrap().is_none());

        let (db, clock) = clock_with_teams(4).await;
        clock.set_auto_advance(true).await.unwrap();
        let season = clock.generate_season_if_needed().await.unwrap().unwrap();
        assert_eq!(clock.state().await.active_season_id, Some(season.id));
        assert_eq!(
            db.list_season_matches(season.id, None).await.unwrap().len(),
            12
        );
        assert!(clock.generate_season_if_needed().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_speed_persists() {
        let (db, clock) = clock_with_teams(0).await;
        clock.set_speed(ClockSpeed::Fast).await.unwrap();
        let stored = db.load_clock_state().await.unwrap().unwrap();
        assert_eq!(stored.speed, ClockSpeed::Fast);
    }
}
