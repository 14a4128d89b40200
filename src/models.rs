use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::league::predicate::Predicate;

/// Which side of a fixture something belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "home" => Some(Side::Home),
            "away" => Some(Side::Away),
            _ => None,
        }
    }
}

/// Auto-advance speed of the virtual clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockSpeed {
    Slow,
    Medium,
    Fast,
}

impl ClockSpeed {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClockSpeed::Slow => "slow",
            ClockSpeed::Medium => "medium",
            ClockSpeed::Fast => "fast",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "slow" => Some(ClockSpeed::Slow),
            "medium" => Some(ClockSpeed::Medium),
            "fast" => Some(ClockSpeed::Fast),
            _ => None,
        }
    }

    /// Simulated time covered by one auto-advance tick
    pub fn step(&self) -> Duration {
        match self {
            ClockSpeed::Slow => Duration::hours(1),
            ClockSpeed::Medium => Duration::hours(6),
            ClockSpeed::Fast => Duration::days(1),
        }
    }
}

/// Persisted singleton describing simulated time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualClockState {
    pub current_time: DateTime<Utc>,
    pub speed: ClockSpeed,
    pub auto_advance: bool,
    pub last_update: DateTime<Utc>,
    pub active_season_id: Option<i64>,
}

impl VirtualClockState {
    pub fn starting_at(time: DateTime<Utc>) -> Self {
        Self {
            current_time: time,
            speed: ClockSpeed::Medium,
            auto_advance: false,
            last_update: time,
            active_season_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Finished,
    Postponed,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Live => "live",
            MatchStatus::Finished => "finished",
            MatchStatus::Postponed => "postponed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(MatchStatus::Scheduled),
            "live" => Some(MatchStatus::Live),
            "finished" => Some(MatchStatus::Finished),
            "postponed" => Some(MatchStatus::Postponed),
            _ => None,
        }
    }
}

/// Odds snapshot fixed when the fixture is created
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchOdds {
    pub home_win: f64,
    pub draw: f64,
    pub away_win: f64,
    pub total_over: f64,
    pub total_under: f64,
    pub special_catch: f64,
}

impl Default for MatchOdds {
    fn default() -> Self {
        Self {
            home_win: 2.0,
            draw: 4.0,
            away_win: 2.0,
            total_over: 1.9,
            total_under: 1.9,
            special_catch: 1.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: i64,
    pub season_id: i64,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub scheduled_at: DateTime<Utc>,
    pub status: MatchStatus,
    pub home_score: u32,
    pub away_score: u32,
    pub special_catch: bool,
    pub catcher: Option<Side>,
    pub duration_minutes: u32,
    pub consolidated: bool,
    pub odds: MatchOdds,
}

impl Match {
    /// Final result, available once the match is finished
    pub fn result(&self) -> Option<MatchResult> {
        if self.status != MatchStatus::Finished {
            return None;
        }
        Some(MatchResult {
            home_score: self.home_score,
            away_score: self.away_score,
            catcher: self.catcher,
            duration_minutes: self.duration_minutes,
        })
    }

    pub fn team_id(&self, side: Side) -> i64 {
        match side {
            Side::Home => self.home_team_id,
            Side::Away => self.away_team_id,
        }
    }
}

/// Home/away/draw as decided by strict score comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
    Home,
    Away,
    Draw,
}

impl MatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOutcome::Home => "home",
            MatchOutcome::Away => "away",
            MatchOutcome::Draw => "draw",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "home" => Some(MatchOutcome::Home),
            "away" => Some(MatchOutcome::Away),
            "draw" => Some(MatchOutcome::Draw),
            _ => None,
        }
    }
}

/// Final score line of a match, whichever path produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub home_score: u32,
    pub away_score: u32,
    pub catcher: Option<Side>,
    pub duration_minutes: u32,
}

impl MatchResult {
    pub fn outcome(&self) -> MatchOutcome {
        match self.home_score.cmp(&self.away_score) {
            std::cmp::Ordering::Greater => MatchOutcome::Home,
            std::cmp::Ordering::Less => MatchOutcome::Away,
            std::cmp::Ordering::Equal => MatchOutcome::Draw,
        }
    }

    pub fn total_points(&self) -> u32 {
        self.home_score.saturating_add(self.away_score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Goal,
    Foul,
    SpecialCatch,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Goal => "goal",
            EventKind::Foul => "foul",
            EventKind::SpecialCatch => "special_catch",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "goal" => Some(EventKind::Goal),
            "foul" => Some(EventKind::Foul),
            "special_catch" => Some(EventKind::SpecialCatch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEvent {
    pub minute: u32,
    pub side: Side,
    pub kind: EventKind,
    pub description: String,
    pub points: u32,
}

/// Six 0-100 skill dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrengthProfile {
    pub attack: u8,
    pub defense: u8,
    pub keeper: u8,
    pub seeker: u8,
    pub chaser: u8,
    pub beater: u8,
}

impl StrengthProfile {
    pub fn uniform(level: u8) -> Self {
        Self {
            attack: level,
            defense: level,
            keeper: level,
            seeker: level,
            chaser: level,
            beater: level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub profile: StrengthProfile,
}

/// Career totals for one team
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub team_id: i64,
    pub played: u32,
    pub won: u32,
    pub lost: u32,
    pub drawn: u32,
    pub points_for: u32,
    pub points_against: u32,
    pub special_catches: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingsRow {
    pub season_id: i64,
    pub team_id: i64,
    pub position: u32,
    pub played: u32,
    pub won: u32,
    pub lost: u32,
    pub drawn: u32,
    pub points_for: u32,
    pub points_against: u32,
    pub goal_difference: i64,
    pub points: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonStatus {
    Upcoming,
    Active,
    Finished,
}

impl SeasonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeasonStatus::Upcoming => "upcoming",
            SeasonStatus::Active => "active",
            SeasonStatus::Finished => "finished",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "upcoming" => Some(SeasonStatus::Upcoming),
            "active" => Some(SeasonStatus::Active),
            "finished" => Some(SeasonStatus::Finished),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Season {
    pub id: i64,
    pub name: String,
    pub status: SeasonStatus,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WagerStatus {
    Pending,
    Won,
    Lost,
    Cancelled,
}

impl WagerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WagerStatus::Pending => "pending",
            WagerStatus::Won => "won",
            WagerStatus::Lost => "lost",
            WagerStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(WagerStatus::Pending),
            "won" => Some(WagerStatus::Won),
            "lost" => Some(WagerStatus::Lost),
            "cancelled" => Some(WagerStatus::Cancelled),
            _ => None,
        }
    }
}

/// One predicate of a wager, bound to the match it is judged against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WagerLeg {
    pub match_id: i64,
    pub predicate: Predicate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wager {
    pub id: i64,
    pub user_id: i64,
    /// Primary match (first leg)
    pub match_id: i64,
    pub combined: bool,
    pub legs: Vec<WagerLeg>,
    pub stake: f64,
    pub odds: f64,
    pub potential_payout: f64,
    pub status: WagerStatus,
    pub placed_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastStatus {
    Pending,
    Correct,
    Incorrect,
}

impl ForecastStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastStatus::Pending => "pending",
            ForecastStatus::Correct => "correct",
            ForecastStatus::Incorrect => "incorrect",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ForecastStatus::Pending),
            "correct" => Some(ForecastStatus::Correct),
            "incorrect" => Some(ForecastStatus::Incorrect),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub id: i64,
    pub user_id: i64,
    pub match_id: i64,
    pub outcome: MatchOutcome,
    pub confidence: u8,
    pub status: ForecastStatus,
    pub points_awarded: u32,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// User account structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: i64,
    pub username: String,
    pub balance: f64,
    pub total_staked: f64,
    pub total_paid_out: f64,
    pub wager_count: i64,
    pub win_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    Stake,
    Payout,
    Loss,
    Refund,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Stake => "stake",
            LedgerKind::Payout => "payout",
            LedgerKind::Loss => "loss",
            LedgerKind::Refund => "refund",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "stake" => Some(LedgerKind::Stake),
            "payout" => Some(LedgerKind::Payout),
            "loss" => Some(LedgerKind::Loss),
            "refund" => Some(LedgerKind::Refund),
            _ => None,
        }
    }
}

/// Monetary movement against a user balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: i64,
    pub wager_id: Option<i64>,
    pub kind: LedgerKind,
    /// Signed balance change (zero for a recorded loss)
    pub amount: f64,
    pub balance_after: f64,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSeasonRecord {
    pub id: i64,
    pub season_id: i64,
    pub season_name: String,
    pub team_count: u32,
    pub match_count: u32,
    pub wager_count: u32,
    pub forecast_count: u32,
    pub revenue: f64,
    pub champion_team_id: Option<i64>,
    pub archived_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalTeamStats {
    pub team_id: i64,
    pub seasons_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub points_for: u32,
    pub points_against: u32,
    pub championships: u32,
    pub best_position: Option<u32>,
    pub worst_position: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalUserStats {
    pub user_id: i64,
    pub wagers_placed: u32,
    pub wagers_won: u32,
    pub wagers_lost: u32,
    pub total_staked: f64,
    pub total_paid_out: f64,
    pub net_profit: f64,
    pub forecasts_made: u32,
    pub forecasts_correct: u32,
    pub forecast_points: u32,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub league_config_path: String,
    pub rng_seed: Option<u64>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./league.db".to_string());

        let league_config_path =
            std::env::var("LEAGUE_CONFIG_PATH").unwrap_or_else(|_| "league.toml".to_string());

        let rng_seed = std::env::var("RNG_SEED")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok());

        Ok(Self {
            database_path,
            league_config_path,
            rng_seed,
        })
    }
}
