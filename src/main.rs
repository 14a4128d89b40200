//! League - Virtual Clock & Settlement Engine CLI
//!
//! Usage:
//!   league state
//!   league advance --hours 6
//!   league advance --next-match
//!   league finalize 12 --home 150 --away 90 --catch home --duration 45
//!   league wager 1 --leg 12:winner:home --leg 13:total_points:over_300 --stake 20 --odds 3.1
//!   league run

use anyhow::{bail, Context, Result};
use chrono::Duration;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use league_backend::league::{
    forecasts::submit_forecast,
    shared_rng, spawn_auto_advance,
    standings::recompute_standings,
    wagers::{place_wager, PlaceWager},
    AdvanceOptions, FinalizeOutcome, LeagueConfig, LeagueError, MatchResolution, Predicate,
    VirtualClock,
};
use league_backend::models::{
    ClockSpeed, Config, MatchOutcome, MatchResult, Side, StrengthProfile, WagerLeg,
};
use league_backend::store::LeagueDb;

/// Virtual clock and settlement engine for a simulated league
#[derive(Parser, Debug)]
#[command(name = "league")]
#[command(about = "Advance simulated time and settle matches, wagers and forecasts")]
struct Cli {
    /// SQLite database path (overrides DATABASE_PATH)
    #[arg(long)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

const MAX_ADVANCE_HOURS: i64 = 100 * 366 * 24;

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the clock state
    State,

    /// Move simulated time forward, finalizing due matches
    Advance {
        /// Hours to move; bounded to a century either way
        #[arg(
            long,
            conflicts_with = "next_match",
            allow_negative_numbers = true,
            value_parser = clap::value_parser!(i64).range(-MAX_ADVANCE_HOURS..=MAX_ADVANCE_HOURS)
        )]
        hours: Option<i64>,

        /// Jump to the next scheduled kick-off
        #[arg(long)]
        next_match: bool,

        /// Move time without finalizing anything
        #[arg(long)]
        no_simulate: bool,
    },

    /// Set the auto-advance speed
    Speed {
        #[arg(value_enum)]
        speed: SpeedArg,
    },

    /// Turn auto-advance on or off
    Auto {
        #[arg(value_enum)]
        mode: Toggle,
    },

    /// Finalize a match, simulated unless a score is given
    Finalize {
        match_id: i64,
        #[arg(long, requires_all = ["away", "duration"])]
        home: Option<u32>,
        #[arg(long, requires = "home")]
        away: Option<u32>,
        #[arg(long, value_enum, default_value = "none")]
        catch: CatchArg,
        #[arg(long, requires = "home")]
        duration: Option<u32>,
    },

    /// Return a finished match to scheduled
    Reset { match_id: i64 },

    /// Postpone a scheduled match and refund its wagers
    Postpone { match_id: i64 },

    /// Start a season now if none is active
    GenerateSeason {
        /// Ignore the auto-advance switch
        #[arg(long)]
        force: bool,
    },

    AddTeam {
        name: String,
        /// attack,defense,keeper,seeker,chaser,beater (0-100)
        #[arg(long)]
        skills: Option<String>,
    },

    AddUser { username: String },

    /// Place a single or combined wager
    Wager {
        user_id: i64,
        /// MATCH:CATEGORY:PREDICTION, repeat for a combined wager
        #[arg(long = "leg", required = true)]
        legs: Vec<String>,
        #[arg(long)]
        stake: f64,
        #[arg(long)]
        odds: f64,
    },

    Forecast {
        user_id: i64,
        match_id: i64,
        #[arg(value_enum)]
        outcome: OutcomeArg,
        confidence: u8,
    },

    /// Recompute and print a season table
    Standings { season_id: i64 },

    /// Run the auto-advance loop until Ctrl-C
    Run,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SpeedArg {
    Slow,
    Medium,
    Fast,
}

impl From<SpeedArg> for ClockSpeed {
    fn from(arg: SpeedArg) -> Self {
        match arg {
            SpeedArg::Slow => ClockSpeed::Slow,
            SpeedArg::Medium => ClockSpeed::Medium,
            SpeedArg::Fast => ClockSpeed::Fast,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Toggle {
    On,
    Off,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CatchArg {
    Home,
    Away,
    None,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutcomeArg {
    Home,
    Away,
    Draw,
}

impl From<OutcomeArg> for MatchOutcome {
    fn from(arg: OutcomeArg) -> Self {
        match arg {
            OutcomeArg::Home => MatchOutcome::Home,
            OutcomeArg::Away => MatchOutcome::Away,
            OutcomeArg::Draw => MatchOutcome::Draw,
        }
    }
}

/// Initialize tracing; logs go to stderr so stdout stays JSON
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "league_backend=debug,league=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `a,d,k,s,c,b` into a profile; every skill must be 0-100.
fn parse_skills(text: &str) -> Result<StrengthProfile> {
    let skills = text
        .split(',')
        .map(|s| s.trim().parse::<u8>())
        .collect::<Result<Vec<u8>, _>>()
        .with_context(|| format!("invalid skills '{}'", text))?;
    if skills.len() != 6 || skills.iter().any(|&s| s > 100) {
        bail!("expected six skills between 0 and 100, got '{}'", text);
    }
    Ok(StrengthProfile {
        attack: skills[0],
        defense: skills[1],
        keeper: skills[2],
        seeker: skills[3],
        chaser: skills[4],
        beater: skills[5],
    })
}

/// `MATCH:CATEGORY:PREDICTION` into a wager leg.
fn parse_leg(text: &str) -> Result<WagerLeg> {
    let mut parts = text.splitn(3, ':');
    let (Some(match_id), Some(category), Some(prediction)) =
        (parts.next(), parts.next(), parts.next())
    else {
        bail!("leg '{}' must look like MATCH:CATEGORY:PREDICTION", text);
    };
    let match_id = match_id
        .trim()
        .parse::<i64>()
        .with_context(|| format!("invalid match id in leg '{}'", text))?;
    let predicate = Predicate::parse_legacy(category, prediction)
        .map_err(|e| LeagueError::InvalidWager(e.to_string()))?;
    Ok(WagerLeg {
        match_id,
        predicate,
    })
}

fn manual_result(home: u32, away: u32, catch: CatchArg, duration: u32) -> MatchResult {
    MatchResult {
        home_score: home,
        away_score: away,
        catcher: match catch {
            CatchArg::Home => Some(Side::Home),
            CatchArg::Away => Some(Side::Away),
            CatchArg::None => None,
        },
        duration_minutes: duration,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    let league_config = LeagueConfig::load_or_default(&config.league_config_path);
    let db_path = cli.db.unwrap_or(config.database_path);

    let db = LeagueDb::new(&db_path).with_context(|| format!("open database {}", db_path))?;
    let rng = shared_rng(config.rng_seed);
    let clock = Arc::new(VirtualClock::open(db.clone(), league_config.clone(), rng).await?);

    match cli.command {
        Commands::State => print_json(&clock.state().await)?,

        Commands::Advance {
            hours,
            next_match,
            no_simulate,
        } => {
            let mut options = match hours {
                Some(h) => AdvanceOptions::by(Duration::hours(h)),
                None if next_match => AdvanceOptions::next_match(),
                None => AdvanceOptions::default(),
            };
            options.simulate = !no_simulate;
            let report = clock.advance(options).await?;
            for e in &report.errors {
                warn!("{}", e);
            }
            print_json(&report)?;
        }

        Commands::Speed { speed } => print_json(&clock.set_speed(speed.into()).await?)?,

        Commands::Auto { mode } => {
            let enabled = matches!(mode, Toggle::On);
            print_json(&clock.set_auto_advance(enabled).await?)?
        }

        Commands::Finalize {
            match_id,
            home,
            away,
            catch,
            duration,
        } => {
            let resolution = match (home, away, duration) {
                (Some(h), Some(a), Some(d)) => {
                    MatchResolution::Manual(manual_result(h, a, catch, d))
                }
                _ => MatchResolution::Simulate,
            };
            match clock.finalizer().finalize(match_id, resolution).await? {
                FinalizeOutcome::Finalized(report) => print_json(&report)?,
                FinalizeOutcome::AlreadySettled => {
                    print_json(&json!({ "match_id": match_id, "already_settled": true }))?
                }
            }
        }

        Commands::Reset { match_id } => {
            let reset = clock.finalizer().reset_match(match_id).await?;
            print_json(&json!({ "match_id": match_id, "reset": reset }))?;
        }

        Commands::Postpone { match_id } => {
            print_json(&clock.finalizer().postpone_match(match_id).await?)?
        }

        Commands::GenerateSeason { force } => {
            let season = clock.start_season(force).await?;
            if season.is_none() {
                info!("No season generated");
            }
            print_json(&season)?;
        }

        Commands::AddTeam { name, skills } => {
            let profile = match skills {
                Some(text) => parse_skills(&text)?,
                None => StrengthProfile::uniform(50),
            };
            print_json(&db.insert_team(&name, &profile).await?)?
        }

        Commands::AddUser { username } => {
            print_json(&db.create_user(&username, league_config.starting_balance).await?)?
        }

        Commands::Wager {
            user_id,
            legs,
            stake,
            odds,
        } => {
            let legs = legs
                .iter()
                .map(|text| parse_leg(text))
                .collect::<Result<Vec<_>>>()?;
            let wager = place_wager(
                &db,
                PlaceWager {
                    user_id,
                    legs,
                    stake,
                    odds,
                },
            )
            .await?;
            print_json(&wager)?;
        }

        Commands::Forecast {
            user_id,
            match_id,
            outcome,
            confidence,
        } => {
            let forecast = submit_forecast(
                &db,
                &league_config,
                user_id,
                match_id,
                outcome.into(),
                confidence,
            )
            .await?;
            print_json(&forecast)?;
        }

        Commands::Standings { season_id } => {
            print_json(&recompute_standings(&db, season_id).await?)?
        }

        Commands::Run => {
            let tick = std::time::Duration::from_secs(league_config.auto_advance_tick_secs.max(1));
            info!(
                db = %db_path,
                tick_secs = tick.as_secs(),
                "Starting auto-advance loop"
            );
            let handle = spawn_auto_advance(clock.clone(), tick);
            tokio::signal::ctrl_c()
                .await
                .context("listen for shutdown signal")?;
            handle.abort();
            info!("Shutdown requested, auto-advance stopped");
        }
    }

    Ok(())
}
