//! League engine
//!
//! Simulated time, match finalization and everything settled downstream of
//! a final result: wagers, forecasts, standings, season close and archive.

pub mod clock;
pub mod config;
pub mod error;
pub mod finalizer;
pub mod forecasts;
pub mod history;
pub mod outcome;
pub mod pipeline;
pub mod predicate;
pub mod season;
pub mod sim_time;
pub mod standings;
pub mod wagers;

pub use clock::{spawn_auto_advance, AdvanceOptions, AdvanceReport, VirtualClock};
pub use config::LeagueConfig;
pub use error::LeagueError;
pub use finalizer::{shared_rng, FinalizeOutcome, MatchFinalizer, MatchResolution, SharedRng};
pub use pipeline::{SettlementReport, Stage, StageError};
pub use predicate::Predicate;
