//! League Backend Library
//!
//! Virtual clock and settlement engine for a simulated league.
//! Exposes the engine and its store for the CLI binary and tests.

pub mod league;
pub mod models;
pub mod store;
