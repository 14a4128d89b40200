//! League engine configuration
//!
//! Tunables for simulation, scoring, season generation and auto-advance.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeagueConfig {
    /// Forecast points per unit of confidence
    #[serde(default = "default_point_multiplier")]
    pub forecast_point_multiplier: u32,

    /// Highest confidence a forecast may declare
    #[serde(default = "default_max_confidence")]
    pub max_forecast_confidence: u8,

    /// Probability that a match ends with a special catch
    #[serde(default = "default_catch_chance")]
    pub catch_chance: f64,

    #[serde(default = "default_season_length_days")]
    pub season_length_days: i64,

    #[serde(default = "default_min_teams")]
    pub min_teams_for_season: usize,

    /// Real seconds between auto-advance ticks
    #[serde(default = "default_tick_secs")]
    pub auto_advance_tick_secs: u64,

    /// Balance credited to newly registered users
    #[serde(default = "default_starting_balance")]
    pub starting_balance: f64,

    #[serde(default)]
    pub odds: OddsConfig,
}

fn default_point_multiplier() -> u32 {
    10
}

fn default_max_confidence() -> u8 {
    10
}

fn default_catch_chance() -> f64 {
    0.9
}

fn default_season_length_days() -> i64 {
    90
}

fn default_min_teams() -> usize {
    4
}

fn default_tick_secs() -> u64 {
    5
}

fn default_starting_balance() -> f64 {
    1_000.0
}

impl Default for LeagueConfig {
    fn default() -> Self {
        Self {
            forecast_point_multiplier: default_point_multiplier(),
            max_forecast_confidence: default_max_confidence(),
            catch_chance: default_catch_chance(),
            season_length_days: default_season_length_days(),
            min_teams_for_season: default_min_teams(),
            auto_advance_tick_secs: default_tick_secs(),
            starting_balance: default_starting_balance(),
            odds: OddsConfig::default(),
        }
    }
}

impl LeagueConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the given path, or fall back to defaults
    pub fn load_or_default(path: &str) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::debug!("Using default league config ({}): {}", path, e);
            Self::default()
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.catch_chance) {
            anyhow::bail!("catch_chance must be within [0, 1], got {}", self.catch_chance);
        }
        if self.season_length_days < 1 {
            anyhow::bail!("season_length_days must be at least 1");
        }
        if self.min_teams_for_season < 2 {
            anyhow::bail!("min_teams_for_season must be at least 2");
        }
        if self.max_forecast_confidence == 0 {
            anyhow::bail!("max_forecast_confidence must be positive");
        }
        self.odds.validate()
    }
}

/// Inclusive bounds for one randomized fixture price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OddsRange {
    pub min: f64,
    pub max: f64,
}

impl OddsRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn validate(&self, name: &str) -> anyhow::Result<()> {
        if !(self.min > 1.0 && self.max >= self.min) {
            anyhow::bail!(
                "odds.{} must satisfy 1 < min <= max, got [{}, {}]",
                name,
                self.min,
                self.max
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsConfig {
    #[serde(default = "default_home_win")]
    pub home_win: OddsRange,
    #[serde(default = "default_draw")]
    pub draw: OddsRange,
    #[serde(default = "default_away_win")]
    pub away_win: OddsRange,
    #[serde(default = "default_total")]
    pub total_over: OddsRange,
    #[serde(default = "default_total")]
    pub total_under: OddsRange,
    #[serde(default = "default_special_catch")]
    pub special_catch: OddsRange,
}

fn default_home_win() -> OddsRange {
    OddsRange::new(1.4, 3.6)
}

fn default_draw() -> OddsRange {
    OddsRange::new(8.0, 20.0)
}

fn default_away_win() -> OddsRange {
    OddsRange::new(1.6, 4.2)
}

fn default_total() -> OddsRange {
    OddsRange::new(1.7, 2.2)
}

fn default_special_catch() -> OddsRange {
    OddsRange::new(1.5, 2.5)
}

impl Default for OddsConfig {
    fn default() -> Self {
        Self {
            home_win: default_home_win(),
            draw: default_draw(),
            away_win: default_away_win(),
            total_over: default_total(),
            total_under: default_total(),
            special_catch: default_special_catch(),
        }
    }
}

impl OddsConfig {
    fn validate(&self) -> anyhow::Result<()> {
        self.home_win.validate("home_win")?;
        self.draw.validate("draw")?;
        self.away_win.validate("away_win")?;
        self.total_over.validate("total_over")?;
        self.total_under.validate("total_under")?;
        self.special_catch.validate("special_catch")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        LeagueConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "forecast_point_multiplier = 25\n\n[odds.draw]\nmin = 5.0\nmax = 9.0"
        )
        .unwrap();

        let config = LeagueConfig::load(file.path()).unwrap();
        assert_eq!(config.forecast_point_multiplier, 25);
        assert_eq!(config.odds.draw, OddsRange::new(5.0, 9.0));
        assert_eq!(config.odds.home_win, default_home_win());
        assert_eq!(config.season_length_days, 90);
    }

    #[test]
    fn test_invalid_catch_chance_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "catch_chance = 1.5").unwrap();
        assert!(LeagueConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = LeagueConfig::load_or_default("/nonexistent/league.toml");
        assert_eq!(config.min_teams_for_season, 4);
    }
}
