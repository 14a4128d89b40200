//! Wager predicates
//!
//! One variant per registry kind, plus `LegacyRaw` for free-text wagers
//! created before the registry existed. Legacy text is parsed into the same
//! union at evaluation time, so both formats share one evaluator.
//!
//! Storage columns (`kind`, `line`, `category`, `selection`):
//! - registry: `kind` = snake_case id, thresholds in `line`, exact score and
//!   duration ranges as `"A-B"` in `selection`
//! - legacy: `kind` NULL, `category` + free-text `selection`

use serde::{Deserialize, Serialize};

use crate::models::{MatchResult, Side};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    WinnerHome,
    WinnerAway,
    WinnerDraw,
    SpecialCatchHome,
    SpecialCatchAway,
    SpecialCatchNone,
    TotalOver { line: f64 },
    TotalUnder { line: f64 },
    /// Minute threshold; fractional lines are allowed, as for totals
    DurationOver { line: f64 },
    DurationUnder { line: f64 },
    /// Inclusive minute range
    DurationBetween { min: u32, max: u32 },
    ExactScore { home: u32, away: u32 },
    LegacyRaw { category: String, prediction: String },
}

/// Legacy text that cannot be understood. Evaluates as a loss, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedPredicate {
    pub category: String,
    pub prediction: String,
    pub reason: String,
}

impl std::fmt::Display for MalformedPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "malformed {} prediction '{}': {}",
            self.category, self.prediction, self.reason
        )
    }
}

impl std::error::Error for MalformedPredicate {}

/// Result of judging one predicate against a finished match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub hit: bool,
    pub reason: String,
}

impl Verdict {
    fn new(hit: bool, reason: impl Into<String>) -> Self {
        Self {
            hit,
            reason: reason.into(),
        }
    }
}

/// Raw leg columns as persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegColumns {
    pub kind: Option<String>,
    pub line: Option<f64>,
    pub category: Option<String>,
    pub selection: Option<String>,
}

fn parse_pair(s: &str) -> Option<(u32, u32)> {
    let (a, b) = s.trim().split_once('-')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

fn parse_threshold(s: &str, prefix: &str) -> Option<f64> {
    let value: f64 = s.strip_prefix(prefix)?.trim().parse().ok()?;
    value.is_finite().then_some(value)
}

impl Predicate {
    /// Registry identifier; `None` for legacy free text.
    pub fn kind_id(&self) -> Option<&'static str> {
        Some(match self {
            Predicate::WinnerHome => "winner_home",
            Predicate::WinnerAway => "winner_away",
            Predicate::WinnerDraw => "winner_draw",
            Predicate::SpecialCatchHome => "special_catch_home",
            Predicate::SpecialCatchAway => "special_catch_away",
            Predicate::SpecialCatchNone => "special_catch_none",
            Predicate::TotalOver { .. } => "total_over",
            Predicate::TotalUnder { .. } => "total_under",
            Predicate::DurationOver { .. } => "duration_over",
            Predicate::DurationUnder { .. } => "duration_under",
            Predicate::DurationBetween { .. } => "duration_between",
            Predicate::ExactScore { .. } => "exact_score",
            Predicate::LegacyRaw { .. } => return None,
        })
    }

    pub fn to_columns(&self) -> LegColumns {
        let kind = self.kind_id().map(str::to_string);
        match self {
            Predicate::TotalOver { line }
            | Predicate::TotalUnder { line }
            | Predicate::DurationOver { line }
            | Predicate::DurationUnder { line } => LegColumns {
                kind,
                line: Some(*line),
                ..Default::default()
            },
            Predicate::DurationBetween { min, max } => LegColumns {
                kind,
                selection: Some(format!("{}-{}", min, max)),
                ..Default::default()
            },
            Predicate::ExactScore { home, away } => LegColumns {
                kind,
                selection: Some(format!("{}-{}", home, away)),
                ..Default::default()
            },
            Predicate::LegacyRaw {
                category,
                prediction,
            } => LegColumns {
                kind: None,
                line: None,
                category: Some(category.clone()),
                selection: Some(prediction.clone()),
            },
            _ => LegColumns {
                kind,
                ..Default::default()
            },
        }
    }

    /// Rebuild a predicate from stored columns.
    ///
    /// A registry row that cannot be rebuilt (unknown kind, missing line)
    /// degrades to `LegacyRaw` so it still resolves, as a malformed loss.
    pub fn from_columns(cols: &LegColumns) -> Predicate {
        let Some(kind) = cols.kind.as_deref() else {
            return Predicate::LegacyRaw {
                category: cols.category.clone().unwrap_or_default(),
                prediction: cols.selection.clone().unwrap_or_default(),
            };
        };

        let line = cols.line.filter(|l| l.is_finite() && *l >= 0.0);
        let pair = cols.selection.as_deref().and_then(parse_pair);
        let rebuilt = match (kind, line, pair) {
            ("winner_home", _, _) => Some(Predicate::WinnerHome),
            ("winner_away", _, _) => Some(Predicate::WinnerAway),
            ("winner_draw", _, _) => Some(Predicate::WinnerDraw),
            ("special_catch_home", _, _) => Some(Predicate::SpecialCatchHome),
            ("special_catch_away", _, _) => Some(Predicate::SpecialCatchAway),
            ("special_catch_none", _, _) => Some(Predicate::SpecialCatchNone),
            ("total_over", Some(line), _) => Some(Predicate::TotalOver { line }),
            ("total_under", Some(line), _) => Some(Predicate::TotalUnder { line }),
            ("duration_over", Some(line), _) => Some(Predicate::DurationOver { line }),
            ("duration_under", Some(line), _) => Some(Predicate::DurationUnder { line }),
            ("duration_between", _, Some((min, max))) => {
                Some(Predicate::DurationBetween { min, max })
            }
            ("exact_score", _, Some((home, away))) => Some(Predicate::ExactScore { home, away }),
            _ => None,
        };

        rebuilt.unwrap_or_else(|| Predicate::LegacyRaw {
            category: kind.to_string(),
            prediction: cols
                .selection
                .clone()
                .or_else(|| cols.line.map(|l| l.to_string()))
                .unwrap_or_default(),
        })
    }

    /// Parse legacy free text into a registry predicate.
    ///
    /// Categories: `winner` (home|away|draw), `special_catch` (home|away|none),
    /// `total_points` (over_N|under_N), `exact_score` (H-A), `duration`
    /// (A-B|over_N|under_N).
    pub fn parse_legacy(category: &str, prediction: &str) -> Result<Predicate, MalformedPredicate> {
        let malformed = |reason: &str| MalformedPredicate {
            category: category.to_string(),
            prediction: prediction.to_string(),
            reason: reason.to_string(),
        };
        let text = prediction.trim().to_ascii_lowercase();

        match category.trim().to_ascii_lowercase().as_str() {
            "winner" | "match_winner" => match text.as_str() {
                "home" => Ok(Predicate::WinnerHome),
                "away" => Ok(Predicate::WinnerAway),
                "draw" => Ok(Predicate::WinnerDraw),
                _ => Err(malformed("expected home, away or draw")),
            },
            "special_catch" | "catch" => match text.as_str() {
                "home" => Ok(Predicate::SpecialCatchHome),
                "away" => Ok(Predicate::SpecialCatchAway),
                "none" => Ok(Predicate::SpecialCatchNone),
                _ => Err(malformed("expected home, away or none")),
            },
            "total_points" | "total" => {
                if let Some(line) = parse_threshold(&text, "over_") {
                    Ok(Predicate::TotalOver { line })
                } else if let Some(line) = parse_threshold(&text, "under_") {
                    Ok(Predicate::TotalUnder { line })
                } else {
                    Err(malformed("expected over_N or under_N"))
                }
            }
            "exact_score" | "exact" => {
                if text == "exact" {
                    return Err(malformed("no score embedded"));
                }
                parse_pair(&text)
                    .map(|(home, away)| Predicate::ExactScore { home, away })
                    .ok_or_else(|| malformed("expected HOME-AWAY"))
            }
            "duration" => {
                if let Some(line) = parse_threshold(&text, "over_") {
                    Ok(Predicate::DurationOver { line })
                } else if let Some(line) = parse_threshold(&text, "under_") {
                    Ok(Predicate::DurationUnder { line })
                } else {
                    match parse_pair(&text) {
                        Some((min, max)) if min <= max => {
                            Ok(Predicate::DurationBetween { min, max })
                        }
                        Some(_) => Err(malformed("range start after range end")),
                        None => Err(malformed("expected A-B, over_N or under_N")),
                    }
                }
            }
            other => Err(malformed(&format!("unknown category '{}'", other))),
        }
    }

    /// Judge this predicate against a finished match result.
    pub fn evaluate(&self, result: &MatchResult) -> Verdict {
        let total = result.total_points() as f64;
        let duration = result.duration_minutes;
        match self {
            Predicate::WinnerHome => Verdict::new(
                result.home_score > result.away_score,
                format!("home {} vs away {}", result.home_score, result.away_score),
            ),
            Predicate::WinnerAway => Verdict::new(
                result.away_score > result.home_score,
                format!("home {} vs away {}", result.home_score, result.away_score),
            ),
            Predicate::WinnerDraw => Verdict::new(
                result.home_score == result.away_score,
                format!("home {} vs away {}", result.home_score, result.away_score),
            ),
            Predicate::SpecialCatchHome => Verdict::new(
                result.catcher == Some(Side::Home),
                catcher_reason(result),
            ),
            Predicate::SpecialCatchAway => Verdict::new(
                result.catcher == Some(Side::Away),
                catcher_reason(result),
            ),
            Predicate::SpecialCatchNone => {
                Verdict::new(result.catcher.is_none(), catcher_reason(result))
            }
            Predicate::TotalOver { line } => Verdict::new(
                total > *line,
                format!("total {} over {}", total, line),
            ),
            Predicate::TotalUnder { line } => Verdict::new(
                total < *line,
                format!("total {} under {}", total, line),
            ),
            Predicate::DurationOver { line } => Verdict::new(
                duration as f64 > *line,
                format!("duration {} over {}", duration, line),
            ),
            Predicate::DurationUnder { line } => Verdict::new(
                (duration as f64) < *line,
                format!("duration {} under {}", duration, line),
            ),
            Predicate::DurationBetween { min, max } => Verdict::new(
                (*min..=*max).contains(&duration),
                format!("duration {} within {}-{}", duration, min, max),
            ),
            Predicate::ExactScore { home, away } => Verdict::new(
                result.home_score == *home && result.away_score == *away,
                format!(
                    "final {}-{} vs picked {}-{}",
                    result.home_score, result.away_score, home, away
                ),
            ),
            Predicate::LegacyRaw {
                category,
                prediction,
            } => match Predicate::parse_legacy(category, prediction) {
                Ok(parsed) => parsed.evaluate(result),
                Err(malformed) => Verdict::new(false, malformed.to_string()),
            },
        }
    }
}

fn catcher_reason(result: &MatchResult) -> String {
    match result.catcher {
        Some(side) => format!("special catch by {}", side.as_str()),
        None => "no special catch".to_string(),
    }
}
