//! Outcome Generator
//!
//! Turns two strength profiles into a final score, an optional special catch,
//! a duration, and a minute-ordered event timeline. Pure: the caller owns the
//! random stream and all persistence.
//!
//! Model:
//! - Goals per side ~ Poisson(rate × duration / 10), where the rate grows with
//!   the side's attack+chaser and shrinks with the opponent's defense+keeper.
//! - A special catch happens with `catch_chance`; home catches with
//!   probability `(home.seeker + HOME_ADVANTAGE) / (home.seeker + HOME_ADVANTAGE + away.seeker)`.
//! - Duration is the catch minute, earlier when both seekers are strong, or
//!   `MAX_DURATION_MINUTES` when nobody catches.

use rand::distributions::Distribution;
use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Poisson;
use tracing::debug;

use crate::models::{EventKind, MatchEvent, MatchResult, Side, StrengthProfile};

pub const GOAL_POINTS: u32 = 10;
pub const SPECIAL_CATCH_POINTS: u32 = 150;
/// Seeker points added to the home side when weighting the catch
pub const HOME_ADVANTAGE: f64 = 5.0;
pub const MIN_DURATION_MINUTES: u32 = 20;
pub const MAX_DURATION_MINUTES: u32 = 120;

/// Goals per ten minutes for evenly matched sides
const BASE_GOAL_RATE: f64 = 1.2;
/// Fouls per thirty minutes at beater skill 50
const BASE_FOUL_RATE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeParams {
    pub catch_chance: f64,
}

impl Default for OutcomeParams {
    fn default() -> Self {
        Self { catch_chance: 0.9 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedOutcome {
    pub match_id: i64,
    pub result: MatchResult,
    pub events: Vec<MatchEvent>,
}

impl GeneratedOutcome {
    pub fn into_parts(self) -> (MatchResult, Vec<MatchEvent>) {
        (self.result, self.events)
    }
}

/// Probability that the home side makes the special catch, given one happens.
pub fn home_catch_probability(home: &StrengthProfile, away: &StrengthProfile) -> f64 {
    let home_weight = home.seeker as f64 + HOME_ADVANTAGE;
    let away_weight = away.seeker as f64;
    home_weight / (home_weight + away_weight)
}

fn goal_rate(attacker: &StrengthProfile, defender: &StrengthProfile) -> f64 {
    let offense = (attacker.attack as f64 + attacker.chaser as f64) / 2.0;
    let resistance = (defender.defense as f64 + defender.keeper as f64) / 2.0;
    let factor = 1.0 + (offense - resistance) / 100.0;
    (BASE_GOAL_RATE * factor).clamp(0.2, 3.0)
}

fn sample_count<R: Rng + ?Sized>(mean: f64, rng: &mut R) -> u32 {
    match Poisson::new(mean.max(0.01)) {
        Ok(dist) => dist.sample(rng).round() as u32,
        Err(_) => 0,
    }
}

fn catch_duration<R: Rng + ?Sized>(
    home: &StrengthProfile,
    away: &StrengthProfile,
    rng: &mut R,
) -> u32 {
    let seeker_mean = (home.seeker as f64 + away.seeker as f64) / 200.0;
    let span = (MAX_DURATION_MINUTES - MIN_DURATION_MINUTES) as f64;
    let expected = MAX_DURATION_MINUTES as f64 - span * 0.6 * seeker_mean;
    let jitter = rng.gen_range(-25.0..=25.0);
    (expected + jitter)
        .round()
        .clamp(MIN_DURATION_MINUTES as f64, MAX_DURATION_MINUTES as f64) as u32
}

fn push_events<R: Rng + ?Sized>(
    events: &mut Vec<MatchEvent>,
    count: u32,
    side: Side,
    kind: EventKind,
    duration: u32,
    rng: &mut R,
) {
    let (label, points) = match kind {
        EventKind::Goal => ("goal", GOAL_POINTS),
        EventKind::Foul => ("foul", 0),
        EventKind::SpecialCatch => ("special catch", SPECIAL_CATCH_POINTS),
    };
    for _ in 0..count {
        events.push(MatchEvent {
            minute: rng.gen_range(1..=duration.max(1)),
            side,
            kind,
            description: format!("{} {}", side.as_str(), label),
            points,
        });
    }
}

/// Simulate one match. Same profiles + same random stream => same outcome.
pub fn generate_outcome<R: Rng + ?Sized>(
    home: &StrengthProfile,
    away: &StrengthProfile,
    match_id: i64,
    params: &OutcomeParams,
    rng: &mut R,
) -> GeneratedOutcome {
    let catcher = if rng.gen_bool(params.catch_chance.clamp(0.0, 1.0)) {
        if rng.gen_bool(home_catch_probability(home, away)) {
            Some(Side::Home)
        } else {
            Some(Side::Away)
        }
    } else {
        None
    };

    let duration = match catcher {
        Some(_) => catch_duration(home, away, rng),
        None => MAX_DURATION_MINUTES,
    };
    let tens = duration as f64 / 10.0;

    let home_goals = sample_count(goal_rate(home, away) * tens, rng);
    let away_goals = sample_count(goal_rate(away, home) * tens, rng);
    let home_fouls = sample_count(
        BASE_FOUL_RATE * (duration as f64 / 30.0) * (0.5 + home.beater as f64 / 100.0),
        rng,
    );
    let away_fouls = sample_count(
        BASE_FOUL_RATE * (duration as f64 / 30.0) * (0.5 + away.beater as f64 / 100.0),
        rng,
    );

    let mut events = Vec::new();
    push_events(&mut events, home_goals, Side::Home, EventKind::Goal, duration, rng);
    push_events(&mut events, away_goals, Side::Away, EventKind::Goal, duration, rng);
    push_events(&mut events, home_fouls, Side::Home, EventKind::Foul, duration, rng);
    push_events(&mut events, away_fouls, Side::Away, EventKind::Foul, duration, rng);
    if let Some(side) = catcher {
        events.push(MatchEvent {
            minute: duration,
            side,
            kind: EventKind::SpecialCatch,
            description: format!("{} special catch", side.as_str()),
            points: SPECIAL_CATCH_POINTS,
        });
    }
    // The catch ends the match, so it sorts last within its minute.
    events.sort_by_key(|e| (e.minute, e.kind == EventKind::SpecialCatch));

    let catch_bonus = |side: Side| {
        if catcher == Some(side) {
            SPECIAL_CATCH_POINTS
        } else {
            0
        }
    };
    let result = MatchResult {
        home_score: home_goals * GOAL_POINTS + catch_bonus(Side::Home),
        away_score: away_goals * GOAL_POINTS + catch_bonus(Side::Away),
        catcher,
        duration_minutes: duration,
    };

    debug!(
        match_id,
        home_score = result.home_score,
        away_score = result.away_score,
        catcher = catcher.map(|s| s.as_str()).unwrap_or("none"),
        duration,
        "Generated match outcome"
    );

    GeneratedOutcome {
        match_id,
        result,
        events,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn profile(seeker: u8) -> StrengthProfile {
        StrengthProfile {
            seeker,
            ..StrengthProfile::uniform(70)
        }
    }

    #[test]
    fn test_same_seed_same_outcome() {
        let params = OutcomeParams::default();
        let a = generate_outcome(
            &profile(80),
            &profile(60),
            42,
            &params,
            &mut ChaCha8Rng::seed_from_u64(7),
        );
        let b = generate_outcome(
            &profile(80),
            &profile(60),
            42,
            &params,
            &mut ChaCha8Rng::seed_from_u64(7),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_scores_match_event_points() {
        let params = OutcomeParams::default();
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        for match_id in 0..200 {
            let outcome = generate_outcome(&profile(70), &profile(65), match_id, &params, &mut rng);
            let sum = |side: Side| -> u32 {
                outcome
                    .events
                    .iter()
                    .filter(|e| e.side == side)
                    .map(|e| e.points)
                    .sum()
            };
            assert_eq!(sum(Side::Home), outcome.result.home_score);
            assert_eq!(sum(Side::Away), outcome.result.away_score);
            assert_eq!(outcome.result.home_score % GOAL_POINTS, 0);
        }
    }

    #[test]
    fn test_events_are_chronological_and_within_duration() {
        let params = OutcomeParams::default();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for match_id in 0..100 {
            let outcome = generate_outcome(&profile(90), &profile(90), match_id, &params, &mut rng);
            let duration = outcome.result.duration_minutes;
            assert!((MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&duration));
            assert!(outcome.events.windows(2).all(|w| w[0].minute <= w[1].minute));
            assert!(outcome.events.iter().all(|e| e.minute <= duration));
            if outcome.result.catcher.is_some() {
                let last = outcome.events.last().unwrap();
                assert_eq!(last.kind, EventKind::SpecialCatch);
                assert_eq!(last.minute, duration);
            }
        }
    }

    #[test]
    fn test_no_catch_runs_full_duration() {
        let params = OutcomeParams { catch_chance: 0.0 };
        let outcome = generate_outcome(
            &profile(99),
            &profile(99),
            1,
            &params,
            &mut ChaCha8Rng::seed_from_u64(11),
        );
        assert_eq!(outcome.result.catcher, None);
        assert_eq!(outcome.result.duration_minutes, MAX_DURATION_MINUTES);
        assert!(outcome
            .events
            .iter()
            .all(|e| e.kind != EventKind::SpecialCatch));
    }

    #[test]
    fn test_stronger_seeker_catches_proportionally_more() {
        let params = OutcomeParams { catch_chance: 1.0 };
        let home = profile(95);
        let away = profile(75);
        let expected = home_catch_probability(&home, &away);
        let mut rng = ChaCha8Rng::seed_from_u64(2024);

        let mut home_catches = 0u32;
        let runs = 1000;
        for match_id in 0..runs {
            let outcome = generate_outcome(&home, &away, match_id as i64, &params, &mut rng);
            if outcome.result.catcher == Some(Side::Home) {
                home_catches += 1;
            }
        }

        let share = home_catches as f64 / runs as f64;
        assert!(share > 0.5, "stronger seeker share {}", share);
        assert!(
            (share - expected).abs() < 0.06,
            "share {} vs expected {}",
            share,
            expected
        );
    }

    #[test]
    fn test_weaker_home_seeker_still_gets_advantage() {
        let p = home_catch_probability(&profile(50), &profile(50));
        assert!(p > 0.5 && p < 0.55);
    }
}
