//! End-to-end settlement tests
//!
//! Drive the engine through the public API against an in-memory (or
//! temp-file) SQLite store: seasons played out by the clock, manual results,
//! concurrent finalizers, postponements and archive idempotence.

use chrono::{Duration, TimeZone, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tempfile::NamedTempFile;

use league_backend::league::{
    forecasts::submit_forecast,
    history::{archive_season, ArchiveOutcome},
    season::{create_season, plan_season},
    shared_rng,
    wagers::{place_wager, PlaceWager},
    AdvanceOptions, FinalizeOutcome, LeagueConfig, LeagueError, MatchFinalizer, MatchResolution,
    Predicate, Stage, VirtualClock,
};
use league_backend::models::{
    ClockSpeed, Forecast, ForecastStatus, LedgerEntry, LedgerKind, Match, MatchOutcome,
    MatchResult, MatchStatus, Season, SeasonStatus, Side, StandingsRow, StrengthProfile,
    UserAccount, WagerLeg, WagerStatus,
};
use league_backend::store::LeagueDb;

const STARTING_BALANCE: f64 = 1_000.0;

async fn seeded_league(db: &LeagueDb) -> (Season, Vec<Match>) {
    let mut team_ids = Vec::new();
    for (i, name) in ["Falcons", "Harpies", "Magpies", "Wasps"].iter().enumerate() {
        let team = db
            .insert_team(name, &StrengthProfile::uniform(60 + 5 * i as u8))
            .await
            .unwrap();
        team_ids.push(team.id);
    }

    let config = LeagueConfig::default();
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let plan = plan_season("Spring".into(), &team_ids, &config, start, &mut rng);
    let season = create_season(db, &plan).await.unwrap();
    let matches = db.list_season_matches(season.id, None).await.unwrap();
    (season, matches)
}

fn finalizer(db: &LeagueDb) -> MatchFinalizer {
    MatchFinalizer::new(db.clone(), &LeagueConfig::default(), shared_rng(Some(11)))
}

fn result(home: u32, away: u32, catcher: Option<Side>, duration: u32) -> MatchResult {
    MatchResult {
        home_score: home,
        away_score: away,
        catcher,
        duration_minutes: duration,
    }
}

/// Everything a settlement writes, read back for before/after comparison.
#[derive(Debug, PartialEq)]
struct SettledState {
    standings: Vec<StandingsRow>,
    accounts: Vec<UserAccount>,
    ledgers: Vec<Vec<LedgerEntry>>,
    forecasts: Vec<Forecast>,
}

async fn settled_state(
    db: &LeagueDb,
    season_id: i64,
    user_ids: &[i64],
    forecast_ids: &[i64],
) -> SettledState {
    let mut state = SettledState {
        standings: db.get_standings(season_id).await.unwrap(),
        accounts: Vec::new(),
        ledgers: Vec::new(),
        forecasts: Vec::new(),
    };
    for &id in user_ids {
        state.accounts.push(db.get_user(id).await.unwrap().unwrap());
        state.ledgers.push(db.list_ledger(id).await.unwrap());
    }
    for &id in forecast_ids {
        state.forecasts.push(db.get_forecast(id).await.unwrap().unwrap());
    }
    state
}

fn single(match_id: i64, predicate: Predicate, user_id: i64, stake: f64, odds: f64) -> PlaceWager {
    PlaceWager {
        user_id,
        legs: vec![WagerLeg {
            match_id,
            predicate,
        }],
        stake,
        odds,
    }
}

#[tokio::test]
async fn test_season_played_out_by_clock() {
    let db = LeagueDb::in_memory().unwrap();
    for (i, name) in ["Falcons", "Harpies", "Magpies", "Wasps", "Bats"].iter().enumerate() {
        db.insert_team(name, &StrengthProfile::uniform(55 + 8 * i as u8))
            .await
            .unwrap();
    }
    let user = db.create_user("ana", STARTING_BALANCE).await.unwrap();

    let clock = VirtualClock::open(db.clone(), LeagueConfig::default(), shared_rng(Some(42)))
        .await
        .unwrap();
    let season = clock.start_season(true).await.unwrap().unwrap();
    assert_eq!(clock.state().await.active_season_id, Some(season.id));

    let matches = db.list_season_matches(season.id, None).await.unwrap();
    assert_eq!(matches.len(), 20);
    let first = &matches[0];

    let wager = place_wager(
        &db,
        single(first.id, Predicate::WinnerHome, user.id, 10.0, first.odds.home_win),
    )
    .await
    .unwrap();
    let forecast = submit_forecast(
        &db,
        &LeagueConfig::default(),
        user.id,
        first.id,
        MatchOutcome::Home,
        5,
    )
    .await
    .unwrap();

    let mut simulated = Vec::new();
    for _ in 0..40 {
        let report = clock.advance(AdvanceOptions::next_match()).await.unwrap();
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        simulated.extend(report.simulated_match_ids);
        if db.count_open_matches(season.id).await.unwrap() == 0 {
            break;
        }
    }

    let ids: Vec<i64> = matches.iter().map(|m| m.id).collect();
    assert_eq!(simulated, ids, "matches settle in kick-off order, once each");

    let season = db.get_season(season.id).await.unwrap().unwrap();
    assert_eq!(season.status, SeasonStatus::Finished);
    assert_eq!(clock.state().await.active_season_id, None);

    let table = db.get_standings(season.id).await.unwrap();
    assert_eq!(table.len(), 5);
    for row in &table {
        assert_eq!(row.points, 3 * row.won + row.drawn);
        assert_eq!(row.played, 8);
    }

    let archive = db.list_historical_seasons().await.unwrap();
    assert_eq!(archive.len(), 1);
    assert_eq!(archive[0].match_count, 20);
    assert_eq!(archive[0].champion_team_id, Some(table[0].team_id));

    let wager = db.get_wager(wager.id).await.unwrap().unwrap();
    assert_ne!(wager.status, WagerStatus::Pending);
    let forecast = db.get_forecast(forecast.id).await.unwrap().unwrap();
    assert_ne!(forecast.status, ForecastStatus::Pending);

    let account = db.get_user(user.id).await.unwrap().unwrap();
    let expected = match wager.status {
        WagerStatus::Won => STARTING_BALANCE - 10.0 + wager.potential_payout,
        _ => STARTING_BALANCE - 10.0,
    };
    assert!((account.balance - expected).abs() < 1e-9);

    let stats = db.get_user_stats(user.id).await.unwrap().unwrap();
    assert_eq!(stats.wagers_placed, 1);
    assert_eq!(stats.forecasts_made, 1);
}

#[tokio::test]
async fn test_finalize_twice_settles_once() {
    let db = LeagueDb::in_memory().unwrap();
    let (season, matches) = seeded_league(&db).await;
    let user = db.create_user("ben", STARTING_BALANCE).await.unwrap();
    let m = &matches[0];

    let wager = place_wager(&db, single(m.id, Predicate::WinnerHome, user.id, 10.0, 2.0))
        .await
        .unwrap();
    let forecast = submit_forecast(
        &db,
        &LeagueConfig::default(),
        user.id,
        m.id,
        MatchOutcome::Home,
        4,
    )
    .await
    .unwrap();

    let finalizer = finalizer(&db);
    let manual = MatchResolution::Manual(result(150, 90, Some(Side::Home), 45));
    let first = finalizer.finalize(m.id, manual.clone()).await.unwrap();
    let FinalizeOutcome::Finalized(report) = first else {
        panic!("first finalize must settle");
    };
    assert_eq!(report.wagers_won, vec![wager.id]);
    assert!(report.standings_updated);
    assert_eq!(report.forecasts_correct, 1);

    let after_first = settled_state(&db, season.id, &[user.id], &[forecast.id]).await;
    assert_eq!(after_first.forecasts[0].status, ForecastStatus::Correct);
    assert!(after_first.forecasts[0].points_awarded > 0);

    let second = finalizer.finalize(m.id, manual).await.unwrap();
    assert_eq!(second, FinalizeOutcome::AlreadySettled);
    let after_second = settled_state(&db, season.id, &[user.id], &[forecast.id]).await;
    assert_eq!(after_first, after_second);

    let record = db.get_team_record(m.home_team_id).await.unwrap();
    assert_eq!(record.played, 1);
    assert_eq!(record.won, 1);
    assert_eq!(record.special_catches, 1);

    let payouts = db
        .list_ledger(user.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == LedgerKind::Payout)
        .count();
    assert_eq!(payouts, 1);
    let account = db.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(account.balance, STARTING_BALANCE - 10.0 + 20.0);
}

#[tokio::test]
async fn test_concurrent_finalizers_settle_once() {
    let db = LeagueDb::in_memory().unwrap();
    let (season, matches) = seeded_league(&db).await;
    let user = db.create_user("cleo", STARTING_BALANCE).await.unwrap();
    let m = &matches[0];
    place_wager(&db, single(m.id, Predicate::WinnerAway, user.id, 25.0, 3.0))
        .await
        .unwrap();
    let forecast = submit_forecast(
        &db,
        &LeagueConfig::default(),
        user.id,
        m.id,
        MatchOutcome::Away,
        6,
    )
    .await
    .unwrap();

    let a = finalizer(&db);
    let b = finalizer(&db);
    let (left, right) = tokio::join!(
        a.finalize(m.id, MatchResolution::Manual(result(60, 190, Some(Side::Away), 70))),
        b.finalize(m.id, MatchResolution::Simulate),
    );
    let outcomes = [left.unwrap(), right.unwrap()];
    let settled = outcomes
        .iter()
        .filter(|o| matches!(o, FinalizeOutcome::Finalized(_)))
        .count();
    assert_eq!(settled, 1);

    let record = db.get_team_record(m.away_team_id).await.unwrap();
    assert_eq!(record.played, 1);
    let events = db.list_match_events(m.id).await.unwrap();
    let stored = db.get_match(m.id).await.unwrap().unwrap();
    assert!(stored.consolidated);
    let catches = events.iter().filter(|e| e.points == 150).count();
    assert!(catches <= 1);

    let settlements = db
        .list_ledger(user.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| matches!(e.kind, LedgerKind::Payout | LedgerKind::Loss))
        .count();
    assert_eq!(settlements, 1);

    let settled = settled_state(&db, season.id, &[user.id], &[forecast.id]).await;
    assert_ne!(settled.forecasts[0].status, ForecastStatus::Pending);
    assert_eq!(settled.standings.iter().map(|r| r.played).sum::<u32>(), 2);

    let again = finalizer(&db)
        .finalize(m.id, MatchResolution::Manual(result(10, 0, None, 20)))
        .await
        .unwrap();
    assert_eq!(again, FinalizeOutcome::AlreadySettled);
    assert_eq!(
        settled,
        settled_state(&db, season.id, &[user.id], &[forecast.id]).await
    );
}

#[tokio::test]
async fn test_failed_wager_does_not_block_the_rest() {
    let file = NamedTempFile::new().unwrap();
    let path = file.path().to_string_lossy().to_string();
    let db = LeagueDb::new(&path).unwrap();
    let (_season, matches) = seeded_league(&db).await;
    let config = LeagueConfig::default();
    let gone = db.create_user("ida", STARTING_BALANCE).await.unwrap();
    let kept = db.create_user("jon", STARTING_BALANCE).await.unwrap();
    let m = &matches[0];

    let orphaned = place_wager(&db, single(m.id, Predicate::WinnerHome, gone.id, 10.0, 2.0))
        .await
        .unwrap();
    let paid = place_wager(&db, single(m.id, Predicate::WinnerHome, kept.id, 10.0, 2.0))
        .await
        .unwrap();
    let forecast = submit_forecast(&db, &config, kept.id, m.id, MatchOutcome::Home, 3)
        .await
        .unwrap();

    // Remove the first bettor's account behind the store's back so their
    // ledger post fails mid-batch.
    {
        let side = rusqlite::Connection::open(&path).unwrap();
        let removed = side
            .execute("DELETE FROM user_accounts WHERE id = ?1", [gone.id])
            .unwrap();
        assert_eq!(removed, 1);
    }

    let outcome = finalizer(&db)
        .finalize(m.id, MatchResolution::Manual(result(150, 90, Some(Side::Home), 45)))
        .await
        .unwrap();
    let FinalizeOutcome::Finalized(report) = outcome else {
        panic!("match must settle");
    };

    assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
    let failure = &report.errors[0];
    assert_eq!(failure.stage, Stage::WagerResolution);
    assert_eq!(failure.match_id, m.id);
    assert_eq!(failure.subject, Some(orphaned.id));

    assert_eq!(report.wagers_won, vec![paid.id]);
    assert_eq!(report.forecasts_correct, 1);
    assert!(report.standings_updated);

    let stuck = db.get_wager(orphaned.id).await.unwrap().unwrap();
    assert_eq!(stuck.status, WagerStatus::Pending);
    let paid = db.get_wager(paid.id).await.unwrap().unwrap();
    assert_eq!(paid.status, WagerStatus::Won);
    let account = db.get_user(kept.id).await.unwrap().unwrap();
    assert_eq!(account.balance, STARTING_BALANCE - 10.0 + 20.0);
    let forecast = db.get_forecast(forecast.id).await.unwrap().unwrap();
    assert_eq!(forecast.status, ForecastStatus::Correct);
}

#[tokio::test]
async fn test_combined_wager_waits_for_every_leg() {
    let db = LeagueDb::in_memory().unwrap();
    let (_season, matches) = seeded_league(&db).await;
    let user = db.create_user("dev", STARTING_BALANCE).await.unwrap();
    let (m1, m2) = (&matches[0], &matches[1]);

    let wager = place_wager(
        &db,
        PlaceWager {
            user_id: user.id,
            legs: vec![
                WagerLeg {
                    match_id: m1.id,
                    predicate: Predicate::TotalOver { line: 300.0 },
                },
                WagerLeg {
                    match_id: m2.id,
                    predicate: Predicate::ExactScore { home: 150, away: 90 },
                },
            ],
            stake: 10.0,
            odds: 6.0,
        },
    )
    .await
    .unwrap();
    assert!(wager.combined);

    let finalizer = finalizer(&db);
    finalizer
        .finalize(m1.id, MatchResolution::Manual(result(190, 170, Some(Side::Home), 80)))
        .await
        .unwrap();
    let pending = db.get_wager(wager.id).await.unwrap().unwrap();
    assert_eq!(pending.status, WagerStatus::Pending);

    let outcome = finalizer
        .finalize(m2.id, MatchResolution::Manual(result(150, 90, Some(Side::Home), 30)))
        .await
        .unwrap();
    let FinalizeOutcome::Finalized(report) = outcome else {
        panic!("second leg must settle");
    };
    assert_eq!(report.wagers_won, vec![wager.id]);

    let settled = db.get_wager(wager.id).await.unwrap().unwrap();
    assert_eq!(settled.status, WagerStatus::Won);
    assert_eq!(settled.resolved_at, Some(m2.scheduled_at + Duration::minutes(30)));
    let account = db.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(account.balance, STARTING_BALANCE - 10.0 + 60.0);
}

#[tokio::test]
async fn test_exact_score_one_point_off_loses() {
    let db = LeagueDb::in_memory().unwrap();
    let (_season, matches) = seeded_league(&db).await;
    let user = db.create_user("eli", STARTING_BALANCE).await.unwrap();
    let m = &matches[0];

    let wager = place_wager(
        &db,
        single(m.id, Predicate::ExactScore { home: 150, away: 90 }, user.id, 5.0, 15.0),
    )
    .await
    .unwrap();
    finalizer(&db)
        .finalize(m.id, MatchResolution::Manual(result(150, 91, Some(Side::Home), 50)))
        .await
        .unwrap();

    let lost = db.get_wager(wager.id).await.unwrap().unwrap();
    assert_eq!(lost.status, WagerStatus::Lost);
    let account = db.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(account.balance, STARTING_BALANCE - 5.0);
}

#[tokio::test]
async fn test_forecast_scoring() {
    let db = LeagueDb::in_memory().unwrap();
    let (_season, matches) = seeded_league(&db).await;
    let config = LeagueConfig::default();
    let right = db.create_user("fay", STARTING_BALANCE).await.unwrap();
    let wrong = db.create_user("gus", STARTING_BALANCE).await.unwrap();
    let m = &matches[0];

    let hit = submit_forecast(&db, &config, right.id, m.id, MatchOutcome::Home, 5)
        .await
        .unwrap();
    let miss = submit_forecast(&db, &config, wrong.id, m.id, MatchOutcome::Draw, 9)
        .await
        .unwrap();
    let dup = submit_forecast(&db, &config, right.id, m.id, MatchOutcome::Away, 1).await;
    assert!(matches!(
        dup.unwrap_err().downcast_ref::<LeagueError>(),
        Some(LeagueError::AlreadyForecast { .. })
    ));

    finalizer(&db)
        .finalize(m.id, MatchResolution::Manual(result(200, 100, Some(Side::Home), 60)))
        .await
        .unwrap();

    let hit = db.get_forecast(hit.id).await.unwrap().unwrap();
    assert_eq!(hit.status, ForecastStatus::Correct);
    assert_eq!(hit.points_awarded, 5 * config.forecast_point_multiplier);
    let miss = db.get_forecast(miss.id).await.unwrap().unwrap();
    assert_eq!(miss.status, ForecastStatus::Incorrect);
    assert_eq!(miss.points_awarded, 0);
}

#[tokio::test]
async fn test_postponement_refunds_stake() {
    let db = LeagueDb::in_memory().unwrap();
    let (_season, matches) = seeded_league(&db).await;
    let user = db.create_user("hal", STARTING_BALANCE).await.unwrap();
    let (m1, m2) = (&matches[0], &matches[1]);

    let single_wager = place_wager(&db, single(m1.id, Predicate::WinnerDraw, user.id, 40.0, 12.0))
        .await
        .unwrap();
    let combined = place_wager(
        &db,
        PlaceWager {
            user_id: user.id,
            legs: vec![
                WagerLeg {
                    match_id: m2.id,
                    predicate: Predicate::SpecialCatchNone,
                },
                WagerLeg {
                    match_id: m1.id,
                    predicate: Predicate::WinnerHome,
                },
            ],
            stake: 10.0,
            odds: 4.0,
        },
    )
    .await
    .unwrap();
    assert_eq!(
        db.get_user(user.id).await.unwrap().unwrap().balance,
        STARTING_BALANCE - 50.0
    );

    let finalizer = finalizer(&db);
    let report = finalizer.postpone_match(m1.id).await.unwrap();
    let mut refunded = report.refunded_wagers.clone();
    refunded.sort();
    assert_eq!(refunded, vec![single_wager.id, combined.id]);
    assert!(report.errors.is_empty());

    for id in [single_wager.id, combined.id] {
        let w = db.get_wager(id).await.unwrap().unwrap();
        assert_eq!(w.status, WagerStatus::Cancelled);
    }
    let account = db.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(account.balance, STARTING_BALANCE);

    let postponed = db.get_match(m1.id).await.unwrap().unwrap();
    assert_eq!(postponed.status, MatchStatus::Postponed);
    let late = place_wager(&db, single(m1.id, Predicate::WinnerHome, user.id, 1.0, 2.0)).await;
    assert!(matches!(
        late.unwrap_err().downcast_ref::<LeagueError>(),
        Some(LeagueError::MatchNotOpen { .. })
    ));
}

#[tokio::test]
async fn test_archive_written_once() {
    let db = LeagueDb::in_memory().unwrap();
    let (season, _matches) = seeded_league(&db).await;
    let at = Utc::now();

    let first = archive_season(&db, season.id, &at).await.unwrap();
    assert!(matches!(first, ArchiveOutcome::Archived(_)));
    let second = archive_season(&db, season.id, &at).await.unwrap();
    assert_eq!(second, ArchiveOutcome::AlreadyArchived);
    assert_eq!(db.list_historical_seasons().await.unwrap().len(), 1);

    let team_ids = db.season_team_ids(season.id).await.unwrap();
    let history = db.get_team_history(team_ids[0]).await.unwrap().unwrap();
    assert_eq!(history.seasons_played, 1);
}

#[tokio::test]
async fn test_matches_behind_clock_need_explicit_finalize() {
    let db = LeagueDb::in_memory().unwrap();
    let (_season, matches) = seeded_league(&db).await;
    let clock = VirtualClock::open(db.clone(), LeagueConfig::default(), shared_rng(Some(5)))
        .await
        .unwrap();
    let now = clock.state().await.current_time;
    assert!(now > matches[1].scheduled_at, "fixtures lie in the clock's past");

    // Matches behind the clock are only reachable by explicit finalize.
    let report = clock
        .advance(AdvanceOptions::by(Duration::hours(1)))
        .await
        .unwrap();
    assert!(report.simulated_match_ids.is_empty());

    let outcome = clock
        .finalizer()
        .finalize(matches[0].id, MatchResolution::Simulate)
        .await
        .unwrap();
    assert!(matches!(outcome, FinalizeOutcome::Finalized(_)));
    let again = clock
        .finalizer()
        .finalize(matches[0].id, MatchResolution::Simulate)
        .await
        .unwrap();
    assert_eq!(again, FinalizeOutcome::AlreadySettled);
}

#[tokio::test]
async fn test_reset_recounts_team_records() {
    let db = LeagueDb::in_memory().unwrap();
    let (season, matches) = seeded_league(&db).await;
    let m = &matches[0];
    let finalizer = finalizer(&db);

    finalizer
        .finalize(m.id, MatchResolution::Manual(result(100, 200, Some(Side::Away), 40)))
        .await
        .unwrap();
    assert_eq!(db.get_team_record(m.away_team_id).await.unwrap().won, 1);

    assert!(finalizer.reset_match(m.id).await.unwrap());
    assert!(!finalizer.reset_match(m.id).await.unwrap());
    let reset = db.get_match(m.id).await.unwrap().unwrap();
    assert_eq!(reset.status, MatchStatus::Scheduled);
    assert!(!reset.consolidated);
    assert_eq!(db.get_team_record(m.away_team_id).await.unwrap().played, 0);
    assert!(db
        .get_standings(season.id)
        .await
        .unwrap()
        .iter()
        .all(|row| row.played == 0));

    let outcome = finalizer
        .finalize(m.id, MatchResolution::Manual(result(200, 100, Some(Side::Home), 40)))
        .await
        .unwrap();
    assert!(matches!(outcome, FinalizeOutcome::Finalized(_)));
    assert_eq!(db.get_team_record(m.home_team_id).await.unwrap().won, 1);
    assert_eq!(db.get_team_record(m.away_team_id).await.unwrap().lost, 1);
}

#[tokio::test]
async fn test_clock_state_survives_reopen() {
    let file = NamedTempFile::new().unwrap();
    let path = file.path().to_string_lossy().to_string();

    let saved = {
        let db = LeagueDb::new(&path).unwrap();
        let clock = VirtualClock::open(db, LeagueConfig::default(), shared_rng(Some(1)))
            .await
            .unwrap();
        clock.set_speed(ClockSpeed::Fast).await.unwrap();
        clock.set_auto_advance(true).await.unwrap();
        clock
            .advance(AdvanceOptions::by(Duration::hours(3)))
            .await
            .unwrap();
        clock.state().await
    };

    let db = LeagueDb::new(&path).unwrap();
    let clock = VirtualClock::open(db, LeagueConfig::default(), shared_rng(Some(1)))
        .await
        .unwrap();
    let restored = clock.state().await;
    assert_eq!(restored.current_time, saved.current_time);
    assert_eq!(restored.speed, ClockSpeed::Fast);
    assert!(restored.auto_advance);
}
