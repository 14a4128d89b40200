use rusqlite::Connection;

/// All timestamps are unix milliseconds.
pub(super) fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS clock_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            sim_time INTEGER NOT NULL,
            speed TEXT NOT NULL,
            auto_advance INTEGER NOT NULL DEFAULT 0,
            last_update INTEGER NOT NULL,
            active_season_id INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teams (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            attack INTEGER NOT NULL,
            defense INTEGER NOT NULL,
            keeper INTEGER NOT NULL,
            seeker INTEGER NOT NULL,
            chaser INTEGER NOT NULL,
            beater INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS team_records (
            team_id INTEGER PRIMARY KEY,
            played INTEGER NOT NULL DEFAULT 0,
            won INTEGER NOT NULL DEFAULT 0,
            lost INTEGER NOT NULL DEFAULT 0,
            drawn INTEGER NOT NULL DEFAULT 0,
            points_for INTEGER NOT NULL DEFAULT 0,
            points_against INTEGER NOT NULL DEFAULT 0,
            special_catches INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS seasons (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'upcoming',
            starts_at INTEGER NOT NULL,
            ends_at INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS season_teams (
            season_id INTEGER NOT NULL,
            team_id INTEGER NOT NULL,
            PRIMARY KEY (season_id, team_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS matches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            season_id INTEGER NOT NULL,
            home_team_id INTEGER NOT NULL,
            away_team_id INTEGER NOT NULL,
            scheduled_at INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'scheduled',
            home_score INTEGER NOT NULL DEFAULT 0,
            away_score INTEGER NOT NULL DEFAULT 0,
            special_catch INTEGER NOT NULL DEFAULT 0,
            catcher TEXT,
            duration_minutes INTEGER NOT NULL DEFAULT 0,
            consolidated INTEGER NOT NULL DEFAULT 0,
            settled_at INTEGER,
            odds_home_win REAL NOT NULL,
            odds_draw REAL NOT NULL,
            odds_away_win REAL NOT NULL,
            odds_total_over REAL NOT NULL,
            odds_total_under REAL NOT NULL,
            odds_special_catch REAL NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_matches_status_time ON matches(status, scheduled_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_matches_season ON matches(season_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS match_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            match_id INTEGER NOT NULL,
            minute INTEGER NOT NULL,
            side TEXT NOT NULL,
            kind TEXT NOT NULL,
            description TEXT NOT NULL,
            points INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_match_events_match ON match_events(match_id, minute)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS standings (
            season_id INTEGER NOT NULL,
            team_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            played INTEGER NOT NULL,
            won INTEGER NOT NULL,
            lost INTEGER NOT NULL,
            drawn INTEGER NOT NULL,
            points_for INTEGER NOT NULL,
            points_against INTEGER NOT NULL,
            goal_difference INTEGER NOT NULL,
            points INTEGER NOT NULL,
            PRIMARY KEY (season_id, team_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS user_accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT UNIQUE NOT NULL,
            balance REAL NOT NULL DEFAULT 0.0,
            total_staked REAL NOT NULL DEFAULT 0.0,
            total_paid_out REAL NOT NULL DEFAULT 0.0,
            wager_count INTEGER NOT NULL DEFAULT 0,
            win_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ledger_entries (
            id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            wager_id INTEGER,
            kind TEXT NOT NULL,
            amount REAL NOT NULL,
            balance_after REAL NOT NULL,
            ts INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ledger_user_ts ON ledger_entries(user_id, ts DESC)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS wagers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            match_id INTEGER NOT NULL,
            combined INTEGER NOT NULL DEFAULT 0,
            stake REAL NOT NULL,
            odds REAL NOT NULL,
            potential_payout REAL NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            placed_at INTEGER NOT NULL,
            resolved_at INTEGER,
            resolution_reason TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_wagers_status_match ON wagers(status, match_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_wagers_user ON wagers(user_id)",
        [],
    )?;

    // Registry legs fill kind (+ line/selection); legacy legs fill category + selection.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS wager_legs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            wager_id INTEGER NOT NULL,
            leg_index INTEGER NOT NULL,
            match_id INTEGER NOT NULL,
            kind TEXT,
            line REAL,
            category TEXT,
            selection TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_wager_legs_wager ON wager_legs(wager_id, leg_index)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_wager_legs_match ON wager_legs(match_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS forecasts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            match_id INTEGER NOT NULL,
            outcome TEXT NOT NULL,
            confidence INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            points_awarded INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            resolved_at INTEGER,
            UNIQUE (user_id, match_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_forecasts_match_status ON forecasts(match_id, status)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS historical_seasons (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            season_id INTEGER UNIQUE NOT NULL,
            season_name TEXT NOT NULL,
            team_count INTEGER NOT NULL,
            match_count INTEGER NOT NULL,
            wager_count INTEGER NOT NULL,
            forecast_count INTEGER NOT NULL,
            revenue REAL NOT NULL,
            champion_team_id INTEGER,
            archived_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS historical_team_stats (
            team_id INTEGER PRIMARY KEY,
            seasons_played INTEGER NOT NULL DEFAULT 0,
            wins INTEGER NOT NULL DEFAULT 0,
            losses INTEGER NOT NULL DEFAULT 0,
            draws INTEGER NOT NULL DEFAULT 0,
            points_for INTEGER NOT NULL DEFAULT 0,
            points_against INTEGER NOT NULL DEFAULT 0,
            championships INTEGER NOT NULL DEFAULT 0,
            best_position INTEGER,
            worst_position INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS historical_user_stats (
            user_id INTEGER PRIMARY KEY,
            wagers_placed INTEGER NOT NULL,
            wagers_won INTEGER NOT NULL,
            wagers_lost INTEGER NOT NULL,
            total_staked REAL NOT NULL,
            total_paid_out REAL NOT NULL,
            net_profit REAL NOT NULL,
            forecasts_made INTEGER NOT NULL,
            forecasts_correct INTEGER NOT NULL,
            forecast_points INTEGER NOT NULL
        )",
        [],
    )?;

    Ok(())
}
