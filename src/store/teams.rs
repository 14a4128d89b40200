use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{u32_col, LeagueDb};
use crate::models::{Side, StrengthProfile, Team, TeamRecord};

fn skill(row: &Row<'_>, idx: usize) -> rusqlite::Result<u8> {
    Ok(row.get::<_, i64>(idx)?.clamp(0, 100) as u8)
}

fn team_from_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        name: row.get(1)?,
        profile: StrengthProfile {
            attack: skill(row, 2)?,
            defense: skill(row, 3)?,
            keeper: skill(row, 4)?,
            seeker: skill(row, 5)?,
            chaser: skill(row, 6)?,
            beater: skill(row, 7)?,
        },
    })
}

const TEAM_COLUMNS: &str = "id, name, attack, defense, keeper, seeker, chaser, beater";

/// Add one finished match to a team's running record.
pub(super) fn apply_team_result(
    conn: &Connection,
    team_id: i64,
    points_for: u32,
    points_against: u32,
    caught: bool,
) -> rusqlite::Result<()> {
    let (won, lost, drawn) = match points_for.cmp(&points_against) {
        std::cmp::Ordering::Greater => (1, 0, 0),
        std::cmp::Ordering::Less => (0, 1, 0),
        std::cmp::Ordering::Equal => (0, 0, 1),
    };
    conn.prepare_cached(
        "INSERT INTO team_records
            (team_id, played, won, lost, drawn, points_for, points_against, special_catches)
         VALUES (?1, 1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(team_id) DO UPDATE SET
            played = played + 1,
            won = won + excluded.won,
            lost = lost + excluded.lost,
            drawn = drawn + excluded.drawn,
            points_for = points_for + excluded.points_for,
            points_against = points_against + excluded.points_against,
            special_catches = special_catches + excluded.special_catches",
    )?
    .execute(params![
        team_id,
        won,
        lost,
        drawn,
        points_for,
        points_against,
        caught as i64
    ])?;
    Ok(())
}

/// Recount a team's record from every finished match it played.
pub(super) fn rebuild_team_record(conn: &Connection, team_id: i64) -> rusqlite::Result<()> {
    conn.prepare_cached(
        "INSERT OR REPLACE INTO team_records
            (team_id, played, won, lost, drawn, points_for, points_against, special_catches)
         SELECT ?1,
            COUNT(*),
            COALESCE(SUM(pf > pa), 0),
            COALESCE(SUM(pf < pa), 0),
            COALESCE(SUM(pf = pa), 0),
            COALESCE(SUM(pf), 0),
            COALESCE(SUM(pa), 0),
            COALESCE(SUM(caught), 0)
         FROM (
            SELECT home_score AS pf, away_score AS pa, catcher = ?2 AS caught
            FROM matches WHERE home_team_id = ?1 AND status = 'finished'
            UNION ALL
            SELECT away_score AS pf, home_score AS pa, catcher = ?3 AS caught
            FROM matches WHERE away_team_id = ?1 AND status = 'finished'
         )",
    )?
    .execute(params![team_id, Side::Home.as_str(), Side::Away.as_str()])?;
    Ok(())
}

impl LeagueDb {
    pub async fn insert_team(&self, name: &str, profile: &StrengthProfile) -> Result<Team> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO teams (name, attack, defense, keeper, seeker, chaser, beater)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                name,
                profile.attack,
                profile.defense,
                profile.keeper,
                profile.seeker,
                profile.chaser,
                profile.beater
            ],
        )
        .with_context(|| format!("insert team '{}'", name))?;

        Ok(Team {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            profile: *profile,
        })
    }

    pub async fn get_team(&self, team_id: i64) -> Result<Option<Team>> {
        let conn = self.conn.lock().await;
        let team = conn
            .prepare_cached(&format!("SELECT {} FROM teams WHERE id = ?1", TEAM_COLUMNS))?
            .query_row([team_id], team_from_row)
            .optional()?;
        Ok(team)
    }

    pub async fn list_teams(&self) -> Result<Vec<Team>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {} FROM teams ORDER BY id ASC", TEAM_COLUMNS))?;
        let teams = stmt
            .query_map([], team_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(teams)
    }

    pub async fn count_teams(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM teams", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Running record; zeros for a team that has not finished a match yet.
    pub async fn get_team_record(&self, team_id: i64) -> Result<TeamRecord> {
        let conn = self.conn.lock().await;
        let record = conn
            .prepare_cached(
                "SELECT team_id, played, won, lost, drawn, points_for, points_against, special_catches
                 FROM team_records WHERE team_id = ?1",
            )?
            .query_row([team_id], |row| {
                Ok(TeamRecord {
                    team_id: row.get(0)?,
                    played: u32_col(row, 1)?,
                    won: u32_col(row, 2)?,
                    lost: u32_col(row, 3)?,
                    drawn: u32_col(row, 4)?,
                    points_for: u32_col(row, 5)?,
                    points_against: u32_col(row, 6)?,
                    special_catches: u32_col(row, 7)?,
                })
            })
            .optional()?;
        Ok(record.unwrap_or(TeamRecord {
            team_id,
            ..Default::default()
        }))
    }
}
