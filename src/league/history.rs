//! Season archive and all-time aggregates

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::league::error::LeagueError;
use crate::league::standings::recompute_standings;
use crate::models::{HistoricalSeasonRecord, HistoricalUserStats};
use crate::store::{ArchivePlan, LeagueDb, SeasonWagerTotals, TeamSeasonLine, UserActivity};

#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveOutcome {
    Archived(HistoricalSeasonRecord),
    AlreadyArchived,
}

/// House revenue: stakes of resolved wagers minus what was paid out on wins.
pub fn season_revenue(totals: &SeasonWagerTotals) -> f64 {
    totals.resolved_stake - totals.won_payout
}

/// Write the historical record for a season, once.
///
/// Standings are recomputed first so the champion and positions reflect
/// every finished match.
pub async fn archive_season(
    db: &LeagueDb,
    season_id: i64,
    archived_at: &DateTime<Utc>,
) -> Result<ArchiveOutcome> {
    if db.is_season_archived(season_id).await? {
        return Ok(ArchiveOutcome::AlreadyArchived);
    }
    let season = db
        .get_season(season_id)
        .await?
        .ok_or(LeagueError::SeasonNotFound(season_id))?;

    let table = recompute_standings(db, season_id)
        .await
        .context("standings before archive")?;
    let matches = db.list_season_matches(season_id, None).await?;
    let totals = db.season_wager_totals(season_id).await?;
    let forecast_count = db.count_season_forecasts(season_id).await?;

    let plan = ArchivePlan {
        season_id,
        season_name: season.name.clone(),
        team_count: table.len() as u32,
        match_count: matches.len() as u32,
        wager_count: totals.wager_count,
        forecast_count,
        revenue: season_revenue(&totals),
        champion_team_id: table.first().map(|row| row.team_id),
        archived_at: *archived_at,
        teams: table
            .iter()
            .map(|row| TeamSeasonLine {
                team_id: row.team_id,
                won: row.won,
                lost: row.lost,
                drawn: row.drawn,
                points_for: row.points_for,
                points_against: row.points_against,
                position: row.position,
            })
            .collect(),
    };

    match db.write_archive(&plan).await? {
        Some(record) => {
            info!(
                season_id,
                champion = ?record.champion_team_id,
                matches = record.match_count,
                revenue = record.revenue,
                "Season archived"
            );
            Ok(ArchiveOutcome::Archived(record))
        }
        None => {
            warn!(season_id, "Season archived concurrently, skipping");
            Ok(ArchiveOutcome::AlreadyArchived)
        }
    }
}

fn user_stats(activity: &UserActivity) -> HistoricalUserStats {
    HistoricalUserStats {
        user_id: activity.user_id,
        wagers_placed: activity.wagers_placed,
        wagers_won: activity.wagers_won,
        wagers_lost: activity.wagers_lost,
        total_staked: activity.total_staked,
        total_paid_out: activity.total_paid_out,
        // Pending stakes are still at risk and not counted against profit.
        net_profit: activity.total_paid_out - activity.resolved_staked,
        forecasts_made: activity.forecasts_made,
        forecasts_correct: activity.forecasts_correct,
        forecast_points: activity.forecast_points,
    }
}

/// Rebuild every user's all-time stats from scratch. Returns the user count.
pub async fn recompute_user_stats(db: &LeagueDb) -> Result<usize> {
    let activity = db.user_activity().await.context("load user activity")?;
    let stats: Vec<HistoricalUserStats> = activity.iter().map(user_stats).collect();
    db.replace_user_stats(&stats).await?;
    Ok(stats.len())
}
