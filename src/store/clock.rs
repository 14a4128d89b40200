use anyhow::Result;
use rusqlite::params;

use super::{enum_col, to_millis, ts_col, LeagueDb};
use crate::models::{ClockSpeed, VirtualClockState};

impl LeagueDb {
    pub async fn load_clock_state(&self) -> Result<Option<VirtualClockState>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT sim_time, speed, auto_advance, last_update, active_season_id
             FROM clock_state WHERE id = 1 LIMIT 1",
        )?;
        let mut rows = stmt.query([])?;
        if let Some(row) = rows.next()? {
            Ok(Some(VirtualClockState {
                current_time: ts_col(row, 0)?,
                speed: enum_col(row, 1, ClockSpeed::from_str)?,
                auto_advance: row.get::<_, i64>(2)? == 1,
                last_update: ts_col(row, 3)?,
                active_season_id: row.get(4)?,
            }))
        } else {
            Ok(None)
        }
    }

    /// Replace the singleton clock row.
    pub async fn save_clock_state(&self, state: &VirtualClockState) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO clock_state (id, sim_time, speed, auto_advance, last_update, active_season_id)
             VALUES (1, ?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                sim_time = excluded.sim_time,
                speed = excluded.speed,
                auto_advance = excluded.auto_advance,
                last_update = excluded.last_update,
                active_season_id = excluded.active_season_id",
            params![
                to_millis(&state.current_time),
                state.speed.as_str(),
                state.auto_advance as i64,
                to_millis(&state.last_update),
                state.active_season_id,
            ],
        )?;
        Ok(())
    }
}
