//! Simulated Time
//!
//! Monotonic simulated clock with millisecond resolution.
//! The league never reads system time to decide what is due.

use chrono::{DateTime, TimeZone, Utc};
use std::fmt;

use crate::league::error::LeagueError;

/// Milliseconds since Unix epoch. This is the persisted timestamp format.
pub type Millis = i64;

pub const MILLIS_PER_SEC: i64 = 1_000;
pub const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SEC;
pub const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
pub const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

/// Monotonic simulation clock.
///
/// `advance_to()` refuses to move backward instead of panicking, since the
/// target time can come from an external caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimClock {
    current: Millis,
}

impl SimClock {
    #[inline]
    pub fn new(start: Millis) -> Self {
        Self { current: start }
    }

    #[inline]
    pub fn from_datetime(dt: &DateTime<Utc>) -> Self {
        Self::new(datetime_to_millis(dt))
    }

    #[inline]
    pub fn now(&self) -> Millis {
        self.current
    }

    #[inline]
    pub fn now_datetime(&self) -> DateTime<Utc> {
        millis_to_datetime(self.current)
    }

    /// Advance clock to a new time. Equal times are accepted as a no-op.
    pub fn advance_to(&mut self, new_time: Millis) -> Result<(), LeagueError> {
        if new_time < self.current {
            return Err(LeagueError::InvalidAdvance(format!(
                "cannot go backward from {} to {}",
                millis_to_datetime(self.current),
                millis_to_datetime(new_time)
            )));
        }
        self.current = new_time;
        Ok(())
    }

    /// Candidate time `delta` ahead of now, without moving the clock.
    pub fn peek_by(&self, delta: Millis) -> Result<Millis, LeagueError> {
        if delta < 0 {
            return Err(LeagueError::InvalidAdvance(format!(
                "delta must be non-negative, got {}ms",
                delta
            )));
        }
        Ok(self.current.saturating_add(delta))
    }

    #[inline]
    pub fn is_past(&self, time: Millis) -> bool {
        time < self.current
    }
}

impl fmt::Display for SimClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.now_datetime().to_rfc3339())
    }
}

#[inline]
pub fn datetime_to_millis(dt: &DateTime<Utc>) -> Millis {
    dt.timestamp_millis()
}

/// Out-of-range values clamp to the epoch rather than failing a row read.
#[inline]
pub fn millis_to_datetime(millis: Millis) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
}

pub fn parse_timestamp(s: &str) -> Option<Millis> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| datetime_to_millis(&dt.with_timezone(&Utc)))
}
