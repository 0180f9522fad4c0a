use crate::constants::MILLIS_PER_DAY;
use crate::db::{with_connection, Database};
use crate::error::AppResult;
use crate::models::{current_millis, ForegroundSession};
use std::sync::{Arc, Mutex};

/// Foreground-time statistics over the recorded sessions.
pub struct UsageAnalytics {
    db: Arc<Mutex<Database>>,
}

impl UsageAnalytics {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    /// Whole minutes `target` spent in front during the current UTC day.
    pub fn daily_usage_minutes(&self, target: &str) -> AppResult<i64> {
        self.daily_usage_minutes_at(target, current_millis())
    }

    pub fn daily_usage_minutes_at(&self, target: &str, now_ms: i64) -> AppResult<i64> {
        let day_start = now_ms - now_ms.rem_euclid(MILLIS_PER_DAY);
        let day_end = day_start + MILLIS_PER_DAY;

        let millis = with_connection(&self.db, "load daily usage", |conn| {
            ForegroundSession::usage_millis(conn, target, day_start, day_end, now_ms)
        })?;

        Ok(millis / 60_000)
    }
}
