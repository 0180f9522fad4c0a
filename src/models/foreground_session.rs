use rusqlite::{params, Connection, OptionalExtension, Result};
use serde::Serialize;

/// A stretch of time during which one target held the foreground.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForegroundSession {
    pub id: Option<i64>,
    pub target_id: String,
    pub started_at: i64,
    pub ended_at: Option<i64>,
}

impl ForegroundSession {
    /// Closes whatever session is open at `at` and opens one for `target_id`.
    pub fn begin(conn: &Connection, target_id: &str, at: i64) -> Result<Self> {
        Self::close_open(conn, at)?;

        conn.execute(
            "INSERT INTO foreground_sessions (target_id, started_at, ended_at) VALUES (?1, ?2, NULL)",
            params![target_id, at],
        )?;

        Ok(Self {
            id: Some(conn.last_insert_rowid()),
            target_id: target_id.to_string(),
            started_at: at,
            ended_at: None,
        })
    }

    /// Returns the number of sessions closed.
    pub fn close_open(conn: &Connection, at: i64) -> Result<usize> {
        conn.execute(
            "UPDATE foreground_sessions SET ended_at = MAX(started_at, ?1) WHERE ended_at IS NULL",
            [at],
        )
    }

    pub fn find_open(conn: &Connection) -> Result<Option<Self>> {
        conn.query_row(
            "SELECT id, target_id, started_at, ended_at FROM foreground_sessions
             WHERE ended_at IS NULL ORDER BY started_at DESC LIMIT 1",
            [],
            |row| {
                Ok(Self {
                    id: Some(row.get(0)?),
                    target_id: row.get(1)?,
                    started_at: row.get(2)?,
                    ended_at: row.get(3)?,
                })
            },
        )
        .optional()
    }

    /// Foreground milliseconds of `target_id` inside `[start, end)`. An open
    /// session counts up to `now`.
    pub fn usage_millis(
        conn: &Connection,
        target_id: &str,
        start: i64,
        end: i64,
        now: i64,
    ) -> Result<i64> {
        conn.query_row(
            "SELECT COALESCE(SUM(MIN(COALESCE(ended_at, ?4), ?3) - MAX(started_at, ?2)), 0)
             FROM foreground_sessions
             WHERE target_id = ?1 AND started_at < ?3 AND COALESCE(ended_at, ?4) > ?2",
            params![target_id, start, end, now],
            |row| row.get(0),
        )
    }
}
