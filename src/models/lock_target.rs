use super::current_millis;
use rusqlite::{params, Connection, OptionalExtension, Result};
use serde::Serialize;

/// An application the user has designated as protected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockTarget {
    pub target_id: String,
    pub date_added: i64,
}

impl LockTarget {
    pub fn new(target_id: &str) -> Self {
        Self {
            target_id: target_id.to_string(),
            date_added: current_millis(),
        }
    }

    /// Insert or replace; re-adding a target refreshes `date_added`.
    pub fn save(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO locked_apps (target_id, date_added) VALUES (?1, ?2)",
            params![self.target_id, self.date_added],
        )?;
        Ok(())
    }

    pub fn find_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT target_id, date_added FROM locked_apps ORDER BY date_added ASC, target_id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(Self {
                target_id: row.get(0)?,
                date_added: row.get(1)?,
            })
        })?;

        rows.collect()
    }

    pub fn find(conn: &Connection, target_id: &str) -> Result<Option<Self>> {
        conn.query_row(
            "SELECT target_id, date_added FROM locked_apps WHERE target_id = ?1",
            [target_id],
            |row| {
                Ok(Self {
                    target_id: row.get(0)?,
                    date_added: row.get(1)?,
                })
            },
        )
        .optional()
    }

    pub fn exists(conn: &Connection, target_id: &str) -> Result<bool> {
        let count: i32 = conn.query_row(
            "SELECT COUNT(*) FROM locked_apps WHERE target_id = ?1",
            [target_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Returns true if a row was removed.
    pub fn delete(conn: &Connection, target_id: &str) -> Result<bool> {
        let affected = conn.execute("DELETE FROM locked_apps WHERE target_id = ?1", [target_id])?;
        Ok(affected > 0)
    }
}
