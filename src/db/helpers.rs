// src/db/helpers.rs

use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::safe_lock;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

/// Execute a database operation with lock handling and error mapping.
///
/// A poisoned lock is recovered.
///
/// # Example
/// ```ignore
/// with_connection(&db, "load lock targets", |conn| {
///     LockTarget::find_all(conn)
/// })
/// ```
pub fn with_connection<F, T>(db: &Arc<Mutex<Database>>, operation: &str, f: F) -> AppResult<T>
where
    F: FnOnce(&Connection) -> rusqlite::Result<T>,
{
    let db = safe_lock(db, "database");

    f(db.connection()).map_err(|e| {
        log::error!("Failed to {operation}: {e}");
        AppError::Database(e)
    })
}
