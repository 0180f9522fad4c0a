//! SQLite-backed implementations of the watcher and intruder seams.

use crate::db::{with_connection, Database};
use crate::error::{AppError, AppResult};
use crate::intruder::IntruderSink;
use crate::models::{ForegroundSession, IntruderEvent, LockTarget};
use crate::watcher::{LockTargetLookup, UsageLog};
use std::sync::{Arc, Mutex};

/// Looks up protected targets in `locked_apps` on every call.
pub struct PersistedTargets {
    db: Arc<Mutex<Database>>,
}

impl PersistedTargets {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }
}

impl LockTargetLookup for PersistedTargets {
    fn is_locked(&self, target: &str) -> AppResult<bool> {
        with_connection(&self.db, "look up lock target", |conn| {
            LockTarget::exists(conn, target)
        })
    }
}

pub struct PersistedIntruderLog {
    db: Arc<Mutex<Database>>,
}

impl PersistedIntruderLog {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }
}

impl IntruderSink for PersistedIntruderLog {
    fn record(&self, event: &mut IntruderEvent) -> AppResult<i64> {
        with_connection(&self.db, "record intruder event", |conn| event.save(conn))?;
        event
            .id
            .ok_or_else(|| AppError::Internal("intruder event saved without id".to_string()))
    }
}

pub struct PersistedUsageLog {
    db: Arc<Mutex<Database>>,
}

impl PersistedUsageLog {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }
}

impl UsageLog for PersistedUsageLog {
    fn record_switch(&self, target: &str, at_ms: i64) {
        // Failures are logged by with_connection; usage history is best effort.
        let _ = with_connection(&self.db, "record foreground switch", |conn| {
            ForegroundSession::begin(conn, target, at_ms)
        });
    }

    fn close(&self, at_ms: i64) {
        let _ = with_connection(&self.db, "close foreground session", |conn| {
            ForegroundSession::close_open(conn, at_ms)
        });
    }
}
