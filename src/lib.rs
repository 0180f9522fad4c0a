pub mod analytics;
pub mod constants;
pub mod db;
pub mod error;
pub mod gate;
pub mod integrity;
pub mod intruder;
pub mod models;
pub mod platform;
pub mod store;
#[cfg(test)]
mod test_utils;
pub mod validation;
pub mod watcher;

use crate::analytics::UsageAnalytics;
use crate::db::{migrations, with_connection, Database};
use crate::error::AppResult;
use crate::gate::{Authenticator, LockGate};
use crate::integrity::IntegrityReport;
use crate::intruder::{
    CaptureWorker, EvidenceCamera, EvidenceResponse, IntruderResponse, IntruderSink,
    LocationProvider,
};
use crate::models::{ConfigFlag, IntruderEvent, LockTarget, SecurityConfig};
use crate::platform::UsageStatsProvider;
use crate::store::{PersistedIntruderLog, PersistedTargets, PersistedUsageLog};
use crate::validation::validate_target_id;
use crate::watcher::{ForegroundWatcher, LockLauncher, WatcherConfig};
use directories::ProjectDirs;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Error type for initialization failures
#[derive(Debug)]
pub enum InitError {
    NoProjectDirs,
    DataDirCreation(std::io::Error),
    DatabaseOpen(rusqlite::Error),
    Migration(rusqlite::Error),
}

impl std::fmt::Display for InitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitError::NoProjectDirs => write!(f, "Could not determine project directories"),
            InitError::DataDirCreation(e) => write!(f, "Could not create data directory: {e}"),
            InitError::DatabaseOpen(e) => write!(f, "Failed to open database: {e}"),
            InitError::Migration(e) => write!(f, "Failed to run database migrations: {e}"),
        }
    }
}

impl std::error::Error for InitError {}

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Use this database file instead of the per-user data directory.
    pub db_path: Option<PathBuf>,
}

fn default_db_path() -> Result<PathBuf, InitError> {
    let proj_dirs = ProjectDirs::from("com", "applock", "AppLock").ok_or(InitError::NoProjectDirs)?;
    Ok(proj_dirs.data_dir().join("applock.db"))
}

/// Lock a mutex, recovering from poisoning if necessary
pub fn safe_lock<'a, T>(mutex: &'a Mutex<T>, context: &str) -> std::sync::MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("{context} mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Open storage and check the environment. Call once at process start and
/// hand the returned [`AppLock`] to whoever needs it.
pub fn init(options: InitOptions) -> Result<AppLock, InitError> {
    let db_path = match options.db_path {
        Some(path) => path,
        None => default_db_path()?,
    };
    let data_dir = db_path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    std::fs::create_dir_all(&data_dir).map_err(InitError::DataDirCreation)?;

    let db = Database::open(&db_path).map_err(|e| {
        error!("Failed to open database {}: {e}", db_path.display());
        InitError::DatabaseOpen(e)
    })?;

    migrations::run(db.connection()).map_err(|e| {
        error!("Failed to run migrations: {e}");
        InitError::Migration(e)
    })?;

    let integrity = integrity::check();
    if integrity.is_rooted() {
        warn!("Root indicators present: {}", integrity.root_indicators.join(", "));
    }
    if integrity.debugger_attached {
        warn!("A debugger is attached to this process");
    }

    info!("AppLock initialized with database {}", db_path.display());

    Ok(AppLock {
        db: Arc::new(Mutex::new(db)),
        data_dir,
        integrity,
    })
}

/// Process-wide handle returned by [`init`].
pub struct AppLock {
    db: Arc<Mutex<Database>>,
    data_dir: PathBuf,
    integrity: IntegrityReport,
}

impl AppLock {
    pub fn db(&self) -> Arc<Mutex<Database>> {
        Arc::clone(&self.db)
    }

    pub fn integrity(&self) -> &IntegrityReport {
        &self.integrity
    }

    pub fn evidence_dir(&self) -> PathBuf {
        self.data_dir.join("evidence")
    }

    pub fn add_target(&self, target_id: &str) -> AppResult<LockTarget> {
        let target = LockTarget::new(validate_target_id(target_id)?);
        with_connection(&self.db, "add lock target", |conn| target.save(conn))?;
        info!("Locked {}", target.target_id);
        Ok(target)
    }

    /// Returns false when the target was not locked.
    pub fn remove_target(&self, target_id: &str) -> AppResult<bool> {
        let target_id = validate_target_id(target_id)?;
        let removed = with_connection(&self.db, "remove lock target", |conn| {
            LockTarget::delete(conn, target_id)
        })?;
        if removed {
            info!("Unlocked {target_id}");
        }
        Ok(removed)
    }

    pub fn targets(&self) -> AppResult<Vec<LockTarget>> {
        with_connection(&self.db, "load lock targets", LockTarget::find_all)
    }

    pub fn security_config(&self) -> AppResult<SecurityConfig> {
        with_connection(&self.db, "load security config", SecurityConfig::load)
    }

    pub fn set_flag(&self, flag: ConfigFlag, value: bool) -> AppResult<SecurityConfig> {
        with_connection(&self.db, "update security config", |conn| {
            let mut config = SecurityConfig::load(conn)?;
            config.set(flag, value);
            config.save(conn)?;
            Ok(config)
        })
    }

    pub fn recent_intruders(&self, limit: u32) -> AppResult<Vec<IntruderEvent>> {
        with_connection(&self.db, "load intruder events", |conn| {
            IntruderEvent::find_recent(conn, limit)
        })
    }

    pub fn intruders_for(&self, target_id: &str, limit: u32) -> AppResult<Vec<IntruderEvent>> {
        let target_id = validate_target_id(target_id)?;
        with_connection(&self.db, "load intruder events", |conn| {
            IntruderEvent::find_for_target(conn, target_id, limit)
        })
    }

    pub fn usage_analytics(&self) -> UsageAnalytics {
        UsageAnalytics::new(self.db())
    }

    /// A watcher reading the persisted target set and recording usage history.
    pub fn foreground_watcher(
        &self,
        usage: Arc<dyn UsageStatsProvider>,
        launcher: Arc<dyn LockLauncher>,
        config: &WatcherConfig,
    ) -> ForegroundWatcher {
        ForegroundWatcher::new(
            usage,
            Arc::new(PersistedTargets::new(self.db())),
            launcher,
            config,
        )
        .with_usage_log(Arc::new(PersistedUsageLog::new(self.db())))
    }

    /// Intruder response writing evidence under [`Self::evidence_dir`].
    pub fn evidence_response(
        &self,
        camera: Arc<dyn EvidenceCamera>,
        location: Arc<dyn LocationProvider>,
    ) -> std::io::Result<EvidenceResponse> {
        let sink: Arc<dyn IntruderSink> = Arc::new(PersistedIntruderLog::new(self.db()));
        let worker = CaptureWorker::spawn(camera, location, Arc::clone(&sink), self.evidence_dir())?;
        Ok(EvidenceResponse::new(worker, sink))
    }

    /// Gate for `target` using the current security config.
    pub fn lock_gate(
        &self,
        target: &str,
        authenticator: Arc<dyn Authenticator>,
        response: Arc<dyn IntruderResponse>,
    ) -> AppResult<LockGate> {
        let config = self.security_config()?;
        Ok(LockGate::present(target, config, authenticator, response))
    }
}
