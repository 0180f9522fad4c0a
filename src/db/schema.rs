pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS locked_apps (
    target_id TEXT PRIMARY KEY,
    date_added INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS intruder_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    evidence_path TEXT,
    attempted_target TEXT NOT NULL,
    method TEXT NOT NULL,
    latitude REAL,
    longitude REAL
);

CREATE TABLE IF NOT EXISTS security_config (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    dual_mode INTEGER NOT NULL DEFAULT 0,
    secret_mode_active INTEGER NOT NULL DEFAULT 0,
    emotion_lock_enabled INTEGER NOT NULL DEFAULT 1,
    invisible_pattern_enabled INTEGER NOT NULL DEFAULT 1,
    ar_lock_enabled INTEGER NOT NULL DEFAULT 0,
    intruder_capture_enabled INTEGER NOT NULL DEFAULT 1,
    decoy_enabled INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS foreground_sessions (
    id INTEGER PRIMARY KEY,
    target_id TEXT NOT NULL,
    started_at INTEGER NOT NULL,
    ended_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_intruder_events_timestamp ON intruder_events(timestamp);
CREATE INDEX IF NOT EXISTS idx_foreground_sessions_target ON foreground_sessions(target_id, started_at);
CREATE INDEX IF NOT EXISTS idx_foreground_sessions_open ON foreground_sessions(ended_at) WHERE ended_at IS NULL;
"#;

pub const TABLES: &[&str] = &[
    "locked_apps",
    "intruder_events",
    "security_config",
    "foreground_sessions",
];
