use super::UnlockMethod;
use rusqlite::{params, Connection, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// User-facing security switches, stored as a single row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SecurityConfig {
    pub dual_mode: bool,
    pub secret_mode_active: bool,
    pub emotion_lock_enabled: bool,
    pub invisible_pattern_enabled: bool,
    pub ar_lock_enabled: bool,
    pub intruder_capture_enabled: bool,
    pub decoy_enabled: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            dual_mode: false,
            secret_mode_active: false,
            emotion_lock_enabled: true,
            invisible_pattern_enabled: true,
            ar_lock_enabled: false,
            intruder_capture_enabled: true,
            decoy_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFlag {
    DualMode,
    SecretMode,
    EmotionLock,
    InvisiblePattern,
    ArLock,
    IntruderCapture,
    Decoy,
}

impl ConfigFlag {
    pub const ALL: [ConfigFlag; 7] = [
        ConfigFlag::DualMode,
        ConfigFlag::SecretMode,
        ConfigFlag::EmotionLock,
        ConfigFlag::InvisiblePattern,
        ConfigFlag::ArLock,
        ConfigFlag::IntruderCapture,
        ConfigFlag::Decoy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigFlag::DualMode => "dual-mode",
            ConfigFlag::SecretMode => "secret-mode",
            ConfigFlag::EmotionLock => "emotion-lock",
            ConfigFlag::InvisiblePattern => "invisible-pattern",
            ConfigFlag::ArLock => "ar-lock",
            ConfigFlag::IntruderCapture => "intruder-capture",
            ConfigFlag::Decoy => "decoy",
        }
    }
}

impl fmt::Display for ConfigFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown config flag: {0}")]
pub struct UnknownFlag(pub String);

impl FromStr for ConfigFlag {
    type Err = UnknownFlag;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ConfigFlag::ALL
            .into_iter()
            .find(|flag| flag.as_str() == s)
            .ok_or_else(|| UnknownFlag(s.to_string()))
    }
}

impl SecurityConfig {
    pub fn load(conn: &Connection) -> Result<Self> {
        conn.query_row(
            "SELECT dual_mode, secret_mode_active, emotion_lock_enabled, invisible_pattern_enabled,
                    ar_lock_enabled, intruder_capture_enabled, decoy_enabled
             FROM security_config WHERE id = 1",
            [],
            |row| {
                Ok(Self {
                    dual_mode: row.get::<_, i32>(0)? != 0,
                    secret_mode_active: row.get::<_, i32>(1)? != 0,
                    emotion_lock_enabled: row.get::<_, i32>(2)? != 0,
                    invisible_pattern_enabled: row.get::<_, i32>(3)? != 0,
                    ar_lock_enabled: row.get::<_, i32>(4)? != 0,
                    intruder_capture_enabled: row.get::<_, i32>(5)? != 0,
                    decoy_enabled: row.get::<_, i32>(6)? != 0,
                })
            },
        )
    }

    pub fn save(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO security_config (id, dual_mode, secret_mode_active, emotion_lock_enabled,
                 invisible_pattern_enabled, ar_lock_enabled, intruder_capture_enabled, decoy_enabled)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                self.dual_mode,
                self.secret_mode_active,
                self.emotion_lock_enabled,
                self.invisible_pattern_enabled,
                self.ar_lock_enabled,
                self.intruder_capture_enabled,
                self.decoy_enabled,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, flag: ConfigFlag) -> bool {
        match flag {
            ConfigFlag::DualMode => self.dual_mode,
            ConfigFlag::SecretMode => self.secret_mode_active,
            ConfigFlag::EmotionLock => self.emotion_lock_enabled,
            ConfigFlag::InvisiblePattern => self.invisible_pattern_enabled,
            ConfigFlag::ArLock => self.ar_lock_enabled,
            ConfigFlag::IntruderCapture => self.intruder_capture_enabled,
            ConfigFlag::Decoy => self.decoy_enabled,
        }
    }

    /// Secret mode only exists inside dual mode: enabling it without dual
    /// mode is a no-op, and leaving dual mode clears it.
    pub fn set(&mut self, flag: ConfigFlag, value: bool) {
        match flag {
            ConfigFlag::DualMode => {
                self.dual_mode = value;
                if !value {
                    self.secret_mode_active = false;
                }
            }
            ConfigFlag::SecretMode => self.secret_mode_active = value && self.dual_mode,
            ConfigFlag::EmotionLock => self.emotion_lock_enabled = value,
            ConfigFlag::InvisiblePattern => self.invisible_pattern_enabled = value,
            ConfigFlag::ArLock => self.ar_lock_enabled = value,
            ConfigFlag::IntruderCapture => self.intruder_capture_enabled = value,
            ConfigFlag::Decoy => self.decoy_enabled = value,
        }
    }

    /// PIN is the fallback and cannot be switched off.
    pub fn is_method_enabled(&self, method: UnlockMethod) -> bool {
        match method {
            UnlockMethod::Pin => true,
            UnlockMethod::Emotion => self.emotion_lock_enabled,
            UnlockMethod::Pattern => self.invisible_pattern_enabled,
            UnlockMethod::Ar => self.ar_lock_enabled,
        }
    }
}
