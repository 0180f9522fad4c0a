use rusqlite::types::Type;
use rusqlite::{params, Connection, Result, Row};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// How an unlock attempt was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlockMethod {
    Pin,
    Emotion,
    Pattern,
    Ar,
}

impl UnlockMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            UnlockMethod::Pin => "pin",
            UnlockMethod::Emotion => "emotion",
            UnlockMethod::Pattern => "pattern",
            UnlockMethod::Ar => "ar",
        }
    }
}

impl fmt::Display for UnlockMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown unlock method: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for UnlockMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pin" => Ok(UnlockMethod::Pin),
            "emotion" => Ok(UnlockMethod::Emotion),
            "pattern" => Ok(UnlockMethod::Pattern),
            "ar" => Ok(UnlockMethod::Ar),
            other => Err(UnknownMethod(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Returns None for a fix outside the valid coordinate range.
    pub fn checked(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
        })
    }
}

/// A failed unlock attempt together with whatever evidence was gathered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntruderEvent {
    pub id: Option<i64>,
    pub timestamp: i64,
    pub evidence_path: Option<String>,
    pub attempted_target: String,
    pub method: UnlockMethod,
    pub location: Option<GeoPoint>,
}

impl IntruderEvent {
    pub fn new(timestamp: i64, attempted_target: &str, method: UnlockMethod) -> Self {
        Self {
            id: None,
            timestamp,
            evidence_path: None,
            attempted_target: attempted_target.to_string(),
            method,
            location: None,
        }
    }

    pub fn save(&mut self, conn: &Connection) -> Result<()> {
        // Out-of-range fixes are dropped rather than stored.
        let location = self
            .location
            .and_then(|p| GeoPoint::checked(p.latitude, p.longitude));

        conn.execute(
            "INSERT INTO intruder_events (timestamp, evidence_path, attempted_target, method, latitude, longitude)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                self.timestamp,
                self.evidence_path,
                self.attempted_target,
                self.method.as_str(),
                location.map(|p| p.latitude),
                location.map(|p| p.longitude),
            ],
        )?;
        self.location = location;
        self.id = Some(conn.last_insert_rowid());
        Ok(())
    }

    /// Most recent events first.
    pub fn find_recent(conn: &Connection, limit: u32) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, evidence_path, attempted_target, method, latitude, longitude
             FROM intruder_events ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map([limit], Self::from_row)?;
        rows.collect()
    }

    /// Most recent events against `target_id` first.
    pub fn find_for_target(conn: &Connection, target_id: &str, limit: u32) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, evidence_path, attempted_target, method, latitude, longitude
             FROM intruder_events WHERE attempted_target = ?1
             ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![target_id, limit], Self::from_row)?;
        rows.collect()
    }

    fn from_row(row: &Row<'_>) -> Result<Self> {
        let method: String = row.get(4)?;
        let method = method
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

        let latitude: Option<f64> = row.get(5)?;
        let longitude: Option<f64> = row.get(6)?;
        let location = match (latitude, longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint {
                latitude: lat,
                longitude: lon,
            }),
            _ => None,
        };

        Ok(Self {
            id: Some(row.get(0)?),
            timestamp: row.get(1)?,
            evidence_path: row.get(2)?,
            attempted_target: row.get(3)?,
            method,
            location,
        })
    }
}
