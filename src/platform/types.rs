/// One entry of a usage-stats query: a target and when it was last in front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageStat {
    pub target: String,
    pub last_time_used_ms: i64,
}

impl UsageStat {
    pub fn new(target: &str, last_time_used_ms: i64) -> Self {
        Self {
            target: target.to_string(),
            last_time_used_ms,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("usage stats unavailable: {0}")]
    Unavailable(String),
    #[error("usage query failed: {0}")]
    Query(String),
}

/// Source of recently-foregrounded targets.
pub trait UsageStatsProvider: Send + Sync {
    /// Targets used within `[begin_ms, end_ms]`, in no particular order.
    fn query_usage(&self, begin_ms: i64, end_ms: i64) -> Result<Vec<UsageStat>, UsageError>;
}
