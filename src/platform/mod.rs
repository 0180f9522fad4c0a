pub mod types;

pub use types::{UsageError, UsageStat, UsageStatsProvider};

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "linux")]
pub use linux::LinuxUsageProvider as NativeUsageProvider;

/// Fallback for platforms without a foreground query; the watcher treats
/// every poll as "no data" and never triggers.
#[cfg(not(target_os = "linux"))]
pub struct NativeUsageProvider;

#[cfg(not(target_os = "linux"))]
impl NativeUsageProvider {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(not(target_os = "linux"))]
impl Default for NativeUsageProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_os = "linux"))]
impl UsageStatsProvider for NativeUsageProvider {
    fn query_usage(&self, _begin_ms: i64, _end_ms: i64) -> Result<Vec<UsageStat>, UsageError> {
        Err(UsageError::Unavailable(
            "no foreground query on this platform".to_string(),
        ))
    }
}
