// src/constants.rs

use std::time::Duration;

/// Seconds in one day (24 * 60 * 60)
pub const SECS_PER_DAY: i64 = 86400;

/// Milliseconds in one day
pub const MILLIS_PER_DAY: i64 = SECS_PER_DAY * 1000;

/// Delay between two foreground polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Trailing window handed to the usage-stats provider on every poll
pub const DEFAULT_USAGE_WINDOW: Duration = Duration::from_secs(10);

/// Maximum lock target identifier length in bytes
pub const MAX_TARGET_ID_LEN: usize = 255;

/// Default page size for intruder event listings
pub const DEFAULT_INTRUDER_LIST_LIMIT: u32 = 50;

/// Paths whose presence marks a device as rooted
pub const SU_BINARY_PATHS: &[&str] = &[
    "/system/app/Superuser.apk",
    "/sbin/su",
    "/system/bin/su",
    "/system/xbin/su",
    "/data/local/xbin/su",
    "/data/local/bin/su",
    "/system/sd/xbin/su",
    "/system/bin/failsafe/su",
    "/data/local/su",
];
