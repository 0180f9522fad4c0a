pub mod foreground_session;
pub mod intruder_event;
pub mod lock_target;
pub mod security_config;

pub use foreground_session::ForegroundSession;
pub use intruder_event::{GeoPoint, IntruderEvent, UnlockMethod};
pub use lock_target::LockTarget;
pub use security_config::{ConfigFlag, SecurityConfig};

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch; a clock set before 1970 reads as 0.
pub fn current_millis() -> i64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    i64::try_from(elapsed).unwrap_or(i64::MAX)
}
