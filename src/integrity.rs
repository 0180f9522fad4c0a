//! Environment integrity checks run once at startup.

use crate::constants::SU_BINARY_PATHS;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    /// Privilege-escalation binaries found on disk.
    pub root_indicators: Vec<String>,
    pub debugger_attached: bool,
}

impl IntegrityReport {
    pub fn is_rooted(&self) -> bool {
        !self.root_indicators.is_empty()
    }

    pub fn is_compromised(&self) -> bool {
        self.is_rooted() || self.debugger_attached
    }
}

pub fn check() -> IntegrityReport {
    check_with(SU_BINARY_PATHS, Path::new("/proc/self/status"))
}

pub fn check_with(su_paths: &[&str], status_path: &Path) -> IntegrityReport {
    let root_indicators = su_paths
        .iter()
        .filter(|p| Path::new(p).exists())
        .map(|p| (*p).to_string())
        .collect();

    // No status file (non-Linux) reads as "no tracer".
    let debugger_attached = std::fs::read_to_string(status_path)
        .ok()
        .and_then(|status| tracer_pid(&status))
        .is_some_and(|pid| pid != 0);

    IntegrityReport {
        root_indicators,
        debugger_attached,
    }
}

fn tracer_pid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("TracerPid:"))
        .and_then(|value| value.trim().parse().ok())
}
