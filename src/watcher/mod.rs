//! Foreground watcher: polls the usage-stats provider and launches the lock
//! gate when a protected target comes to the front.

use crate::constants::{DEFAULT_POLL_INTERVAL, DEFAULT_USAGE_WINDOW};
use crate::error::AppResult;
use crate::models::current_millis;
use crate::platform::{UsageStat, UsageStatsProvider};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Read-only view of the protected set.
pub trait LockTargetLookup: Send + Sync {
    fn is_locked(&self, target: &str) -> AppResult<bool>;
}

impl LockTargetLookup for HashSet<String> {
    fn is_locked(&self, target: &str) -> AppResult<bool> {
        Ok(self.contains(target))
    }
}

/// Emitted when a protected target newly takes the foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTrigger {
    pub target: String,
    pub detected_at_ms: i64,
}

/// Starts a lock gate for a trigger.
pub trait LockLauncher: Send + Sync {
    fn launch(&self, trigger: &LockTrigger);
}

/// Receives foreground changes, e.g. for usage history.
pub trait UsageLog: Send + Sync {
    fn record_switch(&self, target: &str, at_ms: i64);
    fn close(&self, at_ms: i64);
}

pub struct WatcherConfig {
    pub poll_interval: Duration,
    pub usage_window: Duration,
    /// The locker's own identifier; observing it never counts as a switch.
    pub self_target: Option<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            usage_window: DEFAULT_USAGE_WINDOW,
            self_target: None,
        }
    }
}

/// Last observed foreground target. Lives only as long as the watcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchState {
    last_observed: Option<String>,
}

impl WatchState {
    pub fn last_observed(&self) -> Option<&str> {
        self.last_observed.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Query failed or returned nothing usable; state untouched.
    NoData,
    /// The locker itself is in front; state untouched.
    SelfObserved,
    /// The protected set could not be read; state untouched so the next poll
    /// asks again.
    LookupFailed { target: String },
    Observed {
        target: String,
        changed: bool,
        trigger: Option<LockTrigger>,
    },
}

impl PollOutcome {
    pub fn trigger(&self) -> Option<&LockTrigger> {
        match self {
            PollOutcome::Observed { trigger, .. } => trigger.as_ref(),
            PollOutcome::NoData
            | PollOutcome::SelfObserved
            | PollOutcome::LookupFailed { .. } => None,
        }
    }
}

pub struct ForegroundWatcher {
    usage: Arc<dyn UsageStatsProvider>,
    targets: Arc<dyn LockTargetLookup>,
    launcher: Arc<dyn LockLauncher>,
    usage_log: Option<Arc<dyn UsageLog>>,
    window_ms: i64,
    self_target: Option<String>,
    state: WatchState,
}

impl ForegroundWatcher {
    pub fn new(
        usage: Arc<dyn UsageStatsProvider>,
        targets: Arc<dyn LockTargetLookup>,
        launcher: Arc<dyn LockLauncher>,
        config: &WatcherConfig,
    ) -> Self {
        Self {
            usage,
            targets,
            launcher,
            usage_log: None,
            window_ms: duration_millis(config.usage_window),
            self_target: config.self_target.clone(),
            state: WatchState::default(),
        }
    }

    pub fn with_usage_log(mut self, usage_log: Arc<dyn UsageLog>) -> Self {
        self.usage_log = Some(usage_log);
        self
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    pub fn poll_once(&mut self) -> PollOutcome {
        self.poll_at(current_millis())
    }

    /// One poll cycle as of `now_ms`.
    pub fn poll_at(&mut self, now_ms: i64) -> PollOutcome {
        let begin_ms = now_ms.saturating_sub(self.window_ms);
        let query = panic::catch_unwind(AssertUnwindSafe(|| {
            self.usage.query_usage(begin_ms, now_ms)
        }));

        let stats = match query {
            Ok(Ok(stats)) => stats,
            Ok(Err(e)) => {
                log::debug!("Usage query failed, treating as no change: {e}");
                return PollOutcome::NoData;
            }
            Err(_) => {
                log::error!("Usage provider panicked, treating as no change");
                return PollOutcome::NoData;
            }
        };

        let Some(current) = most_recent(&stats) else {
            return PollOutcome::NoData;
        };

        if self.self_target.as_deref() == Some(current) {
            return PollOutcome::SelfObserved;
        }

        let changed = self.state.last_observed() != Some(current);
        let locked = if changed {
            match self.lookup(current) {
                Some(locked) => locked,
                None => {
                    return PollOutcome::LookupFailed {
                        target: current.to_string(),
                    }
                }
            }
        } else {
            false
        };
        let trigger = locked.then(|| LockTrigger {
            target: current.to_string(),
            detected_at_ms: now_ms,
        });

        if changed {
            self.state.last_observed = Some(current.to_string());
            if let Some(usage_log) = &self.usage_log {
                usage_log.record_switch(current, now_ms);
            }
        }

        if let Some(trigger) = &trigger {
            log::info!("Locked target {} in foreground, launching gate", trigger.target);
            if panic::catch_unwind(AssertUnwindSafe(|| self.launcher.launch(trigger))).is_err() {
                log::error!("Lock launcher panicked for {}", trigger.target);
            }
        }

        PollOutcome::Observed {
            target: current.to_string(),
            changed,
            trigger,
        }
    }

    fn lookup(&self, target: &str) -> Option<bool> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.targets.is_locked(target))) {
            Ok(Ok(locked)) => Some(locked),
            Ok(Err(e)) => {
                log::warn!("Lock lookup for {target} failed, retrying next poll: {e}");
                None
            }
            Err(_) => {
                log::error!("Lock lookup for {target} panicked, retrying next poll");
                None
            }
        }
    }

    fn finish(&self, at_ms: i64) {
        if let Some(usage_log) = &self.usage_log {
            usage_log.close(at_ms);
        }
    }
}

/// Entry with the greatest last-used time; the first one wins a tie.
fn most_recent(stats: &[UsageStat]) -> Option<&str> {
    stats
        .iter()
        .filter(|s| !s.target.is_empty())
        .fold(None, |best: Option<&UsageStat>, s| match best {
            Some(b) if b.last_time_used_ms >= s.last_time_used_ms => Some(b),
            _ => Some(s),
        })
        .map(|s| s.target.as_str())
}

fn duration_millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// Drives a [`ForegroundWatcher`] on its own thread.
///
/// The thread is the only writer of the watch state.
pub struct WatcherService {
    poll_interval: Duration,
    running: Arc<AtomicBool>,
}

impl WatcherService {
    pub fn new(config: &WatcherConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn start(&self, mut watcher: ForegroundWatcher) -> std::io::Result<thread::JoinHandle<()>> {
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let poll_interval = self.poll_interval;

        let spawned = thread::Builder::new()
            .name("foreground-watcher".to_string())
            .spawn(move || {
                log::info!("Foreground watcher started ({}ms interval)", poll_interval.as_millis());
                while running.load(Ordering::SeqCst) {
                    watcher.poll_once();
                    thread::sleep(poll_interval);
                }
                watcher.finish(current_millis());
                log::info!("Foreground watcher stopped");
            });

        if spawned.is_err() {
            self.running.store(false, Ordering::SeqCst);
        }
        spawned
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for WatcherService {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::UsageError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays one scripted query result per poll, then reports nothing.
    struct ScriptedUsage {
        script: Mutex<VecDeque<Result<Vec<UsageStat>, UsageError>>>,
        windows: Mutex<Vec<(i64, i64)>>,
    }

    impl ScriptedUsage {
        fn new(script: Vec<Result<Vec<UsageStat>, UsageError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                windows: Mutex::new(Vec::new()),
            }
        }

        fn observations(targets: &[&str]) -> Self {
            Self::new(
                targets
                    .iter()
                    .map(|t| Ok(vec![UsageStat::new(t, 1)]))
                    .collect(),
            )
        }
    }

    impl UsageStatsProvider for ScriptedUsage {
        fn query_usage(&self, begin_ms: i64, end_ms: i64) -> Result<Vec<UsageStat>, UsageError> {
            self.windows.lock().unwrap().push((begin_ms, end_ms));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    #[derive(Default)]
    struct RecordingLauncher {
        launched: Mutex<Vec<LockTrigger>>,
    }

    impl RecordingLauncher {
        fn targets(&self) -> Vec<String> {
            self.launched
                .lock()
                .unwrap()
                .iter()
                .map(|t| t.target.clone())
                .collect()
        }
    }

    impl LockLauncher for RecordingLauncher {
        fn launch(&self, trigger: &LockTrigger) {
            self.launched.lock().unwrap().push(trigger.clone());
        }
    }

    struct PanickingLauncher;

    impl LockLauncher for PanickingLauncher {
        fn launch(&self, _trigger: &LockTrigger) {
            panic!("activity start refused");
        }
    }

    #[derive(Default)]
    struct RecordingUsageLog {
        switches: Mutex<Vec<(String, i64)>>,
        closed: Mutex<Option<i64>>,
    }

    impl UsageLog for RecordingUsageLog {
        fn record_switch(&self, target: &str, at_ms: i64) {
            self.switches.lock().unwrap().push((target.to_string(), at_ms));
        }

        fn close(&self, at_ms: i64) {
            *self.closed.lock().unwrap() = Some(at_ms);
        }
    }

    /// Fails the first `failures` lookups, then answers from `locked`.
    struct FlakyLookup {
        locked: HashSet<String>,
        failures: Mutex<usize>,
    }

    impl LockTargetLookup for FlakyLookup {
        fn is_locked(&self, target: &str) -> AppResult<bool> {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(crate::error::AppError::Internal("locked_apps unreadable".into()));
            }
            Ok(self.locked.contains(target))
        }
    }

    fn locked(targets: &[&str]) -> Arc<dyn LockTargetLookup> {
        Arc::new(targets.iter().map(|t| (*t).to_string()).collect::<HashSet<_>>())
    }

    fn watcher(
        usage: Arc<ScriptedUsage>,
        targets: &[&str],
        launcher: Arc<RecordingLauncher>,
    ) -> ForegroundWatcher {
        ForegroundWatcher::new(
            usage,
            locked(targets),
            launcher,
            &WatcherConfig::default(),
        )
    }

    fn run_polls(watcher: &mut ForegroundWatcher, polls: usize) -> Vec<PollOutcome> {
        (0..polls)
            .map(|i| watcher.poll_at(10_000 + i64::try_from(i).unwrap() * 500))
            .collect()
    }

    #[test]
    fn test_single_trigger_on_transition_into_locked_target() {
        let usage = Arc::new(ScriptedUsage::observations(&["A", "A", "B", "B", "C"]));
        let launcher = Arc::new(RecordingLauncher::default());
        let mut watcher = watcher(usage, &["B"], Arc::clone(&launcher));

        let outcomes = run_polls(&mut watcher, 5);

        let fired: Vec<usize> = outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| o.trigger().is_some())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(fired, vec![2], "only the transition into B fires");
        assert_eq!(launcher.targets(), vec!["B"]);
        assert_eq!(watcher.state().last_observed(), Some("C"));
    }

    #[test]
    fn test_repeated_locked_observations_trigger_once() {
        let usage = Arc::new(ScriptedUsage::observations(&["bank"; 6]));
        let launcher = Arc::new(RecordingLauncher::default());
        let mut watcher = watcher(usage, &["bank"], Arc::clone(&launcher));

        run_polls(&mut watcher, 6);

        assert_eq!(launcher.targets(), vec!["bank"]);
    }

    #[test]
    fn test_leaving_and_returning_triggers_again() {
        let usage = Arc::new(ScriptedUsage::observations(&["bank", "home", "bank"]));
        let launcher = Arc::new(RecordingLauncher::default());
        let mut watcher = watcher(usage, &["bank"], Arc::clone(&launcher));

        run_polls(&mut watcher, 3);

        assert_eq!(launcher.targets(), vec!["bank", "bank"]);
    }

    #[test]
    fn test_trigger_iff_locked_and_changed() {
        let sequence = ["x", "L1", "L2", "L2", "x", "x", "L1", "L1", "y", "L2"];
        let locked_set = ["L1", "L2"];
        let usage = Arc::new(ScriptedUsage::observations(&sequence));
        let launcher = Arc::new(RecordingLauncher::default());
        let mut watcher = watcher(usage, &locked_set, Arc::clone(&launcher));

        let outcomes = run_polls(&mut watcher, sequence.len());

        let mut previous: Option<&str> = None;
        for (current, outcome) in sequence.iter().zip(&outcomes) {
            let expected = locked_set.contains(current) && previous != Some(*current);
            assert_eq!(outcome.trigger().is_some(), expected, "observation {current}");
            previous = Some(*current);
        }
    }

    #[test]
    fn test_failed_query_leaves_state_untouched() {
        let usage = Arc::new(ScriptedUsage::new(vec![
            Ok(vec![UsageStat::new("bank", 1)]),
            Err(UsageError::Unavailable("permission revoked".into())),
            Ok(vec![]),
            Ok(vec![UsageStat::new("bank", 2)]),
        ]));
        let launcher = Arc::new(RecordingLauncher::default());
        let mut watcher = watcher(usage, &["bank"], Arc::clone(&launcher));

        let outcomes = run_polls(&mut watcher, 4);

        assert_eq!(outcomes[1], PollOutcome::NoData);
        assert_eq!(outcomes[2], PollOutcome::NoData);
        assert_eq!(watcher.state().last_observed(), Some("bank"));
        assert_eq!(launcher.targets(), vec!["bank"], "no data is not a foreground change");
    }

    #[test]
    fn test_no_data_on_first_poll_never_triggers() {
        let usage = Arc::new(ScriptedUsage::new(vec![Err(UsageError::Query("binder died".into()))]));
        let launcher = Arc::new(RecordingLauncher::default());
        let mut watcher = watcher(usage, &["bank"], Arc::clone(&launcher));

        assert_eq!(watcher.poll_at(1_000), PollOutcome::NoData);
        assert_eq!(watcher.state(), &WatchState::default());
        assert!(launcher.targets().is_empty());
    }

    #[test]
    fn test_most_recent_entry_wins() {
        let usage = Arc::new(ScriptedUsage::new(vec![Ok(vec![
            UsageStat::new("launcher", 9_000),
            UsageStat::new("bank", 9_800),
            UsageStat::new("mail", 9_500),
        ])]));
        let launcher = Arc::new(RecordingLauncher::default());
        let mut watcher = watcher(usage, &["bank"], Arc::clone(&launcher));

        let outcome = watcher.poll_at(10_000);

        assert_eq!(outcome.trigger().map(|t| t.target.as_str()), Some("bank"));
    }

    #[test]
    fn test_tie_keeps_first_entry_and_empty_ids_ignored() {
        let stats = vec![
            UsageStat::new("", 50),
            UsageStat::new("first", 10),
            UsageStat::new("second", 10),
        ];
        assert_eq!(most_recent(&stats), Some("first"));
        assert_eq!(most_recent(&[UsageStat::new("", 1)]), None);
        assert_eq!(most_recent(&[]), None);
    }

    #[test]
    fn test_query_uses_trailing_window() {
        let usage = Arc::new(ScriptedUsage::new(vec![]));
        let launcher = Arc::new(RecordingLauncher::default());
        let mut watcher = watcher(Arc::clone(&usage), &[], launcher);

        watcher.poll_at(60_000);

        assert_eq!(*usage.windows.lock().unwrap(), vec![(50_000, 60_000)]);
    }

    #[test]
    fn test_self_target_does_not_rearm_trigger() {
        let usage = Arc::new(ScriptedUsage::observations(&["bank", "applock", "bank"]));
        let launcher = Arc::new(RecordingLauncher::default());
        let config = WatcherConfig {
            self_target: Some("applock".to_string()),
            ..WatcherConfig::default()
        };
        let mut watcher = ForegroundWatcher::new(
            usage,
            locked(&["bank"]),
            Arc::clone(&launcher) as Arc<dyn LockLauncher>,
            &config,
        );

        let outcomes = run_polls(&mut watcher, 3);

        assert_eq!(outcomes[1], PollOutcome::SelfObserved);
        assert_eq!(launcher.targets(), vec!["bank"]);
    }

    #[test]
    fn test_empty_locked_set_is_pass_through() {
        let usage = Arc::new(ScriptedUsage::observations(&["a", "b", "c"]));
        let launcher = Arc::new(RecordingLauncher::default());
        let mut watcher = watcher(usage, &[], Arc::clone(&launcher));

        run_polls(&mut watcher, 3);

        assert!(launcher.targets().is_empty());
        assert_eq!(watcher.state().last_observed(), Some("c"));
    }

    #[test]
    fn test_panicking_launcher_does_not_stop_watcher() {
        let usage = Arc::new(ScriptedUsage::observations(&["bank", "bank", "home"]));
        let mut watcher = ForegroundWatcher::new(
            usage,
            locked(&["bank"]),
            Arc::new(PanickingLauncher),
            &WatcherConfig::default(),
        );

        let outcomes = run_polls(&mut watcher, 3);

        assert!(outcomes[0].trigger().is_some());
        assert!(outcomes[1].trigger().is_none(), "state was updated before launching");
        assert_eq!(watcher.state().last_observed(), Some("home"));
    }

    #[test]
    fn test_usage_log_sees_switches_only() {
        let usage = Arc::new(ScriptedUsage::observations(&["a", "a", "b"]));
        let log = Arc::new(RecordingUsageLog::default());
        let mut watcher = watcher(usage, &[], Arc::new(RecordingLauncher::default()))
            .with_usage_log(Arc::clone(&log) as Arc<dyn UsageLog>);

        run_polls(&mut watcher, 3);
        watcher.finish(99_999);

        assert_eq!(
            *log.switches.lock().unwrap(),
            vec![("a".to_string(), 10_000), ("b".to_string(), 11_000)]
        );
        assert_eq!(*log.closed.lock().unwrap(), Some(99_999));
    }

    #[test]
    fn test_service_starts_and_stops() {
        let usage = Arc::new(ScriptedUsage::observations(&["bank"]));
        let launcher = Arc::new(RecordingLauncher::default());
        let config = WatcherConfig {
            poll_interval: Duration::from_millis(10),
            ..WatcherConfig::default()
        };
        let watcher = ForegroundWatcher::new(
            usage,
            locked(&["bank"]),
            Arc::clone(&launcher) as Arc<dyn LockLauncher>,
            &config,
        );
        let service = WatcherService::new(&config);

        assert!(!service.is_running());
        let handle = service.start(watcher).unwrap();
        assert!(service.is_running());

        thread::sleep(Duration::from_millis(100));
        service.stop();
        handle.join().unwrap();

        assert!(!service.is_running());
        assert_eq!(launcher.targets(), vec!["bank"]);
    }

    #[test]
    fn test_failed_lookup_is_retried_next_poll() {
        let usage = Arc::new(ScriptedUsage::observations(&["bank", "bank", "bank"]));
        let launcher = Arc::new(RecordingLauncher::default());
        let lookup = FlakyLookup {
            locked: HashSet::from(["bank".to_string()]),
            failures: Mutex::new(1),
        };
        let mut watcher = ForegroundWatcher::new(
            usage,
            Arc::new(lookup),
            Arc::clone(&launcher) as Arc<dyn LockLauncher>,
            &WatcherConfig::default(),
        );

        let outcomes = run_polls(&mut watcher, 3);

        assert_eq!(
            outcomes[0],
            PollOutcome::LookupFailed {
                target: "bank".to_string()
            }
        );
        assert!(outcomes[1].trigger().is_some(), "lookup retried once readable");
        assert!(outcomes[2].trigger().is_none());
        assert_eq!(launcher.targets(), vec!["bank"]);
        assert_eq!(watcher.state().last_observed(), Some("bank"));
    }

    #[test]
    fn test_failed_lookup_does_not_log_switch() {
        let usage = Arc::new(ScriptedUsage::observations(&["bank"]));
        let log = Arc::new(RecordingUsageLog::default());
        let lookup = FlakyLookup {
            locked: HashSet::new(),
            failures: Mutex::new(5),
        };
        let mut watcher = ForegroundWatcher::new(
            usage,
            Arc::new(lookup),
            Arc::new(RecordingLauncher::default()),
            &WatcherConfig::default(),
        )
        .with_usage_log(Arc::clone(&log) as Arc<dyn UsageLog>);

        watcher.poll_at(1_000);

        assert_eq!(watcher.state(), &WatchState::default());
        assert!(log.switches.lock().unwrap().is_empty());
    }
}
