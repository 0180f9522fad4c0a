use applock_lib::constants::{
    DEFAULT_INTRUDER_LIST_LIMIT, DEFAULT_POLL_INTERVAL, DEFAULT_USAGE_WINDOW,
};
use applock_lib::models::{ConfigFlag, IntruderEvent, SecurityConfig};
use applock_lib::platform::NativeUsageProvider;
use applock_lib::validation::{parse_flag_value, validate_target_id};
use applock_lib::watcher::{LockLauncher, LockTrigger, WatcherConfig, WatcherService};
use applock_lib::{init, safe_lock, AppLock, InitOptions};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, Command as Process, ExitCode};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser, Debug)]
#[command(name = "applock", version, about)]
struct Args {
    /// Database file (defaults to the per-user data directory)
    #[arg(long, env = "APPLOCK_DB", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the foreground app and fire on locked targets
    Watch {
        #[arg(long, default_value_t = millis(DEFAULT_POLL_INTERVAL))]
        interval_ms: u64,

        /// How far back each usage query looks
        #[arg(long, default_value_t = millis(DEFAULT_USAGE_WINDOW))]
        window_ms: u64,

        /// Command to spawn with the locked target as its argument
        #[arg(long)]
        on_lock: Option<String>,

        /// Identifier of the lock screen itself, never treated as a switch
        #[arg(long)]
        self_target: Option<String>,
    },
    /// Manage locked targets
    Targets {
        #[command(subcommand)]
        action: TargetsAction,
    },
    /// Inspect recorded intruder events
    Intruders {
        #[command(subcommand)]
        action: IntrudersAction,
    },
    /// Show or change security settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Today's foreground minutes for a target
    Usage { target: String },
    /// Check for root indicators and an attached debugger
    Integrity {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum TargetsAction {
    Add { target: String },
    Remove { target: String },
    List,
}

#[derive(Subcommand, Debug)]
enum IntrudersAction {
    List {
        #[arg(long, default_value_t = DEFAULT_INTRUDER_LIST_LIMIT)]
        limit: u32,

        /// Only attempts against this target
        #[arg(long)]
        target: Option<String>,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Show {
        #[arg(long)]
        json: bool,
    },
    Set {
        flag: ConfigFlag,
        #[arg(value_parser = parse_flag_value)]
        value: bool,
    },
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Logs each trigger and optionally hands the target to an external command.
struct CommandLauncher {
    program: Option<String>,
    children: Mutex<Vec<Child>>,
}

impl CommandLauncher {
    fn new(program: Option<String>) -> Self {
        Self {
            program,
            children: Mutex::new(Vec::new()),
        }
    }

    /// Drop handles of children that already exited.
    fn reap(children: &mut Vec<Child>) {
        children.retain_mut(|child| matches!(child.try_wait(), Ok(None)));
    }
}

impl LockLauncher for CommandLauncher {
    fn launch(&self, trigger: &LockTrigger) {
        log::info!(
            "Locked target {} in foreground at {}",
            trigger.target,
            trigger.detected_at_ms
        );

        let Some(program) = &self.program else {
            return;
        };

        match Process::new(program).arg(&trigger.target).spawn() {
            Ok(child) => {
                let mut children = safe_lock(&self.children, "lock launcher");
                Self::reap(&mut children);
                children.push(child);
            }
            Err(e) => log::error!("Failed to spawn {program}: {e}"),
        }
    }
}

fn watch(app: &AppLock, config: &WatcherConfig, on_lock: Option<String>) -> CliResult {
    let watcher = app.foreground_watcher(
        Arc::new(NativeUsageProvider::new()),
        Arc::new(CommandLauncher::new(on_lock)),
        config,
    );
    let service = Arc::new(WatcherService::new(config));
    let stopper = Arc::clone(&service);
    ctrlc::set_handler(move || {
        log::info!("Shutdown requested, stopping foreground watcher");
        stopper.stop();
    })?;

    // The thread closes the open usage session before it exits.
    let handle = service.start(watcher)?;
    handle
        .join()
        .map_err(|_| "foreground watcher thread panicked")?;
    Ok(())
}

fn print_config(out: &mut impl Write, config: &SecurityConfig) -> std::io::Result<()> {
    for flag in ConfigFlag::ALL {
        let name = flag.as_str();
        writeln!(out, "{name:<18} {}", config.get(flag))?;
    }
    Ok(())
}

fn print_intruders(out: &mut impl Write, events: &[IntruderEvent]) -> std::io::Result<()> {
    if events.is_empty() {
        writeln!(out, "No intruder events recorded")?;
    }
    for event in events {
        let evidence = event.evidence_path.as_deref().unwrap_or("-");
        let location = event
            .location
            .map_or_else(|| "-".to_string(), |p| format!("{},{}", p.latitude, p.longitude));
        writeln!(
            out,
            "{}\t{}\t{}\t{evidence}\t{location}",
            event.timestamp, event.attempted_target, event.method
        )?;
    }
    Ok(())
}

fn run(args: Args) -> CliResult {
    let app = init(InitOptions { db_path: args.db })?;
    let mut out = std::io::stdout().lock();

    match args.command {
        Command::Watch {
            interval_ms,
            window_ms,
            on_lock,
            self_target,
        } => {
            if interval_ms == 0 {
                return Err("--interval-ms must be greater than zero".into());
            }
            let config = WatcherConfig {
                poll_interval: Duration::from_millis(interval_ms),
                usage_window: Duration::from_millis(window_ms),
                self_target: self_target
                    .as_deref()
                    .map(validate_target_id)
                    .transpose()?
                    .map(str::to_string),
            };
            watch(&app, &config, on_lock)?;
        }
        Command::Targets { action } => match action {
            TargetsAction::Add { target } => {
                let target = app.add_target(&target)?;
                writeln!(out, "Locked {}", target.target_id)?;
            }
            TargetsAction::Remove { target } => {
                if app.remove_target(&target)? {
                    writeln!(out, "Unlocked {}", target.trim())?;
                } else {
                    writeln!(out, "{} was not locked", target.trim())?;
                }
            }
            TargetsAction::List => {
                for target in app.targets()? {
                    writeln!(out, "{}", target.target_id)?;
                }
            }
        },
        Command::Intruders {
            action: IntrudersAction::List { limit, target, json },
        } => {
            let events = match target {
                Some(target) => app.intruders_for(&target, limit)?,
                None => app.recent_intruders(limit)?,
            };
            if json {
                serde_json::to_writer_pretty(&mut out, &events)?;
                writeln!(out)?;
            } else {
                print_intruders(&mut out, &events)?;
            }
        }
        Command::Config { action } => match action {
            ConfigAction::Show { json } => {
                let config = app.security_config()?;
                if json {
                    serde_json::to_writer_pretty(&mut out, &config)?;
                    writeln!(out)?;
                } else {
                    print_config(&mut out, &config)?;
                }
            }
            ConfigAction::Set { flag, value } => {
                let config = app.set_flag(flag, value)?;
                if config.get(flag) != value {
                    log::warn!("{flag} left at {} by dependent settings", config.get(flag));
                }
                print_config(&mut out, &config)?;
            }
        },
        Command::Usage { target } => {
            let target = validate_target_id(&target)?;
            let minutes = app.usage_analytics().daily_usage_minutes(target)?;
            writeln!(out, "{target}: {minutes} min today")?;
        }
        Command::Integrity { json } => {
            let report = app.integrity();
            if json {
                serde_json::to_writer_pretty(&mut out, report)?;
                writeln!(out)?;
            } else {
                let status = if report.is_compromised() { "compromised" } else { "clean" };
                writeln!(out, "environment: {status}")?;
                writeln!(out, "debugger attached: {}", report.debugger_attached)?;
                if report.root_indicators.is_empty() {
                    writeln!(out, "root indicators: none")?;
                }
                for path in &report.root_indicators {
                    writeln!(out, "root indicator: {path}")?;
                }
            }
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("applock=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
