use crate::config::LoggingConfig;
use crate::constants::env as env_vars;
use crate::errors::ConfigError;
use chrono::{Local, NaiveDate};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Verbosity used when `RUST_LOG` is not set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(ConfigError::Invalid(format!(
                "unknown log level '{}'",
                other
            ))),
        }
    }
}

static LOG_LEVEL: Mutex<LogLevel> = Mutex::new(LogLevel::Info);

fn current_level() -> LogLevel {
    LOG_LEVEL.lock().map(|level| *level).unwrap_or(LogLevel::Info)
}

pub fn set_log_level(level: LogLevel) {
    if let Ok(mut current) = LOG_LEVEL.lock() {
        *current = level;
    }
}

/// Reads `R8CI_LOG_LEVEL`. Unknown values are ignored.
pub fn set_log_level_from_env() {
    let Ok(value) = std::env::var(env_vars::LOG_LEVEL) else {
        return;
    };
    match value.parse::<LogLevel>() {
        Ok(level) => set_log_level(level),
        Err(e) => eprintln!("Ignoring {}: {}", env_vars::LOG_LEVEL, e),
    }
}

/// `-v` raises the level to debug, `-vv` to trace. Never lowers it.
pub fn apply_verbosity(verbose: u8) {
    let requested = match verbose {
        0 => return,
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };
    if requested > current_level() {
        set_log_level(requested);
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(current_level().directive()))
}

struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Session log files are named `<session>_<date>_<time>_<pid>.log`.
fn session_date(path: &Path, prefix: &str) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let date = name.strip_prefix(prefix)?.split('_').next()?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn is_older_than(path: &Path, prefix: &str, max_age: Duration) -> bool {
    let Some(started) = session_date(path, prefix)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .and_then(|dt| dt.and_local_timezone(Local).single())
    else {
        return false;
    };
    SystemTime::now()
        .duration_since(SystemTime::from(started))
        .is_ok_and(|age| age > max_age)
}

/// Removes old logs of one session kind, keeping at most `max_files` and
/// nothing older than `max_age_days`. A zero limit disables that check.
fn prune_session_logs(dir: &Path, prefix: &str, config: &LoggingConfig) -> Result<(), ConfigError> {
    fs::create_dir_all(dir)?;

    let mut logs: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix) && n.ends_with(".log"))
        })
        .collect();
    // Names start with the date, so this is oldest first.
    logs.sort();

    let excess = if config.max_files > 0 {
        logs.len().saturating_sub(config.max_files)
    } else {
        0
    };
    let max_age = Duration::from_secs(config.max_age_days * 24 * 3600);
    for (index, path) in logs.iter().enumerate() {
        let expired = config.max_age_days > 0 && is_older_than(path, prefix, max_age);
        if index < excess || expired {
            if let Err(e) = fs::remove_file(path) {
                eprintln!("Could not remove old log {}: {}", path.display(), e);
            }
        }
    }
    Ok(())
}

fn cache_home() -> Result<PathBuf, ConfigError> {
    xdg::BaseDirectories::with_prefix("r8ci")
        .get_cache_home()
        .ok_or(ConfigError::HomeDirectoryNotFound)
}

/// Logs to stderr and to a file under `$XDG_CACHE_HOME/r8ci/logs`, with
/// `<session>.log` pointing at the newest one.
///
/// The tester and supervisor run unattended for days, so their history is
/// kept on disk.
pub fn init_session_logger(name: &str, config: &LoggingConfig) -> Result<PathBuf, ConfigError> {
    let cache_home = cache_home()?;
    let logs_dir = cache_home.join("logs");
    let prefix = format!("{}_", name);
    prune_session_logs(&logs_dir, &prefix, config)?;

    let filename = format!(
        "{}{}_{}.log",
        prefix,
        Local::now().format("%Y-%m-%d_%H-%M-%S"),
        std::process::id()
    );
    let log_path = logs_dir.join(&filename);
    let log_file = OpenOptions::new().create(true).append(true).open(&log_path)?;

    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(log_file))
                .with_timer(LocalTimeFormatter)
                .with_ansi(false)
                .with_target(false)
                .with_file(true)
                .with_line_number(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(LocalTimeFormatter)
                .with_target(false),
        )
        .try_init()
        .map_err(|e| ConfigError::General(format!("Failed to install logger: {}", e)))?;

    let latest = cache_home.join(format!("{}.log", name));
    let _ = fs::remove_file(&latest);
    #[cfg(unix)]
    {
        if let Err(e) = std::os::unix::fs::symlink(Path::new("logs").join(&filename), &latest) {
            tracing::debug!("Could not link {}: {}", latest.display(), e);
        }
    }

    tracing::info!("{} session logging to {}", name, log_path.display());
    Ok(log_path)
}

/// Stderr only, for the short-lived commands.
pub fn init_stderr_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_timer(LocalTimeFormatter)
        .with_target(false)
        .try_init();
}

/// Shell-like rendering of a command line; empty or spaced args are quoted.
pub fn format_command_for_display(command: &Command) -> String {
    let mut parts = vec![command.get_program().to_string_lossy().to_string()];
    for arg in command.get_args() {
        let arg = arg.to_string_lossy();
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            parts.push(format!("'{}'", arg));
        } else {
            parts.push(arg.to_string());
        }
    }
    parts.join(" ")
}

pub fn log_and_print_command(command: &Command) {
    tracing::debug!("[CMD] {}", format_command_for_display(command));
}
