/// Structured logging for the air-quality monitor
///
/// Console output carries the per-cycle status lines; every warning and
/// error is also appended, with a timestamp, to the error log file. The
/// error log is a diagnostic sink only and is never read back.

use chrono::Local;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use crate::model::CycleError;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Fetch,
    Extract,
    Record,
    Schedule,
    Supervisor,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Fetch => write!(f, "FETCH"),
            Component::Extract => write!(f, "EXTRACT"),
            Component::Record => write!(f, "RECORD"),
            Component::Schedule => write!(f, "SCHED"),
            Component::Supervisor => write!(f, "SUPERVISOR"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// The page rendered but had not settled; try again next boundary.
    Expected,
    /// Network, HTTP or filesystem fault.
    Unexpected,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
        }
    }
}

pub fn classify_cycle_failure(err: &CycleError) -> FailureType {
    if err.is_expected() {
        FailureType::Expected
    } else {
        FailureType::Unexpected
    }
}

/// Which component a cycle failure belongs to.
pub fn failure_component(err: &CycleError) -> Component {
    match err {
        CycleError::FetchTimeout { .. } | CycleError::Fetch(_) => Component::Fetch,
        CycleError::ExtractionRejected(_) => Component::Extract,
        CycleError::Sink(_) => Component::Record,
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum level shown on the console
    min_level: LogLevel,
    /// Error log; receives Warning and above
    error_log: Option<String>,
}

impl Logger {
    pub fn init(min_level: LogLevel, error_log: Option<String>) {
        let logger = Logger {
            min_level,
            error_log,
        };

        *LOGGER.lock().unwrap_or_else(PoisonError::into_inner) = Some(logger);
    }

    fn log(&self, level: LogLevel, component: Component, message: &str) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let entry = format_entry(&timestamp.to_string(), level, component, message);

        if level >= self.min_level {
            match level {
                LogLevel::Error => eprintln!("[ERROR] {}", message),
                LogLevel::Warning => eprintln!("[WARN] {}", message),
                LogLevel::Info => println!("[INFO] {}", message),
                LogLevel::Debug => println!("[DEBUG] {}: {}", component, message),
            }
        }

        if level >= LogLevel::Warning {
            if let Some(ref path) = self.error_log {
                if let Err(e) = Self::append_to_file(path, &entry) {
                    eprintln!("Failed to write to error log {}: {}", path, e);
                }
            }
        }
    }

    fn status(&self, line: &str) {
        if LogLevel::Info >= self.min_level {
            println!("{}", line);
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

/// One error-log line: `<timestamp> - <LEVEL> - <COMPONENT>: <message>`.
pub fn format_entry(timestamp: &str, level: LogLevel, component: Component, message: &str) -> String {
    format!("{} - {} - {}: {}", timestamp, level, component, message)
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger
pub fn init_logger(min_level: LogLevel, error_log: Option<&str>) {
    Logger::init(min_level, error_log.map(String::from));
}

fn emit(level: LogLevel, component: Component, message: &str) {
    if let Some(logger) = LOGGER
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        logger.log(level, component, message);
    }
}

pub fn info(component: Component, message: &str) {
    emit(LogLevel::Info, component, message);
}

pub fn warn(component: Component, message: &str) {
    emit(LogLevel::Warning, component, message);
}

pub fn error(component: Component, message: &str) {
    emit(LogLevel::Error, component, message);
}

pub fn debug(component: Component, message: &str) {
    emit(LogLevel::Debug, component, message);
}

/// `[TAG] message`, the shape of the per-cycle console status lines.
pub fn status_line(tag: &str, message: &str) -> String {
    format!("[{}] {}", tag, message)
}

/// Prints a pre-formatted status line at Info; never reaches the error log.
pub fn status(line: &str) {
    if let Some(logger) = LOGGER
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        logger.status(line);
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a failed cycle: rejections as warnings, faults as errors.
pub fn log_cycle_failure(err: &CycleError) {
    let failure_type = classify_cycle_failure(err);
    let component = failure_component(err);
    let message = format!("Cycle failed [{}]: {}", failure_type, err);

    match failure_type {
        FailureType::Expected => warn(component, &message),
        FailureType::Unexpected => error(component, &message),
    }
}
