//! Level-gated application logger
//!
//! A thin façade over [`LogSink`]: messages below the configured level are
//! dropped, the rest are formatted as a small JSON document and written under
//! a subject named after their level (`DEBUG`, `INFO`, ...).

use std::error::Error as StdError;
use std::fmt;
use std::panic::Location;
use std::path::PathBuf;
use std::str::FromStr;

use serde_json::json;

use crate::config::Config;
use crate::error::{ConfigError, LogError};
use crate::sink::{LogSink, DEFAULT_QUEUE_CAPACITY};

/// Message severity, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    /// All levels in ascending order
    pub const ALL: [Level; 5] = [
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Fatal,
    ];

    /// Get the name of this level, also used as its subject
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::InvalidLevel(s.to_string()))
    }
}

/// Validated logger settings, ready to be initialized
#[derive(Debug, Clone)]
pub struct LoggerBuilder {
    service: String,
    level: Level,
    path: Option<PathBuf>,
    development: bool,
    queue_capacity: usize,
    host_address: Option<String>,
}

impl LoggerBuilder {
    /// Validate the service name and level
    pub fn new(service: &str, level: &str) -> Result<Self, ConfigError> {
        if service.trim().is_empty() {
            return Err(ConfigError::EmptyService);
        }

        Ok(Self {
            service: service.to_string(),
            level: level.parse()?,
            path: None,
            development: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            host_address: None,
        })
    }

    /// Build from a loaded [`Config`]
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let builder = Self::new(&config.service, &config.level)?
            .development(config.development)
            .queue_capacity(config.queue_capacity)?;

        match &config.path {
            Some(path) => builder.path(path.clone()),
            None => Ok(builder),
        }
    }

    /// Set the log root; must not be empty
    pub fn path(mut self, path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath);
        }
        self.path = Some(path);
        Ok(self)
    }

    /// Use ./applog instead of /applog when no explicit path is set
    pub fn development(mut self, development: bool) -> Self {
        self.development = development;
        self
    }

    /// Bound the arbiter request queue
    pub fn queue_capacity(mut self, capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        self.queue_capacity = capacity;
        Ok(self)
    }

    /// Use a fixed host address in file names
    pub fn host_address(mut self, address: impl Into<String>) -> Self {
        self.host_address = Some(address.into());
        self
    }

    /// Directory the sink will be rooted at: `<path>/<service>`
    pub fn root_path(&self) -> PathBuf {
        let config = Config {
            path: self.path.clone(),
            development: self.development,
            ..Config::default()
        };
        config.root_path().join(&self.service)
    }

    /// Start the log engine
    pub fn initialize(self) -> Result<Logger, LogError> {
        let mut sink =
            LogSink::builder(self.root_path()).queue_capacity(self.queue_capacity)?;
        if let Some(address) = self.host_address {
            sink = sink.host_address(address);
        }

        Ok(Logger {
            sink: sink.start()?,
            service: self.service,
            level: self.level,
        })
    }
}

/// Application logger
#[derive(Debug, Clone)]
pub struct Logger {
    sink: LogSink,
    service: String,
    level: Level,
}

impl Logger {
    /// Name of the service
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Minimum level that gets written
    pub fn level(&self) -> Level {
        self.level
    }

    /// Check if messages at `level` are written
    pub fn enabled(&self, level: Level) -> bool {
        level >= self.level
    }

    /// Underlying sink, for writing arbitrary subjects
    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    #[track_caller]
    pub fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    #[track_caller]
    pub fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    #[track_caller]
    pub fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    #[track_caller]
    pub fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }

    #[track_caller]
    pub fn fatal(&self, message: &str) {
        self.log(Level::Fatal, message);
    }

    /// Write `message` at `level` if enabled
    #[track_caller]
    pub fn log(&self, level: Level, message: &str) {
        if !self.enabled(level) {
            return;
        }
        let location = Location::caller();
        self.sink.log_subject_at(
            level.as_str(),
            format_message(message, level, location),
            None,
            location,
        );
    }

    /// Write an error message together with its cause
    ///
    /// Goes to the `err_ERROR` stream with the error description and call site.
    #[track_caller]
    pub fn error_with(&self, message: &str, err: &dyn StdError) {
        if !self.enabled(Level::Error) {
            return;
        }
        let location = Location::caller();
        self.sink.log_subject_at(
            Level::Error.as_str(),
            format_message(message, Level::Error, location),
            Some(err),
            location,
        );
    }

    /// Stop the log engine
    pub fn shutdown(&self) {
        self.sink.shutdown();
    }
}

fn format_message(message: &str, level: Level, location: &Location<'_>) -> String {
    json!({
        "message": message,
        "level": level.as_str(),
        "source": location.file(),
        "line": location.line().to_string(),
        "trace": "",
    })
    .to_string()
}
