//! Per-subject JSON-line log sink
//!
//! [`LogSink`] writes one JSON object per line into
//! `<root>/<subject>/<subject>[-<host>]-<YYYYMMDDHH>.log`. Writing never fails
//! from the caller's point of view: anything that goes wrong is reported to the
//! fallback console sink (`tracing`) and the record is dropped.

mod arbiter;
mod naming;
mod normalize;

pub use arbiter::{FileHandle, ARBITER_THREAD_NAME};
pub use naming::{
    log_file_path, resolve_host_address, rotation_key, Clock, ManualClock, SystemClock,
    ERROR_SUBJECT_PREFIX, LOG_FILE_SUFFIX,
};
pub use normalize::{normalize, FieldValue, Fields, Payload, BAD_KEY_VALUE};

use std::error::Error as StdError;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{ConfigError, LogError, NormalizeError};
use arbiter::{Arbiter, HandleCache};

/// Record key of the write timestamp
pub const TIMESTAMP_FIELD: &str = "data_hora";

/// Format of the write timestamp (UTC)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Record key of the error description on error writes
pub const ERROR_FIELD: &str = "error";

/// Record key of the call site on error writes
pub const CALLER_FIELD: &str = "caller";

/// Default bound of the arbiter request queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Settings for starting a [`LogSink`]
pub struct LogSinkBuilder {
    root: PathBuf,
    host_address: Option<String>,
    clock: Arc<dyn Clock>,
    queue_capacity: usize,
}

impl LogSinkBuilder {
    /// Use a fixed host address instead of scanning the network interfaces
    ///
    /// An empty address leaves it out of file names.
    pub fn host_address(mut self, address: impl Into<String>) -> Self {
        self.host_address = Some(address.into());
        self
    }

    /// Use a custom time source
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
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

    /// Resolve the host address and start the arbiter
    pub fn start(self) -> Result<LogSink, LogError> {
        let host_address = self.host_address.unwrap_or_else(resolve_host_address);
        let cache = Arc::new(HandleCache::default());
        let arbiter = Arbiter::spawn(Arc::clone(&cache), self.queue_capacity)?;

        info!(
            root = %self.root.display(),
            host = %host_address,
            "Log sink started"
        );

        Ok(LogSink {
            inner: Arc::new(Inner {
                root: self.root,
                host_address,
                clock: self.clock,
                cache,
                arbiter,
            }),
        })
    }
}

struct Inner {
    root: PathBuf,
    host_address: String,
    clock: Arc<dyn Clock>,
    cache: Arc<HandleCache>,
    arbiter: Arbiter,
}

/// Handle to a running log engine
///
/// Clones share the same engine. The engine stops on [`LogSink::shutdown`] or
/// when the last clone is dropped.
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<Inner>,
}

impl LogSink {
    /// Settings for a sink rooted at `root`
    pub fn builder(root: impl Into<PathBuf>) -> LogSinkBuilder {
        LogSinkBuilder {
            root: root.into(),
            host_address: None,
            clock: Arc::new(SystemClock),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Start a sink rooted at `root` with default settings
    pub fn start(root: impl Into<PathBuf>) -> Result<Self, LogError> {
        Self::builder(root).start()
    }

    /// Root directory of every subject
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Host address used in file names (may be empty)
    pub fn host_address(&self) -> &str {
        &self.inner.host_address
    }

    /// Path a write to `subject` would go to right now
    pub fn file_path(&self, subject: &str) -> PathBuf {
        log_file_path(
            &self.inner.root,
            subject,
            &self.inner.host_address,
            self.inner.clock.now(),
        )
    }

    /// Path of the file currently open for `subject`, if any
    pub fn current_path(&self, subject: &str) -> Option<PathBuf> {
        self.inner.cache.path_of(subject)
    }

    /// Check if the engine still accepts writes that need a new file
    pub fn is_running(&self) -> bool {
        self.inner.arbiter.is_running()
    }

    /// Write one record for `subject`
    ///
    /// With `err` set, the record goes to the `err_<subject>` stream and also
    /// carries the error description and the caller's location. An empty
    /// subject is ignored.
    #[track_caller]
    pub fn log_subject(
        &self,
        subject: &str,
        payload: impl Into<Payload>,
        err: Option<&dyn StdError>,
    ) {
        self.log_subject_at(subject, payload, err, Location::caller());
    }

    /// Like [`LogSink::log_subject`], with an explicit call site
    pub fn log_subject_at(
        &self,
        subject: &str,
        payload: impl Into<Payload>,
        err: Option<&dyn StdError>,
        call_site: &Location<'_>,
    ) {
        self.log(subject, Ok(payload.into()), err, call_site);
    }

    /// Write one record built from a dynamic JSON value
    ///
    /// The value is classified with [`Payload::classify`]; shapes that cannot
    /// be classified are reported like any other normalization failure.
    #[track_caller]
    pub fn log_value(&self, subject: &str, value: Value, err: Option<&dyn StdError>) {
        self.log(subject, Payload::classify(value), err, Location::caller());
    }

    /// Stop the arbiter and close every open file
    pub fn shutdown(&self) {
        self.inner.arbiter.shutdown();
    }

    fn log(
        &self,
        subject: &str,
        payload: Result<Payload, NormalizeError>,
        err: Option<&dyn StdError>,
        call_site: &Location<'_>,
    ) {
        if subject.is_empty() {
            return;
        }

        let subject = match err {
            Some(_) => format!("{}{}", ERROR_SUBJECT_PREFIX, subject),
            None => subject.to_string(),
        };

        if let Err(e) = self.write_record(&subject, payload, err, call_site) {
            warn!(subject = %subject, error = %e, "LogSink.log_subject failed");
        }
    }

    fn write_record(
        &self,
        subject: &str,
        payload: Result<Payload, NormalizeError>,
        err: Option<&dyn StdError>,
        call_site: &Location<'_>,
    ) -> Result<(), LogError> {
        // Normalize first so a bad payload never creates a file
        let mut fields = normalize(&payload?)?;

        let now = self.inner.clock.now();
        let handle = self.handle_for(subject, now)?;

        if let Some(err) = err {
            fields.insert(
                CALLER_FIELD.to_string(),
                Value::String(format!("{}:{}", call_site.file(), call_site.line())),
            );
            fields.insert(ERROR_FIELD.to_string(), Value::String(err.to_string()));
        }
        fields.insert(
            TIMESTAMP_FIELD.to_string(),
            Value::String(now.format(TIMESTAMP_FORMAT).to_string()),
        );

        let record = serde_json::to_vec(&fields).map_err(LogError::Encode)?;
        handle.write_line(&record)
    }

    /// Live handle for `subject`, going through the arbiter only when stale
    fn handle_for(
        &self,
        subject: &str,
        now: DateTime<Utc>,
    ) -> Result<Arc<FileHandle>, LogError> {
        let path = log_file_path(&self.inner.root, subject, &self.inner.host_address, now);

        match self.inner.cache.get(subject) {
            Some(handle) if handle.path() == path => Ok(handle),
            _ => self.inner.arbiter.resolve(subject, path),
        }
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("root", &self.inner.root)
            .field("host_address", &self.inner.host_address)
            .field("open_files", &self.inner.cache.len())
            .finish()
    }
}
