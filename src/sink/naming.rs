//! Log file naming and hourly rotation keys
//!
//! A subject's records go to `<root>/<subject>/<subject>[-<host>]-<YYYYMMDDHH>.log`.
//! The hour bucket is part of the name, so rotation happens by itself the first
//! time a write computes a name that differs from the open file's.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

/// Suffix of every log file
pub const LOG_FILE_SUFFIX: &str = ".log";

/// Prefix given to the subject of error-carrying writes
pub const ERROR_SUBJECT_PREFIX: &str = "err_";

/// Hour-granularity bucket format (UTC)
const ROTATION_KEY_FORMAT: &str = "%Y%m%d%H";

/// Source of wall-clock time for rotation keys and record timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Move the clock to `now`
    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut current) = self.now.write() {
            *current = now;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.read().map(|n| *n).unwrap_or_else(|_| Utc::now())
    }
}

/// Format the rotation bucket for `now`
pub fn rotation_key(now: DateTime<Utc>) -> String {
    now.format(ROTATION_KEY_FORMAT).to_string()
}

/// Build the file path for a subject at a given instant
///
/// An empty `host` drops both the address and its separator.
pub fn log_file_path(root: &Path, subject: &str, host: &str, now: DateTime<Utc>) -> PathBuf {
    let mut file_name = String::with_capacity(subject.len() + host.len() + 16);
    file_name.push_str(subject);
    if !host.is_empty() {
        file_name.push('-');
        file_name.push_str(host);
    }
    file_name.push('-');
    file_name.push_str(&rotation_key(now));
    file_name.push_str(LOG_FILE_SUFFIX);

    root.join(subject).join(file_name)
}

/// Find the first non-loopback IPv4 address of this host
///
/// Returns an empty string when none exists or enumeration fails.
pub fn resolve_host_address() -> String {
    let mut interfaces = match netif::up() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to enumerate network interfaces");
            return String::new();
        }
    };

    interfaces
        .find_map(|iface| match iface.address().to_owned() {
            IpAddr::V4(v4) if !v4.is_loopback() => Some(v4.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}
