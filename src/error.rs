//! Error types
//!
//! Configuration errors are returned to the caller. Everything else belongs to
//! the write path and is only ever reported through the fallback console sink.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while configuring a logger or sink
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("service name is required")]
    EmptyService,

    #[error("level is invalid: {0:?}")]
    InvalidLevel(String),

    #[error("path cannot be empty")]
    EmptyPath,

    #[error("queue capacity must be greater than zero")]
    ZeroCapacity,
}

/// Errors raised while turning a payload into record fields
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("invalid log content type, expected map, JSON-encoded string, or keyed array")]
    UnsupportedShape,

    #[error("invalid JSON log content: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised on the write path
#[derive(Debug, Error)]
pub enum LogError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error("failed to create log directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to open log file {path:?}: {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write log file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode log record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("log engine is not running")]
    EngineStopped,

    #[error("failed to spawn log arbiter thread: {0}")]
    Spawn(#[source] io::Error),
}
