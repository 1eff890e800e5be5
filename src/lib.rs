//! subjectlog - per-subject JSON-line log persistence
//!
//! Records are appended to one file per subject and hour. See [`sink::LogSink`]
//! for the engine and [`logger::Logger`] for the level-gated façade.

pub mod config;
pub mod error;
pub mod logger;
pub mod logging;
pub mod sink;

pub use error::{ConfigError, LogError, NormalizeError};
pub use logger::{Level, Logger, LoggerBuilder};
pub use sink::{FieldValue, LogSink, Payload};
