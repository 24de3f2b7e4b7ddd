//! evlwatch-agent library
//!
//! Event log watch engine: tracks a read position per log, scans new records
//! for severity and dumps them as text blocks when something at or above the
//! configured threshold showed up.

pub mod config;
pub mod engine;
pub mod observability;
pub mod replay;
pub mod resolver;
pub mod source;
pub mod state_file;
pub mod watch;

pub use config::{ConfigError, WatchConfig, WatchSnapshot};
pub use engine::EventLogWatcher;
pub use replay::ReplayPlatform;
pub use source::{ApiVariant, EventLogPlatform, LogSource};
pub use watch::{SendMode, SourceState, WatchEntry, WatchList};
