//! Platform abstraction traits for event log access
//!
//! These traits describe the boundary to the operating system: the registry
//! that knows which logs exist, the legacy sequential/seekable read API, the
//! modern subscription/bookmark API and the loader for message libraries.
//! Everything above this boundary is platform-neutral.

use thiserror::Error;

use crate::events::EventRecord;

/// Errors that can occur during platform event log operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Log not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Platform not supported: {0}")]
    NotSupported(String),

    #[error("Buffer too small, {required} bytes required")]
    InsufficientBuffer { required: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Registry view of the installed event logs
pub trait LogRegistry: Send + Sync {
    /// Names of all event logs the platform currently knows about
    fn event_logs(&self) -> PlatformResult<Vec<String>>;

    /// `;`-separated message library paths registered for `source` in `log`
    fn message_files(&self, log: &str, source: &str) -> Option<String>;
}

/// How a legacy read positions itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Start at the given record number
    Seek,
    /// Continue after the previously returned record
    Sequential,
}

/// Legacy sequential/seekable event log API
pub trait ClassicEventLogApi: Send + Sync {
    /// Open a log by name
    fn open(&self, name: &str) -> PlatformResult<Box<dyn ClassicLogHandle>>;
}

/// An open legacy log
pub trait ClassicLogHandle: Send {
    /// Record number of the oldest retained record
    fn oldest_record(&self) -> PlatformResult<u64>;

    /// Number of retained records
    fn record_count(&self) -> PlatformResult<u64>;

    /// Read forward into `buf`, returning the number of bytes written.
    ///
    /// `offset` is only meaningful for [`ReadMode::Seek`]. `Ok(0)` means the
    /// end of the log was reached. A buffer that cannot hold the next record
    /// yields [`PlatformError::InsufficientBuffer`].
    fn read(&mut self, mode: ReadMode, offset: u64, buf: &mut [u8]) -> PlatformResult<usize>;
}

/// Modern subscription/bookmark event log API
pub trait ModernEventLogApi: Send + Sync {
    /// Whether the API can be loaded on this host
    fn is_available(&self) -> bool;

    /// Id of the first record with id `>= pos`, via a single forward query
    fn first_record_from(&self, channel: &str, pos: u64) -> PlatformResult<Option<u64>>;

    /// Id of the newest record, via a single reverse query
    fn last_record(&self, channel: &str) -> PlatformResult<Option<u64>>;

    /// Open a forward subscription starting right after the bookmarked record,
    /// or at the oldest record when there is no bookmark
    fn subscribe_after(&self, channel: &str, bookmark_xml: Option<&str>) -> PlatformResult<Box<dyn Subscription>>;
}

/// Live subscription signalled through a waitable event
pub trait Subscription: Send {
    /// Zero-timeout check of the readiness signal
    fn poll_ready(&self) -> bool;

    /// Reset the readiness signal
    fn reset_signal(&mut self);

    /// Pull up to `max` pending, already rendered records
    fn next_batch(&mut self, max: usize) -> PlatformResult<Vec<EventRecord>>;
}

/// Loads message libraries by path
pub trait MessageLibraryLoader: Send + Sync {
    fn load(&self, path: &str) -> PlatformResult<Box<dyn MessageLibrary>>;
}

/// A loaded message library
pub trait MessageLibrary: Send {
    /// Format the message for a full 32-bit event id with insertion strings
    fn format(&self, event_id: u32, inserts: &[String]) -> Option<String>;
}
