//! Event log sources
//!
//! A [`LogSource`] turns one platform log into a lazy, finite sequence of
//! normalized records. Two implementations exist behind the same trait:
//! the legacy sequential/seekable API and the modern subscription API.
//! [`EventLogPlatform`] picks one per log based on configuration and on
//! whether the modern API is available on this host.

mod classic;
mod modern;
pub mod record;

pub use classic::ClassicLogSource;
pub use modern::{bookmark_xml, ModernLogSource, BATCH_SIZE};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use evlwatch_common::{
    ClassicEventLogApi, EventRecord, LogRegistry, MessageLibraryLoader, ModernEventLogApi, PlatformResult,
};

/// Seek target meaning "skip everything currently in the log"
pub const SEEK_END: u64 = u64::MAX;

/// Capability set shared by both API variants.
///
/// The sequence produced after a [`LogSource::seek`] is finite and cannot be
/// restarted without another seek. Records are returned as owned copies.
pub trait LogSource: Send {
    /// Log name
    fn name(&self) -> &str;

    /// Position the source so the next read returns record `pos` or the
    /// first record after it
    fn seek(&mut self, pos: u64);

    /// Next record, or `None` when nothing more is available right now
    fn read_next(&mut self) -> Option<EventRecord>;

    /// Id of the newest record, 0 for an empty log
    fn last_id(&mut self) -> u64;

    /// False once the source hit an unrecoverable error
    fn is_valid(&self) -> bool;
}

/// Which platform API to read logs with
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiVariant {
    #[default]
    Classic,
    Modern,
}

/// Bundle of platform collaborators the engine works against
#[derive(Clone)]
pub struct EventLogPlatform {
    registry: Arc<dyn LogRegistry>,
    classic: Arc<dyn ClassicEventLogApi>,
    modern: Option<Arc<dyn ModernEventLogApi>>,
    loader: Arc<dyn MessageLibraryLoader>,
}

impl EventLogPlatform {
    /// Create a platform with the legacy API only
    pub fn new(
        registry: Arc<dyn LogRegistry>,
        classic: Arc<dyn ClassicEventLogApi>,
        loader: Arc<dyn MessageLibraryLoader>,
    ) -> Self {
        Self {
            registry,
            classic,
            modern: None,
            loader,
        }
    }

    /// Add the modern API
    pub fn with_modern(mut self, modern: Arc<dyn ModernEventLogApi>) -> Self {
        self.modern = Some(modern);
        self
    }

    pub fn registry(&self) -> &Arc<dyn LogRegistry> {
        &self.registry
    }

    pub fn loader(&self) -> &Arc<dyn MessageLibraryLoader> {
        &self.loader
    }

    /// The variant actually used for a request: modern only if it loads here
    pub fn effective_variant(&self, requested: ApiVariant) -> ApiVariant {
        match (requested, &self.modern) {
            (ApiVariant::Modern, Some(modern)) if modern.is_available() => ApiVariant::Modern,
            _ => ApiVariant::Classic,
        }
    }

    /// Open `name` with the effective variant for `requested`
    pub fn open(&self, name: &str, requested: ApiVariant) -> PlatformResult<Box<dyn LogSource>> {
        match (self.effective_variant(requested), &self.modern) {
            (ApiVariant::Modern, Some(modern)) => Ok(Box::new(ModernLogSource::open(modern.clone(), name)?)),
            _ => Ok(Box::new(ClassicLogSource::open(self.classic.clone(), name)?)),
        }
    }
}

#[cfg(test)]
mod tests;
