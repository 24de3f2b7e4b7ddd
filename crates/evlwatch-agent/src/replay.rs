//! In-memory event log platform
//!
//! [`ReplayPlatform`] implements every platform boundary trait over logs kept
//! in memory: the registry, the legacy page-based read API (records are
//! encoded in the classic binary layout), the modern subscription API and
//! message libraries with `%1`-style templates. Logs can be grown, cleared
//! and made to exhibit the legacy seek defect while a watcher runs.
//!
//! Fixtures are JSON documents deserialized into [`ReplayFixture`].

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use evlwatch_common::{
    ClassicEventLogApi, ClassicLogHandle, EventRecord, LogRegistry, MessageLibrary, MessageLibraryLoader,
    MessagePayload, ModernEventLogApi, NativeLevel, PlatformError, PlatformResult, ReadMode, Subscription,
};

use crate::source::record::encode_record;
use crate::source::EventLogPlatform;

/// Computer name written into encoded records
const COMPUTER_NAME: &str = "REPLAY";

// ============================================================================
// Fixtures
// ============================================================================

/// A complete replay scenario
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayFixture {
    #[serde(default)]
    pub modern_available: bool,
    #[serde(default)]
    pub logs: Vec<FixtureLog>,
    #[serde(default)]
    pub message_files: Vec<FixtureMessageFiles>,
    #[serde(default)]
    pub libraries: Vec<FixtureLibrary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureLog {
    pub name: String,
    /// Id of the first record
    #[serde(default = "default_first_id")]
    pub first_id: u64,
    /// Listed by the registry; unlisted logs are reachable through the
    /// modern API only
    #[serde(default = "default_true")]
    pub registered: bool,
    #[serde(default)]
    pub seek_defect: bool,
    /// Opening the log is refused
    #[serde(default)]
    pub access_denied: bool,
    #[serde(default)]
    pub records: Vec<FixtureRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureRecord {
    pub event_id: u16,
    #[serde(default)]
    pub qualifier: u16,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub source: String,
    pub level: NativeLevel,
    #[serde(default)]
    pub inserts: Vec<String>,
    #[serde(default)]
    pub sid: Option<String>,
}

/// `;`-separated library paths for one log/source pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureMessageFiles {
    pub log: String,
    pub source: String,
    pub paths: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureLibrary {
    pub path: String,
    /// Templates keyed by full 32-bit event id
    pub messages: HashMap<u32, String>,
}

fn default_first_id() -> u64 {
    1
}

fn default_true() -> bool {
    true
}

impl FixtureRecord {
    fn to_record(&self) -> EventRecord {
        let mut record = EventRecord::new(0, self.event_id, self.source.clone(), self.level);
        record.qualifier = self.qualifier;
        if let Some(timestamp) = self.timestamp {
            record.timestamp = timestamp;
        }
        record.payload = MessagePayload::Inserts(self.inserts.clone());
        record.security_id = self.sid.clone();
        record
    }
}

// ============================================================================
// Shared state
// ============================================================================

struct ReplayLog {
    name: String,
    records: VecDeque<EventRecord>,
    next_id: u64,
    registered: bool,
    seek_defect: bool,
    access_denied: bool,
    read_failure: bool,
}

impl ReplayLog {
    fn new(name: &str, first_id: u64, registered: bool) -> Self {
        Self {
            name: name.to_string(),
            records: VecDeque::new(),
            next_id: first_id,
            registered,
            seek_defect: false,
            access_denied: false,
            read_failure: false,
        }
    }

    fn from_id(&self, id: u64) -> impl Iterator<Item = &EventRecord> {
        self.records.iter().skip_while(move |r| r.record_id < id)
    }
}

#[derive(Default)]
struct ReplayState {
    logs: Vec<ReplayLog>,
    message_files: HashMap<(String, String), String>,
    libraries: HashMap<String, HashMap<u32, String>>,
    modern_available: bool,
    library_loads: usize,
}

impl ReplayState {
    fn log(&self, name: &str) -> PlatformResult<&ReplayLog> {
        self.logs
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| PlatformError::NotFound(name.to_string()))
    }

    /// Log a caller may open, honouring the access flag
    fn accessible_log(&self, name: &str) -> PlatformResult<&ReplayLog> {
        let log = self.log(name)?;
        if log.access_denied {
            return Err(PlatformError::PermissionDenied(log.name.clone()));
        }
        Ok(log)
    }

    /// Log reached through the modern API
    fn channel(&self, name: &str) -> PlatformResult<&ReplayLog> {
        if !self.modern_available {
            return Err(PlatformError::NotSupported(format!("modern API for {}", name)));
        }
        self.accessible_log(name)
    }

    fn log_mut(&mut self, name: &str) -> Option<&mut ReplayLog> {
        self.logs.iter_mut().find(|l| l.name.eq_ignore_ascii_case(name))
    }

    fn library_paths(&self, log: &str, source: &str) -> Option<&String> {
        self.message_files
            .get(&(log.to_lowercase(), source.to_lowercase()))
    }

    /// Text the modern API would render for `record`
    fn render(&self, log: &str, record: &EventRecord) -> String {
        let inserts = match &record.payload {
            MessagePayload::Rendered(text) => return text.clone(),
            MessagePayload::Inserts(inserts) => inserts,
        };
        self.library_paths(log, &record.source_name)
            .into_iter()
            .flat_map(|paths| paths.split(';'))
            .filter_map(|path| self.libraries.get(&path.trim().to_lowercase()))
            .find_map(|messages| messages.get(&record.full_event_id()))
            .map(|template| format_template(template, inserts))
            .unwrap_or_else(|| inserts.join(" "))
    }
}

/// Substitute `%1`..`%n` with insertion strings; unknown references stay
pub fn format_template(template: &str, inserts: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let start = i + 1;
        let mut end = start;
        while let Some((j, d)) = chars.peek().copied() {
            if !d.is_ascii_digit() {
                break;
            }
            end = j + 1;
            chars.next();
        }
        let insert = template[start..end]
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|n| inserts.get(n));
        match insert {
            Some(insert) => out.push_str(insert),
            None => out.push_str(&template[i..end]),
        }
    }
    out
}

// ============================================================================
// Platform
// ============================================================================

/// In-memory platform; clones share the same logs
#[derive(Clone, Default)]
pub struct ReplayPlatform {
    inner: Arc<RwLock<ReplayState>>,
}

impl ReplayPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: &ReplayFixture) -> Self {
        let platform = Self::new();
        platform.set_modern_available(fixture.modern_available);

        for log in &fixture.logs {
            {
                let mut state = platform.inner.write();
                let mut replay_log = ReplayLog::new(&log.name, log.first_id, log.registered);
                replay_log.seek_defect = log.seek_defect;
                replay_log.access_denied = log.access_denied;
                state.logs.push(replay_log);
            }
            for record in &log.records {
                platform.push(&log.name, record.to_record());
            }
        }
        for files in &fixture.message_files {
            platform.register_message_files(&files.log, &files.source, &files.paths);
        }
        for library in &fixture.libraries {
            platform
                .inner
                .write()
                .libraries
                .insert(library.path.to_lowercase(), library.messages.clone());
        }
        platform
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let fixture: ReplayFixture = serde_json::from_str(json)?;
        Ok(Self::from_fixture(&fixture))
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay fixture {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Failed to parse replay fixture {}", path.display()))
    }

    /// Wrap as the platform bundle the watcher consumes
    pub fn into_platform(self) -> EventLogPlatform {
        let shared = Arc::new(self);
        EventLogPlatform::new(shared.clone(), shared.clone(), shared.clone()).with_modern(shared)
    }

    /// Add a log listed by the registry
    pub fn add_log(&self, name: &str) {
        self.add(name, true);
    }

    /// Add a channel only the modern API can reach
    pub fn add_channel(&self, name: &str) {
        self.add(name, false);
    }

    fn add(&self, name: &str, registered: bool) {
        let mut state = self.inner.write();
        if state.log_mut(name).is_none() {
            state.logs.push(ReplayLog::new(name, 1, registered));
        }
    }

    /// Append a record, assigning the next id; unknown logs are created
    pub fn push(&self, log: &str, mut record: EventRecord) -> u64 {
        let mut state = self.inner.write();
        if state.log_mut(log).is_none() {
            state.logs.push(ReplayLog::new(log, 1, true));
        }
        let Some(target) = state.log_mut(log) else {
            return 0;
        };
        record.record_id = target.next_id;
        target.next_id += 1;
        target.records.push_back(record);
        target.next_id - 1
    }

    /// Append an event with insertion strings
    pub fn push_event(&self, log: &str, event_id: u16, source: &str, level: NativeLevel, inserts: &[&str]) -> u64 {
        let mut record = EventRecord::new(0, event_id, source, level);
        record.payload = MessagePayload::Inserts(inserts.iter().map(|s| s.to_string()).collect());
        self.push(log, record)
    }

    /// Drop every record and restart numbering at 1
    pub fn clear(&self, log: &str) {
        if let Some(target) = self.inner.write().log_mut(log) {
            target.records.clear();
            target.next_id = 1;
        }
    }

    /// Drop the oldest records so at most `keep` remain
    pub fn retain_newest(&self, log: &str, keep: usize) {
        if let Some(target) = self.inner.write().log_mut(log) {
            while target.records.len() > keep {
                target.records.pop_front();
            }
        }
    }

    /// Make seek reads on `log` fail the way the defective legacy API does
    pub fn set_seek_defect(&self, log: &str, defect: bool) {
        if let Some(target) = self.inner.write().log_mut(log) {
            target.seek_defect = defect;
        }
    }

    /// Refuse opening `log` through either API
    pub fn set_access_denied(&self, log: &str, denied: bool) {
        if let Some(target) = self.inner.write().log_mut(log) {
            target.access_denied = denied;
        }
    }

    /// Make every legacy read on `log` fail with an I/O error
    pub fn set_read_failure(&self, log: &str, failing: bool) {
        if let Some(target) = self.inner.write().log_mut(log) {
            target.read_failure = failing;
        }
    }

    pub fn set_modern_available(&self, available: bool) {
        self.inner.write().modern_available = available;
    }

    pub fn register_message_files(&self, log: &str, source: &str, paths: &str) {
        self.inner
            .write()
            .message_files
            .insert((log.to_lowercase(), source.to_lowercase()), paths.to_string());
    }

    pub fn add_library(&self, path: &str, messages: &[(u32, &str)]) {
        let messages = messages.iter().map(|(id, text)| (*id, text.to_string())).collect();
        self.inner.write().libraries.insert(path.to_lowercase(), messages);
    }

    /// Number of library loads served so far
    pub fn library_loads(&self) -> usize {
        self.inner.read().library_loads
    }
}

impl LogRegistry for ReplayPlatform {
    fn event_logs(&self) -> PlatformResult<Vec<String>> {
        Ok(self
            .inner
            .read()
            .logs
            .iter()
            .filter(|l| l.registered)
            .map(|l| l.name.clone())
            .collect())
    }

    fn message_files(&self, log: &str, source: &str) -> Option<String> {
        self.inner.read().library_paths(log, source).cloned()
    }
}

// ============================================================================
// Legacy API
// ============================================================================

impl ClassicEventLogApi for ReplayPlatform {
    fn open(&self, name: &str) -> PlatformResult<Box<dyn ClassicLogHandle>> {
        let canonical = self.inner.read().accessible_log(name)?.name.clone();
        Ok(Box::new(ReplayClassicHandle {
            inner: self.inner.clone(),
            name: canonical,
            next: 0,
        }))
    }
}

struct ReplayClassicHandle {
    inner: Arc<RwLock<ReplayState>>,
    name: String,
    /// Id the next sequential read starts at
    next: u64,
}

impl ClassicLogHandle for ReplayClassicHandle {
    fn oldest_record(&self) -> PlatformResult<u64> {
        let state = self.inner.read();
        let log = state.log(&self.name)?;
        Ok(log.records.front().map_or(log.next_id, |r| r.record_id))
    }

    fn record_count(&self) -> PlatformResult<u64> {
        Ok(self.inner.read().log(&self.name)?.records.len() as u64)
    }

    fn read(&mut self, mode: ReadMode, offset: u64, buf: &mut [u8]) -> PlatformResult<usize> {
        let state = self.inner.read();
        let log = state.log(&self.name)?;
        if log.read_failure {
            return Err(PlatformError::Io(format!("read on {}", self.name)));
        }

        let start = match mode {
            ReadMode::Seek if log.seek_defect => {
                return Err(PlatformError::InvalidParameter(format!("seek read on {}", self.name)));
            }
            ReadMode::Seek => offset,
            ReadMode::Sequential => self.next,
        };

        let mut written = 0;
        for record in log.from_id(start) {
            let bytes = encode_record(record, COMPUTER_NAME);
            if written + bytes.len() > buf.len() {
                if written == 0 {
                    return Err(PlatformError::InsufficientBuffer { required: bytes.len() });
                }
                break;
            }
            buf[written..written + bytes.len()].copy_from_slice(&bytes);
            written += bytes.len();
            self.next = record.record_id + 1;
        }
        Ok(written)
    }
}

// ============================================================================
// Modern API
// ============================================================================

/// Record id named by a bookmark descriptor
fn bookmark_record_id(xml: &str) -> Option<u64> {
    let start = xml.find("RecordId='")? + "RecordId='".len();
    let len = xml[start..].find('\'')?;
    xml[start..start + len].parse().ok()
}

impl ModernEventLogApi for ReplayPlatform {
    fn is_available(&self) -> bool {
        self.inner.read().modern_available
    }

    fn first_record_from(&self, channel: &str, pos: u64) -> PlatformResult<Option<u64>> {
        Ok(self.inner.read().channel(channel)?.from_id(pos).next().map(|r| r.record_id))
    }

    fn last_record(&self, channel: &str) -> PlatformResult<Option<u64>> {
        Ok(self.inner.read().channel(channel)?.records.back().map(|r| r.record_id))
    }

    fn subscribe_after(&self, channel: &str, bookmark_xml: Option<&str>) -> PlatformResult<Box<dyn Subscription>> {
        let canonical = self.inner.read().channel(channel)?.name.clone();
        let next = match bookmark_xml {
            Some(xml) => bookmark_record_id(xml)
                .ok_or_else(|| PlatformError::InvalidParameter(format!("bookmark {}", xml)))?
                .saturating_add(1),
            None => 0,
        };
        Ok(Box::new(ReplaySubscription {
            inner: self.inner.clone(),
            channel: canonical,
            next,
            signalled: true,
        }))
    }
}

struct ReplaySubscription {
    inner: Arc<RwLock<ReplayState>>,
    channel: String,
    next: u64,
    signalled: bool,
}

impl Subscription for ReplaySubscription {
    fn poll_ready(&self) -> bool {
        if self.signalled {
            return true;
        }
        let state = self.inner.read();
        let pending = match state.log(&self.channel) {
            Ok(log) => log.from_id(self.next).next().is_some(),
            Err(_) => false,
        };
        pending
    }

    fn reset_signal(&mut self) {
        self.signalled = false;
    }

    fn next_batch(&mut self, max: usize) -> PlatformResult<Vec<EventRecord>> {
        let state = self.inner.read();
        let log = state.log(&self.channel)?;
        let batch: Vec<EventRecord> = log
            .from_id(self.next)
            .take(max)
            .map(|record| {
                let mut rendered = record.clone();
                rendered.payload = MessagePayload::Rendered(state.render(&self.channel, record));
                rendered
            })
            .collect();
        if let Some(last) = batch.last() {
            self.next = last.record_id + 1;
        }
        Ok(batch)
    }
}

// ============================================================================
// Message libraries
// ============================================================================

struct ReplayLibrary {
    messages: HashMap<u32, String>,
}

impl MessageLibrary for ReplayLibrary {
    fn format(&self, event_id: u32, inserts: &[String]) -> Option<String> {
        self.messages
            .get(&event_id)
            .map(|template| format_template(template, inserts))
    }
}

impl MessageLibraryLoader for ReplayPlatform {
    fn load(&self, path: &str) -> PlatformResult<Box<dyn MessageLibrary>> {
        let mut state = self.inner.write();
        state.library_loads += 1;
        let messages = state
            .libraries
            .get(&path.to_lowercase())
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(path.to_string()))?;
        Ok(Box::new(ReplayLibrary { messages }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_template() {
        let inserts = vec!["a".to_string(), "b".to_string()];
        assert_eq!(format_template("%1 and %2", &inserts), "a and b");
        assert_eq!(format_template("%3 %0 100%", &inserts), "%3 %0 100%");
        assert_eq!(format_template("x%1y", &inserts), "xay");
        assert_eq!(format_template("%12", &inserts), "%12");
    }

    #[test]
    fn test_bookmark_record_id() {
        let xml = crate::source::bookmark_xml("Application", 42);
        assert_eq!(bookmark_record_id(&xml), Some(42));
        assert_eq!(bookmark_record_id("<BookmarkList/>"), None);
    }

    #[test]
    fn test_registry_lists_registered_logs() {
        let platform = ReplayPlatform::new();
        platform.add_log("Application");
        platform.add_channel("Microsoft-Windows-Test/Operational");
        platform.add_log("application");
        assert_eq!(platform.event_logs().unwrap(), vec!["Application"]);
    }

    #[test]
    fn test_push_assigns_ids() {
        let platform = ReplayPlatform::new();
        assert_eq!(platform.push_event("System", 1, "s", NativeLevel::Error, &[]), 1);
        assert_eq!(platform.push_event("System", 2, "s", NativeLevel::Error, &[]), 2);
        platform.clear("System");
        assert_eq!(platform.push_event("System", 3, "s", NativeLevel::Error, &[]), 1);
    }

    #[test]
    fn test_classic_read_pages() {
        let platform = ReplayPlatform::new();
        for i in 0..3 {
            platform.push_event("App", 100 + i, "src", NativeLevel::Warning, &["x"]);
        }
        let mut handle = ClassicEventLogApi::open(&platform, "app").unwrap();
        assert_eq!(handle.oldest_record().unwrap(), 1);
        assert_eq!(handle.record_count().unwrap(), 3);

        let mut tiny = [0u8; 8];
        assert!(matches!(
            handle.read(ReadMode::Seek, 2, &mut tiny),
            Err(PlatformError::InsufficientBuffer { .. })
        ));

        let mut buf = vec![0u8; 4096];
        let n = handle.read(ReadMode::Seek, 2, &mut buf).unwrap();
        let ids: Vec<u64> = crate::source::record::RecordCursor::new(&buf[..n])
            .map(|r| r.unwrap().record_id)
            .collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(handle.read(ReadMode::Sequential, 0, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_seek_defect() {
        let platform = ReplayPlatform::new();
        platform.push_event("App", 1, "src", NativeLevel::Warning, &[]);
        platform.set_seek_defect("App", true);
        let mut handle = ClassicEventLogApi::open(&platform, "App").unwrap();
        let mut buf = vec![0u8; 4096];
        assert!(matches!(
            handle.read(ReadMode::Seek, 1, &mut buf),
            Err(PlatformError::InvalidParameter(_))
        ));
        assert!(handle.read(ReadMode::Sequential, 0, &mut buf).unwrap() > 0);
    }

    #[test]
    fn test_modern_render() {
        let platform = ReplayPlatform::new();
        platform.set_modern_available(true);
        platform.add_library("app.dll", &[(7, "started %1")]);
        platform.register_message_files("App", "svc", "missing.dll;app.dll");
        platform.push_event("App", 7, "svc", NativeLevel::Information, &["web"]);
        platform.push_event("App", 8, "svc", NativeLevel::Information, &["a", "b"]);

        let mut sub = platform.subscribe_after("App", None).unwrap();
        assert!(sub.poll_ready());
        let batch = sub.next_batch(16).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].payload, MessagePayload::Rendered("started web".to_string()));
        assert_eq!(batch[1].payload, MessagePayload::Rendered("a b".to_string()));

        sub.reset_signal();
        assert!(!sub.poll_ready());
        platform.push_event("App", 9, "svc", NativeLevel::Error, &[]);
        assert!(sub.poll_ready());
    }

    #[test]
    fn test_fixture_json() {
        let platform = ReplayPlatform::from_json(
            r#"{
                "modern_available": true,
                "logs": [
                    {"name": "Application", "first_id": 10, "records": [
                        {"event_id": 1000, "source": "App", "level": "error", "inserts": ["boom"]},
                        {"event_id": 1001, "source": "App", "level": "warning", "sid": "S-1-5-18"}
                    ]},
                    {"name": "Hidden/Operational", "registered": false}
                ],
                "message_files": [{"log": "Application", "source": "App", "paths": "app.dll"}],
                "libraries": [{"path": "app.dll", "messages": {"1000": "failed: %1"}}]
            }"#,
        )
        .unwrap();

        assert!(platform.is_available());
        assert_eq!(platform.event_logs().unwrap(), vec!["Application"]);
        assert_eq!(platform.first_record_from("Application", 0).unwrap(), Some(10));
        assert_eq!(platform.last_record("Application").unwrap(), Some(11));
        assert_eq!(platform.last_record("Hidden/Operational").unwrap(), None);
        assert_eq!(platform.message_files("application", "app").as_deref(), Some("app.dll"));

        let library = platform.load("APP.DLL").unwrap();
        assert_eq!(library.format(1000, &["x".to_string()]).as_deref(), Some("failed: x"));
        assert_eq!(platform.library_loads(), 1);
    }

    #[test]
    fn test_demo_fixture() {
        let platform = ReplayPlatform::from_json(include_str!("../fixtures/demo.json")).unwrap();
        assert_eq!(platform.event_logs().unwrap().len(), 5);
        assert_eq!(platform.open("System").unwrap().record_count().unwrap(), 2);
        assert_eq!(platform.open("State").unwrap().record_count().unwrap(), 0);
        assert!(matches!(platform.last_record("System"), Err(PlatformError::NotSupported(_))));
    }

    #[test]
    fn test_access_denied() {
        let platform = ReplayPlatform::new();
        platform.set_modern_available(true);
        platform.push_event("Security", 4624, "audit", NativeLevel::AuditSuccess, &[]);
        platform.set_access_denied("security", true);

        assert!(matches!(platform.open("Security"), Err(PlatformError::PermissionDenied(_))));
        assert!(matches!(platform.last_record("Security"), Err(PlatformError::PermissionDenied(_))));
        assert!(matches!(
            platform.subscribe_after("Security", None),
            Err(PlatformError::PermissionDenied(_))
        ));
        // the registry still lists it
        assert_eq!(platform.event_logs().unwrap(), vec!["Security"]);

        platform.set_access_denied("Security", false);
        assert!(platform.open("Security").is_ok());
    }

    #[test]
    fn test_modern_api_unavailable() {
        let platform = ReplayPlatform::new();
        platform.push_event("App", 1, "svc", NativeLevel::Error, &[]);

        assert!(!platform.is_available());
        assert!(matches!(platform.first_record_from("App", 0), Err(PlatformError::NotSupported(_))));
        assert!(matches!(platform.subscribe_after("App", None), Err(PlatformError::NotSupported(_))));
    }

    #[test]
    fn test_read_failure() {
        let platform = ReplayPlatform::new();
        platform.push_event("App", 1, "svc", NativeLevel::Error, &[]);
        platform.set_read_failure("App", true);

        let mut handle = platform.open("App").unwrap();
        let mut buf = vec![0u8; 4096];
        assert!(matches!(
            handle.read(ReadMode::Sequential, 0, &mut buf),
            Err(PlatformError::Io(_))
        ));
    }
}
