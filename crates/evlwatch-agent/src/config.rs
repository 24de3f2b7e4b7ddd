//! Watch configuration
//!
//! The TOML file is deserialized into [`WatchConfig`]. At the start of every
//! cycle the engine takes an immutable [`WatchSnapshot`] from it: parsed
//! watch entries, filter maps, limits and flags. Malformed lines are skipped
//! with a warning so one bad entry never disables the rest.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use evlwatch_common::{EventRecord, FilterMap, IdsFilter, TagsFilter};

use crate::source::ApiVariant;
use crate::state_file::Cluster;
use crate::watch::{SendMode, WatchList};

/// Default cap on the text produced for one log
pub const DEFAULT_MAX_SIZE: i64 = 500_000;

/// Errors that can occur while loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Root of the configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub logwatch: LogWatchConfig,

    /// Groups of client addresses sharing one state file
    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,
}

/// The `[logwatch]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogWatchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Resend every log from record 0 on every cycle
    #[serde(default)]
    pub sendall: bool,

    /// Prefer the modern subscription API when the host has it
    #[serde(default)]
    pub vista_api: bool,

    /// Collapse consecutive identical lines
    #[serde(default)]
    pub skip_duplicated: bool,

    /// Byte cap per log; -1 is unlimited
    #[serde(default = "default_max_size")]
    pub max_size: i64,

    #[serde(default = "default_unlimited")]
    pub max_line_length: i64,

    #[serde(default = "default_unlimited")]
    pub max_entries: i64,

    /// Seconds per log; -1 is unlimited
    #[serde(default = "default_unlimited")]
    pub timeout: i64,

    /// `name: level [context|nocontext]` lines
    #[serde(default)]
    pub logfile: Vec<String>,

    /// `name: ids ;; ids` lines
    #[serde(default)]
    pub filter_ids: Vec<String>,

    /// `name: sources ;; sources` lines
    #[serde(default)]
    pub filter_tags: Vec<String>,

    /// `name: sids ;; sids` lines
    #[serde(default)]
    pub filter_users: Vec<String>,
}

impl Default for LogWatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sendall: false,
            vista_api: false,
            skip_duplicated: false,
            max_size: DEFAULT_MAX_SIZE,
            max_line_length: -1,
            max_entries: -1,
            timeout: -1,
            logfile: Vec::new(),
            filter_ids: Vec::new(),
            filter_tags: Vec::new(),
            filter_users: Vec::new(),
        }
    }
}

/// A `[[clusters]]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterConfig {
    pub name: String,
    /// Exact addresses or CIDR subnets
    #[serde(default)]
    pub ips: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_max_size() -> i64 {
    DEFAULT_MAX_SIZE
}

fn default_unlimited() -> i64 {
    -1
}

impl WatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    /// Load config from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Immutable view used for one cycle
    pub fn snapshot(&self) -> WatchSnapshot {
        let lw = &self.logwatch;

        let mut entries = WatchList::from_lines(&lw.logfile);
        entries.ensure_default();

        WatchSnapshot {
            enabled: lw.enabled,
            send_mode: SendMode::from_send_all(lw.sendall),
            api: if lw.vista_api {
                ApiVariant::Modern
            } else {
                ApiVariant::Classic
            },
            skip_duplicated: lw.skip_duplicated,
            limits: Limits::from_raw(lw.max_size, lw.max_line_length, lw.max_entries, lw.timeout),
            entries,
            filters: Filters::from_lines(&lw.filter_ids, &lw.filter_tags, &lw.filter_users),
            clusters: self.clusters.iter().map(Cluster::from_config).collect(),
        }
    }

    /// Example configuration file
    pub fn example_toml() -> &'static str {
        r##"# evlwatch configuration
# =====================

[logwatch]
enabled = true

# Resend every log from the beginning on each cycle
sendall = false

# Use the subscription based API when the host supports it
vista_api = false

# Collapse consecutive identical lines into one plus a repeat marker
skip_duplicated = false

# Budgets per log, -1 means unlimited
max_size = 500000
max_line_length = -1
max_entries = -1
timeout = -1

# name: off|ignore|all|warn|crit [context|nocontext]
# The first '*' entry applies to every log without its own entry.
logfile = [
    "'Parameters': ignore",
    "'State': ignore",
    "'Application': crit context",
    "'*': warn nocontext",
]

# name: include ;; exclude, lists are ';' separated
filter_ids = []
filter_tags = []
filter_users = []

# Clients in one cluster share a state file
# [[clusters]]
# name = "web"
# ips = ["10.0.0.1", "10.1.0.0/16"]
"##
    }
}

/// Dump budgets; `None` is unlimited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limits {
    pub max_size: Option<usize>,
    pub max_line_length: Option<usize>,
    pub max_entries: Option<usize>,
    pub timeout: Option<Duration>,
}

impl Limits {
    /// Convert raw configuration values; anything `<= 0` is unlimited
    pub fn from_raw(max_size: i64, max_line_length: i64, max_entries: i64, timeout: i64) -> Self {
        fn positive(value: i64) -> Option<u64> {
            (value > 0).then_some(value as u64)
        }

        Self {
            max_size: positive(max_size).map(|v| v as usize),
            max_line_length: positive(max_line_length).map(|v| v as usize),
            max_entries: positive(max_entries).map(|v| v as usize),
            timeout: positive(timeout).map(Duration::from_secs),
        }
    }

    pub fn unlimited() -> Self {
        Self::default()
    }
}

/// Id, source and user filters
#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub ids: FilterMap<IdsFilter>,
    pub tags: FilterMap<TagsFilter>,
    pub users: FilterMap<TagsFilter>,
}

impl Filters {
    /// Parse filter lines, skipping the malformed ones
    pub fn from_lines<S: AsRef<str>>(ids: &[S], tags: &[S], users: &[S]) -> Self {
        let mut filters = Self::default();

        for line in ids {
            match IdsFilter::parse(line.as_ref()) {
                Ok(filter) => {
                    if !filter.rejected_tokens().is_empty() {
                        warn!(
                            "Ignoring invalid event ids {:?} in filter '{}'",
                            filter.rejected_tokens(),
                            line.as_ref()
                        );
                    }
                    filters.ids.insert(filter);
                }
                Err(e) => warn!("Skipping id filter: {}", e),
            }
        }
        for (lines, map) in [(tags, &mut filters.tags), (users, &mut filters.users)] {
            for line in lines {
                match TagsFilter::parse(line.as_ref()) {
                    Ok(filter) => map.insert(filter),
                    Err(e) => warn!("Skipping tag filter: {}", e),
                }
            }
        }

        filters
    }

    /// Id, then source, then user; all must pass.
    ///
    /// A record without a SID passes a user filter only if the filter has no
    /// include list.
    pub fn accepts(&self, log: &str, record: &EventRecord) -> bool {
        if let Some(ids) = self.ids.get(log) {
            if !ids.accepts(record.event_id) {
                return false;
            }
        }
        if let Some(tags) = self.tags.get(log) {
            if !tags.accepts(&record.source_name) {
                return false;
            }
        }
        if let Some(users) = self.users.get(log) {
            let passed = match &record.security_id {
                Some(sid) => users.accepts(sid),
                None => users.tags().include().is_none(),
            };
            if !passed {
                return false;
            }
        }
        true
    }
}

/// Configuration frozen for one cycle
#[derive(Debug, Clone)]
pub struct WatchSnapshot {
    pub enabled: bool,
    pub send_mode: SendMode,
    pub api: ApiVariant,
    pub skip_duplicated: bool,
    pub limits: Limits,
    pub entries: WatchList,
    pub filters: Filters,
    pub clusters: Vec<Cluster>,
}

impl Default for WatchSnapshot {
    fn default() -> Self {
        WatchConfig::default().snapshot()
    }
}
