//! Watch configuration model and per-log state bookkeeping
//!
//! A [`WatchList`] is the ordered list of `name: level [context]` rules with
//! the first `*` rule acting as the default. [`SourceState`] is the
//! persisted-plus-runtime record kept for every tracked log; the free
//! functions below reconcile the state list with the registry and the
//! configuration once per cycle.

use thiserror::Error;
use tracing::{debug, warn};

use evlwatch_common::{split_config_line, EventLevel, FilterError, WILDCARD};

/// Position sentinel for a log that has never been read: start from now
pub const FROM_BEGIN: u64 = u64::MAX;

/// Errors from parsing a watch entry line
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WatchEntryError {
    #[error("Malformed watch entry: {0}")]
    Line(#[from] FilterError),
}

/// One `name: level [context|nocontext]` rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    name: String,
    level: EventLevel,
    hide_context: bool,
}

impl WatchEntry {
    pub fn new(name: impl Into<String>, level: EventLevel, context: bool) -> Self {
        Self {
            name: name.into(),
            level,
            hide_context: !context,
        }
    }

    /// The entry used when the configuration has no `*` rule
    pub fn default_wildcard() -> Self {
        Self::new(WILDCARD, EventLevel::Warn, true)
    }

    /// Parse one configuration line.
    ///
    /// An unknown level token yields `off`. Context is shown only when a
    /// token after the level is exactly `context`.
    pub fn parse(line: &str) -> Result<Self, WatchEntryError> {
        let (name, value) = split_config_line(line)?;
        let mut words = value.split_whitespace();
        let level = words.next().map(EventLevel::from_label).unwrap_or_default();
        let context = words.any(|w| w == "context");
        Ok(Self::new(name, level, context))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> EventLevel {
        self.level
    }

    pub fn context(&self) -> bool {
        !self.hide_context
    }

    pub fn hide_context(&self) -> bool {
        self.hide_context
    }

    pub fn is_wildcard(&self) -> bool {
        self.name == WILDCARD
    }
}

/// Ordered watch rules with an optional default
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchList {
    entries: Vec<WatchEntry>,
    default_index: Option<usize>,
}

impl WatchList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration lines, skipping the malformed ones
    pub fn from_lines<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut list = Self::new();
        for line in lines {
            match WatchEntry::parse(line.as_ref()) {
                Ok(entry) => list.push(entry),
                Err(e) => warn!("Skipping watch entry '{}': {}", line.as_ref(), e),
            }
        }
        list
    }

    /// Append a rule; the first wildcard rule becomes the default
    pub fn push(&mut self, entry: WatchEntry) {
        if entry.is_wildcard() && self.default_index.is_none() {
            self.default_index = Some(self.entries.len());
        }
        self.entries.push(entry);
    }

    /// Add the built-in wildcard rule if no `*` rule was configured
    pub fn ensure_default(&mut self) {
        if self.default_index.is_none() {
            debug!("No wildcard watch entry configured, using the built-in default");
            self.push(WatchEntry::default_wildcard());
        }
    }

    pub fn entries(&self) -> &[WatchEntry] {
        &self.entries
    }

    pub fn default_entry(&self) -> Option<&WatchEntry> {
        self.default_index.and_then(|i| self.entries.get(i))
    }

    /// Exact (case-insensitive) match, wildcards excluded
    pub fn find(&self, name: &str) -> Option<&WatchEntry> {
        self.entries
            .iter()
            .find(|e| !e.is_wildcard() && e.name.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How new logs are positioned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    /// Start from now
    Normal,
    /// Resend everything from record 0
    All,
}

impl SendMode {
    pub fn from_send_all(send_all: bool) -> Self {
        if send_all {
            Self::All
        } else {
            Self::Normal
        }
    }

    fn initial_position(self) -> u64 {
        match self {
            Self::Normal => FROM_BEGIN,
            Self::All => 0,
        }
    }
}

/// Tracking record for one log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceState {
    pub name: String,
    /// Last record id already processed, or [`FROM_BEGIN`]
    pub pos: u64,
    pub level: EventLevel,
    pub hide_context: bool,
    /// Seen in the registry this cycle
    pub presented: bool,
    /// Named by the configuration (or covered by a non-off default)
    pub in_config: bool,
}

impl SourceState {
    /// A freshly discovered state: crit, context hidden, presented
    pub fn new(name: impl Into<String>, pos: u64) -> Self {
        Self {
            name: name.into(),
            pos,
            level: EventLevel::Crit,
            hide_context: true,
            presented: true,
            in_config: false,
        }
    }

    /// A state read back from a state file, not yet seen this cycle
    pub fn restored(name: impl Into<String>, pos: u64) -> Self {
        Self {
            presented: false,
            ..Self::new(name, pos)
        }
    }

    fn apply(&mut self, entry: &WatchEntry) {
        self.level = entry.level();
        self.hide_context = entry.hide_context();
    }
}

fn find_state<'a>(states: &'a mut [SourceState], name: &str) -> Option<&'a mut SourceState> {
    states.iter_mut().find(|s| s.name.eq_ignore_ascii_case(name))
}

/// Mark `name` as discovered, creating its state if needed
pub fn add_log_state(states: &mut Vec<SourceState>, in_config: bool, name: &str, mode: SendMode) {
    if let Some(state) = find_state(states, name) {
        state.presented = true;
        if in_config {
            state.in_config = true;
        }
        return;
    }

    debug!("Tracking new event log {}", name);
    let mut state = SourceState::new(name, mode.initial_position());
    state.in_config = in_config;
    states.push(state);
}

/// Apply a configured entry to its state, creating the state if needed
pub fn add_config_entry(states: &mut Vec<SourceState>, entry: &WatchEntry, reset_to_zero: bool) {
    if let Some(state) = find_state(states, entry.name()) {
        state.apply(entry);
        return;
    }

    let pos = if reset_to_zero { 0 } else { FROM_BEGIN };
    let mut state = SourceState::new(entry.name(), pos);
    state.apply(entry);
    state.in_config = true;
    states.push(state);
}

/// Apply the exact rule for `state`, if any; returns whether one matched
pub fn load_from_config(state: &mut SourceState, entries: &WatchList) -> bool {
    match entries.find(&state.name) {
        Some(entry) => {
            state.apply(entry);
            state.in_config = true;
            true
        }
        None => false,
    }
}

/// Reapply level and context from the configuration to every state
pub fn update_states_by_config(states: &mut [SourceState], entries: &WatchList) {
    let default = entries.default_entry();
    for state in states.iter_mut() {
        if load_from_config(state, entries) {
            continue;
        }
        match default {
            Some(entry) => {
                state.apply(entry);
                state.in_config = entry.level() != EventLevel::Off;
            }
            None => state.in_config = false,
        }
    }
}

/// Clear discovered flags and rediscover every registry log.
///
/// Returns the number of registry logs processed.
pub fn update_event_log_states(states: &mut Vec<SourceState>, logs: &[String], mode: SendMode) -> usize {
    for state in states.iter_mut() {
        state.presented = false;
    }
    for log in logs {
        add_log_state(states, false, log, mode);
    }
    logs.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("  Abc :   ccc context ddd ", "Abc", EventLevel::Off, true)]
    #[test_case("  Abc :   warn ncontext ddd ", "Abc", EventLevel::Warn, false)]
    #[test_case("Abc:all context", "Abc", EventLevel::All, true)]
    #[test_case("A :", "A", EventLevel::Off, false)]
    #[test_case("\"*\" : crit nocontext ", "*", EventLevel::Crit, false)]
    #[test_case("' *  ' : crit nocontext ", "*", EventLevel::Crit, false)]
    #[test_case("'Microsoft-Windows-Foo/Operational': warn", "Microsoft-Windows-Foo/Operational", EventLevel::Warn, false)]
    fn test_parse_entry(line: &str, name: &str, level: EventLevel, context: bool) {
        let entry = WatchEntry::parse(line).unwrap();
        assert_eq!(entry.name(), name);
        assert_eq!(entry.level(), level);
        assert_eq!(entry.context(), context);
    }

    #[test_case("\"\":aaa")]
    #[test_case("\"    \":aaa")]
    #[test_case("'  \t\t ':aaa")]
    #[test_case("no separator")]
    fn test_parse_entry_rejected(line: &str) {
        assert!(WatchEntry::parse(line).is_err());
    }

    #[test]
    fn test_default_entry_matches_builtin() {
        assert_eq!(
            WatchEntry::default_wildcard(),
            WatchEntry::parse("'*': warn context").unwrap()
        );
    }

    #[test]
    fn test_watch_list_default_and_find() {
        let list = WatchList::from_lines(&[
            "'Application': crit context",
            "'': off nocontext",
            "'*': warn context",
            "'*': all context",
        ]);
        assert_eq!(list.len(), 3);
        assert_eq!(list.default_entry().unwrap().level(), EventLevel::Warn);
        assert_eq!(list.find("application").unwrap().level(), EventLevel::Crit);
        assert!(list.find("*").is_none());
        assert!(list.find("System").is_none());
    }

    #[test]
    fn test_ensure_default() {
        let mut list = WatchList::from_lines(&["System: crit"]);
        assert!(list.default_entry().is_none());
        list.ensure_default();
        assert_eq!(list.default_entry(), Some(&WatchEntry::default_wildcard()));

        list.ensure_default();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_add_log_state() {
        let mut states = Vec::new();
        add_log_state(&mut states, false, "xxx", SendMode::Normal);
        assert_eq!(states[0].pos, FROM_BEGIN);
        assert_eq!(states[0].level, EventLevel::Crit);
        assert!(states[0].hide_context);
        assert!(states[0].presented);
        assert!(!states[0].in_config);

        states[0].presented = false;
        add_log_state(&mut states, false, "XXX", SendMode::Normal);
        assert!(states[0].presented);
        assert!(!states[0].in_config);

        add_log_state(&mut states, true, "xxx", SendMode::Normal);
        assert!(states[0].in_config);
        assert_eq!(states.len(), 1);

        add_log_state(&mut states, true, "yyy", SendMode::All);
        assert_eq!(states[1].pos, 0);
        assert!(states[1].in_config);
    }

    #[test]
    fn test_add_config_entry() {
        let mut states = Vec::new();
        add_config_entry(&mut states, &WatchEntry::new("a", EventLevel::Off, false), false);
        assert_eq!(states[0].pos, FROM_BEGIN);
        assert!(states[0].in_config);
        assert!(states[0].hide_context);
        assert_eq!(states[0].level, EventLevel::Off);

        add_config_entry(&mut states, &WatchEntry::new("a", EventLevel::Warn, true), true);
        assert_eq!(states.len(), 1);
        assert!(!states[0].hide_context);
        assert_eq!(states[0].pos, FROM_BEGIN);
        assert_eq!(states[0].level, EventLevel::Warn);

        add_config_entry(&mut states, &WatchEntry::new("b", EventLevel::Crit, true), true);
        assert_eq!(states.len(), 2);
        assert_eq!(states[1].pos, 0);
    }

    #[test]
    fn test_load_from_config() {
        let mut state = SourceState::new("xx", 1);
        assert!(!load_from_config(&mut state, &WatchList::new()));

        let list = WatchList::from_lines(&["XX: warn context"]);
        assert!(load_from_config(&mut state, &list));
        assert_eq!(state.level, EventLevel::Warn);
        assert!(state.in_config);
        assert!(!state.hide_context);
    }

    #[test]
    fn test_update_by_default_entry() {
        let mut states = vec![SourceState::new("Abc", 0)];
        update_states_by_config(&mut states, &WatchList::from_lines(&["'*': warn context"]));
        assert!(states[0].in_config);
        assert_eq!(states[0].level, EventLevel::Warn);
        assert!(!states[0].hide_context);

        let mut states = vec![SourceState::new("Abc", 0)];
        update_states_by_config(&mut states, &WatchList::from_lines(&["'*': off context"]));
        assert!(!states[0].in_config);
        assert_eq!(states[0].level, EventLevel::Off);

        let mut states = vec![SourceState::new("Abc", 0)];
        states[0].in_config = true;
        update_states_by_config(&mut states, &WatchList::from_lines(&["Other: warn"]));
        assert!(!states[0].in_config);
    }

    #[test]
    fn test_update_event_log_states() {
        let mut states = vec![SourceState::restored("zzz", 1), SourceState::restored("Application", 10)];
        let logs = vec!["Application".to_string(), "Zcx".to_string()];

        let processed = update_event_log_states(&mut states, &logs, SendMode::Normal);
        assert_eq!(processed, 2);
        assert_eq!(states.len(), 3);
        assert!(!states[0].presented);
        assert_eq!(states[0].pos, 1);
        assert!(states[1].presented);
        assert_eq!(states[1].pos, 10);
        assert_eq!(states[2].name, "Zcx");
        assert_eq!(states[2].pos, FROM_BEGIN);

        let mut states = Vec::new();
        update_event_log_states(&mut states, &["Zcx".to_string()], SendMode::All);
        assert_eq!(states[0].pos, 0);
    }
}
