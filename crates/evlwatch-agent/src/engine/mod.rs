//! Event log watch engine
//!
//! [`EventLogWatcher::generate_content`] runs one cycle: load stored
//! positions, reconcile them with the registry and the configuration,
//! scan/dump every tracked log and save the new positions. Every failure is
//! confined to the log it happened on.

mod dump;
mod render;

pub use dump::{dump, process_log, scan, BudgetStop, DumpContext, DumpOutcome, LogOutcome, ScanOutcome};
pub use render::{duplicate_marker, log_header, missing_header, render_line, symbol};

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use evlwatch_common::EventLevel;

use crate::config::WatchSnapshot;
use crate::observability::{
    budget_stops, cycle_latency, cycles_total, lines_emitted, logs_missing, records_scanned, tracked_logs, Timer,
};
use crate::resolver::MessageResolver;
use crate::source::{ApiVariant, EventLogPlatform};
use crate::state_file::{load_positions, save_to_first, state_file_candidates};
use crate::watch::{add_log_state, update_event_log_states, update_states_by_config, SendMode, SourceState};

/// Drives the watch cycles over one platform
pub struct EventLogWatcher {
    platform: EventLogPlatform,
    resolver: MessageResolver,
    state_dir: PathBuf,
}

impl EventLogWatcher {
    pub fn new(platform: EventLogPlatform, state_dir: impl Into<PathBuf>) -> Self {
        let resolver = MessageResolver::new(platform.registry().clone(), platform.loader().clone());
        Self {
            platform,
            resolver,
            state_dir: state_dir.into(),
        }
    }

    pub fn platform(&self) -> &EventLogPlatform {
        &self.platform
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Run one cycle for the client at `remote` and return its text blocks
    pub fn generate_content(&mut self, snapshot: &WatchSnapshot, remote: Option<&str>) -> String {
        if !snapshot.enabled {
            debug!("Event log watching disabled");
            return String::new();
        }

        let _timer = Timer::start(cycle_latency());
        cycles_total().inc();

        let candidates = state_file_candidates(&self.state_dir, remote, &snapshot.clusters);
        let mut states = load_positions(&candidates, snapshot.send_mode == SendMode::All);
        let variant = self.platform.effective_variant(snapshot.api);
        self.reconcile(&mut states, snapshot, variant);
        tracked_logs().set(states.len() as u64);

        let mut out = String::new();
        for state in states.iter_mut() {
            out.push_str(&self.process_state(state, snapshot, variant));
        }

        if let Err(e) = save_to_first(&candidates, &states) {
            warn!("Failed to save event log positions: {}", e);
        }
        out
    }

    /// Merge registry logs and configured names into `states` and reapply
    /// the watch entries
    pub fn reconcile(&self, states: &mut Vec<SourceState>, snapshot: &WatchSnapshot, variant: ApiVariant) {
        let logs = match self.platform.registry().event_logs() {
            Ok(logs) => logs,
            Err(e) => {
                warn!("Failed to enumerate event logs: {}", e);
                Vec::new()
            }
        };
        let processed = update_event_log_states(states, &logs, snapshot.send_mode);
        debug!("Registry lists {} event logs", processed);

        // the modern API can open channels the registry does not list
        if variant == ApiVariant::Modern {
            for entry in snapshot.entries.entries().iter().filter(|e| !e.is_wildcard()) {
                add_log_state(states, true, entry.name(), snapshot.send_mode);
            }
        }

        update_states_by_config(states, &snapshot.entries);
    }

    fn process_state(&mut self, state: &mut SourceState, snapshot: &WatchSnapshot, variant: ApiVariant) -> String {
        if state.level == EventLevel::Ignore {
            return String::new();
        }
        let available = state.presented || (variant == ApiVariant::Modern && state.in_config);
        if !available {
            return String::new();
        }
        let reported = state.in_config && !state.level.is_silent();

        let mut source = match self.platform.open(&state.name, variant) {
            Ok(source) => source,
            Err(e) => {
                if !reported {
                    debug!("Failed to open untracked event log {}: {}", state.name, e);
                    return String::new();
                }
                warn!("Failed to open event log {}: {}", state.name, e);
                logs_missing().inc();
                return missing_header(&state.name);
            }
        };

        if !reported {
            state.pos = source.last_id();
            return String::new();
        }

        let ctx = DumpContext {
            log: &state.name,
            threshold: state.level,
            hide_context: state.hide_context,
            skip_duplicated: snapshot.skip_duplicated,
            limits: &snapshot.limits,
            filters: &snapshot.filters,
        };

        let Some(outcome) = process_log(source.as_mut(), state, &ctx, &mut self.resolver) else {
            warn!("Event log {} became unreadable", state.name);
            logs_missing().inc();
            return missing_header(&state.name);
        };

        records_scanned().inc_by(outcome.scanned);
        lines_emitted().inc_by(outcome.lines as u64);
        if outcome.stopped.is_some() {
            budget_stops().inc();
        }
        if outcome.lines > 0 {
            info!("Event log {}: {} lines up to record {}", state.name, outcome.lines, outcome.pos);
        }

        state.pos = outcome.pos;
        let mut block = log_header(&state.name);
        block.push_str(&outcome.text);
        block
    }
}
