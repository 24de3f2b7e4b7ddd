//! Per-log scan and dump
//!
//! A cycle first scans the new records of a log, classifying severity only.
//! Only when something at or above the threshold showed up is the same range
//! read again in full: filtered, resolved, rendered and cut to the budgets.

use std::time::Instant;

use tracing::{debug, warn};

use evlwatch_common::EventLevel;

use super::render::{duplicate_marker, render_line, symbol, truncate_line, CONTEXT_SYMBOL};
use crate::config::{Filters, Limits};
use crate::resolver::MessageResolver;
use crate::source::LogSource;
use crate::watch::{SourceState, FROM_BEGIN};

/// Result of the severity-only pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Worst level seen, `Off` when nothing was read
    pub worst: EventLevel,
    pub last_id: Option<u64>,
    pub scanned: u64,
}

/// Budget that ended a dump early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStop {
    Size,
    Entries,
    Timeout,
}

/// Result of the full pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpOutcome {
    pub text: String,
    pub last_id: Option<u64>,
    pub lines: usize,
    pub stopped: Option<BudgetStop>,
}

/// Settings for dumping one log
#[derive(Debug, Clone, Copy)]
pub struct DumpContext<'a> {
    pub log: &'a str,
    pub threshold: EventLevel,
    pub hide_context: bool,
    pub skip_duplicated: bool,
    pub limits: &'a Limits,
    pub filters: &'a Filters,
}

/// What processing one log produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOutcome {
    /// Position to store
    pub pos: u64,
    pub text: String,
    pub scanned: u64,
    pub lines: usize,
    pub stopped: Option<BudgetStop>,
}

/// Read everything from the current position, tracking the worst level
pub fn scan(source: &mut dyn LogSource) -> ScanOutcome {
    let mut outcome = ScanOutcome {
        worst: EventLevel::Off,
        last_id: None,
        scanned: 0,
    };
    while let Some(record) = source.read_next() {
        outcome.worst = outcome.worst.max(record.event_level());
        outcome.last_id = Some(record.record_id);
        outcome.scanned += 1;
    }
    outcome
}

/// Accumulates lines while enforcing the budgets
struct Output<'a> {
    text: String,
    lines: usize,
    limits: &'a Limits,
}

impl<'a> Output<'a> {
    fn new(limits: &'a Limits) -> Self {
        Self {
            text: String::new(),
            lines: 0,
            limits,
        }
    }

    /// Size is checked first, then the line is truncated, then the count
    fn push(&mut self, mut line: String) -> Result<(), BudgetStop> {
        if let Some(max) = self.limits.max_size {
            if self.text.len() + line.len() + 1 > max {
                return Err(BudgetStop::Size);
            }
        }
        if let Some(max) = self.limits.max_line_length {
            truncate_line(&mut line, max);
        }
        if let Some(max) = self.limits.max_entries {
            if self.lines >= max {
                return Err(BudgetStop::Entries);
            }
        }
        self.text.push_str(&line);
        self.text.push('\n');
        self.lines += 1;
        Ok(())
    }
}

/// Filter, resolve and render everything from the current position
pub fn dump(source: &mut dyn LogSource, ctx: &DumpContext<'_>, resolver: &mut MessageResolver) -> DumpOutcome {
    let started = Instant::now();
    let mut output = Output::new(ctx.limits);
    let mut last_id = None;
    let mut previous: Option<String> = None;
    let mut repeats = 0usize;

    let stopped = loop {
        if let Some(timeout) = ctx.limits.timeout {
            if started.elapsed() >= timeout {
                break Some(BudgetStop::Timeout);
            }
        }
        let Some(record) = source.read_next() else {
            break None;
        };

        if !ctx.filters.accepts(ctx.log, &record) {
            last_id = Some(record.record_id);
            continue;
        }

        let sym = symbol(record.event_level(), ctx.threshold);
        if sym == CONTEXT_SYMBOL && ctx.hide_context {
            last_id = Some(record.record_id);
            continue;
        }

        let message = resolver.resolve(ctx.log, &record);
        let line = render_line(sym, &record, &message);

        if ctx.skip_duplicated && previous.as_deref() == Some(line.as_str()) {
            repeats += 1;
            last_id = Some(record.record_id);
            continue;
        }
        if repeats > 0 {
            if let Err(stop) = output.push(duplicate_marker(repeats)) {
                break Some(stop);
            }
            repeats = 0;
        }
        if let Err(stop) = output.push(line.clone()) {
            break Some(stop);
        }
        if ctx.skip_duplicated {
            previous = Some(line);
        }
        last_id = Some(record.record_id);
    };

    if stopped.is_none() && repeats > 0 {
        // a trailing marker that does not fit is simply dropped
        let _ = output.push(duplicate_marker(repeats));
    }
    if let Some(stop) = stopped {
        debug!("Dump of {} stopped by {:?} budget after {} lines", ctx.log, stop, output.lines);
    }

    DumpOutcome {
        text: output.text,
        last_id,
        lines: output.lines,
        stopped,
    }
}

/// Run the scan/dump protocol for one log and compute its next position.
///
/// Returns `None` when the source became unusable while seeking; the stored
/// position must then stay untouched.
pub fn process_log(
    source: &mut dyn LogSource,
    state: &SourceState,
    ctx: &DumpContext<'_>,
    resolver: &mut MessageResolver,
) -> Option<LogOutcome> {
    if state.pos == FROM_BEGIN {
        // first sight of this log: start watching from now
        return Some(LogOutcome {
            pos: source.last_id(),
            ..LogOutcome::default()
        });
    }

    let start = state.pos.saturating_add(1);
    source.seek(start);
    if !source.is_valid() {
        return None;
    }

    let scanned = scan(source);
    let Some(scan_last) = scanned.last_id else {
        let last = source.last_id();
        let pos = if last < state.pos {
            warn!(
                "Event log {} restarted at record {} (stored position {}), following it",
                ctx.log, last, state.pos
            );
            last
        } else {
            state.pos
        };
        return Some(LogOutcome {
            pos,
            ..LogOutcome::default()
        });
    };

    if scanned.worst < ctx.threshold {
        return Some(LogOutcome {
            pos: scan_last,
            scanned: scanned.scanned,
            ..LogOutcome::default()
        });
    }

    source.seek(start);
    if !source.is_valid() {
        return None;
    }
    let dumped = dump(source, ctx, resolver);

    Some(LogOutcome {
        pos: dumped.last_id.map_or(scan_last, |id| id.max(scan_last)),
        text: dumped.text,
        scanned: scanned.scanned,
        lines: dumped.lines,
        stopped: dumped.stopped,
    })
}
