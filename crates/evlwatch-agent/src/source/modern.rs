//! Log source over the modern subscription/bookmark API
//!
//! The modern API misreports the oldest record id of a channel, so a seek
//! never trusts it: the requested position is resolved to a concrete record
//! with one forward lookup (or a reverse lookup for the end of the log) and the
//! subscription is anchored to a bookmark built from that id.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use evlwatch_common::{EventRecord, ModernEventLogApi, PlatformResult, Subscription};

use super::{LogSource, SEEK_END};

/// Records pulled from the subscription per signal
pub const BATCH_SIZE: usize = 16;

/// Modern log source
pub struct ModernLogSource {
    channel: String,
    api: Arc<dyn ModernEventLogApi>,
    subscription: Option<Box<dyn Subscription>>,
    pending: VecDeque<EventRecord>,
    valid: bool,
}

impl ModernLogSource {
    /// Open `channel`; fails if the channel cannot be queried
    pub fn open(api: Arc<dyn ModernEventLogApi>, channel: &str) -> PlatformResult<Self> {
        api.last_record(channel)?;
        Ok(Self {
            channel: channel.to_string(),
            api,
            subscription: None,
            pending: VecDeque::new(),
            valid: true,
        })
    }

    /// Resolve `pos` to the id after which the subscription starts.
    ///
    /// `Ok(None)` means the subscription starts at the oldest record.
    fn resolve_anchor(&self, pos: u64) -> PlatformResult<Option<u64>> {
        if pos != SEEK_END {
            if let Some(first) = self.api.first_record_from(&self.channel, pos)? {
                return Ok(first.checked_sub(1));
            }
        }
        // nothing at or after pos: only records written from now on
        Ok(Some(self.api.last_record(&self.channel)?.unwrap_or(0)))
    }
}

/// Bookmark descriptor for `record_id` in `channel`
pub fn bookmark_xml(channel: &str, record_id: u64) -> String {
    format!(
        "<BookmarkList><Bookmark Channel='{}' RecordId='{}' IsCurrent='true'/></BookmarkList>",
        escape_xml(channel),
        record_id
    )
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

impl LogSource for ModernLogSource {
    fn name(&self) -> &str {
        &self.channel
    }

    fn seek(&mut self, pos: u64) {
        self.subscription = None;
        self.pending.clear();

        let anchor = match self.resolve_anchor(pos) {
            Ok(anchor) => anchor,
            Err(e) => {
                warn!("Failed to query channel {}: {}", self.channel, e);
                self.valid = false;
                return;
            }
        };

        let bookmark = anchor.map(|id| bookmark_xml(&self.channel, id));
        debug!("Subscribing to {} after {:?}", self.channel, anchor);

        match self.api.subscribe_after(&self.channel, bookmark.as_deref()) {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => {
                warn!("Failed to subscribe to channel {}: {}", self.channel, e);
                self.valid = false;
            }
        }
    }

    fn read_next(&mut self) -> Option<EventRecord> {
        if let Some(record) = self.pending.pop_front() {
            return Some(record);
        }

        let subscription = self.subscription.as_mut()?;
        if !subscription.poll_ready() {
            return None;
        }

        match subscription.next_batch(BATCH_SIZE) {
            Ok(batch) if batch.is_empty() => {
                subscription.reset_signal();
                None
            }
            Ok(batch) => {
                self.pending.extend(batch);
                self.pending.pop_front()
            }
            Err(e) => {
                warn!("Failed to read channel {}: {}", self.channel, e);
                None
            }
        }
    }

    fn last_id(&mut self) -> u64 {
        match self.api.last_record(&self.channel) {
            Ok(last) => last.unwrap_or(0),
            Err(e) => {
                warn!("Failed to query channel {}: {}", self.channel, e);
                0
            }
        }
    }

    fn is_valid(&self) -> bool {
        self.valid
    }
}
