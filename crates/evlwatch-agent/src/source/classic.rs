//! Log source over the legacy sequential/seekable API

use std::sync::Arc;

use tracing::{debug, warn};

use evlwatch_common::{ClassicEventLogApi, ClassicLogHandle, EventRecord, PlatformError, PlatformResult, ReadMode};

use super::record::RecordCursor;
use super::LogSource;

/// Initial page buffer size
const INITIAL_BUFFER_SIZE: usize = 64 * 1024;

/// Upper bound for page buffer growth
const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Legacy log source owning a growable page buffer
pub struct ClassicLogSource {
    name: String,
    api: Arc<dyn ClassicEventLogApi>,
    handle: Box<dyn ClassicLogHandle>,
    buffer: Vec<u8>,
    page_len: usize,
    page_offset: usize,
    /// Offset for the next seek read
    pending_seek: Option<u64>,
    /// Records below this id are skipped (sequential-only emulation of seek)
    min_record: u64,
    /// Seek landed beyond the newest record: nothing to read
    skip_present: bool,
    exhausted: bool,
    /// Cleared for good once the seek defect was hit
    seek_supported: bool,
    valid: bool,
}

impl ClassicLogSource {
    /// Open `name` through the legacy API
    pub fn open(api: Arc<dyn ClassicEventLogApi>, name: &str) -> PlatformResult<Self> {
        let handle = api.open(name)?;
        Ok(Self {
            name: name.to_string(),
            api,
            handle,
            buffer: vec![0; INITIAL_BUFFER_SIZE],
            page_len: 0,
            page_offset: 0,
            pending_seek: None,
            min_record: 0,
            skip_present: false,
            exhausted: false,
            seek_supported: true,
            valid: true,
        })
    }

    /// Whether this instance still uses seek reads
    pub fn seek_supported(&self) -> bool {
        self.seek_supported
    }

    /// Current page buffer size
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    fn bounds(&self) -> PlatformResult<(u64, u64)> {
        Ok((self.handle.oldest_record()?, self.handle.record_count()?))
    }

    fn reopen(&mut self) -> bool {
        match self.api.open(&self.name) {
            Ok(handle) => {
                self.handle = handle;
                true
            }
            Err(e) => {
                warn!("Failed to reopen event log {}: {}", self.name, e);
                self.valid = false;
                false
            }
        }
    }

    /// Read the next page into the buffer; false at the end of the log
    fn fill_page(&mut self) -> bool {
        self.page_len = 0;
        self.page_offset = 0;

        let (mut mode, mut offset) = match self.pending_seek.take() {
            Some(pos) if self.seek_supported => (ReadMode::Seek, pos),
            _ => (ReadMode::Sequential, 0),
        };
        let mut retried = false;

        loop {
            match self.handle.read(mode, offset, &mut self.buffer) {
                Ok(0) => return false,
                Ok(n) => {
                    self.page_len = n.min(self.buffer.len());
                    return true;
                }
                Err(PlatformError::InsufficientBuffer { required }) => {
                    if !self.grow_buffer(required) {
                        return false;
                    }
                }
                Err(PlatformError::InvalidParameter(reason)) if mode == ReadMode::Seek && !retried => {
                    warn!(
                        "Seek read failed on event log {} ({}), switching to sequential reads",
                        self.name, reason
                    );
                    self.seek_supported = false;
                    retried = true;
                    if !self.reopen() {
                        return false;
                    }
                    mode = ReadMode::Sequential;
                    offset = 0;
                }
                Err(e) => {
                    warn!("Failed to read event log {}: {}", self.name, e);
                    return false;
                }
            }
        }
    }

    fn grow_buffer(&mut self, required: usize) -> bool {
        let mut size = self.buffer.len().max(1) * 2;
        while size < required {
            size *= 2;
        }
        if size > MAX_BUFFER_SIZE {
            warn!(
                "Record in event log {} needs {} bytes, above the {} byte limit",
                self.name, required, MAX_BUFFER_SIZE
            );
            return false;
        }
        debug!("Growing read buffer for {} to {} bytes", self.name, size);
        self.buffer.resize(size, 0);
        true
    }
}

impl LogSource for ClassicLogSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn seek(&mut self, pos: u64) {
        self.page_len = 0;
        self.page_offset = 0;
        self.exhausted = false;
        self.skip_present = false;
        self.pending_seek = None;

        let (oldest, count) = match self.bounds() {
            Ok(bounds) => bounds,
            Err(e) => {
                warn!("Failed to query bounds of event log {}: {}", self.name, e);
                self.exhausted = true;
                return;
            }
        };

        if pos >= oldest.saturating_add(count) {
            self.skip_present = true;
            return;
        }

        let target = pos.max(oldest);
        self.min_record = target;
        if self.seek_supported {
            self.pending_seek = Some(target);
        } else {
            // sequential reads start over from a fresh handle
            self.reopen();
        }
    }

    fn read_next(&mut self) -> Option<EventRecord> {
        loop {
            if self.skip_present || self.exhausted || !self.valid {
                return None;
            }

            let mut cursor = RecordCursor::new(&self.buffer[self.page_offset..self.page_len]);
            if let Some(next) = cursor.next() {
                self.page_offset += cursor.offset();
                match next {
                    Ok(record) if record.record_id < self.min_record => continue,
                    Ok(record) => return Some(record),
                    Err(e) => {
                        warn!("Dropping rest of page in event log {}: {}", self.name, e);
                        continue;
                    }
                }
            }

            if !self.fill_page() {
                self.exhausted = true;
            }
        }
    }

    fn last_id(&mut self) -> u64 {
        match self.bounds() {
            Ok((_, 0)) => 0,
            Ok((oldest, count)) => oldest + count - 1,
            Err(e) => {
                warn!("Failed to query bounds of event log {}: {}", self.name, e);
                0
            }
        }
    }

    fn is_valid(&self) -> bool {
        self.valid
    }
}
