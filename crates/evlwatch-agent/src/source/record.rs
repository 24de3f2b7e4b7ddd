//! Legacy event log record layout
//!
//! The legacy read API fills a caller buffer with back-to-back records in the
//! classic `EVENTLOGRECORD` layout. [`RecordCursor`] walks such a page with
//! bounds checks on every offset and hands out owned [`EventRecord`]s, so no
//! caller ever holds on to the page buffer.
//!
//! Layout (little endian):
//!
//! | offset | field                 |
//! |--------|-----------------------|
//! | 0      | length                |
//! | 4      | signature `LfLe`      |
//! | 8      | record number         |
//! | 12     | time generated        |
//! | 16     | time written          |
//! | 20     | event id              |
//! | 24     | event type (u16)      |
//! | 26     | string count (u16)    |
//! | 28     | category (u16)        |
//! | 30     | reserved flags (u16)  |
//! | 32     | closing record number |
//! | 36     | string offset         |
//! | 40     | SID length            |
//! | 44     | SID offset            |
//! | 48     | data length           |
//! | 52     | data offset           |
//!
//! followed by the UTF-16 source and computer names, the SID, the
//! NUL-terminated UTF-16 insertion strings, binary data and a trailing copy
//! of the length.

use chrono::{DateTime, Utc};
use thiserror::Error;

use evlwatch_common::{EventRecord, MessagePayload, NativeLevel};

/// Fixed header size of a legacy record
pub const HEADER_SIZE: usize = 56;

/// `LfLe` signature stored at offset 4
pub const RECORD_SIGNATURE: u32 = 0x654c_664c;

/// Errors from decoding a legacy record
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("Record truncated at offset {offset}: {needed} bytes needed")]
    Truncated { offset: usize, needed: usize },

    #[error("Bad record signature {0:#x}")]
    BadSignature(u32),

    #[error("Bad record length {0}")]
    BadLength(usize),

    #[error("Field out of bounds: {0}")]
    OutOfBounds(&'static str),
}

/// Walks a page of legacy records
pub struct RecordCursor<'a> {
    page: &'a [u8],
    offset: usize,
}

impl<'a> RecordCursor<'a> {
    pub fn new(page: &'a [u8]) -> Self {
        Self { page, offset: 0 }
    }

    /// Byte offset of the next record
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Iterator for RecordCursor<'_> {
    type Item = Result<EventRecord, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.page.len() {
            return None;
        }
        match decode_record(&self.page[self.offset..]) {
            Ok((record, len)) => {
                self.offset += len;
                Some(Ok(record))
            }
            Err(e) => {
                // the rest of the page cannot be trusted
                self.offset = self.page.len();
                Some(Err(e))
            }
        }
    }
}

/// Decode the record at the start of `bytes`, returning it and its length
pub fn decode_record(bytes: &[u8]) -> Result<(EventRecord, usize), RecordError> {
    let length = read_u32(bytes, 0)? as usize;
    if length < HEADER_SIZE || length % 4 != 0 {
        return Err(RecordError::BadLength(length));
    }
    if length > bytes.len() {
        return Err(RecordError::Truncated {
            offset: 0,
            needed: length,
        });
    }
    let rec = &bytes[..length];

    let signature = read_u32(rec, 4)?;
    if signature != RECORD_SIGNATURE {
        return Err(RecordError::BadSignature(signature));
    }

    let record_number = read_u32(rec, 8)?;
    let time_generated = read_u32(rec, 12)?;
    let full_id = read_u32(rec, 20)?;
    let event_type = read_u16(rec, 24)?;
    let num_strings = read_u16(rec, 26)? as usize;
    let string_offset = read_u32(rec, 36)? as usize;
    let sid_length = read_u32(rec, 40)? as usize;
    let sid_offset = read_u32(rec, 44)? as usize;

    // trailing length copy is not part of the variable area
    let body_end = length - 4;
    let (source_name, _) = read_utf16z(rec, HEADER_SIZE, body_end)?;

    let security_id = if sid_length > 0 {
        let end = sid_offset
            .checked_add(sid_length)
            .filter(|end| *end <= body_end && sid_offset >= HEADER_SIZE)
            .ok_or(RecordError::OutOfBounds("sid"))?;
        Some(format_sid(&rec[sid_offset..end])?)
    } else {
        None
    };

    if num_strings > 0 && (string_offset < HEADER_SIZE || string_offset > body_end) {
        return Err(RecordError::OutOfBounds("strings"));
    }
    let mut inserts = Vec::with_capacity(num_strings);
    let mut pos = string_offset;
    for _ in 0..num_strings {
        let (s, next) = read_utf16z(rec, pos, body_end)?;
        inserts.push(s);
        pos = next;
    }

    let timestamp = DateTime::<Utc>::from_timestamp(i64::from(time_generated), 0).unwrap_or_default();

    let record = EventRecord {
        record_id: u64::from(record_number),
        event_id: (full_id & 0xffff) as u16,
        qualifier: (full_id >> 16) as u16,
        timestamp,
        source_name,
        level: NativeLevel::from_legacy_type(event_type),
        payload: MessagePayload::Inserts(inserts),
        security_id,
    };
    Ok((record, length))
}

/// Encode a record in the legacy layout
pub fn encode_record(record: &EventRecord, computer: &str) -> Vec<u8> {
    let mut body = Vec::new();
    push_utf16z(&mut body, &record.source_name);
    push_utf16z(&mut body, computer);
    pad4(&mut body, HEADER_SIZE);

    let sid = record.security_id.as_deref().and_then(encode_sid);
    let sid_offset = HEADER_SIZE + body.len();
    let sid_length = sid.as_ref().map(Vec::len).unwrap_or(0);
    if let Some(sid) = &sid {
        body.extend_from_slice(sid);
    }

    let inserts: Vec<&str> = match &record.payload {
        MessagePayload::Inserts(inserts) => inserts.iter().map(String::as_str).collect(),
        MessagePayload::Rendered(text) => vec![text.as_str()],
    };
    let string_offset = HEADER_SIZE + body.len();
    for s in &inserts {
        push_utf16z(&mut body, s);
    }
    let data_offset = HEADER_SIZE + body.len();
    pad4(&mut body, HEADER_SIZE);

    let length = HEADER_SIZE + body.len() + 4;
    let time = record.timestamp.timestamp().clamp(0, i64::from(u32::MAX)) as u32;

    let mut out = Vec::with_capacity(length);
    out.extend_from_slice(&(length as u32).to_le_bytes());
    out.extend_from_slice(&RECORD_SIGNATURE.to_le_bytes());
    out.extend_from_slice(&(record.record_id as u32).to_le_bytes());
    out.extend_from_slice(&time.to_le_bytes());
    out.extend_from_slice(&time.to_le_bytes());
    out.extend_from_slice(&record.full_event_id().to_le_bytes());
    out.extend_from_slice(&record.level.legacy_type().to_le_bytes());
    out.extend_from_slice(&(inserts.len() as u16).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(string_offset as u32).to_le_bytes());
    out.extend_from_slice(&(sid_length as u32).to_le_bytes());
    out.extend_from_slice(&(sid_offset as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(data_offset as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out.extend_from_slice(&(length as u32).to_le_bytes());
    out
}

/// Render a binary SID as `S-R-A-S1-S2-...`
pub fn format_sid(sid: &[u8]) -> Result<String, RecordError> {
    if sid.len() < 8 {
        return Err(RecordError::OutOfBounds("sid header"));
    }
    let revision = sid[0];
    let count = sid[1] as usize;
    if sid.len() < 8 + count * 4 {
        return Err(RecordError::OutOfBounds("sid sub-authorities"));
    }
    let authority = sid[2..8]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));

    let mut text = format!("S-{}-{}", revision, authority);
    for i in 0..count {
        let sub = read_u32(sid, 8 + i * 4)?;
        text.push_str(&format!("-{}", sub));
    }
    Ok(text)
}

/// Parse a textual SID back to its binary form
pub fn encode_sid(text: &str) -> Option<Vec<u8>> {
    let mut parts = text.strip_prefix("S-")?.split('-');
    let revision: u8 = parts.next()?.parse().ok()?;
    let authority: u64 = parts.next()?.parse().ok()?;
    let subs = parts
        .map(|p| p.parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    if subs.len() > 15 || authority >= 1 << 48 {
        return None;
    }

    let mut out = vec![revision, subs.len() as u8];
    out.extend_from_slice(&authority.to_be_bytes()[2..]);
    for sub in subs {
        out.extend_from_slice(&sub.to_le_bytes());
    }
    Some(out)
}

fn read_u16(bytes: &[u8], offset: usize) -> Result<u16, RecordError> {
    bytes
        .get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(RecordError::Truncated { offset, needed: 2 })
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, RecordError> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(RecordError::Truncated { offset, needed: 4 })
}

/// Read a NUL-terminated UTF-16 string in `[start, end)`, returning it and
/// the offset just past the terminator
fn read_utf16z(bytes: &[u8], start: usize, end: usize) -> Result<(String, usize), RecordError> {
    let mut units = Vec::new();
    let mut pos = start;
    loop {
        if pos + 2 > end {
            return Err(RecordError::OutOfBounds("unterminated string"));
        }
        let unit = read_u16(bytes, pos)?;
        pos += 2;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    Ok((String::from_utf16_lossy(&units), pos))
}

fn push_utf16z(out: &mut Vec<u8>, s: &str) {
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out.extend_from_slice(&0u16.to_le_bytes());
}

fn pad4(out: &mut Vec<u8>, base: usize) {
    while (base + out.len()) % 4 != 0 {
        out.push(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EventRecord {
        let mut record = EventRecord::new(42, 7036, "Service Control Manager", NativeLevel::Warning);
        record.qualifier = 0x4000;
        record.timestamp = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        record.payload = MessagePayload::Inserts(vec!["Print Spooler".into(), "stopped".into()]);
        record.security_id = Some("S-1-5-21-1004336348-1177238915-682003330-512".into());
        record
    }

    #[test]
    fn test_decode_encoded_record() {
        let original = sample();
        let bytes = encode_record(&original, "HOST");
        assert_eq!(bytes.len() % 4, 0);

        let (decoded, len) = decode_record(&bytes).unwrap();
        assert_eq!(len, bytes.len());
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_cursor_walks_page() {
        let mut page = Vec::new();
        for id in 1..=3 {
            let mut record = sample();
            record.record_id = id;
            page.extend(encode_record(&record, "HOST"));
        }

        let ids: Vec<u64> = RecordCursor::new(&page)
            .map(|r| r.unwrap().record_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_truncated_page_stops_cursor() {
        let bytes = encode_record(&sample(), "HOST");
        let mut page = bytes.clone();
        page.extend_from_slice(&bytes[..bytes.len() / 2]);

        let mut cursor = RecordCursor::new(&page);
        assert!(cursor.next().unwrap().is_ok());
        assert!(matches!(cursor.next(), Some(Err(RecordError::Truncated { .. }))));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_cursor_offset_covers_consumed_bytes() {
        let bytes = encode_record(&sample(), "HOST");
        let mut page = bytes.clone();
        page.extend_from_slice(&[0xff; 8]);

        let mut cursor = RecordCursor::new(&page);
        assert_eq!(cursor.offset(), 0);
        assert!(cursor.next().unwrap().is_ok());
        assert_eq!(cursor.offset(), bytes.len());

        // a bad trailer consumes the rest of the page
        assert!(cursor.next().unwrap().is_err());
        assert_eq!(cursor.offset(), page.len());
    }

    #[test]
    fn test_bad_signature() {
        let mut bytes = encode_record(&sample(), "HOST");
        bytes[4] = 0;
        assert!(matches!(decode_record(&bytes), Err(RecordError::BadSignature(_))));
    }

    #[test]
    fn test_string_offset_out_of_bounds() {
        let mut bytes = encode_record(&sample(), "HOST");
        let bogus = (bytes.len() as u32 + 100).to_le_bytes();
        bytes[36..40].copy_from_slice(&bogus);
        assert_eq!(decode_record(&bytes), Err(RecordError::OutOfBounds("strings")));
    }

    #[test]
    fn test_sid_text() {
        let bytes = encode_sid("S-1-5-18").unwrap();
        assert_eq!(bytes, vec![1, 1, 0, 0, 0, 0, 0, 5, 18, 0, 0, 0]);
        assert_eq!(format_sid(&bytes).unwrap(), "S-1-5-18");
        assert!(encode_sid("not a sid").is_none());
    }
}
