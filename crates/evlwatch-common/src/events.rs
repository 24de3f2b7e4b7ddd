//! Event record and severity types shared by every log source

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Keyword bit the modern API sets on failed audit events
pub const KEYWORD_AUDIT_FAILURE: u64 = 0x0010_0000_0000_0000;

/// Keyword bit the modern API sets on successful audit events
pub const KEYWORD_AUDIT_SUCCESS: u64 = 0x0020_0000_0000_0000;

/// Platform-native event level as reported by either log API
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NativeLevel {
    Error,
    Warning,
    Information,
    AuditSuccess,
    AuditFailure,
    Success,
}

impl NativeLevel {
    /// Decode the `EventType` field of a legacy record
    pub fn from_legacy_type(event_type: u16) -> Self {
        match event_type {
            0x0001 => Self::Error,
            0x0002 => Self::Warning,
            0x0004 => Self::Information,
            0x0008 => Self::AuditSuccess,
            0x0010 => Self::AuditFailure,
            _ => Self::Success,
        }
    }

    /// The legacy `EventType` value for this level
    pub fn legacy_type(&self) -> u16 {
        match self {
            Self::Error => 0x0001,
            Self::Warning => 0x0002,
            Self::Information => 0x0004,
            Self::AuditSuccess => 0x0008,
            Self::AuditFailure => 0x0010,
            Self::Success => 0x0000,
        }
    }

    /// Decode a modern level/keywords pair; audit keywords win over the level
    pub fn from_modern(level: u8, keywords: u64) -> Self {
        if keywords & KEYWORD_AUDIT_FAILURE != 0 {
            return Self::AuditFailure;
        }
        if keywords & KEYWORD_AUDIT_SUCCESS != 0 {
            return Self::AuditSuccess;
        }
        match level {
            1 | 2 => Self::Error,
            3 => Self::Warning,
            _ => Self::Information,
        }
    }

    /// Map to the watch scale: crit, warn or all
    pub fn to_event_level(&self) -> EventLevel {
        match self {
            Self::Error | Self::AuditFailure => EventLevel::Crit,
            Self::Warning => EventLevel::Warn,
            Self::Information | Self::AuditSuccess | Self::Success => EventLevel::All,
        }
    }
}

/// Severity scale used by watch entries and thresholds.
///
/// `Off` and `Ignore` never match a record. `Off` still advances the stored
/// position every cycle while `Ignore` leaves the log untouched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    #[default]
    Off,
    Ignore,
    All,
    Warn,
    Crit,
}

impl EventLevel {
    /// Parse a configuration label; anything unknown is `Off`
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or(Self::Off)
    }

    /// True for the two levels that never produce output
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Off | Self::Ignore)
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Ignore => write!(f, "ignore"),
            Self::All => write!(f, "all"),
            Self::Warn => write!(f, "warn"),
            Self::Crit => write!(f, "crit"),
        }
    }
}

impl FromStr for EventLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "ignore" => Ok(Self::Ignore),
            "all" => Ok(Self::All),
            "warn" => Ok(Self::Warn),
            "crit" => Ok(Self::Crit),
            _ => Err(format!("Unknown event level: {}", s)),
        }
    }
}

/// Text carried by a record before message resolution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessagePayload {
    /// Insertion strings still to be formatted through message libraries
    Inserts(Vec<String>),
    /// Message already formatted by the platform
    Rendered(String),
}

impl Default for MessagePayload {
    fn default() -> Self {
        Self::Inserts(Vec::new())
    }
}

/// One normalized event log record.
///
/// Records are owned copies: nothing in here borrows from the buffer the
/// source read them from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRecord {
    /// Record number, monotonic within one log
    pub record_id: u64,
    /// Event code (low 16 bits of the full id)
    pub event_id: u16,
    /// Qualifier (high 16 bits of the full id)
    #[serde(default)]
    pub qualifier: u16,
    /// Time the event was generated
    pub timestamp: DateTime<Utc>,
    /// Source application name
    pub source_name: String,
    /// Native level
    pub level: NativeLevel,
    /// Unresolved message text
    #[serde(default)]
    pub payload: MessagePayload,
    /// User SID in text form, if the record carries one
    #[serde(default)]
    pub security_id: Option<String>,
}

impl EventRecord {
    /// Create a record with an empty payload
    pub fn new(record_id: u64, event_id: u16, source_name: impl Into<String>, level: NativeLevel) -> Self {
        Self {
            record_id,
            event_id,
            qualifier: 0,
            timestamp: Utc::now(),
            source_name: source_name.into(),
            level,
            payload: MessagePayload::default(),
            security_id: None,
        }
    }

    /// The 32-bit id message libraries are keyed by
    pub fn full_event_id(&self) -> u32 {
        (u32::from(self.qualifier) << 16) | u32::from(self.event_id)
    }

    /// Severity on the watch scale
    pub fn event_level(&self) -> EventLevel {
        self.level.to_event_level()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("", EventLevel::Off)]
    #[test_case("off", EventLevel::Off)]
    #[test_case("oFf", EventLevel::Off)]
    #[test_case("ignoRe", EventLevel::Ignore)]
    #[test_case("warn", EventLevel::Warn)]
    #[test_case("crit", EventLevel::Crit)]
    #[test_case("alL", EventLevel::All)]
    #[test_case("all ", EventLevel::Off)]
    fn test_level_labels(label: &str, expected: EventLevel) {
        assert_eq!(EventLevel::from_label(label), expected);
    }

    #[test]
    fn test_level_order() {
        assert!(EventLevel::Off < EventLevel::Ignore);
        assert!(EventLevel::Ignore < EventLevel::All);
        assert!(EventLevel::All < EventLevel::Warn);
        assert!(EventLevel::Warn < EventLevel::Crit);
    }

    #[test]
    fn test_native_mapping() {
        assert_eq!(NativeLevel::Error.to_event_level(), EventLevel::Crit);
        assert_eq!(NativeLevel::AuditFailure.to_event_level(), EventLevel::Crit);
        assert_eq!(NativeLevel::Warning.to_event_level(), EventLevel::Warn);
        assert_eq!(NativeLevel::Information.to_event_level(), EventLevel::All);
        assert_eq!(NativeLevel::AuditSuccess.to_event_level(), EventLevel::All);
        assert_eq!(NativeLevel::Success.to_event_level(), EventLevel::All);
    }

    #[test]
    fn test_legacy_type_roundtrip() {
        for level in [
            NativeLevel::Error,
            NativeLevel::Warning,
            NativeLevel::Information,
            NativeLevel::AuditSuccess,
            NativeLevel::AuditFailure,
            NativeLevel::Success,
        ] {
            assert_eq!(NativeLevel::from_legacy_type(level.legacy_type()), level);
        }
    }

    #[test]
    fn test_modern_levels() {
        assert_eq!(NativeLevel::from_modern(1, 0), NativeLevel::Error);
        assert_eq!(NativeLevel::from_modern(2, 0), NativeLevel::Error);
        assert_eq!(NativeLevel::from_modern(3, 0), NativeLevel::Warning);
        assert_eq!(NativeLevel::from_modern(0, 0), NativeLevel::Information);
        assert_eq!(NativeLevel::from_modern(4, KEYWORD_AUDIT_FAILURE), NativeLevel::AuditFailure);
        assert_eq!(NativeLevel::from_modern(4, KEYWORD_AUDIT_SUCCESS), NativeLevel::AuditSuccess);
    }

    #[test]
    fn test_full_event_id() {
        let mut record = EventRecord::new(1, 0x1234, "src", NativeLevel::Information);
        record.qualifier = 0x8000;
        assert_eq!(record.full_event_id(), 0x8000_1234);
    }
}
