//! Message resolution for legacy records
//!
//! Legacy records only carry insertion strings. The text is produced by the
//! message libraries registered for the record's source; libraries that
//! loaded successfully are cached by path for the resolver's lifetime.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use evlwatch_common::{EventRecord, LogRegistry, MessageLibrary, MessageLibraryLoader, MessagePayload};

/// Maps records to single-line message text
pub struct MessageResolver {
    registry: Arc<dyn LogRegistry>,
    loader: Arc<dyn MessageLibraryLoader>,
    libraries: HashMap<String, Box<dyn MessageLibrary>>,
}

impl MessageResolver {
    pub fn new(registry: Arc<dyn LogRegistry>, loader: Arc<dyn MessageLibraryLoader>) -> Self {
        Self {
            registry,
            loader,
            libraries: HashMap::new(),
        }
    }

    /// Message text for `record` read from `log`
    pub fn resolve(&mut self, log: &str, record: &EventRecord) -> String {
        let text = match &record.payload {
            MessagePayload::Rendered(text) => text.clone(),
            MessagePayload::Inserts(inserts) => self
                .format_with_libraries(log, record, inserts)
                .unwrap_or_else(|| inserts.join(" ")),
        };
        single_line(&text)
    }

    /// Number of libraries currently cached
    pub fn cached_libraries(&self) -> usize {
        self.libraries.len()
    }

    fn format_with_libraries(&mut self, log: &str, record: &EventRecord, inserts: &[String]) -> Option<String> {
        let paths = self.registry.message_files(log, &record.source_name)?;
        let event_id = record.full_event_id();

        for path in paths.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let path = expand_env(path);
            if let Some(library) = self.library(&path) {
                if let Some(text) = library.format(event_id, inserts) {
                    return Some(text);
                }
            }
        }
        None
    }

    fn library(&mut self, path: &str) -> Option<&dyn MessageLibrary> {
        if !self.libraries.contains_key(path) {
            match self.loader.load(path) {
                Ok(library) => {
                    debug!("Loaded message library {}", path);
                    self.libraries.insert(path.to_string(), library);
                }
                Err(e) => {
                    debug!("Failed to load message library {}: {}", path, e);
                    return None;
                }
            }
        }
        self.libraries.get(path).map(|l| &**l)
    }
}

/// Expand `%VAR%` references from the environment; unknown ones stay as-is
pub fn expand_env(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) => {
                let var = &after[..end];
                match std::env::var(var) {
                    Ok(value) if !var.is_empty() => out.push_str(&value),
                    _ => {
                        out.push('%');
                        out.push_str(var);
                        out.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Replace CR, LF and TAB with spaces; drop trailing whitespace
fn single_line(text: &str) -> String {
    text.chars()
        .map(|c| if matches!(c, '\r' | '\n' | '\t') { ' ' } else { c })
        .collect::<String>()
        .trim_end()
        .to_string()
}
