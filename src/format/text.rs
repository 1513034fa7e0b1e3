//! Single-line text formatter.
//!
//! Layout: `TIMESTAMP [LEVEL] [category] message key=value ... # file:line`
//! with the optional parts present only when the record carries them.

use crate::format::Formatter;
use crate::record::Record;

/// Human-readable line formatter, one record per line.
#[derive(Debug, Clone)]
pub struct TextFormatter {
    with_timestamp: bool,
    with_location: bool,
}

impl TextFormatter {
    /// Formatter with timestamps and source locations enabled.
    pub fn new() -> Self {
        Self { with_timestamp: true, with_location: true }
    }

    /// Toggle the leading timestamp.
    pub fn timestamp(mut self, enabled: bool) -> Self {
        self.with_timestamp = enabled;
        self
    }

    /// Toggle the trailing source location.
    pub fn source_location(mut self, enabled: bool) -> Self {
        self.with_location = enabled;
        self
    }
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl Formatter for TextFormatter {
    fn format(&self, record: &Record) -> Vec<u8> {
        let mut line = String::with_capacity(96 + record.message().len());

        if self.with_timestamp {
            line.push_str(&record.timestamp().to_rfc3339());
            line.push(' ');
        }
        line.push('[');
        line.push_str(record.level().as_str());
        line.push(']');
        if let Some(category) = record.category() {
            line.push_str(" [");
            line.push_str(category);
            line.push(']');
        }
        line.push(' ');
        line.push_str(&record.message().as_str_lossy());

        for (key, value) in record.fields().iter() {
            line.push(' ');
            line.push_str(key);
            line.push('=');
            line.push_str(&value.to_string());
        }

        if let Some(trace) = record.trace() {
            line.push_str(" trace=");
            line.push_str(&trace.trace_id);
            line.push('/');
            line.push_str(&trace.span_id);
        }

        if self.with_location {
            if let Some(location) = record.location() {
                line.push_str(" # ");
                line.push_str(&location.to_string());
            }
        }

        line.push('\n');
        line.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Level, Record, TraceContext};

    #[test]
    fn test_formats_level_message_and_fields_in_order() {
        let record = Record::builder(Level::Warning, "disk low")
            .field("free_mb", 12i64)
            .field("mount", "/var")
            .build();
        let formatter = TextFormatter::new().timestamp(false);
        let line = String::from_utf8(formatter.format(&record)).unwrap();
        assert_eq!(line, "[WARNING] disk low free_mb=12 mount=/var\n");
    }

    #[test]
    fn test_category_and_trace_rendered() {
        let record = Record::builder(Level::Info, "ok")
            .category("http")
            .trace(TraceContext::new("t", "s", "c"))
            .build();
        let formatter = TextFormatter::new().timestamp(false);
        let line = String::from_utf8(formatter.format(&record)).unwrap();
        assert_eq!(line, "[INFO] [http] ok trace=t/s\n");
    }

    #[test]
    fn test_empty_message_keeps_full_envelope() {
        let record = Record::new(Level::Info, "");
        let formatter = TextFormatter::new().timestamp(false);
        let line = String::from_utf8(formatter.format(&record)).unwrap();
        assert_eq!(line, "[INFO] \n");
    }

    #[test]
    fn test_applying_twice_yields_identical_bytes() {
        let record = Record::builder(Level::Error, "boom").field("n", 1i64).build();
        let formatter = TextFormatter::new();
        assert_eq!(formatter.format(&record), formatter.format(&record));
    }
}
