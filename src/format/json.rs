//! # JSON Formatting Module
//!
//! Newline-delimited JSON records built with serde. Field insertion order
//! is preserved so identical records always serialize to identical bytes.

use serde::Serialize;

use crate::format::{FORMAT_ERROR_SENTINEL, Formatter};
use crate::record::{FieldMap, Record};

/// Serialized shape of one record.
#[derive(Serialize)]
struct JsonRecord<'a> {
    /// ISO 8601 timestamp
    timestamp: String,
    /// Log level name
    level: &'a str,
    /// Message text (lossy UTF-8)
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    span_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<&'a str>,
    #[serde(skip_serializing_if = "fields_empty")]
    fields: &'a FieldMap,
}

fn fields_empty(fields: &&FieldMap) -> bool {
    fields.is_empty()
}

/// NDJSON formatter, one JSON object per line.
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Compact single-line output.
    pub fn new() -> Self {
        Self { pretty: false }
    }

    /// Multi-line indented output (for humans, not for shipping).
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Formatter for JsonFormatter {
    fn format(&self, record: &Record) -> Vec<u8> {
        let shaped = JsonRecord {
            timestamp: record.timestamp().to_rfc3339(),
            level: record.level().as_str(),
            message: record.message().as_str_lossy().into_owned(),
            category: record.category(),
            thread: record.thread_id(),
            file: record.location().map(|l| l.file),
            line: record.location().map(|l| l.line),
            trace_id: record.trace().map(|t| t.trace_id.as_str()),
            span_id: record.trace().map(|t| t.span_id.as_str()),
            correlation_id: record.trace().map(|t| t.correlation_id.as_str()),
            fields: record.fields(),
        };

        let rendered = if self.pretty {
            serde_json::to_vec_pretty(&shaped)
        } else {
            serde_json::to_vec(&shaped)
        };

        match rendered {
            Ok(mut bytes) => {
                bytes.push(b'\n');
                bytes
            }
            Err(_) => FORMAT_ERROR_SENTINEL.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Level, Record};

    #[test]
    fn test_compact_output_parses_back() {
        let record = Record::builder(Level::Info, "login")
            .category("auth")
            .field("user", "alice")
            .field("attempt", 2i64)
            .build();
        let bytes = JsonFormatter::new().format(&record);
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["level"], "INFO");
        assert_eq!(value["message"], "login");
        assert_eq!(value["category"], "auth");
        assert_eq!(value["fields"]["user"], "alice");
        assert_eq!(value["fields"]["attempt"], 2);
    }

    #[test]
    fn test_field_order_is_stable_in_output() {
        let record = Record::builder(Level::Debug, "x")
            .field("zeta", 1i64)
            .field("alpha", 2i64)
            .build();
        let text = String::from_utf8(JsonFormatter::new().format(&record)).unwrap();
        let zeta = text.find("\"zeta\"").unwrap();
        let alpha = text.find("\"alpha\"").unwrap();
        assert!(zeta < alpha, "insertion order must survive serialization");
    }

    #[test]
    fn test_deterministic_for_identical_input() {
        let record = Record::builder(Level::Error, "boom").field("n", 7i64).build();
        let formatter = JsonFormatter::new();
        assert_eq!(formatter.format(&record), formatter.format(&record));
    }

    #[test]
    fn test_empty_fields_key_omitted() {
        let record = Record::new(Level::Info, "bare");
        let value: serde_json::Value =
            serde_json::from_slice(&JsonFormatter::new().format(&record)).unwrap();
        assert!(value.get("fields").is_none());
    }

    #[test]
    fn test_pretty_output_is_multiline() {
        let record = Record::new(Level::Info, "spaced");
        let bytes = JsonFormatter::pretty().format(&record);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.trim_end().contains('\n'));
    }
}
