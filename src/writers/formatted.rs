//! Formatting decorator: replaces the record's message with the output of
//! a [`Formatter`], leaving every other attribute intact. Lets a chain
//! render once and fan the bytes out to sinks that should not format.

use crate::error::Result;
use crate::format::Formatter;
use crate::record::Record;
use crate::writer::{Writer, decorated_name};

/// Decorator that forwards derived records carrying formatted messages.
pub struct FormattedWriter {
    inner: Box<dyn Writer>,
    formatter: Box<dyn Formatter>,
}

impl FormattedWriter {
    /// Wrap `inner`; each record's message becomes `formatter`'s output.
    pub fn new(inner: Box<dyn Writer>, formatter: Box<dyn Formatter>) -> Self {
        Self { inner, formatter }
    }
}

impl Writer for FormattedWriter {
    fn write(&self, record: &Record) -> Result<()> {
        let rendered = self.formatter.format(record);
        let derived = record.with_message(rendered);
        self.inner.write(&derived)
    }

    fn flush(&self) -> Result<()> {
        self.inner.flush()
    }

    fn healthy(&self) -> bool {
        self.inner.healthy()
    }

    fn name(&self) -> String {
        decorated_name("formatted", self.inner.as_ref())
    }

    fn start(&self) {
        self.inner.start();
    }

    fn stop(&self) -> Result<()> {
        self.inner.stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::TextFormatter;
    use crate::record::{FieldValue, Level};
    use crate::sinks::MemorySink;
    use crate::writer::{SinkWriter, Writer};
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct CapturingWriter {
        records: Mutex<Vec<Record>>,
    }

    impl Writer for CapturingWriter {
        fn write(&self, record: &Record) -> Result<()> {
            self.records.lock().push(record.clone());
            Ok(())
        }

        fn flush(&self) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> String {
            "capture".to_string()
        }
    }

    #[test]
    fn test_message_replaced_fields_preserved() {
        let capture = Arc::new(CapturingWriter { records: Mutex::new(Vec::new()) });
        let formatted = FormattedWriter::new(
            Box::new(Arc::clone(&capture)),
            Box::new(TextFormatter::new().timestamp(false)),
        );

        let record = Record::builder(Level::Info, "raw")
            .field("k", "v")
            .category("c")
            .build();
        formatted.write(&record).unwrap();

        let seen = capture.records.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].message().as_str_lossy(),
            "[INFO] [c] raw k=v\n"
        );
        assert_eq!(seen[0].category(), Some("c"));
        assert_eq!(seen[0].fields().get("k"), Some(&FieldValue::Str("v".to_string())));
        assert_eq!(seen[0].timestamp(), record.timestamp());
    }

    #[test]
    fn test_name_chains_through() {
        let inner = SinkWriter::with_default_format(Box::new(MemorySink::new()));
        let formatted =
            FormattedWriter::new(Box::new(inner), Box::new(TextFormatter::new()));
        assert_eq!(formatted.name(), "formatted_memory");
    }
}
