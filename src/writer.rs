//! # Writer & Sink Interfaces
//!
//! The two trait seams of the pipeline: [`Writer`] is the record-level
//! interface every decorator and chain head implements; [`Sink`] is the
//! byte-level terminal a chain ends in. [`SinkWriter`] bridges the two by
//! pairing a sink with a formatter.
//!
//! Decorators own their inner writer exclusively; ownership transfers at
//! construction and the chain is sealed once registered with the logger.
//! Health propagates top-down: asking the head of a chain traverses to
//! the sink, so no back-references are needed.

use std::os::unix::io::RawFd;

use crate::error::Result;
use crate::format::Formatter;
use crate::record::Record;

/// Record-level writer: decorators and chain heads.
///
/// Implementations are internally synchronized (`&self` methods callable
/// from any producer thread); decorators that cross a thread boundary
/// guarantee the wrapped writer is only reached on their single worker
/// thread.
pub trait Writer: Send + Sync {
    /// Deliver one record.
    ///
    /// Success means the record has been handed to the OS or to the
    /// downstream writer; failure is classified by [`crate::Error`] kind.
    fn write(&self, record: &Record) -> Result<()>;

    /// Block until all previously accepted records are committed
    /// according to the terminal sink's durability promise.
    fn flush(&self) -> Result<()>;

    /// Observational health. A `false` reading does not imply the next
    /// write will fail.
    fn healthy(&self) -> bool {
        true
    }

    /// Identifier used for routing and diagnostics. Decorators prefix
    /// their tag so the whole chain is visible: `async_buffered_file`.
    fn name(&self) -> String;

    /// Start any worker threads this writer (or its chain) owns.
    /// Idempotent; the default does nothing.
    fn start(&self) {}

    /// Transition to draining, deliver what is pending, join workers.
    /// Idempotent; the default does nothing.
    fn stop(&self) -> Result<()> {
        Ok(())
    }
}

/// Byte-level terminal sink.
pub trait Sink: Send + Sync {
    /// Deliver formatted bytes.
    fn write_raw(&self, bytes: &[u8]) -> Result<()>;

    /// Commit previously accepted bytes to stable storage (fsync for
    /// file-backed sinks).
    fn flush(&self) -> Result<()>;

    /// Observational health.
    fn healthy(&self) -> bool;

    /// Identifier used for diagnostics.
    fn name(&self) -> String;

    /// Raw file descriptor for the crash adapter, when the sink is
    /// file-backed. The default reports none.
    fn descriptor(&self) -> Option<RawFd> {
        None
    }
}

impl<W: Writer + ?Sized> Writer for std::sync::Arc<W> {
    fn write(&self, record: &Record) -> Result<()> {
        (**self).write(record)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }

    fn healthy(&self) -> bool {
        (**self).healthy()
    }

    fn name(&self) -> String {
        (**self).name()
    }

    fn start(&self) {
        (**self).start()
    }

    fn stop(&self) -> Result<()> {
        (**self).stop()
    }
}

impl<S: Sink + ?Sized> Sink for std::sync::Arc<S> {
    fn write_raw(&self, bytes: &[u8]) -> Result<()> {
        (**self).write_raw(bytes)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }

    fn healthy(&self) -> bool {
        (**self).healthy()
    }

    fn name(&self) -> String {
        (**self).name()
    }

    fn descriptor(&self) -> Option<RawFd> {
        (**self).descriptor()
    }
}

/// Compose a decorator name: `<tag>_<inner name>`.
pub(crate) fn decorated_name(tag: &str, inner: &dyn Writer) -> String {
    format!("{}_{}", tag, inner.name())
}

/// Adapter that turns a [`Sink`] into a [`Writer`] by formatting each
/// record before handing the bytes down.
pub struct SinkWriter {
    sink: Box<dyn Sink>,
    formatter: Box<dyn Formatter>,
}

impl SinkWriter {
    /// Pair a sink with a formatter.
    pub fn new(sink: Box<dyn Sink>, formatter: Box<dyn Formatter>) -> Self {
        Self { sink, formatter }
    }

    /// Pair a sink with the default text formatter.
    pub fn with_default_format(sink: Box<dyn Sink>) -> Self {
        Self { sink, formatter: Box::new(crate::format::TextFormatter::new()) }
    }

    /// The wrapped sink.
    pub fn sink(&self) -> &dyn Sink {
        self.sink.as_ref()
    }
}

impl Writer for SinkWriter {
    fn write(&self, record: &Record) -> Result<()> {
        let bytes = self.formatter.format(record);
        self.sink.write_raw(&bytes)
    }

    fn flush(&self) -> Result<()> {
        self.sink.flush()
    }

    fn healthy(&self) -> bool {
        self.sink.healthy()
    }

    fn name(&self) -> String {
        self.sink.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::TextFormatter;
    use crate::record::Level;
    use crate::sinks::MemorySink;
    use std::sync::Arc;

    #[test]
    fn test_sink_writer_formats_then_delivers() {
        let sink = Arc::new(MemorySink::new());
        let writer = SinkWriter::new(
            Box::new(Arc::clone(&sink)),
            Box::new(TextFormatter::new()),
        );

        writer.write(&Record::new(Level::Info, "hello")).unwrap();
        writer.flush().unwrap();

        let lines = sink.lines_utf8();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("INFO"));
        assert!(lines[0].contains("hello"));
    }

    #[test]
    fn test_sink_writer_exposes_sink_identity() {
        let writer = SinkWriter::with_default_format(Box::new(MemorySink::new()));
        assert_eq!(writer.name(), "memory");
        assert!(writer.healthy());
    }
}
