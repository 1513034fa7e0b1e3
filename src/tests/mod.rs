// Integration-style tests over assembled pipelines: front door, routing,
// decorator chains, rotation and the durable critical path.

mod critical_tests;
mod router_tests;

use parking_lot::Mutex;

use crate::error::Result;
use crate::record::Record;
use crate::writer::Writer;

/// Test writer capturing whole records so field maps and ordering can be
/// inspected after the context merge.
#[derive(Default)]
pub(crate) struct CapturingWriter {
    records: Mutex<Vec<Record>>,
    flushes: Mutex<usize>,
}

impl CapturingWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    pub(crate) fn flush_count(&self) -> usize {
        *self.flushes.lock()
    }
}

impl Writer for CapturingWriter {
    fn write(&self, record: &Record) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        *self.flushes.lock() += 1;
        Ok(())
    }

    fn name(&self) -> String {
        "capture".to_string()
    }
}
