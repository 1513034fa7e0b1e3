//! In-memory sink capturing formatted lines. The workhorse of the test
//! suite and a convenient target for examples.

use parking_lot::Mutex;

use crate::error::Result;
use crate::writer::Sink;

/// Sink that stores every delivered byte sequence.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<Vec<u8>>>,
}

impl MemorySink {
    /// Create an empty capture sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of captured writes.
    pub fn line_count(&self) -> usize {
        self.lines.lock().len()
    }

    /// Captured writes as lossy UTF-8 strings, trailing newline removed.
    pub fn lines_utf8(&self) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .map(|bytes| {
                String::from_utf8_lossy(bytes)
                    .trim_end_matches('\n')
                    .to_string()
            })
            .collect()
    }

    /// Raw captured writes.
    pub fn raw_lines(&self) -> Vec<Vec<u8>> {
        self.lines.lock().clone()
    }

    /// Drop everything captured so far.
    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl Sink for MemorySink {
    fn write_raw(&self, bytes: &[u8]) -> Result<()> {
        self.lines.lock().push(bytes.to_vec());
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn healthy(&self) -> bool {
        true
    }

    fn name(&self) -> String {
        "memory".to_string()
    }
}
