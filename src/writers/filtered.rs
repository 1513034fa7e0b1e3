//! Filtering decorator: applies a [`Filter`] in-chain. A rejected record
//! is not an error; the write reports success without touching the inner
//! writer.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::filter::Filter;
use crate::record::Record;
use crate::writer::{Writer, decorated_name};

/// Decorator that forwards only records accepted by its filter.
pub struct FilteredWriter {
    inner: Box<dyn Writer>,
    filter: Box<dyn Filter>,
    passed: AtomicU64,
    rejected: AtomicU64,
}

impl FilteredWriter {
    /// Wrap `inner` behind `filter`.
    pub fn new(inner: Box<dyn Writer>, filter: Box<dyn Filter>) -> Self {
        Self {
            inner,
            filter,
            passed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Records forwarded downstream.
    pub fn passed(&self) -> u64 {
        self.passed.load(Ordering::Relaxed)
    }

    /// Records silently dropped by the filter.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

impl Writer for FilteredWriter {
    fn write(&self, record: &Record) -> Result<()> {
        if !self.filter.accepts(record) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        self.passed.fetch_add(1, Ordering::Relaxed);
        self.inner.write(record)
    }

    fn flush(&self) -> Result<()> {
        self.inner.flush()
    }

    fn healthy(&self) -> bool {
        self.inner.healthy()
    }

    fn name(&self) -> String {
        decorated_name("filtered", self.inner.as_ref())
    }

    fn start(&self) {
        self.inner.start();
    }

    fn stop(&self) -> Result<()> {
        self.inner.stop()
    }
}
