//! # Buffered Writer
//!
//! Coalesces many small records into one downstream pass. Records are
//! appended to a mutex-guarded buffer and drained in insertion order when
//! the buffer reaches `max_entries` or the oldest entry reaches
//! `flush_interval` in age.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::record::Record;
use crate::writer::{Writer, decorated_name};

/// Counters kept by a [`BufferedWriter`].
#[derive(Debug, Default)]
pub struct BufferedStats {
    /// Records accepted into the buffer
    pub total_entries: AtomicU64,
    /// Drains triggered by the buffer filling up
    pub flush_on_full: AtomicU64,
    /// Drains triggered by entry age
    pub flush_on_interval: AtomicU64,
    /// Drains requested through `flush()`
    pub manual_flushes: AtomicU64,
    /// Errors swallowed while draining on drop
    pub drop_errors: AtomicU64,
}

struct Buffer {
    entries: Vec<Record>,
    oldest_at: Option<Instant>,
    pending_downstream_flush: bool,
}

/// Decorator that batches records before its inner writer sees them.
pub struct BufferedWriter {
    inner: Box<dyn Writer>,
    max_entries: usize,
    flush_interval: Duration,
    buffer: Mutex<Buffer>,
    stats: BufferedStats,
}

impl BufferedWriter {
    /// Wrap `inner`, draining every `max_entries` records or whenever the
    /// oldest buffered record is `flush_interval` old. A zero interval
    /// disables the age trigger.
    ///
    /// Fails with `InvalidArgument` when `max_entries` is zero.
    pub fn new(
        inner: Box<dyn Writer>,
        max_entries: usize,
        flush_interval: Duration,
    ) -> Result<Self> {
        if max_entries == 0 {
            return Err(Error::InvalidArgument(
                "buffered writer: max_entries must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            inner,
            max_entries,
            flush_interval,
            buffer: Mutex::new(Buffer {
                entries: Vec::with_capacity(max_entries),
                oldest_at: None,
                pending_downstream_flush: false,
            }),
            stats: BufferedStats::default(),
        })
    }

    /// Number of records currently buffered.
    pub fn buffered_count(&self) -> usize {
        self.buffer.lock().entries.len()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> &BufferedStats {
        &self.stats
    }

    fn age_exceeded(&self, buffer: &Buffer) -> bool {
        if self.flush_interval.is_zero() {
            return false;
        }
        buffer
            .oldest_at
            .map(|at| at.elapsed() >= self.flush_interval)
            .unwrap_or(false)
    }

    /// Drain the buffer into the inner writer in insertion order.
    ///
    /// On a downstream error the buffer is cleared anyway so the same
    /// records are not retried forever.
    fn drain_locked(&self, buffer: &mut Buffer) -> Result<()> {
        if buffer.entries.is_empty() {
            return Ok(());
        }
        let entries = std::mem::take(&mut buffer.entries);
        buffer.oldest_at = None;
        buffer.pending_downstream_flush = true;
        for record in &entries {
            self.inner.write(record)?;
        }
        Ok(())
    }

    fn flush_downstream_locked(&self, buffer: &mut Buffer) -> Result<()> {
        if buffer.pending_downstream_flush {
            self.inner.flush()?;
            buffer.pending_downstream_flush = false;
        }
        Ok(())
    }
}

impl Writer for BufferedWriter {
    fn write(&self, record: &Record) -> Result<()> {
        let mut buffer = self.buffer.lock();
        if buffer.entries.is_empty() {
            buffer.oldest_at = Some(Instant::now());
        }
        buffer.entries.push(record.clone());
        self.stats.total_entries.fetch_add(1, Ordering::Relaxed);

        if buffer.entries.len() >= self.max_entries {
            self.stats.flush_on_full.fetch_add(1, Ordering::Relaxed);
            self.drain_locked(&mut buffer)?;
            self.flush_downstream_locked(&mut buffer)?;
        } else if self.age_exceeded(&buffer) {
            self.stats.flush_on_interval.fetch_add(1, Ordering::Relaxed);
            self.drain_locked(&mut buffer)?;
            self.flush_downstream_locked(&mut buffer)?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut buffer = self.buffer.lock();
        if !buffer.entries.is_empty() {
            self.stats.manual_flushes.fetch_add(1, Ordering::Relaxed);
        }
        self.drain_locked(&mut buffer)?;
        self.flush_downstream_locked(&mut buffer)
    }

    fn healthy(&self) -> bool {
        self.inner.healthy()
    }

    fn name(&self) -> String {
        decorated_name("buffered", self.inner.as_ref())
    }

    fn start(&self) {
        self.inner.start();
    }

    fn stop(&self) -> Result<()> {
        self.flush()?;
        self.inner.stop()
    }
}

impl Drop for BufferedWriter {
    fn drop(&mut self) {
        // Errors cannot be reported from here; count them instead.
        let mut buffer = self.buffer.lock();
        if self.drain_locked(&mut buffer).is_err() {
            self.stats.drop_errors.fetch_add(1, Ordering::Relaxed);
        }
        if self.flush_downstream_locked(&mut buffer).is_err() {
            self.stats.drop_errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}
