//! # Batch Writer
//!
//! Worker-side coalescing: positioned downstream of the async boundary so
//! the single consumer can turn many records into batched I/O without
//! ever blocking producers. Drains on a size or age threshold.
//!
//! Unlike the buffered decorator, a batch keeps going past per-entry
//! errors: failed entries are counted and the last error is reported
//! after the whole batch has been attempted.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::record::Record;
use crate::writer::{Writer, decorated_name};

/// Configuration of a [`BatchWriter`].
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    /// Records per batch before a drain is forced.
    pub max_batch_size: usize,
    /// Age of the oldest batched record before a drain is forced;
    /// zero disables the age trigger.
    pub max_batch_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_batch_size: 64, max_batch_delay: Duration::from_millis(250) }
    }
}

/// Counters kept by a [`BatchWriter`].
#[derive(Debug, Default)]
pub struct BatchStats {
    /// Records accepted
    pub total_entries: AtomicU64,
    /// Batches delivered downstream
    pub total_batches: AtomicU64,
    /// Drains triggered by batch size
    pub flush_on_size: AtomicU64,
    /// Drains triggered by batch age
    pub flush_on_interval: AtomicU64,
    /// Drains requested through `flush()`
    pub manual_flushes: AtomicU64,
    /// Entries that failed downstream inside a batch
    pub dropped_entries: AtomicU64,
}

struct BatchState {
    entries: Vec<Record>,
    oldest_at: Option<Instant>,
}

/// Decorator that groups records into batches for its inner writer.
pub struct BatchWriter {
    inner: Box<dyn Writer>,
    config: BatchConfig,
    state: Mutex<BatchState>,
    shutting_down: AtomicBool,
    stats: BatchStats,
}

impl BatchWriter {
    /// Wrap `inner`. Fails with `InvalidArgument` when `max_batch_size`
    /// is zero.
    pub fn new(inner: Box<dyn Writer>, config: BatchConfig) -> Result<Self> {
        if config.max_batch_size == 0 {
            return Err(Error::InvalidArgument(
                "batch writer: max_batch_size must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            inner,
            config,
            state: Mutex::new(BatchState {
                entries: Vec::with_capacity(config.max_batch_size),
                oldest_at: None,
            }),
            shutting_down: AtomicBool::new(false),
            stats: BatchStats::default(),
        })
    }

    /// Records currently waiting in the open batch.
    pub fn current_batch_size(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }

    fn age_exceeded(&self, state: &BatchState) -> bool {
        if self.config.max_batch_delay.is_zero() {
            return false;
        }
        state
            .oldest_at
            .map(|at| at.elapsed() >= self.config.max_batch_delay)
            .unwrap_or(false)
    }

    fn drain_locked(&self, state: &mut BatchState) -> Result<()> {
        if state.entries.is_empty() {
            return Ok(());
        }
        let entries = std::mem::take(&mut state.entries);
        state.oldest_at = None;

        let mut last_error = None;
        for record in &entries {
            if let Err(err) = self.inner.write(record) {
                self.stats.dropped_entries.fetch_add(1, Ordering::Relaxed);
                last_error = Some(err);
            }
        }
        if let Err(err) = self.inner.flush() {
            if last_error.is_none() {
                last_error = Some(err);
            }
        }
        self.stats.total_batches.fetch_add(1, Ordering::Relaxed);

        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Writer for BatchWriter {
    fn write(&self, record: &Record) -> Result<()> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(Error::QueueStopped);
        }
        let mut state = self.state.lock();
        if state.entries.is_empty() {
            state.oldest_at = Some(Instant::now());
        }
        state.entries.push(record.clone());
        self.stats.total_entries.fetch_add(1, Ordering::Relaxed);

        if state.entries.len() >= self.config.max_batch_size {
            self.stats.flush_on_size.fetch_add(1, Ordering::Relaxed);
            return self.drain_locked(&mut state);
        }
        if self.age_exceeded(&state) {
            self.stats.flush_on_interval.fetch_add(1, Ordering::Relaxed);
            return self.drain_locked(&mut state);
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.entries.is_empty() {
            self.stats.manual_flushes.fetch_add(1, Ordering::Relaxed);
        }
        self.drain_locked(&mut state)
    }

    fn healthy(&self) -> bool {
        !self.shutting_down.load(Ordering::Acquire) && self.inner.healthy()
    }

    fn name(&self) -> String {
        decorated_name("batch", self.inner.as_ref())
    }

    fn start(&self) {
        self.inner.start();
    }

    fn stop(&self) -> Result<()> {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut state = self.state.lock();
        let drained = self.drain_locked(&mut state);
        drop(state);
        let stopped = self.inner.stop();
        drained.and(stopped)
    }
}

impl Drop for BatchWriter {
    fn drop(&mut self) {
        // Entry failures are already counted inside drain_locked.
        let mut state = self.state.lock();
        let _ = self.drain_locked(&mut state);
    }
}
