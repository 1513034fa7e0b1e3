//! # Critical Writer
//!
//! Severity-split router with a durable synchronous escape: records below
//! the critical threshold take the normal (usually async) path, records
//! at or above it bypass every queue and go straight to stable storage.
//!
//! The critical sequence is WAL append + fsync, synchronous sink write,
//! sink fsync, then WAL watermark advance. Once `write()` returns success
//! for a critical record, the record is observable in the main sink or in
//! the WAL whatever happens to the process afterwards. The whole sequence
//! is bounded by `critical_write_timeout_ms`; the deadline is checked
//! between stages, so a stage already blocked in a syscall is not
//! interrupted.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, bounded};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::record::{Level, Record};
use crate::signal::{self, CriticalRegistration};
use crate::wal::WriteAheadLog;
use crate::writer::{Writer, decorated_name};

/// Configuration of a [`CriticalWriter`].
#[derive(Debug, Clone)]
pub struct CriticalConfig {
    /// Severity at or above which the synchronous path is taken.
    pub critical_threshold: Level,
    /// Flush the normal path after every critical write, draining queued
    /// sub-critical records while the process still can.
    pub force_flush_on_critical: bool,
    /// Flush the normal path after error-level writes too.
    pub force_flush_on_error: bool,
    /// Register durable descriptors with the process crash adapter.
    pub enable_signal_handlers: bool,
    /// Stage critical records in a write-ahead log before the sink write.
    pub write_ahead_log: bool,
    /// Location of the WAL; required when `write_ahead_log` is on.
    pub wal_path: Option<PathBuf>,
    /// Fsync the critical sink after each critical write.
    pub sync_on_critical: bool,
    /// Upper bound on the entire critical write path, milliseconds.
    pub critical_write_timeout_ms: u32,
}

impl Default for CriticalConfig {
    fn default() -> Self {
        Self {
            critical_threshold: Level::Critical,
            force_flush_on_critical: true,
            force_flush_on_error: false,
            enable_signal_handlers: true,
            write_ahead_log: false,
            wal_path: None,
            sync_on_critical: true,
            critical_write_timeout_ms: 5000,
        }
    }
}

/// Counters kept by a [`CriticalWriter`].
#[derive(Debug, Default)]
pub struct CriticalStats {
    /// Records that took the synchronous path
    pub critical_writes: AtomicU64,
    /// Frames staged in the WAL
    pub wal_appends: AtomicU64,
    /// Records replayed from the WAL at startup
    pub wal_replayed: AtomicU64,
    /// Critical writes that overran their deadline
    pub deadline_overruns: AtomicU64,
    /// Normal-path flushes performed by the auto-flush ticker
    pub auto_flushes: AtomicU64,
}

struct AutoFlush {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

/// Hybrid writer guaranteeing durability for critical-severity records.
pub struct CriticalWriter {
    config: CriticalConfig,
    normal: Arc<dyn Writer>,
    critical: Box<dyn Writer>,
    wal: Option<WriteAheadLog>,
    registrations: Mutex<Vec<CriticalRegistration>>,
    auto_flush: Mutex<Option<AutoFlush>>,
    /// Shared with the auto-flush ticker thread.
    stats: Arc<CriticalStats>,
}

impl CriticalWriter {
    /// Build the split: `normal` receives sub-threshold records (usually
    /// an async chain), `critical` is the synchronous durable path.
    ///
    /// When the WAL is enabled, frames left over from a previous run are
    /// replayed into the critical path right here, before any new record
    /// is accepted. Fails with `InvalidArgument` when the WAL is enabled
    /// without a path.
    pub fn new(
        normal: Box<dyn Writer>,
        critical: Box<dyn Writer>,
        config: CriticalConfig,
    ) -> Result<Self> {
        let wal = if config.write_ahead_log {
            let path = config.wal_path.clone().ok_or_else(|| {
                Error::InvalidArgument(
                    "critical writer: wal_path is required when write_ahead_log is enabled"
                        .to_string(),
                )
            })?;
            Some(WriteAheadLog::open(path)?)
        } else {
            None
        };

        let writer = Self {
            config,
            normal: Arc::from(normal),
            critical,
            wal,
            registrations: Mutex::new(Vec::new()),
            auto_flush: Mutex::new(None),
            stats: Arc::new(CriticalStats::default()),
        };

        if let Some(wal) = &writer.wal {
            let replayed = wal.replay(writer.critical.as_ref())?;
            writer
                .stats
                .wal_replayed
                .store(replayed as u64, Ordering::Relaxed);
        }

        if writer.config.enable_signal_handlers {
            signal::install_handlers()?;
            if let Some(wal) = &writer.wal {
                if let Some(registration) = signal::register_descriptor(wal.descriptor()) {
                    writer.registrations.lock().push(registration);
                }
            }
        }

        Ok(writer)
    }

    /// Track an additional durable descriptor (e.g. the critical sink's
    /// file) for emergency fsync on abnormal termination.
    pub fn register_descriptor(&self, fd: std::os::unix::io::RawFd) {
        if !self.config.enable_signal_handlers {
            return;
        }
        if let Some(registration) = signal::register_descriptor(fd) {
            self.registrations.lock().push(registration);
        }
    }

    /// Counter snapshot.
    pub fn stats(&self) -> &CriticalStats {
        &self.stats
    }

    /// Periodically flush the normal path, bounding the data at risk
    /// between crashes. Zero disables the ticker.
    pub fn set_auto_flush_interval(&self, interval: Duration) {
        let mut slot = self.auto_flush.lock();
        if let Some(active) = slot.take() {
            let _ = active.shutdown.send(());
            let _ = active.handle.join();
        }
        if interval.is_zero() {
            return;
        }

        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let normal = Arc::clone(&self.normal);
        let stats = Arc::clone(&self.stats);
        let handle = std::thread::spawn(move || {
            loop {
                match shutdown_rx.recv_timeout(interval) {
                    Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                        let _ = normal.flush();
                        stats.auto_flushes.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        });
        *slot = Some(AutoFlush { shutdown: shutdown_tx, handle });
    }

    fn deadline_check(&self, deadline: Instant) -> Result<()> {
        if Instant::now() > deadline {
            self.stats.deadline_overruns.fetch_add(1, Ordering::Relaxed);
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "critical write exceeded its configured deadline",
            )));
        }
        Ok(())
    }

    fn write_critical(&self, record: &Record) -> Result<()> {
        self.stats.critical_writes.fetch_add(1, Ordering::Relaxed);
        let deadline =
            Instant::now() + Duration::from_millis(self.config.critical_write_timeout_ms as u64);

        let staged_offset = match &self.wal {
            Some(wal) => {
                let offset = wal.append(record)?;
                self.stats.wal_appends.fetch_add(1, Ordering::Relaxed);
                self.deadline_check(deadline)?;
                Some(offset)
            }
            None => None,
        };

        self.critical.write(record)?;
        self.deadline_check(deadline)?;

        if self.config.sync_on_critical {
            self.critical.flush()?;
            self.deadline_check(deadline)?;
        }

        if let (Some(wal), Some(offset)) = (&self.wal, staged_offset) {
            wal.mark_consumed(offset)?;
        }

        if self.config.force_flush_on_critical {
            self.normal.flush()?;
        }
        Ok(())
    }
}

impl Writer for CriticalWriter {
    fn write(&self, record: &Record) -> Result<()> {
        if record.level() < self.config.critical_threshold {
            self.normal.write(record)?;
            if self.config.force_flush_on_error && record.level() >= Level::Error {
                self.normal.flush()?;
            }
            return Ok(());
        }
        self.write_critical(record)
    }

    fn flush(&self) -> Result<()> {
        let normal = self.normal.flush();
        let critical = self.critical.flush();
        normal.and(critical)
    }

    fn healthy(&self) -> bool {
        self.normal.healthy() && self.critical.healthy()
    }

    fn name(&self) -> String {
        decorated_name("critical", self.normal.as_ref())
    }

    fn start(&self) {
        self.normal.start();
        self.critical.start();
    }

    fn stop(&self) -> Result<()> {
        self.set_auto_flush_interval(Duration::ZERO);
        let normal = self.normal.stop();
        let critical = self.critical.stop();
        self.registrations.lock().clear();
        normal.and(critical)
    }
}

impl Drop for CriticalWriter {
    fn drop(&mut self) {
        self.set_auto_flush_interval(Duration::ZERO);
    }
}
