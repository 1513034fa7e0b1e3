//! # Async Writer
//!
//! The concurrency hub of the pipeline: decouples producers from slow
//! sinks with a bounded FIFO queue served by one dedicated worker thread.
//!
//! ## Features
//!
//! - Bounded queue with block / drop-newest / drop-oldest overflow
//! - Per-producer FIFO ordering across the thread boundary
//! - Condition-variable wake-ups, batched pops on the worker
//! - Cooperative flush: the caller parks until the queue is empty and the
//!   downstream flush has returned
//! - Worker failures never reach producers; consecutive failures toggle
//!   health instead

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Sender, bounded};
use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};
use crate::record::Record;
use crate::writer::Writer;

/// Worker drains at most this many queue entries per lock acquisition.
const WORKER_BATCH_LIMIT: usize = 32;

/// Consecutive inner-write failures before the writer reports unhealthy.
const FAILURE_HEALTH_THRESHOLD: u32 = 5;

/// Behavior when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Park the producer until space is available or `stop()` is called.
    Block,
    /// Count and discard the incoming record; the write reports success.
    DropNewest,
    /// Discard the oldest queued record to admit the new one.
    DropOldest,
}

/// Configuration of an [`AsyncWriter`].
#[derive(Debug, Clone, Copy)]
pub struct AsyncConfig {
    /// Maximum number of queued records; hard memory cap per decorator.
    pub queue_capacity: usize,
    /// Behavior when the queue is full.
    pub overflow_policy: OverflowPolicy,
}

impl Default for AsyncConfig {
    fn default() -> Self {
        Self { queue_capacity: 8192, overflow_policy: OverflowPolicy::Block }
    }
}

/// Counter snapshot of an [`AsyncWriter`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AsyncStats {
    /// Records accepted into the queue
    pub enqueued: u64,
    /// Records delivered to the inner writer
    pub written: u64,
    /// Records discarded by an overflow policy
    pub dropped: u64,
    /// Inner write failures observed by the worker
    pub write_failures: u64,
    /// Records currently queued
    pub pending: usize,
    /// Queue wait of the most recently dequeued record, microseconds
    pub last_queue_wait_micros: u64,
}

enum Envelope {
    Entry { record: Record, enqueued_at: Instant },
    FlushMarker(Sender<Result<()>>),
}

struct QueueState {
    entries: VecDeque<Envelope>,
    /// Number of `Entry` envelopes; markers do not count against capacity.
    records: usize,
}

const STATE_CREATED: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPING: u8 = 2;
const STATE_STOPPED: u8 = 3;

struct Shared {
    queue: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    policy: OverflowPolicy,
    state: AtomicU8,
    enqueued: AtomicU64,
    written: AtomicU64,
    dropped: AtomicU64,
    write_failures: AtomicU64,
    consecutive_failures: AtomicU32,
    degraded: AtomicBool,
    last_queue_wait_micros: AtomicU64,
    /// Reached only by the worker while running; by the caller thread for
    /// pre-start and shutdown draining.
    inner: Mutex<Box<dyn Writer>>,
}

impl Shared {
    fn run_state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    fn deliver(&self, envelope: Envelope, inner: &dyn Writer) {
        match envelope {
            Envelope::Entry { record, enqueued_at } => {
                self.last_queue_wait_micros
                    .store(enqueued_at.elapsed().as_micros() as u64, Ordering::Relaxed);
                match inner.write(&record) {
                    Ok(()) => {
                        self.written.fetch_add(1, Ordering::Relaxed);
                        self.consecutive_failures.store(0, Ordering::Relaxed);
                        self.degraded.store(false, Ordering::Relaxed);
                    }
                    Err(_) => {
                        self.write_failures.fetch_add(1, Ordering::Relaxed);
                        let run = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                        if run >= FAILURE_HEALTH_THRESHOLD {
                            self.degraded.store(true, Ordering::Relaxed);
                        }
                    }
                }
            }
            Envelope::FlushMarker(ack) => {
                let _ = ack.send(inner.flush());
            }
        }
    }

    fn worker_loop(&self) {
        loop {
            let mut queue = self.queue.lock();
            while queue.entries.is_empty() {
                if self.run_state() == STATE_STOPPING {
                    return;
                }
                self.not_empty.wait(&mut queue);
            }

            let mut batch = Vec::with_capacity(WORKER_BATCH_LIMIT);
            while batch.len() < WORKER_BATCH_LIMIT {
                match queue.entries.pop_front() {
                    Some(envelope) => {
                        if matches!(envelope, Envelope::Entry { .. }) {
                            queue.records -= 1;
                        }
                        batch.push(envelope);
                    }
                    None => break,
                }
            }
            drop(queue);
            self.not_full.notify_all();

            let inner = self.inner.lock();
            for envelope in batch {
                self.deliver(envelope, inner.as_ref());
            }
        }
    }

    /// Drain everything on the calling thread. Used before the worker
    /// exists and after it has been joined.
    fn drain_inline(&self) -> Result<()> {
        loop {
            let mut queue = self.queue.lock();
            if queue.entries.is_empty() {
                return Ok(());
            }
            let mut batch = Vec::with_capacity(queue.entries.len());
            while let Some(envelope) = queue.entries.pop_front() {
                if matches!(envelope, Envelope::Entry { .. }) {
                    queue.records -= 1;
                }
                batch.push(envelope);
            }
            drop(queue);
            self.not_full.notify_all();
            let inner = self.inner.lock();
            for envelope in batch {
                self.deliver(envelope, inner.as_ref());
            }
        }
    }
}

/// Decorator that transfers records across a thread boundary.
///
/// Ordering: records accepted from one producer thread reach the inner
/// writer in the order they were written; cross-thread order is the
/// enqueue order into the queue.
pub struct AsyncWriter {
    shared: Arc<Shared>,
    name: String,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncWriter {
    /// Wrap `inner` behind a bounded queue.
    ///
    /// Fails with `InvalidArgument` when `queue_capacity` is zero. The
    /// worker thread starts on [`Writer::start`]; records written before
    /// that are queued (or drained inline by `flush`).
    pub fn new(inner: Box<dyn Writer>, config: AsyncConfig) -> Result<Self> {
        if config.queue_capacity == 0 {
            return Err(Error::InvalidArgument(
                "async writer: queue_capacity must be >= 1".to_string(),
            ));
        }
        let name = crate::writer::decorated_name("async", inner.as_ref());
        Ok(Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(QueueState {
                    entries: VecDeque::with_capacity(config.queue_capacity.min(4096)),
                    records: 0,
                }),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                capacity: config.queue_capacity,
                policy: config.overflow_policy,
                state: AtomicU8::new(STATE_CREATED),
                enqueued: AtomicU64::new(0),
                written: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                write_failures: AtomicU64::new(0),
                consecutive_failures: AtomicU32::new(0),
                degraded: AtomicBool::new(false),
                last_queue_wait_micros: AtomicU64::new(0),
                inner: Mutex::new(inner),
            }),
            name,
            worker: Mutex::new(None),
        })
    }

    /// Records waiting in the queue.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().records
    }

    /// Records discarded by the overflow policy so far.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Counter snapshot.
    pub fn stats(&self) -> AsyncStats {
        AsyncStats {
            enqueued: self.shared.enqueued.load(Ordering::Relaxed),
            written: self.shared.written.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            write_failures: self.shared.write_failures.load(Ordering::Relaxed),
            pending: self.pending(),
            last_queue_wait_micros: self.shared.last_queue_wait_micros.load(Ordering::Relaxed),
        }
    }

    /// Non-blocking write probe: enqueue if there is room, otherwise
    /// report `QueueFull` without consulting the overflow policy.
    pub fn try_write(&self, record: &Record) -> Result<()> {
        if self.shared.run_state() >= STATE_STOPPING {
            return Err(Error::QueueStopped);
        }
        let mut queue = self.shared.queue.lock();
        if queue.records >= self.shared.capacity {
            return Err(Error::QueueFull);
        }
        self.enqueue_locked(&mut queue, record);
        drop(queue);
        self.shared.not_empty.notify_one();
        Ok(())
    }

    fn enqueue_locked(&self, queue: &mut QueueState, record: &Record) {
        queue.entries.push_back(Envelope::Entry {
            record: record.clone(),
            enqueued_at: Instant::now(),
        });
        queue.records += 1;
        self.shared.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Evict the oldest queued record, skipping flush markers so a
    /// pending acknowledgement can never be lost to overflow.
    fn evict_oldest_locked(&self, queue: &mut QueueState) {
        if let Some(idx) = queue
            .entries
            .iter()
            .position(|e| matches!(e, Envelope::Entry { .. }))
        {
            queue.entries.remove(idx);
            queue.records -= 1;
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Writer for AsyncWriter {
    fn write(&self, record: &Record) -> Result<()> {
        if self.shared.run_state() >= STATE_STOPPING {
            return Err(Error::QueueStopped);
        }

        let mut queue = self.shared.queue.lock();
        if queue.records >= self.shared.capacity {
            match self.shared.policy {
                OverflowPolicy::Block => {
                    while queue.records >= self.shared.capacity {
                        if self.shared.run_state() >= STATE_STOPPING {
                            return Err(Error::QueueStopped);
                        }
                        self.shared.not_full.wait(&mut queue);
                        if self.shared.run_state() >= STATE_STOPPING {
                            return Err(Error::QueueStopped);
                        }
                    }
                }
                OverflowPolicy::DropNewest => {
                    // The record is lost; this is the caller's choice.
                    self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                OverflowPolicy::DropOldest => {
                    self.evict_oldest_locked(&mut queue);
                }
            }
        }

        self.enqueue_locked(&mut queue, record);
        drop(queue);
        self.shared.not_empty.notify_one();
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        match self.shared.run_state() {
            STATE_STOPPED => Ok(()),
            STATE_STOPPING => Err(Error::QueueStopped),
            STATE_CREATED => {
                // No worker yet: drain on the caller.
                self.shared.drain_inline()?;
                self.shared.inner.lock().flush()
            }
            _ => {
                let (ack_tx, ack_rx) = bounded(1);
                {
                    let mut queue = self.shared.queue.lock();
                    queue.entries.push_back(Envelope::FlushMarker(ack_tx));
                }
                self.shared.not_empty.notify_one();
                match ack_rx.recv() {
                    Ok(result) => result,
                    Err(_) => Err(Error::QueueStopped),
                }
            }
        }
    }

    fn healthy(&self) -> bool {
        if self.shared.degraded.load(Ordering::Relaxed) {
            return false;
        }
        // Observational: do not park behind a busy worker.
        self.shared
            .inner
            .try_lock()
            .map(|inner| inner.healthy())
            .unwrap_or(true)
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn start(&self) {
        if self
            .shared
            .state
            .compare_exchange(
                STATE_CREATED,
                STATE_RUNNING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }
        self.shared.inner.lock().start();
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(format!("{}-worker", self.name))
            .spawn(move || shared.worker_loop())
            .ok();
        *self.worker.lock() = handle;
    }

    fn stop(&self) -> Result<()> {
        loop {
            match self.shared.state.compare_exchange(
                STATE_RUNNING,
                STATE_STOPPING,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    // Wake the worker so it can drain, and any parked
                    // producers so they observe QueueStopped.
                    self.shared.not_empty.notify_all();
                    self.shared.not_full.notify_all();
                    let handle = self.worker.lock().take();
                    if let Some(handle) = handle {
                        let _ = handle.join();
                    }
                    // The worker exits only once the queue is empty, but a
                    // race with late enqueues is possible; sweep the rest.
                    self.shared.drain_inline()?;
                    let result = self.shared.inner.lock().stop();
                    self.shared.state.store(STATE_STOPPED, Ordering::Release);
                    return result;
                }
                Err(STATE_CREATED) => {
                    if self
                        .shared
                        .state
                        .compare_exchange(
                            STATE_CREATED,
                            STATE_STOPPING,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        self.shared.drain_inline()?;
                        let result = self.shared.inner.lock().stop();
                        self.shared.state.store(STATE_STOPPED, Ordering::Release);
                        return result;
                    }
                    // Lost the race; retry against the new state.
                }
                Err(_) => return Ok(()),
            }
        }
    }
}

impl Drop for AsyncWriter {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
