//! # Front-Door Logger
//!
//! The entry point of the pipeline: gates on the minimum level, enriches
//! records with merged context, routes them to named writer chains and
//! owns the lifecycle of every chain.
//!
//! ## Lifecycle
//!
//! `Initialized -> Running -> Stopping -> Stopped`, one-way. Double start
//! and double stop are no-ops. Logging while `Initialized` is accepted
//! (async chains queue, synchronous chains write immediately); logging
//! while `Stopping` is best-effort; logging while `Stopped` is a no-op
//! reporting success.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::RwLock;

use crate::audit::{self, AuditEvent};
use crate::context::{self, SharedContext};
use crate::error::{Error, Result};
use crate::record::{FieldMap, FieldValue, Level, Message, Record};
use crate::router::{Route, Router, Selection};
use crate::writer::Writer;

const STATE_INITIALIZED: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPING: u8 = 2;
const STATE_STOPPED: u8 = 3;

/// Lifecycle phase of a [`Logger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerState {
    /// Created, workers not yet running
    Initialized,
    /// Accepting and dispatching records
    Running,
    /// Draining chains
    Stopping,
    /// Drained; further logging is a successful no-op
    Stopped,
}

/// Multi-chain structured logger.
pub struct Logger {
    state: AtomicU8,
    min_level: AtomicU8,
    context: SharedContext,
    chains: RwLock<Vec<(String, Arc<dyn Writer>)>>,
    router: RwLock<Router>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// Logger with no chains, an empty router and `Info` gating.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_INITIALIZED),
            min_level: AtomicU8::new(Level::Info.wire()),
            context: SharedContext::new(),
            chains: RwLock::new(Vec::new()),
            router: RwLock::new(Router::new()),
        }
    }

    /// Start configuring a logger fluently.
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::new()
    }

    // ---- lifecycle ------------------------------------------------------

    /// Current lifecycle phase.
    pub fn state(&self) -> LoggerState {
        match self.state.load(Ordering::Acquire) {
            STATE_INITIALIZED => LoggerState::Initialized,
            STATE_RUNNING => LoggerState::Running,
            STATE_STOPPING => LoggerState::Stopping,
            _ => LoggerState::Stopped,
        }
    }

    /// True while records are dispatched normally.
    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_RUNNING
    }

    /// Transition to running and start the workers of every chain.
    /// A repeated start is a no-op.
    pub fn start(&self) -> Result<()> {
        if self
            .state
            .compare_exchange(
                STATE_INITIALIZED,
                STATE_RUNNING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Ok(());
        }
        for (_, chain) in self.chains.read().iter() {
            chain.start();
        }
        audit::emit(AuditEvent::LoggerStarted, "");
        Ok(())
    }

    /// Drain every chain synchronously, join workers, and settle in
    /// `Stopped`. A repeated stop is a no-op reporting success.
    pub fn stop(&self) -> Result<()> {
        let from_running = self.state.compare_exchange(
            STATE_RUNNING,
            STATE_STOPPING,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        let from_initialized = from_running.is_err()
            && self
                .state
                .compare_exchange(
                    STATE_INITIALIZED,
                    STATE_STOPPING,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok();
        if from_running.is_err() && !from_initialized {
            return Ok(());
        }

        let mut outcome = Ok(());
        for (_, chain) in self.chains.read().iter() {
            if let Err(err) = chain.flush() {
                outcome = Err(err);
            }
            if let Err(err) = chain.stop() {
                outcome = Err(err);
            }
        }
        self.state.store(STATE_STOPPED, Ordering::Release);
        audit::emit(AuditEvent::LoggerStopped, "");
        outcome
    }

    // ---- configuration --------------------------------------------------

    /// Register a writer chain under `name`. Chains are sealed: the
    /// logger owns the head and never reconfigures its insides. Adding to
    /// a running logger starts the chain immediately.
    pub fn add_writer(&self, name: impl Into<String>, writer: Box<dyn Writer>) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidArgument(
                "writer name must not be empty".to_string(),
            ));
        }
        let mut chains = self.chains.write();
        if chains.iter().any(|(existing, _)| *existing == name) {
            return Err(Error::InvalidArgument(format!(
                "writer '{}' is already registered",
                name
            )));
        }
        let writer: Arc<dyn Writer> = Arc::from(writer);
        if self.is_running() {
            writer.start();
        }
        chains.push((name.clone(), writer));
        drop(chains);
        audit::emit(AuditEvent::WriterAdded, &name);
        Ok(())
    }

    /// Remove (and stop) the chain registered under `name`.
    pub fn remove_writer(&self, name: &str) -> Result<()> {
        let mut chains = self.chains.write();
        let idx = chains
            .iter()
            .position(|(existing, _)| existing == name)
            .ok_or_else(|| {
                Error::InvalidArgument(format!("writer '{}' is not registered", name))
            })?;
        let (_, writer) = chains.remove(idx);
        drop(chains);
        let outcome = writer.stop();
        audit::emit(AuditEvent::WriterRemoved, name);
        outcome
    }

    /// Names of the registered chains, in registration order.
    pub fn writer_names(&self) -> Vec<String> {
        self.chains.read().iter().map(|(n, _)| n.clone()).collect()
    }

    /// Replace the route table.
    pub fn set_router(&self, router: Router) {
        *self.router.write() = router;
    }

    /// Append one route to the current table.
    pub fn add_route(&self, route: Route) {
        self.router.write().add(route);
    }

    /// Switch the router between inclusive and exclusive delivery.
    pub fn set_exclusive_routing(&self, exclusive: bool) {
        self.router.write().set_exclusive(exclusive);
    }

    /// Gate threshold; `Off` silences everything.
    pub fn set_min_level(&self, level: Level) {
        self.min_level.store(level.wire(), Ordering::Release);
        audit::emit(
            AuditEvent::ConfigurationChanged,
            &format!("min_level={}", level),
        );
    }

    /// Current gate threshold.
    pub fn get_min_level(&self) -> Level {
        Level::from_wire(self.min_level.load(Ordering::Acquire)).unwrap_or(Level::Off)
    }

    // ---- context --------------------------------------------------------

    /// Set a process-wide context key carried by every record.
    pub fn set_context(&self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.context.set(key, value);
    }

    /// Remove a process-wide context key.
    pub fn remove_context(&self, key: &str) {
        self.context.remove(key);
    }

    /// Drop all process-wide context.
    pub fn clear_context(&self) {
        self.context.clear();
    }

    /// True when the key is present in the process-wide context.
    pub fn has_context(&self, key: &str) -> bool {
        self.context.contains(key)
    }

    /// Current value of a process-wide context key.
    pub fn get_context(&self, key: &str) -> Option<FieldValue> {
        self.context.get(key)
    }

    // ---- logging --------------------------------------------------------

    /// Gate, enrich and dispatch one record built from `level` and
    /// `message`.
    pub fn log(&self, level: Level, message: impl Into<Message>) -> Result<()> {
        if !self.passes_gate(level)? {
            return Ok(());
        }
        self.dispatch(Record::new(level, message))
    }

    /// Gate, enrich and dispatch a caller-built record.
    pub fn log_record(&self, record: Record) -> Result<()> {
        if !self.passes_gate(record.level())? {
            return Ok(());
        }
        self.dispatch(record)
    }

    /// Log at `Trace`.
    pub fn trace(&self, message: impl Into<Message>) -> Result<()> {
        self.log(Level::Trace, message)
    }

    /// Log at `Debug`.
    pub fn debug(&self, message: impl Into<Message>) -> Result<()> {
        self.log(Level::Debug, message)
    }

    /// Log at `Info`.
    pub fn info(&self, message: impl Into<Message>) -> Result<()> {
        self.log(Level::Info, message)
    }

    /// Log at `Warning`.
    pub fn warning(&self, message: impl Into<Message>) -> Result<()> {
        self.log(Level::Warning, message)
    }

    /// Log at `Error`.
    pub fn error(&self, message: impl Into<Message>) -> Result<()> {
        self.log(Level::Error, message)
    }

    /// Log at `Critical`.
    pub fn critical(&self, message: impl Into<Message>) -> Result<()> {
        self.log(Level::Critical, message)
    }

    fn passes_gate(&self, level: Level) -> Result<bool> {
        if level.is_threshold_only() {
            return Err(Error::InvalidArgument(
                "records cannot carry the Off sentinel level".to_string(),
            ));
        }
        if self.state.load(Ordering::Acquire) == STATE_STOPPED {
            return Ok(false);
        }
        Ok(level.wire() >= self.min_level.load(Ordering::Acquire))
    }

    fn dispatch(&self, record: Record) -> Result<()> {
        let merged = context::merged_fields(&self.context.snapshot(), record.fields());
        let record = record.with_merged_fields(merged);

        let selection = self.router.read().select(&record);
        let chains = self.chains.read();

        let mut delivered = 0usize;
        let mut attempted = 0usize;
        let mut last_error = None;

        let mut deliver = |writer: &Arc<dyn Writer>| {
            attempted += 1;
            match writer.write(&record) {
                Ok(()) => delivered += 1,
                Err(err) => last_error = Some(err),
            }
        };

        match selection {
            Selection::Drop => return Ok(()),
            Selection::Broadcast => {
                for (_, writer) in chains.iter() {
                    deliver(writer);
                }
            }
            Selection::Chains(names) => {
                for name in &names {
                    if let Some((_, writer)) =
                        chains.iter().find(|(existing, _)| existing == name)
                    {
                        deliver(writer);
                    }
                }
            }
        }

        // The call fails only when every selected chain rejected it.
        match last_error {
            Some(err) if delivered == 0 && attempted > 0 => Err(err),
            _ => Ok(()),
        }
    }

    // ---- maintenance ----------------------------------------------------

    /// Block until every chain's `flush()` has returned; the first error
    /// is reported after all chains were attempted.
    pub fn flush(&self) -> Result<()> {
        let mut outcome = Ok(());
        for (_, chain) in self.chains.read().iter() {
            if let Err(err) = chain.flush() {
                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
        }
        outcome
    }

    /// Aggregate health over all chains (AND).
    pub fn healthy(&self) -> bool {
        self.chains.read().iter().all(|(_, chain)| chain.healthy())
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Fluent construction of a [`Logger`]; configuration is validated as it
/// is added and the logger comes back ready to `start()`.
#[derive(Default)]
pub struct LoggerBuilder {
    min_level: Option<Level>,
    writers: Vec<(String, Box<dyn Writer>)>,
    router: Router,
    context: Vec<(String, FieldValue)>,
}

impl LoggerBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate threshold of the built logger.
    pub fn min_level(mut self, level: Level) -> Self {
        self.min_level = Some(level);
        self
    }

    /// Register a chain under `name`.
    pub fn writer(mut self, name: impl Into<String>, writer: Box<dyn Writer>) -> Self {
        self.writers.push((name.into(), writer));
        self
    }

    /// Append a route.
    pub fn route(mut self, route: Route) -> Self {
        self.router.add(route);
        self
    }

    /// Exclusive or inclusive delivery.
    pub fn exclusive_routing(mut self, exclusive: bool) -> Self {
        self.router.set_exclusive(exclusive);
        self
    }

    /// Seed the process-wide context.
    pub fn context(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.context.push((key.into(), value.into()));
        self
    }

    /// Validate and assemble the logger (still `Initialized`; call
    /// [`Logger::start`] to spin up workers).
    pub fn build(self) -> Result<Logger> {
        let logger = Logger::new();
        if let Some(level) = self.min_level {
            logger.min_level.store(level.wire(), Ordering::Release);
        }
        for (name, writer) in self.writers {
            logger.add_writer(name, writer)?;
        }
        logger.set_router(self.router);
        for (key, value) in self.context {
            logger.set_context(key, value);
        }
        Ok(logger)
    }
}

/// Snapshot of the merged context the next record would carry, useful
/// for diagnostics and tests.
pub fn effective_context(logger: &Logger) -> FieldMap {
    context::merged_fields(&logger.context.snapshot(), &FieldMap::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::MemorySink;
    use crate::writer::SinkWriter;

    fn memory_logger() -> (Arc<MemorySink>, Logger) {
        let sink = Arc::new(MemorySink::new());
        let logger = Logger::builder()
            .min_level(Level::Trace)
            .writer(
                "main",
                Box::new(SinkWriter::with_default_format(Box::new(Arc::clone(&sink)))),
            )
            .build()
            .unwrap();
        (sink, logger)
    }

    #[test]
    fn test_gate_drops_below_min_level() {
        let (sink, logger) = memory_logger();
        logger.set_min_level(Level::Warning);
        logger.start().unwrap();

        logger.info("ignored").unwrap();
        logger.error("kept").unwrap();
        logger.flush().unwrap();

        let lines = sink.lines_utf8();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("kept"));
    }

    #[test]
    fn test_off_gates_everything_and_returns_success() {
        let (sink, logger) = memory_logger();
        logger.set_min_level(Level::Off);
        logger.start().unwrap();
        logger.critical("silenced").unwrap();
        logger.flush().unwrap();
        assert_eq!(sink.line_count(), 0);
    }

    #[test]
    fn test_off_is_not_a_record_level() {
        let (_, logger) = memory_logger();
        assert!(matches!(
            logger.log(Level::Off, "x"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_double_start_and_double_stop_are_noops() {
        let (_, logger) = memory_logger();
        logger.start().unwrap();
        logger.start().unwrap();
        assert_eq!(logger.state(), LoggerState::Running);
        logger.stop().unwrap();
        logger.stop().unwrap();
        assert_eq!(logger.state(), LoggerState::Stopped);
    }

    #[test]
    fn test_logging_after_stop_is_successful_noop() {
        let (sink, logger) = memory_logger();
        logger.start().unwrap();
        logger.stop().unwrap();
        logger.info("into the void").unwrap();
        assert_eq!(sink.line_count(), 0);
    }

    #[test]
    fn test_duplicate_writer_name_rejected() {
        let (_, logger) = memory_logger();
        let another = SinkWriter::with_default_format(Box::new(MemorySink::new()));
        assert!(matches!(
            logger.add_writer("main", Box::new(another)),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_remove_writer_stops_delivery() {
        let (sink, logger) = memory_logger();
        logger.start().unwrap();
        logger.info("before").unwrap();
        logger.remove_writer("main").unwrap();
        logger.info("after").unwrap();
        assert_eq!(sink.line_count(), 1);
        assert!(logger.remove_writer("main").is_err());
    }

    #[test]
    fn test_context_merged_into_records() {
        let (sink, logger) = memory_logger();
        logger.set_context("svc", "api");
        logger.start().unwrap();
        logger.info("with context").unwrap();
        logger.flush().unwrap();
        assert!(sink.lines_utf8()[0].contains("svc=api"));
    }

    #[test]
    fn test_context_accessors() {
        let (_, logger) = memory_logger();
        logger.set_context("k", 1i64);
        assert!(logger.has_context("k"));
        assert_eq!(logger.get_context("k"), Some(FieldValue::I64(1)));
        logger.remove_context("k");
        assert!(!logger.has_context("k"));
        logger.set_context("x", true);
        logger.clear_context();
        assert!(!logger.has_context("x"));
    }

    #[test]
    fn test_min_level_round_trip() {
        let (_, logger) = memory_logger();
        logger.set_min_level(Level::Debug);
        assert_eq!(logger.get_min_level(), Level::Debug);
    }

    #[test]
    fn test_healthy_aggregates_chains() {
        let (_, logger) = memory_logger();
        assert!(logger.healthy());
    }

    #[test]
    fn test_log_record_keeps_call_site_fields() {
        let (sink, logger) = memory_logger();
        logger.set_context("svc", "api");
        logger.start().unwrap();
        let record = Record::builder(Level::Info, "built")
            .field("svc", "call-site-wins")
            .build();
        logger.log_record(record).unwrap();
        logger.flush().unwrap();
        assert!(sink.lines_utf8()[0].contains("svc=call-site-wins"));
    }
}
