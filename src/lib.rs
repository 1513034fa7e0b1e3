//! # Logpipe - High-Throughput Crash-Safe Logging Pipeline
//!
//! Logpipe is a structured logging core for long-running services: a
//! lock-light multi-producer front door feeds named chains of writer
//! decorators, each ending in a terminal sink, with an asynchronous
//! queueing fabric in between and a durable synchronous escape for
//! critical-severity records.
//!
//! ## Architecture
//!
//! The library is organized into focused modules:
//! - `record`: the immutable log record and its field model
//! - `context`: process-wide, thread-local and scoped context
//! - `writer` / `writers`: the decorator seam and the decorators
//!   (buffered, async, batch, filtered, formatted, encrypted, critical)
//! - `sinks`: terminal byte sinks (console, file, rotating file, memory)
//! - `format` / `filter` / `router`: record shaping and routing
//! - `wal` / `signal`: the durability layer for critical records
//! - `audit` / `security`: audit event emission and path validation
//!
//! ## Features
//!
//! - Bounded async queues with block / drop-newest / drop-oldest overflow
//! - Per-producer FIFO ordering through every decorator
//! - Size-based file rotation with bounded, optionally compressed backups
//! - Write-ahead-logged critical path with fsync and crash-time recovery
//! - Scoped structured context with exact restoration
//! - Thread-safe operations built on parking_lot and crossbeam
//!
//! ## Quick start
//!
//! ```rust
//! use logpipe::{AsyncConfig, AsyncWriter, Level, Logger, SinkWriter};
//! use logpipe::sinks::MemorySink;
//!
//! let sink = Box::new(MemorySink::new());
//! let chain = AsyncWriter::new(
//!     Box::new(SinkWriter::with_default_format(sink)),
//!     AsyncConfig::default(),
//! ).unwrap();
//!
//! let logger = Logger::builder()
//!     .min_level(Level::Debug)
//!     .writer("main", Box::new(chain))
//!     .build()
//!     .unwrap();
//!
//! logger.start().unwrap();
//! logger.info("service up").unwrap();
//! logger.stop().unwrap();
//! ```

pub mod audit;
pub mod context;
pub mod error;
pub mod filter;
pub mod format;
pub mod logger;
pub mod record;
pub mod router;
pub mod security;
pub mod signal;
pub mod sinks;
pub mod wal;
pub mod writer;
pub mod writers;

#[cfg(test)]
mod tests;

pub use context::ContextScope;
pub use error::{Error, Result};
pub use format::{Formatter, JsonFormatter, TextFormatter};
pub use logger::{Logger, LoggerBuilder, LoggerState};
pub use record::{
    FieldMap, FieldValue, Level, Message, Record, RecordBuilder, SourceLocation, TraceContext,
};
pub use router::{Route, Router, Selection};
pub use wal::WriteAheadLog;
pub use writer::{Sink, SinkWriter, Writer};
pub use writers::{
    AsyncConfig, AsyncWriter, BatchConfig, BatchWriter, BufferedWriter, Cipher, CriticalConfig,
    CriticalWriter, EncryptedWriter, FilteredWriter, FormattedWriter, OverflowPolicy,
};
