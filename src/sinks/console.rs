//! Console sink writing to stdout or stderr. Color and TTY detection are
//! the host application's business; this sink moves bytes only.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::writer::Sink;

/// Which standard stream to write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleTarget {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

/// Byte sink over a standard stream.
#[derive(Debug)]
pub struct ConsoleSink {
    target: ConsoleTarget,
    healthy: AtomicBool,
}

impl ConsoleSink {
    /// Sink over stdout.
    pub fn stdout() -> Self {
        Self { target: ConsoleTarget::Stdout, healthy: AtomicBool::new(true) }
    }

    /// Sink over stderr.
    pub fn stderr() -> Self {
        Self { target: ConsoleTarget::Stderr, healthy: AtomicBool::new(true) }
    }
}

impl Sink for ConsoleSink {
    fn write_raw(&self, bytes: &[u8]) -> Result<()> {
        let outcome = match self.target {
            ConsoleTarget::Stdout => std::io::stdout().lock().write_all(bytes),
            ConsoleTarget::Stderr => std::io::stderr().lock().write_all(bytes),
        };
        match outcome {
            Ok(()) => {
                self.healthy.store(true, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                self.healthy.store(false, Ordering::Relaxed);
                Err(err.into())
            }
        }
    }

    fn flush(&self) -> Result<()> {
        let outcome = match self.target {
            ConsoleTarget::Stdout => std::io::stdout().lock().flush(),
            ConsoleTarget::Stderr => std::io::stderr().lock().flush(),
        };
        outcome.map_err(Into::into)
    }

    fn healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    fn name(&self) -> String {
        match self.target {
            ConsoleTarget::Stdout => "console".to_string(),
            ConsoleTarget::Stderr => "console_err".to_string(),
        }
    }
}
