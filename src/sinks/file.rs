//! Append-mode file sink.
//!
//! A single mutex serializes writers; `flush()` pushes buffered bytes to
//! the OS and fsyncs, which is the durability promise the critical path
//! relies on. The raw descriptor is cached for the crash adapter.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::Result;
use crate::security::PathValidator;
use crate::writer::Sink;

/// Terminal sink appending bytes to one file.
pub struct FileSink {
    path: PathBuf,
    inner: Mutex<BufWriter<File>>,
    fd: RawFd,
    healthy: AtomicBool,
}

impl FileSink {
    /// Open (or create) `path` for appending.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let fd = file.as_raw_fd();
        Ok(Self {
            path,
            inner: Mutex::new(BufWriter::new(file)),
            fd,
            healthy: AtomicBool::new(true),
        })
    }

    /// Open `path` only after `validator` has accepted it.
    ///
    /// Rejections surface as [`crate::Error::PathTraversal`] and are
    /// reported to the audit collaborator by the validator.
    pub fn new_validated(path: impl AsRef<Path>, validator: &PathValidator) -> Result<Self> {
        validator.validate(path.as_ref())?;
        Self::new(path)
    }

    /// Path this sink appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for FileSink {
    fn write_raw(&self, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.write_all(bytes) {
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
        let mut inner = self.inner.lock();
        let result = inner
            .flush()
            .and_then(|()| inner.get_ref().sync_all());
        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                self.healthy.store(false, Ordering::Relaxed);
                Err(err.into())
            }
        }
    }

    fn healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    fn name(&self) -> String {
        "file".to_string()
    }

    fn descriptor(&self) -> Option<RawFd> {
        Some(self.fd)
    }
}
