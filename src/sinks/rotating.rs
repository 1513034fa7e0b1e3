//! # Rotating File Sink
//!
//! Bounds on-disk size with a bounded number of backups. The active file
//! keeps the configured name (`app.log`); rotation shifts backups upward
//! by one index, inserting the index before the extension:
//! `app.1.log` is the most recent backup, `app.N.log` the oldest, and
//! index `N+1` never exists. With `max_backups = 0` the previous file is
//! discarded outright.
//!
//! ## Features
//!
//! - Size-triggered rollover under a single mutex
//! - Bounded backup count with shift-up renaming
//! - Optional gzip/zstd compression of the fresh backup
//! - Failed rotations downgrade to continuation on the previous handle

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::writer::Sink;

/// Compression applied to a freshly rotated backup file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Keep backups as plain text (default)
    #[default]
    None,
    /// GZIP compression (balanced speed and ratio)
    Gzip,
    /// Zstandard compression (high ratio, fast decompression)
    Zstd,
}

impl Compression {
    /// Parse a compression name: "gzip"/"gz", "zstd"/"zst", anything else
    /// means no compression.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "gzip" | "gz" => Compression::Gzip,
            "zstd" | "zst" => Compression::Zstd,
            _ => Compression::None,
        }
    }

    fn suffix(self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some("gz"),
            Compression::Zstd => Some("zst"),
        }
    }
}

/// Parse size strings like "5KB", "10MB", "1GB" into bytes.
///
/// A bare number is taken as bytes; units B/KB/MB/GB (and their
/// single-letter forms) are case-insensitive.
pub fn parse_size_limit(size_str: &str) -> Option<u64> {
    let s = size_str.trim();
    if s.is_empty() {
        return None;
    }

    let mut num_end = 0;
    for (i, c) in s.chars().enumerate() {
        if !c.is_ascii_digit() {
            num_end = i;
            break;
        }
        num_end = i + 1;
    }
    if num_end == 0 {
        return None;
    }

    let num_str = &s[..num_end];
    let unit = s[num_end..].trim().to_uppercase();
    let multiplier = match unit.as_str() {
        "B" | "" => 1,
        "KB" | "K" => 1024,
        "MB" | "M" => 1024 * 1024,
        "GB" | "G" => 1024 * 1024 * 1024,
        _ => return None,
    };

    num_str.parse::<u64>().ok().map(|n| n * multiplier)
}

/// Counters kept by a [`RotatingFileSink`].
#[derive(Debug, Default)]
pub struct RotationStats {
    /// Successful rollovers
    pub rotations: AtomicU64,
    /// Rollovers that failed and fell back to the previous handle
    pub rotation_failures: AtomicU64,
}

struct ActiveFile {
    writer: BufWriter<File>,
    current_size: u64,
}

/// Size-rotating terminal sink.
pub struct RotatingFileSink {
    base_path: PathBuf,
    max_bytes: u64,
    max_backups: usize,
    compression: Compression,
    active: Mutex<ActiveFile>,
    fd: AtomicI32,
    healthy: AtomicBool,
    stats: RotationStats,
}

impl RotatingFileSink {
    /// Open the sink over `base_path`, rolling over whenever a write
    /// would push the active file past `max_bytes`, keeping at most
    /// `max_backups` backups.
    ///
    /// Fails with `InvalidArgument` when `max_bytes` is zero.
    pub fn new(base_path: impl AsRef<Path>, max_bytes: u64, max_backups: usize) -> Result<Self> {
        Self::with_compression(base_path, max_bytes, max_backups, Compression::None)
    }

    /// Like [`RotatingFileSink::new`] but taking the size bound as a
    /// human-readable string: `"1024"`, `"512KB"`, `"10MB"`, `"1GB"`.
    ///
    /// Fails with `InvalidArgument` when the string does not parse.
    pub fn with_size_limit(
        base_path: impl AsRef<Path>,
        max_size: &str,
        max_backups: usize,
    ) -> Result<Self> {
        let max_bytes = parse_size_limit(max_size).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "rotating sink: bad size limit '{}', expected forms like '500B', '5KB', '10MB', '1GB'",
                max_size
            ))
        })?;
        Self::new(base_path, max_bytes, max_backups)
    }

    /// Like [`RotatingFileSink::new`] but compressing each fresh backup.
    pub fn with_compression(
        base_path: impl AsRef<Path>,
        max_bytes: u64,
        max_backups: usize,
        compression: Compression,
    ) -> Result<Self> {
        if max_bytes == 0 {
            return Err(Error::InvalidArgument(
                "rotating sink: max_bytes must be greater than 0".to_string(),
            ));
        }
        let base_path = base_path.as_ref().to_path_buf();
        if let Some(parent) = base_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&base_path)?;
        let current_size = file.metadata()?.len();
        let fd = file.as_raw_fd();
        Ok(Self {
            base_path,
            max_bytes,
            max_backups,
            compression,
            active: Mutex::new(ActiveFile { writer: BufWriter::new(file), current_size }),
            fd: AtomicI32::new(fd),
            healthy: AtomicBool::new(true),
            stats: RotationStats::default(),
        })
    }

    /// Counter snapshot.
    pub fn stats(&self) -> &RotationStats {
        &self.stats
    }

    /// Path of the active file.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Backup path for `index`, inserting the index before the extension:
    /// `app.log` becomes `app.1.log`.
    fn backup_path(&self, index: usize) -> PathBuf {
        let file_name = self
            .base_path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let new_name = match file_name.rfind('.') {
            Some(pos) => {
                let (stem, ext) = file_name.split_at(pos);
                format!("{}.{}{}", stem, index, ext)
            }
            None => format!("{}.{}", file_name, index),
        };
        self.base_path.with_file_name(new_name)
    }

    /// The on-disk variant of a backup slot, compressed or plain.
    fn existing_variant(path: &Path) -> Option<PathBuf> {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        for suffix in ["gz", "zst"] {
            let candidate = append_suffix(path, suffix);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        None
    }

    fn compress_backup(&self, path: &Path) -> io::Result<()> {
        let Some(suffix) = self.compression.suffix() else {
            return Ok(());
        };
        let target = append_suffix(path, suffix);
        let mut source = File::open(path)?;
        let out = File::create(&target)?;
        match self.compression {
            Compression::Gzip => {
                let mut encoder =
                    flate2::write::GzEncoder::new(out, flate2::Compression::default());
                io::copy(&mut source, &mut encoder)?;
                encoder.finish()?;
            }
            Compression::Zstd => {
                zstd::stream::copy_encode(&mut source, out, 0)?;
            }
            Compression::None => unreachable!(),
        }
        std::fs::remove_file(path)
    }

    /// Shift backups upward, move the active file into slot 1, reopen.
    /// The caller's lock covers the whole procedure.
    fn rotate_locked(&self, active: &mut ActiveFile) -> Result<()> {
        active.writer.flush().map_err(|e| Error::RotationFailed(e.to_string()))?;

        let rotation = (|| -> io::Result<File> {
            if self.max_backups == 0 {
                std::fs::remove_file(&self.base_path)?;
            } else {
                if let Some(oldest) = Self::existing_variant(&self.backup_path(self.max_backups)) {
                    std::fs::remove_file(oldest)?;
                }
                for index in (1..self.max_backups).rev() {
                    if let Some(source) = Self::existing_variant(&self.backup_path(index)) {
                        let target = shift_index_path(
                            &source,
                            &self.backup_path(index),
                            &self.backup_path(index + 1),
                        );
                        std::fs::rename(source, target)?;
                    }
                }
                let first = self.backup_path(1);
                std::fs::rename(&self.base_path, &first)?;
                self.compress_backup(&first)?;
            }
            OpenOptions::new().create(true).append(true).open(&self.base_path)
        })();

        match rotation {
            Ok(file) => {
                self.fd.store(file.as_raw_fd(), Ordering::Relaxed);
                active.writer = BufWriter::new(file);
                active.current_size = 0;
                self.stats.rotations.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                self.stats.rotation_failures.fetch_add(1, Ordering::Relaxed);
                Err(Error::RotationFailed(err.to_string()))
            }
        }
    }
}

/// `path` plus a compression suffix: `app.1.log` -> `app.1.log.gz`.
fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".");
    os.push(suffix);
    PathBuf::from(os)
}

/// Carry a source's compression suffix over to the target slot.
fn shift_index_path(source: &Path, plain_source: &Path, plain_target: &Path) -> PathBuf {
    if source == plain_source {
        plain_target.to_path_buf()
    } else {
        let suffix = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        append_suffix(plain_target, suffix)
    }
}

impl Sink for RotatingFileSink {
    fn write_raw(&self, bytes: &[u8]) -> Result<()> {
        let mut active = self.active.lock();

        if active.current_size > 0
            && active.current_size + bytes.len() as u64 > self.max_bytes
        {
            // A failed rotation is reported through health and stats; the
            // record still goes out on the previous handle.
            if self.rotate_locked(&mut active).is_err() {
                self.healthy.store(false, Ordering::Relaxed);
            }
        }

        match active.writer.write_all(bytes) {
            Ok(()) => {
                active.current_size += bytes.len() as u64;
                Ok(())
            }
            Err(err) => {
                self.healthy.store(false, Ordering::Relaxed);
                Err(err.into())
            }
        }
    }

    fn flush(&self) -> Result<()> {
        let mut active = self.active.lock();
        let result = active
            .writer
            .flush()
            .and_then(|()| active.writer.get_ref().sync_all());
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
        "rotating_file".to_string()
    }

    fn descriptor(&self) -> Option<RawFd> {
        Some(self.fd.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_records(sink: &RotatingFileSink, count: usize, payload_len: usize) {
        let padding = "x".repeat(payload_len - 8);
        for i in 0..count {
            let line = format!("{}{:06}\n", padding, i);
            sink.write_raw(line.as_bytes()).unwrap();
        }
        sink.flush().unwrap();
    }

    fn line_count(path: &Path) -> usize {
        std::fs::read_to_string(path)
            .map(|c| c.lines().count())
            .unwrap_or(0)
    }

    #[test]
    fn test_zero_max_bytes_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            RotatingFileSink::new(dir.path().join("app.log"), 0, 3),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_rotation_bounds_active_file_and_backups() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("app.log");
        let sink = RotatingFileSink::new(&base, 1024, 3).unwrap();

        // 40 records of ~100 bytes: four files' worth of data.
        write_records(&sink, 40, 100);

        assert!(sink.stats().rotations.load(Ordering::Relaxed) >= 1);
        let active_size = std::fs::metadata(&base).unwrap().len();
        assert!(active_size <= 1024 + 100, "active file too large: {}", active_size);

        let mut backups = 0;
        let mut total = line_count(&base);
        for i in 1..=5 {
            let backup = sink.backup_path(i);
            if backup.exists() {
                assert!(i <= 3, "backup index {} exceeds max_backups", i);
                backups += 1;
                total += line_count(&backup);
            }
        }
        assert!(backups <= 3);
        assert_eq!(total, 40, "all records must be present across files");
    }

    #[test]
    fn test_zero_backups_discards_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("app.log");
        let sink = RotatingFileSink::new(&base, 64, 0).unwrap();

        sink.write_raw(&[b'a'; 60]).unwrap();
        sink.write_raw(&[b'b'; 60]).unwrap();
        sink.flush().unwrap();

        assert!(!sink.backup_path(1).exists());
        let content = std::fs::read(&base).unwrap();
        assert_eq!(content, vec![b'b'; 60], "only the newest write survives");
    }

    #[test]
    fn test_single_oversized_write_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("app.log");
        let sink = RotatingFileSink::new(&base, 16, 1).unwrap();
        sink.write_raw(&[b'x'; 64]).unwrap();
        sink.flush().unwrap();
        assert_eq!(std::fs::metadata(&base).unwrap().len(), 64);
    }

    #[test]
    fn test_backup_naming_inserts_index_before_extension() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RotatingFileSink::new(dir.path().join("app.log"), 1024, 2).unwrap();
        assert_eq!(
            sink.backup_path(1).file_name().unwrap().to_str().unwrap(),
            "app.1.log"
        );
        assert_eq!(
            sink.backup_path(2).file_name().unwrap().to_str().unwrap(),
            "app.2.log"
        );
    }

    #[test]
    fn test_gzip_compressed_backups() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("app.log");
        let sink =
            RotatingFileSink::with_compression(&base, 64, 2, Compression::Gzip).unwrap();

        for _ in 0..4 {
            sink.write_raw(&[b'z'; 60]).unwrap();
        }
        sink.flush().unwrap();

        let first = append_suffix(&sink.backup_path(1), "gz");
        assert!(first.exists(), "fresh backup should be gzip-compressed");
        assert!(!sink.backup_path(1).exists(), "plain backup removed after compression");
    }

    #[test]
    fn test_with_size_limit_parses_and_rotates() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("app.log");
        let sink = RotatingFileSink::with_size_limit(&base, "1KB", 2).unwrap();

        write_records(&sink, 20, 100);

        assert!(sink.stats().rotations.load(Ordering::Relaxed) >= 1);
        let active_size = std::fs::metadata(&base).unwrap().len();
        assert!(active_size <= 1024 + 100);
    }

    #[test]
    fn test_with_size_limit_rejects_bad_strings() {
        let dir = tempfile::tempdir().unwrap();
        for bad in ["", "KB", "ten megabytes", "7TB"] {
            assert!(
                matches!(
                    RotatingFileSink::with_size_limit(dir.path().join("app.log"), bad, 1),
                    Err(Error::InvalidArgument(_))
                ),
                "'{}' should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_parse_size_limit() {
        assert_eq!(parse_size_limit("1024"), Some(1024));
        assert_eq!(parse_size_limit("1KB"), Some(1024));
        assert_eq!(parse_size_limit("10mb"), Some(10 * 1024 * 1024));
        assert_eq!(parse_size_limit("2G"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_size_limit(" 5 KB "), Some(5120));
        assert_eq!(parse_size_limit(""), None);
        assert_eq!(parse_size_limit("KB"), None);
        assert_eq!(parse_size_limit("7TB"), None);
    }

    #[test]
    fn test_compression_from_str() {
        assert_eq!(Compression::from_str("gzip"), Compression::Gzip);
        assert_eq!(Compression::from_str("ZSTD"), Compression::Zstd);
        assert_eq!(Compression::from_str("none"), Compression::None);
        assert_eq!(Compression::from_str("bogus"), Compression::None);
    }
}
