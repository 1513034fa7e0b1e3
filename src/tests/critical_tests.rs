// Durability of the critical path: staged WAL frames survive an aborted
// run and are replayed exactly once into the main sink on restart.

use std::sync::Arc;

use crate::format::TextFormatter;
use crate::logger::Logger;
use crate::record::{Level, Record};
use crate::sinks::{FileSink, MemorySink};
use crate::wal::WriteAheadLog;
use crate::writer::{SinkWriter, Writer};
use crate::writers::{AsyncConfig, AsyncWriter, CriticalConfig, CriticalWriter};

fn file_chain(path: &std::path::Path) -> SinkWriter {
    SinkWriter::new(
        Box::new(FileSink::new(path).unwrap()),
        Box::new(TextFormatter::new().timestamp(false)),
    )
}

#[test]
fn test_critical_record_survives_aborted_run() {
    let dir = tempfile::tempdir().unwrap();
    let wal_path = dir.path().join("critical.wal");
    let sink_path = dir.path().join("main.log");

    // First run: the record reaches the WAL but the process dies before
    // the sink write confirms, so the watermark never advances.
    {
        let wal = WriteAheadLog::open(&wal_path).unwrap();
        wal.append(&Record::new(Level::Critical, "boom")).unwrap();
        // Process aborts here.
    }

    // Restart: building the critical writer replays pending frames into
    // the main sink before accepting new records.
    let config = CriticalConfig {
        write_ahead_log: true,
        wal_path: Some(wal_path.clone()),
        enable_signal_handlers: false,
        ..CriticalConfig::default()
    };
    let normal = SinkWriter::with_default_format(Box::new(MemorySink::new()));
    let writer =
        CriticalWriter::new(Box::new(normal), Box::new(file_chain(&sink_path)), config)
            .unwrap();

    let content = std::fs::read_to_string(&sink_path).unwrap();
    assert_eq!(
        content.matches("boom").count(),
        1,
        "replayed exactly once"
    );

    // A second recovery pass finds nothing pending.
    drop(writer);
    let wal = WriteAheadLog::open(&wal_path).unwrap();
    assert!(wal.recover().unwrap().is_empty());
}

#[test]
fn test_successful_critical_write_is_not_replayed() {
    let dir = tempfile::tempdir().unwrap();
    let wal_path = dir.path().join("critical.wal");
    let sink_path = dir.path().join("main.log");

    {
        let config = CriticalConfig {
            write_ahead_log: true,
            wal_path: Some(wal_path.clone()),
            enable_signal_handlers: false,
            ..CriticalConfig::default()
        };
        let normal = SinkWriter::with_default_format(Box::new(MemorySink::new()));
        let writer =
            CriticalWriter::new(Box::new(normal), Box::new(file_chain(&sink_path)), config)
                .unwrap();
        writer.write(&Record::new(Level::Critical, "boom")).unwrap();
    }

    // Restart with the same WAL: the consumed frame must not duplicate.
    let config = CriticalConfig {
        write_ahead_log: true,
        wal_path: Some(wal_path),
        enable_signal_handlers: false,
        ..CriticalConfig::default()
    };
    let normal = SinkWriter::with_default_format(Box::new(MemorySink::new()));
    let _writer =
        CriticalWriter::new(Box::new(normal), Box::new(file_chain(&sink_path)), config)
            .unwrap();

    let content = std::fs::read_to_string(&sink_path).unwrap();
    assert_eq!(content.matches("boom").count(), 1);
}

#[test]
fn test_critical_bypasses_async_queue() {
    let dir = tempfile::tempdir().unwrap();
    let sink_path = dir.path().join("main.log");

    let queued_sink = Arc::new(MemorySink::new());
    let queued = AsyncWriter::new(
        Box::new(SinkWriter::with_default_format(Box::new(Arc::clone(&queued_sink)))),
        AsyncConfig::default(),
    )
    .unwrap();
    let config = CriticalConfig {
        enable_signal_handlers: false,
        force_flush_on_critical: false,
        ..CriticalConfig::default()
    };
    let writer = CriticalWriter::new(
        Box::new(queued),
        Box::new(file_chain(&sink_path)),
        config,
    )
    .unwrap();

    // Worker never started: the normal path cannot drain, yet the
    // critical record is on disk immediately.
    writer.write(&Record::new(Level::Info, "stuck in queue")).unwrap();
    writer.write(&Record::new(Level::Critical, "on disk now")).unwrap();

    let content = std::fs::read_to_string(&sink_path).unwrap();
    assert!(content.contains("on disk now"));
    assert_eq!(queued_sink.line_count(), 0);
}

#[test]
fn test_logger_with_critical_chain_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let wal_path = dir.path().join("critical.wal");
    let sink_path = dir.path().join("main.log");

    let normal_sink = Arc::new(MemorySink::new());
    let normal = AsyncWriter::new(
        Box::new(SinkWriter::with_default_format(Box::new(Arc::clone(&normal_sink)))),
        AsyncConfig::default(),
    )
    .unwrap();
    let config = CriticalConfig {
        write_ahead_log: true,
        wal_path: Some(wal_path),
        enable_signal_handlers: false,
        ..CriticalConfig::default()
    };
    let critical =
        CriticalWriter::new(Box::new(normal), Box::new(file_chain(&sink_path)), config)
            .unwrap();

    let logger = Logger::builder()
        .min_level(Level::Trace)
        .writer("main", Box::new(critical))
        .build()
        .unwrap();
    logger.start().unwrap();
    logger.info("routine").unwrap();
    logger.critical("meltdown").unwrap();
    logger.stop().unwrap();

    let content = std::fs::read_to_string(&sink_path).unwrap();
    assert_eq!(content.matches("meltdown").count(), 1);
    assert_eq!(normal_sink.line_count(), 1);
}
