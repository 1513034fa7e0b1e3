// Routing through the front door: exclusive delivery, category and
// pattern routes, and stop_propagation interplay across named chains.

use std::sync::Arc;

use crate::logger::Logger;
use crate::record::{Level, Record};
use crate::router::Route;
use crate::sinks::MemorySink;
use crate::writer::SinkWriter;

fn chains(count: usize) -> Vec<Arc<MemorySink>> {
    (0..count).map(|_| Arc::new(MemorySink::new())).collect()
}

fn sink_writer(sink: &Arc<MemorySink>) -> Box<SinkWriter> {
    Box::new(SinkWriter::with_default_format(Box::new(Arc::clone(sink))))
}

#[test]
fn test_exclusive_routing_delivers_only_matches() {
    let sinks = chains(1);
    let logger = Logger::builder()
        .min_level(Level::Trace)
        .writer("err_sink", sink_writer(&sinks[0]))
        .route(Route::level(Level::Error, ["err_sink"]))
        .exclusive_routing(true)
        .build()
        .unwrap();
    logger.start().unwrap();

    logger.info("info msg").unwrap();
    logger.warning("warning msg").unwrap();
    logger.error("error msg").unwrap();
    logger.stop().unwrap();

    let lines = sinks[0].lines_utf8();
    assert_eq!(lines.len(), 1, "only the error record is delivered");
    assert!(lines[0].contains("error msg"));
}

#[test]
fn test_inclusive_routing_broadcasts_unmatched() {
    let sinks = chains(2);
    let logger = Logger::builder()
        .min_level(Level::Trace)
        .writer("all", sink_writer(&sinks[0]))
        .writer("errors", sink_writer(&sinks[1]))
        .route(Route::level(Level::Error, ["errors"]))
        .build()
        .unwrap();
    logger.start().unwrap();

    logger.info("info msg").unwrap();
    logger.error("error msg").unwrap();
    logger.stop().unwrap();

    // The unmatched info record is broadcast; the matched error record
    // goes to the routed chain only.
    assert_eq!(sinks[0].line_count(), 1);
    assert!(sinks[0].lines_utf8()[0].contains("info msg"));
    let error_lines = sinks[1].lines_utf8();
    assert_eq!(error_lines.len(), 1);
    assert!(error_lines[0].contains("error msg"));
}

#[test]
fn test_category_and_pattern_routes() {
    let sinks = chains(2);
    let logger = Logger::builder()
        .min_level(Level::Trace)
        .writer("security", sink_writer(&sinks[0]))
        .writer("slow", sink_writer(&sinks[1]))
        .route(Route::category("auth", ["security"]))
        .route(Route::pattern("timed out", ["slow"]).unwrap())
        .exclusive_routing(true)
        .build()
        .unwrap();
    logger.start().unwrap();

    logger
        .log_record(Record::builder(Level::Info, "login failed").category("auth").build())
        .unwrap();
    logger.info("request timed out").unwrap();
    logger.info("nothing to see").unwrap();
    logger.stop().unwrap();

    assert_eq!(sinks[0].line_count(), 1);
    assert!(sinks[0].lines_utf8()[0].contains("login failed"));
    assert_eq!(sinks[1].line_count(), 1);
    assert!(sinks[1].lines_utf8()[0].contains("timed out"));
}

#[test]
fn test_stop_propagation_prevents_later_routes() {
    let sinks = chains(2);
    let logger = Logger::builder()
        .min_level(Level::Trace)
        .writer("primary", sink_writer(&sinks[0]))
        .writer("secondary", sink_writer(&sinks[1]))
        .route(Route::level(Level::Warning, ["primary"]).stop_propagation())
        .route(Route::level(Level::Warning, ["secondary"]))
        .exclusive_routing(true)
        .build()
        .unwrap();
    logger.start().unwrap();
    logger.error("halts early").unwrap();
    logger.stop().unwrap();

    assert_eq!(sinks[0].line_count(), 1);
    assert_eq!(sinks[1].line_count(), 0);
}

#[test]
fn test_route_to_unknown_chain_is_skipped() {
    let sinks = chains(1);
    let logger = Logger::builder()
        .min_level(Level::Trace)
        .writer("real", sink_writer(&sinks[0]))
        .route(Route::level(Level::Error, ["ghost", "real"]))
        .exclusive_routing(true)
        .build()
        .unwrap();
    logger.start().unwrap();
    logger.error("resilient").unwrap();
    logger.stop().unwrap();

    assert_eq!(sinks[0].line_count(), 1);
}
