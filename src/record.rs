//! # Record & Field Model
//!
//! The value types that travel through the pipeline: severity levels, the
//! immutable log record, and the ordered structured-field map.
//!
//! ## Features
//!
//! - Total severity ordering with an `Off` sentinel for thresholds
//! - Inline message storage for short messages (no heap allocation)
//! - Ordered key/value fields with unique keys and stable positions
//! - Builder for records carrying location, category, fields and trace ids

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;

/// Messages up to this many bytes are stored inline in the record.
const INLINE_MESSAGE_BYTES: usize = 120;

/// Severity of a log record.
///
/// Ordering is total and follows the wire ordinals: `Trace` (0) through
/// `Critical` (5). `Off` (6) is a threshold-only sentinel: it can be used
/// as a minimum level to disable all output but never appears on a record
/// produced by the front door.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    /// Finest-grained diagnostics
    Trace = 0,
    /// Debug-time diagnostics
    Debug = 1,
    /// Normal operational messages
    Info = 2,
    /// Something unexpected but recoverable
    Warning = 3,
    /// An operation failed
    Error = 4,
    /// Failure that demands durable capture
    Critical = 5,
    /// Threshold sentinel: gates everything, never set on a record
    Off = 6,
}

impl Level {
    /// Uppercase name used by formatters and diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
            Level::Off => "OFF",
        }
    }

    /// Wire ordinal of this level.
    pub fn wire(self) -> u8 {
        self as u8
    }

    /// Reconstruct a level from its wire ordinal.
    pub fn from_wire(value: u8) -> Option<Level> {
        match value {
            0 => Some(Level::Trace),
            1 => Some(Level::Debug),
            2 => Some(Level::Info),
            3 => Some(Level::Warning),
            4 => Some(Level::Error),
            5 => Some(Level::Critical),
            6 => Some(Level::Off),
            _ => None,
        }
    }

    /// Parse a level name, accepting common aliases.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use logpipe::Level;
    ///
    /// assert_eq!(Level::parse("info"), Some(Level::Info));
    /// assert_eq!(Level::parse("WARN"), Some(Level::Warning));
    /// assert_eq!(Level::parse("fatal"), Some(Level::Critical));
    /// assert_eq!(Level::parse("bogus"), None);
    /// ```
    pub fn parse(name: &str) -> Option<Level> {
        match name.to_ascii_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warning),
            "error" => Some(Level::Error),
            "critical" | "fatal" => Some(Level::Critical),
            "off" => Some(Level::Off),
            _ => None,
        }
    }

    /// True only for the `Off` sentinel.
    pub fn is_threshold_only(self) -> bool {
        self == Level::Off
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured field value.
///
/// The four kinds every consumer must round-trip: UTF-8 string, signed
/// 64-bit integer, IEEE-754 double and boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// UTF-8 string
    Str(String),
    /// Signed 64-bit integer
    I64(i64),
    /// IEEE-754 double
    F64(f64),
    /// Boolean
    Bool(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::I64(v) => write!(f, "{}", v),
            FieldValue::F64(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::I64(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::I64(v as i64)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::I64(v as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::F64(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

/// An ordered mapping of unique keys to [`FieldValue`]s.
///
/// Insertion order is preserved through the whole pipeline so formatter
/// output is deterministic. Re-inserting an existing key replaces the
/// value but keeps the key's original position, which is what makes the
/// context merge (`global` then thread then scopes then call-site) render
/// keys in first-seen order with last-writer-wins values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    entries: SmallVec<[(String, FieldValue); 8]>,
}

impl FieldMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a key. Returns the previous value if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        let key = key.into();
        let value = value.into();
        for entry in self.entries.iter_mut() {
            if entry.0 == key {
                return Some(std::mem::replace(&mut entry.1, value));
            }
        }
        self.entries.push((key, value));
        None
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// True if the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove a key, returning its value if it was present.
    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merge `other` into `self`, last writer wins, positions preserved.
    pub fn merge_from(&mut self, other: &FieldMap) {
        for (k, v) in other.iter() {
            self.insert(k, v.clone());
        }
    }
}

impl FromIterator<(String, FieldValue)> for FieldMap {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        let mut map = FieldMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldMapVisitor;

        impl<'de> Visitor<'de> for FieldMapVisitor {
            type Value = FieldMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FieldMap, A::Error> {
                let mut map = FieldMap::new();
                while let Some((key, value)) = access.next_entry::<String, FieldValue>()? {
                    map.insert(key, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(FieldMapVisitor)
    }
}

/// The message payload of a record.
///
/// An 8-bit-clean byte sequence; encoding is the caller's contract.
/// Sequences up to 120 bytes live inline in the record, longer ones spill
/// to the heap.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    bytes: SmallVec<[u8; INLINE_MESSAGE_BYTES]>,
}

impl Message {
    /// Raw message bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Message as text, with invalid UTF-8 replaced.
    pub fn as_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// Byte length of the message.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for a zero-length message.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message({:?})", self.as_str_lossy())
    }
}

impl From<&str> for Message {
    fn from(v: &str) -> Self {
        Message { bytes: SmallVec::from_slice(v.as_bytes()) }
    }
}

impl From<String> for Message {
    fn from(v: String) -> Self {
        Message { bytes: SmallVec::from_vec(v.into_bytes()) }
    }
}

impl From<&[u8]> for Message {
    fn from(v: &[u8]) -> Self {
        Message { bytes: SmallVec::from_slice(v) }
    }
}

impl From<Vec<u8>> for Message {
    fn from(v: Vec<u8>) -> Self {
        Message { bytes: SmallVec::from_vec(v) }
    }
}

/// Call-site location captured when a record is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    /// Source file path
    pub file: &'static str,
    /// 1-based line number
    pub line: u32,
    /// Enclosing function name, empty when unknown
    pub function: &'static str,
}

impl SourceLocation {
    /// Build a location triple.
    pub fn new(file: &'static str, line: u32, function: &'static str) -> Self {
        Self { file, line, function }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.function.is_empty() {
            write!(f, "{}:{}", self.file, self.line)
        } else {
            write!(f, "{}:{} ({})", self.file, self.line, self.function)
        }
    }
}

/// Capture the current file and line as a [`SourceLocation`].
///
/// An optional argument names the enclosing function:
/// `location!("handle_request")`.
#[macro_export]
macro_rules! location {
    () => {
        $crate::SourceLocation::new(file!(), line!(), "")
    };
    ($function:expr) => {
        $crate::SourceLocation::new(file!(), line!(), $function)
    };
}

/// Distributed-tracing correlation identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// Trace identifier
    pub trace_id: String,
    /// Span identifier
    pub span_id: String,
    /// Request correlation identifier
    pub correlation_id: String,
}

impl TraceContext {
    /// Build a trace context triple.
    pub fn new(
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            correlation_id: correlation_id.into(),
        }
    }
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Opaque identifier of the calling thread.
///
/// Process-local, assigned on first use per thread.
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}

/// A single log event.
///
/// Constructed per log call and owned exclusively by the pipeline until a
/// terminal sink consumes it or a policy drops it. Immutable once handed
/// to a writer; decorators that transform produce a derived record via
/// [`Record::with_message`].
#[derive(Debug, Clone)]
pub struct Record {
    level: Level,
    message: Message,
    timestamp: DateTime<Utc>,
    location: Option<SourceLocation>,
    thread_id: Option<u64>,
    category: Option<String>,
    fields: FieldMap,
    trace: Option<TraceContext>,
}

impl Record {
    /// Create a record with the current wall-clock timestamp and the
    /// calling thread's identifier.
    pub fn new(level: Level, message: impl Into<Message>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
            location: None,
            thread_id: Some(current_thread_id()),
            category: None,
            fields: FieldMap::new(),
            trace: None,
        }
    }

    /// Start building a record with optional attributes.
    pub fn builder(level: Level, message: impl Into<Message>) -> RecordBuilder {
        RecordBuilder { record: Record::new(level, message) }
    }

    /// Severity of this record.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Message payload.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Wall-clock instant captured at creation.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Call-site location, when captured.
    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    /// Producing thread, when captured.
    pub fn thread_id(&self) -> Option<u64> {
        self.thread_id
    }

    /// Routing/filtering tag, when set.
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    /// Structured fields in insertion order.
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Trace correlation ids, when set.
    pub fn trace(&self) -> Option<&TraceContext> {
        self.trace.as_ref()
    }

    /// Derive a record with a replacement message.
    ///
    /// Every other attribute (timestamp included) is preserved; used by
    /// the formatting and encrypting decorators.
    pub fn with_message(&self, message: impl Into<Message>) -> Record {
        let mut derived = self.clone();
        derived.message = message.into();
        derived
    }

    /// Replace the field map wholesale. The front door uses this after
    /// merging context into the call-site fields.
    pub(crate) fn with_merged_fields(mut self, fields: FieldMap) -> Record {
        self.fields = fields;
        self
    }
}

/// Accumulates record attributes and emits a single [`Record`].
#[derive(Debug)]
pub struct RecordBuilder {
    record: Record,
}

impl RecordBuilder {
    /// Attach a call-site location.
    pub fn location(mut self, location: SourceLocation) -> Self {
        self.record.location = Some(location);
        self
    }

    /// Attach a routing/filtering category.
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.record.category = Some(category.into());
        self
    }

    /// Add one structured field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.record.fields.insert(key, value);
        self
    }

    /// Merge a whole field map, last writer wins.
    pub fn fields(mut self, fields: &FieldMap) -> Self {
        self.record.fields.merge_from(fields);
        self
    }

    /// Attach trace correlation ids.
    pub fn trace(mut self, trace: TraceContext) -> Self {
        self.record.trace = Some(trace);
        self
    }

    /// Override the creation timestamp. Used when reconstructing records
    /// from durable storage.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.record.timestamp = timestamp;
        self
    }

    /// Override or clear the producing-thread identifier.
    pub fn thread_id(mut self, thread_id: Option<u64>) -> Self {
        self.record.thread_id = thread_id;
        self
    }

    /// Consume the builder and produce the record.
    pub fn build(self) -> Record {
        self.record
    }
}
