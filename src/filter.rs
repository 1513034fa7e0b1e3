//! # Record Filters
//!
//! Pure predicates over records (`true` = accept), composable with
//! short-circuiting AND/OR and negation. Filters must not block and must
//! not perform I/O; pattern filters precompile their regex.

use ahash::AHashSet;
use regex::Regex;

use crate::error::{Error, Result};
use crate::record::{Level, Record};

/// Pure `record -> bool` predicate.
pub trait Filter: Send + Sync {
    /// True when the record should continue down the chain.
    fn accepts(&self, record: &Record) -> bool;
}

impl<F> Filter for F
where
    F: Fn(&Record) -> bool + Send + Sync,
{
    fn accepts(&self, record: &Record) -> bool {
        self(record)
    }
}

/// Accepts records at or above a threshold level.
#[derive(Debug, Clone, Copy)]
pub struct LevelFilter {
    threshold: Level,
}

impl LevelFilter {
    /// Accept `level >= threshold`.
    pub fn at_least(threshold: Level) -> Self {
        Self { threshold }
    }
}

impl Filter for LevelFilter {
    fn accepts(&self, record: &Record) -> bool {
        record.level() >= self.threshold
    }
}

/// Accepts records at exactly one level.
#[derive(Debug, Clone, Copy)]
pub struct ExactLevelFilter {
    level: Level,
}

impl ExactLevelFilter {
    /// Accept `level == wanted` only.
    pub fn of(level: Level) -> Self {
        Self { level }
    }
}

impl Filter for ExactLevelFilter {
    fn accepts(&self, record: &Record) -> bool {
        record.level() == self.level
    }
}

/// Accepts (or rejects) records by category membership.
///
/// Records without a category never match the set; in include mode they
/// are rejected, in exclude mode they pass.
#[derive(Debug, Clone)]
pub struct CategoryFilter {
    categories: AHashSet<String>,
    include: bool,
}

impl CategoryFilter {
    /// Accept only records whose category is in the set.
    pub fn include<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            categories: categories.into_iter().map(Into::into).collect(),
            include: true,
        }
    }

    /// Reject records whose category is in the set.
    pub fn exclude<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            categories: categories.into_iter().map(Into::into).collect(),
            include: false,
        }
    }
}

impl Filter for CategoryFilter {
    fn accepts(&self, record: &Record) -> bool {
        let member = record
            .category()
            .map(|c| self.categories.contains(c))
            .unwrap_or(false);
        if self.include { member } else { !member }
    }
}

/// Accepts records whose message matches a precompiled regex.
#[derive(Debug, Clone)]
pub struct PatternFilter {
    pattern: Regex,
}

impl PatternFilter {
    /// Compile `pattern`; fails with `InvalidArgument` on a bad regex.
    pub fn new(pattern: &str) -> Result<Self> {
        let compiled = Regex::new(pattern)
            .map_err(|e| Error::InvalidArgument(format!("bad filter pattern: {}", e)))?;
        Ok(Self { pattern: compiled })
    }
}

impl Filter for PatternFilter {
    fn accepts(&self, record: &Record) -> bool {
        self.pattern.is_match(&record.message().as_str_lossy())
    }
}

/// Short-circuiting conjunction: rejects on the first `false`.
pub struct AndFilter {
    filters: Vec<Box<dyn Filter>>,
}

impl AndFilter {
    /// Combine filters; an empty list accepts everything.
    pub fn new(filters: Vec<Box<dyn Filter>>) -> Self {
        Self { filters }
    }
}

impl Filter for AndFilter {
    fn accepts(&self, record: &Record) -> bool {
        self.filters.iter().all(|f| f.accepts(record))
    }
}

/// Short-circuiting disjunction: accepts on the first `true`.
pub struct OrFilter {
    filters: Vec<Box<dyn Filter>>,
}

impl OrFilter {
    /// Combine filters; an empty list rejects everything.
    pub fn new(filters: Vec<Box<dyn Filter>>) -> Self {
        Self { filters }
    }
}

impl Filter for OrFilter {
    fn accepts(&self, record: &Record) -> bool {
        self.filters.iter().any(|f| f.accepts(record))
    }
}

/// Negation of an inner filter.
pub struct NotFilter {
    inner: Box<dyn Filter>,
}

impl NotFilter {
    /// Invert `inner`.
    pub fn new(inner: Box<dyn Filter>) -> Self {
        Self { inner }
    }
}

impl Filter for NotFilter {
    fn accepts(&self, record: &Record) -> bool {
        !self.inner.accepts(record)
    }
}

/// `AND` over a list of filters.
pub fn all_of(filters: Vec<Box<dyn Filter>>) -> AndFilter {
    AndFilter::new(filters)
}

/// `OR` over a list of filters.
pub fn any_of(filters: Vec<Box<dyn Filter>>) -> OrFilter {
    OrFilter::new(filters)
}

/// `NOT` over a filter.
pub fn not(filter: Box<dyn Filter>) -> NotFilter {
    NotFilter::new(filter)
}
