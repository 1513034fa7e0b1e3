//! # Router
//!
//! Directs records to zero or more named writer chains. Routes are
//! evaluated in registration order; each match adds its target chains to
//! the delivery set, and a route flagged `stop_propagation` halts further
//! evaluation.
//!
//! Two modes:
//! - inclusive (default): a record matching at least one route goes to
//!   the union of matched chains; a record matching none is broadcast to
//!   every registered chain;
//! - exclusive: unmatched records are dropped.

use std::sync::Arc;

use ahash::AHashSet;
use regex::Regex;

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::record::{Level, Record};

/// What a route matches on.
pub enum RoutePredicate {
    /// Severity within an inclusive range
    LevelRange {
        /// Lower bound, inclusive
        min: Level,
        /// Upper bound, inclusive
        max: Level,
    },
    /// Exact category tag
    Category(String),
    /// Regex over the message bytes (lossy UTF-8)
    Pattern(Regex),
    /// Arbitrary filter predicate
    Custom(Arc<dyn Filter>),
}

/// One routing rule: predicate, target chains, propagation flag.
pub struct Route {
    predicate: RoutePredicate,
    targets: Vec<String>,
    stop_propagation: bool,
}

impl Route {
    /// Match severities from `min` upward.
    pub fn level<I, S>(min: Level, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::level_range(min, Level::Critical, targets)
    }

    /// Match severities in `[min, max]`.
    pub fn level_range<I, S>(min: Level, max: Level, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            predicate: RoutePredicate::LevelRange { min, max },
            targets: targets.into_iter().map(Into::into).collect(),
            stop_propagation: false,
        }
    }

    /// Match records tagged with exactly `category`.
    pub fn category<I, S>(category: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            predicate: RoutePredicate::Category(category.into()),
            targets: targets.into_iter().map(Into::into).collect(),
            stop_propagation: false,
        }
    }

    /// Match messages against a regex; fails with `InvalidArgument` on a
    /// bad pattern.
    pub fn pattern<I, S>(pattern: &str, targets: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let compiled = Regex::new(pattern)
            .map_err(|e| Error::InvalidArgument(format!("bad route pattern: {}", e)))?;
        Ok(Self {
            predicate: RoutePredicate::Pattern(compiled),
            targets: targets.into_iter().map(Into::into).collect(),
            stop_propagation: false,
        })
    }

    /// Match with an arbitrary filter.
    pub fn custom<I, S>(filter: Arc<dyn Filter>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            predicate: RoutePredicate::Custom(filter),
            targets: targets.into_iter().map(Into::into).collect(),
            stop_propagation: false,
        }
    }

    /// Halt route evaluation when this route matches.
    pub fn stop_propagation(mut self) -> Self {
        self.stop_propagation = true;
        self
    }

    fn matches(&self, record: &Record) -> bool {
        match &self.predicate {
            RoutePredicate::LevelRange { min, max } => {
                record.level() >= *min && record.level() <= *max
            }
            RoutePredicate::Category(category) => record.category() == Some(category.as_str()),
            RoutePredicate::Pattern(pattern) => {
                pattern.is_match(&record.message().as_str_lossy())
            }
            RoutePredicate::Custom(filter) => filter.accepts(record),
        }
    }
}

/// Delivery decision for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// No route matched in inclusive mode: deliver to every chain.
    Broadcast,
    /// Deliver to these chains, in first-match order.
    Chains(Vec<String>),
    /// No route matched in exclusive mode: deliver nowhere.
    Drop,
}

/// Ordered route table.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    exclusive: bool,
}

impl Router {
    /// Empty router in inclusive mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch between inclusive and exclusive delivery.
    pub fn set_exclusive(&mut self, exclusive: bool) {
        self.exclusive = exclusive;
    }

    /// Current mode.
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Append a route; evaluation follows registration order.
    pub fn add(&mut self, route: Route) {
        self.routes.push(route);
    }

    /// Number of registered routes.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Decide where `record` goes.
    pub fn select(&self, record: &Record) -> Selection {
        let mut chains: Vec<String> = Vec::new();
        let mut seen: AHashSet<&str> = AHashSet::new();
        let mut matched = false;

        for route in &self.routes {
            if !route.matches(record) {
                continue;
            }
            matched = true;
            for target in &route.targets {
                if seen.insert(target.as_str()) {
                    chains.push(target.clone());
                }
            }
            if route.stop_propagation {
                break;
            }
        }

        if !matched {
            if self.exclusive { Selection::Drop } else { Selection::Broadcast }
        } else {
            Selection::Chains(chains)
        }
    }
}
