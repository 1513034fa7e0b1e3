//! # Context Store
//!
//! Structured context merged into every record at the front door. Three
//! lifetimes are supported:
//!
//! - process-wide: a map owned by the logger, read on every log call and
//!   written rarely (swap-on-write via `arc-swap`);
//! - thread-local: a per-thread overlay plus a stack of RAII scopes;
//! - call-site: fields attached to a single record.
//!
//! Merge order when a record is enriched is global, then thread overlay,
//! then scopes in creation order, then call-site fields; last writer wins
//! while key positions stay at first insertion.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::record::FieldMap;

/// Process-wide context map with a read-mostly access pattern.
///
/// Readers take a cheap snapshot; writers clone, mutate and swap. Suits
/// the logging hot path where every record reads the map and mutations
/// happen on configuration changes only.
#[derive(Debug, Default)]
pub struct SharedContext {
    map: ArcSwap<FieldMap>,
}

impl SharedContext {
    /// Create an empty shared context.
    pub fn new() -> Self {
        Self { map: ArcSwap::from_pointee(FieldMap::new()) }
    }

    /// Insert or replace a key.
    pub fn set(&self, key: impl Into<String>, value: impl Into<crate::record::FieldValue>) {
        let key = key.into();
        let value = value.into();
        self.map.rcu(|current| {
            let mut next = FieldMap::clone(current);
            next.insert(key.clone(), value.clone());
            next
        });
    }

    /// Remove a key if present.
    pub fn remove(&self, key: &str) {
        self.map.rcu(|current| {
            let mut next = FieldMap::clone(current);
            next.remove(key);
            next
        });
    }

    /// Drop all keys.
    pub fn clear(&self) {
        self.map.store(Arc::new(FieldMap::new()));
    }

    /// True if the key is currently present.
    pub fn contains(&self, key: &str) -> bool {
        self.map.load().contains_key(key)
    }

    /// Current value of a key, cloned out of the snapshot.
    pub fn get(&self, key: &str) -> Option<crate::record::FieldValue> {
        self.map.load().get(key).cloned()
    }

    /// Cheap snapshot of the whole map.
    pub fn snapshot(&self) -> Arc<FieldMap> {
        self.map.load_full()
    }
}

thread_local! {
    static THREAD_OVERLAY: RefCell<FieldMap> = RefCell::new(FieldMap::new());
    static SCOPE_STACK: RefCell<Vec<(u64, FieldMap)>> = const { RefCell::new(Vec::new()) };
    static NEXT_SCOPE_TOKEN: RefCell<u64> = const { RefCell::new(0) };
}

/// Set a key in the calling thread's overlay.
pub fn set_thread_context(key: impl Into<String>, value: impl Into<crate::record::FieldValue>) {
    let key = key.into();
    let value = value.into();
    THREAD_OVERLAY.with(|overlay| {
        overlay.borrow_mut().insert(key, value);
    });
}

/// Remove a key from the calling thread's overlay.
pub fn remove_thread_context(key: &str) {
    THREAD_OVERLAY.with(|overlay| {
        overlay.borrow_mut().remove(key);
    });
}

/// Clear the calling thread's overlay.
pub fn clear_thread_context() {
    THREAD_OVERLAY.with(|overlay| overlay.borrow_mut().clear());
}

/// A scoped batch of context keys, removed when the scope is dropped.
///
/// Scopes nest: an inner scope shadows keys of outer scopes and of the
/// thread overlay for its lifetime; dropping it restores exactly the
/// state observed at entry. Scopes are per-thread and must be dropped on
/// the thread that created them (the type is `!Send`).
///
/// # Examples
///
/// ```rust
/// use logpipe::context::ContextScope;
/// use logpipe::FieldMap;
///
/// let mut fields = FieldMap::new();
/// fields.insert("req", "42");
/// let _scope = ContextScope::enter(fields);
/// // records logged here carry req=42
/// ```
#[derive(Debug)]
pub struct ContextScope {
    token: u64,
    _not_send: PhantomData<*const ()>,
}

impl ContextScope {
    /// Push a batch of keys for the lifetime of the returned guard.
    pub fn enter(fields: FieldMap) -> Self {
        let token = NEXT_SCOPE_TOKEN.with(|next| {
            let mut next = next.borrow_mut();
            *next += 1;
            *next
        });
        SCOPE_STACK.with(|stack| stack.borrow_mut().push((token, fields)));
        Self { token, _not_send: PhantomData }
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        SCOPE_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(idx) = stack.iter().rposition(|(token, _)| *token == self.token) {
                stack.remove(idx);
            }
        });
    }
}

/// Merge all context lifetimes for one record.
///
/// Order: `global`, then the thread overlay, then scopes oldest-first,
/// then `call_site`. Later sources override earlier values while keeping
/// the first-seen key position.
pub(crate) fn merged_fields(global: &FieldMap, call_site: &FieldMap) -> FieldMap {
    let mut merged = global.clone();
    THREAD_OVERLAY.with(|overlay| merged.merge_from(&overlay.borrow()));
    SCOPE_STACK.with(|stack| {
        for (_, fields) in stack.borrow().iter() {
            merged.merge_from(fields);
        }
    });
    merged.merge_from(call_site);
    merged
}
