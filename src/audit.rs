//! # Audit Events
//!
//! Security-relevant happenings are reported to an external audit
//! collaborator through a narrow hook interface. The pipeline only emits
//! events; persistence, alerting and retention are the collaborator's
//! concern. Hooks are registered process-wide and invoked synchronously,
//! so implementations must be cheap and non-blocking.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};

/// The auditable event set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditEvent {
    /// Logger transitioned to running
    LoggerStarted,
    /// Logger drained and stopped
    LoggerStopped,
    /// A writer chain was registered
    WriterAdded,
    /// A writer chain was removed
    WriterRemoved,
    /// An encryption key was loaded
    EncryptionKeyLoaded,
    /// An encryption key was rotated
    EncryptionKeyRotated,
    /// An encryption key was generated
    EncryptionKeyGenerated,
    /// The OS denied an operation
    PermissionDenied,
    /// A path escaped its allowed base directory
    PathTraversalAttempt,
    /// World-writable or otherwise lax permissions were observed
    InsecurePermissionsDetected,
    /// Anything that warrants a second look
    SuspiciousActivity,
    /// Runtime configuration was changed
    ConfigurationChanged,
    /// An authentication attempt succeeded
    AuthenticationSuccess,
    /// An authentication attempt failed
    AuthenticationFailure,
    /// File access was denied
    FileAccessDenied,
    /// File access was granted
    FileAccessGranted,
}

impl AuditEvent {
    /// Stable snake_case name of the event.
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEvent::LoggerStarted => "logger_started",
            AuditEvent::LoggerStopped => "logger_stopped",
            AuditEvent::WriterAdded => "writer_added",
            AuditEvent::WriterRemoved => "writer_removed",
            AuditEvent::EncryptionKeyLoaded => "encryption_key_loaded",
            AuditEvent::EncryptionKeyRotated => "encryption_key_rotated",
            AuditEvent::EncryptionKeyGenerated => "encryption_key_generated",
            AuditEvent::PermissionDenied => "permission_denied",
            AuditEvent::PathTraversalAttempt => "path_traversal_attempt",
            AuditEvent::InsecurePermissionsDetected => "insecure_permissions_detected",
            AuditEvent::SuspiciousActivity => "suspicious_activity",
            AuditEvent::ConfigurationChanged => "configuration_changed",
            AuditEvent::AuthenticationSuccess => "authentication_success",
            AuditEvent::AuthenticationFailure => "authentication_failure",
            AuditEvent::FileAccessDenied => "file_access_denied",
            AuditEvent::FileAccessGranted => "file_access_granted",
        }
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External audit collaborator.
pub trait AuditHook: Send + Sync {
    /// Receive one event with free-form detail.
    fn record(&self, event: AuditEvent, detail: &str);
}

static HOOKS: Lazy<RwLock<Vec<Arc<dyn AuditHook>>>> = Lazy::new(|| RwLock::new(Vec::new()));

/// Register a process-wide audit hook.
pub fn register_hook(hook: Arc<dyn AuditHook>) {
    HOOKS.write().push(hook);
}

/// Remove every registered hook.
pub fn clear_hooks() {
    HOOKS.write().clear();
}

/// Report an event to every registered hook. Cheap no-op with none.
pub fn emit(event: AuditEvent, detail: &str) {
    let hooks = HOOKS.read();
    for hook in hooks.iter() {
        hook.record(event, detail);
    }
}

/// Hook that collects events in memory; meant for tests and demos.
#[derive(Debug, Default)]
pub struct MemoryAuditHook {
    events: Mutex<Vec<(AuditEvent, String)>>,
}

impl MemoryAuditHook {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    pub fn events(&self) -> Vec<(AuditEvent, String)> {
        self.events.lock().clone()
    }

    /// True when `event` was recorded at least once.
    pub fn saw(&self, event: AuditEvent) -> bool {
        self.events.lock().iter().any(|(e, _)| *e == event)
    }
}

impl AuditHook for MemoryAuditHook {
    fn record(&self, event: AuditEvent, detail: &str) {
        self.events.lock().push((event, detail.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_stable() {
        assert_eq!(AuditEvent::LoggerStarted.as_str(), "logger_started");
        assert_eq!(
            AuditEvent::PathTraversalAttempt.as_str(),
            "path_traversal_attempt"
        );
        assert_eq!(
            AuditEvent::EncryptionKeyGenerated.as_str(),
            "encryption_key_generated"
        );
    }

    #[test]
    fn test_emit_reaches_registered_hook() {
        let hook = Arc::new(MemoryAuditHook::new());
        register_hook(hook.clone());
        emit(AuditEvent::ConfigurationChanged, "min_level=debug");
        assert!(hook.saw(AuditEvent::ConfigurationChanged));
        let detail = hook
            .events()
            .into_iter()
            .find(|(e, _)| *e == AuditEvent::ConfigurationChanged)
            .unwrap()
            .1;
        assert_eq!(detail, "min_level=debug");
    }
}
