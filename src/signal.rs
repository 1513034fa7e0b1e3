//! # Crash Adapter
//!
//! Best-effort durability across abnormal termination. Critical-capable
//! writers register the raw descriptors of their durable sinks here; on a
//! fatal signal the handler fsyncs every registered descriptor before the
//! default disposition runs.
//!
//! Handlers are async-signal-safe: the descriptor table is a fixed array
//! of atomics (no locks, no allocation) and the handler body is limited
//! to atomic loads, `libc::fsync`, and signal-hook's default-disposition
//! emulation. Hooks installed through signal-hook elsewhere in the
//! process keep running; after ours, the signal's default behavior is
//! re-raised so termination semantics are preserved.

use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use signal_hook::consts::signal::{SIGABRT, SIGINT, SIGQUIT, SIGSEGV, SIGTERM};
use signal_hook::low_level;

use crate::error::{Error, Result};

/// Capacity of the descriptor table; registrations beyond it are refused.
const MAX_DESCRIPTORS: usize = 64;

const EMPTY_SLOT: i32 = -1;

static SLOTS: [AtomicI32; MAX_DESCRIPTORS] =
    [const { AtomicI32::new(EMPTY_SLOT) }; MAX_DESCRIPTORS];

static HANDLERS_INSTALLED: AtomicBool = AtomicBool::new(false);

static SIGNAL_IDS: Lazy<Mutex<Vec<signal_hook::SigId>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// RAII handle for one registered descriptor; dropping it frees the slot.
#[derive(Debug)]
pub struct CriticalRegistration {
    slot: usize,
}

impl CriticalRegistration {
    /// Replace the registered descriptor, e.g. after a file rotation.
    pub fn update(&self, fd: RawFd) {
        SLOTS[self.slot].store(fd, Ordering::SeqCst);
    }
}

impl Drop for CriticalRegistration {
    fn drop(&mut self) {
        SLOTS[self.slot].store(EMPTY_SLOT, Ordering::SeqCst);
    }
}

/// Track `fd` for emergency fsync. Returns `None` when the table is full.
pub fn register_descriptor(fd: RawFd) -> Option<CriticalRegistration> {
    for (slot, entry) in SLOTS.iter().enumerate() {
        if entry
            .compare_exchange(EMPTY_SLOT, fd, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return Some(CriticalRegistration { slot });
        }
    }
    None
}

/// Number of descriptors currently registered.
pub fn registered_count() -> usize {
    SLOTS
        .iter()
        .filter(|entry| entry.load(Ordering::SeqCst) != EMPTY_SLOT)
        .count()
}

/// Fsync every registered descriptor. Async-signal-safe.
fn sync_registered_descriptors() {
    for entry in SLOTS.iter() {
        let fd = entry.load(Ordering::SeqCst);
        if fd >= 0 {
            unsafe {
                libc::fsync(fd);
            }
        }
    }
}

/// Install process-level handlers for terminate, interrupt, quit, abort
/// and segmentation violation. Idempotent.
///
/// On any of those signals the handler fsyncs every registered
/// descriptor and then lets the signal's default disposition run.
pub fn install_handlers() -> Result<()> {
    if HANDLERS_INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let mut ids = SIGNAL_IDS.lock();
    for signal in [SIGTERM, SIGINT, SIGQUIT, SIGABRT] {
        // SAFETY: the hook only performs async-signal-safe work (atomic
        // loads, fsync, default-disposition emulation).
        let id = unsafe {
            low_level::register(signal, move || {
                sync_registered_descriptors();
                let _ = low_level::emulate_default_handler(signal);
            })
        }
        .map_err(|e| Error::Io(e))?;
        ids.push(id);
    }

    // SIGSEGV is refused by the checked API; the registry-level call is
    // required and carries the same safety obligations.
    let id = unsafe {
        signal_hook_registry::register_signal_unchecked(SIGSEGV, move || {
            sync_registered_descriptors();
            let _ = low_level::emulate_default_handler(SIGSEGV);
        })
    }
    .map_err(Error::Io)?;
    ids.push(id);

    Ok(())
}

/// Remove the handlers installed by [`install_handlers`]. Registered
/// descriptors stay in the table.
pub fn uninstall_handlers() {
    if !HANDLERS_INSTALLED.swap(false, Ordering::SeqCst) {
        return;
    }
    let mut ids = SIGNAL_IDS.lock();
    for id in ids.drain(..) {
        low_level::unregister(id);
    }
}

/// True once [`install_handlers`] has run.
pub fn handlers_installed() -> bool {
    HANDLERS_INSTALLED.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_fills_and_frees_slots() {
        let before = registered_count();
        let first = register_descriptor(10).unwrap();
        let second = register_descriptor(11).unwrap();
        assert!(registered_count() >= before + 2);
        first.update(12);
        drop(first);
        drop(second);
        assert!(registered_count() <= MAX_DESCRIPTORS);
    }

    #[test]
    fn test_install_is_idempotent() {
        install_handlers().unwrap();
        install_handlers().unwrap();
        assert!(handlers_installed());
    }
}
