//! Encrypting decorator and the narrow cipher seam it consumes.
//!
//! Concrete AEAD algorithms live outside the pipeline; the decorator only
//! requires something that can turn plaintext into ciphertext and back.
//! Key lifecycle changes are reported to the audit collaborator.

use parking_lot::Mutex;

use crate::audit::{self, AuditEvent};
use crate::error::Result;
use crate::record::Record;
use crate::writer::{Writer, decorated_name};

/// Reversible byte transformation supplied by the host application.
///
/// Implementations must be deterministic per key and must report
/// failures as [`crate::Error::EncryptionFailed`].
pub trait Cipher: Send + Sync {
    /// Encrypt `plaintext`.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt `ciphertext`, inverting [`Cipher::encrypt`] under the same
    /// key.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;

    /// Algorithm label for diagnostics and audit detail.
    fn algorithm(&self) -> &str;
}

/// Decorator that forwards derived records carrying encrypted messages.
pub struct EncryptedWriter {
    inner: Box<dyn Writer>,
    cipher: Mutex<Box<dyn Cipher>>,
}

impl EncryptedWriter {
    /// Wrap `inner`; messages are encrypted with `cipher` before they
    /// travel further down the chain.
    pub fn new(inner: Box<dyn Writer>, cipher: Box<dyn Cipher>) -> Self {
        audit::emit(AuditEvent::EncryptionKeyLoaded, cipher.algorithm());
        Self { inner, cipher: Mutex::new(cipher) }
    }

    /// Swap in a new cipher (key rotation).
    pub fn rotate_cipher(&self, cipher: Box<dyn Cipher>) {
        audit::emit(AuditEvent::EncryptionKeyRotated, cipher.algorithm());
        *self.cipher.lock() = cipher;
    }
}

impl Writer for EncryptedWriter {
    fn write(&self, record: &Record) -> Result<()> {
        let ciphertext = self.cipher.lock().encrypt(record.message().as_bytes())?;
        let derived = record.with_message(ciphertext);
        self.inner.write(&derived)
    }

    fn flush(&self) -> Result<()> {
        self.inner.flush()
    }

    fn healthy(&self) -> bool {
        self.inner.healthy()
    }

    fn name(&self) -> String {
        decorated_name("encrypted", self.inner.as_ref())
    }

    fn start(&self) {
        self.inner.start();
    }

    fn stop(&self) -> Result<()> {
        self.inner.stop()
    }
}
