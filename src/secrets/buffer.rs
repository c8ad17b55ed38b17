//! Zeroizing container for secret bytes.

use std::fmt;

use zeroize::Zeroize;

/// A byte buffer whose backing storage is zeroized on every exit path.
///
/// The buffer never grows after construction, so the secret is never
/// left behind in a reallocated backing store.
pub struct SecretBuffer {
    bytes: Vec<u8>,
}

impl SecretBuffer {
    /// Take ownership of already-materialized secret bytes.
    #[must_use]
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Copy secret bytes into a fresh exactly-sized allocation.
    #[must_use]
    pub fn copy_from(secret: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(secret.len());
        bytes.extend_from_slice(secret);
        Self { bytes }
    }

    /// Borrow the secret bytes for a cryptographic operation.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBuffer({} bytes)", self.bytes.len())
    }
}
