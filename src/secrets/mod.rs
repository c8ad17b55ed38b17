//! Session-scoped protection of secret key material.
//!
//! The [`SecretProtector`] owns the session wrapping key: a fresh 256-bit
//! AES-GCM key drawn at session start, never serialized, and gone for good
//! after [`SecretProtector::wipe`]. Everything handed to the credential
//! store is wrapped here first; losing the key intentionally strands every
//! wrapped secret from earlier sessions.

mod buffer;

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::types::Fingerprint;

pub use buffer::SecretBuffer;

/// Secret key material encrypted under the session wrapping key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedSecret {
    pub fingerprint: Fingerprint,
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
}

struct ProtectorState {
    /// `None` once the session key has been wiped.
    cipher: Option<Aes256Gcm>,
    /// Nonces issued under the current key. A random collision forces a
    /// redraw, so a nonce is never used twice with the same key.
    issued_nonces: HashSet<[u8; 12]>,
}

/// Holder of the session wrapping key.
///
/// The raw key bytes never leave this module; the cipher object is the
/// only form the key exists in after construction.
pub struct SecretProtector {
    state: Mutex<ProtectorState>,
}

impl SecretProtector {
    /// Generate a fresh session wrapping key from the OS entropy source.
    #[must_use]
    pub fn new() -> Self {
        let mut key_bytes = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(key_bytes.as_mut());
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes.as_ref()));
        Self {
            state: Mutex::new(ProtectorState {
                cipher: Some(cipher),
                issued_nonces: HashSet::new(),
            }),
        }
    }

    // A panic elsewhere must never leave secrets locked away; force
    // access through poisoning.
    fn lock(&self) -> MutexGuard<'_, ProtectorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Encrypt secret bytes under the session wrapping key.
    ///
    /// The fingerprint is bound in as associated data, so a wrapped
    /// secret cannot be replayed under another key's identity.
    pub fn wrap(&self, fingerprint: &Fingerprint, secret: &[u8]) -> Result<WrappedSecret> {
        let mut state = self.lock();
        if state.cipher.is_none() {
            return Err(Error::SessionLost);
        }
        let nonce = loop {
            let mut candidate = [0u8; 12];
            OsRng.fill_bytes(&mut candidate);
            if state.issued_nonces.insert(candidate) {
                break candidate;
            }
        };
        let Some(cipher) = state.cipher.as_ref() else {
            return Err(Error::SessionLost);
        };
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: secret,
                    aad: fingerprint.as_str().as_bytes(),
                },
            )
            .map_err(|_| Error::CryptoInternal)?;
        Ok(WrappedSecret {
            fingerprint: fingerprint.clone(),
            nonce,
            ciphertext,
        })
    }

    /// Decrypt a wrapped secret into a zeroizing buffer.
    ///
    /// Every failure is `SessionLost`: either the wrapping key changed
    /// (new session, wipe) or the record was tampered with. Both mean the
    /// secret must be re-imported.
    pub fn unwrap(&self, wrapped: &WrappedSecret) -> Result<SecretBuffer> {
        let state = self.lock();
        let Some(cipher) = state.cipher.as_ref() else {
            return Err(Error::SessionLost);
        };
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&wrapped.nonce),
                Payload {
                    msg: wrapped.ciphertext.as_slice(),
                    aad: wrapped.fingerprint.as_str().as_bytes(),
                },
            )
            .map_err(|_| Error::SessionLost)?;
        Ok(SecretBuffer::from_vec(plaintext))
    }

    /// Destroy the session wrapping key. All existing wrapped secrets
    /// become permanently un-unwrappable.
    pub fn wipe(&self) {
        let mut state = self.lock();
        state.cipher = None;
        state.issued_nonces.clear();
        tracing::warn!("session wrapping key wiped");
    }

    /// Whether the session key has been wiped.
    #[must_use]
    pub fn is_wiped(&self) -> bool {
        self.lock().cipher.is_none()
    }
}

impl Default for SecretProtector {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SecretProtector {
    fn drop(&mut self) {
        // Session teardown counts as a wipe.
        let mut state = self.lock();
        state.cipher = None;
        state.issued_nonces.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp() -> Fingerprint {
        Fingerprint::parse("0123456789ABCDEF0123456789ABCDEF01234567").unwrap()
    }

    #[test]
    fn wrap_unwrap_round_trip() {
        let protector = SecretProtector::new();
        let wrapped = protector.wrap(&fp(), b"armored secret key bytes").unwrap();
        let buffer = protector.unwrap(&wrapped).unwrap();
        assert_eq!(buffer.expose(), b"armored secret key bytes");
    }

    #[test]
    fn distinct_nonces_per_wrap() {
        let protector = SecretProtector::new();
        let a = protector.wrap(&fp(), b"one").unwrap();
        let b = protector.wrap(&fp(), b"two").unwrap();
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn tampered_ciphertext_is_session_lost() {
        let protector = SecretProtector::new();
        let mut wrapped = protector.wrap(&fp(), b"secret").unwrap();
        wrapped.ciphertext[0] ^= 0x01;
        assert!(matches!(
            protector.unwrap(&wrapped),
            Err(Error::SessionLost)
        ));
    }

    #[test]
    fn foreign_fingerprint_is_session_lost() {
        let protector = SecretProtector::new();
        let mut wrapped = protector.wrap(&fp(), b"secret").unwrap();
        wrapped.fingerprint =
            Fingerprint::parse("FFFF456789ABCDEF0123456789ABCDEF01234567").unwrap();
        assert!(matches!(
            protector.unwrap(&wrapped),
            Err(Error::SessionLost)
        ));
    }

    #[test]
    fn wipe_strands_existing_wraps() {
        let protector = SecretProtector::new();
        let wrapped = protector.wrap(&fp(), b"secret").unwrap();
        protector.wipe();
        assert!(protector.is_wiped());
        assert!(matches!(
            protector.unwrap(&wrapped),
            Err(Error::SessionLost)
        ));
        assert!(matches!(
            protector.wrap(&fp(), b"more"),
            Err(Error::SessionLost)
        ));
    }

    #[test]
    fn other_session_cannot_unwrap() {
        let a = SecretProtector::new();
        let b = SecretProtector::new();
        let wrapped = a.wrap(&fp(), b"secret").unwrap();
        assert!(matches!(b.unwrap(&wrapped), Err(Error::SessionLost)));
    }
}
