//! Bundle envelope: passphrase-derived AEAD.
//!
//! Binary layout is `version:u8 | nonce:12B | ciphertext`. The KDF
//! parameters (and the fixed domain-separation salt) are implied by the
//! version byte; a wrong passphrase fails the AEAD tag and reveals
//! nothing about the plaintext.

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Envelope format version.
pub const ENVELOPE_VERSION: u8 = 1;

/// Domain-separation salt for version 1. The transfer passphrase is a
/// fresh 36-digit uniform random value per export, so the salt can be a
/// per-version constant.
const KDF_SALT: &[u8] = b"KCPGP-BUNDLE-V1";

// Argon2id parameters fixed for version 1: 64 MiB, 3 passes, 4 lanes.
const ARGON2_M_COST: u32 = 64 * 1024;
const ARGON2_T_COST: u32 = 3;
const ARGON2_P_COST: u32 = 4;
const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;

fn derive_key(passphrase: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let params = Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(KEY_LEN))
        .map_err(|_| Error::CryptoInternal)?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(passphrase, KDF_SALT, key.as_mut())
        .map_err(|_| Error::CryptoInternal)?;
    Ok(key)
}

/// Encrypt framed plaintext under the transfer passphrase.
pub fn seal(plaintext: &[u8], passphrase: &[u8]) -> Result<Vec<u8>> {
    let key = derive_key(passphrase)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_ref()));

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &[ENVELOPE_VERSION],
            },
        )
        .map_err(|_| Error::CryptoInternal)?;

    let mut envelope = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
    envelope.push(ENVELOPE_VERSION);
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

/// Decrypt an envelope with the user-entered passphrase.
pub fn open(envelope: &[u8], passphrase: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if envelope.is_empty() {
        return Err(Error::TruncatedBundle);
    }
    let version = envelope[0];
    if version != ENVELOPE_VERSION {
        return Err(Error::UnsupportedVersion { version });
    }
    if envelope.len() < 1 + NONCE_LEN + 16 {
        return Err(Error::TruncatedBundle);
    }

    let nonce = &envelope[1..1 + NONCE_LEN];
    let ciphertext = &envelope[1 + NONCE_LEN..];

    let key = derive_key(passphrase)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_ref()));

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: &[version],
            },
        )
        .map_err(|_| Error::BadPassphrase)?;

    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let envelope = seal(b"framed bundle bytes", b"1111-2222-3333").unwrap();
        assert_eq!(envelope[0], ENVELOPE_VERSION);

        let plaintext = open(&envelope, b"1111-2222-3333").unwrap();
        assert_eq!(plaintext.as_slice(), b"framed bundle bytes");
    }

    #[test]
    fn wrong_passphrase_is_bad_passphrase() {
        let envelope = seal(b"framed bundle bytes", b"1111-2222-3333").unwrap();
        assert!(matches!(
            open(&envelope, b"9999-9999-9999"),
            Err(Error::BadPassphrase)
        ));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut envelope = seal(b"data", b"pass").unwrap();
        envelope[0] = 2;
        assert!(matches!(
            open(&envelope, b"pass"),
            Err(Error::UnsupportedVersion { version: 2 })
        ));
    }

    #[test]
    fn truncated_envelope_is_rejected() {
        let envelope = seal(b"data", b"pass").unwrap();
        assert!(matches!(
            open(&envelope[..8], b"pass"),
            Err(Error::TruncatedBundle)
        ));
    }

    #[test]
    fn tampered_ciphertext_fails_closed() {
        let mut envelope = seal(b"data", b"pass").unwrap();
        let last = envelope.len() - 1;
        envelope[last] ^= 0x01;
        assert!(matches!(open(&envelope, b"pass"), Err(Error::BadPassphrase)));
    }
}
