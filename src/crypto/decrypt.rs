//! Message decryption and embedded-signature extraction.

use pgp::composed::{Message, SignedSecretKey};
use pgp::types::KeyTrait;

use crate::error::{Error, Result};
use crate::types::{Fingerprint, SignerInfo};

use super::{certs, passphrase_provider};

/// Result of a decrypt operation.
pub struct DecryptOutput {
    pub plaintext: Vec<u8>,
    /// Present when the message carried a signature, even if the signer
    /// is unknown.
    pub signer: Option<SignerInfo>,
}

pub(super) fn decrypt(
    ciphertext: &[u8],
    secret_key: &[u8],
    passphrase: Option<&[u8]>,
    known_certs: &[Vec<u8>],
) -> Result<DecryptOutput> {
    let message = certs::parse_message(ciphertext)?;
    let secret = certs::parse_secret_key(secret_key)?;

    let locked = secret_key_locked(&secret);
    if locked && passphrase.is_none() {
        return Err(Error::PassphraseRequired);
    }

    let (decrypted, _key_ids) = message
        .decrypt(passphrase_provider(passphrase), &[&secret])
        .map_err(|e| classify_decrypt_error(&e, locked, passphrase.is_some()))?;

    let signer = extract_signer(&decrypted, known_certs);

    let plaintext = decrypted
        .get_content()
        .map_err(|_| Error::MalformedCiphertext)?
        .ok_or(Error::MalformedCiphertext)?;

    Ok(DecryptOutput { plaintext, signer })
}

/// Whether any secret component of the key is passphrase-locked.
fn secret_key_locked(key: &SignedSecretKey) -> bool {
    key.primary_key.secret_params().is_encrypted()
        || key
            .secret_subkeys
            .iter()
            .any(|sk| sk.key.secret_params().is_encrypted())
}

/// Map an rPGP decrypt failure onto the kinds callers dispatch on.
///
/// rPGP collapses unlock and integrity failures into message-level
/// errors, so the stable substrings are the only reliable signal.
fn classify_decrypt_error(e: &pgp::errors::Error, locked: bool, had_passphrase: bool) -> Error {
    let text = e.to_string().to_ascii_lowercase();
    if text.contains("checksum") || text.contains("password") || text.contains("passphrase") {
        Error::BadPassphrase
    } else if text.contains("mdc") || text.contains("integrity") {
        Error::Tampered
    } else if locked && had_passphrase {
        Error::BadPassphrase
    } else {
        Error::WrongKey
    }
}

/// Pull signature information out of a decrypted message, verifying it
/// against the known certificates when possible. An unknown signer is
/// reported unverified rather than dropped.
fn extract_signer(message: &Message, known_certs: &[Vec<u8>]) -> Option<SignerInfo> {
    let signature = find_signature(message)?;
    let key_id = signature
        .issuer()
        .map(|id| hex::encode_upper(id.as_ref()));

    for cert_data in known_certs {
        let Ok(cert) = certs::parse_public_cert(cert_data) else {
            continue;
        };
        if certs::verify_with_cert(message, &cert) {
            return Some(SignerInfo {
                key_id,
                fingerprint: Fingerprint::from_bytes(&cert.fingerprint()).ok(),
                verified: true,
            });
        }
    }

    Some(SignerInfo {
        key_id,
        fingerprint: None,
        verified: false,
    })
}

fn find_signature(message: &Message) -> Option<&pgp::packet::Signature> {
    match message {
        Message::Signed { signature, .. } => Some(signature),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::super::CryptoEngine;
    use crate::error::Error;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let engine = CryptoEngine::new(false);
        let pair = engine
            .generate_key_pair("Alice", "alice@example.com", None)
            .unwrap();

        let ciphertext = engine.encrypt(b"hello", &[pair.certificate]).unwrap();
        let output = engine
            .decrypt(&ciphertext, pair.secret_key.expose(), None, &[])
            .unwrap();

        assert_eq!(output.plaintext, b"hello");
        assert!(output.signer.is_none());
    }

    #[test]
    fn locked_key_without_passphrase_is_passphrase_required() {
        let engine = CryptoEngine::new(false);
        let pair = engine
            .generate_key_pair("Alice", "alice@example.com", Some(b"pw-123"))
            .unwrap();

        let ciphertext = engine
            .encrypt(b"hello", &[pair.certificate])
            .unwrap();
        let result = engine.decrypt(&ciphertext, pair.secret_key.expose(), None, &[]);
        assert!(matches!(result, Err(Error::PassphraseRequired)));
    }

    #[test]
    fn wrong_passphrase_is_bad_passphrase() {
        let engine = CryptoEngine::new(false);
        let pair = engine
            .generate_key_pair("Alice", "alice@example.com", Some(b"pw-123"))
            .unwrap();

        let ciphertext = engine
            .encrypt(b"hello", &[pair.certificate])
            .unwrap();
        let result = engine.decrypt(&ciphertext, pair.secret_key.expose(), Some(b"wrong"), &[]);
        assert!(matches!(result, Err(Error::BadPassphrase)));
    }

    #[test]
    fn correct_passphrase_decrypts() {
        let engine = CryptoEngine::new(false);
        let pair = engine
            .generate_key_pair("Alice", "alice@example.com", Some(b"pw-123"))
            .unwrap();

        let ciphertext = engine
            .encrypt(b"hello", &[pair.certificate])
            .unwrap();
        let output = engine
            .decrypt(&ciphertext, pair.secret_key.expose(), Some(b"pw-123"), &[])
            .unwrap();
        assert_eq!(output.plaintext, b"hello");
    }

    #[test]
    fn foreign_key_is_wrong_key() {
        let engine = CryptoEngine::new(false);
        let alice = engine
            .generate_key_pair("Alice", "alice@example.com", None)
            .unwrap();
        let bob = engine
            .generate_key_pair("Bob", "bob@example.com", None)
            .unwrap();

        let ciphertext = engine.encrypt(b"hello", &[alice.certificate]).unwrap();
        let result = engine.decrypt(&ciphertext, bob.secret_key.expose(), None, &[]);
        assert!(matches!(result, Err(Error::WrongKey)));
    }

    #[test]
    fn garbage_ciphertext_is_malformed() {
        let engine = CryptoEngine::new(false);
        let pair = engine
            .generate_key_pair("Alice", "alice@example.com", None)
            .unwrap();
        let result = engine.decrypt(b"not a message", pair.secret_key.expose(), None, &[]);
        assert!(matches!(result, Err(Error::MalformedCiphertext)));
    }
}
