//! Signing operations.

use pgp::composed::{Message, StandaloneSignature};
use pgp::crypto::hash::HashAlgorithm;
use pgp::types::SecretKeyTrait;

use crate::error::{Error, Result};

use super::{certs, passphrase_provider, CryptoEngine};

/// Create an inline-signed armored message.
pub(super) fn sign_inline(
    engine: &CryptoEngine,
    data: &[u8],
    secret_key: &[u8],
    passphrase: Option<&[u8]>,
) -> Result<Vec<u8>> {
    let secret = certs::parse_secret_key(secret_key)?;
    check_unlockable(&secret, passphrase)?;

    let message = Message::new_literal_bytes("", data);
    let signed = message
        .sign(&secret, passphrase_provider(passphrase), HashAlgorithm::SHA2_256)
        .map_err(|e| classify_sign_error(&e, passphrase.is_some()))?;

    let armored = signed
        .to_armored_string(engine.headers())
        .map_err(|_| Error::Signing {
            reason: "armor serialization failed".into(),
        })?;
    Ok(armored.into_bytes())
}

/// Create a detached armored signature over `data`.
pub(super) fn sign_detached(
    engine: &CryptoEngine,
    data: &[u8],
    secret_key: &[u8],
    passphrase: Option<&[u8]>,
) -> Result<Vec<u8>> {
    let secret = certs::parse_secret_key(secret_key)?;
    check_unlockable(&secret, passphrase)?;

    let signature = secret
        .create_signature(passphrase_provider(passphrase), HashAlgorithm::SHA2_256, data)
        .map_err(|e| classify_sign_error(&e, passphrase.is_some()))?;

    let armored = StandaloneSignature::new(signature)
        .to_armored_string(engine.headers())
        .map_err(|_| Error::Signing {
            reason: "armor serialization failed".into(),
        })?;
    Ok(armored.into_bytes())
}

fn check_unlockable(secret: &pgp::composed::SignedSecretKey, passphrase: Option<&[u8]>) -> Result<()> {
    let locked = secret.primary_key.secret_params().is_encrypted();
    if locked && passphrase.is_none() {
        return Err(Error::PassphraseRequired);
    }
    Ok(())
}

fn classify_sign_error(e: &pgp::errors::Error, had_passphrase: bool) -> Error {
    let text = e.to_string().to_ascii_lowercase();
    if text.contains("checksum") || text.contains("password") || text.contains("passphrase") {
        Error::BadPassphrase
    } else if had_passphrase {
        Error::BadPassphrase
    } else {
        Error::Signing {
            reason: "signature creation failed".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::CryptoEngine;
    use crate::error::Error;

    #[test]
    fn inline_sign_produces_armored_message() {
        let engine = CryptoEngine::new(false);
        let pair = engine
            .generate_key_pair("Alice", "alice@example.com", None)
            .unwrap();

        let signed = engine
            .sign(b"release notes", pair.secret_key.expose(), None)
            .unwrap();
        let text = String::from_utf8(signed).unwrap();
        assert!(text.contains("BEGIN PGP MESSAGE"));
    }

    #[test]
    fn detached_signature_is_armored() {
        let engine = CryptoEngine::new(false);
        let pair = engine
            .generate_key_pair("Alice", "alice@example.com", None)
            .unwrap();

        let signature = engine
            .sign_detached(b"release notes", pair.secret_key.expose(), None)
            .unwrap();
        let text = String::from_utf8(signature).unwrap();
        assert!(text.contains("BEGIN PGP SIGNATURE"));
    }

    #[test]
    fn locked_key_needs_passphrase() {
        let engine = CryptoEngine::new(false);
        let pair = engine
            .generate_key_pair("Alice", "alice@example.com", Some(b"pw-123"))
            .unwrap();

        let result = engine.sign(b"data", pair.secret_key.expose(), None);
        assert!(matches!(result, Err(Error::PassphraseRequired)));
    }
}
