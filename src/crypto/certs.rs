//! Shared certificate parsing helpers for the engine modules.

use chrono::Utc;
use pgp::composed::{Deserializable, Message, SignedPublicKey, SignedSecretKey};
use pgp::packet::SignatureType;
use pgp::types::KeyTrait;

use crate::error::{Error, Result};

use super::armor;

/// Parse an armored or binary public certificate.
pub(super) fn parse_public_cert(data: &[u8]) -> Result<SignedPublicKey> {
    if armor::is_pgp_public_key(data) {
        let text = std::str::from_utf8(data).map_err(|_| Error::MalformedCertificate)?;
        let (key, _headers) =
            SignedPublicKey::from_string(text).map_err(|_| Error::MalformedCertificate)?;
        Ok(key)
    } else {
        SignedPublicKey::from_bytes(data).map_err(|_| Error::MalformedCertificate)
    }
}

/// Parse an armored or binary secret key.
pub(super) fn parse_secret_key(data: &[u8]) -> Result<SignedSecretKey> {
    if armor::is_pgp_private_key(data) {
        let text = std::str::from_utf8(data).map_err(|_| Error::MalformedCertificate)?;
        let (key, _headers) =
            SignedSecretKey::from_string(text).map_err(|_| Error::MalformedCertificate)?;
        Ok(key)
    } else {
        SignedSecretKey::from_bytes(data).map_err(|_| Error::MalformedCertificate)
    }
}

/// Parse an armored or binary OpenPGP message.
pub(super) fn parse_message(data: &[u8]) -> Result<Message> {
    if armor::is_pgp_armored(data) {
        let text = std::str::from_utf8(data).map_err(|_| Error::MalformedCiphertext)?;
        let (message, _headers) =
            Message::from_string(text).map_err(|_| Error::MalformedCiphertext)?;
        Ok(message)
    } else {
        Message::from_bytes(data).map_err(|_| Error::MalformedCiphertext)
    }
}

/// Whether the certificate carries a revocation self-signature.
pub(super) fn is_cert_revoked(cert: &SignedPublicKey) -> bool {
    !cert.details.revocation_signatures.is_empty()
}

/// Whether the certificate is past its expiration.
pub(super) fn is_cert_expired(cert: &SignedPublicKey) -> bool {
    cert.expires_at().is_some_and(|t| t < Utc::now())
}

/// Encryption-capable, non-revoked subkeys of a certificate.
pub(super) fn encryption_subkeys(
    cert: &SignedPublicKey,
) -> Vec<&pgp::composed::SignedPublicSubKey> {
    cert.public_subkeys
        .iter()
        .filter(|sk| sk.is_encryption_key())
        .filter(|sk| {
            !sk.signatures
                .iter()
                .any(|sig| sig.typ() == SignatureType::SubkeyRevocation)
        })
        .collect()
}

/// Verify a signed message with the certificate's primary key, falling
/// back to its subkeys.
pub(super) fn verify_with_cert(message: &Message, cert: &SignedPublicKey) -> bool {
    if message.verify(cert).is_ok() {
        return true;
    }
    cert.public_subkeys
        .iter()
        .any(|sk| message.verify(sk).is_ok())
}

/// Uppercase hex fingerprint of a certificate's primary key.
pub(super) fn primary_fingerprint_hex(cert: &SignedPublicKey) -> String {
    hex::encode_upper(cert.fingerprint())
}
