//! Message encryption.

use pgp::composed::Message;
use pgp::crypto::sym::SymmetricKeyAlgorithm;
use rand::rngs::OsRng;

use crate::error::{Error, Result};

use super::{certs, CryptoEngine};

/// Encrypt plaintext to every encryption-capable subkey of the given
/// recipient certificates. AES-256 session cipher, no compression.
pub(super) fn encrypt(
    engine: &CryptoEngine,
    plaintext: &[u8],
    recipient_certs: &[Vec<u8>],
) -> Result<Vec<u8>> {
    if recipient_certs.is_empty() {
        return Err(Error::NoRecipients);
    }

    let mut parsed = Vec::with_capacity(recipient_certs.len());
    for data in recipient_certs {
        parsed.push(certs::parse_public_cert(data)?);
    }

    let mut encryption_keys = Vec::new();
    for cert in &parsed {
        let fingerprint = certs::primary_fingerprint_hex(cert);
        if certs::is_cert_revoked(cert) || certs::is_cert_expired(cert) {
            return Err(Error::RecipientUnusable { fingerprint });
        }
        let subkeys = certs::encryption_subkeys(cert);
        if subkeys.is_empty() {
            return Err(Error::RecipientUnusable { fingerprint });
        }
        encryption_keys.extend(subkeys);
    }

    let message = Message::new_literal_bytes("", plaintext);
    let encrypted = message
        .encrypt_to_keys(&mut OsRng, SymmetricKeyAlgorithm::AES256, &encryption_keys)
        .map_err(|_| Error::CryptoInternal)?;

    let armored = encrypted
        .to_armored_string(engine.headers())
        .map_err(|_| Error::CryptoInternal)?;
    Ok(armored.into_bytes())
}
