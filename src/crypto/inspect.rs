//! Certificate inspection. Parsing only; no side effects.

use chrono::{DateTime, Utc};
use pgp::composed::{SignedPublicKey, SignedSecretKey};
use pgp::crypto::public_key::PublicKeyAlgorithm;
use pgp::packet::{Signature, SignatureType};
use pgp::types::KeyTrait;

use crate::error::Result;
use crate::types::{CertInfo, Fingerprint, KeyCapability, SubkeyInfo, UserId};

use super::{armor, certs};

/// Parse a certificate (public or secret, armored or binary) and extract
/// its metadata.
pub(super) fn inspect(key_data: &[u8]) -> Result<CertInfo> {
    if armor::is_pgp_private_key(key_data) {
        return inspect_secret(&certs::parse_secret_key(key_data)?);
    }
    if armor::is_pgp_public_key(key_data) {
        return inspect_public(&certs::parse_public_cert(key_data)?);
    }
    // Binary input: secret keys parse as either, so try secret first.
    if let Ok(secret) = certs::parse_secret_key(key_data) {
        return inspect_secret(&secret);
    }
    inspect_public(&certs::parse_public_cert(key_data)?)
}

fn inspect_public(cert: &SignedPublicKey) -> Result<CertInfo> {
    let fingerprint = Fingerprint::from_bytes(&cert.fingerprint())?;
    let user_ids = parse_user_ids(cert.details.users.iter().map(|u| u.id.id()));

    let subkeys = cert
        .public_subkeys
        .iter()
        .map(|sk| subkey_info(sk.fingerprint(), *sk.key.created_at(), &sk.signatures))
        .collect::<Result<Vec<_>>>()?;

    Ok(CertInfo {
        fingerprint,
        user_ids,
        algorithm: algorithm_label(cert.primary_key.algorithm()).to_string(),
        created_at: *cert.primary_key.created_at(),
        expires_at: cert.expires_at(),
        has_secret_key: false,
        subkeys,
    })
}

fn inspect_secret(key: &SignedSecretKey) -> Result<CertInfo> {
    let fingerprint = Fingerprint::from_bytes(&key.fingerprint())?;
    let user_ids = parse_user_ids(key.details.users.iter().map(|u| u.id.id()));

    let mut subkeys = Vec::new();
    for sk in &key.public_subkeys {
        subkeys.push(subkey_info(
            sk.fingerprint(),
            *sk.key.created_at(),
            &sk.signatures,
        )?);
    }
    for sk in &key.secret_subkeys {
        subkeys.push(subkey_info(
            sk.fingerprint(),
            *sk.key.created_at(),
            &sk.signatures,
        )?);
    }

    Ok(CertInfo {
        fingerprint,
        user_ids,
        algorithm: algorithm_label(key.primary_key.algorithm()).to_string(),
        created_at: *key.primary_key.created_at(),
        expires_at: key.expires_at(),
        has_secret_key: true,
        subkeys,
    })
}

fn subkey_info(
    fingerprint: Vec<u8>,
    created_at: DateTime<Utc>,
    signatures: &[Signature],
) -> Result<SubkeyInfo> {
    Ok(SubkeyInfo {
        fingerprint: Fingerprint::from_bytes(&fingerprint)?,
        capabilities: capabilities_from_signatures(signatures),
        created_at,
        expires_at: subkey_expiration(&created_at, signatures),
        revoked: signatures
            .iter()
            .any(|sig| sig.typ() == SignatureType::SubkeyRevocation),
    })
}

/// A subkey expires at its creation time plus the `KeyExpirationTime`
/// duration of its binding signature, mirroring how the primary key's
/// expiration is derived.
fn subkey_expiration(
    created_at: &DateTime<Utc>,
    signatures: &[Signature],
) -> Option<DateTime<Utc>> {
    let binding = binding_signature(signatures)?;
    binding
        .key_expiration_time()
        .map(|expiration| *created_at + *expiration)
}

fn binding_signature(signatures: &[Signature]) -> Option<&Signature> {
    signatures
        .iter()
        .find(|sig| sig.typ() == SignatureType::SubkeyBinding)
        .or_else(|| signatures.first())
}

fn parse_user_ids<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<UserId> {
    raw.map(UserId::from_openpgp_string).collect()
}

fn capabilities_from_signatures(signatures: &[Signature]) -> Vec<KeyCapability> {
    let Some(binding) = binding_signature(signatures) else {
        return Vec::new();
    };

    let flags = binding.key_flags();
    let mut capabilities = Vec::new();
    if flags.certify() {
        capabilities.push(KeyCapability::Certify);
    }
    if flags.sign() {
        capabilities.push(KeyCapability::Sign);
    }
    if flags.encrypt_comms() || flags.encrypt_storage() {
        capabilities.push(KeyCapability::Encrypt);
    }
    capabilities
}

fn algorithm_label(algorithm: PublicKeyAlgorithm) -> &'static str {
    match algorithm {
        PublicKeyAlgorithm::EdDSA => "Ed25519",
        PublicKeyAlgorithm::ECDH => "X25519",
        PublicKeyAlgorithm::ECDSA => "ECDSA",
        PublicKeyAlgorithm::RSA => "RSA",
        PublicKeyAlgorithm::DSA => "DSA",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::super::CryptoEngine;
    use crate::types::KeyCapability;

    #[test]
    fn inspect_public_certificate() {
        let engine = CryptoEngine::new(false);
        let pair = engine
            .generate_key_pair("Alice Johnson", "alice@example.com", None)
            .unwrap();

        let info = engine.inspect(&pair.certificate).unwrap();
        assert_eq!(info.fingerprint, pair.fingerprint);
        assert!(!info.has_secret_key);
        assert_eq!(info.algorithm, "Ed25519");

        let uid = info.primary_user_id();
        assert_eq!(uid.name.as_deref(), Some("Alice Johnson"));
        assert_eq!(uid.email.as_deref(), Some("alice@example.com"));

        assert!(info
            .subkeys
            .iter()
            .any(|sk| sk.capabilities.contains(&KeyCapability::Encrypt)));
    }

    #[test]
    fn inspect_reports_subkey_expiration() {
        let engine = CryptoEngine::new(false);
        let pair = engine
            .generate_key_pair("Alice", "alice@example.com", None)
            .unwrap();

        let info = engine.inspect(&pair.certificate).unwrap();
        let subkey = info.subkeys.first().expect("generated cert has a subkey");
        let expires = subkey
            .expires_at
            .expect("generated subkeys carry an expiration");
        assert!(expires > subkey.created_at);
    }

    #[test]
    fn inspect_secret_key_reports_secret_presence() {
        let engine = CryptoEngine::new(false);
        let pair = engine
            .generate_key_pair("Alice", "alice@example.com", None)
            .unwrap();

        let info = engine.inspect(pair.secret_key.expose()).unwrap();
        assert!(info.has_secret_key);
        assert_eq!(info.fingerprint, pair.fingerprint);
    }

    #[test]
    fn inspect_rejects_garbage() {
        let engine = CryptoEngine::new(false);
        assert!(engine.inspect(b"definitely not a key").is_err());
    }
}
