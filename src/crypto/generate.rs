//! Key pair generation.

use chrono::Utc;
use pgp::composed::{
    KeyType, SecretKeyParamsBuilder, SignedPublicKey, SignedSecretKey, StandaloneSignature,
    SubkeyParamsBuilder,
};
use pgp::crypto::hash::HashAlgorithm;
use pgp::packet::{RevocationCode, SignatureConfig, SignatureType, SignatureVersion, Subpacket};
use pgp::types::KeyTrait;

use crate::error::{Error, Result};
use crate::secrets::SecretBuffer;
use crate::types::{Fingerprint, UserId};

use super::{CryptoEngine, GeneratedKeyPair};

/// Default certificate validity: two years.
const DEFAULT_VALIDITY_DAYS: i64 = 730;

fn keygen_err(reason: &str) -> Error {
    Error::KeyGeneration {
        reason: reason.to_string(),
    }
}

/// Generate an Ed25519 primary signing key bound to an X25519 (Cv25519
/// ECDH) encryption subkey, plus a revocation certificate.
pub(super) fn generate_key_pair(
    engine: &CryptoEngine,
    name: &str,
    email: &str,
    passphrase: Option<&[u8]>,
) -> Result<GeneratedKeyPair> {
    let user_id = UserId::new(name, email).to_openpgp_string();
    let passphrase_string = passphrase.map(|p| String::from_utf8_lossy(p).into_owned());
    let pw = passphrase_string.clone().unwrap_or_default();

    let subkey = SubkeyParamsBuilder::default()
        .key_type(KeyType::ECDH)
        .can_encrypt(true)
        .expiration(Some(chrono::Duration::days(DEFAULT_VALIDITY_DAYS)))
        .passphrase(passphrase_string.clone())
        .build()
        .map_err(|_| keygen_err("encryption subkey parameters rejected"))?;

    let key_params = SecretKeyParamsBuilder::default()
        .key_type(KeyType::EdDSA)
        .can_certify(true)
        .can_sign(true)
        .primary_user_id(user_id)
        .expiration(Some(chrono::Duration::days(DEFAULT_VALIDITY_DAYS)))
        .passphrase(passphrase_string)
        .subkey(subkey)
        .build()
        .map_err(|_| keygen_err("key parameters rejected"))?;

    let secret_key = key_params
        .generate()
        .map_err(|_| keygen_err("key material generation failed"))?;

    let signed_secret_key = secret_key
        .sign(|| pw.clone())
        .map_err(|_| keygen_err("secret key self-signature failed"))?;

    let signed_public_key = signed_secret_key
        .public_key()
        .sign(&signed_secret_key, || pw.clone())
        .map_err(|_| keygen_err("public key certification failed"))?;

    let fingerprint = Fingerprint::from_bytes(&signed_secret_key.fingerprint())?;

    let certificate = signed_public_key
        .to_armored_string(engine.headers())
        .map_err(|_| keygen_err("certificate armor failed"))?
        .into_bytes();

    let secret_armored = signed_secret_key
        .to_armored_string(engine.headers())
        .map_err(|_| keygen_err("secret key armor failed"))?;

    let revocation_certificate =
        build_revocation(engine, &signed_secret_key, &signed_public_key, &pw)?;

    Ok(GeneratedKeyPair {
        certificate,
        secret_key: SecretBuffer::from_vec(secret_armored.into_bytes()),
        fingerprint,
        revocation_certificate,
    })
}

/// Pre-sign a key-revocation certificate so the user can revoke even
/// after losing the secret key.
fn build_revocation(
    engine: &CryptoEngine,
    secret_key: &SignedSecretKey,
    public_key: &SignedPublicKey,
    pw: &str,
) -> Result<Vec<u8>> {
    let mut config = SignatureConfig::new_v4(
        SignatureVersion::V4,
        SignatureType::KeyRevocation,
        secret_key.algorithm(),
        HashAlgorithm::SHA2_256,
    );
    config.hashed_subpackets = vec![
        Subpacket::SignatureCreationTime(Utc::now()),
        Subpacket::Issuer(secret_key.key_id()),
        Subpacket::RevocationReason(
            RevocationCode::NoReason,
            "revocation certificate created with the key".into(),
        ),
    ];

    let pw = pw.to_string();
    let signature = config
        .sign_key(secret_key, || pw.clone(), public_key)
        .map_err(|_| keygen_err("revocation signature failed"))?;

    let armored = StandaloneSignature::new(signature)
        .to_armored_string(engine.headers())
        .map_err(|_| keygen_err("revocation armor failed"))?;

    Ok(armored.into_bytes())
}
