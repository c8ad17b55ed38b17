//! OpenPGP cryptographic operations.
//!
//! Stateless primitives over byte sequences and certificates, backed by
//! rPGP. No I/O, no globals, no hidden caches; callers bound all input
//! sizes before handing data in.

pub mod armor;
mod certs;
mod decrypt;
mod encrypt;
mod generate;
mod inspect;
mod sign;
mod verify;

use std::collections::BTreeMap;

use pgp::types::SecretKeyTrait;

use crate::error::Result;
use crate::secrets::SecretBuffer;
use crate::types::{CertInfo, Fingerprint, VerifyOutcome};

pub use armor::{detect_pgp_block, is_pgp_armored, PgpBlockKind};
pub use decrypt::DecryptOutput;

/// A generated OpenPGP key pair.
pub struct GeneratedKeyPair {
    /// ASCII-armored public certificate.
    pub certificate: Vec<u8>,
    /// ASCII-armored secret key, zeroized on drop.
    pub secret_key: SecretBuffer,
    /// Uppercase hex fingerprint of the primary key.
    pub fingerprint: Fingerprint,
    /// ASCII-armored revocation certificate. The caller must persist or
    /// surface it; the engine does not keep a copy.
    pub revocation_certificate: Vec<u8>,
}

/// Stateless OpenPGP engine.
pub struct CryptoEngine {
    /// Armor headers attached to output when configured; `None` emits
    /// bare armor with no metadata.
    armor_headers: Option<BTreeMap<String, String>>,
}

impl CryptoEngine {
    /// Create an engine. `include_armor_metadata` controls whether
    /// armored output carries identifying headers.
    #[must_use]
    pub fn new(include_armor_metadata: bool) -> Self {
        let armor_headers = include_armor_metadata.then(|| {
            let mut headers = BTreeMap::new();
            headers.insert("Comment".to_string(), "KeychainPGP".to_string());
            headers
        });
        Self { armor_headers }
    }

    pub(crate) fn headers(&self) -> Option<&BTreeMap<String, String>> {
        self.armor_headers.as_ref()
    }

    /// Generate an Ed25519 signing key with an X25519 encryption subkey,
    /// certified with a two-year expiration.
    pub fn generate_key_pair(
        &self,
        name: &str,
        email: &str,
        passphrase: Option<&[u8]>,
    ) -> Result<GeneratedKeyPair> {
        generate::generate_key_pair(self, name, email, passphrase)
    }

    /// Encrypt plaintext for the given armored recipient certificates.
    pub fn encrypt(&self, plaintext: &[u8], recipient_certs: &[Vec<u8>]) -> Result<Vec<u8>> {
        encrypt::encrypt(self, plaintext, recipient_certs)
    }

    /// Decrypt an OpenPGP message with the given armored secret key.
    ///
    /// `known_certs` are candidate signer certificates used to verify an
    /// embedded signature; an unknown signer is still reported, unverified.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        secret_key: &[u8],
        passphrase: Option<&[u8]>,
        known_certs: &[Vec<u8>],
    ) -> Result<DecryptOutput> {
        decrypt::decrypt(ciphertext, secret_key, passphrase, known_certs)
    }

    /// Create an inline-signed armored message.
    pub fn sign(
        &self,
        data: &[u8],
        secret_key: &[u8],
        passphrase: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        sign::sign_inline(self, data, secret_key, passphrase)
    }

    /// Create a detached armored signature.
    pub fn sign_detached(
        &self,
        data: &[u8],
        secret_key: &[u8],
        passphrase: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        sign::sign_detached(self, data, secret_key, passphrase)
    }

    /// Verify an inline-signed message against candidate certificates.
    /// Candidates are tried in order; the first that validates wins.
    pub fn verify(&self, signed_data: &[u8], candidate_certs: &[Vec<u8>]) -> Result<VerifyOutcome> {
        verify::verify_inline(signed_data, candidate_certs)
    }

    /// Verify a detached signature over `data`.
    pub fn verify_detached(
        &self,
        signature: &[u8],
        data: &[u8],
        candidate_certs: &[Vec<u8>],
    ) -> Result<VerifyOutcome> {
        verify::verify_detached(signature, data, candidate_certs)
    }

    /// Parse a certificate (public or secret) and extract metadata.
    pub fn inspect(&self, key_data: &[u8]) -> Result<CertInfo> {
        inspect::inspect(key_data)
    }

    /// Derive the armored public certificate from a secret key blob.
    /// Used on secret-key import so metadata only ever stores the
    /// public half.
    pub fn extract_public_certificate(&self, secret_key: &[u8]) -> Result<Vec<u8>> {
        let secret = certs::parse_secret_key(secret_key)?;
        let public = pgp::composed::SignedPublicKey::new(
            secret.primary_key.public_key(),
            secret.details.clone(),
            secret.public_subkeys.clone(),
        );
        let armored = public
            .to_armored_string(self.headers())
            .map_err(|_| crate::error::Error::MalformedCertificate)?;
        Ok(armored.into_bytes())
    }
}

/// rPGP takes passphrases as `String`-returning closures.
pub(crate) fn passphrase_provider(passphrase: Option<&[u8]>) -> impl Fn() -> String + '_ {
    move || {
        passphrase
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .unwrap_or_default()
    }
}
