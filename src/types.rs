//! Core data types shared across the keyring.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An OpenPGP key fingerprint: 40 (v4) or 64 (v6) uppercase hex characters.
///
/// Every fingerprint entering the crate goes through [`Fingerprint::parse`],
/// so downstream code (storage paths, vault entry names, SQL) can rely on
/// the hex-only shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Validate and normalize a fingerprint string.
    ///
    /// Accepts 40- or 64-character hex, case-insensitive on input,
    /// stored uppercase. Anything else is `InvalidIdentifier`.
    pub fn parse(hex: &str) -> Result<Self> {
        let normalized = hex.trim().to_ascii_uppercase();
        let valid_len = normalized.len() == 40 || normalized.len() == 64;
        if !valid_len || !normalized.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidIdentifier);
        }
        Ok(Self(normalized))
    }

    /// Build a fingerprint from raw key material bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::parse(&hex::encode_upper(bytes))
    }

    /// The full uppercase hex form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Grouped hex for display, e.g. `"7A3F 9B2C 4D1E 8F05 ..."`.
    #[must_use]
    pub fn display_grouped(&self) -> String {
        self.0
            .as_bytes()
            .chunks(4)
            .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The last 16 hex characters (key-id form).
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[self.0.len() - 16..]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A User ID associated with an OpenPGP key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserId {
    /// Display name (e.g. "Alice Johnson").
    pub name: Option<String>,
    /// Email address (e.g. "alice@example.com").
    pub email: Option<String>,
}

impl UserId {
    /// Create a User ID with both name and email.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: Some(email.into()),
        }
    }

    /// Parse an OpenPGP User ID packet string, e.g. `"Alice <alice@example.com>"`.
    #[must_use]
    pub fn from_openpgp_string(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(start) = raw.rfind('<') {
            if let Some(end) = raw.rfind('>') {
                if end > start {
                    let name = raw[..start].trim();
                    let email = raw[start + 1..end].trim();
                    return Self {
                        name: (!name.is_empty()).then(|| name.to_string()),
                        email: (!email.is_empty()).then(|| email.to_string()),
                    };
                }
            }
        }
        if raw.contains('@') {
            Self {
                name: None,
                email: Some(raw.to_string()),
            }
        } else {
            Self {
                name: (!raw.is_empty()).then(|| raw.to_string()),
                email: None,
            }
        }
    }

    /// Format as an OpenPGP User ID string: `"Name <email>"`.
    #[must_use]
    pub fn to_openpgp_string(&self) -> String {
        match (&self.name, &self.email) {
            (Some(name), Some(email)) => format!("{name} <{email}>"),
            (Some(name), None) => name.clone(),
            (None, Some(email)) => format!("<{email}>"),
            (None, None) => String::new(),
        }
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_openpgp_string())
    }
}

/// Trust level for a key in the keyring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrustLevel {
    /// Trust has not been established.
    Unknown,
    /// Key was imported but not verified out-of-band.
    Imported,
    /// Key has been verified by the user (e.g. fingerprint comparison).
    Verified,
}

impl TrustLevel {
    /// Integer form used in storage and bundle entries.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Unknown => 0,
            Self::Imported => 1,
            Self::Verified => 2,
        }
    }

    /// Decode the storage integer; out-of-range values degrade to `Unknown`.
    #[must_use]
    pub fn from_i64(v: i64) -> Self {
        match v {
            1 => Self::Imported,
            2 => Self::Verified,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Imported => write!(f, "Imported"),
            Self::Verified => write!(f, "Verified"),
        }
    }
}

/// A persistent metadata row for one key.
///
/// `is_own_key` is true iff a wrapped secret exists in the credential
/// store; startup repair restores the agreement if the two drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecord {
    pub fingerprint: Fingerprint,
    /// The primary User ID.
    pub user_id: UserId,
    /// All User IDs carried by the certificate.
    pub all_user_ids: Vec<UserId>,
    /// Human-readable algorithm label, e.g. "Ed25519".
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub trust_level: TrustLevel,
    pub is_own_key: bool,
    /// ASCII-armored public certificate.
    pub certificate: Vec<u8>,
    /// When this row entered the keyring.
    pub added_at: DateTime<Utc>,
}

/// Capabilities a subkey is certified for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyCapability {
    Sign,
    Encrypt,
    Certify,
    Authenticate,
}

impl fmt::Display for KeyCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sign => write!(f, "sign"),
            Self::Encrypt => write!(f, "encrypt"),
            Self::Certify => write!(f, "certify"),
            Self::Authenticate => write!(f, "authenticate"),
        }
    }
}

/// Metadata for one subkey, as reported by `inspect`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubkeyInfo {
    pub fingerprint: Fingerprint,
    pub capabilities: Vec<KeyCapability>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
}

/// Parsed view of a certificate. Produced by `inspect`; no side effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertInfo {
    pub fingerprint: Fingerprint,
    pub user_ids: Vec<UserId>,
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub has_secret_key: bool,
    pub subkeys: Vec<SubkeyInfo>,
}

impl CertInfo {
    /// The primary User ID, if the certificate carries any.
    #[must_use]
    pub fn primary_user_id(&self) -> UserId {
        self.user_ids.first().cloned().unwrap_or(UserId {
            name: None,
            email: None,
        })
    }
}

/// Signature information attached to a decrypted message.
///
/// An unknown signer is reported with `verified = false`, never dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerInfo {
    /// Hex key id of the issuing (sub)key, when the signature names one.
    pub key_id: Option<String>,
    /// Primary fingerprint of the matching known certificate, if any.
    pub fingerprint: Option<Fingerprint>,
    pub verified: bool,
}

/// Result of signature verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOutcome {
    pub valid: bool,
    /// Primary-key fingerprint of the signer, when verification succeeded.
    pub signer_fingerprint: Option<Fingerprint>,
    /// Trust label attached from the metadata store, if the signer is known.
    pub trust_level: Option<TrustLevel>,
    pub verified_at: DateTime<Utc>,
}
