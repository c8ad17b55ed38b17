/// Errors that can occur in the keyring core.
///
/// Commands return kinds; rendering them as user-facing prose is the
/// shell's job. Cryptographic failure kinds never carry strings from the
/// underlying libraries.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A fingerprint or other identifier failed validation.
    #[error("invalid identifier")]
    InvalidIdentifier,

    /// The requested key is not in the keyring.
    #[error("key not found: {fingerprint}")]
    NotFound { fingerprint: String },

    /// A key with this fingerprint already exists.
    #[error("key already exists: {fingerprint}")]
    Duplicate { fingerprint: String },

    /// The data does not parse as an OpenPGP certificate.
    #[error("malformed certificate")]
    MalformedCertificate,

    /// The data does not parse as an OpenPGP message.
    #[error("malformed ciphertext")]
    MalformedCiphertext,

    /// The message failed integrity protection.
    #[error("message integrity check failed")]
    Tampered,

    /// The secret key is locked and no passphrase was supplied.
    #[error("passphrase required")]
    PassphraseRequired,

    /// The supplied passphrase was incorrect.
    #[error("incorrect passphrase")]
    BadPassphrase,

    /// No available secret key can decrypt this message.
    #[error("no matching secret key for this message")]
    WrongKey,

    /// A recipient certificate has no usable encryption subkey.
    #[error("recipient key unusable: {fingerprint}")]
    RecipientUnusable { fingerprint: String },

    /// Encryption was requested with an empty recipient list.
    #[error("no recipients specified")]
    NoRecipients,

    /// The session wrapping key is gone; the wrapped secret is
    /// unrecoverable until the key is re-imported.
    #[error("session key lost; re-import the secret key")]
    SessionLost,

    /// The storage backend failed or is unavailable.
    #[error("storage backend unavailable: {reason}")]
    BackendUnavailable { reason: String },

    /// Transfer bundle parts disagree about the part count.
    #[error("inconsistent bundle parts")]
    InconsistentBundle,

    /// The transfer bundle ended before its framing said it would.
    #[error("truncated bundle")]
    TruncatedBundle,

    /// The transfer bundle framing is not parseable.
    #[error("corrupt bundle framing")]
    CorruptFraming,

    /// The transfer bundle declares a version this build does not speak.
    #[error("unsupported bundle version: {version}")]
    UnsupportedVersion { version: u8 },

    /// An input exceeded a configured bound.
    #[error("capacity exceeded")]
    CapacityExceeded,

    /// The command was cancelled between I/O steps.
    #[error("cancelled")]
    Cancelled,

    /// More than one own key exists; the caller must pick the signer.
    #[error("multiple signing keys; select one")]
    SignerSelectionRequired,

    /// Key generation failed.
    #[error("failed to generate key pair: {reason}")]
    KeyGeneration { reason: String },

    /// Signing failed.
    #[error("failed to sign data: {reason}")]
    Signing { reason: String },

    /// An unexpected failure inside the OpenPGP backend.
    #[error("internal crypto error")]
    CryptoInternal,

    /// A database or filesystem operation failed.
    #[error("storage error: {reason}")]
    Storage { reason: String },
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Storage {
            reason: e.to_string(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage {
            reason: e.to_string(),
        }
    }
}

/// Convenience type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
