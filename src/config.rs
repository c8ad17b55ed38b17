//! Core configuration.
//!
//! The shell hands the core exactly one configuration structure; the core
//! reads no ambient environment variables.

use std::path::PathBuf;

/// Which credential backend the session should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialBackendKind {
    /// Probe the OS vault first, fall back to the file backend.
    #[default]
    Auto,
    /// OS credential vault only.
    Vault,
    /// On-disk file backend only.
    File,
    /// RAM only. Forced while OPSEC mode is active.
    Memory,
}

/// Configuration for one keyring session.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Application data directory. The metadata database and the secrets
    /// directory live under it.
    pub data_dir: PathBuf,
    /// Backend preference for wrapped secrets.
    pub credential_backend: CredentialBackendKind,
    /// Emit armor headers (Comment) on ASCII-armored output.
    /// Off by default to minimize metadata leakage.
    pub include_armor_metadata: bool,
    /// Passphrase cache time-to-live in seconds.
    pub passphrase_ttl_secs: u64,
    /// Maximum accepted input size for certificates and messages, in bytes.
    pub max_input_bytes: usize,
}

/// Default passphrase cache TTL in seconds (10 minutes).
const DEFAULT_CACHE_TTL: u64 = 600;

/// Default input bound: 16 MiB covers any realistic key or clipboard message.
const DEFAULT_MAX_INPUT: usize = 16 * 1024 * 1024;

impl CoreConfig {
    /// Configuration rooted at the given data directory, everything else
    /// at defaults.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            credential_backend: CredentialBackendKind::Auto,
            include_armor_metadata: false,
            passphrase_ttl_secs: DEFAULT_CACHE_TTL,
            max_input_bytes: DEFAULT_MAX_INPUT,
        }
    }

    /// The directory holding wrapped secret files (file backend).
    #[must_use]
    pub fn secrets_dir(&self) -> PathBuf {
        self.data_dir.join("secrets")
    }

    /// Path of the metadata database.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("keyring.db")
    }
}
