//! # keychainpgp-keyring
//!
//! Keyring core for KeychainPGP: OpenPGP operations, protected secret
//! storage, and multi-key transfer bundles.
//!
//! The crate is organized leaf-to-root:
//! - [`crypto`] — stateless OpenPGP primitives (generate, encrypt,
//!   decrypt, sign, verify, inspect)
//! - [`secrets`] — the session wrapping key and zeroizing buffers
//! - [`store`] — at-rest storage: wrapped secrets (OS vault / file /
//!   RAM) and key metadata (SQLite / RAM)
//! - [`service`] — the [`KeyringService`] command surface orchestrating
//!   all of the above
//! - [`bundle`] — encrypted multi-key bundles chunked for QR transport
//!
//! Shell concerns (clipboard, hotkeys, rendering, keyserver fetchers)
//! live outside this crate and talk to it through [`KeyringService`].

pub mod bundle;
pub mod config;
pub mod crypto;
pub mod error;
pub mod secrets;
pub mod service;
pub mod store;
pub mod types;

pub use config::{CoreConfig, CredentialBackendKind};
pub use crypto::CryptoEngine;
pub use error::{Error, Result};
pub use secrets::{SecretBuffer, SecretProtector, WrappedSecret};
pub use service::{DecryptedMessage, GeneratedKey, KeyringService};
pub use store::{CredentialStore, MetadataStore};
pub use types::{CertInfo, Fingerprint, KeyRecord, TrustLevel, UserId};
