//! Persistent storage for the keyring.
//!
//! Two stores with one contract each:
//! - `credential` — wrapped secret key material (OS vault, file, or RAM)
//! - `metadata` — public certificates and per-key metadata (SQLite or RAM)
//!
//! `schema.rs` holds the centralized table definitions and version
//! migration for the metadata database.

pub mod credential;
pub mod metadata;
pub mod schema;

pub use credential::CredentialStore;
pub use metadata::MetadataStore;
