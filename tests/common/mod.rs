//! Common test setup for integration tests.

use anyhow::Result;
use tempfile::TempDir;

use keychainpgp_keyring::{CoreConfig, CredentialBackendKind, KeyringService};

/// Initialize test logging (call once per test).
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("keychainpgp_keyring=debug")
        .with_test_writer()
        .try_init();
}

/// A keyring service over a temp directory, using the file credential
/// backend (the OS vault is absent on CI).
pub struct TestContext {
    pub service: KeyringService,
    pub data_dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Result<Self> {
        init_test_logging();
        let data_dir = tempfile::tempdir()?;
        let service = KeyringService::open(test_config(data_dir.path())).await?;
        Ok(Self { service, data_dir })
    }

    /// Open a second service over the same data directory, simulating a
    /// fresh session (new wrapping key) against the same persisted state.
    pub async fn new_session(&self) -> Result<KeyringService> {
        Ok(KeyringService::open(test_config(self.data_dir.path())).await?)
    }
}

pub fn test_config(data_dir: &std::path::Path) -> CoreConfig {
    let mut config = CoreConfig::new(data_dir);
    config.credential_backend = CredentialBackendKind::File;
    config
}
