//! At-rest storage for wrapped secrets.
//!
//! Three backends behind one contract:
//! - OS credential vault (Windows DPAPI, macOS Keychain, Linux Secret
//!   Service) via the `keyring` crate
//! - owner-only files under the secrets directory, written atomically
//! - a RAM map, used unconditionally in OPSEC mode
//!
//! The backend is chosen once at initialization, never per call. Every
//! fingerprint reaching a backend is already hex-validated by
//! [`Fingerprint`], so file names and vault entry names are injection-free.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::config::{CoreConfig, CredentialBackendKind};
use crate::error::{Error, Result};
use crate::secrets::WrappedSecret;
use crate::types::Fingerprint;

/// Service name under which vault entries are registered.
const VAULT_SERVICE: &str = "keychainpgp";

/// Vault entry that tracks which fingerprints we hold. The Secret
/// Service API cannot enumerate entries, so the store keeps its own
/// index; fingerprints are public data.
const VAULT_INDEX_ENTRY: &str = "__index__";

/// Version byte of the stored record framing.
const RECORD_VERSION: u8 = 1;

const NONCE_LEN: usize = 12;

fn backend_err(reason: impl Into<String>) -> Error {
    Error::BackendUnavailable {
        reason: reason.into(),
    }
}

/// Frame a wrapped secret: `version:u8 | nonce:12B | ciphertext`.
fn encode_record(wrapped: &WrappedSecret) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + NONCE_LEN + wrapped.ciphertext.len());
    out.push(RECORD_VERSION);
    out.extend_from_slice(&wrapped.nonce);
    out.extend_from_slice(&wrapped.ciphertext);
    out
}

fn decode_record(fingerprint: &Fingerprint, data: &[u8]) -> Result<WrappedSecret> {
    if data.len() < 1 + NONCE_LEN || data[0] != RECORD_VERSION {
        return Err(backend_err("stored secret record is not readable"));
    }
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&data[1..1 + NONCE_LEN]);
    Ok(WrappedSecret {
        fingerprint: fingerprint.clone(),
        nonce,
        ciphertext: data[1 + NONCE_LEN..].to_vec(),
    })
}

/// Pluggable at-rest storage for wrapped secrets.
pub enum CredentialStore {
    Vault(VaultBackend),
    File(FileBackend),
    Memory(MemoryBackend),
}

impl CredentialStore {
    /// Open the backend the configuration asks for. `Auto` probes the OS
    /// vault and falls back to the file backend when the probe fails.
    pub fn open(config: &CoreConfig) -> Result<Self> {
        match config.credential_backend {
            CredentialBackendKind::Memory => Ok(Self::memory()),
            CredentialBackendKind::Vault => Ok(Self::Vault(VaultBackend::probe()?)),
            CredentialBackendKind::File => {
                Ok(Self::File(FileBackend::open(&config.secrets_dir())?))
            }
            CredentialBackendKind::Auto => match VaultBackend::probe() {
                Ok(vault) => Ok(Self::Vault(vault)),
                Err(e) => {
                    tracing::warn!("OS vault unavailable, falling back to file backend: {e}");
                    Ok(Self::File(FileBackend::open(&config.secrets_dir())?))
                }
            },
        }
    }

    /// A fresh RAM-only store (OPSEC mode).
    #[must_use]
    pub fn memory() -> Self {
        Self::Memory(MemoryBackend::new())
    }

    /// Store a wrapped secret, replacing any previous record.
    pub fn put(&self, wrapped: &WrappedSecret) -> Result<()> {
        match self {
            Self::Vault(b) => b.put(wrapped),
            Self::File(b) => b.put(wrapped),
            Self::Memory(b) => b.put(wrapped),
        }?;
        tracing::debug!(key = wrapped.fingerprint.short(), "stored wrapped secret");
        Ok(())
    }

    /// Fetch a wrapped secret, if present.
    pub fn get(&self, fingerprint: &Fingerprint) -> Result<Option<WrappedSecret>> {
        match self {
            Self::Vault(b) => b.get(fingerprint),
            Self::File(b) => b.get(fingerprint),
            Self::Memory(b) => b.get(fingerprint),
        }
    }

    /// Delete a wrapped secret. Returns whether a record existed.
    pub fn delete(&self, fingerprint: &Fingerprint) -> Result<bool> {
        let existed = match self {
            Self::Vault(b) => b.delete(fingerprint),
            Self::File(b) => b.delete(fingerprint),
            Self::Memory(b) => b.delete(fingerprint),
        }?;
        if existed {
            tracing::debug!(key = fingerprint.short(), "deleted wrapped secret");
        }
        Ok(existed)
    }

    /// All fingerprints with a stored secret.
    pub fn list_fingerprints(&self) -> Result<HashSet<Fingerprint>> {
        match self {
            Self::Vault(b) => b.list(),
            Self::File(b) => b.list(),
            Self::Memory(b) => b.list(),
        }
    }

    /// Drop every record. Used by OPSEC teardown and panic wipe.
    pub fn clear(&self) -> Result<()> {
        for fingerprint in self.list_fingerprints()? {
            self.delete(&fingerprint)?;
        }
        Ok(())
    }
}

/// OS credential vault backend.
pub struct VaultBackend {
    _private: (),
}

impl VaultBackend {
    /// Verify the vault actually works with a write/read/delete round
    /// trip before committing the session to it.
    fn probe() -> Result<Self> {
        let entry = keyring::Entry::new(VAULT_SERVICE, "__probe__")
            .map_err(|e| backend_err(format!("vault entry creation failed: {e}")))?;
        entry
            .set_password("probe")
            .map_err(|e| backend_err(format!("vault write failed: {e}")))?;
        entry
            .get_password()
            .map_err(|e| backend_err(format!("vault read failed: {e}")))?;
        let _ = entry.delete_password();
        Ok(Self { _private: () })
    }

    fn entry(fingerprint: &Fingerprint) -> Result<keyring::Entry> {
        keyring::Entry::new(VAULT_SERVICE, fingerprint.as_str())
            .map_err(|e| backend_err(format!("vault entry creation failed: {e}")))
    }

    fn read_index(&self) -> Result<HashSet<Fingerprint>> {
        let entry = keyring::Entry::new(VAULT_SERVICE, VAULT_INDEX_ENTRY)
            .map_err(|e| backend_err(format!("vault entry creation failed: {e}")))?;
        let raw = match entry.get_password() {
            Ok(raw) => raw,
            Err(keyring::Error::NoEntry) => return Ok(HashSet::new()),
            Err(e) => return Err(backend_err(format!("vault read failed: {e}"))),
        };
        let names: Vec<String> = serde_json::from_str(&raw)
            .map_err(|_| backend_err("vault index is not readable"))?;
        Ok(names
            .iter()
            .filter_map(|n| Fingerprint::parse(n).ok())
            .collect())
    }

    fn write_index(&self, index: &HashSet<Fingerprint>) -> Result<()> {
        let entry = keyring::Entry::new(VAULT_SERVICE, VAULT_INDEX_ENTRY)
            .map_err(|e| backend_err(format!("vault entry creation failed: {e}")))?;
        let names: Vec<&str> = index.iter().map(Fingerprint::as_str).collect();
        let raw = serde_json::to_string(&names)
            .map_err(|_| backend_err("vault index serialization failed"))?;
        entry
            .set_password(&raw)
            .map_err(|e| backend_err(format!("vault write failed: {e}")))
    }

    fn put(&self, wrapped: &WrappedSecret) -> Result<()> {
        // Base64, since some credential backends mangle raw bytes.
        let encoded = STANDARD.encode(encode_record(wrapped));
        Self::entry(&wrapped.fingerprint)?
            .set_password(&encoded)
            .map_err(|e| backend_err(format!("vault write failed: {e}")))?;

        let mut index = self.read_index()?;
        if index.insert(wrapped.fingerprint.clone()) {
            self.write_index(&index)?;
        }
        Ok(())
    }

    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<WrappedSecret>> {
        let encoded = match Self::entry(fingerprint)?.get_password() {
            Ok(encoded) => encoded,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => return Err(backend_err(format!("vault read failed: {e}"))),
        };
        let data = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|_| backend_err("stored secret record is not readable"))?;
        decode_record(fingerprint, &data).map(Some)
    }

    fn delete(&self, fingerprint: &Fingerprint) -> Result<bool> {
        let existed = match Self::entry(fingerprint)?.delete_password() {
            Ok(()) => true,
            Err(keyring::Error::NoEntry) => false,
            Err(e) => return Err(backend_err(format!("vault delete failed: {e}"))),
        };
        let mut index = self.read_index()?;
        if index.remove(fingerprint) {
            self.write_index(&index)?;
        }
        Ok(existed)
    }

    fn list(&self) -> Result<HashSet<Fingerprint>> {
        self.read_index()
    }
}

/// On-disk fallback backend: one file per fingerprint under the
/// secrets directory.
pub struct FileBackend {
    secrets_dir: PathBuf,
}

impl FileBackend {
    fn open(secrets_dir: &Path) -> Result<Self> {
        fs::create_dir_all(secrets_dir)
            .map_err(|e| backend_err(format!("cannot create secrets directory: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o700);
            fs::set_permissions(secrets_dir, perms)
                .map_err(|e| backend_err(format!("cannot restrict secrets directory: {e}")))?;
        }
        Ok(Self {
            secrets_dir: secrets_dir.to_path_buf(),
        })
    }

    fn secret_path(&self, fingerprint: &Fingerprint) -> Result<PathBuf> {
        let path = self.secrets_dir.join(format!("{}.key", fingerprint.as_str()));
        // The hex-only invariant makes escape impossible; verify anyway
        // before any filesystem call.
        if !path.starts_with(&self.secrets_dir) {
            return Err(Error::InvalidIdentifier);
        }
        Ok(path)
    }

    fn put(&self, wrapped: &WrappedSecret) -> Result<()> {
        let path = self.secret_path(&wrapped.fingerprint)?;
        let tmp = self
            .secrets_dir
            .join(format!(".{}.key.tmp", wrapped.fingerprint.as_str()));

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let record = encode_record(wrapped);
        let result = (|| -> std::io::Result<()> {
            let mut file = options.open(&tmp)?;
            file.write_all(&record)?;
            file.sync_all()?;
            drop(file);
            fs::rename(&tmp, &path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(backend_err(format!("secret file write failed: {e}")));
        }
        Ok(())
    }

    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<WrappedSecret>> {
        let path = self.secret_path(fingerprint)?;
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(backend_err(format!("secret file read failed: {e}"))),
        };
        decode_record(fingerprint, &data).map(Some)
    }

    fn delete(&self, fingerprint: &Fingerprint) -> Result<bool> {
        let path = self.secret_path(fingerprint)?;
        let len = match fs::metadata(&path) {
            Ok(meta) => meta.len() as usize,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(backend_err(format!("secret file stat failed: {e}"))),
        };

        // Best-effort overwrite before unlink. Flash translation layers
        // may keep stale copies; that caveat is inherent to the medium.
        let zeroed = (|| -> std::io::Result<()> {
            let mut file = fs::OpenOptions::new().write(true).open(&path)?;
            file.write_all(&vec![0u8; len])?;
            file.sync_all()
        })();
        if let Err(e) = zeroed {
            tracing::debug!("zero-overwrite before unlink failed: {e}");
        }

        fs::remove_file(&path).map_err(|e| backend_err(format!("secret file delete failed: {e}")))?;
        Ok(true)
    }

    fn list(&self) -> Result<HashSet<Fingerprint>> {
        let mut found = HashSet::new();
        let entries = fs::read_dir(&self.secrets_dir)
            .map_err(|e| backend_err(format!("secrets directory not readable: {e}")))?;
        for entry in entries {
            let entry = entry.map_err(|e| backend_err(format!("secrets directory not readable: {e}")))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name.strip_suffix(".key") else {
                continue;
            };
            if let Ok(fingerprint) = Fingerprint::parse(stem) {
                found.insert(fingerprint);
            }
        }
        Ok(found)
    }
}

/// RAM-only backend used in OPSEC mode. Nothing touches disk.
pub struct MemoryBackend {
    records: Mutex<HashMap<Fingerprint, WrappedSecret>>,
}

impl MemoryBackend {
    fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    // Force access after a panic so secrets can still be cleared.
    fn lock(&self) -> MutexGuard<'_, HashMap<Fingerprint, WrappedSecret>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn put(&self, wrapped: &WrappedSecret) -> Result<()> {
        self.lock()
            .insert(wrapped.fingerprint.clone(), wrapped.clone());
        Ok(())
    }

    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<WrappedSecret>> {
        Ok(self.lock().get(fingerprint).cloned())
    }

    fn delete(&self, fingerprint: &Fingerprint) -> Result<bool> {
        Ok(self.lock().remove(fingerprint).is_some())
    }

    fn list(&self) -> Result<HashSet<Fingerprint>> {
        Ok(self.lock().keys().cloned().collect())
    }
}
