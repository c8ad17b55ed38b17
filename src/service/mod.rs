//! The keyring service: orchestration of engine, protector, and stores.
//!
//! This is the public command surface. Every command validates its
//! identifiers at the boundary, returns error kinds, and leaves secret
//! material in zeroizing containers only as long as an operation is in
//! flight.

mod passphrase_cache;
mod repair;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use crate::bundle::{self, BundleEntry, BundleImportReport, ExportedBundle};
use crate::config::CoreConfig;
use crate::crypto::CryptoEngine;
use crate::error::{Error, Result};
use crate::secrets::{SecretBuffer, SecretProtector};
use crate::store::{CredentialStore, MetadataStore};
use crate::types::{
    CertInfo, Fingerprint, KeyRecord, SignerInfo, TrustLevel, UserId, VerifyOutcome,
};

pub use passphrase_cache::PassphraseCache;

/// Result of key generation: the stored record plus the revocation
/// certificate, which exists only in this return value.
pub struct GeneratedKey {
    pub record: KeyRecord,
    /// ASCII-armored revocation certificate. Shown to the user once;
    /// the core keeps no copy.
    pub revocation_certificate: Vec<u8>,
}

/// Result of a decrypt command.
pub struct DecryptedMessage {
    pub plaintext: Vec<u8>,
    pub signer: Option<SignerInfo>,
}

/// The keyring core's orchestration layer.
///
/// In OPSEC mode both stores are transparently replaced by volatile
/// backends; no other component is aware of the mode.
pub struct KeyringService {
    config: CoreConfig,
    engine: CryptoEngine,
    protector: SecretProtector,
    credentials: CredentialStore,
    metadata: MetadataStore,
    opsec_credentials: CredentialStore,
    opsec_metadata: MetadataStore,
    passphrase_cache: Mutex<PassphraseCache>,
    opsec_mode: AtomicBool,
}

impl KeyringService {
    /// Open the keyring described by the configuration and run startup
    /// reconciliation.
    pub async fn open(config: CoreConfig) -> Result<Self> {
        let engine = CryptoEngine::new(config.include_armor_metadata);
        let credentials = CredentialStore::open(&config)?;
        let metadata = MetadataStore::open(&config.db_path()).await?;

        let service = Self {
            engine,
            protector: SecretProtector::new(),
            credentials,
            metadata,
            opsec_credentials: CredentialStore::memory(),
            opsec_metadata: MetadataStore::volatile(),
            passphrase_cache: Mutex::new(PassphraseCache::new(config.passphrase_ttl_secs)),
            opsec_mode: AtomicBool::new(false),
            config,
        };

        repair::reconcile(&service.metadata, &service.credentials).await?;
        Ok(service)
    }

    fn opsec_active(&self) -> bool {
        self.opsec_mode.load(Ordering::SeqCst)
    }

    fn credentials(&self) -> &CredentialStore {
        if self.opsec_active() {
            &self.opsec_credentials
        } else {
            &self.credentials
        }
    }

    fn metadata(&self) -> &MetadataStore {
        if self.opsec_active() {
            &self.opsec_metadata
        } else {
            &self.metadata
        }
    }

    // Poisoning must not lock us out of the cache; a panicked command
    // still needs its passphrases cleared afterwards.
    fn cache(&self) -> MutexGuard<'_, PassphraseCache> {
        self.passphrase_cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_bound(&self, data: &[u8]) -> Result<()> {
        if data.len() > self.config.max_input_bytes {
            return Err(Error::CapacityExceeded);
        }
        Ok(())
    }

    // ========== Key management ==========

    /// Generate a key pair, wrap and store its secret, and record its
    /// metadata. Rolls the stored secret back if the metadata write fails.
    pub async fn generate_key_pair(
        &self,
        name: &str,
        email: &str,
        passphrase: Option<&[u8]>,
    ) -> Result<GeneratedKey> {
        let pair = self.engine.generate_key_pair(name, email, passphrase)?;
        let info = self.engine.inspect(&pair.certificate)?;

        let wrapped = self
            .protector
            .wrap(&pair.fingerprint, pair.secret_key.expose())?;
        self.credentials().put(&wrapped)?;

        let record = KeyRecord {
            fingerprint: pair.fingerprint.clone(),
            user_id: UserId::new(name, email),
            all_user_ids: info.user_ids,
            algorithm: info.algorithm,
            created_at: info.created_at,
            expires_at: info.expires_at,
            trust_level: TrustLevel::Verified,
            is_own_key: true,
            certificate: pair.certificate.clone(),
            added_at: Utc::now(),
        };

        if let Err(e) = self.metadata().upsert(&record).await {
            // Undo in reverse order so no orphaned secret survives.
            let _ = self.credentials().delete(&pair.fingerprint);
            return Err(e);
        }

        Ok(GeneratedKey {
            record,
            revocation_certificate: pair.revocation_certificate,
        })
    }

    /// Import a single key (public or secret). Re-importing a known
    /// fingerprint merges: user-id union, later expiration wins, and
    /// `is_own_key` only ever upgrades.
    pub async fn import_key(&self, blob: &[u8]) -> Result<KeyRecord> {
        self.check_bound(blob)?;
        let info = self.engine.inspect(blob)?;
        self.import_cert_info(blob, &info, None).await
    }

    async fn import_cert_info(
        &self,
        blob: &[u8],
        info: &CertInfo,
        trust_override: Option<TrustLevel>,
    ) -> Result<KeyRecord> {
        let fingerprint = info.fingerprint.clone();
        let existing = self.metadata().get(&fingerprint).await?;

        let certificate = if info.has_secret_key {
            let wrapped = self.protector.wrap(&fingerprint, blob)?;
            self.credentials().put(&wrapped)?;
            self.engine.extract_public_certificate(blob)?
        } else {
            blob.to_vec()
        };

        let record = match existing {
            Some(previous) => {
                let mut all_user_ids = previous.all_user_ids.clone();
                for uid in &info.user_ids {
                    if !all_user_ids.contains(uid) {
                        all_user_ids.push(uid.clone());
                    }
                }
                KeyRecord {
                    fingerprint: fingerprint.clone(),
                    user_id: info.primary_user_id(),
                    all_user_ids,
                    algorithm: info.algorithm.clone(),
                    created_at: info.created_at,
                    expires_at: merge_expiration(previous.expires_at, info.expires_at),
                    trust_level: trust_override.unwrap_or(previous.trust_level),
                    // Upgrade-only: a public re-import never clears it.
                    is_own_key: previous.is_own_key || info.has_secret_key,
                    certificate,
                    added_at: previous.added_at,
                }
            }
            None => KeyRecord {
                fingerprint: fingerprint.clone(),
                user_id: info.primary_user_id(),
                all_user_ids: info.user_ids.clone(),
                algorithm: info.algorithm.clone(),
                created_at: info.created_at,
                expires_at: info.expires_at,
                trust_level: trust_override.unwrap_or(if info.has_secret_key {
                    TrustLevel::Verified
                } else {
                    TrustLevel::Imported
                }),
                is_own_key: info.has_secret_key,
                certificate,
                added_at: Utc::now(),
            },
        };

        self.metadata().upsert(&record).await?;
        Ok(record)
    }

    /// All keys, own keys first, newest first.
    pub async fn list_keys(&self) -> Result<Vec<KeyRecord>> {
        self.metadata().list().await
    }

    /// Look up one key.
    pub async fn get_key(&self, fingerprint: &str) -> Result<KeyRecord> {
        let fingerprint = Fingerprint::parse(fingerprint)?;
        self.metadata()
            .get(&fingerprint)
            .await?
            .ok_or_else(|| Error::NotFound {
                fingerprint: fingerprint.as_str().to_string(),
            })
    }

    /// Parse the stored certificate of a key and return its full
    /// metadata, including subkeys.
    pub async fn inspect_key(&self, fingerprint: &str) -> Result<CertInfo> {
        let record = self.get_key(fingerprint).await?;
        let mut info = self.engine.inspect(&record.certificate)?;
        info.has_secret_key = record.is_own_key;
        Ok(info)
    }

    /// Case-insensitive search over names, emails, and fingerprint
    /// suffixes.
    pub async fn search_keys(&self, query: &str) -> Result<Vec<KeyRecord>> {
        self.metadata().search(query).await
    }

    /// Export a key. Secret export requires the explicit boolean; the
    /// result is always handed back in a zeroizing buffer.
    pub async fn export_key(&self, fingerprint: &str, include_secret: bool) -> Result<SecretBuffer> {
        let record = self.get_key(fingerprint).await?;
        if !include_secret {
            return Ok(SecretBuffer::from_vec(record.certificate));
        }

        let wrapped = self
            .credentials()
            .get(&record.fingerprint)?
            .ok_or_else(|| Error::NotFound {
                fingerprint: record.fingerprint.as_str().to_string(),
            })?;
        self.protector.unwrap(&wrapped)
    }

    /// Set the trust level of a key.
    pub async fn set_key_trust(&self, fingerprint: &str, trust: TrustLevel) -> Result<bool> {
        let fingerprint = Fingerprint::parse(fingerprint)?;
        self.metadata().set_trust(&fingerprint, trust).await
    }

    /// Delete a key. Cascade order: passphrase cache entry, then the
    /// wrapped secret, then the metadata row. Idempotent on repeat.
    pub async fn delete_key(&self, fingerprint: &str) -> Result<bool> {
        let fingerprint = Fingerprint::parse(fingerprint)?;
        self.cache().remove(&fingerprint);
        self.credentials().delete(&fingerprint)?;
        self.metadata().delete(&fingerprint).await
    }

    // ========== Cryptographic commands ==========

    /// Encrypt plaintext for the given recipients (by fingerprint).
    pub async fn encrypt(
        &self,
        plaintext: &[u8],
        recipient_fingerprints: &[String],
    ) -> Result<Vec<u8>> {
        self.check_bound(plaintext)?;
        if recipient_fingerprints.is_empty() {
            return Err(Error::NoRecipients);
        }

        let mut recipient_certs = Vec::with_capacity(recipient_fingerprints.len());
        for raw in recipient_fingerprints {
            let record = self.get_key(raw).await?;
            recipient_certs.push(record.certificate);
        }

        self.engine.encrypt(plaintext, &recipient_certs)
    }

    /// Decrypt a message by trying own keys in the order they entered
    /// the keyring. The passphrase cache is consulted when no explicit
    /// passphrase is given; each secret buffer is released right after
    /// its attempt.
    pub async fn decrypt(
        &self,
        armored: &[u8],
        passphrase: Option<&[u8]>,
    ) -> Result<DecryptedMessage> {
        self.check_bound(armored)?;

        let records = self.metadata().list().await?;
        let known_certs: Vec<Vec<u8>> =
            records.iter().map(|r| r.certificate.clone()).collect();

        let mut own: Vec<&KeyRecord> = records.iter().filter(|r| r.is_own_key).collect();
        own.sort_by_key(|r| r.added_at);
        if own.is_empty() {
            return Err(Error::WrongKey);
        }

        let mut last_error = Error::WrongKey;
        for record in own {
            let Some(wrapped) = self.credentials().get(&record.fingerprint)? else {
                continue;
            };
            let secret = match self.protector.unwrap(&wrapped) {
                Ok(secret) => secret,
                Err(e) => {
                    last_error = prefer_error(last_error, e);
                    continue;
                }
            };

            let cached = if passphrase.is_none() {
                self.cache().get(&record.fingerprint)
            } else {
                None
            };
            let attempt_passphrase = passphrase.or(cached.as_ref().map(|c| c.as_slice()));

            match self.engine.decrypt(
                armored,
                secret.expose(),
                attempt_passphrase,
                &known_certs,
            ) {
                Ok(output) => {
                    if let Some(p) = passphrase {
                        self.cache().store(&record.fingerprint, p);
                    }
                    let signer = output
                        .signer
                        .map(|s| attach_signer_identity(s, &records));
                    return Ok(DecryptedMessage {
                        plaintext: output.plaintext,
                        signer,
                    });
                }
                Err(e) => {
                    last_error = prefer_error(last_error, e);
                }
            }
            // `secret` drops here; the buffer zeroizes before the next
            // candidate is unwrapped.
        }

        Err(last_error)
    }

    /// Sign data with an own key. With more than one own key the caller
    /// must select a signer.
    pub async fn sign(
        &self,
        data: &[u8],
        passphrase: Option<&[u8]>,
        signer: Option<&str>,
    ) -> Result<Vec<u8>> {
        self.check_bound(data)?;

        let records = self.metadata().list().await?;
        let own: Vec<&KeyRecord> = records.iter().filter(|r| r.is_own_key).collect();

        let record = match signer {
            Some(raw) => {
                let fingerprint = Fingerprint::parse(raw)?;
                own.iter()
                    .find(|r| r.fingerprint == fingerprint)
                    .copied()
                    .ok_or_else(|| Error::NotFound {
                        fingerprint: fingerprint.as_str().to_string(),
                    })?
            }
            None => match own.as_slice() {
                [] => {
                    return Err(Error::NotFound {
                        fingerprint: String::new(),
                    })
                }
                [only] => *only,
                _ => return Err(Error::SignerSelectionRequired),
            },
        };

        let wrapped = self
            .credentials()
            .get(&record.fingerprint)?
            .ok_or_else(|| Error::NotFound {
                fingerprint: record.fingerprint.as_str().to_string(),
            })?;
        let secret = self.protector.unwrap(&wrapped)?;

        let cached = if passphrase.is_none() {
            self.cache().get(&record.fingerprint)
        } else {
            None
        };
        let attempt_passphrase = passphrase.or(cached.as_ref().map(|c| c.as_slice()));

        let signed = self
            .engine
            .sign(data, secret.expose(), attempt_passphrase)?;
        if let Some(p) = passphrase {
            self.cache().store(&record.fingerprint, p);
        }
        Ok(signed)
    }

    /// Verify a signed message against every known certificate and
    /// attach the stored trust label on success.
    pub async fn verify(&self, armored: &[u8]) -> Result<VerifyOutcome> {
        self.check_bound(armored)?;

        let records = self.metadata().list().await?;
        let candidates: Vec<Vec<u8>> =
            records.iter().map(|r| r.certificate.clone()).collect();

        let mut outcome = self.engine.verify(armored, &candidates)?;
        if let Some(ref fingerprint) = outcome.signer_fingerprint {
            outcome.trust_level = records
                .iter()
                .find(|r| &r.fingerprint == fingerprint)
                .map(|r| r.trust_level);
        }
        Ok(outcome)
    }

    // ========== Transfer bundles ==========

    /// Package the whole keyring (own keys with secrets, contacts
    /// public-only) into an encrypted bundle with a fresh transfer
    /// passphrase.
    pub async fn export_bundle(&self, include_passphrase_part: bool) -> Result<ExportedBundle> {
        let records = self.metadata().list().await?;

        let mut entries = Vec::with_capacity(records.len());
        for record in &records {
            let secret_key = if record.is_own_key {
                let wrapped = self
                    .credentials()
                    .get(&record.fingerprint)?
                    .ok_or(Error::SessionLost)?;
                let secret = self.protector.unwrap(&wrapped)?;
                Some(secret.expose().to_vec())
            } else {
                None
            };
            entries.push(BundleEntry {
                fingerprint: record.fingerprint.clone(),
                trust_level: record.trust_level,
                certificate: record.certificate.clone(),
                secret_key,
            });
        }

        bundle::seal_bundle(&entries, include_passphrase_part)
    }

    /// Import a bundle (reassembled armored blob plus the re-entered
    /// passphrase). Known fingerprints that gain nothing are skipped.
    pub async fn import_bundle(
        &self,
        file_blob: &str,
        passphrase: &str,
    ) -> Result<BundleImportReport> {
        let entries = bundle::open_bundle(file_blob, passphrase)?;

        let mut report = BundleImportReport::default();
        for entry in &entries {
            let existing = self.metadata().get(&entry.fingerprint).await?;
            let already_own = existing.as_ref().is_some_and(|r| r.is_own_key);
            let upgrades = entry.secret_key.is_some() && !already_own;
            if existing.is_some() && !upgrades {
                report.skipped_count += 1;
                continue;
            }

            let blob: &[u8] = entry
                .secret_key
                .as_deref()
                .unwrap_or(entry.certificate.as_slice());
            let info = self.engine.inspect(blob)?;
            if info.fingerprint != entry.fingerprint {
                return Err(Error::CorruptFraming);
            }
            let record = self
                .import_cert_info(blob, &info, Some(entry.trust_level))
                .await?;

            report.imported.push(record.fingerprint);
            report.imported_count += 1;
        }

        Ok(report)
    }

    // ========== Session and OPSEC ==========

    /// Enter OPSEC mode: both stores switch to volatile backends and
    /// nothing further touches disk.
    pub fn enable_opsec(&self) {
        self.opsec_mode.store(true, Ordering::SeqCst);
        tracing::info!("OPSEC mode enabled");
    }

    /// Leave OPSEC mode, clearing everything that accumulated in the
    /// volatile stores.
    pub async fn disable_opsec(&self) -> Result<()> {
        self.opsec_mode.store(false, Ordering::SeqCst);
        self.opsec_credentials.clear()?;
        self.opsec_metadata.clear().await?;
        tracing::info!("OPSEC mode disabled");
        Ok(())
    }

    /// Whether OPSEC mode is active.
    #[must_use]
    pub fn opsec_status(&self) -> bool {
        self.opsec_active()
    }

    /// Immediately destroy the session wrapping key, the volatile
    /// stores, and the passphrase cache. Wrapped secrets from this
    /// session become permanently unreadable.
    pub async fn panic_wipe(&self) -> Result<()> {
        tracing::warn!("panic wipe triggered");
        self.protector.wipe();
        self.opsec_credentials.clear()?;
        self.opsec_metadata.clear().await?;
        self.cache().clear_all();
        Ok(())
    }

    /// Drop every cached passphrase.
    pub fn clear_passphrase_cache(&self) {
        self.cache().clear_all();
    }

    /// Change the passphrase cache TTL for future inserts.
    pub fn set_passphrase_ttl(&self, ttl_secs: u64) {
        self.cache().set_ttl(ttl_secs);
    }
}

/// Later expiration wins on merge; `None` means "never expires" and is
/// therefore the latest.
fn merge_expiration(
    a: Option<chrono::DateTime<Utc>>,
    b: Option<chrono::DateTime<Utc>>,
) -> Option<chrono::DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        _ => None,
    }
}

/// Decrypt tries several candidates; keep the most informative failure.
fn prefer_error(current: Error, candidate: Error) -> Error {
    fn rank(e: &Error) -> u8 {
        match e {
            Error::PassphraseRequired => 4,
            Error::BadPassphrase => 3,
            Error::SessionLost => 2,
            Error::Tampered => 1,
            _ => 0,
        }
    }
    if rank(&candidate) >= rank(&current) {
        candidate
    } else {
        current
    }
}

/// Map a signer's key id onto a known certificate's primary fingerprint
/// when verification alone could not.
fn attach_signer_identity(mut signer: SignerInfo, records: &[KeyRecord]) -> SignerInfo {
    if signer.fingerprint.is_none() {
        if let Some(ref key_id) = signer.key_id {
            signer.fingerprint = records
                .iter()
                .find(|r| r.fingerprint.as_str().ends_with(key_id.as_str()))
                .map(|r| r.fingerprint.clone());
        }
    }
    signer
}
