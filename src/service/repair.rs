//! Startup reconciliation between the metadata and credential stores.

use std::collections::HashSet;

use crate::error::Result;
use crate::store::{CredentialStore, MetadataStore};
use crate::types::Fingerprint;

/// Bring `is_own_key` flags and stored secrets back into agreement.
///
/// Rows claiming a secret that is not in the credential store are
/// degraded to `is_own_key = false`; wrapped secrets with no metadata
/// row are deleted.
pub(super) async fn reconcile(
    metadata: &MetadataStore,
    credentials: &CredentialStore,
) -> Result<()> {
    let records = metadata.list().await?;
    let stored_secrets = credentials.list_fingerprints()?;
    let known: HashSet<Fingerprint> = records.iter().map(|r| r.fingerprint.clone()).collect();

    for record in records {
        if record.is_own_key && !stored_secrets.contains(&record.fingerprint) {
            tracing::warn!("own key has no stored secret; degrading to public-only");
            tracing::debug!(key = record.fingerprint.short(), "degrading row");
            let mut degraded = record;
            degraded.is_own_key = false;
            metadata.upsert(&degraded).await?;
        }
    }

    for orphan in stored_secrets.difference(&known) {
        tracing::warn!("stored secret has no metadata row; deleting");
        tracing::debug!(key = orphan.short(), "deleting orphaned secret");
        credentials.delete(orphan)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::WrappedSecret;
    use crate::types::{KeyRecord, TrustLevel, UserId};
    use chrono::Utc;

    fn fp(tag: &str) -> Fingerprint {
        let mut hex = tag.repeat(40);
        hex.truncate(40);
        Fingerprint::parse(&hex).unwrap()
    }

    fn record(fingerprint: &Fingerprint, own: bool) -> KeyRecord {
        KeyRecord {
            fingerprint: fingerprint.clone(),
            user_id: UserId::new("Test", "test@example.com"),
            all_user_ids: vec![],
            algorithm: "Ed25519".into(),
            created_at: Utc::now(),
            expires_at: None,
            trust_level: TrustLevel::Imported,
            is_own_key: own,
            certificate: b"cert".to_vec(),
            added_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn degrades_own_flag_without_secret() {
        let metadata = MetadataStore::volatile();
        let credentials = CredentialStore::memory();
        let fingerprint = fp("A");
        metadata.upsert(&record(&fingerprint, true)).await.unwrap();

        reconcile(&metadata, &credentials).await.unwrap();

        let repaired = metadata.get(&fingerprint).await.unwrap().unwrap();
        assert!(!repaired.is_own_key);
    }

    #[tokio::test]
    async fn deletes_orphaned_secrets() {
        let metadata = MetadataStore::volatile();
        let credentials = CredentialStore::memory();
        let fingerprint = fp("B");
        credentials
            .put(&WrappedSecret {
                fingerprint: fingerprint.clone(),
                nonce: [0u8; 12],
                ciphertext: vec![1, 2, 3],
            })
            .unwrap();

        reconcile(&metadata, &credentials).await.unwrap();

        assert!(credentials.list_fingerprints().unwrap().is_empty());
    }

    #[tokio::test]
    async fn consistent_state_is_untouched() {
        let metadata = MetadataStore::volatile();
        let credentials = CredentialStore::memory();
        let fingerprint = fp("C");
        metadata.upsert(&record(&fingerprint, true)).await.unwrap();
        credentials
            .put(&WrappedSecret {
                fingerprint: fingerprint.clone(),
                nonce: [0u8; 12],
                ciphertext: vec![1, 2, 3],
            })
            .unwrap();

        reconcile(&metadata, &credentials).await.unwrap();

        assert!(metadata.get(&fingerprint).await.unwrap().unwrap().is_own_key);
        assert_eq!(credentials.list_fingerprints().unwrap().len(), 1);
    }
}
