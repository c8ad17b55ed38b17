//! Indexed repository of key metadata.
//!
//! Normal mode persists to SQLite; OPSEC mode swaps in a volatile map
//! with the same contract. Exactly one row exists per fingerprint.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::error::{Error, Result};
use crate::types::{Fingerprint, KeyRecord, TrustLevel, UserId};

use super::schema;

/// Indexed repository of [`KeyRecord`]s.
pub enum MetadataStore {
    Sqlite(SqlitePool),
    Memory(Mutex<HashMap<Fingerprint, KeyRecord>>),
}

impl MetadataStore {
    /// Open (creating if needed) the SQLite store at the given path.
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = SqlitePool::connect(&url).await?;
        schema::run_migrations(&pool).await?;
        Ok(Self::Sqlite(pool))
    }

    /// An in-memory SQLite store (tests).
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        schema::run_migrations(&pool).await?;
        Ok(Self::Sqlite(pool))
    }

    /// The volatile map backend (OPSEC mode).
    #[must_use]
    pub fn volatile() -> Self {
        Self::Memory(Mutex::new(HashMap::new()))
    }

    fn map(&self) -> Option<MutexGuard<'_, HashMap<Fingerprint, KeyRecord>>> {
        match self {
            Self::Memory(map) => Some(map.lock().unwrap_or_else(|e| e.into_inner())),
            Self::Sqlite(_) => None,
        }
    }

    /// Insert or replace the row for this fingerprint.
    pub async fn upsert(&self, record: &KeyRecord) -> Result<()> {
        match self {
            Self::Sqlite(pool) => {
                let user_ids = serde_json::to_string(&record.all_user_ids)
                    .map_err(|e| Error::Storage {
                        reason: e.to_string(),
                    })?;
                sqlx::query(
                    r#"
                    INSERT OR REPLACE INTO keys
                        (fingerprint, name, email, user_ids, algorithm, created_at,
                         expires_at, trust_level, is_own_key, certificate, added_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(record.fingerprint.as_str())
                .bind(&record.user_id.name)
                .bind(&record.user_id.email)
                .bind(user_ids)
                .bind(&record.algorithm)
                .bind(record.created_at.to_rfc3339())
                .bind(record.expires_at.map(|t| t.to_rfc3339()))
                .bind(record.trust_level.as_i64())
                .bind(record.is_own_key)
                .bind(&record.certificate)
                .bind(record.added_at.to_rfc3339())
                .execute(pool)
                .await?;
            }
            Self::Memory(_) => {
                if let Some(mut map) = self.map() {
                    map.insert(record.fingerprint.clone(), record.clone());
                }
            }
        }
        tracing::debug!(key = record.fingerprint.short(), "metadata row upserted");
        Ok(())
    }

    /// Fetch the row for a fingerprint.
    pub async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<KeyRecord>> {
        match self {
            Self::Sqlite(pool) => {
                let row = sqlx::query(
                    r#"
                    SELECT fingerprint, name, email, user_ids, algorithm, created_at,
                           expires_at, trust_level, is_own_key, certificate, added_at
                    FROM keys WHERE fingerprint = ?
                    "#,
                )
                .bind(fingerprint.as_str())
                .fetch_optional(pool)
                .await?;
                row.map(|r| row_to_record(&r)).transpose()
            }
            Self::Memory(_) => Ok(self.map().and_then(|m| m.get(fingerprint).cloned())),
        }
    }

    /// List every row, own keys first, then newest first.
    pub async fn list(&self) -> Result<Vec<KeyRecord>> {
        match self {
            Self::Sqlite(pool) => {
                let rows = sqlx::query(
                    r#"
                    SELECT fingerprint, name, email, user_ids, algorithm, created_at,
                           expires_at, trust_level, is_own_key, certificate, added_at
                    FROM keys ORDER BY is_own_key DESC, added_at DESC
                    "#,
                )
                .fetch_all(pool)
                .await?;
                rows.iter().map(row_to_record).collect()
            }
            Self::Memory(_) => {
                let mut records: Vec<KeyRecord> = self
                    .map()
                    .map(|m| m.values().cloned().collect())
                    .unwrap_or_default();
                sort_records(&mut records);
                Ok(records)
            }
        }
    }

    /// Delete a row. Idempotent: deleting a missing row reports `false`
    /// without error.
    pub async fn delete(&self, fingerprint: &Fingerprint) -> Result<bool> {
        match self {
            Self::Sqlite(pool) => {
                let result = sqlx::query("DELETE FROM keys WHERE fingerprint = ?")
                    .bind(fingerprint.as_str())
                    .execute(pool)
                    .await?;
                Ok(result.rows_affected() > 0)
            }
            Self::Memory(_) => Ok(self
                .map()
                .map(|mut m| m.remove(fingerprint).is_some())
                .unwrap_or(false)),
        }
    }

    /// Case-insensitive search on name, email, and fingerprint suffix.
    pub async fn search(&self, query: &str) -> Result<Vec<KeyRecord>> {
        match self {
            Self::Sqlite(pool) => {
                let contains = format!("%{query}%");
                let suffix = format!("%{query}");
                let rows = sqlx::query(
                    r#"
                    SELECT fingerprint, name, email, user_ids, algorithm, created_at,
                           expires_at, trust_level, is_own_key, certificate, added_at
                    FROM keys
                    WHERE name LIKE ?1 COLLATE NOCASE
                       OR email LIKE ?1 COLLATE NOCASE
                       OR fingerprint LIKE ?2 COLLATE NOCASE
                    ORDER BY is_own_key DESC, added_at DESC
                    "#,
                )
                .bind(&contains)
                .bind(&suffix)
                .fetch_all(pool)
                .await?;
                rows.iter().map(row_to_record).collect()
            }
            Self::Memory(_) => {
                let needle = query.to_lowercase();
                let suffix = query.to_ascii_uppercase();
                let mut records: Vec<KeyRecord> = self
                    .map()
                    .map(|m| {
                        m.values()
                            .filter(|r| {
                                let name_hit = r
                                    .user_id
                                    .name
                                    .as_deref()
                                    .is_some_and(|n| n.to_lowercase().contains(&needle));
                                let email_hit = r
                                    .user_id
                                    .email
                                    .as_deref()
                                    .is_some_and(|e| e.to_lowercase().contains(&needle));
                                let fp_hit = r.fingerprint.as_str().ends_with(&suffix);
                                name_hit || email_hit || fp_hit
                            })
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                sort_records(&mut records);
                Ok(records)
            }
        }
    }

    /// Update the trust level. Returns whether the row existed.
    pub async fn set_trust(&self, fingerprint: &Fingerprint, trust: TrustLevel) -> Result<bool> {
        match self {
            Self::Sqlite(pool) => {
                let result = sqlx::query("UPDATE keys SET trust_level = ? WHERE fingerprint = ?")
                    .bind(trust.as_i64())
                    .bind(fingerprint.as_str())
                    .execute(pool)
                    .await?;
                Ok(result.rows_affected() > 0)
            }
            Self::Memory(_) => Ok(self
                .map()
                .and_then(|mut m| {
                    m.get_mut(fingerprint).map(|record| {
                        record.trust_level = trust;
                    })
                })
                .is_some()),
        }
    }

    /// Remove every row. Used on OPSEC teardown.
    pub async fn clear(&self) -> Result<()> {
        match self {
            Self::Sqlite(pool) => {
                sqlx::query("DELETE FROM keys").execute(pool).await?;
            }
            Self::Memory(_) => {
                if let Some(mut map) = self.map() {
                    map.clear();
                }
            }
        }
        Ok(())
    }
}

fn sort_records(records: &mut [KeyRecord]) {
    records.sort_by(|a, b| {
        b.is_own_key
            .cmp(&a.is_own_key)
            .then(b.added_at.cmp(&a.added_at))
    });
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Storage {
            reason: format!("bad timestamp in metadata row: {e}"),
        })
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<KeyRecord> {
    let fingerprint: String = row.try_get("fingerprint")?;
    let name: Option<String> = row.try_get("name")?;
    let email: Option<String> = row.try_get("email")?;
    let user_ids_raw: String = row.try_get("user_ids")?;
    let created_at: String = row.try_get("created_at")?;
    let expires_at: Option<String> = row.try_get("expires_at")?;
    let trust_level: i64 = row.try_get("trust_level")?;
    let added_at: String = row.try_get("added_at")?;

    let all_user_ids: Vec<UserId> =
        serde_json::from_str(&user_ids_raw).map_err(|e| Error::Storage {
            reason: format!("bad user id list in metadata row: {e}"),
        })?;

    Ok(KeyRecord {
        fingerprint: Fingerprint::parse(&fingerprint)?,
        user_id: UserId { name, email },
        all_user_ids,
        algorithm: row.try_get("algorithm")?,
        created_at: parse_timestamp(&created_at)?,
        expires_at: expires_at.as_deref().map(parse_timestamp).transpose()?,
        trust_level: TrustLevel::from_i64(trust_level),
        is_own_key: row.try_get("is_own_key")?,
        certificate: row.try_get("certificate")?,
        added_at: parse_timestamp(&added_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fingerprint: &str, name: &str, email: &str, own: bool) -> KeyRecord {
        let mut hex = fingerprint.repeat(40);
        hex.truncate(40);
        KeyRecord {
            fingerprint: Fingerprint::parse(&hex).unwrap(),
            user_id: UserId::new(name, email),
            all_user_ids: vec![UserId::new(name, email)],
            algorithm: "Ed25519".to_string(),
            created_at: Utc::now(),
            expires_at: None,
            trust_level: TrustLevel::Imported,
            is_own_key: own,
            certificate: b"-----BEGIN PGP PUBLIC KEY BLOCK-----".to_vec(),
            added_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_and_get() {
        let store = MetadataStore::open_in_memory().await.unwrap();
        let rec = record("A", "Alice", "alice@example.com", false);
        store.upsert(&rec).await.unwrap();

        let fetched = store.get(&rec.fingerprint).await.unwrap().unwrap();
        assert_eq!(fetched.user_id.name.as_deref(), Some("Alice"));
        assert_eq!(fetched.trust_level, TrustLevel::Imported);
        assert_eq!(fetched.all_user_ids.len(), 1);
    }

    #[tokio::test]
    async fn reinsert_replaces_without_duplicating() {
        let store = MetadataStore::open_in_memory().await.unwrap();
        let mut rec = record("A", "Alice", "alice@example.com", false);
        store.upsert(&rec).await.unwrap();

        rec.user_id.name = Some("Alice Johnson".to_string());
        store.upsert(&rec).await.unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].user_id.name.as_deref(), Some("Alice Johnson"));
    }

    #[tokio::test]
    async fn search_matches_name_email_and_suffix() {
        let store = MetadataStore::open_in_memory().await.unwrap();
        store
            .upsert(&record("A", "Alice", "alice@example.com", false))
            .await
            .unwrap();
        store
            .upsert(&record("B", "Bob", "bob@example.com", false))
            .await
            .unwrap();

        assert_eq!(store.search("alice").await.unwrap().len(), 1);
        assert_eq!(store.search("BOB@").await.unwrap().len(), 1);
        // Fingerprint suffix: record "B" ends with BBBB.
        assert_eq!(store.search("bbbb").await.unwrap().len(), 1);
        assert!(store.search("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_orders_own_keys_first() {
        let store = MetadataStore::open_in_memory().await.unwrap();
        store
            .upsert(&record("A", "Contact", "c@example.com", false))
            .await
            .unwrap();
        store
            .upsert(&record("B", "Me", "me@example.com", true))
            .await
            .unwrap();

        let all = store.list().await.unwrap();
        assert!(all[0].is_own_key);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MetadataStore::open_in_memory().await.unwrap();
        let rec = record("A", "Alice", "alice@example.com", false);
        store.upsert(&rec).await.unwrap();

        assert!(store.delete(&rec.fingerprint).await.unwrap());
        assert!(!store.delete(&rec.fingerprint).await.unwrap());
    }

    #[tokio::test]
    async fn volatile_backend_has_same_contract() {
        let store = MetadataStore::volatile();
        let rec = record("C", "Carol", "carol@example.com", true);
        store.upsert(&rec).await.unwrap();

        assert!(store.get(&rec.fingerprint).await.unwrap().is_some());
        assert_eq!(store.search("carol").await.unwrap().len(), 1);
        assert!(store.set_trust(&rec.fingerprint, TrustLevel::Verified).await.unwrap());
        assert!(store.delete(&rec.fingerprint).await.unwrap());
        assert!(!store.delete(&rec.fingerprint).await.unwrap());
    }
}
