//! Centralized metadata database schema.
//!
//! All table and index definitions live here so the database structure
//! can be audited in one place. The schema is versioned through
//! `PRAGMA user_version` and migrated forward on open.

use sqlx::SqlitePool;

use crate::error::{Error, Result};

/// Current schema version.
pub const SCHEMA_VERSION: i64 = 1;

/// Create or migrate the schema to [`SCHEMA_VERSION`].
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let (version,): (i64,) = sqlx::query_as("PRAGMA user_version").fetch_one(pool).await?;

    if version > SCHEMA_VERSION {
        return Err(Error::Storage {
            reason: format!("database schema version {version} is newer than this build"),
        });
    }

    if version < 1 {
        create_tables(pool).await?;
        sqlx::query("PRAGMA user_version = 1").execute(pool).await?;
    }

    tracing::debug!("metadata schema ready at version {SCHEMA_VERSION}");
    Ok(())
}

async fn create_tables(pool: &SqlitePool) -> Result<()> {
    // Keys table - one row per certificate, fingerprint is the identity
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS keys (
            fingerprint TEXT PRIMARY KEY NOT NULL,
            name        TEXT,
            email       TEXT,
            user_ids    TEXT NOT NULL DEFAULT '[]',
            algorithm   TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            expires_at  TEXT,
            trust_level INTEGER NOT NULL DEFAULT 0,
            is_own_key  INTEGER NOT NULL DEFAULT 0,
            certificate BLOB NOT NULL,
            added_at    TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_keys_email ON keys(email)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_keys_name ON keys(name)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_keys_added_at ON keys(added_at)")
        .execute(pool)
        .await?;

    Ok(())
}
