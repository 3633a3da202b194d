//! # Checkpoint Repository
//!
//! Named high-water marks of the sync engine (`lastFullSync`,
//! `lastIncrementalSync`). A checkpoint is only written after the data it
//! covers is committed, and [`CheckpointRepository::advance`] never moves
//! one backwards.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

/// Repository for sync checkpoints.
#[derive(Debug, Clone)]
pub struct CheckpointRepository {
    pool: SqlitePool,
}

impl CheckpointRepository {
    /// Creates a new CheckpointRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CheckpointRepository { pool }
    }

    /// Reads a checkpoint.
    pub async fn get(&self, key: &str) -> DbResult<Option<DateTime<Utc>>> {
        let value: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT value FROM sync_checkpoints WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value)
    }

    /// Writes a checkpoint unconditionally.
    pub async fn set(&self, key: &str, value: DateTime<Utc>) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        write(&mut conn, key, value).await
    }

    /// Moves a checkpoint forward. Older values are ignored.
    ///
    /// ## Returns
    /// `true` if the stored value changed.
    pub async fn advance(&self, key: &str, value: DateTime<Utc>) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;
        let advanced = advance_in(&mut tx, key, value).await?;
        tx.commit().await?;
        Ok(advanced)
    }

    /// Writes several checkpoints in one transaction.
    pub async fn set_many(&self, entries: &[(&str, DateTime<Utc>)]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in entries {
            write(&mut tx, key, *value).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

async fn advance_in(conn: &mut SqliteConnection, key: &str, value: DateTime<Utc>) -> DbResult<bool> {
    let current: Option<DateTime<Utc>> =
        sqlx::query_scalar("SELECT value FROM sync_checkpoints WHERE key = ?")
            .bind(key)
            .fetch_optional(&mut *conn)
            .await?;

    if current.is_some_and(|current| current >= value) {
        debug!(key = %key, "Checkpoint not advanced");
        return Ok(false);
    }

    write(conn, key, value).await?;
    Ok(true)
}

async fn write(conn: &mut SqliteConnection, key: &str, value: DateTime<Utc>) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO sync_checkpoints (key, value, updated_at) VALUES (?, ?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    debug!(key = %key, value = %value, "Checkpoint written");
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
