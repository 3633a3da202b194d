//! # Outbound Queue Repository
//!
//! Locally originated changes waiting for the server.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  CHECKOUT                                                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │  1. INSERT INTO orders / order_items                            │   │
//! │  │  2. INSERT INTO sync_queue ('order', local_id, <order JSON>)    │   │
//! │  │  3. DELETE FROM cart_items WHERE user_id = ?                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            SYNC ENGINE (drain before every pull)                │   │
//! │  │                                                                 │   │
//! │  │  1. SELECT * FROM sync_queue WHERE delivered = 0                │   │
//! │  │  2. Push the orders                                             │   │
//! │  │  3. Accepted: order gets server id + queue item deleted (1 tx)  │   │
//! │  │     Rejected/failed: attempt_count += 1, last_error = ?         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • An order is never orphaned from its queue item                      │
//! │  • A queue item is removed only when its order is acknowledged         │
//! │  • Items are retried until acknowledged or discarded by hand           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use ruta_core::OutboundQueueItem;

const QUEUE_COLUMNS: &str = "id, entity_type, entity_id, operation, payload, created_at, \
     attempt_count, last_error, last_attempt_at, delivered";

/// Repository for the outbound queue.
#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pool: SqlitePool,
}

impl OutboxRepository {
    /// Creates a new OutboxRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OutboxRepository { pool }
    }

    /// Undelivered items of one entity type, oldest first.
    ///
    /// ## Arguments
    /// * `entity_type` - e.g. `"order"`
    /// * `limit` - Maximum items to return
    pub async fn pending(&self, entity_type: &str, limit: u32) -> DbResult<Vec<OutboundQueueItem>> {
        let items = sqlx::query_as::<_, OutboundQueueItem>(&format!(
            "SELECT {QUEUE_COLUMNS} FROM sync_queue \
             WHERE entity_type = ? AND delivered = 0 \
             ORDER BY created_at ASC, rowid ASC \
             LIMIT ?"
        ))
        .bind(entity_type)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Gets the queue item for an entity.
    pub async fn get(&self, entity_type: &str, entity_id: &str) -> DbResult<Option<OutboundQueueItem>> {
        let item = sqlx::query_as::<_, OutboundQueueItem>(&format!(
            "SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE entity_type = ? AND entity_id = ?"
        ))
        .bind(entity_type)
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    /// Records a failed delivery attempt for the given entities.
    pub async fn record_failure(
        &self,
        entity_type: &str,
        entity_ids: &[String],
        error: &str,
    ) -> DbResult<()> {
        if entity_ids.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for entity_id in entity_ids {
            record_attempt(&mut tx, entity_type, entity_id, error, now).await?;
        }
        tx.commit().await?;

        debug!(count = entity_ids.len(), error = %error, "Recorded delivery failure");
        Ok(())
    }

    /// Counts undelivered items.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue WHERE delivered = 0")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Deletes the queue item for an entity.
    pub async fn delete_for(&self, entity_type: &str, entity_id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM sync_queue WHERE entity_type = ? AND entity_id = ?")
            .bind(entity_type)
            .bind(entity_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Transaction Helpers (shared with the order repository)
// =============================================================================

pub(crate) async fn insert_item(conn: &mut SqliteConnection, item: &OutboundQueueItem) -> DbResult<()> {
    sqlx::query(&format!(
        "INSERT INTO sync_queue ({QUEUE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&item.id)
    .bind(&item.entity_type)
    .bind(&item.entity_id)
    .bind(item.operation)
    .bind(&item.payload)
    .bind(item.created_at)
    .bind(item.attempt_count)
    .bind(&item.last_error)
    .bind(item.last_attempt_at)
    .bind(item.delivered)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn record_attempt(
    conn: &mut SqliteConnection,
    entity_type: &str,
    entity_id: &str,
    error: &str,
    at: chrono::DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        "UPDATE sync_queue SET attempt_count = attempt_count + 1, last_error = ?, last_attempt_at = ? \
         WHERE entity_type = ? AND entity_id = ?",
    )
    .bind(error)
    .bind(at)
    .bind(entity_type)
    .bind(entity_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn delete_item(conn: &mut SqliteConnection, entity_type: &str, entity_id: &str) -> DbResult<u64> {
    let result = sqlx::query("DELETE FROM sync_queue WHERE entity_type = ? AND entity_id = ?")
        .bind(entity_type)
        .bind(entity_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}
