//! # Promotion Repository
//!
//! Time-boxed product promotions. Remote-owned; the window check runs in
//! Rust against [`PromotionRecord::is_active_at`] so text timestamps never
//! get compared in SQL.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use ruta_core::PromotionRecord;

const PROMOTION_COLUMNS: &str = "id, product_id, name, description, discount_type, \
     discount_value, start_date, end_date, is_active, updated_at";

/// Repository for promotions.
#[derive(Debug, Clone)]
pub struct PromotionRepository {
    pool: SqlitePool,
}

impl PromotionRepository {
    /// Creates a new PromotionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PromotionRepository { pool }
    }

    /// Inserts or replaces promotions by id, in one transaction.
    pub async fn upsert_batch(&self, promotions: &[PromotionRecord]) -> DbResult<usize> {
        if promotions.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for p in promotions {
            sqlx::query(&format!(
                "INSERT OR REPLACE INTO promotions ({PROMOTION_COLUMNS}) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(&p.id)
            .bind(&p.product_id)
            .bind(&p.name)
            .bind(&p.description)
            .bind(p.discount_type)
            .bind(p.discount_value)
            .bind(p.start_date)
            .bind(p.end_date)
            .bind(p.is_active)
            .bind(p.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(count = promotions.len(), "Promotions upserted");
        Ok(promotions.len())
    }

    /// Promotions whose window contains `now`.
    pub async fn active_at(&self, now: DateTime<Utc>) -> DbResult<Vec<PromotionRecord>> {
        let promotions = self.enabled(None).await?;
        Ok(promotions.into_iter().filter(|p| p.is_active_at(now)).collect())
    }

    /// Promotions of one product whose window contains `now`.
    pub async fn for_product(
        &self,
        product_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Vec<PromotionRecord>> {
        let promotions = self.enabled(Some(product_id)).await?;
        Ok(promotions.into_iter().filter(|p| p.is_active_at(now)).collect())
    }

    async fn enabled(&self, product_id: Option<&str>) -> DbResult<Vec<PromotionRecord>> {
        let promotions = sqlx::query_as::<_, PromotionRecord>(&format!(
            "SELECT {PROMOTION_COLUMNS} FROM promotions \
             WHERE is_active = 1 AND (?1 IS NULL OR product_id = ?1) \
             ORDER BY start_date ASC, name ASC"
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(promotions)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
