//! # Pricing Repository
//!
//! Tier prices keyed by `(product_id, price_tier)`.
//!
//! ## Price Resolution
//! ```text
//! price_for(product, tier)
//!     │
//!     ├── pricing row for (product, tier)?  → price_cents
//!     │
//!     └── else product.base_price_cents     → base price
//! ```

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use ruta_core::{Money, PriceTier, PricingEntry};

/// Repository for tier pricing.
#[derive(Debug, Clone)]
pub struct PricingRepository {
    pool: SqlitePool,
}

impl PricingRepository {
    /// Creates a new PricingRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PricingRepository { pool }
    }

    /// Inserts or replaces entries by `(product_id, price_tier)`.
    pub async fn upsert_batch(&self, entries: &[PricingEntry]) -> DbResult<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for entry in entries {
            sqlx::query(
                "INSERT OR REPLACE INTO pricing \
                 (product_id, price_tier, price_cents, min_quantity, updated_at) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&entry.product_id)
            .bind(entry.price_tier)
            .bind(entry.price_cents)
            .bind(entry.min_quantity)
            .bind(entry.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(count = entries.len(), "Pricing upserted");
        Ok(entries.len())
    }

    /// Gets the entry for one product in one tier.
    pub async fn get(&self, product_id: &str, tier: PriceTier) -> DbResult<Option<PricingEntry>> {
        let entry = sqlx::query_as::<_, PricingEntry>(
            "SELECT product_id, price_tier, price_cents, min_quantity, updated_at \
             FROM pricing WHERE product_id = ? AND price_tier = ?",
        )
        .bind(product_id)
        .bind(tier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// All tier entries for a product.
    pub async fn for_product(&self, product_id: &str) -> DbResult<Vec<PricingEntry>> {
        let entries = sqlx::query_as::<_, PricingEntry>(
            "SELECT product_id, price_tier, price_cents, min_quantity, updated_at \
             FROM pricing WHERE product_id = ? ORDER BY price_tier ASC",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Effective unit price of a product for a tier.
    ///
    /// ## Returns
    /// * `Some(price)` - tier price, or the product's base price when the tier has none
    /// * `None` - the product is not in the replica
    pub async fn price_for(&self, product_id: &str, tier: PriceTier) -> DbResult<Option<Money>> {
        if let Some(entry) = self.get(product_id, tier).await? {
            return Ok(Some(Money::from_cents(entry.price_cents)));
        }

        let base: Option<i64> =
            sqlx::query_scalar("SELECT base_price_cents FROM products WHERE id = ?")
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(base.map(Money::from_cents))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
