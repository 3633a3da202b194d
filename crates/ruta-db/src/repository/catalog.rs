//! # Catalog Repository
//!
//! Products and their variants. Remote-owned: rows only change through
//! [`CatalogRepository::upsert_batch`] and [`CatalogRepository::upsert_variants`].
//!
//! ## Listing Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  WHERE is_active = 1 AND hide_in_catalog = 0                           │
//! │  ORDER BY display_order ASC, name ASC                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use ruta_core::{CatalogRecord, ProductVariant};

const PRODUCT_COLUMNS: &str = "id, sku, name, description, category, subcategory, image, \
     base_price_cents, stock, is_active, display_order, parent_sku, variant_name, dimension, \
     units_per_box, min_quantity, hide_in_catalog, created_at, updated_at";

const VARIANT_COLUMNS: &str = "id, product_id, variant_type, variant_value, sku, stock, \
     base_price_cents, city_price_cents, interior_price_cents, special_price_cents, \
     is_active, updated_at";

/// Repository for catalog operations.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Inserts or replaces products by id, in one transaction.
    ///
    /// ## Returns
    /// Number of records written.
    pub async fn upsert_batch(&self, records: &[CatalogRecord]) -> DbResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            upsert_product(&mut tx, record).await?;
        }
        tx.commit().await?;

        debug!(count = records.len(), "Catalog upserted");
        Ok(records.len())
    }

    /// Inserts or replaces variants by id, in one transaction.
    pub async fn upsert_variants(&self, variants: &[ProductVariant]) -> DbResult<usize> {
        if variants.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for variant in variants {
            sqlx::query(&format!(
                "INSERT OR REPLACE INTO product_variants ({VARIANT_COLUMNS}) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(&variant.id)
            .bind(&variant.product_id)
            .bind(&variant.variant_type)
            .bind(&variant.variant_value)
            .bind(&variant.sku)
            .bind(variant.stock)
            .bind(variant.base_price_cents)
            .bind(variant.city_price_cents)
            .bind(variant.interior_price_cents)
            .bind(variant.special_price_cents)
            .bind(variant.is_active)
            .bind(variant.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(count = variants.len(), "Variants upserted");
        Ok(variants.len())
    }

    /// Products shown in the catalog, in display order.
    pub async fn list_listed(&self) -> DbResult<Vec<CatalogRecord>> {
        let products = sqlx::query_as::<_, CatalogRecord>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE is_active = 1 AND hide_in_catalog = 0 \
             ORDER BY display_order ASC, name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Listed products of one category, in display order.
    pub async fn list_by_category(&self, category: &str) -> DbResult<Vec<CatalogRecord>> {
        let products = sqlx::query_as::<_, CatalogRecord>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE is_active = 1 AND hide_in_catalog = 0 AND category = ? \
             ORDER BY display_order ASC, name ASC"
        ))
        .bind(category)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Gets a product by id, listed or not.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CatalogRecord>> {
        let product = sqlx::query_as::<_, CatalogRecord>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Active variants of a product.
    pub async fn variants_for(&self, product_id: &str) -> DbResult<Vec<ProductVariant>> {
        let variants = sqlx::query_as::<_, ProductVariant>(&format!(
            "SELECT {VARIANT_COLUMNS} FROM product_variants \
             WHERE product_id = ? AND is_active = 1 \
             ORDER BY variant_type ASC, variant_value ASC"
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(variants)
    }

    /// `(product_id, image reference)` for every active product with an image.
    pub async fn product_ids_with_images(&self) -> DbResult<Vec<(String, String)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT id, image FROM products \
             WHERE is_active = 1 AND image IS NOT NULL AND TRIM(image) <> '' \
             ORDER BY display_order ASC, name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Counts active products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

async fn upsert_product(conn: &mut SqliteConnection, p: &CatalogRecord) -> DbResult<()> {
    sqlx::query(&format!(
        "INSERT OR REPLACE INTO products ({PRODUCT_COLUMNS}) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&p.id)
    .bind(&p.sku)
    .bind(&p.name)
    .bind(&p.description)
    .bind(&p.category)
    .bind(&p.subcategory)
    .bind(&p.image)
    .bind(p.base_price_cents)
    .bind(p.stock)
    .bind(p.is_active)
    .bind(p.display_order)
    .bind(&p.parent_sku)
    .bind(&p.variant_name)
    .bind(&p.dimension)
    .bind(p.units_per_box)
    .bind(p.min_quantity)
    .bind(p.hide_in_catalog)
    .bind(p.created_at)
    .bind(p.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
