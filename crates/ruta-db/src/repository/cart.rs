//! # Cart Repository
//!
//! The agent's working cart. Device-only; checkout turns it into an order
//! and empties it in the same transaction (see
//! [`OrderRepository::checkout`](crate::repository::order::OrderRepository::checkout)).
//!
//! ## Merge Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  add(user, product, text, select, qty)                                 │
//! │       │                                                                 │
//! │       ├── line with same (user, product, text, select) exists?         │
//! │       │        └── quantity += qty                                      │
//! │       │                                                                 │
//! │       └── else insert a new line                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use ruta_core::{generate_id, CartLine, NewCartLine};

const CART_COLUMNS: &str = "id, user_id, product_id, quantity, unit_price_cents, \
     custom_text, custom_select, added_at, updated_at";

/// Repository for cart lines.
#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
}

impl CartRepository {
    /// Creates a new CartRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CartRepository { pool }
    }

    /// Adds a product, merging into a matching line.
    ///
    /// ## Returns
    /// The resulting line (new or merged).
    pub async fn add(&self, line: &NewCartLine) -> DbResult<CartLine> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // `IS` so NULL customizations compare equal.
        let existing: Option<String> = sqlx::query_scalar(
            "SELECT id FROM cart_items \
             WHERE user_id = ? AND product_id = ? AND custom_text IS ? AND custom_select IS ?",
        )
        .bind(&line.user_id)
        .bind(&line.product_id)
        .bind(&line.custom_text)
        .bind(&line.custom_select)
        .fetch_optional(&mut *tx)
        .await?;

        let id = match existing {
            Some(id) => {
                debug!(id = %id, added = line.quantity, "Merging into cart line");
                sqlx::query(
                    "UPDATE cart_items SET quantity = quantity + ?, unit_price_cents = ?, updated_at = ? \
                     WHERE id = ?",
                )
                .bind(line.quantity)
                .bind(line.unit_price_cents)
                .bind(now)
                .bind(&id)
                .execute(&mut *tx)
                .await?;
                id
            }
            None => {
                let id = generate_id();
                debug!(id = %id, product_id = %line.product_id, "New cart line");
                sqlx::query(&format!(
                    "INSERT INTO cart_items ({CART_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
                ))
                .bind(&id)
                .bind(&line.user_id)
                .bind(&line.product_id)
                .bind(line.quantity)
                .bind(line.unit_price_cents)
                .bind(&line.custom_text)
                .bind(&line.custom_select)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                id
            }
        };

        let stored = sqlx::query_as::<_, CartLine>(&format!(
            "SELECT {CART_COLUMNS} FROM cart_items WHERE id = ?"
        ))
        .bind(&id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored)
    }

    /// Lines of a user's cart, oldest first.
    pub async fn list(&self, user_id: &str) -> DbResult<Vec<CartLine>> {
        let lines = sqlx::query_as::<_, CartLine>(&format!(
            "SELECT {CART_COLUMNS} FROM cart_items WHERE user_id = ? ORDER BY added_at ASC, rowid ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Sets the quantity of a line.
    pub async fn update_quantity(&self, id: &str, quantity: i64) -> DbResult<()> {
        let result = sqlx::query("UPDATE cart_items SET quantity = ?, updated_at = ? WHERE id = ?")
            .bind(quantity)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Cart line", id));
        }
        Ok(())
    }

    /// Removes a line.
    pub async fn remove(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Cart line", id));
        }
        Ok(())
    }

    /// Empties a user's cart. Returns the number of lines removed.
    pub async fn clear(&self, user_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
