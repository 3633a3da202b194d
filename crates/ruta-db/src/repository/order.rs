//! # Order Repository
//!
//! Orders taken on the device and their delivery lifecycle.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Outbound Order States                            │
//! │                                                                         │
//! │  checkout()                                                            │
//! │     │  order + lines + queue item + cart cleared (ONE transaction)     │
//! │     ▼                                                                   │
//! │  ┌──────────────┐  mark_sent()   ┌──────────┐  acknowledge()           │
//! │  │ PENDING_SEND │ ─────────────► │   SENT   │ ──────────────┐          │
//! │  └──────────────┘                └──────────┘               │          │
//! │     ▲                                 │                     ▼          │
//! │     │      return_to_pending()        │          ┌──────────────────┐  │
//! │     └─────────────────────────────────┘          │  ACKNOWLEDGED    │  │
//! │                                                   │  id = server id  │  │
//! │  discard_pending(): manual abandon of an          │  synced = true   │  │
//! │  undelivered order and its queue item             │  queue item gone │  │
//! │                                                   └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lookups accept either identifier: `WHERE id = ? OR local_id = ?`.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::DbResult;
use crate::repository::outbox;
use ruta_core::{
    generate_id, generate_local_order_id, generate_order_number, NewOrder, OrderStatus,
    OrderWithLines, OutboundOrder, OutboundOrderLine, OutboundQueueItem, QueueOperation,
    ORDER_ENTITY_TYPE,
};

const ORDER_COLUMNS: &str = "id, local_id, server_id, user_id, customer_id, order_number, status, \
     synced, subtotal_cents, tax_cents, total_cents, notes, created_at, updated_at";

const LINE_COLUMNS: &str = "id, order_local_id, product_id, product_name, quantity, \
     unit_price_cents, subtotal_cents, custom_text, custom_select, created_at";

/// Repository for outbound orders.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Persists an order and queues it for delivery, atomically.
    ///
    /// ## Returns
    /// The stored order with its local id and lines.
    pub async fn create_with_outbox(&self, order: &NewOrder) -> DbResult<OrderWithLines> {
        let mut tx = self.pool.begin().await?;
        let created = insert_order(&mut tx, order, Utc::now()).await?;
        tx.commit().await?;

        info!(local_id = %created.order.local_id, "Order created");
        Ok(created)
    }

    /// Like [`Self::create_with_outbox`], and removes the ordered cart lines
    /// in the same transaction. Lines added after the cart was read stay.
    pub async fn checkout(
        &self,
        order: &NewOrder,
        cart_line_ids: &[String],
    ) -> DbResult<OrderWithLines> {
        let mut tx = self.pool.begin().await?;
        let created = insert_order(&mut tx, order, Utc::now()).await?;
        let mut cleared = 0;
        for line_id in cart_line_ids {
            cleared += sqlx::query("DELETE FROM cart_items WHERE id = ? AND user_id = ?")
                .bind(line_id)
                .bind(&order.user_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        info!(
            local_id = %created.order.local_id,
            order_number = %created.order.order_number,
            cart_lines = cleared,
            "Checkout complete"
        );
        Ok(created)
    }

    /// Gets an order by its current or local id.
    pub async fn get_with_lines(&self, id: &str) -> DbResult<Option<OrderWithLines>> {
        let order = sqlx::query_as::<_, OutboundOrder>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1 OR local_id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match order {
            Some(order) => {
                let lines = self.lines_for(&order.local_id).await?;
                Ok(Some(OrderWithLines { order, lines }))
            }
            None => Ok(None),
        }
    }

    /// Orders, newest first. `None` lists every user's orders.
    pub async fn list(&self, user_id: Option<&str>) -> DbResult<Vec<OutboundOrder>> {
        let orders = sqlx::query_as::<_, OutboundOrder>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE (?1 IS NULL OR user_id = ?1) \
             ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    /// Orders not yet acknowledged, oldest first.
    pub async fn pending(&self) -> DbResult<Vec<OrderWithLines>> {
        let orders = sqlx::query_as::<_, OutboundOrder>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE synced = 0 ORDER BY created_at ASC, rowid ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut result = Vec::with_capacity(orders.len());
        for order in orders {
            let lines = self.lines_for(&order.local_id).await?;
            result.push(OrderWithLines { order, lines });
        }
        Ok(result)
    }

    /// Counts orders not yet acknowledged.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE synced = 0")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Marks orders as handed to the remote system.
    pub async fn mark_sent(&self, local_ids: &[String]) -> DbResult<()> {
        if local_ids.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for local_id in local_ids {
            sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE local_id = ? AND synced = 0")
                .bind(OrderStatus::Sent)
                .bind(now)
                .bind(local_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!(count = local_ids.len(), "Orders marked sent");
        Ok(())
    }

    /// Records the server's acknowledgement.
    ///
    /// In one transaction: `id` becomes `server_id`, the order is marked
    /// synced and its queue item is deleted. Once synced, an order's id
    /// never changes; repeating the call is a no-op.
    ///
    /// ## Returns
    /// `false` if no order carries `local_id`.
    pub async fn acknowledge(&self, local_id: &str, server_id: &str) -> DbResult<bool> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE orders SET id = ?, server_id = ?, status = ?, synced = 1, updated_at = ? \
             WHERE local_id = ? AND synced = 0",
        )
        .bind(server_id)
        .bind(server_id)
        .bind(OrderStatus::Acknowledged)
        .bind(now)
        .bind(local_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let known = if updated > 0 {
            true
        } else {
            let current: Option<Option<String>> =
                sqlx::query_scalar("SELECT server_id FROM orders WHERE local_id = ?")
                    .bind(local_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if let Some(Some(current)) = &current {
                if current != server_id {
                    warn!(
                        local_id = %local_id,
                        server_id = %current,
                        ignored = %server_id,
                        "Order already acknowledged under another id"
                    );
                }
            }
            current.is_some()
        };

        outbox::delete_item(&mut tx, ORDER_ENTITY_TYPE, local_id).await?;
        tx.commit().await?;

        if !known {
            warn!(local_id = %local_id, server_id = %server_id, "Acknowledged order not in store");
        } else if updated > 0 {
            debug!(local_id = %local_id, server_id = %server_id, "Order acknowledged");
        }
        Ok(known)
    }

    /// Puts a rejected or failed order back in the queue and records the attempt.
    pub async fn return_to_pending(&self, local_id: &str, error: &str) -> DbResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE local_id = ? AND synced = 0")
            .bind(OrderStatus::PendingSend)
            .bind(now)
            .bind(local_id)
            .execute(&mut *tx)
            .await?;
        outbox::record_attempt(&mut tx, ORDER_ENTITY_TYPE, local_id, error, now).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Abandons an undelivered order: deletes it, its lines and its queue item.
    ///
    /// ## Returns
    /// `false` if there is no undelivered order with this id.
    pub async fn discard_pending(&self, id: &str) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let local_id: Option<String> =
            sqlx::query_scalar("SELECT local_id FROM orders WHERE (id = ?1 OR local_id = ?1) AND synced = 0")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(local_id) = local_id else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM order_items WHERE order_local_id = ?")
            .bind(&local_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM orders WHERE local_id = ?")
            .bind(&local_id)
            .execute(&mut *tx)
            .await?;
        outbox::delete_item(&mut tx, ORDER_ENTITY_TYPE, &local_id).await?;

        tx.commit().await?;
        warn!(local_id = %local_id, "Undelivered order discarded");
        Ok(true)
    }

    async fn lines_for(&self, order_local_id: &str) -> DbResult<Vec<OutboundOrderLine>> {
        let lines = sqlx::query_as::<_, OutboundOrderLine>(&format!(
            "SELECT {LINE_COLUMNS} FROM order_items WHERE order_local_id = ? ORDER BY rowid ASC"
        ))
        .bind(order_local_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }
}

async fn insert_order(
    conn: &mut SqliteConnection,
    new: &NewOrder,
    now: DateTime<Utc>,
) -> DbResult<OrderWithLines> {
    let local_id = generate_local_order_id(now);
    let subtotal = new.subtotal();

    let order = OutboundOrder {
        id: local_id.clone(),
        local_id: local_id.clone(),
        server_id: None,
        user_id: new.user_id.clone(),
        customer_id: new.customer_id.clone(),
        order_number: generate_order_number(now),
        status: OrderStatus::PendingSend,
        synced: false,
        subtotal_cents: subtotal.cents(),
        tax_cents: new.tax_cents,
        total_cents: new.total().cents(),
        notes: new.notes.clone(),
        created_at: now,
        updated_at: now,
    };

    sqlx::query(&format!(
        "INSERT INTO orders ({ORDER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&order.id)
    .bind(&order.local_id)
    .bind(&order.server_id)
    .bind(&order.user_id)
    .bind(&order.customer_id)
    .bind(&order.order_number)
    .bind(order.status)
    .bind(order.synced)
    .bind(order.subtotal_cents)
    .bind(order.tax_cents)
    .bind(order.total_cents)
    .bind(&order.notes)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;

    let mut lines = Vec::with_capacity(new.lines.len());
    for line in &new.lines {
        let stored = OutboundOrderLine {
            id: generate_id(),
            order_local_id: local_id.clone(),
            product_id: line.product_id.clone(),
            product_name: line.product_name.clone(),
            quantity: line.quantity,
            unit_price_cents: line.unit_price_cents,
            subtotal_cents: line.subtotal().cents(),
            custom_text: line.custom_text.clone(),
            custom_select: line.custom_select.clone(),
            created_at: now,
        };

        sqlx::query(&format!(
            "INSERT INTO order_items ({LINE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&stored.id)
        .bind(&stored.order_local_id)
        .bind(&stored.product_id)
        .bind(&stored.product_name)
        .bind(stored.quantity)
        .bind(stored.unit_price_cents)
        .bind(stored.subtotal_cents)
        .bind(&stored.custom_text)
        .bind(&stored.custom_select)
        .bind(stored.created_at)
        .execute(&mut *conn)
        .await?;

        lines.push(stored);
    }

    let created = OrderWithLines { order, lines };

    let item = OutboundQueueItem {
        id: generate_id(),
        entity_type: ORDER_ENTITY_TYPE.to_string(),
        entity_id: local_id,
        operation: QueueOperation::Create,
        payload: serde_json::to_string(&created)?,
        created_at: now,
        attempt_count: 0,
        last_error: None,
        last_attempt_at: None,
        delivered: false,
    };
    outbox::insert_item(conn, &item).await?;

    Ok(created)
}

// =============================================================================
// Unit Tests
// =============================================================================
