//! [`DataSource`] over the device replica.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use ruta_core::validation::{validate_new_cart_line, validate_new_order, validate_quantity};
use ruta_core::{
    CartLine, CatalogRecord, CheckoutRequest, CoreError, CustomerRecord, Money, NewCartLine,
    NewOrder, NewOrderLine, OrderWithLines, OutboundOrder, PriceTier, ProductVariant,
    PromotionRecord,
};
use ruta_db::Database;

use super::DataSource;
use crate::error::{SyncError, SyncResult};

/// Serves every read from SQLite and commits every write locally.
#[derive(Debug, Clone)]
pub struct LocalDataSource {
    db: Database,
}

impl LocalDataSource {
    pub fn new(db: Database) -> Self {
        LocalDataSource { db }
    }
}

#[async_trait]
impl DataSource for LocalDataSource {
    async fn list_products(&self) -> SyncResult<Vec<CatalogRecord>> {
        Ok(self.db.catalog().list_listed().await?)
    }

    async fn get_product(&self, id: &str) -> SyncResult<Option<CatalogRecord>> {
        Ok(self.db.catalog().get_by_id(id).await?)
    }

    async fn list_variants(&self, product_id: &str) -> SyncResult<Vec<ProductVariant>> {
        Ok(self.db.catalog().variants_for(product_id).await?)
    }

    async fn price_for(&self, product_id: &str, tier: PriceTier) -> SyncResult<Money> {
        self.db
            .pricing()
            .price_for(product_id, tier)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("price {product_id}/{}", tier.as_str())))
    }

    async fn list_customers(&self) -> SyncResult<Vec<CustomerRecord>> {
        Ok(self.db.customers().list().await?)
    }

    async fn get_customer(&self, id: &str) -> SyncResult<Option<CustomerRecord>> {
        Ok(self.db.customers().get_by_id(id).await?)
    }

    async fn create_order(&self, order: NewOrder) -> SyncResult<OrderWithLines> {
        validate_new_order(&order)?;
        Ok(self.db.orders().create_with_outbox(&order).await?)
    }

    /// Freezes current cart lines (price and product name) into an order.
    async fn checkout(&self, request: CheckoutRequest) -> SyncResult<OrderWithLines> {
        let cart = self.db.cart().list(&request.user_id).await?;
        if cart.is_empty() {
            return Err(CoreError::EmptyCart {
                user_id: request.user_id,
            }
            .into());
        }

        let catalog = self.db.catalog();
        let mut lines = Vec::with_capacity(cart.len());
        for line in &cart {
            let product = catalog
                .get_by_id(&line.product_id)
                .await?
                .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;
            lines.push(NewOrderLine::from_cart_line(line, product.name));
        }

        let order = NewOrder {
            user_id: request.user_id,
            customer_id: request.customer_id,
            notes: request.notes,
            tax_cents: request.tax_cents,
            lines,
        };
        validate_new_order(&order)?;

        let line_ids: Vec<String> = cart.iter().map(|line| line.id.clone()).collect();
        let created = self.db.orders().checkout(&order, &line_ids).await?;
        info!(
            local_id = %created.order.local_id,
            lines = created.lines.len(),
            total_cents = created.order.total_cents,
            "Order queued for upload"
        );
        Ok(created)
    }

    async fn list_orders(&self, user_id: Option<&str>) -> SyncResult<Vec<OutboundOrder>> {
        Ok(self.db.orders().list(user_id).await?)
    }

    async fn get_order(&self, id: &str) -> SyncResult<Option<OrderWithLines>> {
        Ok(self.db.orders().get_with_lines(id).await?)
    }

    async fn pending_orders(&self) -> SyncResult<Vec<OrderWithLines>> {
        Ok(self.db.orders().pending().await?)
    }

    async fn cart_lines(&self, user_id: &str) -> SyncResult<Vec<CartLine>> {
        Ok(self.db.cart().list(user_id).await?)
    }

    async fn add_to_cart(&self, line: NewCartLine) -> SyncResult<CartLine> {
        validate_new_cart_line(&line)?;
        if self.db.catalog().get_by_id(&line.product_id).await?.is_none() {
            return Err(CoreError::ProductNotFound(line.product_id).into());
        }
        let added = self.db.cart().add(&line).await?;
        debug!(line_id = %added.id, product_id = %added.product_id, "Cart line added");
        Ok(added)
    }

    async fn update_cart_line(&self, id: &str, quantity: i64) -> SyncResult<()> {
        validate_quantity(quantity)?;
        self.db.cart().update_quantity(id, quantity).await?;
        Ok(())
    }

    async fn remove_cart_line(&self, id: &str) -> SyncResult<()> {
        self.db.cart().remove(id).await?;
        Ok(())
    }

    async fn clear_cart(&self, user_id: &str) -> SyncResult<u64> {
        Ok(self.db.cart().clear(user_id).await?)
    }

    async fn active_promotions(&self) -> SyncResult<Vec<PromotionRecord>> {
        Ok(self.db.promotions().active_at(Utc::now()).await?)
    }

    async fn promotions_for_product(&self, product_id: &str) -> SyncResult<Vec<PromotionRecord>> {
        Ok(self.db.promotions().for_product(product_id, Utc::now()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::catalog_record;
    use ruta_core::{OrderStatus, PricingEntry, ORDER_ENTITY_TYPE};
    use ruta_db::DbConfig;

    async fn seeded() -> (Database, LocalDataSource) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.catalog()
            .upsert_batch(&[catalog_record("p-1", None), catalog_record("p-2", None)])
            .await
            .unwrap();
        let source = LocalDataSource::new(db.clone());
        (db, source)
    }

    fn cart_line(product_id: &str, quantity: i64) -> NewCartLine {
        NewCartLine {
            user_id: "agent-1".to_string(),
            product_id: product_id.to_string(),
            quantity,
            unit_price_cents: 450,
            custom_text: None,
            custom_select: None,
        }
    }

    #[tokio::test]
    async fn test_offline_checkout_queues_one_order() {
        let (db, source) = seeded().await;

        source.add_to_cart(cart_line("p-1", 2)).await.unwrap();
        source.add_to_cart(cart_line("p-2", 1)).await.unwrap();

        let created = source
            .checkout(CheckoutRequest {
                user_id: "agent-1".into(),
                customer_id: Some("c-1".into()),
                notes: None,
                tax_cents: 0,
            })
            .await
            .unwrap();

        assert_eq!(created.lines.len(), 2);
        assert_eq!(created.order.status, OrderStatus::PendingSend);
        assert_eq!(created.order.subtotal_cents, 1_350);
        assert!(created.lines.iter().any(|l| l.product_name == "Product p-1"));

        assert!(source.cart_lines("agent-1").await.unwrap().is_empty());
        assert_eq!(source.pending_orders().await.unwrap().len(), 1);
        assert!(db
            .outbox()
            .get(ORDER_ENTITY_TYPE, &created.order.local_id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_checkout_of_empty_cart_is_rejected() {
        let (db, source) = seeded().await;

        let err = source
            .checkout(CheckoutRequest {
                user_id: "agent-1".into(),
                customer_id: None,
                notes: None,
                tax_cents: 0,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Validation(_)));
        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cart_rejects_unknown_product_and_bad_quantity() {
        let (_db, source) = seeded().await;

        let err = source.add_to_cart(cart_line("p-404", 1)).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));

        let err = source.add_to_cart(cart_line("p-1", 0)).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));

        let line = source.add_to_cart(cart_line("p-1", 1)).await.unwrap();
        assert!(source.update_cart_line(&line.id, -3).await.is_err());
        source.update_cart_line(&line.id, 4).await.unwrap();
        assert_eq!(source.cart_lines("agent-1").await.unwrap()[0].quantity, 4);

        source.remove_cart_line(&line.id).await.unwrap();
        assert!(matches!(
            source.remove_cart_line(&line.id).await,
            Err(SyncError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_price_lookup() {
        let (db, source) = seeded().await;
        db.pricing()
            .upsert_batch(&[PricingEntry {
                product_id: "p-1".into(),
                price_tier: PriceTier::Interior,
                price_cents: 780,
                min_quantity: 1,
                updated_at: Utc::now(),
            }])
            .await
            .unwrap();

        assert_eq!(
            source.price_for("p-1", PriceTier::Interior).await.unwrap(),
            Money::from_cents(780)
        );
        assert_eq!(
            source.price_for("p-1", PriceTier::City).await.unwrap(),
            Money::from_cents(500)
        );
        assert!(matches!(
            source.price_for("p-404", PriceTier::City).await,
            Err(SyncError::NotFound(_))
        ));
    }
}
