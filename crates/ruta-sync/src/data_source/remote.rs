//! [`DataSource`] over the remote REST API.
//!
//! Used when the device is online and the caller wants the system of record
//! directly. Nothing here touches the local replica.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

use ruta_core::{
    CartLine, CatalogRecord, CheckoutRequest, CustomerRecord, Money, NewCartLine, NewOrder,
    OrderWithLines, OutboundOrder, PriceTier, ProductVariant, PromotionRecord,
};

use super::DataSource;
use crate::error::{SyncError, SyncResult};
use crate::remote::HttpRemote;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceBody {
    price_cents: i64,
}

#[derive(Debug, Deserialize)]
struct ClearedBody {
    removed: u64,
}

/// Path segment with everything outside the unreserved set percent-encoded.
fn segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

/// Reads and writes straight against `{base}`.
#[derive(Debug, Clone)]
pub struct RemoteDataSource {
    remote: HttpRemote,
}

impl RemoteDataSource {
    pub fn new(remote: HttpRemote) -> Self {
        RemoteDataSource { remote }
    }
}

#[async_trait]
impl DataSource for RemoteDataSource {
    async fn list_products(&self) -> SyncResult<Vec<CatalogRecord>> {
        self.remote.get_json("/products", &[]).await
    }

    async fn get_product(&self, id: &str) -> SyncResult<Option<CatalogRecord>> {
        self.remote
            .get_optional(&format!("/products/{}", segment(id)))
            .await
    }

    async fn list_variants(&self, product_id: &str) -> SyncResult<Vec<ProductVariant>> {
        self.remote
            .get_json(&format!("/products/{}/variants", segment(product_id)), &[])
            .await
    }

    async fn price_for(&self, product_id: &str, tier: PriceTier) -> SyncResult<Money> {
        let body: PriceBody = self
            .remote
            .get_json(
                &format!("/pricing/{}", segment(product_id)),
                &[("tier", tier.as_str().to_string())],
            )
            .await?;
        Ok(Money::from_cents(body.price_cents))
    }

    async fn list_customers(&self) -> SyncResult<Vec<CustomerRecord>> {
        self.remote.get_json("/customers", &[]).await
    }

    async fn get_customer(&self, id: &str) -> SyncResult<Option<CustomerRecord>> {
        self.remote
            .get_optional(&format!("/customers/{}", segment(id)))
            .await
    }

    async fn create_order(&self, order: NewOrder) -> SyncResult<OrderWithLines> {
        self.remote.send_json(Method::POST, "/orders", &order).await
    }

    async fn checkout(&self, request: CheckoutRequest) -> SyncResult<OrderWithLines> {
        self.remote
            .send_json(Method::POST, "/orders/checkout", &request)
            .await
    }

    async fn list_orders(&self, user_id: Option<&str>) -> SyncResult<Vec<OutboundOrder>> {
        let query: Vec<(&str, String)> = user_id
            .map(|id| vec![("userId", id.to_string())])
            .unwrap_or_default();
        self.remote.get_json("/orders", &query).await
    }

    async fn get_order(&self, id: &str) -> SyncResult<Option<OrderWithLines>> {
        self.remote
            .get_optional(&format!("/orders/{}", segment(id)))
            .await
    }

    /// The server holds no unsent orders.
    async fn pending_orders(&self) -> SyncResult<Vec<OrderWithLines>> {
        Ok(Vec::new())
    }

    async fn cart_lines(&self, user_id: &str) -> SyncResult<Vec<CartLine>> {
        self.remote
            .get_json("/cart", &[("userId", user_id.to_string())])
            .await
    }

    async fn add_to_cart(&self, line: NewCartLine) -> SyncResult<CartLine> {
        self.remote.send_json(Method::POST, "/cart", &line).await
    }

    async fn update_cart_line(&self, id: &str, quantity: i64) -> SyncResult<()> {
        let _: serde_json::Value = self
            .remote
            .send_json(
                Method::PATCH,
                &format!("/cart/{}", segment(id)),
                &json!({ "quantity": quantity }),
            )
            .await?;
        Ok(())
    }

    async fn remove_cart_line(&self, id: &str) -> SyncResult<()> {
        self.remote
            .send_empty(Method::DELETE, &format!("/cart/{}", segment(id)), &[])
            .await
    }

    async fn clear_cart(&self, user_id: &str) -> SyncResult<u64> {
        let body: ClearedBody = self
            .remote
            .query_json(Method::DELETE, "/cart", &[("userId", user_id.to_string())])
            .await?;
        Ok(body.removed)
    }

    async fn active_promotions(&self) -> SyncResult<Vec<PromotionRecord>> {
        self.remote.get_json("/promotions/active", &[]).await
    }

    async fn promotions_for_product(&self, product_id: &str) -> SyncResult<Vec<PromotionRecord>> {
        self.remote
            .get_json(&format!("/products/{}/promotions", segment(product_id)), &[])
            .await
            .or_else(|e| match e {
                SyncError::NotFound(_) => Ok(Vec::new()),
                other => Err(other),
            })
    }
}
