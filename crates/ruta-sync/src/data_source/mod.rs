//! # Data Access Facade
//!
//! One capability contract for everything the catalog, cart and order
//! screens need, implemented against the device replica and against the
//! remote REST API. Presentation code holds an `Arc<dyn DataSource>` and
//! never learns which one it got.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Data Access Facade                              │
//! │                                                                         │
//! │                     ┌──────────────────────┐                            │
//! │   screens ─────────►│  dyn DataSource      │                            │
//! │                     └──────────┬───────────┘                            │
//! │               ┌────────────────┴────────────────┐                       │
//! │               ▼                                 ▼                       │
//! │   ┌──────────────────────┐          ┌──────────────────────┐            │
//! │   │  LocalDataSource     │          │  RemoteDataSource    │            │
//! │   │  SQLite replica      │          │  REST under {base}   │            │
//! │   │  create_order also   │          │                      │            │
//! │   │  queues for upload   │          │                      │            │
//! │   └──────────────────────┘          └──────────────────────┘            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;

use ruta_core::{
    CartLine, CatalogRecord, CheckoutRequest, CustomerRecord, Money, NewCartLine, NewOrder,
    OrderWithLines, OutboundOrder, PriceTier, ProductVariant, PromotionRecord,
};

use crate::error::SyncResult;

pub mod local;
pub mod remote;

pub use local::LocalDataSource;
pub use remote::RemoteDataSource;

/// Read and write operations available to presentation code.
#[async_trait]
pub trait DataSource: Send + Sync {
    // ---- Catalog ----

    /// Products shown in the catalog, in display order.
    async fn list_products(&self) -> SyncResult<Vec<CatalogRecord>>;

    async fn get_product(&self, id: &str) -> SyncResult<Option<CatalogRecord>>;

    async fn list_variants(&self, product_id: &str) -> SyncResult<Vec<ProductVariant>>;

    /// Price of a product in a tier. `NotFound` if there is none.
    async fn price_for(&self, product_id: &str, tier: PriceTier) -> SyncResult<Money>;

    // ---- Customers ----

    async fn list_customers(&self) -> SyncResult<Vec<CustomerRecord>>;

    async fn get_customer(&self, id: &str) -> SyncResult<Option<CustomerRecord>>;

    // ---- Orders ----

    /// Stores an order. The local implementation also queues it for upload
    /// in the same transaction; no second call is needed.
    async fn create_order(&self, order: NewOrder) -> SyncResult<OrderWithLines>;

    /// Turns the user's cart into an order and empties the cart.
    async fn checkout(&self, request: CheckoutRequest) -> SyncResult<OrderWithLines>;

    async fn list_orders(&self, user_id: Option<&str>) -> SyncResult<Vec<OutboundOrder>>;

    /// Looks an order up by its local or server id.
    async fn get_order(&self, id: &str) -> SyncResult<Option<OrderWithLines>>;

    /// Orders the server has not acknowledged yet.
    async fn pending_orders(&self) -> SyncResult<Vec<OrderWithLines>>;

    // ---- Cart ----

    async fn cart_lines(&self, user_id: &str) -> SyncResult<Vec<CartLine>>;

    async fn add_to_cart(&self, line: NewCartLine) -> SyncResult<CartLine>;

    async fn update_cart_line(&self, id: &str, quantity: i64) -> SyncResult<()>;

    async fn remove_cart_line(&self, id: &str) -> SyncResult<()>;

    /// Returns the number of lines removed.
    async fn clear_cart(&self, user_id: &str) -> SyncResult<u64>;

    // ---- Promotions ----

    async fn active_promotions(&self) -> SyncResult<Vec<PromotionRecord>>;

    async fn promotions_for_product(&self, product_id: &str) -> SyncResult<Vec<PromotionRecord>>;
}
