//! # Domain Types
//!
//! Entities held in the device replica, the orders the device originates,
//! and the bookkeeping rows that track what still has to reach the server.
//!
//! ## Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Who Writes What                               │
//! │                                                                         │
//! │  REMOTE-OWNED (written only by inbound sync, upsert by primary key)    │
//! │  ┌───────────────┐ ┌───────────────┐ ┌───────────────┐ ┌────────────┐  │
//! │  │ CatalogRecord │ │ PricingEntry  │ │CustomerRecord │ │ Promotion  │  │
//! │  │ ProductVariant│ │ (prod, tier)  │ │  price_tier   │ │  Record    │  │
//! │  └───────────────┘ └───────────────┘ └───────────────┘ └────────────┘  │
//! │                                                                         │
//! │  LOCAL-ORIGIN                                                          │
//! │  ┌───────────────┐  checkout   ┌──────────────────┐  same tx  ┌──────┐ │
//! │  │   CartLine    │ ──────────► │  OutboundOrder   │ ────────► │Queue │ │
//! │  │  (ephemeral)  │             │  + lines         │           │ Item │ │
//! │  └───────────────┘             └──────────────────┘           └──────┘ │
//! │                                                                         │
//! │  BOOKKEEPING: SyncCheckpoint (lastFullSync, lastIncrementalSync)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two-Phase Order Identity
//! An order is born with a `local_id` (`local_{millis}_{rand}`) which is also
//! its `id`. When the server acknowledges it, `id` becomes the server id,
//! `server_id` is set and `synced` flips. `local_id` never changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::CoreError;
use crate::money::Money;

fn default_true() -> bool {
    true
}

fn default_min_quantity() -> i64 {
    1
}

fn default_customer_status() -> String {
    "active".to_string()
}

// =============================================================================
// Price Tier
// =============================================================================

/// Price list a customer buys from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum PriceTier {
    /// Customers inside the city.
    #[default]
    #[serde(rename = "ciudad")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "ciudad"))]
    City,
    /// Customers in the interior provinces.
    #[serde(rename = "interior")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "interior"))]
    Interior,
    /// Negotiated special prices.
    #[serde(rename = "especial")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "especial"))]
    Special,
}

impl PriceTier {
    /// Wire/storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceTier::City => "ciudad",
            PriceTier::Interior => "interior",
            PriceTier::Special => "especial",
        }
    }
}

impl fmt::Display for PriceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceTier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ciudad" | "city" => Ok(PriceTier::City),
            "interior" => Ok(PriceTier::Interior),
            "especial" | "special" => Ok(PriceTier::Special),
            other => Err(CoreError::UnknownPriceTier(other.to_string())),
        }
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// A product (or a variant row that carries a `parent_sku`) in the catalog.
///
/// Overwritten wholesale on every sync; never patched field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CatalogRecord {
    pub id: String,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    /// Remote image reference (absolute URL or server-relative path).
    pub image: Option<String>,
    pub base_price_cents: i64,
    #[serde(default)]
    pub stock: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub display_order: i64,
    pub parent_sku: Option<String>,
    pub variant_name: Option<String>,
    pub dimension: Option<String>,
    #[serde(default)]
    pub units_per_box: i64,
    #[serde(default = "default_min_quantity")]
    pub min_quantity: i64,
    #[serde(default)]
    pub hide_in_catalog: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl CatalogRecord {
    #[inline]
    pub fn base_price(&self) -> Money {
        Money::from_cents(self.base_price_cents)
    }

    /// Shown in the catalog listing.
    pub fn is_listed(&self) -> bool {
        self.is_active && !self.hide_in_catalog
    }

    /// Has an image reference the asset cache should fetch.
    pub fn has_image(&self) -> bool {
        self.image.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

/// A selectable variant of a product (size, colour, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ProductVariant {
    pub id: String,
    pub product_id: String,
    pub variant_type: String,
    pub variant_value: String,
    pub sku: Option<String>,
    #[serde(default)]
    pub stock: i64,
    pub base_price_cents: Option<i64>,
    pub city_price_cents: Option<i64>,
    pub interior_price_cents: Option<i64>,
    pub special_price_cents: Option<i64>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl ProductVariant {
    /// Tier price of this variant, falling back to its own base price.
    pub fn price_for(&self, tier: PriceTier) -> Option<Money> {
        let tier_price = match tier {
            PriceTier::City => self.city_price_cents,
            PriceTier::Interior => self.interior_price_cents,
            PriceTier::Special => self.special_price_cents,
        };
        tier_price.or(self.base_price_cents).map(Money::from_cents)
    }
}

/// Price of one product in one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PricingEntry {
    pub product_id: String,
    pub price_tier: PriceTier,
    pub price_cents: i64,
    #[serde(default = "default_min_quantity")]
    pub min_quantity: i64,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Customers
// =============================================================================

/// A customer the agent sells to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CustomerRecord {
    pub id: String,
    pub name: Option<String>,
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub client_number: Option<String>,
    pub contact_person: Option<String>,
    #[serde(default)]
    pub price_tier: PriceTier,
    pub assigned_agent_id: Option<String>,
    #[serde(default = "default_customer_status")]
    pub status: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl CustomerRecord {
    /// Company name, then contact name, then the id.
    pub fn display_name(&self) -> &str {
        self.company_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }
}

// =============================================================================
// Promotions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum DiscountType {
    /// `discount_value` is in basis points.
    Percentage,
    /// `discount_value` is in minor units.
    Fixed,
}

/// A time-boxed discount on one product. Evaluated by the server;
/// the device only displays it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PromotionRecord {
    pub id: String,
    pub product_id: String,
    pub name: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    #[ts(as = "String")]
    pub start_date: DateTime<Utc>,
    #[ts(as = "String")]
    pub end_date: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl PromotionRecord {
    /// Enabled and `start_date <= now <= end_date`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.start_date <= now && now <= self.end_date
    }

    /// Price preview shown next to the list price. Never below zero.
    pub fn apply_to(&self, price: Money) -> Money {
        let discounted = match self.discount_type {
            DiscountType::Percentage => price.apply_percentage_discount(self.discount_value),
            DiscountType::Fixed => price - Money::from_cents(self.discount_value),
        };
        if discounted.is_negative() {
            Money::zero()
        } else {
            discounted
        }
    }
}

// =============================================================================
// Cart
// =============================================================================

/// One line of an agent's working cart. Never synced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CartLine {
    pub id: String,
    pub user_id: String,
    pub product_id: String,
    pub quantity: i64,
    /// Price at the moment the line was added.
    pub unit_price_cents: i64,
    pub custom_text: Option<String>,
    pub custom_select: Option<String>,
    #[ts(as = "String")]
    pub added_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl CartLine {
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }
}

/// Input for adding a product to the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NewCartLine {
    pub user_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub custom_text: Option<String>,
    pub custom_select: Option<String>,
}

// =============================================================================
// Outbound Orders
// =============================================================================

/// Delivery state of a locally created order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum OrderStatus {
    /// Created locally, not yet handed to the remote system.
    #[default]
    PendingSend,
    /// Included in a push that has not been answered.
    Sent,
    /// The server assigned an id.
    Acknowledged,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::PendingSend => write!(f, "pending_send"),
            OrderStatus::Sent => write!(f, "sent"),
            OrderStatus::Acknowledged => write!(f, "acknowledged"),
        }
    }
}

/// An order taken on the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OutboundOrder {
    /// Current identifier: the local id until acknowledged, then the server id.
    pub id: String,
    /// Identifier assigned at creation. Immutable.
    pub local_id: String,
    pub server_id: Option<String>,
    pub user_id: String,
    pub customer_id: Option<String>,
    pub order_number: String,
    pub status: OrderStatus,
    pub synced: bool,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl OutboundOrder {
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    pub fn is_acknowledged(&self) -> bool {
        self.status == OrderStatus::Acknowledged && self.synced
    }
}

/// A line of an [`OutboundOrder`]. Keyed to the order's immutable local id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OutboundOrderLine {
    pub id: String,
    pub order_local_id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub subtotal_cents: i64,
    pub custom_text: Option<String>,
    pub custom_select: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// An order together with its lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OrderWithLines {
    #[serde(flatten)]
    pub order: OutboundOrder,
    pub lines: Vec<OutboundOrderLine>,
}

/// Input for creating an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NewOrder {
    pub user_id: String,
    pub customer_id: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub tax_cents: i64,
    pub lines: Vec<NewOrderLine>,
}

impl NewOrder {
    /// Sum of line subtotals.
    pub fn subtotal(&self) -> Money {
        self.lines.iter().map(NewOrderLine::subtotal).sum()
    }

    pub fn total(&self) -> Money {
        self.subtotal() + Money::from_cents(self.tax_cents)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NewOrderLine {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub custom_text: Option<String>,
    pub custom_select: Option<String>,
}

impl NewOrderLine {
    /// Builds an order line from a cart line, freezing the product name.
    pub fn from_cart_line(line: &CartLine, product_name: impl Into<String>) -> Self {
        NewOrderLine {
            product_id: line.product_id.clone(),
            product_name: product_name.into(),
            quantity: line.quantity,
            unit_price_cents: line.unit_price_cents,
            custom_text: line.custom_text.clone(),
            custom_select: line.custom_select.clone(),
        }
    }

    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }
}

/// Turns the user's cart into an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CheckoutRequest {
    pub user_id: String,
    pub customer_id: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub tax_cents: i64,
}

// =============================================================================
// Outbound Queue
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[serde(rename_all = "UPPERCASE")]
pub enum QueueOperation {
    Create,
    Update,
    Delete,
}

/// One locally originated change that has not reached the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct OutboundQueueItem {
    pub id: String,
    /// `"order"` for everything checkout produces.
    pub entity_type: String,
    /// The order's local id.
    pub entity_id: String,
    pub operation: QueueOperation,
    /// JSON snapshot taken when the item was queued.
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub attempt_count: i64,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub delivered: bool,
}

// =============================================================================
// Sync Checkpoint
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct SyncCheckpoint {
    pub key: String,
    pub value: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Identifiers
// =============================================================================

/// New UUID v4 for rows the device creates.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Local order id: `local_{epochMillis}_{10 random chars}`.
pub fn generate_local_order_id(now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("local_{}_{}", now.timestamp_millis(), &random[..10])
}

/// Human-facing order number: `ORD-{epochMillis}`.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    format!("ORD-{}", now.timestamp_millis())
}

/// True for ids produced by [`generate_local_order_id`].
pub fn is_local_order_id(id: &str) -> bool {
    id.starts_with("local_")
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn promotion(discount_type: DiscountType, value: i64) -> PromotionRecord {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        PromotionRecord {
            id: "promo-1".into(),
            product_id: "p-1".into(),
            name: "March".into(),
            description: None,
            discount_type,
            discount_value: value,
            start_date: start,
            end_date: start + Duration::days(30),
            is_active: true,
            updated_at: start,
        }
    }

    #[test]
    fn test_price_tier_parsing() {
        assert_eq!("ciudad".parse::<PriceTier>().unwrap(), PriceTier::City);
        assert_eq!("Interior".parse::<PriceTier>().unwrap(), PriceTier::Interior);
        assert_eq!("especial".parse::<PriceTier>().unwrap(), PriceTier::Special);
        assert!("mayorista".parse::<PriceTier>().is_err());
        assert_eq!(serde_json::to_string(&PriceTier::City).unwrap(), "\"ciudad\"");
    }

    #[test]
    fn test_promotion_window() {
        let promo = promotion(DiscountType::Percentage, 1000);
        let inside = Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2025, 2, 28, 23, 59, 59).unwrap();
        assert!(promo.is_active_at(inside));
        assert!(!promo.is_active_at(before));
        assert!(promo.is_active_at(promo.end_date));

        let disabled = PromotionRecord {
            is_active: false,
            ..promo
        };
        assert!(!disabled.is_active_at(inside));
    }

    #[test]
    fn test_promotion_apply() {
        let price = Money::from_cents(2_000);
        assert_eq!(promotion(DiscountType::Percentage, 2_500).apply_to(price).cents(), 1_500);
        assert_eq!(promotion(DiscountType::Fixed, 300).apply_to(price).cents(), 1_700);
        assert_eq!(promotion(DiscountType::Fixed, 5_000).apply_to(price), Money::zero());
    }

    #[test]
    fn test_new_order_totals() {
        let order = NewOrder {
            user_id: "agent-1".into(),
            customer_id: None,
            notes: None,
            tax_cents: 150,
            lines: vec![
                NewOrderLine {
                    product_id: "a".into(),
                    product_name: "Bolsa kraft".into(),
                    quantity: 3,
                    unit_price_cents: 400,
                    custom_text: None,
                    custom_select: None,
                },
                NewOrderLine {
                    product_id: "b".into(),
                    product_name: "Caja 20x20".into(),
                    quantity: 1,
                    unit_price_cents: 850,
                    custom_text: Some("Logo".into()),
                    custom_select: None,
                },
            ],
        };
        assert_eq!(order.subtotal().cents(), 2_050);
        assert_eq!(order.total().cents(), 2_200);
    }

    #[test]
    fn test_local_order_id_format() {
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let id = generate_local_order_id(now);
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "local");
        assert_eq!(parts[1], now.timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 10);
        assert!(is_local_order_id(&id));
        assert_eq!(generate_order_number(now), format!("ORD-{}", now.timestamp_millis()));
    }

    #[test]
    fn test_variant_price_falls_back_to_base() {
        let variant = ProductVariant {
            id: "v-1".into(),
            product_id: "p-1".into(),
            variant_type: "size".into(),
            variant_value: "XL".into(),
            sku: None,
            stock: 0,
            base_price_cents: Some(900),
            city_price_cents: Some(800),
            interior_price_cents: None,
            special_price_cents: None,
            is_active: true,
            updated_at: Utc::now(),
        };
        assert_eq!(variant.price_for(PriceTier::City), Some(Money::from_cents(800)));
        assert_eq!(variant.price_for(PriceTier::Interior), Some(Money::from_cents(900)));
    }

    #[test]
    fn test_catalog_record_deserializes_with_defaults() {
        let json = r#"{
            "id": "p-1", "sku": "BK-01", "name": "Bolsa kraft",
            "basePriceCents": 450, "image": "/uploads/products/p-1.jpg",
            "createdAt": "2025-01-01T00:00:00Z", "updatedAt": "2025-01-02T00:00:00Z"
        }"#;
        let record: CatalogRecord = serde_json::from_str(json).unwrap();
        assert!(record.is_active);
        assert!(record.is_listed());
        assert!(record.has_image());
        assert_eq!(record.min_quantity, 1);
        assert_eq!(record.base_price().cents(), 450);
    }
}
