//! # Sync Protocol Types
//!
//! JSON bodies exchanged with the remote system of record.
//!
//! ## Endpoints
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Remote Sync Endpoints                             │
//! │                                                                         │
//! │  GET  {base}/sync/initial?includeImages=true                           │
//! │       ◄── FullSnapshot { catalog, variants, customers, pricing,        │
//! │                          promotions, serverTimestamp }                 │
//! │                                                                         │
//! │  GET  {base}/sync/updates?since=2024-05-01T10:00:00Z                   │
//! │       ◄── DeltaBatch { catalog[isNew], variants, pricing,              │
//! │                        promotions, customers, serverTimestamp }        │
//! │                                                                         │
//! │  POST {base}/sync/orders                                               │
//! │       ──► PushOrdersRequest { deviceId, orders: [OrderUpload] }        │
//! │       ◄── PushOrdersResponse { results: [OrderPushResult] }            │
//! │           one result per localId: serverId on success, else error      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All timestamps are RFC 3339; prices are integer cents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ruta_core::{
    CatalogRecord, CustomerRecord, OrderWithLines, PricingEntry, ProductVariant, PromotionRecord,
};

// =============================================================================
// Inbound
// =============================================================================

/// Complete current state of everything the device replicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSnapshot {
    pub catalog: Vec<CatalogRecord>,
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
    #[serde(default)]
    pub customers: Vec<CustomerRecord>,
    #[serde(default)]
    pub pricing: Vec<PricingEntry>,
    #[serde(default)]
    pub promotions: Vec<PromotionRecord>,
    /// The instant the snapshot describes. Becomes both checkpoints.
    pub server_timestamp: DateTime<Utc>,
}

/// A catalog record in a delta, flagged when the device has never seen it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDelta {
    #[serde(flatten)]
    pub record: CatalogRecord,
    #[serde(default)]
    pub is_new: bool,
}

/// Everything that changed after the requested checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaBatch {
    #[serde(default)]
    pub catalog: Vec<CatalogDelta>,
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
    #[serde(default)]
    pub pricing: Vec<PricingEntry>,
    #[serde(default)]
    pub promotions: Vec<PromotionRecord>,
    #[serde(default)]
    pub customers: Vec<CustomerRecord>,
    pub server_timestamp: DateTime<Utc>,
}

impl DeltaBatch {
    /// A batch with no changes.
    pub fn empty(server_timestamp: DateTime<Utc>) -> Self {
        DeltaBatch {
            catalog: Vec::new(),
            variants: Vec::new(),
            pricing: Vec::new(),
            promotions: Vec::new(),
            customers: Vec::new(),
            server_timestamp,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
            && self.variants.is_empty()
            && self.pricing.is_empty()
            && self.promotions.is_empty()
            && self.customers.is_empty()
    }
}

// =============================================================================
// Outbound
// =============================================================================

/// One order submitted for acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpload {
    pub local_id: String,
    pub order: OrderWithLines,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOrdersRequest {
    pub device_id: String,
    pub orders: Vec<OrderUpload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOrdersResponse {
    #[serde(default)]
    pub results: Vec<OrderPushResult>,
}

/// The server's verdict on one uploaded order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPushResult {
    pub local_id: String,
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl OrderPushResult {
    pub fn accepted(local_id: impl Into<String>, server_id: impl Into<String>) -> Self {
        OrderPushResult {
            local_id: local_id.into(),
            server_id: Some(server_id.into()),
            error: None,
        }
    }

    pub fn rejected(local_id: impl Into<String>, error: impl Into<String>) -> Self {
        OrderPushResult {
            local_id: local_id.into(),
            server_id: None,
            error: Some(error.into()),
        }
    }

    /// The server id, if the order was accepted without error.
    pub fn server_id(&self) -> Option<&str> {
        match (&self.server_id, &self.error) {
            (Some(id), None) if !id.trim().is_empty() => Some(id.as_str()),
            _ => None,
        }
    }
}
