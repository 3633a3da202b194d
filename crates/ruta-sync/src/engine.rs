//! # Sync Engine
//!
//! Reconciles the device replica with the remote system of record.
//!
//! ## Run Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SyncEngine::run                                │
//! │                                                                         │
//! │   IDLE ──try_acquire──► SYNCING ──(guard dropped)──► IDLE               │
//! │     │                                                                   │
//! │     ├── already syncing ──► SyncReport { busy: true }   (no network)   │
//! │     └── offline          ──► "No internet connection"   (no network)   │
//! │                                                                         │
//! │   SYNCING:                                                             │
//! │   ┌──────────────────┐    ┌──────────────────────────────────────────┐ │
//! │   │ 1. DRAIN OUTBOX  │───►│ 2. PULL                                  │ │
//! │   │  pending orders  │    │  Full:        snapshot → upsert all      │ │
//! │   │  → push_orders   │    │               → every image              │ │
//! │   │  accepted: ack   │    │               → both checkpoints = T     │ │
//! │   │  rejected: back  │    │  Incremental: deltas since checkpoint    │ │
//! │   │   to pending     │    │               → upsert → new images      │ │
//! │   └──────────────────┘    │               → checkpoint = T           │ │
//! │                           └──────────────────────────────────────────┘ │
//! │                                                                         │
//! │   Recoverable faults (network, rejection, image) land in               │
//! │   report.errors. Only store faults escape as Err.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Order Status
//! ```text
//! PendingSend ──mark_sent──► Sent ──server id──► Acknowledged (synced)
//!      ▲                       │
//!      └──── rejected ─────────┘   (network fault: stays Sent, retried)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use ts_rs::TS;

use ruta_core::{
    CatalogRecord, CustomerRecord, OrderWithLines, OutboundQueueItem, PricingEntry,
    ProductVariant, PromotionRecord, CHECKPOINT_LAST_FULL_SYNC, CHECKPOINT_LAST_INCREMENTAL_SYNC,
    ORDER_ENTITY_TYPE,
};
use ruta_db::Database;

use crate::assets::{AssetCache, AssetRequest};
use crate::config::SyncSettings;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::observer::{Observers, Subscription};
use crate::protocol::{DeltaBatch, FullSnapshot, OrderPushResult, OrderUpload};
use crate::remote::RemoteSystem;

const BUSY_MESSAGE: &str = "Sync already in progress";
const OFFLINE_MESSAGE: &str = "No internet connection";

// =============================================================================
// Status and Reports
// =============================================================================

/// Which kind of run produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum SyncKind {
    /// Drain, then the complete snapshot.
    Full,
    /// Drain, then changes since the last checkpoint.
    Incremental,
    /// Outbox only.
    Drain,
}

impl std::fmt::Display for SyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncKind::Full => write!(f, "full"),
            SyncKind::Incremental => write!(f, "incremental"),
            SyncKind::Drain => write!(f, "drain"),
        }
    }
}

/// Snapshot rendered by the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SyncStatus {
    pub is_online: bool,
    /// Server timestamp of the last successful pull.
    #[ts(as = "Option<String>")]
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Orders the server has not acknowledged.
    pub pending_order_count: i64,
    pub is_syncing: bool,
    pub auto_sync_enabled: bool,
}

/// Outcome of one run. Partial success is reported with counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SyncReport {
    pub kind: SyncKind,
    /// Every stage that ran reached the remote system and applied its data.
    /// Rejected orders and failed images do not clear it.
    pub success: bool,
    /// Rejected because another run was in flight.
    pub busy: bool,
    pub orders_uploaded: usize,
    pub orders_rejected: usize,
    pub products_downloaded: usize,
    pub customers_downloaded: usize,
    pub pricing_downloaded: usize,
    pub promotions_downloaded: usize,
    pub images_downloaded: usize,
    pub images_failed: usize,
    pub errors: Vec<String>,
    #[ts(as = "Option<String>")]
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl SyncReport {
    fn new(kind: SyncKind) -> Self {
        SyncReport {
            kind,
            success: false,
            busy: false,
            orders_uploaded: 0,
            orders_rejected: 0,
            products_downloaded: 0,
            customers_downloaded: 0,
            pricing_downloaded: 0,
            promotions_downloaded: 0,
            images_downloaded: 0,
            images_failed: 0,
            errors: Vec::new(),
            server_timestamp: None,
        }
    }

    /// Report for a run refused because another one holds the guard.
    pub fn busy(kind: SyncKind) -> Self {
        SyncReport {
            busy: true,
            errors: vec![BUSY_MESSAGE.to_string()],
            ..SyncReport::new(kind)
        }
    }

    /// Report for a run refused because the device is offline.
    pub fn offline(kind: SyncKind) -> Self {
        SyncReport {
            errors: vec![OFFLINE_MESSAGE.to_string()],
            ..SyncReport::new(kind)
        }
    }

    /// One line for the user, e.g. "97 products updated, 3 images failed".
    pub fn summary(&self) -> String {
        format!(
            "{} products updated, {} images failed",
            self.products_downloaded, self.images_failed
        )
    }
}

/// What a local reset would destroy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ResetPreview {
    pub undelivered_orders: i64,
}

impl ResetPreview {
    pub fn loses_orders(&self) -> bool {
        self.undelivered_orders > 0
    }
}

/// Outcome of [`SyncEngine::reset_local`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ResetReport {
    pub busy: bool,
    pub discarded_orders: i64,
    pub errors: Vec<String>,
    /// The rehydrating full sync, if the device was online.
    pub resync: Option<SyncReport>,
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Host integration for pushing sync events to a UI shell.
pub trait SyncEventEmitter: Send + Sync {
    /// Emits a status change.
    fn emit_status(&self, status: &SyncStatus);

    /// Emits the report of a finished run.
    fn emit_report(&self, report: &SyncReport);

    /// Emits a run that ended in a hard failure.
    fn emit_error(&self, message: &str, retryable: bool);
}

/// No-op event emitter for headless use and tests.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _status: &SyncStatus) {}
    fn emit_report(&self, _report: &SyncReport) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
}

// =============================================================================
// Single-Flight Guard
// =============================================================================

/// Holds the `syncing` flag for the lifetime of a run.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// =============================================================================
// Sync Engine
// =============================================================================

/// Two-way sync between the device replica and the remote system.
///
/// Construct once at startup and share behind an `Arc`. Reads of the
/// replica never wait for a run; only runs exclude each other.
pub struct SyncEngine {
    db: Database,
    remote: Arc<dyn RemoteSystem>,
    assets: Arc<AssetCache>,
    connectivity: ConnectivityMonitor,
    settings: SyncSettings,
    syncing: AtomicBool,
    auto_sync: AtomicBool,
    observers: Observers<SyncStatus>,
    emitter: Arc<dyn SyncEventEmitter>,
}

impl SyncEngine {
    /// Creates an engine with no host emitter.
    pub fn new(
        db: Database,
        remote: Arc<dyn RemoteSystem>,
        assets: Arc<AssetCache>,
        connectivity: ConnectivityMonitor,
        settings: SyncSettings,
    ) -> Self {
        Self::with_emitter(db, remote, assets, connectivity, settings, Arc::new(NoOpEmitter))
    }

    /// Creates an engine that reports to a host emitter.
    pub fn with_emitter(
        db: Database,
        remote: Arc<dyn RemoteSystem>,
        assets: Arc<AssetCache>,
        connectivity: ConnectivityMonitor,
        settings: SyncSettings,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        let auto_sync = AtomicBool::new(settings.auto_sync);
        SyncEngine {
            db,
            remote,
            assets,
            connectivity,
            settings,
            syncing: AtomicBool::new(false),
            auto_sync,
            observers: Observers::new(),
            emitter,
        }
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn assets(&self) -> &AssetCache {
        &self.assets
    }

    // =========================================================================
    // Runs
    // =========================================================================

    /// Drains the outbox, then pulls the complete snapshot.
    pub async fn full_sync(&self) -> SyncResult<SyncReport> {
        self.run(SyncKind::Full).await
    }

    /// Drains the outbox, then pulls changes since the last checkpoint.
    pub async fn incremental_sync(&self) -> SyncResult<SyncReport> {
        self.run(SyncKind::Incremental).await
    }

    /// Full sync if this device never completed one, else incremental.
    pub async fn sync_now(&self) -> SyncResult<SyncReport> {
        let kind = match self.db.checkpoints().get(CHECKPOINT_LAST_FULL_SYNC).await? {
            Some(_) => SyncKind::Incremental,
            None => SyncKind::Full,
        };
        self.run(kind).await
    }

    /// Uploads pending orders without pulling anything.
    pub async fn drain_outbox(&self) -> SyncResult<SyncReport> {
        self.run(SyncKind::Drain).await
    }

    async fn run(&self, kind: SyncKind) -> SyncResult<SyncReport> {
        let Some(guard) = RunGuard::try_acquire(&self.syncing) else {
            debug!(kind = %kind, "Sync already in progress");
            return Ok(SyncReport::busy(kind));
        };

        if !self.connectivity.is_online() {
            drop(guard);
            info!(kind = %kind, "Sync skipped: offline");
            return Ok(SyncReport::offline(kind));
        }

        info!(kind = %kind, "Sync started");
        self.publish_status().await;

        let result = self.execute(kind).await;
        drop(guard);
        self.publish_status().await;

        match &result {
            Ok(report) => {
                info!(
                    kind = %kind,
                    success = report.success,
                    orders_uploaded = report.orders_uploaded,
                    orders_rejected = report.orders_rejected,
                    errors = report.errors.len(),
                    "Sync finished: {}",
                    report.summary()
                );
                self.emitter.emit_report(report);
            }
            Err(e) => {
                error!(kind = %kind, error = %e, "Sync aborted");
                self.emitter.emit_error(&e.to_string(), e.is_retryable());
            }
        }
        result
    }

    /// Runs the stages of one sync. The caller holds the guard.
    async fn execute(&self, kind: SyncKind) -> SyncResult<SyncReport> {
        let mut report = SyncReport::new(kind);

        let drained = match self.drain_into(&mut report).await {
            Ok(drained) => drained,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Outbox drain stopped");
                report.errors.push(format!("Order upload: {e}"));
                false
            }
        };
        let pulled = match kind {
            SyncKind::Full => self.pull_full(&mut report).await?,
            SyncKind::Incremental => self.pull_incremental(&mut report).await?,
            SyncKind::Drain => true,
        };

        report.success = drained && pulled;
        Ok(report)
    }

    // =========================================================================
    // Outbox Drain
    // =========================================================================

    /// Pushes every undelivered order.
    ///
    /// ## Returns
    /// `false` if a push call failed (the remaining orders wait for the
    /// next drain) or an acknowledgement could not be recorded.
    async fn drain_into(&self, report: &mut SyncReport) -> SyncResult<bool> {
        let items = self.db.outbox().pending(ORDER_ENTITY_TYPE, u32::MAX).await?;
        if items.is_empty() {
            return Ok(true);
        }
        debug!(count = items.len(), "Draining outbox");

        let mut uploads = Vec::with_capacity(items.len());
        for item in &items {
            if let Some(upload) = self.load_upload(item, report).await? {
                uploads.push(upload);
            }
        }

        let orders = self.db.orders();
        let mut clean = true;
        for chunk in uploads.chunks(self.settings.outbox_batch_size.max(1)) {
            let ids: Vec<String> = chunk.iter().map(|u| u.local_id.clone()).collect();
            orders.mark_sent(&ids).await?;

            match self.remote.push_orders(chunk.to_vec()).await {
                Ok(results) => {
                    if !self.apply_push_results(&ids, results, report).await? {
                        clean = false;
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(count = ids.len(), error = %e, "Order upload failed");
                    self.db
                        .outbox()
                        .record_failure(ORDER_ENTITY_TYPE, &ids, &e.to_string())
                        .await?;
                    report.errors.push(format!("Order upload: {e}"));
                    return Ok(false);
                }
            }
        }
        Ok(clean)
    }

    /// Builds the upload for a queue item from the stored order, falling
    /// back to the payload captured at checkout.
    async fn load_upload(
        &self,
        item: &OutboundQueueItem,
        report: &mut SyncReport,
    ) -> SyncResult<Option<OrderUpload>> {
        if let Some(order) = self.db.orders().get_with_lines(&item.entity_id).await? {
            return Ok(Some(OrderUpload {
                local_id: item.entity_id.clone(),
                order,
            }));
        }

        match serde_json::from_str::<OrderWithLines>(&item.payload) {
            Ok(order) => Ok(Some(OrderUpload {
                local_id: item.entity_id.clone(),
                order,
            })),
            Err(e) => {
                let reason = format!("Unreadable queued order: {e}");
                warn!(local_id = %item.entity_id, error = %e, "Skipping queued order");
                self.db
                    .outbox()
                    .record_failure(ORDER_ENTITY_TYPE, std::slice::from_ref(&item.entity_id), &reason)
                    .await?;
                report.errors.push(format!("Order {}: {reason}", item.entity_id));
                Ok(None)
            }
        }
    }

    /// Records each order's outcome.
    ///
    /// ## Returns
    /// `false` if an accepted order could not be recorded locally; that
    /// order goes back to the queue.
    async fn apply_push_results(
        &self,
        sent: &[String],
        results: Vec<OrderPushResult>,
        report: &mut SyncReport,
    ) -> SyncResult<bool> {
        let mut by_id: HashMap<String, OrderPushResult> = results
            .into_iter()
            .map(|result| (result.local_id.clone(), result))
            .collect();

        let orders = self.db.orders();
        let mut recorded = true;
        for local_id in sent {
            let result = by_id.remove(local_id);
            if let Some(server_id) = result.as_ref().and_then(OrderPushResult::server_id) {
                match orders.acknowledge(local_id, server_id).await.map_err(SyncError::from) {
                    Ok(_) => {
                        report.orders_uploaded += 1;
                        info!(local_id = %local_id, server_id = %server_id, "Order delivered");
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(
                            local_id = %local_id,
                            server_id = %server_id,
                            error = %e,
                            "Acknowledgement not recorded"
                        );
                        orders.return_to_pending(local_id, &e.to_string()).await?;
                        report.errors.push(format!("Order {local_id}: {e}"));
                        recorded = false;
                    }
                }
                continue;
            }

            let reason = result
                .and_then(|r| r.error)
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| "No result returned for order".to_string());
            orders.return_to_pending(local_id, &reason).await?;
            report.orders_rejected += 1;

            let rejection = SyncError::RemoteRejection {
                local_id: local_id.clone(),
                reason,
            };
            warn!(error = %rejection, "Order rejected");
            report.errors.push(rejection.to_string());
        }

        for unknown in by_id.keys() {
            debug!(local_id = %unknown, "Ignoring result for an order that was not sent");
        }
        Ok(recorded)
    }

    // =========================================================================
    // Inbound Pull
    // =========================================================================

    async fn pull_full(&self, report: &mut SyncReport) -> SyncResult<bool> {
        let snapshot = match self.remote.pull_full_snapshot(true).await {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Full snapshot unavailable");
                report.errors.push(format!("Full snapshot: {e}"));
                return Ok(false);
            }
        };

        let FullSnapshot {
            catalog,
            variants,
            customers,
            pricing,
            promotions,
            server_timestamp,
        } = snapshot;

        let applied = self
            .apply_records(report, &catalog, &variants, &pricing, &promotions, &customers)
            .await?;

        let requests = self.image_requests(catalog.iter());
        self.download_images(&requests, report).await;

        if applied {
            self.db
                .checkpoints()
                .set_many(&[
                    (CHECKPOINT_LAST_FULL_SYNC, server_timestamp),
                    (CHECKPOINT_LAST_INCREMENTAL_SYNC, server_timestamp),
                ])
                .await?;
            report.server_timestamp = Some(server_timestamp);
        }
        Ok(applied)
    }

    async fn pull_incremental(&self, report: &mut SyncReport) -> SyncResult<bool> {
        let since = self
            .db
            .checkpoints()
            .get(CHECKPOINT_LAST_INCREMENTAL_SYNC)
            .await?
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let batch = match self.remote.pull_deltas_since(since).await {
            Ok(batch) => batch,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, since = %since, "Deltas unavailable");
                report.errors.push(format!("Incremental pull: {e}"));
                return Ok(false);
            }
        };

        let DeltaBatch {
            catalog,
            variants,
            pricing,
            promotions,
            customers,
            server_timestamp,
        } = batch;
        debug!(since = %since, catalog = catalog.len(), "Applying deltas");

        let records: Vec<CatalogRecord> = catalog.iter().map(|d| d.record.clone()).collect();
        let applied = self
            .apply_records(report, &records, &variants, &pricing, &promotions, &customers)
            .await?;

        let mut fresh = Vec::new();
        for delta in &catalog {
            if delta.is_new || !self.assets.exists(&delta.record.id).await {
                fresh.push(&delta.record);
            }
        }
        let requests = self.image_requests(fresh.into_iter());
        self.download_images(&requests, report).await;

        if applied {
            let advanced = self
                .db
                .checkpoints()
                .advance(CHECKPOINT_LAST_INCREMENTAL_SYNC, server_timestamp)
                .await?;
            if !advanced {
                debug!(since = %since, server_timestamp = %server_timestamp, "Checkpoint unchanged");
            }
            report.server_timestamp = Some(server_timestamp);
        }
        Ok(applied)
    }

    /// Upserts each record type in its own transaction.
    ///
    /// ## Returns
    /// `false` if any type could not be applied.
    async fn apply_records(
        &self,
        report: &mut SyncReport,
        catalog: &[CatalogRecord],
        variants: &[ProductVariant],
        pricing: &[PricingEntry],
        promotions: &[PromotionRecord],
        customers: &[CustomerRecord],
    ) -> SyncResult<bool> {
        let mut ok = true;

        let products = stage(report, "Products", self.db.catalog().upsert_batch(catalog).await)?;
        report.products_downloaded = products.unwrap_or(0);
        ok &= products.is_some();

        ok &= stage(report, "Variants", self.db.catalog().upsert_variants(variants).await)?.is_some();

        let prices = stage(report, "Pricing", self.db.pricing().upsert_batch(pricing).await)?;
        report.pricing_downloaded = prices.unwrap_or(0);
        ok &= prices.is_some();

        let promos = stage(report, "Promotions", self.db.promotions().upsert_batch(promotions).await)?;
        report.promotions_downloaded = promos.unwrap_or(0);
        ok &= promos.is_some();

        let people = stage(report, "Customers", self.db.customers().upsert_batch(customers).await)?;
        report.customers_downloaded = people.unwrap_or(0);
        ok &= people.is_some();

        Ok(ok)
    }

    fn image_requests<'a>(&self, records: impl Iterator<Item = &'a CatalogRecord>) -> Vec<AssetRequest> {
        records
            .filter(|record| record.has_image())
            .map(|record| AssetRequest {
                entity_id: record.id.clone(),
                url: self.assets.remote_url(&record.id, record.image.as_deref()),
            })
            .collect()
    }

    async fn download_images(&self, requests: &[AssetRequest], report: &mut SyncReport) {
        if requests.is_empty() {
            return;
        }
        let batch = self.assets.download_batch(requests).await;
        report.images_downloaded += batch.success_count;
        report.images_failed += batch.failed_count;
        report.errors.extend(
            batch
                .errors
                .into_iter()
                .map(|failure| format!("Image {}: {}", failure.entity_id, failure.error)),
        );
    }

    // =========================================================================
    // Local Reset
    // =========================================================================

    /// What [`Self::reset_local`] would discard. Show it before confirming.
    pub async fn reset_preview(&self) -> SyncResult<ResetPreview> {
        Ok(ResetPreview {
            undelivered_orders: self.db.outbox().count_pending().await?,
        })
    }

    /// Wipes the replica and the image cache, then resyncs if online.
    ///
    /// Destructive: undelivered orders are lost. Confirmation belongs to the
    /// caller.
    pub async fn reset_local(&self) -> SyncResult<ResetReport> {
        let Some(guard) = RunGuard::try_acquire(&self.syncing) else {
            return Ok(ResetReport {
                busy: true,
                discarded_orders: 0,
                errors: vec![BUSY_MESSAGE.to_string()],
                resync: None,
            });
        };
        self.publish_status().await;

        let discarded_orders = self.db.outbox().count_pending().await?;
        if discarded_orders > 0 {
            warn!(undelivered = discarded_orders, "Local reset discards undelivered orders");
        }

        self.db.store().clear_all().await?;
        let mut errors = Vec::new();
        if let Err(e) = self.assets.evict_all().await {
            warn!(error = %e, "Image cache not fully evicted");
            errors.push(format!("Image cache: {e}"));
        }
        info!("Local replica cleared");

        let resync = if self.connectivity.is_online() {
            Some(self.execute(SyncKind::Full).await?)
        } else {
            info!("Offline after reset; replica stays empty until the next full sync");
            None
        };

        drop(guard);
        self.publish_status().await;

        Ok(ResetReport {
            busy: false,
            discarded_orders,
            errors,
            resync,
        })
    }

    // =========================================================================
    // Status
    // =========================================================================

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    pub fn set_auto_sync_enabled(&self, enabled: bool) {
        let previous = self.auto_sync.swap(enabled, Ordering::AcqRel);
        if previous != enabled {
            info!(enabled, "Auto-sync toggled");
        }
    }

    pub fn is_auto_sync_enabled(&self) -> bool {
        self.auto_sync.load(Ordering::Acquire)
    }

    /// Server timestamp of the last successful pull.
    pub async fn last_sync_time(&self) -> SyncResult<Option<DateTime<Utc>>> {
        Ok(self
            .db
            .checkpoints()
            .get(CHECKPOINT_LAST_INCREMENTAL_SYNC)
            .await?)
    }

    /// Orders still owed to the server.
    pub async fn pending_order_count(&self) -> SyncResult<i64> {
        Ok(self.db.outbox().count_pending().await?)
    }

    pub async fn status(&self) -> SyncResult<SyncStatus> {
        Ok(SyncStatus {
            is_online: self.connectivity.is_online(),
            last_sync_time: self.last_sync_time().await?,
            pending_order_count: self.pending_order_count().await?,
            is_syncing: self.is_syncing(),
            auto_sync_enabled: self.is_auto_sync_enabled(),
        })
    }

    /// Registers a callback for every published status.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SyncStatus) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback)
    }

    /// Reads the current status and hands it to subscribers and the emitter.
    pub async fn publish_status(&self) {
        match self.status().await {
            Ok(status) => {
                self.observers.notify(&status);
                self.emitter.emit_status(&status);
            }
            Err(e) => warn!(error = %e, "Status unavailable"),
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("connectivity", &self.connectivity)
            .field("syncing", &self.is_syncing())
            .field("auto_sync", &self.is_auto_sync_enabled())
            .finish_non_exhaustive()
    }
}

/// Records a failed stage in the report. Store faults still propagate.
fn stage<E: Into<SyncError>>(
    report: &mut SyncReport,
    name: &str,
    result: Result<usize, E>,
) -> SyncResult<Option<usize>> {
    match result.map_err(Into::into) {
        Ok(count) => Ok(Some(count)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!(stage = name, error = %e, "Stage failed");
            report.errors.push(format!("{name}: {e}"));
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        catalog_record, harness, harness_with_assets, harness_with_batch, PushMode, RemoteCall,
    };
    use chrono::Duration as ChronoDuration;
    use ruta_core::{NewOrder, NewOrderLine, OrderStatus};
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn new_order(user: &str) -> NewOrder {
        NewOrder {
            user_id: user.to_string(),
            customer_id: Some("c-1".into()),
            notes: None,
            tax_cents: 0,
            lines: vec![NewOrderLine {
                product_id: "p-1".into(),
                product_name: "Product p-1".into(),
                quantity: 3,
                unit_price_cents: 500,
                custom_text: None,
                custom_select: None,
            }],
        }
    }

    #[tokio::test]
    async fn test_full_snapshot_is_idempotent() {
        let h = harness(true).await;
        h.remote.set_catalog((1..=5).map(|i| catalog_record(&format!("p-{i}"), None)).collect());

        let first = h.engine.full_sync().await.unwrap();
        assert!(first.success, "{:?}", first.errors);
        assert_eq!(first.products_downloaded, 5);
        let after_first = h.db.catalog().list_listed().await.unwrap();

        let second = h.engine.full_sync().await.unwrap();
        assert!(second.success);
        let after_second = h.db.catalog().list_listed().await.unwrap();

        assert_eq!(after_first, after_second);
        assert_eq!(h.db.catalog().count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_failed_push_keeps_order_queued_until_delivered() {
        let h = harness(true).await;
        let created = h.db.orders().create_with_outbox(&new_order("agent-1")).await.unwrap();
        let local_id = created.order.local_id.clone();

        h.remote.set_push_mode(PushMode::FailNetwork);
        let failed = h.engine.drain_outbox().await.unwrap();
        assert!(!failed.success);
        assert_eq!(failed.orders_uploaded, 0);

        let item = h.db.outbox().get(ORDER_ENTITY_TYPE, &local_id).await.unwrap().unwrap();
        assert_eq!(item.attempt_count, 1);
        assert!(item.last_error.is_some());
        let order = h.db.orders().get_with_lines(&local_id).await.unwrap().unwrap();
        assert_eq!(order.order.status, OrderStatus::Sent);

        h.remote.set_push_mode(PushMode::AcceptAll);
        let delivered = h.engine.drain_outbox().await.unwrap();
        assert!(delivered.success);
        assert_eq!(delivered.orders_uploaded, 1);

        assert!(h.db.outbox().get(ORDER_ENTITY_TYPE, &local_id).await.unwrap().is_none());
        let order = h.db.orders().get_with_lines(&local_id).await.unwrap().unwrap();
        assert_eq!(order.order.id, "srv-1");
        assert_eq!(order.order.status, OrderStatus::Acknowledged);
        assert!(order.order.synced);
        assert_eq!(h.remote.push_count(), 2);
    }

    #[tokio::test]
    async fn test_rejection_returns_order_to_pending() {
        let h = harness(true).await;
        let created = h.db.orders().create_with_outbox(&new_order("agent-1")).await.unwrap();
        let local_id = created.order.local_id;

        h.remote.set_push_mode(PushMode::RejectAll);
        let report = h.engine.drain_outbox().await.unwrap();
        assert!(report.success);
        assert_eq!(report.orders_rejected, 1);
        assert!(report.errors[0].contains("customer blocked"));

        let order = h.db.orders().get_with_lines(&local_id).await.unwrap().unwrap();
        assert_eq!(order.order.status, OrderStatus::PendingSend);
        let item = h.db.outbox().get(ORDER_ENTITY_TYPE, &local_id).await.unwrap().unwrap();
        assert_eq!(item.attempt_count, 1);
        assert_eq!(item.last_error.as_deref(), Some("customer blocked"));

        h.remote.set_push_mode(PushMode::OmitResults);
        let report = h.engine.drain_outbox().await.unwrap();
        assert_eq!(report.orders_rejected, 1);
        let item = h.db.outbox().get(ORDER_ENTITY_TYPE, &local_id).await.unwrap().unwrap();
        assert_eq!(item.attempt_count, 2);
    }

    #[tokio::test]
    async fn test_conflicting_server_id_requeues_order_and_still_pulls() {
        let h = harness(true).await;
        let orders = h.db.orders();
        let delivered = orders.create_with_outbox(&new_order("agent-1")).await.unwrap();
        orders.acknowledge(&delivered.order.local_id, "srv-1").await.unwrap();
        let queued = orders.create_with_outbox(&new_order("agent-1")).await.unwrap();
        let local_id = queued.order.local_id;

        // The remote hands out "srv-1" again.
        let report = h.engine.incremental_sync().await.unwrap();
        assert!(!report.success);
        assert_eq!(report.orders_uploaded, 0);
        assert!(report.errors.iter().any(|e| e.contains(&local_id)));
        assert!(matches!(
            h.remote.calls().as_slice(),
            [RemoteCall::PushOrders(_), RemoteCall::Deltas(_)]
        ));

        let order = orders.get_with_lines(&local_id).await.unwrap().unwrap();
        assert_eq!(order.order.status, OrderStatus::PendingSend);
        assert!(!order.order.synced);
        let item = h.db.outbox().get(ORDER_ENTITY_TYPE, &local_id).await.unwrap().unwrap();
        assert_eq!(item.attempt_count, 1);
        assert!(item.last_error.is_some());
    }

    #[tokio::test]
    async fn test_outbox_drains_before_pull() {
        let h = harness(true).await;
        h.db.orders().create_with_outbox(&new_order("agent-1")).await.unwrap();

        let report = h.engine.full_sync().await.unwrap();
        assert!(report.success);

        let calls = h.remote.timed_calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0].1, RemoteCall::PushOrders(_)));
        assert!(matches!(calls[1].1, RemoteCall::FullSnapshot));
        assert!(calls[0].0 <= calls[1].0);
    }

    #[tokio::test]
    async fn test_pull_failure_does_not_lose_drained_orders() {
        let h = harness(true).await;
        let created = h.db.orders().create_with_outbox(&new_order("agent-1")).await.unwrap();
        h.remote.fail_pulls(true);

        let report = h.engine.incremental_sync().await.unwrap();
        assert!(!report.success);
        assert_eq!(report.orders_uploaded, 1);
        assert!(report.errors.iter().any(|e| e.starts_with("Incremental pull")));

        let order = h
            .db
            .orders()
            .get_with_lines(&created.order.local_id)
            .await
            .unwrap()
            .unwrap();
        assert!(order.order.is_acknowledged());
        assert!(h.engine.last_sync_time().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_run_while_syncing_is_busy() {
        let h = harness(true).await;
        h.remote.hold_next_pull();

        let engine = Arc::clone(&h.engine);
        let running = tokio::spawn(async move { engine.full_sync().await });
        h.remote.wait_until_held().await;
        assert!(h.engine.is_syncing());

        let calls_before = h.remote.calls().len();
        let busy = h.engine.incremental_sync().await.unwrap();
        assert!(busy.busy);
        assert!(!busy.success);
        assert_eq!(busy.errors, vec!["Sync already in progress".to_string()]);
        assert_eq!(h.remote.calls().len(), calls_before);

        let reset = h.engine.reset_local().await.unwrap();
        assert!(reset.busy);

        h.remote.release();
        let finished = running.await.unwrap().unwrap();
        assert!(finished.success);
        assert!(!h.engine.is_syncing());
    }

    #[tokio::test]
    async fn test_offline_run_makes_no_calls() {
        let h = harness(false).await;
        h.db.orders().create_with_outbox(&new_order("agent-1")).await.unwrap();

        let report = h.engine.sync_now().await.unwrap();
        assert!(!report.success);
        assert_eq!(report.errors, vec!["No internet connection".to_string()]);
        assert!(h.remote.calls().is_empty());
        assert_eq!(h.engine.pending_order_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_checkpoint_follows_server_timestamp() {
        let h = harness(true).await;
        let t1 = Utc::now() - ChronoDuration::hours(1);
        h.remote.set_snapshot_timestamp(t1);

        let report = h.engine.sync_now().await.unwrap();
        assert_eq!(report.kind, SyncKind::Full);
        assert_eq!(h.engine.last_sync_time().await.unwrap(), Some(t1));

        let t2 = t1 + ChronoDuration::minutes(10);
        h.remote.set_deltas(DeltaBatch::empty(t2));
        let report = h.engine.sync_now().await.unwrap();
        assert_eq!(report.kind, SyncKind::Incremental);
        assert_eq!(report.server_timestamp, Some(t2));
        assert_eq!(h.engine.last_sync_time().await.unwrap(), Some(t2));

        h.engine.incremental_sync().await.unwrap();
        let since: Vec<DateTime<Utc>> = h
            .remote
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                RemoteCall::Deltas(since) => Some(since),
                _ => None,
            })
            .collect();
        assert_eq!(since, vec![t1, t2]);
    }

    #[tokio::test]
    async fn test_incremental_without_checkpoint_starts_at_epoch() {
        let h = harness(true).await;
        h.remote.set_deltas(DeltaBatch::empty(Utc::now()));

        h.engine.incremental_sync().await.unwrap();
        assert_eq!(
            h.remote.calls(),
            vec![RemoteCall::Deltas(DateTime::<Utc>::UNIX_EPOCH)]
        );
    }

    #[tokio::test]
    async fn test_partial_image_failure_keeps_records() {
        let server = MockServer::start().await;
        for id in ["p-7", "p-42", "p-99"] {
            Mock::given(method("GET"))
                .and(path(format!("/uploads/products/{id}.jpg")))
                .respond_with(ResponseTemplate::new(404))
                .with_priority(1)
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path_regex(r"^/uploads/products/p-\d+\.jpg$"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8]))
            .mount(&server)
            .await;

        let h = harness_with_assets(true, &server.uri()).await;
        h.remote.set_catalog(
            (1..=100)
                .map(|i| {
                    let id = format!("p-{i}");
                    let image = format!("/uploads/products/{id}.jpg");
                    catalog_record(&id, Some(&image))
                })
                .collect(),
        );

        let report = h.engine.full_sync().await.unwrap();
        assert!(report.success);
        assert_eq!(report.products_downloaded, 100);
        assert_eq!(report.images_downloaded, 97);
        assert_eq!(report.images_failed, 3);
        assert_eq!(report.errors.len(), 3);
        assert_eq!(report.summary(), "100 products updated, 3 images failed");
        assert_eq!(h.db.catalog().count().await.unwrap(), 100);
        assert!(h.engine.assets().exists("p-1").await);
        assert!(!h.engine.assets().exists("p-42").await);
    }

    #[tokio::test]
    async fn test_incremental_fetches_only_new_or_missing_images() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/uploads/products/p-\d+\.jpg$"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 4]))
            .mount(&server)
            .await;

        let h = harness_with_assets(true, &server.uri()).await;
        let cached = catalog_record("p-1", Some("/uploads/products/p-1.jpg"));
        tokio::fs::create_dir_all(h.engine.assets().dir()).await.unwrap();
        tokio::fs::write(h.engine.assets().path_for("p-1").unwrap(), b"old")
            .await
            .unwrap();

        let mut deltas = DeltaBatch::empty(Utc::now());
        deltas.catalog = vec![
            crate::protocol::CatalogDelta { record: cached, is_new: false },
            crate::protocol::CatalogDelta {
                record: catalog_record("p-2", Some("/uploads/products/p-2.jpg")),
                is_new: true,
            },
        ];
        h.remote.set_deltas(deltas);

        let report = h.engine.incremental_sync().await.unwrap();
        assert!(report.success);
        assert_eq!(report.images_downloaded, 1);
        assert_eq!(
            tokio::fs::read(h.engine.assets().path_for("p-1").unwrap()).await.unwrap(),
            b"old"
        );
        assert!(h.engine.assets().exists("p-2").await);
    }

    #[tokio::test]
    async fn test_reset_local_rehydrates_when_online() {
        let h = harness(true).await;
        h.remote.set_catalog(vec![catalog_record("p-1", None), catalog_record("p-2", None)]);
        h.db.orders().create_with_outbox(&new_order("agent-1")).await.unwrap();
        h.remote.set_push_mode(PushMode::FailNetwork);

        assert_eq!(h.engine.reset_preview().await.unwrap().undelivered_orders, 1);
        let reset = h.engine.reset_local().await.unwrap();
        assert!(!reset.busy);
        assert_eq!(reset.discarded_orders, 1);

        let resync = reset.resync.unwrap();
        assert!(resync.success);
        assert_eq!(resync.products_downloaded, 2);
        assert_eq!(h.engine.pending_order_count().await.unwrap(), 0);
        assert_eq!(h.db.catalog().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reset_local_offline_leaves_replica_empty() {
        let h = harness(true).await;
        h.remote.set_catalog(vec![catalog_record("p-1", None)]);
        h.engine.full_sync().await.unwrap();

        h.connectivity.set_online(false);
        let reset = h.engine.reset_local().await.unwrap();
        assert!(reset.resync.is_none());
        assert_eq!(h.db.catalog().count().await.unwrap(), 0);
        assert!(h.engine.last_sync_time().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_subscribers_see_run_start_and_end() {
        let h = harness(true).await;
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let _sub = h.engine.subscribe(move |status| sink.lock().unwrap().push(status.is_syncing));

        h.engine.full_sync().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);

        h.engine.set_auto_sync_enabled(false);
        let status = h.engine.status().await.unwrap();
        assert!(!status.auto_sync_enabled);
        assert!(status.is_online);
        assert!(status.last_sync_time.is_some());
    }

    #[tokio::test]
    async fn test_drain_respects_batch_size() {
        let h = harness_with_batch(true, 2).await;
        for _ in 0..5 {
            h.db.orders().create_with_outbox(&new_order("agent-1")).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let report = h.engine.drain_outbox().await.unwrap();
        assert_eq!(report.orders_uploaded, 5);
        assert_eq!(h.remote.push_count(), 3);
    }
}
