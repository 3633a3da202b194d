//! Test doubles and fixtures shared by the unit tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tempfile::TempDir;
use tokio::sync::Notify;

use ruta_core::{CatalogRecord, OrderStatus, OrderWithLines, OutboundOrder, OutboundOrderLine};
use ruta_db::{Database, DbConfig};

use crate::assets::AssetCache;
use crate::config::{AssetSettings, SyncSettings};
use crate::connectivity::ConnectivityMonitor;
use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{DeltaBatch, FullSnapshot, OrderPushResult, OrderUpload};
use crate::remote::RemoteSystem;

fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

pub(crate) fn catalog_record(id: &str, image: Option<&str>) -> CatalogRecord {
    CatalogRecord {
        id: id.to_string(),
        sku: format!("SKU-{id}"),
        name: format!("Product {id}"),
        description: None,
        category: Some("bolsas".to_string()),
        subcategory: None,
        image: image.map(str::to_string),
        base_price_cents: 500,
        stock: 10,
        is_active: true,
        display_order: 0,
        parent_sku: None,
        variant_name: None,
        dimension: None,
        units_per_box: 0,
        min_quantity: 1,
        hide_in_catalog: false,
        created_at: fixed_time(),
        updated_at: fixed_time(),
    }
}

pub(crate) fn order_upload(local_id: &str) -> OrderUpload {
    let now = fixed_time();
    OrderUpload {
        local_id: local_id.to_string(),
        order: OrderWithLines {
            order: OutboundOrder {
                id: local_id.to_string(),
                local_id: local_id.to_string(),
                server_id: None,
                user_id: "agent-1".to_string(),
                customer_id: Some("c-1".to_string()),
                order_number: format!("ORD-{local_id}"),
                status: OrderStatus::Sent,
                synced: false,
                subtotal_cents: 1_000,
                tax_cents: 0,
                total_cents: 1_000,
                notes: None,
                created_at: now,
                updated_at: now,
            },
            lines: vec![OutboundOrderLine {
                id: format!("{local_id}-1"),
                order_local_id: local_id.to_string(),
                product_id: "p-1".to_string(),
                product_name: "Product p-1".to_string(),
                quantity: 2,
                unit_price_cents: 500,
                subtotal_cents: 1_000,
                custom_text: None,
                custom_select: None,
                created_at: now,
            }],
        },
    }
}

// =============================================================================
// Scripted Remote
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushMode {
    AcceptAll,
    RejectAll,
    FailNetwork,
    OmitResults,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RemoteCall {
    FullSnapshot,
    Deltas(DateTime<Utc>),
    PushOrders(Vec<String>),
}

struct Script {
    snapshot: FullSnapshot,
    deltas: DeltaBatch,
    push_mode: PushMode,
    fail_pulls: bool,
    hold_next_pull: bool,
    next_server_id: u64,
    calls: Vec<(Instant, RemoteCall)>,
}

/// In-memory remote that records every call.
pub(crate) struct ScriptedRemote {
    script: Mutex<Script>,
    held: Notify,
    release: Notify,
}

impl ScriptedRemote {
    pub(crate) fn new() -> Self {
        ScriptedRemote {
            script: Mutex::new(Script {
                snapshot: FullSnapshot {
                    catalog: Vec::new(),
                    variants: Vec::new(),
                    customers: Vec::new(),
                    pricing: Vec::new(),
                    promotions: Vec::new(),
                    server_timestamp: fixed_time(),
                },
                deltas: DeltaBatch::empty(fixed_time()),
                push_mode: PushMode::AcceptAll,
                fail_pulls: false,
                hold_next_pull: false,
                next_server_id: 1,
                calls: Vec::new(),
            }),
            held: Notify::new(),
            release: Notify::new(),
        }
    }

    pub(crate) fn set_catalog(&self, catalog: Vec<CatalogRecord>) {
        self.script.lock().unwrap().snapshot.catalog = catalog;
    }

    pub(crate) fn set_snapshot_timestamp(&self, ts: DateTime<Utc>) {
        self.script.lock().unwrap().snapshot.server_timestamp = ts;
    }

    pub(crate) fn set_deltas(&self, deltas: DeltaBatch) {
        self.script.lock().unwrap().deltas = deltas;
    }

    pub(crate) fn set_push_mode(&self, mode: PushMode) {
        self.script.lock().unwrap().push_mode = mode;
    }

    pub(crate) fn fail_pulls(&self, fail: bool) {
        self.script.lock().unwrap().fail_pulls = fail;
    }

    /// The next pull blocks until [`Self::release`].
    pub(crate) fn hold_next_pull(&self) {
        self.script.lock().unwrap().hold_next_pull = true;
    }

    pub(crate) async fn wait_until_held(&self) {
        self.held.notified().await;
    }

    pub(crate) fn release(&self) {
        self.release.notify_one();
    }

    pub(crate) fn calls(&self) -> Vec<RemoteCall> {
        self.timed_calls().into_iter().map(|(_, call)| call).collect()
    }

    pub(crate) fn timed_calls(&self) -> Vec<(Instant, RemoteCall)> {
        self.script.lock().unwrap().calls.clone()
    }

    pub(crate) fn push_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, RemoteCall::PushOrders(_)))
            .count()
    }

    /// Records a pull. Returns whether it should fail.
    async fn enter_pull(&self, call: RemoteCall) -> bool {
        let (hold, fail) = {
            let mut script = self.script.lock().unwrap();
            script.calls.push((Instant::now(), call));
            let hold = std::mem::take(&mut script.hold_next_pull);
            (hold, script.fail_pulls)
        };
        if hold {
            self.held.notify_one();
            self.release.notified().await;
        }
        fail
    }
}

#[async_trait]
impl RemoteSystem for ScriptedRemote {
    async fn pull_full_snapshot(&self, _include_assets: bool) -> SyncResult<FullSnapshot> {
        if self.enter_pull(RemoteCall::FullSnapshot).await {
            return Err(SyncError::Network("scripted outage".into()));
        }
        Ok(self.script.lock().unwrap().snapshot.clone())
    }

    async fn pull_deltas_since(&self, since: DateTime<Utc>) -> SyncResult<DeltaBatch> {
        if self.enter_pull(RemoteCall::Deltas(since)).await {
            return Err(SyncError::Network("scripted outage".into()));
        }
        Ok(self.script.lock().unwrap().deltas.clone())
    }

    async fn push_orders(&self, orders: Vec<OrderUpload>) -> SyncResult<Vec<OrderPushResult>> {
        let mut script = self.script.lock().unwrap();
        let ids: Vec<String> = orders.iter().map(|o| o.local_id.clone()).collect();
        script
            .calls
            .push((Instant::now(), RemoteCall::PushOrders(ids.clone())));

        match script.push_mode {
            PushMode::FailNetwork => Err(SyncError::Network("scripted outage".into())),
            PushMode::OmitResults => Ok(Vec::new()),
            PushMode::RejectAll => Ok(ids
                .into_iter()
                .map(|id| OrderPushResult::rejected(id, "customer blocked"))
                .collect()),
            PushMode::AcceptAll => Ok(ids
                .into_iter()
                .map(|id| {
                    let server_id = format!("srv-{}", script.next_server_id);
                    script.next_server_id += 1;
                    OrderPushResult::accepted(id, server_id)
                })
                .collect()),
        }
    }
}

// =============================================================================
// Engine Harness
// =============================================================================

pub(crate) struct Harness {
    pub db: Database,
    pub remote: Arc<ScriptedRemote>,
    pub connectivity: ConnectivityMonitor,
    pub engine: Arc<SyncEngine>,
    _dir: TempDir,
}

async fn build(online: bool, asset_base: &str, settings: SyncSettings) -> Harness {
    let dir = TempDir::new().unwrap();
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let remote = Arc::new(ScriptedRemote::new());
    let connectivity = ConnectivityMonitor::new(online);
    let assets = AssetCache::new(
        AssetSettings {
            dir: dir.path().join("images"),
            max_concurrent_downloads: 5,
            batch_pause_ms: 1,
            local_files_available: true,
        },
        asset_base,
    )
    .unwrap();

    let engine = Arc::new(SyncEngine::new(
        db.clone(),
        remote.clone(),
        Arc::new(assets),
        connectivity.clone(),
        settings,
    ));

    Harness {
        db,
        remote,
        connectivity,
        engine,
        _dir: dir,
    }
}

pub(crate) async fn harness(online: bool) -> Harness {
    build(online, "http://127.0.0.1:9", SyncSettings::default()).await
}

pub(crate) async fn harness_with_assets(online: bool, asset_base: &str) -> Harness {
    build(online, asset_base, SyncSettings::default()).await
}

pub(crate) async fn harness_with_batch(online: bool, outbox_batch_size: usize) -> Harness {
    let settings = SyncSettings {
        outbox_batch_size,
        ..SyncSettings::default()
    };
    build(online, "http://127.0.0.1:9", settings).await
}
