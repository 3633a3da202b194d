//! # Auto-Sync Scheduler
//!
//! Background task that decides when the engine runs on its own.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          AutoSync task                                  │
//! │                                                                         │
//! │   loop select! {                                                       │
//! │     connectivity edge ──► publish status                               │
//! │                           Offline → Online + auto-sync on              │
//! │                               └──► incremental_sync()                  │
//! │     periodic tick     ──► online + auto-sync on ──► incremental_sync() │
//! │     shutdown          ──► break                                        │
//! │   }                                                                    │
//! │                                                                         │
//! │   Edges are queued from the moment `spawn` returns, including the ones │
//! │   that happen while a run is in flight, so no reconnect is missed.     │
//! │   A busy engine is not an error: the run in flight covers the request. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::connectivity::{ConnectivityMonitor, ConnectivityState};
use crate::engine::SyncEngine;

/// Spawns the auto-sync task.
pub struct AutoSync;

impl AutoSync {
    /// Starts watching `connectivity` and ticking every `periodic`.
    pub fn spawn(
        engine: Arc<SyncEngine>,
        connectivity: ConnectivityMonitor,
        periodic: Duration,
    ) -> AutoSyncHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        // State first, then subscribe: an edge in between is queued, not lost.
        let mut last = connectivity.state();
        let (edge_tx, mut edge_rx) = mpsc::unbounded_channel::<ConnectivityState>();
        let edges = connectivity.subscribe(move |state| {
            let _ = edge_tx.send(*state);
        });

        let task = tokio::spawn(async move {
            let _edges = edges;
            let mut ticker = tokio::time::interval(periodic);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            info!(?periodic, state = %last, "Auto-sync started");

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Auto-sync shutting down");
                        break;
                    }
                    edge = edge_rx.recv() => {
                        let Some(state) = edge else {
                            break;
                        };
                        engine.publish_status().await;

                        let reconnected = last == ConnectivityState::Offline
                            && state == ConnectivityState::Online;
                        last = state;
                        if reconnected && engine.is_auto_sync_enabled() {
                            run_incremental(&engine, "reconnect").await;
                        }
                    }
                    _ = ticker.tick() => {
                        if connectivity.is_online() && engine.is_auto_sync_enabled() {
                            run_incremental(&engine, "periodic").await;
                        }
                    }
                }
            }
        });

        AutoSyncHandle { shutdown_tx, task }
    }
}

async fn run_incremental(engine: &SyncEngine, trigger: &str) {
    match engine.incremental_sync().await {
        Ok(report) if report.busy => {
            debug!(trigger, "Auto-sync skipped: engine busy");
        }
        Ok(report) => {
            debug!(trigger, success = report.success, "Auto-sync run complete");
        }
        Err(e) => {
            error!(trigger, error = %e, "Auto-sync run failed");
        }
    }
}

/// Handle for stopping a running [`AutoSync`] task.
pub struct AutoSyncHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl AutoSyncHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signals the task and waits for the run in flight, if any, to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::{DataSource, LocalDataSource};
    use crate::testing::{catalog_record, harness, RemoteCall};
    use ruta_core::{CheckoutRequest, NewCartLine, OrderStatus};

    async fn wait_for<F, Fut>(mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..100 {
            if check().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_reconnect_delivers_offline_order() {
        let h = harness(false).await;
        h.db.catalog()
            .upsert_batch(&[catalog_record("p-1", None), catalog_record("p-2", None)])
            .await
            .unwrap();

        let source = LocalDataSource::new(h.db.clone());
        for product in ["p-1", "p-2"] {
            source
                .add_to_cart(NewCartLine {
                    user_id: "agent-1".into(),
                    product_id: product.into(),
                    quantity: 1,
                    unit_price_cents: 500,
                    custom_text: None,
                    custom_select: None,
                })
                .await
                .unwrap();
        }
        let created = source
            .checkout(CheckoutRequest {
                user_id: "agent-1".into(),
                customer_id: None,
                notes: None,
                tax_cents: 0,
            })
            .await
            .unwrap();
        assert_eq!(h.engine.pending_order_count().await.unwrap(), 1);

        let auto = AutoSync::spawn(
            Arc::clone(&h.engine),
            h.connectivity.clone(),
            Duration::from_secs(3600),
        );
        h.connectivity.set_online(true);

        let engine = Arc::clone(&h.engine);
        assert!(
            wait_for(|| {
                let engine = Arc::clone(&engine);
                async move { engine.pending_order_count().await.unwrap() == 0 }
            })
            .await
        );

        let order = source
            .get_order(&created.order.local_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.order.id, "srv-1");
        assert_eq!(order.order.status, OrderStatus::Acknowledged);
        assert!(matches!(h.remote.calls()[0], RemoteCall::PushOrders(_)));

        auto.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconnect_during_run_triggers_another_run() {
        let h = harness(false).await;
        h.remote.hold_next_pull();

        let auto = AutoSync::spawn(
            Arc::clone(&h.engine),
            h.connectivity.clone(),
            Duration::from_secs(3600),
        );
        h.connectivity.set_online(true);
        h.remote.wait_until_held().await;

        h.connectivity.set_online(false);
        h.connectivity.set_online(true);
        h.remote.release();

        let remote = Arc::clone(&h.remote);
        assert!(
            wait_for(|| {
                let remote = Arc::clone(&remote);
                async move {
                    remote
                        .calls()
                        .iter()
                        .filter(|call| matches!(call, RemoteCall::Deltas(_)))
                        .count()
                        == 2
                }
            })
            .await
        );

        auto.shutdown().await;
    }

    #[tokio::test]
    async fn test_disabled_auto_sync_ignores_reconnect() {
        let h = harness(false).await;
        h.engine.set_auto_sync_enabled(false);

        let auto = AutoSync::spawn(
            Arc::clone(&h.engine),
            h.connectivity.clone(),
            Duration::from_secs(3600),
        );
        h.connectivity.set_online(true);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(h.remote.calls().is_empty());
        auto.shutdown().await;
    }

    #[tokio::test]
    async fn test_periodic_tick_runs_while_online() {
        let h = harness(true).await;

        let auto = AutoSync::spawn(
            Arc::clone(&h.engine),
            h.connectivity.clone(),
            Duration::from_millis(50),
        );

        let remote = Arc::clone(&h.remote);
        assert!(
            wait_for(|| {
                let remote = Arc::clone(&remote);
                async move { !remote.calls().is_empty() }
            })
            .await
        );
        assert!(matches!(h.remote.calls()[0], RemoteCall::Deltas(_)));

        auto.shutdown().await;
        assert!(h.engine.status().await.is_ok());
    }
}
