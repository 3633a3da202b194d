//! # ruta-sync: Offline-First Sync for the Ruta Field-Sales Client
//!
//! Everything between the device replica and the remote system of record:
//! connectivity, product images, the data access facade and the two-way
//! sync engine.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        ruta-sync Architecture                           │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                     SyncEngine (orchestrator)                    │  │
//! │  │                                                                  │  │
//! │  │  single-flight runs: drain outbox → pull full / incremental     │  │
//! │  │  status snapshot + subscribe/notify                              │  │
//! │  └──────┬──────────────────┬──────────────────┬─────────────────────┘  │
//! │         ▼                  ▼                  ▼                         │
//! │  ┌──────────────┐  ┌────────────────┐  ┌────────────────────────┐      │
//! │  │ RemoteSystem │  │  AssetCache    │  │  ruta-db Database      │      │
//! │  │ (HttpRemote) │  │ {dir}/{id}.jpg │  │  replica, outbox,      │      │
//! │  │ retry+backoff│  │ 5 at a time    │  │  checkpoints           │      │
//! │  └──────────────┘  └────────────────┘  └────────────────────────┘      │
//! │                                                                         │
//! │  ┌──────────────────────┐      ┌──────────────────────────────────┐    │
//! │  │ ConnectivityMonitor  │─────►│ AutoSync task                    │    │
//! │  │ Online ⇄ Offline     │ edge │ reconnect + periodic incremental │    │
//! │  └──────────────────────┘      └──────────────────────────────────┘    │
//! │                                                                         │
//! │  Screens talk to `dyn DataSource` (LocalDataSource / RemoteDataSource) │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - `SyncEngine`, reports, status, event emitter
//! - [`scheduler`] - Auto-sync on reconnect and on a timer
//! - [`connectivity`] - Online/offline state machine and HTTP probe
//! - [`assets`] - On-disk product image cache
//! - [`data_source`] - Data access facade (local and remote)
//! - [`remote`] - Remote system contract and HTTP client
//! - [`protocol`] - Wire types for the sync endpoints
//! - [`observer`] - Subscribe/notify with disposers
//! - [`config`] - Layered configuration (defaults → TOML → env)
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ruta_sync::{AssetCache, AutoSync, ConnectivityMonitor, HttpRemote, SyncConfig, SyncEngine};
//!
//! let config = SyncConfig::load(None)?;
//! let remote = Arc::new(HttpRemote::new(&config.remote, config.device_id())?);
//! let assets = Arc::new(AssetCache::new(config.assets.clone(), config.base_url())?);
//! let connectivity = ConnectivityMonitor::new(false);
//!
//! let engine = Arc::new(SyncEngine::new(db, remote, assets, connectivity.clone(), config.sync.clone()));
//! let auto = AutoSync::spawn(engine.clone(), connectivity, config.sync.periodic_interval());
//!
//! let report = engine.sync_now().await?;
//! println!("{}", report.summary());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod assets;
pub mod config;
pub mod connectivity;
pub mod data_source;
pub mod engine;
pub mod error;
pub mod observer;
pub mod protocol;
pub mod remote;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use assets::{AssetCache, AssetLocation, AssetRequest, BatchDownloadReport};
pub use config::SyncConfig;
pub use connectivity::{probe_once, spawn_http_probe, ConnectivityMonitor, ConnectivityState};
pub use data_source::{DataSource, LocalDataSource, RemoteDataSource};
pub use engine::{
    NoOpEmitter, ResetPreview, ResetReport, SyncEngine, SyncEventEmitter, SyncKind, SyncReport,
    SyncStatus,
};
pub use error::{AssetError, SyncError, SyncResult};
pub use observer::Subscription;
pub use remote::{HttpRemote, RemoteSystem};
pub use scheduler::{AutoSync, AutoSyncHandle};
