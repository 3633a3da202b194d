//! # ruta-db: Local Store for the Ruta Field-Sales Client
//!
//! The device's SQLite replica and the bookkeeping that makes offline
//! order taking safe.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Ruta Data Flow                                   │
//! │                                                                         │
//! │  LocalDataSource / SyncEngine                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     ruta-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ catalog, cart │    │  (embedded)  │  │   │
//! │  │   │               │◄───│ orders, queue │    │ 001_init.sql │  │   │
//! │  │   │  LocalStore   │    │ checkpoints.. │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`store`] - Generic query / execute / transaction / clear contract
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Typed repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ruta_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/ruta.db")).await?;
//!
//! let products = db.catalog().list_listed().await?;
//! let order = db.orders().checkout(&new_order, &cart_line_ids).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use store::{JsonRow, LocalStore, SqlValue, Statement};

// Repository re-exports for convenience
pub use repository::cart::CartRepository;
pub use repository::catalog::CatalogRepository;
pub use repository::checkpoint::CheckpointRepository;
pub use repository::customer::CustomerRepository;
pub use repository::order::OrderRepository;
pub use repository::outbox::OutboxRepository;
pub use repository::pricing::PricingRepository;
pub use repository::promotion::PromotionRepository;
