//! # ruta-core: Domain Types for the Ruta Field-Sales Client
//!
//! Everything the local store, the sync engine and the UI bindings agree on:
//! entity shapes, integer money, identifier formats and input validation.
//! There is no I/O in this crate.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Ruta Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │           Presentation (catalog / cart / order screens)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ DataSource (local or remote)           │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                ruta-sync (facade + sync engine)                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                   ruta-db (SQLite replica)                      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ ruta-core (THIS CRATE) ★                        │   │
//! │  │   types • money • validation • errors   (NO I/O)                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Replica entities, orders, outbound queue, checkpoints
//! - [`money`] - Integer money (minor units)
//! - [`error`] - Domain error types
//! - [`validation`] - Input checks applied before local writes

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Checkpoint key written at the end of every successful full sync.
pub const CHECKPOINT_LAST_FULL_SYNC: &str = "lastFullSync";

/// Checkpoint key written at the end of every successful pull (full or incremental).
pub const CHECKPOINT_LAST_INCREMENTAL_SYNC: &str = "lastIncrementalSync";

/// Entity type recorded on outbound queue items created by checkout.
pub const ORDER_ENTITY_TYPE: &str = "order";

/// Maximum quantity of a single line.
///
/// Guards against a mistyped quantity (1000 instead of 10) reaching the server.
pub const MAX_ITEM_QUANTITY: i64 = 9_999;

/// Maximum number of lines in one order.
pub const MAX_ORDER_LINES: usize = 200;
