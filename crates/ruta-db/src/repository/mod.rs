//! # Repository Module
//!
//! Typed access to the device replica, one repository per table family.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  DataSource / SyncEngine                                               │
//! │       │                                                                 │
//! │       │  db.orders().checkout(&order, &line_ids)                        │
//! │       ▼                                                                 │
//! │  OrderRepository                                                       │
//! │  ├── checkout / create_with_outbox   (order + queue item, one tx)      │
//! │  ├── get / list / pending                                              │
//! │  └── mark_sent / acknowledge / return_to_pending / discard_pending     │
//! │       │                                                                 │
//! │       │  SQL                                                            │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CatalogRepository`](catalog::CatalogRepository) - Products and variants
//! - [`PricingRepository`](pricing::PricingRepository) - Tier prices
//! - [`CustomerRepository`](customer::CustomerRepository) - Customers
//! - [`PromotionRepository`](promotion::PromotionRepository) - Promotions
//! - [`CartRepository`](cart::CartRepository) - Working cart
//! - [`OrderRepository`](order::OrderRepository) - Outbound orders
//! - [`OutboxRepository`](outbox::OutboxRepository) - Outbound queue
//! - [`CheckpointRepository`](checkpoint::CheckpointRepository) - Sync checkpoints

pub mod cart;
pub mod catalog;
pub mod checkpoint;
pub mod customer;
pub mod order;
pub mod outbox;
pub mod pricing;
pub mod promotion;
