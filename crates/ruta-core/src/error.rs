//! # Error Types
//!
//! Domain-specific error types for ruta-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  ruta-core (this file)                                                 │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  ruta-db                                                               │
//! │  └── DbError          - Store failures (StoreFault)                    │
//! │                                                                         │
//! │  ruta-sync                                                             │
//! │  └── SyncError        - Network / rejection / asset / store faults     │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → caller                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Domain errors raised before anything touches the store.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product is not in the local replica.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Customer is not in the local replica.
    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    /// Order is unknown under both its local and server identifier.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Cart line does not exist (already removed or checked out).
    #[error("Cart line not found: {0}")]
    CartLineNotFound(String),

    /// Checkout with nothing in the cart.
    #[error("Cart for user {user_id} is empty")]
    EmptyCart { user_id: String },

    /// Order has more lines than allowed.
    #[error("Order cannot have more than {max} lines")]
    TooManyLines { max: usize },

    /// Unknown price tier name.
    #[error("Unknown price tier: {0}")]
    UnknownPriceTier(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
