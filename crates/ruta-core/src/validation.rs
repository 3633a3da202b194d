//! # Validation Module
//!
//! Input checks applied by the local data source before anything is written.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Screen (catalog / cart / checkout)                           │
//! │  └── Empty fields, obvious typos                                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: LocalDataSource (Rust)                                       │
//! │  └── THIS MODULE: quantity, price, line count, required ids            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                       │
//! │  └── NOT NULL / UNIQUE / primary keys                                  │
//! │                                                                         │
//! │  The server re-validates everything it receives.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use ruta_core::validation::{validate_quantity, validate_required};
//!
//! validate_quantity(5).unwrap();
//! validate_required("user_id", "agent-7").unwrap();
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{NewCartLine, NewOrder};
use crate::{MAX_ITEM_QUANTITY, MAX_ORDER_LINES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest free text accepted on an order or line.
const MAX_NOTE_LEN: usize = 500;

// =============================================================================
// Field Validators
// =============================================================================

/// Rejects empty or whitespace-only values.
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a line quantity.
///
/// ## Rules
/// - At least 1
/// - At most [`MAX_ITEM_QUANTITY`]
///
/// ## Example
/// ```rust
/// use ruta_core::validation::validate_quantity;
///
/// assert!(validate_quantity(12).is_ok());
/// assert!(validate_quantity(0).is_err());
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if !(1..=MAX_ITEM_QUANTITY).contains(&qty) {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }
    Ok(())
}

/// Validates a price in minor units. Zero is allowed (samples, gifts).
pub fn validate_price_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn validate_optional_text(field: &str, value: Option<&str>) -> ValidationResult<()> {
    match value {
        Some(text) if text.len() > MAX_NOTE_LEN => Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NOTE_LEN,
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Aggregate Validators
// =============================================================================

/// Validates a cart addition.
pub fn validate_new_cart_line(line: &NewCartLine) -> ValidationResult<()> {
    validate_required("user_id", &line.user_id)?;
    validate_required("product_id", &line.product_id)?;
    validate_quantity(line.quantity)?;
    validate_price_cents("unit_price", line.unit_price_cents)?;
    validate_optional_text("custom_text", line.custom_text.as_deref())?;
    Ok(())
}

/// Validates an order before it is persisted and queued.
///
/// ## Rules
/// - `user_id` present
/// - 1 to [`MAX_ORDER_LINES`] lines
/// - every line has a product, a valid quantity and a non-negative price
/// - tax is not negative
pub fn validate_new_order(order: &NewOrder) -> CoreResult<()> {
    validate_required("user_id", &order.user_id)?;

    if order.lines.is_empty() {
        return Err(CoreError::EmptyCart {
            user_id: order.user_id.clone(),
        });
    }
    if order.lines.len() > MAX_ORDER_LINES {
        return Err(CoreError::TooManyLines {
            max: MAX_ORDER_LINES,
        });
    }

    for line in &order.lines {
        validate_required("product_id", &line.product_id)?;
        validate_quantity(line.quantity)?;
        validate_price_cents("unit_price", line.unit_price_cents)?;
        validate_optional_text("custom_text", line.custom_text.as_deref())?;
    }

    validate_price_cents("tax", order.tax_cents)?;
    validate_optional_text("notes", order.notes.as_deref())?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
