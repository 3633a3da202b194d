//! # Money Module
//!
//! Integer money in minor units. Prices arrive from the remote system as
//! `...Cents` integers and every order total is computed from them without
//! floating point.
//!
//! ## Usage
//! ```rust
//! use ruta_core::money::Money;
//!
//! let unit = Money::from_cents(1_250);        // 12.50
//! let line = unit.multiply_quantity(4);       // 50.00
//! assert_eq!(line.cents(), 5_000);
//! assert_eq!(line.to_string(), "$50.00");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// Signed so fixed-amount promotions and corrections can go negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Zero.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies a unit price by a line quantity.
    ///
    /// ## Example
    /// ```rust
    /// use ruta_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(299);
    /// assert_eq!(unit_price.multiply_quantity(3).cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Applies a discount expressed in basis points (1000 = 10%).
    ///
    /// Rounds the discount half-up, so the customer never pays a fraction more.
    pub fn apply_percentage_discount(&self, discount_bps: i64) -> Money {
        let discount = (self.0 as i128 * discount_bps as i128 + 5_000) / 10_000;
        Money(self.0 - discount as i64)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// For logs and debugging only; the UI formats with the user's locale.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{}${}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "$10.99");
        assert_eq!(Money::from_cents(-550).to_string(), "-$5.50");
        assert_eq!(Money::from_cents(7).to_string(), "$0.07");
    }

    #[test]
    fn test_sum_of_lines() {
        let total: Money = [Money::from_cents(500), Money::from_cents(250) * 2]
            .into_iter()
            .sum();
        assert_eq!(total.cents(), 1000);
    }

    #[test]
    fn test_percentage_discount() {
        let price = Money::from_cents(10_000);
        assert_eq!(price.apply_percentage_discount(1_000).cents(), 9_000);

        // 15% of 3.33 = 0.4995, rounds to 0.50
        assert_eq!(Money::from_cents(333).apply_percentage_discount(1_500).cents(), 283);
    }
}
