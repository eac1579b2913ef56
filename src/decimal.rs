//! Fixed-point quantities with a per-unit number of decimal places.
//!
//! Uses `rust_decimal` internally with scale enforcement to ensure
//! consistent calculations without floating-point errors. Every constructor
//! and arithmetic step rounds half away from zero to the unit's scale, which
//! is half-up for the non-negative amounts callers supply.

use crate::unit::{Currency, Gold, Unit};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

/// Currency amount, 2 decimal places.
pub type Money = Quantity<Currency>;

/// Gold weight in grams, 3 decimal places.
pub type Grams = Quantity<Gold>;

/// A decimal amount of unit `U` that keeps exactly `U::SCALE` decimal places.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use commodity_ledger::{Grams, Money};
///
/// let cash = Money::from_str("10.5").unwrap();
/// assert_eq!(cash.to_string(), "10.50");
///
/// let weight = Grams::from_str("1.2345").unwrap();
/// assert_eq!(weight.to_string(), "1.235");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity<U> {
    value: Decimal,
    unit: PhantomData<U>,
}

impl<U: Unit> Quantity<U> {
    /// Zero value, at the unit's scale.
    pub const ZERO: Self = Quantity {
        value: Decimal::from_parts(0, 0, 0, false, U::SCALE),
        unit: PhantomData,
    };

    /// Creates a quantity from a `Decimal`, rounding to the unit's scale.
    pub fn new(value: Decimal) -> Self {
        let mut normalized =
            value.round_dp_with_strategy(U::SCALE, RoundingStrategy::MidpointAwayFromZero);
        normalized.rescale(U::SCALE);
        Quantity {
            value: normalized,
            unit: PhantomData,
        }
    }

    /// The underlying decimal, always at scale `U::SCALE`.
    pub fn value(&self) -> Decimal {
        self.value
    }

    /// Returns `true` if this value is zero.
    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Returns `true` if this value is strictly below zero.
    pub fn is_negative(&self) -> bool {
        self.value.is_sign_negative() && !self.value.is_zero()
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.value.checked_add(rhs.value).map(Self::new)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.value.checked_sub(rhs.value).map(Self::new)
    }
}

impl<U: Unit> Default for Quantity<U> {
    fn default() -> Self {
        Self::ZERO
    }
}

impl<U: Unit> FromStr for Quantity<U> {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let decimal = Decimal::from_str(trimmed)?;
        Ok(Quantity::new(decimal))
    }
}

impl<U: Unit> From<Decimal> for Quantity<U> {
    fn from(value: Decimal) -> Self {
        Quantity::new(value)
    }
}

impl<U: Unit> fmt::Display for Quantity<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.*}", U::SCALE as usize, self.value)
    }
}

impl<U: Unit> Add for Quantity<U> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Quantity::new(self.value + rhs.value)
    }
}

impl<U: Unit> AddAssign for Quantity<U> {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<U: Unit> Sub for Quantity<U> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Quantity::new(self.value - rhs.value)
    }
}

impl<U: Unit> SubAssign for Quantity<U> {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<U: Unit> Neg for Quantity<U> {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Quantity::new(-self.value)
    }
}

impl<U: Unit> Serialize for Quantity<U> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de, U: Unit> Deserialize<'de> for Quantity<U> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Quantity::from_str(&s).map_err(serde::de::Error::custom)
    }
}
