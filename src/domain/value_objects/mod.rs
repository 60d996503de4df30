//! Value Objects for the storefront cart

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Mul, Sub};

/// Product identifier, the unique key of a line within a cart
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    pub fn new(value: impl Into<String>) -> Result<Self, ProductIdError> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return Err(ProductIdError::Empty); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum ProductIdError { Empty }
impl std::error::Error for ProductIdError {}
impl fmt::Display for ProductIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "product id empty") }
}

/// Coupon code. Keeps the catalog's spelling for display, compares case-insensitively.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CouponCode(String);

impl CouponCode {
    /// Characters, not bytes.
    pub const MAX_LEN: usize = 64;

    pub fn new(value: impl Into<String>) -> Result<Self, CouponCodeError> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return Err(CouponCodeError::Empty); }
        if value.chars().count() > Self::MAX_LEN { return Err(CouponCodeError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn matches(&self, other: &str) -> bool { self.0.eq_ignore_ascii_case(other.trim()) }
}

impl PartialEq for CouponCode {
    fn eq(&self, other: &Self) -> bool { self.matches(&other.0) }
}
impl Eq for CouponCode {}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CouponCodeError { Empty, TooLong }
impl std::error::Error for CouponCodeError {}
impl fmt::Display for CouponCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "coupon code empty"), Self::TooLong => write!(f, "coupon code too long") }
    }
}

/// Money value object.
///
/// Reads JSON numbers as well as numeric strings (the backend sends numerics as
/// strings) and always writes an exact JSON number. Arithmetic saturates at
/// the `Decimal` range instead of panicking.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(#[serde(serialize_with = "rust_decimal::serde::arbitrary_precision::serialize")] Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);
    /// Highest unit price the cart takes from outside.
    pub const MAX_PRICE: Money = Money(Decimal::from_parts(1_000_000_000, 0, 0, false, 0));

    pub fn new(amount: Decimal) -> Self { Self(amount) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }
    /// Non-negative and at most [`Money::MAX_PRICE`].
    pub fn is_valid_price(&self) -> bool { !self.is_negative() && *self <= Self::MAX_PRICE }

    /// Rounds to currency precision (two places, half away from zero).
    pub fn round(&self) -> Money { Money(self.0.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)) }

    /// Subtraction that never goes below zero.
    pub fn saturating_sub(&self, other: Money) -> Money { Money(self.0.saturating_sub(other.0).max(Decimal::ZERO)) }

    pub fn percent(&self, rate: Decimal) -> Money { Money(self.0.saturating_mul(rate) / Decimal::ONE_HUNDRED) }

    pub fn times(&self, factor: Decimal) -> Money { Money(self.0.saturating_mul(factor)) }
}

impl From<Decimal> for Money { fn from(amount: Decimal) -> Self { Self(amount) } }
impl From<i64> for Money { fn from(amount: i64) -> Self { Self(Decimal::from(amount)) } }

impl Add for Money { type Output = Money; fn add(self, rhs: Money) -> Money { Money(self.0.saturating_add(rhs.0)) } }
impl Sub for Money { type Output = Money; fn sub(self, rhs: Money) -> Money { Money(self.0.saturating_sub(rhs.0)) } }
impl Mul<Quantity> for Money { type Output = Money; fn mul(self, qty: Quantity) -> Money { self.times(Decimal::from(qty.value())) } }
impl Sum for Money { fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, Add::add) } }

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "₹{}", self.0.normalize()) }
}

/// Quantity of a cart line. Never below one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub const ONE: Quantity = Quantity(1);
    pub const MAX: Quantity = Quantity(9_999);

    /// Clamps into `[1, MAX]`; a line is removed, never zeroed.
    pub fn clamped(value: i64) -> Self { Self(value.clamp(1, i64::from(Self::MAX.0)) as u32) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn increment(&self) -> Self { Self(self.0.saturating_add(1).min(Self::MAX.0)) }
    /// `None` when the decrement would reach zero.
    pub fn decrement(&self) -> Option<Self> { if self.0 > 1 { Some(Self(self.0 - 1)) } else { None } }
}

impl Default for Quantity { fn default() -> Self { Self::ONE } }
