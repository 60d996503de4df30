//! Coupon Aggregate

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::{CouponCode, Money};

/// A catalog-defined discount rule. Read-only to the cart flow.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Coupon {
    pub code: CouponCode,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    /// Percent in `[0, 100]` for `Percentage`, a currency amount for `Fixed`.
    pub discount_value: Decimal,
    pub min_order_value: Money,
    pub validity: Option<ValidityWindow>,
    pub is_active: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType { Percentage, Fixed }

impl DiscountType {
    /// Parses the backend's `discount_type`. Free-shipping coupons are not
    /// priced by the cart and come back as `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "percentage" | "percent" => Some(Self::Percentage),
            "fixed" => Some(Self::Fixed),
            _ => None,
        }
    }
}

/// Inclusive date range a coupon may be used in. Either end may be open.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ValidityWindow { pub starts_on: Option<NaiveDate>, pub ends_on: Option<NaiveDate> }

impl ValidityWindow {
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.starts_on.map_or(true, |s| day >= s) && self.ends_on.map_or(true, |e| day <= e)
    }
}

impl Coupon {
    pub fn percentage(code: CouponCode, percent: Decimal, min_order_value: Money) -> Self {
        Self::new(code, DiscountType::Percentage, percent, min_order_value)
    }

    pub fn fixed(code: CouponCode, amount: Decimal, min_order_value: Money) -> Self {
        Self::new(code, DiscountType::Fixed, amount, min_order_value)
    }

    fn new(code: CouponCode, discount_type: DiscountType, discount_value: Decimal, min_order_value: Money) -> Self {
        Self { code, description: None, discount_type, discount_value, min_order_value, validity: None, is_active: true }
    }

    /// Active and inside its validity window on `day`.
    pub fn is_available_on(&self, day: NaiveDate) -> bool {
        self.is_active && self.validity.map_or(true, |w| w.contains(day))
    }

    /// Short display label, e.g. `10% off` or `₹100 off`.
    pub fn label(&self) -> String {
        match self.discount_type {
            DiscountType::Percentage => format!("{}% off", self.discount_value.normalize()),
            DiscountType::Fixed => format!("{} off", Money::new(self.discount_value)),
        }
    }
}
