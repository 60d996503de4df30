//! Discount rules: coupon eligibility and discount amounts.
//!
//! Everything here is pure. The cart calls [`reapply`] after every mutation so
//! an applied coupon never outlives the subtotal it was granted against.

use serde::Serialize;
use crate::domain::aggregates::{AppliedCoupon, Coupon, DiscountType};
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Evaluation {
    pub eligible: bool,
    pub discount_amount: Money,
    pub reason: Option<Ineligible>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Ineligible {
    BelowMinimumOrder { min_order_value: Money },
    EmptyCart,
}

impl std::fmt::Display for Ineligible {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BelowMinimumOrder { min_order_value } => write!(f, "below minimum order of {min_order_value}"),
            Self::EmptyCart => write!(f, "cart is empty"),
        }
    }
}

/// Decides whether `coupon` applies to `subtotal` and how much it takes off.
///
/// Fixed discounts are not capped to the subtotal; the order total is floored
/// at zero instead. Amounts are rounded to currency precision.
pub fn evaluate(subtotal: Money, coupon: &Coupon) -> Evaluation {
    if subtotal < coupon.min_order_value {
        return Evaluation {
            eligible: false,
            discount_amount: Money::ZERO,
            reason: Some(Ineligible::BelowMinimumOrder { min_order_value: coupon.min_order_value }),
        };
    }
    let discount_amount = match coupon.discount_type {
        DiscountType::Percentage => subtotal.percent(coupon.discount_value),
        DiscountType::Fixed => Money::new(coupon.discount_value),
    };
    Evaluation { eligible: true, discount_amount: discount_amount.round(), reason: None }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Reapplied {
    Kept(AppliedCoupon),
    Revoked { coupon: Coupon, reason: Ineligible },
}

/// Re-runs [`evaluate`] against a fresh subtotal. An empty cart always revokes.
pub fn reapply(subtotal: Money, is_empty: bool, applied: AppliedCoupon) -> Reapplied {
    if is_empty {
        return Reapplied::Revoked { coupon: applied.coupon, reason: Ineligible::EmptyCart };
    }
    let evaluation = evaluate(subtotal, &applied.coupon);
    match evaluation.reason {
        Some(reason) => Reapplied::Revoked { coupon: applied.coupon, reason },
        None => Reapplied::Kept(AppliedCoupon { coupon: applied.coupon, discount: evaluation.discount_amount }),
    }
}

/// Case-insensitive lookup. With duplicate codes the first in catalog order wins.
pub fn find_coupon<'a>(catalog: &'a [Coupon], code: &str) -> Option<&'a Coupon> {
    catalog.iter().find(|c| c.code.matches(code))
}
