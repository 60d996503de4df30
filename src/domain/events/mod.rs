//! Domain events
use crate::domain::value_objects::{CouponCode, Money, ProductId};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    Cart(CartEvent),
    Checkout(CheckoutEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CartEvent {
    ItemAdded { product_id: ProductId, quantity: u32 },
    ItemDecremented { product_id: ProductId, quantity: u32 },
    ItemRemoved { product_id: ProductId },
    QuantitySet { product_id: ProductId, quantity: u32 },
    CouponApplied { code: CouponCode, discount: Money },
    /// Raised when a mutation drops the subtotal below the coupon's minimum.
    CouponRevoked { code: CouponCode, min_order_value: Money, subtotal: Money },
    CouponRemoved { code: CouponCode },
    Cleared,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CheckoutEvent {
    DraftBuilt { checkout_id: String, final_amount: Money },
    PaymentPending { checkout_id: String },
    Confirmed { checkout_id: String },
    Failed { checkout_id: String, reason: String },
}
