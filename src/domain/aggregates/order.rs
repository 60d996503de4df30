//! Order draft: the immutable checkout snapshot of a cart

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use crate::domain::aggregates::{Cart, LineItem};
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckoutId(String);

impl CheckoutId {
    /// `CHK-<unix millis>-<random>`. Unique within a session, the backend owns order identity.
    pub fn generate(now: DateTime<Utc>) -> Self {
        Self(format!("CHK-{}-{}", now.timestamp_millis(), rand::random::<u32>() % 1_000_000))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CheckoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftItem {
    pub product_id: String,
    pub name: String,
    pub mrp: Money,
    pub selling_price: Money,
    pub quantity: u32,
    pub image: Option<String>,
}

impl DraftItem {
    pub fn line_total(&self) -> Money { self.selling_price.times(Decimal::from(self.quantity)) }
}

impl From<&LineItem> for DraftItem {
    fn from(i: &LineItem) -> Self {
        Self { product_id: i.product_id.to_string(), name: i.name.clone(), mrp: i.mrp, selling_price: i.unit_price, quantity: i.quantity.value(), image: i.image_url.clone() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus { #[default] Pending }

/// Snapshot of the cart and its discount handed to the checkout step.
///
/// Field names follow the `latestOrder` record the checkout page reads.
/// `total_amount` carries the amount due after discount, same as `final_amount`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    checkout_id: CheckoutId,
    order_status: DraftStatus,
    #[serde(rename = "userEmail", default, skip_serializing_if = "Option::is_none")]
    customer: Option<String>,
    subtotal: Money,
    discount_amount: Money,
    coupon_code: Option<String>,
    total_amount: Money,
    final_amount: Money,
    order_item: Vec<DraftItem>,
    order_created_at: DateTime<Utc>,
}

impl OrderDraft {
    /// Callers guarantee `cart` is non-empty.
    pub(crate) fn snapshot(cart: &Cart, customer: Option<String>, checkout_id: CheckoutId, created_at: DateTime<Utc>) -> Self {
        let subtotal = cart.subtotal();
        let discount_amount = cart.discount();
        let final_amount = subtotal.saturating_sub(discount_amount);
        Self {
            checkout_id, order_status: DraftStatus::Pending, customer, subtotal, discount_amount,
            coupon_code: cart.applied_coupon().map(|a| a.coupon.code.to_string()),
            total_amount: final_amount, final_amount,
            order_item: cart.items().iter().map(DraftItem::from).collect(),
            order_created_at: created_at,
        }
    }

    pub fn checkout_id(&self) -> &CheckoutId { &self.checkout_id }
    pub fn status(&self) -> &DraftStatus { &self.order_status }
    pub fn customer(&self) -> Option<&str> { self.customer.as_deref() }
    pub fn items(&self) -> &[DraftItem] { &self.order_item }
    pub fn subtotal(&self) -> Money { self.subtotal }
    pub fn discount_amount(&self) -> Money { self.discount_amount }
    pub fn coupon_code(&self) -> Option<&str> { self.coupon_code.as_deref() }
    pub fn final_amount(&self) -> Money { self.final_amount }
    pub fn created_at(&self) -> DateTime<Utc> { self.order_created_at }
}
