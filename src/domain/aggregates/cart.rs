//! Cart Aggregate

use serde::Serialize;
use tracing::{debug, info};
use crate::discount::{self, Reapplied};
use crate::domain::aggregates::Coupon;
use crate::domain::events::{CartEvent, DomainEvent};
use crate::domain::value_objects::{Money, ProductId, Quantity};
use crate::{Result, StorefrontError};

/// What the catalog hands the cart on "add to cart".
#[derive(Clone, Debug, PartialEq)]
pub struct Product {
    pub product_id: ProductId,
    pub name: String,
    pub image_url: Option<String>,
    pub selling_price: Money,
    pub mrp: Money,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub name: String,
    pub image_url: Option<String>,
    /// Selling price snapshotted when the line was created.
    pub unit_price: Money,
    pub mrp: Money,
    pub quantity: Quantity,
}

impl LineItem {
    pub fn line_total(&self) -> Money { self.unit_price * self.quantity }
    pub fn savings(&self) -> Money { self.mrp.saturating_sub(self.unit_price) * self.quantity }
}

impl From<&Product> for LineItem {
    fn from(p: &Product) -> Self {
        Self { product_id: p.product_id.clone(), name: p.name.clone(), image_url: p.image_url.clone(), unit_price: p.selling_price, mrp: p.mrp, quantity: Quantity::ONE }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppliedCoupon {
    pub coupon: Coupon,
    pub discount: Money,
}

/// Line items plus the at-most-one applied coupon.
///
/// The subtotal is never stored. Every mutation re-validates the applied
/// coupon against the new subtotal and revokes it in the same update when it
/// no longer qualifies.
#[derive(Clone, Debug, Default)]
pub struct Cart {
    items: Vec<LineItem>,
    applied: Option<AppliedCoupon>,
    events: Vec<DomainEvent>,
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    /// Rebuilds a cart from stored lines. Duplicate product ids are merged.
    pub fn from_items(items: impl IntoIterator<Item = LineItem>) -> Self {
        let mut cart = Self::new();
        for item in items {
            match cart.find_mut(&item.product_id) {
                Some(existing) => existing.quantity = Quantity::clamped(i64::from(existing.quantity.value()) + i64::from(item.quantity.value())),
                None => cart.items.push(item),
            }
        }
        cart
    }

    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn line_count(&self) -> usize { self.items.len() }
    pub fn item_count(&self) -> u32 { self.items.iter().fold(0u32, |n, i| n.saturating_add(i.quantity.value())) }
    pub fn get(&self, product_id: &ProductId) -> Option<&LineItem> { self.items.iter().find(|i| &i.product_id == product_id) }

    pub fn subtotal(&self) -> Money { self.items.iter().map(LineItem::line_total).sum() }
    pub fn savings(&self) -> Money { self.items.iter().map(LineItem::savings).sum() }
    pub fn applied_coupon(&self) -> Option<&AppliedCoupon> { self.applied.as_ref() }
    pub fn discount(&self) -> Money { self.applied.as_ref().map_or(Money::ZERO, |a| a.discount) }
    pub fn final_amount(&self) -> Money { self.subtotal().saturating_sub(self.discount()) }

    pub fn add(&mut self, product: &Product) {
        let quantity = match self.find_mut(&product.product_id) {
            Some(existing) => { existing.quantity = existing.quantity.increment(); existing.quantity }
            None => { self.items.push(LineItem::from(product)); Quantity::ONE }
        };
        debug!(product_id = %product.product_id, quantity = quantity.value(), "cart item added");
        self.raise_event(CartEvent::ItemAdded { product_id: product.product_id.clone(), quantity: quantity.value() });
        self.recalculate();
    }

    /// Quantity stepper "+". No-op when the product is not in the cart.
    pub fn increment(&mut self, product_id: &ProductId) -> bool {
        let Some(item) = self.find_mut(product_id) else { return false };
        item.quantity = item.quantity.increment();
        let quantity = item.quantity.value();
        self.raise_event(CartEvent::QuantitySet { product_id: product_id.clone(), quantity });
        self.recalculate();
        true
    }

    /// Takes one unit off; a line at quantity one is deleted. No-op when absent.
    pub fn remove(&mut self, product_id: &ProductId) -> bool {
        let Some(item) = self.find_mut(product_id) else { return false };
        match item.quantity.decrement() {
            Some(q) => {
                item.quantity = q;
                self.raise_event(CartEvent::ItemDecremented { product_id: product_id.clone(), quantity: q.value() });
            }
            None => {
                self.items.retain(|i| &i.product_id != product_id);
                self.raise_event(CartEvent::ItemRemoved { product_id: product_id.clone() });
            }
        }
        debug!(%product_id, "cart item decremented");
        self.recalculate();
        true
    }

    /// Deletes the whole line whatever its quantity. No-op when absent.
    pub fn remove_line(&mut self, product_id: &ProductId) -> bool {
        let before = self.items.len();
        self.items.retain(|i| &i.product_id != product_id);
        if self.items.len() == before { return false; }
        debug!(%product_id, "cart line removed");
        self.raise_event(CartEvent::ItemRemoved { product_id: product_id.clone() });
        self.recalculate();
        true
    }

    /// Sets the quantity, clamped to at least one. Never removes the line.
    pub fn set_quantity(&mut self, product_id: &ProductId, quantity: i64) -> bool {
        let Some(item) = self.find_mut(product_id) else { return false };
        item.quantity = Quantity::clamped(quantity);
        let quantity = item.quantity.value();
        self.raise_event(CartEvent::QuantitySet { product_id: product_id.clone(), quantity });
        self.recalculate();
        true
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.applied = None;
        self.raise_event(CartEvent::Cleared);
    }

    /// Applies `coupon`, replacing any coupon already applied. Leaves the cart
    /// untouched when the coupon does not qualify.
    pub fn apply_coupon(&mut self, coupon: &Coupon) -> Result<Money> {
        if self.is_empty() { return Err(StorefrontError::EmptyCart); }
        let evaluation = discount::evaluate(self.subtotal(), coupon);
        if !evaluation.eligible {
            return Err(StorefrontError::CouponIneligible { code: coupon.code.to_string(), min_order_value: coupon.min_order_value });
        }
        self.applied = Some(AppliedCoupon { coupon: coupon.clone(), discount: evaluation.discount_amount });
        self.raise_event(CartEvent::CouponApplied { code: coupon.code.clone(), discount: evaluation.discount_amount });
        Ok(evaluation.discount_amount)
    }

    pub fn remove_coupon(&mut self) -> Option<Coupon> {
        let applied = self.applied.take()?;
        self.raise_event(CartEvent::CouponRemoved { code: applied.coupon.code.clone() });
        Some(applied.coupon)
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    /// Events raised since the last `take_events`; grows only when the cart changed.
    pub fn pending_events(&self) -> usize { self.events.len() }

    fn find_mut(&mut self, product_id: &ProductId) -> Option<&mut LineItem> {
        self.items.iter_mut().find(|i| &i.product_id == product_id)
    }

    fn recalculate(&mut self) {
        let Some(applied) = self.applied.take() else { return };
        let subtotal = self.subtotal();
        match discount::reapply(subtotal, self.is_empty(), applied) {
            Reapplied::Kept(applied) => self.applied = Some(applied),
            Reapplied::Revoked { coupon, reason } => {
                info!(code = %coupon.code, %subtotal, %reason, "coupon revoked");
                self.raise_event(CartEvent::CouponRevoked { code: coupon.code, min_order_value: coupon.min_order_value, subtotal });
            }
        }
    }

    fn raise_event(&mut self, e: CartEvent) { self.events.push(DomainEvent::Cart(e)); }
}
