//! Cart persisted under the `cart` key of a durable store.
//!
//! Stored records are parsed and validated here, once. Everything past this
//! point works with typed prices and quantities.

use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use validator::{Validate, ValidationError};
use crate::catalog::CouponCatalog;
use crate::domain::aggregates::{Cart, Coupon, LineItem, Product};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::{Money, ProductId, Quantity};
use crate::storage::{read_json, write_json, KeyValueStore, CART_KEY};
use crate::Result;

/// Shape of one element of the stored `cart` array.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CartLineRecord {
    #[serde(deserialize_with = "string_or_number")]
    #[validate(length(min = 1))]
    pub product_id: String,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[validate(custom = "price_in_range")]
    pub selling_price: Money,
    #[serde(default)]
    #[validate(custom = "price_in_range")]
    pub mrp: Money,
    #[validate(range(min = 1))]
    pub quantity: i64,
}

/// Shared with the HTTP boundary so stored and submitted prices obey the same bound.
pub fn price_in_range(value: &Money) -> std::result::Result<(), ValidationError> {
    if !value.is_valid_price() { return Err(ValidationError::new("price_out_of_range")); }
    Ok(())
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("expected product id, got {other}"))),
    }
}

impl From<&LineItem> for CartLineRecord {
    fn from(i: &LineItem) -> Self {
        Self {
            product_id: i.product_id.to_string(), product_name: Some(i.name.clone()), image_url: i.image_url.clone(),
            selling_price: i.unit_price, mrp: i.mrp, quantity: i64::from(i.quantity.value()),
        }
    }
}

impl CartLineRecord {
    fn into_line(self) -> Option<LineItem> {
        if let Err(e) = self.validate() {
            warn!(product_id = %self.product_id, error = %e, "dropping malformed cart line");
            return None;
        }
        Some(LineItem {
            product_id: ProductId::new(self.product_id).ok()?,
            name: self.product_name.unwrap_or_default(),
            image_url: self.image_url,
            unit_price: self.selling_price,
            mrp: self.mrp,
            quantity: Quantity::clamped(self.quantity),
        })
    }
}

/// Amounts and lines as shown on the cart page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartSummary {
    pub items: Vec<LineItem>,
    pub item_count: u32,
    pub subtotal: Money,
    pub savings: Money,
    pub coupon: Option<AppliedCouponView>,
    pub discount_amount: Money,
    pub final_amount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedCouponView { pub code: String, pub label: String }

pub struct CartStore {
    store: Arc<dyn KeyValueStore>,
    cart: Cart,
}

impl std::fmt::Debug for CartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore").field("cart", &self.cart).finish_non_exhaustive()
    }
}

impl CartStore {
    /// Loads the stored cart. Malformed lines are dropped; an unreadable
    /// value starts an empty cart.
    pub fn open(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let raw: Vec<serde_json::Value> = match read_json(store.as_ref(), CART_KEY) {
            Ok(lines) => lines.unwrap_or_default(),
            Err(e) => { warn!(error = %e, "stored cart unreadable, starting empty"); Vec::new() }
        };
        let lines = raw.into_iter().filter_map(|value| match serde_json::from_value::<CartLineRecord>(value) {
            Ok(record) => record.into_line(),
            Err(e) => { warn!(error = %e, "dropping unparseable cart line"); None }
        });
        let cart = Cart::from_items(lines);
        debug!(lines = cart.line_count(), "cart loaded");
        Ok(Self { store, cart })
    }

    pub fn cart(&self) -> &Cart { &self.cart }
    pub fn list(&self) -> &[LineItem] { self.cart.items() }
    pub fn subtotal(&self) -> Money { self.cart.subtotal() }
    pub fn discount(&self) -> Money { self.cart.discount() }
    pub fn final_amount(&self) -> Money { self.cart.final_amount() }

    pub fn add(&mut self, product: &Product) -> Result<()> { self.mutate(|cart| cart.add(product)) }
    pub fn increment(&mut self, product_id: &ProductId) -> Result<bool> { self.mutate(|cart| cart.increment(product_id)) }
    pub fn remove(&mut self, product_id: &ProductId) -> Result<bool> { self.mutate(|cart| cart.remove(product_id)) }
    pub fn remove_line(&mut self, product_id: &ProductId) -> Result<bool> { self.mutate(|cart| cart.remove_line(product_id)) }
    pub fn set_quantity(&mut self, product_id: &ProductId, quantity: i64) -> Result<bool> { self.mutate(|cart| cart.set_quantity(product_id, quantity)) }

    /// Empties the cart and deletes the stored entry. Only after a confirmed order.
    pub fn clear(&mut self) -> Result<()> {
        self.store.remove(CART_KEY)?;
        self.cart.clear();
        Ok(())
    }

    pub fn apply_coupon(&mut self, coupon: &Coupon) -> Result<Money> { self.cart.apply_coupon(coupon) }

    /// Looks `code` up in the catalog's current list and applies it.
    pub fn apply_code(&mut self, catalog: &CouponCatalog, code: &str) -> Result<Money> {
        let coupon = catalog.find(code)?;
        self.apply_coupon(&coupon)
    }

    pub fn remove_coupon(&mut self) -> Option<Coupon> { self.cart.remove_coupon() }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { self.cart.take_events() }

    pub fn summary(&self) -> CartSummary {
        CartSummary {
            items: self.cart.items().to_vec(),
            item_count: self.cart.item_count(),
            subtotal: self.cart.subtotal(),
            savings: self.cart.savings(),
            coupon: self.cart.applied_coupon().map(|a| AppliedCouponView { code: a.coupon.code.to_string(), label: a.coupon.label() }),
            discount_amount: self.cart.discount(),
            final_amount: self.cart.final_amount(),
        }
    }

    /// Applies `f` to a copy and swaps it in only once the write succeeded.
    fn mutate<R>(&mut self, f: impl FnOnce(&mut Cart) -> R) -> Result<R> {
        let mut next = self.cart.clone();
        let out = f(&mut next);
        let records: Vec<CartLineRecord> = next.items().iter().map(CartLineRecord::from).collect();
        write_json(self.store.as_ref(), CART_KEY, &records)?;
        self.cart = next;
        Ok(out)
    }
}
