use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use crate::domain::aggregates::{Cart, CheckoutId, OrderDraft};
use crate::storage::{read_json, write_json, KeyValueStore, LATEST_ORDER_KEY};
use crate::{Result, StorefrontError};

/// `latestOrder` wraps the draft in a `data` object.
#[derive(Serialize, Deserialize)]
struct LatestOrder { data: OrderDraft }

#[derive(Serialize)]
struct LatestOrderRef<'a> { data: &'a OrderDraft }

/// Snapshots carts into order drafts and keeps the latest one under `latestOrder`.
///
/// Only one checkout is in flight per session: persisting overwrites any
/// unconsumed draft. Nothing here clears the cart or the draft on its own.
pub struct OrderDraftBuilder {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for OrderDraftBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_struct("OrderDraftBuilder").finish_non_exhaustive() }
}

impl OrderDraftBuilder {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self { Self { store } }

    /// Fails with `EmptyCart` when there is nothing to check out.
    pub fn build(&self, cart: &Cart, customer: Option<String>) -> Result<OrderDraft> {
        if cart.is_empty() { return Err(StorefrontError::EmptyCart); }
        let now = Utc::now();
        Ok(OrderDraft::snapshot(cart, customer, CheckoutId::generate(now), now))
    }

    pub fn persist(&self, draft: &OrderDraft) -> Result<()> {
        write_json(self.store.as_ref(), LATEST_ORDER_KEY, &LatestOrderRef { data: draft })?;
        info!(checkout_id = %draft.checkout_id(), final_amount = %draft.final_amount(), "order draft persisted");
        Ok(())
    }

    /// Reads the current draft without removing it, so a failed payment can be retried.
    pub fn consume(&self) -> Result<OrderDraft> {
        let latest: Option<LatestOrder> = read_json(self.store.as_ref(), LATEST_ORDER_KEY)?;
        latest.map(|l| l.data).ok_or(StorefrontError::NoDraft)
    }

    pub fn discard(&self) -> Result<()> { self.store.remove(LATEST_ORDER_KEY) }
}
