use std::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};
use super::confirmation::{ConfirmationRequest, OrderConfirmation, PaymentMethod};
use super::draft::OrderDraftBuilder;
use super::state::{CheckoutState, Transition};
use crate::cart_store::CartStore;
use crate::domain::aggregates::{Cart, OrderDraft};
use crate::domain::events::{CheckoutEvent, DomainEvent};
use crate::inflight::InFlight;
use crate::{Result, StorefrontError};

/// Drives a session's checkout: draft building and the external confirmation.
///
/// The cart lock is never held across the confirmation call. A failed or
/// abandoned confirmation leaves cart and draft as they were.
pub struct CheckoutFlow {
    drafts: OrderDraftBuilder,
    flight: InFlight,
    state: Mutex<CheckoutState>,
    events: Mutex<Vec<DomainEvent>>,
}

impl std::fmt::Debug for CheckoutFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutFlow").field("state", &self.state()).finish_non_exhaustive()
    }
}

fn locked<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock().map_err(|_| StorefrontError::Storage("checkout lock poisoned".into()))
}

fn cart_transition(cart: &Cart) -> Transition {
    Transition::CartChanged { is_empty: cart.is_empty(), has_coupon: cart.applied_coupon().is_some() }
}

impl CheckoutFlow {
    /// Resumes at `DRAFT_BUILT` when a draft survived a restart and the cart still has items.
    pub fn new(drafts: OrderDraftBuilder, cart: &Cart) -> Self {
        let resumed = !cart.is_empty() && drafts.consume().is_ok();
        let state = CheckoutState::default().next(cart_transition(cart)).unwrap_or_default();
        let state = if resumed { state.next(Transition::DraftBuilt).unwrap_or(state) } else { state };
        Self { drafts, flight: InFlight::new("order confirmation"), state: Mutex::new(state), events: Mutex::new(Vec::new()) }
    }

    pub fn state(&self) -> CheckoutState { self.state.lock().map(|s| *s).unwrap_or_default() }

    pub fn drafts(&self) -> &OrderDraftBuilder { &self.drafts }

    pub fn take_events(&self) -> Vec<DomainEvent> {
        self.events.lock().map(|mut e| std::mem::take(&mut *e)).unwrap_or_default()
    }

    /// Call after every cart mutation.
    pub fn cart_changed(&self, cart: &Cart) -> Result<CheckoutState> {
        self.advance(cart_transition(cart))
    }

    /// Runs a cart mutation. Refused without touching the cart while a payment
    /// is pending; the checkout state only moves when the cart actually changed.
    pub fn update_cart<R>(&self, carts: &mut CartStore, f: impl FnOnce(&mut CartStore) -> Result<R>) -> Result<R> {
        let current = self.state();
        if current == CheckoutState::PaymentPending {
            return Err(StorefrontError::InvalidTransition { from: current, action: "change the cart" });
        }
        let before = carts.cart().pending_events();
        let out = f(carts)?;
        if carts.cart().pending_events() > before {
            self.cart_changed(carts.cart())?;
        }
        Ok(out)
    }

    /// Snapshots the cart and persists the draft, replacing any earlier one.
    pub fn begin_checkout(&self, cart: &Cart, customer: Option<String>) -> Result<OrderDraft> {
        let current = self.state();
        if current == CheckoutState::PaymentPending {
            return Err(StorefrontError::InvalidTransition { from: current, action: "build a draft" });
        }
        let draft = match self.drafts.build(cart, customer) {
            Ok(draft) => draft,
            Err(e) => {
                self.advance(cart_transition(cart))?;
                return Err(e);
            }
        };
        self.drafts.persist(&draft)?;
        self.advance(Transition::DraftBuilt)?;
        self.raise_event(CheckoutEvent::DraftBuilt { checkout_id: draft.checkout_id().to_string(), final_amount: draft.final_amount() });
        Ok(draft)
    }

    /// Sends the current draft for confirmation. On success the cart and the
    /// draft are cleared; otherwise both stay for a retry.
    pub async fn confirm(&self, carts: &Mutex<CartStore>, confirmer: &dyn OrderConfirmation, payment: PaymentMethod) -> Result<OrderDraft> {
        let _guard = self.flight.begin()?;
        // Held so no cart update slips in between the check and PAYMENT_PENDING.
        let draft = {
            let _carts = locked(carts)?;
            let current = self.state();
            if !current.can_confirm() {
                return Err(StorefrontError::InvalidTransition { from: current, action: "confirm" });
            }
            let draft = self.drafts.consume()?;
            self.advance(Transition::PaymentStarted)?;
            draft
        };
        let checkout_id = draft.checkout_id().to_string();
        let request = ConfirmationRequest::new(&draft, payment);

        self.raise_event(CheckoutEvent::PaymentPending { checkout_id: checkout_id.clone() });
        // An abandoned future must not strand the state at PAYMENT_PENDING.
        let pending = PendingReset { flow: self, armed: true };
        let outcome = confirmer.confirm(&request).await;
        pending.disarm();

        if let Err(e) = outcome {
            error!(%checkout_id, error = %e, "order confirmation failed, draft kept for retry");
            self.advance(Transition::Failed)?;
            self.raise_event(CheckoutEvent::Failed { checkout_id, reason: e.to_string() });
            return Err(match e {
                StorefrontError::ConfirmationFailed(_) => e,
                other => StorefrontError::ConfirmationFailed(other.to_string()),
            });
        }

        self.advance(Transition::Confirmed)?;
        self.raise_event(CheckoutEvent::Confirmed { checkout_id: checkout_id.clone() });
        info!(%checkout_id, "order confirmed");
        {
            let mut carts = locked(carts)?;
            carts.clear()?;
            self.advance(cart_transition(carts.cart()))?;
        }
        if let Err(e) = self.drafts.discard() {
            warn!(%checkout_id, error = %e, "confirmed draft could not be discarded");
        }
        Ok(draft)
    }

    fn advance(&self, transition: Transition) -> Result<CheckoutState> {
        let mut state = locked(&self.state)?;
        *state = state.next(transition)?;
        Ok(*state)
    }

    fn raise_event(&self, e: CheckoutEvent) {
        if let Ok(mut events) = self.events.lock() { events.push(DomainEvent::Checkout(e)); }
    }
}

/// Moves `PAYMENT_PENDING` to `FAILED` if dropped while armed.
struct PendingReset<'a> { flow: &'a CheckoutFlow, armed: bool }

impl PendingReset<'_> {
    fn disarm(mut self) { self.armed = false; }
}

impl Drop for PendingReset<'_> {
    fn drop(&mut self) {
        if self.armed && self.flow.advance(Transition::Failed).is_ok() {
            warn!("order confirmation abandoned, draft kept for retry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Coupon, Product};
    use crate::domain::value_objects::{CouponCode, Money, ProductId};
    use crate::storage::{KeyValueStore, MemoryStore, CART_KEY, LATEST_ORDER_KEY};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;

    struct Backend { fail: bool, calls: AtomicUsize, gate: Option<Arc<Notify>> }

    impl Backend {
        fn ok() -> Self { Self { fail: false, calls: AtomicUsize::new(0), gate: None } }
        fn failing() -> Self { Self { fail: true, calls: AtomicUsize::new(0), gate: None } }
        fn gated(gate: Arc<Notify>) -> Self { Self { fail: false, calls: AtomicUsize::new(0), gate: Some(gate) } }
    }

    #[async_trait]
    impl OrderConfirmation for Backend {
        async fn confirm(&self, _: &ConfirmationRequest) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate { gate.notified().await; }
            if self.fail { return Err(StorefrontError::ConfirmationFailed("502 Bad Gateway".into())); }
            Ok(())
        }
    }

    struct Session { store: Arc<MemoryStore>, carts: Mutex<CartStore>, flow: CheckoutFlow }

    fn session() -> Session {
        let store = Arc::new(MemoryStore::new());
        let mut carts = CartStore::open(store.clone()).unwrap();
        let rice = Product { product_id: ProductId::new("P1").unwrap(), name: "rice".into(), image_url: None, selling_price: Money::from(200), mrp: Money::from(200) };
        carts.add(&rice).unwrap();
        carts.add(&rice).unwrap();
        carts.apply_coupon(&Coupon::percentage(CouponCode::new("SAVE10").unwrap(), Decimal::new(10, 0), Money::from(100))).unwrap();
        let flow = CheckoutFlow::new(OrderDraftBuilder::new(store.clone()), carts.cart());
        flow.cart_changed(carts.cart()).unwrap();
        Session { store, carts: Mutex::new(carts), flow }
    }

    fn build(s: &Session) -> OrderDraft {
        let carts = s.carts.lock().unwrap();
        s.flow.begin_checkout(carts.cart(), Some("a@b.in".into())).unwrap()
    }

    #[tokio::test]
    async fn test_confirmed_order_clears_cart_and_draft() {
        let s = session();
        assert_eq!(s.flow.state(), CheckoutState::CouponEvaluated);
        let draft = build(&s);
        assert_eq!(draft.final_amount(), Money::from(360));
        assert_eq!(s.flow.state(), CheckoutState::DraftBuilt);

        let confirmed = s.flow.confirm(&s.carts, &Backend::ok(), PaymentMethod::Cod).await.unwrap();
        assert_eq!(confirmed.checkout_id(), draft.checkout_id());
        assert_eq!(s.flow.state(), CheckoutState::EmptyCart);
        assert!(s.carts.lock().unwrap().list().is_empty());
        assert_eq!(s.store.get(CART_KEY).unwrap(), None);
        assert_eq!(s.store.get(LATEST_ORDER_KEY).unwrap(), None);
        let events = s.flow.take_events();
        assert!(events.iter().any(|e| matches!(e, DomainEvent::Checkout(CheckoutEvent::Confirmed { .. }))));
    }

    #[tokio::test]
    async fn test_failed_confirmation_keeps_everything_for_retry() {
        let s = session();
        let draft = build(&s);
        let backend = Backend::failing();
        let err = s.flow.confirm(&s.carts, &backend, PaymentMethod::Cod).await.unwrap_err();
        assert!(matches!(err, StorefrontError::ConfirmationFailed(_)));
        assert_eq!(s.flow.state(), CheckoutState::Failed);
        assert_eq!(s.carts.lock().unwrap().list().len(), 1);
        assert_eq!(s.carts.lock().unwrap().discount(), Money::from(40));
        assert_eq!(s.flow.drafts().consume().unwrap(), draft);

        s.flow.confirm(&s.carts, &Backend::ok(), PaymentMethod::Online { payment_id: "pay_1".into() }).await.unwrap();
        assert_eq!(s.flow.state(), CheckoutState::EmptyCart);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_confirm_without_draft_is_rejected() {
        let s = session();
        let err = s.flow.confirm(&s.carts, &Backend::ok(), PaymentMethod::Cod).await.unwrap_err();
        assert!(matches!(err, StorefrontError::InvalidTransition { from: CheckoutState::CouponEvaluated, .. }));
    }

    #[tokio::test]
    async fn test_cart_change_after_draft_requires_new_draft() {
        let s = session();
        build(&s);
        {
            let mut carts = s.carts.lock().unwrap();
            s.flow.update_cart(&mut carts, |c| c.remove(&ProductId::new("P1").unwrap())).unwrap();
        }
        assert!(s.flow.confirm(&s.carts, &Backend::ok(), PaymentMethod::Cod).await.is_err());
        let draft = build(&s);
        assert_eq!(draft.subtotal(), Money::from(200));
        assert_eq!(draft.discount_amount(), Money::from(20));
    }

    #[tokio::test]
    async fn test_duplicate_confirmation_rejected_while_in_flight() {
        let s = session();
        build(&s);
        let gate = Arc::new(Notify::new());
        let backend = Backend::gated(gate.clone());
        let first = s.flow.confirm(&s.carts, &backend, PaymentMethod::Cod);
        tokio::pin!(first);
        tokio::select! {
            biased;
            _ = &mut first => panic!("confirmation finished before the gate opened"),
            _ = tokio::task::yield_now() => {}
        }
        assert_eq!(s.flow.state(), CheckoutState::PaymentPending);
        let second = s.flow.confirm(&s.carts, &Backend::ok(), PaymentMethod::Cod).await;
        assert!(matches!(second, Err(StorefrontError::RequestInFlight(_))));
        {
            let carts = s.carts.lock().unwrap();
            assert!(matches!(s.flow.begin_checkout(carts.cart(), None), Err(StorefrontError::InvalidTransition { .. })));
        }
        gate.notify_one();
        first.await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abandoned_confirmation_allows_retry() {
        let s = session();
        build(&s);
        let gate = Arc::new(Notify::new());
        let backend = Backend::gated(gate);
        let abandoned = tokio::time::timeout(Duration::from_millis(10), s.flow.confirm(&s.carts, &backend, PaymentMethod::Cod)).await;
        assert!(abandoned.is_err());
        assert_eq!(s.flow.state(), CheckoutState::Failed);
        assert_eq!(s.carts.lock().unwrap().list().len(), 1);
        s.flow.confirm(&s.carts, &Backend::ok(), PaymentMethod::Cod).await.unwrap();
    }

    #[test]
    fn test_resumes_persisted_draft() {
        let s = session();
        build(&s);
        let carts = s.carts.lock().unwrap();
        let resumed = CheckoutFlow::new(OrderDraftBuilder::new(s.store.clone()), carts.cart());
        assert_eq!(resumed.state(), CheckoutState::DraftBuilt);
    }

    #[tokio::test]
    async fn test_unchanged_cart_keeps_draft_and_retry() {
        let s = session();
        build(&s);
        let absent = ProductId::new("NOPE").unwrap();
        {
            let mut carts = s.carts.lock().unwrap();
            assert!(!s.flow.update_cart(&mut carts, |c| c.remove(&absent)).unwrap());
            let big = Coupon::fixed(CouponCode::new("BIG").unwrap(), Decimal::new(10, 0), Money::from(10_000));
            assert!(matches!(s.flow.update_cart(&mut carts, |c| c.apply_coupon(&big)), Err(StorefrontError::CouponIneligible { .. })));
        }
        assert_eq!(s.flow.state(), CheckoutState::DraftBuilt);

        assert!(s.flow.confirm(&s.carts, &Backend::failing(), PaymentMethod::Cod).await.is_err());
        {
            let mut carts = s.carts.lock().unwrap();
            assert!(!s.flow.update_cart(&mut carts, |c| c.set_quantity(&absent, 3)).unwrap());
        }
        assert_eq!(s.flow.state(), CheckoutState::Failed);
        s.flow.confirm(&s.carts, &Backend::ok(), PaymentMethod::Cod).await.unwrap();
        assert_eq!(s.flow.state(), CheckoutState::EmptyCart);
    }

    #[tokio::test]
    async fn test_cart_frozen_while_payment_pending() {
        let s = session();
        let draft = build(&s);
        let gate = Arc::new(Notify::new());
        let backend = Backend::gated(gate.clone());
        let pending = s.flow.confirm(&s.carts, &backend, PaymentMethod::Cod);
        tokio::pin!(pending);
        tokio::select! {
            biased;
            _ = &mut pending => panic!("confirmation finished before the gate opened"),
            _ = tokio::task::yield_now() => {}
        }
        let stored = s.store.get(CART_KEY).unwrap();
        {
            let mut carts = s.carts.lock().unwrap();
            let salt = Product { product_id: ProductId::new("P2").unwrap(), name: "salt".into(), image_url: None, selling_price: Money::from(20), mrp: Money::from(20) };
            let err = s.flow.update_cart(&mut carts, |c| c.add(&salt)).unwrap_err();
            assert!(matches!(err, StorefrontError::InvalidTransition { from: CheckoutState::PaymentPending, .. }));
            assert_eq!(carts.list().len(), 1);
            assert_eq!(carts.subtotal(), draft.subtotal());
        }
        assert_eq!(s.store.get(CART_KEY).unwrap(), stored);
        assert_eq!(s.flow.state(), CheckoutState::PaymentPending);

        gate.notify_one();
        pending.await.unwrap();
        assert_eq!(s.flow.state(), CheckoutState::EmptyCart);
    }
}
