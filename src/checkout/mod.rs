//! Checkout: order drafts, the checkout state machine and order confirmation.

mod confirmation;
mod draft;
mod flow;
mod state;
mod summary;

pub use confirmation::{ConfirmationItem, ConfirmationRequest, HttpOrderConfirmation, OrderConfirmation, PaymentMethod};
pub use draft::OrderDraftBuilder;
pub use flow::CheckoutFlow;
pub use state::{CheckoutState, Transition};
pub use summary::PaymentSummary;
