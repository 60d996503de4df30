//! Storefront cart core
//!
//! Client-side cart, coupon discount and checkout-draft flow of a grocery
//! storefront, over a remote JSON API.
//!
//! ## Features
//! - Cart with durable local persistence
//! - Coupon catalog with percentage and fixed discounts
//! - Automatic coupon revocation when the cart no longer qualifies
//! - Order draft snapshot handed to the checkout step
//! - Checkout state machine with single-flight order confirmation

use thiserror::Error;

pub mod cart_store;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod discount;
pub mod domain;
pub mod inflight;
pub mod storage;

pub use cart_store::CartStore;
pub use catalog::{CouponCatalog, CouponSource, HttpCouponSource};
pub use checkout::{CheckoutFlow, CheckoutState, OrderConfirmation, OrderDraftBuilder, PaymentSummary};
pub use config::Config;
pub use domain::aggregates::{AppliedCoupon, Cart, Coupon, DiscountType, LineItem, OrderDraft, Product};
pub use domain::value_objects::{CouponCode, Money, ProductId, Quantity};
pub use storage::{FileStore, KeyValueStore, MemoryStore};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("Coupon catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Invalid coupon code: {0}")]
    InvalidCouponCode(String),

    #[error("Minimum order of {min_order_value} required for coupon {code}")]
    CouponIneligible { code: String, min_order_value: Money },

    #[error("Cart is empty")]
    EmptyCart,

    #[error("A {0} request is already in flight")]
    RequestInFlight(&'static str),

    #[error("No order draft")]
    NoDraft,

    #[error("Order confirmation failed: {0}")]
    ConfirmationFailed(String),

    #[error("Cannot {action} while checkout is {from}")]
    InvalidTransition { from: CheckoutState, action: &'static str },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
