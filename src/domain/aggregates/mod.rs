//! Aggregates module
pub mod cart;
pub mod coupon;
pub mod order;

pub use cart::{AppliedCoupon, Cart, LineItem, Product};
pub use coupon::{Coupon, DiscountType, ValidityWindow};
pub use order::{CheckoutId, DraftItem, DraftStatus, OrderDraft};
