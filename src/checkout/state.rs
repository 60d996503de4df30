use serde::Serialize;
use std::fmt;
use crate::{Result, StorefrontError};

/// Client-side life of a checkout.
///
/// ```text
/// EmptyCart -> ItemsPresent -> CouponEvaluated? -> DraftBuilt -> PaymentPending -> Confirmed -> EmptyCart
///                                                      ^                |
///                                                      +---- Failed <---+
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutState {
    #[default]
    EmptyCart,
    ItemsPresent,
    CouponEvaluated,
    DraftBuilt,
    PaymentPending,
    Confirmed,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    CartChanged { is_empty: bool, has_coupon: bool },
    DraftBuilt,
    PaymentStarted,
    Confirmed,
    Failed,
}

impl Transition {
    fn action(&self) -> &'static str {
        match self {
            Self::CartChanged { .. } => "change the cart",
            Self::DraftBuilt => "build a draft",
            Self::PaymentStarted => "start payment",
            Self::Confirmed => "confirm",
            Self::Failed => "fail payment",
        }
    }
}

impl CheckoutState {
    pub fn next(self, transition: Transition) -> Result<Self> {
        use CheckoutState::*;
        let next = match (self, transition) {
            (PaymentPending, Transition::CartChanged { .. }) => None,
            (_, Transition::CartChanged { is_empty: true, .. }) => Some(EmptyCart),
            (_, Transition::CartChanged { has_coupon: true, .. }) => Some(CouponEvaluated),
            (_, Transition::CartChanged { .. }) => Some(ItemsPresent),
            (ItemsPresent | CouponEvaluated | DraftBuilt | Failed, Transition::DraftBuilt) => Some(DraftBuilt),
            (DraftBuilt | Failed, Transition::PaymentStarted) => Some(PaymentPending),
            (PaymentPending, Transition::Confirmed) => Some(Confirmed),
            (PaymentPending, Transition::Failed) => Some(Failed),
            _ => None,
        };
        next.ok_or(StorefrontError::InvalidTransition { from: self, action: transition.action() })
    }

    /// A draft exists and may be sent for confirmation.
    pub fn can_confirm(&self) -> bool { matches!(self, Self::DraftBuilt | Self::Failed) }
}

impl fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EmptyCart => "EMPTY_CART",
            Self::ItemsPresent => "ITEMS_PRESENT",
            Self::CouponEvaluated => "COUPON_EVALUATED",
            Self::DraftBuilt => "DRAFT_BUILT",
            Self::PaymentPending => "PAYMENT_PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}
