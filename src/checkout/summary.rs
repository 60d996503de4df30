use rust_decimal::Decimal;
use serde::Serialize;
use crate::domain::aggregates::OrderDraft;
use crate::domain::value_objects::Money;

/// Amounts shown on the payment step: the draft's amount due plus a tax estimate.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaymentSummary {
    pub subtotal: Money,
    pub discount_amount: Money,
    pub tax: Money,
    pub total: Money,
}

impl PaymentSummary {
    /// `tax_rate` is a fraction, 0.05 for 5%.
    pub fn from_draft(draft: &OrderDraft, tax_rate: Decimal) -> Self {
        let subtotal = draft.final_amount();
        let tax = subtotal.times(tax_rate).round();
        Self { subtotal, discount_amount: draft.discount_amount(), tax, total: subtotal + tax }
    }
}
