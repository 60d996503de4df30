use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::error;
use crate::domain::aggregates::{DraftItem, OrderDraft};
use crate::domain::value_objects::Money;
use crate::{Result, StorefrontError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "payment_method", rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Cash on delivery; nothing collected yet.
    Cod,
    /// Paid through a gateway; `payment_id` is the gateway's transaction id.
    Online { payment_id: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConfirmationItem {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub price: Money,
    pub mrp: Money,
    pub image: Option<String>,
    pub subtotal: Money,
}

impl From<&DraftItem> for ConfirmationItem {
    fn from(i: &DraftItem) -> Self {
        Self { product_id: i.product_id.clone(), name: i.name.clone(), quantity: i.quantity, price: i.selling_price, mrp: i.mrp, image: i.image.clone(), subtotal: i.line_total() }
    }
}

/// Body of `POST /orders/order-confirm`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConfirmationRequest {
    pub order_id: String,
    pub customer_email: Option<String>,
    #[serde(flatten)]
    pub payment: PaymentMethod,
    pub payment_status: &'static str,
    pub payment_amount: Money,
    pub order_items: Vec<ConfirmationItem>,
    /// Before discount.
    pub total_amount: Money,
    pub coupon_code: Option<String>,
    pub discount_amount: Money,
    pub final_amount: Money,
    pub status: &'static str,
    pub created_at: DateTime<Utc>,
}

impl ConfirmationRequest {
    pub fn new(draft: &OrderDraft, payment: PaymentMethod) -> Self {
        let payment_status = match payment { PaymentMethod::Cod => "pending", PaymentMethod::Online { .. } => "success" };
        Self {
            order_id: draft.checkout_id().to_string(),
            customer_email: draft.customer().map(str::to_string),
            payment,
            payment_status,
            payment_amount: draft.final_amount(),
            order_items: draft.items().iter().map(ConfirmationItem::from).collect(),
            total_amount: draft.subtotal(),
            coupon_code: draft.coupon_code().map(str::to_string),
            discount_amount: draft.discount_amount(),
            final_amount: draft.final_amount(),
            status: "pending",
            created_at: Utc::now(),
        }
    }
}

/// The backend's order-confirmation call.
#[async_trait]
pub trait OrderConfirmation: Send + Sync {
    async fn confirm(&self, request: &ConfirmationRequest) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct HttpOrderConfirmation {
    client: Client,
    url: String,
}

impl HttpOrderConfirmation {
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| StorefrontError::ConfirmationFailed(e.to_string()))?;
        Ok(Self { client, url: format!("{}/orders/order-confirm", api_url.trim_end_matches('/')) })
    }
}

#[async_trait]
impl OrderConfirmation for HttpOrderConfirmation {
    async fn confirm(&self, request: &ConfirmationRequest) -> Result<()> {
        self.client.post(&self.url).json(request).send().await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                error!("Order confirmation for {} failed: {}", request.order_id, e);
                StorefrontError::ConfirmationFailed(e.to_string())
            })?;
        Ok(())
    }
}
