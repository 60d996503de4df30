//! Storefront cart - single-session cart, coupon and checkout service

use anyhow::Result;
use axum::{extract::{Path, State}, http::StatusCode, routing::{delete, get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use storefront_cart::cart_store::{price_in_range, CartSummary};
use storefront_cart::checkout::{HttpOrderConfirmation, PaymentMethod};
use storefront_cart::domain::events::{CartEvent, DomainEvent};
use storefront_cart::{
    CartStore, CheckoutFlow, CheckoutState, Config, Coupon, CouponCatalog, FileStore, HttpCouponSource, KeyValueStore,
    Money, OrderConfirmation, OrderDraft, OrderDraftBuilder, PaymentSummary, Product, ProductId, StorefrontError,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use validator::Validate;

#[derive(Clone)]
pub struct AppState {
    carts: Arc<Mutex<CartStore>>,
    catalog: Arc<CouponCatalog>,
    flow: Arc<CheckoutFlow>,
    confirmer: Arc<dyn OrderConfirmation>,
    tax_rate: rust_decimal::Decimal,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&config.store_dir)?);
    let carts = CartStore::open(store.clone())?;
    let flow = CheckoutFlow::new(OrderDraftBuilder::new(store.clone()), carts.cart());
    let catalog = Arc::new(CouponCatalog::new(Arc::new(HttpCouponSource::new(&config.api_url, config.catalog_timeout)?)));
    let confirmer = Arc::new(HttpOrderConfirmation::new(&config.api_url, config.catalog_timeout)?);

    let prefetch = catalog.clone();
    tokio::spawn(async move {
        if let Err(e) = prefetch.fetch_available().await {
            tracing::warn!("Coupons unavailable, checkout continues without them: {}", e);
        }
    });

    let state = AppState { carts: Arc::new(Mutex::new(carts)), catalog, flow: Arc::new(flow), confirmer, tax_rate: config.tax_rate };
    let app = Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront-cart"})) }))
        .route("/cart", get(get_cart))
        .route("/cart/items", post(add_item))
        .route("/cart/items/:id", delete(decrement_item).put(set_quantity))
        .route("/cart/items/:id/increment", post(increment_item))
        .route("/cart/items/:id/line", delete(remove_line))
        .route("/cart/coupon", post(apply_coupon).delete(remove_coupon))
        .route("/coupons", get(list_coupons))
        .route("/checkout", post(begin_checkout))
        .route("/checkout/draft", get(get_draft))
        .route("/checkout/confirm", post(confirm_order))
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state);

    tracing::info!("Storefront cart listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}

type ApiResult<T> = std::result::Result<Json<T>, (StatusCode, String)>;

fn fail(e: StorefrontError) -> (StatusCode, String) {
    let status = match &e {
        StorefrontError::InvalidCouponCode(_) | StorefrontError::CouponIneligible { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        StorefrontError::EmptyCart | StorefrontError::RequestInFlight(_) | StorefrontError::InvalidTransition { .. } => StatusCode::CONFLICT,
        StorefrontError::NoDraft => StatusCode::NOT_FOUND,
        StorefrontError::CatalogUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StorefrontError::ConfirmationFailed(_) => StatusCode::BAD_GATEWAY,
        StorefrontError::Storage(_) | StorefrontError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

fn lock(s: &AppState) -> std::result::Result<MutexGuard<'_, CartStore>, (StatusCode, String)> {
    s.carts.lock().map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "cart lock poisoned".to_string()))
}

fn product_id(raw: &str) -> std::result::Result<ProductId, (StatusCode, String)> {
    ProductId::new(raw).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

#[derive(Debug, Serialize)] pub struct CartResponse { cart: CartSummary, checkout_state: CheckoutState, notices: Vec<String> }

/// Cart view plus notices for the cart events raised since the last response.
fn respond(s: &AppState, carts: &mut CartStore) -> ApiResult<CartResponse> {
    let checkout_state = s.flow.state();
    let notices = carts.take_events().into_iter().filter_map(|e| match e {
        DomainEvent::Cart(CartEvent::CouponRevoked { code, min_order_value, .. }) => Some(format!("Coupon {code} removed: minimum order of {min_order_value} required")),
        _ => None,
    }).collect();
    Ok(Json(CartResponse { cart: carts.summary(), checkout_state, notices }))
}

async fn get_cart(State(s): State<AppState>) -> ApiResult<CartResponse> {
    let mut carts = lock(&s)?;
    respond(&s, &mut carts)
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    #[validate(length(min = 1, max = 128))]
    pub product_id: String,
    #[validate(length(min = 1))]
    pub product_name: String,
    pub image_url: Option<String>,
    #[validate(custom = "price_in_range")]
    pub selling_price: Money,
    #[validate(custom = "price_in_range")]
    pub mrp: Option<Money>,
}

async fn add_item(State(s): State<AppState>, Json(r): Json<AddItemRequest>) -> ApiResult<CartResponse> {
    r.validate().map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let product = Product { product_id: product_id(&r.product_id)?, name: r.product_name, image_url: r.image_url, selling_price: r.selling_price, mrp: r.mrp.unwrap_or(r.selling_price) };
    let mut carts = lock(&s)?;
    s.flow.update_cart(&mut carts, |c| c.add(&product)).map_err(fail)?;
    respond(&s, &mut carts)
}

async fn increment_item(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<CartResponse> {
    let id = product_id(&id)?;
    let mut carts = lock(&s)?;
    s.flow.update_cart(&mut carts, |c| c.increment(&id)).map_err(fail)?;
    respond(&s, &mut carts)
}

async fn decrement_item(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<CartResponse> {
    let id = product_id(&id)?;
    let mut carts = lock(&s)?;
    s.flow.update_cart(&mut carts, |c| c.remove(&id)).map_err(fail)?;
    respond(&s, &mut carts)
}

async fn remove_line(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<CartResponse> {
    let id = product_id(&id)?;
    let mut carts = lock(&s)?;
    s.flow.update_cart(&mut carts, |c| c.remove_line(&id)).map_err(fail)?;
    respond(&s, &mut carts)
}

#[derive(Debug, Deserialize)] pub struct SetQuantityRequest { pub quantity: i64 }

async fn set_quantity(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<SetQuantityRequest>) -> ApiResult<CartResponse> {
    let id = product_id(&id)?;
    let mut carts = lock(&s)?;
    s.flow.update_cart(&mut carts, |c| c.set_quantity(&id, r.quantity)).map_err(fail)?;
    respond(&s, &mut carts)
}

#[derive(Debug, Serialize)] pub struct CouponView { code: String, description: Option<String>, label: String, min_order_value: Money }
#[derive(Debug, Serialize)] pub struct CouponsResponse { available: bool, coupons: Vec<CouponView> }

impl From<Coupon> for CouponView {
    fn from(c: Coupon) -> Self { Self { label: c.label(), code: c.code.to_string(), description: c.description, min_order_value: c.min_order_value } }
}

/// An unreachable catalog disables coupons instead of failing the page.
async fn list_coupons(State(s): State<AppState>) -> ApiResult<CouponsResponse> {
    let fetched = match s.catalog.fetch_available().await {
        Err(StorefrontError::RequestInFlight(_)) => s.catalog.load().await,
        other => other,
    };
    match fetched {
        Ok(coupons) => Ok(Json(CouponsResponse { available: true, coupons: coupons.into_iter().map(CouponView::from).collect() })),
        Err(e) => {
            tracing::warn!("Coupon catalog unavailable: {}", e);
            Ok(Json(CouponsResponse { available: false, coupons: vec![] }))
        }
    }
}

#[derive(Debug, Deserialize)] pub struct ApplyCouponRequest { pub code: String }

async fn apply_coupon(State(s): State<AppState>, Json(r): Json<ApplyCouponRequest>) -> ApiResult<CartResponse> {
    s.catalog.load().await.map_err(fail)?;
    let mut carts = lock(&s)?;
    s.flow.update_cart(&mut carts, |c| c.apply_code(&s.catalog, &r.code)).map_err(fail)?;
    respond(&s, &mut carts)
}

async fn remove_coupon(State(s): State<AppState>) -> ApiResult<CartResponse> {
    let mut carts = lock(&s)?;
    s.flow.update_cart(&mut carts, |c| Ok(c.remove_coupon())).map_err(fail)?;
    respond(&s, &mut carts)
}

#[derive(Debug, Default, Deserialize)] pub struct CheckoutRequest { pub customer_email: Option<String> }
#[derive(Debug, Serialize)] pub struct DraftResponse { draft: OrderDraft, payment: PaymentSummary, checkout_state: CheckoutState }

async fn begin_checkout(State(s): State<AppState>, Json(r): Json<CheckoutRequest>) -> ApiResult<DraftResponse> {
    let draft = {
        let carts = lock(&s)?;
        s.flow.begin_checkout(carts.cart(), r.customer_email).map_err(fail)?
    };
    Ok(Json(DraftResponse { payment: PaymentSummary::from_draft(&draft, s.tax_rate), draft, checkout_state: s.flow.state() }))
}

async fn get_draft(State(s): State<AppState>) -> ApiResult<DraftResponse> {
    let draft = s.flow.drafts().consume().map_err(fail)?;
    Ok(Json(DraftResponse { payment: PaymentSummary::from_draft(&draft, s.tax_rate), draft, checkout_state: s.flow.state() }))
}

#[derive(Debug, Deserialize)] pub struct ConfirmRequest { pub payment_id: Option<String> }

async fn confirm_order(State(s): State<AppState>, Json(r): Json<ConfirmRequest>) -> ApiResult<serde_json::Value> {
    let payment = match r.payment_id { Some(payment_id) => PaymentMethod::Online { payment_id }, None => PaymentMethod::Cod };
    let draft = s.flow.confirm(&s.carts, s.confirmer.as_ref(), payment).await.map_err(fail)?;
    Ok(Json(serde_json::json!({"status": "confirmed", "order_id": draft.checkout_id().as_str()})))
}
