//! Coupon catalog: the read-only list of coupons offered to the cart.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};
use validator::{Validate, ValidationError};
use crate::discount;
use crate::domain::aggregates::{Coupon, DiscountType, ValidityWindow};
use crate::domain::value_objects::{CouponCode, Money};
use crate::inflight::InFlight;
use crate::{Result, StorefrontError};

/// One element of `GET /coupons`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "percentage_in_range"))]
pub struct CouponRecord {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    pub discount_type: String,
    #[validate(custom = "non_negative")]
    pub discount_value: Money,
    #[serde(default)]
    #[validate(custom = "non_negative")]
    pub min_order_value: Option<Money>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

fn active_by_default() -> bool { true }

fn non_negative(value: &Money) -> std::result::Result<(), ValidationError> {
    if value.is_negative() { return Err(ValidationError::new("non_negative")); }
    Ok(())
}

fn percentage_in_range(record: &CouponRecord) -> std::result::Result<(), ValidationError> {
    if DiscountType::parse(&record.discount_type) == Some(DiscountType::Percentage) && record.discount_value > Money::from(100) {
        return Err(ValidationError::new("percentage_above_100"));
    }
    Ok(())
}

/// Accepts `2025-01-31` as well as a full timestamp; only the date part counts.
fn parse_day(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?.trim();
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

impl CouponRecord {
    /// `None` for records the cart cannot price: invalid values or an
    /// unsupported discount type such as free shipping.
    pub fn into_coupon(self) -> Option<Coupon> {
        if let Err(e) = self.validate() {
            warn!(code = %self.code, error = %e, "skipping invalid coupon");
            return None;
        }
        let Some(discount_type) = DiscountType::parse(&self.discount_type) else {
            debug!(code = %self.code, discount_type = %self.discount_type, "skipping unsupported coupon type");
            return None;
        };
        let code = match CouponCode::new(&self.code) {
            Ok(code) => code,
            Err(e) => { warn!(code = %self.code, error = %e, "skipping coupon with unusable code"); return None; }
        };
        let starts_on = parse_day(self.start_date.as_deref());
        let ends_on = parse_day(self.end_date.as_deref());
        Some(Coupon {
            code,
            description: self.description,
            discount_type,
            discount_value: self.discount_value.amount(),
            min_order_value: self.min_order_value.unwrap_or(Money::ZERO),
            validity: (starts_on.is_some() || ends_on.is_some()).then_some(ValidityWindow { starts_on, ends_on }),
            is_active: self.is_active,
        })
    }
}

#[async_trait]
pub trait CouponSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<CouponRecord>>;
}

/// Fetches `GET {api_url}/coupons`.
#[derive(Debug, Clone)]
pub struct HttpCouponSource {
    client: Client,
    url: String,
}

impl HttpCouponSource {
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| StorefrontError::CatalogUnavailable(e.to_string()))?;
        Ok(Self { client, url: format!("{}/coupons", api_url.trim_end_matches('/')) })
    }
}

#[async_trait]
impl CouponSource for HttpCouponSource {
    async fn fetch(&self) -> Result<Vec<CouponRecord>> {
        let response = self.client.get(&self.url).send().await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                warn!("Failed to fetch coupons from {}: {}", self.url, e);
                StorefrontError::CatalogUnavailable(e.to_string())
            })?;
        response.json().await.map_err(|e| StorefrontError::CatalogUnavailable(e.to_string()))
    }
}

/// Coupons currently offered, cached from the last successful fetch.
///
/// A failed or abandoned fetch leaves the cache as it was. Only one fetch runs
/// at a time.
pub struct CouponCatalog {
    source: Arc<dyn CouponSource>,
    flight: InFlight,
    available: RwLock<Vec<Coupon>>,
}

impl std::fmt::Debug for CouponCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CouponCatalog").field("in_flight", &self.flight.is_busy()).finish_non_exhaustive()
    }
}

impl CouponCatalog {
    pub fn new(source: Arc<dyn CouponSource>) -> Self {
        Self { source, flight: InFlight::new("coupon fetch"), available: RwLock::new(Vec::new()) }
    }

    pub async fn fetch_available(&self) -> Result<Vec<Coupon>> {
        self.fetch_available_on(Utc::now().date_naive()).await
    }

    /// Fetches and keeps the active coupons whose validity window contains `day`,
    /// in catalog order.
    pub async fn fetch_available_on(&self, day: NaiveDate) -> Result<Vec<Coupon>> {
        let _guard = self.flight.begin()?;
        let records = self.source.fetch().await?;
        let total = records.len();
        let coupons: Vec<Coupon> = records.into_iter()
            .filter_map(CouponRecord::into_coupon)
            .filter(|c| c.is_available_on(day))
            .collect();
        debug!(total, available = coupons.len(), "coupon catalog refreshed");
        *self.available.write().map_err(|_| StorefrontError::Storage("coupon cache lock poisoned".into()))? = coupons.clone();
        Ok(coupons)
    }

    /// The cached list, fetching first when nothing is cached yet. A fetch
    /// already in flight is waited for rather than rejected.
    pub async fn load(&self) -> Result<Vec<Coupon>> {
        self.load_on(Utc::now().date_naive()).await
    }

    pub async fn load_on(&self, day: NaiveDate) -> Result<Vec<Coupon>> {
        loop {
            let cached = self.cached();
            if !cached.is_empty() { return Ok(cached); }
            match self.fetch_available_on(day).await {
                Err(StorefrontError::RequestInFlight(_)) => self.flight.idle().await,
                other => return other,
            }
        }
    }

    /// Coupons from the last successful fetch.
    pub fn cached(&self) -> Vec<Coupon> {
        self.available.read().map(|c| c.clone()).unwrap_or_default()
    }

    /// Case-insensitive lookup in the cached list; first match in catalog order.
    pub fn find(&self, code: &str) -> Result<Coupon> {
        let available = self.available.read().map_err(|_| StorefrontError::Storage("coupon cache lock poisoned".into()))?;
        discount::find_coupon(&available, code).cloned().ok_or_else(|| StorefrontError::InvalidCouponCode(code.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use tokio::sync::Notify;

    struct StaticCoupons(serde_json::Value);

    #[async_trait]
    impl CouponSource for StaticCoupons {
        async fn fetch(&self) -> Result<Vec<CouponRecord>> { Ok(serde_json::from_value(self.0.clone())?) }
    }

    struct Unreachable;

    #[async_trait]
    impl CouponSource for Unreachable {
        async fn fetch(&self) -> Result<Vec<CouponRecord>> { Err(StorefrontError::CatalogUnavailable("connection refused".into())) }
    }

    struct Gated { gate: Arc<Notify>, inner: StaticCoupons }

    #[async_trait]
    impl CouponSource for Gated {
        async fn fetch(&self) -> Result<Vec<CouponRecord>> {
            self.gate.notified().await;
            self.inner.fetch().await
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

    fn payload() -> serde_json::Value {
        serde_json::json!([
            { "code": "SAVE10", "description": "10% off", "discount_type": "percentage", "discount_value": "10.00", "min_order_value": "100.00", "start_date": "2026-01-01", "end_date": "2026-12-31T23:59:59.000Z", "is_active": true },
            { "code": "FLAT50", "discount_type": "fixed", "discount_value": 50, "min_order_value": 0, "is_active": true },
            { "code": "SHIPFREE", "discount_type": "shipping", "discount_value": 0, "is_active": true },
            { "code": "OLD", "discount_type": "fixed", "discount_value": 20, "end_date": "2025-01-01", "is_active": true },
            { "code": "OFF", "discount_type": "fixed", "discount_value": 20, "is_active": false },
            { "code": "HUGE", "discount_type": "percentage", "discount_value": 150, "is_active": true },
            { "code": "NEG", "discount_type": "fixed", "discount_value": -5, "is_active": true },
            { "code": "save10", "discount_type": "fixed", "discount_value": 999, "is_active": true }
        ])
    }

    #[tokio::test]
    async fn test_fetch_filters_unusable_coupons() {
        let catalog = CouponCatalog::new(Arc::new(StaticCoupons(payload())));
        let coupons = catalog.fetch_available_on(day(2026, 6, 1)).await.unwrap();
        let codes: Vec<&str> = coupons.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["SAVE10", "FLAT50", "save10"]);
        assert_eq!(coupons[0].discount_value, Decimal::new(10, 0));
        assert_eq!(coupons[0].min_order_value, Money::from(100));
        assert_eq!(coupons[0].validity.unwrap().ends_on, Some(day(2026, 12, 31)));
    }

    #[tokio::test]
    async fn test_find_is_case_insensitive_first_match() {
        let catalog = CouponCatalog::new(Arc::new(StaticCoupons(payload())));
        catalog.fetch_available_on(day(2026, 6, 1)).await.unwrap();
        let coupon = catalog.find("Save10").unwrap();
        assert_eq!(coupon.discount_type, DiscountType::Percentage);
        assert!(matches!(catalog.find("NOPE"), Err(StorefrontError::InvalidCouponCode(code)) if code == "NOPE"));
    }

    #[tokio::test]
    async fn test_unavailable_catalog_keeps_cache() {
        let catalog = CouponCatalog::new(Arc::new(Unreachable));
        assert!(matches!(catalog.fetch_available().await, Err(StorefrontError::CatalogUnavailable(_))));
        assert!(catalog.cached().is_empty());
        assert!(matches!(catalog.find("SAVE10"), Err(StorefrontError::InvalidCouponCode(_))));
    }

    #[tokio::test]
    async fn test_concurrent_fetch_rejected() {
        let gate = Arc::new(Notify::new());
        let catalog = CouponCatalog::new(Arc::new(Gated { gate: gate.clone(), inner: StaticCoupons(payload()) }));
        let first = catalog.fetch_available_on(day(2026, 6, 1));
        tokio::pin!(first);
        tokio::select! {
            biased;
            _ = &mut first => panic!("fetch finished before the gate opened"),
            _ = tokio::task::yield_now() => {}
        }
        assert!(matches!(catalog.fetch_available_on(day(2026, 6, 1)).await, Err(StorefrontError::RequestInFlight(_))));
        gate.notify_one();
        assert_eq!(first.await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_abandoned_fetch_releases_trigger() {
        let gate = Arc::new(Notify::new());
        let catalog = CouponCatalog::new(Arc::new(Gated { gate: gate.clone(), inner: StaticCoupons(payload()) }));
        let abandoned = tokio::time::timeout(Duration::from_millis(10), catalog.fetch_available_on(day(2026, 6, 1))).await;
        assert!(abandoned.is_err());
        assert!(catalog.cached().is_empty());
        gate.notify_one();
        assert_eq!(catalog.fetch_available_on(day(2026, 6, 1)).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_load_waits_for_fetch_in_flight() {
        let gate = Arc::new(Notify::new());
        let catalog = CouponCatalog::new(Arc::new(Gated { gate: gate.clone(), inner: StaticCoupons(payload()) }));
        let prefetch = catalog.fetch_available_on(day(2026, 6, 1));
        tokio::pin!(prefetch);
        tokio::select! {
            biased;
            _ = &mut prefetch => panic!("fetch finished before the gate opened"),
            _ = tokio::task::yield_now() => {}
        }
        let load = catalog.load_on(day(2026, 6, 1));
        tokio::pin!(load);
        tokio::select! {
            biased;
            _ = &mut load => panic!("load resolved while the fetch was pending"),
            _ = tokio::task::yield_now() => {}
        }
        gate.notify_one();
        assert_eq!(prefetch.await.unwrap().len(), 3);
        let loaded = load.await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(catalog.find("flat50").is_ok());
    }

    #[tokio::test]
    async fn test_non_ascii_code_within_limit_is_kept() {
        let code = "é".repeat(40);
        let records: Vec<CouponRecord> = serde_json::from_value(serde_json::json!([
            { "code": code, "discount_type": "fixed", "discount_value": 10 }
        ])).unwrap();
        let coupon = records.into_iter().next().unwrap().into_coupon().unwrap();
        assert_eq!(coupon.code.as_str(), code);
    }
}
