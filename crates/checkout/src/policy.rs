//! Checkout policies.

use chrono::Duration;
use domain::cart::DEFAULT_CART_TTL_DAYS;
use domain::order::DEFAULT_RETURN_WINDOW_DAYS;
use domain::product::DEFAULT_LOW_STOCK_THRESHOLD;
use domain::{DEFAULT_RETRY_ATTEMPTS, PricingPolicy};

/// When a coupon redemption stops counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CouponUsagePolicy {
    /// Every checkout that got as far as placing the order counts, even if the
    /// order is later cancelled or fails.
    #[default]
    CountAttempts,
    /// Only orders that go through count; cancellation, failure and refunds
    /// hand the usage back.
    CountCompleted,
}

impl CouponUsagePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponUsagePolicy::CountAttempts => "count_attempts",
            CouponUsagePolicy::CountCompleted => "count_completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "count_attempts" => Some(CouponUsagePolicy::CountAttempts),
            "count_completed" => Some(CouponUsagePolicy::CountCompleted),
            _ => None,
        }
    }

    pub fn reverts_on_failure(&self) -> bool {
        *self == CouponUsagePolicy::CountCompleted
    }
}

/// Settings the order lifecycle needs at checkout time.
#[derive(Debug, Clone)]
pub struct CheckoutPolicy {
    pub pricing: PricingPolicy,
    pub coupon_usage: CouponUsagePolicy,
    /// Currency passed to the payment gateway.
    pub currency: String,
}

impl Default for CheckoutPolicy {
    fn default() -> Self {
        Self {
            pricing: PricingPolicy::default(),
            coupon_usage: CouponUsagePolicy::default(),
            currency: "usd".to_string(),
        }
    }
}

/// Tunables for the aggregate services.
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub retry_attempts: u32,
    pub low_stock_threshold: u32,
    pub cart_ttl: Duration,
    pub return_window_days: i64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            cart_ttl: Duration::days(DEFAULT_CART_TTL_DAYS),
            return_window_days: DEFAULT_RETURN_WINDOW_DAYS,
        }
    }
}
