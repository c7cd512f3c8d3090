//! Application configuration loaded from environment variables.

use std::str::FromStr;

use checkout::{CheckoutPolicy, CouponUsagePolicy, ServiceSettings};
use chrono::Duration;
use domain::{Money, PricingPolicy, Rate};

/// Log output format for the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(()),
        }
    }
}

/// Server and storefront configuration.
///
/// Every key falls back to its default when unset. A value that fails to
/// parse also falls back, with a warning naming the key.
///
/// | key | default |
/// |---|---|
/// | `HOST` / `PORT` | `0.0.0.0` / `3000` |
/// | `RUST_LOG` / `LOG_FORMAT` | `info` / `text` |
/// | `TAX_RATE` | `0.08` |
/// | `FREE_SHIPPING_THRESHOLD` | `50` |
/// | `DEFAULT_SHIPPING_COST` / `EXPRESS_SHIPPING_COST` | `5.99` / `14.99` |
/// | `LOW_STOCK_THRESHOLD` | `10` |
/// | `ORDER_RETURN_WINDOW` | `30` days |
/// | `STRIPE_CURRENCY` | `usd` |
/// | `CART_TTL_DAYS` | `30` |
/// | `ENABLE_EMAIL` / `ENABLE_SMS` | `false` |
/// | `COUPON_USAGE_POLICY` | `count_attempts` |
/// | `STOCK_RETRY_ATTEMPTS` | `5` |
/// | `PAYMENT_WEBHOOK_SECRET` | `whsec_local` |
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub tax_rate: Rate,
    pub free_shipping_threshold: Money,
    pub default_shipping_cost: Money,
    pub express_shipping_cost: Money,
    pub low_stock_threshold: u32,
    pub return_window_days: i64,
    pub currency: String,
    pub cart_ttl_days: i64,
    pub enable_email: bool,
    pub enable_sms: bool,
    pub coupon_usage: CouponUsagePolicy,
    pub retry_attempts: u32,
    pub webhook_secret: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which returns the raw value for a
    /// key if one is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let reader = Reader { lookup: &lookup };
        Self {
            host: reader.string("HOST", defaults.host),
            port: reader.parsed("PORT", defaults.port, |v| v.parse().ok()),
            log_level: reader.string("RUST_LOG", defaults.log_level),
            log_format: reader.parsed("LOG_FORMAT", defaults.log_format, |v| v.parse().ok()),
            tax_rate: reader.parsed("TAX_RATE", defaults.tax_rate, Rate::parse_fraction),
            free_shipping_threshold: reader.parsed(
                "FREE_SHIPPING_THRESHOLD",
                defaults.free_shipping_threshold,
                Money::parse_decimal,
            ),
            default_shipping_cost: reader.parsed(
                "DEFAULT_SHIPPING_COST",
                defaults.default_shipping_cost,
                Money::parse_decimal,
            ),
            express_shipping_cost: reader.parsed(
                "EXPRESS_SHIPPING_COST",
                defaults.express_shipping_cost,
                Money::parse_decimal,
            ),
            low_stock_threshold: reader.parsed(
                "LOW_STOCK_THRESHOLD",
                defaults.low_stock_threshold,
                |v| v.parse().ok(),
            ),
            return_window_days: reader.parsed(
                "ORDER_RETURN_WINDOW",
                defaults.return_window_days,
                non_negative_days,
            ),
            currency: reader.string("STRIPE_CURRENCY", defaults.currency).to_ascii_lowercase(),
            cart_ttl_days: reader.parsed("CART_TTL_DAYS", defaults.cart_ttl_days, positive_days),
            enable_email: reader.parsed("ENABLE_EMAIL", defaults.enable_email, parse_flag),
            enable_sms: reader.parsed("ENABLE_SMS", defaults.enable_sms, parse_flag),
            coupon_usage: reader.parsed(
                "COUPON_USAGE_POLICY",
                defaults.coupon_usage,
                CouponUsagePolicy::parse,
            ),
            retry_attempts: reader.parsed("STOCK_RETRY_ATTEMPTS", defaults.retry_attempts, |v| {
                v.parse().ok().filter(|n| *n > 0)
            }),
            webhook_secret: reader.string("PAYMENT_WEBHOOK_SECRET", defaults.webhook_secret),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn pricing_policy(&self) -> PricingPolicy {
        PricingPolicy {
            tax_rate: self.tax_rate,
            free_shipping_threshold: self.free_shipping_threshold,
            standard_shipping: self.default_shipping_cost,
            express_shipping: self.express_shipping_cost,
        }
    }

    pub fn checkout_policy(&self) -> CheckoutPolicy {
        CheckoutPolicy {
            pricing: self.pricing_policy(),
            coupon_usage: self.coupon_usage,
            currency: self.currency.clone(),
        }
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            retry_attempts: self.retry_attempts,
            low_stock_threshold: self.low_stock_threshold,
            cart_ttl: Duration::days(self.cart_ttl_days),
            return_window_days: self.return_window_days,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let pricing = PricingPolicy::default();
        let settings = ServiceSettings::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            tax_rate: pricing.tax_rate,
            free_shipping_threshold: pricing.free_shipping_threshold,
            default_shipping_cost: pricing.standard_shipping,
            express_shipping_cost: pricing.express_shipping,
            low_stock_threshold: settings.low_stock_threshold,
            return_window_days: settings.return_window_days,
            currency: "usd".to_string(),
            cart_ttl_days: settings.cart_ttl.num_days(),
            enable_email: false,
            enable_sms: false,
            coupon_usage: CouponUsagePolicy::default(),
            retry_attempts: settings.retry_attempts,
            webhook_secret: "whsec_local".to_string(),
        }
    }
}

struct Reader<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Reader<'_, F> {
    fn string(&self, key: &str, default: String) -> String {
        match (self.lookup)(key) {
            Some(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => default,
        }
    }

    fn parsed<T: std::fmt::Debug>(
        &self,
        key: &str,
        default: T,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> T {
        let Some(raw) = (self.lookup)(key) else {
            return default;
        };
        match parse(raw.trim()) {
            Some(value) => value,
            None => {
                tracing::warn!(key, value = %raw, ?default, "Invalid configuration value, using default");
                default
            }
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_negative_days(value: &str) -> Option<i64> {
    value.parse().ok().filter(|days: &i64| *days >= 0)
}

fn positive_days(value: &str) -> Option<i64> {
    value.parse().ok().filter(|days: &i64| *days > 0)
}
