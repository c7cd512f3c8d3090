//! Order value objects.

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use serde::{Deserialize, Serialize};

use crate::cart::Variant;
use crate::money::Money;

use super::OrderStatus;

/// Snapshot of a purchased line, copied by value at checkout so later catalog
/// edits never reach placed orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: AggregateId,
    pub name: String,
    pub sku: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub variant: Option<Variant>,
    pub quantity: u32,
    pub price: Money,
    pub total: Money,
}

impl OrderItem {
    pub fn new(
        product_id: AggregateId,
        name: impl Into<String>,
        sku: impl Into<String>,
        quantity: u32,
        price: Money,
    ) -> Self {
        Self {
            product_id,
            name: name.into(),
            sku: sku.into(),
            image: None,
            variant: None,
            quantity,
            price,
            total: price.multiply(quantity),
        }
    }

    pub fn with_image(mut self, image: Option<String>) -> Self {
        self.image = image;
        self
    }

    pub fn with_variant(mut self, variant: Option<Variant>) -> Self {
        self.variant = variant;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    #[serde(default)]
    pub apartment: Option<String>,
    pub city: String,
    pub state: String,
    pub country: String,
    pub zip_code: String,
    pub phone: String,
}

impl Address {
    /// Names the first missing required field.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("address", &self.address),
            ("city", &self.city),
            ("state", &self.state),
            ("country", &self.country),
            ("zip_code", &self.zip_code),
            ("phone", &self.phone),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Card,
    Paypal,
    /// Cash on delivery. Confirmed at checkout without the gateway.
    Cod,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::Cod => "cod",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    #[default]
    Standard,
    Express,
    Overnight,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub transaction_id: String,
    pub provider: String,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundDetails {
    #[serde(default)]
    pub refund_id: Option<String>,
    pub amount: Money,
    pub reason: String,
    pub refunded_at: DateTime<Utc>,
}

/// A refund sent to the gateway and not yet settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRefund {
    pub amount: Money,
    pub reason: String,
    #[serde(default)]
    pub requested_by: Option<UserId>,
    pub requested_at: DateTime<Utc>,
}

/// One entry of the append-only status log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub status: OrderStatus,
    #[serde(default)]
    pub note: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub updated_by: Option<UserId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub requested: bool,
    #[serde(default)]
    pub reason: Option<String>,
    pub status: super::ReturnStatus,
    #[serde(default)]
    pub requested_at: Option<DateTime<Utc>>,
}
