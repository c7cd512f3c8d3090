//! Product domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::money::Money;

use super::ProductStatus;

/// Events that can occur on a product aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProductEvent {
    ProductCreated(ProductCreatedData),

    /// Units moved from available into reservation.
    StockReserved { quantity: u32 },

    /// Units moved back out of reservation. Carries the amount actually
    /// released, which may be less than requested.
    StockReleased { quantity: u32 },

    /// Reserved units left the shelf as a sale.
    StockDeducted { quantity: u32 },

    /// A deduction was undone; the units are reserved again.
    DeductionReverted { quantity: u32 },

    /// Sold units returned to the shelf after the order was cancelled.
    StockRestored { quantity: u32 },

    StockRestocked { quantity: u32 },

    PriceChanged { old_price: Money, new_price: Money },

    StatusChanged {
        from: ProductStatus,
        to: ProductStatus,
    },
}

impl DomainEvent for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "ProductCreated",
            ProductEvent::StockReserved { .. } => "StockReserved",
            ProductEvent::StockReleased { .. } => "StockReleased",
            ProductEvent::StockDeducted { .. } => "StockDeducted",
            ProductEvent::DeductionReverted { .. } => "DeductionReverted",
            ProductEvent::StockRestored { .. } => "StockRestored",
            ProductEvent::StockRestocked { .. } => "StockRestocked",
            ProductEvent::PriceChanged { .. } => "PriceChanged",
            ProductEvent::StatusChanged { .. } => "StatusChanged",
        }
    }
}

/// Data for ProductCreated event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCreatedData {
    pub product_id: AggregateId,
    pub name: String,
    pub sku: String,
    pub price: Money,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub seller: Option<UserId>,
    pub quantity: u32,
    pub low_stock_threshold: u32,
    pub created_at: DateTime<Utc>,
}
