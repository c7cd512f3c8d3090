//! Order domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::money::Money;

use super::{
    Address, InventoryHold, OrderItem, OrderPricing, OrderStatus, PaymentMethod, ReturnStatus,
    ShippingMethod,
};

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was placed from a cart. Starts in `pending/pending`.
    OrderPlaced(OrderPlacedData),

    InventoryHoldChanged { hold: InventoryHold },

    /// Every status write, including the ones made by payment events.
    StatusChanged(StatusChangedData),

    ShipmentUpdated {
        #[serde(default)]
        tracking_number: Option<String>,
        #[serde(default)]
        carrier: Option<String>,
    },

    OrderCancelled(OrderCancelledData),

    PaymentSucceeded {
        transaction_id: String,
        provider: String,
        at: DateTime<Utc>,
    },

    PaymentFailed {
        #[serde(default)]
        reason: Option<String>,
        at: DateTime<Utc>,
    },

    /// An admin started a refund; the gateway has not answered yet.
    RefundRequested {
        amount: Money,
        reason: String,
        #[serde(default)]
        requested_by: Option<UserId>,
        at: DateTime<Utc>,
    },

    /// The gateway refused a requested refund.
    RefundFailed {
        reason: String,
        at: DateTime<Utc>,
    },

    PaymentRefunded(PaymentRefundedData),

    ReturnRequested {
        reason: String,
        at: DateTime<Utc>,
    },

    ReturnStatusChanged {
        from: ReturnStatus,
        to: ReturnStatus,
        #[serde(default)]
        updated_by: Option<UserId>,
        at: DateTime<Utc>,
    },
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::InventoryHoldChanged { .. } => "OrderInventoryHoldChanged",
            OrderEvent::StatusChanged(_) => "OrderStatusChanged",
            OrderEvent::ShipmentUpdated { .. } => "OrderShipmentUpdated",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
            OrderEvent::PaymentSucceeded { .. } => "OrderPaymentSucceeded",
            OrderEvent::PaymentFailed { .. } => "OrderPaymentFailed",
            OrderEvent::RefundRequested { .. } => "OrderRefundRequested",
            OrderEvent::RefundFailed { .. } => "OrderRefundFailed",
            OrderEvent::PaymentRefunded(_) => "OrderPaymentRefunded",
            OrderEvent::ReturnRequested { .. } => "OrderReturnRequested",
            OrderEvent::ReturnStatusChanged { .. } => "OrderReturnStatusChanged",
        }
    }
}

/// Data for OrderPlaced event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: AggregateId,
    pub order_number: String,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub pricing: OrderPricing,
    #[serde(default)]
    pub coupon_code: Option<String>,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub payment_method: PaymentMethod,
    pub shipping_method: ShippingMethod,
    #[serde(default)]
    pub customer_note: Option<String>,
    pub placed_at: DateTime<Utc>,
}

/// Data for StatusChanged event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangedData {
    pub from: OrderStatus,
    pub to: OrderStatus,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub updated_by: Option<UserId>,
    pub at: DateTime<Utc>,
}

/// Data for OrderCancelled event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub from: OrderStatus,
    pub reason: String,
    #[serde(default)]
    pub cancelled_by: Option<UserId>,
    pub at: DateTime<Utc>,
}

/// Data for PaymentRefunded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRefundedData {
    pub amount: Money,
    pub reason: String,
    #[serde(default)]
    pub refund_id: Option<String>,
    /// Less than the order total was returned.
    pub partial: bool,
    pub at: DateTime<Utc>,
}
