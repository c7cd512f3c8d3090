//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod number;
mod pricing;
mod service;
mod state;
mod value_objects;

pub use aggregate::{NewOrder, Order};
pub use commands::*;
pub use events::{
    OrderCancelledData, OrderEvent, OrderPlacedData, PaymentRefundedData, StatusChangedData,
};
pub use number::generate_order_number;
pub use pricing::{OrderPricing, PricingPolicy};
pub use service::{DEFAULT_RETURN_WINDOW_DAYS, OrderService, order_id_for};
pub use state::{InventoryHold, OrderStatus, PaymentStatus, ReturnStatus};
pub use value_objects::{
    Address, OrderItem, PaymentDetails, PaymentMethod, PendingRefund, RefundDetails,
    ReturnRequest, ShippingMethod, TimelineEntry,
};

use thiserror::Error;

use crate::error::ErrorKind;
use crate::money::Money;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order not found")]
    NotFound,

    #[error("Order already exists")]
    AlreadyExists,

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    #[error("Invalid address: {0} is required")]
    InvalidAddress(&'static str),

    #[error("Cannot change order status from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order cannot be cancelled in {status} status")]
    CannotCancel { status: OrderStatus },

    #[error("Only delivered orders can be returned (order is {status})")]
    NotReturnable { status: OrderStatus },

    #[error("Return window of {window_days} days has passed ({days_elapsed} days since delivery)")]
    ReturnWindowExpired {
        days_elapsed: i64,
        window_days: i64,
    },

    #[error("Cannot move return from {from} to {to}")]
    InvalidReturnTransition { from: ReturnStatus, to: ReturnStatus },

    #[error("Payment is {status}, expected pending")]
    PaymentNotPending { status: PaymentStatus },

    #[error("Order is not paid (payment is {status})")]
    NotPaid { status: PaymentStatus },

    #[error("Invalid refund amount {amount}")]
    InvalidRefundAmount { amount: Money },

    #[error("A refund of {amount} is already in progress")]
    RefundInProgress { amount: Money },

    /// Another writer moved the stock hold first.
    #[error("Inventory hold is {actual:?}, expected {expected:?}")]
    HoldMismatch {
        expected: InventoryHold,
        actual: InventoryHold,
    },
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::NotFound => ErrorKind::NotFound,
            OrderError::AlreadyExists => ErrorKind::Conflict,
            OrderError::NoItems => ErrorKind::EmptyCart,
            OrderError::InvalidAddress(_) | OrderError::InvalidRefundAmount { .. } => {
                ErrorKind::InvalidInput
            }
            OrderError::InvalidStatusTransition { .. }
            | OrderError::CannotCancel { .. }
            | OrderError::NotReturnable { .. }
            | OrderError::ReturnWindowExpired { .. }
            | OrderError::InvalidReturnTransition { .. }
            | OrderError::PaymentNotPending { .. }
            | OrderError::NotPaid { .. }
            | OrderError::RefundInProgress { .. }
            | OrderError::HoldMismatch { .. } => ErrorKind::InvalidState,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            OrderError::NotFound => "order_not_found",
            OrderError::AlreadyExists => "order_exists",
            OrderError::NoItems => "empty_cart",
            OrderError::InvalidAddress(_) => "invalid_address",
            OrderError::InvalidStatusTransition { .. } => "invalid_status_transition",
            OrderError::CannotCancel { .. } => "order_not_cancellable",
            OrderError::NotReturnable { .. } => "order_not_returnable",
            OrderError::ReturnWindowExpired { .. } => "return_window_expired",
            OrderError::InvalidReturnTransition { .. } => "invalid_return_transition",
            OrderError::PaymentNotPending { .. } => "payment_not_pending",
            OrderError::NotPaid { .. } => "order_not_paid",
            OrderError::InvalidRefundAmount { .. } => "invalid_refund_amount",
            OrderError::RefundInProgress { .. } => "refund_in_progress",
            OrderError::HoldMismatch { .. } => "inventory_hold_mismatch",
        }
    }
}
