//! Checkout error types.

use common::AggregateId;
use domain::{DomainError, ErrorKind, Ineligibility};
use thiserror::Error;

use crate::services::GatewayError;

/// Errors surfaced by cart and order workflows.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Product not found: {0}")]
    ProductNotFound(AggregateId),

    #[error("Order not found: {0}")]
    OrderNotFound(AggregateId),

    #[error("Coupon not found: {0}")]
    CouponNotFound(String),

    #[error("Not authorized to access this resource")]
    Forbidden,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Item not in cart")]
    ItemNotFound,

    /// A line cannot be covered by available stock; nothing was written.
    #[error("Insufficient stock for {name}: requested {requested}, available {available}")]
    OutOfStock {
        product_id: AggregateId,
        name: String,
        requested: u32,
        available: u32,
    },

    #[error("Product {0} is not available for purchase")]
    ProductUnavailable(AggregateId),

    #[error("Quantity cannot be negative: {0}")]
    InvalidQuantity(i64),

    #[error("{0}")]
    CouponIneligible(Ineligibility),

    #[error("Payment method {0} does not use the payment gateway")]
    PaymentMethodNotSupported(&'static str),

    #[error("Payment has not succeeded (intent is {0})")]
    PaymentNotSucceeded(&'static str),

    #[error("Payment intent does not belong to order {0}")]
    IntentMismatch(AggregateId),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl CheckoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::ProductNotFound(_)
            | CheckoutError::OrderNotFound(_)
            | CheckoutError::CouponNotFound(_)
            | CheckoutError::ItemNotFound => ErrorKind::NotFound,
            CheckoutError::Forbidden => ErrorKind::Forbidden,
            CheckoutError::EmptyCart => ErrorKind::EmptyCart,
            CheckoutError::OutOfStock { .. } | CheckoutError::ProductUnavailable(_) => {
                ErrorKind::OutOfStock
            }
            CheckoutError::InvalidQuantity(_)
            | CheckoutError::PaymentNotSucceeded(_)
            | CheckoutError::IntentMismatch(_) => ErrorKind::InvalidInput,
            CheckoutError::CouponIneligible(_) => ErrorKind::CouponIneligible,
            CheckoutError::PaymentMethodNotSupported(_) => ErrorKind::InvalidState,
            CheckoutError::Gateway(GatewayError::InvalidSignature)
            | CheckoutError::Gateway(GatewayError::InvalidPayload(_)) => ErrorKind::InvalidInput,
            CheckoutError::Gateway(GatewayError::IntentNotFound(_)) => ErrorKind::NotFound,
            CheckoutError::Gateway(GatewayError::Unavailable(_)) => ErrorKind::Gateway,
            CheckoutError::Domain(e) => e.kind(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CheckoutError::ProductNotFound(_) => "product_not_found",
            CheckoutError::OrderNotFound(_) => "order_not_found",
            CheckoutError::CouponNotFound(_) => "coupon_not_found",
            CheckoutError::Forbidden => "forbidden",
            CheckoutError::EmptyCart => "empty_cart",
            CheckoutError::ItemNotFound => "item_not_found",
            CheckoutError::OutOfStock { .. } => "out_of_stock",
            CheckoutError::ProductUnavailable(_) => "product_unavailable",
            CheckoutError::InvalidQuantity(_) => "invalid_quantity",
            CheckoutError::CouponIneligible(reason) => reason.code(),
            CheckoutError::PaymentMethodNotSupported(_) => "invalid_payment_method",
            CheckoutError::PaymentNotSucceeded(_) => "payment_not_succeeded",
            CheckoutError::IntentMismatch(_) => "intent_mismatch",
            CheckoutError::Gateway(GatewayError::InvalidSignature) => "invalid_signature",
            CheckoutError::Gateway(GatewayError::InvalidPayload(_)) => "invalid_payload",
            CheckoutError::Gateway(GatewayError::IntentNotFound(_)) => "payment_intent_not_found",
            CheckoutError::Gateway(GatewayError::Unavailable(_)) => "payment_gateway_error",
            CheckoutError::Domain(e) => e.code(),
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{OrderError, StockError};

    #[test]
    fn domain_errors_keep_their_codes() {
        let err: CheckoutError = DomainError::from(StockError::InsufficientStock {
            requested: 3,
            available: 2,
        })
        .into();
        assert_eq!(err.code(), "insufficient_stock");
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);

        let err: CheckoutError = DomainError::from(OrderError::NotFound).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn gateway_failures_are_distinguished() {
        let err = CheckoutError::from(GatewayError::InvalidSignature);
        assert_eq!(err.code(), "invalid_signature");
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = CheckoutError::from(GatewayError::Unavailable("timeout".to_string()));
        assert_eq!(err.kind(), ErrorKind::Gateway);
    }

    #[test]
    fn coupon_reason_is_the_code() {
        let err = CheckoutError::CouponIneligible(Ineligibility::Expired);
        assert_eq!(err.code(), "coupon_expired");
        assert_eq!(err.kind(), ErrorKind::CouponIneligible);
    }
}
