//! Domain error types.

use common::AggregateId;
use event_store::EventStoreError;
use thiserror::Error;

use crate::cart::CartError;
use crate::coupon::CouponError;
use crate::order::OrderError;
use crate::product::StockError;

/// Coarse classification of a failure, used by callers to choose a
/// transport-level response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidState,
    InsufficientStock,
    OverDeduction,
    CouponIneligible,
    EmptyCart,
    OutOfStock,
    InvalidInput,
    Conflict,
    Gateway,
    Internal,
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error(transparent)]
    Stock(#[from] StockError),

    #[error(transparent)]
    Coupon(#[from] CouponError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Order(#[from] OrderError),

    /// Aggregate not found.
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: String,
    },

    /// Every attempt lost the optimistic-concurrency race.
    #[error("Gave up on {aggregate_type} {aggregate_id} after {attempts} conflicting attempts")]
    ConcurrencyExhausted {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
        attempts: u32,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Returns true when the write lost a version race and may be retried
    /// against fresh state.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DomainError::EventStore(e) if e.is_conflict())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Stock(e) => e.kind(),
            DomainError::Coupon(e) => e.kind(),
            DomainError::Cart(e) => e.kind(),
            DomainError::Order(e) => e.kind(),
            DomainError::AggregateNotFound { .. } => ErrorKind::NotFound,
            DomainError::ConcurrencyExhausted { .. } => ErrorKind::Conflict,
            DomainError::EventStore(e) if e.is_conflict() => ErrorKind::Conflict,
            DomainError::EventStore(_) | DomainError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable reason.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Stock(e) => e.code(),
            DomainError::Coupon(e) => e.code(),
            DomainError::Cart(e) => e.code(),
            DomainError::Order(e) => e.code(),
            DomainError::AggregateNotFound { .. } => "not_found",
            DomainError::ConcurrencyExhausted { .. } => "concurrent_modification",
            DomainError::EventStore(e) if e.is_conflict() => "concurrent_modification",
            DomainError::EventStore(_) | DomainError::Serialization(_) => "internal",
        }
    }
}
