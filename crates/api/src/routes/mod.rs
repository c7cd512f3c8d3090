//! HTTP handlers, one module per resource.
//!
//! Amounts in request and response bodies are integer cents.

pub mod admin;
pub mod cart;
pub mod coupons;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod products;

use common::AggregateId;

use crate::error::ApiError;

pub(crate) fn parse_aggregate_id(id: &str) -> Result<AggregateId, ApiError> {
    id.trim()
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
