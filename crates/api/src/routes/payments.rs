//! Payment bridge endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use checkout::{IntentHandle, WebhookOutcome};
use domain::Money;
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use super::orders::OrderResponse;
use super::parse_aggregate_id;
use crate::AppState;
use crate::auth::Identity;
use crate::error::ApiError;

pub const SIGNATURE_HEADER: &str = "x-payment-signature";

// -- Request types --

#[derive(Deserialize)]
pub struct IntentRequest {
    pub order_id: String,
}

#[derive(Deserialize)]
pub struct ConfirmRequest {
    pub order_id: String,
    pub payment_intent_id: String,
}

#[derive(Deserialize)]
pub struct RefundRequest {
    pub order_id: String,
    /// Omitted for a full refund.
    #[serde(default)]
    pub amount: Option<Money>,
    #[serde(default)]
    pub reason: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub outcome: &'static str,
}

// -- Handlers --

/// POST /payments/intent (order owner)
#[tracing::instrument(skip(state, req))]
pub async fn create_intent<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Json(req): Json<IntentRequest>,
) -> Result<Json<IntentHandle>, ApiError> {
    let order_id = parse_aggregate_id(&req.order_id)?;
    let handle = state
        .lifecycle
        .create_payment_intent(caller, order_id)
        .await?;
    Ok(Json(handle))
}

/// POST /payments/confirm
#[tracing::instrument(skip(state, req))]
pub async fn confirm<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_aggregate_id(&req.order_id)?;
    let order = state
        .lifecycle
        .confirm_payment(caller, order_id, &req.payment_intent_id)
        .await?;
    OrderResponse::from_order(&order).map(Json)
}

/// POST /payments/webhook. Authenticated by signature, not caller identity.
#[tracing::instrument(skip(state, headers, body))]
pub async fn webhook<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest(format!("Missing {SIGNATURE_HEADER} header")))?;

    let outcome = state.lifecycle.handle_webhook(&body, signature).await?;
    let outcome = match outcome {
        WebhookOutcome::PaymentSucceeded(_) => "payment_succeeded",
        WebhookOutcome::PaymentFailed(_) => "payment_failed",
        WebhookOutcome::Ignored(_) => "ignored",
    };
    Ok(Json(WebhookResponse {
        received: true,
        outcome,
    }))
}

/// POST /payments/refund (admin)
#[tracing::instrument(skip(state, req))]
pub async fn refund<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(req): Json<RefundRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let caller = identity.require_admin()?;
    let order_id = parse_aggregate_id(&req.order_id)?;
    let reason = req
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "requested_by_customer".to_string());
    let order = state
        .lifecycle
        .refund_payment(caller, order_id, req.amount, &reason)
        .await?;
    OrderResponse::from_order(&order).map(Json)
}
