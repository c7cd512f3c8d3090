//! Checkout and order lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use checkout::{CheckoutRequest, StatusUpdate};
use common::{AggregateId, UserId};
use domain::order::{
    PaymentDetails, PendingRefund, RefundDetails, ReturnRequest, TimelineEntry,
};
use domain::{
    Address, Aggregate, InventoryHold, Order, OrderItem, OrderPricing, OrderStatus, PaymentMethod,
    PaymentStatus, ReturnStatus, ShippingMethod,
};
use event_store::EventStore;
use projections::{OrderPage, OrderQuery};
use serde::{Deserialize, Serialize};

use super::parse_aggregate_id;
use crate::AppState;
use crate::auth::Identity;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct ReturnRequestBody {
    pub reason: String,
}

#[derive(Deserialize)]
pub struct ReturnStatusRequest {
    pub status: ReturnStatus,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: AggregateId,
    pub order_number: String,
    pub user_id: Option<UserId>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub shipping_method: ShippingMethod,
    pub items: Vec<OrderItem>,
    pub pricing: OrderPricing,
    pub coupon_code: Option<String>,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub customer_note: Option<String>,
    pub inventory: InventoryHold,
    pub payment: Option<PaymentDetails>,
    pub refund: Option<RefundDetails>,
    pub pending_refund: Option<PendingRefund>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub return_request: ReturnRequest,
    pub timeline: Vec<TimelineEntry>,
    pub created_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}

impl OrderResponse {
    pub(crate) fn from_order(order: &Order) -> Result<Self, ApiError> {
        let id = order
            .id()
            .ok_or_else(|| ApiError::Internal("Order has no id".to_string()))?;
        Ok(Self {
            id,
            order_number: order.order_number().to_string(),
            user_id: order.user_id(),
            status: order.status(),
            payment_status: order.payment_status(),
            payment_method: order.payment_method(),
            shipping_method: order.shipping_method(),
            items: order.items().to_vec(),
            pricing: order.pricing(),
            coupon_code: order.coupon_code().map(String::from),
            shipping_address: order.shipping_address().clone(),
            billing_address: order.billing_address().clone(),
            customer_note: order.customer_note().map(String::from),
            inventory: order.inventory(),
            payment: order.payment().cloned(),
            refund: order.refund_details().cloned(),
            pending_refund: order.pending_refund().cloned(),
            tracking_number: order.tracking_number().map(String::from),
            carrier: order.carrier().map(String::from),
            return_request: order.return_request().clone(),
            timeline: order.timeline().to_vec(),
            created_at: order.created_at(),
            paid_at: order.paid_at(),
            shipped_at: order.shipped_at(),
            delivered_at: order.delivered_at(),
            cancelled_at: order.cancelled_at(),
            cancellation_reason: order.cancellation_reason().map(String::from),
        })
    }
}

fn respond(order: &Order) -> Result<Json<OrderResponse>, ApiError> {
    OrderResponse::from_order(order).map(Json)
}

// -- Handlers --

/// POST /orders: checks out the caller's cart.
#[tracing::instrument(skip(state, req))]
pub async fn checkout<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state.lifecycle.checkout(caller.user_id, req).await?;
    Ok((StatusCode::CREATED, respond(&order)?))
}

/// GET /orders: the caller's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Query(query): Query<OrderQuery>,
) -> Result<Json<OrderPage>, ApiError> {
    // Run catch-up so the listing includes the caller's latest writes
    state.processor.run_catch_up().await?;
    Ok(Json(
        state.orders_view.list_for_user(caller.user_id, query).await,
    ))
}

/// GET /orders/{id} (owner or admin)
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    let order = state.lifecycle.get_order(caller, order_id).await?;
    respond(&order)
}

/// POST /orders/{id}/cancel (owner)
#[tracing::instrument(skip(state, req))]
pub async fn cancel<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    let reason = req
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "Cancelled by customer".to_string());
    let order = state
        .lifecycle
        .cancel_order(caller, order_id, &reason)
        .await?;
    respond(&order)
}

/// POST /orders/{id}/return (owner, within the return window)
#[tracing::instrument(skip(state, req))]
pub async fn request_return<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Path(id): Path<String>,
    Json(req): Json<ReturnRequestBody>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    let order = state
        .lifecycle
        .request_return(caller, order_id, &req.reason)
        .await?;
    respond(&order)
}

/// PUT /orders/{id}/status (admin or seller)
#[tracing::instrument(skip(state, req), fields(status = %req.status))]
pub async fn update_status<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<StatusUpdate>,
) -> Result<Json<OrderResponse>, ApiError> {
    let caller = identity.require_operator()?;
    let order_id = parse_aggregate_id(&id)?;
    let order = state.lifecycle.update_status(caller, order_id, req).await?;
    respond(&order)
}

/// PUT /orders/{id}/return (admin or seller)
#[tracing::instrument(skip(state, req))]
pub async fn update_return<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<ReturnStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let caller = identity.require_operator()?;
    let order_id = parse_aggregate_id(&id)?;
    let order = state
        .lifecycle
        .update_return_status(caller, order_id, req.status)
        .await?;
    respond(&order)
}
