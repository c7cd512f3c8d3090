//! Shopping cart endpoints. Every route acts on the caller's own cart.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{AppliedCoupon, Cart, CartItem, Money, Variant};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use super::parse_aggregate_id;
use crate::AppState;
use crate::auth::Identity;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: String,
    #[serde(default = "one")]
    pub quantity: u32,
    #[serde(default)]
    pub variant: Option<Variant>,
}

fn one() -> u32 {
    1
}

/// Signed so a negative quantity reaches validation instead of failing to parse.
#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i64,
    #[serde(default)]
    pub variant: Option<Variant>,
}

/// Selects a variant line on `DELETE`, where there is no body.
#[derive(Deserialize)]
pub struct VariantQuery {
    pub variant_name: Option<String>,
    pub variant_value: Option<String>,
}

impl VariantQuery {
    fn variant(self) -> Option<Variant> {
        match (self.variant_name, self.variant_value) {
            (Some(name), Some(value)) => Some(Variant::new(name, value)),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
pub struct ApplyCouponRequest {
    pub code: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartLineResponse {
    pub product_id: AggregateId,
    pub quantity: u32,
    pub variant: Option<Variant>,
    pub price: Money,
    pub line_total: Money,
    pub added_at: DateTime<Utc>,
}

impl From<&CartItem> for CartLineResponse {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.product_id,
            quantity: item.quantity,
            variant: item.variant.clone(),
            price: item.price,
            line_total: item.line_total(),
            added_at: item.added_at,
        }
    }
}

#[derive(Serialize)]
pub struct CartResponse {
    pub items: Vec<CartLineResponse>,
    pub coupon: Option<AppliedCoupon>,
    pub total_items: u32,
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
}

impl From<&Cart> for CartResponse {
    fn from(cart: &Cart) -> Self {
        Self {
            items: cart.items().iter().map(CartLineResponse::from).collect(),
            coupon: cart.coupon().cloned(),
            total_items: cart.total_items(),
            subtotal: cart.subtotal(),
            discount: cart.discount_amount(),
            total: cart.total(),
        }
    }
}

// -- Handlers --

/// GET /cart
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.carts.get_cart(caller.user_id).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// POST /cart/items
#[tracing::instrument(skip(state, req))]
pub async fn add_item<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let product_id = parse_aggregate_id(&req.product_id)?;
    let cart = state
        .carts
        .add_to_cart(caller.user_id, product_id, req.quantity, req.variant)
        .await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// PUT /cart/items/{product_id}. A quantity of zero removes the line.
#[tracing::instrument(skip(state, req))]
pub async fn update_item<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Path(product_id): Path<String>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let product_id = parse_aggregate_id(&product_id)?;
    let cart = state
        .carts
        .update_item(caller.user_id, product_id, req.quantity, req.variant)
        .await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// DELETE /cart/items/{product_id}
#[tracing::instrument(skip(state, query))]
pub async fn remove_item<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Path(product_id): Path<String>,
    Query(query): Query<VariantQuery>,
) -> Result<Json<CartResponse>, ApiError> {
    let product_id = parse_aggregate_id(&product_id)?;
    let cart = state
        .carts
        .remove_item(caller.user_id, product_id, query.variant())
        .await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// DELETE /cart
#[tracing::instrument(skip(state))]
pub async fn clear<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.carts.clear_cart(caller.user_id).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// POST /cart/coupon
#[tracing::instrument(skip(state, req), fields(code = %req.code))]
pub async fn apply_coupon<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Json(req): Json<ApplyCouponRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.carts.apply_coupon(caller.user_id, &req.code).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// DELETE /cart/coupon
#[tracing::instrument(skip(state))]
pub async fn remove_coupon<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.carts.remove_coupon(caller.user_id).await?;
    Ok(Json(CartResponse::from(&cart)))
}
