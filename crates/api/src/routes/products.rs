//! Catalog and stock endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{AggregateId, Role, UserId};
use domain::{Aggregate, Money, NewProduct, Product, ProductStatus};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use super::parse_aggregate_id;
use crate::AppState;
use crate::auth::Identity;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub sku: String,
    pub price: Money,
    #[serde(default)]
    pub image: Option<String>,
    pub quantity: u32,
    #[serde(default)]
    pub low_stock_threshold: Option<u32>,
}

#[derive(Deserialize)]
pub struct RestockRequest {
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct PriceRequest {
    pub price: Money,
}

// -- Response types --

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: AggregateId,
    pub name: String,
    pub sku: String,
    pub price: Money,
    pub image: Option<String>,
    pub seller: Option<UserId>,
    pub status: ProductStatus,
    pub quantity: u32,
    pub reserved: u32,
    pub available: u32,
    pub low_stock_threshold: u32,
    pub sales: u32,
    pub created_at: Option<DateTime<Utc>>,
}

impl ProductResponse {
    fn from_product(id: AggregateId, product: &Product) -> Self {
        let stock = product.stock();
        Self {
            id,
            name: product.name().to_string(),
            sku: product.sku().to_string(),
            price: product.price(),
            image: product.image().map(String::from),
            seller: product.seller(),
            status: product.status(),
            quantity: stock.quantity,
            reserved: stock.reserved,
            available: stock.available(),
            low_stock_threshold: stock.low_stock_threshold,
            sales: product.sales(),
            created_at: product.created_at(),
        }
    }
}

fn respond(product: &Product) -> Result<Json<ProductResponse>, ApiError> {
    let id = product
        .id()
        .ok_or_else(|| ApiError::Internal("Product has no id after write".to_string()))?;
    Ok(Json(ProductResponse::from_product(id, product)))
}

// -- Handlers --

/// POST /products (admin or seller). Sellers own what they list.
#[tracing::instrument(skip(state, req), fields(sku = %req.sku))]
pub async fn create<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let caller = identity.require_operator()?;
    let seller = (caller.role == Role::Seller).then_some(caller.user_id);

    let result = state
        .services
        .products
        .create_product(NewProduct {
            name: req.name,
            sku: req.sku,
            price: req.price,
            image: req.image,
            seller,
            quantity: req.quantity,
            low_stock_threshold: req.low_stock_threshold,
        })
        .await?;

    Ok((StatusCode::CREATED, respond(&result.aggregate)?))
}

/// GET /products/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id = parse_aggregate_id(&id)?;
    let product = state
        .services
        .products
        .get_product(product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))?;

    Ok(Json(ProductResponse::from_product(product_id, &product)))
}

/// POST /products/{id}/restock (admin or seller)
#[tracing::instrument(skip(state, req))]
pub async fn restock<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<RestockRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    identity.require_operator()?;
    let product_id = parse_aggregate_id(&id)?;
    let result = state
        .services
        .products
        .restock(product_id, req.quantity)
        .await?;
    respond(&result.aggregate)
}

/// PUT /products/{id}/price (admin or seller). Placed orders keep the price
/// they were bought at.
#[tracing::instrument(skip(state, req))]
pub async fn change_price<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<PriceRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    identity.require_operator()?;
    let product_id = parse_aggregate_id(&id)?;
    let result = state
        .services
        .products
        .change_price(product_id, req.price)
        .await?;
    respond(&result.aggregate)
}
