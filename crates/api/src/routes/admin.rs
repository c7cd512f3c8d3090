//! Admin reports, served from the read models.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use event_store::EventStore;
use projections::{InventoryReport, OrderPage, OrderQuery, OrderStats, StockLevel};
use serde::Deserialize;

use crate::AppState;
use crate::auth::Identity;
use crate::error::ApiError;

/// Placement window for `/admin/orders/stats`, RFC 3339 timestamps.
#[derive(Debug, Deserialize)]
pub struct StatsWindow {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

/// GET /admin/orders
#[tracing::instrument(skip(state))]
pub async fn orders<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Query(query): Query<OrderQuery>,
) -> Result<Json<OrderPage>, ApiError> {
    identity.require_admin()?;
    state.processor.run_catch_up().await?;
    Ok(Json(state.orders_view.list_all(query).await))
}

/// GET /admin/orders/stats
#[tracing::instrument(skip(state))]
pub async fn order_stats<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Query(window): Query<StatsWindow>,
) -> Result<Json<OrderStats>, ApiError> {
    identity.require_admin()?;
    if let (Some(from), Some(to)) = (window.from, window.to)
        && from > to
    {
        return Err(ApiError::BadRequest("`from` must not be after `to`".to_string()));
    }
    state.processor.run_catch_up().await?;
    Ok(Json(state.stats_view.stats(window.from, window.to).await))
}

/// GET /admin/inventory
#[tracing::instrument(skip(state))]
pub async fn inventory<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<InventoryReport>, ApiError> {
    identity.require_admin()?;
    state.processor.run_catch_up().await?;
    Ok(Json(state.inventory_view.report().await))
}

/// GET /admin/inventory/low-stock
#[tracing::instrument(skip(state))]
pub async fn low_stock<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<Vec<StockLevel>>, ApiError> {
    identity.require_admin()?;
    state.processor.run_catch_up().await?;
    Ok(Json(state.inventory_view.low_stock().await))
}
