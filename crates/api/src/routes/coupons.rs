//! Coupon administration.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{Coupon, Discount, Money, NewCoupon};
use event_store::EventStore;
use serde::Serialize;

use crate::AppState;
use crate::auth::Identity;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct CouponResponse {
    pub code: String,
    pub description: Option<String>,
    pub discount: Option<Discount>,
    pub minimum_purchase: Money,
    pub maximum_discount: Option<Money>,
    pub usage_count: u32,
    pub active: bool,
}

impl From<&Coupon> for CouponResponse {
    fn from(coupon: &Coupon) -> Self {
        Self {
            code: coupon.code().to_string(),
            description: coupon.description().map(String::from),
            discount: coupon.discount(),
            minimum_purchase: coupon.minimum_purchase(),
            maximum_discount: coupon.maximum_discount(),
            usage_count: coupon.usage_count(),
            active: coupon.is_active(),
        }
    }
}

/// POST /coupons (admin). Codes are stored upper-case and must be unique.
#[tracing::instrument(skip(state, req), fields(code = %req.code))]
pub async fn create<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(req): Json<NewCoupon>,
) -> Result<(StatusCode, Json<CouponResponse>), ApiError> {
    let caller = identity.require_admin()?;
    let result = state
        .services
        .coupons
        .create_coupon(req, Some(caller.user_id))
        .await?;
    Ok((StatusCode::CREATED, Json(CouponResponse::from(&result.aggregate))))
}

/// GET /coupons/{code} (admin)
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(code): Path<String>,
) -> Result<Json<CouponResponse>, ApiError> {
    identity.require_admin()?;
    let coupon = state
        .services
        .coupons
        .get_by_code(&code)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Coupon {code} not found")))?;
    Ok(Json(CouponResponse::from(&coupon)))
}

/// POST /coupons/{code}/deactivate (admin)
#[tracing::instrument(skip(state))]
pub async fn deactivate<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(code): Path<String>,
) -> Result<Json<CouponResponse>, ApiError> {
    identity.require_admin()?;
    let result = state.services.coupons.deactivate(&code).await?;
    Ok(Json(CouponResponse::from(&result.aggregate)))
}
