//! Coupon aggregate: eligibility rules and discount math.

mod aggregate;
mod discount;
mod events;
mod service;

pub use aggregate::{Coupon, CouponUsage, Ineligibility, NewCoupon};
pub use discount::{AppliedCoupon, Discount};
pub use events::{CouponCreatedData, CouponEvent};
pub use service::{CouponService, coupon_id, normalize_code};

use thiserror::Error;

use crate::error::ErrorKind;

#[derive(Debug, Error)]
pub enum CouponError {
    #[error("Coupon not found")]
    NotFound,

    #[error("Coupon code already exists")]
    AlreadyExists,

    #[error("Invalid coupon: {0}")]
    InvalidCoupon(&'static str),

    #[error("{0}")]
    Ineligible(Ineligibility),
}

impl CouponError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CouponError::NotFound => ErrorKind::NotFound,
            CouponError::AlreadyExists => ErrorKind::Conflict,
            CouponError::InvalidCoupon(_) => ErrorKind::InvalidInput,
            CouponError::Ineligible(_) => ErrorKind::CouponIneligible,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CouponError::NotFound => "coupon_not_found",
            CouponError::AlreadyExists => "coupon_exists",
            CouponError::InvalidCoupon(_) => "invalid_coupon",
            CouponError::Ineligible(reason) => reason.code(),
        }
    }
}
