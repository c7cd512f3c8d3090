use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::money::Money;

use super::Discount;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CouponEvent {
    CouponCreated(CouponCreatedData),

    UsageRecorded {
        user_id: UserId,
        at: DateTime<Utc>,
    },

    /// A usage was handed back because the order it paid for was cancelled.
    UsageReverted { user_id: UserId },

    CouponDeactivated { at: DateTime<Utc> },
}

impl DomainEvent for CouponEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CouponEvent::CouponCreated(_) => "CouponCreated",
            CouponEvent::UsageRecorded { .. } => "CouponUsageRecorded",
            CouponEvent::UsageReverted { .. } => "CouponUsageReverted",
            CouponEvent::CouponDeactivated { .. } => "CouponDeactivated",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponCreatedData {
    pub coupon_id: AggregateId,
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    pub discount: Discount,
    pub minimum_purchase: Money,
    #[serde(default)]
    pub maximum_discount: Option<Money>,
    #[serde(default)]
    pub usage_limit: Option<u32>,
    pub usage_limit_per_user: u32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}
