//! Coupon aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};
use crate::money::Money;

use super::{AppliedCoupon, CouponCreatedData, CouponError, CouponEvent, Discount};

/// Terms for a new coupon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCoupon {
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    pub discount: Discount,
    #[serde(default)]
    pub minimum_purchase: Money,
    #[serde(default)]
    pub maximum_discount: Option<Money>,
    #[serde(default)]
    pub usage_limit: Option<u32>,
    #[serde(default = "default_usage_limit_per_user")]
    pub usage_limit_per_user: u32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

fn default_usage_limit_per_user() -> u32 {
    1
}

/// How often one user has redeemed a coupon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponUsage {
    pub user_id: UserId,
    pub count: u32,
    pub last_used_at: DateTime<Utc>,
}

/// Why a coupon cannot be used right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Ineligibility {
    #[error("Coupon is inactive")]
    Inactive,
    #[error("Coupon is not valid yet")]
    NotStarted,
    #[error("Coupon has expired")]
    Expired,
    #[error("Coupon usage limit reached")]
    UsageLimitReached,
    #[error("You have exceeded the usage limit for this coupon")]
    PerUserLimitReached,
    #[error("Minimum purchase of {minimum} required")]
    MinimumNotMet { minimum: Money },
}

impl Ineligibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ineligibility::Inactive => "inactive",
            Ineligibility::NotStarted => "not_started",
            Ineligibility::Expired => "expired",
            Ineligibility::UsageLimitReached => "usage_limit_reached",
            Ineligibility::PerUserLimitReached => "per_user_limit_reached",
            Ineligibility::MinimumNotMet { .. } => "minimum_not_met",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Ineligibility::Inactive => "coupon_inactive",
            Ineligibility::NotStarted => "coupon_not_started",
            Ineligibility::Expired => "coupon_expired",
            Ineligibility::UsageLimitReached => "coupon_usage_limit_reached",
            Ineligibility::PerUserLimitReached => "coupon_per_user_limit_reached",
            Ineligibility::MinimumNotMet { .. } => "coupon_minimum_not_met",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Coupon {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    code: String,
    description: Option<String>,
    discount: Option<Discount>,
    minimum_purchase: Money,
    maximum_discount: Option<Money>,
    usage_limit: Option<u32>,
    usage_limit_per_user: u32,

    /// Always equal to the sum of `used_by[].count`.
    usage_count: u32,
    used_by: Vec<CouponUsage>,

    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    active: bool,
    created_by: Option<UserId>,
}

impl Aggregate for Coupon {
    type Event = CouponEvent;
    type Error = CouponError;

    fn aggregate_type() -> &'static str {
        "Coupon"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            CouponEvent::CouponCreated(data) => {
                self.id = Some(data.coupon_id);
                self.code = data.code;
                self.description = data.description;
                self.discount = Some(data.discount);
                self.minimum_purchase = data.minimum_purchase;
                self.maximum_discount = data.maximum_discount;
                self.usage_limit = data.usage_limit;
                self.usage_limit_per_user = data.usage_limit_per_user;
                self.starts_at = Some(data.starts_at);
                self.ends_at = Some(data.ends_at);
                self.created_by = data.created_by;
                self.active = true;
            }
            CouponEvent::UsageRecorded { user_id, at } => {
                match self.used_by.iter_mut().find(|u| u.user_id == user_id) {
                    Some(usage) => {
                        usage.count += 1;
                        usage.last_used_at = at;
                    }
                    None => self.used_by.push(CouponUsage {
                        user_id,
                        count: 1,
                        last_used_at: at,
                    }),
                }
                self.usage_count += 1;
            }
            CouponEvent::UsageReverted { user_id } => {
                if let Some(index) = self.used_by.iter().position(|u| u.user_id == user_id) {
                    let usage = &mut self.used_by[index];
                    usage.count -= 1;
                    if usage.count == 0 {
                        self.used_by.remove(index);
                    }
                    self.usage_count = self.usage_count.saturating_sub(1);
                }
            }
            CouponEvent::CouponDeactivated { .. } => {
                self.active = false;
            }
        }
    }
}

impl SnapshotCapable for Coupon {}

// Query methods
impl Coupon {
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn discount(&self) -> Option<Discount> {
        self.discount
    }

    pub fn minimum_purchase(&self) -> Money {
        self.minimum_purchase
    }

    pub fn maximum_discount(&self) -> Option<Money> {
        self.maximum_discount
    }

    pub fn usage_count(&self) -> u32 {
        self.usage_count
    }

    pub fn used_by(&self) -> &[CouponUsage] {
        &self.used_by
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn usage_by(&self, user_id: UserId) -> u32 {
        self.used_by
            .iter()
            .find(|u| u.user_id == user_id)
            .map_or(0, |u| u.count)
    }

    /// Active, inside the validity window and under the global usage limit.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.validity(now).is_ok()
    }

    pub fn can_be_used_by(&self, user_id: UserId, now: DateTime<Utc>) -> bool {
        self.eligibility(user_id, now, None).is_ok()
    }

    /// Checks every eligibility rule, reporting the first that fails. The
    /// minimum purchase is only checked when a subtotal is supplied.
    pub fn eligibility(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
        subtotal: Option<Money>,
    ) -> Result<(), Ineligibility> {
        self.validity(now)?;
        if self.usage_by(user_id) >= self.usage_limit_per_user {
            return Err(Ineligibility::PerUserLimitReached);
        }
        if let Some(subtotal) = subtotal
            && subtotal < self.minimum_purchase
        {
            return Err(Ineligibility::MinimumNotMet {
                minimum: self.minimum_purchase,
            });
        }
        Ok(())
    }

    /// Discount for a subtotal; zero below the minimum purchase.
    pub fn calculate_discount(&self, subtotal: Money) -> Money {
        let Some(discount) = self.discount else {
            return Money::zero();
        };
        if subtotal < self.minimum_purchase {
            return Money::zero();
        }
        discount.amount_for(subtotal, self.maximum_discount)
    }

    /// The terms a cart stores when this coupon is applied.
    pub fn applied(&self) -> Option<AppliedCoupon> {
        self.discount.map(|discount| AppliedCoupon {
            code: self.code.clone(),
            discount,
            maximum_discount: self.maximum_discount,
        })
    }

    fn validity(&self, now: DateTime<Utc>) -> Result<(), Ineligibility> {
        if !self.active {
            return Err(Ineligibility::Inactive);
        }
        if self.starts_at.is_some_and(|start| now < start) {
            return Err(Ineligibility::NotStarted);
        }
        if self.ends_at.is_some_and(|end| now > end) {
            return Err(Ineligibility::Expired);
        }
        if self
            .usage_limit
            .is_some_and(|limit| self.usage_count >= limit)
        {
            return Err(Ineligibility::UsageLimitReached);
        }
        Ok(())
    }
}

// Command methods (return events)
impl Coupon {
    pub fn create(
        &self,
        coupon_id: AggregateId,
        coupon: NewCoupon,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Vec<CouponEvent>, CouponError> {
        if self.id.is_some() {
            return Err(CouponError::AlreadyExists);
        }
        let code = super::normalize_code(&coupon.code);
        if code.is_empty() {
            return Err(CouponError::InvalidCoupon("code is required"));
        }
        if coupon.ends_at < coupon.starts_at {
            return Err(CouponError::InvalidCoupon("end date precedes start date"));
        }
        match coupon.discount {
            Discount::Percentage { percent } if percent > 100 => {
                return Err(CouponError::InvalidCoupon("percentage exceeds 100"));
            }
            Discount::Fixed { amount } if amount.is_negative() => {
                return Err(CouponError::InvalidCoupon("discount must not be negative"));
            }
            _ => {}
        }
        if coupon.minimum_purchase.is_negative()
            || coupon.maximum_discount.is_some_and(|m| m.is_negative())
        {
            return Err(CouponError::InvalidCoupon("amounts must not be negative"));
        }
        if coupon.usage_limit == Some(0) || coupon.usage_limit_per_user == 0 {
            return Err(CouponError::InvalidCoupon("usage limits must be at least 1"));
        }

        Ok(vec![CouponEvent::CouponCreated(CouponCreatedData {
            coupon_id,
            code,
            description: coupon.description,
            discount: coupon.discount,
            minimum_purchase: coupon.minimum_purchase,
            maximum_discount: coupon.maximum_discount,
            usage_limit: coupon.usage_limit,
            usage_limit_per_user: coupon.usage_limit_per_user,
            starts_at: coupon.starts_at,
            ends_at: coupon.ends_at,
            created_by,
            created_at: now,
        })])
    }

    /// Counts one redemption against the global and per-user limits.
    ///
    /// Eligibility is re-checked here, at the version the usage is appended
    /// on, so concurrent checkouts cannot push a coupon past its limits.
    pub fn record_usage(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<CouponEvent>, CouponError> {
        self.ensure_exists()?;
        self.eligibility(user_id, now, None)
            .map_err(CouponError::Ineligible)?;
        Ok(vec![CouponEvent::UsageRecorded { user_id, at: now }])
    }

    /// Hands back one usage. A user with no recorded usage is left alone.
    pub fn revert_usage(&self, user_id: UserId) -> Result<Vec<CouponEvent>, CouponError> {
        self.ensure_exists()?;
        if self.usage_by(user_id) == 0 {
            return Ok(vec![]);
        }
        Ok(vec![CouponEvent::UsageReverted { user_id }])
    }

    pub fn deactivate(&self, now: DateTime<Utc>) -> Result<Vec<CouponEvent>, CouponError> {
        self.ensure_exists()?;
        if !self.active {
            return Ok(vec![]);
        }
        Ok(vec![CouponEvent::CouponDeactivated { at: now }])
    }

    fn ensure_exists(&self) -> Result<(), CouponError> {
        if self.id.is_none() {
            return Err(CouponError::NotFound);
        }
        Ok(())
    }
}
