use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::coupon::AppliedCoupon;
use crate::money::Money;

use super::Variant;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CartEvent {
    CartCreated {
        cart_id: AggregateId,
        user_id: UserId,
        at: DateTime<Utc>,
    },

    /// Merged into an existing line when product and variant match.
    ItemAdded {
        product_id: AggregateId,
        quantity: u32,
        variant: Option<Variant>,
        price: Money,
        at: DateTime<Utc>,
    },

    ItemQuantityChanged {
        product_id: AggregateId,
        variant: Option<Variant>,
        quantity: u32,
        at: DateTime<Utc>,
    },

    ItemRemoved {
        product_id: AggregateId,
        variant: Option<Variant>,
        at: DateTime<Utc>,
    },

    CartCleared { at: DateTime<Utc> },

    CouponApplied {
        coupon: AppliedCoupon,
        at: DateTime<Utc>,
    },

    CouponRemoved { at: DateTime<Utc> },

    /// The cart sat idle past its time-to-live and was emptied.
    CartExpired { at: DateTime<Utc> },
}

impl DomainEvent for CartEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CartEvent::CartCreated { .. } => "CartCreated",
            CartEvent::ItemAdded { .. } => "CartItemAdded",
            CartEvent::ItemQuantityChanged { .. } => "CartItemQuantityChanged",
            CartEvent::ItemRemoved { .. } => "CartItemRemoved",
            CartEvent::CartCleared { .. } => "CartCleared",
            CartEvent::CouponApplied { .. } => "CartCouponApplied",
            CartEvent::CouponRemoved { .. } => "CartCouponRemoved",
            CartEvent::CartExpired { .. } => "CartExpired",
        }
    }
}

impl CartEvent {
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CartEvent::CartCreated { at, .. }
            | CartEvent::ItemAdded { at, .. }
            | CartEvent::ItemQuantityChanged { at, .. }
            | CartEvent::ItemRemoved { at, .. }
            | CartEvent::CartCleared { at }
            | CartEvent::CouponApplied { at, .. }
            | CartEvent::CouponRemoved { at }
            | CartEvent::CartExpired { at } => *at,
        }
    }
}
