//! Cart aggregate implementation.

use chrono::{DateTime, Duration, Utc};
use common::{AggregateId, UserId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};
use crate::coupon::AppliedCoupon;
use crate::money::Money;

use super::{CartError, CartEvent};

/// A selectable product option such as size or colour.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    pub value: String,
}

impl Variant {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One cart line. The price is frozen when the line is first added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: AggregateId,
    pub quantity: u32,
    #[serde(default)]
    pub variant: Option<Variant>,
    pub price: Money,
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    pub fn line_total(&self) -> Money {
        self.price.multiply(self.quantity)
    }

    fn matches(&self, product_id: AggregateId, variant: Option<&Variant>) -> bool {
        self.product_id == product_id && self.variant.as_ref() == variant
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cart {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    user_id: Option<UserId>,

    /// At most one line per (product, variant).
    items: Vec<CartItem>,

    coupon: Option<AppliedCoupon>,
    last_activity: Option<DateTime<Utc>>,
}

impl Aggregate for Cart {
    type Event = CartEvent;
    type Error = CartError;

    fn aggregate_type() -> &'static str {
        "Cart"
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
        self.last_activity = Some(event.occurred_at());
        match event {
            CartEvent::CartCreated {
                cart_id, user_id, ..
            } => {
                self.id = Some(cart_id);
                self.user_id = Some(user_id);
            }
            CartEvent::ItemAdded {
                product_id,
                quantity,
                variant,
                price,
                at,
            } => match self.line_mut(product_id, variant.as_ref()) {
                Some(item) => item.quantity = item.quantity.saturating_add(quantity),
                None => self.items.push(CartItem {
                    product_id,
                    quantity,
                    variant,
                    price,
                    added_at: at,
                }),
            },
            CartEvent::ItemQuantityChanged {
                product_id,
                variant,
                quantity,
                ..
            } => {
                if let Some(item) = self.line_mut(product_id, variant.as_ref()) {
                    item.quantity = quantity;
                }
            }
            CartEvent::ItemRemoved {
                product_id,
                variant,
                ..
            } => {
                self.items
                    .retain(|item| !item.matches(product_id, variant.as_ref()));
            }
            CartEvent::CartCleared { .. } | CartEvent::CartExpired { .. } => {
                self.items.clear();
                self.coupon = None;
            }
            CartEvent::CouponApplied { coupon, .. } => {
                self.coupon = Some(coupon);
            }
            CartEvent::CouponRemoved { .. } => {
                self.coupon = None;
            }
        }
    }
}

impl SnapshotCapable for Cart {}

// Query methods
impl Cart {
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn item(&self, product_id: AggregateId, variant: Option<&Variant>) -> Option<&CartItem> {
        self.items
            .iter()
            .find(|item| item.matches(product_id, variant))
    }

    pub fn coupon(&self) -> Option<&AppliedCoupon> {
        self.coupon.as_ref()
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_activity
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn subtotal(&self) -> Money {
        self.items.iter().map(CartItem::line_total).sum()
    }

    pub fn total_items(&self) -> u32 {
        self.items
            .iter()
            .fold(0u32, |total, item| total.saturating_add(item.quantity))
    }

    pub fn discount_amount(&self) -> Money {
        self.coupon
            .as_ref()
            .map_or(Money::zero(), |coupon| coupon.amount_for(self.subtotal()))
    }

    /// Never negative.
    pub fn total(&self) -> Money {
        (self.subtotal() - self.discount_amount()).non_negative()
    }

    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.last_activity
            .is_some_and(|last| now - last > ttl)
    }
}

// Command methods (return events)
impl Cart {
    pub fn create(
        &self,
        cart_id: AggregateId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<CartEvent>, CartError> {
        if self.id.is_some() {
            return Err(CartError::AlreadyExists);
        }
        Ok(vec![CartEvent::CartCreated {
            cart_id,
            user_id,
            at: now,
        }])
    }

    pub fn add_item(
        &self,
        product_id: AggregateId,
        quantity: u32,
        variant: Option<Variant>,
        price: Money,
        now: DateTime<Utc>,
    ) -> Result<Vec<CartEvent>, CartError> {
        self.ensure_exists()?;
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity: 0 });
        }
        if price.is_negative() {
            return Err(CartError::InvalidPrice {
                price: price.cents(),
            });
        }
        if let Some(item) = self.item(product_id, variant.as_ref())
            && item.quantity.checked_add(quantity).is_none()
        {
            return Err(CartError::InvalidQuantity {
                quantity: i64::from(item.quantity) + i64::from(quantity),
            });
        }
        Ok(vec![CartEvent::ItemAdded {
            product_id,
            quantity,
            variant,
            price,
            at: now,
        }])
    }

    /// Sets a line's quantity. Zero or less removes the line.
    pub fn update_item_quantity(
        &self,
        product_id: AggregateId,
        quantity: i64,
        variant: Option<Variant>,
        now: DateTime<Utc>,
    ) -> Result<Vec<CartEvent>, CartError> {
        self.ensure_exists()?;
        let item = self
            .item(product_id, variant.as_ref())
            .ok_or(CartError::ItemNotFound)?;

        if quantity <= 0 {
            return Ok(vec![CartEvent::ItemRemoved {
                product_id,
                variant,
                at: now,
            }]);
        }
        let quantity =
            u32::try_from(quantity).map_err(|_| CartError::InvalidQuantity { quantity })?;
        if quantity == item.quantity {
            return Ok(vec![]);
        }
        Ok(vec![CartEvent::ItemQuantityChanged {
            product_id,
            variant,
            quantity,
            at: now,
        }])
    }

    /// Removes the matching line, if any.
    pub fn remove_item(
        &self,
        product_id: AggregateId,
        variant: Option<Variant>,
        now: DateTime<Utc>,
    ) -> Result<Vec<CartEvent>, CartError> {
        self.ensure_exists()?;
        if self.item(product_id, variant.as_ref()).is_none() {
            return Ok(vec![]);
        }
        Ok(vec![CartEvent::ItemRemoved {
            product_id,
            variant,
            at: now,
        }])
    }

    /// Empties the cart and drops its coupon.
    pub fn clear(&self, now: DateTime<Utc>) -> Result<Vec<CartEvent>, CartError> {
        self.ensure_exists()?;
        if self.items.is_empty() && self.coupon.is_none() {
            return Ok(vec![]);
        }
        Ok(vec![CartEvent::CartCleared { at: now }])
    }

    /// Stores the coupon terms. Eligibility is the caller's concern.
    pub fn apply_coupon(
        &self,
        coupon: AppliedCoupon,
        now: DateTime<Utc>,
    ) -> Result<Vec<CartEvent>, CartError> {
        self.ensure_exists()?;
        Ok(vec![CartEvent::CouponApplied { coupon, at: now }])
    }

    pub fn remove_coupon(&self, now: DateTime<Utc>) -> Result<Vec<CartEvent>, CartError> {
        self.ensure_exists()?;
        if self.coupon.is_none() {
            return Ok(vec![]);
        }
        Ok(vec![CartEvent::CouponRemoved { at: now }])
    }

    /// Expires a cart that has been idle longer than `ttl`.
    pub fn expire_if_stale(
        &self,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Vec<CartEvent>, CartError> {
        self.ensure_exists()?;
        if !self.is_stale(now, ttl) || (self.items.is_empty() && self.coupon.is_none()) {
            return Ok(vec![]);
        }
        Ok(vec![CartEvent::CartExpired { at: now }])
    }

    fn ensure_exists(&self) -> Result<(), CartError> {
        if self.id.is_none() {
            return Err(CartError::NotFound);
        }
        Ok(())
    }
}

impl Cart {
    fn line_mut(
        &mut self,
        product_id: AggregateId,
        variant: Option<&Variant>,
    ) -> Option<&mut CartItem> {
        self.items
            .iter_mut()
            .find(|item| item.matches(product_id, variant))
    }
}
