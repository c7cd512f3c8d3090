//! Cart service.

use std::sync::Arc;

use chrono::Duration;
use common::{AggregateId, UserId};
use event_store::EventStore;

use crate::aggregate::Aggregate;
use crate::clock::Clock;
use crate::command::{CommandHandler, DEFAULT_RETRY_ATTEMPTS};
use crate::coupon::AppliedCoupon;
use crate::error::DomainError;
use crate::money::Money;

use super::{Cart, CartError, CartEvent, Variant};

pub const DEFAULT_CART_TTL_DAYS: i64 = 30;

/// Each user owns exactly one cart stream.
pub fn cart_id(user_id: UserId) -> AggregateId {
    AggregateId::from_key("cart", &user_id.to_string())
}

/// Service for carts.
///
/// Every operation first brings the cart into existence or expires it when it
/// has been idle too long, then runs the requested change. Both happen in one
/// append.
pub struct CartService<S: EventStore> {
    handler: CommandHandler<S, Cart>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl<S: EventStore> CartService<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            handler: CommandHandler::new(store),
            clock,
            ttl: Duration::days(DEFAULT_CART_TTL_DAYS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns the user's cart, creating it on first access.
    #[tracing::instrument(skip(self))]
    pub async fn get_cart(&self, user_id: UserId) -> Result<Cart, DomainError> {
        self.mutate(user_id, |_, _| Ok(vec![])).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: AggregateId,
        quantity: u32,
        variant: Option<Variant>,
        price: Money,
    ) -> Result<Cart, DomainError> {
        self.mutate(user_id, |cart, now| {
            cart.add_item(product_id, quantity, variant.clone(), price, now)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        user_id: UserId,
        product_id: AggregateId,
        quantity: i64,
        variant: Option<Variant>,
    ) -> Result<Cart, DomainError> {
        self.mutate(user_id, |cart, now| {
            cart.update_item_quantity(product_id, quantity, variant.clone(), now)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: UserId,
        product_id: AggregateId,
        variant: Option<Variant>,
    ) -> Result<Cart, DomainError> {
        self.mutate(user_id, |cart, now| {
            cart.remove_item(product_id, variant.clone(), now)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: UserId) -> Result<Cart, DomainError> {
        self.mutate(user_id, |cart, now| cart.clear(now)).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn apply_coupon(
        &self,
        user_id: UserId,
        coupon: AppliedCoupon,
    ) -> Result<Cart, DomainError> {
        self.mutate(user_id, |cart, now| cart.apply_coupon(coupon.clone(), now))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_coupon(&self, user_id: UserId) -> Result<Cart, DomainError> {
        self.mutate(user_id, |cart, now| cart.remove_coupon(now)).await
    }

    async fn mutate<F>(&self, user_id: UserId, operation: F) -> Result<Cart, DomainError>
    where
        F: Fn(&Cart, chrono::DateTime<chrono::Utc>) -> Result<Vec<CartEvent>, CartError>
            + Send
            + Sync,
    {
        let id = cart_id(user_id);
        let now = self.clock.now();
        let ttl = self.ttl;

        let result = self
            .handler
            .execute_with_retry(id, DEFAULT_RETRY_ATTEMPTS, |cart| {
                let mut events = if cart.id().is_none() {
                    cart.create(id, user_id, now)?
                } else {
                    cart.expire_if_stale(now, ttl)?
                };
                if events.is_empty() {
                    events = operation(cart, now)?;
                } else {
                    let mut staged = cart.clone();
                    staged.apply_events(events.clone());
                    events.extend(operation(&staged, now)?);
                }
                Ok(events)
            })
            .await?;

        if result
            .events
            .iter()
            .any(|e| matches!(e, CartEvent::CartExpired { .. }))
        {
            tracing::info!(%user_id, "Expired idle cart");
        }
        Ok(result.aggregate)
    }
}

#[cfg(test)]
mod tests {
    use event_store::InMemoryEventStore;

    use super::*;
    use crate::clock::ManualClock;

    fn service(clock: Arc<ManualClock>) -> CartService<InMemoryEventStore> {
        CartService::new(InMemoryEventStore::new(), clock)
    }

    #[tokio::test]
    async fn cart_is_created_on_first_access() {
        let service = service(Arc::new(ManualClock::default()));
        let user = UserId::new();

        let cart = service.get_cart(user).await.unwrap();

        assert_eq!(cart.id(), Some(cart_id(user)));
        assert_eq!(cart.user_id(), Some(user));
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn first_add_creates_cart_in_same_append() {
        let store = InMemoryEventStore::new();
        let service = CartService::new(store.clone(), Arc::new(ManualClock::default()));
        let user = UserId::new();

        let cart = service
            .add_item(user, AggregateId::new(), 2, None, Money::from_cents(1250))
            .await
            .unwrap();

        assert_eq!(cart.subtotal(), Money::from_cents(2500));
        assert_eq!(cart.version().as_i64(), 2);
        assert_eq!(store.event_count().await, 2);
    }

    #[tokio::test]
    async fn update_on_missing_line_fails() {
        let service = service(Arc::new(ManualClock::default()));
        let err = service
            .update_item_quantity(UserId::new(), AggregateId::new(), 3, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "item_not_found");
    }

    #[tokio::test]
    async fn idle_cart_is_emptied_on_next_access() {
        let clock = Arc::new(ManualClock::default());
        let service = service(clock.clone());
        let user = UserId::new();
        let product = AggregateId::new();
        service
            .add_item(user, product, 1, None, Money::from_cents(900))
            .await
            .unwrap();

        clock.advance(Duration::days(31));
        let cart = service
            .add_item(user, product, 1, None, Money::from_cents(1100))
            .await
            .unwrap();

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.item(product, None).unwrap().quantity, 1);
        assert_eq!(cart.subtotal(), Money::from_cents(1100));
    }

    #[tokio::test]
    async fn users_have_separate_carts() {
        let service = service(Arc::new(ManualClock::default()));
        let alice = UserId::new();
        let bob = UserId::new();

        service
            .add_item(alice, AggregateId::new(), 1, None, Money::from_cents(100))
            .await
            .unwrap();

        assert!(service.get_cart(bob).await.unwrap().is_empty());
        assert_eq!(service.get_cart(alice).await.unwrap().total_items(), 1);
    }
}
