//! Catalog-aware cart operations.

use common::{AggregateId, UserId};
use domain::coupon::normalize_code;
use domain::{Cart, Ineligibility, Product, Variant};
use event_store::EventStore;

use crate::context::DomainServices;
use crate::error::{CheckoutError, Result};
use crate::steps::ensure_in_stock;

/// Cart operations that consult the catalog and coupons before touching the
/// cart. The cart aggregate itself trusts its callers.
pub struct CartManager<S: EventStore> {
    services: DomainServices<S>,
}

impl<S: EventStore> CartManager<S> {
    pub fn new(services: DomainServices<S>) -> Self {
        Self { services }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_cart(&self, user_id: UserId) -> Result<Cart> {
        Ok(self.services.carts.get_cart(user_id).await?)
    }

    /// Adds a product at its current price.
    #[tracing::instrument(skip(self))]
    pub async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: AggregateId,
        quantity: u32,
        variant: Option<Variant>,
    ) -> Result<Cart> {
        if quantity == 0 {
            return Err(CheckoutError::InvalidQuantity(0));
        }
        let product = self.purchasable(product_id).await?;
        ensure_in_stock(&product, product_id, quantity)?;

        Ok(self
            .services
            .carts
            .add_item(user_id, product_id, quantity, variant, product.price())
            .await?)
    }

    /// Sets a line's quantity; zero removes the line.
    #[tracing::instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: UserId,
        product_id: AggregateId,
        quantity: i64,
        variant: Option<Variant>,
    ) -> Result<Cart> {
        if quantity < 0 {
            return Err(CheckoutError::InvalidQuantity(quantity));
        }
        if quantity > 0 {
            let requested =
                u32::try_from(quantity).map_err(|_| CheckoutError::InvalidQuantity(quantity))?;
            if let Some(product) = self.services.products.get_product(product_id).await? {
                ensure_in_stock(&product, product_id, requested)?;
            }
        }

        Ok(self
            .services
            .carts
            .update_item_quantity(user_id, product_id, quantity, variant)
            .await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: UserId,
        product_id: AggregateId,
        variant: Option<Variant>,
    ) -> Result<Cart> {
        Ok(self
            .services
            .carts
            .remove_item(user_id, product_id, variant)
            .await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: UserId) -> Result<Cart> {
        Ok(self.services.carts.clear_cart(user_id).await?)
    }

    /// Validates a coupon for this user and cart, then stores its terms on
    /// the cart.
    #[tracing::instrument(skip(self))]
    pub async fn apply_coupon(&self, user_id: UserId, code: &str) -> Result<Cart> {
        let code = normalize_code(code);
        let coupon = self
            .services
            .coupons
            .get_by_code(&code)
            .await?
            .ok_or_else(|| CheckoutError::CouponNotFound(code.clone()))?;

        let now = self.services.clock.now();
        coupon
            .eligibility(user_id, now, None)
            .map_err(CheckoutError::CouponIneligible)?;

        let cart = self.services.carts.get_cart(user_id).await?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        if cart.subtotal() < coupon.minimum_purchase() {
            return Err(CheckoutError::CouponIneligible(
                Ineligibility::MinimumNotMet {
                    minimum: coupon.minimum_purchase(),
                },
            ));
        }

        let applied = coupon
            .applied()
            .ok_or_else(|| CheckoutError::CouponNotFound(code.clone()))?;
        let cart = self.services.carts.apply_coupon(user_id, applied).await?;
        tracing::info!(%user_id, %code, discount = %cart.discount_amount(), "Coupon applied");
        Ok(cart)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_coupon(&self, user_id: UserId) -> Result<Cart> {
        Ok(self.services.carts.remove_coupon(user_id).await?)
    }

    async fn purchasable(&self, product_id: AggregateId) -> Result<Product> {
        let product = self
            .services
            .products
            .get_product(product_id)
            .await?
            .ok_or(CheckoutError::ProductNotFound(product_id))?;
        if !product.is_purchasable() {
            return Err(CheckoutError::ProductUnavailable(product_id));
        }
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use domain::{
        Aggregate, Discount, ManualClock, Money, NewCoupon, NewProduct, ProductStatus,
    };
    use event_store::InMemoryEventStore;

    use super::*;

    struct Fixture {
        manager: CartManager<InMemoryEventStore>,
        services: DomainServices<InMemoryEventStore>,
        user: UserId,
    }

    fn fixture() -> Fixture {
        let services = DomainServices::new(
            InMemoryEventStore::new(),
            Arc::new(ManualClock::default()),
        );
        Fixture {
            manager: CartManager::new(services.clone()),
            services,
            user: UserId::new(),
        }
    }

    async fn product(services: &DomainServices<InMemoryEventStore>, quantity: u32) -> AggregateId {
        services
            .products
            .create_product(NewProduct {
                name: "Kettle".to_string(),
                sku: "KET-1".to_string(),
                price: Money::from_dollars(25),
                image: None,
                seller: None,
                quantity,
                low_stock_threshold: None,
            })
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap()
    }

    async fn coupon(services: &DomainServices<InMemoryEventStore>, minimum: Money) {
        services
            .coupons
            .create_coupon(
                NewCoupon {
                    code: "SAVE10".to_string(),
                    description: None,
                    discount: Discount::Percentage { percent: 10 },
                    minimum_purchase: minimum,
                    maximum_discount: Some(Money::from_dollars(5)),
                    usage_limit: None,
                    usage_limit_per_user: 1,
                    starts_at: Utc::now() - Duration::days(1),
                    ends_at: Utc::now() + Duration::days(1),
                },
                None,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn add_captures_live_price() {
        let f = fixture();
        let id = product(&f.services, 5).await;

        let cart = f.manager.add_to_cart(f.user, id, 2, None).await.unwrap();
        f.services
            .products
            .change_price(id, Money::from_dollars(99))
            .await
            .unwrap();
        let cart_after = f.manager.get_cart(f.user).await.unwrap();

        assert_eq!(cart.subtotal(), Money::from_dollars(50));
        assert_eq!(cart_after.subtotal(), Money::from_dollars(50));
    }

    #[tokio::test]
    async fn add_refuses_more_than_available() {
        let f = fixture();
        let id = product(&f.services, 2).await;

        let err = f.manager.add_to_cart(f.user, id, 3, None).await.unwrap_err();
        assert_eq!(err.code(), "out_of_stock");
        assert!(f.manager.get_cart(f.user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_unknown_or_inactive_product_fails() {
        let f = fixture();
        let err = f
            .manager
            .add_to_cart(f.user, AggregateId::new(), 1, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "product_not_found");

        let id = product(&f.services, 5).await;
        f.services
            .products
            .set_status(id, ProductStatus::Inactive)
            .await
            .unwrap();
        let err = f.manager.add_to_cart(f.user, id, 1, None).await.unwrap_err();
        assert_eq!(err.code(), "product_unavailable");
    }

    #[tokio::test]
    async fn update_rejects_negative_and_removes_on_zero() {
        let f = fixture();
        let id = product(&f.services, 5).await;
        f.manager.add_to_cart(f.user, id, 1, None).await.unwrap();

        let err = f.manager.update_item(f.user, id, -1, None).await.unwrap_err();
        assert_eq!(err.code(), "invalid_quantity");

        let err = f.manager.update_item(f.user, id, 9, None).await.unwrap_err();
        assert_eq!(err.code(), "out_of_stock");

        let cart = f.manager.update_item(f.user, id, 0, None).await.unwrap();
        assert!(cart.is_empty());

        let err = f.manager.update_item(f.user, id, 1, None).await.unwrap_err();
        assert_eq!(err.code(), "item_not_found");
    }

    #[tokio::test]
    async fn coupon_requires_non_empty_cart() {
        let f = fixture();
        coupon(&f.services, Money::zero()).await;

        let err = f.manager.apply_coupon(f.user, "save10").await.unwrap_err();
        assert!(matches!(err, CheckoutError::EmptyCart));
    }

    #[tokio::test]
    async fn coupon_minimum_is_checked_against_subtotal() {
        let f = fixture();
        coupon(&f.services, Money::from_dollars(100)).await;
        let id = product(&f.services, 5).await;
        f.manager.add_to_cart(f.user, id, 1, None).await.unwrap();

        let err = f.manager.apply_coupon(f.user, "SAVE10").await.unwrap_err();
        assert_eq!(err.code(), "coupon_minimum_not_met");
    }

    #[tokio::test]
    async fn unknown_coupon_is_not_found() {
        let f = fixture();
        let err = f.manager.apply_coupon(f.user, "nope").await.unwrap_err();
        assert_eq!(err.code(), "coupon_not_found");
    }

    #[tokio::test]
    async fn applied_coupon_discounts_cart() {
        let f = fixture();
        coupon(&f.services, Money::zero()).await;
        let id = product(&f.services, 5).await;
        f.manager.add_to_cart(f.user, id, 4, None).await.unwrap();

        let cart = f.manager.apply_coupon(f.user, " save10 ").await.unwrap();
        // 10% of 100 is 10, capped at 5
        assert_eq!(cart.discount_amount(), Money::from_dollars(5));
        assert_eq!(cart.total(), Money::from_dollars(95));

        let cart = f.manager.remove_coupon(f.user).await.unwrap();
        assert!(cart.coupon().is_none());
    }
}
