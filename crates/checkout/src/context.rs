//! Shared handles to the aggregate services.

use std::sync::Arc;

use domain::{CartService, Clock, CouponService, OrderService, ProductService};
use event_store::EventStore;

use crate::policy::ServiceSettings;

/// One service per aggregate, all writing to the same store.
pub struct DomainServices<S: EventStore> {
    pub products: Arc<ProductService<S>>,
    pub coupons: Arc<CouponService<S>>,
    pub carts: Arc<CartService<S>>,
    pub orders: Arc<OrderService<S>>,
    pub clock: Arc<dyn Clock>,
}

impl<S: EventStore + Clone> DomainServices<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self::with_settings(store, clock, ServiceSettings::default())
    }

    pub fn with_settings(store: S, clock: Arc<dyn Clock>, settings: ServiceSettings) -> Self {
        Self {
            products: Arc::new(
                ProductService::new(store.clone(), Arc::clone(&clock))
                    .with_retry_attempts(settings.retry_attempts)
                    .with_low_stock_threshold(settings.low_stock_threshold),
            ),
            coupons: Arc::new(
                CouponService::new(store.clone(), Arc::clone(&clock))
                    .with_retry_attempts(settings.retry_attempts),
            ),
            carts: Arc::new(
                CartService::new(store.clone(), Arc::clone(&clock)).with_ttl(settings.cart_ttl),
            ),
            orders: Arc::new(
                OrderService::new(store, Arc::clone(&clock))
                    .with_retry_attempts(settings.retry_attempts)
                    .with_return_window_days(settings.return_window_days),
            ),
            clock,
        }
    }
}

impl<S: EventStore> Clone for DomainServices<S> {
    fn clone(&self) -> Self {
        Self {
            products: Arc::clone(&self.products),
            coupons: Arc::clone(&self.coupons),
            carts: Arc::clone(&self.carts),
            orders: Arc::clone(&self.orders),
            clock: Arc::clone(&self.clock),
        }
    }
}
