//! Product service: catalog entry creation and the stock ledger operations.

use std::sync::Arc;

use common::AggregateId;
use event_store::EventStore;

use crate::clock::Clock;
use crate::command::{CommandHandler, CommandResult, DEFAULT_RETRY_ATTEMPTS};
use crate::error::DomainError;

use super::{DEFAULT_LOW_STOCK_THRESHOLD, NewProduct, Product, ProductStatus};

/// Service for products and their stock.
///
/// Every stock write is a conditional append at the version the decision was
/// made on. A lost race reloads the product and re-runs the availability check,
/// so two shoppers can never both take the last unit.
pub struct ProductService<S: EventStore> {
    handler: CommandHandler<S, Product>,
    clock: Arc<dyn Clock>,
    retry_attempts: u32,
    low_stock_threshold: u32,
}

impl<S: EventStore> ProductService<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            handler: CommandHandler::new(store),
            clock,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
        }
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Threshold applied to products created without one.
    pub fn with_low_stock_threshold(mut self, threshold: u32) -> Self {
        self.low_stock_threshold = threshold;
        self
    }

    pub fn handler(&self) -> &CommandHandler<S, Product> {
        &self.handler
    }

    #[tracing::instrument(skip(self, product), fields(sku = %product.sku))]
    pub async fn create_product(
        &self,
        product: NewProduct,
    ) -> Result<CommandResult<Product>, DomainError> {
        let mut product = product;
        let product_id = AggregateId::new();
        product
            .low_stock_threshold
            .get_or_insert(self.low_stock_threshold);
        let now = self.clock.now();

        let result = self
            .handler
            .execute(product_id, |p| p.create(product_id, product, now))
            .await?;
        tracing::info!(%product_id, "Product created");
        Ok(result)
    }

    /// Loads a product. Returns None if it doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, product_id: AggregateId) -> Result<Option<Product>, DomainError> {
        self.handler.load_existing(product_id).await
    }

    /// `available >= quantity`, evaluated against the latest state.
    pub async fn is_in_stock(
        &self,
        product_id: AggregateId,
        quantity: u32,
    ) -> Result<bool, DomainError> {
        Ok(self
            .get_product(product_id)
            .await?
            .is_some_and(|p| p.is_in_stock(quantity)))
    }

    #[tracing::instrument(skip(self))]
    pub async fn reserve_stock(
        &self,
        product_id: AggregateId,
        quantity: u32,
    ) -> Result<CommandResult<Product>, DomainError> {
        self.write(product_id, |p| p.reserve(quantity)).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn release_stock(
        &self,
        product_id: AggregateId,
        quantity: u32,
    ) -> Result<CommandResult<Product>, DomainError> {
        self.write(product_id, |p| p.release(quantity)).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn deduct_stock(
        &self,
        product_id: AggregateId,
        quantity: u32,
    ) -> Result<CommandResult<Product>, DomainError> {
        self.write(product_id, |p| p.deduct(quantity)).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn revert_deduction(
        &self,
        product_id: AggregateId,
        quantity: u32,
    ) -> Result<CommandResult<Product>, DomainError> {
        self.write(product_id, |p| p.revert_deduction(quantity))
            .await
    }

    /// Puts sold units back on the shelf after a confirmed order is cancelled.
    #[tracing::instrument(skip(self))]
    pub async fn restore_stock(
        &self,
        product_id: AggregateId,
        quantity: u32,
    ) -> Result<CommandResult<Product>, DomainError> {
        self.write(product_id, |p| p.restore(quantity)).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn restock(
        &self,
        product_id: AggregateId,
        quantity: u32,
    ) -> Result<CommandResult<Product>, DomainError> {
        self.write(product_id, |p| p.restock(quantity)).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn change_price(
        &self,
        product_id: AggregateId,
        price: crate::money::Money,
    ) -> Result<CommandResult<Product>, DomainError> {
        self.write(product_id, |p| p.change_price(price)).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_status(
        &self,
        product_id: AggregateId,
        status: ProductStatus,
    ) -> Result<CommandResult<Product>, DomainError> {
        self.write(product_id, |p| p.set_status(status)).await
    }

    async fn write<F>(
        &self,
        product_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<Product>, DomainError>
    where
        F: Fn(&Product) -> Result<Vec<super::ProductEvent>, super::StockError> + Send + Sync,
    {
        let result = self
            .handler
            .execute_with_retry(product_id, self.retry_attempts, command_fn)
            .await?;
        self.handler
            .save_snapshot_if_due(product_id, &result)
            .await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregate;
    use crate::clock::SystemClock;
    use crate::money::Money;
    use crate::product::StockError;
    use event_store::{EventStoreExt, InMemoryEventStore};

    fn service(store: InMemoryEventStore) -> ProductService<InMemoryEventStore> {
        ProductService::new(store, Arc::new(SystemClock))
    }

    fn desk(quantity: u32) -> NewProduct {
        NewProduct {
            name: "Walnut Desk".to_string(),
            sku: "DESK-01".to_string(),
            price: Money::from_dollars(20),
            image: Some("desk.png".to_string()),
            seller: None,
            quantity,
            low_stock_threshold: None,
        }
    }

    #[tokio::test]
    async fn create_applies_default_threshold() {
        let service = service(InMemoryEventStore::new()).with_low_stock_threshold(3);

        let result = service.create_product(desk(5)).await.unwrap();

        assert_eq!(result.aggregate.stock().low_stock_threshold, 3);
        assert_eq!(result.aggregate.status(), ProductStatus::Active);
        assert!(result.aggregate.id().is_some());
    }

    #[tokio::test]
    async fn stock_operations_on_unknown_product_fail() {
        let service = service(InMemoryEventStore::new());

        let err = service
            .reserve_stock(AggregateId::new(), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Stock(StockError::NotFound)));
        assert_eq!(err.code(), "product_not_found");
    }

    #[tokio::test]
    async fn reserve_deduct_flow() {
        let service = service(InMemoryEventStore::new());
        let id = service
            .create_product(desk(2))
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();

        service.reserve_stock(id, 1).await.unwrap();
        let product = service.deduct_stock(id, 1).await.unwrap().aggregate;

        assert_eq!(product.stock().quantity, 1);
        assert_eq!(product.stock().reserved, 0);
        assert_eq!(product.sales(), 1);
        assert!(service.is_in_stock(id, 1).await.unwrap());
        assert!(!service.is_in_stock(id, 2).await.unwrap());
    }

    #[tokio::test]
    async fn snapshots_every_fifty_events() {
        let store = InMemoryEventStore::new();
        let service = service(store.clone());
        let id = service
            .create_product(desk(100))
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();

        for _ in 0..49 {
            service.reserve_stock(id, 1).await.unwrap();
        }

        let snapshot = store.get_snapshot(id).await.unwrap().unwrap();
        assert_eq!(snapshot.version.as_i64(), 50);
        let (snapshot, tail) = store.load_aggregate(id).await.unwrap();
        assert!(snapshot.is_some());
        assert!(tail.is_empty());

        let product = service.get_product(id).await.unwrap().unwrap();
        assert_eq!(product.stock().reserved, 49);
    }
}
