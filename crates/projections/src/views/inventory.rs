//! Inventory read model: stock levels and value across the catalog.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use domain::{Aggregate, Money, Product, ProductEvent, ProductStatus};
use event_store::EventEnvelope;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryReport {
    pub total_products: usize,
    pub active: usize,
    pub out_of_stock: usize,
    /// Price times on-hand quantity, summed over active products.
    pub total_inventory_value: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: AggregateId,
    pub name: String,
    pub sku: String,
    pub quantity: u32,
    pub reserved: u32,
    pub available: u32,
    pub low_stock_threshold: u32,
}

impl StockLevel {
    fn of(product_id: AggregateId, product: &Product) -> Self {
        let stock = product.stock();
        Self {
            product_id,
            name: product.name().to_string(),
            sku: product.sku().to_string(),
            quantity: stock.quantity,
            reserved: stock.reserved,
            available: stock.available(),
            low_stock_threshold: stock.low_stock_threshold,
        }
    }
}

struct InventoryState {
    products: HashMap<AggregateId, Product>,
    position: ProjectionPosition,
}

/// Read model over product streams.
///
/// Folds events through the `Product` aggregate itself, so derived state such
/// as the automatic `out_of_stock` flip matches the write side exactly.
#[derive(Clone)]
pub struct InventoryView {
    state: Arc<RwLock<InventoryState>>,
}

impl InventoryView {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(InventoryState {
                products: HashMap::new(),
                position: ProjectionPosition::zero(),
            })),
        }
    }

    pub async fn report(&self) -> InventoryReport {
        let state = self.state.read().await;
        let products = state.products.values();
        let mut report = InventoryReport {
            total_products: 0,
            active: 0,
            out_of_stock: 0,
            total_inventory_value: Money::zero(),
        };
        for product in products {
            report.total_products += 1;
            match product.status() {
                ProductStatus::Active => {
                    report.active += 1;
                    report.total_inventory_value += product.price().multiply(product.stock().quantity);
                }
                ProductStatus::OutOfStock => report.out_of_stock += 1,
                ProductStatus::Draft | ProductStatus::Inactive => {}
            }
        }
        report
    }

    /// Active products at or below their low-stock threshold, lowest first.
    pub async fn low_stock(&self) -> Vec<StockLevel> {
        let state = self.state.read().await;
        let mut levels: Vec<StockLevel> = state
            .products
            .iter()
            .filter(|(_, p)| p.status() == ProductStatus::Active && p.stock().is_low())
            .map(|(&id, p)| StockLevel::of(id, p))
            .collect();
        levels.sort_by(|a, b| a.quantity.cmp(&b.quantity).then_with(|| a.sku.cmp(&b.sku)));
        levels
    }

    pub async fn stock_level(&self, product_id: AggregateId) -> Option<StockLevel> {
        self.state
            .read()
            .await
            .products
            .get(&product_id)
            .map(|p| StockLevel::of(product_id, p))
    }
}

impl Default for InventoryView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for InventoryView {
    fn name(&self) -> &'static str {
        "InventoryView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;
        if event.aggregate_type == Product::aggregate_type() {
            let product_event: ProductEvent = event.decode()?;
            let product = state.products.entry(event.aggregate_id).or_default();
            product.apply(product_event);
            product.set_version(event.version);
        }
        state.position = state.position.advance();
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.products.clear();
        state.position = ProjectionPosition::zero();
        Ok(())
    }
}

impl ReadModel for InventoryView {
    fn name(&self) -> &'static str {
        "InventoryView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.products.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::test_support::product_envelope;
    use chrono::Utc;
    use domain::product::ProductCreatedData;

    async fn create(view: &InventoryView, sku: &str, price: Money, quantity: u32) -> AggregateId {
        let product_id = AggregateId::new();
        let event = ProductEvent::ProductCreated(ProductCreatedData {
            product_id,
            name: format!("Item {sku}"),
            sku: sku.to_string(),
            price,
            image: None,
            seller: None,
            quantity,
            low_stock_threshold: 5,
            created_at: Utc::now(),
        });
        view.handle(&product_envelope(product_id, 1, &event))
            .await
            .unwrap();
        product_id
    }

    #[tokio::test]
    async fn report_values_active_stock() {
        let view = InventoryView::new();
        create(&view, "A", Money::from_dollars(10), 3).await;
        create(&view, "B", Money::from_cents(250), 20).await;

        let report = view.report().await;

        assert_eq!(report.total_products, 2);
        assert_eq!(report.active, 2);
        assert_eq!(report.out_of_stock, 0);
        assert_eq!(report.total_inventory_value, Money::from_dollars(80));
    }

    #[tokio::test]
    async fn selling_out_moves_product_to_out_of_stock() {
        let view = InventoryView::new();
        let product_id = create(&view, "A", Money::from_dollars(10), 2).await;
        let events = [
            ProductEvent::StockReserved { quantity: 2 },
            ProductEvent::StockDeducted { quantity: 2 },
        ];
        for (n, event) in events.iter().enumerate() {
            view.handle(&product_envelope(product_id, n as i64 + 2, event))
                .await
                .unwrap();
        }

        let report = view.report().await;
        assert_eq!(report.active, 0);
        assert_eq!(report.out_of_stock, 1);
        assert_eq!(report.total_inventory_value, Money::zero());
        assert!(view.low_stock().await.is_empty());
    }

    #[tokio::test]
    async fn low_stock_lists_active_products_at_threshold() {
        let view = InventoryView::new();
        create(&view, "PLENTY", Money::from_dollars(1), 50).await;
        let edge = create(&view, "EDGE", Money::from_dollars(1), 5).await;
        let scarce = create(&view, "SCARCE", Money::from_dollars(1), 1).await;
        view.handle(&product_envelope(scarce, 2, &ProductEvent::StockReserved { quantity: 1 }))
            .await
            .unwrap();

        let low = view.low_stock().await;

        let ids: Vec<_> = low.iter().map(|l| l.product_id).collect();
        assert_eq!(ids, vec![scarce, edge]);
        assert_eq!(low[0].reserved, 1);
        assert_eq!(low[0].available, 0);
    }

    #[tokio::test]
    async fn order_events_are_skipped() {
        let view = InventoryView::new();
        let order_id = AggregateId::new();
        let event = crate::views::test_support::placed(
            order_id,
            "ORD-1",
            common::UserId::new(),
            Money::from_dollars(1),
            Utc::now(),
        );
        view.handle(&crate::views::test_support::envelope(order_id, 1, &event))
            .await
            .unwrap();

        assert_eq!(view.report().await.total_products, 0);
        assert_eq!(view.position().await.events_processed, 1);
    }
}
