//! Stock steps shared by checkout, cancellation and payment handling.
//!
//! Multi-product steps are not atomic across products. Each one undoes its
//! own partial progress before reporting a failure.

use std::collections::BTreeMap;

use common::AggregateId;
use domain::{DomainError, OrderItem, Product, ProductService};
use event_store::EventStore;

use crate::error::CheckoutError;

/// Units of one product touched by an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockLine {
    pub product_id: AggregateId,
    pub quantity: u32,
}

/// Collapses order lines into one entry per product. Variants of the same
/// product share a stock record.
pub fn stock_lines(items: &[OrderItem]) -> Vec<StockLine> {
    let mut totals: BTreeMap<AggregateId, u32> = BTreeMap::new();
    for item in items {
        let total = totals.entry(item.product_id).or_default();
        *total = total.saturating_add(item.quantity);
    }
    totals
        .into_iter()
        .map(|(product_id, quantity)| StockLine {
            product_id,
            quantity,
        })
        .collect()
}

/// Checks availability without holding anything.
pub fn ensure_in_stock(
    product: &Product,
    product_id: AggregateId,
    quantity: u32,
) -> Result<(), CheckoutError> {
    if product.is_in_stock(quantity) {
        return Ok(());
    }
    Err(CheckoutError::OutOfStock {
        product_id,
        name: product.name().to_string(),
        requested: quantity,
        available: product.stock().available(),
    })
}

/// Reserves every line, releasing what was already reserved if one fails.
pub async fn reserve_all<S: EventStore>(
    products: &ProductService<S>,
    lines: &[StockLine],
) -> Result<(), DomainError> {
    for (index, line) in lines.iter().enumerate() {
        if let Err(err) = products.reserve_stock(line.product_id, line.quantity).await {
            tracing::warn!(
                product_id = %line.product_id,
                quantity = line.quantity,
                error = %err,
                "Reservation failed, releasing earlier lines"
            );
            release_all(products, &lines[..index]).await;
            return Err(err);
        }
    }
    Ok(())
}

/// Releases reservations. Best effort: a failure is logged and the rest of
/// the lines are still released.
pub async fn release_all<S: EventStore>(products: &ProductService<S>, lines: &[StockLine]) {
    for line in lines {
        match products.release_stock(line.product_id, line.quantity).await {
            Ok(_) => metrics::counter!("checkout_compensations_total", "step" => "release")
                .increment(1),
            Err(err) => tracing::error!(
                product_id = %line.product_id,
                quantity = line.quantity,
                error = %err,
                "Failed to release reservation"
            ),
        }
    }
}

/// Turns reservations into sales, reverting earlier lines if one fails.
pub async fn deduct_all<S: EventStore>(
    products: &ProductService<S>,
    lines: &[StockLine],
) -> Result<(), DomainError> {
    for (index, line) in lines.iter().enumerate() {
        if let Err(err) = products.deduct_stock(line.product_id, line.quantity).await {
            tracing::warn!(
                product_id = %line.product_id,
                quantity = line.quantity,
                error = %err,
                "Deduction failed, reverting earlier lines"
            );
            revert_all(products, &lines[..index]).await;
            return Err(err);
        }
    }
    Ok(())
}

/// Moves deducted units back into reservation.
pub async fn revert_all<S: EventStore>(products: &ProductService<S>, lines: &[StockLine]) {
    for line in lines {
        match products.revert_deduction(line.product_id, line.quantity).await {
            Ok(_) => metrics::counter!("checkout_compensations_total", "step" => "revert_deduction")
                .increment(1),
            Err(err) => tracing::error!(
                product_id = %line.product_id,
                quantity = line.quantity,
                error = %err,
                "Failed to revert deduction"
            ),
        }
    }
}

/// Puts sold units back on hand after a confirmed order is cancelled.
pub async fn restore_all<S: EventStore>(products: &ProductService<S>, lines: &[StockLine]) {
    for line in lines {
        if let Err(err) = products.restore_stock(line.product_id, line.quantity).await {
            tracing::error!(
                product_id = %line.product_id,
                quantity = line.quantity,
                error = %err,
                "Failed to restore stock"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use domain::{Aggregate, Money, NewProduct, SystemClock, Variant};
    use event_store::InMemoryEventStore;

    use super::*;

    fn product(sku: &str, quantity: u32) -> NewProduct {
        NewProduct {
            name: sku.to_string(),
            sku: sku.to_string(),
            price: Money::from_dollars(10),
            image: None,
            seller: None,
            quantity,
            low_stock_threshold: None,
        }
    }

    async fn create(products: &ProductService<InMemoryEventStore>, sku: &str, qty: u32) -> AggregateId {
        products
            .create_product(product(sku, qty))
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap()
    }

    #[test]
    fn variants_share_one_stock_line() {
        let shirt = AggregateId::new();
        let items = vec![
            OrderItem::new(shirt, "Shirt", "S-1", 1, Money::from_dollars(5))
                .with_variant(Some(Variant::new("size", "M"))),
            OrderItem::new(shirt, "Shirt", "S-1", 2, Money::from_dollars(5))
                .with_variant(Some(Variant::new("size", "L"))),
        ];
        assert_eq!(
            stock_lines(&items),
            vec![StockLine {
                product_id: shirt,
                quantity: 3
            }]
        );
    }

    #[tokio::test]
    async fn failed_reservation_releases_earlier_lines() {
        let products = ProductService::new(InMemoryEventStore::new(), Arc::new(SystemClock));
        let plenty = create(&products, "A", 10).await;
        let scarce = create(&products, "B", 1).await;

        let lines = [
            StockLine {
                product_id: plenty,
                quantity: 4,
            },
            StockLine {
                product_id: scarce,
                quantity: 2,
            },
        ];
        let err = reserve_all(&products, &lines).await.unwrap_err();
        assert_eq!(err.code(), "insufficient_stock");

        let a = products.get_product(plenty).await.unwrap().unwrap();
        let b = products.get_product(scarce).await.unwrap().unwrap();
        assert_eq!(a.stock().reserved, 0);
        assert_eq!(b.stock().reserved, 0);
    }

    #[tokio::test]
    async fn failed_deduction_reverts_earlier_lines() {
        let products = ProductService::new(InMemoryEventStore::new(), Arc::new(SystemClock));
        let first = create(&products, "A", 5).await;
        let second = create(&products, "B", 5).await;
        products.reserve_stock(first, 2).await.unwrap();

        let lines = [
            StockLine {
                product_id: first,
                quantity: 2,
            },
            StockLine {
                product_id: second,
                quantity: 1,
            },
        ];
        let err = deduct_all(&products, &lines).await.unwrap_err();
        assert_eq!(err.code(), "over_deduction");

        let a = products.get_product(first).await.unwrap().unwrap();
        assert_eq!(a.stock().quantity, 5);
        assert_eq!(a.stock().reserved, 2);
        assert_eq!(a.sales(), 0);
    }
}
