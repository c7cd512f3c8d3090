//! Read model views for the CQRS query side.

pub mod customer_orders;
pub mod inventory;
pub mod order_stats;

pub use customer_orders::{CustomerOrdersView, OrderPage, OrderQuery, OrderSummary};
pub use inventory::{InventoryReport, InventoryView, StockLevel};
pub use order_stats::{OrderStats, OrderStatsView, StatusBreakdown};

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Utc};
    use common::{AggregateId, UserId};
    use domain::order::OrderPlacedData;
    use domain::{
        Address, DomainEvent, Money, OrderEvent, OrderItem, OrderPricing, PaymentMethod,
        ProductEvent, ShippingMethod,
    };
    use event_store::{EventEnvelope, Version};

    fn wrap<E: DomainEvent>(
        aggregate_type: &str,
        aggregate_id: AggregateId,
        version: i64,
        event: &E,
    ) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type(aggregate_type)
            .event_type(event.event_type())
            .version(Version::new(version))
            .payload(event)
            .unwrap()
            .build()
            .unwrap()
    }

    pub fn envelope(order_id: AggregateId, version: i64, event: &OrderEvent) -> EventEnvelope {
        wrap("Order", order_id, version, event)
    }

    pub fn product_envelope(
        product_id: AggregateId,
        version: i64,
        event: &ProductEvent,
    ) -> EventEnvelope {
        wrap("Product", product_id, version, event)
    }

    /// A two-unit order whose total is `total`.
    pub fn placed(
        order_id: AggregateId,
        number: &str,
        user_id: UserId,
        total: Money,
        at: DateTime<Utc>,
    ) -> OrderEvent {
        let item = OrderItem::new(AggregateId::new(), "Mug", "MUG-1", 2, Money::from_cents(500));
        OrderEvent::OrderPlaced(OrderPlacedData {
            order_id,
            order_number: number.to_string(),
            user_id,
            items: vec![item],
            pricing: OrderPricing {
                total,
                ..OrderPricing::default()
            },
            coupon_code: None,
            shipping_address: Address::default(),
            billing_address: Address::default(),
            payment_method: PaymentMethod::Card,
            shipping_method: ShippingMethod::Standard,
            customer_note: None,
            placed_at: at,
        })
    }
}
