//! Order listing read model: one summary row per order, queryable per user.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use domain::{Aggregate, Money, Order, OrderEvent, OrderStatus, PaymentStatus};
use event_store::EventEnvelope;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// The listing row for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order_id: AggregateId,
    pub order_number: String,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total: Money,
    pub total_items: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filter and paging for order listings. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderQuery {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn first_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self {
            status: None,
            page: first_page(),
            limit: default_limit(),
        }
    }
}

impl OrderQuery {
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn page(mut self, page: u32, limit: u32) -> Self {
        self.page = page;
        self.limit = limit;
        self
    }

    fn normalized(self) -> Self {
        Self {
            status: self.status,
            page: self.page.max(1),
            limit: self.limit.clamp(1, MAX_PAGE_SIZE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPage {
    pub orders: Vec<OrderSummary>,
    pub page: u32,
    pub limit: u32,
    pub total: usize,
    pub pages: usize,
}

struct CustomerOrdersState {
    orders: HashMap<AggregateId, OrderSummary>,
    position: ProjectionPosition,
}

/// Read model listing orders newest first, per user or across the store.
#[derive(Clone)]
pub struct CustomerOrdersView {
    state: Arc<RwLock<CustomerOrdersState>>,
}

impl CustomerOrdersView {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(CustomerOrdersState {
                orders: HashMap::new(),
                position: ProjectionPosition::zero(),
            })),
        }
    }

    pub async fn get(&self, order_id: AggregateId) -> Option<OrderSummary> {
        self.state.read().await.orders.get(&order_id).cloned()
    }

    /// Orders placed by `user_id`.
    pub async fn list_for_user(&self, user_id: UserId, query: OrderQuery) -> OrderPage {
        self.list(Some(user_id), query).await
    }

    /// Every order in the store.
    pub async fn list_all(&self, query: OrderQuery) -> OrderPage {
        self.list(None, query).await
    }

    async fn list(&self, user_id: Option<UserId>, query: OrderQuery) -> OrderPage {
        let query = query.normalized();
        let state = self.state.read().await;
        let mut matching: Vec<&OrderSummary> = state
            .orders
            .values()
            .filter(|o| user_id.is_none_or(|id| o.user_id == id))
            .filter(|o| query.status.is_none_or(|status| o.status == status))
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.order_number.cmp(&a.order_number))
        });

        let total = matching.len();
        let limit = query.limit as usize;
        let orders = matching
            .into_iter()
            .skip((query.page as usize - 1) * limit)
            .take(limit)
            .cloned()
            .collect();
        OrderPage {
            orders,
            page: query.page,
            limit: query.limit,
            total,
            pages: total.div_ceil(limit),
        }
    }
}

impl Default for CustomerOrdersView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for CustomerOrdersView {
    fn name(&self) -> &'static str {
        "CustomerOrdersView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;
        if event.aggregate_type != Order::aggregate_type() {
            state.position = state.position.advance();
            return Ok(());
        }

        let order_event: OrderEvent = event.decode()?;
        let order_id = event.aggregate_id;

        match order_event {
            OrderEvent::OrderPlaced(data) => {
                state.orders.insert(
                    order_id,
                    OrderSummary {
                        order_id,
                        order_number: data.order_number,
                        user_id: data.user_id,
                        status: OrderStatus::Pending,
                        payment_status: PaymentStatus::Pending,
                        total: data.pricing.total,
                        total_items: data
                            .items
                            .iter()
                            .fold(0u32, |total, i| total.saturating_add(i.quantity)),
                        created_at: data.placed_at,
                        updated_at: data.placed_at,
                    },
                );
            }
            OrderEvent::StatusChanged(data) => {
                if let Some(summary) = state.orders.get_mut(&order_id) {
                    summary.status = data.to;
                    summary.updated_at = data.at;
                }
            }
            OrderEvent::OrderCancelled(data) => {
                if let Some(summary) = state.orders.get_mut(&order_id) {
                    summary.status = OrderStatus::Cancelled;
                    summary.updated_at = data.at;
                }
            }
            OrderEvent::PaymentSucceeded { at, .. } => {
                if let Some(summary) = state.orders.get_mut(&order_id) {
                    summary.payment_status = PaymentStatus::Paid;
                    summary.updated_at = at;
                }
            }
            OrderEvent::PaymentFailed { at, .. } => {
                if let Some(summary) = state.orders.get_mut(&order_id) {
                    summary.payment_status = PaymentStatus::Failed;
                    summary.updated_at = at;
                }
            }
            OrderEvent::PaymentRefunded(data) => {
                if let Some(summary) = state.orders.get_mut(&order_id) {
                    summary.payment_status = if data.partial {
                        PaymentStatus::PartiallyRefunded
                    } else {
                        PaymentStatus::Refunded
                    };
                    summary.updated_at = data.at;
                }
            }
            // Listing columns don't cover shipment, holds, returns or refunds in flight
            OrderEvent::InventoryHoldChanged { .. }
            | OrderEvent::RefundRequested { .. }
            | OrderEvent::RefundFailed { .. }
            | OrderEvent::ShipmentUpdated { .. }
            | OrderEvent::ReturnRequested { .. }
            | OrderEvent::ReturnStatusChanged { .. } => {}
        }

        state.position = state.position.advance();
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.orders.clear();
        state.position = ProjectionPosition::zero();
        Ok(())
    }
}

impl ReadModel for CustomerOrdersView {
    fn name(&self) -> &'static str {
        "CustomerOrdersView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.orders.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::test_support::{envelope, placed};
    use chrono::Duration;
    use domain::order::{OrderCancelledData, PaymentRefundedData, StatusChangedData};

    async fn place(
        view: &CustomerOrdersView,
        user_id: UserId,
        number: &str,
        at: DateTime<Utc>,
    ) -> AggregateId {
        let order_id = AggregateId::new();
        let event = placed(order_id, number, user_id, Money::from_dollars(20), at);
        view.handle(&envelope(order_id, 1, &event)).await.unwrap();
        order_id
    }

    #[tokio::test]
    async fn placed_order_is_listed_for_its_owner() {
        let view = CustomerOrdersView::new();
        let user = UserId::new();
        let order_id = place(&view, user, "ORD-1", Utc::now()).await;

        let page = view.list_for_user(user, OrderQuery::default()).await;
        assert_eq!(page.total, 1);
        assert_eq!(page.pages, 1);
        let summary = &page.orders[0];
        assert_eq!(summary.order_id, order_id);
        assert_eq!(summary.status, OrderStatus::Pending);
        assert_eq!(summary.total_items, 2);
        assert_eq!(summary.total, Money::from_dollars(20));

        let other = view.list_for_user(UserId::new(), OrderQuery::default()).await;
        assert_eq!(other.total, 0);
    }

    #[tokio::test]
    async fn newest_orders_come_first_and_pages_split() {
        let view = CustomerOrdersView::new();
        let user = UserId::new();
        let start = Utc::now();
        for n in 0..5 {
            place(&view, user, &format!("ORD-{n}"), start + Duration::minutes(n)).await;
        }

        let first = view
            .list_for_user(user, OrderQuery::default().page(1, 2))
            .await;
        assert_eq!(first.total, 5);
        assert_eq!(first.pages, 3);
        assert_eq!(first.orders[0].order_number, "ORD-4");
        assert_eq!(first.orders[1].order_number, "ORD-3");

        let last = view
            .list_for_user(user, OrderQuery::default().page(3, 2))
            .await;
        assert_eq!(last.orders.len(), 1);
        assert_eq!(last.orders[0].order_number, "ORD-0");
    }

    #[tokio::test]
    async fn status_filter_and_payment_updates() {
        let view = CustomerOrdersView::new();
        let user = UserId::new();
        let now = Utc::now();
        let kept = place(&view, user, "ORD-A", now).await;
        let cancelled = place(&view, user, "ORD-B", now).await;

        let event = OrderEvent::OrderCancelled(OrderCancelledData {
            from: OrderStatus::Pending,
            reason: "duplicate".to_string(),
            cancelled_by: Some(user),
            at: now,
        });
        view.handle(&envelope(cancelled, 2, &event)).await.unwrap();

        let event = OrderEvent::PaymentSucceeded {
            transaction_id: "pi_1".to_string(),
            provider: "stripe".to_string(),
            at: now,
        };
        view.handle(&envelope(kept, 2, &event)).await.unwrap();
        let event = OrderEvent::StatusChanged(StatusChangedData {
            from: OrderStatus::Pending,
            to: OrderStatus::Confirmed,
            note: None,
            updated_by: None,
            at: now,
        });
        view.handle(&envelope(kept, 3, &event)).await.unwrap();
        let event = OrderEvent::PaymentRefunded(PaymentRefundedData {
            amount: Money::from_dollars(5),
            reason: "dent".to_string(),
            refund_id: None,
            partial: true,
            at: now,
        });
        view.handle(&envelope(kept, 4, &event)).await.unwrap();

        let page = view
            .list_all(OrderQuery::default().with_status(OrderStatus::Cancelled))
            .await;
        assert_eq!(page.total, 1);
        assert_eq!(page.orders[0].order_id, cancelled);

        let summary = view.get(kept).await.unwrap();
        assert_eq!(summary.status, OrderStatus::Confirmed);
        assert_eq!(summary.payment_status, PaymentStatus::PartiallyRefunded);
    }

    #[tokio::test]
    async fn zero_page_and_oversized_limit_are_clamped() {
        let view = CustomerOrdersView::new();
        let user = UserId::new();
        place(&view, user, "ORD-1", Utc::now()).await;

        let page = view
            .list_for_user(user, OrderQuery::default().page(0, 5000))
            .await;
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, MAX_PAGE_SIZE);
        assert_eq!(page.orders.len(), 1);
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let view = CustomerOrdersView::new();
        place(&view, UserId::new(), "ORD-1", Utc::now()).await;

        view.reset().await.unwrap();

        assert_eq!(view.list_all(OrderQuery::default()).await.total, 0);
        assert_eq!(view.position().await.events_processed, 0);
    }
}
