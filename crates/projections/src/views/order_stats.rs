//! Sales statistics read model.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{Aggregate, Money, Order, OrderEvent, OrderStatus};
use event_store::EventEnvelope;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBreakdown {
    pub status: OrderStatus,
    pub count: u64,
    pub revenue: Money,
}

/// Order counts and revenue over a placement window.
///
/// Revenue sums order totals regardless of status, so cancelled and failed
/// orders still show up in their own breakdown row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStats {
    pub total_orders: u64,
    pub total_revenue: Money,
    pub average_order_value: Money,
    pub pending: u64,
    /// Delivered orders.
    pub completed: u64,
    pub cancelled: u64,
    pub by_status: Vec<StatusBreakdown>,
}

#[derive(Debug, Clone, Copy)]
struct OrderFacts {
    status: OrderStatus,
    total: Money,
    placed_at: DateTime<Utc>,
}

struct OrderStatsState {
    orders: HashMap<AggregateId, OrderFacts>,
    position: ProjectionPosition,
}

#[derive(Clone)]
pub struct OrderStatsView {
    state: Arc<RwLock<OrderStatsState>>,
}

impl OrderStatsView {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(OrderStatsState {
                orders: HashMap::new(),
                position: ProjectionPosition::zero(),
            })),
        }
    }

    /// Statistics for orders placed within `[from, to]`. Either bound may be
    /// left open.
    pub async fn stats(&self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> OrderStats {
        let state = self.state.read().await;
        let in_window = state.orders.values().filter(|facts| {
            from.is_none_or(|from| facts.placed_at >= from)
                && to.is_none_or(|to| facts.placed_at <= to)
        });

        let mut per_status: HashMap<OrderStatus, (u64, Money)> = HashMap::new();
        for facts in in_window {
            let entry = per_status.entry(facts.status).or_default();
            entry.0 += 1;
            entry.1 += facts.total;
        }

        let by_status: Vec<StatusBreakdown> = OrderStatus::ALL
            .into_iter()
            .filter_map(|status| {
                per_status.get(&status).map(|&(count, revenue)| StatusBreakdown {
                    status,
                    count,
                    revenue,
                })
            })
            .collect();

        let total_orders: u64 = by_status.iter().map(|b| b.count).sum();
        let total_revenue: Money = by_status.iter().map(|b| b.revenue).sum();
        let count_of = |status| per_status.get(&status).map_or(0, |&(count, _)| count);
        OrderStats {
            total_orders,
            total_revenue,
            average_order_value: average(total_revenue, total_orders),
            pending: count_of(OrderStatus::Pending),
            completed: count_of(OrderStatus::Delivered),
            cancelled: count_of(OrderStatus::Cancelled),
            by_status,
        }
    }
}

/// Mean rounded half up to the cent.
fn average(total: Money, count: u64) -> Money {
    if count == 0 {
        return Money::zero();
    }
    let count = count as i64;
    Money::from_cents((total.cents() * 2 + count) / (count * 2))
}

impl Default for OrderStatsView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for OrderStatsView {
    fn name(&self) -> &'static str {
        "OrderStatsView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;
        if event.aggregate_type == Order::aggregate_type() {
            let order_id = event.aggregate_id;
            match event.decode::<OrderEvent>()? {
                OrderEvent::OrderPlaced(data) => {
                    state.orders.insert(
                        order_id,
                        OrderFacts {
                            status: OrderStatus::Pending,
                            total: data.pricing.total,
                            placed_at: data.placed_at,
                        },
                    );
                }
                OrderEvent::StatusChanged(data) => {
                    if let Some(facts) = state.orders.get_mut(&order_id) {
                        facts.status = data.to;
                    }
                }
                OrderEvent::OrderCancelled(_) => {
                    if let Some(facts) = state.orders.get_mut(&order_id) {
                        facts.status = OrderStatus::Cancelled;
                    }
                }
                _ => {}
            }
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

impl ReadModel for OrderStatsView {
    fn name(&self) -> &'static str {
        "OrderStatsView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.orders.len()).unwrap_or(0)
    }
}
