//! Order commands.

use common::{AggregateId, UserId};

use crate::command::Command;
use crate::money::Money;

use super::{Order, OrderStatus, ReturnStatus};

/// Operator status write.
#[derive(Debug, Clone)]
pub struct ChangeOrderStatus {
    pub order_id: AggregateId,
    pub status: OrderStatus,
    pub note: Option<String>,
    pub updated_by: Option<UserId>,
}

impl ChangeOrderStatus {
    pub fn new(order_id: AggregateId, status: OrderStatus) -> Self {
        Self {
            order_id,
            status,
            note: None,
            updated_by: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn by(mut self, user_id: UserId) -> Self {
        self.updated_by = Some(user_id);
        self
    }
}

impl Command for ChangeOrderStatus {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }
}

/// Command to cancel an order.
#[derive(Debug, Clone)]
pub struct CancelOrder {
    pub order_id: AggregateId,
    pub reason: String,
    pub cancelled_by: Option<UserId>,
}

impl CancelOrder {
    pub fn new(order_id: AggregateId, reason: impl Into<String>) -> Self {
        Self {
            order_id,
            reason: reason.into(),
            cancelled_by: None,
        }
    }

    pub fn by(mut self, user_id: UserId) -> Self {
        self.cancelled_by = Some(user_id);
        self
    }
}

impl Command for CancelOrder {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }
}

#[derive(Debug, Clone)]
pub struct UpdateShipment {
    pub order_id: AggregateId,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
}

impl Command for UpdateShipment {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }
}

/// Customer return request on a delivered order.
#[derive(Debug, Clone)]
pub struct RequestReturn {
    pub order_id: AggregateId,
    pub reason: String,
}

impl RequestReturn {
    pub fn new(order_id: AggregateId, reason: impl Into<String>) -> Self {
        Self {
            order_id,
            reason: reason.into(),
        }
    }
}

impl Command for RequestReturn {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }
}

#[derive(Debug, Clone)]
pub struct UpdateReturnStatus {
    pub order_id: AggregateId,
    pub status: ReturnStatus,
    pub updated_by: Option<UserId>,
}

impl UpdateReturnStatus {
    pub fn new(order_id: AggregateId, status: ReturnStatus) -> Self {
        Self {
            order_id,
            status,
            updated_by: None,
        }
    }

    pub fn by(mut self, user_id: UserId) -> Self {
        self.updated_by = Some(user_id);
        self
    }
}

impl Command for UpdateReturnStatus {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }
}

/// Refund of a paid order. `amount: None` refunds the full total.
#[derive(Debug, Clone)]
pub struct RefundPayment {
    pub order_id: AggregateId,
    pub amount: Option<Money>,
    pub reason: String,
    pub refund_id: Option<String>,
    pub refunded_by: Option<UserId>,
}

impl RefundPayment {
    pub fn full(order_id: AggregateId, reason: impl Into<String>) -> Self {
        Self {
            order_id,
            amount: None,
            reason: reason.into(),
            refund_id: None,
            refunded_by: None,
        }
    }

    pub fn partial(order_id: AggregateId, amount: Money, reason: impl Into<String>) -> Self {
        Self {
            amount: Some(amount),
            ..Self::full(order_id, reason)
        }
    }

    pub fn with_refund_id(mut self, refund_id: impl Into<String>) -> Self {
        self.refund_id = Some(refund_id.into());
        self
    }

    pub fn by(mut self, user_id: UserId) -> Self {
        self.refunded_by = Some(user_id);
        self
    }
}

impl Command for RefundPayment {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }
}
