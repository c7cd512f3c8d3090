//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};
use crate::money::Money;

use super::{
    Address, InventoryHold, OrderCancelledData, OrderError, OrderEvent, OrderItem,
    OrderPlacedData, OrderPricing, OrderStatus, PaymentDetails, PaymentMethod,
    PaymentRefundedData, PaymentStatus, PendingRefund, RefundDetails, ReturnRequest,
    ReturnStatus, ShippingMethod, StatusChangedData, TimelineEntry,
};

/// Everything checkout decides before the order is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub pricing: OrderPricing,
    #[serde(default)]
    pub coupon_code: Option<String>,
    pub shipping_address: Address,
    /// Defaults to the shipping address.
    #[serde(default)]
    pub billing_address: Option<Address>,
    pub payment_method: PaymentMethod,
    pub shipping_method: ShippingMethod,
    #[serde(default)]
    pub customer_note: Option<String>,
}

/// Order aggregate root.
///
/// Items and pricing are frozen at placement. Status and payment status move
/// independently; every status write lands in the timeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    order_number: String,
    user_id: Option<UserId>,
    items: Vec<OrderItem>,
    pricing: OrderPricing,
    coupon_code: Option<String>,
    shipping_address: Address,
    billing_address: Address,
    payment_method: PaymentMethod,
    shipping_method: ShippingMethod,
    customer_note: Option<String>,

    status: OrderStatus,
    payment_status: PaymentStatus,
    payment: Option<PaymentDetails>,
    refund: Option<RefundDetails>,
    #[serde(default)]
    pending_refund: Option<PendingRefund>,
    inventory: InventoryHold,

    tracking_number: Option<String>,
    carrier: Option<String>,

    timeline: Vec<TimelineEntry>,
    return_request: ReturnRequest,

    created_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderPlaced(data) => self.apply_placed(data),
            OrderEvent::InventoryHoldChanged { hold } => {
                self.inventory = hold;
            }
            OrderEvent::StatusChanged(data) => self.apply_status_changed(data),
            OrderEvent::ShipmentUpdated {
                tracking_number,
                carrier,
            } => {
                if tracking_number.is_some() {
                    self.tracking_number = tracking_number;
                }
                if carrier.is_some() {
                    self.carrier = carrier;
                }
            }
            OrderEvent::OrderCancelled(data) => {
                self.status = OrderStatus::Cancelled;
                self.cancelled_at = Some(data.at);
                self.timeline.push(TimelineEntry {
                    status: OrderStatus::Cancelled,
                    note: Some(data.reason.clone()),
                    timestamp: data.at,
                    updated_by: data.cancelled_by,
                });
                self.cancellation_reason = Some(data.reason);
            }
            OrderEvent::PaymentSucceeded {
                transaction_id,
                provider,
                at,
            } => {
                self.payment_status = PaymentStatus::Paid;
                self.paid_at = Some(at);
                self.payment = Some(PaymentDetails {
                    transaction_id,
                    provider,
                    paid_at: at,
                });
            }
            OrderEvent::PaymentFailed { .. } => {
                self.payment_status = PaymentStatus::Failed;
            }
            OrderEvent::RefundRequested {
                amount,
                reason,
                requested_by,
                at,
            } => {
                self.pending_refund = Some(PendingRefund {
                    amount,
                    reason,
                    requested_by,
                    requested_at: at,
                });
            }
            OrderEvent::RefundFailed { .. } => {
                self.pending_refund = None;
            }
            OrderEvent::PaymentRefunded(data) => {
                self.pending_refund = None;
                self.payment_status = if data.partial {
                    PaymentStatus::PartiallyRefunded
                } else {
                    PaymentStatus::Refunded
                };
                self.refund = Some(RefundDetails {
                    refund_id: data.refund_id,
                    amount: data.amount,
                    reason: data.reason,
                    refunded_at: data.at,
                });
            }
            OrderEvent::ReturnRequested { reason, at } => {
                self.return_request = ReturnRequest {
                    requested: true,
                    reason: Some(reason),
                    status: ReturnStatus::Requested,
                    requested_at: Some(at),
                };
            }
            OrderEvent::ReturnStatusChanged { to, .. } => {
                self.return_request.status = to;
            }
        }
    }
}

impl SnapshotCapable for Order {
    fn snapshot_interval() -> usize {
        50 // Snapshot every 50 events
    }
}

// Query methods
impl Order {
    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn total_items(&self) -> u32 {
        self.items
            .iter()
            .fold(0u32, |total, item| total.saturating_add(item.quantity))
    }

    pub fn pricing(&self) -> OrderPricing {
        self.pricing
    }

    pub fn total(&self) -> Money {
        self.pricing.total
    }

    pub fn coupon_code(&self) -> Option<&str> {
        self.coupon_code.as_deref()
    }

    pub fn shipping_address(&self) -> &Address {
        &self.shipping_address
    }

    pub fn billing_address(&self) -> &Address {
        &self.billing_address
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn shipping_method(&self) -> ShippingMethod {
        self.shipping_method
    }

    pub fn customer_note(&self) -> Option<&str> {
        self.customer_note.as_deref()
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn payment(&self) -> Option<&PaymentDetails> {
        self.payment.as_ref()
    }

    pub fn refund_details(&self) -> Option<&RefundDetails> {
        self.refund.as_ref()
    }

    pub fn pending_refund(&self) -> Option<&PendingRefund> {
        self.pending_refund.as_ref()
    }

    pub fn inventory(&self) -> InventoryHold {
        self.inventory
    }

    pub fn tracking_number(&self) -> Option<&str> {
        self.tracking_number.as_deref()
    }

    pub fn carrier(&self) -> Option<&str> {
        self.carrier.as_deref()
    }

    pub fn timeline(&self) -> &[TimelineEntry] {
        &self.timeline
    }

    pub fn return_request(&self) -> &ReturnRequest {
        &self.return_request
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn shipped_at(&self) -> Option<DateTime<Utc>> {
        self.shipped_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    pub fn can_be_cancelled(&self) -> bool {
        self.id.is_some() && self.status.can_be_cancelled()
    }

    /// Delivered and still inside the return window.
    pub fn can_be_returned(&self, now: DateTime<Utc>, window_days: i64) -> bool {
        self.check_returnable(now, window_days).is_ok()
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == Some(user_id)
    }
}

// Command methods (return events)
impl Order {
    pub fn place(
        &self,
        order_id: AggregateId,
        order_number: String,
        order: NewOrder,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyExists);
        }
        if order.items.is_empty() {
            return Err(OrderError::NoItems);
        }
        if let Some(field) = order.shipping_address.missing_field() {
            return Err(OrderError::InvalidAddress(field));
        }
        let billing_address = order
            .billing_address
            .unwrap_or_else(|| order.shipping_address.clone());

        Ok(vec![OrderEvent::OrderPlaced(OrderPlacedData {
            order_id,
            order_number,
            user_id: order.user_id,
            items: order.items,
            pricing: order.pricing,
            coupon_code: order.coupon_code,
            shipping_address: order.shipping_address,
            billing_address,
            payment_method: order.payment_method,
            shipping_method: order.shipping_method,
            customer_note: order.customer_note,
            placed_at: now,
        })])
    }

    pub fn set_inventory_hold(&self, hold: InventoryHold) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_exists()?;
        if self.inventory == hold {
            return Ok(vec![]);
        }
        Ok(vec![OrderEvent::InventoryHoldChanged { hold }])
    }

    /// Moves the hold only if it is still `from`. Concurrent writers racing
    /// for the same stock see `HoldMismatch` once the first one lands.
    pub fn transition_hold(
        &self,
        from: InventoryHold,
        to: InventoryHold,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_exists()?;
        if self.inventory != from {
            return Err(OrderError::HoldMismatch {
                expected: from,
                actual: self.inventory,
            });
        }
        if to == InventoryHold::Committed && self.status.is_terminal() {
            return Err(OrderError::InvalidStatusTransition {
                from: self.status,
                to: OrderStatus::Confirmed,
            });
        }
        Ok(vec![OrderEvent::InventoryHoldChanged { hold: to }])
    }

    /// Operator status write.
    ///
    /// Terminal orders accept nothing. Cancellation and refunds have their own
    /// operations and are refused here. Writing the current status is a no-op.
    pub fn change_status(
        &self,
        to: OrderStatus,
        note: Option<String>,
        updated_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_exists()?;
        let from = self.status;
        if from.is_terminal() || matches!(to, OrderStatus::Cancelled | OrderStatus::Refunded) {
            return Err(OrderError::InvalidStatusTransition { from, to });
        }
        if from == to {
            return Ok(vec![]);
        }
        Ok(vec![self.status_changed(to, note, updated_by, now)])
    }

    /// Marks the order failed. Used by checkout compensation and payment
    /// failure. Already-terminal orders are left alone.
    pub fn fail(&self, note: impl Into<String>, now: DateTime<Utc>) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_exists()?;
        if self.status.is_terminal() {
            return Ok(vec![]);
        }
        Ok(vec![self.status_changed(
            OrderStatus::Failed,
            Some(note.into()),
            None,
            now,
        )])
    }

    pub fn cancel(
        &self,
        reason: impl Into<String>,
        cancelled_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_exists()?;
        if !self.status.can_be_cancelled() {
            return Err(OrderError::CannotCancel {
                status: self.status,
            });
        }
        Ok(vec![OrderEvent::OrderCancelled(OrderCancelledData {
            from: self.status,
            reason: reason.into(),
            cancelled_by,
            at: now,
        })])
    }

    pub fn update_shipment(
        &self,
        tracking_number: Option<String>,
        carrier: Option<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_exists()?;
        if tracking_number.is_none() && carrier.is_none() {
            return Ok(vec![]);
        }
        Ok(vec![OrderEvent::ShipmentUpdated {
            tracking_number,
            carrier,
        }])
    }

    pub fn request_return(
        &self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
        window_days: i64,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_exists()?;
        self.check_returnable(now, window_days)?;
        let from = self.return_request.status;
        if !from.can_transition_to(ReturnStatus::Requested) {
            return Err(OrderError::InvalidReturnTransition {
                from,
                to: ReturnStatus::Requested,
            });
        }
        Ok(vec![OrderEvent::ReturnRequested {
            reason: reason.into(),
            at: now,
        }])
    }

    pub fn update_return_status(
        &self,
        to: ReturnStatus,
        updated_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_exists()?;
        let from = self.return_request.status;
        if to == ReturnStatus::Requested || !from.can_transition_to(to) {
            return Err(OrderError::InvalidReturnTransition { from, to });
        }
        Ok(vec![OrderEvent::ReturnStatusChanged {
            from,
            to,
            updated_by,
            at: now,
        }])
    }

    /// Records a successful payment. A pending order is confirmed in the same
    /// step. Replaying the success on a paid order is a no-op.
    pub fn record_payment_success(
        &self,
        transaction_id: impl Into<String>,
        provider: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_exists()?;
        if self.payment_status == PaymentStatus::Paid {
            return Ok(vec![]);
        }
        if self.payment_status != PaymentStatus::Pending {
            return Err(OrderError::PaymentNotPending {
                status: self.payment_status,
            });
        }
        if self.status.is_terminal() {
            return Err(OrderError::InvalidStatusTransition {
                from: self.status,
                to: OrderStatus::Confirmed,
            });
        }

        let mut events = vec![OrderEvent::PaymentSucceeded {
            transaction_id: transaction_id.into(),
            provider: provider.into(),
            at: now,
        }];
        if self.status == OrderStatus::Pending {
            events.push(self.status_changed(
                OrderStatus::Confirmed,
                Some("Payment received".to_string()),
                None,
                now,
            ));
        }
        Ok(events)
    }

    /// Records a failed payment and fails the order.
    pub fn record_payment_failure(
        &self,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_exists()?;
        match self.payment_status {
            PaymentStatus::Failed => return Ok(vec![]),
            PaymentStatus::Pending => {}
            status => return Err(OrderError::PaymentNotPending { status }),
        }
        let mut events = vec![OrderEvent::PaymentFailed {
            reason: reason.clone(),
            at: now,
        }];
        if !self.status.is_terminal() {
            events.push(self.status_changed(
                OrderStatus::Failed,
                reason.or_else(|| Some("Payment failed".to_string())),
                None,
                now,
            ));
        }
        Ok(events)
    }

    /// Refunds a paid order, fully when `amount` is `None`.
    pub fn refund(
        &self,
        amount: Option<Money>,
        reason: impl Into<String>,
        refund_id: Option<String>,
        refunded_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_exists()?;
        if self.payment_status != PaymentStatus::Paid {
            return Err(OrderError::NotPaid {
                status: self.payment_status,
            });
        }
        let amount = amount.unwrap_or(self.pricing.total);
        if !amount.is_positive() || amount > self.pricing.total {
            return Err(OrderError::InvalidRefundAmount { amount });
        }
        let reason = reason.into();

        let mut events = vec![OrderEvent::PaymentRefunded(PaymentRefundedData {
            amount,
            reason: reason.clone(),
            refund_id,
            partial: amount < self.pricing.total,
            at: now,
        })];
        if self.status != OrderStatus::Refunded {
            events.push(self.status_changed(
                OrderStatus::Refunded,
                Some(reason),
                refunded_by,
                now,
            ));
        }
        Ok(events)
    }

    /// Marks a refund as sent to the gateway. Only one refund may be in
    /// flight at a time.
    pub fn request_refund(
        &self,
        amount: Option<Money>,
        reason: impl Into<String>,
        requested_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_exists()?;
        if let Some(pending) = &self.pending_refund {
            return Err(OrderError::RefundInProgress {
                amount: pending.amount,
            });
        }
        if self.payment_status != PaymentStatus::Paid {
            return Err(OrderError::NotPaid {
                status: self.payment_status,
            });
        }
        let amount = amount.unwrap_or(self.pricing.total);
        if !amount.is_positive() || amount > self.pricing.total {
            return Err(OrderError::InvalidRefundAmount { amount });
        }
        Ok(vec![OrderEvent::RefundRequested {
            amount,
            reason: reason.into(),
            requested_by,
            at: now,
        }])
    }

    /// Clears an in-flight refund the gateway refused.
    pub fn fail_refund(
        &self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_exists()?;
        if self.pending_refund.is_none() {
            return Ok(vec![]);
        }
        Ok(vec![OrderEvent::RefundFailed {
            reason: reason.into(),
            at: now,
        }])
    }

    fn status_changed(
        &self,
        to: OrderStatus,
        note: Option<String>,
        updated_by: Option<UserId>,
        at: DateTime<Utc>,
    ) -> OrderEvent {
        OrderEvent::StatusChanged(StatusChangedData {
            from: self.status,
            to,
            note,
            updated_by,
            at,
        })
    }

    fn check_returnable(&self, now: DateTime<Utc>, window_days: i64) -> Result<(), OrderError> {
        if self.status != OrderStatus::Delivered {
            return Err(OrderError::NotReturnable {
                status: self.status,
            });
        }
        let delivered_at = self.delivered_at.unwrap_or(now);
        let days_elapsed = (now - delivered_at).num_days();
        if days_elapsed > window_days {
            return Err(OrderError::ReturnWindowExpired {
                days_elapsed,
                window_days,
            });
        }
        Ok(())
    }

    fn ensure_exists(&self) -> Result<(), OrderError> {
        if self.id.is_none() {
            return Err(OrderError::NotFound);
        }
        Ok(())
    }
}

// Apply event helpers
impl Order {
    fn apply_placed(&mut self, data: OrderPlacedData) {
        self.id = Some(data.order_id);
        self.order_number = data.order_number;
        self.user_id = Some(data.user_id);
        self.items = data.items;
        self.pricing = data.pricing;
        self.coupon_code = data.coupon_code;
        self.shipping_address = data.shipping_address;
        self.billing_address = data.billing_address;
        self.payment_method = data.payment_method;
        self.shipping_method = data.shipping_method;
        self.customer_note = data.customer_note;
        self.status = OrderStatus::Pending;
        self.payment_status = PaymentStatus::Pending;
        self.created_at = Some(data.placed_at);
        self.timeline.push(TimelineEntry {
            status: OrderStatus::Pending,
            note: Some("Order placed".to_string()),
            timestamp: data.placed_at,
            updated_by: None,
        });
    }

    fn apply_status_changed(&mut self, data: StatusChangedData) {
        self.status = data.to;
        match data.to {
            OrderStatus::Shipped if self.shipped_at.is_none() => self.shipped_at = Some(data.at),
            OrderStatus::Delivered if self.delivered_at.is_none() => {
                self.delivered_at = Some(data.at)
            }
            _ => {}
        }
        self.timeline.push(TimelineEntry {
            status: data.to,
            note: data.note,
            timestamp: data.at,
            updated_by: data.updated_by,
        });
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::aggregate::{Aggregate, DomainEvent};

    fn now() -> DateTime<Utc> {
        "2026-04-01T10:00:00Z".parse().unwrap()
    }

    fn address() -> Address {
        Address {
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            address: "1 Navy Way".to_string(),
            apartment: None,
            city: "Arlington".to_string(),
            state: "VA".to_string(),
            country: "US".to_string(),
            zip_code: "22202".to_string(),
            phone: "555-0100".to_string(),
        }
    }

    fn new_order(method: PaymentMethod) -> NewOrder {
        let item = OrderItem::new(AggregateId::new(), "Desk", "DESK-1", 2, Money::from_dollars(20));
        NewOrder {
            user_id: UserId::new(),
            pricing: OrderPricing {
                subtotal: item.total,
                total: item.total,
                ..OrderPricing::default()
            },
            items: vec![item],
            coupon_code: None,
            shipping_address: address(),
            billing_address: None,
            payment_method: method,
            shipping_method: ShippingMethod::Standard,
            customer_note: None,
        }
    }

    fn placed(method: PaymentMethod) -> Order {
        let mut order = Order::default();
        let events = order
            .place(
                AggregateId::new(),
                "ORD-00000001001".to_string(),
                new_order(method),
                now(),
            )
            .unwrap();
        order.apply_events(events);
        order
    }

    fn step(order: &mut Order, events: Result<Vec<OrderEvent>, OrderError>) {
        order.apply_events(events.unwrap());
    }

    fn delivered() -> Order {
        let mut order = placed(PaymentMethod::Card);
        for status in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            let events = order.change_status(status, None, None, now());
            step(&mut order, events);
        }
        order
    }

    #[test]
    fn placed_order_is_pending_with_timeline() {
        let order = placed(PaymentMethod::Card);

        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert_eq!(order.timeline().len(), 1);
        assert_eq!(order.billing_address(), order.shipping_address());
        assert_eq!(order.total_items(), 2);
    }

    #[test]
    fn empty_order_is_rejected() {
        let mut empty = new_order(PaymentMethod::Card);
        empty.items.clear();
        let result = Order::default().place(AggregateId::new(), "N".to_string(), empty, now());
        assert!(matches!(result, Err(OrderError::NoItems)));
    }

    #[test]
    fn incomplete_address_is_rejected() {
        let mut order = new_order(PaymentMethod::Card);
        order.shipping_address.city.clear();
        let result = Order::default().place(AggregateId::new(), "N".to_string(), order, now());
        assert!(matches!(result, Err(OrderError::InvalidAddress("city"))));
    }

    #[test]
    fn status_changes_append_timeline_and_stamp_dates() {
        let order = delivered();

        assert_eq!(order.timeline().len(), 5);
        assert!(order.shipped_at().is_some());
        assert!(order.delivered_at().is_some());
        let last = order.timeline().last().unwrap();
        assert_eq!(last.status, OrderStatus::Delivered);
    }

    #[test]
    fn terminal_orders_refuse_status_writes() {
        let order = delivered();
        let result = order.change_status(OrderStatus::Processing, None, None, now());
        assert!(matches!(
            result,
            Err(OrderError::InvalidStatusTransition {
                from: OrderStatus::Delivered,
                ..
            })
        ));
    }

    #[test]
    fn cancellation_has_its_own_operation() {
        let order = placed(PaymentMethod::Card);
        assert!(order
            .change_status(OrderStatus::Cancelled, None, None, now())
            .is_err());
        assert!(order
            .change_status(OrderStatus::Pending, None, None, now())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn cancel_processing_order() {
        let mut order = placed(PaymentMethod::Card);
        let events = order.change_status(OrderStatus::Confirmed, None, None, now());
        step(&mut order, events);
        let events = order.change_status(OrderStatus::Processing, None, None, now());
        step(&mut order, events);

        let user = order.user_id();
        let events = order.cancel("Changed my mind", user, now());
        step(&mut order, events);

        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.cancelled_at(), Some(now()));
        assert_eq!(order.cancellation_reason(), Some("Changed my mind"));
    }

    #[test]
    fn shipped_order_cannot_be_cancelled() {
        let mut order = placed(PaymentMethod::Card);
        for status in [OrderStatus::Confirmed, OrderStatus::Shipped] {
            let events = order.change_status(status, None, None, now());
            step(&mut order, events);
        }
        assert!(matches!(
            order.cancel("late", None, now()),
            Err(OrderError::CannotCancel {
                status: OrderStatus::Shipped
            })
        ));
    }

    #[test]
    fn return_window_is_enforced() {
        let order = delivered();
        let delivered_at = order.delivered_at().unwrap();

        assert!(order.can_be_returned(delivered_at + Duration::days(30), 30));
        let result = order.request_return("Broken", delivered_at + Duration::days(31), 30);
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            OrderError::ReturnWindowExpired {
                days_elapsed: 31,
                window_days: 30
            }
        ));
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidState);
    }

    #[test]
    fn return_before_delivery_fails() {
        let order = placed(PaymentMethod::Card);
        assert!(matches!(
            order.request_return("why", now(), 30),
            Err(OrderError::NotReturnable { .. })
        ));
    }

    #[test]
    fn return_sub_state_flow() {
        let mut order = delivered();
        let events = order.request_return("Too small", now() + Duration::days(2), 30);
        step(&mut order, events);
        assert_eq!(order.return_request().status, ReturnStatus::Requested);
        assert!(order.request_return("again", now(), 30).is_err());

        assert!(order
            .update_return_status(ReturnStatus::Completed, None, now())
            .is_err());
        let events = order.update_return_status(ReturnStatus::Approved, None, now());
        step(&mut order, events);
        let events = order.update_return_status(ReturnStatus::Completed, None, now());
        step(&mut order, events);

        assert_eq!(order.return_request().status, ReturnStatus::Completed);
        assert_eq!(order.status(), OrderStatus::Delivered);
    }

    #[test]
    fn payment_success_confirms_and_is_idempotent() {
        let mut order = placed(PaymentMethod::Card);

        let events = order.record_payment_success("pi_1", "stripe", now()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type(), "OrderStatusChanged");
        order.apply_events(events);

        assert_eq!(order.status(), OrderStatus::Confirmed);
        assert_eq!(order.payment_status(), PaymentStatus::Paid);
        assert_eq!(order.payment().unwrap().transaction_id, "pi_1");
        assert!(order
            .record_payment_success("pi_1", "stripe", now())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn payment_failure_fails_order() {
        let mut order = placed(PaymentMethod::Card);
        let events = order.record_payment_failure(Some("card declined".to_string()), now());
        step(&mut order, events);

        assert_eq!(order.payment_status(), PaymentStatus::Failed);
        assert_eq!(order.status(), OrderStatus::Failed);
        assert!(order.record_payment_failure(None, now()).unwrap().is_empty());
    }

    #[test]
    fn refund_requires_paid() {
        let order = placed(PaymentMethod::Card);
        assert!(matches!(
            order.refund(None, "dup", None, None, now()),
            Err(OrderError::NotPaid { .. })
        ));
    }

    #[test]
    fn partial_and_full_refunds() {
        let mut order = placed(PaymentMethod::Card);
        let events = order.record_payment_success("pi_2", "stripe", now());
        step(&mut order, events);

        assert!(matches!(
            order.refund(Some(Money::zero()), "x", None, None, now()),
            Err(OrderError::InvalidRefundAmount { .. })
        ));
        assert!(matches!(
            order.refund(Some(Money::from_dollars(41)), "x", None, None, now()),
            Err(OrderError::InvalidRefundAmount { .. })
        ));

        let mut partial = order.clone();
        let events = partial.refund(Some(Money::from_dollars(10)), "scratch", None, None, now());
        step(&mut partial, events);
        assert_eq!(partial.payment_status(), PaymentStatus::PartiallyRefunded);
        assert_eq!(partial.status(), OrderStatus::Refunded);

        let events = order.refund(None, "returned", Some("re_1".to_string()), None, now());
        step(&mut order, events);
        assert_eq!(order.payment_status(), PaymentStatus::Refunded);
        assert_eq!(order.refund_details().unwrap().amount, Money::from_dollars(40));
    }

    #[test]
    fn hold_moves_only_from_the_expected_state() {
        let mut order = placed(PaymentMethod::Card);
        let events = order.set_inventory_hold(InventoryHold::Reserved);
        step(&mut order, events);

        let stale = order.clone();
        let events = order.transition_hold(InventoryHold::Reserved, InventoryHold::Committed);
        step(&mut order, events);
        assert_eq!(order.inventory(), InventoryHold::Committed);

        assert!(stale
            .transition_hold(InventoryHold::Reserved, InventoryHold::Committed)
            .is_ok());
        assert!(matches!(
            order.transition_hold(InventoryHold::Reserved, InventoryHold::Committed),
            Err(OrderError::HoldMismatch {
                expected: InventoryHold::Reserved,
                actual: InventoryHold::Committed,
            })
        ));
    }

    #[test]
    fn closed_orders_cannot_commit_stock() {
        let mut order = placed(PaymentMethod::Card);
        let events = order.set_inventory_hold(InventoryHold::Reserved);
        step(&mut order, events);
        let events = order.cancel("changed mind", None, now());
        step(&mut order, events);

        assert!(matches!(
            order.transition_hold(InventoryHold::Reserved, InventoryHold::Committed),
            Err(OrderError::InvalidStatusTransition { .. })
        ));
        assert!(order
            .transition_hold(InventoryHold::Reserved, InventoryHold::Released)
            .is_ok());
    }

    #[test]
    fn one_refund_in_flight_at_a_time() {
        let mut order = placed(PaymentMethod::Card);
        let events = order.record_payment_success("pi_3", "stripe", now());
        step(&mut order, events);

        let events = order.request_refund(None, "damaged", None, now());
        step(&mut order, events);
        assert_eq!(
            order.pending_refund().unwrap().amount,
            Money::from_dollars(40)
        );
        assert!(matches!(
            order.request_refund(None, "again", None, now()),
            Err(OrderError::RefundInProgress { .. })
        ));

        let events = order.fail_refund("card closed", now());
        step(&mut order, events);
        assert!(order.pending_refund().is_none());
        assert_eq!(order.payment_status(), PaymentStatus::Paid);
        assert!(order.fail_refund("late", now()).unwrap().is_empty());

        let events = order.request_refund(Some(Money::from_dollars(5)), "partial", None, now());
        step(&mut order, events);
        let events = order.refund(Some(Money::from_dollars(5)), "partial", None, None, now());
        step(&mut order, events);
        assert!(order.pending_refund().is_none());
        assert_eq!(order.payment_status(), PaymentStatus::PartiallyRefunded);
    }

    #[test]
    fn snapshot_round_trip() {
        let order = delivered();
        let json = serde_json::to_string(&order).unwrap();
        let restored: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.timeline(), order.timeline());
        assert_eq!(restored.order_number(), order.order_number());
    }
}
